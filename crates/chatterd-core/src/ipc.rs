use serde::{Deserialize, Serialize};

/// Blocked-press counter for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
    pub code: u16,
    pub blocked: u64,
}

/// Messages from daemon to clients (JSON-lines over Unix socket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMsg {
    /// Status response.
    #[serde(rename = "status")]
    Status {
        enabled: bool,
        strategy: String,
        total_blocked: u64,
        version: String,
    },
    /// Per-key blocked counters, ordered by key code.
    #[serde(rename = "stats")]
    Stats { keys: Vec<KeyStats> },
    /// Acknowledgement for commands.
    #[serde(rename = "ack")]
    Ack { ok: bool, message: String },
}

/// Messages from clients to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Request to toggle filtering on/off.
    #[serde(rename = "toggle")]
    Toggle,
    /// Request to enable.
    #[serde(rename = "enable")]
    Enable,
    /// Request to disable.
    #[serde(rename = "disable")]
    Disable,
    /// Request current status.
    #[serde(rename = "get_status")]
    GetStatus,
    /// Request per-key blocked counters.
    #[serde(rename = "get_stats")]
    GetStats,
}

/// Serialize a message as a JSON line (with trailing newline).
pub fn encode(msg: &impl Serialize) -> String {
    let mut s = serde_json::to_string(msg).expect("serialize IPC message");
    s.push('\n');
    s
}

/// Deserialize a JSON line. Returns None on empty/whitespace input.
pub fn decode_daemon(line: &str) -> Option<DaemonMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

pub fn decode_client(line: &str) -> Option<ClientMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_single_trailing_newline() {
        let msg = DaemonMsg::Stats {
            keys: vec![
                KeyStats { code: 30, blocked: 4 },
                KeyStats { code: 48, blocked: 1 },
            ],
        };
        let encoded = encode(&msg);
        assert!(encoded.ends_with('\n'));
        assert_eq!(encoded.matches('\n').count(), 1);
    }

    #[test]
    fn daemon_msg_status_round_trips() {
        let msg = DaemonMsg::Status {
            enabled: true,
            strategy: "threshold".into(),
            total_blocked: 12,
            version: "0.1.0".into(),
        };
        let decoded = decode_daemon(&encode(&msg)).expect("should decode");
        match decoded {
            DaemonMsg::Status { enabled, strategy, total_blocked, version } => {
                assert!(enabled);
                assert_eq!(strategy, "threshold");
                assert_eq!(total_blocked, 12);
                assert_eq!(version, "0.1.0");
            }
            _ => panic!("expected Status"),
        }
    }

    #[test]
    fn daemon_msg_stats_round_trips() {
        let keys = vec![KeyStats { code: 18, blocked: 7 }];
        let decoded = decode_daemon(&encode(&DaemonMsg::Stats { keys: keys.clone() }))
            .expect("should decode");
        match decoded {
            DaemonMsg::Stats { keys: got } => assert_eq!(got, keys),
            _ => panic!("expected Stats"),
        }
    }

    #[test]
    fn daemon_msg_ack_round_trips() {
        let msg = DaemonMsg::Ack { ok: false, message: "error".into() };
        match decode_daemon(&encode(&msg)).expect("should decode") {
            DaemonMsg::Ack { ok, message } => {
                assert!(!ok);
                assert_eq!(message, "error");
            }
            _ => panic!("expected Ack"),
        }
    }

    #[test]
    fn client_msg_variants_round_trip() {
        for msg in [
            ClientMsg::Toggle,
            ClientMsg::Enable,
            ClientMsg::Disable,
            ClientMsg::GetStatus,
            ClientMsg::GetStats,
        ] {
            let encoded = encode(&msg);
            assert!(decode_client(&encoded).is_some(), "failed to round-trip: {:?}", msg);
        }
    }

    #[test]
    fn client_msg_wire_format_uses_snake_case_tag() {
        assert_eq!(encode(&ClientMsg::GetStats), "{\"type\":\"get_stats\"}\n");
        assert!(matches!(
            decode_client("{\"type\":\"get_status\"}"),
            Some(ClientMsg::GetStatus)
        ));
    }

    // --- empty/whitespace input → None ---

    #[test]
    fn decode_returns_none_for_empty() {
        for line in ["", "   ", "\n"] {
            assert!(decode_daemon(line).is_none());
            assert!(decode_client(line).is_none());
        }
    }

    // --- invalid JSON → None (not panic) ---

    #[test]
    fn decode_returns_none_for_garbage() {
        assert!(decode_daemon("not json").is_none());
        assert!(decode_daemon("{\"type\":\"unknown_variant\"}").is_none());
        assert!(decode_client("not json").is_none());
        assert!(decode_client("{\"type\":\"shutdown\"}").is_none());
    }
}
