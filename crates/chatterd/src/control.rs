use crate::filter::ChatterFilter;
use chatterd_core::ipc::{ClientMsg, DaemonMsg, KeyStats};
use tracing::info;

/// Apply a control request to the filter and build the reply.
pub fn handle(filter: &mut ChatterFilter, msg: ClientMsg) -> DaemonMsg {
    match msg {
        ClientMsg::Toggle => {
            let enabled = !filter.is_enabled();
            filter.set_enabled(enabled);
            info!(enabled, "toggled");
            ack(format!("enabled: {}", enabled))
        }
        ClientMsg::Enable => {
            filter.set_enabled(true);
            info!("enabled via IPC");
            ack("enabled".into())
        }
        ClientMsg::Disable => {
            filter.set_enabled(false);
            info!("disabled via IPC");
            ack("disabled".into())
        }
        ClientMsg::GetStatus => DaemonMsg::Status {
            enabled: filter.is_enabled(),
            strategy: filter.classifier().strategy_name().to_string(),
            total_blocked: filter.classifier().total_blocked(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        ClientMsg::GetStats => DaemonMsg::Stats {
            keys: filter
                .classifier()
                .blocked_keys()
                .into_iter()
                .map(|(code, blocked)| KeyStats { code, blocked })
                .collect(),
        },
    }
}

fn ack(message: String) -> DaemonMsg {
    DaemonMsg::Ack { ok: true, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatterd_core::config::Config;
    use evdev::{EventType, InputEvent};

    fn make_filter() -> ChatterFilter {
        ChatterFilter::new(&Config::default())
    }

    fn press(filter: &mut ChatterFilter, code: u16, t: u64) {
        filter.process_event_at(InputEvent::new(EventType::KEY, code, 1), t);
    }

    #[test]
    fn toggle_flips_enabled() {
        let mut f = make_filter();
        match handle(&mut f, ClientMsg::Toggle) {
            DaemonMsg::Ack { ok, message } => {
                assert!(ok);
                assert_eq!(message, "enabled: false");
            }
            other => panic!("expected Ack, got {:?}", other),
        }
        assert!(!f.is_enabled());
        handle(&mut f, ClientMsg::Toggle);
        assert!(f.is_enabled());
    }

    #[test]
    fn enable_and_disable_are_idempotent() {
        let mut f = make_filter();
        handle(&mut f, ClientMsg::Disable);
        handle(&mut f, ClientMsg::Disable);
        assert!(!f.is_enabled());
        handle(&mut f, ClientMsg::Enable);
        handle(&mut f, ClientMsg::Enable);
        assert!(f.is_enabled());
    }

    #[test]
    fn status_reports_strategy_and_total() {
        let mut f = make_filter();
        press(&mut f, 30, 1000);
        press(&mut f, 30, 1003);
        press(&mut f, 30, 1007);
        match handle(&mut f, ClientMsg::GetStatus) {
            DaemonMsg::Status { enabled, strategy, total_blocked, version } => {
                assert!(enabled);
                assert_eq!(strategy, "threshold");
                assert_eq!(total_blocked, 2);
                assert!(!version.is_empty());
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[test]
    fn stats_list_only_keys_with_blocks() {
        let mut f = make_filter();
        press(&mut f, 31, 1000);
        press(&mut f, 30, 1000);
        press(&mut f, 30, 1001);
        match handle(&mut f, ClientMsg::GetStats) {
            DaemonMsg::Stats { keys } => {
                assert_eq!(keys, vec![KeyStats { code: 30, blocked: 1 }]);
            }
            other => panic!("expected Stats, got {:?}", other),
        }
    }
}
