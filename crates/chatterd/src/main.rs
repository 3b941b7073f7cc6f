mod control;
mod filter;
mod grabber;
mod uinput_emitter;

use anyhow::{Context, Result};
use chatterd_core::config::{self, Config};
use chatterd_core::ipc;
use evdev::uinput::VirtualDevice;
use evdev::{EventType, InputEvent, Key};
use filter::{Action, ChatterFilter};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Shared state between the event loop and IPC handlers.
struct Shared {
    filter: ChatterFilter,
    vdev: VirtualDevice,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chatterd=info".parse()?),
        )
        .init();

    info!("chatterd starting");

    let config = Config::load().context("loading config")?;
    log_config(&config);

    let socket_path = config::socket_path();
    ensure_single_instance(&socket_path)?;

    let keyboards = grabber::find_keyboards().context("finding keyboards")?;
    if keyboards.is_empty() {
        anyhow::bail!("no keyboards found — check permissions (group 'input' or udev rules)");
    }

    let vdev = uinput_emitter::create_virtual_device().context("creating virtual device")?;

    // One classifier for every keyboard: keys are identified by code only.
    let shared = Arc::new(Mutex::new(Shared {
        filter: ChatterFilter::new(&config),
        vdev,
    }));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    for keyboard in keyboards {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let path = keyboard.path.clone();
            if let Err(e) = grabber::grab_device(keyboard, tx).await {
                error!(path = %path.display(), error = %e, "grabber task failed");
            }
        });
    }
    drop(event_tx);

    let listener = bind_socket(&socket_path)?;
    info!(path = %socket_path.display(), "IPC socket listening");

    let shared_ipc = Arc::clone(&shared);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(handle_ipc_client(stream, Arc::clone(&shared_ipc)));
                }
                Err(e) => warn!(error = %e, "IPC accept error"),
            }
        }
    });

    let mut escape = EscapeCombo::new();

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    warn!("all keyboards released, nothing left to filter");
                    break;
                };
                let mut shared = shared.lock().await;
                let (relay, exit) = dispatch(&mut shared.filter, &mut escape, event, Instant::now());
                if exit {
                    info!("escape combo detected (Backspace→Escape→Enter), exiting");
                    break;
                }
                if let Some(event) = relay {
                    if let Err(e) = uinput_emitter::relay_events(&mut shared.vdev, &[event]) {
                        warn!(error = %e, "relay error");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    let blocked = shared.lock().await.filter.classifier().total_blocked();
    info!(blocked, "chatterd shutting down");
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

/// Run one event through the filter. Returns the event to relay, if any,
/// and whether it completed the escape combo. Only relayed events count
/// towards the combo, so a bounced key cannot break or fake the sequence.
fn dispatch(
    filter: &mut ChatterFilter,
    escape: &mut EscapeCombo,
    event: InputEvent,
    at: Instant,
) -> (Option<InputEvent>, bool) {
    match filter.process_event(event) {
        Action::Relay(event) => (Some(event), escape.observe(&event, at)),
        Action::Suppress => (None, false),
    }
}

fn log_config(config: &Config) {
    let t = &config.threshold;
    let p = &config.pattern;
    info!(
        strategy = ?config.general.strategy,
        enabled = config.general.enabled,
        initial_ms = t.initial_threshold_ms,
        repeat_ms = t.repeat_threshold_ms,
        transition_ms = t.repeat_transition_delay_ms,
        double_tap = t.intentional_double_tap,
        min_release_ms = t.min_release_duration_ms,
        pattern_min_gap_ms = p.min_gap_ms,
        pattern_irregular_gap_ms = p.irregular_gap_ms,
        pattern_tolerance_ms = p.tolerance_ms,
        "config loaded"
    );
}

/// Refuse to start if a live daemon already answers on the socket.
fn ensure_single_instance(socket_path: &Path) -> Result<()> {
    if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
        anyhow::bail!("chatterd is already running (socket {})", socket_path.display());
    }
    Ok(())
}

fn bind_socket(socket_path: &Path) -> Result<UnixListener> {
    // Stale socket from a previous run
    let _ = std::fs::remove_file(socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    // Let the user's session run chatterctl
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o666)).ok();
    }
    Ok(listener)
}

async fn handle_ipc_client(stream: UnixStream, shared: Arc<Mutex<Shared>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(msg) = ipc::decode_client(&line) else {
            continue;
        };
        let reply = {
            let mut shared = shared.lock().await;
            control::handle(&mut shared.filter, msg)
        };
        if writer.write_all(ipc::encode(&reply).as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Backspace → Escape → Enter within one second exits the daemon.
/// Escape hatch in case the daemon misbehaves while holding EVIOCGRAB.
struct EscapeCombo {
    ring: [(u16, Instant); 3],
    idx: usize,
}

impl EscapeCombo {
    const SEQUENCE: [Key; 3] = [Key::KEY_BACKSPACE, Key::KEY_ESC, Key::KEY_ENTER];
    const WINDOW: Duration = Duration::from_secs(1);

    fn new() -> Self {
        Self {
            ring: [(0, Instant::now()); 3],
            idx: 0,
        }
    }

    /// Feed a relayed event; returns true once the full sequence has been typed.
    fn observe(&mut self, event: &InputEvent, at: Instant) -> bool {
        if event.event_type() != EventType::KEY || event.value() != 1 {
            return false;
        }
        self.ring[self.idx] = (event.code(), at);
        self.idx = (self.idx + 1) % 3;

        // self.idx now points at the oldest entry
        let entry = |i: usize| self.ring[(self.idx + i) % 3];
        let matches = (0..3).all(|i| entry(i).0 == Self::SEQUENCE[i].code());
        matches && entry(2).1.duration_since(entry(0).1) < Self::WINDOW
    }
}
