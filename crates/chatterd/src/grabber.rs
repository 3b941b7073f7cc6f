use crate::uinput_emitter::VIRTUAL_DEVICE_NAME;
use anyhow::{Context, Result};
use evdev::{Device, InputEvent, Key};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// EVIOCSCLOCKID: choose the clock the kernel stamps this device's events with.
nix::ioctl_write_ptr!(eviocsclockid, b'E', 0xa0, nix::libc::c_int);

/// A keyboard found under /dev/input.
#[derive(Debug, Clone)]
pub struct Keyboard {
    pub path: PathBuf,
    pub name: String,
}

/// Find all keyboard devices under /dev/input/.
pub fn find_keyboards() -> Result<Vec<Keyboard>> {
    let mut keyboards = Vec::new();

    for entry in std::fs::read_dir("/dev/input").context("reading /dev/input")? {
        let path = entry?.path();
        if !is_event_node(&path) {
            continue;
        }

        let dev = match Device::open(&path) {
            Ok(dev) => dev,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping device");
                continue;
            }
        };
        let name = dev.name().unwrap_or("unknown").to_string();

        if name == VIRTUAL_DEVICE_NAME {
            debug!(path = %path.display(), "skipping own virtual device");
            continue;
        }
        if is_keyboard(&dev) {
            info!(path = %path.display(), name = %name, "found keyboard");
            keyboards.push(Keyboard { path, name });
        }
    }

    Ok(keyboards)
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("event"))
}

/// Heuristic: a device is a keyboard if it reports letter keys and Enter.
fn is_keyboard(dev: &Device) -> bool {
    let Some(keys) = dev.supported_keys() else {
        return false;
    };
    keys.contains(Key::KEY_A) && keys.contains(Key::KEY_Z) && keys.contains(Key::KEY_ENTER)
}

/// Stamp events with CLOCK_MONOTONIC instead of the steppable wall clock.
fn use_monotonic_clock(dev: &Device) -> Result<()> {
    let clock: nix::libc::c_int = nix::libc::CLOCK_MONOTONIC;
    // SAFETY: the fd belongs to `dev` and stays open for the call; the
    // kernel only reads one c_int through the pointer.
    unsafe { eviocsclockid(dev.as_raw_fd(), &clock) }?;
    Ok(())
}

/// Grab a keyboard exclusively and forward its events to the channel.
/// Runs until the receiver is dropped or the device errors.
pub async fn grab_device(keyboard: Keyboard, tx: mpsc::UnboundedSender<InputEvent>) -> Result<()> {
    let mut dev = Device::open(&keyboard.path)
        .with_context(|| format!("opening {}", keyboard.path.display()))?;

    // Before grabbing, so a refusal leaves the device with the desktop.
    use_monotonic_clock(&dev)
        .with_context(|| format!("switching {} to CLOCK_MONOTONIC", keyboard.path.display()))?;

    // EVIOCGRAB: the desktop only sees what we relay through uinput.
    dev.grab()
        .with_context(|| format!("grabbing {}", keyboard.path.display()))?;
    info!(device = %keyboard.name, path = %keyboard.path.display(), "device grabbed");

    let mut stream = dev.into_event_stream().context("creating event stream")?;

    loop {
        match stream.next_event().await {
            Ok(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(device = %keyboard.name, error = %e, "device error, releasing grab");
                break;
            }
        }
    }

    Ok(())
}
