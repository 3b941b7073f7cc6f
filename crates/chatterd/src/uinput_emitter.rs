use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, InputEvent, Key};
use tracing::info;

/// Name of our virtual keyboard; the grabber skips it to avoid a feedback loop.
pub const VIRTUAL_DEVICE_NAME: &str = "chatterd virtual keyboard";

pub trait EventEmitter {
    fn emit_events(&mut self, events: &[InputEvent]) -> Result<()>;
}

impl EventEmitter for VirtualDevice {
    fn emit_events(&mut self, events: &[InputEvent]) -> Result<()> {
        self.emit(events)?;
        Ok(())
    }
}

pub fn create_virtual_device() -> Result<VirtualDevice> {
    let mut keys = AttributeSet::<Key>::new();
    for code in 0..=255u16 {
        keys.insert(Key::new(code));
    }

    let vdev = VirtualDeviceBuilder::new()
        .context("creating VirtualDeviceBuilder")?
        .name(VIRTUAL_DEVICE_NAME)
        .with_keys(&keys)
        .context("setting keys")?
        .build()
        .context("building virtual device")?;

    info!("virtual uinput device created");
    Ok(vdev)
}

/// Forward passed events downstream in one write.
pub fn relay_events(emitter: &mut impl EventEmitter, events: &[InputEvent]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    emitter.emit_events(events).context("relaying events")
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    struct RecordingEmitter {
        batches: Vec<Vec<(u16, i32)>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_events(&mut self, events: &[InputEvent]) -> Result<()> {
            self.batches
                .push(events.iter().map(|e| (e.code(), e.value())).collect());
            Ok(())
        }
    }

    struct FailingEmitter;

    impl EventEmitter for FailingEmitter {
        fn emit_events(&mut self, _events: &[InputEvent]) -> Result<()> {
            anyhow::bail!("device gone")
        }
    }

    #[test]
    fn relay_writes_one_batch() {
        let mut emitter = RecordingEmitter { batches: Vec::new() };
        let events = [
            InputEvent::new(EventType::KEY, 30, 1),
            InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
        ];
        relay_events(&mut emitter, &events).unwrap();
        assert_eq!(emitter.batches, vec![vec![(30, 1), (0, 0)]]);
    }

    #[test]
    fn relay_skips_empty_batch() {
        let mut emitter = RecordingEmitter { batches: Vec::new() };
        relay_events(&mut emitter, &[]).unwrap();
        assert!(emitter.batches.is_empty());
    }

    #[test]
    fn relay_error_carries_context() {
        let err = relay_events(&mut FailingEmitter, &[InputEvent::new(EventType::KEY, 30, 0)])
            .unwrap_err();
        assert!(format!("{:#}", err).contains("device gone"));
    }
}
