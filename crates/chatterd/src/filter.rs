use chatterd_core::classifier::{Classifier, KeyEvent, Verdict};
use chatterd_core::config::Config;
use evdev::{EventType, InputEvent};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// evdev EV_KEY values.
const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_AUTOREPEAT: i32 = 2;

/// A backwards jump larger than this is a clock step, not event reordering.
const CLOCK_STEP_MS: u64 = 1000;

/// What the caller should do with an incoming event.
#[derive(Debug)]
pub enum Action {
    /// Relay event to uinput unchanged.
    Relay(InputEvent),
    /// Chatter: drop the event.
    Suppress,
}

/// Bridges raw evdev events to the classifier.
pub struct ChatterFilter {
    classifier: Classifier,
    clock: EventClock,
    enabled: bool,
}

impl ChatterFilter {
    pub fn new(config: &Config) -> Self {
        Self {
            classifier: Classifier::from_config(config),
            clock: EventClock::default(),
            enabled: config.general.enabled,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify an event using its kernel timestamp.
    pub fn process_event(&mut self, event: InputEvent) -> Action {
        self.process_kernel_event(event, event_millis(&event))
    }

    /// Classify an event stamped `kernel_ms` by the device clock.
    pub fn process_kernel_event(&mut self, event: InputEvent, kernel_ms: u64) -> Action {
        let now_ms = self.clock.stamp(kernel_ms);
        self.process_event_at(event, now_ms)
    }

    pub fn process_event_at(&mut self, event: InputEvent, now_ms: u64) -> Action {
        if event.event_type() != EventType::KEY || !self.enabled {
            return Action::Relay(event);
        }

        let is_press = match event.value() {
            KEY_PRESS | KEY_AUTOREPEAT => true,
            KEY_RELEASE => false,
            _ => return Action::Relay(event),
        };

        let code = event.code();
        match self.classifier.classify(KeyEvent { code, is_press, timestamp_ms: now_ms }) {
            Verdict::Pass => Action::Relay(event),
            Verdict::Block(reason) => {
                debug!(
                    code,
                    ?reason,
                    blocked = self.classifier.blocked_count(code),
                    "chatter blocked"
                );
                Action::Suppress
            }
        }
    }
}

/// Keeps event time moving forward across clock steps.
///
/// Grabbed devices run on CLOCK_MONOTONIC. If event time still jumps back
/// by more than [`CLOCK_STEP_MS`], time resumes from the latest reading so
/// no key's last press is left in the future. Small reorderings pass
/// through untouched.
#[derive(Debug, Default)]
struct EventClock {
    last_raw: Option<u64>,
    offset: u64,
    latest: u64,
}

impl EventClock {
    fn stamp(&mut self, raw_ms: u64) -> u64 {
        if let Some(prev) = self.last_raw {
            if raw_ms.saturating_add(CLOCK_STEP_MS) < prev {
                self.offset = self.latest - raw_ms;
            }
        }
        self.last_raw = Some(raw_ms);
        let now = raw_ms.saturating_add(self.offset);
        self.latest = self.latest.max(now);
        now
    }
}

/// Kernel event time in milliseconds since the device clock's origin
/// (boot time once the device runs on CLOCK_MONOTONIC).
fn event_millis(event: &InputEvent) -> u64 {
    event
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
