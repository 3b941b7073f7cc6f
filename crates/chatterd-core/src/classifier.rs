//! Per-key chatter classification.
//!
//! A [`Classifier`] sees every press and release for every key and decides,
//! one event at a time, whether a press is a genuine actuation or a contact
//! bounce that must be swallowed. Releases are never blocked. The decision
//! for a press that has history is delegated to a [`ChatterStrategy`].

use crate::config::{Config, PatternConfig, StrategyKind, ThresholdConfig};
use std::collections::HashMap;

/// Linux input-event key code. The classifier treats it as an opaque id.
pub type KeyCode = u16;

/// Number of accepted press timestamps kept per key.
const HISTORY_LEN: usize = 5;

/// Presses needed before the pattern strategy looks at the rhythm.
const PATTERN_MIN_HISTORY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub is_press: bool,
    pub timestamp_ms: u64,
}

impl KeyEvent {
    pub fn press(code: KeyCode, timestamp_ms: u64) -> Self {
        Self { code, is_press: true, timestamp_ms }
    }
}

/// Why a press was classified as chatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Too soon after a fresh press.
    InitialThreshold { elapsed_ms: u64, threshold_ms: u64 },
    /// Too soon after the previous repeat while the key is held.
    RepeatThreshold { elapsed_ms: u64, threshold_ms: u64 },
    /// Under the absolute floor.
    TooFast { elapsed_ms: u64, min_gap_ms: u64 },
    /// Short gap that does not fit the recent rhythm.
    IrregularPattern { elapsed_ms: u64, average_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Block(BlockReason),
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}

/// Fixed-capacity ring of the most recent accepted press timestamps.
#[derive(Debug, Clone, Default)]
pub struct PressHistory {
    buf: [u64; HISTORY_LEN],
    head: usize,
    len: usize,
}

impl PressHistory {
    pub fn push(&mut self, timestamp_ms: u64) {
        if self.len < HISTORY_LEN {
            self.buf[(self.head + self.len) % HISTORY_LEN] = timestamp_ms;
            self.len += 1;
        } else {
            self.buf[self.head] = timestamp_ms;
            self.head = (self.head + 1) % HISTORY_LEN;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `n`-th most recent timestamp; `recent(0)` is the latest.
    pub fn recent(&self, n: usize) -> Option<u64> {
        if n >= self.len {
            return None;
        }
        Some(self.buf[(self.head + self.len - 1 - n) % HISTORY_LEN])
    }
}

/// Everything the classifier remembers about one key.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    last_press: Option<u64>,
    last_release: Option<u64>,
    in_repeat_mode: bool,
    blocked_count: u64,
    history: PressHistory,
}

impl KeyState {
    /// Timestamp of the most recent accepted press.
    pub fn last_press(&self) -> Option<u64> {
        self.last_press
    }

    /// Timestamp of the most recent release.
    pub fn last_release(&self) -> Option<u64> {
        self.last_release
    }

    pub fn in_repeat_mode(&self) -> bool {
        self.in_repeat_mode
    }

    fn accept(&mut self, now: u64) {
        self.last_press = Some(now);
        self.history.push(now);
    }

    fn release(&mut self, now: u64) {
        self.last_release = Some(self.last_release.map_or(now, |prev| prev.max(now)));
        // Any release ends the hold, including one produced by a bounce.
        self.in_repeat_mode = false;
    }
}

/// Decision rule for a press on a key that already has an accepted press.
///
/// The [`Classifier`] handles releases, first presses, out-of-order
/// timestamps and bookkeeping; a strategy only judges the press and may
/// adjust the key's repeat mode. `now >= last_press` is guaranteed.
pub trait ChatterStrategy: Send {
    fn name(&self) -> &'static str;

    fn classify_press(&self, key: &mut KeyState, last_press: u64, now: u64) -> Verdict;
}

/// Two-phase thresholds: strict right after a fresh press, lenient once the
/// key has been held long enough for auto-repeat to start.
#[derive(Debug, Clone)]
pub struct ThresholdStrategy {
    pub initial_threshold_ms: u64,
    pub repeat_threshold_ms: u64,
    pub repeat_transition_delay_ms: u64,
    /// `None` disables the release-then-press override.
    pub min_release_duration_ms: Option<u64>,
}

impl ThresholdStrategy {
    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self {
            initial_threshold_ms: config.initial_threshold_ms,
            repeat_threshold_ms: config.repeat_threshold_ms,
            repeat_transition_delay_ms: config.repeat_transition_delay_ms,
            min_release_duration_ms: config
                .intentional_double_tap
                .then_some(config.min_release_duration_ms),
        }
    }

    /// A full release lasting at least the minimum duration means the next
    /// press is a new actuation, not a bounce within the old one.
    fn is_intentional_double_tap(&self, key: &KeyState, last_press: u64, now: u64) -> bool {
        let (Some(min_release), Some(released)) = (self.min_release_duration_ms, key.last_release)
        else {
            return false;
        };
        released > last_press && now.saturating_sub(released) >= min_release
    }
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        Self::from_config(&ThresholdConfig::default())
    }
}

impl ChatterStrategy for ThresholdStrategy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn classify_press(&self, key: &mut KeyState, last_press: u64, now: u64) -> Verdict {
        if self.is_intentional_double_tap(key, last_press, now) {
            key.in_repeat_mode = false;
            return Verdict::Pass;
        }

        let elapsed_ms = now - last_press;
        let in_repeat = key.in_repeat_mode;

        // Mode flips on the gap from the previous accepted press; the
        // current press is still judged by the initial threshold.
        if !in_repeat && elapsed_ms > self.repeat_transition_delay_ms {
            key.in_repeat_mode = true;
        }

        if in_repeat {
            if elapsed_ms < self.repeat_threshold_ms {
                return Verdict::Block(BlockReason::RepeatThreshold {
                    elapsed_ms,
                    threshold_ms: self.repeat_threshold_ms,
                });
            }
        } else if elapsed_ms < self.initial_threshold_ms {
            return Verdict::Block(BlockReason::InitialThreshold {
                elapsed_ms,
                threshold_ms: self.initial_threshold_ms,
            });
        }

        Verdict::Pass
    }
}

/// Flags gaps that are either absurdly short or short and out of step with
/// the key's recent press rhythm.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    pub min_gap_ms: u64,
    pub irregular_gap_ms: u64,
    pub tolerance_ms: u64,
}

impl PatternStrategy {
    pub fn from_config(config: &PatternConfig) -> Self {
        Self {
            min_gap_ms: config.min_gap_ms,
            irregular_gap_ms: config.irregular_gap_ms,
            tolerance_ms: config.tolerance_ms,
        }
    }
}

impl Default for PatternStrategy {
    fn default() -> Self {
        Self::from_config(&PatternConfig::default())
    }
}

impl ChatterStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn classify_press(&self, key: &mut KeyState, last_press: u64, now: u64) -> Verdict {
        let elapsed_ms = now - last_press;
        if elapsed_ms < self.min_gap_ms {
            return Verdict::Block(BlockReason::TooFast {
                elapsed_ms,
                min_gap_ms: self.min_gap_ms,
            });
        }

        if key.history.len() < PATTERN_MIN_HISTORY || elapsed_ms >= self.irregular_gap_ms {
            return Verdict::Pass;
        }

        let (Some(newest), Some(oldest)) = (key.history.recent(0), key.history.recent(2)) else {
            return Verdict::Pass;
        };
        // Average of the last two intervals is (newest - oldest) / 2; compare
        // at double scale to stay in integers without rounding.
        let span = newest.saturating_sub(oldest);
        if (2 * elapsed_ms).abs_diff(span) > 2 * self.tolerance_ms {
            return Verdict::Block(BlockReason::IrregularPattern {
                elapsed_ms,
                average_ms: span / 2,
            });
        }

        Verdict::Pass
    }
}

/// Owns the per-key state table and applies a strategy to each press.
pub struct Classifier {
    strategy: Box<dyn ChatterStrategy>,
    keys: HashMap<KeyCode, KeyState>,
}

impl Classifier {
    pub fn new(strategy: impl ChatterStrategy + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
            keys: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        match config.general.strategy {
            StrategyKind::Threshold => Self::new(ThresholdStrategy::from_config(&config.threshold)),
            StrategyKind::Pattern => Self::new(PatternStrategy::from_config(&config.pattern)),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Returns `true` if the event must be blocked.
    pub fn evaluate(&mut self, code: KeyCode, is_press: bool, timestamp_ms: u64) -> bool {
        self.classify(KeyEvent { code, is_press, timestamp_ms }).is_block()
    }

    pub fn classify(&mut self, event: KeyEvent) -> Verdict {
        let now = event.timestamp_ms;
        let key = self.keys.entry(event.code).or_default();

        if !event.is_press {
            key.release(now);
            return Verdict::Pass;
        }

        let Some(last_press) = key.last_press else {
            key.accept(now);
            return Verdict::Pass;
        };

        // Out-of-order timestamp: treat the gap as zero-length but never
        // block on it, and keep the newer reference point.
        if now < last_press {
            return Verdict::Pass;
        }

        let verdict = self.strategy.classify_press(key, last_press, now);
        match verdict {
            Verdict::Block(_) => key.blocked_count += 1,
            Verdict::Pass => key.accept(now),
        }
        verdict
    }

    pub fn blocked_count(&self, code: KeyCode) -> u64 {
        self.keys.get(&code).map_or(0, |k| k.blocked_count)
    }

    pub fn total_blocked(&self) -> u64 {
        self.keys.values().map(|k| k.blocked_count).sum()
    }

    /// Keys with at least one blocked press, ordered by code.
    pub fn blocked_keys(&self) -> Vec<(KeyCode, u64)> {
        let mut keys: Vec<_> = self
            .keys
            .iter()
            .filter(|(_, k)| k.blocked_count > 0)
            .map(|(code, k)| (*code, k.blocked_count))
            .collect();
        keys.sort_unstable_by_key(|(code, _)| *code);
        keys
    }

    #[cfg(test)]
    fn key(&self, code: KeyCode) -> &KeyState {
        &self.keys[&code]
    }
}
