use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub threshold: ThresholdConfig,
    #[serde(default)]
    pub pattern: PatternConfig,
}

/// Which classification strategy the daemon runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Two-phase initial/repeat thresholds.
    #[default]
    Threshold,
    /// Inter-press interval irregularity detection.
    Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: StrategyKind,
}

impl GeneralConfig {
    fn default_enabled() -> bool { true }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: StrategyKind::Threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum gap between accepted presses before repeat mode is entered.
    #[serde(default = "ThresholdConfig::default_initial")]
    pub initial_threshold_ms: u64,
    /// Minimum gap between accepted presses once in repeat mode.
    #[serde(default = "ThresholdConfig::default_repeat")]
    pub repeat_threshold_ms: u64,
    /// Gap after which the key is considered held and auto-repeating.
    #[serde(default = "ThresholdConfig::default_transition")]
    pub repeat_transition_delay_ms: u64,
    /// Accept any press that follows a full release cycle.
    #[serde(default = "ThresholdConfig::default_double_tap")]
    pub intentional_double_tap: bool,
    /// How long the key must have been up for the double-tap rule to apply.
    #[serde(default = "ThresholdConfig::default_min_release")]
    pub min_release_duration_ms: u64,
}

impl ThresholdConfig {
    fn default_initial() -> u64 { 85 }
    fn default_repeat() -> u64 { 30 }
    fn default_transition() -> u64 { 150 }
    fn default_double_tap() -> bool { true }
    fn default_min_release() -> u64 { 20 }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            initial_threshold_ms: 85,
            repeat_threshold_ms: 30,
            repeat_transition_delay_ms: 150,
            intentional_double_tap: true,
            min_release_duration_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Presses closer than this to the last accepted one are always chatter.
    #[serde(default = "PatternConfig::default_min_gap")]
    pub min_gap_ms: u64,
    /// Gaps under this are checked against the recent rhythm.
    #[serde(default = "PatternConfig::default_irregular_gap")]
    pub irregular_gap_ms: u64,
    /// Allowed deviation from the average recent interval.
    #[serde(default = "PatternConfig::default_tolerance")]
    pub tolerance_ms: u64,
}

impl PatternConfig {
    fn default_min_gap() -> u64 { 20 }
    fn default_irregular_gap() -> u64 { 40 }
    fn default_tolerance() -> u64 { 20 }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_gap_ms: 20,
            irregular_gap_ms: 40,
            tolerance_ms: 20,
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("chatterd")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "parsing config TOML")
    }
}

pub fn socket_path() -> PathBuf {
    // CHATTERD_SOCK env var overrides for testing.
    if let Ok(path) = std::env::var("CHATTERD_SOCK") {
        return PathBuf::from(path);
    }
    PathBuf::from("/run/chatterd/chatterd.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- defaults ---

    #[test]
    fn default_thresholds() {
        let config = Config::default();
        assert_eq!(config.threshold.initial_threshold_ms, 85);
        assert_eq!(config.threshold.repeat_threshold_ms, 30);
        assert_eq!(config.threshold.repeat_transition_delay_ms, 150);
        assert_eq!(config.threshold.min_release_duration_ms, 20);
    }

    #[test]
    fn default_double_tap_is_enabled() {
        assert!(Config::default().threshold.intentional_double_tap);
    }

    #[test]
    fn default_strategy_is_threshold() {
        let config = Config::default();
        assert_eq!(config.general.strategy, StrategyKind::Threshold);
        assert!(config.general.enabled);
    }

    #[test]
    fn default_pattern_floors() {
        let config = Config::default();
        assert_eq!(config.pattern.min_gap_ms, 20);
        assert_eq!(config.pattern.irregular_gap_ms, 40);
        assert_eq!(config.pattern.tolerance_ms, 20);
    }

    // --- TOML parsing ---

    #[test]
    fn parse_empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.threshold.initial_threshold_ms, 85);
        assert_eq!(config.general.strategy, StrategyKind::Threshold);
    }

    #[test]
    fn parse_partial_threshold_section() {
        let toml = r#"
[threshold]
initial_threshold_ms = 50
repeat_threshold_ms = 15
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.threshold.initial_threshold_ms, 50);
        assert_eq!(config.threshold.repeat_threshold_ms, 15);
        // Untouched fields keep their defaults
        assert_eq!(config.threshold.repeat_transition_delay_ms, 150);
        assert!(config.threshold.intentional_double_tap);
    }

    #[test]
    fn parse_pattern_strategy() {
        let toml = r#"
[general]
strategy = "pattern"

[pattern]
tolerance_ms = 10
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.general.strategy, StrategyKind::Pattern);
        assert_eq!(config.pattern.tolerance_ms, 10);
        assert_eq!(config.pattern.min_gap_ms, 20);
    }

    #[test]
    fn parse_unknown_strategy_fails() {
        let toml = r#"
[general]
strategy = "neural"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn load_from_missing_file_fails_with_path() {
        let err = Config::load_from(Path::new("/nonexistent/chatterd.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/chatterd.toml"));
    }

    #[test]
    fn load_from_reads_file() {
        let path = std::env::temp_dir().join(format!("chatterd-test-{}.toml", std::process::id()));
        std::fs::write(&path, "[general]\nenabled = false\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(!config.general.enabled);
    }

    // --- socket path ---

    #[test]
    fn socket_path_ends_with_chatterd_sock() {
        let path = socket_path();
        assert_eq!(path.file_name().unwrap(), "chatterd.sock");
    }
}
