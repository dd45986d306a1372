//! Engine configuration: TOML file, then CLI overrides

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::RemoteMode;
use crate::types::EngineError;
use crate::{
    CONFIDENCE_FLOOR, DEFAULT_CONFIRM_FRAMES, DEFAULT_IN_FLIGHT_CAP, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_TICK_INTERVAL_MS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub confidence_floor: f64,
    pub tick_interval_ms: u64,
    pub in_flight_cap: usize,
    pub request_timeout_ms: u64,
    /// Base URL of the remote scorer, e.g. `http://127.0.0.1:8000`
    pub scorer_url: Option<String>,
    pub remote_mode: RemoteMode,
    /// Debounce window when remote IN/OUT states drive the hysteresis machine
    pub remote_confirm_frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: CONFIDENCE_FLOOR,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            in_flight_cap: DEFAULT_IN_FLIGHT_CAP,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            scorer_url: None,
            remote_mode: RemoteMode::Relay,
            remote_confirm_frames: DEFAULT_CONFIRM_FRAMES,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(self) -> Result<Self, EngineError> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(EngineError::Config(format!(
                "confidence_floor must be within [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(EngineError::Config("tick_interval_ms must be > 0".to_string()));
        }
        if self.in_flight_cap == 0 {
            return Err(EngineError::Config("in_flight_cap must be >= 1".to_string()));
        }
        if self.remote_confirm_frames == 0 {
            return Err(EngineError::Config("remote_confirm_frames must be >= 1".to_string()));
        }
        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.in_flight_cap, 2);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            "tick_interval_ms = 100\nscorer_url = \"http://localhost:8000\"\nremote_mode = \"hysteresis\"\n",
        )
        .unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.scorer_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.remote_mode, RemoteMode::Hysteresis);
    }

    #[test]
    fn test_rejects_zero_cap_and_unknown_keys() {
        assert!(EngineConfig::from_toml_str("in_flight_cap = 0").is_err());
        assert!(EngineConfig::from_toml_str("tick_ms = 5").is_err());
        assert!(EngineConfig::from_toml_str("confidence_floor = 1.5").is_err());
    }
}
