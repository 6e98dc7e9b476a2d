//! Background traffic tunables

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    pub max_moving: usize,
    pub max_parked: usize,
    /// Cruise speed in pixels per second
    pub speed_px_s: f32,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            max_moving: 10,
            max_parked: 20,
            speed_px_s: 90.0,
        }
    }
}

impl NpcConfig {
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Invalid NPC config, using defaults");
                Self::default()
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "NPC config not readable, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: NpcConfig = serde_json::from_str(r#"{ "max_moving": 4 }"#).unwrap();
        assert_eq!(config.max_moving, 4);
        assert_eq!(config.max_parked, NpcConfig::default().max_parked);
    }
}
