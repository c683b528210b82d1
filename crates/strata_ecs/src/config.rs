//! # Engine Configuration
//!
//! Deserialized once at startup from TOML. Every field has a default so
//! an empty config is valid.

use serde::Deserialize;

use crate::error::{EcsError, EcsResult};

/// Sizing knobs consumed when the engine is constructed.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backing-buffer size of the engine heap, in bytes. The heap never
    /// grows implicitly; size this for the expected workload.
    pub heap_bytes: usize,
    /// Expected entity count, used to pre-size bookkeeping maps.
    pub entity_capacity_hint: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heap_bytes: 4 * 1024 * 1024,
            entity_capacity_hint: 1024,
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(input: &str) -> EcsResult<Self> {
        toml::from_str(input).map_err(|e| EcsError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.heap_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_parse_overrides() {
        let config = EngineConfig::from_toml_str("heap_bytes = 65536").unwrap();
        assert_eq!(config.heap_bytes, 65536);
        assert_eq!(config.entity_capacity_hint, 1024);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let err = EngineConfig::from_toml_str("heap_bytes = \"lots\"").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }
}
