//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tunables for an [`Engine`](crate::Engine).
///
/// ```rust,ignore
/// let config = EngineConfig::from_json(r#"{ "flush_limit": 10000 }"#)?;
/// let engine = Engine::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of executions in a single flush. `None` leaves only the
    /// built-in bound of one execution per instance.
    pub flush_limit: Option<usize>,

    /// Maximum number of turns [`Engine::run_until_idle`](crate::Engine::run_until_idle)
    /// runs before giving control back.
    pub turn_limit: usize,
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_limit: None,
            turn_limit: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn parses_fields() {
        let config = EngineConfig::from_json(r#"{ "flush_limit": 8, "turn_limit": 3 }"#).unwrap();
        assert_eq!(config.flush_limit, Some(8));
        assert_eq!(config.turn_limit, 3);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = EngineConfig::from_json(r#"{ "threads": 4 }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
