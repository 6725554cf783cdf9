//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncResult, ValidationError};

/// Limits applied to every request's cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum cascade depth of a dispatched action (the seed action is depth 0).
    pub max_cascade_depth: u32,
    /// Maximum number of actions dispatched by syncs for one request.
    pub max_dispatches: usize,
    /// Maximum candidate frames built for one rule evaluation.
    pub max_frames_per_rule: usize,
    /// Optional wall-clock budget for one request, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 32,
            max_dispatches: 1024,
            max_frames_per_rule: 4096,
            request_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("invalid engine config JSON: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_cascade_depth == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_cascade_depth must be at least 1".to_string(),
            });
        }
        if self.max_dispatches == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_dispatches must be at least 1".to_string(),
            });
        }
        if self.max_frames_per_rule == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_frames_per_rule must be at least 1".to_string(),
            });
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ValidationError::InvalidConfig {
                reason: "request_timeout_ms must be positive when set".to_string(),
            });
        }
        Ok(())
    }

    /// The request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.request_timeout().is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"max_cascade_depth": 4, "request_timeout_ms": 250}"#).unwrap();
        assert_eq!(cfg.max_cascade_depth, 4);
        assert_eq!(cfg.max_dispatches, EngineConfig::default().max_dispatches);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{"max_dispatches": 0}"#).unwrap_err();
        assert!(err.is_validation());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }
}
