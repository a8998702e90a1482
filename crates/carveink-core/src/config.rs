//! Engine configuration.

use serde::Deserialize;
use thiserror::Error;

/// Default maximum number of undoable gestures.
pub const DEFAULT_MAX_UNDO_HISTORY: usize = 50;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("max_undo_history must be at least 1")]
    EmptyHistory,
}

/// Layout tunables shared by placement, capture and composition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Horizontal margin between a verse rect's edge and its text, on both sides.
    pub horizontal_inset: f64,
    /// Extra room above a verse rect that still belongs to that verse's ink.
    pub top_padding: f64,
    /// Rect/offset changes smaller than this are treated as jitter.
    pub frame_tolerance: f64,
    pub max_undo_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizontal_inset: 4.0,
            top_padding: 8.0,
            frame_tolerance: 0.5,
            max_undo_history: DEFAULT_MAX_UNDO_HISTORY,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a config from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every distance is finite and non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("horizontal_inset", self.horizontal_inset),
            ("top_padding", self.top_padding),
            ("frame_tolerance", self.frame_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue { field, value });
            }
        }
        if self.max_undo_history == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        Ok(())
    }
}
