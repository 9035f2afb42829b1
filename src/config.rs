//! Top-level runtime configuration.

use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;
use crate::engines::EnginesConfig;
use crate::error::{CrtError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrtConfig {
    pub coordinator: CoordinatorConfig,
    pub engines: EnginesConfig,
    /// How often the performance monitor is consulted.
    pub performance_poll_ms: f64,
}

impl Default for CrtConfig {
    fn default() -> Self {
        CrtConfig {
            coordinator: CoordinatorConfig::default(),
            engines: EnginesConfig::default(),
            performance_poll_ms: 5000.0,
        }
    }
}

impl CrtConfig {
    /// Parse and validate a (possibly partial) JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: CrtConfig =
            serde_json::from_str(text).map_err(|e| CrtError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate().map_err(CrtError::InvalidConfig)?;
        if !(self.performance_poll_ms.is_finite() && self.performance_poll_ms > 0.0) {
            return Err(CrtError::InvalidConfig(format!(
                "performancePollMs must be positive, got {}",
                self.performance_poll_ms
            )));
        }
        Ok(())
    }
}
