//! Tunable settings for the built-in filters and the dispatcher.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "canny": { "max_threshold": 100, "hysteresis": "full_scan" } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::filters::canny::CannyOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Name given to the worker thread.
    pub worker_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_name: "filter-worker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub canny: CannyOptions,
    pub dispatcher: DispatcherConfig,
}

impl FilterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FilterConfig =
            serde_json::from_str(json).map_err(|e| FilterError::Config(e.to_string()))?;
        config.canny.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| FilterError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&data)
    }
}
