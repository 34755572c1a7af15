//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::parser::ParserConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' must be at least 1")]
    Zero(&'static str),
}

/// Limits and startup options of an [`Evaluator`](crate::Evaluator).
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```
/// use mathscript::config::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "max_call_depth": 16 }"#).unwrap();
/// assert_eq!(config.max_call_depth, 16);
/// assert_eq!(config.max_nesting_depth, 64);
/// assert!(config.install_core);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest statement/expression nesting the parser accepts
    pub max_nesting_depth: usize,

    /// Deepest chain of nested function calls. The default fits a 2 MiB
    /// thread stack.
    pub max_call_depth: usize,

    /// Install the core plugin (constants and elementary functions)
    pub install_core: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_nesting_depth: 64,
            max_call_depth: 32,
            install_core: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Zero("max_nesting_depth"));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Zero("max_call_depth"));
        }
        Ok(())
    }

    pub fn parser(&self) -> ParserConfig {
        ParserConfig {
            max_depth: self.max_nesting_depth,
        }
    }
}
