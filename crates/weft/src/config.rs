use serde::{Deserialize, Serialize};
use std::path::Path;
use weft_core::ToolConfig;

use crate::gepa::OptimizerConfig;
use crate::providers::ProviderSettings;
use crate::recorder::RecorderConfig;

/// Weft configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,

    pub provider: ProviderSettings,

    pub tools: ToolConfig,

    pub optimizer: OptimizerConfig,

    /// Run recording (disabled by default)
    pub recorder: RecorderConfig,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            provider: ProviderSettings::default(),
            tools: ToolConfig::default(),
            optimizer: OptimizerConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl WeftConfig {
    /// Load from configuration file: TOML for `.toml`, JSON otherwise
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut config: Self = if is_toml {
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?
        };

        config.provider.apply_env();
        config.tools.validate()?;
        config.optimizer.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WeftConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.optimizer.max_eval_calls, 200);
        assert_eq!(config.tools.max_iterations, 5);
        assert!(!config.recorder.enabled);
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n\n[optimizer]\nmax_eval_calls = 12\nbatch_size = 3\n\n[recorder]\nenabled = true\ndb_path = \"runs/db.sqlite\""
        )
        .unwrap();
        let config = WeftConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.optimizer.max_eval_calls, 12);
        assert_eq!(config.optimizer.batch_size, 3);
        assert_eq!(config.optimizer.frontier_size, 10);
        assert!(config.recorder.enabled);
    }

    #[test]
    fn test_load_json_rejects_invalid_optimizer() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"optimizer": {{"batch_size": 0}}}}"#).unwrap();
        assert!(WeftConfig::load_from_file(file.path()).is_err());
    }
}
