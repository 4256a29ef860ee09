// src/config.rs
// Node configuration: file-backed, env-overridable, validated at startup

use crate::error::{Result, WeightError};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Protocol parameters shared by every callback.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightParams {
    /// Ceiling of the scaled weight range.
    pub max_percentage: i64,
    /// First height whose votes carry extensions; 0 disables the protocol.
    pub vote_extensions_enable_height: i64,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self {
            max_percentage: 100,
            vote_extensions_enable_height: 1,
        }
    }
}

impl WeightParams {
    pub fn vote_extensions_enabled(&self, height: i64) -> bool {
        self.vote_extensions_enable_height > 0 && height >= self.vote_extensions_enable_height
    }

    /// The commit handed to a proposer at `height` is the commit of
    /// `height - 1`, so it only carries extensions from the height after
    /// enablement onward.
    pub fn aggregation_enabled(&self, height: i64) -> bool {
        self.vote_extensions_enabled(height - 1)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NodeConfig {
    pub chain_id: String,
    pub storage: StorageConfig,
    #[serde(default)]
    pub params: WeightParams,
    /// JSON file with static signal values, see `StaticSignalProvider`.
    #[serde(default)]
    pub signals_path: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "weight-shift".to_string(),
            storage: StorageConfig {
                db_path: "weights_data".to_string(),
            },
            params: WeightParams::default(),
            signals_path: None,
        }
    }
}

impl NodeConfig {
    /// Load from `path` (defaults when the file does not exist), then apply
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let json = fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            info!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        dotenvy::dotenv().ok();
        if let Ok(chain_id) = env::var("WEIGHTS_CHAIN_ID") {
            self.chain_id = chain_id;
        }
        if let Ok(path) = env::var("WEIGHTS_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Ok(v) = env::var("WEIGHTS_MAX_PERCENTAGE") {
            self.params.max_percentage = v
                .parse()
                .map_err(|e| WeightError::Config(format!("WEIGHTS_MAX_PERCENTAGE: {}", e)))?;
        }
        if let Ok(v) = env::var("WEIGHTS_ENABLE_HEIGHT") {
            self.params.vote_extensions_enable_height = v
                .parse()
                .map_err(|e| WeightError::Config(format!("WEIGHTS_ENABLE_HEIGHT: {}", e)))?;
        }
        Ok(())
    }

    /// Database path, resolved against `home` when relative.
    pub fn db_path(&self, home: &Path) -> PathBuf {
        let p = PathBuf::from(&self.storage.db_path);
        if p.is_absolute() {
            p
        } else {
            home.join(p)
        }
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if self.chain_id.trim().is_empty() {
            validation.add_error("chain_id must not be empty".into());
        }
        if self.params.max_percentage <= 0 {
            validation.add_error(format!(
                "max_percentage must be positive (got {})",
                self.params.max_percentage
            ));
        }
        if self.params.vote_extensions_enable_height < 0 {
            validation.add_error(format!(
                "vote_extensions_enable_height must not be negative (got {})",
                self.params.vote_extensions_enable_height
            ));
        } else if self.params.vote_extensions_enable_height == 0 {
            validation.add_warning(
                "vote_extensions_enable_height is 0: weight aggregation is disabled".into(),
            );
        }
        if let Some(path) = &self.signals_path {
            if !Path::new(path).exists() {
                validation.add_error(format!("signals file '{}' does not exist", path));
            }
        }

        validation
    }
}

/// Default node home: `$HOME/.weight_shift`
pub fn default_home() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".weight_shift")
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.json")
}

/// Validation result for configuration checks
pub struct ConfigValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn new() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn print_summary(&self) {
        for w in &self.warnings {
            warn!("config: {}", w);
        }
        for e in &self.errors {
            error!("config: {}", e);
        }
        if self.valid && self.warnings.is_empty() {
            info!("Configuration validation passed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_enable_height_windows() {
        let params = WeightParams {
            max_percentage: 100,
            vote_extensions_enable_height: 5,
        };
        assert!(!params.vote_extensions_enabled(4));
        assert!(params.vote_extensions_enabled(5));
        assert!(!params.aggregation_enabled(5));
        assert!(params.aggregation_enabled(6));

        let disabled = WeightParams {
            max_percentage: 100,
            vote_extensions_enable_height: 0,
        };
        assert!(!disabled.vote_extensions_enabled(1_000));
        assert!(!disabled.aggregation_enabled(1_000));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = config_path(dir.path());

        let mut config = NodeConfig::default();
        config.chain_id = "saved-chain".into();
        config.params.max_percentage = 55;
        config.save(&path).unwrap();

        let file: NodeConfig =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(file.chain_id, "saved-chain");
        assert_eq!(file.params.max_percentage, 55);
    }

    #[test]
    fn test_params_default_when_omitted() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"chain_id":"c","storage":{"db_path":"d"}}"#).unwrap();
        assert_eq!(config.params, WeightParams::default());
        assert!(config.signals_path.is_none());
    }

    #[test]
    fn test_validation() {
        assert!(NodeConfig::default().validate().valid);

        let mut bad = NodeConfig::default();
        bad.params.max_percentage = 0;
        bad.chain_id = " ".into();
        let v = bad.validate();
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 2);

        let mut off = NodeConfig::default();
        off.params.vote_extensions_enable_height = 0;
        let v = off.validate();
        assert!(v.valid);
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn test_relative_db_path_resolves_under_home() {
        let config = NodeConfig::default();
        let home = Path::new("/srv/node");
        assert_eq!(config.db_path(home), PathBuf::from("/srv/node/weights_data"));
    }
}
