// src/abci/provider.rs
use crate::error::{Result, WeightError};
use crate::types::WeightMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// External data sources feeding the weight computation.
///
/// Every source is keyed by validator address. A source that cannot answer
/// for `height` returns [`WeightError::SignalUnavailable`].
pub trait SignalProvider: Send + Sync {
    /// Percentage uptime over the recent window.
    fn uptime(&self, height: i64) -> Result<WeightMap>;

    /// Percentage of governance proposals the validator voted on.
    fn governance_participation(&self, height: i64) -> Result<WeightMap>;

    /// Contribution activity on the project's main repository.
    fn contribution_activity(&self, height: i64) -> Result<WeightMap>;
}

/// Provider backed by fixed values, typically loaded from a JSON file.
/// A source left as `None` is reported as unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticSignalProvider {
    #[serde(default)]
    pub uptime: Option<WeightMap>,
    #[serde(default)]
    pub governance: Option<WeightMap>,
    #[serde(default)]
    pub contribution: Option<WeightMap>,
}

impl StaticSignalProvider {
    /// All three sources available.
    pub fn new(uptime: WeightMap, governance: WeightMap, contribution: WeightMap) -> Self {
        Self {
            uptime: Some(uptime),
            governance: Some(governance),
            contribution: Some(contribution),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let provider: StaticSignalProvider = serde_json::from_str(&json)?;
        Ok(provider)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

impl SignalProvider for StaticSignalProvider {
    fn uptime(&self, _height: i64) -> Result<WeightMap> {
        self.uptime
            .clone()
            .ok_or(WeightError::SignalUnavailable("uptime"))
    }

    fn governance_participation(&self, _height: i64) -> Result<WeightMap> {
        self.governance
            .clone()
            .ok_or(WeightError::SignalUnavailable("governance"))
    }

    fn contribution_activity(&self, _height: i64) -> Result<WeightMap> {
        self.contribution
            .clone()
            .ok_or(WeightError::SignalUnavailable("contribution"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidatorAddress;
    use tempfile::tempdir;

    #[test]
    fn test_missing_source_is_unavailable() {
        let provider = StaticSignalProvider {
            uptime: Some(WeightMap::new()),
            governance: None,
            contribution: Some(WeightMap::new()),
        };
        assert!(provider.uptime(1).is_ok());
        assert!(matches!(
            provider.governance_participation(1),
            Err(WeightError::SignalUnavailable("governance"))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signals.json");

        let mut uptime = WeightMap::new();
        uptime.insert(ValidatorAddress::from(&b"val1"[..]), 40);
        let provider = StaticSignalProvider::new(uptime.clone(), WeightMap::new(), WeightMap::new());
        provider.save(&path).unwrap();

        let loaded = StaticSignalProvider::load(&path).unwrap();
        assert_eq!(loaded.uptime(7).unwrap(), uptime);
        assert!(loaded.contribution_activity(7).unwrap().is_empty());
    }

    #[test]
    fn test_omitted_fields_default_to_unavailable() {
        let provider: StaticSignalProvider = serde_json::from_str(r#"{"uptime":{}}"#).unwrap();
        assert!(provider.uptime(1).is_ok());
        assert!(provider.contribution_activity(1).is_err());
    }
}
