// src/bft/validator_registry.rs
use crate::crypto::{extension_sign_bytes, verify_bytes};
use crate::error::{Result, WeightError};
use crate::types::{BlockIdFlag, ExtendedCommitInfo, ValidatorAddress};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Checks that a commit's extensions are backed by a quorum of valid,
/// correctly-signed votes for the claimed height.
pub trait ExtensionValidator: Send + Sync {
    fn validate_extensions(
        &self,
        height: i64,
        chain_id: &str,
        commit_info: &ExtendedCommitInfo,
    ) -> Result<()>;
}

/// Validator info with voting power
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub pubkey: Vec<u8>,
    pub power: i64,
}

/// `committed` is strictly more than two thirds of `total`.
pub fn has_quorum(committed: i64, total: i64) -> bool {
    total > 0 && (committed as i128) * 3 > (total as i128) * 2
}

/// Thread-safe registry of the active validator set
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    inner: Arc<RwLock<HashMap<ValidatorAddress, ValidatorInfo>>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a validator.
    pub fn register(&self, address: ValidatorAddress, pubkey: Vec<u8>, power: i64) {
        self.inner
            .write()
            .insert(address, ValidatorInfo { pubkey, power });
    }

    pub fn get(&self, address: &ValidatorAddress) -> Option<ValidatorInfo> {
        self.inner.read().get(address).cloned()
    }

    /// All validators sorted by power (descending), ties by address
    pub fn get_validators_by_power(&self) -> Vec<(ValidatorAddress, i64)> {
        let mut validators: Vec<_> = self
            .inner
            .read()
            .iter()
            .map(|(a, info)| (a.clone(), info.power))
            .collect();
        validators.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        validators
    }

    pub fn total_power(&self) -> i64 {
        self.inner
            .read()
            .values()
            .fold(0i64, |acc, info| acc.saturating_add(info.power))
    }
}

impl ExtensionValidator for ValidatorRegistry {
    fn validate_extensions(
        &self,
        height: i64,
        chain_id: &str,
        commit_info: &ExtendedCommitInfo,
    ) -> Result<()> {
        let validators = self.inner.read();
        let total = validators
            .values()
            .fold(0i64, |acc, info| acc.saturating_add(info.power));
        if total <= 0 {
            return Err(WeightError::InvalidExtensions("empty validator set".into()));
        }

        let mut seen = HashSet::new();
        let mut committed: i64 = 0;

        for vote in &commit_info.votes {
            let address = &vote.validator.address;
            if !seen.insert(address.clone()) {
                return Err(WeightError::InvalidExtensions(format!(
                    "duplicate vote from {}",
                    address
                )));
            }

            if vote.block_id_flag != BlockIdFlag::Commit {
                if !vote.vote_extension.is_empty() || !vote.extension_signature.is_empty() {
                    return Err(WeightError::InvalidExtensions(format!(
                        "non-commit vote from {} carries an extension",
                        address
                    )));
                }
                continue;
            }

            let info = validators.get(address).ok_or_else(|| {
                WeightError::InvalidExtensions(format!("unknown validator {}", address))
            })?;
            if info.power != vote.validator.power {
                return Err(WeightError::InvalidExtensions(format!(
                    "validator {} claims power {}, registry has {}",
                    address, vote.validator.power, info.power
                )));
            }

            let sign_bytes =
                extension_sign_bytes(chain_id, height, commit_info.round, &vote.vote_extension);
            if !verify_bytes(&info.pubkey, &sign_bytes, &vote.extension_signature) {
                return Err(WeightError::InvalidExtensions(format!(
                    "bad extension signature from {} at height {}",
                    address, height
                )));
            }

            committed = committed.saturating_add(info.power);
        }

        if !has_quorum(committed, total) {
            return Err(WeightError::InvalidExtensions(format!(
                "insufficient voting power: {} of {} committed",
                committed, total
            )));
        }
        Ok(())
    }
}
