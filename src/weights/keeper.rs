// src/weights/keeper.rs
use crate::error::{Result, WeightError};
use crate::storage::BlockContext;
use crate::types::{ValidatorAddress, WeightMap};

/// Key prefix for persisted weights: `weights:<hex address>`
const WEIGHTS_PREFIX: &[u8] = b"weights:";

/// Durable validator -> weight mapping.
///
/// Reads and writes go through the caller's [`BlockContext`]; consistency
/// is whatever that context's commit/discard gives.
pub trait WeightStore: Send + Sync {
    fn get_all(&self, ctx: &BlockContext) -> Result<WeightMap>;
    fn set_many(&self, ctx: &mut BlockContext, weights: &WeightMap) -> Result<()>;
}

/// RocksDB-backed weight store.
#[derive(Clone, Debug, Default)]
pub struct WeightsKeeper;

impl WeightsKeeper {
    pub fn new() -> Self {
        Self
    }

    fn weight_key(address: &ValidatorAddress) -> Vec<u8> {
        let mut key = WEIGHTS_PREFIX.to_vec();
        key.extend_from_slice(address.to_hex().as_bytes());
        key
    }

    fn address_from_key(key: &[u8]) -> Result<ValidatorAddress> {
        let hex_part = std::str::from_utf8(&key[WEIGHTS_PREFIX.len()..])
            .map_err(|e| WeightError::Db(format!("corrupt weight key: {}", e)))?;
        ValidatorAddress::from_hex(hex_part)
            .map_err(|e| WeightError::Db(format!("corrupt weight key {}: {}", hex_part, e)))
    }
}

impl WeightStore for WeightsKeeper {
    fn get_all(&self, ctx: &BlockContext) -> Result<WeightMap> {
        let mut weights = WeightMap::new();
        for (k, v) in ctx.iter_prefix(WEIGHTS_PREFIX)? {
            let address = Self::address_from_key(&k)?;
            let weight: i64 = serde_json::from_slice(&v)?;
            weights.insert(address, weight);
        }
        Ok(weights)
    }

    fn set_many(&self, ctx: &mut BlockContext, weights: &WeightMap) -> Result<()> {
        for (address, weight) in weights {
            ctx.put_json(Self::weight_key(address), weight)?;
        }
        Ok(())
    }
}
