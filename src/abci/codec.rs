// src/abci/codec.rs
//! Wire payloads exchanged between validators.
//!
//! Both payloads are JSON. Weight maps are ordered, so a given logical value
//! always encodes to the same bytes.

use crate::error::Result;
use crate::types::{ExtendedCommitInfo, WeightMap};
use serde::{Deserialize, Serialize};

/// A single validator's weights, bound to the height it was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedVotingPowerVoteExtension {
    pub height: i64,
    pub weights: WeightMap,
}

/// The proposer's aggregate, injected as the first transaction of a block.
/// Carries the extended commit it was derived from so that every validator
/// can check the backing votes and redo the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectedWeightsTx {
    pub weights: WeightMap,
    pub extended_commit_info: ExtendedCommitInfo,
}

pub fn encode_vote_extension(ext: &WeightedVotingPowerVoteExtension) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(ext)?)
}

pub fn decode_vote_extension(bytes: &[u8]) -> Result<WeightedVotingPowerVoteExtension> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_injected_tx(tx: &InjectedWeightsTx) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(tx)?)
}

pub fn decode_injected_tx(bytes: &[u8]) -> Result<InjectedWeightsTx> {
    Ok(serde_json::from_slice(bytes)?)
}
