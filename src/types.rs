// src/types.rs
//! Core data model and the request/response shapes exchanged with the
//! consensus engine on every height.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Relative voting-power adjustment for one validator.
pub type Weight = i64;

/// Validator address -> weight. Ordered so that encodings are byte-stable.
pub type WeightMap = BTreeMap<ValidatorAddress, Weight>;

/// Opaque validator identifier owned by the validator registry.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatorAddress(Vec<u8>);

impl ValidatorAddress {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create from hex string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(hex)?))
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ValidatorAddress {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ValidatorAddress {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorAddress({})", self.to_hex())
    }
}

// Hex strings keep the address usable as a JSON object key.
impl Serialize for ValidatorAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ValidatorAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ValidatorAddress::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// How a validator's precommit relates to the committed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockIdFlag {
    Unknown,
    Absent,
    Commit,
    Nil,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: ValidatorAddress,
    pub power: i64,
}

/// One validator's vote from the previous height, with its extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedVoteInfo {
    pub validator: Validator,
    #[serde(with = "hex::serde")]
    pub vote_extension: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub extension_signature: Vec<u8>,
    pub block_id_flag: BlockIdFlag,
}

/// The full set of extended votes that committed the previous height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedCommitInfo {
    pub round: i32,
    pub votes: Vec<ExtendedVoteInfo>,
}

#[derive(Debug, Clone)]
pub struct RequestExtendVote {
    pub height: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseExtendVote {
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RequestVerifyVoteExtension {
    pub height: i64,
    pub validator_address: ValidatorAddress,
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone)]
pub struct ResponseVerifyVoteExtension {
    pub status: VerifyStatus,
}

#[derive(Debug, Clone)]
pub struct RequestPrepareProposal {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
    pub local_last_commit: ExtendedCommitInfo,
    pub proposer_address: ValidatorAddress,
}

#[derive(Debug, Clone, Default)]
pub struct ResponsePrepareProposal {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct RequestProcessProposal {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
    pub proposer_address: ValidatorAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone)]
pub struct ResponseProcessProposal {
    pub status: ProposalStatus,
}

#[derive(Debug, Clone)]
pub struct RequestFinalizeBlock {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ResponsePreBlock {
    /// Number of weight entries written to the store.
    pub weights_applied: usize,
}
