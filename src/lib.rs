//! Per-block validator weight aggregation over consensus vote extensions.
//!
//! Every validator computes a weight per validator address and attaches it
//! to its precommit as a vote extension. The next proposer folds those
//! extensions into one map and injects it, together with the backing
//! commit, as the first transaction of its block. Peers check the backing
//! votes before accepting, and every node writes the agreed map into its
//! weight store before the block's own transactions run.

pub mod abci;
pub mod bft;
pub mod config;
pub mod crypto;
pub mod error;
pub mod node;
pub mod storage;
pub mod types;
pub mod weights;

pub use error::{Result, WeightError};
pub use types::{ValidatorAddress, Weight, WeightMap};
