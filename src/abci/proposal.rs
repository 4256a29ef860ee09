// src/abci/proposal.rs
use crate::abci::codec::{decode_injected_tx, decode_vote_extension, encode_injected_tx, InjectedWeightsTx};
use crate::bft::ExtensionValidator;
use crate::config::WeightParams;
use crate::error::{Result, WeightError};
use crate::storage::BlockContext;
use crate::types::{
    BlockIdFlag, ExtendedCommitInfo, ProposalStatus, RequestFinalizeBlock,
    RequestPrepareProposal, RequestProcessProposal, ResponsePreBlock, ResponsePrepareProposal,
    ResponseProcessProposal, Weight, WeightMap,
};
use crate::weights::{check_bounds, WeightStore};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Fold the extensions of a commit into one weight map.
///
/// Only `Commit` votes whose extension decodes, is stamped with
/// `commit_height` and keeps every weight within `[0, max_percentage]`
/// contribute. A signed extension may carry weights Verify would have
/// refused, so the range is checked again here.
///
/// The rule is last-writer-wins in vote order: a later vote's entry for an
/// address replaces any earlier one. It is not
/// stake-weighted, and it depends on the order of `commit.votes`, which is
/// why the proposer ships the commit alongside the result.
pub fn aggregate_vote_extensions(
    commit: &ExtendedCommitInfo,
    commit_height: i64,
    max_percentage: Weight,
) -> WeightMap {
    let mut aggregated = WeightMap::new();

    for vote in &commit.votes {
        let address = &vote.validator.address;
        if vote.block_id_flag != BlockIdFlag::Commit {
            debug!("skipping {:?} vote from {}", vote.block_id_flag, address);
            continue;
        }
        if vote.vote_extension.is_empty() {
            debug!("no vote extension from {}", address);
            continue;
        }

        let ext = match decode_vote_extension(&vote.vote_extension) {
            Ok(ext) => ext,
            Err(e) => {
                warn!("failed to decode vote extension from {}: {}", address, e);
                continue;
            }
        };
        if ext.height != commit_height {
            warn!(
                "vote extension from {} is for height {}, commit is {}",
                address, ext.height, commit_height
            );
            continue;
        }
        if let Err(e) = check_bounds(&ext.weights, max_percentage) {
            warn!("vote extension from {} skipped: {}", address, e);
            continue;
        }

        for (validator, weight) in ext.weights {
            aggregated.insert(validator, weight);
        }
    }

    aggregated
}

/// Prepare, Process and PreBlock callbacks.
#[derive(Clone)]
pub struct ProposalHandler {
    keeper: Arc<dyn WeightStore>,
    validator: Arc<dyn ExtensionValidator>,
    params: WeightParams,
    chain_id: String,
}

impl ProposalHandler {
    pub fn new(
        keeper: Arc<dyn WeightStore>,
        validator: Arc<dyn ExtensionValidator>,
        params: WeightParams,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            keeper,
            validator,
            params,
            chain_id: chain_id.into(),
        }
    }

    /// Build the block proposal. When aggregation is enabled the aggregate is
    /// injected as `txs[0]`, followed by the request's own transactions.
    pub fn prepare_proposal(&self, req: &RequestPrepareProposal) -> Result<ResponsePrepareProposal> {
        info!(
            "Prepare proposal at height {} ({} votes in last commit)",
            req.height,
            req.local_last_commit.votes.len()
        );

        let mut txs = Vec::with_capacity(req.txs.len() + 1);

        if self.params.aggregation_enabled(req.height) {
            let weights = aggregate_vote_extensions(
                &req.local_last_commit,
                req.height - 1,
                self.params.max_percentage,
            );
            for (address, weight) in &weights {
                debug!("aggregated {}: {}", address, weight);
            }

            let injected = InjectedWeightsTx {
                weights,
                extended_commit_info: req.local_last_commit.clone(),
            };
            let bz = encode_injected_tx(&injected).map_err(|e| {
                error!("failed to encode injected vote extension tx: {}", e);
                e
            })?;
            txs.push(bz);
        }

        txs.extend(req.txs.iter().cloned());
        Ok(ResponsePrepareProposal { txs })
    }

    /// Accept or reject a proposed block.
    pub fn process_proposal(&self, req: &RequestProcessProposal) -> ResponseProcessProposal {
        info!(
            "Process proposal at height {} from {}",
            req.height, req.proposer_address
        );

        let status = match self.check_proposal(req) {
            Ok(()) => ProposalStatus::Accept,
            Err(e) => {
                warn!(
                    "rejecting proposal at height {} from {}: {}",
                    req.height, req.proposer_address, e
                );
                ProposalStatus::Reject
            }
        };
        ResponseProcessProposal { status }
    }

    fn check_proposal(&self, req: &RequestProcessProposal) -> Result<()> {
        if !self.params.aggregation_enabled(req.height) || req.txs.is_empty() {
            return Ok(());
        }

        let injected = decode_injected_tx(&req.txs[0])?;
        self.validator.validate_extensions(
            req.height - 1,
            &self.chain_id,
            &injected.extended_commit_info,
        )?;

        check_bounds(&injected.weights, self.params.max_percentage)?;

        let expected = aggregate_vote_extensions(
            &injected.extended_commit_info,
            req.height - 1,
            self.params.max_percentage,
        );
        if expected != injected.weights {
            return Err(WeightError::InvalidWeights(format!(
                "injected weights do not match the attached commit ({} vs {} entries)",
                injected.weights.len(),
                expected.len()
            )));
        }
        Ok(())
    }

    /// Write the agreed weights into the block's state before its transactions
    /// run. Any error here must fail finalization.
    pub fn pre_block(&self, ctx: &mut BlockContext, req: &RequestFinalizeBlock) -> Result<ResponsePreBlock> {
        if !self.params.aggregation_enabled(req.height) || req.txs.is_empty() {
            return Ok(ResponsePreBlock::default());
        }

        let injected = decode_injected_tx(&req.txs[0]).map_err(|e| {
            error!("failed to decode injected vote extension tx: {}", e);
            e
        })?;
        self.keeper.set_many(ctx, &injected.weights)?;

        info!(
            "Applied {} weights at height {}",
            injected.weights.len(),
            req.height
        );
        Ok(ResponsePreBlock {
            weights_applied: injected.weights.len(),
        })
    }
}
