// src/node.rs
//! Single-validator wiring and an in-process network that drives the
//! per-height callback sequence the consensus engine would run:
//! prepare -> process -> extend/verify -> finalize (pre-block + commit).

use crate::abci::{ProposalHandler, SignalProvider, StaticSignalProvider, VoteExtHandler};
use crate::bft::{has_quorum, ExtensionValidator, ValidatorRegistry};
use crate::config::WeightParams;
use crate::crypto::{address_from_pubkey, extension_sign_bytes, public_from_seed, sign_bytes};
use crate::error::{Result, WeightError};
use crate::storage::{BlockContext, RocksDb};
use crate::types::{
    BlockIdFlag, ExtendedCommitInfo, ExtendedVoteInfo, ProposalStatus, RequestExtendVote,
    RequestFinalizeBlock, RequestPrepareProposal, RequestProcessProposal,
    RequestVerifyVoteExtension, ResponsePreBlock, ResponseProcessProposal, ValidatorAddress,
    Validator, VerifyStatus, WeightMap,
};
use crate::weights::{WeightStore, WeightsKeeper};
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// One validator: signing key, its own database and both handler sets.
pub struct ValidatorNode {
    address: ValidatorAddress,
    pubkey: Vec<u8>,
    seed: [u8; 32],
    db: RocksDb,
    chain_id: String,
    keeper: Arc<dyn WeightStore>,
    vote_ext: VoteExtHandler,
    proposal: ProposalHandler,
}

impl ValidatorNode {
    pub fn new(
        seed: [u8; 32],
        db: RocksDb,
        chain_id: &str,
        params: WeightParams,
        provider: Arc<dyn SignalProvider>,
        validator: Arc<dyn ExtensionValidator>,
    ) -> Result<Self> {
        Self::with_store(
            seed,
            db,
            chain_id,
            params,
            provider,
            validator,
            Arc::new(WeightsKeeper::new()),
        )
    }

    /// Like [`ValidatorNode::new`] with a caller-supplied weight store.
    pub fn with_store(
        seed: [u8; 32],
        db: RocksDb,
        chain_id: &str,
        params: WeightParams,
        provider: Arc<dyn SignalProvider>,
        validator: Arc<dyn ExtensionValidator>,
        keeper: Arc<dyn WeightStore>,
    ) -> Result<Self> {
        let pubkey = public_from_seed(&seed)
            .ok_or_else(|| WeightError::Config("invalid validator seed".into()))?;
        let address = address_from_pubkey(&pubkey);

        Ok(Self {
            address,
            pubkey,
            seed,
            db,
            chain_id: chain_id.to_string(),
            vote_ext: VoteExtHandler::new(keeper.clone(), provider, params),
            proposal: ProposalHandler::new(keeper.clone(), validator, params, chain_id),
            keeper,
        })
    }

    pub fn address(&self) -> &ValidatorAddress {
        &self.address
    }

    pub fn pubkey(&self) -> &[u8] {
        &self.pubkey
    }

    /// Read-only view of the committed state.
    fn committed_view(&self, height: i64) -> BlockContext {
        BlockContext::new(self.db.clone(), height, self.chain_id.clone())
    }

    /// Committed weights.
    pub fn weights(&self) -> Result<WeightMap> {
        self.keeper.get_all(&self.committed_view(0))
    }

    /// Build this node's precommit for `height`, extended and signed.
    pub fn extend_vote(&self, height: i64, round: i32, power: i64) -> Result<ExtendedVoteInfo> {
        let ctx = self.committed_view(height);
        let ext = self
            .vote_ext
            .extend_vote(&ctx, &RequestExtendVote { height })
            .vote_extension;
        let msg = extension_sign_bytes(&self.chain_id, height, round, &ext);
        let sig = sign_bytes(&self.seed, &msg)
            .ok_or_else(|| WeightError::Config("invalid validator seed".into()))?;

        Ok(ExtendedVoteInfo {
            validator: Validator {
                address: self.address.clone(),
                power,
            },
            vote_extension: ext,
            extension_signature: sig,
            block_id_flag: BlockIdFlag::Commit,
        })
    }

    pub fn verify_vote_extension(&self, height: i64, vote: &ExtendedVoteInfo) -> VerifyStatus {
        self.vote_ext
            .verify_vote_extension(&RequestVerifyVoteExtension {
                height,
                validator_address: vote.validator.address.clone(),
                vote_extension: vote.vote_extension.clone(),
            })
            .status
    }

    pub fn prepare_proposal(
        &self,
        height: i64,
        txs: Vec<Vec<u8>>,
        last_commit: &ExtendedCommitInfo,
    ) -> Result<Vec<Vec<u8>>> {
        let res = self.proposal.prepare_proposal(&RequestPrepareProposal {
            height,
            txs,
            local_last_commit: last_commit.clone(),
            proposer_address: self.address.clone(),
        })?;
        Ok(res.txs)
    }

    pub fn process_proposal(
        &self,
        height: i64,
        txs: &[Vec<u8>],
        proposer: &ValidatorAddress,
    ) -> ResponseProcessProposal {
        self.proposal.process_proposal(&RequestProcessProposal {
            height,
            txs: txs.to_vec(),
            proposer_address: proposer.clone(),
        })
    }

    /// Run the pre-block step in a fresh block context without committing.
    /// Dropping the returned context discards the block's writes.
    pub fn stage_block(&self, height: i64, txs: &[Vec<u8>]) -> Result<(BlockContext, ResponsePreBlock)> {
        let mut ctx = BlockContext::new(self.db.clone(), height, self.chain_id.clone());
        let res = self.proposal.pre_block(
            &mut ctx,
            &RequestFinalizeBlock {
                height,
                txs: txs.to_vec(),
            },
        )?;
        Ok((ctx, res))
    }

    /// Stage the block and commit it.
    /// On error nothing from this block reaches disk.
    pub fn finalize_block(&self, height: i64, txs: &[Vec<u8>]) -> Result<ResponsePreBlock> {
        let (ctx, res) = self.stage_block(height, txs)?;
        ctx.commit()?;
        Ok(res)
    }
}

/// Deterministic 32-byte seed for the `index`-th validator of a chain.
pub fn derive_seed(chain_id: &str, index: usize) -> [u8; 32] {
    let digest = Sha256::digest(format!("{}/validator/{}", chain_id, index).as_bytes());
    digest.into()
}

/// Signal values a node at position `observer` would report for `validators`.
/// Observers see slightly different uptimes, as real monitors would.
pub fn demo_signals(validators: &[ValidatorAddress], observer: usize) -> StaticSignalProvider {
    let mut uptime = WeightMap::new();
    let mut governance = WeightMap::new();
    let mut contribution = WeightMap::new();
    for (i, address) in validators.iter().enumerate() {
        uptime.insert(address.clone(), 90 + ((i + observer) % 10) as i64);
        governance.insert(address.clone(), 10 * (i % 5) as i64);
        contribution.insert(address.clone(), 3 * i as i64);
    }
    StaticSignalProvider::new(uptime, governance, contribution)
}

/// Result of one committed height.
#[derive(Debug, Clone)]
pub struct HeightOutcome {
    pub height: i64,
    pub round: i32,
    pub proposer: ValidatorAddress,
    pub weights_applied: usize,
    pub extensions_included: usize,
}

/// In-process network of validators sharing one validator set.
pub struct LocalNet {
    nodes: Vec<ValidatorNode>,
    registry: ValidatorRegistry,
    height: i64,
    last_commit: ExtendedCommitInfo,
}

impl LocalNet {
    pub fn new(nodes: Vec<ValidatorNode>, registry: ValidatorRegistry) -> Self {
        Self {
            nodes,
            registry,
            height: 0,
            last_commit: ExtendedCommitInfo::default(),
        }
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn nodes(&self) -> &[ValidatorNode] {
        &self.nodes
    }

    fn power_of(&self, address: &ValidatorAddress) -> i64 {
        self.registry.get(address).map(|i| i.power).unwrap_or(0)
    }

    /// Drive the next height to commit, rotating proposers across rounds
    /// until one proposal gathers more than 2/3 of the power.
    pub fn run_height(&mut self, txs: Vec<Vec<u8>>) -> Result<HeightOutcome> {
        let height = self.height + 1;
        let n = self.nodes.len();
        if n == 0 {
            return Err(WeightError::Config("no validators".into()));
        }
        let total = self.registry.total_power();

        for round in 0..n as i32 {
            let proposer = &self.nodes[(height as usize + round as usize) % n];
            let block = proposer.prepare_proposal(height, txs.clone(), &self.last_commit)?;

            let accepted: i64 = self
                .nodes
                .iter()
                .filter(|node| {
                    node.process_proposal(height, &block, proposer.address()).status
                        == ProposalStatus::Accept
                })
                .map(|node| self.power_of(node.address()))
                .sum();
            if !has_quorum(accepted, total) {
                warn!(
                    "height {} round {}: proposal from {} not accepted",
                    height,
                    round,
                    proposer.address()
                );
                continue;
            }

            let next_proposer = &self.nodes[(height as usize + 1) % n];
            let commit = self.collect_commit(height, round, next_proposer)?;
            let extensions_included = commit
                .votes
                .iter()
                .filter(|v| !v.vote_extension.is_empty())
                .count();

            // Every replica must apply the block before any of them commits,
            // so a failing node leaves all stores at the previous height.
            let mut staged = Vec::with_capacity(n);
            for node in &self.nodes {
                staged.push(node.stage_block(height, &block)?);
            }
            let mut weights_applied = 0;
            for (ctx, res) in staged {
                ctx.commit()?;
                weights_applied = res.weights_applied;
            }

            info!(
                "Committed height {} (round {}, proposer {}, {} weights applied)",
                height,
                round,
                proposer.address(),
                weights_applied
            );

            let outcome = HeightOutcome {
                height,
                round,
                proposer: proposer.address().clone(),
                weights_applied,
                extensions_included,
            };
            self.height = height;
            self.last_commit = commit;
            return Ok(outcome);
        }

        Err(WeightError::InvalidExtensions(format!(
            "no proposal accepted at height {}",
            height
        )))
    }

    /// Precommits for `height` as received by `receiver`. Votes whose
    /// extension the receiver rejects are dropped, as the engine would.
    fn collect_commit(
        &self,
        height: i64,
        round: i32,
        receiver: &ValidatorNode,
    ) -> Result<ExtendedCommitInfo> {
        let mut votes = Vec::with_capacity(self.nodes.len());
        for (address, power) in self.registry.get_validators_by_power() {
            let Some(node) = self.nodes.iter().find(|n| n.address() == &address) else {
                continue;
            };
            let vote = node.extend_vote(height, round, power)?;
            if receiver.verify_vote_extension(height, &vote) == VerifyStatus::Accept {
                votes.push(vote);
            } else {
                votes.push(ExtendedVoteInfo {
                    validator: vote.validator,
                    vote_extension: Vec::new(),
                    extension_signature: Vec::new(),
                    block_id_flag: BlockIdFlag::Absent,
                });
            }
        }
        Ok(ExtendedCommitInfo { round, votes })
    }
}
