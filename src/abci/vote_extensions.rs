// src/abci/vote_extensions.rs
use crate::abci::codec::{decode_vote_extension, encode_vote_extension, WeightedVotingPowerVoteExtension};
use crate::abci::provider::SignalProvider;
use crate::config::WeightParams;
use crate::error::{Result, WeightError};
use crate::storage::BlockContext;
use crate::types::{
    RequestExtendVote, RequestVerifyVoteExtension, ResponseExtendVote,
    ResponseVerifyVoteExtension, VerifyStatus, WeightMap,
};
use crate::weights::{check_bounds, compute_weights, Signals, WeightStore};
use log::{debug, info, warn};
use std::sync::Arc;

/// Extend and Verify callbacks.
///
/// Holds no per-height state: everything a call needs arrives in its request
/// and block context, so heights can be processed independently.
#[derive(Clone)]
pub struct VoteExtHandler {
    keeper: Arc<dyn WeightStore>,
    provider: Arc<dyn SignalProvider>,
    params: WeightParams,
}

impl VoteExtHandler {
    pub fn new(
        keeper: Arc<dyn WeightStore>,
        provider: Arc<dyn SignalProvider>,
        params: WeightParams,
    ) -> Self {
        Self {
            keeper,
            provider,
            params,
        }
    }

    pub fn params(&self) -> &WeightParams {
        &self.params
    }

    /// Produce this validator's weights for `req.height`.
    ///
    /// Any failure yields an empty extension: the vote still counts for
    /// consensus, only this node's weight contribution is missing.
    pub fn extend_vote(&self, ctx: &BlockContext, req: &RequestExtendVote) -> ResponseExtendVote {
        info!("Extending vote at height {}", req.height);

        if !self.params.vote_extensions_enabled(req.height) {
            debug!("vote extensions not enabled at height {}", req.height);
            return ResponseExtendVote::default();
        }

        match self.build_extension(ctx, req.height) {
            Ok(vote_extension) => ResponseExtendVote { vote_extension },
            Err(e) => {
                warn!(
                    "no vote extension at height {}: {}",
                    req.height, e
                );
                ResponseExtendVote::default()
            }
        }
    }

    fn build_extension(&self, ctx: &BlockContext, height: i64) -> Result<Vec<u8>> {
        let current = self.keeper.get_all(ctx)?;
        let signals = Signals::collect(self.provider.as_ref(), height)?;
        let weights = compute_weights(&current, &signals, self.params.max_percentage)?;

        let ext = WeightedVotingPowerVoteExtension { height, weights };
        encode_vote_extension(&ext)
    }

    /// Decide whether a peer's extension may count toward quorum.
    /// Read-only, so the engine may call it concurrently for many peers.
    pub fn verify_vote_extension(&self, req: &RequestVerifyVoteExtension) -> ResponseVerifyVoteExtension {
        info!(
            "Verifying vote extension from {} at height {}",
            req.validator_address, req.height
        );

        let status = match self.check_extension(req) {
            Ok(()) => VerifyStatus::Accept,
            Err(e) => {
                warn!(
                    "rejecting vote extension from {} at height {}: {}",
                    req.validator_address, req.height, e
                );
                VerifyStatus::Reject
            }
        };
        ResponseVerifyVoteExtension { status }
    }

    fn check_extension(&self, req: &RequestVerifyVoteExtension) -> Result<()> {
        if !self.params.vote_extensions_enabled(req.height) || req.vote_extension.is_empty() {
            // nothing to check; an empty extension is a degraded extend
            return Ok(());
        }

        let ext = decode_vote_extension(&req.vote_extension)?;
        if ext.height != req.height {
            return Err(WeightError::InvalidExtensions(format!(
                "extension stamped for height {}, expected {}",
                ext.height, req.height
            )));
        }
        self.verify_weights(&ext.weights)
    }

    /// Semantic check on a peer's weights: every entry within
    /// `[0, max_percentage]`.
    pub fn verify_weights(&self, weights: &WeightMap) -> Result<()> {
        check_bounds(weights, self.params.max_percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abci::provider::StaticSignalProvider;
    use crate::storage::try_open_db;
    use crate::types::ValidatorAddress;
    use crate::weights::WeightsKeeper;
    use tempfile::tempdir;

    struct UnreadableStore;

    impl WeightStore for UnreadableStore {
        fn get_all(&self, _: &BlockContext) -> Result<WeightMap> {
            Err(WeightError::Db("read failed".into()))
        }
        fn set_many(&self, _: &mut BlockContext, _: &WeightMap) -> Result<()> {
            Ok(())
        }
    }

    fn addr(s: &str) -> ValidatorAddress {
        ValidatorAddress::from(s.as_bytes())
    }

    fn params() -> WeightParams {
        WeightParams {
            max_percentage: 100,
            vote_extensions_enable_height: 1,
        }
    }

    fn handler(provider: StaticSignalProvider) -> VoteExtHandler {
        VoteExtHandler::new(Arc::new(WeightsKeeper::new()), Arc::new(provider), params())
    }

    fn provider() -> StaticSignalProvider {
        let uptime: WeightMap = [(addr("a"), 10), (addr("b"), 20)].into_iter().collect();
        StaticSignalProvider::new(uptime, WeightMap::new(), WeightMap::new())
    }

    fn encoded(height: i64, weights: &[(&str, i64)]) -> Vec<u8> {
        encode_vote_extension(&WeightedVotingPowerVoteExtension {
            height,
            weights: weights.iter().map(|(a, w)| (addr(a), *w)).collect(),
        })
        .unwrap()
    }

    fn verify_req(height: i64, vote_extension: Vec<u8>) -> RequestVerifyVoteExtension {
        RequestVerifyVoteExtension {
            height,
            validator_address: addr("peer"),
            vote_extension,
        }
    }

    #[test]
    fn test_extend_stamps_height_and_scales() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();
        let ctx = BlockContext::new(db, 10, "test-chain");

        let res = handler(provider()).extend_vote(&ctx, &RequestExtendVote { height: 10 });
        let ext = decode_vote_extension(&res.vote_extension).unwrap();
        assert_eq!(ext.height, 10);
        assert_eq!(ext.weights.get(&addr("a")), Some(&50));
        assert_eq!(ext.weights.get(&addr("b")), Some(&100));
    }

    #[test]
    fn test_extend_degrades_when_signal_missing() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();
        let ctx = BlockContext::new(db, 10, "test-chain");

        let mut p = provider();
        p.contribution = None;
        let res = handler(p).extend_vote(&ctx, &RequestExtendVote { height: 10 });
        assert!(res.vote_extension.is_empty());
    }

    #[test]
    fn test_extend_degrades_when_store_read_fails() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();
        let ctx = BlockContext::new(db, 10, "test-chain");

        let h = VoteExtHandler::new(Arc::new(UnreadableStore), Arc::new(provider()), params());
        let res = h.extend_vote(&ctx, &RequestExtendVote { height: 10 });
        assert!(res.vote_extension.is_empty());
    }

    #[test]
    fn test_extend_before_enable_height_is_empty() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();
        let ctx = BlockContext::new(db, 3, "test-chain");

        let h = VoteExtHandler::new(
            Arc::new(WeightsKeeper::new()),
            Arc::new(provider()),
            WeightParams {
                max_percentage: 100,
                vote_extensions_enable_height: 5,
            },
        );
        assert!(h.extend_vote(&ctx, &RequestExtendVote { height: 3 }).vote_extension.is_empty());
    }

    #[test]
    fn test_verify_accepts_matching_height() {
        let res = handler(provider()).verify_vote_extension(&verify_req(7, encoded(7, &[("a", 5)])));
        assert_eq!(res.status, VerifyStatus::Accept);
    }

    #[test]
    fn test_verify_rejects_any_height_mismatch() {
        let h = handler(provider());
        for (embedded, requested) in [(6, 7), (8, 7), (1, 100), (100, 1), (0, 2)] {
            let res = h.verify_vote_extension(&verify_req(requested, encoded(embedded, &[("a", 5)])));
            assert_eq!(
                res.status,
                VerifyStatus::Reject,
                "embedded {} requested {}",
                embedded,
                requested
            );
        }
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let res = handler(provider()).verify_vote_extension(&verify_req(7, b"{oops".to_vec()));
        assert_eq!(res.status, VerifyStatus::Reject);
    }

    #[test]
    fn test_verify_rejects_out_of_range_weights() {
        let h = handler(provider());
        let res = h.verify_vote_extension(&verify_req(7, encoded(7, &[("a", 101)])));
        assert_eq!(res.status, VerifyStatus::Reject);
        let res = h.verify_vote_extension(&verify_req(7, encoded(7, &[("a", -1)])));
        assert_eq!(res.status, VerifyStatus::Reject);
    }

    #[test]
    fn test_verify_accepts_empty_extension() {
        let res = handler(provider()).verify_vote_extension(&verify_req(7, Vec::new()));
        assert_eq!(res.status, VerifyStatus::Accept);
    }
}
