pub mod codec;
pub mod proposal;
pub mod provider;
pub mod vote_extensions;

pub use codec::{InjectedWeightsTx, WeightedVotingPowerVoteExtension};
pub use proposal::{aggregate_vote_extensions, ProposalHandler};
pub use provider::{SignalProvider, StaticSignalProvider};
pub use vote_extensions::VoteExtHandler;
