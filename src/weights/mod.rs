pub mod compute;
pub mod keeper;

// Re-export commonly used items
pub use compute::{check_bounds, compute_weights, Scale, Signals};
pub use keeper::{WeightStore, WeightsKeeper};
