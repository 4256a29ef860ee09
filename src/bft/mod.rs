pub mod validator_registry;

// Re-export commonly used items
pub use validator_registry::{has_quorum, ExtensionValidator, ValidatorInfo, ValidatorRegistry};
