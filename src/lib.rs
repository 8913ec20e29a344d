pub mod config;
pub mod core;
pub mod errors;

// Re-export commonly used items for convenience
pub use config::ClientConfig;
pub use crate::core::*;
pub use errors::{AvsError, AvsResult, ConfigError};
