pub mod avs_error;
pub mod config_error;

pub use avs_error::{AvsError, AvsResult};
pub use config_error::ConfigError;
