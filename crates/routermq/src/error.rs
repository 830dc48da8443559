//! CLI error types.
//!
//! The bridge has exactly one user-visible failure surface: startup.
//! Once the loop is running, failures are logged and recovered, never
//! surfaced as process errors.

use thiserror::Error;

use routermq_core::BridgeError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Startup(#[from] BridgeError),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Startup(_) | Self::Signal(_) => 1,
        }
    }
}
