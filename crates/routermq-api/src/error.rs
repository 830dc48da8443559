use thiserror::Error;

/// Top-level error type for the `routermq-api` crate.
///
/// Covers every failure mode across the session lifecycle: address
/// handling, transport, wire framing, login, and command replies.
/// `routermq-core` maps these into bridge-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level failure (connect, read, write, shutdown).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The configured router address could not be used.
    #[error("Invalid router address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A call exceeded the configured deadline.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Protocol ────────────────────────────────────────────────────
    /// Malformed framing or an unrecognized reply word.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// `!trap` reply: the router rejected the command.
    #[error("Router trap: {message}")]
    Trap {
        message: String,
        category: Option<String>,
    },

    /// `!fatal` reply: the router is tearing the connection down.
    #[error("Router fatal: {reason}")]
    Fatal { reason: String },

    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected by the router.
    #[error("Login failed: {message}")]
    LoginFailed { message: String },
}
