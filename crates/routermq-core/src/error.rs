// ── Bridge error types ──
//
// User-facing errors from routermq-core. Wire-level detail stays in
// `routermq_api::Error`; the `From` impl carries it through for the
// per-cycle paths where the bridge only logs and moves on.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Startup errors ───────────────────────────────────────────────
    #[error("Cannot connect to router at {address}: {reason}")]
    RouterConnect { address: String, reason: String },

    #[error("Cannot connect to broker at {broker}: {reason}")]
    BrokerConnect { broker: String, reason: String },

    // ── Steady-state errors ──────────────────────────────────────────
    #[error("Router query failed: {0}")]
    Query(#[from] routermq_api::Error),

    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Publish failed: {reason}")]
    Publish { reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}
