// routermq-core: polling/publish loop between routermq-api and the bus.

pub mod bridge;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod mqtt;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, CLIENT_TOPIC_SUFFIX};
pub use config::{BridgeConfig, MqttConfig, DEFAULT_BROKER_URL, DEFAULT_POLL_INTERVAL_SECS};
pub use error::BridgeError;
pub use model::WifiClientRecord;
pub use mqtt::MqttPublisher;

// Re-export the router-facing configuration types so consumers only
// need this crate.
pub use routermq_api::{RouterConfig, TlsMode};
