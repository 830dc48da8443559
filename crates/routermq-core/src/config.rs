// ── Runtime configuration ──
//
// These types describe how the bridge connects and how often it polls.
// The CLI constructs a `BridgeConfig` and hands it in; core never reads
// config files or the environment.

use std::time::Duration;

use url::Url;

use crate::error::BridgeError;
use routermq_api::RouterConfig;

/// Default delay between poll cycles, in seconds. Every cycle waits out
/// the full interval, failed ones included, so this also paces reconnect
/// attempts.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Broker endpoint used when none is configured.
pub const DEFAULT_BROKER_URL: &str = "tcp://localhost:1883";

const DEFAULT_BROKER_PORT: u16 = 1883;

/// Configuration for the message-bus side of the bridge.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL, `tcp://host:port` or `mqtt://host:port`.
    pub broker_url: Url,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Deadline for the initial broker handshake.
    pub timeout: Duration,
}

impl MqttConfig {
    /// Split the broker URL into a dialable host and port.
    ///
    /// Only plain-TCP schemes are accepted; the broker side of this
    /// bridge does not speak TLS.
    pub(crate) fn endpoint(&self) -> Result<(String, u16), BridgeError> {
        match self.broker_url.scheme() {
            "tcp" | "mqtt" => {}
            other => {
                return Err(BridgeError::Config {
                    message: format!(
                        "unsupported broker scheme `{other}` (use tcp:// or mqtt://)"
                    ),
                });
            }
        }
        let host = self
            .broker_url
            .host_str()
            .ok_or_else(|| BridgeError::Config {
                message: format!("broker URL `{}` has no host", self.broker_url),
            })?;
        let port = self.broker_url.port().unwrap_or(DEFAULT_BROKER_PORT);
        Ok((host.to_owned(), port))
    }
}

/// Configuration for one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Router connection settings, credentials included.
    pub router: RouterConfig,
    /// Message-bus connection settings.
    pub mqtt: MqttConfig,
    /// Leading topic segment; blank publishes under the bare suffix.
    pub topic_prefix: String,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
}
