// ── Poll/publish loop ──
//
// One background task owns the router session and the bus publisher.
// Each cycle queries the registration table, converts it, serializes it,
// and publishes one snapshot message. Every cycle ends with the same
// fixed sleep, successful or not, and a failed query is answered by a
// reconnect after that sleep rather than any escalating backoff.
//
// The session handle never leaves the task. Shutdown cancels the task
// and lets it close the session itself once the in-flight cycle ends.

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use routermq_api::{RouterConfig, RouterosClient};

use crate::config::BridgeConfig;
use crate::convert;
use crate::error::BridgeError;
use crate::model::WifiClientRecord;
use crate::mqtt::MqttPublisher;

/// Topic suffix every snapshot is published under.
pub const CLIENT_TOPIC_SUFFIX: &str = "routeros/wificlients";

/// Router session state as seen by the loop. `Down` means the last
/// reconnect attempt failed and the next one waits for the interval.
enum Session {
    Connected(RouterosClient),
    Down,
}

/// A running bridge: the poll loop plus its cancellation handle.
#[derive(Debug)]
pub struct Bridge {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Bridge {
    /// Connect both remotes and start the poll loop.
    ///
    /// The bus comes up first, then the router; failure of either is
    /// fatal here and nothing is retried. Once this returns the loop
    /// carries its own recovery.
    pub async fn start(config: BridgeConfig) -> Result<Self, BridgeError> {
        let publisher = MqttPublisher::connect(&config.mqtt).await?;
        info!(broker = %config.mqtt.broker_url, "connected to broker");

        let client = match RouterosClient::connect(&config.router).await {
            Ok(client) => client,
            Err(error) => {
                publisher.shutdown().await;
                return Err(BridgeError::RouterConnect {
                    address: config.router.address.clone(),
                    reason: error.to_string(),
                });
            }
        };
        info!(address = %config.router.address, "connected to router");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(config, publisher, client, cancel.clone()));
        Ok(Self { cancel, task })
    }

    /// Stop the loop and wait for it to close both connections.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            warn!(error = %error, "poll task terminated abnormally");
        }
    }
}

async fn poll_loop(
    config: BridgeConfig,
    publisher: MqttPublisher,
    client: RouterosClient,
    cancel: CancellationToken,
) {
    let topic = prefixed_topic(&config.topic_prefix, CLIENT_TOPIC_SUFFIX);
    info!(topic = %topic, interval = ?config.poll_interval, "starting poll loop");

    let mut session = Session::Connected(client);
    loop {
        let healthy = run_cycle(&mut session, &publisher, &topic).await;

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.poll_interval) => {}
        }

        if !healthy {
            session = reconnect(session, &config.router).await;
            // A stop request that landed during the dial must not buy
            // one more cycle.
            if cancel.is_cancelled() {
                break;
            }
        }
    }

    if let Session::Connected(client) = session {
        if let Err(error) = client.close().await {
            warn!(error = %error, "closing router session failed");
        }
    }
    publisher.shutdown().await;
    info!("poll loop stopped");
}

/// Run one poll cycle. Returns whether the router session is still
/// usable; a `false` asks the loop to reconnect after the sleep.
async fn run_cycle(session: &mut Session, publisher: &MqttPublisher, topic: &str) -> bool {
    let Session::Connected(client) = session else {
        debug!("router session down, awaiting reconnect");
        return false;
    };

    match cycle(client, publisher, topic).await {
        Ok(()) => true,
        Err(error @ BridgeError::Query(_)) => {
            warn!(error = %error, "scheduling reconnect");
            false
        }
        // Serialization and publish failures cost one message; the
        // session itself is fine.
        Err(error) => {
            warn!(error = %error, "snapshot dropped");
            true
        }
    }
}

/// Query, convert, serialize, publish. Stops at the first failure, so a
/// snapshot that cannot be serialized is never published.
async fn cycle(
    client: &mut RouterosClient,
    publisher: &MqttPublisher,
    topic: &str,
) -> Result<(), BridgeError> {
    let rows = client.wireless_registrations().await?;
    let clients = convert::wifi_clients(&rows);
    debug!(clients = clients.len(), "fetched registration table");

    let payload = serialize_snapshot(&clients)?;
    publisher.publish(topic, payload).await
}

/// Drop the stale session and dial a fresh one. A failed attempt parks
/// the loop in `Down` until the interval elapses again.
async fn reconnect(session: Session, config: &RouterConfig) -> Session {
    if let Session::Connected(client) = session {
        if let Err(error) = client.close().await {
            debug!(error = %error, "closing stale session failed");
        }
    }

    info!(address = %config.address, "reconnecting to router");
    match RouterosClient::connect(config).await {
        Ok(client) => Session::Connected(client),
        Err(error) => {
            warn!(error = %error, "router reconnect failed");
            Session::Down
        }
    }
}

/// `{prefix}/{suffix}` when the prefix is non-blank, bare `{suffix}`
/// otherwise. Blankness is tested on the trimmed prefix, but the
/// original untrimmed value is what gets concatenated.
fn prefixed_topic(prefix: &str, suffix: &str) -> String {
    if prefix.trim().is_empty() {
        suffix.to_owned()
    } else {
        format!("{prefix}/{suffix}")
    }
}

/// Four-space-indented JSON array, empty snapshots included.
fn serialize_snapshot(clients: &[WifiClientRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut payload = Vec::with_capacity(256);
    let mut serializer = serde_json::Serializer::with_formatter(&mut payload, formatter);
    clients.serialize(&mut serializer)?;
    Ok(payload)
}
