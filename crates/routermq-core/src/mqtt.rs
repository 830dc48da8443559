// ── Message-bus publisher ──
//
// Thin wrapper around rumqttc. The event loop runs on its own task so
// the poll loop never drives the bus connection itself: `publish` hands
// a payload to rumqttc's queue and returns. Delivery is fire-and-forget
// at QoS 0, matching the rest of the pipeline.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::MqttConfig;
use crate::error::BridgeError;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 16;
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Handle to an established broker session.
pub struct MqttPublisher {
    client: AsyncClient,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl MqttPublisher {
    /// Connect and wait for the broker's acknowledgement, bounded by the
    /// configured timeout. The returned publisher keeps the session alive
    /// from a background task that also handles reconnects.
    pub async fn connect(config: &MqttConfig) -> Result<Self, BridgeError> {
        let broker = config.broker_url.to_string();
        let refused = |reason: String| BridgeError::BrokerConnect {
            broker: broker.clone(),
            reason,
        };

        let (host, port) = config.endpoint()?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(KEEP_ALIVE);
        let (client, mut eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        let timeout_secs = config.timeout.as_secs();
        tokio::time::timeout(config.timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| refused(format!("handshake timed out after {timeout_secs}s")))?
            .map_err(refused)?;
        debug!(broker = %config.broker_url, "broker session established");

        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive_connection(eventloop, cancel.clone()));
        Ok(Self {
            client,
            cancel,
            driver,
        })
    }

    /// Hand one payload to the bus. Success means rumqttc accepted the
    /// message for delivery, not that the broker received it.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                reason: e.to_string(),
            })
    }

    /// Queue a disconnect, give the driver a moment to flush it, then
    /// stop the driver task.
    pub async fn shutdown(self) {
        if self.client.disconnect().await.is_ok() {
            tokio::time::sleep(DISCONNECT_GRACE).await;
        }
        self.cancel.cancel();
        if let Err(error) = self.driver.await {
            debug!(error = %error, "bus driver task terminated abnormally");
        }
    }
}

/// Drive the event loop until the broker acknowledges the session.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(error) => return Err(error.to_string()),
        }
    }
}

/// Keep polling so keep-alives, acknowledgements, and reconnects happen.
/// rumqttc redials on the poll after a connection error; the pause keeps
/// a dead broker from turning that into a busy loop.
async fn drive_connection(mut eventloop: EventLoop, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(event) => trace!(?event, "bus event"),
                Err(error) => {
                    warn!(error = %error, "bus connection error");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_PAUSE) => {}
                    }
                }
            },
        }
    }
}
