#![allow(clippy::unwrap_used)]
// End-to-end tests for `Bridge` against a scripted mock router and a
// minimal in-process MQTT 3.1.1 broker.

use std::time::{Duration, Instant};

use secrecy::SecretString;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use routermq_api::proto::{read_sentence, write_sentence};
use routermq_core::{Bridge, BridgeConfig, MqttConfig, RouterConfig, TlsMode};

// ── Mock router ─────────────────────────────────────────────────────

type Sentence = Vec<String>;
/// Reply sentences for one received sentence.
type Exchange = Vec<Sentence>;
/// Scripted exchanges for one accepted connection.
type Connection = Vec<Exchange>;

fn sentence(words: &[&str]) -> Sentence {
    words.iter().map(|&w| w.to_owned()).collect()
}

fn login_ok() -> Exchange {
    vec![sentence(&["!done"])]
}

/// Serves one scripted connection after another, draining each until the
/// client hangs up. Returns the sentences received per connection.
async fn spawn_router(script: Vec<Connection>) -> (String, JoinHandle<Vec<Vec<Sentence>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        for connection in script {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = BufStream::new(stream);
            let mut sentences = Vec::new();
            for replies in connection {
                sentences.push(read_sentence(&mut stream).await.unwrap());
                for reply in replies {
                    write_sentence(&mut stream, &reply).await.unwrap();
                }
            }
            while read_sentence(&mut stream).await.is_ok() {}
            received.push(sentences);
        }
        received
    });

    (address, handle)
}

// ── Mock broker ─────────────────────────────────────────────────────

/// Reads one MQTT packet: returns the first header byte and the body.
async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let first = stream.read_u8().await?;
    let mut remaining = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        remaining |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).await?;
    Ok((first, body))
}

/// Accepts one client, acknowledges its session, and forwards every
/// QoS 0 publish as `(topic, payload)` until the client disconnects.
async fn spawn_broker() -> (Url, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("tcp://{}", listener.local_addr().unwrap())).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Ok((first, body)) = read_packet(&mut stream).await {
            match first >> 4 {
                // CONNECT: accept, no session present
                1 => stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap(),
                // PUBLISH (QoS 0): topic length, topic, payload
                3 => {
                    let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
                    let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).unwrap();
                    let payload = body[2 + topic_len..].to_vec();
                    tx.send((topic, payload)).unwrap();
                }
                // PINGREQ
                12 => stream.write_all(&[0xD0, 0x00]).await.unwrap(),
                // DISCONNECT
                14 => break,
                _ => {}
            }
        }
    });

    (url, rx)
}

// ── Config helpers ──────────────────────────────────────────────────

fn router_config(address: &str) -> RouterConfig {
    let secret: SecretString = "secret".to_string().into();
    let mut config = RouterConfig::new(address, "admin", secret);
    config.tls = TlsMode::Disabled;
    config.timeout = Duration::from_secs(5);
    config
}

fn bridge_config(router_address: &str, broker_url: Url, topic_prefix: &str) -> BridgeConfig {
    BridgeConfig {
        router: router_config(router_address),
        mqtt: MqttConfig {
            broker_url,
            client_id: "routermq-test".to_owned(),
            timeout: Duration::from_secs(5),
        },
        topic_prefix: topic_prefix.to_owned(),
        poll_interval: Duration::from_secs(30),
    }
}

async fn next_publish(
    rx: &mut mpsc::UnboundedReceiver<(String, Vec<u8>)>,
) -> (String, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a publish")
        .expect("broker channel closed")
}

// ── Snapshot publishing ─────────────────────────────────────────────

#[tokio::test]
async fn test_two_row_snapshot_published() {
    let script = vec![vec![
        login_ok(),
        vec![
            sentence(&[
                "!re",
                "=mac-address=AA:BB:CC:DD:EE:FF",
                "=interface=wlan1",
                "=uptime=1h2m3s",
                "=last-activity=0s",
                "=signal-to-noise=45",
            ]),
            sentence(&["!re", "=mac-address=11:22:33:44:55:66", "=interface=wlan1"]),
            sentence(&["!done"]),
        ],
    ]];
    let (router_address, router) = spawn_router(script).await;
    let (broker_url, mut publishes) = spawn_broker().await;

    let bridge = Bridge::start(bridge_config(&router_address, broker_url, "home"))
        .await
        .unwrap();

    let (topic, payload) = next_publish(&mut publishes).await;
    bridge.shutdown().await;

    assert_eq!(topic, "home/routeros/wificlients");
    let expected = concat!(
        "[\n",
        "    {\n",
        "        \"mac_address\": \"AA:BB:CC:DD:EE:FF\",\n",
        "        \"interface\": \"wlan1\",\n",
        "        \"uptime\": \"1h2m3s\",\n",
        "        \"last_activity\": \"0s\",\n",
        "        \"signal_to_noise\": \"45\"\n",
        "    },\n",
        "    {\n",
        "        \"mac_address\": \"11:22:33:44:55:66\",\n",
        "        \"interface\": \"wlan1\",\n",
        "        \"uptime\": \"\",\n",
        "        \"last_activity\": \"\",\n",
        "        \"signal_to_noise\": \"\"\n",
        "    }\n",
        "]"
    );
    assert_eq!(String::from_utf8(payload).unwrap(), expected);

    let received = router.await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0][1],
        vec!["/interface/wireless/registration-table/print"]
    );
}

#[tokio::test]
async fn test_empty_table_publishes_empty_array() {
    let script = vec![vec![login_ok(), vec![sentence(&["!done"])]]];
    let (router_address, _router) = spawn_router(script).await;
    let (broker_url, mut publishes) = spawn_broker().await;

    let bridge = Bridge::start(bridge_config(&router_address, broker_url, ""))
        .await
        .unwrap();

    let (topic, payload) = next_publish(&mut publishes).await;
    bridge.shutdown().await;

    assert_eq!(topic, "routeros/wificlients");
    assert_eq!(payload, b"[]");
}

#[tokio::test]
async fn test_consecutive_cycles_publish_identical_payloads() {
    let rows = vec![
        sentence(&[
            "!re",
            "=mac-address=AA:BB:CC:DD:EE:FF",
            "=interface=wlan1",
            "=uptime=1h2m3s",
            "=last-activity=0s",
            "=signal-to-noise=45",
        ]),
        sentence(&["!done"]),
    ];
    // One session, two polls answered with the same table.
    let script = vec![vec![login_ok(), rows.clone(), rows]];
    let (router_address, _router) = spawn_router(script).await;
    let (broker_url, mut publishes) = spawn_broker().await;

    let mut config = bridge_config(&router_address, broker_url, "home");
    config.poll_interval = Duration::from_millis(200);
    let bridge = Bridge::start(config).await.unwrap();

    let (first_topic, first) = next_publish(&mut publishes).await;
    let (second_topic, second) = next_publish(&mut publishes).await;
    bridge.shutdown().await;

    assert_eq!(first_topic, "home/routeros/wificlients");
    assert_eq!(second_topic, first_topic);
    assert!(String::from_utf8_lossy(&first).contains("\"mac_address\": \"AA:BB:CC:DD:EE:FF\""));
    assert_eq!(
        first, second,
        "consecutive snapshots of one table must match"
    );
}

// ── Reconnect behaviour ─────────────────────────────────────────────

#[tokio::test]
async fn test_failed_query_reconnects_after_interval() {
    let script = vec![
        // First session: the query traps.
        vec![
            login_ok(),
            vec![
                sentence(&["!trap", "=message=not enough permissions (9)"]),
                sentence(&["!done"]),
            ],
        ],
        // Second session: the query succeeds.
        vec![
            login_ok(),
            vec![
                sentence(&["!re", "=mac-address=AA:BB:CC:DD:EE:FF", "=interface=wlan1"]),
                sentence(&["!done"]),
            ],
        ],
    ];
    let (router_address, router) = spawn_router(script).await;
    let (broker_url, mut publishes) = spawn_broker().await;

    let mut config = bridge_config(&router_address, broker_url, "");
    config.poll_interval = Duration::from_millis(200);
    let bridge = Bridge::start(config).await.unwrap();

    let (topic, payload) = next_publish(&mut publishes).await;
    bridge.shutdown().await;

    assert_eq!(topic, "routeros/wificlients");
    let text = String::from_utf8(payload).unwrap();
    assert!(text.contains("\"mac_address\": \"AA:BB:CC:DD:EE:FF\""));

    let received = router.await.unwrap();
    assert_eq!(received.len(), 2, "expected a second session after the trap");
    assert_eq!(
        received[1][1],
        vec!["/interface/wireless/registration-table/print"]
    );
}

#[tokio::test]
async fn test_reconnect_waits_full_interval() {
    let interval = Duration::from_millis(400);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    // Two-session router that records when each connection arrives.
    let handle = tokio::spawn(async move {
        let mut accepts = Vec::new();

        // First session: login succeeds, the query traps.
        let (stream, _) = listener.accept().await.unwrap();
        accepts.push(Instant::now());
        let mut stream = BufStream::new(stream);
        read_sentence(&mut stream).await.unwrap();
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        read_sentence(&mut stream).await.unwrap();
        write_sentence(
            &mut stream,
            &sentence(&["!trap", "=message=not enough permissions (9)"]),
        )
        .await
        .unwrap();
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        while read_sentence(&mut stream).await.is_ok() {}

        // Second session: login succeeds, the table is empty.
        let (stream, _) = listener.accept().await.unwrap();
        accepts.push(Instant::now());
        let mut stream = BufStream::new(stream);
        read_sentence(&mut stream).await.unwrap();
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        read_sentence(&mut stream).await.unwrap();
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        while read_sentence(&mut stream).await.is_ok() {}

        accepts
    });

    let (broker_url, mut publishes) = spawn_broker().await;
    let mut config = bridge_config(&address, broker_url, "");
    config.poll_interval = interval;
    let bridge = Bridge::start(config).await.unwrap();

    // The only publish comes from the second session.
    let (_, payload) = next_publish(&mut publishes).await;
    bridge.shutdown().await;
    assert_eq!(payload, b"[]");

    let accepts = handle.await.unwrap();
    assert_eq!(accepts.len(), 2);
    let gap = accepts[1].duration_since(accepts[0]);
    assert!(
        gap >= interval,
        "redial after {gap:?}, before the {interval:?} interval elapsed"
    );
}

#[tokio::test]
async fn test_shutdown_during_reconnect_stops_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        // First session: login succeeds, the query traps.
        let (stream, _) = listener.accept().await.unwrap();
        let mut stream = BufStream::new(stream);
        read_sentence(&mut stream).await.unwrap();
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        read_sentence(&mut stream).await.unwrap();
        write_sentence(
            &mut stream,
            &sentence(&["!trap", "=message=not enough permissions (9)"]),
        )
        .await
        .unwrap();
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        while read_sentence(&mut stream).await.is_ok() {}

        // Redial session: hold the login reply long enough for the stop
        // request to land mid-dial, then record everything until the
        // client hangs up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut stream = BufStream::new(stream);
        let mut sentences = vec![read_sentence(&mut stream).await.unwrap()];
        tokio::time::sleep(Duration::from_millis(500)).await;
        write_sentence(&mut stream, &sentence(&["!done"])).await.unwrap();
        while let Ok(words) = read_sentence(&mut stream).await {
            sentences.push(words);
        }
        sentences
    });

    let (broker_url, _publishes) = spawn_broker().await;
    let mut config = bridge_config(&address, broker_url, "");
    config.poll_interval = Duration::from_millis(300);
    let bridge = Bridge::start(config).await.unwrap();

    // Trap cycle at startup, 300 ms sleep, then the redial stalls on the
    // held login reply. Stop the bridge inside that window.
    tokio::time::sleep(Duration::from_millis(450)).await;
    bridge.shutdown().await;

    let sentences = handle.await.unwrap();
    assert_eq!(
        sentences.len(),
        1,
        "no query may follow a stop request, got: {sentences:?}"
    );
    assert_eq!(sentences[0][0], "/login");
}

// ── Startup failures ────────────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_broker_fails_startup() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_url = Url::parse(&format!("tcp://{}", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let mut config = bridge_config("127.0.0.1:1", broker_url, "");
    config.mqtt.timeout = Duration::from_secs(1);
    let result = Bridge::start(config).await;

    assert!(
        matches!(result, Err(routermq_core::BridgeError::BrokerConnect { .. })),
        "expected BrokerConnect, got: {result:?}"
    );
}

#[tokio::test]
async fn test_unreachable_router_fails_startup() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let router_address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (broker_url, _publishes) = spawn_broker().await;
    let result = Bridge::start(bridge_config(&router_address, broker_url, "")).await;

    match result {
        Err(routermq_core::BridgeError::RouterConnect { ref address, .. }) => {
            assert_eq!(address, &router_address);
        }
        other => panic!("expected RouterConnect, got: {other:?}"),
    }
}
