// RouterOS API session client.
//
// Wraps the framed transport with login and command execution. All
// endpoint calls go through `run`, which sends one command sentence and
// collects reply sentences until `!done`. The client is single-flight:
// commands take `&mut self`, so one exchange is on the wire at a time.

use std::collections::HashMap;
use std::time::Duration;

use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncWriteExt, BufStream};
use tracing::{debug, trace};

use crate::error::Error;
use crate::proto::{self, ReplySentence, ReplyWord};
use crate::transport::{self, ByteStream, TlsMode};

/// Deadline applied when a config does not choose its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `host:port` of the API service.
    pub address: String,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsMode,
    /// Deadline for connect+login and for each individual command.
    pub timeout: Duration,
}

impl RouterConfig {
    /// Config with the default TLS mode and timeout.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password,
            tls: TlsMode::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One active API session.
pub struct RouterosClient {
    stream: BufStream<Box<dyn ByteStream>>,
    timeout: Duration,
}

impl std::fmt::Debug for RouterosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterosClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RouterosClient {
    /// Connect, complete the TLS handshake where configured, and log in.
    /// The whole sequence runs under the configured deadline.
    pub async fn connect(config: &RouterConfig) -> Result<Self, Error> {
        tokio::time::timeout(config.timeout, Self::connect_inner(config))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: config.timeout.as_secs(),
            })?
    }

    async fn connect_inner(config: &RouterConfig) -> Result<Self, Error> {
        debug!(address = %config.address, tls = ?config.tls, "connecting to router");
        let stream = transport::connect(&config.address, config.tls).await?;
        let mut client = Self {
            stream: BufStream::new(stream),
            timeout: config.timeout,
        };
        client.login(&config.username, &config.password).await?;
        debug!(address = %config.address, "router session established");
        Ok(client)
    }

    /// Run one command sentence, collecting `!re` rows until `!done`.
    ///
    /// A `!trap` is drained up to its terminating `!done`, then returned
    /// as an error carrying the router's message. After a deadline expiry
    /// the session state on the wire is unspecified; callers are expected
    /// to reconnect.
    pub async fn run(&mut self, command: &str) -> Result<Vec<ReplySentence>, Error> {
        let deadline = self.timeout;
        tokio::time::timeout(deadline, self.run_inner(command))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: deadline.as_secs(),
            })?
    }

    async fn run_inner(&mut self, command: &str) -> Result<Vec<ReplySentence>, Error> {
        trace!(command, "sending command");
        proto::write_sentence(&mut self.stream, &[command]).await?;

        let mut rows = Vec::new();
        let mut trap: Option<Error> = None;
        loop {
            let words = proto::read_sentence(&mut self.stream).await?;
            let reply = ReplySentence::parse(words)?;
            match reply.word {
                ReplyWord::Re => rows.push(reply),
                ReplyWord::Trap => {
                    if trap.is_none() {
                        trap = Some(trap_error(&reply));
                    }
                }
                ReplyWord::Fatal => return Err(fatal_error(&reply)),
                ReplyWord::Done => {
                    return match trap {
                        Some(err) => Err(err),
                        None => Ok(rows),
                    };
                }
            }
        }
    }

    /// Print the full wireless registration table, rows in router
    /// response order.
    pub async fn wireless_registrations(&mut self) -> Result<Vec<Registration>, Error> {
        let rows = self
            .run("/interface/wireless/registration-table/print")
            .await?;
        Ok(rows.into_iter().map(Registration::from).collect())
    }

    /// Shut the connection down. Best-effort: the router side may already
    /// be gone.
    pub async fn close(mut self) -> Result<(), Error> {
        let deadline = self.timeout;
        tokio::time::timeout(deadline, self.stream.shutdown())
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: deadline.as_secs(),
            })??;
        Ok(())
    }

    // ── Login ───────────────────────────────────────────────────────

    /// Post-6.43 routers accept `/login` with the plain password; older
    /// firmware answers with a `=ret=` challenge that wants the MD5
    /// response in a second `/login`.
    async fn login(&mut self, username: &str, password: &SecretString) -> Result<(), Error> {
        let first = self
            .exchange(&[
                "/login".to_owned(),
                format!("=name={username}"),
                format!("=password={}", password.expose_secret()),
            ])
            .await?;

        let done = match first.word {
            ReplyWord::Done => first,
            ReplyWord::Trap => return Err(login_rejected(&first)),
            ReplyWord::Fatal => return Err(fatal_error(&first)),
            ReplyWord::Re => {
                return Err(Error::Protocol("unexpected data reply to /login".into()));
            }
        };

        let Some(challenge_hex) = done.attribute("ret") else {
            return Ok(());
        };
        let challenge = hex::decode(challenge_hex)
            .ok_or_else(|| Error::Protocol("malformed login challenge".into()))?;

        let mut hasher = Md5::new();
        hasher.update([0u8]);
        hasher.update(password.expose_secret().as_bytes());
        hasher.update(&challenge);
        let response = format!("00{}", hex::encode(hasher.finalize()));

        let second = self
            .exchange(&[
                "/login".to_owned(),
                format!("=name={username}"),
                format!("=response={response}"),
            ])
            .await?;

        match second.word {
            ReplyWord::Done => Ok(()),
            ReplyWord::Trap => Err(login_rejected(&second)),
            ReplyWord::Fatal => Err(fatal_error(&second)),
            ReplyWord::Re => Err(Error::Protocol(
                "unexpected data reply to challenge login".into(),
            )),
        }
    }

    /// Send one sentence and read one reply sentence.
    async fn exchange(&mut self, words: &[String]) -> Result<ReplySentence, Error> {
        proto::write_sentence(&mut self.stream, words).await?;
        let reply = proto::read_sentence(&mut self.stream).await?;
        ReplySentence::parse(reply)
    }
}

// ── Registration rows ───────────────────────────────────────────────

/// One row of a registration-table print: the raw attribute map, values
/// verbatim as the router sent them.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    attributes: HashMap<String, String>,
}

impl Registration {
    /// Look up an attribute by its router-side name (`mac-address`,
    /// `interface`, `uptime`, ...).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl From<ReplySentence> for Registration {
    fn from(reply: ReplySentence) -> Self {
        Self {
            attributes: reply.attributes,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Registration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ── Error mapping ───────────────────────────────────────────────────

fn trap_error(reply: &ReplySentence) -> Error {
    Error::Trap {
        message: reply
            .attribute("message")
            .unwrap_or("unspecified trap")
            .to_owned(),
        category: reply.attribute("category").map(str::to_owned),
    }
}

fn fatal_error(reply: &ReplySentence) -> Error {
    let reason = if reply.messages.is_empty() {
        "connection closed by router".to_owned()
    } else {
        reply.messages.join("; ")
    };
    Error::Fatal { reason }
}

fn login_rejected(reply: &ReplySentence) -> Error {
    Error::LoginFailed {
        message: reply
            .attribute("message")
            .unwrap_or("invalid credentials")
            .to_owned(),
    }
}

// ── Hex helpers for the legacy login challenge ──────────────────────

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        let bytes = s.as_bytes();
        if bytes.len() % 2 != 0 {
            return None;
        }
        bytes
            .chunks_exact(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            })
            .collect()
    }
}
