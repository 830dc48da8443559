//! Clap derive structures for the `routermq` CLI.
//!
//! One flat flag set, no subcommands: the binary does exactly one thing.

use clap::Parser;
use url::Url;

use routermq_core::{DEFAULT_BROKER_URL, DEFAULT_POLL_INTERVAL_SECS};

/// routermq -- publish a router's wireless client table to MQTT
#[derive(Debug, Parser)]
#[command(
    name = "routermq",
    version,
    about = "Poll a MikroTik router's wireless registration table and publish it to MQTT"
)]
pub struct Cli {
    /// Router API endpoint, host:port
    #[arg(long, env = "ROUTERMQ_ADDRESS")]
    pub address: String,

    /// Router API username
    #[arg(long, env = "ROUTERMQ_USERNAME")]
    pub username: String,

    /// Router API password
    #[arg(long, env = "ROUTERMQ_PASSWORD", hide_env = true, default_value = "")]
    pub password: String,

    /// Message broker URL
    #[arg(long, env = "ROUTERMQ_BROKER", default_value = DEFAULT_BROKER_URL)]
    pub broker: Url,

    /// Leading topic segment for published messages
    #[arg(long, env = "ROUTERMQ_TOPIC_PREFIX", default_value = "")]
    pub topic_prefix: String,

    /// Connect to the router without TLS (plain API port, usually 8728)
    #[arg(long, env = "ROUTERMQ_NO_TLS")]
    pub no_tls: bool,

    /// Seconds between polls
    #[arg(
        long,
        env = "ROUTERMQ_INTERVAL",
        default_value_t = DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Connection and query timeout in seconds
    #[arg(long, env = "ROUTERMQ_TIMEOUT", default_value = "30")]
    pub timeout: u64,

    /// Enable debug logging
    #[arg(long, short = 'd', env = "ROUTERMQ_DEBUG")]
    pub debug: bool,
}
