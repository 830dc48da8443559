mod cli;
mod error;

use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use routermq_core::{Bridge, BridgeConfig, MqttConfig, RouterConfig, TlsMode};

use crate::cli::Cli;
use crate::error::CliError;

/// Client identifier presented to the broker.
const CLIENT_ID: &str = "routermq";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("Error: {err}");
        std::process::exit(code);
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let bridge = Bridge::start(bridge_config(cli)).await?;

    // Block until interrupted, then let the loop wind itself down.
    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    bridge.shutdown().await;
    Ok(())
}

fn bridge_config(cli: Cli) -> BridgeConfig {
    let timeout = Duration::from_secs(cli.timeout);
    let tls = if cli.no_tls {
        TlsMode::Disabled
    } else {
        TlsMode::DangerAcceptInvalid
    };

    BridgeConfig {
        router: RouterConfig {
            address: cli.address,
            username: cli.username,
            password: SecretString::from(cli.password),
            tls,
            timeout,
        },
        mqtt: MqttConfig {
            broker_url: cli.broker,
            client_id: CLIENT_ID.to_owned(),
            timeout,
        },
        topic_prefix: cli.topic_prefix,
        poll_interval: Duration::from_secs(cli.interval),
    }
}
