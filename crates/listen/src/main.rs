//! Reference listener for a pushline event stream.
//!
//! Connects with the configured identity and prints every client event
//! (application events and connect/disconnect notifications) as one JSON
//! object per line on stdout.  Logs go to stderr.
//!
//! Usage:
//!   pushline-listen --base-url https://push.example.com --token 3f1c9a --client-id desk-7
//!   pushline-listen --config pushline.toml | jq .
//!
//! Env vars:
//!   PUSHLINE_CONFIG  config file path (default: pushline.toml)
//!   RUST_LOG         log filter (default: info)

mod cli;

use std::io::Write;

use clap::Parser;
use pl_client::{ClientEvent, StreamClientBuilder};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config_path = cli.config_path();
    let mut config = cli::load_config(&config_path)?;
    cli.apply(&mut config);

    let client = StreamClientBuilder::from_config(&config).build()?;
    tracing::info!(url = %client.stream_url(), "listening");

    let mut events = client.subscribe();
    client.connect();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut delivered = 0u64;
    let mut stdout = std::io::stdout().lock();
    loop {
        let event = tokio::select! {
            res = &mut shutdown => {
                res?;
                tracing::info!("interrupted; shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        stdout.flush()?;

        if matches!(event, ClientEvent::Event(_)) {
            delivered += 1;
            if cli.max_events.is_some_and(|max| delivered >= max) {
                break;
            }
        }
    }

    client.disconnect();
    let state = client.connection_state();
    tracing::info!(
        events_delivered = state.events_delivered,
        duplicates_suppressed = state.duplicates_suppressed,
        "listener stopped"
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
