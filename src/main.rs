mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod middleware;
mod payment;
mod proxy;
mod server;

use std::{io::Read, net::SocketAddr};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,x402_gateway=debug".into()),
        ))
        // stdout carries the response in one-shot mode
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if std::env::args().nth(1).as_deref() == Some("invoke") {
        return invoke_once(config).await;
    }

    info!("🚀 Starting x402 payment gateway");
    info!("   Receiver:  {}", config.receiver);
    info!("   Fee:       {} SOL ({} lamports)", config.fee_amount, config.fee_lamports);
    info!("   Cluster:   {}", config.network);
    info!("   Target:    {}", config.target_api_url);
    info!("   Mode:      {:?}", config.verification_mode);

    let bind_address = SocketAddr::new(config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = bootstrap::initialize_app_state(config, shutdown.clone())?;

    // Create HTTP server
    let app = server::create_app(state);

    // Run the Server
    server::run_server(app, bind_address, shutdown).await?;

    Ok(())
}

/// Handle a single event read from stdin and print the response to stdout.
///
/// Accepts either a bare event or `{"event": ..., "context": ...}`.
async fn invoke_once(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let payload: serde_json::Value = serde_json::from_str(&input)?;

    let (event, context) = match payload {
        serde_json::Value::Object(mut envelope) if envelope.contains_key("event") => (
            envelope.remove("event").unwrap_or_default(),
            envelope.remove("context"),
        ),
        event => (event, None),
    };

    let gateway = bootstrap::initialize_gateway(config)?;
    let response = api::lambda::handle_event(&gateway, event, context, &CancellationToken::new()).await;

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
