use std::sync::Arc;

use solana_client::rpc_config::CommitmentConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    api::{gateway::GatewayProtocol, handler::AppState},
    config::Config,
    error::AppResult,
    ledger::{SolanaLedgerClient, SolanaLedgerConfig},
    payment::PaymentVerifier,
    proxy::UpstreamForwarder,
};

/// Wire the ledger client, verifier and upstream forwarder into one gateway
pub fn initialize_gateway(config: Config) -> AppResult<GatewayProtocol> {
    info!("Initializing gateway components ...");

    let ledger = Arc::new(SolanaLedgerClient::new(SolanaLedgerConfig {
        rpc_url: config.rpc_url.clone(),
        commitment: CommitmentConfig::confirmed(),
        timeout: config.rpc_timeout,
    }));
    info!("✅ Solana ledger client initialized for {} ({})", config.network, config.rpc_url);

    let verifier = PaymentVerifier::new(ledger, config.verification_mode, config.poll_interval);
    info!(
        "✅ Payment verifier ready: {:?} mode, {:?} timeout, {:?} poll interval",
        config.verification_mode, config.payment_timeout, config.poll_interval
    );

    let upstream = Arc::new(UpstreamForwarder::new(
        &config.target_api_url,
        config.upstream_timeout,
    )?);
    info!("✅ Upstream forwarder targeting {}", config.target_api_url);

    Ok(GatewayProtocol::new(Arc::new(config), verifier, upstream))
}

pub fn initialize_app_state(config: Config, shutdown: CancellationToken) -> AppResult<AppState> {
    let gateway = initialize_gateway(config)?;

    info!("✅ Application state ready");
    Ok(AppState {
        gateway: Arc::new(gateway),
        shutdown,
    })
}
