use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    api::handler::{gateway_handler, health_check, AppState, MAX_BODY_BYTES},
    middleware::create_cors_layer,
};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check, only for GET. Anything else on /health is gated.
        .route("/health", get(health_check).fallback(gateway_handler))
        // Every other method and path is payment gated
        .fallback(gateway_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(
    app: Router,
    bind_address: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Releases any verification still polling the ledger
            shutdown.cancel();
        })
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use chrono::Utc;
    use solana_sdk::signature::{Keypair, Signer};
    use tower::ServiceExt;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        api::gateway::GatewayProtocol,
        config::{tests::test_env, Config, VerificationMode},
        ledger::testing::{transfer, FakeLedger},
        payment::PaymentVerifier,
        proxy::UpstreamForwarder,
    };

    async fn app_with(ledger: FakeLedger, upstream: &MockServer, keypair: &Keypair) -> Router {
        let mut env = test_env(keypair);
        env.insert("TARGET_API_URL".into(), upstream.uri());
        env.insert("PAYMENT_TIMEOUT_MS".into(), "300".into());
        env.insert("POLL_INTERVAL_MS".into(), "100".into());
        let config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();

        let verifier = PaymentVerifier::new(
            Arc::new(ledger),
            VerificationMode::Lenient,
            config.poll_interval,
        );
        let forwarder =
            UpstreamForwarder::new(&config.target_api_url, Duration::from_secs(5)).unwrap();
        let gateway = GatewayProtocol::new(Arc::new(config), verifier, Arc::new(forwarder));

        create_app(AppState {
            gateway: Arc::new(gateway),
            shutdown: CancellationToken::new(),
        })
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "1")
                    .set_body_json(serde_json::json!({"data": "secret"})),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_request_without_evidence_gets_402() {
        let server = upstream().await;
        let keypair = Keypair::new();
        let app = app_with(FakeLedger::new(), &server, &keypair).await;

        let response = app
            .oneshot(Request::get("/api/data").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Payment Required");
        assert_eq!(body["payment"]["recipient"], keypair.pubkey().to_string());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paid_request_is_proxied() {
        let server = upstream().await;
        let keypair = Keypair::new();
        let ledger = FakeLedger::new().with_settlement(transfer(
            "paid",
            &keypair.pubkey(),
            1_000_000,
            Utc::now(),
        ));
        let app = app_with(ledger, &server, &keypair).await;

        let response = app
            .oneshot(
                Request::get("/api/data")
                    .header("x-payment-memo", "x402-spg-test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-upstream").unwrap(), "1");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(json_body(response).await, serde_json::json!({"data": "secret"}));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("x-payment-memo").is_none());
    }

    #[tokio::test]
    async fn test_unmatched_payment_times_out_with_402() {
        let server = upstream().await;
        let keypair = Keypair::new();
        // Credit went to someone else
        let ledger = FakeLedger::new().with_settlement(transfer(
            "elsewhere",
            &Keypair::new().pubkey(),
            1_000_000,
            Utc::now(),
        ));
        let app = app_with(ledger, &server, &keypair).await;

        let response = app
            .oneshot(
                Request::get("/api/data")
                    .header("x-payment-memo", "x402-spg-test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Payment Verification Failed");
        assert_eq!(body["failureReason"], "timeout");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_is_free() {
        let server = upstream().await;
        let app = app_with(FakeLedger::new(), &server, &Keypair::new()).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "x402-serverless-payment-gateway");
    }

    #[tokio::test]
    async fn test_health_ignores_payment_headers() {
        let server = upstream().await;
        let ledger = FakeLedger::failing("rpc down");
        let app = app_with(ledger, &server, &Keypair::new()).await;

        let response = app
            .oneshot(
                Request::get("/health")
                    .header("x-payment-memo", "x402-spg-test")
                    .header("x-payment-signature", "5abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let server = upstream().await;
        let app = app_with(FakeLedger::new(), &server, &Keypair::new()).await;

        let response = app
            .oneshot(
                Request::post("/api/data")
                    .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_to_health_is_gated() {
        let server = upstream().await;
        let app = app_with(FakeLedger::new(), &server, &Keypair::new()).await;

        let response = app
            .oneshot(Request::post("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
