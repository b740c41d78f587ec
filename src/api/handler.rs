use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;

use super::{
    gateway::GatewayProtocol,
    models::{GatewayRequest, GatewayResponse, HealthResponse},
};

pub const SERVICE_NAME: &str = "x402-serverless-payment-gateway";

/// Largest request body buffered before forwarding. Larger bodies get 413.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayProtocol>,
    /// Cancelled when the server starts shutting down
    pub shutdown: CancellationToken,
}

pub fn health() -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(health())
}

/// Catch-all: every other method and path goes through the payment gate
pub async fn gateway_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let gateway_request = GatewayRequest {
        method,
        path,
        headers,
        body,
    };

    // Dropping this handler (client hung up) cancels any verification in flight
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    state.gateway.handle(gateway_request, &cancel).await.into_response()
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.to_bytes()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        // Body may have been re-encoded; hyper frames it again
        response.headers_mut().remove(header::CONTENT_LENGTH);
        response
    }
}
