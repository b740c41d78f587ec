use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::{debug, error};

use crate::{
    api::models::{GatewayRequest, ResponseBody},
    error::ForwardError,
};

/// Headers never sent upstream. The HTTP client sets its own framing and host.
pub const REQUEST_HEADERS_TO_SKIP: [&str; 7] = [
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
];

/// Headers never relayed back. The body is re-framed by our own transport.
pub const RESPONSE_HEADERS_TO_SKIP: [&str; 2] = ["content-encoding", "transfer-encoding"];

/// Response received from the protected service
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// The protected service behind the gateway
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: GatewayRequest) -> Result<ForwardedResponse, ForwardError>;
}

pub fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    filter_headers(headers, &REQUEST_HEADERS_TO_SKIP)
}

pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    filter_headers(headers, &RESPONSE_HEADERS_TO_SKIP)
}

fn filter_headers(headers: &HeaderMap, skip: &[&str]) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        // HeaderName is always lowercase
        if !skip.contains(&name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Forwards authorized requests to the target API over HTTP
pub struct UpstreamForwarder {
    base_url: String,
    client: reqwest::Client,
}

impl UpstreamForwarder {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn target_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    // reqwest 0.11 speaks http 0.2, the rest of the gateway http 1.x
    fn outbound_headers(headers: &HeaderMap) -> Result<reqwest::header::HeaderMap, ForwardError> {
        let mut outbound = reqwest::header::HeaderMap::new();
        for (name, value) in &filter_request_headers(headers) {
            let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
            let value = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
            outbound.append(name, value);
        }
        Ok(outbound)
    }

    fn inbound_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
        let mut inbound = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let converted = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            );
            if let (Ok(name), Ok(value)) = converted {
                inbound.append(name, value);
            }
        }
        filter_response_headers(&inbound)
    }
}

#[async_trait]
impl Upstream for UpstreamForwarder {
    async fn forward(&self, request: GatewayRequest) -> Result<ForwardedResponse, ForwardError> {
        let url = self.target_url(&request.path);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;

        debug!("➡️  Forwarding {} {}", method, url);

        let mut builder = self
            .client
            .request(method, &url)
            .headers(Self::outbound_headers(&request.headers)?);
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_vec());
        }

        let response = builder.send().await.map_err(|e| {
            error!("Upstream request to {} failed: {}", url, e);
            ForwardError::Transport(e)
        })?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
        let headers = Self::inbound_headers(response.headers());
        let body = response.bytes().await?;

        debug!("⬅️  Upstream answered {} ({} bytes)", status, body.len());

        Ok(ForwardedResponse {
            status,
            headers,
            body: ResponseBody::decode(body),
        })
    }
}
