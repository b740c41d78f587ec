use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{config::Config, payment::PaymentChallenge};

// ========== CANONICAL REQUEST / RESPONSE ==========

/// Inbound request as seen by the gateway, independent of how it arrived
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// Path including the query string
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Header value as text; empty values count as absent
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Response body, classified as JSON when possible
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// JSON built by the gateway itself
    Json(serde_json::Value),
    /// Valid JSON from upstream, relayed byte for byte
    RawJson(Bytes),
    Text(String),
    Binary(Bytes),
}

impl ResponseBody {
    pub fn decode(bytes: Bytes) -> Self {
        if serde_json::from_slice::<serde::de::IgnoredAny>(&bytes).is_ok() {
            return ResponseBody::RawJson(bytes);
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => ResponseBody::Text(text),
            Err(_) => ResponseBody::Binary(bytes),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            ResponseBody::Json(value) => Bytes::from(value.to_string()),
            ResponseBody::RawJson(bytes) | ResponseBody::Binary(bytes) => bytes.clone(),
            ResponseBody::Text(text) => Bytes::from(text.clone()),
        }
    }

    /// Parsed view of a JSON body
    pub fn json_value(&self) -> Option<serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value.clone()),
            ResponseBody::RawJson(bytes) => serde_json::from_slice(bytes).ok(),
            _ => None,
        }
    }
}

/// Outbound response produced by the gateway
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl GatewayResponse {
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, serde_json::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            status,
            headers,
            body: ResponseBody::Json(serde_json::to_value(body)?),
        })
    }
}

// ========== RESPONSE BODIES ==========

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Payment terms included with every 402
#[derive(Debug, Clone, Serialize)]
pub struct PaymentTerms {
    pub amount: Decimal,
    pub recipient: String,
    pub memo: String,
    pub facilitator: String,
    pub network: String,
}

impl PaymentTerms {
    pub fn new(challenge: &PaymentChallenge, config: &Config) -> Self {
        Self {
            amount: challenge.amount,
            recipient: challenge.recipient.to_string(),
            memo: challenge.memo.clone(),
            facilitator: config.facilitator.to_string(),
            network: config.network.as_str().to_string(),
        }
    }
}

/// Steps a client follows to pay and retry
#[derive(Debug, Serialize)]
pub struct PaymentInstructions {
    #[serde(rename = "1")]
    pub pay: &'static str,
    #[serde(rename = "2")]
    pub attach: &'static str,
    #[serde(rename = "3")]
    pub retry: &'static str,
}

impl Default for PaymentInstructions {
    fn default() -> Self {
        Self {
            pay: "Make a payment to the recipient address with the provided memo",
            attach: "Include the payment memo in the X-Payment-Memo header (or the transaction signature in the X-Payment-Signature header)",
            retry: "Retry your request with the payment evidence",
        }
    }
}

/// 402 body for requests without payment evidence
#[derive(Debug, Serialize)]
pub struct PaymentRequiredResponse {
    pub error: String,
    pub message: String,
    pub payment: PaymentTerms,
    pub instructions: PaymentInstructions,
}

/// 402 body for evidence that could not be verified
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationFailedResponse {
    pub error: String,
    pub message: String,
    pub failure_reason: String,
    pub payment: PaymentTerms,
}
