//! One-shot invocation adapter.
//!
//! Translates API Gateway style events (REST `v1` and HTTP API `v2` payloads) into a
//! [`GatewayRequest`] and the resulting [`GatewayResponse`] back into the proxy
//! integration response shape.

use std::collections::HashMap;

use base64::Engine;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    gateway::GatewayProtocol,
    handler::health,
    models::{GatewayRequest, GatewayResponse, ResponseBody},
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGatewayEvent {
    // v1 (REST API)
    http_method: Option<String>,
    path: Option<String>,
    multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    query_string_parameters: Option<HashMap<String, String>>,
    path_parameters: Option<HashMap<String, String>>,
    // v2 (HTTP API)
    raw_path: Option<String>,
    raw_query_string: Option<String>,
    request_context: Option<RequestContext>,
    // shared
    #[serde(default)]
    headers: HashMap<String, Value>,
    body: Option<Value>,
    #[serde(default)]
    is_base64_encoded: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RequestContext {
    http: Option<HttpContext>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpContext {
    method: Option<String>,
}

/// Proxy integration response
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LambdaResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

/// Run one event through the gateway. `context` is only used for log correlation.
pub async fn handle_event(
    gateway: &GatewayProtocol,
    event: Value,
    context: Option<Value>,
    cancel: &CancellationToken,
) -> LambdaResponse {
    let request_id = context
        .as_ref()
        .and_then(|c| c.get("awsRequestId").or_else(|| c.get("requestId")))
        .and_then(Value::as_str)
        .map(str::to_string);

    let request = match parse_event(event) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed event: {}", e);
            return to_lambda_response(e.into_gateway_response());
        }
    };

    debug!(
        "Invocation {} → {} {}",
        request_id.as_deref().unwrap_or("-"),
        request.method,
        request.path
    );

    if request.method == Method::GET && request.path.split('?').next() == Some("/health") {
        return match GatewayResponse::json(StatusCode::OK, &health()) {
            Ok(response) => to_lambda_response(response),
            Err(e) => to_lambda_response(AppError::from(e).into_gateway_response()),
        };
    }

    let response = gateway.handle(request, cancel).await;
    to_lambda_response(response)
}

fn parse_event(event: Value) -> AppResult<GatewayRequest> {
    let event: ApiGatewayEvent = serde_json::from_value(event)
        .map_err(|e| AppError::BadRequest(format!("unrecognised event: {}", e)))?;

    let method_name = event
        .http_method
        .clone()
        .or_else(|| {
            event
                .request_context
                .as_ref()
                .and_then(|c| c.http.as_ref())
                .and_then(|h| h.method.clone())
        })
        .unwrap_or_else(|| "GET".to_string());
    let method = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let path = event
        .path
        .clone()
        .or_else(|| event.raw_path.clone())
        .or_else(|| {
            event
                .path_parameters
                .as_ref()
                .and_then(|p| p.get("proxy"))
                .map(|proxy| format!("/{}", proxy))
        })
        .unwrap_or_else(|| "/".to_string());

    let query = query_string(&event);
    let path = if query.is_empty() {
        path
    } else {
        format!("{}?{}", path, query)
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &event.headers {
        let Some(value) = value.as_str() else { continue };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }

    let body = match event.body {
        None | Some(Value::Null) => Bytes::new(),
        Some(Value::String(text)) if event.is_base64_encoded => Bytes::from(
            base64::engine::general_purpose::STANDARD
                .decode(text.as_bytes())
                .map_err(|e| AppError::BadRequest(format!("invalid base64 body: {}", e)))?,
        ),
        Some(Value::String(text)) => Bytes::from(text),
        Some(other) => Bytes::from(other.to_string()),
    };

    Ok(GatewayRequest {
        method,
        path,
        headers,
        body,
    })
}

fn query_string(event: &ApiGatewayEvent) -> String {
    if let Some(raw) = event.raw_query_string.as_deref().filter(|q| !q.is_empty()) {
        return raw.to_string();
    }

    // v1 parameters arrive decoded and must be escaped again
    let mut pairs: Vec<(&str, &str)> = match (
        &event.multi_value_query_string_parameters,
        &event.query_string_parameters,
    ) {
        (Some(multi), _) => multi
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
            .collect(),
        (None, Some(single)) => single.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        (None, None) => Vec::new(),
    };
    pairs.sort();

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn to_lambda_response(response: GatewayResponse) -> LambdaResponse {
    let mut headers = HashMap::from([(
        canonical_name(&header::CONTENT_TYPE),
        "application/json".to_string(),
    )]);
    for (name, value) in &response.headers {
        if *name == header::CONTENT_LENGTH {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers.insert(canonical_name(name), value.to_string());
        }
    }

    let (body, is_base64_encoded) = match &response.body {
        ResponseBody::Binary(bytes) => (base64::engine::general_purpose::STANDARD.encode(bytes), true),
        other => (String::from_utf8_lossy(&other.to_bytes()).into_owned(), false),
    };

    LambdaResponse {
        status_code: response.status.as_u16(),
        headers,
        body,
        is_base64_encoded,
    }
}

/// `content-type` → `Content-Type`
fn canonical_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

impl AppError {
    fn into_gateway_response(self) -> GatewayResponse {
        let (status, body) = self.error_response();
        GatewayResponse {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Json(serde_json::json!({
                "error": body.error,
                "message": body.message,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;
    use solana_sdk::signature::{Keypair, Signer};

    use super::*;
    use crate::{
        api::gateway::tests::{test_config, CannedUpstream},
        config::VerificationMode,
        ledger::testing::FakeLedger,
        payment::PaymentVerifier,
    };

    fn gateway(keypair: &Keypair) -> GatewayProtocol {
        let verifier = PaymentVerifier::new(
            Arc::new(FakeLedger::new()),
            VerificationMode::Lenient,
            Duration::from_millis(1000),
        );
        GatewayProtocol::new(
            Arc::new(test_config(keypair, 2000)),
            verifier,
            Arc::new(CannedUpstream::default()),
        )
    }

    #[test]
    fn test_parse_v1_event() {
        let event = json!({
            "httpMethod": "POST",
            "path": "/items",
            "queryStringParameters": {"page": "2"},
            "headers": {"X-Payment-Memo": "tok", "Content-Type": "application/json"},
            "body": "{\"a\":1}",
            "isBase64Encoded": false
        });

        let request = parse_event(event).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/items?page=2");
        assert_eq!(request.header("x-payment-memo"), Some("tok"));
        assert_eq!(request.body, Bytes::from_static(b"{\"a\":1}"));
    }

    #[test]
    fn test_parse_v2_event_with_base64_body() {
        let event = json!({
            "rawPath": "/v2/things",
            "rawQueryString": "a=1&b=2",
            "requestContext": {"http": {"method": "put"}, "requestId": "r-1"},
            "headers": {},
            "body": base64::engine::general_purpose::STANDARD.encode("hello"),
            "isBase64Encoded": true
        });

        let request = parse_event(event).unwrap();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.path, "/v2/things?a=1&b=2");
        assert_eq!(request.body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_decoded_query_parameters_are_escaped() {
        let event = json!({
            "httpMethod": "GET",
            "path": "/s",
            "queryStringParameters": {"q": "a&admin=true"}
        });
        assert_eq!(parse_event(event).unwrap().path, "/s?q=a%26admin%3Dtrue");

        let event = json!({
            "httpMethod": "GET",
            "path": "/s",
            "multiValueQueryStringParameters": {"tag": ["x y", "z"]}
        });
        assert_eq!(parse_event(event).unwrap().path, "/s?tag=x+y&tag=z");
    }

    #[test]
    fn test_single_canonical_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert("x-request-id", HeaderValue::from_static("r1"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));

        let response = to_lambda_response(GatewayResponse {
            status: StatusCode::OK,
            headers,
            body: ResponseBody::Text("hello".into()),
        });

        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.headers["Content-Type"], "text/plain");
        assert_eq!(response.headers["X-Request-Id"], "r1");
        assert_eq!(response.body, "hello");
        assert!(!response.is_base64_encoded);
    }

    #[test]
    fn test_proxy_path_parameter() {
        let event = json!({
            "requestContext": {},
            "pathParameters": {"proxy": "deep/path"}
        });
        assert_eq!(parse_event(event).unwrap().path, "/deep/path");
    }

    #[tokio::test]
    async fn test_event_without_evidence_gets_402() {
        let keypair = Keypair::new();
        let gw = gateway(&keypair);

        let response = handle_event(
            &gw,
            json!({"httpMethod": "GET", "path": "/data", "headers": {}}),
            Some(json!({"awsRequestId": "abc"})),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(response.status_code, 402);
        assert_eq!(response.headers["Content-Type"], "application/json");
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["payment"]["recipient"], keypair.pubkey().to_string());
    }

    #[tokio::test]
    async fn test_health_answered_without_payment() {
        let gw = gateway(&Keypair::new());

        let response = handle_event(
            &gw,
            json!({"requestContext": {"http": {"method": "GET"}}, "rawPath": "/health"}),
            None,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(response.status_code, 200);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_malformed_event_is_400() {
        let gw = gateway(&Keypair::new());

        let response = handle_event(&gw, json!(42), None, &CancellationToken::new()).await;
        assert_eq!(response.status_code, 400);
    }
}
