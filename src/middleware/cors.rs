use axum::http::{header, HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::api::gateway::{PAYMENT_MEMO_HEADER, PAYMENT_SIGNATURE_HEADER};

/// Browser clients must be able to send payment evidence from any origin
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static(PAYMENT_MEMO_HEADER),
            HeaderName::from_static(PAYMENT_SIGNATURE_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(60 * 60)) // 1 hour
}
