//! Per-request x402 protocol: challenge, verify, forward.

use std::sync::Arc;

use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::models::{
    GatewayRequest, GatewayResponse, PaymentInstructions, PaymentRequiredResponse, PaymentTerms,
    VerificationFailedResponse,
};
use crate::{
    config::Config,
    error::{AppError, AppResult},
    payment::{ChallengeFactory, Evidence, PaymentVerifier, VerificationRequest},
    proxy::{ForwardedResponse, Upstream},
};

pub const PAYMENT_SIGNATURE_HEADER: &str = "x-payment-signature";
pub const PAYMENT_MEMO_HEADER: &str = "x-payment-memo";

pub struct GatewayProtocol {
    config: Arc<Config>,
    challenges: ChallengeFactory,
    verifier: PaymentVerifier,
    upstream: Arc<dyn Upstream>,
}

impl GatewayProtocol {
    pub fn new(
        config: Arc<Config>,
        verifier: PaymentVerifier,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let challenges = ChallengeFactory::new(config.fee_amount, config.receiver);
        Self {
            config,
            challenges,
            verifier,
            upstream,
        }
    }

    /// Handle one request. Every failure is turned into a response here.
    pub async fn handle(&self, request: GatewayRequest, cancel: &CancellationToken) -> GatewayResponse {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.process(request, cancel).await {
            Ok(response) => response,
            Err(e) => {
                error!("Gateway handler error on {} {}: {:?}", method, path, e);
                internal_error(&e)
            }
        }
    }

    async fn process(
        &self,
        mut request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> AppResult<GatewayResponse> {
        let Some(evidence) = extract_evidence(&request) else {
            info!("💳 No payment evidence on {} {}, issuing challenge", request.method, request.path);
            return self.payment_required();
        };

        let verification = VerificationRequest {
            evidence,
            expected_address: self.config.receiver,
            expected_lamports: self.config.fee_lamports,
            timeout: self.config.payment_timeout,
        };
        let outcome = self.verifier.verify(&verification, cancel).await;

        if !outcome.verified {
            let reason = outcome
                .failure_reason
                .ok_or_else(|| AppError::Internal("unverified outcome without reason".into()))?;
            warn!("Payment verification failed for {}: {}", request.path, reason.message());

            let challenge = self.challenges.generate(None);
            let body = VerificationFailedResponse {
                error: "Payment Verification Failed".to_string(),
                message: reason.message(),
                failure_reason: reason.code().to_string(),
                payment: PaymentTerms::new(&challenge, &self.config),
            };
            return Ok(GatewayResponse::json(StatusCode::PAYMENT_REQUIRED, &body)?);
        }

        // Payment evidence stays with the gateway
        request.headers.remove(PAYMENT_SIGNATURE_HEADER);
        request.headers.remove(PAYMENT_MEMO_HEADER);

        let forwarded = self.upstream.forward(request).await?;
        Ok(relay(forwarded))
    }

    fn payment_required(&self) -> AppResult<GatewayResponse> {
        let challenge = self.challenges.generate(None);
        let body = PaymentRequiredResponse {
            error: "Payment Required".to_string(),
            message: "This API requires payment via x402 protocol".to_string(),
            payment: PaymentTerms::new(&challenge, &self.config),
            instructions: PaymentInstructions::default(),
        };
        Ok(GatewayResponse::json(StatusCode::PAYMENT_REQUIRED, &body)?)
    }
}

/// Payment evidence carried by the request, if any
pub fn extract_evidence(request: &GatewayRequest) -> Option<Evidence> {
    let memo = request.header(PAYMENT_MEMO_HEADER).map(str::to_string);

    match request.header(PAYMENT_SIGNATURE_HEADER) {
        Some(signature) => Some(Evidence::Signature {
            signature: signature.to_string(),
            memo,
        }),
        None => memo.map(Evidence::Memo),
    }
}

fn relay(forwarded: ForwardedResponse) -> GatewayResponse {
    GatewayResponse {
        status: forwarded.status,
        headers: forwarded.headers,
        body: forwarded.body,
    }
}

fn internal_error(e: &AppError) -> GatewayResponse {
    let (status, body) = e.error_response();
    GatewayResponse::json(status, &body).unwrap_or_else(|_| GatewayResponse {
        status,
        headers: Default::default(),
        body: super::models::ResponseBody::Text(body.message),
    })
}
