//! Payment verification state machine.
//!
//! A verification starts in [`VerificationState::Polling`] and repeatedly asks the
//! ledger for a settlement matching the evidence the caller presented. It ends in
//! exactly one terminal state:
//!
//! - `Verified`: a recent, successful settlement credited the receiving address
//! - `TimedOut`: the deadline passed without a qualifying settlement
//! - `Errored`: a ledger query failed (fail-closed, never retried)
//! - `Rejected`: the settlement named by a signature can never qualify
//! - `Cancelled`: the caller went away or the server is shutting down
//!
//! The deadline is a monotonic instant checked on every cycle and the wait between
//! polls is a cancellable suspension point.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::VerificationMode,
    error::LedgerError,
    ledger::{LedgerClient, SettlementDetails},
};

/// How many recent settlements are inspected per poll
pub const RECENT_SETTLEMENT_LIMIT: usize = 10;

/// Settlements older than this are never matched
pub const RECENCY_WINDOW_SECS: i64 = 5 * 60;

/// What the payer presented as proof of payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Correlation token the payer put in the transfer memo
    Memo(String),
    /// Signature of the settlement transaction, optionally with its memo
    Signature {
        signature: String,
        memo: Option<String>,
    },
}

impl Evidence {
    fn memo(&self) -> Option<&str> {
        match self {
            Evidence::Memo(memo) => Some(memo),
            Evidence::Signature { memo, .. } => memo.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub evidence: Evidence,
    pub expected_address: Pubkey,
    pub expected_lamports: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationState {
    Polling,
    Verified { settlement_ref: String },
    TimedOut,
    Errored(String),
    Rejected(Rejection),
    Cancelled,
}

impl VerificationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationState::Polling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    LedgerError(String),
    Rejected(Rejection),
    Cancelled,
}

impl FailureReason {
    /// Machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::LedgerError(_) => "verification_error",
            FailureReason::Rejected(_) => "payment_rejected",
            FailureReason::Cancelled => "cancelled",
        }
    }

    pub fn message(&self) -> String {
        match self {
            FailureReason::Timeout => "Payment timeout - no matching transaction found".to_string(),
            FailureReason::LedgerError(message) => format!("Verification error: {}", message),
            FailureReason::Rejected(rejection) => format!("Payment rejected: {}", rejection),
            FailureReason::Cancelled => "Payment verification cancelled".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub settlement_ref: Option<String>,
    pub failure_reason: Option<FailureReason>,
}

impl From<VerificationState> for VerificationOutcome {
    fn from(state: VerificationState) -> Self {
        let failure = |reason| VerificationOutcome {
            verified: false,
            settlement_ref: None,
            failure_reason: Some(reason),
        };

        match state {
            VerificationState::Verified { settlement_ref } => VerificationOutcome {
                verified: true,
                settlement_ref: Some(settlement_ref),
                failure_reason: None,
            },
            VerificationState::TimedOut | VerificationState::Polling => {
                failure(FailureReason::Timeout)
            }
            VerificationState::Errored(message) => failure(FailureReason::LedgerError(message)),
            VerificationState::Rejected(rejection) => failure(FailureReason::Rejected(rejection)),
            VerificationState::Cancelled => failure(FailureReason::Cancelled),
        }
    }
}

/// Why a settlement did not satisfy the challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Stale,
    Failed,
    NotParticipant,
    NoCredit(i128),
    AmountMismatch { expected: u64, actual: i128 },
    MemoMismatch,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Stale => write!(f, "settlement is older than {} seconds", RECENCY_WINDOW_SECS),
            Rejection::Failed => write!(f, "settlement failed on the ledger"),
            Rejection::NotParticipant => write!(f, "settlement does not involve the receiving address"),
            Rejection::NoCredit(delta) => write!(f, "receiver balance changed by {} lamports", delta),
            Rejection::AmountMismatch { expected, actual } => {
                write!(f, "expected {} lamports, received {}", expected, actual)
            }
            Rejection::MemoMismatch => write!(f, "memo does not carry the payment token"),
        }
    }
}

/// Result of a single ledger query
enum Poll {
    Matched(String),
    Pending,
    /// Final for this settlement; confirmed transactions never change
    Rejected(Rejection),
}

pub struct PaymentVerifier {
    ledger: Arc<dyn LedgerClient>,
    mode: VerificationMode,
    poll_interval: Duration,
}

impl PaymentVerifier {
    pub fn new(ledger: Arc<dyn LedgerClient>, mode: VerificationMode, poll_interval: Duration) -> Self {
        Self {
            ledger,
            mode,
            poll_interval,
        }
    }

    /// Poll the ledger until the evidence is confirmed, the deadline passes,
    /// the ledger fails, or `cancel` fires.
    pub async fn verify(
        &self,
        request: &VerificationRequest,
        cancel: &CancellationToken,
    ) -> VerificationOutcome {
        let started = Instant::now();
        let deadline = started + request.timeout;
        let mut state = VerificationState::Polling;
        let mut cycles = 0u32;

        while !state.is_terminal() {
            cycles += 1;
            state = self.step(request, deadline, cancel).await;
        }

        match &state {
            VerificationState::Verified { settlement_ref } => info!(
                "✅ Payment verified by {} after {} poll(s) in {:?}",
                settlement_ref,
                cycles,
                started.elapsed()
            ),
            VerificationState::Errored(message) => {
                warn!("❌ Payment verification error: {}", message)
            }
            other => info!(
                "Payment not verified ({:?}) after {} poll(s) in {:?}",
                other,
                cycles,
                started.elapsed()
            ),
        }

        state.into()
    }

    /// One poll cycle of the state machine
    async fn step(
        &self,
        request: &VerificationRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> VerificationState {
        if cancel.is_cancelled() {
            return VerificationState::Cancelled;
        }
        if Instant::now() >= deadline {
            return VerificationState::TimedOut;
        }

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return VerificationState::Cancelled,
            polled = tokio::time::timeout_at(deadline, self.poll_once(request)) => polled,
        };

        match polled {
            Err(_) => VerificationState::TimedOut,
            Ok(Err(e)) => VerificationState::Errored(e.to_string()),
            Ok(Ok(Poll::Matched(settlement_ref))) => VerificationState::Verified { settlement_ref },
            Ok(Ok(Poll::Rejected(rejection))) => VerificationState::Rejected(rejection),
            Ok(Ok(Poll::Pending)) => {
                let wake = (Instant::now() + self.poll_interval).min(deadline);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => VerificationState::Cancelled,
                    _ = tokio::time::sleep_until(wake) => VerificationState::Polling,
                }
            }
        }
    }

    /// Query the ledger once
    async fn poll_once(&self, request: &VerificationRequest) -> Result<Poll, LedgerError> {
        let expected_memo = request.evidence.memo();

        match &request.evidence {
            Evidence::Memo(_) => {
                let summaries = self
                    .ledger
                    .recent_settlements(&request.expected_address, RECENT_SETTLEMENT_LIMIT)
                    .await?;
                let now = Utc::now();

                for summary in summaries {
                    // Cheap filters before fetching the full transaction
                    if !is_recent(summary.block_time, now) || summary.failed {
                        continue;
                    }

                    let Some(mut details) = self.ledger.settlement_details(&summary.signature).await?
                    else {
                        continue;
                    };
                    if details.memo.is_none() {
                        details.memo = summary.memo;
                    }

                    match self.evaluate(&details, request, expected_memo, now) {
                        Ok(()) => return Ok(Poll::Matched(details.signature)),
                        Err(rejection) => {
                            debug!("Skipping settlement {}: {:?}", details.signature, rejection)
                        }
                    }
                }

                Ok(Poll::Pending)
            }
            Evidence::Signature { signature, .. } => {
                let Some(details) = self.ledger.settlement_details(signature).await? else {
                    debug!("Settlement {} not visible on the ledger yet", signature);
                    return Ok(Poll::Pending);
                };

                match self.evaluate(&details, request, expected_memo, Utc::now()) {
                    Ok(()) => Ok(Poll::Matched(details.signature)),
                    Err(rejection) => {
                        debug!("Settlement {} rejected: {:?}", signature, rejection);
                        Ok(Poll::Rejected(rejection))
                    }
                }
            }
        }
    }

    /// Decide whether a single settlement satisfies the request
    pub fn evaluate(
        &self,
        details: &SettlementDetails,
        request: &VerificationRequest,
        expected_memo: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        if !is_recent(details.block_time, now) {
            return Err(Rejection::Stale);
        }
        if details.failed {
            return Err(Rejection::Failed);
        }

        let delta = details
            .balance_delta(&request.expected_address)
            .ok_or(Rejection::NotParticipant)?;
        if delta <= 0 {
            return Err(Rejection::NoCredit(delta));
        }

        match self.mode {
            // Legacy behaviour: any credit to the receiver counts
            VerificationMode::Lenient => {}
            VerificationMode::Strict => {
                if delta != request.expected_lamports as i128 {
                    return Err(Rejection::AmountMismatch {
                        expected: request.expected_lamports,
                        actual: delta,
                    });
                }
                match expected_memo {
                    Some(memo) if details.memo_contains(memo) => {}
                    _ => return Err(Rejection::MemoMismatch),
                }
            }
        }

        Ok(())
    }
}

/// Whether a settlement at `block_time` is still inside the recency window.
/// The window is half-open: an event exactly at the boundary is stale.
pub fn is_recent(block_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match block_time {
        Some(at) => now.signed_duration_since(at) < chrono::Duration::seconds(RECENCY_WINDOW_SECS),
        None => false,
    }
}
