//! In-memory ledger used by the test suites.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;

use crate::error::LedgerError;
use crate::ledger::{
    client::{LedgerClient, LedgerResult},
    models::{SettlementDetails, SettlementSummary},
};

#[derive(Default)]
pub struct FakeLedger {
    settlements: Mutex<Vec<SettlementDetails>>,
    failure: Option<String>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose every query fails with a transport error
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_settlement(self, details: SettlementDetails) -> Self {
        self.push(details);
        self
    }

    /// Newest settlements go first, like the RPC listing
    pub fn push(&self, details: SettlementDetails) {
        self.settlements.lock().unwrap().insert(0, details);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> LedgerResult<()> {
        match &self.failure {
            Some(message) => Err(LedgerError::Rpc(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    // Lists every settlement regardless of `address`, so the verifier's own
    // participant check is exercised.
    async fn recent_settlements(
        &self,
        _address: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SettlementSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        Ok(self
            .settlements
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .map(|s| SettlementSummary {
                signature: s.signature.clone(),
                block_time: s.block_time,
                failed: s.failed,
                memo: s.memo.clone(),
            })
            .collect())
    }

    async fn settlement_details(&self, signature: &str) -> LedgerResult<Option<SettlementDetails>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        Ok(self
            .settlements
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.signature == signature)
            .cloned())
    }
}

/// A successful transfer of `lamports` from a fresh payer to `receiver`
pub fn transfer(
    signature: &str,
    receiver: &Pubkey,
    lamports: u64,
    block_time: DateTime<Utc>,
) -> SettlementDetails {
    let payer = Pubkey::new_unique();
    SettlementDetails {
        signature: signature.to_string(),
        block_time: Some(block_time),
        failed: false,
        account_keys: vec![payer.to_string(), receiver.to_string()],
        pre_balances: vec![10_000_000_000, 1_000],
        post_balances: vec![10_000_000_000 - lamports - 5_000, 1_000 + lamports],
        memo: None,
    }
}
