use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::LedgerError;
use crate::ledger::models::{SettlementDetails, SettlementSummary};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Read access to settlement history on a public ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Most recent settlements touching `address`, newest first
    async fn recent_settlements(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SettlementSummary>>;

    /// Outcome of one settlement. `None` while the ledger does not know it yet.
    async fn settlement_details(&self, signature: &str) -> LedgerResult<Option<SettlementDetails>>;
}
