use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::{CommitmentConfig, RpcTransactionConfig},
    rpc_request::RpcRequest,
};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use solana_transaction_status_client_types::{
    EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding,
};
use tracing::debug;

use crate::{
    error::LedgerError,
    ledger::{
        client::{LedgerClient, LedgerResult},
        models::{memo_from_logs, SettlementDetails, SettlementSummary},
    },
};

#[derive(Debug, Clone)]
pub struct SolanaLedgerConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub timeout: Duration,
}

/// Ledger client backed by Solana JSON-RPC
pub struct SolanaLedgerClient {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaLedgerClient {
    pub fn new(config: SolanaLedgerConfig) -> Self {
        let client =
            RpcClient::new_with_timeout_and_commitment(config.rpc_url, config.timeout, config.commitment);

        Self {
            client,
            commitment: config.commitment,
        }
    }

    fn block_time(timestamp: Option<i64>) -> Option<DateTime<Utc>> {
        timestamp.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    async fn recent_settlements(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SettlementSummary>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(self.commitment),
            ..Default::default()
        };

        let statuses = self
            .client
            .get_signatures_for_address_with_config(address, config)
            .await?;

        debug!("Fetched {} recent signatures for {}", statuses.len(), address);

        Ok(statuses
            .into_iter()
            .map(|status| SettlementSummary {
                signature: status.signature,
                block_time: Self::block_time(status.block_time),
                failed: status.err.is_some(),
                memo: status.memo,
            })
            .collect())
    }

    async fn settlement_details(&self, signature: &str) -> LedgerResult<Option<SettlementDetails>> {
        let parsed = Signature::from_str(signature)
            .map_err(|_| LedgerError::InvalidSignature(signature.to_string()))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        // getTransaction answers null for unknown signatures
        let confirmed: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .client
            .send(
                RpcRequest::GetTransaction,
                serde_json::json!([parsed.to_string(), config]),
            )
            .await?;

        let Some(confirmed) = confirmed else {
            return Ok(None);
        };

        let Some(meta) = confirmed.transaction.meta else {
            return Ok(None);
        };

        let transaction = confirmed.transaction.transaction.decode().ok_or_else(|| {
            LedgerError::Malformed {
                signature: signature.to_string(),
                message: "transaction could not be decoded".to_string(),
            }
        })?;

        let account_keys = transaction
            .message
            .static_account_keys()
            .iter()
            .map(|key| key.to_string())
            .collect();

        let logs: Option<Vec<String>> = meta.log_messages.into();

        Ok(Some(SettlementDetails {
            signature: signature.to_string(),
            block_time: Self::block_time(confirmed.block_time),
            failed: meta.err.is_some(),
            account_keys,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            memo: logs.as_deref().and_then(memo_from_logs),
        }))
    }
}
