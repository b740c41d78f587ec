use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Entry from the recent-settlements listing of an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub signature: String,
    pub block_time: Option<DateTime<Utc>>,
    pub failed: bool,
    pub memo: Option<String>,
}

/// Full outcome of a single settlement as recorded on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDetails {
    pub signature: String,
    pub block_time: Option<DateTime<Utc>>,
    pub failed: bool,
    /// Base58 account keys in transaction order
    pub account_keys: Vec<String>,
    /// Lamport balances indexed like `account_keys`
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub memo: Option<String>,
}

impl SettlementDetails {
    pub fn account_index(&self, address: &Pubkey) -> Option<usize> {
        let address = address.to_string();
        self.account_keys.iter().position(|key| *key == address)
    }

    /// Net lamport change at `address`. Missing balances count as zero.
    pub fn balance_delta(&self, address: &Pubkey) -> Option<i128> {
        let index = self.account_index(address)?;
        let pre = self.pre_balances.get(index).copied().unwrap_or(0) as i128;
        let post = self.post_balances.get(index).copied().unwrap_or(0) as i128;
        Some(post - pre)
    }

    pub fn memo_contains(&self, token: &str) -> bool {
        self.memo.as_deref().is_some_and(|memo| memo.contains(token))
    }
}

/// Pull memo texts out of memo-program log lines such as
/// `Program log: Memo (len 11): "x402-spg-42"`.
pub fn memo_from_logs(logs: &[String]) -> Option<String> {
    let memos: Vec<&str> = logs
        .iter()
        .filter_map(|line| {
            let rest = line.split_once("Memo (len ")?.1;
            let quoted = rest.split_once("): ")?.1;
            Some(quoted.trim().trim_matches('"'))
        })
        .collect();

    if memos.is_empty() {
        None
    } else {
        Some(memos.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(keys: &[Pubkey], pre: Vec<u64>, post: Vec<u64>) -> SettlementDetails {
        SettlementDetails {
            signature: "sig".into(),
            block_time: Some(Utc::now()),
            failed: false,
            account_keys: keys.iter().map(|k| k.to_string()).collect(),
            pre_balances: pre,
            post_balances: post,
            memo: None,
        }
    }

    #[test]
    fn test_balance_delta() {
        let payer = Pubkey::new_unique();
        let receiver = Pubkey::new_unique();
        let tx = details(&[payer, receiver], vec![5_000, 100], vec![3_000, 2_100]);

        assert_eq!(tx.balance_delta(&receiver), Some(2_000));
        assert_eq!(tx.balance_delta(&payer), Some(-2_000));
        assert_eq!(tx.balance_delta(&Pubkey::new_unique()), None);
    }

    #[test]
    fn test_memo_from_logs() {
        let logs = vec![
            "Program MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr invoke [1]".to_string(),
            "Program log: Memo (len 15): \"x402-spg-abc-42\"".to_string(),
            "Program MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr success".to_string(),
        ];
        assert_eq!(memo_from_logs(&logs).as_deref(), Some("x402-spg-abc-42"));
        assert_eq!(memo_from_logs(&[]), None);
    }
}
