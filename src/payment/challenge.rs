use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

const TOKEN_PREFIX: &str = "x402-spg";

/// Payment instructions handed out with a 402 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentChallenge {
    pub amount: Decimal,
    pub recipient: Pubkey,
    /// Correlation token the payer attaches as memo
    pub memo: String,
    pub issued_at: DateTime<Utc>,
}

/// Builds challenges for the configured fee and receiving address
#[derive(Debug, Clone)]
pub struct ChallengeFactory {
    amount: Decimal,
    recipient: Pubkey,
    instance: String,
}

impl ChallengeFactory {
    pub fn new(amount: Decimal, recipient: Pubkey) -> Self {
        let mut instance = Uuid::new_v4().simple().to_string();
        instance.truncate(8);

        Self {
            amount,
            recipient,
            instance,
        }
    }

    /// Create a challenge, keeping a caller-supplied memo when present
    pub fn generate(&self, memo: Option<&str>) -> PaymentChallenge {
        let issued_at = Utc::now();
        let memo = match memo.map(str::trim).filter(|m| !m.is_empty()) {
            Some(memo) => memo.to_string(),
            None => self.correlation_token(issued_at),
        };

        PaymentChallenge {
            amount: self.amount,
            recipient: self.recipient,
            memo,
            issued_at,
        }
    }

    fn correlation_token(&self, now: DateTime<Utc>) -> String {
        let mut nonce = Uuid::new_v4().simple().to_string();
        nonce.truncate(12);
        format!(
            "{}-{}-{}-{}",
            TOKEN_PREFIX,
            self.instance,
            now.timestamp_millis(),
            nonce
        )
    }
}
