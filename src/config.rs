use std::{fmt, net::IpAddr, str::FromStr, time::Duration};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};

use crate::error::ConfigError;

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Solana cluster the gateway verifies payments on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Devnet,
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Mainnet => "mainnet-beta",
            Network::Testnet => "testnet",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Devnet => "https://api.devnet.solana.com",
            Network::Mainnet => "https://api.mainnet-beta.solana.com",
            Network::Testnet => "https://api.testnet.solana.com",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "devnet" => Ok(Network::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(ConfigError::invalid(
                "SOLANA_CLUSTER",
                format!("must be one of: devnet, mainnet-beta, testnet (got '{}')", other),
            )),
        }
    }
}

/// How strictly a ledger settlement must match the challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Any positive balance change at the receiver counts as payment
    #[default]
    Lenient,
    /// Exact fee in lamports and a memo carrying the correlation token
    Strict,
}

impl FromStr for VerificationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(VerificationMode::Lenient),
            "strict" => Ok(VerificationMode::Strict),
            other => Err(ConfigError::invalid(
                "VERIFICATION_MODE",
                format!("must be 'lenient' or 'strict' (got '{}')", other),
            )),
        }
    }
}

/// Process configuration. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_api_url: String,
    /// Public half of the configured wallet keypair
    pub receiver: Pubkey,
    pub facilitator: Pubkey,
    pub fee_amount: Decimal,
    /// `fee_amount` in lamports, used for exact-amount matching
    pub fee_lamports: u64,
    pub network: Network,
    pub host: IpAddr,
    pub port: u16,
    pub payment_timeout: Duration,
    pub poll_interval: Duration,
    pub verification_mode: VerificationMode,
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let target_api_url = required("TARGET_API_URL")?;
        let keypair_raw = required("SPG_WALLET_KEYPAIR")?;
        let facilitator_raw = required("FACILITATOR_ADDRESS")?;
        let fee_raw = required("FEE_AMOUNT")?;
        let cluster_raw = required("SOLANA_CLUSTER")?;

        url::Url::parse(&target_api_url)
            .map_err(|e| ConfigError::invalid("TARGET_API_URL", e.to_string()))?;

        let receiver = parse_keypair(&keypair_raw)?.pubkey();

        let facilitator = Pubkey::from_str(facilitator_raw.trim())
            .map_err(|e| ConfigError::invalid("FACILITATOR_ADDRESS", e.to_string()))?;

        let fee_amount = Decimal::from_str(fee_raw.trim())
            .map_err(|_| ConfigError::invalid("FEE_AMOUNT", "must be a positive number"))?;
        if fee_amount <= Decimal::ZERO {
            return Err(ConfigError::invalid("FEE_AMOUNT", "must be a positive number"));
        }
        let fee_lamports = to_lamports(fee_amount)?;

        let network: Network = cluster_raw.parse()?;

        let host = match lookup("HOST") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("HOST", format!("'{}' is not an IP address", raw)))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::invalid("PORT", format!("'{}' is not a port", raw)))?,
            None => 3000,
        };

        let verification_mode = match lookup("VERIFICATION_MODE") {
            Some(raw) => raw.parse()?,
            None => VerificationMode::default(),
        };

        let rpc_url = lookup("SOLANA_RPC_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| network.default_rpc_url().to_string());

        Ok(Self {
            target_api_url,
            receiver,
            facilitator,
            fee_amount,
            fee_lamports,
            network,
            host,
            port,
            payment_timeout: millis(&lookup, "PAYMENT_TIMEOUT_MS", 30_000)?,
            poll_interval: millis(&lookup, "POLL_INTERVAL_MS", 1_000)?,
            verification_mode,
            rpc_url,
            rpc_timeout: millis(&lookup, "RPC_TIMEOUT_MS", 10_000)?,
            upstream_timeout: millis(&lookup, "UPSTREAM_TIMEOUT_MS", 30_000)?,
        })
    }

}

/// Exact lamport value of a SOL amount. Sub-lamport precision is rejected so the
/// amount a strict match expects is never rounded.
fn to_lamports(fee: Decimal) -> Result<u64, ConfigError> {
    let lamports = fee
        .checked_mul(Decimal::from(LAMPORTS_PER_SOL))
        .ok_or_else(|| ConfigError::invalid("FEE_AMOUNT", "is too large"))?;

    if !lamports.fract().is_zero() {
        return Err(ConfigError::invalid(
            "FEE_AMOUNT",
            format!("{} SOL is not a whole number of lamports", fee),
        ));
    }

    match lamports.to_u64() {
        Some(value) if value >= 1 => Ok(value),
        Some(_) => Err(ConfigError::invalid("FEE_AMOUNT", "must be at least 1 lamport")),
        None => Err(ConfigError::invalid("FEE_AMOUNT", "is too large")),
    }
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::invalid(key, format!("'{}' is not a number of milliseconds", raw)))?,
        None => default,
    };
    if value == 0 {
        return Err(ConfigError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

/// Parse a JSON array of secret key bytes into a keypair
fn parse_keypair(raw: &str) -> Result<Keypair, ConfigError> {
    let bytes: Vec<u8> = serde_json::from_str(raw).map_err(|e| {
        ConfigError::invalid("SPG_WALLET_KEYPAIR", format!("must be a JSON array of bytes: {}", e))
    })?;

    Keypair::try_from(bytes.as_slice())
        .map_err(|e| ConfigError::invalid("SPG_WALLET_KEYPAIR", e.to_string()))
}
