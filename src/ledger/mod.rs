pub mod client;
pub mod models;
pub mod solana;

pub use client::LedgerClient;
pub use models::SettlementDetails;
pub use solana::{SolanaLedgerClient, SolanaLedgerConfig};

#[cfg(test)]
pub(crate) mod testing;
