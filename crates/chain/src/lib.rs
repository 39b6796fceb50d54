//! Liquidator chain interaction layer.
//!
//! This crate provides:
//! - The [`Ledger`] trait: slot clock, account reads, program scans, submission
//! - A JSON-RPC implementation with request timeouts
//! - Key loading and the transaction sender for the agent's wallet
//! - Exchange program discriminators and instruction builders
//! - Associated token account helpers

pub mod exchange;
mod ledger;
mod rpc;
mod signer;
pub mod token;

pub use exchange::{discriminator, LiquidateAccounts};
pub use ledger::{Ledger, LedgerError, RawAccount, Slot};
pub use rpc::RpcLedger;
pub use signer::{load_keypair, KeySource, TransactionSender};

// Re-exported so downstream crates build filters without a direct dependency.
pub use solana_client::rpc_filter::{Memcmp, RpcFilterType};
