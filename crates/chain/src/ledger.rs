//! Ledger access surface consumed by the liquidation agent.
//!
//! Everything the agent needs from the network goes through [`Ledger`]:
//! the slot clock, account reads, program-wide scans and transaction
//! submission. The production implementation is [`crate::RpcLedger`];
//! tests substitute an in-memory fake.

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_filter::RpcFilterType;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::time::Duration;

/// Ledger slot number.
pub type Slot = u64;

/// Raw account as returned by a program-wide scan.
pub type RawAccount = (Pubkey, Vec<u8>);

/// Errors surfaced by the ledger layer.
///
/// `NotFound` and `Rejected` are expected outcomes the caller handles
/// locally; `Rpc` and `Timeout` are transient and belong to the outer
/// error boundary.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The account does not exist (never created or closed).
    #[error("account {0} not found")]
    NotFound(Pubkey),

    /// The transaction reached the cluster and was refused.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Request did not complete in time.
    #[error("rpc request `{method}` timed out after {elapsed:?}")]
    Timeout { method: &'static str, elapsed: Duration },

    /// Transport or node-side failure.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl LedgerError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Timeout { .. })
    }
}

impl From<ClientError> for LedgerError {
    fn from(err: ClientError) -> Self {
        match err.kind() {
            ClientErrorKind::TransactionError(tx_err) => Self::Rejected(tx_err.to_string()),
            ClientErrorKind::RpcError(RpcError::RpcResponseError {
                data: RpcResponseErrorData::SendTransactionPreflightFailure(result),
                message,
                ..
            }) => {
                let logs = result.logs.as_deref().unwrap_or_default().join("; ");
                Self::Rejected(format!("{message} [{logs}]"))
            }
            _ => Self::Rpc(err.to_string()),
        }
    }
}

/// Read/submit operations against the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current slot at the configured commitment.
    async fn slot(&self) -> Result<Slot, LedgerError>;

    /// Raw data of a single account. Missing accounts yield
    /// [`LedgerError::NotFound`].
    async fn account_data(&self, address: &Pubkey) -> Result<Vec<u8>, LedgerError>;

    /// All accounts owned by `program_id` matching `filters`.
    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<RawAccount>, LedgerError>;

    /// Balance of an SPL token account, in base units.
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, LedgerError>;

    /// Blockhash to sign new transactions against.
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// Submit an already signed transaction and wait for its fate.
    ///
    /// Returns only once the transaction has landed, was refused, or can
    /// no longer land. An error never leaves a submission in flight.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;
}
