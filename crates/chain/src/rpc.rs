//! JSON-RPC backed [`Ledger`] implementation.
//!
//! Wraps the blocking Solana `RpcClient`; every call runs on the blocking
//! pool under a request timeout so a hung node cannot stall the scheduler.
//!
//! A timed-out call may still complete in the background, so submission
//! never reports a failure while the transaction could still land: after
//! sending, the signature is polled until it lands, fails, or its
//! blockhash expires.

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::RpcFilterType;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::ledger::{Ledger, LedgerError, RawAccount, Slot};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between signature status polls.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on waiting for a submitted signature. Longer than a
/// blockhash stays valid, so past it the transaction can no longer land.
const CONFIRM_WINDOW: Duration = Duration::from_secs(90);

/// What the cluster knows about a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fate {
    /// Reached the configured commitment.
    Landed,
    /// Executed with an error.
    Failed(String),
    /// Not yet seen, blockhash still valid.
    Pending,
    /// Not seen and the blockhash expired: it will never land.
    Expired,
}

/// Await `send`, then poll until the signature's fate is known.
///
/// Transient send errors do not end the wait, since the node may have
/// accepted the transaction before the error surfaced.
async fn settle<S, P, Fut>(
    signature: Signature,
    send: S,
    mut poll: P,
    interval: Duration,
    window: Duration,
) -> Result<Signature, LedgerError>
where
    S: Future<Output = Result<Signature, LedgerError>>,
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<Fate, LedgerError>>,
{
    match send.await {
        Ok(_) => {}
        Err(e) if e.is_transient() => {
            warn!(signature = %signature, error = %e, "Submission outcome unknown, polling status");
        }
        Err(e) => return Err(e),
    }

    let started = Instant::now();
    loop {
        match poll().await {
            Ok(Fate::Landed) => return Ok(signature),
            Ok(Fate::Failed(reason)) => return Err(LedgerError::Rejected(reason)),
            Ok(Fate::Expired) => {
                return Err(LedgerError::Rpc(format!(
                    "transaction {signature} expired before landing"
                )))
            }
            Ok(Fate::Pending) => {}
            Err(e) if e.is_transient() => {
                debug!(signature = %signature, error = %e, "Status poll failed");
            }
            Err(e) => return Err(e),
        }
        if started.elapsed() >= window {
            return Err(LedgerError::Timeout {
                method: "confirmTransaction",
                elapsed: started.elapsed(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Ledger client speaking JSON-RPC to a single endpoint.
#[derive(Clone)]
pub struct RpcLedger {
    client: Arc<RpcClient>,
    url: String,
    commitment: CommitmentConfig,
    request_timeout: Duration,
}

impl RpcLedger {
    /// Create a client with `confirmed` commitment and the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, CommitmentConfig::confirmed(), DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with explicit commitment and timeout.
    pub fn with_config(
        url: impl Into<String>,
        commitment: CommitmentConfig,
        request_timeout: Duration,
    ) -> Self {
        let url = url.into();
        info!(
            url = %url,
            commitment = ?commitment.commitment,
            timeout_ms = request_timeout.as_millis() as u64,
            "Initializing RPC ledger client"
        );
        Self {
            client: Arc::new(RpcClient::new_with_commitment(url.clone(), commitment)),
            url,
            commitment,
            request_timeout,
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run a blocking client call off the async runtime, bounded by the
    /// request timeout.
    async fn call<T, F>(&self, method: &'static str, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&RpcClient) -> Result<T, LedgerError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let elapsed = self.request_timeout;
        let task = tokio::task::spawn_blocking(move || f(&client));
        match timeout(elapsed, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(LedgerError::Rpc(format!(
                "{method} worker failed: {join_err}"
            ))),
            Err(_) => Err(LedgerError::Timeout { method, elapsed }),
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn slot(&self) -> Result<Slot, LedgerError> {
        let commitment = self.commitment;
        self.call("getSlot", move |c| {
            c.get_slot_with_commitment(commitment).map_err(LedgerError::from)
        })
        .await
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Vec<u8>, LedgerError> {
        let address = *address;
        let commitment = self.commitment;
        self.call("getAccountInfo", move |c| {
            let response = c
                .get_account_with_commitment(&address, commitment)
                .map_err(LedgerError::from)?;
            response
                .value
                .map(|account| account.data)
                .ok_or(LedgerError::NotFound(address))
        })
        .await
    }

    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<RawAccount>, LedgerError> {
        let program_id = *program_id;
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..Default::default()
            },
            ..Default::default()
        };
        let accounts = self
            .call("getProgramAccounts", move |c| {
                c.get_program_accounts_with_config(&program_id, config)
                    .map_err(LedgerError::from)
            })
            .await?;
        debug!(program = %program_id, count = accounts.len(), "Fetched program accounts");
        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, LedgerError> {
        let token_account = *token_account;
        let commitment = self.commitment;
        self.call("getTokenAccountBalance", move |c| {
            let balance = c
                .get_token_account_balance_with_commitment(&token_account, commitment)
                .map_err(LedgerError::from)?
                .value;
            balance
                .amount
                .parse::<u64>()
                .map_err(|e| LedgerError::Rpc(format!("invalid token amount `{}`: {e}", balance.amount)))
        })
        .await
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.call("getLatestBlockhash", |c| {
            c.get_latest_blockhash().map_err(LedgerError::from)
        })
        .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let signature = transaction.signatures.first().copied().unwrap_or_default();
        let blockhash = transaction.message.recent_blockhash;
        let commitment = self.commitment;

        let send = {
            let transaction = transaction.clone();
            self.call("sendTransaction", move |c| {
                c.send_transaction(&transaction).map_err(LedgerError::from)
            })
        };
        let poll = move || async move {
            let statuses = self
                .call("getSignatureStatuses", move |c| {
                    c.get_signature_statuses(&[signature])
                        .map_err(LedgerError::from)
                })
                .await?;
            match statuses.value.into_iter().next().flatten() {
                Some(status) => {
                    let landed = status.satisfies_commitment(commitment);
                    Ok(match status.err {
                        Some(err) => Fate::Failed(err.to_string()),
                        None if landed => Fate::Landed,
                        None => Fate::Pending,
                    })
                }
                None => {
                    let valid = self
                        .call("isBlockhashValid", move |c| {
                            c.is_blockhash_valid(&blockhash, commitment)
                                .map_err(LedgerError::from)
                        })
                        .await?;
                    Ok(if valid { Fate::Pending } else { Fate::Expired })
                }
            }
        };

        settle(signature, send, poll, CONFIRM_POLL_INTERVAL, CONFIRM_WINDOW).await
    }
}
