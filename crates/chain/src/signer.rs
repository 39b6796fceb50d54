//! Signing identity and transaction submission.
//!
//! The agent signs with exactly one keypair. Every submission consumes a
//! position in that identity's sequence on the ledger, so callers submit
//! one transaction at a time and wait for the outcome.

use anyhow::{Context, Result};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ledger::{Ledger, LedgerError};

/// Where the signing key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Base58-encoded 64-byte secret key (e.g. from an environment variable).
    Base58(String),
    /// Solana CLI keypair file (JSON byte array).
    File(std::path::PathBuf),
}

/// Load a keypair from the given source.
pub fn load_keypair(source: &KeySource) -> Result<Keypair> {
    match source {
        KeySource::Base58(encoded) => {
            let bytes = bs58::decode(encoded.trim())
                .into_vec()
                .context("Secret key is not valid base58")?;
            keypair_from_bytes(&bytes)
        }
        KeySource::File(path) => load_keypair_file(path),
    }
}

fn load_keypair_file(path: &Path) -> Result<Keypair> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read keypair file {}", path.display()))?;
    let bytes: Vec<u8> = serde_json::from_slice(&raw)
        .with_context(|| format!("Keypair file {} is not a JSON byte array", path.display()))?;
    keypair_from_bytes(&bytes)
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair> {
    if bytes.len() != 64 {
        anyhow::bail!("Expected 64 secret key bytes, got {}", bytes.len());
    }
    Keypair::from_bytes(bytes).map_err(|e| anyhow::anyhow!("Invalid keypair: {}", e))
}

/// Builds, signs and submits transactions for the agent's wallet.
pub struct TransactionSender {
    ledger: Arc<dyn Ledger>,
    payer: Keypair,
    /// Transactions submitted by this process (accepted or not).
    submitted: AtomicU64,
    /// Held from blockhash fetch until the submission settles.
    submit_lock: Mutex<()>,
}

impl TransactionSender {
    /// Create a sender for `payer` over `ledger`.
    pub fn new(ledger: Arc<dyn Ledger>, payer: Keypair) -> Self {
        info!(wallet = %payer.pubkey(), "Transaction sender initialized");
        Self {
            ledger,
            payer,
            submitted: AtomicU64::new(0),
            submit_lock: Mutex::new(()),
        }
    }

    /// Wallet address of the signing identity.
    pub fn pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    /// Number of transactions submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Sign `instructions` with the wallet as fee payer and submit.
    ///
    /// Submissions are serialized: a second call waits until the first
    /// transaction's fate is known.
    pub async fn send(&self, instructions: &[Instruction]) -> Result<Signature, LedgerError> {
        let _turn = self.submit_lock.lock().await;
        let start = Instant::now();
        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.payer.pubkey()),
            &[&self.payer],
            blockhash,
        );

        let sequence = self.submitted.fetch_add(1, Ordering::Relaxed);
        let signature = self.ledger.send_transaction(&transaction).await?;

        debug!(
            signature = %signature,
            sequence,
            instructions = instructions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transaction submitted"
        );
        Ok(signature)
    }
}
