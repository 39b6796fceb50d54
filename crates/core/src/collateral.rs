//! Receiving token accounts for every listed asset.
//!
//! Liquidation pays seized collateral into the wallet's associated token
//! account for that mint and draws repayment from the settlement asset's
//! account, so all of them must exist before the scheduler starts.

use anyhow::{Context, Result};
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use synth_liquidator_chain::token::{associated_token_address, create_associated_account_ix};
use synth_liquidator_chain::{Ledger, LedgerError, TransactionSender};
use tracing::{info, instrument, warn};

use crate::state::AssetsList;

/// Mint → wallet token account.
#[derive(Debug, Clone, Default)]
pub struct CollateralAccountSet {
    accounts: HashMap<Pubkey, Pubkey>,
}

impl CollateralAccountSet {
    /// Derive the associated token account of `wallet` for every mint in
    /// `assets`.
    pub fn derive(wallet: &Pubkey, assets: &AssetsList) -> Self {
        let accounts = assets
            .mints()
            .map(|mint| (mint, associated_token_address(wallet, &mint)))
            .collect();
        Self { accounts }
    }

    pub fn get(&self, mint: &Pubkey) -> Option<Pubkey> {
        self.accounts.get(mint).copied()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pubkey, &Pubkey)> {
        self.accounts.iter()
    }
}

/// Ensure the wallet holds a token account for every listed mint.
///
/// Missing accounts are created when `create_missing` is set; otherwise
/// their absence is a startup error.
#[instrument(skip_all, fields(wallet = %sender.pubkey()))]
pub async fn provision(
    ledger: &dyn Ledger,
    sender: &TransactionSender,
    assets: &AssetsList,
    create_missing: bool,
) -> Result<CollateralAccountSet> {
    let wallet = sender.pubkey();
    let set = CollateralAccountSet::derive(&wallet, assets);

    let checks = set.iter().map(|(mint, account)| async move {
        let exists = match ledger.account_data(account).await {
            Ok(_) => Ok(true),
            Err(LedgerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        };
        (*mint, exists)
    });

    let mut missing = Vec::new();
    for (mint, exists) in join_all(checks).await {
        if !exists.with_context(|| format!("Failed to check token account for mint {mint}"))? {
            missing.push(mint);
        }
    }

    if missing.is_empty() {
        info!(accounts = set.len(), "All receiving token accounts present");
        return Ok(set);
    }

    if !create_missing {
        anyhow::bail!(
            "Wallet {} lacks token accounts for {} mint(s): {:?}",
            wallet,
            missing.len(),
            missing
        );
    }

    warn!(missing = missing.len(), "Creating missing receiving token accounts");
    for mint in missing {
        let ix = create_associated_account_ix(&wallet, &wallet, &mint);
        let signature = sender
            .send(&[ix])
            .await
            .with_context(|| format!("Failed to create token account for mint {mint}"))?;
        info!(mint = %mint, signature = %signature, "Token account created");
    }

    Ok(set)
}
