//! Collateral selection policies.
//!
//! The executor seizes exactly one collateral per liquidation. Which one
//! is decided by a [`CollateralSelector`] chosen at startup from
//! [`LiquidationConfig`].

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

use crate::config::{CollateralPolicyKind, LiquidationConfig};
use crate::state::{Collateral, ExchangeAccount};
use crate::valuation::Valuation;

/// Picks the collateral to seize from an account.
pub trait CollateralSelector: Send + Sync {
    fn name(&self) -> &'static str;

    /// A listed collateral the account holds a non-zero amount of, or
    /// `None` if there is nothing to seize.
    fn select<'a>(
        &self,
        account: &ExchangeAccount,
        valuation: &Valuation<'a>,
    ) -> Option<&'a Collateral>;
}

/// Seize the collateral with the highest USD value.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestValue;

impl CollateralSelector for LargestValue {
    fn name(&self) -> &'static str {
        "largest_value"
    }

    fn select<'a>(
        &self,
        account: &ExchangeAccount,
        valuation: &Valuation<'a>,
    ) -> Option<&'a Collateral> {
        let assets = valuation.assets;
        account
            .collaterals
            .iter()
            .filter(|entry| entry.amount > 0)
            .filter_map(|entry| {
                let value = valuation.collateral_value(&entry.mint, entry.amount).ok()?;
                Some((value, assets.collateral_by_mint(&entry.mint)?))
            })
            .max_by_key(|(value, _)| *value)
            .map(|(_, collateral)| collateral)
    }
}

/// Seize the first held mint in a fixed preference order, falling back to
/// [`LargestValue`] when the account holds none of them.
#[derive(Debug, Clone)]
pub struct Priority {
    order: Vec<Pubkey>,
}

impl Priority {
    pub fn new(order: Vec<Pubkey>) -> Self {
        Self { order }
    }
}

impl CollateralSelector for Priority {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn select<'a>(
        &self,
        account: &ExchangeAccount,
        valuation: &Valuation<'a>,
    ) -> Option<&'a Collateral> {
        let assets = valuation.assets;
        let preferred = self
            .order
            .iter()
            .filter(|mint| account.collateral_amount(mint) > 0)
            .find_map(|mint| assets.collateral_by_mint(mint));

        preferred.or_else(|| {
            debug!("No preferred collateral held, falling back to largest value");
            LargestValue.select(account, valuation)
        })
    }
}

/// Build the selector named by the configuration.
pub fn selector_from_config(config: &LiquidationConfig) -> Result<Box<dyn CollateralSelector>> {
    match config.collateral_policy {
        CollateralPolicyKind::LargestValue => Ok(Box::new(LargestValue)),
        CollateralPolicyKind::Priority => {
            if config.collateral_priority.is_empty() {
                anyhow::bail!("Collateral policy `priority` needs a non-empty collateral_priority");
            }
            let order = config
                .collateral_priority
                .iter()
                .map(|mint| {
                    Pubkey::from_str(mint).with_context(|| format!("Invalid priority mint {mint}"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(Priority::new(order)))
        }
    }
}
