//! Fixed-point valuation of exchange accounts.
//!
//! All values are USD with [`PRICE_DECIMALS`] decimals held in `u128`, so
//! a `u64` amount times a `u64` price never overflows. Decimals come from
//! on-chain data and are not trusted: every scale factor and sum is
//! checked, and an unrepresentable value is a [`ValuationError::Overflow`].

use solana_sdk::pubkey::Pubkey;

use crate::prices::{PriceSnapshot, PRICE_DECIMALS};
use crate::state::{AssetsList, ExchangeAccount, ExchangeState};

/// Basis-point denominator.
pub const BPS: u128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValuationError {
    #[error("no price for feed {0}")]
    MissingPrice(Pubkey),
    #[error("collateral mint {0} is not listed")]
    UnknownCollateral(Pubkey),
    #[error("asset index {0} out of range")]
    UnknownAsset(u8),
    #[error("assets list has no settlement asset")]
    NoSettlementAsset,
    #[error("settlement asset has zero price")]
    ZeroSettlementPrice,
    #[error("value out of range")]
    Overflow,
}

/// `a * b / c`, splitting `a` so the intermediate stays small when
/// `b, c <= u64::MAX`. Zero when `c` is zero, `None` on overflow.
#[inline]
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return Some(0);
    }
    let whole = (a / c).checked_mul(b)?;
    let part = (a % c).checked_mul(b)? / c;
    whole.checked_add(part)
}

/// USD value of `amount` base units at `price`.
#[inline]
pub fn value_of(amount: u64, decimals: u8, price: u64) -> Option<u128> {
    let scale = 10u128.checked_pow(decimals as u32)?;
    mul_div(amount as u128, price as u128, scale)
}

/// Collateral and debt value of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountHealth {
    pub collateral_value: u128,
    pub debt_value: u128,
}

impl AccountHealth {
    /// Collateral value divided by debt value; `None` without debt.
    pub fn ratio(&self) -> Option<f64> {
        if self.debt_value == 0 {
            return None;
        }
        Some(self.collateral_value as f64 / self.debt_value as f64)
    }

    /// Strictly below `threshold_bps`. Accounts without debt never are.
    pub fn is_below(&self, threshold_bps: u32) -> bool {
        if self.debt_value == 0 {
            return false;
        }
        let collateral = self.collateral_value.checked_mul(BPS);
        let required = self.debt_value.checked_mul(threshold_bps as u128);
        match (collateral, required) {
            (Some(collateral), Some(required)) => collateral < required,
            // Scaled collateral past u128 covers any debt.
            (None, _) => false,
            (Some(_), None) => true,
        }
    }

    /// Debt value in whole USD, for logging.
    pub fn debt_usd(&self) -> f64 {
        self.debt_value as f64 / 10f64.powi(PRICE_DECIMALS as i32)
    }

    /// Collateral value in whole USD, for logging.
    pub fn collateral_usd(&self) -> f64 {
        self.collateral_value as f64 / 10f64.powi(PRICE_DECIMALS as i32)
    }
}

/// Values accounts against one consistent view of the market.
pub struct Valuation<'a> {
    pub assets: &'a AssetsList,
    pub state: &'a ExchangeState,
    pub prices: &'a PriceSnapshot,
    total_debt_value: u128,
}

impl<'a> Valuation<'a> {
    /// Build a valuation, pricing the exchange's total synthetic debt once.
    pub fn new(
        assets: &'a AssetsList,
        state: &'a ExchangeState,
        prices: &'a PriceSnapshot,
    ) -> Result<Self, ValuationError> {
        let mut total_debt_value = 0u128;
        for synthetic in &assets.synthetics {
            let price = price_for(assets, prices, synthetic.asset_index)?;
            total_debt_value = value_of(synthetic.supply, synthetic.decimals, price)
                .and_then(|v| total_debt_value.checked_add(v))
                .ok_or(ValuationError::Overflow)?;
        }
        Ok(Self {
            assets,
            state,
            prices,
            total_debt_value,
        })
    }

    pub fn total_debt_value(&self) -> u128 {
        self.total_debt_value
    }

    /// Debt value attributable to `debt_shares`.
    pub fn debt_value(&self, debt_shares: u64) -> Result<u128, ValuationError> {
        mul_div(
            self.total_debt_value,
            debt_shares as u128,
            self.state.debt_shares as u128,
        )
        .ok_or(ValuationError::Overflow)
    }

    /// USD value of one collateral entry.
    pub fn collateral_value(&self, mint: &Pubkey, amount: u64) -> Result<u128, ValuationError> {
        let collateral = self
            .assets
            .collateral_by_mint(mint)
            .ok_or(ValuationError::UnknownCollateral(*mint))?;
        let price = price_for(self.assets, self.prices, collateral.asset_index)?;
        value_of(amount, collateral.decimals, price).ok_or(ValuationError::Overflow)
    }

    pub fn health(&self, account: &ExchangeAccount) -> Result<AccountHealth, ValuationError> {
        let mut collateral_value = 0u128;
        for entry in &account.collaterals {
            collateral_value = collateral_value
                .checked_add(self.collateral_value(&entry.mint, entry.amount)?)
                .ok_or(ValuationError::Overflow)?;
        }
        Ok(AccountHealth {
            collateral_value,
            debt_value: self.debt_value(account.debt_shares)?,
        })
    }

    /// Whether `account` is strictly below the exchange threshold.
    pub fn is_at_risk(&self, account: &ExchangeAccount) -> Result<bool, ValuationError> {
        Ok(self
            .health(account)?
            .is_below(self.state.liquidation_threshold_bps))
    }

    /// Convert a USD value into settlement-asset base units, rounding down.
    pub fn to_settlement_units(&self, value: u128) -> Result<u64, ValuationError> {
        let settlement = self
            .assets
            .settlement()
            .ok_or(ValuationError::NoSettlementAsset)?;
        let price = price_for(self.assets, self.prices, settlement.asset_index)?;
        if price == 0 {
            return Err(ValuationError::ZeroSettlementPrice);
        }
        let units = 10u128
            .checked_pow(settlement.decimals as u32)
            .and_then(|scale| mul_div(value, scale, price as u128))
            .ok_or(ValuationError::Overflow)?;
        Ok(u64::try_from(units).unwrap_or(u64::MAX))
    }
}

fn price_for(
    assets: &AssetsList,
    prices: &PriceSnapshot,
    asset_index: u8,
) -> Result<u64, ValuationError> {
    let asset = assets
        .asset(asset_index)
        .ok_or(ValuationError::UnknownAsset(asset_index))?;
    prices
        .get(&asset.feed_address)
        .map(|p| p.value)
        .ok_or(ValuationError::MissingPrice(asset.feed_address))
}
