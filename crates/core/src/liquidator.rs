//! Liquidation executor for due exchange accounts.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Instant;
use synth_liquidator_chain::exchange::{self, LiquidateAccounts};
use synth_liquidator_chain::{Ledger, LedgerError, Slot, TransactionSender};
use tracing::{debug, info, instrument, warn};

use crate::collateral::CollateralAccountSet;
use crate::policy::CollateralSelector;
use crate::scanner::Candidate;
use crate::state::DecodeError;
use crate::sync::SyncError;
use crate::valuation::{Valuation, ValuationError};

/// Why a due candidate was left alone.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The account was closed since the scan.
    Closed,
    /// Collateral ratio is back at or above the threshold.
    Solvent { ratio: Option<f64> },
    /// Deadline moved past the current slot.
    NotDue { deadline: Slot },
    /// No settlement balance left this tick.
    NoBalance,
    /// Repay amount under the configured minimum.
    BelowMinimum { amount: u64, minimum: u64 },
    /// Nothing seizable on the account.
    NoCollateral,
}

/// Outcome of one executor invocation that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum LiquidationOutcome {
    Submitted(LiquidationResult),
    Skipped(SkipReason),
}

/// A submitted liquidation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationResult {
    pub account: Pubkey,
    pub collateral_mint: Pubkey,
    /// Settlement base units repaid.
    pub amount: u64,
    /// Debt in settlement base units before repayment.
    pub debt: u64,
    pub signature: Signature,
}

impl LiquidationResult {
    pub fn is_partial(&self) -> bool {
        self.amount < self.debt
    }
}

/// Executor failures. Only [`ExecError::is_transient`] ones should abort
/// the tick.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("liquidation of {account} rejected: {reason}")]
    Rejected { account: Pubkey, reason: String },

    #[error("account {account} no longer decodes: {source}")]
    Decode {
        account: Pubkey,
        #[source]
        source: DecodeError,
    },

    #[error("cannot value account {account}: {source}")]
    Valuation {
        account: Pubkey,
        #[source]
        source: ValuationError,
    },

    #[error("no receiving token account for mint {0}")]
    MissingTokenAccount(Pubkey),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl ExecError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Ledger(e) if e.is_transient())
    }
}

/// Per-tick market view handed to the executor.
///
/// `valuation` carries the prices and exchange state cached at the last
/// full scan. Only the candidate account is re-read before execution, so
/// the solvency re-check values fresh positions at per-scan prices.
pub struct ExecutionContext<'a> {
    pub valuation: &'a Valuation<'a>,
    pub token_accounts: &'a CollateralAccountSet,
    pub slot: Slot,
    /// Settlement balance still available this tick.
    pub available: u64,
}

/// Liquidation executor.
pub struct Liquidator {
    /// Signing identity
    sender: Arc<TransactionSender>,

    /// Exchange program
    program_id: Pubkey,

    /// Exchange state account
    state_address: Pubkey,

    /// Collateral selection policy
    selector: Box<dyn CollateralSelector>,

    /// Minimum repay amount (settlement base units)
    min_repay_amount: u64,
}

impl Liquidator {
    /// Create a new liquidator.
    pub fn new(
        sender: Arc<TransactionSender>,
        program_id: Pubkey,
        state_address: Pubkey,
        selector: Box<dyn CollateralSelector>,
    ) -> Self {
        Self {
            sender,
            program_id,
            state_address,
            selector,
            min_repay_amount: 0,
        }
    }

    /// Set minimum repay amount.
    pub fn with_min_repay(mut self, min_repay_amount: u64) -> Self {
        self.min_repay_amount = min_repay_amount;
        self
    }

    pub fn policy(&self) -> &'static str {
        self.selector.name()
    }

    /// Re-verify one due candidate and liquidate it if still eligible.
    ///
    /// Not retried here; the next tick re-evaluates the account from
    /// fresh state.
    #[instrument(skip_all, fields(account = %candidate.address()))]
    pub async fn execute(
        &self,
        ledger: &dyn Ledger,
        candidate: &mut Candidate,
        ctx: &ExecutionContext<'_>,
    ) -> Result<LiquidationOutcome, ExecError> {
        let started = Instant::now();
        let address = *candidate.address();

        // 1. Fresh state
        let account = match candidate.refresh(ledger).await {
            Ok(account) => account,
            Err(SyncError::NotFound(_)) => {
                debug!(account = %address, "Account closed since scan");
                return Ok(LiquidationOutcome::Skipped(SkipReason::Closed));
            }
            Err(SyncError::Decode { source, .. }) => {
                return Err(ExecError::Decode {
                    account: address,
                    source,
                })
            }
            Err(SyncError::Ledger(e)) => return Err(ExecError::Ledger(e)),
        };

        // 2. Still eligible?
        if !account.is_due(ctx.slot) {
            debug!(
                account = %address,
                deadline = account.liquidation_deadline,
                slot = ctx.slot,
                "Deadline no longer reached"
            );
            return Ok(LiquidationOutcome::Skipped(SkipReason::NotDue {
                deadline: account.liquidation_deadline,
            }));
        }

        let valuation = ctx.valuation;
        let health = valuation
            .health(account)
            .map_err(|source| ExecError::Valuation {
                account: address,
                source,
            })?;
        if !health.is_below(valuation.state.liquidation_threshold_bps) {
            debug!(account = %address, ratio = ?health.ratio(), "Account solvent again");
            return Ok(LiquidationOutcome::Skipped(SkipReason::Solvent {
                ratio: health.ratio(),
            }));
        }

        // 3. Size the repayment
        if ctx.available == 0 {
            warn!(account = %address, "No settlement balance left, skipping");
            return Ok(LiquidationOutcome::Skipped(SkipReason::NoBalance));
        }
        let debt = valuation
            .to_settlement_units(health.debt_value)
            .map_err(|source| ExecError::Valuation {
                account: address,
                source,
            })?;
        let amount = debt.min(ctx.available);
        if amount < debt {
            warn!(
                account = %address,
                debt,
                available = ctx.available,
                "Insufficient settlement balance, liquidating partially"
            );
        }
        if amount == 0 || amount < self.min_repay_amount {
            info!(
                account = %address,
                amount,
                minimum = self.min_repay_amount,
                "Repay amount below minimum, skipping"
            );
            return Ok(LiquidationOutcome::Skipped(SkipReason::BelowMinimum {
                amount,
                minimum: self.min_repay_amount,
            }));
        }

        // 4. Collateral
        let Some(collateral) = self.selector.select(account, valuation) else {
            warn!(account = %address, policy = self.selector.name(), "No collateral to seize");
            return Ok(LiquidationOutcome::Skipped(SkipReason::NoCollateral));
        };
        let settlement = valuation
            .assets
            .settlement()
            .ok_or(ExecError::Valuation {
                account: address,
                source: ValuationError::NoSettlementAsset,
            })?;
        let settlement_account = ctx
            .token_accounts
            .get(&settlement.mint)
            .ok_or(ExecError::MissingTokenAccount(settlement.mint))?;
        let collateral_account = ctx
            .token_accounts
            .get(&collateral.mint)
            .ok_or(ExecError::MissingTokenAccount(collateral.mint))?;

        info!(
            account = %address,
            owner = %account.owner,
            ratio = ?health.ratio(),
            debt_usd = health.debt_usd(),
            collateral_usd = health.collateral_usd(),
            collateral = %collateral.mint,
            amount,
            "Executing liquidation"
        );

        // 5. Submit
        let accounts = LiquidateAccounts {
            exchange_authority: valuation.state.exchange_authority,
            state: self.state_address,
            assets_list: valuation.state.assets_list,
            liquidator: self.sender.pubkey(),
            exchange_account: address,
            liquidator_settlement_account: settlement_account,
            liquidator_collateral_account: collateral_account,
            settlement_mint: settlement.mint,
            collateral_reserve: collateral.reserve_address,
            liquidation_fund: collateral.liquidation_fund,
        };
        let ix = exchange::liquidate(&self.program_id, &accounts, amount);

        let signature = self.sender.send(&[ix]).await.map_err(|e| match e {
            LedgerError::Rejected(reason) => ExecError::Rejected {
                account: address,
                reason,
            },
            other => ExecError::Ledger(other),
        })?;

        info!(
            account = %address,
            signature = %signature,
            amount,
            partial = amount < debt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Liquidation submitted"
        );

        Ok(LiquidationOutcome::Submitted(LiquidationResult {
            account: address,
            collateral_mint: collateral.mint,
            amount,
            debt,
            signature,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LargestValue;
    use crate::test_utils::{encode_assets_list, sender, AccountBuilder, FakeLedger, MarketFixture};

    struct Harness {
        market: MarketFixture,
        ledger: Arc<FakeLedger>,
        liquidator: Liquidator,
        accounts: CollateralAccountSet,
    }

    impl Harness {
        fn new() -> Self {
            let market = MarketFixture::new();
            let ledger = market.ledger();
            let sender = sender(ledger.clone());
            let accounts = market.collateral_accounts(&sender.pubkey());
            let liquidator = Liquidator::new(
                sender,
                market.program_id,
                market.state_address,
                Box::new(LargestValue),
            );
            Self {
                market,
                ledger,
                liquidator,
                accounts,
            }
        }

        async fn run(
            &self,
            candidate: &mut Candidate,
            slot: Slot,
            available: u64,
        ) -> Result<LiquidationOutcome, ExecError> {
            let prices = self.market.prices();
            let valuation =
                Valuation::new(&self.market.assets_list, &self.market.state, &prices).unwrap();
            let ctx = ExecutionContext {
                valuation: &valuation,
                token_accounts: &self.accounts,
                slot,
                available,
            };
            self.liquidator
                .execute(self.ledger.as_ref(), candidate, &ctx)
                .await
        }

        fn candidate(&self, builder: &AccountBuilder) -> Candidate {
            let address = self.ledger.add_account(builder);
            Candidate::from_raw(address, &builder.encode()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_full_liquidation_repays_whole_debt() {
        let h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));

        let outcome = h.run(&mut candidate, 10, u64::MAX).await.unwrap();

        let LiquidationOutcome::Submitted(result) = outcome else {
            panic!("expected submission, got {outcome:?}");
        };
        // $100 debt => 100 xUSD at 6 decimals
        assert_eq!(result.debt, 100_000_000);
        assert_eq!(result.amount, 100_000_000);
        assert!(!result.is_partial());
        assert_eq!(result.collateral_mint, h.market.sol_mint());
        assert_eq!(
            h.ledger.liquidations(&h.market.program_id),
            vec![(*candidate.address(), 100_000_000)]
        );
    }

    #[tokio::test]
    async fn test_partial_liquidation_is_capped_by_balance() {
        let h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));

        // Balance covers 40% of the debt
        let outcome = h.run(&mut candidate, 10, 40_000_000).await.unwrap();

        let LiquidationOutcome::Submitted(result) = outcome else {
            panic!("expected submission, got {outcome:?}");
        };
        assert_eq!(result.amount, 40_000_000);
        assert!(result.is_partial());
        assert!(result.amount <= result.debt);
    }

    #[tokio::test]
    async fn test_closed_account_is_noop() {
        let h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));
        h.ledger.close(candidate.address());

        let outcome = h.run(&mut candidate, 10, u64::MAX).await.unwrap();
        assert_eq!(outcome, LiquidationOutcome::Skipped(SkipReason::Closed));
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_recovered_account_is_noop() {
        let h = Harness::new();
        let risky = h.market.risky_account(100, 10);
        let mut candidate = h.candidate(&risky);

        // Deposit between scan and check: now 2x collateralized
        let recovered = h.market.healthy_account(100).deadline(10);
        h.ledger.put(*candidate.address(), recovered.encode());

        let outcome = h.run(&mut candidate, 10, u64::MAX).await.unwrap();
        assert!(matches!(
            outcome,
            LiquidationOutcome::Skipped(SkipReason::Solvent { .. })
        ));
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_recheck_uses_scan_time_prices() {
        let h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));

        // SOL doubles on chain after the scan; the account would be 2.4x
        let mut repriced = h.market.assets_list.clone();
        repriced.assets[1].price = 40_00000000;
        h.ledger
            .put(h.market.assets_list_address, encode_assets_list(&repriced));

        let outcome = h.run(&mut candidate, 10, u64::MAX).await.unwrap();
        assert!(matches!(outcome, LiquidationOutcome::Submitted(_)));
    }

    #[tokio::test]
    async fn test_deadline_moved_is_noop() {
        let h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));
        h.ledger
            .put(*candidate.address(), h.market.risky_account(100, 50).encode());

        let outcome = h.run(&mut candidate, 10, u64::MAX).await.unwrap();
        assert_eq!(
            outcome,
            LiquidationOutcome::Skipped(SkipReason::NotDue { deadline: 50 })
        );
    }

    #[tokio::test]
    async fn test_zero_balance_and_minimum() {
        let mut h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));

        let outcome = h.run(&mut candidate, 10, 0).await.unwrap();
        assert_eq!(outcome, LiquidationOutcome::Skipped(SkipReason::NoBalance));

        h.liquidator = h.liquidator.with_min_repay(50_000_000);
        let outcome = h.run(&mut candidate, 10, 10_000_000).await.unwrap();
        assert_eq!(
            outcome,
            LiquidationOutcome::Skipped(SkipReason::BelowMinimum {
                amount: 10_000_000,
                minimum: 50_000_000
            })
        );
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_distinct_error() {
        let h = Harness::new();
        let mut candidate = h.candidate(&h.market.risky_account(100, 10));
        h.ledger.reject_next_sends(1);

        let err = h.run(&mut candidate, 10, u64::MAX).await.unwrap_err();
        assert!(matches!(err, ExecError::Rejected { .. }));
        assert!(!err.is_transient());
    }
}
