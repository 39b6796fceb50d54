//! Dual-cadence deadline scheduler.
//!
//! One cooperative loop drives two timers:
//! - a coarse full scan that refreshes exchange state, prices and the
//!   at-risk candidate set
//! - a fine at-risk check that liquidates every candidate whose deadline
//!   has been reached, in deadline order
//!
//! The scheduler owns all mutable agent state; nothing here is shared
//! across tasks.

use anyhow::Context;
use solana_sdk::pubkey::Pubkey;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use synth_liquidator_chain::Slot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::collateral::{self, CollateralAccountSet};
use crate::context::AgentContext;
use crate::liquidator::{ExecutionContext, LiquidationOutcome, Liquidator, SkipReason};
use crate::policy::selector_from_config;
use crate::prices::PriceSnapshot;
use crate::scanner::{Candidate, RiskScanner, ScanBatch, ScanStats};
use crate::state::{AssetsList, ExchangeState};
use crate::supervisor::Failure;
use crate::sync::Synchronizer;
use crate::valuation::Valuation;

/// At-risk candidates, ascending by liquidation deadline.
#[derive(Debug, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Take ownership of a scan batch, re-sorting it if it arrives out of
    /// order.
    pub fn from_batch(batch: ScanBatch) -> Self {
        Self::from_vec(batch.collect())
    }

    pub fn from_vec(mut candidates: Vec<Candidate>) -> Self {
        let sorted = candidates.windows(2).all(|pair| {
            pair[0].current().liquidation_deadline <= pair[1].current().liquidation_deadline
        });
        if !sorted {
            warn!(
                count = candidates.len(),
                "Candidate batch not ordered by deadline, re-sorting"
            );
            candidates.sort_by_key(|c| c.current().liquidation_deadline);
        }
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Earliest deadline, if any.
    pub fn first_deadline(&self) -> Option<Slot> {
        self.candidates
            .first()
            .map(|c| c.current().liquidation_deadline)
    }

    pub fn deadlines(&self) -> Vec<Slot> {
        self.candidates
            .iter()
            .map(|c| c.current().liquidation_deadline)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Candidate> {
        self.candidates.iter_mut()
    }

    /// Drop `stale` and unflagged candidates, then restore deadline order
    /// after in-place refreshes. Returns how many were dropped.
    pub fn prune_and_resort(&mut self, stale: &[Pubkey]) -> usize {
        let before = self.candidates.len();
        self.candidates
            .retain(|c| c.current().is_flagged() && !stale.contains(c.address()));
        self.candidates
            .sort_by_key(|c| c.current().liquidation_deadline);
        let dropped = before - self.candidates.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.candidates.len(), "Pruned stale candidates");
        }
        dropped
    }
}

/// Counters from one at-risk check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub slot: Option<Slot>,
    pub due: usize,
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub halted: bool,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scan: Option<ScanStats>,
    pub check: Option<CheckReport>,
}

/// Owns candidates, market snapshots and both timers.
pub struct Scheduler {
    ctx: AgentContext,
    scanner: RiskScanner,
    liquidator: Liquidator,
    state: Synchronizer<ExchangeState>,
    assets: Synchronizer<AssetsList>,
    prices: Arc<PriceSnapshot>,
    token_accounts: CollateralAccountSet,
    candidates: CandidateSet,
    full_scan_interval: Duration,
    at_risk_check_interval: Duration,
    epsilon: Duration,
    last_full_scan_at: Option<Instant>,
    last_fine_check_at: Option<Instant>,
    next_full_scan: Instant,
    next_at_risk_check: Instant,
    completed_ticks: u64,
}

impl Scheduler {
    /// Load exchange accounts, wait for prices and provision receiving
    /// token accounts. Both timers are due immediately afterwards.
    #[instrument(skip_all, fields(state = %ctx.addresses.state))]
    pub async fn bootstrap(ctx: AgentContext, prices: Arc<PriceSnapshot>) -> anyhow::Result<Self> {
        let ledger = ctx.ledger.as_ref();
        let state = Synchronizer::<ExchangeState>::load(ledger, ctx.addresses.state)
            .await
            .context("Failed to load exchange state")?;
        let assets = Synchronizer::<AssetsList>::load(ledger, state.current().assets_list)
            .await
            .context("Failed to load assets list")?;

        let timing = &ctx.config.scanner;
        tokio::time::timeout(timing.price_ready_timeout(), prices.wait_ready())
            .await
            .context("Price snapshot did not become ready")?;

        let token_accounts = collateral::provision(
            ledger,
            &ctx.sender,
            assets.current(),
            ctx.config.liquidation.create_missing_accounts,
        )
        .await?;

        let selector = selector_from_config(&ctx.config.liquidation)?;
        let liquidator = Liquidator::new(
            ctx.sender.clone(),
            ctx.addresses.program_id,
            ctx.addresses.state,
            selector,
        )
        .with_min_repay(ctx.config.liquidation.min_repay_amount);

        info!(
            wallet = %ctx.wallet(),
            assets = assets.current().assets.len(),
            collaterals = assets.current().collaterals.len(),
            synthetics = assets.current().synthetics.len(),
            threshold_bps = state.current().liquidation_threshold_bps,
            policy = liquidator.policy(),
            "Scheduler bootstrapped"
        );

        let now = Instant::now();
        Ok(Self {
            scanner: RiskScanner::new(ctx.addresses.program_id),
            full_scan_interval: timing.full_scan_interval(),
            at_risk_check_interval: timing.at_risk_check_interval(),
            epsilon: timing.loop_epsilon(),
            ctx,
            liquidator,
            state,
            assets,
            prices,
            token_accounts,
            candidates: CandidateSet::default(),
            last_full_scan_at: None,
            last_fine_check_at: None,
            next_full_scan: now,
            next_at_risk_check: now,
            completed_ticks: 0,
        })
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn next_full_scan(&self) -> Instant {
        self.next_full_scan
    }

    pub fn next_at_risk_check(&self) -> Instant {
        self.next_at_risk_check
    }

    pub fn last_full_scan_at(&self) -> Option<Instant> {
        self.last_full_scan_at
    }

    pub fn last_fine_check_at(&self) -> Option<Instant> {
        self.last_fine_check_at
    }

    pub fn completed_ticks(&self) -> u64 {
        self.completed_ticks
    }

    /// Make both timers due at `now`, forcing a full scan on the next tick.
    pub fn reset(&mut self, now: Instant) {
        self.next_full_scan = now;
        self.next_at_risk_check = now;
    }

    /// When the loop should wake next.
    pub fn next_wake(&self) -> Instant {
        self.next_full_scan.min(self.next_at_risk_check) + self.epsilon
    }

    /// Fire whichever timers are due at `now`.
    pub async fn tick(&mut self, now: Instant) -> Result<TickReport, Failure> {
        let mut report = TickReport::default();
        if now >= self.next_full_scan {
            report.scan = Some(self.full_scan(now).await?);
        }
        if now >= self.next_at_risk_check {
            report.check = Some(self.fine_check(now).await?);
        }
        self.completed_ticks += 1;
        Ok(report)
    }

    /// One full scan followed by one at-risk check.
    pub async fn run_once(&mut self) -> Result<TickReport, Failure> {
        let now = Instant::now();
        self.reset(now);
        self.tick(now).await
    }

    /// Tick forever. Returns only on failure.
    pub async fn run(&mut self) -> Result<Infallible, Failure> {
        info!(
            full_scan_secs = self.full_scan_interval.as_secs(),
            at_risk_check_ms = self.at_risk_check_interval.as_millis() as u64,
            "Scheduler loop started"
        );
        loop {
            self.tick(Instant::now()).await?;
            sleep_until(self.next_wake()).await;
        }
    }

    /// Refresh exchange state, assets and prices, then replace the
    /// candidate set with a fresh scan.
    #[instrument(skip_all)]
    pub async fn full_scan(&mut self, now: Instant) -> Result<ScanStats, Failure> {
        let ledger = self.ctx.ledger.as_ref();

        self.state
            .refresh(ledger)
            .await
            .map_err(|e| Failure::from_sync("exchange state refresh", e))?;

        let assets_address = self.state.current().assets_list;
        if assets_address != *self.assets.address() {
            warn!(
                old = %self.assets.address(),
                new = %assets_address,
                "Assets list moved, reloading"
            );
            self.assets = Synchronizer::load(ledger, assets_address)
                .await
                .map_err(|e| Failure::from_sync("assets list reload", e))?;
            self.token_accounts =
                CollateralAccountSet::derive(&self.ctx.wallet(), self.assets.current());
        } else {
            self.assets
                .refresh(ledger)
                .await
                .map_err(|e| Failure::from_sync("assets list refresh", e))?;
        }
        self.prices.update_from_assets(self.assets.current());

        let valuation = Valuation::new(self.assets.current(), self.state.current(), &self.prices)
            .map_err(|e| Failure::fatal("valuation", e))?;
        let batch = self
            .scanner
            .scan(ledger, &valuation)
            .await
            .map_err(|e| Failure::from_ledger("risk scan", e))?;

        let stats = batch.stats();
        self.candidates = CandidateSet::from_batch(batch);
        self.last_full_scan_at = Some(now);
        self.next_full_scan = now + self.full_scan_interval;
        Ok(stats)
    }

    /// Liquidate the maximal due prefix of the candidate set.
    ///
    /// Rejections and stale candidates are logged and skipped; only
    /// transient ledger failures abort the check.
    #[instrument(skip_all)]
    pub async fn fine_check(&mut self, now: Instant) -> Result<CheckReport, Failure> {
        let report = if self.candidates.is_empty() {
            debug!("No at-risk candidates");
            CheckReport::default()
        } else {
            self.check_due().await?
        };
        self.last_fine_check_at = Some(now);
        self.next_at_risk_check = now + self.at_risk_check_interval;
        Ok(report)
    }

    async fn check_due(&mut self) -> Result<CheckReport, Failure> {
        let started = std::time::Instant::now();
        let ledger = self.ctx.ledger.as_ref();
        let slot = ledger
            .slot()
            .await
            .map_err(|e| Failure::from_ledger("slot query", e))?;
        let mut report = CheckReport {
            slot: Some(slot),
            ..Default::default()
        };

        if self.candidates.first_deadline().map_or(true, |d| d > slot) {
            debug!(slot, next_deadline = ?self.candidates.first_deadline(), "Nothing due");
            return Ok(report);
        }

        let state = self.state.current();
        if state.halted {
            warn!(slot, "Exchange halted, skipping liquidations");
            report.halted = true;
            return Ok(report);
        }

        let assets = self.assets.current();
        let valuation = Valuation::new(assets, state, &self.prices)
            .map_err(|e| Failure::fatal("valuation", e))?;
        let settlement_account = assets
            .settlement()
            .and_then(|s| self.token_accounts.get(&s.mint))
            .ok_or_else(|| {
                Failure::fatal("settlement account", "no token account for the settlement asset")
            })?;

        // Fetched lazily once, then decremented per submission.
        let mut available: Option<u64> = None;
        let mut stale: Vec<Pubkey> = Vec::new();
        let mut failure: Option<Failure> = None;

        for candidate in self.candidates.iter_mut() {
            if candidate.current().liquidation_deadline > slot {
                break;
            }
            report.due += 1;

            let balance = match available {
                Some(balance) => balance,
                None => match ledger.token_balance(&settlement_account).await {
                    Ok(balance) => {
                        debug!(balance, "Settlement balance fetched");
                        balance
                    }
                    Err(e) => {
                        failure = Some(Failure::from_ledger("settlement balance", e));
                        break;
                    }
                },
            };

            let exec = ExecutionContext {
                valuation: &valuation,
                token_accounts: &self.token_accounts,
                slot,
                available: balance,
            };
            match self.liquidator.execute(ledger, candidate, &exec).await {
                Ok(LiquidationOutcome::Submitted(result)) => {
                    available = Some(balance.saturating_sub(result.amount));
                    report.executed += 1;
                }
                Ok(LiquidationOutcome::Skipped(reason)) => {
                    available = Some(balance);
                    debug!(account = %candidate.address(), reason = ?reason, "Candidate skipped");
                    if matches!(reason, SkipReason::Closed | SkipReason::Solvent { .. }) {
                        stale.push(*candidate.address());
                    }
                    report.skipped += 1;
                }
                Err(e) if e.is_transient() => {
                    failure = Some(Failure::from_exec("liquidation", e));
                    break;
                }
                Err(e) => {
                    available = Some(balance);
                    error!(account = %candidate.address(), error = %e, "Liquidation failed");
                    report.failed += 1;
                }
            }
        }

        // Refreshes may have cleared or moved deadlines.
        self.candidates.prune_and_resort(&stale);
        if let Some(failure) = failure {
            return Err(failure);
        }

        info!(
            slot,
            due = report.due,
            executed = report.executed,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "At-risk batch processed"
        );
        Ok(report)
    }
}
