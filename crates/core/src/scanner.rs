//! Full-population risk scan.
//!
//! Pulls every exchange account owned by the program, keeps those strictly
//! below the liquidation threshold and hands them back ordered by deadline.

use solana_sdk::pubkey::Pubkey;
use std::time::Instant;
use synth_liquidator_chain::{Ledger, LedgerError, Memcmp, RpcFilterType};
use tracing::{debug, info, instrument, warn};

use crate::state::{AccountDecode, ExchangeAccount};
use crate::sync::Synchronizer;
use crate::valuation::Valuation;

/// Candidate wrapped for re-fetching before execution.
pub type Candidate = Synchronizer<ExchangeAccount>;

/// Result of one scan: at-risk accounts, ascending by deadline.
///
/// Consumed once by iteration; the next scan produces a fresh batch.
#[derive(Debug)]
pub struct ScanBatch {
    candidates: std::vec::IntoIter<Candidate>,
    stats: ScanStats,
}

/// Counters from one scan, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned: usize,
    pub undecodable: usize,
    pub unpriced: usize,
    pub at_risk: usize,
    pub flagged: usize,
}

impl ScanBatch {
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

impl Iterator for ScanBatch {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        self.candidates.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.candidates.size_hint()
    }
}

impl ExactSizeIterator for ScanBatch {}

/// Scans the exchange program for under-collateralized accounts.
#[derive(Debug, Clone)]
pub struct RiskScanner {
    program_id: Pubkey,
}

impl RiskScanner {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    /// Size and discriminator filters selecting exchange accounts only.
    pub fn filters() -> Vec<RpcFilterType> {
        vec![
            RpcFilterType::DataSize(ExchangeAccount::LEN as u64),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                0,
                &ExchangeAccount::DISCRIMINATOR,
            )),
        ]
    }

    /// Run one scan against `valuation`'s view of the market.
    ///
    /// Accounts that fail to decode or reference unlisted collateral are
    /// skipped with a warning. Only ledger failures are returned.
    #[instrument(skip_all, fields(program = %self.program_id))]
    pub async fn scan(
        &self,
        ledger: &dyn Ledger,
        valuation: &Valuation<'_>,
    ) -> Result<ScanBatch, LedgerError> {
        let started = Instant::now();
        let raw = ledger
            .program_accounts(&self.program_id, Self::filters())
            .await?;

        let threshold = valuation.state.liquidation_threshold_bps;
        let mut stats = ScanStats {
            scanned: raw.len(),
            ..Default::default()
        };
        let mut candidates = Vec::new();

        for (address, data) in raw {
            let candidate = match Candidate::from_raw(address, &data) {
                Ok(c) => c,
                Err(e) => {
                    warn!(account = %address, error = %e, "Skipping undecodable account");
                    stats.undecodable += 1;
                    continue;
                }
            };

            let health = match valuation.health(candidate.current()) {
                Ok(h) => h,
                Err(e) => {
                    warn!(account = %address, error = %e, "Skipping unpriceable account");
                    stats.unpriced += 1;
                    continue;
                }
            };

            if !health.is_below(threshold) {
                continue;
            }

            let account = candidate.current();
            if account.is_flagged() {
                stats.flagged += 1;
            }
            debug!(
                account = %address,
                owner = %account.owner,
                ratio = health.ratio().unwrap_or(f64::INFINITY),
                debt_usd = health.debt_usd(),
                deadline = account.liquidation_deadline,
                "At-risk account"
            );
            candidates.push(candidate);
        }

        // Stable: equal deadlines keep scan order.
        candidates.sort_by_key(|c| c.current().liquidation_deadline);
        stats.at_risk = candidates.len();

        info!(
            scanned = stats.scanned,
            at_risk = stats.at_risk,
            flagged = stats.flagged,
            undecodable = stats.undecodable,
            unpriced = stats.unpriced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Risk scan complete"
        );

        Ok(ScanBatch {
            candidates: candidates.into_iter(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{AccountBuilder, MarketFixture};

    #[tokio::test]
    async fn test_scan_keeps_at_risk_sorted_by_deadline() {
        let market = MarketFixture::new();
        let ledger = market.ledger();
        let prices = market.prices();
        let valuation = Valuation::new(&market.assets_list, &market.state, &prices).unwrap();

        let late = ledger.add_account(&market.risky_account(100, 15));
        ledger.add_account(&market.healthy_account(500));
        let early = ledger.add_account(&market.risky_account(100, 10));
        let middle = ledger.add_account(&market.risky_account(100, 12));

        let batch = RiskScanner::new(market.program_id)
            .scan(ledger.as_ref(), &valuation)
            .await
            .unwrap();

        assert_eq!(batch.stats().scanned, 4);
        assert_eq!(batch.len(), 3);
        let order: Vec<Pubkey> = batch.map(|c| *c.address()).collect();
        assert_eq!(order, vec![early, middle, late]);
    }

    #[tokio::test]
    async fn test_scan_skips_undecodable_and_unpriced() {
        let market = MarketFixture::new();
        let ledger = market.ledger();
        let prices = market.prices();
        let valuation = Valuation::new(&market.assets_list, &market.state, &prices).unwrap();

        // Correct discriminator, truncated body
        let mut truncated = market.risky_account(100, 1).encode();
        truncated.truncate(100);
        ledger.put(Pubkey::new_unique(), truncated);

        // Collateral mint not in the assets list
        ledger.add_account(
            &AccountBuilder::new(Pubkey::new_unique())
                .debt_shares(100)
                .collateral(Pubkey::new_unique(), 1, 0),
        );
        let good = ledger.add_account(&market.risky_account(50, 3));

        let batch = RiskScanner::new(market.program_id)
            .scan(ledger.as_ref(), &valuation)
            .await
            .unwrap();

        let stats = batch.stats();
        assert_eq!(stats.undecodable, 1);
        assert_eq!(stats.unpriced, 1);
        assert_eq!(stats.at_risk, 1);
        assert_eq!(stats.flagged, 1);
        let only: Vec<_> = batch.collect();
        assert_eq!(*only[0].address(), good);
    }

    #[tokio::test]
    async fn test_scan_skips_account_with_unrepresentable_value() {
        let mut market = MarketFixture::new();
        market.assets_list.collaterals[1].decimals = 40;
        let ledger = market.ledger();
        let prices = market.prices();
        let valuation = Valuation::new(&market.assets_list, &market.state, &prices).unwrap();

        ledger.add_account(
            &AccountBuilder::new(Pubkey::new_unique())
                .debt_shares(100)
                .deadline(2)
                .collateral(market.eth_mint(), 1, 1),
        );
        let good = ledger.add_account(&market.risky_account(100, 4));

        let batch = RiskScanner::new(market.program_id)
            .scan(ledger.as_ref(), &valuation)
            .await
            .unwrap();

        assert_eq!(batch.stats().unpriced, 1);
        let order: Vec<Pubkey> = batch.map(|c| *c.address()).collect();
        assert_eq!(order, vec![good]);
    }

    #[tokio::test]
    async fn test_unflagged_at_risk_accounts_sort_last() {
        let market = MarketFixture::new();
        let ledger = market.ledger();
        let prices = market.prices();
        let valuation = Valuation::new(&market.assets_list, &market.state, &prices).unwrap();

        let unflagged = ledger.add_account(&market.risky_account(100, crate::state::NOT_FLAGGED));
        let flagged = ledger.add_account(&market.risky_account(100, 99));

        let batch = RiskScanner::new(market.program_id)
            .scan(ledger.as_ref(), &valuation)
            .await
            .unwrap();
        assert_eq!(batch.stats().flagged, 1);
        let order: Vec<Pubkey> = batch.map(|c| *c.address()).collect();
        assert_eq!(order, vec![flagged, unflagged]);
    }

    #[test]
    fn test_filters_target_exchange_accounts() {
        let filters = RiskScanner::filters();
        assert_eq!(filters.len(), 2);
        assert!(matches!(
            filters[0],
            RpcFilterType::DataSize(len) if len == ExchangeAccount::LEN as u64
        ));
    }
}
