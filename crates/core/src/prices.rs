//! Shared price snapshot with a one-shot readiness signal.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use synth_liquidator_chain::{Ledger, Slot};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::state::{AssetsList, ExchangeState};
use crate::sync::{SyncError, Synchronizer};

/// Fixed-point decimals of every stored price.
pub const PRICE_DECIMALS: u32 = 8;

/// A published price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    /// Price with [`PRICE_DECIMALS`] decimals.
    pub value: u64,
    /// Slot the price was published at.
    pub slot: Slot,
}

impl Price {
    /// Price as a float, for logging.
    pub fn as_f64(&self) -> f64 {
        self.value as f64 / 10f64.powi(PRICE_DECIMALS as i32)
    }
}

/// Current prices keyed by price-feed address.
///
/// Populated by a separate task; consumers call [`PriceSnapshot::wait_ready`]
/// once before the first read.
pub struct PriceSnapshot {
    prices: DashMap<Pubkey, Price>,
    ready_tx: watch::Sender<bool>,
}

impl Default for PriceSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceSnapshot {
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            prices: DashMap::new(),
            ready_tx,
        }
    }

    /// Insert or replace a single price.
    pub fn set(&self, feed: Pubkey, price: Price) {
        self.prices.insert(feed, price);
    }

    /// Copy every asset price from an assets list and mark the snapshot ready.
    pub fn update_from_assets(&self, assets: &AssetsList) {
        for asset in &assets.assets {
            self.set(
                asset.feed_address,
                Price {
                    value: asset.price,
                    slot: asset.last_update,
                },
            );
        }
        debug!(count = assets.assets.len(), "Price snapshot updated");
        self.mark_ready();
    }

    /// Signal that the snapshot holds a full set of prices.
    pub fn mark_ready(&self) {
        self.ready_tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Wait until the snapshot has been populated.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn get(&self, feed: &Pubkey) -> Option<Price> {
        self.prices.get(feed).map(|p| *p)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Populate `snapshot` from the assets list the exchange state points at.
///
/// Meant to run as its own task at startup; consumers wait on
/// [`PriceSnapshot::wait_ready`].
pub async fn load_initial(
    ledger: &dyn Ledger,
    state_address: Pubkey,
    snapshot: &PriceSnapshot,
) -> Result<(), SyncError> {
    let state = Synchronizer::<ExchangeState>::load(ledger, state_address).await?;
    let assets = Synchronizer::<AssetsList>::load(ledger, state.current().assets_list).await?;
    snapshot.update_from_assets(assets.current());
    info!(prices = snapshot.len(), "Initial price snapshot loaded");
    Ok(())
}
