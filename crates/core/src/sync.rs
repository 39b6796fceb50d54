//! Cache-and-refresh wrapper for a single on-chain account.

use solana_sdk::pubkey::Pubkey;
use synth_liquidator_chain::{Ledger, LedgerError};
use tracing::trace;

use crate::state::{AccountDecode, DecodeError};

/// Why a refresh did not produce a new snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The account no longer exists.
    #[error("account {0} not found")]
    NotFound(Pubkey),

    /// The account exists but its bytes do not match the expected layout.
    #[error("account {address}: {source}")]
    Decode {
        address: Pubkey,
        #[source]
        source: DecodeError,
    },

    /// Network-level failure; the snapshot may still be valid.
    #[error(transparent)]
    Ledger(LedgerError),
}

impl SyncError {
    fn from_ledger(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(address) => Self::NotFound(address),
            other => Self::Ledger(other),
        }
    }
}

/// Last decoded snapshot of one account.
///
/// A refresh replaces the snapshot as a whole; a failed refresh leaves the
/// previous snapshot untouched.
#[derive(Debug, Clone)]
pub struct Synchronizer<T> {
    address: Pubkey,
    snapshot: T,
}

impl<T: AccountDecode> Synchronizer<T> {
    /// Wrap bytes already fetched (e.g. by a program scan).
    pub fn from_raw(address: Pubkey, data: &[u8]) -> Result<Self, SyncError> {
        let snapshot =
            T::decode(data).map_err(|source| SyncError::Decode { address, source })?;
        Ok(Self { address, snapshot })
    }

    /// Fetch and decode `address`.
    pub async fn load(ledger: &dyn Ledger, address: Pubkey) -> Result<Self, SyncError> {
        let data = ledger
            .account_data(&address)
            .await
            .map_err(SyncError::from_ledger)?;
        Self::from_raw(address, &data)
    }

    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    /// Last fetched snapshot, without touching the network.
    pub fn current(&self) -> &T {
        &self.snapshot
    }

    /// Re-fetch and replace the snapshot.
    pub async fn refresh(&mut self, ledger: &dyn Ledger) -> Result<&T, SyncError> {
        let data = ledger
            .account_data(&self.address)
            .await
            .map_err(SyncError::from_ledger)?;
        self.snapshot = T::decode(&data).map_err(|source| SyncError::Decode {
            address: self.address,
            source,
        })?;
        trace!(address = %self.address, kind = T::KIND, "Snapshot refreshed");
        Ok(&self.snapshot)
    }

    pub fn into_inner(self) -> T {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExchangeAccount;
    use crate::test_utils::{AccountBuilder, FakeLedger};

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let ledger = FakeLedger::new();
        let builder = AccountBuilder::new(Pubkey::new_unique()).debt_shares(10).deadline(5);
        let address = ledger.add_account(&builder);

        let mut sync = Synchronizer::<ExchangeAccount>::load(&ledger, address)
            .await
            .unwrap();
        assert_eq!(sync.current().debt_shares, 10);

        ledger.put(address, builder.debt_shares(3).encode());
        // current() does not fetch
        assert_eq!(sync.current().debt_shares, 10);

        let refreshed = sync.refresh(&ledger).await.unwrap();
        assert_eq!(refreshed.debt_shares, 3);
        assert_eq!(sync.current().liquidation_deadline, 5);
    }

    #[tokio::test]
    async fn test_closed_account_is_not_found() {
        let ledger = FakeLedger::new();
        let address = ledger.add_account(&AccountBuilder::new(Pubkey::new_unique()));
        let mut sync = Synchronizer::<ExchangeAccount>::load(&ledger, address)
            .await
            .unwrap();

        ledger.close(&address);

        let err = sync.refresh(&ledger).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(a) if a == address));
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_previous_snapshot() {
        let ledger = FakeLedger::new();
        let builder = AccountBuilder::new(Pubkey::new_unique()).debt_shares(77);
        let address = ledger.add_account(&builder);
        let mut sync = Synchronizer::<ExchangeAccount>::load(&ledger, address)
            .await
            .unwrap();

        ledger.put(address, vec![1, 2, 3]);

        assert!(matches!(
            sync.refresh(&ledger).await,
            Err(SyncError::Decode { .. })
        ));
        assert_eq!(sync.current().debt_shares, 77);
    }

    #[test]
    fn test_identical_bytes_give_identical_snapshots() {
        let bytes = AccountBuilder::new(Pubkey::new_unique())
            .debt_shares(9)
            .collateral(Pubkey::new_unique(), 100, 0)
            .encode();
        let address = Pubkey::new_unique();
        let a = Synchronizer::<ExchangeAccount>::from_raw(address, &bytes).unwrap();
        let b = Synchronizer::<ExchangeAccount>::from_raw(address, &bytes).unwrap();
        assert_eq!(a.current(), b.current());
    }
}
