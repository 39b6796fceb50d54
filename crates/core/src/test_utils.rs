//! Shared fixtures: byte encoders for the account layouts and an
//! in-memory ledger.

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use synth_liquidator_chain::{
    discriminator, Ledger, LedgerError, RawAccount, RpcFilterType, Slot, TransactionSender,
};

use crate::collateral::CollateralAccountSet;
use crate::prices::PriceSnapshot;
use crate::state::{
    AccountDecode, Asset, AssetsList, Collateral, ExchangeState, Synthetic, MAX_COLLATERALS,
    MAX_LIST_ENTRIES, NOT_FLAGGED,
};

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

pub struct AccountBuilder {
    owner: Pubkey,
    debt_shares: u64,
    deadline: Slot,
    collaterals: Vec<(Pubkey, u64, u8)>,
}

impl AccountBuilder {
    pub fn new(owner: Pubkey) -> Self {
        Self {
            owner,
            debt_shares: 0,
            deadline: NOT_FLAGGED,
            collaterals: Vec::new(),
        }
    }

    pub fn debt_shares(mut self, shares: u64) -> Self {
        self.debt_shares = shares;
        self
    }

    pub fn deadline(mut self, slot: Slot) -> Self {
        self.deadline = slot;
        self
    }

    pub fn collateral(mut self, mint: Pubkey, amount: u64, index: u8) -> Self {
        self.collaterals.push((mint, amount, index));
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(crate::state::ExchangeAccount::LEN);
        buf.extend_from_slice(&discriminator::EXCHANGE_ACCOUNT);
        buf.extend_from_slice(self.owner.as_ref());
        buf.push(0); // version
        buf.extend_from_slice(&self.debt_shares.to_le_bytes());
        buf.extend_from_slice(&self.deadline.to_le_bytes());
        buf.push(255); // bump
        buf.push(self.collaterals.len() as u8);
        for slot in 0..MAX_COLLATERALS {
            match self.collaterals.get(slot) {
                Some((mint, amount, index)) => {
                    buf.extend_from_slice(&amount.to_le_bytes());
                    buf.extend_from_slice(mint.as_ref());
                    buf.push(*index);
                }
                None => buf.extend_from_slice(&[0u8; 41]),
            }
        }
        buf
    }
}

pub struct StateBuilder {
    state: ExchangeState,
}

impl StateBuilder {
    pub fn new(assets_list: Pubkey) -> Self {
        Self {
            state: ExchangeState {
                admin: Pubkey::new_unique(),
                halted: false,
                assets_list,
                exchange_authority: Pubkey::new_unique(),
                debt_shares: 1_000_000,
                liquidation_threshold_bps: 15_000,
                liquidation_buffer: 100,
                nonce: 254,
            },
        }
    }

    pub fn debt_shares(mut self, shares: u64) -> Self {
        self.state.debt_shares = shares;
        self
    }

    pub fn threshold_bps(mut self, bps: u32) -> Self {
        self.state.liquidation_threshold_bps = bps;
        self
    }

    pub fn halted(mut self, halted: bool) -> Self {
        self.state.halted = halted;
        self
    }

    pub fn build(self) -> ExchangeState {
        self.state
    }

    pub fn encode(self) -> Vec<u8> {
        encode_state(&self.state)
    }
}

pub fn encode_state(s: &ExchangeState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ExchangeState::LEN);
    buf.extend_from_slice(&discriminator::STATE);
    buf.extend_from_slice(s.admin.as_ref());
    buf.push(s.halted as u8);
    buf.extend_from_slice(s.assets_list.as_ref());
    buf.extend_from_slice(s.exchange_authority.as_ref());
    buf.extend_from_slice(&s.debt_shares.to_le_bytes());
    buf.extend_from_slice(&s.liquidation_threshold_bps.to_le_bytes());
    buf.extend_from_slice(&s.liquidation_buffer.to_le_bytes());
    buf.push(s.nonce);
    buf
}

pub fn encode_assets_list(list: &AssetsList) -> Vec<u8> {
    let mut buf = Vec::with_capacity(AssetsList::LEN);
    buf.extend_from_slice(&discriminator::ASSETS_LIST);
    buf.push(list.assets.len() as u8);
    buf.push(list.collaterals.len() as u8);
    buf.push(list.synthetics.len() as u8);

    for a in &list.assets {
        buf.extend_from_slice(a.feed_address.as_ref());
        buf.extend_from_slice(&a.price.to_le_bytes());
        buf.extend_from_slice(&a.last_update.to_le_bytes());
    }
    buf.resize(buf.len() + (MAX_LIST_ENTRIES - list.assets.len()) * 48, 0);

    for c in &list.collaterals {
        buf.push(c.asset_index);
        buf.extend_from_slice(c.mint.as_ref());
        buf.extend_from_slice(c.reserve_address.as_ref());
        buf.extend_from_slice(c.liquidation_fund.as_ref());
        buf.extend_from_slice(&c.reserve_balance.to_le_bytes());
        buf.push(c.decimals);
        buf.extend_from_slice(&c.liquidation_bonus_bps.to_le_bytes());
    }
    buf.resize(buf.len() + (MAX_LIST_ENTRIES - list.collaterals.len()) * 108, 0);

    for s in &list.synthetics {
        buf.push(s.asset_index);
        buf.extend_from_slice(s.mint.as_ref());
        buf.extend_from_slice(&s.supply.to_le_bytes());
        buf.push(s.decimals);
    }
    buf.resize(buf.len() + (MAX_LIST_ENTRIES - list.synthetics.len()) * 42, 0);
    buf
}

// ---------------------------------------------------------------------------
// Market fixture
// ---------------------------------------------------------------------------

/// A small market: USD settlement synthetic, SOL and ETH collateral.
///
/// Total debt is $1,000,000 over 1,000,000 shares, so one share is $1.
/// SOL trades at $20 (9 decimals), ETH at $2,000 (8 decimals).
pub struct MarketFixture {
    pub program_id: Pubkey,
    pub state_address: Pubkey,
    pub assets_list_address: Pubkey,
    pub state: ExchangeState,
    pub assets_list: AssetsList,
}

impl Default for MarketFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketFixture {
    pub fn new() -> Self {
        let assets_list_address = Pubkey::new_unique();
        let asset = |price: u64| Asset {
            feed_address: Pubkey::new_unique(),
            price,
            last_update: 1,
        };
        let collateral = |asset_index: u8, decimals: u8| Collateral {
            asset_index,
            mint: Pubkey::new_unique(),
            reserve_address: Pubkey::new_unique(),
            liquidation_fund: Pubkey::new_unique(),
            reserve_balance: 0,
            decimals,
            liquidation_bonus_bps: 500,
        };

        Self {
            program_id: Pubkey::new_unique(),
            state_address: Pubkey::new_unique(),
            assets_list_address,
            state: StateBuilder::new(assets_list_address).build(),
            assets_list: AssetsList {
                assets: vec![asset(1_00000000), asset(20_00000000), asset(2_000_00000000)],
                collaterals: vec![collateral(1, 9), collateral(2, 8)],
                synthetics: vec![Synthetic {
                    asset_index: 0,
                    mint: Pubkey::new_unique(),
                    supply: 1_000_000_000_000,
                    decimals: 6,
                }],
            },
        }
    }

    pub fn sol_mint(&self) -> Pubkey {
        self.assets_list.collaterals[0].mint
    }

    pub fn eth_mint(&self) -> Pubkey {
        self.assets_list.collaterals[1].mint
    }

    pub fn settlement_mint(&self) -> Pubkey {
        self.assets_list.synthetics[0].mint
    }

    pub fn prices(&self) -> PriceSnapshot {
        let prices = PriceSnapshot::new();
        prices.update_from_assets(&self.assets_list);
        prices
    }

    pub fn assets_list_bytes(&self) -> Vec<u8> {
        encode_assets_list(&self.assets_list)
    }

    pub fn state_bytes(&self) -> Vec<u8> {
        encode_state(&self.state)
    }

    /// Token accounts derived for `wallet`, one per listed mint.
    pub fn collateral_accounts(&self, wallet: &Pubkey) -> CollateralAccountSet {
        CollateralAccountSet::derive(wallet, &self.assets_list)
    }

    /// A due, under-collateralized account: `debt` dollars against SOL
    /// worth 1.2x the debt.
    pub fn risky_account(&self, debt: u64, deadline: Slot) -> AccountBuilder {
        // 1 share = $1; SOL at $20 with 9 decimals => 1.2 * debt / 20 SOL
        let sol_amount = debt * 1_000_000_000 * 6 / 100;
        AccountBuilder::new(Pubkey::new_unique())
            .debt_shares(debt)
            .deadline(deadline)
            .collateral(self.sol_mint(), sol_amount, 0)
    }

    /// An account well above the threshold.
    pub fn healthy_account(&self, debt: u64) -> AccountBuilder {
        let sol_amount = debt * 1_000_000_000 / 10; // 2x collateralized
        AccountBuilder::new(Pubkey::new_unique())
            .debt_shares(debt)
            .collateral(self.sol_mint(), sol_amount, 0)
    }

    /// Ledger seeded with the state and assets list.
    pub fn ledger(&self) -> Arc<FakeLedger> {
        let ledger = Arc::new(FakeLedger::new());
        ledger.put(self.state_address, self.state_bytes());
        ledger.put(self.assets_list_address, self.assets_list_bytes());
        ledger
    }
}

// ---------------------------------------------------------------------------
// Fake ledger
// ---------------------------------------------------------------------------

/// In-memory ledger. Accounts keep insertion order so scans can return
/// deliberately unsorted batches.
pub struct FakeLedger {
    accounts: Mutex<Vec<RawAccount>>,
    balances: Mutex<HashMap<Pubkey, u64>>,
    sent: Mutex<Vec<Transaction>>,
    slot: AtomicU64,
    fail_slot: AtomicBool,
    reject_sends: AtomicUsize,
    slot_calls: AtomicUsize,
    scan_calls: AtomicUsize,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            slot: AtomicU64::new(0),
            fail_slot: AtomicBool::new(false),
            reject_sends: AtomicUsize::new(0),
            slot_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
        }
    }

    pub fn put(&self, address: Pubkey, data: Vec<u8>) {
        let mut accounts = self.accounts.lock();
        match accounts.iter_mut().find(|(a, _)| *a == address) {
            Some(entry) => entry.1 = data,
            None => accounts.push((address, data)),
        }
    }

    /// Insert an exchange account at a fresh address, returning it.
    pub fn add_account(&self, builder: &AccountBuilder) -> Pubkey {
        let address = Pubkey::new_unique();
        self.put(address, builder.encode());
        address
    }

    pub fn close(&self, address: &Pubkey) {
        self.accounts.lock().retain(|(a, _)| a != address);
    }

    pub fn set_slot(&self, slot: Slot) {
        self.slot.store(slot, Ordering::SeqCst);
    }

    pub fn set_balance(&self, token_account: Pubkey, amount: u64) {
        self.balances.lock().insert(token_account, amount);
    }

    pub fn fail_slot_queries(&self, fail: bool) {
        self.fail_slot.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `n` submissions.
    pub fn reject_next_sends(&self, n: usize) {
        self.reject_sends.store(n, Ordering::SeqCst);
    }

    pub fn slot_calls(&self) -> usize {
        self.slot_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().clone()
    }

    /// `(liquidated account, repay amount)` for every accepted liquidation
    /// sent to `program_id`, in submission order.
    pub fn liquidations(&self, program_id: &Pubkey) -> Vec<(Pubkey, u64)> {
        self.sent()
            .iter()
            .flat_map(|tx| {
                let keys = tx.message.account_keys.clone();
                tx.message
                    .instructions
                    .iter()
                    .filter(|ix| keys[ix.program_id_index as usize] == *program_id)
                    .map(|ix| {
                        let account = keys[ix.accounts[4] as usize];
                        let amount = u64::from_le_bytes(ix.data[8..16].try_into().unwrap());
                        (account, amount)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn slot(&self) -> Result<Slot, LedgerError> {
        self.slot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_slot.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc("connection refused".into()));
        }
        Ok(self.slot.load(Ordering::SeqCst))
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Vec<u8>, LedgerError> {
        self.accounts
            .lock()
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, data)| data.clone())
            .ok_or(LedgerError::NotFound(*address))
    }

    async fn program_accounts(
        &self,
        _program_id: &Pubkey,
        _filters: Vec<RpcFilterType>,
    ) -> Result<Vec<RawAccount>, LedgerError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .accounts
            .lock()
            .iter()
            .filter(|(_, data)| data.starts_with(&discriminator::EXCHANGE_ACCOUNT))
            .cloned()
            .collect())
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self
            .balances
            .lock()
            .get(token_account)
            .copied()
            .unwrap_or(0))
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let pending = self.reject_sends.load(Ordering::SeqCst);
        if pending > 0 {
            self.reject_sends.store(pending - 1, Ordering::SeqCst);
            return Err(LedgerError::Rejected("custom program error: 0x1771".into()));
        }
        self.sent.lock().push(transaction.clone());
        Ok(transaction.signatures[0])
    }
}

/// Sender over `ledger` with a throwaway wallet.
pub fn sender(ledger: Arc<FakeLedger>) -> Arc<TransactionSender> {
    Arc::new(TransactionSender::new(ledger, Keypair::new()))
}
