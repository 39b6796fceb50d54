//! Per-user exchange account.

use arrayvec::ArrayVec;
use solana_sdk::pubkey::Pubkey;
use synth_liquidator_chain::{discriminator, Slot};

use super::{AccountDecode, DecodeError, Reader};

/// Collateral slots reserved in every exchange account.
pub const MAX_COLLATERALS: usize = 32;

/// Deadline value of an account the exchange has not flagged.
pub const NOT_FLAGGED: Slot = u64::MAX;

const COLLATERAL_ENTRY_LEN: usize = 8 + 32 + 1;

/// One deposited collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralEntry {
    /// Amount in the collateral's base units.
    pub amount: u64,
    /// Collateral token mint.
    pub mint: Pubkey,
    /// Index into the assets list's collaterals.
    pub index: u8,
}

/// Decoded exchange account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAccount {
    pub owner: Pubkey,
    pub version: u8,
    /// Share of the exchange's total synthetic debt.
    pub debt_shares: u64,
    /// Slot after which the account may be liquidated. Written by the
    /// exchange program only.
    pub liquidation_deadline: Slot,
    pub bump: u8,
    pub collaterals: ArrayVec<CollateralEntry, MAX_COLLATERALS>,
}

impl ExchangeAccount {
    /// Whether the exchange has set a liquidation deadline.
    pub fn is_flagged(&self) -> bool {
        self.liquidation_deadline != NOT_FLAGGED
    }

    /// Whether the deadline has been reached at `slot`.
    pub fn is_due(&self, slot: Slot) -> bool {
        self.liquidation_deadline <= slot
    }

    /// Deposited amount of `mint`, zero if absent.
    pub fn collateral_amount(&self, mint: &Pubkey) -> u64 {
        self.collaterals
            .iter()
            .find(|c| &c.mint == mint)
            .map(|c| c.amount)
            .unwrap_or(0)
    }
}

impl AccountDecode for ExchangeAccount {
    const KIND: &'static str = "ExchangeAccount";
    const DISCRIMINATOR: [u8; 8] = discriminator::EXCHANGE_ACCOUNT;
    const LEN: usize = 8 + 32 + 1 + 8 + 8 + 1 + 1 + MAX_COLLATERALS * COLLATERAL_ENTRY_LEN;

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let owner = r.pubkey();
        let version = r.u8();
        let debt_shares = r.u64();
        let liquidation_deadline = r.u64();
        let bump = r.u8();
        let head = r.u8();

        if head as usize > MAX_COLLATERALS {
            return Err(DecodeError::OutOfRange {
                kind: Self::KIND,
                field: "head",
                value: head as u64,
            });
        }

        let mut collaterals = ArrayVec::new();
        for _ in 0..head {
            collaterals.push(CollateralEntry {
                amount: r.u64(),
                mint: r.pubkey(),
                index: r.u8(),
            });
        }

        Ok(Self {
            owner,
            version,
            debt_shares,
            liquidation_deadline,
            bump,
            collaterals,
        })
    }
}
