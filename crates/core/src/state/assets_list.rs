//! Asset metadata: price feeds, collaterals and synthetics.

use solana_sdk::pubkey::Pubkey;
use synth_liquidator_chain::{discriminator, Slot};

use super::{AccountDecode, DecodeError, Reader};

/// Slots reserved for each of the three lists.
pub const MAX_LIST_ENTRIES: usize = 32;

const ASSET_LEN: usize = 32 + 8 + 8;
const COLLATERAL_LEN: usize = 1 + 32 + 32 + 32 + 8 + 1 + 2;
const SYNTHETIC_LEN: usize = 1 + 32 + 8 + 1;

/// A priced asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asset {
    /// Oracle feed the price is published from.
    pub feed_address: Pubkey,
    /// Last published price, 8 decimals.
    pub price: u64,
    /// Slot of the last price update.
    pub last_update: Slot,
}

/// A token accepted as collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collateral {
    /// Index into [`AssetsList::assets`].
    pub asset_index: u8,
    pub mint: Pubkey,
    /// Program reserve holding deposits.
    pub reserve_address: Pubkey,
    pub liquidation_fund: Pubkey,
    pub reserve_balance: u64,
    pub decimals: u8,
    /// Bonus paid to the liquidator on seized value, basis points.
    pub liquidation_bonus_bps: u16,
}

/// A synthetic the exchange mints as debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Synthetic {
    /// Index into [`AssetsList::assets`].
    pub asset_index: u8,
    pub mint: Pubkey,
    pub supply: u64,
    pub decimals: u8,
}

/// Decoded assets list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetsList {
    pub assets: Vec<Asset>,
    pub collaterals: Vec<Collateral>,
    /// The first synthetic is the settlement asset.
    pub synthetics: Vec<Synthetic>,
}

impl AssetsList {
    /// The settlement asset used to repay debt.
    pub fn settlement(&self) -> Option<&Synthetic> {
        self.synthetics.first()
    }

    /// Collateral metadata by mint.
    pub fn collateral_by_mint(&self, mint: &Pubkey) -> Option<&Collateral> {
        self.collaterals.iter().find(|c| &c.mint == mint)
    }

    /// Priced asset backing an entry's `asset_index`.
    pub fn asset(&self, index: u8) -> Option<&Asset> {
        self.assets.get(index as usize)
    }

    /// Every mint the liquidator may need a token account for.
    pub fn mints(&self) -> impl Iterator<Item = Pubkey> + '_ {
        self.collaterals
            .iter()
            .map(|c| c.mint)
            .chain(self.synthetics.iter().map(|s| s.mint))
    }
}

fn check_head(field: &'static str, head: u8) -> Result<usize, DecodeError> {
    let head = head as usize;
    if head > MAX_LIST_ENTRIES {
        return Err(DecodeError::OutOfRange {
            kind: AssetsList::KIND,
            field,
            value: head as u64,
        });
    }
    Ok(head)
}

impl AccountDecode for AssetsList {
    const KIND: &'static str = "AssetsList";
    const DISCRIMINATOR: [u8; 8] = discriminator::ASSETS_LIST;
    const LEN: usize =
        8 + 3 + MAX_LIST_ENTRIES * (ASSET_LEN + COLLATERAL_LEN + SYNTHETIC_LEN);

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let head_assets = check_head("head_assets", r.u8())?;
        let head_collaterals = check_head("head_collaterals", r.u8())?;
        let head_synthetics = check_head("head_synthetics", r.u8())?;

        let assets = (0..head_assets)
            .map(|_| Asset {
                feed_address: r.pubkey(),
                price: r.u64(),
                last_update: r.u64(),
            })
            .collect();
        r.skip((MAX_LIST_ENTRIES - head_assets) * ASSET_LEN);

        let collaterals = (0..head_collaterals)
            .map(|_| Collateral {
                asset_index: r.u8(),
                mint: r.pubkey(),
                reserve_address: r.pubkey(),
                liquidation_fund: r.pubkey(),
                reserve_balance: r.u64(),
                decimals: r.u8(),
                liquidation_bonus_bps: r.u16(),
            })
            .collect();
        r.skip((MAX_LIST_ENTRIES - head_collaterals) * COLLATERAL_LEN);

        let synthetics = (0..head_synthetics)
            .map(|_| Synthetic {
                asset_index: r.u8(),
                mint: r.pubkey(),
                supply: r.u64(),
                decimals: r.u8(),
            })
            .collect();

        Ok(Self {
            assets,
            collaterals,
            synthetics,
        })
    }
}
