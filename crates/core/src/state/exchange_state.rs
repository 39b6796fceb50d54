//! Global exchange state.

use solana_sdk::pubkey::Pubkey;
use synth_liquidator_chain::discriminator;

use super::{AccountDecode, DecodeError, Reader};

/// Decoded global state account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeState {
    pub admin: Pubkey,
    /// Exchange operations suspended by the admin.
    pub halted: bool,
    pub assets_list: Pubkey,
    /// Program authority owning reserves.
    pub exchange_authority: Pubkey,
    /// Sum of all accounts' debt shares.
    pub debt_shares: u64,
    /// Health ratio (collateral value / debt value) below which an account
    /// is at risk, in basis points.
    pub liquidation_threshold_bps: u32,
    /// Slots between an account being flagged and becoming liquidatable.
    pub liquidation_buffer: u32,
    pub nonce: u8,
}

impl AccountDecode for ExchangeState {
    const KIND: &'static str = "State";
    const DISCRIMINATOR: [u8; 8] = discriminator::STATE;
    const LEN: usize = 8 + 32 + 1 + 32 + 32 + 8 + 4 + 4 + 1;

    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            admin: r.pubkey(),
            halted: r.bool(),
            assets_list: r.pubkey(),
            exchange_authority: r.pubkey(),
            debt_shares: r.u64(),
            liquidation_threshold_bps: r.u32(),
            liquidation_buffer: r.u32(),
            nonce: r.u8(),
        })
    }
}
