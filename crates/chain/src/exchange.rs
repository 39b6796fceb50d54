//! Exchange program account discriminators and instruction builders.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

/// Account discriminators (first 8 bytes of every program-owned account).
pub mod discriminator {
    pub const EXCHANGE_ACCOUNT: [u8; 8] = [11, 156, 88, 90, 121, 215, 86, 247];
    pub const STATE: [u8; 8] = [216, 146, 107, 94, 104, 75, 182, 177];
    pub const ASSETS_LIST: [u8; 8] = [226, 204, 0, 235, 176, 26, 187, 1];
}

/// Instruction selector for `liquidate`.
const LIQUIDATE_SELECTOR: [u8; 8] = [223, 179, 226, 125, 48, 46, 39, 74];

/// Accounts required by the `liquidate` instruction.
#[derive(Debug, Clone)]
pub struct LiquidateAccounts {
    pub exchange_authority: Pubkey,
    pub state: Pubkey,
    pub assets_list: Pubkey,
    /// Liquidator wallet (signer).
    pub liquidator: Pubkey,
    /// Account being liquidated.
    pub exchange_account: Pubkey,
    /// Liquidator's settlement-asset token account (repayment source).
    pub liquidator_settlement_account: Pubkey,
    /// Liquidator's token account receiving seized collateral.
    pub liquidator_collateral_account: Pubkey,
    pub settlement_mint: Pubkey,
    /// Reserve holding the seized collateral.
    pub collateral_reserve: Pubkey,
    pub liquidation_fund: Pubkey,
}

/// Build a `liquidate` instruction repaying `amount` settlement base units.
pub fn liquidate(program_id: &Pubkey, accounts: &LiquidateAccounts, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&LIQUIDATE_SELECTOR);
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.exchange_authority, false),
            AccountMeta::new(accounts.state, false),
            AccountMeta::new(accounts.assets_list, false),
            AccountMeta::new_readonly(accounts.liquidator, true),
            AccountMeta::new(accounts.exchange_account, false),
            AccountMeta::new(accounts.liquidator_settlement_account, false),
            AccountMeta::new(accounts.liquidator_collateral_account, false),
            AccountMeta::new(accounts.settlement_mint, false),
            AccountMeta::new(accounts.collateral_reserve, false),
            AccountMeta::new(accounts.liquidation_fund, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data,
    }
}
