//! Shared handles passed explicitly to every component.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use synth_liquidator_chain::{Ledger, TransactionSender};

use crate::config::BotConfig;

/// On-chain addresses the agent operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAddresses {
    /// Exchange program.
    pub program_id: Pubkey,
    /// Exchange state account.
    pub state: Pubkey,
}

/// Ledger handle, signing identity, configuration and program addresses.
#[derive(Clone)]
pub struct AgentContext {
    pub ledger: Arc<dyn Ledger>,
    pub sender: Arc<TransactionSender>,
    pub config: BotConfig,
    pub addresses: ProgramAddresses,
}

impl AgentContext {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        sender: Arc<TransactionSender>,
        config: BotConfig,
        addresses: ProgramAddresses,
    ) -> Self {
        Self {
            ledger,
            sender,
            config,
            addresses,
        }
    }

    /// Wallet address of the signing identity.
    pub fn wallet(&self) -> Pubkey {
        self.sender.pubkey()
    }
}
