//! Liquidator core logic.
//!
//! This crate provides the liquidation agent for a synthetic-asset exchange:
//! - Typed decoding of the exchange program's accounts
//! - A generic cache-and-refresh synchronizer per account
//! - Fixed-point valuation and the full-population risk scan
//! - The dual-cadence deadline scheduler and liquidation executor
//! - Receiving token account provisioning
//! - The supervisor that classifies failures and restarts with backoff

pub mod collateral;
pub mod config;
mod context;
mod liquidator;
pub mod policy;
pub mod prices;
mod scanner;
mod scheduler;
pub mod state;
mod supervisor;
mod sync;
pub mod valuation;

#[cfg(test)]
mod test_utils;

pub use collateral::{provision, CollateralAccountSet};
pub use config::{BotConfig, Deployment, Network, RunMode};
pub use context::{AgentContext, ProgramAddresses};
pub use liquidator::{
    ExecError, ExecutionContext, LiquidationOutcome, LiquidationResult, Liquidator, SkipReason,
};
pub use policy::{CollateralSelector, LargestValue, Priority};
pub use prices::{Price, PriceSnapshot, PRICE_DECIMALS};
pub use scanner::{Candidate, RiskScanner, ScanBatch, ScanStats};
pub use scheduler::{CandidateSet, CheckReport, Scheduler, TickReport};
pub use supervisor::{run_supervised, Backoff, Failure};
pub use sync::{SyncError, Synchronizer};
pub use valuation::{AccountHealth, Valuation, ValuationError};
