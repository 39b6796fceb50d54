//! Configuration for the liquidation agent.
//!
//! This module provides:
//! - Agent runtime configuration (profiles, cadences, policies)
//! - Deployment configuration from the environment (cluster, program, key)

mod bot;
mod deployment;

pub use bot::{
    BotConfig, CollateralPolicyKind, LiquidationConfig, RpcSettings, ScannerTimingConfig,
    SupervisorConfig,
};

pub use deployment::{env, Deployment, Network, RunMode};
