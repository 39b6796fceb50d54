//! Configuration management with profile support.
//!
//! Provides the agent's tunable parameters with named profiles
//! (testing, production, aggressive) and TOML file loading.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure containing all agent parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Scheduler cadences
    #[serde(default)]
    pub scanner: ScannerTimingConfig,

    /// Liquidation execution parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Restart policy of the outer error boundary
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Ledger client settings
    #[serde(default)]
    pub rpc: RpcSettings,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Scheduler timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerTimingConfig {
    /// Full rescan interval (seconds)
    #[serde(default = "default_full_scan_interval")]
    pub full_scan_interval_secs: u64,

    /// At-risk deadline check interval (milliseconds)
    #[serde(default = "default_at_risk_check_interval")]
    pub at_risk_check_interval_ms: u64,

    /// Slack added to every sleep (milliseconds)
    #[serde(default = "default_loop_epsilon")]
    pub loop_epsilon_ms: u64,

    /// How long startup waits for the first price snapshot (seconds)
    #[serde(default = "default_price_ready_timeout")]
    pub price_ready_timeout_secs: u64,
}

fn default_full_scan_interval() -> u64 {
    300
}
fn default_at_risk_check_interval() -> u64 {
    1_000
}
fn default_loop_epsilon() -> u64 {
    50
}
fn default_price_ready_timeout() -> u64 {
    30
}

impl Default for ScannerTimingConfig {
    fn default() -> Self {
        Self {
            full_scan_interval_secs: default_full_scan_interval(),
            at_risk_check_interval_ms: default_at_risk_check_interval(),
            loop_epsilon_ms: default_loop_epsilon(),
            price_ready_timeout_secs: default_price_ready_timeout(),
        }
    }
}

impl ScannerTimingConfig {
    pub fn full_scan_interval(&self) -> Duration {
        Duration::from_secs(self.full_scan_interval_secs)
    }
    pub fn at_risk_check_interval(&self) -> Duration {
        Duration::from_millis(self.at_risk_check_interval_ms)
    }
    pub fn loop_epsilon(&self) -> Duration {
        Duration::from_millis(self.loop_epsilon_ms)
    }
    pub fn price_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.price_ready_timeout_secs)
    }
}

/// How the executor picks which collateral to seize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralPolicyKind {
    /// Highest-valued collateral the account holds.
    LargestValue,
    /// First held mint from `collateral_priority`.
    Priority,
}

/// Liquidation execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Collateral selection policy
    #[serde(default = "default_collateral_policy")]
    pub collateral_policy: CollateralPolicyKind,

    /// Mint preference order for the `priority` policy (base58)
    #[serde(default)]
    pub collateral_priority: Vec<String>,

    /// Smallest repay amount worth submitting (settlement base units)
    #[serde(default = "default_min_repay_amount")]
    pub min_repay_amount: u64,

    /// Create missing receiving token accounts at startup
    #[serde(default = "default_create_missing_accounts")]
    pub create_missing_accounts: bool,
}

fn default_collateral_policy() -> CollateralPolicyKind {
    CollateralPolicyKind::LargestValue
}
fn default_min_repay_amount() -> u64 {
    0
}
fn default_create_missing_accounts() -> bool {
    true
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            collateral_policy: default_collateral_policy(),
            collateral_priority: Vec::new(),
            min_repay_amount: default_min_repay_amount(),
            create_missing_accounts: default_create_missing_accounts(),
        }
    }
}

/// Restart policy after a failed cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// First backoff delay (milliseconds)
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling (seconds)
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Attempts before an unattended run gives up
    #[serde(default = "default_unattended_max_attempts")]
    pub unattended_max_attempts: u32,
}

fn default_backoff_base() -> u64 {
    500
}
fn default_backoff_max() -> u64 {
    60
}
fn default_unattended_max_attempts() -> u32 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            unattended_max_attempts: default_unattended_max_attempts(),
        }
    }
}

impl SupervisorConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// Ledger client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Commitment level: processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_request_timeout() -> u64 {
    10
}
fn default_commitment() -> String {
    "confirmed".to_string()
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            commitment: default_commitment(),
        }
    }
}

impl RpcSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            scanner: ScannerTimingConfig::default(),
            liquidation: LiquidationConfig::default(),
            supervisor: SupervisorConfig::default(),
            rpc: RpcSettings::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Create a testing profile: short cadences, no dust filter.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            scanner: ScannerTimingConfig {
                full_scan_interval_secs: 30,
                at_risk_check_interval_ms: 500,
                loop_epsilon_ms: 20,
                price_ready_timeout_secs: 10,
            },
            liquidation: LiquidationConfig {
                min_repay_amount: 0,
                create_missing_accounts: true,
                ..Default::default()
            },
            supervisor: SupervisorConfig {
                backoff_base_ms: 100,
                backoff_max_secs: 5,
                unattended_max_attempts: 3,
            },
            rpc: RpcSettings {
                request_timeout_secs: 5,
                commitment: "processed".to_string(),
            },
        }
    }

    /// Create a production profile with conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            scanner: ScannerTimingConfig::default(),
            liquidation: LiquidationConfig {
                min_repay_amount: 1_000_000, // $1 at 6 decimals
                create_missing_accounts: false,
                ..Default::default()
            },
            supervisor: SupervisorConfig {
                backoff_base_ms: 1_000,
                backoff_max_secs: 120,
                unattended_max_attempts: 5,
            },
            rpc: RpcSettings {
                request_timeout_secs: 15,
                commitment: "confirmed".to_string(),
            },
        }
    }

    /// Create an aggressive profile for maximum speed.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            scanner: ScannerTimingConfig {
                full_scan_interval_secs: 60,
                at_risk_check_interval_ms: 250, // roughly every slot
                loop_epsilon_ms: 10,
                price_ready_timeout_secs: 30,
            },
            liquidation: LiquidationConfig {
                min_repay_amount: 100_000,
                ..Default::default()
            },
            supervisor: SupervisorConfig {
                backoff_base_ms: 200,
                backoff_max_secs: 30,
                unattended_max_attempts: 8,
            },
            rpc: RpcSettings {
                request_timeout_secs: 5,
                commitment: "processed".to_string(),
            },
        }
    }

    /// Resolve a profile by name. Unknown names give the default profile.
    /// Supported values: testing, production, aggressive
    pub fn from_profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    /// Load from the TOML file named by `BOT_CONFIG`, else the profile
    /// named by `BOT_PROFILE`, else defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("BOT_CONFIG") {
            return Self::from_file(path);
        }
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        Ok(Self::from_profile(&profile))
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            full_scan_secs = self.scanner.full_scan_interval_secs,
            at_risk_check_ms = self.scanner.at_risk_check_interval_ms,
            epsilon_ms = self.scanner.loop_epsilon_ms,
            "Scheduler cadences"
        );
        tracing::info!(
            policy = ?self.liquidation.collateral_policy,
            priority = ?self.liquidation.collateral_priority,
            min_repay = self.liquidation.min_repay_amount,
            create_missing_accounts = self.liquidation.create_missing_accounts,
            "Liquidation parameters"
        );
        tracing::info!(
            backoff_base_ms = self.supervisor.backoff_base_ms,
            backoff_max_secs = self.supervisor.backoff_max_secs,
            unattended_attempts = self.supervisor.unattended_max_attempts,
            "Supervisor policy"
        );
        tracing::info!(
            timeout_secs = self.rpc.request_timeout_secs,
            commitment = %self.rpc.commitment,
            "RPC settings"
        );
    }
}
