//! Deployment settings read from the process environment.
//!
//! These identify *where* the agent runs (cluster, exchange program,
//! signing key) as opposed to [`super::BotConfig`], which tunes *how*.

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use synth_liquidator_chain::KeySource;

/// Environment variable names.
pub mod env {
    pub const NETWORK: &str = "NETWORK";
    pub const RPC_URL: &str = "RPC_URL";
    pub const EXCHANGE_PROGRAM_ID: &str = "EXCHANGE_PROGRAM_ID";
    pub const EXCHANGE_STATE: &str = "EXCHANGE_STATE";
    pub const RUN_MODE: &str = "RUN_MODE";
    pub const CI: &str = "CI";
    pub const PRIV_KEY: &str = "PRIV_KEY";
    pub const KEYPAIR_PATH: &str = "KEYPAIR_PATH";
    pub const HOME: &str = "HOME";
}

/// Solana cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Devnet,
    Localnet,
}

impl Network {
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.mainnet-beta.solana.com",
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Localnet => "http://127.0.0.1:8899",
        }
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" | "main" => Ok(Self::Mainnet),
            "devnet" | "dev" => Ok(Self::Devnet),
            "localnet" | "local" | "localhost" => Ok(Self::Localnet),
            other => anyhow::bail!("Unknown network '{}'", other),
        }
    }
}

/// Whether the agent runs one cycle or forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One full scan plus one at-risk check, then exit.
    Unattended,
    /// Loop until terminated.
    LongRunning,
}

impl RunMode {
    /// `CI=true` or `RUN_MODE=unattended` selects unattended mode.
    pub fn detect(ci: Option<&str>, run_mode: Option<&str>) -> Self {
        let ci = ci.is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let unattended = run_mode.is_some_and(|v| v.eq_ignore_ascii_case("unattended"));
        if ci || unattended {
            Self::Unattended
        } else {
            Self::LongRunning
        }
    }

    pub fn is_unattended(&self) -> bool {
        matches!(self, Self::Unattended)
    }
}

/// Resolved deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub network: Network,
    pub rpc_url: String,
    pub program_id: Pubkey,
    pub state: Pubkey,
    pub run_mode: RunMode,
    pub key_source: KeySource,
}

impl Deployment {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = match lookup(env::NETWORK) {
            Some(name) => name.parse()?,
            None => Network::Mainnet,
        };
        let rpc_url = lookup(env::RPC_URL).unwrap_or_else(|| network.default_rpc_url().to_string());
        let program_id = required_pubkey(&lookup, env::EXCHANGE_PROGRAM_ID)?;
        let state = required_pubkey(&lookup, env::EXCHANGE_STATE)?;
        let run_mode = RunMode::detect(
            lookup(env::CI).as_deref(),
            lookup(env::RUN_MODE).as_deref(),
        );

        let key_source = if run_mode.is_unattended() {
            let key = lookup(env::PRIV_KEY)
                .filter(|k| !k.trim().is_empty())
                .with_context(|| format!("Unattended mode requires {}", env::PRIV_KEY))?;
            KeySource::Base58(key)
        } else {
            let path = match lookup(env::KEYPAIR_PATH) {
                Some(path) => PathBuf::from(path),
                None => {
                    let home = lookup(env::HOME).with_context(|| {
                        format!("Set {} or {} to locate the keypair", env::KEYPAIR_PATH, env::HOME)
                    })?;
                    PathBuf::from(home).join(".config/solana/id.json")
                }
            };
            KeySource::File(path)
        };

        Ok(Self {
            network,
            rpc_url,
            program_id,
            state,
            run_mode,
            key_source,
        })
    }

    /// Log the resolved deployment. Never prints key material.
    pub fn log(&self) {
        let key = match &self.key_source {
            KeySource::Base58(_) => format!("env:{}", env::PRIV_KEY),
            KeySource::File(path) => path.display().to_string(),
        };
        tracing::info!(
            network = ?self.network,
            rpc = %self.rpc_url,
            program = %self.program_id,
            state = %self.state,
            mode = ?self.run_mode,
            key = %key,
            "Deployment resolved"
        );
    }
}

fn required_pubkey<F>(lookup: &F, name: &str) -> Result<Pubkey>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name).with_context(|| format!("Missing env var: {}", name))?;
    Pubkey::from_str(raw.trim()).with_context(|| format!("Invalid address for {}: {}", name, raw))
}
