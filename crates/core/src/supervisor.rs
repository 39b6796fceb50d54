//! Outer error boundary.
//!
//! Failed cycles are classified: transient failures back off and restart
//! the scheduler, fatal ones end the process. Unattended runs give up
//! after a configured number of attempts.

use std::future::Future;
use std::time::Duration;
use synth_liquidator_chain::LedgerError;
use tracing::{error, info, warn};

use crate::config::{RunMode, SupervisorConfig};
use crate::liquidator::ExecError;
use crate::scheduler::Scheduler;
use crate::sync::SyncError;

/// A failed scheduler cycle.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// Network trouble; retrying later can succeed.
    #[error("{stage} failed")]
    Transient {
        stage: &'static str,
        #[source]
        source: LedgerError,
    },

    /// Retrying cannot help (missing or malformed exchange accounts,
    /// misconfiguration).
    #[error("{stage} failed")]
    Fatal {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Failure {
    pub fn fatal(
        stage: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Fatal {
            stage,
            source: source.into(),
        }
    }

    pub fn from_ledger(stage: &'static str, err: LedgerError) -> Self {
        if err.is_transient() {
            Self::Transient { stage, source: err }
        } else {
            Self::fatal(stage, err)
        }
    }

    pub fn from_sync(stage: &'static str, err: SyncError) -> Self {
        match err {
            SyncError::Ledger(e) => Self::from_ledger(stage, e),
            other => Self::fatal(stage, other),
        }
    }

    pub fn from_exec(stage: &'static str, err: ExecError) -> Self {
        match err {
            ExecError::Ledger(e) => Self::from_ledger(stage, e),
            other => Self::fatal(stage, other),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Owned copy of the error chain, for logging through `anyhow`.
    fn describe(&self) -> anyhow::Error {
        let mut chain: Vec<String> = Vec::new();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        let mut iter = chain.into_iter().rev();
        let root = iter.next().unwrap_or_default();
        iter.fold(anyhow::anyhow!(root), |err, ctx| err.context(ctx))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Fatal { .. } => "fatal",
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.backoff_base(), config.backoff_max())
    }

    /// Delay before the next attempt: `base * 2^n`, capped at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

fn log_failure(failure: &Failure, attempt: u32) {
    let report = format!("{:#}", failure.describe());
    error!(kind = failure.kind(), attempt, error = %report, "Cycle failed");
}

/// Run the scheduler under the error boundary until it finishes
/// (unattended), `shutdown` resolves, or a fatal failure occurs.
pub async fn run_supervised<F>(
    scheduler: &mut Scheduler,
    mode: RunMode,
    config: &SupervisorConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    match mode {
        RunMode::Unattended => run_unattended(scheduler, config).await,
        RunMode::LongRunning => run_long(scheduler, config, shutdown).await,
    }
}

async fn run_unattended(
    scheduler: &mut Scheduler,
    config: &SupervisorConfig,
) -> anyhow::Result<()> {
    let max_attempts = config.unattended_max_attempts.max(1);
    let mut backoff = Backoff::from_config(config);

    for attempt in 1..=max_attempts {
        match scheduler.run_once().await {
            Ok(report) => {
                info!(attempt, report = ?report, "Unattended cycle complete");
                return Ok(());
            }
            Err(failure) => {
                log_failure(&failure, attempt);
                if !failure.is_transient() || attempt == max_attempts {
                    return Err(failure.describe().context(format!(
                        "Unattended run gave up after {} attempt(s)",
                        attempt
                    )));
                }
                let delay = backoff.next_delay();
                warn!(delay_ms = delay.as_millis() as u64, "Retrying unattended cycle");
                tokio::time::sleep(delay).await;
            }
        }
    }

    anyhow::bail!("Unattended run made no attempts")
}

async fn run_long<F>(
    scheduler: &mut Scheduler,
    config: &SupervisorConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut backoff = Backoff::from_config(config);

    loop {
        let ticks_before = scheduler.completed_ticks();
        let failure = tokio::select! {
            result = scheduler.run() => match result {
                Err(failure) => failure,
                Ok(never) => match never {},
            },
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                return Ok(());
            }
        };

        // A cycle that made progress starts the backoff over.
        if scheduler.completed_ticks() > ticks_before {
            backoff.reset();
        }
        log_failure(&failure, backoff.attempts() + 1);
        if !failure.is_transient() {
            return Err(failure.describe().context("Scheduler stopped on fatal failure"));
        }

        let delay = backoff.next_delay();
        warn!(delay_ms = delay.as_millis() as u64, "Restarting scheduler after backoff");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => {
                info!("Shutdown requested during backoff");
                return Ok(());
            }
        }
        scheduler.reset(tokio::time::Instant::now());
    }
}
