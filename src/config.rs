//! Runtime configuration for the worker loop.
//!
//! No CLI parsing lives here — wiring a CLI or RPC front end onto `Config` is
//! an outer-surface concern left to the embedding application. `Config` is
//! constructible from compiled-in defaults or overlaid from environment
//! variables; invalid overlay values are logged and ignored rather than
//! causing a panic.

use std::time::Duration;

/// Tunables for the worker loop and change-log maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bound on how long a single dequeue-through-commit cycle may take.
    pub process_timeout: Duration,
    /// Additional grace period allowed for the commit itself, on top of `process_timeout`.
    pub commit_grace: Duration,
    /// Age after which a failing change is reported as stale on every retry.
    pub stale_period: Duration,
    /// Capacity of the writer-to-worker wake-up channel. The contract only
    /// requires "at most one pending wake-up"; this is exposed for tests that
    /// want to observe the channel directly, not because larger values are
    /// meaningful.
    pub wake_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_timeout: Duration::from_secs(5),
            commit_grace: Duration::from_secs(2),
            stale_period: Duration::from_secs(60 * 60),
            wake_channel_capacity: 1,
        }
    }
}

impl Config {
    /// The timeout enforced on the whole dequeue-through-commit transaction:
    /// `process_timeout + commit_grace`.
    pub fn transaction_timeout(&self) -> Duration {
        self.process_timeout + self.commit_grace
    }

    /// Start from [`Config::default`] and overlay `RELGRAPH_PROCESS_TIMEOUT_MS`,
    /// `RELGRAPH_COMMIT_GRACE_MS` and `RELGRAPH_STALE_PERIOD_SECS` when set and
    /// parseable. A present-but-unparseable value is logged via
    /// `tracing::warn!` and the default for that field is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = Self::read_env_u64("RELGRAPH_PROCESS_TIMEOUT_MS") {
            config.process_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = Self::read_env_u64("RELGRAPH_COMMIT_GRACE_MS") {
            config.commit_grace = Duration::from_millis(ms);
        }
        if let Some(secs) = Self::read_env_u64("RELGRAPH_STALE_PERIOD_SECS") {
            config.stale_period = Duration::from_secs(secs);
        }

        config
    }

    fn read_env_u64(key: &str) -> Option<u64> {
        match std::env::var(key) {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(key, raw, "ignoring unparseable config override, keeping default");
                    None
                }
            },
            Err(_) => None,
        }
    }
}
