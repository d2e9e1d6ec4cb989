//! The worker loop: a single long-lived task that drains the change log,
//! applying each change to the closure engine and reporting long-stuck
//! entries.
//!
//! Mirrors the shape of a typical dequeue-process-commit loop: bound the
//! whole cycle with a timeout, claim one entry, dispatch it, and either
//! commit or roll back depending on the outcome — with an idle wait on a
//! wake-up signal (or a fallback timeout) when the queue is empty.

use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::queue::WakeReceiver;
use crate::server::apply_change;
use crate::storage::Storage;

/// What a single [`process_one`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A change was claimed, applied, and committed.
    Processed,
    /// The queue was empty; the call waited out a wake-up or a timeout
    /// before returning. Not a failure — drivers use this to decide
    /// whether to keep draining or to idle.
    NoWork,
}

/// Claim and process one change, or idle until there might be one.
///
/// The claim-through-commit cycle (including the engine's graph mutations,
/// which run through the same claim) is bounded by
/// `config.transaction_timeout()`; exceeding it is surfaced as
/// [`Error::Processing`].
#[tracing::instrument(skip(storage, wake, config, metrics))]
pub async fn process_one(
    storage: &dyn Storage,
    wake: &mut WakeReceiver,
    config: &Config,
    metrics: &Metrics,
) -> Result<ProcessOutcome> {
    let outcome = tokio::time::timeout(config.transaction_timeout(), async {
        let Some(claim) = storage.begin_claim().await? else {
            tokio::select! {
                () = wake.woken() => {}
                () = tokio::time::sleep(config.process_timeout) => {}
            }
            return Ok(ProcessOutcome::NoWork);
        };

        let change = claim.change().clone();
        let result = apply_change(claim.as_ref(), change.kind, &change.payload).await;

        match result {
            Ok(()) => {
                claim.commit().await?;
                metrics.record_processed();
                Ok(ProcessOutcome::Processed)
            }
            Err(err) => {
                claim.rollback().await?;
                metrics.record_failed();

                let age = Utc::now().signed_duration_since(change.created_at);
                let stale_period = chrono::Duration::from_std(config.stale_period)
                    .unwrap_or(chrono::Duration::MAX);
                if age > stale_period {
                    metrics.record_stale();
                    tracing::warn!(
                        change_id = %change.id,
                        change_kind = change.kind.as_str(),
                        age_secs = age.num_seconds(),
                        "stale change still failing to process"
                    );
                }

                tokio::time::sleep(config.process_timeout).await;
                Err(Error::Processing(format!(
                    "failed to process change {}: {err}",
                    change.id
                )))
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_elapsed) => Err(Error::Processing(
            "process_one exceeded its transaction timeout".to_string(),
        )),
    }
}

/// Run [`process_one`] forever. Intended to be spawned as the process's one
/// worker task; errors are logged and swallowed so a single bad change
/// cannot bring the worker down — it's retried on the next iteration.
pub async fn run(storage: Arc<dyn Storage>, mut wake: WakeReceiver, config: Config) {
    let metrics = Metrics::new();
    loop {
        match process_one(storage.as_ref(), &mut wake, &config, &metrics).await {
            Ok(_outcome) => {}
            Err(err) => {
                tracing::warn!(error = %err, "change processing failed, will retry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::channel;
    use crate::set::{Set, Tuple};
    use crate::storage::test_support::InMemoryStorage;
    use std::time::Duration;

    fn fast_config() -> Config {
        Config {
            process_timeout: Duration::from_millis(20),
            commit_grace: Duration::from_millis(20),
            stale_period: Duration::from_secs(3600),
            wake_channel_capacity: 1,
        }
    }

    #[tokio::test]
    async fn process_one_reports_no_work_on_an_empty_queue() {
        let storage = InMemoryStorage::new();
        let (_tx, mut rx) = channel(1);
        let metrics = Metrics::new();
        let outcome = process_one(&storage, &mut rx, &fast_config(), &metrics).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::NoWork);
    }

    #[tokio::test]
    async fn process_one_applies_a_queued_add_tuple() {
        let storage = InMemoryStorage::new();
        let (_tx, mut rx) = channel(1);
        let metrics = Metrics::new();
        let team = Set::new("team", "eng", "member");
        let alice = Set::new("user", "alice", "");

        storage.create_change(crate::set::ChangeKind::AddTuple, &Tuple::new(team.clone(), alice.clone()))
            .await
            .unwrap();

        let outcome = process_one(&storage, &mut rx, &fast_config(), &metrics).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        assert_eq!(storage.pending_change_count(), 0);
        assert_eq!(metrics.snapshot().changes_processed, 1);

        use crate::storage::GraphOps;
        assert_eq!(GraphOps::children(&storage, &team).await.unwrap(), vec![alice]);
    }

    #[tokio::test]
    async fn a_wake_up_lets_process_one_return_without_waiting_the_full_timeout() {
        let storage = InMemoryStorage::new();
        let (tx, mut rx) = channel(1);
        let metrics = Metrics::new();
        tx.notify();

        let started = tokio::time::Instant::now();
        let outcome = process_one(&storage, &mut rx, &fast_config(), &metrics).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::NoWork);
        assert!(started.elapsed() < Duration::from_millis(20));
    }
}
