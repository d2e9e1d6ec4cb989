//! Storage contract for the relation graph.
//!
//! [`GraphOps`] is the set of graph reads/writes the closure engine needs;
//! it's implemented both by [`Storage`] itself (for the ambient,
//! non-transactional reads `check`/`list_children`/`list_parents` make) and
//! by [`Claim`] (for the worker's dequeue-then-mutate path, where the cache
//! mutations must commit or roll back together with the `processed` flag
//! flip together). Engine functions are generic over
//! `S: GraphOps + ?Sized` so the same code drives either.

mod postgres;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use postgres::PgStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::set::{ChangeKind, Set, Tuple};

/// A change log row, decoded from its JSONB payload.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub id: String,
    pub kind: ChangeKind,
    pub payload: Tuple,
    pub created_at: DateTime<Utc>,
}

/// Graph reads and writes shared by the ambient storage handle and an
/// in-flight claim. List-valued writes replace the whole list.
#[async_trait]
pub trait GraphOps: Send + Sync {
    async fn children(&self, set: &Set) -> Result<Vec<Set>>;
    async fn parents(&self, set: &Set) -> Result<Vec<Set>>;
    async fn subsets(&self, set: &Set) -> Result<Vec<Set>>;

    async fn set_children(&self, set: &Set, children: &[Set]) -> Result<()>;
    async fn set_parents(&self, set: &Set, parents: &[Set]) -> Result<()>;
    async fn set_subsets(&self, set: &Set, subsets: &[Set]) -> Result<()>;

    /// Record a tuple in the `tuples` audit table. Not read by the closure
    /// engine or `Check` — exists so the full edge set can be inspected or
    /// used to rebuild `caches` out of band.
    async fn record_tuple(&self, tuple: &Tuple) -> Result<()>;

    /// Remove a tuple's audit row.
    async fn delete_tuple(&self, tuple: &Tuple) -> Result<()>;
}

#[async_trait]
pub trait Storage: GraphOps {
    /// Append a change row and return immediately; the worker picks it up
    /// on its own schedule (or sooner, if woken).
    async fn create_change(&self, kind: ChangeKind, tuple: &Tuple) -> Result<()>;

    /// Claim the oldest unprocessed change, if any. `None` means the queue
    /// was empty at the time of the attempt (the no-op claim transaction is
    /// committed before returning).
    async fn begin_claim(&self) -> Result<Option<Box<dyn Claim>>>;

    /// Create the `tuples`, `caches` and `changes` tables if they don't
    /// already exist. Idempotent; safe to call on every startup.
    async fn ensure_schema(&self) -> Result<()>;

    /// Count unprocessed rows in the change log. No read-after-write
    /// guarantee is offered without draining; callers that need one —
    /// chiefly the test harness's `drain()` helper — poll this until it
    /// reaches zero.
    async fn count_unprocessed(&self) -> Result<i64>;
}

/// An oldest-unprocessed change claimed off the log, with its marking
/// transaction still open. The engine mutates caches through this same
/// claim (`GraphOps`), so the `processed` flip and the cache writes commit
/// or roll back as one unit.
///
/// Dropping a claim without calling `commit` or `rollback` leaves its
/// backing transaction to roll back implicitly, same as an explicit
/// rollback — but the worker loop always calls one of the two explicitly
/// so the change log's state is never left to an implicit drop.
#[async_trait]
pub trait Claim: GraphOps {
    fn change(&self) -> &ChangeRecord;

    /// Keep the change marked processed, along with whatever cache writes
    /// were made through this claim.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Undo the processed flag and any cache writes made through this
    /// claim, so the change is retried by a later claim.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
