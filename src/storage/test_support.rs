//! An in-memory `Storage` double used by unit tests elsewhere in the crate.
//! Not a fixture for storage.rs's own tests (those exercise SQL via
//! integration tests) — this is for `engine`, `server` and `worker` tests
//! that want a closure-engine seam without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ChangeRecord, Claim, GraphOps, Storage};
use crate::error::Result;
use crate::set::{ChangeKind, Set, Tuple};

#[derive(Default)]
struct Caches {
    children: HashMap<Set, Vec<Set>>,
    parents: HashMap<Set, Vec<Set>>,
    subsets: HashMap<Set, Vec<Set>>,
}

struct QueueRow {
    record: ChangeRecord,
    processed: bool,
}

#[derive(Default)]
pub struct InMemoryStorage {
    caches: Arc<Mutex<Caches>>,
    tuples: Arc<Mutex<Vec<Tuple>>>,
    changes: Arc<Mutex<Vec<QueueRow>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_change_count(&self) -> usize {
        self.changes.lock().unwrap().iter().filter(|c| !c.processed).count()
    }
}

/// Claim and apply every currently-queued change, for tests that need a
/// deterministic post-write state before asserting on `check`. Panics if a
/// claimed change fails to apply — callers pick a storage double or fixture
/// where that can't happen.
pub async fn drain(storage: &dyn Storage) {
    loop {
        match storage.begin_claim().await.expect("begin_claim") {
            None => break,
            Some(claim) => {
                let change = claim.change().clone();
                crate::server::apply_change(claim.as_ref(), change.kind, &change.payload)
                    .await
                    .expect("applying queued change");
                claim.commit().await.expect("commit");
            }
        }
    }
}

async fn read_column(caches: &Mutex<Caches>, which: fn(&Caches) -> &HashMap<Set, Vec<Set>>, set: &Set) -> Result<Vec<Set>> {
    Ok(which(&caches.lock().unwrap()).get(set).cloned().unwrap_or_default())
}

#[async_trait]
impl GraphOps for InMemoryStorage {
    async fn children(&self, set: &Set) -> Result<Vec<Set>> {
        read_column(&self.caches, |c| &c.children, set).await
    }

    async fn parents(&self, set: &Set) -> Result<Vec<Set>> {
        read_column(&self.caches, |c| &c.parents, set).await
    }

    async fn subsets(&self, set: &Set) -> Result<Vec<Set>> {
        read_column(&self.caches, |c| &c.subsets, set).await
    }

    async fn set_children(&self, set: &Set, children: &[Set]) -> Result<()> {
        self.caches.lock().unwrap().children.insert(set.clone(), children.to_vec());
        Ok(())
    }

    async fn set_parents(&self, set: &Set, parents: &[Set]) -> Result<()> {
        self.caches.lock().unwrap().parents.insert(set.clone(), parents.to_vec());
        Ok(())
    }

    async fn set_subsets(&self, set: &Set, subsets: &[Set]) -> Result<()> {
        self.caches.lock().unwrap().subsets.insert(set.clone(), subsets.to_vec());
        Ok(())
    }

    async fn record_tuple(&self, tuple: &Tuple) -> Result<()> {
        self.tuples.lock().unwrap().push(tuple.clone());
        Ok(())
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<()> {
        self.tuples.lock().unwrap().retain(|t| t != tuple);
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_change(&self, kind: ChangeKind, tuple: &Tuple) -> Result<()> {
        let record = ChangeRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            payload: tuple.clone(),
            created_at: Utc::now(),
        };
        self.changes.lock().unwrap().push(QueueRow { record, processed: false });
        Ok(())
    }

    async fn begin_claim(&self) -> Result<Option<Box<dyn Claim>>> {
        let mut rows = self.changes.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| !r.processed) else {
            return Ok(None);
        };
        row.processed = true;
        let change = row.record.clone();
        drop(rows);
        Ok(Some(Box::new(InMemoryClaim {
            change,
            caches: self.caches.clone(),
            tuples: self.tuples.clone(),
            changes: self.changes.clone(),
        })))
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn count_unprocessed(&self) -> Result<i64> {
        Ok(self.pending_change_count() as i64)
    }
}

/// A claim backed by the same shared maps as its `InMemoryStorage`.
/// `rollback` flips the row back to unprocessed instead of rolling back a
/// database transaction; unlike `PgClaim`, cache writes made through this
/// claim are not undone on rollback, since the in-memory double has no
/// transaction isolation to give them. Tests relying on rollback undoing
/// cache writes should use the Postgres-backed integration tests instead.
struct InMemoryClaim {
    change: ChangeRecord,
    caches: Arc<Mutex<Caches>>,
    tuples: Arc<Mutex<Vec<Tuple>>>,
    changes: Arc<Mutex<Vec<QueueRow>>>,
}

#[async_trait]
impl GraphOps for InMemoryClaim {
    async fn children(&self, set: &Set) -> Result<Vec<Set>> {
        read_column(&self.caches, |c| &c.children, set).await
    }

    async fn parents(&self, set: &Set) -> Result<Vec<Set>> {
        read_column(&self.caches, |c| &c.parents, set).await
    }

    async fn subsets(&self, set: &Set) -> Result<Vec<Set>> {
        read_column(&self.caches, |c| &c.subsets, set).await
    }

    async fn set_children(&self, set: &Set, children: &[Set]) -> Result<()> {
        self.caches.lock().unwrap().children.insert(set.clone(), children.to_vec());
        Ok(())
    }

    async fn set_parents(&self, set: &Set, parents: &[Set]) -> Result<()> {
        self.caches.lock().unwrap().parents.insert(set.clone(), parents.to_vec());
        Ok(())
    }

    async fn set_subsets(&self, set: &Set, subsets: &[Set]) -> Result<()> {
        self.caches.lock().unwrap().subsets.insert(set.clone(), subsets.to_vec());
        Ok(())
    }

    async fn record_tuple(&self, tuple: &Tuple) -> Result<()> {
        self.tuples.lock().unwrap().push(tuple.clone());
        Ok(())
    }

    async fn delete_tuple(&self, tuple: &Tuple) -> Result<()> {
        self.tuples.lock().unwrap().retain(|t| t != tuple);
        Ok(())
    }
}

#[async_trait]
impl Claim for InMemoryClaim {
    fn change(&self) -> &ChangeRecord {
        &self.change
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut rows = self.changes.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.record.id == self.change.id) {
            row.processed = false;
        }
        Ok(())
    }
}
