//! `Server`: the caller-facing API over a storage handle and a wake-up signal.
//!
//! Takes an `Arc<dyn Storage>` rather than reaching for any ambient/global
//! connection — construct one per process (or per test) and share it.

use std::sync::Arc;

use crate::engine;
use crate::error::{Error, Result};
use crate::queue::WakeSignal;
use crate::set::{ChangeKind, Set, Tuple};
use crate::storage::Storage;

pub struct Server {
    storage: Arc<dyn Storage>,
    wake: WakeSignal,
}

impl Server {
    pub fn new(storage: Arc<dyn Storage>, wake: WakeSignal) -> Self {
        Self { storage, wake }
    }

    /// Append an `ADD_TUPLE` change and nudge the worker; returns once the
    /// change is durably queued, not once it's been applied.
    pub async fn add(&self, tuple: Tuple) -> Result<()> {
        self.storage.create_change(ChangeKind::AddTuple, &tuple).await?;
        self.wake.notify();
        Ok(())
    }

    /// Append a `REMOVE_TUPLE` change and nudge the worker.
    pub async fn remove(&self, tuple: Tuple) -> Result<()> {
        self.storage.create_change(ChangeKind::RemoveTuple, &tuple).await?;
        self.wake.notify();
        Ok(())
    }

    /// Is `t.child` a member of `t.parent`, directly or transitively?
    pub async fn check(&self, t: &Tuple) -> Result<bool> {
        if t.parent.type_ == "system" && t.parent.id == "users" {
            return match t.parent.relation.as_str() {
                "*" => Ok(t.child.type_ == "user"),
                "authenticated" => Ok(t.child.type_ == "user" && !t.child.id.is_empty()),
                other => Err(Error::InvalidSystemGroup { relation: other.to_string() }),
            };
        }

        let mut candidates = self.storage.subsets(&t.parent).await?;
        candidates.push(t.parent.clone());
        let parents_of_child = self.storage.parents(&t.child).await?;

        Ok(candidates.iter().any(|c| parents_of_child.contains(c)))
    }

    pub async fn list_children(&self, type_: &str, id: &str, relation: &str) -> Result<Vec<Set>> {
        self.storage.children(&Set::new(type_, id, relation)).await
    }

    pub async fn list_parents(&self, type_: &str, id: &str, relation: &str) -> Result<Vec<Set>> {
        self.storage.parents(&Set::new(type_, id, relation)).await
    }
}

/// Dispatch a claimed change to the closure engine by its kind.
pub(crate) async fn apply_change<S: crate::storage::GraphOps + ?Sized>(
    storage: &S,
    kind: ChangeKind,
    tuple: &Tuple,
) -> Result<()> {
    match kind {
        ChangeKind::AddTuple => engine::add_tuple(storage, tuple).await,
        ChangeKind::RemoveTuple => engine::remove_tuple(storage, tuple).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::InMemoryStorage;

    fn set(type_: &str, id: &str, relation: &str) -> Set {
        Set::new(type_, id, relation)
    }

    fn server() -> (Server, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let (wake, _rx) = crate::queue::channel(1);
        (Server::new(storage.clone(), wake), storage)
    }

    #[tokio::test]
    async fn check_system_users_wildcard_accepts_any_user() {
        let (server, _storage) = server();
        let t = Tuple::new(set("system", "users", "*"), set("user", "alice", ""));
        assert!(server.check(&t).await.unwrap());

        let not_a_user = Tuple::new(set("system", "users", "*"), set("service", "bot", ""));
        assert!(!server.check(&not_a_user).await.unwrap());
    }

    #[tokio::test]
    async fn check_system_users_authenticated_requires_a_nonempty_id() {
        let (server, _storage) = server();
        let authed = Tuple::new(set("system", "users", "authenticated"), set("user", "alice", ""));
        assert!(server.check(&authed).await.unwrap());

        let anonymous = Tuple::new(set("system", "users", "authenticated"), set("user", "", ""));
        assert!(!server.check(&anonymous).await.unwrap());
    }

    #[tokio::test]
    async fn check_unknown_system_group_relation_errors() {
        let (server, _storage) = server();
        let t = Tuple::new(set("system", "users", "god"), set("user", "alice", ""));
        let err = server.check(&t).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSystemGroup { .. }));
    }

    #[tokio::test]
    async fn check_direct_membership_after_applying_a_tuple() {
        let (server, storage) = server();
        let team = set("team", "eng", "member");
        let alice = set("user", "alice", "");
        let tuple = Tuple::new(team.clone(), alice.clone());

        engine::add_tuple(storage.as_ref(), &tuple).await.unwrap();

        assert!(server.check(&tuple).await.unwrap());
        let stranger = Tuple::new(team, set("user", "mallory", ""));
        assert!(!server.check(&stranger).await.unwrap());
    }

    #[tokio::test]
    async fn add_queues_a_change_and_wakes_the_worker() {
        let (server, storage) = server();
        let tuple = Tuple::new(set("team", "eng", "member"), set("user", "alice", ""));
        server.add(tuple).await.unwrap();
        assert_eq!(storage.pending_change_count(), 1);
    }

    #[tokio::test]
    async fn list_children_and_parents_reflect_engine_state() {
        let (server, storage) = server();
        let team = set("team", "eng", "member");
        let alice = set("user", "alice", "");
        engine::add_tuple(storage.as_ref(), &Tuple::new(team.clone(), alice.clone())).await.unwrap();

        assert_eq!(server.list_children("team", "eng", "member").await.unwrap(), vec![alice.clone()]);
        assert_eq!(server.list_parents("user", "alice", "").await.unwrap(), vec![team]);
    }
}
