//! The closure engine: incremental maintenance of `children`/`parents`/`subsets`
//! caches as tuples are added to and removed from the relation graph.
//!
//! Every operation here is generic over `S: GraphOps` rather than a concrete
//! type — the same code drives both the ambient, non-transactional storage
//! handle and a worker's in-flight claim (see `storage` for why those are
//! different types). Tests drive it through an in-memory fake.

use std::collections::HashSet;

use crate::error::Result;
use crate::set::{Set, Tuple};
use crate::storage::GraphOps;

/// Apply `ADD_TUPLE(a, b)`: `b` becomes a direct child of `a`, and `b`'s
/// subtree (itself plus its existing subsets) is appended to the `subsets`
/// cache of `a` and of every transitive superset of `a`.
#[tracing::instrument(skip(storage), fields(parent = ?tuple.parent, child = ?tuple.child))]
pub async fn add_tuple<S: GraphOps + ?Sized>(storage: &S, tuple: &Tuple) -> Result<()> {
    let a = &tuple.parent;
    let b = &tuple.child;

    let mut children = storage.children(a).await?;
    children.push(b.clone());
    storage.set_children(a, &children).await?;

    let mut parents = storage.parents(b).await?;
    parents.push(a.clone());
    storage.set_parents(b, &parents).await?;

    let mut reachable = storage.subsets(b).await?;
    reachable.push(b.clone());

    let mut a_subsets = storage.subsets(a).await?;
    a_subsets.extend(reachable.iter().cloned());
    storage.set_subsets(a, &a_subsets).await?;

    for p in compute_supersets(storage, a).await? {
        let mut p_subsets = storage.subsets(&p).await?;
        p_subsets.extend(reachable.iter().cloned());
        storage.set_subsets(&p, &p_subsets).await?;
    }

    storage.record_tuple(tuple).await?;
    Ok(())
}

/// Apply `REMOVE_TUPLE(a, b)`: drop the direct edge, then recompute `subsets`
/// from scratch for `a` and every transitive superset of `a`. List-subtraction
/// alone would be wrong here — `b`'s descendants may still be reachable
/// through another path.
#[tracing::instrument(skip(storage), fields(parent = ?tuple.parent, child = ?tuple.child))]
pub async fn remove_tuple<S: GraphOps + ?Sized>(storage: &S, tuple: &Tuple) -> Result<()> {
    let a = &tuple.parent;
    let b = &tuple.child;

    let children: Vec<Set> = storage
        .children(a)
        .await?
        .into_iter()
        .filter(|c| c != b)
        .collect();
    storage.set_children(a, &children).await?;

    let parents: Vec<Set> = storage
        .parents(b)
        .await?
        .into_iter()
        .filter(|p| p != a)
        .collect();
    storage.set_parents(b, &parents).await?;

    recompute_subsets(storage, a).await?;
    for p in compute_supersets(storage, a).await? {
        recompute_subsets(storage, &p).await?;
    }

    storage.delete_tuple(tuple).await?;
    Ok(())
}

/// Recompute and store `subsets(set)` from scratch via DFS over `children`.
async fn recompute_subsets<S: GraphOps + ?Sized>(storage: &S, set: &Set) -> Result<()> {
    let subsets = compute_subsets(storage, set).await?;
    storage.set_subsets(set, &subsets).await?;
    Ok(())
}

/// DFS on `parents`, returning every ancestor reachable from `set`.
/// Duplicates are possible when a node has more than one path to the same
/// ancestor; callers tolerate them. A visited set bounds the walk on cyclic
/// input — not a contract the engine guarantees correctness for, just a
/// terminator so a cycle doesn't hang the worker.
pub async fn compute_supersets<S: GraphOps + ?Sized>(storage: &S, set: &Set) -> Result<Vec<Set>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<Set> = storage.parents(set).await?;
    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        let grandparents = storage.parents(&node).await?;
        out.push(node);
        stack.extend(grandparents);
    }
    Ok(out)
}

/// DFS on `children`, returning every descendant reachable from `set`, each
/// subtree contributing its node before its own children. Same visited-set
/// cycle guard as [`compute_supersets`].
pub async fn compute_subsets<S: GraphOps + ?Sized>(storage: &S, set: &Set) -> Result<Vec<Set>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<Set> = storage.children(set).await?;
    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        let grandchildren = storage.children(&node).await?;
        out.push(node);
        stack.extend(grandchildren);
    }
    Ok(out)
}
