//! The `Set` value object and `Tuple` edge type.
//!
//! A `Set` names a node in the authorization graph: `(type, id, relation)`.
//! When `relation` is empty the set is a *singleton* — a concrete principal
//! such as a user — rather than an abstract group/relation.

use serde::{Deserialize, Serialize};

/// A node in the relation graph, identified by a `(type, id, relation)` triple.
///
/// All three fields participate in equality and hashing. Singletons
/// (`relation == ""`) represent concrete principals; non-singletons represent
/// abstract groups or relations, e.g. "members of team X".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Set {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
    pub relation: String,
}

impl Set {
    pub fn new(type_: impl Into<String>, id: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            id: id.into(),
            relation: relation.into(),
        }
    }

    /// A set with an empty relation represents a concrete principal rather
    /// than an abstract group.
    pub fn is_singleton(&self) -> bool {
        self.relation.is_empty()
    }
}

/// A directed edge from `parent` to `child`: `child` is a member of `parent`
/// in the relation `parent.relation` denotes. There is no separate edge
/// identity — `(parent, child)` is the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    pub parent: Set,
    pub child: Set,
}

impl Tuple {
    pub fn new(parent: Set, child: Set) -> Self {
        Self { parent, child }
    }
}

/// The kind of change recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    AddTuple,
    RemoveTuple,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::AddTuple => "ADD_TUPLE",
            ChangeKind::RemoveTuple => "REMOVE_TUPLE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ADD_TUPLE" => Some(ChangeKind::AddTuple),
            "REMOVE_TUPLE" => Some(ChangeKind::RemoveTuple),
            _ => None,
        }
    }
}
