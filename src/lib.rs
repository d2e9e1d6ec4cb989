//! `relgraph`: a relationship-based authorization engine in the style of
//! Google Zanzibar.
//!
//! Authorization facts are directed edges ("tuples") between abstract
//! [`set::Set`]s; membership questions are answered by intersecting a
//! materialized transitive closure rather than walking the graph at query
//! time. A durable [`queue`] of pending mutations feeds a single-writer
//! [`worker`] that applies each change to the [`engine`], which keeps the
//! `children`/`parents`/`subsets` caches consistent. [`server::Server`] is
//! the caller-facing surface: `add`, `remove`, `check`, `list_children`,
//! `list_parents`.
//!
//! ```text
//! caller -> Server::add/remove -> change log -> wake signal
//!                                                   |
//!                                                   v
//!                                   worker::run -> engine::{add,remove}_tuple -> caches
//! ```
//!
//! The storage contract ([`storage::Storage`]/[`storage::GraphOps`]) is the
//! only thing tying this crate to Postgres; [`storage::PgStorage`] is the
//! one required implementation.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod server;
pub mod set;
pub mod storage;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use server::Server;
pub use set::{ChangeKind, Set, Tuple};
pub use storage::{GraphOps, PgStorage, Storage};
pub use worker::ProcessOutcome;
