//! Per-pass units of work.
//!
//! A scope is built once per reconcile pass, collects every mutation the pass
//! makes to its primary resource and commits them in a single write when it
//! is closed.

mod cluster;

pub use cluster::{ClusterScope, ClusterScopeParams};
