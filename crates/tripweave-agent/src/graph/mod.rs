//! Dependency graph execution for a planning run.
//!
//! The graph is static: every `AgentRole` is a node and its edges come from
//! `AgentRole::dependencies()`. The `GraphExecutor` launches each role as soon
//! as all of its dependencies have succeeded, retries transient failures, and
//! short-circuits the dependents of a failed role.

pub mod executor;

pub use executor::GraphExecutor;
