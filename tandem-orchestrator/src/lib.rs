//! Tandem Orchestrator
//!
//! Sequences containerized jobs into pipelines:
//! - Store: job descriptors and pipeline definitions
//! - Secrets: configuration resolution with per-invocation caching
//! - Executor: the per-invocation state machine
//! - Manager: background invocations and cancellation
//! - Tracker: append-only audit history (memory or SQLite)
//! - API: HTTP surface over all of the above

pub mod api;
pub mod config;
pub mod db;
pub mod executor;
pub mod manager;
pub mod secrets;
pub mod store;
pub mod tracker;

pub use executor::{ExecutorState, PipelineExecutor, PreparedInvocation, Transition};
pub use manager::InvocationManager;
pub use store::DescriptorStore;
