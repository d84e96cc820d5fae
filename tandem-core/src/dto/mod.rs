//! Data Transfer Objects for the orchestrator HTTP API
//!
//! Request and response bodies exchanged between the orchestrator service
//! and its clients. Domain types that are already serializable (descriptors,
//! pipelines, invocations, events) are sent as-is.

pub mod invocation;
