//! Tandem Core
//!
//! Core types and abstractions for the Tandem workflow orchestrator.
//!
//! This crate contains:
//! - Domain types: job descriptors, pipelines, runs, invocations, events
//! - Errors: the orchestration error taxonomy shared by every component
//! - Sink: the event sink collaborator the runner and tracker agree on
//! - DTOs: Data transfer objects for the orchestrator HTTP API

pub mod domain;
pub mod dto;
pub mod error;
pub mod sink;

pub use error::{OrchestrationError, Result};
pub use sink::{EventSink, SinkError};
