//! Core domain types
//!
//! This module contains the domain structures used across Tandem services.
//! Descriptors and pipelines are immutable definitions; runs and invocations
//! record what happened when a pipeline was executed.

pub mod binding;
pub mod descriptor;
pub mod event;
pub mod invocation;
pub mod pipeline;
pub mod run;
