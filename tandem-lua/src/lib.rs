//! Tandem Lua Manifests
//!
//! Job descriptors and pipeline definitions are declared in a Lua file that
//! returns a table. This crate provides:
//! - A restricted sandbox to evaluate that file safely
//! - A parser that turns the returned table into domain types

pub mod parser;
pub mod sandbox;

pub use parser::{Manifest, parse_manifest, parse_manifest_file};
pub use sandbox::create_sandbox;
