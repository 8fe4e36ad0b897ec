//! # apphost-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the apphost workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the status model, error taxonomy, and
//! settings that the compose, runtime, and CLI crates build upon.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
