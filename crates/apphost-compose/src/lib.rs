//! # apphost-compose
//!
//! Declaration side of the application host.
//!
//! Handles:
//! - **Resource**: the closed set of resource kinds and their annotations.
//! - **Registry**: accumulating declarations behind opaque handles.
//! - **Graph**: validation and deterministic start ordering.
//! - **Resolver**: environment wiring between dependent resources.
//! - **File**: loading declarations from an `apphost.yaml` composition file.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod file;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod resource;
