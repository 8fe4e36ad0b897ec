//! Orchestration lifecycle for the application host.
//!
//! [`engine::Application`] drives a finalized composition graph through
//! build, start, supervision, and reverse-order shutdown, or alternatively
//! publishes it. The work itself is delegated to three collaborator traits:
//! [`build::ProjectBuilder`], [`launch::Launcher`], and
//! [`publish::Publisher`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod build;
pub mod engine;
pub mod launch;
pub mod publish;
pub mod state;
mod supervisor;
