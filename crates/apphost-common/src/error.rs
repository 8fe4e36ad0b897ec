//! Unified error types for the apphost workspace.
//!
//! Registration-time variants abort a composition before anything runs.
//! Run-time variants describe a single resource; the orchestrator records
//! them on that resource's status instead of aborting the whole run.
//! Publish-time failures are aggregated into one [`AppHostError::Publish`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum AppHostError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A resource with the same name was already declared.
    #[error("duplicate resource name: \"{name}\"")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// An operation referenced a resource that is not registered.
    #[error("unknown resource: \"{name}\"")]
    UnknownResource {
        /// The missing name.
        name: String,
    },

    /// The declared resources do not form a valid composition graph.
    #[error("invalid composition graph: {violation}")]
    InvalidGraph {
        /// What made the graph invalid.
        violation: GraphViolation,
    },

    /// Building a project resource failed.
    #[error("build failed for resource \"{resource}\": {cause}")]
    BuildFailed {
        /// Resource whose build step failed.
        resource: String,
        /// Description of the failure.
        cause: String,
    },

    /// Launching a resource failed.
    #[error("failed to launch resource \"{resource}\": {message}")]
    Launch {
        /// Resource that could not be launched.
        resource: String,
        /// Description of the failure.
        message: String,
    },

    /// Stopping a resource failed.
    #[error("failed to stop resource \"{resource}\": {message}")]
    Stop {
        /// Resource that could not be stopped.
        resource: String,
        /// Description of the failure.
        message: String,
    },

    /// One or more resources could not be published.
    #[error("publish failed for {} resource(s): {}", failures.len(), join_failures(failures))]
    Publish {
        /// Every failure collected during the publish pass.
        failures: Vec<PublishFailure>,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The composition file could not be parsed.
    #[error("composition file error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

/// The reason [`AppHostError::InvalidGraph`] was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphViolation {
    /// Two resources share a name.
    DuplicateName(String),
    /// A resource depends on a name that was never declared.
    MissingDependency {
        /// The dependent resource.
        resource: String,
        /// The undeclared dependency.
        dependency: String,
    },
    /// The dependency relation contains a cycle through these resources.
    Cycle(Vec<String>),
}

impl fmt::Display for GraphViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "duplicate resource name \"{name}\""),
            Self::MissingDependency {
                resource,
                dependency,
            } => write!(
                f,
                "resource \"{resource}\" depends on undeclared resource \"{dependency}\""
            ),
            Self::Cycle(members) => {
                write!(f, "cyclic dependency: {}", members.join(" -> "))?;
                if let Some(first) = members.first() {
                    write!(f, " -> {first}")?;
                }
                Ok(())
            }
        }
    }
}

/// A single resource that failed to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFailure {
    /// Resource that failed.
    pub resource: String,
    /// Description of the failure.
    pub cause: String,
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.cause)
    }
}

fn join_failures(failures: &[PublishFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppHostError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, AppHostError>;
