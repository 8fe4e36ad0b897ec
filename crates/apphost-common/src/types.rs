//! Domain primitive types used across the apphost workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a single orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Creates a run ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a resource ended in [`ResourceStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The resource's build step failed.
    BuildFailed(String),
    /// The launch collaborator could not start the resource.
    LaunchFailed(String),
    /// A dependency never reached `Running`, so the resource was not launched.
    DependencyFailed {
        /// The dependency that blocked this resource.
        dependency: String,
    },
    /// The process exited on its own with a failure status.
    ExitedAbnormally {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },
    /// The process ignored the stop request and was killed after the grace period.
    ShutdownTimeout,
    /// The stop request itself failed.
    StopFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildFailed(cause) => write!(f, "build failed: {cause}"),
            Self::LaunchFailed(cause) => write!(f, "launch failed: {cause}"),
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency \"{dependency}\" failed")
            }
            Self::ExitedAbnormally { code: Some(code) } => write!(f, "exited with code {code}"),
            Self::ExitedAbnormally { code: None } => write!(f, "terminated by signal"),
            Self::ShutdownTimeout => write!(f, "shutdown timeout"),
            Self::StopFailed(cause) => write!(f, "stop failed: {cause}"),
        }
    }
}

/// Lifecycle status of a single resource within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    /// Declared but not yet launched.
    Pending,
    /// The launch collaborator is starting the resource.
    Starting,
    /// Launch was acknowledged and the process is alive.
    Running,
    /// A stop request is in progress.
    Stopping,
    /// Exited cleanly or was stopped within the grace period.
    Stopped,
    /// Ended in failure.
    Failed(FailureReason),
}

impl ResourceStatus {
    /// Returns whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// Returns whether the resource ended in failure.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Externally observable state of the whole application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// Nothing has been started.
    Idle,
    /// Resources are being started or supervised.
    Running,
    /// Resources are being stopped in reverse start order.
    ShuttingDown,
    /// Every resource reached a terminal status.
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_run_ids_are_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
    }

    #[test]
    fn terminal_statuses() {
        assert!(ResourceStatus::Stopped.is_terminal());
        assert!(ResourceStatus::Failed(FailureReason::ShutdownTimeout).is_terminal());
        assert!(!ResourceStatus::Running.is_terminal());
        assert!(!ResourceStatus::Stopping.is_terminal());
    }

    #[test]
    fn failed_status_displays_reason() {
        let status = ResourceStatus::Failed(FailureReason::DependencyFailed {
            dependency: "db".into(),
        });
        assert_eq!(status.to_string(), "failed (dependency \"db\" failed)");
    }
}
