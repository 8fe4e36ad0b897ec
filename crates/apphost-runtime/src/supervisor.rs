//! Per-resource supervisor tasks.
//!
//! Each launched resource gets a task that owns its process handle. The
//! task waits for either the process to exit or a stop request, and
//! reports exactly one terminal [`SupervisorEvent`] back to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use apphost_common::error::Result;
use tokio::sync::{mpsc, oneshot};

use crate::launch::{Launcher, ProcessExit, ProcessHandle, StopOutcome};

/// Terminal event reported by a supervisor.
#[derive(Debug)]
pub(crate) enum SupervisorEvent {
    /// The process exited without being asked to.
    Exited {
        resource: String,
        exit: Result<ProcessExit>,
    },
    /// The process was stopped on request.
    Stopped {
        resource: String,
        outcome: Result<StopOutcome>,
    },
}

impl SupervisorEvent {
    pub(crate) fn resource(&self) -> &str {
        match self {
            Self::Exited { resource, .. } | Self::Stopped { resource, .. } => resource,
        }
    }
}

enum Wake {
    Exited(Result<ProcessExit>),
    StopRequested,
}

/// Spawns the supervisor for a launched resource.
///
/// Sending on (or dropping) the returned channel requests a stop.
pub(crate) fn spawn(
    resource: String,
    mut handle: Box<dyn ProcessHandle>,
    launcher: Arc<dyn Launcher>,
    grace: Duration,
    events: mpsc::UnboundedSender<SupervisorEvent>,
) -> oneshot::Sender<()> {
    let (stop_tx, stop_rx) = oneshot::channel();

    drop(tokio::spawn(async move {
        let wake = tokio::select! {
            exit = handle.wait() => Wake::Exited(exit),
            _ = stop_rx => Wake::StopRequested,
        };

        let event = match wake {
            Wake::Exited(exit) => {
                tracing::debug!(resource = %resource, ?exit, "process exited on its own");
                SupervisorEvent::Exited { resource, exit }
            }
            Wake::StopRequested => {
                tracing::debug!(resource = %resource, ?grace, "stopping process");
                let outcome = launcher.stop(handle.as_mut(), grace).await;
                SupervisorEvent::Stopped { resource, outcome }
            }
        };
        let _ = events.send(event);
    }));

    stop_tx
}
