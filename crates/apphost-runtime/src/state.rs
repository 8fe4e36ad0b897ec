//! Run-state table and the snapshots readers observe.
//!
//! The orchestrator is the only writer. Every mutation replaces the value
//! held by a `tokio::sync::watch` channel, so a reader always sees a whole
//! snapshot and never a half-applied update.

use apphost_common::types::{ResourceStatus, RunId, RunState};
use apphost_compose::graph::CompositionGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Point-in-time view of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource name.
    pub name: String,
    /// Kind label (`project`, `process`).
    pub kind: String,
    /// Current status.
    pub status: ResourceStatus,
    /// OS process ID while launched.
    pub pid: Option<u32>,
    /// When the launch was acknowledged.
    pub started_at: Option<DateTime<Utc>>,
    /// When the resource reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Identifier of the run.
    pub run_id: RunId,
    /// Global run state.
    pub state: RunState,
    /// Every resource, in declaration order.
    pub resources: Vec<ResourceSnapshot>,
}

impl RunSnapshot {
    /// Returns the snapshot of a resource by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceSnapshot> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Returns the status of a resource by name.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<&ResourceStatus> {
        self.get(name).map(|r| &r.status)
    }

    /// Returns the resources that ended in failure.
    pub fn failed(&self) -> impl Iterator<Item = &ResourceSnapshot> {
        self.resources.iter().filter(|r| r.status.is_failed())
    }

    /// Returns whether no resource failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Writer side of the run-state table.
#[derive(Debug)]
pub(crate) struct StatusTable {
    tx: watch::Sender<RunSnapshot>,
}

impl StatusTable {
    pub(crate) fn new(run_id: RunId, graph: &CompositionGraph) -> Self {
        let resources = graph
            .resources()
            .iter()
            .map(|r| ResourceSnapshot {
                name: r.name.clone(),
                kind: r.kind.label().to_string(),
                status: ResourceStatus::Pending,
                pid: None,
                started_at: None,
                finished_at: None,
            })
            .collect();
        let (tx, _rx) = watch::channel(RunSnapshot {
            run_id,
            state: RunState::Idle,
            resources,
        });
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> RunSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn status(&self, name: &str) -> Option<ResourceStatus> {
        self.tx.borrow().status(name).cloned()
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.tx.send_modify(|snapshot| {
            tracing::info!(run_id = %snapshot.run_id, from = %snapshot.state, to = %state, "run state changed");
            snapshot.state = state;
        });
    }

    pub(crate) fn set_status(&self, name: &str, status: ResourceStatus) {
        self.tx.send_modify(|snapshot| {
            let Some(entry) = snapshot.resources.iter_mut().find(|r| r.name == name) else {
                return;
            };
            if let ResourceStatus::Failed(reason) = &status {
                tracing::warn!(resource = %name, from = %entry.status, %reason, "resource failed");
            } else {
                tracing::info!(resource = %name, from = %entry.status, to = %status, "resource status changed");
            }
            match status {
                ResourceStatus::Running => entry.started_at = Some(Utc::now()),
                ResourceStatus::Stopped | ResourceStatus::Failed(_) => {
                    entry.finished_at = Some(Utc::now());
                    entry.pid = None;
                }
                _ => {}
            }
            entry.status = status;
        });
    }

    pub(crate) fn set_pid(&self, name: &str, pid: Option<u32>) {
        self.tx.send_modify(|snapshot| {
            if let Some(entry) = snapshot.resources.iter_mut().find(|r| r.name == name) {
                entry.pid = pid;
            }
        });
    }

    /// Names of resources currently in `status`, in declaration order.
    pub(crate) fn names_with(&self, status: &ResourceStatus) -> Vec<String> {
        self.tx
            .borrow()
            .resources
            .iter()
            .filter(|r| r.status == *status)
            .map(|r| r.name.clone())
            .collect()
    }
}
