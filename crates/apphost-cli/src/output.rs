//! Formatted output helpers for CLI commands.
//!
//! Provides consistent colored status indicators and the per-resource
//! report printed when a run ends.

use std::time::Duration;

use apphost_common::constants::APP_NAME;
use apphost_common::types::ResourceStatus;
use apphost_runtime::state::{ResourceSnapshot, RunSnapshot};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RESET: &str = "\x1b[0m";

/// Prints the banner shown at the top of every long-running command.
pub fn print_header() {
    eprintln!();
    eprintln!("  {BOLD}{APP_NAME}{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
    eprintln!();
}

/// Color and glyph used for a status.
#[must_use]
pub const fn status_marker(status: &ResourceStatus) -> (&'static str, &'static str) {
    match status {
        ResourceStatus::Pending | ResourceStatus::Starting => (YELLOW, "\u{25cc}"),
        ResourceStatus::Running => (GREEN, "\u{25cf}"),
        ResourceStatus::Stopping => (YELLOW, "\u{25d0}"),
        ResourceStatus::Stopped => (DIM, "\u{25cb}"),
        ResourceStatus::Failed(_) => (RED, "\u{2716}"),
    }
}

/// One report line for a resource.
#[must_use]
pub fn status_line(resource: &ResourceSnapshot) -> String {
    let (color, glyph) = status_marker(&resource.status);
    let pid = resource
        .pid
        .map_or_else(String::new, |pid| format!(" {DIM}pid {pid}{RESET}"));
    format!(
        "    {color}{glyph}{RESET} {BOLD}{}{RESET} {DIM}[{}]{RESET} {color}{}{RESET}{pid}",
        resource.name, resource.kind, resource.status
    )
}

/// Counts per terminal outcome, e.g. `2 stopped, 1 failed`.
#[must_use]
pub fn summary(snapshot: &RunSnapshot) -> String {
    let failed = snapshot.failed().count();
    let stopped = snapshot
        .resources
        .iter()
        .filter(|r| r.status == ResourceStatus::Stopped)
        .count();
    let mut parts = vec![format!("{stopped} stopped")];
    if failed > 0 {
        parts.push(format!("{failed} failed"));
    }
    parts.join(", ")
}

/// Prints the final status of every resource.
pub fn print_report(snapshot: &RunSnapshot) {
    eprintln!();
    for resource in &snapshot.resources {
        eprintln!("{}", status_line(resource));
    }
    eprintln!();
    if snapshot.is_success() {
        eprintln!("  {GREEN}Application terminated:{RESET} {}", summary(snapshot));
    } else {
        eprintln!("  {RED}{BOLD}Application terminated with failures:{RESET} {}", summary(snapshot));
    }
}

/// Formats an elapsed duration for progress output (e.g. "1.2s").
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use apphost_common::types::{FailureReason, RunId, RunState};

    use super::*;

    fn snapshot(statuses: &[(&str, ResourceStatus)]) -> RunSnapshot {
        RunSnapshot {
            run_id: RunId::new("test"),
            state: RunState::Terminated,
            resources: statuses
                .iter()
                .map(|(name, status)| ResourceSnapshot {
                    name: (*name).to_string(),
                    kind: "process".into(),
                    status: status.clone(),
                    pid: None,
                    started_at: None,
                    finished_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn status_line_shows_failure_reason() {
        let snap = snapshot(&[(
            "api",
            ResourceStatus::Failed(FailureReason::DependencyFailed {
                dependency: "db".into(),
            }),
        )]);
        let line = status_line(&snap.resources[0]);
        assert!(line.contains("api"));
        assert!(line.contains("failed (dependency \"db\" failed)"));
        assert!(line.contains(RED));
    }

    #[test]
    fn status_line_shows_pid_while_running() {
        let mut snap = snapshot(&[("web", ResourceStatus::Running)]);
        snap.resources[0].pid = Some(1234);
        let line = status_line(&snap.resources[0]);
        assert!(line.contains("pid 1234"));
        assert!(line.contains(GREEN));
    }

    #[test]
    fn summary_counts_outcomes() {
        let snap = snapshot(&[
            ("a", ResourceStatus::Stopped),
            ("b", ResourceStatus::Stopped),
            ("c", ResourceStatus::Failed(FailureReason::ShutdownTimeout)),
        ]);
        assert_eq!(summary(&snap), "2 stopped, 1 failed");
        assert_eq!(summary(&snapshot(&[("a", ResourceStatus::Stopped)])), "1 stopped");
    }

    #[test]
    fn format_elapsed_switches_units() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
    }
}
