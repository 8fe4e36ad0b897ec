//! `apphost run`: Build, start, and supervise the application.

use std::collections::HashSet;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use apphost_common::types::{ResourceStatus, RunState};
use apphost_runtime::engine::{Application, Collaborators, RunReport};
use apphost_runtime::state::RunSnapshot;
use clap::Args;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::output::{
    BOLD, CYAN, DIM, GREEN, RESET, format_elapsed, print_header, print_report, status_line,
};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Time each resource gets to stop before it is killed, in milliseconds.
    #[arg(long, env = "APPHOST_GRACE_PERIOD_MS")]
    pub grace_period_ms: Option<u64>,
}

/// Executes the `run` command.
///
/// Blocks until Ctrl+C / SIGTERM or until every resource has exited.
///
/// # Errors
///
/// Returns an error if the composition is invalid or a build step fails.
pub async fn execute(file: &Path, args: RunArgs) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    print_header();

    let (mut config, graph) = super::load(file)?;
    if let Some(ms) = args.grace_period_ms {
        config.grace_period_ms = ms;
    }

    let app = Application::new(graph, config.clone(), Collaborators::local(&config));
    eprintln!(
        "  Starting {BOLD}{}{RESET} resource(s) {DIM}[run {}]{RESET}",
        app.graph().len(),
        app.run_id()
    );
    eprintln!();

    let token = CancellationToken::new();
    let signal = tokio::spawn({
        let token = token.clone();
        async move {
            shutdown_signal().await;
            token.cancel();
        }
    });
    let status = app.subscribe();
    let progress = tokio::spawn(report_progress(app.subscribe(), started));

    let result = app.run(token).await;
    signal.abort();
    let _ = progress.await;

    let last = status.borrow().clone();
    let (snapshot, exit) = outcome(result, last);
    print_report(&snapshot);
    exit
}

/// Picks the snapshot to report and the exit status of a finished run.
///
/// A run that ended in an error, such as a failed build, still reports the
/// last published status so the failing resource is shown.
fn outcome(
    result: apphost_common::error::Result<RunReport>,
    last: RunSnapshot,
) -> (RunSnapshot, anyhow::Result<ExitCode>) {
    match result {
        Ok(report) => {
            let code = if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
            (report.snapshot, Ok(code))
        }
        Err(err) => (last, Err(anyhow::anyhow!("{err}"))),
    }
}

/// Prints each resource as it comes up, then the stop hint once startup settles.
async fn report_progress(mut rx: watch::Receiver<RunSnapshot>, started: Instant) {
    let mut announced = HashSet::new();
    let mut hinted = false;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        for resource in &snapshot.resources {
            if resource.status == ResourceStatus::Running && announced.insert(resource.name.clone())
            {
                eprintln!("{}", status_line(resource));
            }
        }

        let settled = snapshot
            .resources
            .iter()
            .all(|r| !matches!(r.status, ResourceStatus::Pending | ResourceStatus::Starting));
        if !hinted && settled && snapshot.state == RunState::Running {
            hinted = true;
            eprintln!();
            eprintln!(
                "  {GREEN}{BOLD}Started{RESET} {} resource(s) in {}",
                announced.len(),
                format_elapsed(started.elapsed())
            );
            eprintln!("  Press {BOLD}Ctrl+C{RESET} to stop the application...");
        }
        if snapshot.state == RunState::ShuttingDown && hinted {
            hinted = false;
            eprintln!();
            eprintln!("  {CYAN}Stopping resources...{RESET}");
        }

        if snapshot.state == RunState::Terminated || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves when the process receives Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                let _ = stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
