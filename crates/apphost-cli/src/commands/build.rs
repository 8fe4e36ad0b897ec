//! `apphost build`: Run the build step of every project resource.

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use apphost_common::error::AppHostError;
use apphost_runtime::engine::{Application, Collaborators};
use clap::Args;

use crate::output::{BOLD, GREEN, RED, RESET, format_elapsed, print_header};

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if the composition is invalid. A failing build step is
/// reported and turns into a non-zero exit code.
pub async fn execute(file: &Path, _args: BuildArgs) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    print_header();

    let (config, graph) = super::load(file)?;
    let projects: Vec<String> = graph
        .topological_start_order()
        .into_iter()
        .filter(|r| r.kind.has_build_step())
        .map(|r| r.name.clone())
        .collect();
    if projects.is_empty() {
        eprintln!("  Nothing to build.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut app = Application::new(graph, config.clone(), Collaborators::local(&config));
    match app.build().await {
        Ok(()) => {
            for name in &projects {
                eprintln!("    {GREEN}\u{25cf}{RESET} {BOLD}{name}{RESET}");
            }
            eprintln!();
            eprintln!(
                "  {GREEN}{BOLD}Built {}{RESET} project(s) in {}",
                projects.len(),
                format_elapsed(started.elapsed())
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(AppHostError::BuildFailed { resource, cause }) => {
            eprintln!("    {RED}\u{2716}{RESET} {BOLD}{resource}{RESET} {RED}{cause}{RESET}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(anyhow::anyhow!("{e}")),
    }
}
