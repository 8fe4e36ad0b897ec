//! `apphost publish`: Write deployable descriptors for annotated resources.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use apphost_common::error::AppHostError;
use apphost_runtime::engine::{Application, Collaborators};
use clap::Args;

use crate::output::{BOLD, DIM, GREEN, RED, RESET, YELLOW, print_header};

/// Arguments for the `publish` command.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Directory to write artifacts into (defaults to the file's `output_dir`).
    #[arg(short, long, env = "APPHOST_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Image tag for published container images.
    #[arg(long, env = "APPHOST_TAG")]
    pub tag: Option<String>,

    /// Image repository prefix for published container images.
    #[arg(long, env = "APPHOST_REPOSITORY")]
    pub repository: Option<String>,
}

/// Executes the `publish` command.
///
/// # Errors
///
/// Returns an error if the composition is invalid or the output directory
/// cannot be written. Per-resource publish failures are listed and turn
/// into a non-zero exit code.
pub fn execute(file: &Path, args: PublishArgs) -> anyhow::Result<ExitCode> {
    print_header();

    let (mut config, graph) = super::load(file)?;
    if let Some(tag) = args.tag {
        config.image_tag = tag;
    }
    if let Some(repository) = args.repository {
        config.repository = Some(repository);
    }
    let target = args.output.unwrap_or_else(|| config.output_dir.clone());

    let app = Application::new(graph, config.clone(), Collaborators::local(&config));
    match app.publish(&target) {
        Ok(report) => {
            for name in &report.published {
                eprintln!(
                    "    {GREEN}\u{25cf}{RESET} {BOLD}{name}{RESET} {DIM}-> {}{RESET}",
                    report.target_dir.join(name).display()
                );
            }
            for name in &report.skipped {
                eprintln!("    {DIM}\u{25cb} {name} (no publish strategy){RESET}");
            }
            eprintln!();
            eprintln!(
                "  {GREEN}{BOLD}Published {}{RESET} resource(s); manifest at {}",
                report.published.len(),
                report.manifest.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(AppHostError::Publish { failures }) => {
            for failure in &failures {
                eprintln!(
                    "    {RED}\u{2716}{RESET} {BOLD}{}{RESET} {RED}{}{RESET}",
                    failure.resource, failure.cause
                );
            }
            eprintln!();
            eprintln!(
                "  {YELLOW}Publish failed for {} resource(s).{RESET}",
                failures.len()
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(anyhow::anyhow!("{e}")),
    }
}
