//! CLI command definitions and dispatch.

pub mod build;
pub mod plan;
pub mod publish;
pub mod run;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use apphost_common::config::HostConfig;
use apphost_common::constants::{BIN_NAME, DEFAULT_COMPOSITION_FILE};
use apphost_compose::file::load_registry;
use apphost_compose::graph::CompositionGraph;
use clap::{Parser, Subcommand};

/// apphost: run a composition of local resources as one application.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the composition file.
    #[arg(short, long, global = true, env = "APPHOST_FILE", default_value = DEFAULT_COMPOSITION_FILE)]
    pub file: PathBuf,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build, start, and supervise every resource until interrupted.
    Run(run::RunArgs),
    /// Write deployable descriptors for annotated resources.
    Publish(publish::PublishArgs),
    /// Run the build step of every project resource.
    Build(build::BuildArgs),
    /// Show start order, dependencies, and wiring without running anything.
    Plan(plan::PlanArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the composition cannot be loaded or the command
/// cannot proceed. Per-resource failures are reported through the exit code.
pub async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run(args) => run::execute(&cli.file, args).await,
        Command::Publish(args) => publish::execute(&cli.file, args),
        Command::Build(args) => build::execute(&cli.file, args).await,
        Command::Plan(args) => plan::execute(&cli.file, &args),
    }
}

/// Loads and validates a composition file.
fn load(file: &Path) -> anyhow::Result<(HostConfig, CompositionGraph)> {
    if !file.exists() {
        return Err(anyhow::anyhow!(
            "Composition file not found: {}\n\
             Create an apphost.yaml or specify a path: apphost --file <file> <command>",
            file.display()
        ));
    }
    let (config, registry) =
        load_registry(file).with_context(|| format!("failed to load {}", file.display()))?;
    let graph = registry
        .finalize()
        .with_context(|| format!("invalid composition in {}", file.display()))?;
    tracing::debug!(resources = graph.len(), "composition loaded");
    Ok((config, graph))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_file_after_subcommand() {
        let cli = Cli::try_parse_from(["apphost", "plan", "--file", "demo.yaml"]).expect("parse");
        assert_eq!(cli.file, PathBuf::from("demo.yaml"));
        assert!(matches!(cli.command, Command::Plan(_)));
    }

    #[test]
    fn publish_flags_parse() {
        let cli = Cli::try_parse_from([
            "apphost", "publish", "--output", "dist", "--tag", "1.2.0",
        ])
        .expect("parse");
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(args.output, Some(PathBuf::from("dist")));
        assert_eq!(args.tag.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(Path::new("definitely-missing/apphost.yaml")).expect_err("missing");
        assert!(err.to_string().contains("Composition file not found"));
    }

    #[test]
    fn invalid_graph_is_reported_with_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("apphost.yaml");
        std::fs::write(
            &path,
            "resources:\n  - name: a\n    npm: { dir: a, script: start }\n    depends_on: [ghost]\n",
        )
        .expect("write");

        let err = load(&path).expect_err("invalid");
        assert!(err.to_string().starts_with("invalid composition"));
        assert!(format!("{err:#}").contains("ghost"));
    }
}
