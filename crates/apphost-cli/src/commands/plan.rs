//! `apphost plan`: Display the start plan without running anything.

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use apphost_common::config::HostConfig;
use apphost_compose::graph::CompositionGraph;
use apphost_compose::resolver;
use apphost_compose::resource::{PublishStrategy, ResourceKind};
use clap::Args;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Also print the resolved environment of every resource.
    #[arg(long)]
    pub env: bool,
}

/// Executes the `plan` command.
///
/// Loads the composition file, validates the graph, and prints the start
/// levels with each resource's dependencies and publish annotation.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the graph is invalid.
pub fn execute(file: &Path, args: &PlanArgs) -> anyhow::Result<ExitCode> {
    let (config, graph) = super::load(file)?;
    print!("{}", render(file, &config, &graph, args.env));
    Ok(ExitCode::SUCCESS)
}

fn render(file: &Path, config: &HostConfig, graph: &CompositionGraph, with_env: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Start plan for: {}", file.display());
    let _ = writeln!(out, "{}", "\u{2550}".repeat(35));
    let _ = writeln!(out);

    for (depth, level) in graph.start_levels().iter().enumerate() {
        let _ = writeln!(out, "  level {depth}");
        for resource in level {
            let _ = writeln!(out, "    + {} [{}]", resource.name, resource.kind.label());
            match &resource.kind {
                ResourceKind::Project(project) => {
                    let _ = writeln!(out, "        build: {}", project.build);
                    let _ = writeln!(out, "        run:   {}", project.run);
                }
                ResourceKind::Process(process) => {
                    let _ = writeln!(out, "        run:   {}", process.command);
                }
            }
            if let Some(port) = resource.port {
                let _ = writeln!(out, "        port: {port}");
            }
            if !resource.depends_on.is_empty() {
                let _ = writeln!(out, "        after: {}", resource.depends_on.join(", "));
            }
            if let Some(PublishStrategy::ContainerImage(options)) = &resource.publish {
                let image = config.image_reference(
                    options.image_name.as_deref().unwrap_or(&resource.name),
                );
                let _ = writeln!(out, "        publish: container image {image}");
            }
            if with_env {
                for (key, value) in resolver::resolve_environment(graph, resource) {
                    let _ = writeln!(out, "        env {key}={value}");
                }
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  {} resource(s) will be started.", graph.len());
    let _ = writeln!(
        out,
        "  Stop order is the reverse of the achieved start order (grace period {} ms).",
        config.grace_period_ms
    );
    out
}
