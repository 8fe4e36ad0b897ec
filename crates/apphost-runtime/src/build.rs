//! Build step for project resources.

use std::path::PathBuf;

use apphost_common::error::{AppHostError, Result};
use apphost_compose::resource::{CommandSpec, Resource, ResourceKind};
use async_trait::async_trait;

use crate::launch::resolve_program;

/// The runnable output of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Resource the artifact belongs to.
    pub resource: String,
    /// Command that runs the artifact.
    pub command: CommandSpec,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
}

/// Build collaborator, invoked once per buildable resource.
#[async_trait]
pub trait ProjectBuilder: Send + Sync {
    /// Builds a resource and returns how to run the result.
    ///
    /// # Errors
    ///
    /// Returns `BuildFailed` if the resource cannot be built.
    async fn build(&self, resource: &Resource) -> Result<Artifact>;
}

/// Builds a project by running its configured build command in its directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBuilder;

#[async_trait]
impl ProjectBuilder for CommandBuilder {
    async fn build(&self, resource: &Resource) -> Result<Artifact> {
        let ResourceKind::Project(project) = &resource.kind else {
            return Err(build_failed(resource, "resource has no build step"));
        };

        let program = resolve_program(&project.build.program, &project.path)
            .map_err(|e| build_failed(resource, e))?;
        tracing::info!(resource = %resource.name, command = %project.build, "building project");

        let status = tokio::process::Command::new(program)
            .args(&project.build.args)
            .current_dir(&project.path)
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| build_failed(resource, format!("cannot run build command: {e}")))?;

        if !status.success() {
            return Err(build_failed(
                resource,
                format!("`{}` exited with {status}", project.build),
            ));
        }

        tracing::info!(resource = %resource.name, "build succeeded");
        Ok(Artifact {
            resource: resource.name.clone(),
            command: project.run.clone(),
            working_dir: project.path.clone(),
        })
    }
}

fn build_failed(resource: &Resource, cause: impl ToString) -> AppHostError {
    AppHostError::BuildFailed {
        resource: resource.name.clone(),
        cause: cause.to_string(),
    }
}
