//! Launching and stopping resource processes.
//!
//! [`Launcher`] is the seam between the orchestrator and whatever actually
//! runs a resource. [`ProcessLauncher`] runs each resource as a local child
//! process in its own process group, so a stop request reaches the whole
//! tree a package-script runner spawns.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use apphost_common::error::{AppHostError, Result};
use apphost_compose::resource::{CommandSpec, Resource, ResourceKind};
use async_trait::async_trait;

use crate::build::Artifact;

/// Everything a launcher needs besides the resource itself.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    /// Fully resolved environment, including injected connection variables.
    pub env: Vec<(String, String)>,
    /// Build output for project resources.
    pub artifact: Option<Artifact>,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Whether the exit counts as success.
    pub success: bool,
}

impl ProcessExit {
    /// A zero exit.
    pub const SUCCESS: Self = Self {
        code: Some(0),
        success: true,
    };

    /// Builds an exit from a platform exit status.
    #[must_use]
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited within the grace period.
    Graceful(ProcessExit),
    /// The process was killed after the grace period elapsed.
    Forced(ProcessExit),
}

/// A launched resource.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process ID, when there is one.
    fn pid(&self) -> Option<u32>;

    /// Waits for the process to exit.
    ///
    /// Must be cancel safe: the supervisor drops this future when a stop
    /// request arrives and calls it again later.
    ///
    /// # Errors
    ///
    /// Returns an error if the exit status cannot be collected.
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Asks the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    async fn terminate(&mut self) -> Result<()>;

    /// Forcefully ends the process and waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be killed.
    async fn kill(&mut self) -> Result<ProcessExit>;
}

/// Launch collaborator, invoked per resource during run and shutdown.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Starts a resource. Returning `Ok` is the launch acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns `Launch` if the resource cannot be started.
    async fn start(
        &self,
        resource: &Resource,
        context: &LaunchContext,
    ) -> Result<Box<dyn ProcessHandle>>;

    /// Stops a running resource, killing it if it outlives `grace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process can be neither terminated nor killed.
    async fn stop(&self, handle: &mut dyn ProcessHandle, grace: Duration) -> Result<StopOutcome> {
        handle.terminate().await?;
        if let Ok(exit) = tokio::time::timeout(grace, handle.wait()).await {
            return Ok(StopOutcome::Graceful(exit?));
        }
        tracing::warn!(pid = ?handle.pid(), ?grace, "grace period elapsed, killing process");
        Ok(StopOutcome::Forced(handle.kill().await?))
    }
}

/// Launches resources as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn start(
        &self,
        resource: &Resource,
        context: &LaunchContext,
    ) -> Result<Box<dyn ProcessHandle>> {
        let (command, dir) = command_for(resource, context);
        let program = resolve_program(&command.program, &dir).map_err(|e| AppHostError::Launch {
            resource: resource.name.clone(),
            message: format!("cannot find `{}`: {e}", command.program),
        })?;

        let mut cmd = tokio::process::Command::new(&program);
        let _ = cmd
            .args(&command.args)
            .current_dir(&dir)
            .envs(context.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            let _ = cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| AppHostError::Launch {
            resource: resource.name.clone(),
            message: format!("cannot spawn `{command}`: {e}"),
        })?;
        tracing::info!(
            resource = %resource.name,
            pid = ?child.id(),
            command = %command,
            dir = %dir.display(),
            "process spawned"
        );

        Ok(Box::new(ChildProcess {
            resource: resource.name.clone(),
            child,
        }))
    }
}

fn command_for(resource: &Resource, context: &LaunchContext) -> (CommandSpec, PathBuf) {
    match (&resource.kind, &context.artifact) {
        (ResourceKind::Project(_), Some(artifact)) => {
            (artifact.command.clone(), artifact.working_dir.clone())
        }
        (ResourceKind::Project(project), None) => (project.run.clone(), project.path.clone()),
        (ResourceKind::Process(process), _) => {
            (process.command.clone(), process.working_dir.clone())
        }
    }
}

/// Resolves an executable against `PATH`, or against `dir` for relative paths.
pub(crate) fn resolve_program(program: &str, dir: &Path) -> std::result::Result<PathBuf, which::Error> {
    which::which_in(program, std::env::var_os("PATH"), dir)
}

/// A running child process.
#[derive(Debug)]
pub struct ChildProcess {
    resource: String,
    child: tokio::process::Child,
}

impl ChildProcess {
    fn stop_error(&self, message: impl ToString) -> AppHostError {
        AppHostError::Stop {
            resource: self.resource.clone(),
            message: message.to_string(),
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::errno::Errno;
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| self.stop_error(e))?;
        match nix::sys::signal::killpg(Pid::from_raw(pid), signal) {
            Ok(()) | Err(Errno::ESRCH) => {
                tracing::debug!(resource = %self.resource, pid, %signal, "signalled process group");
                Ok(())
            }
            Err(e) => Err(self.stop_error(e)),
        }
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await.map_err(|e| self.stop_error(e))?;
        Ok(ProcessExit::from_status(status))
    }

    #[cfg(unix)]
    async fn terminate(&mut self) -> Result<()> {
        self.signal_group(nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) -> Result<()> {
        let _ = self.child.start_kill();
        Ok(())
    }

    async fn kill(&mut self) -> Result<ProcessExit> {
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL)?;
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
        self.wait().await
    }
}
