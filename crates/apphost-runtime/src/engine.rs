//! The application: orchestrates a composition graph as one unit.
//!
//! ```text
//! Idle ──run──▶ Running ──signal / all exited──▶ ShuttingDown ──▶ Terminated
//! ```
//!
//! Resources start level by level; members of a level launch concurrently
//! and a level begins only once the previous one has been acknowledged.
//! A resource whose dependency is not running is never launched. Shutdown
//! walks the achieved start order backwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use apphost_common::config::HostConfig;
use apphost_common::constants;
use apphost_common::error::{AppHostError, PublishFailure, Result};
use apphost_common::types::{FailureReason, ResourceStatus, RunId, RunState};
use apphost_compose::graph::CompositionGraph;
use apphost_compose::resolver;
use apphost_compose::resource::Resource;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::build::{Artifact, CommandBuilder, ProjectBuilder};
use crate::launch::{LaunchContext, Launcher, ProcessHandle, ProcessLauncher, StopOutcome};
use crate::publish::{
    ManifestPublisher, PublishContext, PublishManifest, Publisher, prepare_output_dir, remove_stale,
    write_json,
};
use crate::state::{RunSnapshot, StatusTable};
use crate::supervisor::{self, SupervisorEvent};

/// The external collaborators an application delegates to.
#[derive(Clone)]
pub struct Collaborators {
    /// Builds project resources.
    pub builder: Arc<dyn ProjectBuilder>,
    /// Starts and stops resources.
    pub launcher: Arc<dyn Launcher>,
    /// Produces publish artifacts.
    pub publisher: Arc<dyn Publisher>,
}

impl Collaborators {
    /// Collaborators that build, run, and publish on the local machine.
    #[must_use]
    pub fn local(config: &HostConfig) -> Self {
        Self {
            builder: Arc::new(CommandBuilder),
            launcher: Arc::new(ProcessLauncher),
            publisher: Arc::new(ManifestPublisher::new(config.clone())),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Outcome of [`Application::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Resources in the order their launch was acknowledged.
    pub start_order: Vec<String>,
    /// Resources in the order shutdown visited them.
    pub stop_order: Vec<String>,
    /// Final state of every resource.
    pub snapshot: RunSnapshot,
}

impl RunReport {
    /// Returns whether every resource ended without failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.snapshot.is_success()
    }
}

/// Outcome of a fully successful [`Application::publish`].
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Directory everything was written under.
    pub target_dir: PathBuf,
    /// Resources that were published, in declaration order.
    pub published: Vec<String>,
    /// Resources without a publish strategy.
    pub skipped: Vec<String>,
    /// Path of the aggregate manifest.
    pub manifest: PathBuf,
}

/// A composition graph bound to its collaborators, ready to run or publish.
#[derive(Debug)]
pub struct Application {
    graph: CompositionGraph,
    config: HostConfig,
    collaborators: Collaborators,
    run_id: RunId,
    status: StatusTable,
    artifacts: HashMap<String, Artifact>,
}

impl Application {
    /// Creates an application in the `Idle` state.
    #[must_use]
    pub fn new(graph: CompositionGraph, config: HostConfig, collaborators: Collaborators) -> Self {
        let run_id = RunId::generate();
        let status = StatusTable::new(run_id.clone(), &graph);
        Self {
            graph,
            config,
            collaborators,
            run_id,
            status,
            artifacts: HashMap::new(),
        }
    }

    /// Returns the composition graph.
    #[must_use]
    pub const fn graph(&self) -> &CompositionGraph {
        &self.graph
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns a receiver that observes every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.status.subscribe()
    }

    /// Returns a consistent snapshot of the current run state.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        self.status.snapshot()
    }

    /// Builds every project resource, in start order.
    ///
    /// Already-built resources are skipped, so `run` after `build` does not
    /// rebuild.
    ///
    /// # Errors
    ///
    /// Returns `BuildFailed` for the first resource that fails; the failing
    /// resource is marked failed and nothing is started.
    pub async fn build(&mut self) -> Result<()> {
        let buildable: Vec<Resource> = self
            .graph
            .topological_start_order()
            .into_iter()
            .filter(|r| r.kind.has_build_step() && !self.artifacts.contains_key(&r.name))
            .cloned()
            .collect();

        for resource in buildable {
            match self.collaborators.builder.build(&resource).await {
                Ok(artifact) => {
                    let _ = self.artifacts.insert(resource.name.clone(), artifact);
                }
                Err(err) => {
                    let cause = match err {
                        AppHostError::BuildFailed { cause, .. } => cause,
                        other => other.to_string(),
                    };
                    self.status.set_status(
                        &resource.name,
                        ResourceStatus::Failed(FailureReason::BuildFailed(cause.clone())),
                    );
                    return Err(AppHostError::BuildFailed {
                        resource: resource.name,
                        cause,
                    });
                }
            }
        }
        Ok(())
    }

    /// Builds, starts, supervises, and finally stops every resource.
    ///
    /// Cancelling `shutdown` ends supervision and begins shutdown. Starts
    /// already in flight are allowed to finish first.
    ///
    /// # Errors
    ///
    /// Returns `BuildFailed` if a build step fails; nothing is started in
    /// that case. Per-resource launch and exit failures are not errors here;
    /// they are reported in the returned [`RunReport`].
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<RunReport> {
        tracing::info!(run_id = %self.run_id, resources = self.graph.len(), "starting application");

        if let Err(err) = self.build().await {
            self.mark_unlaunched_stopped();
            self.status.set_state(RunState::Terminated);
            return Err(err);
        }

        self.status.set_state(RunState::Running);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut supervisors = HashMap::new();
        let mut start_order = Vec::new();

        let interrupted = self
            .start_all(
                &shutdown,
                &events_tx,
                &mut events_rx,
                &mut supervisors,
                &mut start_order,
            )
            .await;
        if !interrupted {
            self.supervise(&shutdown, &mut events_rx).await;
        }

        self.status.set_state(RunState::ShuttingDown);
        let stop_order = CompositionGraph::stop_order(&start_order);
        for name in &stop_order {
            self.stop_resource(name, &mut supervisors, &mut events_rx).await;
        }
        self.mark_unlaunched_stopped();
        self.status.set_state(RunState::Terminated);

        let snapshot = self.status.snapshot();
        tracing::info!(
            run_id = %self.run_id,
            failed = snapshot.failed().count(),
            "application terminated"
        );
        Ok(RunReport {
            start_order,
            stop_order,
            snapshot,
        })
    }

    /// Writes publish artifacts for every annotated resource.
    ///
    /// Each annotated resource's directory under `target_dir` is cleared and
    /// rewritten, so publishing twice yields identical output. Resources
    /// without a publish strategy are skipped and their directories are not
    /// touched. A failure does not stop the remaining resources.
    ///
    /// # Errors
    ///
    /// Returns `Publish` listing every resource that failed; the aggregate
    /// manifest is not written in that case and one left by an earlier
    /// publish is removed. Returns `Io` if the target
    /// directory or manifest cannot be written.
    pub fn publish(self, target_dir: &Path) -> Result<PublishReport> {
        tracing::info!(run_id = %self.run_id, dir = %target_dir.display(), "publishing application");
        std::fs::create_dir_all(target_dir).map_err(|e| AppHostError::io(target_dir, e))?;

        let mut manifest = PublishManifest::default();
        let mut failures = Vec::new();
        let mut published = Vec::new();
        let mut skipped = Vec::new();

        for resource in self.graph.resources() {
            let Some(strategy) = &resource.publish else {
                tracing::debug!(resource = %resource.name, "no publish strategy, skipping");
                skipped.push(resource.name.clone());
                continue;
            };

            let env = resolver::resolve_environment(&self.graph, resource);
            let result = prepare_output_dir(target_dir, &resource.name).and_then(|output_dir| {
                self.collaborators.publisher.publish(
                    resource,
                    strategy,
                    PublishContext {
                        output_dir: &output_dir,
                        env: &env,
                    },
                )
            });

            match result {
                Ok(descriptor) => {
                    let _ = manifest.resources.insert(resource.name.clone(), descriptor);
                    published.push(resource.name.clone());
                }
                Err(err) => {
                    tracing::warn!(resource = %resource.name, error = %err, "publish failed");
                    failures.push(PublishFailure {
                        resource: resource.name.clone(),
                        cause: err.to_string(),
                    });
                }
            }
        }

        let manifest_path = target_dir.join(constants::MANIFEST_FILE);
        if !failures.is_empty() {
            if let Err(err) = remove_stale(&manifest_path) {
                tracing::warn!(error = %err, "could not remove the previous manifest");
            }
            return Err(AppHostError::Publish { failures });
        }
        write_json(&manifest_path, &manifest)?;
        Ok(PublishReport {
            target_dir: target_dir.to_path_buf(),
            published,
            skipped,
            manifest: manifest_path,
        })
    }

    /// Starts every level in turn. Returns whether shutdown was signalled.
    async fn start_all(
        &self,
        shutdown: &CancellationToken,
        events_tx: &mpsc::UnboundedSender<SupervisorEvent>,
        events_rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>,
        supervisors: &mut HashMap<String, oneshot::Sender<()>>,
        start_order: &mut Vec<String>,
    ) -> bool {
        let levels: Vec<Vec<Resource>> = self
            .graph
            .start_levels()
            .into_iter()
            .map(|level| level.into_iter().cloned().collect())
            .collect();

        for level in levels {
            while let Ok(event) = events_rx.try_recv() {
                self.apply_event(event);
            }
            if shutdown.is_cancelled() {
                tracing::info!("termination signal received during start");
                return true;
            }

            let mut launches = JoinSet::new();
            for resource in level {
                if let Some(dependency) = self.blocked_by(&resource) {
                    self.status.set_status(
                        &resource.name,
                        ResourceStatus::Failed(FailureReason::DependencyFailed { dependency }),
                    );
                    continue;
                }

                self.status.set_status(&resource.name, ResourceStatus::Starting);
                let context = LaunchContext {
                    env: resolver::resolve_environment(&self.graph, &resource),
                    artifact: self.artifacts.get(&resource.name).cloned(),
                };
                let launcher = Arc::clone(&self.collaborators.launcher);
                let _ = launches.spawn(async move {
                    let result = launcher.start(&resource, &context).await;
                    (resource.name, result)
                });
            }

            let mut interrupted = false;
            loop {
                tokio::select! {
                    joined = launches.join_next() => match joined {
                        Some(Ok((name, result))) => {
                            self.acknowledge(name, result, events_tx, supervisors, start_order);
                        }
                        Some(Err(err)) => tracing::error!(error = %err, "launch task panicked"),
                        None => break,
                    },
                    () = shutdown.cancelled(), if !interrupted => {
                        tracing::info!("termination signal received, finishing in-flight starts");
                        interrupted = true;
                    }
                }
            }

            for name in self.status.names_with(&ResourceStatus::Starting) {
                self.status.set_status(
                    &name,
                    ResourceStatus::Failed(FailureReason::LaunchFailed(
                        "launch task did not complete".into(),
                    )),
                );
            }
            if interrupted {
                return true;
            }
        }
        false
    }

    /// Returns the first dependency that is not running.
    fn blocked_by(&self, resource: &Resource) -> Option<String> {
        resource
            .depends_on
            .iter()
            .find(|dep| self.status.status(dep) != Some(ResourceStatus::Running))
            .cloned()
    }

    fn acknowledge(
        &self,
        name: String,
        result: Result<Box<dyn ProcessHandle>>,
        events_tx: &mpsc::UnboundedSender<SupervisorEvent>,
        supervisors: &mut HashMap<String, oneshot::Sender<()>>,
        start_order: &mut Vec<String>,
    ) {
        match result {
            Ok(handle) => {
                self.status.set_pid(&name, handle.pid());
                self.status.set_status(&name, ResourceStatus::Running);
                let stop = supervisor::spawn(
                    name.clone(),
                    handle,
                    Arc::clone(&self.collaborators.launcher),
                    self.config.grace_period(),
                    events_tx.clone(),
                );
                let _ = supervisors.insert(name.clone(), stop);
                start_order.push(name);
            }
            Err(err) => {
                let message = match err {
                    AppHostError::Launch { message, .. } => message,
                    other => other.to_string(),
                };
                self.status.set_status(
                    &name,
                    ResourceStatus::Failed(FailureReason::LaunchFailed(message)),
                );
            }
        }
    }

    /// Waits until shutdown is signalled or no resource is running.
    async fn supervise(
        &self,
        shutdown: &CancellationToken,
        events_rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>,
    ) {
        loop {
            if self.status.names_with(&ResourceStatus::Running).is_empty() {
                tracing::info!("no resources running");
                return;
            }
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("termination signal received");
                    return;
                }
                event = events_rx.recv() => match event {
                    Some(event) => self.apply_event(event),
                    None => return,
                },
            }
        }
    }

    async fn stop_resource(
        &self,
        name: &str,
        supervisors: &mut HashMap<String, oneshot::Sender<()>>,
        events_rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>,
    ) {
        let Some(stop) = supervisors.remove(name) else {
            return;
        };
        if self.status.status(name) != Some(ResourceStatus::Running) {
            return;
        }

        self.status.set_status(name, ResourceStatus::Stopping);
        let _ = stop.send(());
        while let Some(event) = events_rx.recv().await {
            let done = event.resource() == name;
            self.apply_event(event);
            if done {
                return;
            }
        }
    }

    fn apply_event(&self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Exited { resource, exit } => {
                let status = match exit {
                    Ok(exit) if exit.success => ResourceStatus::Stopped,
                    Ok(exit) => {
                        ResourceStatus::Failed(FailureReason::ExitedAbnormally { code: exit.code })
                    }
                    Err(err) => {
                        tracing::warn!(resource = %resource, error = %err, "lost track of process");
                        ResourceStatus::Failed(FailureReason::ExitedAbnormally { code: None })
                    }
                };
                self.status.set_status(&resource, status);
            }
            SupervisorEvent::Stopped { resource, outcome } => {
                let status = match outcome {
                    Ok(StopOutcome::Graceful(_)) => ResourceStatus::Stopped,
                    Ok(StopOutcome::Forced(_)) => {
                        ResourceStatus::Failed(FailureReason::ShutdownTimeout)
                    }
                    Err(err) => ResourceStatus::Failed(FailureReason::StopFailed(err.to_string())),
                };
                self.status.set_status(&resource, status);
            }
        }
    }

    /// Resources that were never launched end as stopped.
    fn mark_unlaunched_stopped(&self) {
        for name in self.status.names_with(&ResourceStatus::Pending) {
            self.status.set_status(&name, ResourceStatus::Stopped);
        }
    }
}
