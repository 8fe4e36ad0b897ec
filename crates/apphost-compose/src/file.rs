//! Loading declarations from an `apphost.yaml` composition file.
//!
//! The file is a thin serialization of the [`Registry`] API: every entry is
//! declared through it, so duplicate names, unknown references and cycles
//! are rejected exactly as they would be in code.
//!
//! ```yaml
//! settings:
//!   repository: registry.example.io
//! resources:
//!   - name: api
//!     project:
//!       path: ../api
//!     port: 8080
//!   - name: frontend
//!     npm:
//!       dir: ../frontend
//!       script: start
//!     depends_on: [api]
//!     publish:
//!       container_image: {}
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use apphost_common::config::HostConfig;
use apphost_common::error::{AppHostError, Result};
use serde::Deserialize;

use crate::registry::Registry;
use crate::resource::{
    CommandSpec, ContainerImageOptions, ProcessConfig, ProjectConfig, PublishStrategy,
    ResourceKind, ResourceLimits,
};

/// Root of a parsed composition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositionFile {
    /// Host-wide settings.
    #[serde(default)]
    pub settings: HostConfig,
    /// Resource declarations, in declaration order.
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

/// A single resource entry.
///
/// Exactly one of `project`, `process` or `npm` must be present.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    /// Unique resource name.
    pub name: String,
    /// A project built from source.
    pub project: Option<ProjectDecl>,
    /// An arbitrary command.
    pub process: Option<ProcessDecl>,
    /// A package script run through `npm run`.
    pub npm: Option<NpmDecl>,
    /// Explicit environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Primary port.
    pub port: Option<u16>,
    /// Names of resources this one depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Publish annotation.
    pub publish: Option<PublishDecl>,
    /// Compute limits for publish.
    #[serde(default)]
    pub limits: ResourceLimits,
}

/// `project` section of a resource entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDecl {
    /// Project directory.
    pub path: PathBuf,
    /// Build command; defaults to `cargo build`.
    pub build: Option<Vec<String>>,
    /// Run command; defaults to `cargo run`.
    pub run: Option<Vec<String>>,
}

/// `process` section of a resource entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDecl {
    /// Executable.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; defaults to the composition file's directory.
    pub working_dir: Option<PathBuf>,
}

/// `npm` section of a resource entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NpmDecl {
    /// Package directory.
    pub dir: PathBuf,
    /// Script name.
    pub script: String,
}

/// `publish` section of a resource entry, keyed by strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishDecl {
    /// Publish as a container image.
    pub container_image: Option<ContainerImageOptions>,
}

impl CompositionFile {
    /// Parses a composition file from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `Yaml` if the text is not a valid composition file.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Reads and parses a composition file from disk.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, or `Yaml` if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading composition file");
        let content = std::fs::read_to_string(path).map_err(|e| AppHostError::io(path, e))?;
        Self::parse(&content)
    }

    /// Declares every entry into a fresh registry.
    ///
    /// Relative paths are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns the registry's declaration errors, or `Config` for an entry
    /// with no kind or several kinds, an empty build or run command, or a
    /// publish section without a strategy.
    pub fn into_registry(self, base_dir: &Path) -> Result<(HostConfig, Registry)> {
        let mut registry = Registry::new();
        let mut handles = Vec::with_capacity(self.resources.len());

        for decl in &self.resources {
            let kind = decl.to_kind(base_dir)?;
            let handle = registry.add_resource(decl.name.clone(), kind)?;
            for (key, value) in &decl.env {
                registry.with_env(&handle, key, value)?;
            }
            if let Some(port) = decl.port {
                registry.with_port(&handle, port)?;
            }
            if !decl.limits.is_empty() {
                registry.with_limits(&handle, decl.limits.clone())?;
            }
            handles.push(handle);
        }

        for (decl, handle) in self.resources.into_iter().zip(&handles) {
            for dependency in &decl.depends_on {
                registry.depends_on(handle, dependency)?;
            }
            if let Some(publish) = &decl.publish {
                registry.annotate_publish(handle.name(), publish.to_strategy(&decl.name)?)?;
            }
        }

        Ok((self.settings, registry))
    }
}

/// Loads a composition file and declares it relative to the file's directory.
///
/// # Errors
///
/// See [`CompositionFile::load`] and [`CompositionFile::into_registry`].
pub fn load_registry(path: &Path) -> Result<(HostConfig, Registry)> {
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    CompositionFile::load(path)?.into_registry(&base_dir)
}

impl ResourceDecl {
    fn to_kind(&self, base_dir: &Path) -> Result<ResourceKind> {
        let name = &self.name;
        match (&self.project, &self.process, &self.npm) {
            (Some(project), None, None) => {
                let mut config = ProjectConfig::new(base_dir.join(&project.path));
                if let Some(argv) = &project.build {
                    config = config.with_build(command(name, "build", argv)?);
                }
                if let Some(argv) = &project.run {
                    config = config.with_run(command(name, "run", argv)?);
                }
                Ok(ResourceKind::Project(config))
            }
            (None, Some(process), None) => {
                let dir = process
                    .working_dir
                    .as_ref()
                    .map_or_else(|| base_dir.to_path_buf(), |d| base_dir.join(d));
                Ok(ResourceKind::Process(
                    ProcessConfig::new(process.command.clone(), dir)
                        .args(process.args.iter().cloned()),
                ))
            }
            (None, None, Some(npm)) => Ok(ResourceKind::Process(ProcessConfig::npm_script(
                base_dir.join(&npm.dir),
                npm.script.clone(),
            ))),
            (None, None, None) => Err(AppHostError::Config {
                message: format!(
                    "resource \"{name}\" declares no kind; expected one of project, process or npm"
                ),
            }),
            _ => Err(AppHostError::Config {
                message: format!(
                    "resource \"{name}\" declares more than one of project, process or npm"
                ),
            }),
        }
    }
}

impl PublishDecl {
    fn to_strategy(&self, name: &str) -> Result<PublishStrategy> {
        self.container_image
            .clone()
            .map(PublishStrategy::ContainerImage)
            .ok_or_else(|| AppHostError::Config {
                message: format!("resource \"{name}\" has a publish section without a strategy"),
            })
    }
}

fn command(name: &str, field: &str, argv: &[String]) -> Result<CommandSpec> {
    CommandSpec::from_argv(argv).ok_or_else(|| AppHostError::Config {
        message: format!("resource \"{name}\" has an empty {field} command"),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use apphost_common::error::GraphViolation;

    use super::*;

    const PLAYGROUND: &str = r"
settings:
  repository: samplerepo.io
  image_tag: '1'
resources:
  - name: api
    project:
      path: ../api
    port: 8080
  - name: frontend
    npm:
      dir: ../frontend
      script: start
    env:
      BROWSER: none
    publish:
      container_image: {}
    limits:
      cpu: '0.5'
      memory: 1Gi
";

    #[test]
    fn can_parse_playground() {
        let file = CompositionFile::parse(PLAYGROUND).expect("parse");
        assert_eq!(file.settings.repository.as_deref(), Some("samplerepo.io"));
        assert_eq!(file.resources.len(), 2);
        assert!(file.resources[0].project.is_some());
        assert!(file.resources[1].npm.is_some());
        let publish = file.resources[1].publish.as_ref().expect("publish");
        assert!(publish.container_image.is_some());
    }

    #[test]
    fn declares_into_registry_relative_to_base() {
        let file = CompositionFile::parse(PLAYGROUND).expect("parse");
        let (settings, registry) = file
            .into_registry(Path::new("/work/host"))
            .expect("declare");
        assert_eq!(settings.image_tag, "1");

        let api = registry.get("api").expect("api");
        assert_eq!(api.kind.working_dir(), Path::new("/work/host/../api"));
        assert_eq!(api.port, Some(8080));
        assert!(api.publish.is_none());

        let frontend = registry.get("frontend").expect("frontend");
        assert!(matches!(
            frontend.publish,
            Some(PublishStrategy::ContainerImage(_))
        ));
        assert_eq!(frontend.limits.memory.as_deref(), Some("1Gi"));
        assert_eq!(frontend.env, vec![("BROWSER".into(), "none".into())]);
    }

    #[test]
    fn process_with_custom_command() {
        let file = CompositionFile::parse(
            r"
resources:
  - name: cache
    process:
      command: redis-server
      args: [--port, '6380']
",
        )
        .expect("parse");
        let (_, registry) = file.into_registry(Path::new(".")).expect("declare");
        let cache = registry.get("cache").expect("cache");
        match &cache.kind {
            ResourceKind::Process(p) => {
                assert_eq!(p.command.program, "redis-server");
                assert_eq!(p.command.args, vec!["--port", "6380"]);
            }
            ResourceKind::Project(_) => panic!("expected a process"),
        }
    }

    #[test]
    fn empty_run_command_is_rejected() {
        let file = CompositionFile::parse(
            r"
resources:
  - name: api
    project:
      path: api
      run: []
",
        )
        .expect("parse");
        let err = file.into_registry(Path::new(".")).expect_err("empty run");
        assert!(err.to_string().contains("empty run command"));
    }

    #[test]
    fn forward_dependency_resolves_and_cycle_fails() {
        let file = CompositionFile::parse(
            r"
resources:
  - name: a
    npm: {dir: a, script: start}
    depends_on: [b]
  - name: b
    npm: {dir: b, script: start}
    depends_on: [a]
",
        )
        .expect("parse");
        let (_, registry) = file.into_registry(Path::new(".")).expect("declare");
        let err = registry.finalize().expect_err("cycle");
        assert!(matches!(
            err,
            AppHostError::InvalidGraph {
                violation: GraphViolation::Cycle(_)
            }
        ));
    }

    #[test]
    fn duplicate_entry_is_rejected() {
        let file = CompositionFile::parse(
            r"
resources:
  - name: a
    npm: {dir: a, script: start}
  - name: a
    npm: {dir: b, script: start}
",
        )
        .expect("parse");
        let err = file.into_registry(Path::new(".")).expect_err("duplicate");
        assert!(matches!(err, AppHostError::DuplicateName { .. }));
    }

    #[test]
    fn unknown_settings_key_is_rejected() {
        assert!(CompositionFile::parse("bogus: 1\nresources: []\n").is_err());
    }

    #[test]
    fn misspelled_entry_key_is_rejected() {
        let err = CompositionFile::parse(
            r"
resources:
  - name: api
    npm: {dir: api, script: start}
    depend_on: [db]
",
        )
        .expect_err("unknown key");
        assert!(matches!(err, AppHostError::Yaml { .. }));
        assert!(err.to_string().contains("depend_on"), "got: {err}");
    }

    #[test]
    fn misspelled_kind_key_is_rejected() {
        let err = CompositionFile::parse(
            r"
resources:
  - name: api
    npm: {dir: api, scirpt: start}
",
        )
        .expect_err("unknown key");
        assert!(matches!(err, AppHostError::Yaml { .. }));
    }

    #[test]
    fn entry_needs_exactly_one_kind() {
        let none = CompositionFile::parse("resources:\n  - name: api\n    port: 80\n")
            .expect("parse")
            .into_registry(Path::new("."))
            .expect_err("no kind");
        assert!(none.to_string().contains("declares no kind"), "got: {none}");

        let both = CompositionFile::parse(
            r"
resources:
  - name: api
    npm: {dir: api, script: start}
    process: {command: server}
",
        )
        .expect("parse")
        .into_registry(Path::new("."))
        .expect_err("two kinds");
        assert!(both.to_string().contains("more than one"), "got: {both}");
    }

    #[test]
    fn publish_without_strategy_is_rejected() {
        let err = CompositionFile::parse(
            r"
resources:
  - name: web
    npm: {dir: web, script: start}
    publish: {}
",
        )
        .expect("parse")
        .into_registry(Path::new("."))
        .expect_err("no strategy");
        assert!(err.to_string().contains("without a strategy"), "got: {err}");
    }

    #[test]
    fn publish_options_are_carried() {
        let file = CompositionFile::parse(
            r"
resources:
  - name: web
    npm: {dir: web, script: start}
    publish:
      container_image:
        dockerfile: docker/web.Dockerfile
        image_name: storefront
",
        )
        .expect("parse");
        let (_, registry) = file.into_registry(Path::new(".")).expect("declare");
        let Some(PublishStrategy::ContainerImage(options)) =
            &registry.get("web").expect("web").publish
        else {
            panic!("expected a container image annotation");
        };
        assert_eq!(options.dockerfile, PathBuf::from("docker/web.Dockerfile"));
        assert_eq!(options.image_name.as_deref(), Some("storefront"));
    }

    #[test]
    fn load_registry_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("apphost.yaml");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(PLAYGROUND.as_bytes()).expect("write");

        let (_, registry) = load_registry(&path).expect("load");
        let api = registry.get("api").expect("api");
        assert_eq!(api.kind.working_dir(), dir.path().join("../api"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = CompositionFile::load(Path::new("/nonexistent/apphost.yaml")).expect_err("io");
        assert!(matches!(err, AppHostError::Io { .. }));
    }
}
