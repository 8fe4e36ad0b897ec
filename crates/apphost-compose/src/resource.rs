//! Resource definitions and their kind-specific configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use apphost_common::constants;
use serde::{Deserialize, Serialize};

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command with the given arguments.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits an argv-style list into program and arguments.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(
            program.as_ref(),
            args.iter().map(|a| a.as_ref().to_string()),
        ))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A service built from source before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project directory; build and run commands execute here.
    pub path: PathBuf,
    /// Command that compiles the project.
    pub build: CommandSpec,
    /// Command that runs the built project.
    pub run: CommandSpec,
}

impl ProjectConfig {
    /// Creates a project using the default cargo build and run commands.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            build: CommandSpec::new(
                constants::DEFAULT_PROJECT_BUILD[0],
                constants::DEFAULT_PROJECT_BUILD[1..].iter().copied(),
            ),
            run: CommandSpec::new(
                constants::DEFAULT_PROJECT_RUN[0],
                constants::DEFAULT_PROJECT_RUN[1..].iter().copied(),
            ),
        }
    }

    /// Replaces the build command.
    #[must_use]
    pub fn with_build(mut self, build: CommandSpec) -> Self {
        self.build = build;
        self
    }

    /// Replaces the run command.
    #[must_use]
    pub fn with_run(mut self, run: CommandSpec) -> Self {
        self.run = run;
        self
    }
}

/// An externally launched process with no build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Command to execute.
    pub command: CommandSpec,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
}

impl ProcessConfig {
    /// Creates a process that runs `program` in `working_dir`.
    #[must_use]
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: CommandSpec::new(program, Vec::<String>::new()),
            working_dir: working_dir.into(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Creates a process that runs `npm run <script>` in `dir`.
    #[must_use]
    pub fn npm_script(dir: impl Into<PathBuf>, script: impl Into<String>) -> Self {
        Self::new(constants::NPM_COMMAND, dir).arg("run").arg(script)
    }
}

/// The closed set of resource kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A service compiled from a project directory.
    Project(ProjectConfig),
    /// A command launched as-is.
    Process(ProcessConfig),
}

impl ResourceKind {
    /// Returns whether this kind has a build step.
    #[must_use]
    pub const fn has_build_step(&self) -> bool {
        matches!(self, Self::Project(_))
    }

    /// Returns the directory the resource runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        match self {
            Self::Project(project) => &project.path,
            Self::Process(process) => &process.working_dir,
        }
    }

    /// Short label for status output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Process(_) => "process",
        }
    }
}

/// Options for publishing a resource as a container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerImageOptions {
    /// Dockerfile path, relative to the build context.
    pub dockerfile: PathBuf,
    /// Build context; defaults to the resource's working directory.
    pub context: Option<PathBuf>,
    /// Image name; defaults to the resource name.
    pub image_name: Option<String>,
}

impl Default for ContainerImageOptions {
    fn default() -> Self {
        Self {
            dockerfile: PathBuf::from(constants::DEFAULT_DOCKERFILE),
            context: None,
            image_name: None,
        }
    }
}

/// How a resource is turned into a deployable artifact on publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// Emit a Dockerfile-based container image descriptor.
    ContainerImage(ContainerImageOptions),
}

/// Compute limits carried into publish descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceLimits {
    /// CPU allocation, e.g. `"0.5"`.
    pub cpu: Option<String>,
    /// Memory allocation, e.g. `"1Gi"`.
    pub memory: Option<String>,
}

impl ResourceLimits {
    /// Returns whether no limit is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// A named unit of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Unique name within a registry.
    pub name: String,
    /// What the resource is and how it runs.
    pub kind: ResourceKind,
    /// Publish annotation; has no effect on run.
    pub publish: Option<PublishStrategy>,
    /// Names of resources that must be running before this one starts.
    pub depends_on: Vec<String>,
    /// Explicit environment variables, in declaration order.
    pub env: Vec<(String, String)>,
    /// Primary port the resource listens on.
    pub port: Option<u16>,
    /// Compute limits for publish.
    pub limits: ResourceLimits,
}

impl Resource {
    /// Declares a resource with no annotations.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            publish: None,
            depends_on: Vec::new(),
            env: Vec::new(),
            port: None,
            limits: ResourceLimits::default(),
        }
    }
}
