//! Accumulates resource declarations before they are frozen into a graph.

use std::path::PathBuf;

use apphost_common::error::{AppHostError, Result};

use crate::graph::CompositionGraph;
use crate::resource::{
    ProcessConfig, ProjectConfig, PublishStrategy, Resource, ResourceKind, ResourceLimits,
};

/// Opaque reference to a resource declared in a [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: usize,
    name: String,
}

impl ResourceHandle {
    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for a [`CompositionGraph`].
///
/// Names are checked for uniqueness as they are declared. Dependencies may
/// name resources declared later; they are checked by [`Registry::finalize`].
#[derive(Debug, Default)]
pub struct Registry {
    resources: Vec<Resource>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a resource.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if the name is taken, or `Config` if the name
    /// is empty or contains characters other than ASCII letters, digits,
    /// `-` and `_`.
    pub fn add_resource(
        &mut self,
        name: impl Into<String>,
        kind: ResourceKind,
    ) -> Result<ResourceHandle> {
        let name = name.into();
        validate_name(&name)?;
        if self.resources.iter().any(|r| r.name == name) {
            return Err(AppHostError::DuplicateName { name });
        }

        tracing::debug!(resource = %name, kind = kind.label(), "resource declared");
        let index = self.resources.len();
        self.resources.push(Resource::new(name.clone(), kind));
        Ok(ResourceHandle { index, name })
    }

    /// Declares a project resource that is built before it runs.
    ///
    /// # Errors
    ///
    /// See [`Registry::add_resource`].
    pub fn add_project(
        &mut self,
        name: impl Into<String>,
        project: ProjectConfig,
    ) -> Result<ResourceHandle> {
        self.add_resource(name, ResourceKind::Project(project))
    }

    /// Declares an externally launched process.
    ///
    /// # Errors
    ///
    /// See [`Registry::add_resource`].
    pub fn add_process(
        &mut self,
        name: impl Into<String>,
        process: ProcessConfig,
    ) -> Result<ResourceHandle> {
        self.add_resource(name, ResourceKind::Process(process))
    }

    /// Declares a process that runs `npm run <script>` in `dir`.
    ///
    /// # Errors
    ///
    /// See [`Registry::add_resource`].
    pub fn add_npm_app(
        &mut self,
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        script: impl Into<String>,
    ) -> Result<ResourceHandle> {
        self.add_process(name, ProcessConfig::npm_script(dir, script))
    }

    /// Records that `dependent` must start after `dependency`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the handle does not belong to this registry.
    pub fn depends_on(&mut self, dependent: &ResourceHandle, dependency: &str) -> Result<()> {
        let resource = self.resolve_mut(dependent)?;
        if !resource.depends_on.iter().any(|d| d == dependency) {
            resource.depends_on.push(dependency.to_string());
        }
        Ok(())
    }

    /// Sets an explicit environment variable, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the handle does not belong to this registry.
    pub fn with_env(
        &mut self,
        handle: &ResourceHandle,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let resource = self.resolve_mut(handle)?;
        let key = key.into();
        let value = value.into();
        match resource.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => resource.env.push((key, value)),
        }
        Ok(())
    }

    /// Sets the primary port the resource listens on.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the handle does not belong to this registry.
    pub fn with_port(&mut self, handle: &ResourceHandle, port: u16) -> Result<()> {
        self.resolve_mut(handle)?.port = Some(port);
        Ok(())
    }

    /// Sets compute limits carried into publish descriptors.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the handle does not belong to this registry.
    pub fn with_limits(&mut self, handle: &ResourceHandle, limits: ResourceLimits) -> Result<()> {
        self.resolve_mut(handle)?.limits = limits;
        Ok(())
    }

    /// Attaches a publish strategy to a resource by name.
    ///
    /// Only affects what `publish` produces; run behavior is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if no resource has this name.
    pub fn annotate_publish(&mut self, name: &str, strategy: PublishStrategy) -> Result<()> {
        let resource = self
            .resources
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| AppHostError::UnknownResource {
                name: name.to_string(),
            })?;
        resource.publish = Some(strategy);
        Ok(())
    }

    /// Returns a declared resource by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Returns the number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns whether nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Validates the declarations and freezes them into a graph.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` on a duplicate name, an undeclared dependency,
    /// or a dependency cycle.
    pub fn finalize(self) -> Result<CompositionGraph> {
        CompositionGraph::from_resources(self.resources)
    }

    fn resolve_mut(&mut self, handle: &ResourceHandle) -> Result<&mut Resource> {
        match self.resources.get_mut(handle.index) {
            Some(resource) if resource.name == handle.name => Ok(resource),
            _ => Err(AppHostError::UnknownResource {
                name: handle.name.clone(),
            }),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppHostError::Config {
            message: "resource name must not be empty".into(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppHostError::Config {
            message: format!(
                "resource name \"{name}\" may only contain ASCII letters, digits, '-' and '_'"
            ),
        });
    }
    Ok(())
}
