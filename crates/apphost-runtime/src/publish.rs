//! Publish collaborator and the descriptors it writes.
//!
//! Descriptors follow the `dockerfile.v0` manifest shape: build inputs
//! (`path`, `context`), the target image, environment, and service
//! bindings. Every map is a `BTreeMap` so output is byte-stable across runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use apphost_common::config::HostConfig;
use apphost_common::constants;
use apphost_common::error::{AppHostError, Result};
use apphost_compose::resource::{ContainerImageOptions, PublishStrategy, Resource};
use serde::{Deserialize, Serialize};

/// Inputs handed to a publisher for one resource.
#[derive(Debug, Clone, Copy)]
pub struct PublishContext<'a> {
    /// Directory reserved for this resource; empty when the publisher runs.
    pub output_dir: &'a Path,
    /// Fully resolved environment of the resource.
    pub env: &'a [(String, String)],
}

/// Publish collaborator, invoked per annotated resource.
pub trait Publisher: Send + Sync {
    /// Writes the artifacts for one resource into `context.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an artifact cannot be produced or written.
    fn publish(
        &self,
        resource: &Resource,
        strategy: &PublishStrategy,
        context: PublishContext<'_>,
    ) -> Result<Descriptor>;
}

/// A service binding in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// URI scheme (`http`, `https`, `tcp`).
    pub scheme: String,
    /// Network protocol (`tcp`, `udp`).
    pub protocol: String,
    /// Transport (`http`, `http2`).
    pub transport: String,
    /// Port the container listens on.
    pub target_port: Option<u16>,
}

/// Compute limits in a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// CPU allocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory allocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Descriptor for a resource published as a container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImageDescriptor {
    /// Always `dockerfile.v0`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dockerfile path relative to the context.
    pub path: String,
    /// Build context directory.
    pub context: String,
    /// Image reference the build should produce.
    pub image: String,
    /// Environment the container is started with.
    pub env: BTreeMap<String, String>,
    /// Service bindings, keyed by scheme.
    pub bindings: BTreeMap<String, Binding>,
    /// Compute limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
}

/// What a publisher produced for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptor {
    /// A container image descriptor.
    ContainerImage(ContainerImageDescriptor),
}

/// Aggregate manifest written at the publish root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishManifest {
    /// Descriptors of every published resource.
    pub resources: BTreeMap<String, Descriptor>,
}

/// Writes descriptors as JSON files.
#[derive(Debug, Clone, Default)]
pub struct ManifestPublisher {
    config: HostConfig,
}

impl ManifestPublisher {
    /// Creates a publisher that names images using `config`.
    #[must_use]
    pub const fn new(config: HostConfig) -> Self {
        Self { config }
    }

    fn container_image(
        &self,
        resource: &Resource,
        options: &ContainerImageOptions,
        env: &[(String, String)],
    ) -> ContainerImageDescriptor {
        let context = options
            .context
            .clone()
            .unwrap_or_else(|| resource.kind.working_dir().to_path_buf());
        let image_name = options.image_name.as_deref().unwrap_or(&resource.name);

        let mut bindings = BTreeMap::new();
        if let Some(port) = resource.port {
            let _ = bindings.insert(
                "http".to_string(),
                Binding {
                    scheme: "http".into(),
                    protocol: "tcp".into(),
                    transport: "http".into(),
                    target_port: Some(port),
                },
            );
        }

        let limits = (!resource.limits.is_empty()).then(|| Limits {
            cpu: resource.limits.cpu.clone(),
            memory: resource.limits.memory.clone(),
        });

        ContainerImageDescriptor {
            kind: constants::DOCKERFILE_DESCRIPTOR_TYPE.to_string(),
            path: path_string(&options.dockerfile),
            context: path_string(&context),
            image: self.config.image_reference(image_name),
            env: env.iter().cloned().collect(),
            bindings,
            limits,
        }
    }
}

impl Publisher for ManifestPublisher {
    fn publish(
        &self,
        resource: &Resource,
        strategy: &PublishStrategy,
        context: PublishContext<'_>,
    ) -> Result<Descriptor> {
        let descriptor = match strategy {
            PublishStrategy::ContainerImage(options) => {
                Descriptor::ContainerImage(self.container_image(resource, options, context.env))
            }
        };
        let path = context.output_dir.join(constants::DESCRIPTOR_FILE);
        write_json(&path, &descriptor)?;
        tracing::info!(resource = %resource.name, path = %path.display(), "descriptor written");
        Ok(descriptor)
    }
}

/// Removes any previous output for a resource and recreates its directory.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be removed or created.
pub fn prepare_output_dir(target_dir: &Path, resource: &str) -> Result<PathBuf> {
    let dir = target_dir.join(resource);
    if dir.exists() {
        std::fs::remove_dir_all(&dir).map_err(|e| AppHostError::io(&dir, e))?;
    }
    std::fs::create_dir_all(&dir).map_err(|e| AppHostError::io(&dir, e))?;
    Ok(dir)
}

/// Removes a file left by an earlier publish, if there is one.
///
/// # Errors
///
/// Returns `Io` if the file exists but cannot be removed.
pub fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale publish output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppHostError::io(path, e)),
    }
}

/// Serializes a value as pretty JSON with a trailing newline.
///
/// # Errors
///
/// Returns `Serialization` or `Io` on failure.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| AppHostError::io(path, e))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
