//! Host-wide settings shared by run and publish.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Settings for one host invocation.
///
/// Loaded from the `settings` section of a composition file; every field
/// has a default so the section may be omitted entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Milliseconds a resource may take to exit after a stop request.
    pub grace_period_ms: u64,
    /// Container registry prefix for published image names.
    pub repository: Option<String>,
    /// Tag applied to published image names.
    pub image_tag: String,
    /// Directory publish writes into.
    pub output_dir: PathBuf,
}

impl HostConfig {
    /// Returns the stop grace period.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Returns the full image reference for a resource.
    ///
    /// `repository/name:tag` when a repository is configured, otherwise
    /// `name:tag`.
    #[must_use]
    pub fn image_reference(&self, resource: &str) -> String {
        match self.repository.as_deref() {
            Some(repo) if !repo.is_empty() => {
                format!("{}/{resource}:{}", repo.trim_end_matches('/'), self.image_tag)
            }
            _ => format!("{resource}:{}", self.image_tag),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: constants::DEFAULT_GRACE_PERIOD_MS,
            repository: None,
            image_tag: constants::DEFAULT_IMAGE_TAG.to_string(),
            output_dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
        }
    }
}
