//! System-wide constants and default values.

/// Application name used in CLI output.
pub const APP_NAME: &str = "apphost";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "apphost";

/// Composition file looked up when none is given.
pub const DEFAULT_COMPOSITION_FILE: &str = "apphost.yaml";

/// Directory publish writes into when none is given.
pub const DEFAULT_OUTPUT_DIR: &str = "out";

/// Time a resource gets to exit after a stop request before it is killed.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

/// Tag applied to published container images when none is configured.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Dockerfile name assumed when a container-image strategy names none.
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Per-resource descriptor written by publish.
pub const DESCRIPTOR_FILE: &str = "resource.json";

/// Aggregate manifest written at the root of the publish directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Descriptor type for resources published as a Dockerfile build.
pub const DOCKERFILE_DESCRIPTOR_TYPE: &str = "dockerfile.v0";

/// Host injected into dependents for local resources.
pub const LOCAL_HOST: &str = "localhost";

/// Default build command for project resources.
pub const DEFAULT_PROJECT_BUILD: &[&str] = &["cargo", "build"];

/// Default run command for project resources.
pub const DEFAULT_PROJECT_RUN: &[&str] = &["cargo", "run"];

/// Package-script runner used by `npm` resources.
pub const NPM_COMMAND: &str = "npm";
