#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Frank is a reconciliation engine for Kubernetes resources derived from a templated,
//! hierarchical configuration tree. It walks a `config/` directory, resolves each stack's
//! effective configuration by merging `config.yaml` ancestors, renders the stack's manifest
//! template, and reconciles the result against a live cluster.

/// Prelude is the common set of imports shared by the engine modules.
pub(crate) mod prelude {
    pub use std::collections::BTreeMap;

    pub use tracing::{debug, error, info, instrument, trace, warn};

    pub use crate::{Error, Result};
}

pub mod confirm;
pub mod config;
pub mod delete;
pub mod engine;
pub mod kube_gateway;
pub mod normalize;
pub mod plan;
pub mod prepare;
pub mod readiness;
pub mod reconcile;
pub mod result;
pub mod settings;
pub mod stack;
pub mod template;

/// Error is the unified error type for the engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// ConfigNotFound indicates the requested config file does not exist.
    #[error("config not found: {0}")]
    ConfigNotFound(String),
    /// ConfigParseError indicates a config.yaml or stack file failed to parse as YAML.
    #[error("failed to parse config {path}: {source}")]
    ConfigParseError {
        /// Path is the file that failed to parse.
        path: String,
        /// Source is the underlying YAML error.
        source: serde_yaml::Error,
    },
    /// ConfigMissingRequired indicates a required field was absent from the effective config.
    #[error("config missing required field `{0}`")]
    ConfigMissingRequired(&'static str),
    /// TemplateParseError indicates a template failed to parse.
    #[error("failed to parse template {path}: {message}")]
    TemplateParseError {
        /// Path is the template file.
        path: String,
        /// Message describes the parse failure.
        message: String,
    },
    /// TemplateExecError indicates a template failed to render.
    #[error("failed to render template {path}: {message}")]
    TemplateExecError {
        /// Path is the template file.
        path: String,
        /// Message describes the render failure.
        message: String,
    },
    /// ManifestDecodeError indicates a rendered manifest document failed to decode.
    #[error("failed to decode rendered manifest document {index}: {source}")]
    ManifestDecodeError {
        /// Index is the zero-based document index within the manifest.
        index: usize,
        /// Source is the underlying YAML error.
        source: serde_yaml::Error,
    },
    /// NamespaceConflict indicates the config-declared namespace and the manifest's
    /// metadata.namespace disagree.
    #[error("namespace conflict for {object}: config says `{config}`, manifest says `{manifest}`")]
    NamespaceConflict {
        /// Object identifies the conflicting object (kind/name).
        object: String,
        /// Config is the namespace declared by the effective config.
        config: String,
        /// Manifest is the namespace declared in the rendered manifest.
        manifest: String,
    },
    /// KubeconfigError indicates the kubeconfig could not be loaded.
    #[error("kubeconfig error: {0}")]
    KubeconfigError(String),
    /// ContextNotFound indicates the requested kube context does not exist.
    #[error("kube context not found: {0}")]
    ContextNotFound(String),
    /// KindUnknown indicates a kind could not be resolved to a GroupVersionResource.
    #[error("unknown kind: {0}")]
    KindUnknown(String),
    /// ApiserverError wraps a generic apiserver error.
    #[error("apiserver error: {0}")]
    ApiserverError(#[from] kube::Error),
    /// ConflictRetried indicates an update conflict persisted after a retry.
    #[error("conflict persisted after retry for {0}")]
    ConflictRetried(String),
    /// ImmutableFieldError indicates the apiserver rejected a change to an immutable field.
    #[error("immutable field error for {0}: {1}")]
    ImmutableFieldError(String, String),
    /// ReadinessFailed indicates an object never converged to ready.
    #[error("{0} failed to become ready: {1}")]
    ReadinessFailed(String, String),
    /// TimeoutExceeded indicates a stack's per-stack deadline elapsed.
    #[error("timeout exceeded for stack {0}")]
    TimeoutExceeded(String),
    /// Cancelled indicates the operation was cancelled (e.g. by SIGINT).
    #[error("cancelled")]
    Cancelled,
    /// PermissionDenied indicates the cluster credentials lack permission for an operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Io wraps a generic filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Other is a catch-all for setup-time failures that do not merit their own variant.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result is the typedef used throughout the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// ANNOTATION_STACK_NAME is the ownership annotation key placed on every managed object.
pub const ANNOTATION_STACK_NAME: &str = "frankthetank.cloud/stack-name";

/// LABEL_MANAGED_BY is the recommended (non-authoritative) "managed-by" label value.
pub const LABEL_MANAGED_BY: &str = "frank";

/// DEFAULT_TIMEOUT is the per-stack reconciliation deadline used when a stack's effective
/// config does not set `timeout`.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// DEFAULT_NAMESPACE is substituted for namespaced resources that do not specify one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// CRATE_NAME is the human-readable name the CLI uses for itself.
pub const CRATE_NAME: &str = "frank";

/// Manifests_dir returns the `manifests/` directory for a given `config/` root: always its
/// sibling (§6 filesystem contract).
pub fn manifests_dir(config_root: &std::path::Path) -> std::path::PathBuf {
    config_root
        .parent()
        .map(|p| p.join("manifests"))
        .unwrap_or_else(|| std::path::PathBuf::from("manifests"))
}

/// SUPPORTED_KINDS lists the kinds the owner-annotation sweep (used by `delete`) inspects.
pub const SUPPORTED_KINDS: &[&str] = &[
    "Deployment",
    "StatefulSet",
    "DaemonSet",
    "Service",
    "ConfigMap",
    "Secret",
    "Pod",
    "Job",
    "CronJob",
    "Ingress",
];
