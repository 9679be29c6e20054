//! Error handling for [`kube_watch_client`][crate]
use std::path::PathBuf;
use thiserror::Error;

/// Possible errors when working with [`kube_watch_client`][crate]
#[derive(Error, Debug)]
pub enum Error {
    /// Config loading/parsing errors.
    #[error("error loading kubeconfig: {0}")]
    Config(#[from] ConfigError),

    /// Auth-provider or exec-provider credential refresh failed.
    #[error("failed to refresh credentials: {0}")]
    AuthRefreshFailed(String),

    /// The stream could not be opened (DNS, TLS handshake, connection refused, ...).
    #[error("failed to open stream: {0}")]
    TransportOpen(#[source] reqwest::Error),

    /// A read failed unrecoverably (distinct from a read that merely timed out).
    #[error("failed to read from stream: {0}")]
    TransportRead(#[source] std::io::Error),

    /// A one-shot request failed to send or receive a response.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Failed to (de)serialize a request/response body.
    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Structured-path accessor errors, see [`crate::path`].
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Result alias using [`enum@Error`] as the error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors from loading a [`crate::config::Kubeconfig`] or in-cluster configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither `--kubeconfig`, `$KUBECONFIG`, nor `$HOME/.kube/config` resolved to a file.
    #[error("unable to find a kubeconfig path")]
    NoKubeconfigPath,

    /// Failed to read a file referenced by the kubeconfig or in-cluster paths.
    #[error("failed to read '{path}': {source}")]
    ReadFile {
        /// path that failed to be read
        path: PathBuf,
        /// underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The kubeconfig YAML failed to parse.
    #[error("failed to parse kubeconfig YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    /// `current-context` (or the requested context) is not defined.
    #[error("unable to determine current context")]
    CurrentContextNotSet,

    /// The context names a cluster that isn't defined.
    #[error("unable to load cluster '{cluster_name}' of context")]
    LoadClusterOfContext {
        /// name of the missing cluster
        cluster_name: String,
    },

    /// The context names a user that isn't defined.
    #[error("unable to find named user '{user_name}'")]
    FindUser {
        /// name of the missing user
        user_name: String,
    },

    /// Required in-cluster environment variables are absent.
    #[error("unable to load in-cluster config: {hostenv} and {portenv} must be defined")]
    MissingInClusterVariables {
        /// name of the missing host env var
        hostenv: &'static str,
        /// name of the missing port env var
        portenv: &'static str,
    },

    /// Failed to decode a base64-inlined credential field.
    #[error("failed to decode base64 field: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

/// Errors from the structured-path accessor, see [`crate::path`].
#[derive(Error, Debug)]
pub enum PathError {
    /// An empty path string was given.
    #[error("path must not be empty")]
    BadPath,

    /// The path (or a prefix of it) does not resolve to a value and no default was given.
    #[error("path '{0}' not found")]
    PathMissing(String),

    /// A prefix of the path resolves to an existing non-structured (scalar) value.
    #[error("path '{0}' conflicts with an existing scalar value")]
    PathConflict(String),
}
