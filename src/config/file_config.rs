//! Kubeconfig YAML shapes.
//!
//! Scoped to exactly the fields spec.md §6 names: this is a boundary
//! supplier of [`crate::config::Credentials`], not a general-purpose
//! kubeconfig manipulation library (context merging, writing modified
//! kubeconfigs back out, and multi-file deep-merge stay out of scope).
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level kubeconfig document, an analogue of the config type from client-go.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Kubeconfig {
    /// Referenceable names to cluster configs.
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    /// Referenceable names to user configs.
    #[serde(rename = "users", default)]
    pub auth_infos: Vec<NamedAuthInfo>,
    /// Referenceable names to context configs.
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    /// The name of the context to use by default.
    #[serde(rename = "current-context")]
    pub current_context: Option<String>,
}

/// Name + [`Cluster`] pair.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NamedCluster {
    /// Name of the cluster.
    pub name: String,
    /// Cluster connection info.
    pub cluster: Option<Cluster>,
}

/// Information needed to connect to a Kubernetes cluster.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Cluster {
    /// The address of the kubernetes cluster (https://hostname:port).
    pub server: Option<String>,
    /// Skip the validity check for the server's certificate. Insecure.
    #[serde(rename = "insecure-skip-tls-verify")]
    pub insecure_skip_tls_verify: Option<bool>,
    /// Path to a cert file for the certificate authority.
    #[serde(rename = "certificate-authority")]
    pub certificate_authority: Option<String>,
    /// PEM-encoded certificate authority, base64. Overrides `certificate_authority`.
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: Option<String>,
}

/// Name + [`Context`] pair.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NamedContext {
    /// Name of the context.
    pub name: String,
    /// Context contents.
    pub context: Option<Context>,
}

/// A context selects a cluster and a user to connect as.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Context {
    /// Name of the [`NamedCluster`] to use.
    pub cluster: String,
    /// Name of the [`NamedAuthInfo`] to use.
    pub user: String,
    /// Default namespace scope.
    pub namespace: Option<String>,
}

/// Name + [`AuthInfo`] pair.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NamedAuthInfo {
    /// Name of the user.
    pub name: String,
    /// Authentication material and strategy.
    #[serde(rename = "user")]
    pub auth_info: AuthInfo,
}

/// Authentication info for a single user entry.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AuthInfo {
    /// Path to a client certificate file for TLS.
    #[serde(rename = "client-certificate")]
    pub client_certificate: Option<String>,
    /// PEM-encoded client certificate, base64.
    #[serde(rename = "client-certificate-data")]
    pub client_certificate_data: Option<String>,
    /// Path to a client key file for TLS.
    #[serde(rename = "client-key")]
    pub client_key: Option<String>,
    /// PEM-encoded client key, base64.
    #[serde(rename = "client-key-data")]
    pub client_key_data: Option<String>,
    /// Inline bearer token. Takes precedence over `token_file`.
    pub token: Option<String>,
    /// Path to a file containing a bearer token, reread on every use.
    #[serde(rename = "tokenFile")]
    pub token_file: Option<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Legacy cloud-provider token source (e.g. `gcp`).
    #[serde(rename = "auth-provider")]
    pub auth_provider: Option<AuthProviderConfig>,
    /// `client.authentication.k8s.io` exec plugin.
    pub exec: Option<ExecConfig>,
}

/// Legacy `auth-provider` stanza (`gcp`, custom providers).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AuthProviderConfig {
    /// Provider name, e.g. `"gcp"`.
    pub name: String,
    /// Free-form provider config, e.g. `cmd-path`, `token-key`, `expiry-key`.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// `client.authentication.k8s.io/v1beta1` exec plugin configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ExecConfig {
    /// Command to execute. May be a bare name resolved via `$PATH`, or a
    /// path resolved relative to the directory holding the kubeconfig.
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Option<Vec<String>>,
    /// Extra environment variables, as `{name, value}` pairs.
    pub env: Option<Vec<HashMap<String, String>>>,
}

/// Request document written to the exec plugin's stdin/env (unused fields omitted).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecCredential {
    /// Expected to be `"ExecCredential"`.
    pub kind: Option<String>,
    /// Expected to be `"client.authentication.k8s.io/v1beta1"`.
    #[serde(rename = "apiVersion")]
    pub api_version: Option<String>,
    /// Populated by the plugin in its response.
    pub status: Option<ExecCredentialStatus>,
}

/// Credential material returned by an exec plugin.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ExecCredentialStatus {
    /// RFC3339 expiry of `token`/the certificate pair.
    #[serde(rename = "expirationTimestamp")]
    pub expiration_timestamp: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// PEM-encoded client certificate.
    #[serde(rename = "clientCertificateData")]
    pub client_certificate_data: Option<String>,
    /// PEM-encoded client key.
    #[serde(rename = "clientKeyData")]
    pub client_key_data: Option<String>,
}
