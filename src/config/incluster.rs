//! In-cluster credential discovery, used when no kubeconfig is available
//! and the process is itself running inside a pod.
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const TOKEN_FILE: &str = "token";
const CA_FILE: &str = "ca.crt";
const NAMESPACE_FILE: &str = "namespace";
const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Material discovered from the in-cluster service account mount.
pub struct InClusterInfo {
    /// `https://<host>:<port>`, from `KUBERNETES_SERVICE_HOST`/`_PORT`.
    pub server: String,
    /// Path to the mounted CA bundle.
    pub ca_path: PathBuf,
    /// Bearer token contents, read fresh (the projected token is rotated by kubelet).
    pub token: String,
    /// The pod's own namespace, if the projection carries it.
    pub namespace: Option<String>,
}

/// Reads `KUBERNETES_SERVICE_HOST`/`_PORT` and the mounted service account
/// directory. Returns [`ConfigError::MissingInClusterVariables`] if the
/// environment variables are absent — the caller treats that as "not
/// running in a cluster" rather than a hard failure.
pub fn load() -> Result<InClusterInfo, ConfigError> {
    load_from(Path::new(SERVICE_ACCOUNT_DIR))
}

fn load_from(dir: &Path) -> Result<InClusterInfo, ConfigError> {
    let host = std::env::var(SERVICE_HOST_ENV).map_err(|_| ConfigError::MissingInClusterVariables {
        hostenv: SERVICE_HOST_ENV,
        portenv: SERVICE_PORT_ENV,
    })?;
    let port = std::env::var(SERVICE_PORT_ENV).map_err(|_| ConfigError::MissingInClusterVariables {
        hostenv: SERVICE_HOST_ENV,
        portenv: SERVICE_PORT_ENV,
    })?;
    let server = if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };

    let token_path = dir.join(TOKEN_FILE);
    let token = std::fs::read_to_string(&token_path)
        .map_err(|source| ConfigError::ReadFile { path: token_path, source })?
        .trim()
        .to_string();

    let ca_path = dir.join(CA_FILE);
    if !ca_path.exists() {
        return Err(ConfigError::ReadFile {
            path: ca_path,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing in-cluster CA bundle"),
        });
    }

    let namespace = std::fs::read_to_string(dir.join(NAMESPACE_FILE))
        .ok()
        .map(|s| s.trim().to_string());

    Ok(InClusterInfo { server, ca_path, token, namespace })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_vars_report_which_ones() {
        // Safe: this test only exercises the path that runs before any env lookup
        // succeeds, and does not assume a clean environment for the positive case.
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var(SERVICE_HOST_ENV);
        std::env::remove_var(SERVICE_PORT_ENV);
        let err = load_from(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingInClusterVariables { .. }));
    }
}
