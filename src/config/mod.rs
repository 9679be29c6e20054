//! Configuration and credential assembly: kubeconfig loading, in-cluster
//! discovery, and the [`Credentials`] snapshot the rest of the crate runs
//! requests against.
pub mod file_config;
pub mod incluster;

use crate::error::{ConfigError, Result};
use base64::Engine;
use file_config::{AuthInfo, Cluster, Kubeconfig};
use secrecy::SecretString;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How `bearer_token` is currently being sourced, carried through so the
/// credential resolver knows which refresh strategy (if any) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// A static token/cert pair with no refresh strategy.
    Static,
    /// A `client.authentication.k8s.io` exec plugin.
    Exec,
    /// A legacy `auth-provider` stanza (e.g. `gcp`).
    AuthProvider,
}

/// A resolved, request-ready snapshot of connection and auth material.
///
/// Exclusively owned by [`crate::client::Client`] (see spec.md §5's
/// ownership model) and mutated in place by the credential resolver on
/// refresh; never cloned or shared across threads.
pub struct Credentials {
    /// `https://host:port` of the apiserver.
    pub server: String,
    /// Path to a PEM CA bundle, if TLS verification is not disabled.
    pub ca_path: Option<PathBuf>,
    /// Path to a PEM client certificate, for mTLS.
    pub client_cert_path: Option<PathBuf>,
    /// Path to a PEM client key, for mTLS.
    pub client_key_path: Option<PathBuf>,
    /// Current bearer token. Empty when auth is cert-only.
    pub bearer_token: SecretString,
    /// Unix timestamp after which `bearer_token` (and/or the cert pair) should be refreshed.
    pub expiry: Option<i64>,
    /// Whether the server's hostname should be validated against its certificate.
    pub verify_peer_name: bool,
    /// Which refresh strategy governs this credential set, if any.
    pub provider: ProviderKind,
    /// Temp files this `Credentials` created for inline base64 material, cleaned up on drop.
    owned_temp_files: Vec<PathBuf>,
}

impl Credentials {
    /// A minimal static credential set with no TLS material — suitable for
    /// talking to a `kubectl proxy`-style local endpoint, or for tests that
    /// drive a mock [`crate::transport::Transport`] and never touch TLS.
    pub fn insecure_static(server: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Credentials {
            server: server.into(),
            ca_path: None,
            client_cert_path: None,
            client_key_path: None,
            bearer_token: SecretString::from(bearer_token.into()),
            expiry: None,
            verify_peer_name: true,
            provider: ProviderKind::Static,
            owned_temp_files: Vec::new(),
        }
    }

    /// Writes `data` to a fresh temp file and returns its path, tracking it for cleanup.
    fn write_temp_pem(&mut self, data: &[u8]) -> std::io::Result<PathBuf> {
        let mut f = tempfile::Builder::new().prefix("kube-watch-cred-").tempfile()?;
        f.write_all(data)?;
        f.flush()?;
        let (_, path) = f.keep()?;
        self.owned_temp_files.push(path.clone());
        Ok(path)
    }

    /// Replaces the client cert/key pair with freshly-rotated PEM material,
    /// as delivered by an exec-plugin credential refresh. Deletes the
    /// previously-owned temp files for the pair, if any.
    pub fn set_client_identity_from_pem(&mut self, cert_pem: &[u8], key_pem: &[u8]) -> Result<()> {
        let cert_path = self
            .write_temp_pem(cert_pem)
            .map_err(|source| ConfigError::ReadFile { path: PathBuf::from("<temp cert>"), source })?;
        let key_path = self
            .write_temp_pem(key_pem)
            .map_err(|source| ConfigError::ReadFile { path: PathBuf::from("<temp key>"), source })?;
        let old_cert = self.client_cert_path.replace(cert_path);
        let old_key = self.client_key_path.replace(key_path);
        self.drop_owned_temp_file(old_cert);
        self.drop_owned_temp_file(old_key);
        Ok(())
    }

    /// Removes `old` from the owned-temp-file set and deletes it from disk,
    /// if it was one of this `Credentials`' own temp files. A no-op for a
    /// path the kubeconfig pointed at directly, since those aren't ours to
    /// delete.
    fn drop_owned_temp_file(&mut self, old: Option<PathBuf>) {
        let Some(old) = old else { return };
        if let Some(pos) = self.owned_temp_files.iter().position(|p| p == &old) {
            self.owned_temp_files.remove(pos);
            let _ = std::fs::remove_file(&old);
        }
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        for path in &self.owned_temp_files {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("ca_path", &self.ca_path)
            .field("client_cert_path", &self.client_cert_path)
            .field("bearer_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("provider", &self.provider)
            .finish()
    }
}

/// Resolves a cert/key/CA field that may be supplied either inline as
/// base64 (`*_field`, written to a fresh temp file and registered in
/// `owned_temp_files` so `Credentials::drop` cleans it up) or as a path on
/// disk (`path_field`, left untouched since it isn't ours to delete).
fn decode_pem_field(
    data_field: &Option<String>,
    path_field: &Option<String>,
    config_dir: &Path,
    owned_temp_files: &mut Vec<PathBuf>,
) -> Result<Option<PathBuf>> {
    if let Some(data) = data_field {
        let bytes = base64::engine::general_purpose::STANDARD.decode(data).map_err(ConfigError::Base64Decode)?;
        let mut f = tempfile::Builder::new()
            .prefix("kube-watch-cfg-")
            .tempfile()
            .map_err(|source| ConfigError::ReadFile { path: PathBuf::from("<temp>"), source })?;
        f.write_all(&bytes).map_err(|source| ConfigError::ReadFile { path: PathBuf::from("<temp>"), source })?;
        let (_, path) = f.keep().map_err(|e| ConfigError::ReadFile { path: PathBuf::from("<temp>"), source: e.into() })?;
        owned_temp_files.push(path.clone());
        return Ok(Some(path));
    }
    if let Some(path) = path_field {
        let p = Path::new(path);
        let resolved = if p.is_absolute() { p.to_path_buf() } else { config_dir.join(p) };
        return Ok(Some(resolved));
    }
    Ok(None)
}

fn credentials_from_cluster_and_user(cluster: &Cluster, auth_info: &AuthInfo, config_dir: &Path) -> Result<Credentials> {
    let server = cluster.server.clone().ok_or(ConfigError::CurrentContextNotSet)?;
    let mut owned_temp_files = Vec::new();
    let ca_path = decode_pem_field(&cluster.certificate_authority_data, &cluster.certificate_authority, config_dir, &mut owned_temp_files)?;
    let client_cert_path = decode_pem_field(&auth_info.client_certificate_data, &auth_info.client_certificate, config_dir, &mut owned_temp_files)?;
    let client_key_path = decode_pem_field(&auth_info.client_key_data, &auth_info.client_key, config_dir, &mut owned_temp_files)?;

    let bearer_token = if let Some(token) = &auth_info.token {
        SecretString::from(token.clone())
    } else if let Some(token_file) = &auth_info.token_file {
        let contents = std::fs::read_to_string(token_file)
            .map_err(|source| ConfigError::ReadFile { path: PathBuf::from(token_file), source })?;
        SecretString::from(contents.trim().to_string())
    } else {
        SecretString::from(String::new())
    };

    let provider = if auth_info.exec.is_some() {
        ProviderKind::Exec
    } else if auth_info.auth_provider.is_some() {
        ProviderKind::AuthProvider
    } else {
        ProviderKind::Static
    };

    Ok(Credentials {
        server,
        ca_path,
        client_cert_path,
        client_key_path,
        bearer_token,
        expiry: None,
        verify_peer_name: !cluster.insecure_skip_tls_verify.unwrap_or(false),
        provider,
        owned_temp_files,
    })
}

/// Locates a kubeconfig: `explicit_path`, then `$KUBECONFIG`, then `$HOME/.kube/config`.
fn locate_kubeconfig(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit_path {
        return Ok(p.to_path_buf());
    }
    if let Ok(from_env) = std::env::var("KUBECONFIG") {
        if let Some(first) = std::env::split_paths(&from_env).next() {
            return Ok(first);
        }
    }
    let home = home::home_dir().ok_or(ConfigError::NoKubeconfigPath)?;
    Ok(home.join(".kube").join("config"))
}

/// Loads a kubeconfig from `path`, selects `context_name` (or the file's
/// `current-context`), and resolves it into a [`Credentials`] snapshot plus
/// the [`file_config::AuthInfo`] the resolver needs for refreshes.
pub fn from_kubeconfig(path: &Path, context_name: Option<&str>) -> Result<(Credentials, AuthInfo, PathBuf)> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let kubeconfig: Kubeconfig = serde_yaml::from_str(&contents).map_err(ConfigError::ParseYaml)?;

    let context_name = context_name
        .map(str::to_string)
        .or(kubeconfig.current_context.clone())
        .ok_or(ConfigError::CurrentContextNotSet)?;
    let context = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .and_then(|c| c.context.as_ref())
        .ok_or(ConfigError::CurrentContextNotSet)?;

    let cluster = kubeconfig
        .clusters
        .iter()
        .find(|c| c.name == context.cluster)
        .and_then(|c| c.cluster.as_ref())
        .ok_or_else(|| ConfigError::LoadClusterOfContext { cluster_name: context.cluster.clone() })?;

    let auth_info = kubeconfig
        .auth_infos
        .iter()
        .find(|u| u.name == context.user)
        .map(|u| u.auth_info.clone())
        .ok_or_else(|| ConfigError::FindUser { user_name: context.user.clone() })?;

    let config_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let credentials = credentials_from_cluster_and_user(cluster, &auth_info, &config_dir)?;
    Ok((credentials, auth_info, config_dir))
}

/// Builds a [`Credentials`] snapshot from the in-cluster service account mount.
/// There is no refresh strategy for in-cluster material beyond rereading the
/// projected token file, so no [`file_config::AuthInfo`] is returned.
pub fn incluster() -> Result<Credentials> {
    let info = incluster::load().map_err(crate::error::Error::Config)?;
    Ok(Credentials {
        server: info.server,
        ca_path: Some(info.ca_path),
        client_cert_path: None,
        client_key_path: None,
        bearer_token: SecretString::from(info.token),
        expiry: None,
        verify_peer_name: true,
        provider: ProviderKind::Static,
        owned_temp_files: Vec::new(),
    })
}

/// Tries in-cluster discovery first, then falls back to kubeconfig
/// inference (`explicit_path`, `$KUBECONFIG`, `$HOME/.kube/config`), the
/// same preference order as the teacher's `Config::infer`.
pub fn infer(explicit_path: Option<&Path>, context_name: Option<&str>) -> Result<(Credentials, Option<(AuthInfo, PathBuf)>)> {
    if let Ok(creds) = incluster() {
        return Ok((creds, None));
    }
    let path = locate_kubeconfig(explicit_path).map_err(crate::error::Error::Config)?;
    let (creds, auth_info, config_dir) = from_kubeconfig(&path, context_name)?;
    Ok((creds, Some((auth_info, config_dir))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_config::AuthInfo;

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn inline_base64_fields_are_tracked_for_cleanup_on_drop() {
        let cluster = Cluster {
            server: Some("https://host".into()),
            certificate_authority_data: Some(b64("ca-pem")),
            ..Default::default()
        };
        let auth_info = AuthInfo {
            client_certificate_data: Some(b64("cert-pem")),
            client_key_data: Some(b64("key-pem")),
            ..Default::default()
        };
        let config_dir = std::env::temp_dir();
        let creds = credentials_from_cluster_and_user(&cluster, &auth_info, &config_dir).unwrap();

        assert_eq!(creds.owned_temp_files.len(), 3, "CA + cert + key were all inlined as base64");
        let paths = creds.owned_temp_files.clone();
        for p in &paths {
            assert!(p.exists());
        }
        drop(creds);
        for p in &paths {
            assert!(!p.exists(), "inlined temp files must be deleted when their Credentials is dropped");
        }
    }

    #[test]
    fn overwriting_client_identity_deletes_the_previous_temp_files() {
        let mut creds = Credentials::insecure_static("https://host", "");
        creds.set_client_identity_from_pem(b"cert-1", b"key-1").unwrap();
        let first_cert = creds.client_cert_path.clone().unwrap();
        let first_key = creds.client_key_path.clone().unwrap();
        assert!(first_cert.exists());
        assert!(first_key.exists());

        creds.set_client_identity_from_pem(b"cert-2", b"key-2").unwrap();
        assert!(!first_cert.exists(), "previous cert temp file should be deleted on overwrite");
        assert!(!first_key.exists(), "previous key temp file should be deleted on overwrite");
        assert_eq!(creds.owned_temp_files.len(), 2, "only the current pair should remain tracked");
    }
}
