//! Credential refresh: auth-provider and exec-plugin strategies.
//!
//! Mirrors the teacher's `Auth`/`RefreshableToken` refresh shape, collapsed
//! to a single blocking call since there is no shared/cloned token to
//! synchronize here — [`crate::config::Credentials`] is exclusively owned
//! by the client driving it.
use crate::config::file_config::{AuthInfo, AuthProviderConfig, ExecConfig, ExecCredential};
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::path;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Refreshes [`Credentials`] in place according to the strategy named by a
/// kubeconfig user entry's `auth-provider` or `exec` stanza.
pub struct Resolver {
    auth_info: AuthInfo,
    config_dir: PathBuf,
}

impl Resolver {
    /// `config_dir` is the directory containing the kubeconfig, used to
    /// resolve a relative exec `command` the same way the shell resolves a
    /// script invoked by relative path.
    pub fn new(auth_info: AuthInfo, config_dir: PathBuf) -> Self {
        Resolver { auth_info, config_dir }
    }

    /// Refreshes `creds` if its token has expired (or is empty and a
    /// refresh strategy is configured), otherwise a no-op.
    pub fn snapshot(&self, creds: &mut Credentials) -> Result<()> {
        if !self.needs_refresh(creds) {
            return Ok(());
        }
        if let Some(provider) = self.auth_info.auth_provider.clone() {
            self.refresh_auth_provider(&provider, creds)?;
        } else if let Some(exec) = self.auth_info.exec.clone() {
            self.refresh_exec(&exec, creds)?;
        }
        Ok(())
    }

    fn needs_refresh(&self, creds: &Credentials) -> bool {
        if self.auth_info.auth_provider.is_none() && self.auth_info.exec.is_none() {
            return false;
        }
        match creds.expiry {
            Some(expiry) => Utc::now().timestamp() >= expiry,
            None => creds.bearer_token.expose_secret().is_empty(),
        }
    }

    fn refresh_auth_provider(&self, provider: &AuthProviderConfig, creds: &mut Credentials) -> Result<()> {
        let cmd_path = provider
            .config
            .get("cmd-path")
            .ok_or_else(|| Error::AuthRefreshFailed("auth-provider config missing cmd-path".into()))?;
        let cmd_args = provider.config.get("cmd-args").cloned().unwrap_or_default();

        let mut command = Command::new(resolve_command_path(cmd_path, &self.config_dir));
        if !cmd_args.is_empty() {
            command.args(cmd_args.split_whitespace());
        }
        let output = command
            .output()
            .map_err(|e| Error::AuthRefreshFailed(format!("{cmd_path}: {e}")))?;
        if !output.status.success() {
            return Err(Error::AuthRefreshFailed(format!(
                "{cmd_path} exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;

        let token_key = provider
            .config
            .get("token-key")
            .ok_or_else(|| Error::AuthRefreshFailed("auth-provider config missing token-key".into()))?;
        let token = path::get_str(&parsed, &strip_braces(token_key))
            .map_err(|_| Error::AuthRefreshFailed(format!("token path '{token_key}' not found in auth-provider output")))?;
        creds.bearer_token = SecretString::from(token);

        creds.expiry = provider
            .config
            .get("expiry-key")
            .and_then(|expiry_key| path::get_str(&parsed, &strip_braces(expiry_key)).ok())
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .map(|dt| dt.timestamp());

        tracing::debug!(provider = %provider.name, "refreshed credentials via auth-provider");
        Ok(())
    }

    fn refresh_exec(&self, exec: &ExecConfig, creds: &mut Credentials) -> Result<()> {
        let mut command = Command::new(resolve_command_path(&exec.command, &self.config_dir));
        if let Some(args) = &exec.args {
            command.args(args);
        }
        if let Some(env) = &exec.env {
            for entry in env {
                if let (Some(name), Some(value)) = (entry.get("name"), entry.get("value")) {
                    command.env(name, value);
                }
            }
        }
        let output = command
            .output()
            .map_err(|e| Error::AuthRefreshFailed(format!("{}: {e}", exec.command)))?;
        if !output.status.success() {
            return Err(Error::AuthRefreshFailed(format!(
                "exec plugin '{}' exited with {:?}: {}",
                exec.command,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let doc: ExecCredential = serde_json::from_slice(&output.stdout)?;
        if doc.kind.as_deref() != Some("ExecCredential")
            || doc.api_version.as_deref() != Some("client.authentication.k8s.io/v1beta1")
        {
            return Err(Error::AuthRefreshFailed(
                "exec plugin response is not a client.authentication.k8s.io/v1beta1 ExecCredential".into(),
            ));
        }
        let status = doc
            .status
            .ok_or_else(|| Error::AuthRefreshFailed("exec plugin response missing status".into()))?;

        if let Some(token) = status.token {
            creds.bearer_token = SecretString::from(token);
        }
        if let (Some(cert), Some(key)) = (&status.client_certificate_data, &status.client_key_data) {
            creds.set_client_identity_from_pem(cert.as_bytes(), key.as_bytes())?;
        }
        creds.expiry = status
            .expiration_timestamp
            .as_deref()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .map(|dt| dt.timestamp());

        tracing::debug!(command = %exec.command, "refreshed credentials via exec plugin");
        Ok(())
    }
}

/// Strips the `{` `}` brace delimiters auth-provider `*-key` config values
/// wrap their dotted paths in (e.g. `{.credential.access_token}`).
fn strip_braces(path: &str) -> String {
    path.trim_start_matches('{').trim_end_matches('}').trim_start_matches('.').to_string()
}

/// A bare command name is resolved via `$PATH` (left to the OS); anything
/// that looks like a path is resolved relative to the kubeconfig's
/// directory, falling back to the literal string if no such file exists.
fn resolve_command_path(cmd: &str, config_dir: &Path) -> PathBuf {
    let p = Path::new(cmd);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    if cmd.contains(std::path::MAIN_SEPARATOR) {
        let candidate = config_dir.join(p);
        if candidate.exists() {
            return candidate;
        }
    }
    p.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_braces_handles_dotted_and_bracketed_forms() {
        assert_eq!(strip_braces("{.credential.access_token}"), "credential.access_token");
        assert_eq!(strip_braces("access_token"), "access_token");
    }
}
