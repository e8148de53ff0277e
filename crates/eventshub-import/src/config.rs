//! Importer configuration.
//!
//! The target server and the list of XML exports come from a JSON file:
//!
//! ```json
//! {"host": "localhost", "port": 8443, "source_files_paths": ["events.xml"]}
//! ```
//!
//! Credentials are never stored in the file; they are read from the
//! environment:
//! - `EVENTSHUB_ADMIN_USERNAME` / `EVENTSHUB_ADMIN_PASSWORD`
//! - `EVENTSHUB_CA_CERTIFICATE` (optional PEM bundle trusted in addition to
//!   the built-in roots)

use std::fmt;
use std::path::{Path, PathBuf};

use eventshub_protocol::Credentials;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, ImportResult};

pub const ENV_USERNAME: &str = "EVENTSHUB_ADMIN_USERNAME";
pub const ENV_PASSWORD: &str = "EVENTSHUB_ADMIN_PASSWORD";
pub const ENV_CA_CERTIFICATE: &str = "EVENTSHUB_CA_CERTIFICATE";

fn default_scheme() -> String {
    "https".to_string()
}

/// Contents of the importer's JSON configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub host: String,
    pub port: u16,
    /// XML exports to upload, in order.
    #[serde(default)]
    pub source_files_paths: Vec<PathBuf>,
    /// `https` unless the server runs with `--insecure`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl ImportConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// Relative source paths are kept as written and resolved against the
    /// working directory.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or if the scheme is
    /// neither `http` nor `https`.
    pub fn load_from(path: &Path) -> ImportResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| ImportError::config(path, e))?;
        config.validate().map_err(|reason| ImportError::config(path, reason))?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        match self.scheme.as_str() {
            "http" | "https" => Ok(()),
            other => Err(format!("unsupported scheme {other:?}")),
        }
    }

    /// Base URL of the server, without a trailing slash.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Login material taken from the environment.
#[derive(Clone)]
pub struct ImportCredentials {
    pub username: String,
    pub password: String,
    pub ca_certificate: Option<PathBuf>,
}

impl fmt::Debug for ImportCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ca_certificate", &self.ca_certificate)
            .finish()
    }
}

impl ImportCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ca_certificate: None,
        }
    }

    /// Builder: trust an extra CA bundle.
    pub fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    /// Reads the credentials from the process environment.
    ///
    /// # Errors
    ///
    /// [`ImportError::MissingVariable`] if the username or password is unset
    /// or empty.
    pub fn from_env() -> ImportResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the credentials through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ImportCredentials::from_env`].
    pub fn from_lookup<F>(lookup: F) -> ImportResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &str| {
            lookup(var)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ImportError::missing(var))
        };
        let mut credentials = Self::new(required(ENV_USERNAME)?, required(ENV_PASSWORD)?);
        if let Some(path) = lookup(ENV_CA_CERTIFICATE).filter(|value| !value.is_empty()) {
            credentials = credentials.with_ca_certificate(path);
        }
        Ok(credentials)
    }

    /// The login request body.
    pub fn to_login(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_minimal_config() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"{"host": "localhost", "port": 8443, "source_files_paths": ["a.xml", "b.xml"]}"#,
        );
        let config = ImportConfig::load_from(&path).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8443);
        assert_eq!(config.scheme, "https");
        assert_eq!(
            config.source_files_paths,
            vec![PathBuf::from("a.xml"), PathBuf::from("b.xml")]
        );
        assert_eq!(config.base_url(), "https://localhost:8443");
    }

    #[test]
    fn explicit_scheme_and_ipv6_host() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, r#"{"host": "::1", "port": 80, "scheme": "http"}"#);
        let config = ImportConfig::load_from(&path).unwrap();
        assert!(config.source_files_paths.is_empty());
        assert_eq!(config.base_url(), "http://[::1]:80");
    }

    #[test]
    fn rejects_bad_files() {
        let dir = TempDir::new().unwrap();

        let path = write(&dir, r#"{"host": "localhost"}"#);
        assert!(matches!(
            ImportConfig::load_from(&path),
            Err(ImportError::Config { .. })
        ));

        let path = write(&dir, r#"{"host": "localhost", "port": 1, "scheme": "ftp"}"#);
        let err = ImportConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("ftp"));

        assert!(matches!(
            ImportConfig::load_from(&dir.path().join("missing.json")),
            Err(ImportError::Io { .. })
        ));
    }

    #[test]
    fn credentials_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, "pw"),
            (ENV_CA_CERTIFICATE, "/etc/ca.pem"),
        ]
        .into_iter()
        .collect();
        let credentials =
            ImportCredentials::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password, "pw");
        assert_eq!(
            credentials.ca_certificate,
            Some(PathBuf::from("/etc/ca.pem"))
        );
        assert!(!format!("{credentials:?}").contains("pw\""));
    }

    #[test]
    fn empty_password_is_missing() {
        let env: HashMap<&str, &str> = [(ENV_USERNAME, "admin"), (ENV_PASSWORD, "")]
            .into_iter()
            .collect();
        let err =
            ImportCredentials::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ImportError::MissingVariable { var } if var == ENV_PASSWORD));
    }
}
