//! Server configuration.
//!
//! Loaded from `EVENTSHUB_*` environment variables. [`ServerConfig::from_lookup`]
//! takes the lookup as a closure so tests can feed a map instead of the
//! process environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use eventshub_core::DEFAULT_TIME_ZONE;

use crate::error::{ConfigError, ConfigResult};

pub const ENV_HOST: &str = "EVENTSHUB_HOST";
pub const ENV_PORT: &str = "EVENTSHUB_PORT";
pub const ENV_ADMIN_USERNAME: &str = "EVENTSHUB_ADMIN_USERNAME";
pub const ENV_ADMIN_HASH: &str = "EVENTSHUB_ADMIN_HASH";
pub const ENV_TOKEN_SECRET: &str = "EVENTSHUB_TOKEN_SECRET";
pub const ENV_KILL_SECRET: &str = "EVENTSHUB_KILL_SECRET";
pub const ENV_TLS_CERTIFICATE: &str = "EVENTSHUB_TLS_CERTIFICATE";
pub const ENV_TLS_KEY: &str = "EVENTSHUB_TLS_KEY";
pub const ENV_DATABASE: &str = "EVENTSHUB_DATABASE";
pub const ENV_TIME_ZONE: &str = "EVENTSHUB_TIME_ZONE";

/// PEM certificate chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// The single principal allowed to log in.
    pub admin_username: String,
    /// bcrypt hash of the principal's password.
    pub admin_hash: String,

    /// HMAC key for bearer tokens.
    pub token_secret: String,
    /// Shared secret accepted by the kill switch endpoint.
    pub kill_secret: String,

    /// Certificate paths; `None` serves plain HTTP.
    pub tls: Option<TlsPaths>,

    /// SQLite file; `None` keeps the store in memory.
    pub database: Option<PathBuf>,

    /// IANA zone used to encode event moments.
    pub time_zone: String,

    pub token_lifetime: Duration,

    /// Per-request deadline enforced by the transport.
    pub request_timeout: Duration,

    /// Maximum number of requests served concurrently.
    pub max_connections: usize,

    /// Hard cap on how long `stop()` waits for in-flight requests.
    pub shutdown_grace: Duration,

    /// Delay between a kill switch response and the shutdown trigger.
    pub kill_delay: Duration,

    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            admin_username: String::new(),
            admin_hash: String::new(),
            token_secret: String::new(),
            kill_secret: String::new(),
            tls: None,
            database: None,
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            token_lifetime: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            max_connections: 100,
            shutdown_grace: Duration::from_secs(10),
            kill_delay: Duration::from_secs(2),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_username", &self.admin_username)
            .field("admin_hash", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .field("kill_secret", &"<redacted>")
            .field("tls", &self.tls)
            .field("database", &self.database)
            .field("time_zone", &self.time_zone)
            .field("token_lifetime", &self.token_lifetime)
            .field("request_timeout", &self.request_timeout)
            .field("max_connections", &self.max_connections)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("kill_delay", &self.kill_delay)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Creates a configuration with the required secrets and defaults for
    /// everything else.
    pub fn new(
        admin_username: impl Into<String>,
        admin_hash: impl Into<String>,
        token_secret: impl Into<String>,
        kill_secret: impl Into<String>,
    ) -> Self {
        Self {
            admin_username: admin_username.into(),
            admin_hash: admin_hash.into(),
            token_secret: token_secret.into(),
            kill_secret: kill_secret.into(),
            ..Default::default()
        }
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Fails on the first missing or unparsable variable. TLS paths are only
    /// required when `insecure` is false.
    pub fn from_env(insecure: bool) -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), insecure)
    }

    /// Loads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F, insecure: bool) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| optional(key).ok_or_else(|| ConfigError::missing(key));

        let port_text = required(ENV_PORT)?;
        let port = port_text
            .trim()
            .parse::<u16>()
            .map_err(|err| ConfigError::invalid(ENV_PORT, format!("{port_text:?}: {err}")))?;

        let tls = if insecure {
            None
        } else {
            Some(TlsPaths {
                certificate: PathBuf::from(required(ENV_TLS_CERTIFICATE)?),
                key: PathBuf::from(required(ENV_TLS_KEY)?),
            })
        };

        let mut config = Self::new(
            required(ENV_ADMIN_USERNAME)?,
            required(ENV_ADMIN_HASH)?,
            required(ENV_TOKEN_SECRET)?,
            required(ENV_KILL_SECRET)?,
        );
        config.host = required(ENV_HOST)?;
        config.port = port;
        config.tls = tls;
        config.database = optional(ENV_DATABASE).map(PathBuf::from);
        if let Some(zone) = optional(ENV_TIME_ZONE) {
            config.time_zone = zone;
        }
        Ok(config)
    }

    /// `host:port` as configured.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_tls(mut self, certificate: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsPaths {
            certificate: certificate.into(),
            key: key.into(),
        });
        self
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn with_time_zone(mut self, zone: impl Into<String>) -> Self {
        self.time_zone = zone.into();
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_kill_delay(mut self, delay: Duration) -> Self {
        self.kill_delay = delay;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}
