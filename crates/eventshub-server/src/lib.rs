//! Event store server: repository, token auth, HTTP gateway, lifecycle.
//!
//! # Example
//!
//! ```rust,no_run
//! use eventshub_server::{EventServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_env(true)?;
//!     let mut server = EventServer::new();
//!     server.configure(config)?;
//!     server.start().await?;
//!     server.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod config;
mod error;
mod gateway;
pub mod repository;
mod server;
mod signals;

pub use auth::{AuthError, AuthResult, Claims, DEFAULT_TOKEN_LIFETIME, TokenAuthority};
pub use config::{
    ENV_ADMIN_HASH, ENV_ADMIN_USERNAME, ENV_DATABASE, ENV_HOST, ENV_KILL_SECRET, ENV_PORT,
    ENV_TIME_ZONE, ENV_TLS_CERTIFICATE, ENV_TLS_KEY, ENV_TOKEN_SECRET, ServerConfig, TlsPaths,
};
pub use error::{ConfigError, ConfigResult, ServerError, ServerResult};
pub use gateway::{ApiError, AppContext, Authorized, KillSwitch, router};
pub use repository::{
    EventRepository, MemoryRepository, SqliteRepository, StatusRecord, StorageError,
    StorageResult, Upsert, UpsertOutcome,
};
pub use server::{EventServer, LifecycleState};
pub use signals::{ShutdownHandle, ShutdownReason, ShutdownSignal, SignalHandler};
