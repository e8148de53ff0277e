//! Server lifecycle.
//!
//! ```text
//! Unconfigured --configure--> Configured --start--> Serving --stop--> Draining --> Stopped
//! ```
//!
//! [`EventServer`] owns the repository handle and the listener. `stop()`
//! stops accepting, gives in-flight requests at most the configured grace
//! period, then closes the repository.

use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use eventshub_core::TemporalCodec;
use tokio::task::JoinHandle;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::TokenAuthority;
use crate::config::{ENV_TLS_CERTIFICATE, ServerConfig};
use crate::error::{ConfigError, ServerError, ServerResult};
use crate::gateway::{self, AppContext, KillSwitch};
use crate::repository::{EventRepository, SqliteRepository, StorageError};
use crate::signals::{ShutdownHandle, ShutdownReason, SignalHandler};

/// Extra time granted to the accept loop after the grace period before its
/// task is aborted.
const ABORT_MARGIN: Duration = Duration::from_millis(500);

/// Lifecycle state of an [`EventServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    Configured,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that exists once the server is configured.
struct Installed {
    config: ServerConfig,
    codec: TemporalCodec,
    repository: Arc<dyn EventRepository>,
}

/// The running listener.
struct Listener {
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
    /// Starts draining as soon as any shutdown trigger fires.
    watcher: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// The event store server.
pub struct EventServer {
    state: LifecycleState,
    installed: Option<Installed>,
    listener: Option<Listener>,
    signals: SignalHandler,
}

impl Default for EventServer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventServer {
    /// Creates an unconfigured server.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Unconfigured,
            installed: None,
            listener: None,
            signals: SignalHandler::new(),
        }
    }

    /// Creates a configured server over an existing repository.
    ///
    /// The repository is migrated and seeded with the configured credential.
    ///
    /// # Errors
    ///
    /// Fails if the time zone is unknown or the repository rejects the
    /// migration or the credential.
    pub fn with_repository(
        config: ServerConfig,
        repository: Arc<dyn EventRepository>,
    ) -> ServerResult<Self> {
        let mut server = Self::new();
        let codec = TemporalCodec::new(&config.time_zone)?;
        server.install(config, codec, repository)?;
        Ok(server)
    }

    /// Opens the SQLite repository named by `config` (in memory when unset),
    /// migrates it and seeds the credential.
    ///
    /// # Errors
    ///
    /// Fails if called after the server was configured, or if the time
    /// zone, database or credential cannot be set up.
    pub fn configure(&mut self, config: ServerConfig) -> ServerResult<()> {
        self.expect_state(LifecycleState::Unconfigured, "configure")?;
        let codec = TemporalCodec::new(&config.time_zone)?;
        let repository = match &config.database {
            Some(path) => SqliteRepository::open(path, codec)?,
            None => {
                warn!("No database configured, events will not survive a restart");
                SqliteRepository::in_memory(codec)?
            }
        }
        .with_bcrypt_cost(config.bcrypt_cost);
        self.install(config, codec, Arc::new(repository))
    }

    fn install(
        &mut self,
        config: ServerConfig,
        codec: TemporalCodec,
        repository: Arc<dyn EventRepository>,
    ) -> ServerResult<()> {
        repository.migrate()?;
        repository.add_credential(&config.admin_username, &config.admin_hash, true)?;
        info!(
            zone = codec.zone_name(),
            user = %config.admin_username,
            "Server configured"
        );
        self.installed = Some(Installed {
            config,
            codec,
            repository,
        });
        self.state = LifecycleState::Configured;
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Address the listener is bound to, once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|listener| listener.local_addr)
    }

    /// Handle for triggering shutdown from outside.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.signals.shutdown_handle()
    }

    /// The repository, once configured.
    pub fn repository(&self) -> Option<Arc<dyn EventRepository>> {
        self.installed
            .as_ref()
            .map(|installed| Arc::clone(&installed.repository))
    }

    fn expect_state(&self, expected: LifecycleState, action: &'static str) -> ServerResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ServerError::InvalidState {
                action,
                state: self.state.as_str(),
            })
        }
    }

    /// Serves plain HTTP. Returns the bound address.
    ///
    /// # Errors
    ///
    /// Fails unless the server is configured, or if the address cannot be
    /// resolved or bound.
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        self.launch(None).await
    }

    /// Serves HTTPS with the configured certificate and key. Returns the
    /// bound address.
    ///
    /// # Errors
    ///
    /// As [`EventServer::start`], plus TLS failures when the certificate or
    /// key is missing or unreadable.
    pub async fn start_secure(&mut self) -> ServerResult<SocketAddr> {
        self.expect_state(LifecycleState::Configured, "start")?;
        let tls = self
            .installed
            .as_ref()
            .and_then(|installed| installed.config.tls.clone())
            .ok_or_else(|| ConfigError::missing(ENV_TLS_CERTIFICATE))?;

        // Fails only if a provider is already installed, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let rustls = RustlsConfig::from_pem_file(&tls.certificate, &tls.key)
            .await
            .map_err(|err| {
                ServerError::tls(format!(
                    "cannot load {} / {}: {err}",
                    tls.certificate.display(),
                    tls.key.display()
                ))
            })?;
        self.launch(Some(rustls)).await
    }

    async fn launch(&mut self, tls: Option<RustlsConfig>) -> ServerResult<SocketAddr> {
        self.expect_state(LifecycleState::Configured, "start")?;
        let Some(installed) = self.installed.as_ref() else {
            return Err(ServerError::InvalidState {
                action: "start",
                state: self.state.as_str(),
            });
        };
        let config = &installed.config;

        let address = config.bind_address();
        let resolved = tokio::net::lookup_host(&address)
            .await
            .map_err(|err| ServerError::bind(&address, err))?
            .next()
            .ok_or_else(|| ServerError::bind(&address, "address did not resolve"))?;
        let listener =
            TcpListener::bind(resolved).map_err(|err| ServerError::bind(&address, err))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let ctx = AppContext::new(
            Arc::clone(&installed.repository),
            TokenAuthority::new(&config.token_secret, config.token_lifetime),
            installed.codec,
            self.signals.shutdown_handle(),
            KillSwitch::new(&config.kill_secret, config.kill_delay),
        );
        let app = Self::app(ctx, config);

        let handle = Handle::new();
        let secure = tls.is_some();
        let task = match tls {
            None => tokio::spawn(
                axum_server::from_tcp(listener)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            ),
            Some(rustls) => tokio::spawn(
                axum_server::from_tcp_rustls(listener, rustls)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            ),
        };

        let watcher = {
            let handle = handle.clone();
            let signal = self.signals.shutdown_handle().wait();
            let grace = config.shutdown_grace;
            tokio::spawn(async move {
                if let Some(reason) = signal.wait().await {
                    debug!(%reason, "Listener draining");
                    handle.graceful_shutdown(Some(grace));
                }
            })
        };

        info!(%local_addr, secure, "Serving");
        self.listener = Some(Listener {
            handle,
            task,
            watcher,
            local_addr,
        });
        self.state = LifecycleState::Serving;
        Ok(local_addr)
    }

    /// The gateway wrapped in the transport layers.
    fn app(ctx: AppContext, config: &ServerConfig) -> Router {
        gateway::router(ctx)
            .layer(GlobalConcurrencyLimitLayer::new(config.max_connections))
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(middleware::map_response(gateway::timeout_envelope))
            .layer(TraceLayer::new_for_http())
    }

    /// Stops serving and closes the repository. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails to close.
    pub async fn stop(&mut self) -> ServerResult<()> {
        if self.state == LifecycleState::Stopped {
            debug!("Server already stopped");
            return Ok(());
        }

        if let Some(listener) = self.listener.take() {
            self.state = LifecycleState::Draining;
            // Pending kill switch timers become no-ops from here on.
            self.signals.shutdown_handle().trigger(ShutdownReason::Requested);

            let grace = self
                .installed
                .as_ref()
                .map(|installed| installed.config.shutdown_grace)
                .unwrap_or_default();
            info!(
                connections = listener.handle.connection_count(),
                grace_ms = grace.as_millis() as u64,
                "Draining"
            );
            listener.handle.graceful_shutdown(Some(grace));

            let abort = listener.task.abort_handle();
            match tokio::time::timeout(grace + ABORT_MARGIN, listener.task).await {
                Ok(Ok(Ok(()))) => debug!("Accept loop finished"),
                Ok(Ok(Err(err))) => warn!(error = %err, "Accept loop failed"),
                Ok(Err(err)) => warn!(error = %err, "Accept loop panicked"),
                Err(_) => {
                    warn!("Accept loop did not finish within the grace period, aborting");
                    abort.abort();
                }
            }
            listener.watcher.abort();
        }

        if let Some(installed) = self.installed.as_ref() {
            match installed.repository.close() {
                Ok(()) | Err(StorageError::Closed) => {}
                Err(err) => {
                    self.state = LifecycleState::Stopped;
                    return Err(err.into());
                }
            }
        }

        self.state = LifecycleState::Stopped;
        info!("Server stopped");
        Ok(())
    }

    /// Listens for OS signals, waits for the first shutdown trigger, then
    /// stops.
    ///
    /// # Errors
    ///
    /// Fails if the server is not serving, if signal handlers cannot be
    /// installed, or if `stop()` fails.
    pub async fn run_until_shutdown(&mut self) -> ServerResult<ShutdownReason> {
        self.expect_state(LifecycleState::Serving, "wait for shutdown")?;
        let listener = self.signals.spawn_listener()?;

        let reason = self
            .signals
            .shutdown_handle()
            .wait()
            .wait()
            .await
            .unwrap_or(ShutdownReason::Requested);
        info!(%reason, "Shutdown requested");

        let stopped = self.stop().await;
        listener.abort();
        stopped.map(|()| reason)
    }
}
