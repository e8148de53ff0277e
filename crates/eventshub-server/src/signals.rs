//! Shutdown channel.
//!
//! Every way of stopping the server funnels into one watch channel:
//! - SIGINT/SIGTERM (Ctrl+C off Unix)
//! - the kill switch endpoint, after its delay
//! - programmatic requests from the lifecycle controller or tests
//!
//! Only the first trigger is recorded. Later triggers are no-ops and report
//! `false`, so the recorded [`ShutdownReason`] always names what actually
//! stopped the server.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ServerResult;

/// What triggered the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// The kill switch endpoint.
    KillSwitch,
    /// A direct call through a [`ShutdownHandle`].
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::KillSwitch => "kill switch",
            Self::Requested => "requested",
        })
    }
}

type ShutdownState = Option<ShutdownReason>;

/// Owns the shutdown channel and the OS signal listener.
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<ShutdownState>>,
    shutdown_rx: watch::Receiver<ShutdownState>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Installs the OS signal handlers and spawns the listener task.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be installed.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> ServerResult<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let handle = self.shutdown_handle();

        Ok(tokio::spawn(async move {
            let reason = tokio::select! {
                _ = sigterm.recv() => ShutdownReason::Terminate,
                _ = sigint.recv() => ShutdownReason::Interrupt,
                _ = handle.wait().wait() => {
                    debug!("Signal listener stopped");
                    return;
                }
            };
            info!(%reason, "Received signal, initiating shutdown");
            handle.trigger(reason);
        }))
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> ServerResult<JoinHandle<()>> {
        let handle = self.shutdown_handle();

        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("Received Ctrl+C, initiating shutdown");
                        handle.trigger(ShutdownReason::Interrupt);
                    }
                }
                _ = handle.wait().wait() => debug!("Signal listener stopped"),
            }
        }))
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.shutdown_rx.borrow()
    }

    /// Creates a handle that can be passed to other components.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// A future-producing view of the channel.
pub struct ShutdownSignal {
    rx: watch::Receiver<ShutdownState>,
}

impl ShutdownSignal {
    /// Waits until a trigger is recorded and returns its reason.
    ///
    /// Returns `None` only if every sender is gone without a trigger.
    pub async fn wait(mut self) -> Option<ShutdownReason> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(state) => *state,
            Err(_) => None,
        }
    }
}

/// A handle for triggering or observing shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<ShutdownState>>,
    rx: watch::Receiver<ShutdownState>,
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("reason", &self.reason())
            .finish()
    }
}

impl ShutdownHandle {
    /// Records `reason` if nothing was recorded yet.
    ///
    /// Returns `true` if this call was the first trigger.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason);
            true
        });
        if first {
            debug!(%reason, "Shutdown triggered");
        } else {
            debug!(%reason, "Shutdown already triggered, ignoring");
        }
        first
    }

    /// Triggers after `delay` on a background task.
    ///
    /// The task resolves to the result of [`ShutdownHandle::trigger`].
    pub fn trigger_after(&self, reason: ShutdownReason, delay: Duration) -> JoinHandle<bool> {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.trigger(reason)
        })
    }

    pub fn is_shutdown(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.rx.borrow()
    }

    /// Returns a future that completes when shutdown is triggered.
    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}
