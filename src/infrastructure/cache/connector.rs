//! Backend connection lifecycle
//!
//! The connector owns the single active backend handle. Connection attempts
//! are serialised through an async mutex whose FIFO waiter queue makes
//! concurrent callers await the in-flight attempt; after acquiring the lock the
//! connected flag is re-checked so only the first caller dials.
//!
//! Failed attempts are retried after `retry_delay * attempts` until
//! `max_retries` is reached. From then on the cache stays disabled until
//! [`BackendConnector::reconnect`] is called.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{BackendTarget, CacheSettings};
use crate::domain::cache::{BackendMode, CacheBackend};
use crate::domain::CacheError;

use super::factory::{BackendFactory, DefaultBackendFactory};

const EVENT_CAPACITY: usize = 32;

/// Connection lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Connected { mode: BackendMode },
    ConnectionFailed { attempt: u32, error: String },
    RetryScheduled { attempt: u32, delay: Duration },
    /// Terminal: no further automatic attempts until `reconnect()`
    RetriesExhausted { attempts: u32 },
    Disconnected,
}

/// Snapshot of the connection descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub mode: Option<BackendMode>,
    pub is_connected: bool,
    pub connection_attempts: u32,
    pub exhausted: bool,
    pub retry_pending: bool,
}

#[derive(Debug, Default)]
struct ConnectionDescriptor {
    mode: Option<BackendMode>,
    handle: Option<Arc<dyn CacheBackend>>,
    is_connected: bool,
    connection_attempts: u32,
    exhausted: bool,
    retry_task: Option<JoinHandle<()>>,
}

/// Long-lived owner of the backend connection
///
/// Construct once and share via `Arc`; data operations borrow the current
/// handle per call through [`BackendConnector::backend`].
#[derive(Debug)]
pub struct BackendConnector {
    target: Option<BackendTarget>,
    factory: Arc<dyn BackendFactory>,
    max_retries: u32,
    retry_delay: Duration,
    connect_lock: Mutex<()>,
    state: RwLock<ConnectionDescriptor>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl BackendConnector {
    /// Creates a connector for the target selected by `settings`
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_factory(settings, Arc::new(DefaultBackendFactory::new()))
    }

    pub fn with_factory(settings: &CacheSettings, factory: Arc<dyn BackendFactory>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            target: settings.backend_target(),
            factory,
            max_retries: settings.max_retries.max(1),
            retry_delay: settings.retry_delay(),
            connect_lock: Mutex::new(()),
            state: RwLock::new(ConnectionDescriptor::default()),
            events,
        }
    }

    /// Whether any backend is configured
    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&BackendTarget> {
        self.target.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected
    }

    pub async fn status(&self) -> ConnectionStatus {
        let state = self.state.read().await;

        ConnectionStatus {
            mode: state.mode,
            is_connected: state.is_connected,
            connection_attempts: state.connection_attempts,
            exhausted: state.exhausted,
            retry_pending: state.retry_task.is_some(),
        }
    }

    /// Establishes the backend connection
    ///
    /// Concurrent callers queue on the connection lock and observe the result
    /// of the first attempt. While a retry is scheduled or retries are
    /// exhausted this returns `Unavailable` without dialing.
    pub async fn connect(self: &Arc<Self>) -> Result<(), CacheError> {
        let target = self.target.clone().ok_or(CacheError::NotConfigured)?;

        if self.is_connected().await {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;

        {
            let state = self.state.read().await;

            if state.is_connected {
                return Ok(());
            }
            if state.exhausted {
                return Err(CacheError::unavailable(format!(
                    "connection retries exhausted after {} attempts",
                    state.connection_attempts
                )));
            }
            if state.retry_task.is_some() {
                return Err(CacheError::unavailable("connection retry pending"));
            }
        }

        self.attempt(&target).await
    }

    /// Tears down the current connection and clears retry state
    ///
    /// Safe to call in any state.
    pub async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;
        let mut state = self.state.write().await;

        if let Some(task) = state.retry_task.take() {
            task.abort();
        }

        let had_connection = state.handle.take().is_some();
        state.is_connected = false;
        state.mode = None;
        state.connection_attempts = 0;
        state.exhausted = false;
        drop(state);

        if had_connection {
            info!("Cache backend disconnected");
            let _ = self.events.send(ConnectorEvent::Disconnected);
        }
    }

    /// Disconnects, then connects afresh
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), CacheError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Returns the current handle without connecting
    pub async fn backend(&self) -> Result<Arc<dyn CacheBackend>, CacheError> {
        let state = self.state.read().await;

        if let Some(handle) = &state.handle {
            return Ok(handle.clone());
        }

        if self.target.is_none() {
            Err(CacheError::NotConfigured)
        } else if state.exhausted {
            Err(CacheError::unavailable("cache disabled after exhausting connection retries"))
        } else {
            Err(CacheError::unavailable("cache backend not connected"))
        }
    }

    /// Returns the current handle, connecting lazily on first use
    pub async fn backend_or_connect(self: &Arc<Self>) -> Result<Arc<dyn CacheBackend>, CacheError> {
        match self.backend().await {
            Ok(handle) => Ok(handle),
            Err(CacheError::Unavailable { .. }) => {
                self.connect().await.map_err(|e| match e {
                    CacheError::Connection { message } => CacheError::unavailable(message),
                    other => other,
                })?;
                self.backend().await
            }
            Err(e) => Err(e),
        }
    }

    /// Runs one attempt; caller holds the connection lock
    async fn attempt(self: &Arc<Self>, target: &BackendTarget) -> Result<(), CacheError> {
        debug!(mode = %target.mode(), target = %target.describe(), "Connecting to cache backend");

        match self.factory.create(target).await {
            Ok(handle) => {
                let mode = handle.mode();
                let mut state = self.state.write().await;
                state.handle = Some(handle);
                state.mode = Some(mode);
                state.is_connected = true;
                state.connection_attempts = 0;
                state.exhausted = false;
                drop(state);

                info!(mode = %mode, target = %target.describe(), "Cache backend connected");
                let _ = self.events.send(ConnectorEvent::Connected { mode });
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.connection_attempts += 1;
                let attempt = state.connection_attempts;

                warn!(
                    attempt,
                    max_retries = self.max_retries,
                    error = %e,
                    "Cache backend connection failed"
                );
                let _ = self.events.send(ConnectorEvent::ConnectionFailed {
                    attempt,
                    error: e.to_string(),
                });

                if attempt >= self.max_retries {
                    state.exhausted = true;
                    drop(state);

                    error!(
                        attempts = attempt,
                        "Cache backend retries exhausted; caching disabled until reconnect"
                    );
                    let _ = self
                        .events
                        .send(ConnectorEvent::RetriesExhausted { attempts: attempt });
                } else {
                    let delay = backoff_delay(self.retry_delay, attempt);
                    state.retry_task = Some(self.schedule_retry(delay));
                    drop(state);

                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Cache reconnect scheduled");
                    let _ = self
                        .events
                        .send(ConnectorEvent::RetryScheduled { attempt, delay });
                }

                Err(e)
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let connector: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Some(connector) = connector.upgrade() {
                connector.run_scheduled_retry().await;
            }
        })
    }

    async fn run_scheduled_retry(self: &Arc<Self>) {
        let Some(target) = self.target.clone() else {
            return;
        };

        let _guard = self.connect_lock.lock().await;

        {
            let mut state = self.state.write().await;
            // Detach our own handle so the attempt can schedule the next one
            state.retry_task = None;

            if state.is_connected || state.exhausted {
                return;
            }
        }

        let _ = self.attempt(&target).await;
    }
}

/// Linear backoff, saturating instead of overflowing
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).unwrap_or(Duration::MAX)
}
