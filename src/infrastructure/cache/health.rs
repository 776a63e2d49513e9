//! Periodic backend health probing

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::cache::{Clock, KeySpace, SystemClock};
use crate::domain::{HealthSnapshot, HealthStatus};

use super::connector::BackendConnector;

const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Probes the active connection on a fixed interval
///
/// Probing never reconnects and never retries; a failed probe only publishes a
/// disconnected snapshot. Reconnection stays with the connector.
#[derive(Debug)]
pub struct HealthMonitor {
    connector: Arc<BackendConnector>,
    keys: KeySpace,
    interval: Duration,
    count_keys: bool,
    clock: Arc<dyn Clock>,
    snapshots: watch::Sender<Option<HealthSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// A zero `interval` falls back to one second
    pub fn new(connector: Arc<BackendConnector>, keys: KeySpace, interval: Duration) -> Self {
        let (snapshots, _) = watch::channel(None);

        let interval = if interval.is_zero() {
            warn!("Zero health check interval, using {:?}", FALLBACK_INTERVAL);
            FALLBACK_INTERVAL
        } else {
            interval
        };

        Self {
            connector,
            keys,
            interval,
            count_keys: true,
            clock: Arc::new(SystemClock),
            snapshots,
            task: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Skips the key count on each probe
    pub fn without_key_count(mut self) -> Self {
        self.count_keys = false;
        self
    }

    /// Receives every published snapshot; `None` until the first probe
    pub fn subscribe(&self) -> watch::Receiver<Option<HealthSnapshot>> {
        self.snapshots.subscribe()
    }

    pub fn latest(&self) -> Option<HealthSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Probes now and publishes the result
    pub async fn get_health(&self) -> HealthSnapshot {
        let snapshot = self.probe().await;
        self.snapshots.send_replace(Some(snapshot.clone()));
        snapshot
    }

    /// Connected, not disabled, and the last probe (if any) was not unhealthy
    pub async fn is_healthy(&self) -> bool {
        let status = self.connector.status().await;

        if !status.is_connected || status.exhausted {
            return false;
        }

        match &*self.snapshots.borrow() {
            Some(snapshot) => snapshot.connected && snapshot.status != HealthStatus::Unhealthy,
            None => true,
        }
    }

    /// Starts the probe loop; a second call while running is a no-op
    pub fn start(self: &Arc<Self>) {
        let Ok(mut task) = self.task.lock() else {
            return;
        };

        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let monitor: Weak<Self> = Arc::downgrade(self);
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                let snapshot = monitor.get_health().await;
                debug!(
                    connected = snapshot.connected,
                    status = ?snapshot.status,
                    latency_ms = ?snapshot.latency_ms,
                    "Cache health probe"
                );
            }
        }));

        info!(interval_secs = interval.as_secs(), "Cache health monitor started");
    }

    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
                info!("Cache health monitor stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    async fn probe(&self) -> HealthSnapshot {
        let backend = match self.connector.backend().await {
            Ok(backend) => backend,
            Err(e) => return HealthSnapshot::disconnected(self.clock.now_millis(), Some(e.to_string())),
        };

        let started = Instant::now();

        if let Err(e) = backend.ping().await {
            warn!(error = %e, "Cache health probe failed");
            return HealthSnapshot::disconnected(self.clock.now_millis(), Some(e.to_string()));
        }

        let snapshot =
            HealthSnapshot::probed(backend.mode(), started.elapsed(), self.clock.now_millis());

        if !self.count_keys {
            return snapshot;
        }

        match backend.keys(&self.keys.pattern("*")).await {
            Ok(keys) => snapshot.with_key_count(keys.len()),
            Err(e) => {
                debug!(error = %e, "Cache key count unavailable");
                snapshot
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, LocalBackendConfig};
    use crate::domain::cache::{ManualClock, MockBackend};
    use crate::domain::BackendMode;
    use crate::infrastructure::cache::factory::mock::MockBackendFactory;

    fn connector_with(backend: MockBackend) -> Arc<BackendConnector> {
        let settings = CacheSettings::default()
            .with_local(LocalBackendConfig::new("localhost", 6379))
            .with_retries(1, Duration::from_millis(10));
        let factory = Arc::new(MockBackendFactory::with_backend(Arc::new(backend)));

        Arc::new(BackendConnector::with_factory(&settings, factory))
    }

    #[tokio::test]
    async fn test_health_when_disconnected() {
        let connector = connector_with(MockBackend::new());
        let monitor = HealthMonitor::new(connector, KeySpace::new("t:"), Duration::from_secs(300))
            .with_clock(Arc::new(ManualClock::new(7)));

        let snapshot = monitor.get_health().await;

        assert!(!snapshot.connected);
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert_eq!(snapshot.last_check_timestamp, 7);
        assert!(!monitor.is_healthy().await);
    }

    #[tokio::test]
    async fn test_health_when_connected() {
        let backend = MockBackend::new()
            .with_raw("t:a", "1")
            .with_raw("t:b", "2")
            .with_raw("other:c", "3");
        let connector = connector_with(backend);
        connector.connect().await.unwrap();

        let monitor = HealthMonitor::new(connector, KeySpace::new("t:"), Duration::from_secs(300));
        let snapshot = monitor.get_health().await;

        assert!(snapshot.connected);
        assert_eq!(snapshot.status, HealthStatus::Healthy);
        assert_eq!(snapshot.mode, Some(BackendMode::Local));
        assert_eq!(snapshot.key_count, Some(2));
        assert!(monitor.is_healthy().await);
        assert_eq!(monitor.latest(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_probe_failure_does_not_reconnect() {
        let connector = connector_with(MockBackend::new().with_error("connection reset"));
        connector.connect().await.unwrap();

        let monitor = HealthMonitor::new(connector.clone(), KeySpace::new("t:"), Duration::from_secs(300));
        let snapshot = monitor.get_health().await;

        assert!(!snapshot.connected);
        assert!(snapshot.error.unwrap().contains("connection reset"));
        assert!(!monitor.is_healthy().await);
        // The connector still holds its handle; recovery is its concern
        assert!(connector.is_connected().await);
    }

    #[tokio::test]
    async fn test_slow_probe_is_degraded() {
        let backend = MockBackend::new().with_ping_delay(Duration::from_millis(1100));
        let connector = connector_with(backend);
        connector.connect().await.unwrap();

        let monitor = HealthMonitor::new(connector, KeySpace::new("t:"), Duration::from_secs(300))
            .without_key_count();
        let snapshot = monitor.get_health().await;

        assert_eq!(snapshot.status, HealthStatus::Degraded);
        assert!(snapshot.key_count.is_none());
        assert!(monitor.is_healthy().await);
    }

    #[tokio::test]
    async fn test_periodic_probe_publishes_snapshots() {
        let connector = connector_with(MockBackend::new());
        connector.connect().await.unwrap();

        let monitor = Arc::new(HealthMonitor::new(
            connector,
            KeySpace::new("t:"),
            Duration::from_millis(20),
        ));
        let mut updates = monitor.subscribe();

        monitor.start();
        monitor.start();
        assert!(monitor.is_running());

        tokio::time::timeout(Duration::from_secs(2), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(updates.borrow().as_ref().unwrap().connected);

        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_zero_interval_keeps_monitor_running() {
        let connector = connector_with(MockBackend::new());
        connector.connect().await.unwrap();

        let monitor = Arc::new(HealthMonitor::new(connector, KeySpace::new("t:"), Duration::ZERO));
        let mut updates = monitor.subscribe();

        monitor.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_running());

        tokio::time::timeout(Duration::from_secs(3), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(updates.borrow().as_ref().unwrap().connected);

        monitor.stop();
    }
}
