//! Wiring of the tracker, persister and console presentation.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use headwatch_core::{
    AlertSink, Clock, DeviceEvents, DeviceStateTracker, HistoryStore, InboundEvent, Persister,
    PersisterStats, PumpReport, ScheduledTimerFactory, SubscriptionId, SystemClock, TrackerConfig,
    VolumeEvents, pump_events, raise_callback,
};
use headwatch_types::{DeviceDescriptor, VolumeChangeEvent};

use crate::indicator::{ConsoleIndicator, LogAlerts};

/// Outcome of [`Service::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections finalized by the drain.
    pub drained: usize,
    /// Persister counters after the writer stopped.
    pub persisted: PersisterStats,
}

/// A running tracker with its background writer and console output.
pub struct Service {
    tracker: Arc<DeviceStateTracker>,
    persister: Arc<Persister>,
    indicator: Arc<ConsoleIndicator>,
    alerts: Arc<LogAlerts>,
    clock: Arc<dyn Clock>,
    subscription: SubscriptionId,
}

impl Service {
    /// Start the service on the current tokio runtime.
    pub fn start(
        config: TrackerConfig,
        history: Arc<dyn HistoryStore>,
        indicator: Arc<ConsoleIndicator>,
    ) -> headwatch_core::Result<Self> {
        Self::start_with_clock(config, history, indicator, Arc::new(SystemClock))
    }

    /// Start the service with an explicit clock.
    pub fn start_with_clock(
        config: TrackerConfig,
        history: Arc<dyn HistoryStore>,
        indicator: Arc<ConsoleIndicator>,
        clock: Arc<dyn Clock>,
    ) -> headwatch_core::Result<Self> {
        let alerts = Arc::new(LogAlerts::new(config.alert_threshold));
        let alert_sink: Arc<dyn AlertSink> = alerts.clone();
        let timers = ScheduledTimerFactory::current(raise_callback(alert_sink.clone()))?;
        let persister = Arc::new(Persister::spawn_current(history)?);

        let tracker = DeviceStateTracker::builder()
            .config(config)
            .record_sink(persister.clone())
            .timer_factory(Arc::new(timers))
            .alerts(alert_sink)
            .refresh_hook(indicator.refresh_hook())
            .clock(Arc::clone(&clock))
            .build()?;
        let subscription = tracker.bus().subscribe(indicator.clone());

        info!(
            watching = tracker.config().duration_watching,
            threshold_secs = tracker.config().alert_threshold.as_secs(),
            "Tracker started"
        );

        Ok(Self {
            tracker: Arc::new(tracker),
            persister,
            indicator,
            alerts,
            clock,
            subscription,
        })
    }

    /// The tracker.
    pub fn tracker(&self) -> &Arc<DeviceStateTracker> {
        &self.tracker
    }

    /// The console indicator.
    pub fn indicator(&self) -> &Arc<ConsoleIndicator> {
        &self.indicator
    }

    /// The alert sink.
    pub fn alerts(&self) -> &Arc<LogAlerts> {
        &self.alerts
    }

    /// Persister counters.
    pub fn persister_stats(&self) -> PersisterStats {
        self.persister.stats()
    }

    /// Feed `events` to the tracker until the stream ends or `cancel` fires.
    pub async fn run<S>(&self, events: S, cancel: &CancellationToken) -> PumpReport
    where
        S: Stream<Item = InboundEvent>,
    {
        let router = EventRouter {
            tracker: &self.tracker,
            indicator: &self.indicator,
        };
        let report = pump_events(events, &router, cancel).await;
        info!(processed = report.processed, exit = ?report.exit, "Event source stopped");
        report
    }

    /// Finalize every active connection and wait for the writer to flush,
    /// giving up after `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownReport {
        let drained = self.tracker.drain_and_finalize(self.clock.now_millis());
        self.tracker.bus().unsubscribe(self.subscription);

        let persisted = self.persister.shutdown(timeout).await;
        if persisted.failed > 0 {
            warn!(failed = persisted.failed, "Some connections were not saved");
        }
        info!(
            drained = drained.len(),
            written = persisted.written,
            "Service stopped"
        );

        ShutdownReport {
            drained: drained.len(),
            persisted,
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("tracker", &self.tracker)
            .field("persister", &self.persister)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

/// Routes inbound events to the tracker, keeping the indicator's volume
/// current.
struct EventRouter<'a> {
    tracker: &'a DeviceStateTracker,
    indicator: &'a ConsoleIndicator,
}

impl DeviceEvents for EventRouter<'_> {
    fn devices_added(&self, devices: &[DeviceDescriptor]) {
        self.tracker.devices_added(devices);
    }

    fn devices_removed(&self, devices: &[DeviceDescriptor]) {
        self.tracker.devices_removed(devices);
    }
}

impl VolumeEvents for EventRouter<'_> {
    fn volume_changed(&self, event: &VolumeChangeEvent) {
        self.indicator.set_volume(event.percent);
        self.tracker.volume_changed(event);
    }
}
