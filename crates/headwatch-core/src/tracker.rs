//! Device state tracking.
//!
//! [`DeviceStateTracker`] owns the map of active connections. Add and
//! remove notifications open and finalize [`ConnectionRecord`]s; finalized
//! records go to a [`RecordSink`] and every change is published on the
//! [`ChangeBus`]. While duration-watching is enabled, each active device
//! has a [`DeviceTimer`] that raises an alert once the connection exceeds
//! the configured threshold.
//!
//! All state lives behind one mutex. Bus delivery, record submission,
//! alert clearing and refresh requests happen after it is released, so
//! listeners may call back into the tracker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::UtcOffset;
use tracing::{debug, error, info, warn};

use headwatch_types::{ConnectionRecord, DeviceDescriptor, VolumeChangeEvent, calendar_date};

use crate::alerts::{AlertSink, NoAlerts};
use crate::bus::{ActiveSnapshot, ChangeBus};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::events::{DeviceEvents, VolumeEvents};
use crate::filter::{DeviceFilter, Verdict};
use crate::persist::RecordSink;
use crate::timer::{DeviceTimer, TimerFactory};

/// Hook asking the presentation layer to redraw.
pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Longest accepted alert threshold.
pub const MAX_ALERT_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tracker configuration, passed by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Connection length after which an alert is raised.
    pub alert_threshold: Duration,
    /// Whether per-device timers are armed.
    pub duration_watching: bool,
    /// Devices reported under this name are never tracked.
    pub host_model_name: Option<String>,
    /// Offset used to derive each record's calendar date.
    pub utc_offset: UtcOffset,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            alert_threshold: Duration::from_secs(60 * 60),
            duration_watching: false,
            host_model_name: None,
            utc_offset: UtcOffset::UTC,
        }
    }
}

impl TrackerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alert threshold.
    pub fn alert_threshold(mut self, threshold: Duration) -> Self {
        self.alert_threshold = threshold;
        self
    }

    /// Enable or disable duration-watching.
    pub fn duration_watching(mut self, enabled: bool) -> Self {
        self.duration_watching = enabled;
        self
    }

    /// Set the host model name to ignore.
    pub fn host_model_name(mut self, name: impl Into<String>) -> Self {
        self.host_model_name = Some(name.into());
        self
    }

    /// Set the offset used for calendar dates.
    pub fn utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// The alert threshold in milliseconds.
    pub fn alert_threshold_millis(&self) -> i64 {
        i64::try_from(self.alert_threshold.as_millis()).unwrap_or(i64::MAX)
    }

    /// Validate the configuration.
    ///
    /// Checks that the alert threshold is at least one millisecond and at
    /// most [`MAX_ALERT_THRESHOLD`].
    pub fn validate(&self) -> Result<()> {
        if self.alert_threshold < Duration::from_millis(1) {
            return Err(Error::invalid_config("alert_threshold must be > 0"));
        }
        if self.alert_threshold > MAX_ALERT_THRESHOLD {
            return Err(Error::invalid_config(
                "alert_threshold must be at most 7 days",
            ));
        }
        Ok(())
    }
}

struct TrackerState {
    config: TrackerConfig,
    filter: DeviceFilter,
    active: HashMap<String, ConnectionRecord>,
    timers: HashMap<String, Box<dyn DeviceTimer>>,
    revision: u64,
    drained: bool,
}

impl TrackerState {
    fn sorted_active(&self) -> Vec<ConnectionRecord> {
        let mut records: Vec<ConnectionRecord> = self.active.values().cloned().collect();
        sort_records(&mut records);
        records
    }

    fn bump(&mut self) -> ActiveSnapshot {
        self.revision += 1;
        ActiveSnapshot {
            revision: self.revision,
            connections: self.sorted_active(),
        }
    }

    fn stop_all_timers(&mut self) {
        for (_, mut timer) in self.timers.drain() {
            timer.stop();
        }
    }
}

fn sort_records(records: &mut [ConnectionRecord]) {
    records.sort_by(|a, b| {
        a.connected_time
            .cmp(&b.connected_time)
            .then_with(|| a.device_name.cmp(&b.device_name))
    });
}

/// Builder for [`DeviceStateTracker`].
///
/// A record sink and a timer factory are required; everything else has a
/// default.
#[derive(Default)]
pub struct TrackerBuilder {
    config: TrackerConfig,
    bus: Option<Arc<ChangeBus>>,
    sink: Option<Arc<dyn RecordSink>>,
    timers: Option<Arc<dyn TimerFactory>>,
    alerts: Option<Arc<dyn AlertSink>>,
    refresh: Option<RefreshHook>,
    clock: Option<Arc<dyn Clock>>,
}

impl TrackerBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish on an existing bus instead of a private one.
    pub fn bus(mut self, bus: Arc<ChangeBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Where finalized records go.
    pub fn record_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// How per-device timers are created.
    pub fn timer_factory(mut self, factory: Arc<dyn TimerFactory>) -> Self {
        self.timers = Some(factory);
        self
    }

    /// Where alert cancellations go.
    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Hook invoked once per add, remove or volume notification.
    pub fn refresh_hook(mut self, hook: RefreshHook) -> Self {
        self.refresh = Some(hook);
        self
    }

    /// Clock used for the [`DeviceEvents`] and [`VolumeEvents`] ports.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the tracker.
    pub fn build(self) -> Result<DeviceStateTracker> {
        self.config.validate()?;
        let sink = self
            .sink
            .ok_or_else(|| Error::invalid_config("a record sink is required"))?;
        let timers = self
            .timers
            .ok_or_else(|| Error::invalid_config("a timer factory is required"))?;

        let filter = DeviceFilter::new(self.config.host_model_name.as_deref());
        debug!(
            threshold = ?self.config.alert_threshold,
            watching = self.config.duration_watching,
            host_model = ?filter.host_model_name(),
            "Device state tracker created"
        );

        Ok(DeviceStateTracker {
            state: Mutex::new(TrackerState {
                config: self.config,
                filter,
                active: HashMap::new(),
                timers: HashMap::new(),
                revision: 0,
                drained: false,
            }),
            bus: self.bus.unwrap_or_default(),
            sink,
            timers,
            alerts: self.alerts.unwrap_or_else(|| Arc::new(NoAlerts)),
            refresh: self.refresh,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

/// Tracks which audio devices are connected and for how long.
pub struct DeviceStateTracker {
    state: Mutex<TrackerState>,
    bus: Arc<ChangeBus>,
    sink: Arc<dyn RecordSink>,
    timers: Arc<dyn TimerFactory>,
    alerts: Arc<dyn AlertSink>,
    refresh: Option<RefreshHook>,
    clock: Arc<dyn Clock>,
}

impl DeviceStateTracker {
    /// Start building a tracker.
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// The bus this tracker publishes on.
    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> TrackerConfig {
        self.lock().config.clone()
    }

    /// Handle devices reported as connected at `now` (ms since epoch).
    ///
    /// Returns the records opened by this call. Filtered devices and
    /// devices that are already active are skipped.
    pub fn on_devices_added(
        &self,
        devices: &[DeviceDescriptor],
        now: i64,
    ) -> Vec<ConnectionRecord> {
        let mut opened = Vec::new();
        let mut published = Vec::new();
        {
            let mut state = self.lock();
            if state.drained {
                warn!(count = devices.len(), "Tracker is drained; ignoring added devices");
                return opened;
            }

            let date = match calendar_date(now, state.config.utc_offset) {
                Ok(date) => date,
                Err(e) => {
                    error!(now, error = %e, "Cannot date connection; ignoring added devices");
                    return opened;
                }
            };

            for device in devices {
                let name = match state.filter.classify(device) {
                    Verdict::Track(name) => name,
                    verdict => {
                        debug!(device = %device.display_name, ?verdict, "Device not tracked");
                        continue;
                    }
                };
                if state.active.contains_key(name) {
                    debug!(device = %name, "Device already active");
                    continue;
                }

                let record =
                    ConnectionRecord::open(name, device.category_code, now, date.as_str());
                state.active.insert(name.to_string(), record.clone());
                published.push(state.bump());
                info!(device = %name, category = %record.category(), "Device connected");
                opened.push(record);
            }

            if state.config.duration_watching {
                self.arm_missing_timers(&mut state);
            }
        }

        for snapshot in &published {
            self.publish(snapshot);
        }
        self.request_refresh();
        opened
    }

    /// Handle devices reported as disconnected at `now` (ms since epoch).
    ///
    /// Returns the finalized records, which have also been submitted to
    /// the record sink. Devices that are not active are skipped.
    pub fn on_devices_removed(
        &self,
        devices: &[DeviceDescriptor],
        now: i64,
    ) -> Vec<ConnectionRecord> {
        let mut finalized = Vec::new();
        let mut published = Vec::new();
        let mut long_sessions = Vec::new();
        {
            let mut state = self.lock();
            let threshold = state.config.alert_threshold_millis();

            for device in devices {
                let name = device.identity();
                let Some(record) = state.active.remove(name) else {
                    debug!(device = %name, "Removed device was not active");
                    continue;
                };
                if let Some(mut timer) = state.timers.remove(name) {
                    timer.stop();
                }

                let done = record.finalize(now);
                let duration = done.duration.unwrap_or(0);
                published.push(state.bump());
                info!(device = %name, duration_ms = duration, "Device disconnected");
                if duration > threshold {
                    long_sessions.push(done.device_name.clone());
                }
                finalized.push(done);
            }
        }

        self.submit_all(&finalized);
        for snapshot in &published {
            self.publish(snapshot);
        }
        for name in &long_sessions {
            self.alerts.clear(name);
        }
        self.request_refresh();
        finalized
    }

    /// Finalize every active connection at `now` and stop all timers.
    ///
    /// After this call the tracker admits no new connections. Calling it
    /// again returns an empty list.
    pub fn drain_and_finalize(&self, now: i64) -> Vec<ConnectionRecord> {
        let (finalized, snapshot, threshold) = {
            let mut state = self.lock();
            if state.drained {
                debug!("Tracker already drained");
                return Vec::new();
            }
            state.drained = true;
            state.stop_all_timers();

            let mut finalized: Vec<ConnectionRecord> = state
                .active
                .drain()
                .map(|(_, record)| record.finalize(now))
                .collect();
            sort_records(&mut finalized);

            let snapshot = (!finalized.is_empty()).then(|| state.bump());
            (finalized, snapshot, state.config.alert_threshold_millis())
        };

        self.submit_all(&finalized);
        if let Some(snapshot) = &snapshot {
            self.publish(snapshot);
        }
        for record in &finalized {
            if record.duration.unwrap_or(0) > threshold {
                self.alerts.clear(&record.device_name);
            }
        }
        info!(count = finalized.len(), "Tracker drained");
        finalized
    }

    /// Active connections ordered by connection time, then name.
    pub fn snapshot(&self) -> Vec<ConnectionRecord> {
        self.lock().sorted_active()
    }

    /// Active connections with the current revision.
    pub fn current_snapshot(&self) -> ActiveSnapshot {
        let state = self.lock();
        ActiveSnapshot {
            revision: state.revision,
            connections: state.sorted_active(),
        }
    }

    /// Handle a volume change. Only triggers a refresh.
    pub fn on_volume_changed(&self, event: &VolumeChangeEvent) {
        debug!(percent = ?event.percent, "Volume changed");
        self.request_refresh();
    }

    /// Replace the configuration.
    ///
    /// Turning duration-watching off stops and drops every timer; turning
    /// it on arms timers for the devices already active. Timers that are
    /// already armed keep their original delay.
    pub fn update_config(&self, config: TrackerConfig) -> Result<()> {
        config.validate()?;

        let mut state = self.lock();
        let was_watching = state.config.duration_watching;
        state.filter = DeviceFilter::new(config.host_model_name.as_deref());
        state.config = config;

        match (was_watching, state.config.duration_watching) {
            (true, false) => {
                state.stop_all_timers();
                info!("Duration watching disabled");
            }
            (false, true) => {
                self.arm_missing_timers(&mut state);
                info!(armed = state.timers.len(), "Duration watching enabled");
            }
            _ => debug!("Tracker configuration updated"),
        }
        Ok(())
    }

    /// Whether the tracker still admits connections.
    pub fn is_running(&self) -> bool {
        !self.lock().drained
    }

    /// Number of active connections.
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Whether `device_name` (trimmed) is active.
    pub fn is_active(&self, device_name: &str) -> bool {
        self.lock().active.contains_key(device_name.trim())
    }

    /// Number of devices with a timer.
    pub fn timer_count(&self) -> usize {
        self.lock().timers.len()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm_missing_timers(&self, state: &mut TrackerState) {
        let delay = state.config.alert_threshold;
        let TrackerState { active, timers, .. } = state;

        for name in active.keys() {
            if timers.contains_key(name) {
                continue;
            }
            let mut timer = self.timers.create(name, delay);
            if let Err(e) = timer.start() {
                error!(device = %name, error = %e, "Failed to arm duration timer");
            }
            timers.insert(name.clone(), timer);
        }
    }

    fn submit_all(&self, records: &[ConnectionRecord]) {
        for record in records {
            if let Err(e) = self.sink.submit(record.clone()) {
                warn!(device = %record.device_name, error = %e, "Dropping finalized record");
            }
        }
    }

    fn publish(&self, snapshot: &ActiveSnapshot) {
        for failure in self.bus.publish(snapshot) {
            warn!(revision = snapshot.revision, "{}", failure);
        }
    }

    fn request_refresh(&self) {
        if let Some(refresh) = &self.refresh {
            refresh();
        }
    }
}

impl DeviceEvents for DeviceStateTracker {
    fn devices_added(&self, devices: &[DeviceDescriptor]) {
        self.on_devices_added(devices, self.clock.now_millis());
    }

    fn devices_removed(&self, devices: &[DeviceDescriptor]) {
        self.on_devices_removed(devices, self.clock.now_millis());
    }
}

impl VolumeEvents for DeviceStateTracker {
    fn volume_changed(&self, event: &VolumeChangeEvent) {
        self.on_volume_changed(event);
    }
}

impl std::fmt::Debug for DeviceStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("DeviceStateTracker")
            .field("active", &state.active.len())
            .field("timers", &state.timers.len())
            .field("revision", &state.revision)
            .field("drained", &state.drained)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        CollectingListener, ManualClock, MockTimerFactory, RecordingAlerts, RecordingSink,
        RefreshCounter,
    };

    struct Fixture {
        tracker: DeviceStateTracker,
        sink: Arc<RecordingSink>,
        timers: Arc<MockTimerFactory>,
        alerts: Arc<RecordingAlerts>,
        listener: Arc<CollectingListener>,
        refreshes: RefreshCounter,
    }

    fn fixture(config: TrackerConfig) -> Fixture {
        let sink = Arc::new(RecordingSink::new());
        let timers = Arc::new(MockTimerFactory::new());
        let alerts = Arc::new(RecordingAlerts::new());
        let listener = Arc::new(CollectingListener::new());
        let refreshes = RefreshCounter::new();

        let tracker = DeviceStateTracker::builder()
            .config(config)
            .record_sink(sink.clone())
            .timer_factory(timers.clone())
            .alerts(alerts.clone())
            .refresh_hook(refreshes.hook())
            .build()
            .unwrap();
        tracker.bus().subscribe(listener.clone());

        Fixture {
            tracker,
            sink,
            timers,
            alerts,
            listener,
            refreshes,
        }
    }

    fn buds() -> DeviceDescriptor {
        DeviceDescriptor::new("Buds", 8)
    }

    #[test]
    fn test_add_then_remove_persists_duration() {
        let f = fixture(TrackerConfig::default());

        let opened = f.tracker.on_devices_added(&[buds()], 1000);
        assert_eq!(opened.len(), 1);
        assert!(f.tracker.is_active("Buds"));

        let done = f.tracker.on_devices_removed(&[buds()], 5000);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].duration, Some(4000));
        assert_eq!(done[0].disconnected_time, Some(5000));
        assert_eq!(f.tracker.active_count(), 0);

        let stored = f.sink.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].device_name, "Buds");
        assert_eq!(stored[0].connected_time, 1000);
        assert_eq!(stored[0].duration, Some(4000));
        assert_eq!(stored[0].date, "1970-01-01");
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let f = fixture(TrackerConfig::default().duration_watching(true));

        f.tracker.on_devices_added(&[buds()], 1000);
        let second = f.tracker.on_devices_added(&[DeviceDescriptor::new(" Buds ", 8)], 2000);

        assert!(second.is_empty());
        assert_eq!(f.tracker.active_count(), 1);
        assert_eq!(f.tracker.snapshot()[0].connected_time, 1000);
        assert_eq!(f.timers.created_count(), 1);
        assert_eq!(f.listener.count(), 1);
    }

    #[test]
    fn test_builtin_and_host_devices_ignored() {
        let f = fixture(TrackerConfig::default().host_model_name("Pixel 8"));

        let opened = f.tracker.on_devices_added(
            &[
                DeviceDescriptor::new("Earpiece", 1),
                DeviceDescriptor::new("Speaker", 2),
                DeviceDescriptor::new("Pixel 8", 8),
                DeviceDescriptor::new("   ", 8),
            ],
            1000,
        );

        assert!(opened.is_empty());
        assert_eq!(f.tracker.active_count(), 0);
        assert_eq!(f.listener.count(), 0);
        assert_eq!(f.refreshes.count(), 1);

        f.tracker
            .on_devices_removed(&[DeviceDescriptor::new("Pixel 8", 8)], 2000);
        assert!(f.sink.records().is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let f = fixture(TrackerConfig::default());
        let done = f.tracker.on_devices_removed(&[buds()], 1000);
        assert!(done.is_empty());
        assert!(f.sink.records().is_empty());
        assert_eq!(f.listener.count(), 0);
        assert_eq!(f.refreshes.count(), 1);
    }

    #[test]
    fn test_one_refresh_per_call_and_one_publish_per_change() {
        let f = fixture(TrackerConfig::default());
        let devices = [
            DeviceDescriptor::new("Buds", 8),
            DeviceDescriptor::new("Dock", 11),
            DeviceDescriptor::new("Speaker", 2),
        ];

        f.tracker.on_devices_added(&devices, 1000);
        assert_eq!(f.refreshes.count(), 1);
        assert_eq!(f.listener.count(), 2);

        let revisions: Vec<u64> = f.listener.snapshots().iter().map(|s| s.revision).collect();
        assert_eq!(revisions, vec![1, 2]);
        assert_eq!(f.listener.last().unwrap().device_names(), vec!["Buds", "Dock"]);
    }

    #[test]
    fn test_watching_arms_and_remove_stops_timer() {
        let f = fixture(
            TrackerConfig::default()
                .duration_watching(true)
                .alert_threshold(Duration::from_secs(10)),
        );

        f.tracker.on_devices_added(&[buds()], 0);
        assert!(f.timers.is_armed("Buds"));
        assert_eq!(f.timers.delays(), vec![Duration::from_secs(10)]);
        assert_eq!(f.tracker.timer_count(), 1);

        f.tracker.on_devices_removed(&[buds()], 3000);
        assert!(!f.timers.is_armed("Buds"));
        assert_eq!(f.tracker.timer_count(), 0);
        assert!(f.alerts.cleared().is_empty());
    }

    #[test]
    fn test_long_session_clears_alert() {
        let f = fixture(
            TrackerConfig::default()
                .duration_watching(true)
                .alert_threshold(Duration::from_secs(10)),
        );

        f.tracker.on_devices_added(&[buds()], 0);
        f.tracker.on_devices_removed(&[buds()], 10_001);
        assert_eq!(f.alerts.cleared(), vec!["Buds".to_string()]);
    }

    #[test]
    fn test_session_at_threshold_does_not_clear_alert() {
        let f = fixture(TrackerConfig::default().alert_threshold(Duration::from_secs(10)));
        f.tracker.on_devices_added(&[buds()], 0);
        f.tracker.on_devices_removed(&[buds()], 10_000);
        assert!(f.alerts.cleared().is_empty());
    }

    #[test]
    fn test_drain_finalizes_everything_once() {
        let f = fixture(TrackerConfig::default().duration_watching(true));
        f.tracker.on_devices_added(&[buds()], 1000);
        f.tracker
            .on_devices_added(&[DeviceDescriptor::new("Dock", 11)], 2000);
        let published_before = f.listener.count();

        let drained = f.tracker.drain_and_finalize(9000);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].device_name, "Buds");
        assert_eq!(drained[0].duration, Some(8000));
        assert_eq!(drained[1].duration, Some(7000));
        assert_eq!(f.sink.records().len(), 2);
        assert_eq!(f.tracker.active_count(), 0);
        assert_eq!(f.timers.armed_count(), 0);
        assert!(!f.tracker.is_running());
        assert_eq!(f.listener.count(), published_before + 1);
        assert!(f.listener.last().unwrap().is_empty());

        assert!(f.tracker.drain_and_finalize(10_000).is_empty());
        assert_eq!(f.sink.records().len(), 2);

        assert!(f.tracker.on_devices_added(&[buds()], 11_000).is_empty());
        assert_eq!(f.tracker.active_count(), 0);
    }

    #[test]
    fn test_drain_on_empty_tracker() {
        let f = fixture(TrackerConfig::default());
        assert!(f.tracker.drain_and_finalize(1000).is_empty());
        assert_eq!(f.listener.count(), 0);
        assert!(!f.tracker.is_running());
    }

    #[test]
    fn test_update_config_toggles_timers() {
        let f = fixture(TrackerConfig::default());
        f.tracker.on_devices_added(&[buds()], 0);
        assert_eq!(f.timers.created_count(), 0);

        f.tracker
            .update_config(TrackerConfig::default().duration_watching(true))
            .unwrap();
        assert!(f.timers.is_armed("Buds"));

        f.tracker.update_config(TrackerConfig::default()).unwrap();
        assert_eq!(f.timers.armed_count(), 0);
        assert_eq!(f.tracker.timer_count(), 0);
        assert!(!f.tracker.config().duration_watching);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let f = fixture(TrackerConfig::default());
        let err = f
            .tracker
            .update_config(TrackerConfig::default().alert_threshold(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(f.tracker.config(), TrackerConfig::default());
    }

    #[test]
    fn test_update_config_changes_host_filter() {
        let f = fixture(TrackerConfig::default());
        f.tracker
            .update_config(TrackerConfig::default().host_model_name("Dock"))
            .unwrap();
        f.tracker
            .on_devices_added(&[DeviceDescriptor::new("Dock", 11)], 0);
        assert_eq!(f.tracker.active_count(), 0);
    }

    #[test]
    fn test_timer_fire_does_not_end_session() {
        let f = fixture(TrackerConfig::default().duration_watching(true));
        f.tracker.on_devices_added(&[buds()], 0);
        assert!(f.timers.fire("Buds"));
        assert!(f.tracker.is_active("Buds"));

        // A fired timer is not rearmed by later adds.
        f.tracker
            .on_devices_added(&[DeviceDescriptor::new("Dock", 11)], 10);
        assert_eq!(f.timers.created_count(), 2);
        assert!(!f.timers.is_armed("Buds"));
    }

    #[test]
    fn test_calendar_date_uses_offset() {
        let f = fixture(TrackerConfig::default().utc_offset(time::macros::offset!(+2)));
        // 1970-01-01T23:00:00Z
        let opened = f.tracker.on_devices_added(&[buds()], 23 * 3_600_000);
        assert_eq!(opened[0].date, "1970-01-02");
    }

    #[test]
    fn test_volume_only_refreshes() {
        let f = fixture(TrackerConfig::default());
        f.tracker
            .on_volume_changed(&VolumeChangeEvent { percent: Some(40) });
        assert_eq!(f.refreshes.count(), 1);
        assert_eq!(f.listener.count(), 0);
    }

    #[test]
    fn test_event_ports_use_clock() {
        let clock = Arc::new(ManualClock::new(1_000));
        let sink = Arc::new(RecordingSink::new());
        let tracker = DeviceStateTracker::builder()
            .record_sink(sink.clone())
            .timer_factory(Arc::new(MockTimerFactory::new()))
            .clock(clock.clone())
            .build()
            .unwrap();

        tracker.devices_added(&[buds()]);
        clock.advance(2_500);
        tracker.devices_removed(&[buds()]);

        assert_eq!(sink.records()[0].duration, Some(2_500));
    }

    #[test]
    fn test_listener_can_read_tracker() {
        let f = fixture(TrackerConfig::default());
        let tracker = Arc::new(f.tracker);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = Arc::clone(&tracker);
        let seen_by_listener = Arc::clone(&seen);
        tracker
            .bus()
            .subscribe(Arc::new(move |_: &ActiveSnapshot| -> crate::bus::ListenerResult {
                seen_by_listener
                    .lock()
                    .unwrap()
                    .push(reader.active_count());
                Ok(())
            }));

        tracker.on_devices_added(&[buds()], 0);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_sink_failure_keeps_state_consistent() {
        let f = fixture(TrackerConfig::default());
        f.sink.close();
        f.tracker.on_devices_added(&[buds()], 0);
        let done = f.tracker.on_devices_removed(&[buds()], 100);
        assert_eq!(done.len(), 1);
        assert_eq!(f.tracker.active_count(), 0);
        assert!(f.sink.records().is_empty());
    }

    #[test]
    fn test_builder_requires_sink_and_timers() {
        let err = DeviceStateTracker::builder()
            .timer_factory(Arc::new(MockTimerFactory::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("record sink"));

        let err = DeviceStateTracker::builder()
            .record_sink(Arc::new(RecordingSink::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timer factory"));
    }

    #[test]
    fn test_config_validate() {
        assert!(TrackerConfig::default().validate().is_ok());
        assert!(
            TrackerConfig::default()
                .alert_threshold(MAX_ALERT_THRESHOLD + Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert_eq!(
            TrackerConfig::default()
                .alert_threshold(Duration::from_secs(2))
                .alert_threshold_millis(),
            2000
        );
    }
}
