//! Connection tracking for audio peripherals.
//!
//! This crate keeps track of which external audio devices (headsets,
//! Bluetooth speakers, USB DACs and so on) are connected, turns each
//! connection into a [`ConnectionRecord`] with a measured duration, and
//! hands finalized records to a [`HistoryStore`].
//!
//! # Components
//!
//! - [`DeviceStateTracker`]: the active-connection map, driven by add and
//!   remove notifications.
//! - [`DeviceTimer`] / [`ScheduledTimer`]: per-device alarms that raise a
//!   long-connection alert while duration-watching is enabled.
//! - [`ChangeBus`]: synchronous fan-out of active-set snapshots to
//!   presentation layers.
//! - [`HistoryStore`] / [`Persister`]: the storage contract and the
//!   background writer that keeps storage off the event path.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use headwatch_core::mock::{MockTimerFactory, RecordingSink};
//! use headwatch_core::{DeviceStateTracker, TrackerConfig};
//! use headwatch_types::DeviceDescriptor;
//!
//! let sink = Arc::new(RecordingSink::new());
//! let tracker = DeviceStateTracker::builder()
//!     .config(TrackerConfig::default())
//!     .record_sink(sink.clone())
//!     .timer_factory(Arc::new(MockTimerFactory::new()))
//!     .build()
//!     .unwrap();
//!
//! let buds = DeviceDescriptor::new("Buds", 8);
//! tracker.on_devices_added(&[buds.clone()], 1_000);
//! tracker.on_devices_removed(&[buds], 5_000);
//!
//! assert_eq!(sink.records()[0].duration, Some(4_000));
//! ```

pub mod alerts;
pub mod bus;
pub mod clock;
pub mod error;
pub mod events;
pub mod filter;
pub mod history;
pub mod mock;
pub mod persist;
pub mod timer;
pub mod tracker;

// Core exports
pub use alerts::{AlertSink, NoAlerts, raise_callback};
pub use bus::{
    ActiveSnapshot, ChangeBus, ChangeListener, FailureKind, ListenerFailure, ListenerResult,
    SubscriptionId,
};
pub use clock::{Clock, SystemClock};
pub use error::{BoxError, Error, Result, StoreError};
pub use events::{DeviceEvents, InboundEvent, PumpExit, PumpReport, VolumeEvents, pump_events};
pub use filter::{DeviceFilter, Verdict};
pub use history::{HistoryStore, MemoryHistory, summarize};
pub use persist::{Persister, PersisterStats, RecordSink};
pub use timer::{AlertCallback, DeviceTimer, ScheduledTimer, ScheduledTimerFactory, TimerFactory};
pub use tracker::{DeviceStateTracker, RefreshHook, TrackerBuilder, TrackerConfig};

// Re-export from headwatch-types
pub use headwatch_types::{
    ConnectionRecord, DeviceCategory, DeviceDescriptor, DeviceSummary, VolumeChangeEvent,
};
