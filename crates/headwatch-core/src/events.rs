//! Inbound notification ports.
//!
//! Platform adapters translate host notifications into calls on
//! [`DeviceEvents`] and [`VolumeEvents`]. Adapters that produce a stream
//! of [`InboundEvent`]s can drive a target with [`pump_events`].

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use headwatch_types::{DeviceDescriptor, VolumeChangeEvent};

/// Receives device add/remove notifications.
pub trait DeviceEvents: Send + Sync {
    /// Devices were connected.
    fn devices_added(&self, devices: &[DeviceDescriptor]);

    /// Devices were disconnected.
    fn devices_removed(&self, devices: &[DeviceDescriptor]);
}

/// Receives volume notifications.
pub trait VolumeEvents: Send + Sync {
    /// The output volume changed.
    fn volume_changed(&self, event: &VolumeChangeEvent);
}

/// A host notification as carried on the wire.
///
/// Serialized with an `event` tag:
///
/// ```json
/// {"event":"added","devices":[{"display_name":"Buds","category_code":8}]}
/// {"event":"removed","devices":[{"display_name":"Buds","category_code":8}]}
/// {"event":"volume","percent":40}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Devices were connected.
    Added {
        /// The connected devices.
        devices: Vec<DeviceDescriptor>,
    },
    /// Devices were disconnected.
    Removed {
        /// The disconnected devices.
        devices: Vec<DeviceDescriptor>,
    },
    /// The output volume changed.
    Volume {
        /// New volume in percent, if known.
        #[serde(default)]
        percent: Option<u8>,
    },
}

impl InboundEvent {
    /// Short name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::Volume { .. } => "volume",
        }
    }
}

/// Deliver one event to `target`.
pub fn dispatch<T>(event: &InboundEvent, target: &T)
where
    T: DeviceEvents + VolumeEvents + ?Sized,
{
    match event {
        InboundEvent::Added { devices } => target.devices_added(devices),
        InboundEvent::Removed { devices } => target.devices_removed(devices),
        InboundEvent::Volume { percent } => {
            target.volume_changed(&VolumeChangeEvent { percent: *percent })
        }
    }
}

/// Why [`pump_events`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The stream ended.
    SourceClosed,
    /// The cancellation token fired.
    Cancelled,
}

/// Outcome of [`pump_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    /// Number of events delivered.
    pub processed: u64,
    /// Why the pump stopped.
    pub exit: PumpExit,
}

/// Feed every event from `events` to `target` until the stream ends or
/// `cancel` fires.
pub async fn pump_events<S, T>(events: S, target: &T, cancel: &CancellationToken) -> PumpReport
where
    S: Stream<Item = InboundEvent>,
    T: DeviceEvents + VolumeEvents + ?Sized,
{
    let mut events = std::pin::pin!(events);
    let mut processed = 0;

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            next = events.next() => match next {
                Some(event) => {
                    debug!(kind = event.kind(), "Dispatching event");
                    dispatch(&event, target);
                    processed += 1;
                }
                None => break PumpExit::SourceClosed,
            },
        }
    };

    PumpReport { processed, exit }
}
