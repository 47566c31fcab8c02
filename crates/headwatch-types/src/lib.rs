//! Platform-agnostic types for headwatch.
//!
//! This crate holds the data shared by the tracker, the history store and
//! presentation layers: device descriptors as reported by the host audio
//! subsystem, the connection session record and the per-day summary row.
//!
//! # Example
//!
//! ```
//! use headwatch_types::{ConnectionRecord, DeviceDescriptor};
//!
//! let device = DeviceDescriptor::new(" Buds ", 8);
//! let record = ConnectionRecord::open(device.identity(), device.category_code, 1000, "2024-05-01");
//! assert_eq!(record.finalize(5000).duration, Some(4000));
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    ConnectionRecord, DeviceCategory, DeviceDescriptor, DeviceSummary, VolumeChangeEvent,
    calendar_date, format_date, parse_date,
};
