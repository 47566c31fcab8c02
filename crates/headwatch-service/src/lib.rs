//! Background connection tracker for audio devices.
//!
//! This crate provides a service that:
//! - Reads device and volume notifications from a platform bridge
//! - Tracks which audio peripherals are connected and for how long
//! - Logs an alert when a device stays connected past a threshold
//! - Stores every finished session in the local SQLite history
//! - Prints a status line whenever the connected set changes
//!
//! It also renders the stored history as daily timelines and summaries.
//!
//! # Event input
//!
//! Events arrive on stdin (or a file) as one JSON object per line:
//!
//! ```text
//! {"event":"added","devices":[{"display_name":"Buds","category_code":8}]}
//! {"event":"removed","devices":[{"display_name":"Buds","category_code":8}]}
//! {"event":"volume","percent":40}
//! ```
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/headwatch/service.toml`:
//!
//! ```toml
//! [tracker]
//! alert_threshold_secs = 3600
//! duration_watching = true
//! # host_model_name = "my-laptop"   # defaults to the hostname
//! # utc_offset_minutes = 60         # defaults to the local offset
//!
//! [storage]
//! path = "~/.local/share/headwatch/history.db"
//! ```

pub mod config;
pub mod history;
pub mod indicator;
pub mod report;
pub mod runtime;
pub mod source;
pub mod volume;

pub use config::{Config, ConfigError, StorageConfig, TrackerSection, ValidationError};
pub use history::SqliteHistory;
pub use indicator::{ConsoleIndicator, LogAlerts};
pub use runtime::{Service, ShutdownReport};
pub use source::{line_events, parse_line};
pub use volume::VolumeLevel;
