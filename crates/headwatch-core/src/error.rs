//! Error types for headwatch-core.
//!
//! Most failures in the tracker are absorbed rather than returned: the
//! tracker keeps its in-memory state consistent and logs what went wrong.
//! The table below lists how each error is treated.
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`Error::TimerAlreadyArmed`] | [`DeviceTimer::start`](crate::DeviceTimer::start) | Bookkeeping bug; the tracker logs it at `error` |
//! | [`Error::InvalidConfig`] | [`TrackerConfig::validate`](crate::TrackerConfig::validate), builders | Returned to the caller; fix the configuration |
//! | [`Error::Store`] | [`HistoryStore`](crate::HistoryStore) implementations | Logged by the persister, never retried |
//! | [`Error::Shutdown`] | [`Persister`](crate::Persister) after shutdown | Record is dropped and logged |
//! | [`Error::NoRuntime`] | Constructors that need a tokio runtime | Returned to the caller |
//!
//! Duplicate add events and removals of unknown devices are not errors at
//! all; they are ignored.

use thiserror::Error;

/// Boxed error used to carry backend-specific failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by headwatch-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// `start()` was called on a timer that is still armed.
    #[error("Timer for '{device}' is already armed")]
    TimerAlreadyArmed {
        /// The device the timer belongs to.
        device: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// History store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A timestamp or date could not be converted.
    #[error(transparent)]
    Parse(#[from] headwatch_types::ParseError),

    /// The component has already shut down.
    #[error("Already shut down")]
    Shutdown,

    /// No tokio runtime was available to schedule background work.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

impl Error {
    /// Create a timer misuse error.
    pub fn timer_already_armed(device: impl Into<String>) -> Self {
        Self::TimerAlreadyArmed {
            device: device.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Errors reported by a [`HistoryStore`](crate::HistoryStore).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Writing a finalized record failed.
    #[error("Failed to write record for '{device}': {source}")]
    Write {
        /// Device the record belongs to.
        device: String,
        /// Backend error.
        #[source]
        source: BoxError,
    },

    /// A history query failed.
    #[error("Failed to query history for {date}: {source}")]
    Query {
        /// Date that was queried.
        date: String,
        /// Backend error.
        #[source]
        source: BoxError,
    },

    /// An active (not finalized) record was handed to the store.
    #[error("Record for '{0}' has not been finalized")]
    NotFinalized(String),

    /// The store cannot be reached at all.
    #[error("History store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Wrap a backend write failure.
    pub fn write(device: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Write {
            device: device.into(),
            source: source.into(),
        }
    }

    /// Wrap a backend query failure.
    pub fn query(date: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Query {
            date: date.into(),
            source: source.into(),
        }
    }
}

/// Result type alias using headwatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
