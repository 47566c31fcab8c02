//! SQLite persistence for headwatch connection history.
//!
//! Every finalized connection session becomes one row in the
//! `connections` table. Rows are keyed by the calendar day the session
//! started on, which is what the history views query by.
//!
//! # Features
//!
//! - Append finalized connection records
//! - Timeline of one day, oldest session first
//! - Per-device totals for one day, longest first
//! - Days with history, and JSON export of one day
//!
//! # Example
//!
//! ```no_run
//! use headwatch_store::{ConnectionQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! // Last ten sessions of one device
//! let query = ConnectionQuery::new().device("Buds").newest_first().limit(10);
//! let sessions = store.query_connections(&query)?;
//! # Ok::<(), headwatch_store::Error>(())
//! ```

mod error;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use queries::ConnectionQuery;
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/headwatch/history.db`
/// - macOS: `~/Library/Application Support/headwatch/history.db`
/// - Windows: `C:\Users\<user>\AppData\Local\headwatch\history.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("headwatch")
        .join("history.db")
}
