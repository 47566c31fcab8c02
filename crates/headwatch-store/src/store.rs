//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, Row};
use tracing::{debug, info};

use headwatch_types::{ConnectionRecord, DeviceSummary, parse_date};

use crate::error::{Error, Result};
use crate::queries::ConnectionQuery;
use crate::schema;

/// SQLite-based store for connection history.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening history database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Write operations
impl Store {
    /// Append a finalized connection record and return its row id.
    pub fn insert_connection(&self, record: &ConnectionRecord) -> Result<i64> {
        let disconnected = record
            .disconnected_time
            .ok_or_else(|| Error::NotFinalized(record.device_name.clone()))?;
        let duration = record
            .duration
            .unwrap_or(disconnected - record.connected_time);

        self.conn.execute(
            "INSERT INTO connections (device_name, device_type, connected_time,
             disconnected_time, duration, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.device_name,
                record.device_type,
                record.connected_time,
                disconnected,
                duration,
                record.date,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, device = %record.device_name, "Inserted connection");
        Ok(id)
    }
}

// Read operations
impl Store {
    /// Query connections with filters.
    pub fn query_connections(&self, query: &ConnectionQuery) -> Result<Vec<ConnectionRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_ref.as_slice(), row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Connections that started on `date`, oldest first.
    pub fn query_by_date(&self, date: &str) -> Result<Vec<ConnectionRecord>> {
        let date = validate_date(date)?;
        self.query_connections(&ConnectionQuery::new().date(date))
    }

    /// Per-device totals for `date`, longest total first, then by name.
    ///
    /// Each summary reports the category of the device's latest session
    /// that day.
    pub fn query_summary_by_date(&self, date: &str) -> Result<Vec<DeviceSummary>> {
        let date = validate_date(date)?;

        let mut stmt = self.conn.prepare(
            "SELECT c.device_name,
                    (SELECT l.device_type FROM connections l
                      WHERE l.device_name = c.device_name AND l.date = c.date
                      ORDER BY l.connected_time DESC, l.id DESC LIMIT 1),
                    SUM(c.duration),
                    COUNT(*)
             FROM connections c
             WHERE c.date = ?1
             GROUP BY c.device_name
             ORDER BY SUM(c.duration) DESC, c.device_name ASC",
        )?;

        let summaries = stmt
            .query_map([date], |row| {
                Ok(DeviceSummary {
                    device_name: row.get(0)?,
                    device_type: row.get(1)?,
                    total_duration: row.get(2)?,
                    count: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// Dates that have at least one connection, newest first.
    pub fn dates(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM connections ORDER BY date DESC")?;
        let dates = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    /// Count connections, optionally for one date.
    pub fn count_connections(&self, date: Option<&str>) -> Result<u64> {
        let count: i64 = match date {
            Some(date) => self.conn.query_row(
                "SELECT COUNT(*) FROM connections WHERE date = ?",
                [validate_date(date)?],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM connections", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Export one day's connections as a pretty-printed JSON array.
    pub fn export_json(&self, date: &str) -> Result<String> {
        let records = self.query_by_date(date)?;
        Ok(serde_json::to_string_pretty(&records)?)
    }
}

fn validate_date(date: &str) -> Result<&str> {
    let trimmed = date.trim();
    parse_date(trimmed).map_err(|_| Error::InvalidDate(date.to_string()))?;
    Ok(trimmed)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    Ok(ConnectionRecord {
        id: Some(row.get(0)?),
        device_name: row.get(1)?,
        device_type: row.get(2)?,
        connected_time: row.get(3)?,
        disconnected_time: Some(row.get(4)?),
        duration: Some(row.get(5)?),
        date: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str, device_type: i32, start: i64, end: i64, date: &str) -> ConnectionRecord {
        ConnectionRecord::open(name, device_type, start, date).finalize(end)
    }

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        for record in [
            session("Dock", 11, 5_000, 9_000, "2024-05-01"),
            session("Buds", 8, 1_000, 2_000, "2024-05-01"),
            session("Buds", 7, 3_000, 6_000, "2024-05-01"),
            session("Speaker", 8, 500, 700, "2024-05-02"),
        ] {
            store.insert_connection(&record).unwrap();
        }
        store
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_connections(None).unwrap(), 0);
        assert!(store.dates().unwrap().is_empty());
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .insert_connection(&session("Buds", 8, 0, 10, "2024-05-01"))
            .unwrap();
        let b = store
            .insert_connection(&session("Buds", 8, 20, 30, "2024-05-01"))
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_insert_rejects_active_record() {
        let store = Store::open_in_memory().unwrap();
        let active = ConnectionRecord::open("Buds", 8, 0, "2024-05-01");
        let err = store.insert_connection(&active).unwrap_err();
        assert!(matches!(err, Error::NotFinalized(name) if name == "Buds"));
        assert_eq!(store.count_connections(None).unwrap(), 0);
    }

    #[test]
    fn test_query_by_date_is_chronological() {
        let store = seeded();
        let day = store.query_by_date("2024-05-01").unwrap();

        let starts: Vec<i64> = day.iter().map(|r| r.connected_time).collect();
        assert_eq!(starts, vec![1_000, 3_000, 5_000]);
        assert!(day.iter().all(|r| r.id.is_some()));
        assert_eq!(day[2].duration, Some(4_000));
        assert_eq!(day[2].disconnected_time, Some(9_000));
    }

    #[test]
    fn test_query_summary_by_date() {
        let store = seeded();
        let summary = store.query_summary_by_date("2024-05-01").unwrap();

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].device_name, "Buds");
        assert_eq!(summary[0].total_duration, 4_000);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].device_type, 7);
        assert_eq!(summary[1].device_name, "Dock");
        assert_eq!(summary[1].total_duration, 4_000);
    }

    #[test]
    fn test_invalid_date_rejected() {
        let store = seeded();
        assert!(matches!(
            store.query_by_date("May 1st"),
            Err(Error::InvalidDate(_))
        ));
        assert!(matches!(
            store.count_connections(Some("2024-13-01")),
            Err(Error::InvalidDate(_))
        ));
    }

    #[test]
    fn test_dates_and_counts() {
        let store = seeded();
        assert_eq!(store.dates().unwrap(), vec!["2024-05-02", "2024-05-01"]);
        assert_eq!(store.count_connections(None).unwrap(), 4);
        assert_eq!(store.count_connections(Some("2024-05-01")).unwrap(), 3);
        assert_eq!(store.count_connections(Some("2024-04-30")).unwrap(), 0);
    }

    #[test]
    fn test_query_connections_by_device() {
        let store = seeded();
        let query = ConnectionQuery::new().device("Buds").newest_first().limit(1);
        let latest = store.query_connections(&query).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].connected_time, 3_000);
    }

    #[test]
    fn test_export_json() {
        let store = seeded();
        let json = store.export_json("2024-05-02").unwrap();
        let back: Vec<ConnectionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].device_name, "Speaker");
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .insert_connection(&session("Buds", 8, 0, 10, "2024-05-01"))
                .unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_connections(None).unwrap(), 1);
    }
}
