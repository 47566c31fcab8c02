//! History store contract.
//!
//! The tracker only ever appends finalized records; presentation layers
//! read them back by calendar day, either as a timeline or aggregated per
//! device. [`MemoryHistory`] keeps everything in memory and is used for
//! tests and for runs without a database.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use headwatch_types::{ConnectionRecord, DeviceSummary};

use crate::error::StoreError;

/// Durable, append-only sink for finalized connection records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a finalized record and return the id it was stored under.
    async fn insert(&self, record: &ConnectionRecord) -> Result<i64, StoreError>;

    /// Records whose `date` equals `date`, oldest connection first.
    async fn query_by_date(&self, date: &str) -> Result<Vec<ConnectionRecord>, StoreError>;

    /// Per-device totals for `date`, longest total duration first.
    async fn query_summary_by_date(&self, date: &str) -> Result<Vec<DeviceSummary>, StoreError>;
}

/// Aggregate records into per-device summaries.
///
/// Ordering matches [`HistoryStore::query_summary_by_date`]: total duration
/// descending, then device name. The category of the latest session is
/// reported for each device.
pub fn summarize<'a, I>(records: I) -> Vec<DeviceSummary>
where
    I: IntoIterator<Item = &'a ConnectionRecord>,
{
    let mut by_name: HashMap<&str, (DeviceSummary, i64)> = HashMap::new();

    for record in records {
        let entry = by_name
            .entry(record.device_name.as_str())
            .or_insert_with(|| {
                (
                    DeviceSummary {
                        device_name: record.device_name.clone(),
                        device_type: record.device_type,
                        total_duration: 0,
                        count: 0,
                    },
                    i64::MIN,
                )
            });
        entry.0.total_duration += record.duration.unwrap_or(0);
        entry.0.count += 1;
        if record.connected_time >= entry.1 {
            entry.0.device_type = record.device_type;
            entry.1 = record.connected_time;
        }
    }

    let mut summaries: Vec<DeviceSummary> = by_name.into_values().map(|(s, _)| s).collect();
    summaries.sort_by(|a, b| {
        b.total_duration
            .cmp(&a.total_duration)
            .then_with(|| a.device_name.cmp(&b.device_name))
    });
    summaries
}

/// In-memory [`HistoryStore`].
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<ConnectionRecord>>,
}

impl MemoryHistory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record in insertion order.
    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn insert(&self, record: &ConnectionRecord) -> Result<i64, StoreError> {
        if record.is_active() {
            return Err(StoreError::NotFinalized(record.device_name.clone()));
        }

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let id = records.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = Some(id);
        records.push(stored);
        Ok(id)
    }

    async fn query_by_date(&self, date: &str) -> Result<Vec<ConnectionRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut day: Vec<ConnectionRecord> =
            records.iter().filter(|r| r.date == date).cloned().collect();
        day.sort_by_key(|r| (r.connected_time, r.id));
        Ok(day)
    }

    async fn query_summary_by_date(&self, date: &str) -> Result<Vec<DeviceSummary>, StoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(summarize(records.iter().filter(|r| r.date == date)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str, start: i64, end: i64, date: &str) -> ConnectionRecord {
        ConnectionRecord::open(name, 8, start, date).finalize(end)
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryHistory::new();
        let a = store.insert(&session("Buds", 0, 10, "2024-05-01")).await.unwrap();
        let b = store.insert(&session("Dock", 5, 20, "2024-05-01")).await.unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.records()[1].id, Some(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_active_record() {
        let store = MemoryHistory::new();
        let active = ConnectionRecord::open("Buds", 8, 0, "2024-05-01");
        let err = store.insert(&active).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFinalized(name) if name == "Buds"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_by_date_is_chronological() {
        let store = MemoryHistory::new();
        store.insert(&session("Dock", 500, 900, "2024-05-01")).await.unwrap();
        store.insert(&session("Buds", 100, 300, "2024-05-01")).await.unwrap();
        store.insert(&session("Buds", 100, 300, "2024-05-02")).await.unwrap();

        let day = store.query_by_date("2024-05-01").await.unwrap();
        let names: Vec<_> = day.iter().map(|r| r.device_name.as_str()).collect();
        assert_eq!(names, vec!["Buds", "Dock"]);
        assert!(store.query_by_date("2024-04-30").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summary_groups_by_device() {
        let store = MemoryHistory::new();
        store.insert(&session("Buds", 0, 1000, "2024-05-01")).await.unwrap();
        store.insert(&session("Dock", 0, 1500, "2024-05-01")).await.unwrap();
        store.insert(&session("Buds", 2000, 3000, "2024-05-01")).await.unwrap();
        store.insert(&session("Buds", 0, 9999, "2024-05-02")).await.unwrap();

        let summary = store.query_summary_by_date("2024-05-01").await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].device_name, "Buds");
        assert_eq!(summary[0].total_duration, 2000);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[1].device_name, "Dock");
        assert_eq!(summary[1].count, 1);
    }

    #[test]
    fn test_summarize_ties_break_on_name() {
        let records = vec![
            session("Zed", 0, 100, "d"),
            session("Alpha", 0, 100, "d"),
        ];
        let summary = summarize(&records);
        assert_eq!(summary[0].device_name, "Alpha");
        assert_eq!(summary[1].device_name, "Zed");
    }

    #[test]
    fn test_summarize_reports_latest_category() {
        let mut early = session("Buds", 0, 100, "d");
        early.device_type = 7;
        let late = session("Buds", 500, 600, "d");
        let summary = summarize([&late, &early]);
        assert_eq!(summary[0].device_type, 8);
    }
}
