//! SQLite-backed history store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use headwatch_core::{HistoryStore, StoreError};
use headwatch_store::{Error as DbError, Store};
use headwatch_types::{ConnectionRecord, DeviceSummary};

/// [`HistoryStore`] over the SQLite [`Store`].
///
/// The store is shared with the report commands, so it lives behind an
/// async mutex.
#[derive(Clone)]
pub struct SqliteHistory {
    store: Arc<Mutex<Store>>,
}

impl SqliteHistory {
    /// Wrap an opened store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<Mutex<Store>> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn insert(&self, record: &ConnectionRecord) -> Result<i64, StoreError> {
        let store = self.store.lock().await;
        store.insert_connection(record).map_err(|e| match e {
            DbError::NotFinalized(device) => StoreError::NotFinalized(device),
            other => StoreError::write(record.device_name.clone(), other),
        })
    }

    async fn query_by_date(&self, date: &str) -> Result<Vec<ConnectionRecord>, StoreError> {
        let store = self.store.lock().await;
        store
            .query_by_date(date)
            .map_err(|e| StoreError::query(date, e))
    }

    async fn query_summary_by_date(&self, date: &str) -> Result<Vec<DeviceSummary>, StoreError> {
        let store = self.store.lock().await;
        store
            .query_summary_by_date(date)
            .map_err(|e| StoreError::query(date, e))
    }
}

impl std::fmt::Debug for SqliteHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistory").finish_non_exhaustive()
    }
}
