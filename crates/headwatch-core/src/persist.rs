//! Background persistence of finalized records.
//!
//! Event handling never waits on storage. The tracker hands finalized
//! records to a [`RecordSink`]; the [`Persister`] forwards them over an
//! unbounded channel to one task that writes them to the
//! [`HistoryStore`] in submission order. A failed write is logged and the
//! record is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use headwatch_types::ConnectionRecord;

use crate::error::{Error, Result};
use crate::history::HistoryStore;

/// Accepts finalized records for asynchronous storage.
pub trait RecordSink: Send + Sync {
    /// Queue `record` for storage. Must not block on I/O.
    fn submit(&self, record: ConnectionRecord) -> Result<()>;
}

/// Counters reported by [`Persister::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersisterStats {
    /// Records accepted by `submit`.
    pub submitted: u64,
    /// Records the store accepted.
    pub written: u64,
    /// Records the store rejected.
    pub failed: u64,
}

impl PersisterStats {
    /// Records submitted but not yet written or failed.
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.written + self.failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PersisterStats {
        PersisterStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Channel-fed writer task in front of a [`HistoryStore`].
pub struct Persister {
    sender: Mutex<Option<mpsc::UnboundedSender<ConnectionRecord>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl Persister {
    /// Start the writer task on `runtime`.
    pub fn spawn(store: Arc<dyn HistoryStore>, runtime: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ConnectionRecord>();
        let counters = Arc::new(Counters::default());
        let task_counters = Arc::clone(&counters);

        let task = runtime.spawn(async move {
            while let Some(record) = receiver.recv().await {
                match store.insert(&record).await {
                    Ok(id) => {
                        task_counters.written.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            device = %record.device_name,
                            id,
                            duration_ms = record.duration.unwrap_or(0),
                            "Connection record stored"
                        );
                    }
                    Err(e) => {
                        task_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(device = %record.device_name, error = %e, "Failed to store connection record");
                    }
                }
            }
            debug!("Persister channel closed");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            task: Mutex::new(Some(task)),
            counters,
        }
    }

    /// Start the writer task on the runtime of the calling context.
    pub fn spawn_current(store: Arc<dyn HistoryStore>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
        Ok(Self::spawn(store, &runtime))
    }

    /// Current counters.
    pub fn stats(&self) -> PersisterStats {
        self.counters.snapshot()
    }

    /// Whether `submit` still accepts records.
    pub fn is_open(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop accepting records and wait for queued writes to finish.
    ///
    /// Waits at most `timeout`; if the store hangs the writer is left to
    /// finish on its own and the counters at that point are returned.
    /// Calling this again returns the counters immediately.
    pub async fn shutdown(&self, timeout: Duration) -> PersisterStats {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Persister task ended abnormally"),
                Err(_) => warn!(
                    timeout = ?timeout,
                    pending = self.stats().pending(),
                    "Timed out waiting for history writes"
                ),
            }
        }

        let stats = self.stats();
        info!(
            written = stats.written,
            failed = stats.failed,
            "Persister shut down"
        );
        stats
    }
}

impl RecordSink for Persister {
    fn submit(&self, record: ConnectionRecord) -> Result<()> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(Error::Shutdown)?;
        sender.send(record).map_err(|_| Error::Shutdown)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("open", &self.is_open())
            .field("stats", &self.stats())
            .finish()
    }
}
