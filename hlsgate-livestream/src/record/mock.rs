use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use hlsgate_core::StreamStatus;
use parking_lot::Mutex;

use super::client::{RecordError, RecordedStream, StatusUpdate, SystemOfRecord};

/// In-memory system of record for tests and local runs.
///
/// Applies the same transition table as the real service, so a refused
/// transition comes back as `Rejected { status: 400 }`.
#[derive(Debug, Default)]
pub struct MockSystemOfRecord {
    records: Mutex<BTreeMap<String, StreamStatus>>,
    updates: Mutex<Vec<StatusUpdate>>,
    failing_queries: Mutex<HashSet<StreamStatus>>,
    fail_updates: AtomicBool,
    query_calls: AtomicU32,
}

impl MockSystemOfRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stream with a recorded status.
    pub fn with_stream(self, stream_id: &str, status: StreamStatus) -> Self {
        self.records.lock().insert(stream_id.to_string(), status);
        self
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries_for(&self, status: StreamStatus) {
        self.failing_queries.lock().insert(status);
    }

    pub fn status_of(&self, stream_id: &str) -> Option<StreamStatus> {
        self.records.lock().get(stream_id).copied()
    }

    /// Every accepted update, in arrival order.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().clone()
    }

    pub fn updates_for(&self, stream_id: &str) -> Vec<StreamStatus> {
        self.updates
            .lock()
            .iter()
            .filter(|u| u.stream_id == stream_id)
            .map(|u| u.status)
            .collect()
    }

    pub fn query_calls(&self) -> u32 {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SystemOfRecord for MockSystemOfRecord {
    async fn list_by_status(&self, status: StreamStatus) -> Result<Vec<RecordedStream>, RecordError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_queries.lock().contains(&status) {
            return Err(RecordError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        Ok(self
            .records
            .lock()
            .iter()
            .filter(|(_, s)| **s == status)
            .enumerate()
            .map(|(i, (stream_id, s))| RecordedStream {
                id: i as u64 + 1,
                stream_id: stream_id.clone(),
                name: stream_id.clone(),
                stream_status: s.as_str().to_string(),
            })
            .collect())
    }

    async fn update_status(&self, stream_id: &str, status: StreamStatus) -> Result<(), RecordError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RecordError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let mut records = self.records.lock();
        if let Some(current) = records.get(stream_id) {
            if !current.record_accepts(status) {
                return Err(RecordError::Rejected {
                    status: 400,
                    body: format!("invalid status transition from {current} to {status}"),
                });
            }
        }
        records.insert(stream_id.to_string(), status);
        drop(records);

        self.updates.lock().push(StatusUpdate {
            stream_id: stream_id.to_string(),
            status,
        });
        Ok(())
    }
}
