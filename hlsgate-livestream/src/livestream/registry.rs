// Stream registry
//
// In-memory map of stream_id -> StreamInstance behind a reader/writer lock.
// The lock is only held for map edits; callers do their I/O outside of it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hlsgate_core::StreamStatus;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::instance::{StreamInstance, StreamPaths, StreamSnapshot};
use super::supervisor::WorkerHandle;
use crate::error::{StreamError, StreamResult};

#[derive(Default)]
struct Inner {
    streams: HashMap<String, StreamInstance>,
    /// IDs claimed by an in-flight Start, invisible to readers
    reserved: HashSet<String>,
}

#[derive(Default)]
pub struct StreamRegistry {
    inner: RwLock<Inner>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `stream_id` for a Start in progress.
    ///
    /// Fails with `AlreadyExists` if the ID is tracked or already reserved.
    /// The claim is released when the returned guard drops without `commit`.
    pub fn reserve(self: &Arc<Self>, stream_id: &str) -> StreamResult<Reservation> {
        let mut inner = self.inner.write();
        if inner.streams.contains_key(stream_id) || inner.reserved.contains(stream_id) {
            return Err(StreamError::AlreadyExists(stream_id.to_string()));
        }
        inner.reserved.insert(stream_id.to_string());
        drop(inner);

        debug!(stream_id = %stream_id, "Reserved stream id");
        Ok(Reservation {
            registry: Arc::clone(self),
            stream_id: stream_id.to_string(),
            committed: false,
        })
    }

    pub fn get(&self, stream_id: &str) -> Option<StreamSnapshot> {
        self.inner.read().streams.get(stream_id).map(StreamInstance::snapshot)
    }

    /// All tracked streams, ordered by stream_id.
    pub fn list(&self) -> Vec<StreamSnapshot> {
        let mut snapshots: Vec<_> = self
            .inner
            .read()
            .streams
            .values()
            .map(StreamInstance::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        snapshots
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.inner.read().streams.contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_with_status(&self, status: StreamStatus) -> usize {
        self.inner
            .read()
            .streams
            .values()
            .filter(|s| s.status() == status)
            .count()
    }

    /// Run `f` against the record under the write lock.
    ///
    /// `f` must not block; returns `None` if the stream is not tracked.
    pub fn with_instance_mut<R>(
        &self,
        stream_id: &str,
        f: impl FnOnce(&mut StreamInstance) -> R,
    ) -> Option<R> {
        self.inner.write().streams.get_mut(stream_id).map(f)
    }

    /// Explicit transition on a tracked record.
    #[cfg(any(test, feature = "test-util"))]
    pub fn transition(
        &self,
        stream_id: &str,
        next: StreamStatus,
    ) -> Option<super::instance::Transition> {
        self.with_instance_mut(stream_id, |instance| instance.transition(next, chrono::Utc::now()))
    }

    /// Mark the stream as stopping and hand its worker over to the caller.
    ///
    /// The record stays visible until `remove`. A stream that is absent or
    /// already being stopped yields `NotFound`.
    pub fn begin_stop(&self, stream_id: &str) -> StreamResult<StopTicket> {
        let mut inner = self.inner.write();
        let instance = inner
            .streams
            .get_mut(stream_id)
            .ok_or_else(|| StreamError::NotFound(stream_id.to_string()))?;

        let worker = instance
            .begin_stop()
            .ok_or_else(|| StreamError::NotFound(format!("{stream_id} (stop in progress)")))?;

        Ok(StopTicket {
            status: instance.status(),
            paths: instance.paths().clone(),
            monitor_token: instance.monitor_token(),
            worker,
        })
    }

    pub fn remove(&self, stream_id: &str) -> Option<StreamSnapshot> {
        self.inner
            .write()
            .streams
            .remove(stream_id)
            .map(|instance| instance.snapshot())
    }

    fn release(&self, stream_id: &str) {
        self.inner.write().reserved.remove(stream_id);
    }

    fn insert_reserved(&self, stream_id: &str, instance: StreamInstance) {
        let mut inner = self.inner.write();
        inner.reserved.remove(stream_id);
        inner.streams.insert(stream_id.to_string(), instance);
    }
}

/// Pending claim on a stream_id, see [`StreamRegistry::reserve`].
pub struct Reservation {
    registry: Arc<StreamRegistry>,
    stream_id: String,
    committed: bool,
}

impl Reservation {
    /// Publish the fully built record; it becomes visible to readers.
    pub fn commit(mut self, instance: StreamInstance) {
        self.registry.insert_reserved(&self.stream_id, instance);
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            debug!(stream_id = %self.stream_id, "Releasing uncommitted reservation");
            self.registry.release(&self.stream_id);
        }
    }
}

/// Everything Stop needs once the record is marked as stopping.
pub struct StopTicket {
    pub status: StreamStatus,
    pub paths: StreamPaths,
    pub monitor_token: CancellationToken,
    pub worker: Option<Box<dyn WorkerHandle>>,
}

/// Monotonic port counter. Ports are never handed out twice.
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU32,
}

impl PortAllocator {
    #[must_use]
    pub fn new(base_port: u16) -> Self {
        Self {
            next: AtomicU32::new(u32::from(base_port)),
        }
    }

    pub fn allocate(&self) -> StreamResult<u16> {
        let port = self.next.fetch_add(1, Ordering::SeqCst);
        u16::try_from(port)
            .map_err(|_| StreamError::Resource(format!("port range exhausted at {port}")))
    }
}
