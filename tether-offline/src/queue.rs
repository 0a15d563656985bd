//! Offline request queue
//!
//! Requests issued while the API is unreachable are buffered here, bounded by
//! `max_queue_size`, and replayed in FIFO order by [`OfflineRequestQueue::drain`]
//! once connectivity returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_config::QueueConfig;
use tether_http::{HttpMethod, HttpRequest};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A request waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    /// Breaker category of the originating operation
    pub category: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<JsonValue>,
    /// Failed replays so far
    pub retries: u32,
    pub max_retries: u32,
}

impl QueuedRequest {
    pub fn new(category: impl Into<String>, request: HttpRequest, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            category: category.into(),
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
            retries: 0,
            max_retries,
        }
    }

    /// Rebuild the HTTP request this entry was created from
    pub fn to_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Outcome of accepting a request into the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    pub id: Uuid,
    /// Oldest entry evicted to make room, if any
    pub dropped: Option<Uuid>,
}

/// The queue was full and its oldest entry was discarded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Offline queue full ({max_size} entries); dropped oldest request {dropped}")]
pub struct QueueOverflowError {
    pub dropped: Uuid,
    pub max_size: usize,
}

/// A replay attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Replay failed: {0}")]
pub struct ReplayError(pub String);

impl ReplayError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Totals for one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub succeeded: usize,
    pub requeued: usize,
    /// Entries discarded after exhausting their retries
    pub failed: usize,
    pub remaining: usize,
}

/// Sends a queued request again
#[async_trait]
pub trait RequestReplayer: Send + Sync {
    async fn replay(&self, request: &QueuedRequest) -> Result<(), ReplayError>;
}

/// Hooks for queue events; the queue logs them regardless
pub trait QueueObserver: Send + Sync {
    fn on_overflow(&self, _error: &QueueOverflowError) {}

    fn on_drain(&self, _report: &DrainReport) {}
}

/// Bounded FIFO of requests awaiting replay
pub struct OfflineRequestQueue {
    entries: Mutex<VecDeque<QueuedRequest>>,
    max_size: usize,
    max_retries: u32,
    replay_delay: Duration,
    syncing: AtomicBool,
    observer: Option<Arc<dyn QueueObserver>>,
}

impl std::fmt::Debug for OfflineRequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineRequestQueue")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("max_retries", &self.max_retries)
            .field("replay_delay", &self.replay_delay)
            .field("syncing", &self.is_syncing())
            .finish()
    }
}

impl Default for OfflineRequestQueue {
    fn default() -> Self {
        Self::new(&QueueConfig::default())
    }
}

impl OfflineRequestQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_size: config.max_queue_size.max(1),
            max_retries: config.max_retries,
            replay_delay: config.replay_delay,
            syncing: AtomicBool::new(false),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.entries.lock().iter().map(|entry| entry.id).collect()
    }

    /// Buffer a request for later replay. Never fails; a full queue evicts its oldest entry.
    pub fn enqueue(&self, category: impl Into<String>, request: HttpRequest) -> EnqueueReceipt {
        let entry = QueuedRequest::new(category, request, self.max_retries);
        let id = entry.id;
        debug!("Queueing {} {} as {}", entry.method, entry.url, id);

        let dropped = self.push(entry);
        EnqueueReceipt { id, dropped }
    }

    /// Remove every pending entry, returning how many were discarded
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut entries = self.entries.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        if cleared > 0 {
            info!("Cleared {} queued requests", cleared);
        }
        cleared
    }

    /// Replay the entries present when the pass starts.
    ///
    /// Returns `None` without doing anything when another drain is running.
    /// Entries that fail go to the back of the queue until they exhaust
    /// `max_retries`; entries added or re-queued during the pass wait for the
    /// next one.
    pub async fn drain(&self, replayer: &dyn RequestReplayer) -> Option<DrainReport> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress");
            return None;
        }
        let _syncing = SyncFlag(&self.syncing);

        let batch = self.len();
        let mut report = DrainReport::default();
        if batch > 0 {
            info!("Replaying {} queued requests", batch);
        }

        for index in 0..batch {
            if index > 0 && !self.replay_delay.is_zero() {
                tokio::time::sleep(self.replay_delay).await;
            }

            // Entries stay queued while in flight so a cancelled drain loses nothing
            let Some(entry) = self.entries.lock().front().cloned() else {
                break;
            };

            let result = replayer.replay(&entry).await;
            if !self.take(entry.id) {
                // Evicted or cleared while in flight; a delivered request still counts
                match result {
                    Ok(()) => {
                        debug!("Queued request {} replayed after leaving the queue", entry.id);
                        report.succeeded += 1;
                    }
                    Err(e) => debug!(
                        "Queued request {} left the queue while in flight; not retrying: {}",
                        entry.id, e
                    ),
                }
                continue;
            }

            match result {
                Ok(()) => {
                    debug!("Replayed queued request {}", entry.id);
                    report.succeeded += 1;
                }
                Err(e) if entry.retries < entry.max_retries => {
                    debug!(
                        "Replay of {} failed ({}), attempt {}/{}",
                        entry.id,
                        e,
                        entry.retries + 1,
                        entry.max_retries
                    );
                    let mut retry = entry;
                    retry.retries += 1;
                    self.push(retry);
                    report.requeued += 1;
                }
                Err(e) => {
                    warn!(
                        "Discarding queued request {} ({} {}) after {} replays: {}",
                        entry.id,
                        entry.method,
                        entry.url,
                        entry.retries + 1,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.len();
        info!(
            succeeded = report.succeeded,
            requeued = report.requeued,
            failed = report.failed,
            remaining = report.remaining,
            "Offline queue drain finished"
        );
        if let Some(observer) = &self.observer {
            observer.on_drain(&report);
        }
        Some(report)
    }

    fn push(&self, entry: QueuedRequest) -> Option<Uuid> {
        let dropped = {
            let mut entries = self.entries.lock();
            entries.push_back(entry);
            if entries.len() > self.max_size {
                entries.pop_front().map(|oldest| oldest.id)
            } else {
                None
            }
        };

        if let Some(dropped) = dropped {
            let overflow = QueueOverflowError {
                dropped,
                max_size: self.max_size,
            };
            warn!("{}", overflow);
            if let Some(observer) = &self.observer {
                observer.on_overflow(&overflow);
            }
        }
        dropped
    }

    fn take(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => entries.remove(index).is_some(),
            None => false,
        }
    }
}

/// Clears the drain flag however the pass ends
struct SyncFlag<'a>(&'a AtomicBool);

impl Drop for SyncFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn queue(max_size: usize, max_retries: u32) -> OfflineRequestQueue {
        OfflineRequestQueue::new(&QueueConfig {
            max_queue_size: max_size,
            max_retries,
            replay_delay: Duration::from_millis(100),
        })
    }

    fn request(path: &str) -> HttpRequest {
        HttpRequest::get(format!("http://localhost:8080/api{path}"))
    }

    /// Fails the urls it is told to, succeeds otherwise
    #[derive(Default)]
    struct Replayer {
        failing: HashSet<String>,
        seen: Mutex<Vec<String>>,
    }

    impl Replayer {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: urls.iter().map(|u| u.to_string()).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RequestReplayer for Replayer {
        async fn replay(&self, request: &QueuedRequest) -> Result<(), ReplayError> {
            self.seen.lock().push(request.url.clone());
            if self.failing.contains(&request.url) {
                Err(ReplayError::new("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        overflows: Mutex<Vec<QueueOverflowError>>,
        drains: Mutex<Vec<DrainReport>>,
    }

    impl QueueObserver for Recorder {
        fn on_overflow(&self, error: &QueueOverflowError) {
            self.overflows.lock().push(error.clone());
        }

        fn on_drain(&self, report: &DrainReport) {
            self.drains.lock().push(*report);
        }
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let recorder = Arc::new(Recorder::default());
        let queue = queue(2, 3).with_observer(recorder.clone());

        let a = queue.enqueue("workflow", request("/a"));
        let b = queue.enqueue("workflow", request("/b"));
        let c = queue.enqueue("workflow", request("/c"));

        assert_eq!(a.dropped, None);
        assert_eq!(b.dropped, None);
        assert_eq!(c.dropped, Some(a.id));
        assert_eq!(queue.pending_ids(), vec![b.id, c.id]);

        let overflows = recorder.overflows.lock();
        assert_eq!(overflows.len(), 1);
        assert_eq!(overflows[0].dropped, a.id);
        assert_eq!(overflows[0].max_size, 2);
    }

    #[test]
    fn test_entry_keeps_request_fields() {
        let queue = queue(10, 4);
        let original = HttpRequest::new(HttpMethod::Post, "http://localhost/api/workflows")
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::json!({"name": "nightly"}));
        queue.enqueue("workflow", original.clone());

        let entry = queue.entries.lock().front().cloned().unwrap();
        assert_eq!(entry.category, "workflow");
        assert_eq!(entry.retries, 0);
        assert_eq!(entry.max_retries, 4);
        assert_eq!(entry.to_request(), original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_replays_in_order() {
        let queue = queue(100, 3);
        for path in ["/1", "/2", "/3", "/4"] {
            queue.enqueue("query", request(path));
        }
        let replayer = Replayer::default();

        let start = tokio::time::Instant::now();
        let report = queue.drain(&replayer).await.unwrap();

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.remaining, 0);
        assert!(queue.is_empty());
        assert_eq!(
            *replayer.seen.lock(),
            vec![
                "http://localhost:8080/api/1",
                "http://localhost:8080/api/2",
                "http://localhost:8080/api/3",
                "http://localhost:8080/api/4"
            ]
        );
        // Three gaps between four replays
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(!queue.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_replay_goes_to_back() {
        let queue = queue(100, 3);
        let first = queue.enqueue("workflow", request("/flaky"));
        let second = queue.enqueue("workflow", request("/ok"));
        let replayer = Replayer::failing(&["http://localhost:8080/api/flaky"]);

        let report = queue.drain(&replayer).await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.pending_ids(), vec![first.id]);
        assert_ne!(first.id, second.id);
        assert_eq!(queue.entries.lock()[0].retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_entry_is_discarded() {
        let recorder = Arc::new(Recorder::default());
        let queue = queue(100, 2).with_observer(recorder.clone());
        queue.enqueue("notification", request("/down"));
        let replayer = Replayer::failing(&["http://localhost:8080/api/down"]);

        // Initial failure plus two retries
        for expected_retries in 1..=2 {
            let report = queue.drain(&replayer).await.unwrap();
            assert_eq!(report.requeued, 1);
            assert_eq!(queue.entries.lock()[0].retries, expected_retries);
        }

        let report = queue.drain(&replayer).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(replayer.seen.lock().len(), 3);
        assert_eq!(recorder.drains.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_drain_returns_none() {
        let queue = Arc::new(queue(100, 3));
        for path in ["/1", "/2", "/3"] {
            queue.enqueue("workflow", request(path));
        }
        let replayer = Arc::new(Replayer::default());

        let background = {
            let queue = queue.clone();
            let replayer = replayer.clone();
            tokio::spawn(async move { queue.drain(replayer.as_ref()).await })
        };
        // Let the first drain start and park on its replay delay
        tokio::task::yield_now().await;
        assert!(queue.is_syncing());

        assert!(queue.drain(replayer.as_ref()).await.is_none());

        let report = background.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 3);
        assert_eq!(replayer.seen.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_drain_waits_for_next_pass() {
        let queue = Arc::new(queue(100, 3));
        queue.enqueue("workflow", request("/1"));
        queue.enqueue("workflow", request("/2"));
        let replayer = Arc::new(Replayer::default());

        let background = {
            let queue = queue.clone();
            let replayer = replayer.clone();
            tokio::spawn(async move { queue.drain(replayer.as_ref()).await })
        };
        tokio::task::yield_now().await;
        let late = queue.enqueue("workflow", request("/late"));

        let report = background.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.pending_ids(), vec![late.id]);
    }

    /// Enqueues into a full queue while replaying, evicting the in-flight entry
    struct EvictingReplayer {
        queue: Arc<OfflineRequestQueue>,
        succeed: bool,
    }

    #[async_trait]
    impl RequestReplayer for EvictingReplayer {
        async fn replay(&self, _request: &QueuedRequest) -> Result<(), ReplayError> {
            self.queue.enqueue("workflow", request("/newcomer"));
            if self.succeed {
                Ok(())
            } else {
                Err(ReplayError::new("connection reset"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_in_flight_success_is_counted() {
        let queue = Arc::new(queue(1, 3));
        let original = queue.enqueue("workflow", request("/original"));
        let replayer = EvictingReplayer {
            queue: queue.clone(),
            succeed: true,
        };

        let report = queue.drain(&replayer).await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.requeued, 0);
        assert_eq!(report.remaining, 1);
        assert!(!queue.pending_ids().contains(&original.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_in_flight_failure_is_not_requeued() {
        let queue = Arc::new(queue(1, 3));
        queue.enqueue("workflow", request("/original"));
        let replayer = EvictingReplayer {
            queue: queue.clone(),
            succeed: false,
        };

        let report = queue.drain(&replayer).await.unwrap();

        assert_eq!(report, DrainReport {
            succeeded: 0,
            requeued: 0,
            failed: 0,
            remaining: 1,
        });
        assert_eq!(queue.entries.lock()[0].url, "http://localhost:8080/api/newcomer");
    }

    #[test]
    fn test_clear_returns_count() {
        let queue = queue(100, 3);
        queue.enqueue("system", request("/a"));
        queue.enqueue("system", request("/b"));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap()
    }

    proptest! {
        #[test]
        fn successful_drain_empties_queue_in_order(
            paths in prop::collection::vec("[a-z0-9]{1,12}", 0..40),
        ) {
            let queue = queue(100, 3);
            let urls: Vec<String> = paths
                .iter()
                .map(|path| format!("http://localhost:8080/api/{path}"))
                .collect();
            for url in &urls {
                queue.enqueue("workflow", HttpRequest::get(url.clone()));
            }
            let replayer = Replayer::default();

            let report = paused_runtime().block_on(queue.drain(&replayer)).unwrap();

            prop_assert_eq!(queue.len(), 0);
            prop_assert_eq!(report.succeeded, urls.len());
            prop_assert_eq!(report.remaining, 0);
            prop_assert_eq!(&*replayer.seen.lock(), &urls);
        }

        #[test]
        fn overflow_keeps_most_recent_entries(capacity in 1usize..50, surplus in 1usize..50) {
            let queue = queue(capacity, 3);
            let ids: Vec<Uuid> = (0..capacity + surplus)
                .map(|n| queue.enqueue("query", request(&format!("/{n}"))).id)
                .collect();

            prop_assert_eq!(queue.len(), capacity);
            prop_assert_eq!(queue.pending_ids(), ids[surplus..].to_vec());
        }
    }

    #[tokio::test]
    async fn test_empty_drain_reports_nothing() {
        let queue = queue(100, 3);
        let report = queue.drain(&Replayer::default()).await.unwrap();
        assert_eq!(report, DrainReport::default());
    }
}
