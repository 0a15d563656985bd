//! Connectivity monitoring
//!
//! The monitor keeps one `is_online` flag. It changes either through
//! [`ConnectivityMonitor::handle_event`] or through a background probe started
//! with [`ConnectivityMonitor::start_probing`]. Listeners hear about
//! transitions only, one at a time.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shortest interval the probe task accepts
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// A connectivity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

impl ConnectivityEvent {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            ConnectivityEvent::Online
        } else {
            ConnectivityEvent::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityEvent::Online)
    }
}

impl fmt::Display for ConnectivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityEvent::Online => write!(f, "online"),
            ConnectivityEvent::Offline => write!(f, "offline"),
        }
    }
}

/// Checks whether the API can currently be reached
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

type Listener = Arc<dyn Fn(ConnectivityEvent, bool) + Send + Sync>;

struct MonitorInner {
    online: AtomicBool,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    // Held while a transition is applied and announced
    transition: Mutex<()>,
}

/// Shared connectivity state. Clones observe and mutate the same flag.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor starting from the embedder's current reachability
    pub fn new(initially_online: bool) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                online: AtomicBool::new(initially_online),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener_id: AtomicU64::new(0),
                transition: Mutex::new(()),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    /// Apply a connectivity signal.
    ///
    /// Returns `true` when the state changed. Listeners run on the calling
    /// thread before this returns and must not apply transitions themselves.
    pub fn handle_event(&self, event: ConnectivityEvent) -> bool {
        let _transition = self.inner.transition.lock();

        let now_online = event.is_online();
        let was_online = self.inner.online.swap(now_online, Ordering::AcqRel);
        if was_online == now_online {
            return false;
        }

        if now_online {
            info!("Connectivity restored");
        } else {
            warn!("Connectivity lost; requests will be queued until the API is reachable");
        }

        // Snapshot so listeners may unsubscribe while being notified
        let listeners: Vec<Listener> = self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(event, now_online);
        }
        true
    }

    /// Register a transition listener
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ConnectivityEvent, bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, Arc::new(listener));
        debug!("Added connectivity listener {}", id);

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Probe reachability every `interval` until the handle is stopped or dropped.
    ///
    /// The first probe runs immediately. A result that matches the current
    /// state is a no-op.
    pub fn start_probing(
        &self,
        probe: Arc<dyn ReachabilityProbe>,
        interval: Duration,
    ) -> ProbeHandle {
        let monitor = self.clone();
        if interval < MIN_PROBE_INTERVAL {
            warn!("Probe interval {:?} too short, using {:?}", interval, MIN_PROBE_INTERVAL);
        }
        let interval = interval.max(MIN_PROBE_INTERVAL);
        info!("Starting reachability probe every {:?}", interval);

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                let reachable = probe.probe().await;
                debug!("Reachability probe result: {}", reachable);
                monitor.handle_event(ConnectivityEvent::from_reachable(reachable));
            }
        });

        ProbeHandle { task: Some(task) }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes unless detached.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener for the lifetime of the monitor
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.monitor.upgrade() {
            inner.listeners.lock().remove(&self.id);
            debug!("Removed connectivity listener {}", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// Running probe task. Dropping it stops probing.
#[derive(Debug)]
pub struct ProbeHandle {
    task: Option<JoinHandle<()>>,
}

impl ProbeHandle {
    pub fn stop(mut self) {
        self.abort();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Stopped reachability probe");
        }
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
