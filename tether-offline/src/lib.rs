//! Offline support for Tether
//!
//! [`ConnectivityMonitor`] tracks whether the API is reachable, from explicit
//! events or periodic probing, and notifies listeners on transitions.
//! [`OfflineRequestQueue`] holds requests issued while offline and replays
//! them in order once connectivity returns.

pub mod monitor;
pub mod queue;

pub use monitor::{
    ConnectivityEvent, ConnectivityMonitor, ProbeHandle, ReachabilityProbe, Subscription,
    MIN_PROBE_INTERVAL,
};
pub use queue::{
    DrainReport, EnqueueReceipt, OfflineRequestQueue, QueueObserver, QueueOverflowError,
    QueuedRequest, ReplayError, RequestReplayer,
};
