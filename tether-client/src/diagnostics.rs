//! Introspection and administrative controls

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tether_resilience::CircuitSnapshot;
use tracing::info;

use crate::client::ResilientClient;

/// Connectivity, queue and breaker state at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub is_online: bool,
    pub queue_length: usize,
    pub breaker_states: BTreeMap<String, CircuitSnapshot>,
}

impl ResilientClient {
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            is_online: self.inner.monitor.is_online(),
            queue_length: self.inner.queue.len(),
            breaker_states: self.inner.breakers.snapshots(),
        }
    }

    /// Force every breaker closed
    pub fn reset_breakers(&self) {
        info!("Resetting all circuit breakers");
        self.inner.breakers.reset_all();
    }

    /// Discard every queued request, returning how many were dropped
    pub fn clear_queue(&self) -> usize {
        self.inner.queue.clear()
    }
}
