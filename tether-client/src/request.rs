//! Logical API requests and call outcomes

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tether_http::HttpMethod;
use tether_resilience::PolicyTier;
use uuid::Uuid;

/// One logical operation against the API
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Breaker category
    pub category: String,
    pub tier: PolicyTier,
    pub method: HttpMethod,
    /// Path segments below the base URL, percent-encoded when the URL is built
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl ApiRequest {
    pub fn new(category: impl Into<String>, tier: PolicyTier, method: HttpMethod) -> Self {
        Self {
            category: category.into(),
            tier,
            method,
            path: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Path for logs, e.g. `/workflows/42`
    pub fn display_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }
}

/// Proof that a call was deferred to the offline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedReceipt {
    /// Queue entry id
    pub queue_id: Uuid,
    /// `X-Request-ID` of the deferred call
    pub request_id: Uuid,
    /// Entry evicted to make room, if the queue was full
    pub dropped: Option<Uuid>,
}

/// Result of a call that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Completed(T),
    /// Accepted while offline; replayed once connectivity returns
    Queued(QueuedReceipt),
}

impl<T> CallOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, CallOutcome::Queued(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            CallOutcome::Completed(value) => Some(value),
            CallOutcome::Queued(_) => None,
        }
    }

    pub fn receipt(&self) -> Option<&QueuedReceipt> {
        match self {
            CallOutcome::Completed(_) => None,
            CallOutcome::Queued(receipt) => Some(receipt),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Completed(value) => CallOutcome::Completed(f(value)),
            CallOutcome::Queued(receipt) => CallOutcome::Queued(receipt),
        }
    }
}
