//! Scripted transport for exercising callers without a network

use crate::errors::TransportError;
use crate::transport::Transport;
use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::time::Duration;

type Scripted = Result<HttpResponse, TransportError>;

/// Replies with queued outcomes in order, then with a fallback.
///
/// Every request is recorded so tests can assert on what was sent.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Scripted>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Fallback reply is `200` with a null body
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(HttpResponse::ok(JsonValue::Null))),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.script.lock().push_back(Ok(response));
        self
    }

    pub fn push_status(&self, status: u16, body: JsonValue) -> &Self {
        self.push_response(HttpResponse::new(status, body))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Reply used once the script is exhausted
    pub fn set_fallback(&self, outcome: Result<HttpResponse, TransportError>) {
        *self.fallback.lock() = outcome;
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn remaining_script(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(outcome) => outcome,
            None => self.fallback.lock().clone(),
        }
    }
}
