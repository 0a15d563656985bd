//! The resilient client
//!
//! Every call passes through the same pipeline:
//!
//! 1. a fresh `X-Request-ID` and a tracing span,
//! 2. the offline check, which defers the call to the queue,
//! 3. the credential, refreshed once when expired,
//! 4. `breaker(category).execute(retry(tier).execute(transport))`, each
//!    transport call bounded by the request timeout,
//! 5. one forced refresh and one more pass on `401`,
//! 6. deferral to the queue when the call failed for lack of connectivity
//!    and the monitor now reports offline,
//! 7. decoding of the response body.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_config::{ConnectivityConfig, RetryConfig, TetherConfig};
use tether_http::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportConfig};
use tether_offline::{
    ConnectivityEvent, ConnectivityMonitor, DrainReport, OfflineRequestQueue, ProbeHandle,
    QueueObserver, QueuedRequest, ReplayError, RequestReplayer, Subscription,
};
use tether_resilience::{
    CircuitBreakerRegistry, PolicyTier, RetryExecutor, RetryObserver, RetryPolicy,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::credential::{CredentialError, CredentialProvider, StaticCredentials};
use crate::error::{ClientError, ClientResult};
use crate::probe::HealthProbe;
use crate::request::{ApiRequest, CallOutcome, QueuedReceipt};

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
const AUTHORIZATION_HEADER: &str = "Authorization";

pub(crate) struct ClientInner {
    pub(crate) base_url: Url,
    pub(crate) transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    refresh_gate: AsyncMutex<()>,
    pub(crate) breakers: CircuitBreakerRegistry,
    retry: RetryConfig,
    retry_observer: Option<Arc<dyn RetryObserver>>,
    pub(crate) monitor: ConnectivityMonitor,
    pub(crate) queue: OfflineRequestQueue,
    pub(crate) request_timeout: Duration,
    pub(crate) connectivity: ConnectivityConfig,
}

/// API client with retries, per-category circuit breakers and offline queueing.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ResilientClient {
    pub(crate) inner: Arc<ClientInner>,
    _drain_on_online: Arc<Subscription>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("online", &self.inner.monitor.is_online())
            .field("queue", &self.inner.queue)
            .finish()
    }
}

impl ResilientClient {
    pub fn builder(config: TetherConfig) -> ResilientClientBuilder {
        ResilientClientBuilder::new(config)
    }

    /// Run one logical operation and decode its response body
    pub async fn call<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> ClientResult<CallOutcome<T>> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "api_call",
            %request_id,
            category = %request.category,
            tier = %request.tier,
            method = %request.method,
            path = %request.display_path(),
        );
        self.inner.call(request, request_id).instrument(span).await
    }

    /// Replay queued requests now. `None` when a drain is already running.
    pub async fn sync_pending(&self) -> Option<DrainReport> {
        self.inner.sync_pending().await
    }

    /// Start probing the health endpoint, unless probing is disabled
    pub fn start_background(&self) -> Option<ProbeHandle> {
        let connectivity = &self.inner.connectivity;
        if !connectivity.probe_enabled {
            debug!("Reachability probing disabled");
            return None;
        }

        Some(
            self.inner
                .monitor
                .start_probing(Arc::new(self.health_probe()), connectivity.probe_interval),
        )
    }

    /// Probe for the configured health endpoint, sharing this client's transport
    pub fn health_probe(&self) -> HealthProbe {
        let connectivity = &self.inner.connectivity;
        HealthProbe::new(
            self.inner.transport.clone(),
            self.inner.endpoint(&connectivity.health_path),
            connectivity.probe_timeout,
        )
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn queue(&self) -> &OfflineRequestQueue {
        &self.inner.queue
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.inner.breakers
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }
}

impl ClientInner {
    async fn call<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        request_id: Uuid,
    ) -> ClientResult<CallOutcome<T>> {
        let http = self.prepare(&request, request_id)?;

        if !self.monitor.is_online() {
            debug!("Offline, deferring request");
            return Ok(CallOutcome::Queued(self.defer(&request, http, request_id)));
        }

        let token = self.bearer().await?;
        let mut result = self.send_resilient(&request, &http, token.as_deref()).await;

        if matches!(&result, Err(e) if e.is_unauthorized()) {
            info!("Credential rejected, refreshing once");
            let fresh = self.refresh(token).await?;
            result = self.send_resilient(&request, &http, Some(&fresh)).await;
        }

        match result {
            Ok(response) => {
                let value = serde_json::from_value(response.body)?;
                Ok(CallOutcome::Completed(value))
            }
            Err(e) if e.is_connectivity_loss() && !self.monitor.is_online() => {
                info!("Connectivity lost during call ({}), deferring request", e);
                Ok(CallOutcome::Queued(self.defer(&request, http, request_id)))
            }
            Err(e) => Err(e),
        }
    }

    async fn send_resilient(
        &self,
        request: &ApiRequest,
        http: &HttpRequest,
        token: Option<&str>,
    ) -> ClientResult<HttpResponse> {
        let mut authorized = http.clone();
        attach_token(&mut authorized, token);

        let breaker = self.breakers.get(&request.category);
        let retry = self.retry_executor(request.tier);
        let authorized = &authorized;

        breaker
            .execute(|| retry.execute(|| self.send_once(authorized)))
            .await
    }

    /// One transport call bounded by the request timeout; non-2xx is an error
    pub(crate) async fn send_once(&self, request: &HttpRequest) -> ClientResult<HttpResponse> {
        let response = tokio::time::timeout(self.request_timeout, self.transport.send(request.clone()))
            .await
            .map_err(|_| ClientError::Timeout(self.request_timeout))??;

        if response.is_success() {
            Ok(response)
        } else {
            debug!("Request to {} answered with {}", request.url, response.status);
            Err(ClientError::Http {
                status: response.status,
                body: response.body,
            })
        }
    }

    fn retry_executor(&self, tier: PolicyTier) -> RetryExecutor {
        let executor = RetryExecutor::new(RetryPolicy::from_config(&self.retry, tier));
        match &self.retry_observer {
            Some(observer) => executor.with_observer(observer.clone()),
            None => executor,
        }
    }

    /// Current usable token, refreshing an expired or missing one
    async fn bearer(&self) -> ClientResult<Option<String>> {
        let current = self.credentials.token().await;
        if let Some(token) = &current {
            if !self.credentials.is_expired(token) {
                return Ok(current);
            }
        }

        match self.refresh(current).await {
            Ok(token) => Ok(Some(token)),
            // Nothing to refresh; the server decides whether that is acceptable
            Err(CredentialError::Missing) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace `stale` with a fresh token. Concurrent callers share one refresh.
    async fn refresh(&self, stale: Option<String>) -> Result<String, CredentialError> {
        let _gate = self.refresh_gate.lock().await;

        // Someone else may have refreshed while we waited
        if let Some(current) = self.credentials.token().await {
            if Some(&current) != stale.as_ref() && !self.credentials.is_expired(&current) {
                return Ok(current);
            }
        }

        let refreshed = self.credentials.refresh().await;
        match &refreshed {
            Ok(_) => debug!("Credential refreshed"),
            Err(e) => warn!("Credential refresh failed: {}", e),
        }
        refreshed
    }

    fn prepare(&self, request: &ApiRequest, request_id: Uuid) -> ClientResult<HttpRequest> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidRequest(format!("base URL '{}' cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(&request.path);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut http = HttpRequest::new(request.method, url.as_str())
            .with_header(REQUEST_ID_HEADER, request_id.to_string())
            .with_header("Accept", "application/json");
        if let Some(body) = &request.body {
            http.set_header("Content-Type", "application/json");
            http.body = Some(body.clone());
        }
        Ok(http)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Queue without credentials; replay attaches a fresh one
    fn defer(&self, request: &ApiRequest, http: HttpRequest, request_id: Uuid) -> QueuedReceipt {
        let receipt = self.queue.enqueue(request.category.clone(), http);
        info!(queue_id = %receipt.id, queue_length = self.queue.len(), "Request queued for replay");
        QueuedReceipt {
            queue_id: receipt.id,
            request_id,
            dropped: receipt.dropped,
        }
    }

    async fn sync_pending(&self) -> Option<DrainReport> {
        if self.queue.is_empty() {
            return Some(DrainReport::default());
        }
        self.queue.drain(self).await
    }
}

/// Replay bypasses breakers and retries; the queue owns the retry budget
#[async_trait]
impl RequestReplayer for ClientInner {
    async fn replay(&self, entry: &QueuedRequest) -> Result<(), ReplayError> {
        let mut request = entry.to_request();
        request.set_header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());

        let token = self
            .bearer()
            .await
            .map_err(|e| ReplayError::new(e.to_string()))?;
        attach_token(&mut request, token.as_deref());

        self.send_once(&request)
            .await
            .map(|_| ())
            .map_err(|e| ReplayError::new(e.to_string()))
    }
}

fn attach_token(request: &mut HttpRequest, token: Option<&str>) {
    if let Some(token) = token {
        request.set_header(AUTHORIZATION_HEADER, format!("Bearer {token}"));
    }
}

/// Assembles a [`ResilientClient`] from configuration and collaborators
pub struct ResilientClientBuilder {
    config: TetherConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    monitor: Option<ConnectivityMonitor>,
    retry_observer: Option<Arc<dyn RetryObserver>>,
    queue_observer: Option<Arc<dyn QueueObserver>>,
}

impl ResilientClientBuilder {
    pub fn new(config: TetherConfig) -> Self {
        Self {
            config,
            transport: None,
            credentials: None,
            monitor: None,
            retry_observer: None,
            queue_observer: None,
        }
    }

    /// Defaults to a [`ReqwestTransport`] built from the HTTP configuration
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to anonymous access
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Share an existing monitor; otherwise one starts at `assume_online`
    pub fn monitor(mut self, monitor: ConnectivityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn retry_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.retry_observer = Some(observer);
        self
    }

    pub fn queue_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.queue_observer = Some(observer);
        self
    }

    pub fn build(self) -> ClientResult<ResilientClient> {
        let config = self.config;
        config.validate_all()?;
        let base_url = Url::parse(&config.http.base_url).map_err(|e| {
            ClientError::InvalidRequest(format!("invalid base URL '{}': {}", config.http.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidRequest(format!(
                "base URL '{}' cannot hold a path",
                base_url
            )));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&TransportConfig::from(&config.http))?),
        };
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(StaticCredentials::anonymous()));
        let monitor = self
            .monitor
            .unwrap_or_else(|| ConnectivityMonitor::new(config.connectivity.assume_online));

        let mut queue = OfflineRequestQueue::new(&config.queue);
        if let Some(observer) = self.queue_observer {
            queue = queue.with_observer(observer);
        }

        let inner = Arc::new(ClientInner {
            base_url,
            transport,
            credentials,
            refresh_gate: AsyncMutex::new(()),
            breakers: CircuitBreakerRegistry::new(config.breakers.clone()),
            retry: config.retry.clone(),
            retry_observer: self.retry_observer,
            monitor: monitor.clone(),
            queue,
            request_timeout: config.http.timeout,
            connectivity: config.connectivity.clone(),
        });

        let drain_on_online = monitor.add_listener(drain_listener(Arc::downgrade(&inner)));
        info!(base_url = %inner.base_url, online = monitor.is_online(), "Resilient client ready");

        Ok(ResilientClient {
            inner,
            _drain_on_online: Arc::new(drain_on_online),
        })
    }
}

fn drain_listener(client: Weak<ClientInner>) -> impl Fn(ConnectivityEvent, bool) + Send + Sync {
    move |event, _online| {
        if event != ConnectivityEvent::Online {
            return;
        }
        let Some(client) = client.upgrade() else {
            return;
        };
        if client.queue.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    client.sync_pending().await;
                });
            }
            Err(_) => warn!("Connectivity restored outside a Tokio runtime; call sync_pending to replay"),
        }
    }
}
