//! Operation groups, one per service category

use serde::de::DeserializeOwned;
use serde::Serialize;
use tether_http::HttpMethod;
use tether_resilience::PolicyTier;

use crate::client::ResilientClient;
use crate::error::{ClientError, ClientResult};
use crate::request::{ApiRequest, CallOutcome};

pub const WORKFLOW: &str = "workflow";
pub const QUERY: &str = "query";
pub const NOTIFICATION: &str = "notification";
pub const SYSTEM: &str = "system";

fn to_body<B: Serialize + ?Sized>(body: &B) -> ClientResult<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|e| ClientError::InvalidRequest(format!("body is not serializable: {e}")))
}

impl ResilientClient {
    pub fn workflows(&self) -> Workflows<'_> {
        Workflows { client: self }
    }

    pub fn queries(&self) -> Queries<'_> {
        Queries { client: self }
    }

    pub fn notifications(&self) -> Notifications<'_> {
        Notifications { client: self }
    }

    pub fn system(&self) -> System<'_> {
        System { client: self }
    }
}

/// `/workflows`
#[derive(Debug, Clone, Copy)]
pub struct Workflows<'a> {
    client: &'a ResilientClient,
}

impl Workflows<'_> {
    fn request(tier: PolicyTier, method: HttpMethod) -> ApiRequest {
        ApiRequest::new(WORKFLOW, tier, method).segment("workflows")
    }

    pub async fn list<T: DeserializeOwned>(&self) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(PolicyTier::Standard, HttpMethod::Get))
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(PolicyTier::Standard, HttpMethod::Get).segment(id))
            .await
    }

    pub async fn create<B, T>(&self, workflow: &B) -> ClientResult<CallOutcome<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = Self::request(PolicyTier::Critical, HttpMethod::Post).body(to_body(workflow)?);
        self.client.call(request).await
    }

    pub async fn update<B, T>(&self, id: &str, workflow: &B) -> ClientResult<CallOutcome<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = Self::request(PolicyTier::Critical, HttpMethod::Put)
            .segment(id)
            .body(to_body(workflow)?);
        self.client.call(request).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, id: &str) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(PolicyTier::Critical, HttpMethod::Delete).segment(id))
            .await
    }

    pub async fn execute<B, T>(&self, id: &str, input: &B) -> ClientResult<CallOutcome<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = Self::request(PolicyTier::Critical, HttpMethod::Post)
            .segment(id)
            .segment("execute")
            .body(to_body(input)?);
        self.client.call(request).await
    }
}

/// `/queries`
#[derive(Debug, Clone, Copy)]
pub struct Queries<'a> {
    client: &'a ResilientClient,
}

impl Queries<'_> {
    fn request(tier: PolicyTier, method: HttpMethod) -> ApiRequest {
        ApiRequest::new(QUERY, tier, method).segment("queries")
    }

    pub async fn list<T: DeserializeOwned>(&self) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(PolicyTier::Standard, HttpMethod::Get))
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(PolicyTier::Standard, HttpMethod::Get).segment(id))
            .await
    }

    pub async fn create<B, T>(&self, query: &B) -> ClientResult<CallOutcome<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = Self::request(PolicyTier::Critical, HttpMethod::Post).body(to_body(query)?);
        self.client.call(request).await
    }

    pub async fn resolve<B, T>(&self, id: &str, data: &B) -> ClientResult<CallOutcome<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = Self::request(PolicyTier::Critical, HttpMethod::Post)
            .segment(id)
            .segment("resolve")
            .body(to_body(data)?);
        self.client.call(request).await
    }
}

/// `/notifications`
#[derive(Debug, Clone, Copy)]
pub struct Notifications<'a> {
    client: &'a ResilientClient,
}

impl Notifications<'_> {
    fn request(method: HttpMethod) -> ApiRequest {
        ApiRequest::new(NOTIFICATION, PolicyTier::Background, method).segment("notifications")
    }

    pub async fn list<T: DeserializeOwned>(&self) -> ClientResult<CallOutcome<T>> {
        self.client.call(Self::request(HttpMethod::Get)).await
    }

    pub async fn mark_read<T: DeserializeOwned>(&self, id: &str) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(HttpMethod::Put).segment(id).segment("read"))
            .await
    }

    pub async fn mark_all_read<T: DeserializeOwned>(&self) -> ClientResult<CallOutcome<T>> {
        self.client
            .call(Self::request(HttpMethod::Put).segment("read-all"))
            .await
    }
}

/// Service health
#[derive(Debug, Clone, Copy)]
pub struct System<'a> {
    client: &'a ResilientClient,
}

impl System<'_> {
    pub async fn health<T: DeserializeOwned>(&self) -> ClientResult<CallOutcome<T>> {
        let request = ApiRequest::new(SYSTEM, PolicyTier::Quick, HttpMethod::Get).segment("health");
        self.client.call(request).await
    }
}
