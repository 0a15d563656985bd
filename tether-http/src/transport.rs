//! The transport seam

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::TransportError;
use crate::types::{HttpRequest, HttpResponse};

/// Sends one HTTP request.
///
/// Implementations return `Ok` for every response received, whatever its
/// status, and `Err` only when no response was obtained.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}
