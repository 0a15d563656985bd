//! Bearer credential supply

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The provider has nothing to offer; requests go out unauthenticated
    #[error("No credential available")]
    Missing,

    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),
}

/// Source of the bearer token attached to every request.
///
/// Acquiring the first credential (login) happens outside the client.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token, if any
    async fn token(&self) -> Option<String>;

    fn is_expired(&self, token: &str) -> bool;

    /// Obtain a fresh token, replacing the current one
    async fn refresh(&self) -> Result<String, CredentialError>;
}

/// A fixed token that never expires, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn is_expired(&self, _token: &str) -> bool {
        false
    }

    async fn refresh(&self) -> Result<String, CredentialError> {
        self.token.clone().ok_or(CredentialError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credentials() {
        let credentials = StaticCredentials::new("abc");
        assert_eq!(credentials.token().await.as_deref(), Some("abc"));
        assert!(!credentials.is_expired("abc"));
        assert_eq!(credentials.refresh().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_anonymous_has_nothing_to_refresh() {
        let credentials = StaticCredentials::anonymous();
        assert_eq!(credentials.token().await, None);
        assert_eq!(credentials.refresh().await, Err(CredentialError::Missing));
    }
}
