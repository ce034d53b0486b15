//! Bearer tokens for the Cloud Logging API.
//!
//! The writer asks its [`TokenSource`] for a token before every request,
//! so sources that refresh (Application Default Credentials) keep a
//! long-running client authenticated.

use crate::client::ClientError;
use crate::env::CLOUD_LOGGING_ACCESS_TOKEN_ENV;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// OAuth2 scope needed to write log entries.
pub const LOGGING_WRITE_SCOPE: &str = "https://www.googleapis.com/auth/logging.write";

/// Supplier of bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A token valid for at least the next request.
    async fn token(&self) -> Result<String, ClientError>;
}

/// A fixed token, e.g. from `gcloud auth print-access-token`. It is never
/// refreshed and stops working once it expires.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

/// Application Default Credentials, discovered the way the Google client
/// libraries do (service account key, `gcloud` user credentials or the
/// metadata server). Tokens are cached and refreshed by `gcp_auth`.
pub struct ApplicationDefault {
    provider: Arc<dyn gcp_auth::TokenProvider>,
}

impl ApplicationDefault {
    pub async fn discover() -> Result<Self, ClientError> {
        let provider = gcp_auth::provider().await?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl TokenSource for ApplicationDefault {
    async fn token(&self) -> Result<String, ClientError> {
        let token = self.provider.token(&[LOGGING_WRITE_SCOPE]).await?;
        Ok(token.as_str().to_string())
    }
}

/// How a [`CloudLoggingClient`](crate::cloud::CloudLoggingClient)
/// authenticates.
#[derive(Clone, Default)]
pub enum Credentials {
    /// Discover Application Default Credentials at connect time.
    #[default]
    ApplicationDefault,
    /// Send this token as is.
    AccessToken(String),
    /// Any other token source.
    Source(Arc<dyn TokenSource>),
}

impl Credentials {
    /// [`Credentials::AccessToken`] when [`CLOUD_LOGGING_ACCESS_TOKEN_ENV`]
    /// is set and non-empty, [`Credentials::ApplicationDefault`] otherwise.
    pub fn from_env() -> Self {
        match std::env::var(CLOUD_LOGGING_ACCESS_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Credentials::AccessToken(token),
            _ => Credentials::ApplicationDefault,
        }
    }

    pub(crate) async fn resolve(self) -> Result<Arc<dyn TokenSource>, ClientError> {
        match self {
            Credentials::ApplicationDefault => Ok(Arc::new(ApplicationDefault::discover().await?)),
            Credentials::AccessToken(token) if token.is_empty() => {
                Err(ClientError::MissingCredentials)
            }
            Credentials::AccessToken(token) => Ok(Arc::new(StaticToken::new(token))),
            Credentials::Source(source) => Ok(source),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApplicationDefault => f.write_str("ApplicationDefault"),
            Credentials::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Credentials::Source(_) => f.write_str("Source(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_access_token_is_rejected() {
        let result = Credentials::AccessToken(String::new()).resolve().await;
        assert!(matches!(result, Err(ClientError::MissingCredentials)));
    }

    #[tokio::test]
    async fn static_token_is_returned_as_is() {
        let source = Credentials::AccessToken("abc".to_string())
            .resolve()
            .await
            .unwrap();
        assert_eq!(source.token().await.unwrap(), "abc");
    }

    #[test]
    fn debug_hides_the_token() {
        let rendered = format!("{:?}", Credentials::AccessToken("secret".to_string()));
        assert!(!rendered.contains("secret"));
    }
}
