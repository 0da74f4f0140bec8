//! AWS credential resolution.
//!
//! Every backend action resolves credentials through a
//! [`CredentialsProvider`]. [`resolve_credentials`] asks once, then once more
//! with a forced refresh, and fails with
//! [`MetastreamError::NotAuthenticated`] when both come back empty.
//!
//! # Environment Variables
//!
//! [`EnvCredentials`] reads:
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional, for temporary credentials)

use anyhow::Result;
use async_trait::async_trait;
use metastream_core::MetastreamError;

/// A set of AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`. `None` when either required
    /// variable is unset or empty.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty_var("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty_var("AWS_SECRET_ACCESS_KEY")?;
        let session_token = non_empty_var("AWS_SESSION_TOKEN");

        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Source of credentials for signing requests.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Current credentials, or `None` when not signed in. With
    /// `force_refresh` the provider must bypass any cache.
    async fn credentials(&self, force_refresh: bool) -> Result<Option<AwsCredentials>>;
}

/// Credentials from the process environment, re-read on every call.
pub struct EnvCredentials;

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn credentials(&self, _force_refresh: bool) -> Result<Option<AwsCredentials>> {
        Ok(AwsCredentials::from_env())
    }
}

/// Fixed credentials, mostly for tests and local endpoints.
pub struct StaticCredentials(pub Option<AwsCredentials>);

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn credentials(&self, _force_refresh: bool) -> Result<Option<AwsCredentials>> {
        Ok(self.0.clone())
    }
}

/// Resolve credentials with at most one forced refresh.
pub async fn resolve_credentials(provider: &dyn CredentialsProvider) -> Result<AwsCredentials> {
    if let Some(creds) = provider.credentials(false).await? {
        return Ok(creds);
    }
    tracing::debug!("no credentials cached, forcing a refresh");
    match provider.credentials(true).await? {
        Some(creds) => Ok(creds),
        None => Err(MetastreamError::NotAuthenticated.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns `None` until asked to refresh.
    struct RefreshOnly {
        calls: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl CredentialsProvider for RefreshOnly {
        async fn credentials(&self, force_refresh: bool) -> Result<Option<AwsCredentials>> {
            self.calls.lock().unwrap().push(force_refresh);
            Ok(force_refresh.then(|| AwsCredentials {
                access_key_id: "AKID".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            }))
        }
    }

    #[tokio::test]
    async fn forced_refresh_is_tried_once() {
        let provider = RefreshOnly {
            calls: Mutex::new(Vec::new()),
        };
        let creds = resolve_credentials(&provider).await.unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(*provider.calls.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn missing_credentials_is_not_authenticated() {
        let err = resolve_credentials(&StaticCredentials(None)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<MetastreamError>(),
            Some(&MetastreamError::NotAuthenticated)
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "very-secret".into(),
            session_token: Some("token".into()),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("AKID"));
        assert!(!shown.contains("very-secret"));
        assert!(!shown.contains("token\""));
    }
}
