//! OAuth bearer token cache with single-flight refresh.
//!
//! Two states: no token, or a token valid until `expires_at`. The cache mutex is held across
//! check → fetch → store so concurrent callers never refresh twice.

use crate::error::{AdapterError, Result};
use crate::http::sanitize_reqwest_error;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

/// A freshly issued token and the TTL declared by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Something that can exchange credentials for a bearer token.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<IssuedToken>;
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct TokenGuard {
    fetcher: Arc<dyn TokenFetcher>,
    margin: Duration,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenGuard {
    /// Tokens are treated as expired this long before the server-declared TTL runs out.
    pub const DEFAULT_MARGIN: Duration = Duration::from_secs(60);

    pub fn new(fetcher: impl TokenFetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            margin: Self::DEFAULT_MARGIN,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Return a valid bearer token, acquiring a new one if none is cached or it has expired.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Authentication`] if the token endpoint fails. No retry is
    /// attempted.
    pub async fn bearer(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.access_token.clone());
        }

        *cache = None;
        let issued = self.fetcher.fetch().await.map_err(|e| match e {
            AdapterError::Authentication(_) => e,
            other => AdapterError::Authentication(other.to_string()),
        })?;

        let ttl = issued.expires_in.saturating_sub(self.margin);
        info!(ttl_secs = ttl.as_secs(), "acquired upstream access token");
        *cache = Some(CachedToken {
            access_token: issued.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(issued.access_token)
    }

    /// Drop the cached token, but only if it is still `stale`.
    ///
    /// A caller that saw a 401 for an old token must not throw away a token another task has
    /// already refreshed.
    pub async fn invalidate(&self, stale: &str) {
        let mut cache = self.cache.lock().await;
        if cache.as_ref().is_some_and(|t| t.access_token == stale) {
            debug!("invalidating rejected access token");
            *cache = None;
        }
    }
}

/// OAuth2 `client_credentials` grant with HTTP Basic client authentication.
pub struct ClientCredentialsFetcher {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Missing TTL is treated as "expires immediately"; the next call fetches again.
    #[serde(default)]
    expires_in: u64,
}

impl ClientCredentialsFetcher {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenFetcher for ClientCredentialsFetcher {
    async fn fetch(&self) -> Result<IssuedToken> {
        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AdapterError::Authentication(sanitize_reqwest_error(&e)))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AdapterError::Authentication(sanitize_reqwest_error(&e)))?;

        if !status.is_success() {
            let body = crate::http::parse_body(&bytes);
            return Err(AdapterError::Authentication(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                crate::http::upstream_message(&body)
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&bytes).map_err(|e| {
            AdapterError::Authentication(format!("invalid token endpoint response: {e}"))
        })?;

        Ok(IssuedToken {
            access_token: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        ttl: Duration,
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                access_token: format!("token-{n}"),
                expires_in: self.ttl,
            })
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl TokenFetcher for FailingFetcher {
        async fn fetch(&self) -> Result<IssuedToken> {
            Err(AdapterError::Transport("connection refused".into()))
        }
    }

    fn counting(ttl: Duration) -> (TokenGuard, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let guard = TokenGuard::new(CountingFetcher {
            calls: calls.clone(),
            ttl,
        });
        (guard, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_token_within_ttl() {
        let (guard, calls) = counting(Duration::from_secs(3600));
        for _ in 0..10 {
            assert_eq!(guard.bearer().await.expect("token"), "token-1");
            tokio::time::advance(Duration::from_secs(60)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_once_at_expiry_boundary() {
        let (guard, calls) = counting(Duration::from_secs(3600));
        assert_eq!(guard.bearer().await.expect("token"), "token-1");

        // Effective TTL is 3600 - 60 seconds.
        tokio::time::advance(Duration::from_secs(3539)).await;
        assert_eq!(guard.bearer().await.expect("token"), "token-1");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(guard.bearer().await.expect("token"), "token-2");
        assert_eq!(guard.bearer().await.expect("token"), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let (guard, calls) = counting(Duration::from_secs(3600));
        let guard = Arc::new(guard);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let g = guard.clone();
            handles.push(tokio::spawn(async move { g.bearer().await }));
        }
        for h in handles {
            assert_eq!(h.await.expect("join").expect("token"), "token-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_ignores_tokens_that_were_already_replaced() {
        let (guard, calls) = counting(Duration::from_secs(3600));
        assert_eq!(guard.bearer().await.expect("token"), "token-1");

        guard.invalidate("token-1").await;
        assert_eq!(guard.bearer().await.expect("token"), "token-2");

        guard.invalidate("token-1").await;
        assert_eq!(guard.bearer().await.expect("token"), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_an_authentication_error() {
        let guard = TokenGuard::new(FailingFetcher);
        let err = guard.bearer().await.unwrap_err();
        assert!(matches!(err, AdapterError::Authentication(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
