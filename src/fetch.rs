use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::forge::{Forge, ForgeError};
use crate::governor::RateLimitGovernor;
use crate::http::{HttpRequest, HttpTransport, TransportError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("GET {url} timed out {attempts} times, giving up")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("rate limit check failed: {0}")]
    RateLimit(#[from] ForgeError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether the failure says something about the environment rather than the URL.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Write { .. })
    }
}

/// What to do when a download times out.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

/// Quota check to run before each attempt.
pub struct RateLimitContext<'a> {
    pub governor: &'a RateLimitGovernor,
    pub forge: &'a dyn Forge,
}

/// Downloads one URL to a file, retrying timeouts.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Write the body of `url` to `destination`, replacing any previous content.
    ///
    /// Timeouts are retried after the policy delay. Any other failure,
    /// including a non-2xx status, returns immediately.
    #[instrument(skip(self, destination, rate_limit), fields(dest = %destination.display()))]
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        rate_limit: Option<&RateLimitContext<'_>>,
    ) -> Result<(), FetchError> {
        let request = HttpRequest::get(url);
        let mut attempts: u32 = 0;

        loop {
            if let Some(ctx) = rate_limit {
                ctx.governor.pace(ctx.forge).await?;
            }
            attempts += 1;

            match self.transport.get(&request).await {
                Ok(response) if response.is_success() => {
                    tokio::fs::write(destination, &response.body)
                        .await
                        .map_err(|source| FetchError::Write {
                            path: destination.display().to_string(),
                            source,
                        })?;
                    debug!(bytes = response.body.len(), attempts, "downloaded");
                    return Ok(());
                }
                Ok(response) => {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                Err(e) if e.is_timeout() => {
                    if self.retry.max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        attempts,
                        retry_in_secs = self.retry.delay.as_secs(),
                        "read timeout, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(source) => {
                    return Err(FetchError::Request {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;

    fn fetcher(fake: &Arc<FakeTransport>, max_attempts: Option<u32>) -> ResilientFetcher {
        ResilientFetcher::new(
            fake.clone(),
            RetryPolicy {
                delay: Duration::ZERO,
                max_attempts,
            },
        )
    }

    #[tokio::test]
    async fn test_fetch_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("new.obo");
        std::fs::write(&dest, "stale content that is longer").unwrap();
        let fake = Arc::new(FakeTransport::new().with_body("https://raw/x.obo", "fresh"));

        fetcher(&fake, None).fetch("https://raw/x.obo", &dest, None).await.unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("old.obo");
        let fake = Arc::new(
            FakeTransport::new()
                .with_body("https://raw/x.obo", "body")
                .with_timeouts("https://raw/x.obo", 3),
        );

        fetcher(&fake, None).fetch("https://raw/x.obo", &dest, None).await.unwrap();

        assert_eq!(fake.request_count("https://raw/x.obo"), 4);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_bounded_retry_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("old.obo");
        let fake = Arc::new(
            FakeTransport::new()
                .with_body("https://raw/x.obo", "body")
                .with_timeouts("https://raw/x.obo", 5),
        );

        let err = fetcher(&fake, Some(2))
            .fetch("https://raw/x.obo", &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 2, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("new.obo");
        let fake = Arc::new(FakeTransport::new().with_status("https://raw/gone.obo", 404));

        let err = fetcher(&fake, None)
            .fetch("https://raw/gone.obo", &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!err.is_fatal());
        assert_eq!(fake.request_count("https://raw/gone.obo"), 1);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_connection_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("new.obo");
        let fake = Arc::new(FakeTransport::new().with_request_error("https://raw/down.obo"));

        let err = fetcher(&fake, None)
            .fetch("https://raw/down.obo", &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Request { .. }));
        assert_eq!(fake.request_count("https://raw/down.obo"), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_context_is_consulted_each_attempt() {
        use crate::config::PacingConfig;
        use crate::test_support::FakeForge;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("new.obo");
        let fake = Arc::new(
            FakeTransport::new()
                .with_body("https://raw/x.obo", "body")
                .with_timeouts("https://raw/x.obo", 1),
        );
        let forge = FakeForge::new();
        let governor = RateLimitGovernor::new(PacingConfig {
            interval_ms: 0,
            ..PacingConfig::default()
        });
        let ctx = RateLimitContext {
            governor: &governor,
            forge: &forge,
        };

        fetcher(&fake, None)
            .fetch("https://raw/x.obo", &dest, Some(&ctx))
            .await
            .unwrap();

        assert_eq!(forge.rate_limit_checks(), 2);
    }
}
