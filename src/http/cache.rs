use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::trace;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Response cache in front of another transport.
///
/// Only successful responses are stored, and only when the body is at most
/// `max_body_bytes`. A poisoned lock degrades to a pass-through.
pub struct CachingTransport<T> {
    inner: T,
    entries: Mutex<LruCache<CacheKey, HttpResponse>>,
    max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    url: String,
    headers: Vec<(String, String)>,
}

impl From<&HttpRequest> for CacheKey {
    fn from(request: &HttpRequest) -> Self {
        Self {
            url: request.url.clone(),
            headers: request.headers.clone(),
        }
    }
}

impl<T: HttpTransport> CachingTransport<T> {
    pub fn new(inner: T, max_entries: usize, max_body_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            entries: Mutex::new(LruCache::new(capacity)),
            max_body_bytes,
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<HttpResponse> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn store(&self, key: CacheKey, response: &HttpResponse) {
        if !response.is_success() || response.body.len() > self.max_body_bytes {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, response.clone());
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for CachingTransport<T> {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if request.no_cache {
            return self.inner.get(request).await;
        }

        let key = CacheKey::from(request);
        if let Some(hit) = self.lookup(&key) {
            trace!(url = %request.url, "cache hit");
            return Ok(hit);
        }

        let response = self.inner.get(request).await?;
        self.store(key, &response);
        Ok(response)
    }
}
