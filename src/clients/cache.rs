use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use super::github_curl::Transport;

/// In-process cache of GET responses keyed by URL.
///
/// Any mutating request drops every cached response.
pub struct CachedTransport<T> {
    inner: T,
    enabled: bool,
    responses: RefCell<HashMap<String, String>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl<T: Transport> CachedTransport<T> {
    pub fn new(inner: T, enabled: bool) -> Self {
        Self {
            inner,
            enabled,
            responses: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    fn invalidate(&self) {
        self.responses.borrow_mut().clear();
    }
}

impl<T: Transport> Transport for CachedTransport<T> {
    async fn get(&self, url: &str) -> Result<String> {
        if !self.enabled {
            return self.inner.get(url).await;
        }
        let cached = self.responses.borrow().get(url).cloned();
        if let Some(response) = cached {
            debug!("cache hit {}", url);
            self.hits.set(self.hits.get() + 1);
            return Ok(response);
        }
        self.misses.set(self.misses.get() + 1);
        let response = self.inner.get(url).await?;
        self.responses
            .borrow_mut()
            .insert(url.to_string(), response.clone());
        Ok(response)
    }

    async fn post(&self, url: &str, json_data: &str) -> Result<String> {
        self.invalidate();
        self.inner.post(url, json_data).await
    }

    async fn patch(&self, url: &str, json_data: &str) -> Result<String> {
        self.invalidate();
        self.inner.patch(url, json_data).await
    }

    async fn put(&self, url: &str, json_data: &str) -> Result<String> {
        self.invalidate();
        self.inner.put(url, json_data).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.invalidate();
        self.inner.delete(url).await
    }

    fn statistics(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        Some(format!(
            "cache: {} requests, {} hits, {} misses, {} entries",
            self.hits.get() + self.misses.get(),
            self.hits.get(),
            self.misses.get(),
            self.responses.borrow().len()
        ))
    }
}
