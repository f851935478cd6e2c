//! Session-scoped resolution context: the cookie-carrying HTTP client, the
//! endpoint bases, and the write-once caches shared by all flows on a page.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use reqwest::Client;
use serde_json::Value;

use super::ResolveError;

const DEFAULT_PAGE_BASE: &str = "https://www.instagram.com";
const DEFAULT_INFO_BASE: &str = "https://i.instagram.com/api/v1/media";

/// Unbounded write-once map. The first successful write for a key wins;
/// later writes for the same key are dropped, so concurrent flows that
/// computed the same value race harmlessly.
#[derive(Debug)]
pub struct Cache<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Cached value for `key`, if any.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.read().ok()?.get(key).cloned()
    }

    /// Stores `value` unless the key is already present, returning the
    /// winning value either way.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        match self.inner.write() {
            Ok(mut map) => map.entry(key).or_insert(value).clone(),
            // A poisoned lock means a writer panicked; serve the caller's
            // value rather than propagate the panic.
            Err(_) => value,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// One page session: lives as long as the page, owns the caches.
#[derive(Debug)]
pub struct Session {
    client: Client,
    page_base: String,
    info_base: String,
    media_ids: Cache<String, String>,
    media_info: Cache<String, Arc<Value>>,
}

impl Session {
    /// Creates a session against the production endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_base_urls(DEFAULT_PAGE_BASE, DEFAULT_INFO_BASE)
    }

    /// Creates a session with custom endpoint bases (used by tests).
    ///
    /// `page_base` serves permalinks (`{page_base}/p/{post_id}/`);
    /// `info_base` serves media metadata (`{info_base}/{media_id}/info/`).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the HTTP client cannot be constructed.
    pub fn with_base_urls(
        page_base: impl Into<String>,
        info_base: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        // The cookie store carries the ambient platform session; the crate
        // never authenticates on its own.
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            page_base: page_base.into(),
            info_base: info_base.into(),
            media_ids: Cache::new(),
            media_info: Cache::new(),
        })
    }

    /// Shared HTTP client with the session cookie store.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Page origin used for permalink fetches and `Origin` headers.
    #[must_use]
    pub fn page_base(&self) -> &str {
        &self.page_base
    }

    /// Canonical permalink for a post id.
    #[must_use]
    pub fn permalink_url(&self, post_id: &str) -> String {
        format!("{}/p/{post_id}/", self.page_base.trim_end_matches('/'))
    }

    /// Info endpoint for a media id.
    #[must_use]
    pub fn info_url(&self, media_id: &str) -> String {
        format!("{}/{media_id}/info/", self.info_base.trim_end_matches('/'))
    }

    /// post id → media id cache.
    #[must_use]
    pub fn media_ids(&self) -> &Cache<String, String> {
        &self.media_ids
    }

    /// media id → raw info response cache.
    #[must_use]
    pub fn media_info(&self) -> &Cache<String, Arc<Value>> {
        &self.media_info
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_first_write_wins() {
        let cache: Cache<String, String> = Cache::new();
        let first = cache.insert_if_absent("post".to_string(), "111".to_string());
        let second = cache.insert_if_absent("post".to_string(), "222".to_string());
        assert_eq!(first, "111");
        assert_eq!(second, "111", "a later write must not overwrite the key");
        assert_eq!(cache.get("post").as_deref(), Some("111"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_miss_is_none() {
        let cache: Cache<String, String> = Cache::new();
        assert!(cache.get("absent").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_session_endpoint_urls() {
        let session =
            Session::with_base_urls("http://127.0.0.1:9/page/", "http://127.0.0.1:9/api").unwrap();
        assert_eq!(
            session.permalink_url("Cabc"),
            "http://127.0.0.1:9/page/p/Cabc/"
        );
        assert_eq!(session.info_url("31415"), "http://127.0.0.1:9/api/31415/info/");
    }
}
