//! Collaborator seams for list fetches and command submits.
//!
//! SYSTEM CONTEXT
//! ==============
//! Controllers never talk HTTP directly. They depend on [`CollectionSource`]
//! and [`CommandSink`], which the `api` module implements over `reqwest` and
//! which tests satisfy with plain async closures.

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;

use std::collections::BTreeMap;
use std::future::Future;

use crate::api::ApiError;
use crate::page::PageWindow;

/// Optional list filters (`active_only`, `upcoming_only`, `search`, ...).
///
/// Ordered so the same filters always produce the same cache key and the
/// same query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns whether a value was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.0.remove(key).is_some()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect())
    }
}

/// One collection request: `{skip, limit, ...filters}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub skip: u64,
    pub limit: u32,
    pub filters: Filters,
}

impl PageQuery {
    #[must_use]
    pub fn new(window: PageWindow, filters: Filters) -> Self {
        Self { skip: window.offset(), limit: window.limit(), filters }
    }

    /// Query-string pairs: `skip`, `limit`, then filters in key order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("skip".to_owned(), self.skip.to_string()), ("limit".to_owned(), self.limit.to_string())];
        pairs.extend(self.filters.iter().map(|(key, value)| (key.to_owned(), value.to_owned())));
        pairs
    }
}

/// A remote collection that returns one ordered slice per request.
#[async_trait::async_trait]
pub trait CollectionSource<T>: Send + Sync {
    /// Fetch the records for `query`.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<T>, ApiError>;
}

#[async_trait::async_trait]
impl<T, F, Fut> CollectionSource<T> for F
where
    T: Send + 'static,
    F: Fn(PageQuery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<T>, ApiError>> + Send,
{
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<T>, ApiError> {
        (self)(query.clone()).await
    }
}

/// A remote command that turns a payload into a created/updated resource.
#[async_trait::async_trait]
pub trait CommandSink<P, R>: Send + Sync {
    async fn submit(&self, payload: &P) -> Result<R, ApiError>;
}

#[async_trait::async_trait]
impl<P, R, F, Fut> CommandSink<P, R> for F
where
    P: Clone + Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ApiError>> + Send,
{
    async fn submit(&self, payload: &P) -> Result<R, ApiError> {
        (self)(payload.clone()).await
    }
}
