//! Client-side collection cache shared by list screens and mutations.
//!
//! DESIGN
//! ======
//! Entries are keyed by [`QueryKey`] and hold type-erased `Arc` payloads so one
//! cache can serve every collection. Mutations never write entries; they only
//! mark them stale by key prefix. Stale entries stay readable so a list can
//! keep showing them while it refetches.
//!
//! The lock is never held across an `.await`; callers clone the `Arc` out and
//! release it before doing anything asynchronous.

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Ordered key segments. The first segment names the collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self(vec![collection.into()])
    }

    #[must_use]
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Collection name (first segment).
    #[must_use]
    pub fn collection(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// Whether every segment of `prefix` matches the start of this key.
    #[must_use]
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<&str> for QueryKey {
    fn from(collection: &str) -> Self {
        Self::new(collection)
    }
}

/// Typed view of a cached entry.
#[derive(Debug)]
pub struct CachedEntry<T> {
    pub data: Arc<T>,
    pub stale: bool,
    pub fetched_at: Instant,
}

impl<T> Clone for CachedEntry<T> {
    fn clone(&self) -> Self {
        Self { data: Arc::clone(&self.data), stale: self.stale, fetched_at: self.fetched_at }
    }
}

struct Entry {
    data: Arc<dyn Any + Send + Sync>,
    stale: bool,
    fetched_at: Instant,
    version: u64,
}

/// Position in the cache's write order, taken when a fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// What [`QueryCache::put_fetched`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    Fresh,
    /// Stored, but a covering prefix was invalidated while it was in flight.
    Stale,
    /// Newer data for the key landed first; nothing was written.
    Rejected,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, Entry>,
    /// Prefix to the version of its latest invalidation.
    invalidated: HashMap<QueryKey, u64>,
    version: u64,
}

impl CacheInner {
    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Shared cache handle. Clones point at the same entries.
#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache").field("entries", &self.len()).finish()
    }
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh entry, replacing whatever was under `key`.
    pub fn put<T: Send + Sync + 'static>(&self, key: QueryKey, data: Arc<T>) {
        let mut inner = self.lock();
        let version = inner.bump();
        inner.entries.insert(key, Entry { data, stale: false, fetched_at: Instant::now(), version });
    }

    /// Take a ticket before issuing a fetch whose result goes through
    /// [`put_fetched`](Self::put_fetched).
    #[must_use]
    pub fn ticket(&self) -> FetchTicket {
        FetchTicket(self.lock().bump())
    }

    /// Store a response fetched under `ticket`. Data written to `key` after
    /// the ticket wins; an invalidation of a covering prefix after the ticket
    /// leaves the stored entry stale.
    pub fn put_fetched<T: Send + Sync + 'static>(&self, key: QueryKey, data: Arc<T>, ticket: FetchTicket) -> Stored {
        let mut inner = self.lock();
        if inner.entries.get(&key).is_some_and(|entry| entry.version > ticket.0) {
            return Stored::Rejected;
        }
        let stale = inner
            .invalidated
            .iter()
            .any(|(prefix, version)| *version > ticket.0 && key.starts_with(prefix));
        let version = inner.bump();
        inner.entries.insert(key, Entry { data, stale, fetched_at: Instant::now(), version });
        if stale { Stored::Stale } else { Stored::Fresh }
    }

    /// Read an entry. A missing key or a type mismatch is a miss.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<CachedEntry<T>> {
        let inner = self.lock();
        let entry = inner.entries.get(key)?;
        let data = Arc::clone(&entry.data).downcast::<T>().ok()?;
        Some(CachedEntry { data, stale: entry.stale, fetched_at: entry.fetched_at })
    }

    /// Mark every entry under `prefix` stale, including responses still in
    /// flight. Returns how many stored entries were marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut inner = self.lock();
        let version = inner.bump();
        inner.invalidated.insert(prefix.clone(), version);
        let mut marked = 0;
        for (key, entry) in &mut inner.entries {
            if key.starts_with(prefix) {
                entry.stale = true;
                marked += 1;
            }
        }
        tracing::debug!(prefix = %prefix, marked, "cache invalidated");
        marked
    }

    /// Drop every entry under `prefix`. Returns how many were dropped.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        before - inner.entries.len()
    }

    #[must_use]
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.lock().entries.get(key).map(|entry| entry.stale)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
