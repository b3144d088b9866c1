//! URL state as an explicit, injectable store.
//!
//! DESIGN
//! ======
//! List screens keep their page number in the URL query so a reload or a
//! shared link reopens the same page. Instead of reading ambient router
//! state, controllers talk to a [`LocationStore`]; the browser binding and
//! the in-memory [`MemoryLocation`] used by the CLI and tests are
//! interchangeable.

#[cfg(test)]
#[path = "location_test.rs"]
mod location_test;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use url::form_urlencoded;

/// An in-app location: a path plus its query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Location {
    /// Location with `path` and no query.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), query: BTreeMap::new() }
    }

    /// Parse `/path?key=value&...`. A fragment is dropped; repeated keys keep
    /// the last value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head);
        let (path, query) = without_fragment
            .split_once('?')
            .unwrap_or((without_fragment, ""));
        let path = if path.is_empty() { "/" } else { path };
        let query = form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self { path: path.to_owned(), query }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Render back to `/path?key=value` with percent-encoding and keys in
    /// sorted order.
    #[must_use]
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{query}", self.path)
    }
}

/// Where to send the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    /// A route inside the application.
    Internal(Location),
    /// A full URL outside the application (payment processor checkout).
    External(String),
}

impl NavigationTarget {
    #[must_use]
    pub fn internal(raw: &str) -> Self {
        Self::Internal(Location::parse(raw))
    }

    #[must_use]
    pub fn href(&self) -> String {
        match self {
            Self::Internal(location) => location.href(),
            Self::External(url) => url.clone(),
        }
    }
}

/// Read/write access to the current URL.
pub trait LocationStore: Send + Sync {
    /// Snapshot of the current location.
    fn current(&self) -> Location;

    /// Set one query parameter on the current location. Writing the value
    /// already present leaves history untouched.
    fn replace_query(&self, key: &str, value: &str);

    /// Drop one query parameter from the current location.
    fn remove_query(&self, key: &str);

    /// Leave the current location.
    fn navigate(&self, target: NavigationTarget);
}

/// In-memory [`LocationStore`] recording every navigation.
#[derive(Clone, Debug, Default)]
pub struct MemoryLocation {
    inner: Arc<Mutex<MemoryLocationInner>>,
}

#[derive(Debug, Default)]
struct MemoryLocationInner {
    current: Location,
    history: Vec<NavigationTarget>,
}

impl MemoryLocation {
    #[must_use]
    pub fn new(initial: Location) -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryLocationInner { current: initial, history: Vec::new() })) }
    }

    /// Start at a raw `path?query` string.
    #[must_use]
    pub fn at(raw: &str) -> Self {
        Self::new(Location::parse(raw))
    }

    /// Every target this store has been sent to, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<NavigationTarget> {
        self.lock().history.clone()
    }

    #[must_use]
    pub fn last_target(&self) -> Option<NavigationTarget> {
        self.lock().history.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLocationInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocationStore for MemoryLocation {
    fn current(&self) -> Location {
        self.lock().current.clone()
    }

    fn replace_query(&self, key: &str, value: &str) {
        let mut inner = self.lock();
        if inner.current.query_value(key) == Some(value) {
            return;
        }
        inner.current.query.insert(key.to_owned(), value.to_owned());
        let entry = NavigationTarget::Internal(inner.current.clone());
        inner.history.push(entry);
        tracing::debug!(%key, %value, "query rewritten");
    }

    fn remove_query(&self, key: &str) {
        let mut inner = self.lock();
        if inner.current.query.remove(key).is_some() {
            let entry = NavigationTarget::Internal(inner.current.clone());
            inner.history.push(entry);
        }
    }

    fn navigate(&self, target: NavigationTarget) {
        let mut inner = self.lock();
        // External targets leave the app; the in-app location stays put.
        if let NavigationTarget::Internal(location) = &target {
            inner.current = location.clone();
        }
        inner.history.push(target);
    }
}
