//! Paged list controller.
//!
//! DESIGN
//! ======
//! A [`PagedList`] turns the `page` query parameter into a fetch and turns
//! next/previous intent back into a query rewrite. Navigation never fetches
//! on its own: [`PagedList::load`] derives a [`QueryKey`] from the current
//! location and filters and fetches only when that key has no fresh cache
//! entry.
//!
//! Concurrent loads are ordered by generation. Each fetch takes the next
//! generation number; when it resolves it is applied only if no newer load
//! started and the location still points at the same key. Older results are
//! cached under their own key but never displayed, and never replace data
//! that a later fetch already stored.
//!
//! While a fetch is in flight the previous page stays on screen and
//! [`ListView::placeholder`] reports that it belongs to another key.
//!
//! ERROR HANDLING
//! ==============
//! A failed fetch sets [`ListStatus::Failed`] and keeps the last displayed
//! items. There is no retry here; reads are retried by the collaborator.

#[cfg(test)]
#[path = "list_test.rs"]
mod list_test;

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::ApiError;
use crate::cache::{QueryCache, QueryKey, Stored};
use crate::location::{Location, LocationStore, MemoryLocation};
use crate::page::{DEFAULT_PAGE_SIZE, PAGE_PARAM, PageError, PageSpan, PageWindow, has_next_page, has_previous_page, parse_page_param};
use crate::source::{CollectionSource, Filters, PageQuery};

// =============================================================================
// VIEW TYPES
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ListStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// What a list screen renders.
#[derive(Debug)]
pub struct ListView<T> {
    pub items: Arc<Vec<T>>,
    pub status: ListStatus,
    /// Items belong to a different page or filter set than the URL shows.
    pub placeholder: bool,
    pub span: Option<PageSpan>,
    pub page: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Clone for ListView<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            status: self.status.clone(),
            placeholder: self.placeholder,
            span: self.span,
            page: self.page,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

/// How a [`PagedList::load`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Served from a fresh cache entry without a request.
    Cached,
    /// Fetched and displayed `len` records.
    Fetched { len: usize },
    /// A newer load or a location change made this result obsolete.
    Superseded,
}

// =============================================================================
// CONTROLLER
// =============================================================================

struct Displayed<T> {
    key: QueryKey,
    window: PageWindow,
    items: Arc<Vec<T>>,
}

struct ListState<T> {
    filters: Filters,
    displayed: Option<Displayed<T>>,
    status: ListStatus,
    generation: u64,
}

pub struct PagedList<T, S> {
    collection: String,
    source: Arc<S>,
    base: PageWindow,
    location: Arc<dyn LocationStore>,
    cache: QueryCache,
    state: Arc<Mutex<ListState<T>>>,
}

impl<T, S> Clone for PagedList<T, S> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            source: Arc::clone(&self.source),
            base: self.base,
            location: Arc::clone(&self.location),
            cache: self.cache.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

pub struct PagedListBuilder<T, S> {
    collection: String,
    source: S,
    page_size: u32,
    filters: Filters,
    location: Option<Arc<dyn LocationStore>>,
    cache: Option<QueryCache>,
    _record: PhantomData<fn() -> T>,
}

impl<T, S> PagedListBuilder<T, S> {
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Initial filters, sent with every request.
    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn location(mut self, store: Arc<dyn LocationStore>) -> Self {
        self.location = Some(store);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # Errors
    ///
    /// Returns [`PageError::ZeroPageSize`] for a zero page size.
    pub fn build(self) -> Result<PagedList<T, S>, PageError> {
        let base = PageWindow::new(1, self.page_size)?;
        let location = self
            .location
            .unwrap_or_else(|| Arc::new(MemoryLocation::new(Location::new("/"))));
        Ok(PagedList {
            collection: self.collection,
            source: Arc::new(self.source),
            base,
            location,
            cache: self.cache.unwrap_or_default(),
            state: Arc::new(Mutex::new(ListState {
                filters: self.filters,
                displayed: None,
                status: ListStatus::Idle,
                generation: 0,
            })),
        })
    }
}

impl<T, S> PagedList<T, S>
where
    T: Send + Sync + 'static,
    S: CollectionSource<T>,
{
    /// Start building a list over `collection` (the cache key's first
    /// segment) fed by `source`.
    #[must_use]
    pub fn builder(collection: impl Into<String>, source: S) -> PagedListBuilder<T, S> {
        PagedListBuilder {
            collection: collection.into(),
            source,
            page_size: DEFAULT_PAGE_SIZE,
            filters: Filters::new(),
            location: None,
            cache: None,
            _record: PhantomData,
        }
    }

    /// Show the current key's records, fetching only when the cache has no
    /// fresh entry for it.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's error when the fetch for the current key
    /// fails. The list keeps its last items and reports
    /// [`ListStatus::Failed`].
    pub async fn load(&self) -> Result<LoadOutcome, ApiError> {
        let window = self.window();
        let key = self.key();
        let query = self.query();

        let cached = self.cache.get::<Vec<T>>(&key);
        let generation = {
            let mut state = self.lock();
            if let Some(entry) = &cached {
                state.displayed = Some(Displayed { key: key.clone(), window, items: Arc::clone(&entry.data) });
                if !entry.stale {
                    state.status = ListStatus::Ready;
                    tracing::debug!(collection = %self.collection, page = window.page(), "cache hit");
                    return Ok(LoadOutcome::Cached);
                }
            }
            state.generation += 1;
            state.status = ListStatus::Loading;
            state.generation
        };

        tracing::debug!(collection = %self.collection, page = window.page(), generation, "fetching page");
        let ticket = self.cache.ticket();
        let result = self.source.fetch_page(&query).await.map(Arc::new);

        // Kept for its own key unless newer data landed meanwhile.
        let stored = match &result {
            Ok(items) => Some(self.cache.put_fetched(key.clone(), Arc::clone(items), ticket)),
            Err(_) => None,
        };

        let current_key = self.key();
        let mut state = self.lock();
        if state.generation != generation || current_key != key {
            tracing::debug!(collection = %self.collection, page = window.page(), generation, ?stored, "superseded fetch discarded");
            if state.generation == generation {
                // No newer load is running to settle the status.
                let shows_current = state.displayed.as_ref().is_some_and(|displayed| displayed.key == current_key);
                state.status = if shows_current { ListStatus::Ready } else { ListStatus::Idle };
            }
            return Ok(LoadOutcome::Superseded);
        }

        match result {
            Ok(fetched) => {
                let items = match stored {
                    Some(Stored::Rejected) => self.cache.get::<Vec<T>>(&key).map_or(fetched, |entry| entry.data),
                    _ => fetched,
                };
                let len = items.len();
                state.displayed = Some(Displayed { key, window, items });
                state.status = ListStatus::Ready;
                Ok(LoadOutcome::Fetched { len })
            }
            Err(err) => {
                tracing::warn!(collection = %self.collection, page = window.page(), error = %err, "page fetch failed");
                state.status = ListStatus::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Mark the current key stale and load it again.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub async fn refresh(&self) -> Result<LoadOutcome, ApiError> {
        self.cache.invalidate(&self.key());
        self.load().await
    }

    /// Fetch the following page into the cache without displaying it.
    /// Returns whether a request was made.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's error; list state is untouched.
    pub async fn prefetch_next(&self) -> Result<bool, ApiError> {
        if !self.can_go_next() {
            return Ok(false);
        }
        let window = self.window().with_page(self.page().saturating_add(1));
        let filters = self.filters();
        let key = self.key_for(window, &filters);
        if self.cache.get::<Vec<T>>(&key).is_some_and(|entry| !entry.stale) {
            return Ok(false);
        }
        tracing::debug!(collection = %self.collection, page = window.page(), "prefetching page");
        let ticket = self.cache.ticket();
        let items = self.source.fetch_page(&PageQuery::new(window, filters)).await?;
        self.cache.put_fetched(key, Arc::new(items), ticket);
        Ok(true)
    }
}

impl<T, S> PagedList<T, S> {
    /// Current page from the `page` query parameter.
    #[must_use]
    pub fn page(&self) -> u32 {
        parse_page_param(self.location.current().query_value(PAGE_PARAM))
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.base.page_size()
    }

    #[must_use]
    pub fn window(&self) -> PageWindow {
        self.base.with_page(self.page())
    }

    #[must_use]
    pub fn filters(&self) -> Filters {
        self.lock().filters.clone()
    }

    #[must_use]
    pub fn query(&self) -> PageQuery {
        PageQuery::new(self.window(), self.filters())
    }

    /// `[collection, page=N, filter=value, ...]`.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        self.key_for(self.window(), &self.filters())
    }

    fn key_for(&self, window: PageWindow, filters: &Filters) -> QueryKey {
        filters.iter().fold(
            QueryKey::new(self.collection.as_str()).with(format!("page={}", window.page())),
            |key, (name, value)| key.with(format!("{name}={value}")),
        )
    }

    /// Rewrite the `page` parameter. Pages below 1 are ignored.
    pub fn go_to_page(&self, page: u32) -> bool {
        if page < 1 {
            return false;
        }
        self.location.replace_query(PAGE_PARAM, &page.to_string());
        true
    }

    pub fn next(&self) -> bool {
        self.can_go_next() && self.go_to_page(self.page().saturating_add(1))
    }

    pub fn previous(&self) -> bool {
        self.has_previous() && self.go_to_page(self.page() - 1)
    }

    /// Set one filter and go back to the first page.
    pub fn set_filter(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().filters.set(name, value);
        self.reset_page();
    }

    /// Drop one filter and go back to the first page.
    pub fn clear_filter(&self, name: &str) {
        let removed = self.lock().filters.remove(name);
        if removed {
            self.reset_page();
        }
    }

    fn reset_page(&self) {
        if self.page() != 1 {
            self.go_to_page(1);
        }
    }

    /// The displayed page came back full.
    #[must_use]
    pub fn has_next(&self) -> bool {
        let state = self.lock();
        state
            .displayed
            .as_ref()
            .is_some_and(|displayed| has_next_page(displayed.items.len(), self.base.page_size()))
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        has_previous_page(self.page())
    }

    /// Next is offered only for a full page that matches the URL.
    #[must_use]
    pub fn can_go_next(&self) -> bool {
        self.has_next() && !self.is_placeholder()
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        let key = self.key();
        self.lock().displayed.as_ref().is_some_and(|displayed| displayed.key != key)
    }

    #[must_use]
    pub fn status(&self) -> ListStatus {
        self.lock().status.clone()
    }

    #[must_use]
    pub fn state(&self) -> ListView<T> {
        let key = self.key();
        let page = self.page();
        let state = self.lock();
        let (items, placeholder, span) = match &state.displayed {
            Some(displayed) => (
                Arc::clone(&displayed.items),
                displayed.key != key,
                displayed.window.span(displayed.items.len()),
            ),
            None => (Arc::new(Vec::new()), false, None),
        };
        ListView {
            has_next: has_next_page(items.len(), self.base.page_size()),
            has_previous: has_previous_page(page),
            items,
            status: state.status.clone(),
            placeholder,
            span,
            page,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
