//! Page windows derived from a 1-based page number.
//!
//! DESIGN
//! ======
//! The URL carries only the page number. Everything else (offset, limit,
//! whether a next page probably exists) is derived here so list screens never
//! do their own arithmetic.
//!
//! TRADE-OFFS
//! ==========
//! Collection endpoints return a bare array with no total count, so
//! "has next page" is inferred from a full page. When the collection size is
//! an exact multiple of the page size the last full page still offers Next,
//! and that next page comes back empty.

#[cfg(test)]
#[path = "page_test.rs"]
mod page_test;

/// Page size used by every dashboard list unless a screen overrides it.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Name of the URL query parameter holding the page number.
pub const PAGE_PARAM: &str = "page";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// A 1-based page number paired with a fixed page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageWindow {
    page: u32,
    page_size: u32,
}

impl PageWindow {
    /// Build a window. A zero page is clamped to 1.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::ZeroPageSize`] when `page_size` is zero.
    pub fn new(page: u32, page_size: u32) -> Result<Self, PageError> {
        if page_size == 0 {
            return Err(PageError::ZeroPageSize);
        }
        Ok(Self { page: page.max(1), page_size })
    }

    /// Same page size at another page, clamped to 1.
    #[must_use]
    pub fn with_page(self, page: u32) -> Self {
        Self { page: page.max(1), ..self }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records to skip: `(page - 1) * page_size`.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Number of records to request.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.page_size
    }

    /// Records shown by this window given `len` returned items.
    #[must_use]
    pub fn span(&self, len: usize) -> Option<PageSpan> {
        if len == 0 {
            return None;
        }
        let first = self.offset() + 1;
        Some(PageSpan { first, last: self.offset() + len as u64 })
    }
}

/// Inclusive 1-based range of records displayed, for "Showing X to Y" footers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub first: u64,
    pub last: u64,
}

/// Parse the raw `page` query value. Missing, malformed, zero or negative
/// values all fall back to page 1.
#[must_use]
pub fn parse_page_param(raw: Option<&str>) -> u32 {
    raw.map(str::trim)
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

/// A full page suggests another page may follow.
#[must_use]
pub fn has_next_page(len: usize, page_size: u32) -> bool {
    u32::try_from(len).is_ok_and(|len| len == page_size)
}

#[must_use]
pub fn has_previous_page(page: u32) -> bool {
    page > 1
}
