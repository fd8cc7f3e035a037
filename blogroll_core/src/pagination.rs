//! Fixed-size page slicing with clamped, 1-based page numbers.
//!
//! Out-of-range requests never fail: anything below 1 resolves to the first
//! page and anything past the end resolves to the last one. An empty sequence
//! still has one (empty) page.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A page number as requested by a caller, before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageRequest(i64);

impl PageRequest {
    pub const FIRST: PageRequest = PageRequest(1);

    pub const fn new(number: i64) -> Self {
        Self(number)
    }

    /// Parse a raw `?page=` value. Missing or non-numeric input means page 1.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map_or(Self::FIRST, Self)
    }

    pub const fn number(&self) -> i64 {
        self.0
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::FIRST
    }
}

impl From<i64> for PageRequest {
    fn from(number: i64) -> Self {
        Self(number)
    }
}

/// Where a request lands once clamped against the size of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    /// 1-based page number, always within `1..=num_pages`.
    pub number: u64,
    pub num_pages: u64,
    pub page_size: u64,
    pub total_items: u64,
}

impl PageBounds {
    /// A page size of 0 is treated as 1.
    pub fn resolve(total_items: u64, page_size: u64, request: PageRequest) -> Self {
        let page_size = page_size.max(1);
        let num_pages = total_items.div_ceil(page_size).max(1);
        let number = match u64::try_from(request.number()) {
            Ok(0) | Err(_) => 1,
            Ok(n) => n.min(num_pages),
        };

        Self {
            number,
            num_pages,
            page_size,
            total_items,
        }
    }

    /// Zero-based index of the page, as sea-orm's paginator expects.
    pub fn index(&self) -> u64 {
        self.number - 1
    }

    pub fn offset(&self) -> u64 {
        self.index() * self.page_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub page_size: u64,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, bounds: PageBounds) -> Self {
        Self {
            items,
            number: bounds.number,
            num_pages: bounds.num_pages,
            page_size: bounds.page_size,
            total_items: bounds.total_items,
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn next_page_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            page_size: self.page_size,
            total_items: self.total_items,
        }
    }
}

/// Slice an already ordered sequence.
pub fn paginate<T: Clone>(items: &[T], page_size: u64, request: PageRequest) -> Page<T> {
    let bounds = PageBounds::resolve(items.len() as u64, page_size, request);

    let start = usize::try_from(bounds.offset())
        .unwrap_or(usize::MAX)
        .min(items.len());
    let end = start
        .saturating_add(usize::try_from(bounds.page_size).unwrap_or(usize::MAX))
        .min(items.len());

    Page::new(items[start..end].to_vec(), bounds)
}
