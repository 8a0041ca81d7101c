//! Page source and extractor seams
//!
//! The walker reaches remote listings only through these two traits:
//! - `PageSource::fetch_page` returns one page of raw items plus, when asked,
//!   the raw parent detail found on that same page
//! - `Extractor` turns raw items and raw detail into `Record`s

use crate::crawler::{DetailRecord, Record};
use crate::HarvestError;
use async_trait::async_trait;
use std::fmt;

/// Identifier of the entity a walk paginates under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParentId(String);

impl ParentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How a source's cursor moves between pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    /// Item offset, advanced by the page size (`?start=0,50,100`)
    #[default]
    Offset,
    /// Page number, advanced by one
    PageNumber,
}

/// Position of one page within a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cursor(pub u64);

impl Cursor {
    pub const ZERO: Cursor = Cursor(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the cursor of the following page
    pub fn advance(self, kind: CursorKind, page_size: usize) -> Self {
        let step = match kind {
            CursorKind::Offset => page_size as u64,
            CursorKind::PageNumber => 1,
        };
        Cursor(self.0.saturating_add(step.max(1)))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One fetched page of raw items
#[derive(Debug, Clone)]
pub struct FetchedPage<I, D> {
    pub items: Vec<I>,
    /// Raw parent detail, only present when requested
    pub detail: Option<D>,
    /// Explicit next cursor for token-style listings; repeating the
    /// current cursor marks the listing exhausted
    pub next_cursor: Option<Cursor>,
}

impl<I, D> FetchedPage<I, D> {
    pub fn new(items: Vec<I>) -> Self {
        Self {
            items,
            detail: None,
            next_cursor: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<D>) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_next_cursor(mut self, next: Cursor) -> Self {
        self.next_cursor = Some(next);
        self
    }
}

/// How a listing orders its items in time
///
/// Decides what an out-of-window item means to the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingOrder {
    /// Newest first; every item after a stale one is stale too
    #[default]
    NewestFirst,
    /// Oldest first; stale items are filtered and the walk goes on
    OldestFirst,
    /// Not bounded by time; every item is kept
    Unbounded,
}

/// A paginated remote listing
///
/// An empty `items` vector is not an error; it marks an exhausted listing.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send + Sync;
    type Detail: Send + Sync;

    /// Nominal number of items per full page
    ///
    /// Zero means the server sizes its pages, which turns off short-page
    /// termination for this source.
    fn page_size(&self) -> usize;

    fn order(&self) -> ListingOrder {
        ListingOrder::NewestFirst
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Offset
    }

    fn first_cursor(&self) -> Cursor {
        Cursor::ZERO
    }

    /// Fetches one page
    ///
    /// # Arguments
    ///
    /// * `parent` - The entity being paginated under
    /// * `cursor` - Position of the page to fetch
    /// * `with_detail` - Whether to also pull parent-level detail from this page
    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        with_detail: bool,
    ) -> Result<FetchedPage<Self::Item, Self::Detail>, HarvestError>;
}

/// Converts raw items into records
pub trait Extractor: Send + Sync {
    type Item;
    type Detail;

    /// Extracts one record; a failure only skips this item
    fn extract(&self, parent: &ParentId, raw: &Self::Item) -> Result<Record, HarvestError>;

    /// Extracts parent-level detail from the first page
    fn extract_detail(
        &self,
        parent: &ParentId,
        raw: &Self::Detail,
    ) -> Result<DetailRecord, HarvestError> {
        let _ = raw;
        Err(HarvestError::parse(format!(
            "no detail extractor for parent {}",
            parent
        )))
    }
}
