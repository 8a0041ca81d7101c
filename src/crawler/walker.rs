//! Page walker
//!
//! Drives one ordered sequence of page fetches for a single parent:
//! 1. Fetch the page at the current cursor (with detail on the first page)
//! 2. Extract items, skipping any that fail extraction
//! 3. Gate items on recency: a newest-first listing is truncated at the
//!    first stale item, an oldest-first one only drops stale items
//! 4. Hand the accepted batch to the sink before fetching again
//! 5. Stop on an empty page, a short page, a stale item, the page cap,
//!    a fetch or persist failure, or cancellation
//! 6. Otherwise sleep the fixed inter-page delay and advance the cursor

use crate::crawler::{
    Cursor, DetailRecord, Extractor, Keyed, ListingOrder, PageSource, ParentId, Record,
};
use crate::recency::{Recency, RecencyGate};
use crate::state::WalkStop;
use crate::storage::Sink;
use crate::HarvestError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which signals end a walk early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// A page with fewer items than the page size is the last one
    pub short_page: bool,
    /// The first item outside the window ends the walk of a newest-first
    /// listing; other listings always filter stale items
    pub stale_item: bool,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            short_page: true,
            stale_item: true,
        }
    }
}

/// Per-walk settings shared by every walk in a dispatch
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub termination: TerminationPolicy,
    /// Pause between consecutive fetches of one walk
    pub page_delay: Duration,
    /// Upper bound on fetches per walk
    pub max_pages: Option<u32>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            termination: TerminationPolicy::default(),
            page_delay: Duration::from_millis(1000),
            max_pages: None,
        }
    }
}

/// Outcome of one walk
///
/// `items` holds every record the sink accepted. A walk can carry both
/// items and an error when a later page failed.
#[derive(Debug)]
pub struct WalkResult {
    pub parent: ParentId,
    pub items: Vec<Record>,
    pub detail: Option<DetailRecord>,
    pub error: Option<HarvestError>,
    pub stop: WalkStop,
    pub pages_fetched: u32,
    /// Rows inserted or updated by the sink
    pub persisted: u64,
    /// Items dropped because extraction failed
    pub skipped: usize,
    /// Items dropped by the recency gate without ending the walk
    pub filtered: usize,
}

impl WalkResult {
    fn new(parent: ParentId) -> Self {
        Self {
            parent,
            items: Vec::new(),
            detail: None,
            error: None,
            stop: WalkStop::EmptyPage,
            pages_fetched: 0,
            persisted: 0,
            skipped: 0,
            filtered: 0,
        }
    }

    fn fail(&mut self, stop: WalkStop, error: HarvestError) {
        self.stop = stop;
        self.error = Some(error);
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Walks one paginated listing under one parent
pub struct PageWalker<S, E> {
    source: Arc<S>,
    extractor: Arc<E>,
    sink: Arc<dyn Sink>,
    config: WalkConfig,
}

impl<S, E> Clone for PageWalker<S, E> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&self.sink),
            config: self.config.clone(),
        }
    }
}

impl<S, E> PageWalker<S, E>
where
    S: PageSource,
    E: Extractor<Item = S::Item, Detail = S::Detail>,
{
    pub fn new(source: Arc<S>, extractor: Arc<E>, sink: Arc<dyn Sink>, config: WalkConfig) -> Self {
        Self {
            source,
            extractor,
            sink,
            config,
        }
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// Cursor of the first page of every walk
    pub fn first_cursor(&self) -> Cursor {
        self.source.first_cursor()
    }

    fn page_limit_reached(&self, pages_fetched: u32) -> bool {
        self.config
            .max_pages
            .map_or(false, |max| pages_fetched >= max)
    }

    /// Walks the listing under `parent` starting at `cursor0`
    ///
    /// # Arguments
    ///
    /// * `parent` - The entity being paginated under
    /// * `cursor0` - The first cursor; detail is extracted only for this page
    /// * `gate` - Recency predicate resolved once for the whole dispatch
    /// * `cancel` - Checked before every fetch and raced against every delay
    ///
    /// # Returns
    ///
    /// The walk result; fetch and persist failures are carried in `error`
    /// alongside any items persisted before the failure.
    pub async fn walk(
        &self,
        parent: ParentId,
        cursor0: Cursor,
        gate: &RecencyGate,
        cancel: &CancellationToken,
    ) -> WalkResult {
        let mut result = WalkResult::new(parent.clone());
        let page_size = self.source.page_size();
        let cursor_kind = self.source.cursor_kind();
        let order = self.source.order();
        let stop_on_stale =
            self.config.termination.stale_item && order == ListingOrder::NewestFirst;
        let mut cursor = cursor0;

        loop {
            if cancel.is_cancelled() {
                result.fail(
                    WalkStop::Cancelled,
                    HarvestError::Cancelled {
                        parent: parent.to_string(),
                    },
                );
                break;
            }

            if self.page_limit_reached(result.pages_fetched) {
                result.stop = WalkStop::PageLimit;
                break;
            }

            let first_page = cursor == cursor0;
            tracing::trace!("Fetching page {} for {}", cursor, parent);

            let page = match self.source.fetch_page(&parent, cursor, first_page).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Fetch failed for {} at cursor {}: {}", parent, cursor, e);
                    result.fail(WalkStop::Error, e);
                    break;
                }
            };
            result.pages_fetched += 1;

            if first_page {
                if let Some(raw) = &page.detail {
                    match self.extractor.extract_detail(&parent, raw) {
                        Ok(detail) => result.detail = Some(detail),
                        Err(e) => tracing::warn!("Dropping detail for {}: {}", parent, e),
                    }
                }
            }

            let raw_count = page.items.len();
            if raw_count == 0 {
                result.stop = WalkStop::EmptyPage;
                break;
            }

            let mut batch = Vec::with_capacity(raw_count);
            let mut hit_stale = false;

            for raw in &page.items {
                let record = match self.extractor.extract(&parent, raw) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::debug!("Skipping item under {}: {}", parent, e);
                        result.skipped += 1;
                        continue;
                    }
                };

                if order == ListingOrder::Unbounded {
                    batch.push(record);
                    continue;
                }

                match gate.evaluate(record.timestamp()) {
                    Recency::Recent => batch.push(record),
                    _ if stop_on_stale => {
                        tracing::debug!(
                            "Item {} under {} is out of window",
                            record.natural_key(),
                            parent
                        );
                        hit_stale = true;
                        break;
                    }
                    _ => result.filtered += 1,
                }
            }

            if first_page {
                if let (Some(detail), Some(head)) = (&result.detail, batch.first_mut()) {
                    head.attach_detail(detail);
                }
            }

            if !batch.is_empty() {
                match self.sink.upsert_batch(&batch) {
                    Ok(affected) => result.persisted += affected,
                    Err(e) => {
                        tracing::error!("Sink rejected batch for {}: {}", parent, e);
                        result.fail(WalkStop::Error, HarvestError::Persistence(e));
                        break;
                    }
                }
                result.items.extend(batch);
            }

            if hit_stale {
                result.stop = WalkStop::StaleItem;
                break;
            }

            if self.config.termination.short_page && page_size > 0 && raw_count < page_size {
                result.stop = WalkStop::ShortPage;
                break;
            }

            let next = page
                .next_cursor
                .unwrap_or_else(|| cursor.advance(cursor_kind, page_size));
            if next == cursor {
                result.stop = WalkStop::Exhausted;
                break;
            }

            if self.page_limit_reached(result.pages_fetched) {
                result.stop = WalkStop::PageLimit;
                break;
            }

            // Only pace when another fetch follows
            if !self.config.page_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        result.fail(
                            WalkStop::Cancelled,
                            HarvestError::Cancelled {
                                parent: parent.to_string(),
                            },
                        );
                        break;
                    }
                    _ = tokio::time::sleep(self.config.page_delay) => {}
                }
            }

            cursor = next;
        }

        tracing::info!(
            "Walk for {} stopped ({}): {} pages, {} items, {} skipped",
            parent,
            result.stop,
            result.pages_fetched,
            result.items.len(),
            result.skipped
        );

        result
    }
}
