//! Crawler module: the bounded pagination engine
//!
//! This module contains the core harvesting logic, including:
//! - `PageSource` / `Extractor`: the seams to site adapters
//! - `PageWalker`: one recency-bounded walk over a paginated listing
//! - `FanOutDispatcher`: one walk per parent under a concurrency bound
//! - HTTP helpers shared by the site adapters
//! - `Harvester`: end-to-end orchestration for a configuration

mod coordinator;
mod dispatcher;
mod fetcher;
mod record;
mod source;
mod walker;

pub use coordinator::{HarvestReport, Harvester, PhaseReport};
pub use dispatcher::{
    complete_parent, DispatchConfig, DispatchOutcome, FailurePolicy, FanOutDispatcher, WalkFailure,
};
pub use fetcher::{build_http_client, fetch_text, post_json};
pub use record::{DetailRecord, Keyed, Record, RecordKind, DETAIL_BODY, DETAIL_CREATED_AT};
pub use source::{
    Cursor, CursorKind, Extractor, FetchedPage, ListingOrder, PageSource, ParentId,
};
pub use walker::{PageWalker, TerminationPolicy, WalkConfig, WalkResult};
