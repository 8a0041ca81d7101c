//! Integration tests for the page walker and the fan-out dispatcher
//!
//! These tests drive scripted page sources against the SQLite sink and
//! check the termination and isolation rules end to end.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use pagewalk::crawler::{
    Cursor, DispatchConfig, Extractor, FanOutDispatcher, FetchedPage, PageSource, PageWalker,
    ParentId, Record, RecordKind, WalkConfig,
};
use pagewalk::recency::{parse_timestamp, Cutoff, RecencyGate};
use pagewalk::state::{ParentStatus, WalkStop};
use pagewalk::storage::{Sink, SqliteStorage, Storage, StorageError, StorageResult};
use pagewalk::HarvestError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PAGE_SIZE: usize = 50;
const RECENT: &str = "2025-05-30 10:00:00";
const STALE: &str = "2024-01-01 00:00:00";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn gate() -> RecencyGate {
    RecencyGate::at(Cutoff::Months(6), now())
}

/// `(key, timestamp)` pairs for a page of recent items
fn recent_page(parent: &str, page: usize, len: usize) -> Vec<(String, String)> {
    (0..len)
        .map(|i| (format!("{}-{}-{}", parent, page, i), RECENT.to_string()))
        .collect()
}

/// Serves scripted pages per parent and counts fetches
#[derive(Default)]
struct ScriptedSource {
    pages: HashMap<String, Vec<Vec<(String, String)>>>,
    failing: Vec<String>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn with_parent(mut self, parent: &str, sizes: &[usize]) -> Self {
        let pages = sizes
            .iter()
            .enumerate()
            .map(|(page, len)| recent_page(parent, page, *len))
            .collect();
        self.pages.insert(parent.to_string(), pages);
        self
    }

    fn with_pages(mut self, parent: &str, pages: Vec<Vec<(String, String)>>) -> Self {
        self.pages.insert(parent.to_string(), pages);
        self
    }

    fn failing(mut self, parent: &str) -> Self {
        self.failing.push(parent.to_string());
        self
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    type Item = (String, String);
    type Detail = ();

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        _with_detail: bool,
    ) -> Result<FetchedPage<(String, String), ()>, HarvestError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.failing.iter().any(|p| p == parent.as_str()) {
            return Err(HarvestError::transport(
                format!("scripted://{}", parent),
                "HTTP 503",
            ));
        }

        let index = cursor.value() as usize / PAGE_SIZE;
        let items = self
            .pages
            .get(parent.as_str())
            .and_then(|pages| pages.get(index))
            .cloned()
            .unwrap_or_default();
        Ok(FetchedPage::new(items))
    }
}

struct PairExtractor(RecordKind);

impl Extractor for PairExtractor {
    type Item = (String, String);
    type Detail = ();

    fn extract(&self, parent: &ParentId, raw: &(String, String)) -> Result<Record, HarvestError> {
        Ok(Record::new(self.0, raw.0.as_str(), parent.clone(), raw.1.as_str()))
    }
}

/// Accepts the first `accept` batches, then fails
struct FlakySink {
    inner: SqliteStorage,
    accept: usize,
    calls: AtomicUsize,
}

impl Sink for FlakySink {
    fn upsert_batch(&self, records: &[Record]) -> StorageResult<u64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.accept {
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.inner.upsert_batch(records)
    }

    fn mark_parent_done(&self, kind: RecordKind, parent: &ParentId) -> StorageResult<u64> {
        self.inner.mark_parent_done(kind, parent)
    }

    fn pending_parents(
        &self,
        kind: RecordKind,
        under: Option<&ParentId>,
    ) -> StorageResult<Vec<ParentId>> {
        self.inner.pending_parents(kind, under)
    }
}

fn fast_config() -> WalkConfig {
    WalkConfig {
        page_delay: std::time::Duration::ZERO,
        ..WalkConfig::default()
    }
}

fn walker(
    source: ScriptedSource,
    kind: RecordKind,
    sink: Arc<dyn Sink>,
) -> (PageWalker<ScriptedSource, PairExtractor>, Arc<ScriptedSource>) {
    let source = Arc::new(source);
    let walker = PageWalker::new(
        Arc::clone(&source),
        Arc::new(PairExtractor(kind)),
        sink,
        fast_config(),
    );
    (walker, source)
}

#[tokio::test]
async fn test_walk_stops_on_short_page() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let (walker, source) = walker(
        ScriptedSource::default().with_parent("t1", &[50, 50, 50, 30]),
        RecordKind::Reply,
        storage.clone(),
    );

    let result = walker
        .walk(ParentId::from("t1"), Cursor::ZERO, &gate(), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.stop, WalkStop::ShortPage);
    assert_eq!(source.fetches(), 4);
    assert_eq!(result.pages_fetched, 4);
    assert_eq!(result.items.len(), 180);

    let counts = storage.count_records_by_kind().unwrap();
    assert_eq!(counts.get(&RecordKind::Reply), Some(&180));
}

#[tokio::test]
async fn test_walk_stops_at_first_stale_item() {
    let mut second = recent_page("t1", 1, 50);
    // Item 37 of page 2 is the first stale one
    second[36].1 = STALE.to_string();

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let (walker, source) = walker(
        ScriptedSource::default().with_pages(
            "t1",
            vec![recent_page("t1", 0, 50), second, recent_page("t1", 2, 50)],
        ),
        RecordKind::Reply,
        storage.clone(),
    );

    let result = walker
        .walk(ParentId::from("t1"), Cursor::ZERO, &gate(), &CancellationToken::new())
        .await;

    assert_eq!(result.stop, WalkStop::StaleItem);
    assert_eq!(result.items.len(), 50 + 36);
    assert_eq!(source.fetches(), 2);
    assert!(storage
        .get_record(RecordKind::Reply, "t1-1-36")
        .unwrap()
        .is_none());
    assert!(storage
        .get_record(RecordKind::Reply, "t1-1-35")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_empty_first_page() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let (walker, source) = walker(
        ScriptedSource::default().with_parent("t1", &[]),
        RecordKind::Reply,
        storage,
    );

    let result = walker
        .walk(ParentId::from("t1"), Cursor::ZERO, &gate(), &CancellationToken::new())
        .await;

    assert_eq!(result.stop, WalkStop::EmptyPage);
    assert!(result.items.is_empty());
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_failed_parent_is_isolated() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let mut source = ScriptedSource::default();
    for parent in ["p1", "p2", "p4", "p5"] {
        source = source.with_parent(parent, &[50, 10]);
    }
    let (walker, _) = walker(source.failing("p3"), RecordKind::Reply, storage);

    let parents = ["p1", "p2", "p3", "p4", "p5"]
        .into_iter()
        .map(ParentId::from)
        .collect();
    let outcome = FanOutDispatcher::new(DispatchConfig::default())
        .dispatch(parents, &walker, gate(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.results.len(), 4);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].parent.as_str(), "p3");
    assert!(matches!(
        outcome.errors[0].error,
        HarvestError::Transport { .. }
    ));
    assert_eq!(outcome.total_items(), 4 * 60);
}

#[tokio::test]
async fn test_rewalk_is_idempotent() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let (walker, _) = walker(
        ScriptedSource::default().with_parent("t1", &[50, 20]),
        RecordKind::Reply,
        storage.clone(),
    );

    for _ in 0..2 {
        let result = walker
            .walk(ParentId::from("t1"), Cursor::ZERO, &gate(), &CancellationToken::new())
            .await;
        assert!(result.is_success());
        assert_eq!(result.items.len(), 70);
    }

    let counts = storage.count_records_by_kind().unwrap();
    assert_eq!(counts.get(&RecordKind::Reply), Some(&70));
}

#[tokio::test]
async fn test_completion_marks_parent_done() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_batch(&[
            Record::new(RecordKind::Topic, "t1", ParentId::from("g1"), RECENT),
            Record::new(RecordKind::Topic, "t2", ParentId::from("g1"), RECENT),
        ])
        .unwrap();

    let (walker, _) = walker(
        ScriptedSource::default()
            .with_parent("t1", &[5])
            .failing("t2"),
        RecordKind::Reply,
        storage.clone(),
    );

    let config = DispatchConfig {
        completion: Some(RecordKind::Topic),
        ..DispatchConfig::default()
    };
    let outcome = FanOutDispatcher::new(config)
        .dispatch(
            storage
                .pending_parents(RecordKind::Topic, Some(&ParentId::from("g1")))
                .unwrap(),
            &walker,
            gate(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.errors.len(), 1);

    let t1 = storage.get_record(RecordKind::Topic, "t1").unwrap().unwrap();
    let t2 = storage.get_record(RecordKind::Topic, "t2").unwrap().unwrap();
    assert_eq!(t1.status, ParentStatus::Done);
    assert_eq!(t2.status, ParentStatus::Unused);

    let pending = storage.pending_parents(RecordKind::Topic, None).unwrap();
    assert_eq!(pending, vec![ParentId::from("t2")]);
}

#[tokio::test]
async fn test_zero_row_completion_is_consistency_error() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let (walker, _) = walker(
        ScriptedSource::default().with_parent("ghost", &[3]),
        RecordKind::Reply,
        storage,
    );

    let config = DispatchConfig {
        completion: Some(RecordKind::Topic),
        ..DispatchConfig::default()
    };
    let outcome = FanOutDispatcher::new(config)
        .dispatch(
            vec![ParentId::from("ghost")],
            &walker,
            gate(),
            &CancellationToken::new(),
        )
        .await;

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(
        outcome.errors[0].error,
        HarvestError::Consistency(_)
    ));
    // The replies themselves were persisted before completion failed
    assert_eq!(outcome.errors[0].partial_items.len(), 3);
}

#[tokio::test]
async fn test_sink_failure_keeps_committed_batches() {
    let sink = Arc::new(FlakySink {
        inner: SqliteStorage::new_in_memory().unwrap(),
        accept: 1,
        calls: AtomicUsize::new(0),
    });
    let (walker, source) = walker(
        ScriptedSource::default().with_parent("t1", &[50, 50, 50]),
        RecordKind::Reply,
        sink.clone(),
    );

    let result = walker
        .walk(ParentId::from("t1"), Cursor::ZERO, &gate(), &CancellationToken::new())
        .await;

    assert_eq!(result.stop, WalkStop::Error);
    assert!(matches!(result.error, Some(HarvestError::Persistence(_))));
    assert_eq!(result.items.len(), 50);
    assert_eq!(source.fetches(), 2);
    assert!(sink
        .inner
        .get_record(RecordKind::Reply, "t1-0-0")
        .unwrap()
        .is_some());
}

#[test]
fn test_short_form_rolls_back_across_new_year() {
    let new_year = NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    let (parsed, _) = parse_timestamp("12-31 23:59", new_year).unwrap();
    assert_eq!(
        parsed,
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
    );

    let gate = RecencyGate::at(Cutoff::Months(1), new_year);
    assert!(gate.is_recent("12-31 23:59"));
}
