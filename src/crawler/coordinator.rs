//! Harvest coordinator - end-to-end orchestration for one configuration
//!
//! A harvest run:
//! - Opens storage and records a new run
//! - Resolves the recency cutoff once into a shared gate
//! - Per forum group, walks the discussion listing, then fans out one reply
//!   walk per topic still marked `unused`
//! - Fans out one album walk per distinct owner
//! - With a fan-app account, walks the channels of every followed star and
//!   the broadcast feed, then fetches detail for each pending broadcast
//! - Closes the run as completed, interrupted (cancelled) or failed

use crate::config::{AlbumEntry, Config, FanclubConfig, ForumEntry};
use crate::crawler::{
    build_http_client, DispatchConfig, DispatchOutcome, Extractor, FailurePolicy,
    FanOutDispatcher, PageSource, PageWalker, ParentId, RecordKind, TerminationPolicy,
    WalkConfig, WalkFailure,
};
use crate::recency::{Clock, RecencyGate, SystemClock};
use crate::sites::{
    unique_owners, AlbumExtractor, AlbumSource, ChannelExtractor, ChannelSource, FanclubApi,
    ForumReplies, ForumTopics, LiveDetailExtractor, LiveDetailSource, LiveListExtractor,
    LiveListSource, ReplyExtractor, TopicExtractor, LIVE_FEED,
};
use crate::storage::{RunStatus, Sink, SqliteStorage, Storage};
use crate::state::WalkStop;
use crate::HarvestError;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Summary of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub name: String,
    pub parents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: usize,
    pub persisted: u64,
    pub pages: u32,
    pub stops: HashMap<WalkStop, usize>,
    /// `(parent, error message)` per failed walk
    pub failures: Vec<(ParentId, String)>,
}

impl PhaseReport {
    pub fn from_outcome(name: impl Into<String>, outcome: &DispatchOutcome) -> Self {
        let mut stops = HashMap::new();
        for result in &outcome.results {
            *stops.entry(result.stop).or_insert(0) += 1;
        }
        for failure in &outcome.errors {
            *stops.entry(failure.stop).or_insert(0) += 1;
        }

        Self {
            name: name.into(),
            parents: outcome.results.len() + outcome.errors.len(),
            succeeded: outcome.results.len(),
            failed: outcome.errors.len(),
            items: outcome.total_items(),
            persisted: outcome.total_persisted(),
            pages: outcome.total_pages(),
            stops,
            failures: outcome
                .errors
                .iter()
                .map(|f| (f.parent.clone(), f.error.to_string()))
                .collect(),
        }
    }
}

/// Summary of a whole run
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub run_id: i64,
    pub phases: Vec<PhaseReport>,
    pub cancelled: bool,
}

impl HarvestReport {
    pub fn total_items(&self) -> usize {
        self.phases.iter().map(|p| p.items).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.phases.iter().map(|p| p.failed).sum()
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.name == name)
    }
}

/// Main harvest orchestrator
pub struct Harvester {
    config: Arc<Config>,
    storage: Arc<SqliteStorage>,
    client: Client,
    clock: Arc<dyn Clock>,
    run_id: i64,
}

impl Harvester {
    /// Opens the configured database and starts a run
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, recorded with the run
    /// * `fresh` - Reset every topic to `unused` so all replies are walked again
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> Result<Self, HarvestError> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        Self::with_storage(config, Arc::new(storage), config_hash, fresh)
    }

    /// Starts a run against an already opened storage
    pub fn with_storage(
        config: Config,
        storage: Arc<SqliteStorage>,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self, HarvestError> {
        if fresh {
            let reset = storage.reset_parents(RecordKind::Topic)?;
            tracing::info!("Fresh run: reset {} topics to unused", reset);
        }

        if let Some(previous) = storage.get_latest_run()? {
            if previous.status == RunStatus::Running {
                tracing::warn!(
                    "Run {} never finished; unfinished topics will be resumed",
                    previous.id
                );
                storage.complete_run(previous.id, RunStatus::Interrupted)?;
            }
        }

        let run_id = storage.create_run(config_hash)?;
        tracing::info!("Starting harvest run {}", run_id);

        let client = build_http_client(&config.user_agent)
            .map_err(|e| HarvestError::transport("<client>", e))?;

        Ok(Self {
            config: Arc::new(config),
            storage,
            client,
            clock: Arc::new(SystemClock),
            run_id,
        })
    }

    /// Replaces the clock used to resolve the recency gate
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn storage(&self) -> &Arc<SqliteStorage> {
        &self.storage
    }

    fn sink(&self) -> Arc<dyn Sink> {
        self.storage.clone()
    }

    fn walk_config(&self) -> WalkConfig {
        let crawler = &self.config.crawler;
        WalkConfig {
            termination: TerminationPolicy {
                short_page: crawler.stop_on_short_page,
                stale_item: crawler.stop_on_stale_item,
            },
            page_delay: Duration::from_millis(crawler.page_delay_ms),
            max_pages: crawler.max_pages,
        }
    }

    fn dispatcher(&self, completion: Option<RecordKind>) -> FanOutDispatcher {
        let crawler = &self.config.crawler;
        FanOutDispatcher::new(DispatchConfig {
            max_concurrent: crawler.max_concurrent_walks as usize,
            failure_policy: if crawler.all_or_nothing {
                FailurePolicy::AllOrNothing
            } else {
                FailurePolicy::Isolated
            },
            completion,
        })
    }

    fn walker<S, E>(&self, source: S, extractor: E) -> PageWalker<S, E>
    where
        S: PageSource,
        E: Extractor<Item = S::Item, Detail = S::Detail>,
    {
        PageWalker::new(
            Arc::new(source),
            Arc::new(extractor),
            self.sink(),
            self.walk_config(),
        )
    }

    /// Runs every configured target and closes the run
    ///
    /// Per-walk failures are reported, not returned; only storage failures
    /// outside a walk abort the run.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<HarvestReport, HarvestError> {
        let result = self.run_targets(cancel).await;

        let status = match &result {
            Ok(report) if report.cancelled => RunStatus::Interrupted,
            Ok(_) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };
        self.storage.complete_run(self.run_id, status)?;
        tracing::info!("Run {} finished: {}", self.run_id, status.to_db_string());

        result
    }

    async fn run_targets(&self, cancel: &CancellationToken) -> Result<HarvestReport, HarvestError> {
        let cutoff = self.config.recency.cutoff()?;
        let gate = RecencyGate::new(cutoff, self.clock.as_ref());
        tracing::info!("Harvesting items newer than {}", gate.threshold());

        let mut report = HarvestReport {
            run_id: self.run_id,
            phases: Vec::new(),
            cancelled: false,
        };

        let fanclub = self.config.fanclub.as_ref().filter(|f| f.is_enabled());
        if self.config.forum.is_empty() && self.config.album.is_empty() && fanclub.is_none() {
            tracing::warn!("Nothing to harvest");
        }

        for forum in &self.config.forum {
            if cancel.is_cancelled() {
                break;
            }
            let phases = self.harvest_forum(forum, gate, cancel).await?;
            report.phases.extend(phases);
        }

        if !self.config.album.is_empty() && !cancel.is_cancelled() {
            let phases = self.harvest_albums(&self.config.album, gate, cancel).await;
            report.phases.extend(phases);
        }

        if let Some(fanclub) = fanclub {
            if !cancel.is_cancelled() {
                let phases = self.harvest_fanclub(fanclub, gate, cancel).await?;
                report.phases.extend(phases);
            }
        }

        report.cancelled = cancel.is_cancelled();
        Ok(report)
    }

    /// Walks a group's topic listing, then the replies of its pending topics
    async fn harvest_forum(
        &self,
        forum: &ForumEntry,
        gate: RecencyGate,
        cancel: &CancellationToken,
    ) -> Result<Vec<PhaseReport>, HarvestError> {
        let group = ParentId::from(forum.group_id.as_str());
        tracing::info!("Harvesting forum group {}", group);

        let topics = self.walker(
            ForumTopics::new(self.client.clone(), &forum.base_url),
            TopicExtractor,
        );
        let outcome = self
            .dispatcher(None)
            .dispatch(vec![group.clone()], &topics, gate, cancel)
            .await;
        if !outcome.is_clean() {
            tracing::warn!(
                "Topic listing for {} failed; walking replies of stored topics only",
                group
            );
        }
        let mut phases = vec![PhaseReport::from_outcome(
            format!("topics:{}", group),
            &outcome,
        )];

        if cancel.is_cancelled() {
            return Ok(phases);
        }

        let pending = self
            .storage
            .pending_parents(RecordKind::Topic, Some(&group))?;
        tracing::info!("{} topics in {} need replies", pending.len(), group);

        let replies = self.walker(
            ForumReplies::new(self.client.clone(), &forum.base_url),
            ReplyExtractor::new(gate.now()),
        );
        let outcome = self
            .dispatcher(Some(RecordKind::Topic))
            .dispatch(pending, &replies, gate, cancel)
            .await;
        phases.push(PhaseReport::from_outcome(
            format!("replies:{}", group),
            &outcome,
        ));

        Ok(phases)
    }

    /// Walks albums for every distinct owner, one dispatch per endpoint
    async fn harvest_albums(
        &self,
        entries: &[AlbumEntry],
        gate: RecencyGate,
        cancel: &CancellationToken,
    ) -> Vec<PhaseReport> {
        let owners = unique_owners(entries);
        if owners.len() < entries.len() {
            tracing::info!(
                "Dropped {} duplicate album owners",
                entries.len() - owners.len()
            );
        }

        // Owners sharing an endpoint, page size and token share a source
        let mut groups: BTreeMap<(String, usize, Option<String>), Vec<AlbumEntry>> =
            BTreeMap::new();
        for owner in owners {
            groups
                .entry((owner.api_url.clone(), owner.page_size, owner.token.clone()))
                .or_default()
                .push(owner);
        }

        let mut phases = Vec::with_capacity(groups.len());
        for ((api_url, page_size, token), members) in groups {
            if cancel.is_cancelled() {
                break;
            }

            let walker = self.walker(
                AlbumSource::new(self.client.clone(), &api_url, page_size, token),
                AlbumExtractor::new(&members),
            );
            let parents = members
                .iter()
                .map(|m| ParentId::from(m.owner_id.to_string()))
                .collect();

            let outcome = self
                .dispatcher(None)
                .dispatch(parents, &walker, gate, cancel)
                .await;
            phases.push(PhaseReport::from_outcome(
                format!("albums:{}", api_url),
                &outcome,
            ));
        }

        phases
    }

    /// Walks the fan-app listings switched on for the account
    async fn harvest_fanclub(
        &self,
        fanclub: &FanclubConfig,
        gate: RecencyGate,
        cancel: &CancellationToken,
    ) -> Result<Vec<PhaseReport>, HarvestError> {
        let api = FanclubApi::new(self.client.clone(), &fanclub.api_base, fanclub.token.clone());
        let mut phases = Vec::new();

        if fanclub.channels {
            phases.push(self.harvest_channels(&api, gate, cancel).await);
        }

        if fanclub.lives && !cancel.is_cancelled() {
            phases.extend(self.harvest_lives(&api, gate, cancel).await?);
        }

        Ok(phases)
    }

    /// One channel walk per followed star
    async fn harvest_channels(
        &self,
        api: &FanclubApi,
        gate: RecencyGate,
        cancel: &CancellationToken,
    ) -> PhaseReport {
        let stars = match api.friend_ids().await {
            Ok(stars) => stars,
            Err(e) => {
                tracing::error!("Friend list unavailable, skipping channels: {}", e);
                let outcome = DispatchOutcome {
                    results: Vec::new(),
                    errors: vec![WalkFailure::without_progress(ParentId::from("friends"), e)],
                };
                return PhaseReport::from_outcome("channels", &outcome);
            }
        };
        tracing::info!("Walking channels of {} followed stars", stars.len());

        let walker = self.walker(
            ChannelSource::new(api.clone()),
            ChannelExtractor::new(gate.now()),
        );
        let outcome = self.dispatcher(None).dispatch(stars, &walker, gate, cancel).await;
        PhaseReport::from_outcome("channels", &outcome)
    }

    /// Walks the broadcast feed, then fetches detail for pending broadcasts
    async fn harvest_lives(
        &self,
        api: &FanclubApi,
        gate: RecencyGate,
        cancel: &CancellationToken,
    ) -> Result<Vec<PhaseReport>, HarvestError> {
        let feed = ParentId::from(LIVE_FEED);

        let listing = self.walker(LiveListSource::new(api.clone()), LiveListExtractor);
        let outcome = self
            .dispatcher(None)
            .dispatch(vec![feed.clone()], &listing, gate, cancel)
            .await;
        let mut phases = vec![PhaseReport::from_outcome("lives", &outcome)];

        if cancel.is_cancelled() {
            return Ok(phases);
        }

        let pending = self.storage.pending_parents(RecordKind::Live, Some(&feed))?;
        tracing::info!("{} broadcasts need detail", pending.len());

        let detail = self.walker(LiveDetailSource::new(api.clone()), LiveDetailExtractor);
        let outcome = self
            .dispatcher(Some(RecordKind::Live))
            .dispatch(pending, &detail, gate, cancel)
            .await;
        phases.push(PhaseReport::from_outcome("live-details", &outcome));

        Ok(phases)
    }
}
