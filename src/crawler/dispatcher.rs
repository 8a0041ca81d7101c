//! Fan-out dispatcher
//!
//! Launches one page walk per parent, bounded by a semaphore, and collects
//! successes and failures on separate channels. A failing parent never
//! aborts its siblings unless the caller opts into `AllOrNothing`.

use crate::crawler::{Extractor, PageSource, PageWalker, ParentId, Record, RecordKind, WalkResult};
use crate::recency::RecencyGate;
use crate::state::WalkStop;
use crate::storage::Sink;
use crate::HarvestError;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// What one failing walk does to the rest of the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Siblings keep running
    #[default]
    Isolated,
    /// The first failure cancels every sibling
    AllOrNothing,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Walks running at once
    pub max_concurrent: usize,
    pub failure_policy: FailurePolicy,
    /// Parent kind to mark `done` after a walk completes
    pub completion: Option<RecordKind>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            failure_policy: FailurePolicy::Isolated,
            completion: None,
        }
    }
}

/// A walk that ended with an error
#[derive(Debug)]
pub struct WalkFailure {
    pub parent: ParentId,
    pub error: HarvestError,
    /// Records persisted before the failure
    pub partial_items: Vec<Record>,
    /// Rows the sink committed before the failure
    pub persisted: u64,
    pub pages_fetched: u32,
    pub stop: WalkStop,
}

impl WalkFailure {
    /// A failure that happened before any page was fetched
    pub fn without_progress(parent: ParentId, error: HarvestError) -> Self {
        Self {
            parent,
            error,
            partial_items: Vec::new(),
            persisted: 0,
            pages_fetched: 0,
            stop: WalkStop::Error,
        }
    }

    fn from_result(result: WalkResult, error: HarvestError) -> Self {
        Self {
            parent: result.parent,
            error,
            partial_items: result.items,
            persisted: result.persisted,
            pages_fetched: result.pages_fetched,
            stop: result.stop,
        }
    }
}

/// Aggregated outcome of one dispatch
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub results: Vec<WalkResult>,
    pub errors: Vec<WalkFailure>,
}

impl DispatchOutcome {
    pub fn total_items(&self) -> usize {
        self.results.iter().map(|r| r.items.len()).sum::<usize>()
            + self.errors.iter().map(|e| e.partial_items.len()).sum::<usize>()
    }

    pub fn total_persisted(&self) -> u64 {
        self.results.iter().map(|r| r.persisted).sum::<u64>()
            + self.errors.iter().map(|e| e.persisted).sum::<u64>()
    }

    pub fn total_pages(&self) -> u32 {
        self.results.iter().map(|r| r.pages_fetched).sum::<u32>()
            + self.errors.iter().map(|e| e.pages_fetched).sum::<u32>()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if any walk stopped because of cancellation
    pub fn was_cancelled(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e.error, HarvestError::Cancelled { .. }))
    }
}

/// Marks a parent `done`, treating an untouched row as a consistency error
pub fn complete_parent(
    sink: &dyn Sink,
    kind: RecordKind,
    parent: &ParentId,
) -> Result<u64, HarvestError> {
    let affected = sink.mark_parent_done(kind, parent)?;
    if affected == 0 {
        return Err(HarvestError::consistency(format!(
            "marking {} {} done touched no rows",
            kind, parent
        )));
    }
    Ok(affected)
}

/// Runs one walk per parent under a concurrency bound
pub struct FanOutDispatcher {
    config: DispatchConfig,
}

impl FanOutDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Walks every parent and waits for all of them
    ///
    /// # Arguments
    ///
    /// * `parents` - One walk is launched per entry
    /// * `walker` - Cloned into each task
    /// * `gate` - Shared by every walk; resolved by the caller
    /// * `cancel` - Parent token; a child token is derived for the batch
    ///
    /// # Returns
    ///
    /// Successful walks in `results`, failed walks (with any partial
    /// items) in `errors`. Ordering across parents is not preserved.
    pub async fn dispatch<S, E>(
        &self,
        parents: Vec<ParentId>,
        walker: &PageWalker<S, E>,
        gate: RecencyGate,
        cancel: &CancellationToken,
    ) -> DispatchOutcome
    where
        S: PageSource + 'static,
        E: Extractor<Item = S::Item, Detail = S::Detail> + 'static,
    {
        let total = parents.len();
        tracing::info!(
            "Dispatching {} walks ({} at a time)",
            total,
            self.config.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let batch_cancel = cancel.child_token();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<WalkResult>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<WalkFailure>();
        let mut handles = Vec::with_capacity(total);

        for parent in parents {
            let walker = walker.clone();
            let semaphore = Arc::clone(&semaphore);
            let batch_cancel = batch_cancel.clone();
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();
            let policy = self.config.failure_policy;
            let completion = self.config.completion;
            let task_parent = parent.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquisition only fails on shutdown
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let cursor0 = walker.first_cursor();
                let mut result = walker.walk(parent, cursor0, &gate, &batch_cancel).await;

                if result.error.is_none() && result.stop.is_complete() {
                    if let Some(kind) = completion {
                        if let Err(e) = complete_parent(walker.sink().as_ref(), kind, &result.parent)
                        {
                            result.stop = WalkStop::Error;
                            result.error = Some(e);
                        }
                    }
                }

                match result.error.take() {
                    None => {
                        let _ = result_tx.send(result);
                    }
                    Some(error) => {
                        if policy == FailurePolicy::AllOrNothing
                            && !matches!(error, HarvestError::Cancelled { .. })
                        {
                            batch_cancel.cancel();
                        }
                        let _ = error_tx.send(WalkFailure::from_result(result, error));
                    }
                }
            });

            handles.push((task_parent, handle));
        }

        // Only the tasks hold senders now, so the receivers close once they finish
        drop(result_tx);
        drop(error_tx);

        let mut outcome = DispatchOutcome::default();

        for (parent, handle) in handles {
            if let Err(e) = handle.await {
                let error = HarvestError::TaskFailed {
                    parent: parent.to_string(),
                    message: e.to_string(),
                };
                outcome.errors.push(WalkFailure::without_progress(parent, error));
            }
        }

        while let Some(result) = result_rx.recv().await {
            outcome.results.push(result);
        }
        while let Some(failure) = error_rx.recv().await {
            outcome.errors.push(failure);
        }

        for failure in &outcome.errors {
            tracing::error!(
                "Walk for {} failed after {} items: {}",
                failure.parent,
                failure.partial_items.len(),
                failure.error
            );
        }

        tracing::info!(
            "Dispatch finished: {}/{} walks succeeded, {} items",
            outcome.results.len(),
            total,
            outcome.total_items()
        );

        outcome
    }
}
