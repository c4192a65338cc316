//! Campaign batch driver: bounded-parallel rendering with distributed
//! progress and run deduplication.
//!
//! Rows are pulled in fixed-size batches; within a batch rows render
//! concurrently on a pool sized to the batch, each worker owning its own
//! renderer (fonts, images, layout contexts). Batches are awaited before the
//! next starts, with a small delay between them so a long campaign does not
//! saturate the host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rayon::prelude::*;

use crate::batch::lock::CampaignLock;
use crate::batch::progress::ProgressTracker;
use crate::batch::rate::{RateLimit, RateLimiter};
use crate::foundation::error::{PinError, PinResult};
use crate::model::campaign::{Campaign, CampaignStatus, RenderResult, RowOutcome};
use crate::render::headless::{PinRenderer, RendererConfig};
use crate::store::kv::KvStore;
use crate::store::sink::PinSink;

#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Rows per batch; also the bounded parallelism within a batch.
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub lock_ttl: Duration,
    pub rate_limit: Option<RateLimit>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_millis(200),
            lock_ttl: Duration::from_secs(600),
            rate_limit: None,
        }
    }
}

/// Cooperative pause flag, checked between rows (never mid-row). In-flight
/// rows of the current batch always finish.
#[derive(Clone, Default)]
pub struct PauseSignal(Arc<AtomicBool>);

impl PauseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchRunStatus {
    /// Every row processed; campaign reached a terminal state.
    Completed,
    /// Terminal with at least one failed row (partial success is terminal,
    /// and the per-row errors are in the report).
    Failed,
    /// Paused cooperatively; progress and cursor persisted for resume.
    Paused,
    /// Another run holds the campaign lock; exited without side effects.
    Skipped,
}

#[derive(Clone, Debug)]
pub struct RowError {
    pub row_index: usize,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct BatchReport {
    pub status: BatchRunStatus,
    pub completed: u64,
    pub failed: u64,
    pub errors: Vec<RowError>,
}

struct RowDone {
    row_index: usize,
    error: Option<String>,
    /// Set when this row's increment crossed the completion threshold.
    terminal: Option<CampaignStatus>,
}

pub struct BatchPipeline {
    store: Arc<dyn KvStore>,
    sink: Arc<dyn PinSink>,
    renderer_config: RendererConfig,
    opts: BatchOptions,
}

impl BatchPipeline {
    pub fn new(
        store: Arc<dyn KvStore>,
        sink: Arc<dyn PinSink>,
        renderer_config: RendererConfig,
        opts: BatchOptions,
    ) -> Self {
        Self {
            store,
            sink,
            renderer_config,
            opts,
        }
    }

    /// Run (or resume) a campaign.
    pub fn run(&self, campaign: &Campaign, pause: &PauseSignal) -> PinResult<BatchReport> {
        if let Err(e) = campaign.validate() {
            // Fatal for this campaign only; mark it failed and surface.
            let tracker = self.tracker(campaign);
            let _ = self
                .sink
                .update_progress(&campaign.id, tracker.snapshot(), CampaignStatus::Failed);
            return Err(e);
        }

        let Some(lock) = CampaignLock::acquire(self.store.clone(), &campaign.id, self.opts.lock_ttl)
        else {
            tracing::info!(campaign = %campaign.id, "already running, skipping");
            return Ok(BatchReport {
                status: BatchRunStatus::Skipped,
                completed: 0,
                failed: 0,
                errors: Vec::new(),
            });
        };

        let report = self.run_locked(campaign, pause);
        lock.release();
        report
    }

    fn tracker(&self, campaign: &Campaign) -> ProgressTracker {
        ProgressTracker::new(self.store.clone(), campaign.id.clone(), campaign.total_pins())
    }

    fn run_locked(&self, campaign: &Campaign, pause: &PauseSignal) -> PinResult<BatchReport> {
        let batch_size = self.opts.batch_size.max(1);
        let tracker = self.tracker(campaign);
        let limiter = self
            .opts
            .rate_limit
            .map(|limit| RateLimiter::new(self.store.clone(), limit));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(batch_size)
            .build()
            .map_err(|e| PinError::row(format!("failed to build batch thread pool: {e}")))?;

        let _ = self.sink.update_progress(
            &campaign.id,
            tracker.snapshot(),
            CampaignStatus::Processing,
        );

        let total_rows = campaign.rows.len();
        let mut errors: Vec<RowError> = Vec::new();
        let mut terminal: Option<CampaignStatus> = None;
        let mut start = tracker.cursor().min(total_rows);

        while start < total_rows {
            if pause.is_paused() {
                // Persist progress before yielding control so resume starts
                // from the next unprocessed row, not from zero.
                tracker.set_cursor(start);
                let snapshot = tracker.snapshot();
                let _ = self
                    .sink
                    .update_progress(&campaign.id, snapshot, CampaignStatus::Paused);
                tracing::info!(campaign = %campaign.id, next_row = start, "paused");
                return Ok(BatchReport {
                    status: BatchRunStatus::Paused,
                    completed: snapshot.completed,
                    failed: snapshot.failed,
                    errors,
                });
            }

            if let Some(limiter) = &limiter
                && !limiter.allow(&campaign.id)
            {
                tracing::warn!(campaign = %campaign.id, "render rate limit reached, backing off");
                std::thread::sleep(self.opts.inter_batch_delay);
            }

            let end = (start + batch_size).min(total_rows);
            let indices: Vec<usize> = (start..end).collect();

            let batch_done: Vec<RowDone> = pool.install(|| {
                indices
                    .par_iter()
                    .map_init(
                        || PinRenderer::new(&self.renderer_config),
                        |renderer, &row_index| {
                            self.process_row(renderer, campaign, row_index, &tracker)
                        },
                    )
                    .collect()
            });

            for done in batch_done {
                if let Some(message) = done.error {
                    errors.push(RowError {
                        row_index: done.row_index,
                        message,
                    });
                }
                if let Some(status) = done.terminal {
                    terminal = Some(status);
                }
            }

            start = end;
            tracker.set_cursor(start);
            let _ = self.sink.update_progress(
                &campaign.id,
                tracker.snapshot(),
                terminal.unwrap_or(CampaignStatus::Processing),
            );

            if start < total_rows {
                std::thread::sleep(self.opts.inter_batch_delay);
            }
        }

        let snapshot = tracker.snapshot();
        let status = match terminal {
            Some(CampaignStatus::Failed) => BatchRunStatus::Failed,
            Some(_) => BatchRunStatus::Completed,
            // All of this run's rows are done but the campaign total spans
            // further rows (another worker's share).
            None => BatchRunStatus::Completed,
        };
        tracing::debug!(
            campaign = %campaign.id,
            completed = snapshot.completed,
            failed = snapshot.failed,
            "batch run finished"
        );

        Ok(BatchReport {
            status,
            completed: snapshot.completed,
            failed: snapshot.failed,
            errors,
        })
    }

    /// Render, persist, and count one row. Never propagates: every failure
    /// becomes a counted per-row error.
    fn process_row(
        &self,
        renderer: &mut PinRenderer,
        campaign: &Campaign,
        row_index: usize,
        tracker: &ProgressTracker,
    ) -> RowDone {
        let template = campaign.template_for_row(row_index);
        let row = &campaign.rows[row_index];

        let (result, error) = match renderer.render(template, row, &campaign.mapping) {
            Ok(image) => (
                RenderResult {
                    row_index,
                    outcome: RowOutcome::Image(image),
                },
                None,
            ),
            Err(e) => {
                tracing::warn!(campaign = %campaign.id, row = row_index, error = %e, "row render failed");
                let message = e.to_string();
                (
                    RenderResult {
                        row_index,
                        outcome: RowOutcome::Error(message.clone()),
                    },
                    Some(message),
                )
            }
        };

        let error = match self.sink.persist(&campaign.id, &result) {
            Ok(()) => error,
            Err(e) => {
                tracing::warn!(campaign = %campaign.id, row = row_index, error = %e, "persist failed");
                Some(error.unwrap_or_else(|| format!("persist failed: {e}")))
            }
        };

        if error.is_some() {
            tracker.record_failed();
        } else {
            tracker.record_completed();
        }
        // Overall completion is derived from the counters after every
        // increment; there is no separate "job finished" signal.
        let terminal = tracker.try_finalize();

        RowDone {
            row_index,
            error,
            terminal,
        }
    }
}
