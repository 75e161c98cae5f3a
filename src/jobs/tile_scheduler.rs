//! Tile Scheduler
//!
//! Runs tile jobs on a fixed pool of worker threads. Jobs go in on one
//! crossbeam channel, outcomes come back on another and are drained by the
//! owning thread. Draining passes every finished tile through a
//! [`GenerationGate`] so that a tile older than one already handed out for the
//! same target is flagged `skip_upload` instead of overwriting newer data.

use super::tile_job::{CancelToken, Generation, TileJob, TileTarget, TileUpload};
use crate::atlas::{AtlasRect, PageId};
use crate::error::{AtlasResult, MaterialAtlasError};
use crate::gpu::PageTextureKind;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type TileKey = (PageId, AtlasRect, PageTextureKind);

/// Tracks the newest generation released for each (page, rect, texture).
///
/// Entries are only dropped by [`GenerationGate::forget_page`],
/// [`GenerationGate::retain_pages`] or [`GenerationGate::clear`]. The owner
/// calls `retain_pages` with the live page ids whenever the atlas layout
/// changes, otherwise targets of removed pages and old tile grids stay here.
#[derive(Debug, Default)]
pub struct GenerationGate {
    latest: FxHashMap<TileKey, Generation>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `upload` as skipped if a newer generation already went out for its target.
    /// Returns whether the upload should reach the GPU.
    pub fn admit(&mut self, upload: &mut TileUpload) -> bool {
        let key = (upload.page_id, upload.rect, upload.texture);
        match self.latest.get(&key) {
            Some(&latest) if upload.generation < latest => {
                log::debug!(
                    "[GenerationGate::admit] Stale tile for page {} {:?}: generation {} < {}",
                    upload.page_id,
                    upload.rect,
                    upload.generation,
                    latest
                );
                upload.skip_upload = true;
                false
            }
            _ => {
                self.latest.insert(key, upload.generation);
                !upload.skip_upload
            }
        }
    }

    pub fn latest(&self, page_id: PageId, rect: AtlasRect, texture: PageTextureKind) -> Option<Generation> {
        self.latest.get(&(page_id, rect, texture)).copied()
    }

    /// Forget a page, e.g. after it was removed from the atlas
    pub fn forget_page(&mut self, page_id: PageId) {
        self.latest.retain(|key, _| key.0 != page_id);
    }

    /// Drop every entry whose page is not in `pages`
    pub fn retain_pages<I>(&mut self, pages: I)
    where
        I: IntoIterator<Item = PageId>,
    {
        let live: FxHashSet<PageId> = pages.into_iter().collect();
        let before = self.latest.len();
        self.latest.retain(|key, _| live.contains(&key.0));
        if self.latest.len() < before {
            log::debug!(
                "[GenerationGate::retain_pages] Dropped {} targets, {} remain",
                before - self.latest.len(),
                self.latest.len()
            );
        }
    }

    /// Number of tracked targets
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}

/// What happened to a submitted job
#[derive(Debug)]
pub enum TileOutcome {
    Ready(TileUpload),
    Cancelled(TileTarget),
    Failed(TileTarget, MaterialAtlasError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileSchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub stale: u64,
}

struct QueuedJob {
    job: TileJob,
    cancel: CancelToken,
}

pub struct TileScheduler {
    job_sender: Option<Sender<QueuedJob>>,
    outcome_receiver: Receiver<TileOutcome>,
    workers: Vec<thread::JoinHandle<()>>,
    gate: GenerationGate,
    stats: Arc<Mutex<TileSchedulerStats>>,
}

impl TileScheduler {
    /// Spawn `worker_threads` workers; 0 means one per logical CPU
    pub fn new(worker_threads: usize) -> AtlasResult<Self> {
        let count = if worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            worker_threads
        };

        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<QueuedJob>();
        let (outcome_sender, outcome_receiver) = crossbeam_channel::unbounded::<TileOutcome>();
        let stats = Arc::new(Mutex::new(TileSchedulerStats::default()));

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let name = format!("tile-worker-{}", index);
            let jobs = job_receiver.clone();
            let outcomes = outcome_sender.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(jobs, outcomes, stats))
                .map_err(|e| MaterialAtlasError::ThreadSpawn {
                    name,
                    error: e.to_string(),
                })?;
            workers.push(handle);
        }

        log::info!("[TileScheduler::new] Started {} tile workers", count);

        Ok(Self {
            job_sender: Some(job_sender),
            outcome_receiver,
            workers,
            gate: GenerationGate::new(),
            stats,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job and return the token that cancels it
    pub fn submit(&self, job: TileJob) -> AtlasResult<CancelToken> {
        let sender = self.job_sender.as_ref().ok_or_else(|| MaterialAtlasError::ChannelClosed {
            name: "tile jobs".to_string(),
        })?;

        let cancel = CancelToken::new();
        sender.send(QueuedJob {
            job,
            cancel: cancel.clone(),
        })?;
        self.stats.lock().submitted += 1;
        Ok(cancel)
    }

    /// Take every finished tile without blocking, oldest generation first
    pub fn drain_results(&mut self) -> Vec<TileUpload> {
        let outcomes: Vec<TileOutcome> = self.outcome_receiver.try_iter().collect();
        self.gate_outcomes(outcomes)
    }

    /// Block until `count` jobs have finished (in any way) or `timeout` passes,
    /// then return the finished tiles oldest generation first
    pub fn wait_results(&mut self, count: usize, timeout: Duration) -> Vec<TileUpload> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = Vec::with_capacity(count);
        while outcomes.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.outcome_receiver.recv_timeout(remaining) {
                Ok(outcome) => outcomes.push(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "[TileScheduler::wait_results] Timed out with {} of {} tiles",
                        outcomes.len(),
                        count
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.gate_outcomes(outcomes)
    }

    pub fn gate(&self) -> &GenerationGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut GenerationGate {
        &mut self.gate
    }

    pub fn stats(&self) -> TileSchedulerStats {
        self.stats.lock().clone()
    }

    /// Close the job queue and join every worker. Queued jobs still run.
    pub fn shutdown(&mut self) {
        self.job_sender = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("[TileScheduler::shutdown] A tile worker panicked");
            }
        }
    }

    fn gate_outcomes(&mut self, outcomes: Vec<TileOutcome>) -> Vec<TileUpload> {
        let mut ready = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                TileOutcome::Ready(upload) => ready.push(upload),
                TileOutcome::Cancelled(target) => {
                    log::debug!(
                        "[TileScheduler::drain] Tile for page {} generation {} cancelled",
                        target.page_id,
                        target.generation
                    );
                }
                TileOutcome::Failed(target, error) => {
                    log::warn!(
                        "[TileScheduler::drain] Tile for page {} {:?} failed: {}",
                        target.page_id,
                        target.rect,
                        error
                    );
                }
            }
        }

        ready.sort_by(|a, b| a.generation.cmp(&b.generation).then(b.priority.cmp(&a.priority)));

        let mut stale = 0;
        for upload in &mut ready {
            if !self.gate.admit(upload) {
                stale += 1;
            }
        }
        if stale > 0 {
            self.stats.lock().stale += stale;
        }
        ready
    }
}

impl Drop for TileScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(jobs: Receiver<QueuedJob>, outcomes: Sender<TileOutcome>, stats: Arc<Mutex<TileSchedulerStats>>) {
    // recv fails once the scheduler drops its sender
    while let Ok(queued) = jobs.recv() {
        let target = queued.job.target;
        let outcome = match queued.job.run(&queued.cancel) {
            Ok(Some(upload)) => {
                stats.lock().completed += 1;
                TileOutcome::Ready(upload)
            }
            Ok(None) => {
                stats.lock().cancelled += 1;
                TileOutcome::Cancelled(target)
            }
            Err(error) => {
                stats.lock().failed += 1;
                TileOutcome::Failed(target, error)
            }
        };

        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}
