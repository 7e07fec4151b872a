//! Sync orchestration.
//!
//! Walks the record list in order and drives each track through
//!
//! ```text
//! Missing → Searching → Found → Fetched → PostProcessing → Committed
//!    ↓          ↓         ↓        ↓                          ↓
//!  Skip    SearchFailed  Skip  FetchFailed              CommitFailed
//! ```
//!
//! Search and fetch run on the calling thread. Post-processing jobs go to a
//! bounded queue served by worker threads (or run inline in serial mode);
//! the scope joins every worker before `run` returns, so no job is lost.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::artwork::ArtworkFetcher;
use crate::cleanup::{remove_artifacts, ArtifactSnapshot, InterruptHandle};
use crate::error::{FailureKind, TrackFailure};
use crate::loudness::LoudnessNormalizer;
use crate::matcher::acceptable;
use crate::models::{Candidate, SyncOptions};
use crate::postprocess::{PostProcessJob, PostProcessor};
use crate::progress::{create_progress_bar, log_progress, log_track};
use crate::source::CandidateSource;
use crate::tags::MetadataWriter;
use crate::track::TrackRecord;

// ============================================================================
// Collaborators
// ============================================================================

/// External capabilities the orchestrator calls out to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub source: &'a dyn CandidateSource,
    pub metadata: &'a dyn MetadataWriter,
    pub normalizer: &'a dyn LoudnessNormalizer,
    pub artwork: &'a dyn ArtworkFetcher,
}

// ============================================================================
// Track States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    #[default]
    Missing,
    Searching,
    Found,
    SearchFailed,
    Fetched,
    FetchFailed,
    PostProcessing,
    Committed,
    CommitFailed,
    /// Already local, simulated, or still the best result
    Skip,
}

impl TrackState {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TrackState::SearchFailed | TrackState::FetchFailed | TrackState::CommitFailed
        )
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Per-track outcome bookkeeping shared between the orchestrator and workers.
#[derive(Debug, Default)]
pub struct SessionLedger {
    states: Mutex<Vec<TrackState>>,
    failures: Mutex<Vec<TrackFailure>>,
    committed: AtomicUsize,
    skipped: AtomicUsize,
    simulated: AtomicUsize,
}

impl SessionLedger {
    fn with_tracks(total: usize) -> Self {
        Self {
            states: Mutex::new(vec![TrackState::Missing; total]),
            ..Default::default()
        }
    }

    fn states(&self) -> MutexGuard<'_, Vec<TrackState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_state(&self, index: usize, state: TrackState) {
        if let Some(slot) = self.states().get_mut(index) {
            *slot = state;
        }
    }

    fn failures(&self) -> MutexGuard<'_, Vec<TrackFailure>> {
        match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fail(&self, index: usize, record_name: &str, kind: FailureKind) {
        warn!("\"{}\": {}", record_name, kind);
        self.set_state(
            index,
            match kind {
                FailureKind::NoCandidate | FailureKind::Search(_) => TrackState::SearchFailed,
                FailureKind::Fetch(_) => TrackState::FetchFailed,
                FailureKind::Commit(_) => TrackState::CommitFailed,
            },
        );
        self.failures().push(TrackFailure {
            index,
            name: record_name.to_string(),
            kind,
        });
    }

    fn commit(&self, index: usize) {
        self.set_state(index, TrackState::Committed);
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    fn skip(&self, index: usize) {
        self.set_state(index, TrackState::Skip);
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn simulate(&self, index: usize) {
        self.set_state(index, TrackState::Skip);
        self.simulated.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one `run`.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub total: usize,
    pub committed: usize,
    pub skipped: usize,
    pub simulated: usize,
    /// Last state of every track, by index
    pub states: Vec<TrackState>,
    /// Ordered by track index
    pub failed: Vec<TrackFailure>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct SyncSession {
    library: PathBuf,
    tracks: Vec<TrackRecord>,
    options: SyncOptions,
    ledger: SessionLedger,
    interrupt: InterruptHandle,
    artifacts: ArtifactSnapshot,
}

/// What the orchestrator decided for one track.
enum Step {
    /// Nothing more to do (skipped, simulated or failed)
    Done,
    /// Working file ready for post-processing
    Process(PostProcessJob),
}

impl SyncSession {
    pub fn new(library: PathBuf, tracks: Vec<TrackRecord>, options: SyncOptions) -> Self {
        Self {
            library,
            ledger: SessionLedger::with_tracks(tracks.len()),
            artifacts: ArtifactSnapshot::from_records(&tracks),
            tracks,
            options,
            interrupt: InterruptHandle::new(),
        }
    }

    pub fn library(&self) -> &PathBuf {
        &self.library
    }

    pub fn tracks(&self) -> &[TrackRecord] {
        &self.tracks
    }

    /// Handle for requesting a stop from outside (signal handler, tests).
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Temporary file names of every track, for the signal handler.
    pub fn artifact_snapshot(&self) -> ArtifactSnapshot {
        self.artifacts.clone()
    }

    /// Process every track in order. Per-track failures are recorded and
    /// never abort the batch.
    pub fn run(&mut self, services: Services<'_>) -> SyncReport {
        let start = Instant::now();
        let total = self.tracks.len();
        let Self {
            tracks,
            options,
            ledger,
            interrupt,
            artifacts,
            ..
        } = self;
        let ledger = &*ledger;
        let post = PostProcessor::new(services.metadata, services.normalizer, services.artwork);
        let workers = options.workers.max(1);
        let pb = create_progress_bar(total as u64, "Synchronizing");
        let mut interrupted = false;

        info!(
            "Synchronizing {} tracks ({})",
            total,
            if options.serial {
                "serial".to_string()
            } else {
                format!("{} post-processing workers", workers)
            }
        );

        thread::scope(|scope| {
            let queue: Option<Sender<PostProcessJob>> = if options.serial {
                None
            } else {
                let (tx, rx) = bounded::<PostProcessJob>(workers);
                for _ in 0..workers {
                    let rx = rx.clone();
                    let post = &post;
                    scope.spawn(move || worker_loop(rx, post, ledger));
                }
                Some(tx)
            };

            for (index, track) in tracks.iter_mut().enumerate() {
                if interrupt.is_set() {
                    interrupted = true;
                    break;
                }
                log_track(index, total, &track.base_name);
                let step = advance(index, track, options, services, ledger, interrupt, artifacts);
                if let Step::Process(job) = step {
                    match &queue {
                        Some(tx) => {
                            if let Err(err) = tx.send(job) {
                                complete(&post, ledger, err.into_inner());
                            }
                        }
                        None => complete(&post, ledger, job),
                    }
                }
                pb.inc(1);
                log_progress("sync", index as u64 + 1, total as u64, 10);
            }
            if interrupt.is_set() {
                interrupted = true;
            }
            // Closing the queue lets the workers drain and exit.
            drop(queue);
        });
        pb.finish_and_clear();

        let mut failed = ledger.failures().clone();
        failed.sort_by_key(|f| f.index);
        SyncReport {
            total,
            committed: ledger.committed.load(Ordering::Relaxed),
            skipped: ledger.skipped.load(Ordering::Relaxed),
            simulated: ledger.simulated.load(Ordering::Relaxed),
            states: ledger.states().clone(),
            failed,
            interrupted,
            elapsed: start.elapsed(),
        }
    }
}

// ============================================================================
// Per-Track State Machine
// ============================================================================

/// Search → pick → fetch for one track. Returns the post-processing job, if
/// any. Only the orchestrator mutates the record.
fn advance(
    index: usize,
    track: &mut TrackRecord,
    options: &SyncOptions,
    services: Services<'_>,
    ledger: &SessionLedger,
    interrupt: &InterruptHandle,
    artifacts: &ArtifactSnapshot,
) -> Step {
    if track.is_local && !options.overrides_local() {
        debug!("\"{}\" already local", track.base_name);
        ledger.skip(index);
        return Step::Done;
    }

    let mut fetched = false;
    if !track.is_local || options.replace_local {
        if track.is_local && track.source_locator.is_none() {
            track.source_locator = match services.metadata.read_origin(&track.final_path()) {
                Ok(origin) => origin,
                Err(e) => {
                    debug!("No origin readable for \"{}\": {:#}", track.base_name, e);
                    None
                }
            };
        }

        ledger.set_state(index, TrackState::Searching);
        let candidates = match services.source.search(&track.search_pattern()) {
            Ok(candidates) => candidates,
            Err(e) => {
                ledger.fail(index, &track.base_name, FailureKind::Search(format!("{:#}", e)));
                return Step::Done;
            }
        };
        let chosen: Option<Candidate> = acceptable(track, &candidates)
            .find(|candidate| services.source.confirm(track, candidate))
            .cloned();
        let Some(candidate) = chosen else {
            ledger.fail(index, &track.base_name, FailureKind::NoCandidate);
            return Step::Done;
        };
        info!("Found \"{}\" at {}", candidate.title, candidate.locator);
        ledger.set_state(index, TrackState::Found);

        if options.simulate {
            info!("Simulation: not fetching \"{}\"", track.base_name);
            ledger.simulate(index);
            return Step::Done;
        }

        let unchanged =
            track.is_local && track.source_locator.as_deref() == Some(candidate.locator.as_str());
        if unchanged {
            info!("\"{}\" is still the best result", track.base_name);
            if !options.flush_metadata {
                ledger.skip(index);
                return Step::Done;
            }
        } else {
            let temp = track.temp_path();
            if let Err(e) = services.source.fetch(&candidate, &temp) {
                ledger.fail(index, &track.base_name, FailureKind::Fetch(format!("{:#}", e)));
                remove_artifacts(&track.artifacts());
                return Step::Done;
            }
            track.source_locator = Some(candidate.locator);
            track.is_local = false;
            ledger.set_state(index, TrackState::Fetched);
            if interrupt.is_set() {
                return Step::Done;
            }
            fetched = true;
        }
    }

    if !fetched {
        // Metadata refresh of a file already on disk
        if options.simulate {
            ledger.simulate(index);
            return Step::Done;
        }
        artifacts.mark_retained(index);
        if let Err(e) = fs::rename(track.final_path(), track.temp_path()) {
            ledger.fail(index, &track.base_name, FailureKind::Commit(e.to_string()));
            return Step::Done;
        }
    }

    ledger.set_state(index, TrackState::PostProcessing);
    Step::Process(PostProcessJob::from_record(
        index,
        track,
        fetched && !options.disable_normalization,
    ))
}

/// Post-process, then commit. Runs on a worker or inline.
fn complete(post: &PostProcessor<'_>, ledger: &SessionLedger, job: PostProcessJob) {
    post.run(&job);
    match post.commit(&job) {
        Ok(()) => ledger.commit(job.index),
        Err(e) => ledger.fail(job.index, &job.name, FailureKind::Commit(e.to_string())),
    }
}

fn worker_loop(rx: Receiver<PostProcessJob>, post: &PostProcessor<'_>, ledger: &SessionLedger) {
    while let Ok(job) = rx.recv() {
        complete(post, ledger, job);
    }
}
