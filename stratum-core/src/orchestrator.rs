//! Unit orchestrator - fans one job per requested size out to a fixed pool
//! of worker threads and collects the results.
//!
//! - jobs are submitted in input order by a dedicated submitter thread
//! - results arrive in completion order
//! - the first failing unit stops the batch: the shared cancel token is set,
//!   queued jobs are drained, in-flight writes stop at their next chunk, and
//!   the error is returned with the unit's index
//! - every worker is joined before `generate` returns

use crate::cancel::CancelToken;
use crate::error::{GenerateError, Result};
use crate::progress::ProgressReporter;
use crate::unit::{UnitGenerator, UnitJob, UnitResult, UnitStats};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 5;

/// A successfully generated unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub index: usize,
    pub size: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "millis")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub stats: UnitStats,
}

fn millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Outcome of a fully successful batch
#[derive(Clone, Debug)]
pub struct GenerateReport {
    /// In the order units finished
    pub units: Vec<UnitRecord>,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl GenerateReport {
    pub fn indices(&self) -> Vec<usize> {
        self.units.iter().map(|u| u.index).collect()
    }
}

pub struct Orchestrator<G> {
    generator: G,
    max_workers: usize,
    cancel: CancelToken,
}

impl<G: UnitGenerator> Orchestrator<G> {
    pub fn new(generator: G, max_workers: usize) -> Self {
        Self { generator, max_workers, cancel: CancelToken::new() }
    }

    /// Share an externally owned token, e.g. one tripped by a signal handler.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Generate every job, reporting each success to `progress`.
    pub fn generate(&self, jobs: Vec<UnitJob>, progress: &ProgressReporter) -> Result<GenerateReport> {
        if self.max_workers == 0 {
            return Err(GenerateError::NoWorkers);
        }
        let started = Instant::now();
        let total = jobs.len();
        let sizes: HashMap<usize, u64> = jobs.iter().map(|j| (j.index, j.size)).collect();
        let total_bytes: u64 = sizes.values().sum();

        info!(units = total, workers = self.max_workers, bytes = total_bytes, "starting generation");

        // Both queues hold every job, so neither side ever blocks on send.
        let (job_tx, job_rx) = bounded::<UnitJob>(total.max(1));
        let (res_tx, res_rx) = bounded::<UnitResult>(total.max(1));

        let units = thread::scope(|scope| -> Result<Vec<UnitRecord>> {
            let mut workers: Vec<(usize, ScopedJoinHandle<'_, ()>)> =
                Vec::with_capacity(self.max_workers);
            for id in 0..self.max_workers {
                let rx = job_rx.clone();
                let tx = res_tx.clone();
                let cancel = self.cancel.clone();
                let generator = &self.generator;
                let spawned = thread::Builder::new()
                    .name(format!("unit-worker-{}", id))
                    .spawn_scoped(scope, move || worker_loop(id, generator, rx, tx, cancel));
                match spawned {
                    Ok(handle) => workers.push((id, handle)),
                    Err(source) => {
                        // Spawned workers see the closed queue or the token and exit.
                        self.cancel.cancel();
                        drop(job_tx);
                        return Err(GenerateError::Spawn { id, source });
                    }
                }
            }
            drop(res_tx);

            scope.spawn(move || {
                for job in jobs {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            let collected = self.collect(&res_rx, total, &sizes, progress);
            if collected.is_err() {
                self.cancel.cancel();
                let dropped = job_rx.try_iter().count();
                debug!(dropped, "drained queued jobs after failure");
            }

            let mut panicked = None;
            for (id, handle) in workers {
                if handle.join().is_err() {
                    panicked.get_or_insert(id);
                }
            }
            match (collected, panicked) {
                (Err(e @ GenerateError::Unit { .. }), _) => Err(e),
                (_, Some(id)) => Err(GenerateError::WorkerPanicked { id }),
                (other, None) => other,
            }
        });

        let units = match units {
            Ok(units) => units,
            Err(e) => {
                warn!(error = %e, "generation failed");
                return Err(e);
            }
        };
        progress.finish();
        Ok(GenerateReport { units, total_bytes, elapsed: started.elapsed() })
    }

    fn collect(
        &self,
        results: &Receiver<UnitResult>,
        total: usize,
        sizes: &HashMap<usize, u64>,
        progress: &ProgressReporter,
    ) -> Result<Vec<UnitRecord>> {
        let mut units = Vec::with_capacity(total);
        while units.len() < total {
            let Ok(result) = results.recv() else {
                return Err(if self.cancel.is_cancelled() {
                    GenerateError::Cancelled { completed: units.len(), total }
                } else {
                    GenerateError::ResultsLost { missing: total - units.len() }
                });
            };
            let size = sizes.get(&result.index).copied().unwrap_or_default();
            match result.outcome {
                Ok(stats) => {
                    progress.update(result.index, size, result.elapsed);
                    units.push(UnitRecord { index: result.index, size, elapsed: result.elapsed, stats });
                }
                Err(e) if e.is_cancelled() => {
                    return Err(GenerateError::Cancelled { completed: units.len(), total });
                }
                Err(source) => return Err(GenerateError::Unit { index: result.index, source }),
            }
        }
        Ok(units)
    }
}

fn worker_loop<G: UnitGenerator + ?Sized>(
    id: usize,
    generator: &G,
    jobs: Receiver<UnitJob>,
    results: Sender<UnitResult>,
    cancel: CancelToken,
) {
    for job in jobs.iter() {
        if cancel.is_cancelled() {
            debug!(worker = id, unit = job.index, "cancelled before start");
            break;
        }
        let t0 = Instant::now();
        let outcome = generator.generate(&job, &cancel);
        let result = UnitResult { index: job.index, elapsed: t0.elapsed(), outcome };
        if results.send(result).is_err() {
            break;
        }
    }
    debug!(worker = id, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{WriteError, WriteStage};
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records which indices ran; fails the configured one.
    struct Fake {
        fail: Option<usize>,
        delay: Duration,
        ran: Mutex<Vec<usize>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Fake {
        fn new(fail: Option<usize>, delay: Duration) -> Self {
            Self {
                fail,
                delay,
                ran: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl UnitGenerator for Fake {
        fn generate(&self, job: &UnitJob, _cancel: &CancelToken) -> Result<UnitStats, WriteError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.ran.lock().unwrap().push(job.index);
            self.active.fetch_sub(1, Ordering::SeqCst);
            if Some(job.index) == self.fail {
                return Err(WriteError::io(
                    WriteStage::Write,
                    &job.dir,
                    job.size,
                    io::Error::new(io::ErrorKind::Other, "disk full"),
                ));
            }
            Ok(UnitStats { files: 1, dirs: 0, bytes: job.size })
        }
    }

    fn jobs(n: usize) -> Vec<UnitJob> {
        crate::unit::jobs_for(Path::new("/nowhere"), &(1..=n as u64).collect::<Vec<_>>())
    }

    #[test]
    fn every_index_reported_once() {
        let orch = Orchestrator::new(Fake::new(None, Duration::from_millis(1)), 4);
        let progress = ProgressReporter::hidden(25, (1..=25).sum());
        let report = orch.generate(jobs(25), &progress).unwrap();
        let mut idx = report.indices();
        idx.sort_unstable();
        assert_eq!(idx, (1..=25).collect::<Vec<_>>());
        assert_eq!(report.total_bytes, (1..=25).sum::<u64>());
        let snap = progress.snapshot();
        assert_eq!(snap.units_done, 25);
        assert_eq!(snap.byte_pct(), 100.0);
        assert!(progress.is_finished());
    }

    #[test]
    fn worker_count_bounds_concurrency() {
        let fake = Fake::new(None, Duration::from_millis(5));
        let orch = Orchestrator::new(fake, 3);
        orch.generate(jobs(12), &ProgressReporter::hidden(12, 78)).unwrap();
        assert!(orch.generator.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn first_failure_names_unit() {
        let orch = Orchestrator::new(Fake::new(Some(3), Duration::from_millis(20)), 1);
        let progress = ProgressReporter::hidden(6, 21);
        let err = orch.generate(jobs(6), &progress).unwrap_err();
        assert_eq!(err.unit_index(), Some(3));
        assert!(err.to_string().contains("unit 3"), "{err}");
        // one worker runs jobs in order; at most the job already dequeued runs after 3
        let ran = orch.generator.ran.lock().unwrap().clone();
        assert_eq!(ran[..3], [1, 2, 3]);
        assert!(ran.len() <= 4, "{ran:?}");
        assert_eq!(progress.snapshot().units_done, 2);
        assert!(!progress.is_finished());
    }

    #[test]
    fn zero_workers_rejected() {
        let orch = Orchestrator::new(Fake::new(None, Duration::ZERO), 0);
        let err = orch.generate(jobs(1), &ProgressReporter::hidden(1, 1)).unwrap_err();
        assert!(matches!(err, GenerateError::NoWorkers));
    }

    #[test]
    fn empty_batch_finishes_immediately() {
        let orch = Orchestrator::new(Fake::new(None, Duration::ZERO), 2);
        let progress = ProgressReporter::hidden(0, 0);
        let report = orch.generate(Vec::new(), &progress).unwrap();
        assert!(report.units.is_empty());
        assert!(progress.is_finished());
    }

    #[test]
    fn pre_cancelled_token_stops_everything() {
        let token = CancelToken::new();
        token.cancel();
        let orch = Orchestrator::new(Fake::new(None, Duration::ZERO), 2).with_cancel(token);
        let err = orch.generate(jobs(4), &ProgressReporter::hidden(4, 10)).unwrap_err();
        assert!(matches!(err, GenerateError::Cancelled { completed: 0, total: 4 }), "{err:?}");
        assert!(orch.generator.ran.lock().unwrap().is_empty());
    }
}
