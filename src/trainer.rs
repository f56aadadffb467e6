//! Running one epoch of training on a pool of worker threads.
//!
//! There are two ways to feed the workers:
//!
//! - [`TrainingScheduler::train_epoch_iterable`]: a producer thread batches
//!   the corpus into [`Job`]s on a bounded queue and the workers take jobs
//!   as they become free.
//! - [`TrainingScheduler::train_epoch_file`]: the corpus file is cut into one
//!   byte range per worker and each worker trains its own range.
//!
//! Either way, workers send [`JobReport`]s to the calling thread, which adds
//! them up. A worker that fails forwards its error instead, and a worker that
//! panics is noticed when the progress queue disconnects, so the caller never
//! waits on a worker that will not report.

use std::iter;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::Mutex;

use crate::corpus::{raw_word_count, Corpus};
use crate::error::{Error, Result};
use crate::jobs::{Job, JobProducer};
use crate::kernel::{GradientKernel, ModelView, Scratch, Shard};
use crate::schedule::RateScheduler;
use crate::telemetry::{log_epoch_end, EpochReport, ProgressLog};

/// What one worker did with one job (or, in file mode, its whole shard).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JobReport {
    pub examples: u64,
    pub effective_words: u64,
    pub raw_words: u64,
    pub loss: f64,
}

enum Progress {
    Report(JobReport),
    /// This worker will send nothing more.
    Finished,
    Failed(Error),
}

/// The epoch being scheduled and what the caller knows about the corpus.
pub struct EpochPlan<'a> {
    pub epoch: usize,
    pub total_examples: Option<u64>,
    pub total_words: Option<u64>,
    pub rate: &'a RateScheduler,
}

/// Counters that live for one `train` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingRunState {
    pub cur_epoch: usize,
    pub trained_words: u64,
    pub raw_words: u64,
    pub jobs: u64,
    pub running_loss: f64,
}

impl TrainingRunState {
    pub fn record(&mut self, report: &EpochReport) {
        self.cur_epoch = report.epoch + 1;
        self.trained_words += report.trained_words;
        self.raw_words += report.raw_words;
        self.jobs += report.jobs;
        self.running_loss += report.loss;
    }
}

pub struct TrainingScheduler<'a, K: ?Sized> {
    pub kernel: &'a K,
    pub model: ModelView<'a>,
    pub workers: usize,
    pub queue_factor: usize,
    pub batch_words: usize,
    pub report_delay: Duration,
    pub compute_loss: bool,
    /// Worker random sources are derived from this.
    pub seed: u64,
}

impl<K: GradientKernel + ?Sized> TrainingScheduler<'_, K> {
    fn worker_seed(&self, epoch: usize, id: usize) -> u64 {
        self.seed
            .wrapping_add((epoch * self.workers + id) as u64)
            .wrapping_add(1)
    }

    fn scratch(&self, epoch: usize, id: usize) -> Scratch {
        Scratch::new(self.model.weights.vector_size(), self.worker_seed(epoch, id))
    }

    /// Train on jobs from the queue until the producer says there are no more.
    fn worker_loop(
        &self,
        id: usize,
        epoch: usize,
        jobs: &Mutex<Receiver<Option<Job>>>,
        progress: &SyncSender<Progress>,
    ) {
        let mut scratch = self.scratch(epoch, id);
        let mut tally = 0;
        loop {
            let job = jobs.lock().recv();
            let Ok(Some(job)) = job else {
                break;
            };
            let outcome = match self.kernel.train_batch(
                &self.model,
                &job.sentences,
                job.alpha,
                &mut scratch,
                self.compute_loss,
            ) {
                Ok(outcome) => outcome,
                Err(err) => {
                    let _ = progress.send(Progress::Failed(err));
                    return;
                }
            };
            tally += 1;
            let report = JobReport {
                examples: job.sentences.len() as u64,
                effective_words: outcome.effective_words,
                raw_words: raw_word_count(&job.sentences),
                loss: outcome.loss,
            };
            if progress.send(Progress::Report(report)).is_err() {
                return;
            }
        }
        debug!("worker {id} exiting, processed {tally} jobs");
        let _ = progress.send(Progress::Finished);
    }

    /// One epoch over an in-memory or streamed corpus.
    pub fn train_epoch_iterable(&self, corpus: &dyn Corpus, plan: &EpochPlan<'_>) -> Result<EpochReport> {
        let start = Instant::now();
        let (job_tx, job_rx) = mpsc::sync_channel::<Option<Job>>(self.queue_factor * self.workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (progress_tx, progress_rx) =
            mpsc::sync_channel::<Progress>((self.queue_factor + 1) * self.workers);

        thread::scope(|s| {
            let workers: Vec<_> = (0..self.workers)
                .map(|id| {
                    let jobs = Arc::clone(&job_rx);
                    let progress = progress_tx.clone();
                    s.spawn(move || self.worker_loop(id, plan.epoch, &jobs, &progress))
                })
                .collect();
            // Only the workers may keep the queue alive, so the producer
            // notices if they all go away.
            drop(job_rx);

            let producer_progress = progress_tx.clone();
            let producer = s.spawn(move || {
                let producer = JobProducer {
                    batch_words: self.batch_words,
                    rate: plan.rate,
                    cur_epoch: plan.epoch,
                    total_examples: plan.total_examples,
                    total_words: plan.total_words,
                    workers: self.workers,
                };
                if let Err(err) = producer.run(corpus, &job_tx) {
                    let _ = producer_progress.send(Progress::Failed(err));
                }
            });
            drop(progress_tx);

            let result = self.drain(progress_rx, plan, start, false);
            join_all(workers.into_iter().chain(iter::once(producer)))?;
            result
        })
    }

    /// One epoch straight from a line-oriented corpus file, one byte range
    /// per worker.
    pub fn train_epoch_file(&self, path: &Path, plan: &EpochPlan<'_>) -> Result<EpochReport> {
        let start = Instant::now();
        let total_words = plan.total_words.ok_or_else(|| {
            Error::Config("training from a corpus file requires total_words".to_string())
        })?;
        let file_size = std::fs::metadata(path)?.len();
        let workers = self.workers as u64;
        let (progress_tx, progress_rx) =
            mpsc::sync_channel::<Progress>((self.queue_factor + 1) * self.workers);

        thread::scope(|s| {
            let handles: Vec<_> = (0..self.workers)
                .map(|id| {
                    let progress = progress_tx.clone();
                    let shard = Shard {
                        path,
                        offset: file_size * id as u64 / workers,
                        end: file_size * (id as u64 + 1) / workers,
                        epoch: plan.epoch,
                        total_examples: plan.total_examples,
                        total_words,
                        workers: self.workers,
                        rate: plan.rate,
                    };
                    s.spawn(move || {
                        let mut scratch = self.scratch(plan.epoch, id);
                        match self.kernel.train_epoch_from_file(
                            &self.model,
                            &shard,
                            &mut scratch,
                            self.compute_loss,
                        ) {
                            Ok(outcome) => {
                                debug!(
                                    "worker {id} finished bytes {}..{}: {} sentences",
                                    shard.offset, shard.end, outcome.examples
                                );
                                let report = JobReport {
                                    examples: outcome.examples,
                                    effective_words: outcome.effective_words,
                                    raw_words: outcome.raw_words,
                                    loss: outcome.loss,
                                };
                                if progress.send(Progress::Report(report)).is_ok() {
                                    let _ = progress.send(Progress::Finished);
                                }
                            }
                            Err(err) => {
                                let _ = progress.send(Progress::Failed(err));
                            }
                        }
                    })
                })
                .collect();
            drop(progress_tx);

            let result = self.drain(progress_rx, plan, start, true);
            join_all(handles)?;
            result
        })
    }

    /// Add up worker reports until every worker has finished.
    ///
    /// Returns early with the first error a worker forwards; dropping the
    /// receiver then makes the other workers stop at their next report.
    fn drain(
        &self,
        progress: Receiver<Progress>,
        plan: &EpochPlan<'_>,
        start: Instant,
        corpus_file_mode: bool,
    ) -> Result<EpochReport> {
        let mut report = EpochReport {
            epoch: plan.epoch,
            ..EpochReport::default()
        };
        let mut log = ProgressLog::new(self.report_delay);
        let mut unfinished = self.workers;
        while unfinished > 0 {
            match progress.recv() {
                Ok(Progress::Report(job)) => {
                    report.examples += job.examples;
                    report.trained_words += job.effective_words;
                    report.raw_words += job.raw_words;
                    report.loss += job.loss;
                    report.jobs += 1;
                    log.tick(
                        plan.epoch,
                        &report,
                        plan.total_examples,
                        plan.total_words,
                        start.elapsed(),
                    );
                }
                Ok(Progress::Finished) => {
                    unfinished -= 1;
                    debug!("worker thread finished; awaiting finish of {unfinished} more threads");
                }
                Ok(Progress::Failed(err)) => return Err(Error::WorkerFailed(err.to_string())),
                Err(mpsc::RecvError) => {
                    return Err(Error::WorkerLost {
                        remaining: unfinished,
                    })
                }
            }
        }
        report.elapsed = start.elapsed();
        log_epoch_end(
            &report,
            plan.total_examples,
            plan.total_words,
            corpus_file_mode,
        );
        if report.jobs == 0 {
            info!("EPOCH {}: no work was done", plan.epoch);
        }
        Ok(report)
    }
}

/// Join every thread. A panic anywhere wins over whatever the caller saw.
fn join_all<'scope>(
    handles: impl IntoIterator<Item = thread::ScopedJoinHandle<'scope, ()>>,
) -> Result<()> {
    let mut panicked = false;
    for handle in handles {
        panicked |= handle.join().is_err();
    }
    if panicked {
        return Err(Error::WorkerPanicked);
    }
    Ok(())
}
