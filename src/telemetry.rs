//! Training progress: log lines and callbacks.

use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;

use crate::real;

/// Totals for one finished epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    /// Sentences processed.
    pub examples: u64,
    /// Words actually trained on (in vocabulary, before downsampling).
    pub trained_words: u64,
    /// Raw words read, including unknown ones.
    pub raw_words: u64,
    /// Jobs (in-memory mode) or shards (file mode) completed.
    pub jobs: u64,
    pub loss: f64,
    pub elapsed: Duration,
}

impl EpochReport {
    pub fn words_per_sec(&self) -> f64 {
        self.trained_words as f64 / self.elapsed.as_secs_f64().max(1e-9)
    }
}

/// Totals for a whole `train` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrainReport {
    pub epochs: usize,
    pub trained_words: u64,
    pub raw_words: u64,
    pub jobs: u64,
    pub loss: f64,
    pub elapsed: Duration,
    pub min_alpha_yet_reached: real,
}

/// Hooks called from the training thread as a run progresses.
///
/// All methods default to doing nothing.
pub trait TrainingCallback {
    fn on_train_begin(&mut self, _epochs: usize) {}
    fn on_epoch_begin(&mut self, _epoch: usize) {}
    fn on_epoch_end(&mut self, _report: &EpochReport) {}
    fn on_train_end(&mut self, _report: &TrainReport) {}
}

/// Rate-limits progress lines to one per `delay`.
pub struct ProgressLog {
    delay: Duration,
    next_report: Instant,
}

impl ProgressLog {
    pub fn new(delay: Duration) -> Self {
        ProgressLog {
            delay,
            next_report: Instant::now() + delay,
        }
    }

    /// Log where we are in the epoch, if enough time has passed.
    pub fn tick(
        &mut self,
        epoch: usize,
        report: &EpochReport,
        total_examples: Option<u64>,
        total_words: Option<u64>,
        elapsed: Duration,
    ) {
        let now = Instant::now();
        if now < self.next_report {
            return;
        }
        self.next_report = now + self.delay;
        let rate = report.trained_words as f64 / elapsed.as_secs_f64().max(1e-9);
        match progress_percent(report, total_examples, total_words) {
            Some((pct, unit)) => info!(
                "EPOCH {epoch} - PROGRESS: at {pct:.2}% {unit}, {rate:.0} words/s"
            ),
            None => info!(
                "EPOCH {epoch} - PROGRESS: {} examples, {rate:.0} words/s",
                report.examples
            ),
        }
    }
}

/// How far through the epoch we are, measured in examples when their total
/// is known and in raw words otherwise.
fn progress_percent(
    report: &EpochReport,
    total_examples: Option<u64>,
    total_words: Option<u64>,
) -> Option<(f64, &'static str)> {
    match (total_examples, total_words) {
        (Some(total), _) if total > 0 => {
            Some((100.0 * report.examples as f64 / total as f64, "examples"))
        }
        (_, Some(total)) if total > 0 => Some((100.0 * report.raw_words as f64 / total as f64, "words")),
        _ => None,
    }
}

/// A supplied corpus total that an epoch did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalsMismatch {
    Examples { expected: u64, observed: u64 },
    Words { expected: u64, observed: u64 },
}

/// Compare an epoch's totals against what the caller said the corpus holds.
///
/// In file mode the shards are cut at byte offsets and per-shard word counts
/// are only estimates, so nothing is reported.
pub fn epoch_mismatches(
    report: &EpochReport,
    total_examples: Option<u64>,
    total_words: Option<u64>,
    corpus_file_mode: bool,
) -> Vec<TotalsMismatch> {
    if corpus_file_mode {
        return vec![];
    }
    let mut found = vec![];
    if let Some(expected) = total_examples.filter(|&n| n != report.examples) {
        found.push(TotalsMismatch::Examples {
            expected,
            observed: report.examples,
        });
    }
    if let Some(expected) = total_words.filter(|&n| n != report.raw_words) {
        found.push(TotalsMismatch::Words {
            expected,
            observed: report.raw_words,
        });
    }
    found
}

/// End-of-epoch summary, plus a warning for each supplied total the epoch
/// did not match. Returns the mismatches.
pub fn log_epoch_end(
    report: &EpochReport,
    total_examples: Option<u64>,
    total_words: Option<u64>,
    corpus_file_mode: bool,
) -> Vec<TotalsMismatch> {
    info!(
        "EPOCH {}: training on {} raw words ({} effective words) took {:.1}s, {:.0} effective words/s",
        report.epoch,
        report.raw_words,
        report.trained_words,
        report.elapsed.as_secs_f64(),
        report.words_per_sec()
    );
    let mismatches = epoch_mismatches(report, total_examples, total_words, corpus_file_mode);
    for mismatch in &mismatches {
        match *mismatch {
            TotalsMismatch::Examples { expected, observed } => warn!(
                "EPOCH {}: trained on {observed} examples, but the supplied example count was {expected}",
                report.epoch
            ),
            TotalsMismatch::Words { expected, observed } => warn!(
                "EPOCH {}: trained on {observed} raw words, but the supplied word count was {expected}",
                report.epoch
            ),
        }
    }
    mismatches
}

pub fn log_train_end(report: &TrainReport) {
    info!(
        "training on {} raw words ({} effective words) took {:.1}s, {:.0} effective words/s",
        report.raw_words,
        report.trained_words,
        report.elapsed.as_secs_f64(),
        report.trained_words as f64 / report.elapsed.as_secs_f64().max(1e-9)
    );
}
