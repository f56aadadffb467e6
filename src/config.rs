//! Training configuration, loadable from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::real;

/// Largest value in the negative-sampling cumulative table.
pub const DEFAULT_CUM_TABLE_DOMAIN: u32 = (1 << 31) - 1;

/// Longest sentence handed to the kernel; longer sentences are split.
pub const MAX_WORDS_IN_BATCH: usize = 10_000;

/// Every knob of a training run.
///
/// Missing fields in a JSON config fall back to the values in `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Word2VecConfig {
    /// Embedding vector length (number of dimensions).
    pub vector_size: usize,
    /// Starting learning rate.
    pub alpha: real,
    /// Learning rate at the very end of training.
    pub min_alpha: real,
    /// Max skip length between words.
    pub window: usize,
    /// Discard words that appear less than this many times.
    pub min_count: u64,
    /// Prune the raw vocabulary during the scan whenever it grows past this many word types.
    pub max_vocab_size: Option<usize>,
    /// Raise the effective `min_count` so the final vocabulary has at most this many words.
    pub max_final_vocab: Option<usize>,
    /// Downsampling threshold for frequent words. `0.0` disables downsampling.
    ///
    /// Values below 1 are a fraction of the retained corpus; values of 1 or
    /// more are a raw count threshold.
    pub sample: f64,
    /// Seed for the model-owned random source.
    pub seed: u64,
    /// Number of worker threads.
    pub workers: usize,
    /// Use skip-gram (otherwise CBOW).
    pub sg: bool,
    /// Use hierarchical softmax.
    pub hs: bool,
    /// Number of negative examples per positive one; 0 disables negative sampling.
    pub negative: usize,
    /// Exponent used to smooth counts in the negative-sampling table.
    pub ns_exponent: f64,
    /// CBOW: average the context vectors instead of summing them.
    pub cbow_mean: bool,
    /// Number of passes over the corpus.
    pub epochs: usize,
    /// Append a `"\0"` padding pseudo-word to the vocabulary.
    pub null_word: bool,
    /// Sort the final vocabulary by descending count.
    pub sorted_vocab: bool,
    /// Word budget per job in the in-memory scheduler.
    pub batch_words: usize,
    /// Sentences longer than this are split before training.
    pub max_sentence_length: usize,
    /// Have the kernel compute a running training loss.
    pub compute_loss: bool,
    /// Draw a random effective window size per word.
    pub shrink_windows: bool,
    /// Where to keep cached vocabulary and prepared model state.
    pub cache_dir: Option<PathBuf>,
    /// Log scan progress every N sentences.
    pub progress_per: u64,
    /// Seconds between training progress log lines.
    pub report_delay_secs: f64,
    /// Job queue capacity is `queue_factor * workers`.
    pub queue_factor: usize,
    /// Draw progress bars during the long sequential passes.
    pub show_progress: bool,
    /// Keep the raw counts around after the final vocabulary is built.
    pub keep_raw_vocab: bool,
    /// Largest value of the negative-sampling table.
    pub cum_table_domain: u32,
}

impl Default for Word2VecConfig {
    fn default() -> Self {
        Word2VecConfig {
            vector_size: 100,
            alpha: 0.025,
            min_alpha: 0.0001,
            window: 5,
            min_count: 5,
            max_vocab_size: None,
            max_final_vocab: None,
            sample: 1e-3,
            seed: 1,
            workers: 3,
            sg: false,
            hs: false,
            negative: 5,
            ns_exponent: 0.75,
            cbow_mean: true,
            epochs: 5,
            null_word: false,
            sorted_vocab: true,
            batch_words: MAX_WORDS_IN_BATCH,
            max_sentence_length: MAX_WORDS_IN_BATCH,
            compute_loss: false,
            shrink_windows: true,
            cache_dir: None,
            progress_per: 10_000,
            report_delay_secs: 1.0,
            queue_factor: 2,
            show_progress: false,
            keep_raw_vocab: false,
            cum_table_domain: DEFAULT_CUM_TABLE_DOMAIN,
        }
    }
}

impl Word2VecConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let f = BufReader::new(File::open(path)?);
        let config: Word2VecConfig = serde_json::from_reader(f)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));
        if self.vector_size == 0 {
            return fail("vector_size must be positive");
        }
        if self.workers == 0 {
            return fail("workers must be positive");
        }
        if self.window == 0 {
            return fail("window must be positive");
        }
        if self.batch_words == 0 || self.max_sentence_length == 0 {
            return fail("batch_words and max_sentence_length must be positive");
        }
        if self.queue_factor == 0 {
            return fail("queue_factor must be positive");
        }
        if !self.hs && self.negative == 0 {
            return fail("enable hierarchical softmax (hs) or negative sampling (negative > 0)");
        }
        if !(self.ns_exponent >= 0.0) {
            return fail("ns_exponent must be non-negative");
        }
        if !(self.sample >= 0.0) {
            return fail("sample must be non-negative");
        }
        if self.min_alpha > self.alpha {
            return fail("min_alpha must not exceed alpha");
        }
        Ok(())
    }

    pub fn report_delay(&self) -> Duration {
        Duration::from_secs_f64(self.report_delay_secs.max(0.0))
    }
}
