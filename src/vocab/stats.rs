//! Raw word counts, collected in one pass over the corpus.

use std::collections::HashMap;

use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::vocab::{keep_vocab_item, TrimRule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub word: String,
    pub count: u64,
}

/// Totals from a vocabulary scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_words: u64,
    pub corpus_count: u64,
}

/// Word -> raw frequency, in first-seen order.
///
/// When `max_vocab_size` is set and the number of distinct words exceeds it,
/// the scan prunes every word whose count is below `min_reduce`, then bumps
/// `min_reduce` by one. This bounds memory, but it is lossy and depends on
/// sentence order: a rare word that shows up early can be pruned and then
/// counted again from zero, while the same word showing up late survives.
#[derive(Debug, Clone, Default)]
pub struct VocabularyStats {
    vocab: Vec<RawEntry>,
    vocab_hash: HashMap<String, usize>,
    min_reduce: u64,
}

impl VocabularyStats {
    pub fn new() -> Self {
        VocabularyStats {
            vocab: Vec::with_capacity(1000),
            vocab_hash: HashMap::new(),
            min_reduce: 1,
        }
    }

    pub fn from_entries(entries: Vec<RawEntry>) -> Self {
        let mut stats = VocabularyStats {
            vocab: entries,
            vocab_hash: HashMap::new(),
            min_reduce: 1,
        };
        stats.rehash();
        stats
    }

    fn rehash(&mut self) {
        self.vocab_hash.clear();
        for (i, e) in self.vocab.iter().enumerate() {
            self.vocab_hash.insert(e.word.clone(), i);
        }
    }

    /// Count one occurrence of `word`.
    pub fn add_word(&mut self, word: &str) {
        if let Some(&a) = self.vocab_hash.get(word) {
            self.vocab[a].count += 1;
        } else {
            self.vocab_hash.insert(word.to_string(), self.vocab.len());
            self.vocab.push(RawEntry {
                word: word.to_string(),
                count: 1,
            });
        }
    }

    /// Reduces the vocabulary by removing infrequent tokens.
    pub fn prune(&mut self, trim_rule: Option<&TrimRule>) {
        let min_reduce = self.min_reduce;
        self.vocab
            .retain(|e| keep_vocab_item(&e.word, e.count, min_reduce, trim_rule));
        // Hash will be re-computed, as it is not actual
        self.rehash();
        self.min_reduce += 1;
    }

    /// The threshold the next pruning pass will use.
    pub fn min_reduce(&self) -> u64 {
        self.min_reduce
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    pub fn count(&self, word: &str) -> Option<u64> {
        self.vocab_hash.get(word).map(|&i| self.vocab[i].count)
    }

    pub fn entries(&self) -> &[RawEntry] {
        &self.vocab
    }

    pub fn into_entries(self) -> Vec<RawEntry> {
        self.vocab
    }

    pub fn total_count(&self) -> u64 {
        self.vocab.iter().map(|e| e.count).sum()
    }

    /// Walk the corpus once, counting every word.
    ///
    /// If `expected_sentences` is given and the corpus turns out to have a
    /// different number of sentences, this fails with
    /// [`Error::CorpusSizeMismatch`].
    pub fn scan(
        corpus: &dyn Corpus,
        expected_sentences: Option<u64>,
        progress_per: u64,
        max_vocab_size: Option<usize>,
        trim_rule: Option<&TrimRule>,
        show_progress: bool,
    ) -> Result<(ScanSummary, VocabularyStats)> {
        info!("collecting all words and their counts");
        let mut stats = VocabularyStats::new();
        let mut total_words: u64 = 0;
        let mut corpus_count: u64 = 0;
        let progress_per = progress_per.max(1);

        let pb = ProgressBar::new(expected_sentences.unwrap_or(0));
        if !show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        for sentence in corpus.sentences() {
            let sentence = sentence?;
            if corpus_count % progress_per == 0 {
                info!(
                    "PROGRESS: at sentence #{corpus_count}, processed {total_words} words, keeping {} word types",
                    stats.len()
                );
            }
            for word in &sentence {
                stats.add_word(word);
            }
            total_words += sentence.len() as u64;
            corpus_count += 1;

            if let Some(max) = max_vocab_size {
                if stats.len() > max {
                    stats.prune(trim_rule);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if let Some(expected) = expected_sentences {
            if expected != corpus_count {
                return Err(Error::CorpusSizeMismatch {
                    expected,
                    observed: corpus_count,
                });
            }
        }
        if stats.min_reduce > 1 {
            warn!(
                "raw vocabulary was pruned {} times to stay under {} word types; rare word counts are approximate",
                stats.min_reduce - 1,
                max_vocab_size.unwrap_or(0)
            );
        }
        info!(
            "collected {} word types from a corpus of {total_words} raw words and {corpus_count} sentences",
            stats.len()
        );
        Ok((
            ScanSummary {
                total_words,
                corpus_count,
            },
            stats,
        ))
    }
}
