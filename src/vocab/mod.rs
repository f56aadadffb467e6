//! The final vocabulary and the passes that build it.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod builder;
pub mod huffman;
pub mod stats;

pub use builder::{PrepareReport, VocabularyBuilder};
pub use stats::{ScanSummary, VocabularyStats};

/// What a trim rule decides about one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimDecision {
    Keep,
    Discard,
    /// Apply the usual `count >= min_count` test.
    Default,
}

/// Caller-supplied override for which words survive pruning and finalizing.
///
/// Called with `(word, count, min_count)`.
pub type TrimRule = dyn Fn(&str, u64, u64) -> TrimDecision + Send + Sync;

pub fn keep_vocab_item(word: &str, count: u64, min_count: u64, trim_rule: Option<&TrimRule>) -> bool {
    let default = count >= min_count;
    match trim_rule.map(|rule| rule(word, count, min_count)) {
        None | Some(TrimDecision::Default) => default,
        Some(TrimDecision::Keep) => true,
        Some(TrimDecision::Discard) => false,
    }
}

/// A word's path through the Huffman tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuffmanCode {
    /// Branch taken at each inner node, root first: 0 or 1.
    pub code: Vec<u8>,
    /// Inner nodes visited, root first, as rows of the hierarchical-softmax
    /// output layer (`node id - vocab size`).
    pub point: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabWord {
    pub word: String,
    pub count: u64,
    /// Probability of keeping an occurrence of this word during training,
    /// scaled to `0..=u32::MAX`.
    pub sample_int: u32,
    /// Set only when hierarchical softmax is in use.
    pub huffman: Option<HuffmanCode>,
}

impl VocabWord {
    pub fn new(word: String, count: u64) -> Self {
        VocabWord {
            word,
            count,
            sample_int: u32::MAX,
            huffman: None,
        }
    }
}

/// The final vocabulary: a bijection between words and indexes `0..len()`.
///
/// Indexes never change once training starts; an online update only appends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    words: Vec<VocabWord>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Vocabulary::default()
    }

    pub fn from_words(words: Vec<VocabWord>) -> Self {
        let mut vocab = Vocabulary {
            words,
            index: HashMap::new(),
        };
        vocab.rebuild_index();
        vocab
    }

    /// Needed after deserializing, since the hash is not stored.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .words
            .iter()
            .enumerate()
            .map(|(i, vw)| (vw.word.clone(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the index of a word, if it is in the vocabulary.
    pub fn get(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    /// Panics if `i` is out of range.
    pub fn word(&self, i: usize) -> &VocabWord {
        &self.words[i]
    }

    pub fn word_mut(&mut self, i: usize) -> &mut VocabWord {
        &mut self.words[i]
    }

    pub fn words(&self) -> &[VocabWord] {
        &self.words
    }

    pub fn iter(&self) -> impl Iterator<Item = &VocabWord> {
        self.words.iter()
    }

    pub fn counts(&self) -> Vec<u64> {
        self.words.iter().map(|vw| vw.count).collect()
    }

    pub fn total_count(&self) -> u64 {
        self.words.iter().map(|vw| vw.count).sum()
    }

    /// Adds a word at the end and returns its index.
    pub fn push(&mut self, vw: VocabWord) -> usize {
        let n = self.words.len();
        self.index.insert(vw.word.clone(), n);
        self.words.push(vw);
        n
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.index.clear();
    }

    /// Sort by descending count. Ties keep their current order.
    pub fn sort_by_descending_frequency(&mut self) {
        self.words.sort_by_key(|vw| Reverse(vw.count));
        self.rebuild_index();
    }

    pub fn clear_huffman_codes(&mut self) {
        for vw in &mut self.words {
            vw.huffman = None;
        }
    }
}
