//! The per-batch training step the scheduler hands work to.
//!
//! [`GradientKernel`] is the seam: the scheduler only knows how to call it
//! from many threads at once. [`SkipGramKernel`] is the stock implementation,
//! covering skip-gram and CBOW with hierarchical softmax and/or negative
//! sampling.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::corpus::{LineSentence, Sentence};
use crate::cum_table::CumTable;
use crate::error::Result;
use crate::real;
use crate::schedule::RateScheduler;
use crate::vocab::Vocabulary;
use crate::weights::{Real, Weights};

const EXP_TABLE_SIZE: usize = 1000;
const MAX_EXP: real = 6.0;

/// The knobs the kernel reads.
#[derive(Debug, Clone)]
pub struct KernelParams {
    pub sg: bool,
    pub hs: bool,
    pub negative: usize,
    pub cbow_mean: bool,
    pub window: usize,
    pub shrink_windows: bool,
    pub max_sentence_length: usize,
}

/// Everything a kernel may read or update while training.
///
/// The weight rows are shared by all workers; see [`crate::weights`].
#[derive(Clone, Copy)]
pub struct ModelView<'a> {
    pub vocab: &'a Vocabulary,
    pub weights: &'a Weights,
    pub cum_table: Option<&'a CumTable>,
    pub params: &'a KernelParams,
}

/// Per-worker buffers and random source.
pub struct Scratch {
    /// Accumulated error for the input layer.
    pub work: Vec<real>,
    /// Hidden layer.
    pub neu1: Vec<real>,
    /// Word indexes of the sentence being trained.
    pub indexes: Vec<usize>,
    pub rng: StdRng,
}

impl Scratch {
    pub fn new(vector_size: usize, seed: u64) -> Self {
        Scratch {
            work: vec![0.0; vector_size],
            neu1: vec![0.0; vector_size],
            indexes: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchOutcome {
    /// Words that were in the vocabulary, before downsampling.
    pub effective_words: u64,
    pub loss: f64,
}

/// One worker's byte range of a corpus file, for one epoch.
///
/// The shard owns the lines that start in `offset..end`.
pub struct Shard<'a> {
    pub path: &'a Path,
    pub offset: u64,
    pub end: u64,
    pub epoch: usize,
    pub total_examples: Option<u64>,
    pub total_words: u64,
    pub workers: usize,
    pub rate: &'a RateScheduler,
}

impl Shard<'_> {
    /// This worker's share of the epoch's raw words.
    pub fn expected_words(&self) -> u64 {
        self.total_words / self.workers.max(1) as u64
    }

    pub fn expected_examples(&self) -> Option<u64> {
        self.total_examples.map(|n| n / self.workers.max(1) as u64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShardOutcome {
    pub examples: u64,
    pub effective_words: u64,
    pub raw_words: u64,
    pub loss: f64,
}

/// A training step that is safe to run from many workers at once against the
/// same [`ModelView`].
pub trait GradientKernel: Sync {
    /// Train on one job's sentences at learning rate `alpha`.
    fn train_batch(
        &self,
        model: &ModelView<'_>,
        sentences: &[Sentence],
        alpha: real,
        scratch: &mut Scratch,
        compute_loss: bool,
    ) -> Result<BatchOutcome>;

    /// Train on one shard of a line-oriented corpus file.
    ///
    /// The kernel trains on exactly the lines that start inside the shard's
    /// byte range, picking its own learning rate from `shard.rate` as it
    /// goes.
    fn train_epoch_from_file(
        &self,
        model: &ModelView<'_>,
        shard: &Shard<'_>,
        scratch: &mut Scratch,
        compute_loss: bool,
    ) -> Result<ShardOutcome>;
}

fn dot(a: &[real], b: &[Real]) -> real {
    a.iter().zip(b).map(|(x, y)| x * y.get()).sum()
}

/// `y += g * x`
fn axpy(g: real, x: &[real], y: &[Real]) {
    for (x, y) in x.iter().zip(y) {
        y.add(g * x);
    }
}

/// `y += g * x`, reading `x` from shared weights.
fn axpy_shared(g: real, x: &[Real], y: &mut [real]) {
    for (x, y) in x.iter().zip(y) {
        *y += g * x.get();
    }
}

fn log_sigmoid(x: real) -> f64 {
    let x = x as f64;
    -(1.0 + (-x).exp()).ln()
}

/// Skip-gram / CBOW trainer with an exp lookup table for the sigmoid.
pub struct SkipGramKernel {
    exp_table: Vec<real>,
}

impl Default for SkipGramKernel {
    fn default() -> Self {
        SkipGramKernel::new()
    }
}

impl SkipGramKernel {
    pub fn new() -> Self {
        let exp_table = (0..EXP_TABLE_SIZE)
            .map(|i| {
                let j = (i as real / EXP_TABLE_SIZE as real * 2.0 - 1.0) * MAX_EXP;
                let e = j.exp();
                e / (e + 1.0)
            })
            .collect();
        SkipGramKernel { exp_table }
    }

    /// Approximate the logistic function, 1 / (1 + e^-x).
    fn sigmoid(&self, x: real) -> real {
        if x >= MAX_EXP {
            1.0
        } else if x <= -MAX_EXP {
            0.0
        } else {
            let i = ((x + MAX_EXP) * (EXP_TABLE_SIZE as real / MAX_EXP / 2.0)) as usize;
            self.exp_table[i.min(EXP_TABLE_SIZE - 1)]
        }
    }

    /// Look up a sentence's words, dropping unknown words and downsampling
    /// frequent ones. Returns the number of known words.
    fn sample_sentence(&self, model: &ModelView<'_>, sentence: &[String], scratch: &mut Scratch) -> u64 {
        let Scratch { indexes, rng, .. } = scratch;
        indexes.clear();
        let mut effective = 0;
        for word in sentence.iter().take(model.params.max_sentence_length) {
            let Some(i) = model.vocab.get(word) else {
                continue;
            };
            effective += 1;
            if model.vocab.word(i).sample_int < rng.gen::<u32>() {
                continue;
            }
            indexes.push(i);
        }
        effective
    }

    /// Train the output layers to predict `word` from the hidden layer
    /// `neu1`, accumulating the input error into `work`. Returns the loss.
    #[allow(clippy::too_many_arguments)]
    fn train_output(
        &self,
        model: &ModelView<'_>,
        word: usize,
        neu1: &[real],
        work: &mut [real],
        alpha: real,
        rng: &mut StdRng,
        compute_loss: bool,
    ) -> f64 {
        let mut loss = 0.0;

        // HIERARCHICAL SOFTMAX
        if let (true, Some(syn1), Some(code)) = (
            model.params.hs,
            model.weights.syn1.as_ref(),
            model.vocab.word(word).huffman.as_ref(),
        ) {
            for (&bit, &point) in code.code.iter().zip(&code.point) {
                let l2 = syn1.row(point as usize);
                let f = dot(neu1, l2);
                if compute_loss {
                    let sgn: real = if bit == 0 { 1.0 } else { -1.0 };
                    loss -= log_sigmoid(sgn * f);
                }
                if f <= -MAX_EXP || f >= MAX_EXP {
                    continue;
                }
                // 'g' is the gradient (d/df loss) multiplied by the learning rate
                let g = (1.0 - bit as real - self.sigmoid(f)) * alpha;
                axpy_shared(g, l2, work);
                axpy(g, neu1, l2);
            }
        }

        // NEGATIVE SAMPLING
        if let (true, Some(syn1neg), Some(table)) = (
            model.params.negative > 0,
            model.weights.syn1neg.as_ref(),
            model.cum_table,
        ) {
            for d in 0..=model.params.negative {
                let (target, label) = if d == 0 {
                    (word, 1.0)
                } else {
                    let target = table.draw(rng);
                    if target == word {
                        continue;
                    }
                    (target, 0.0)
                };
                let l2 = syn1neg.row(target);
                let f = dot(neu1, l2);
                if compute_loss {
                    loss -= log_sigmoid(if label > 0.0 { f } else { -f });
                }
                let g = (label - self.sigmoid(f)) * alpha;
                axpy_shared(g, l2, work);
                axpy(g, neu1, l2);
            }
        }
        loss
    }

    /// Train every position of the sentence currently in `scratch.indexes`.
    fn train_sentence(
        &self,
        model: &ModelView<'_>,
        alpha: real,
        scratch: &mut Scratch,
        compute_loss: bool,
    ) -> f64 {
        let Scratch {
            work,
            neu1,
            indexes,
            rng,
        } = scratch;
        let syn0 = &model.weights.syn0;
        let window = model.params.window;
        let mut loss = 0.0;

        for pos in 0..indexes.len() {
            let word = indexes[pos];
            let b = if model.params.shrink_windows && window > 0 {
                rng.gen_range(0..window)
            } else {
                0
            };
            let start = pos.saturating_sub(window - b);
            let end = (pos + window + 1 - b).min(indexes.len());
            let context = (start..end).filter(|&c| c != pos).map(|c| indexes[c]);

            if model.params.sg {
                //train skip-gram
                for last_word in context {
                    let l1 = syn0.row(last_word);
                    for (h, x) in neu1.iter_mut().zip(l1) {
                        *h = x.get();
                    }
                    work.fill(0.0);
                    loss += self.train_output(model, word, neu1, work, alpha, rng, compute_loss);
                    // Learn weights input -> hidden
                    for (x, e) in l1.iter().zip(work.iter()) {
                        x.add(*e);
                    }
                }
            } else {
                //train the cbow architecture
                neu1.fill(0.0);
                work.fill(0.0);
                let mut cw = 0;
                for last_word in context.clone() {
                    for (h, x) in neu1.iter_mut().zip(syn0.row(last_word)) {
                        *h += x.get();
                    }
                    cw += 1;
                }
                if cw == 0 {
                    continue;
                }
                let inv_count = 1.0 / cw as real;
                if model.params.cbow_mean {
                    neu1.iter_mut().for_each(|h| *h *= inv_count);
                }
                loss += self.train_output(model, word, neu1, work, alpha, rng, compute_loss);
                if !model.params.cbow_mean {
                    work.iter_mut().for_each(|e| *e *= inv_count);
                }
                // hidden -> in
                for last_word in context {
                    for (x, e) in syn0.row(last_word).iter().zip(work.iter()) {
                        x.add(*e);
                    }
                }
            }
        }
        loss
    }
}

impl GradientKernel for SkipGramKernel {
    fn train_batch(
        &self,
        model: &ModelView<'_>,
        sentences: &[Sentence],
        alpha: real,
        scratch: &mut Scratch,
        compute_loss: bool,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for sentence in sentences {
            outcome.effective_words += self.sample_sentence(model, sentence, scratch);
            outcome.loss += self.train_sentence(model, alpha, scratch, compute_loss);
        }
        Ok(outcome)
    }

    fn train_epoch_from_file(
        &self,
        model: &ModelView<'_>,
        shard: &Shard<'_>,
        scratch: &mut Scratch,
        compute_loss: bool,
    ) -> Result<ShardOutcome> {
        let expected_words = shard.expected_words();
        let expected_examples = shard.expected_examples();
        let mut outcome = ShardOutcome::default();
        let reader = LineSentence::open_range(
            shard.path,
            shard.offset,
            shard.end,
            model.params.max_sentence_length,
        )?;

        for sentence in reader {
            let sentence = sentence?;
            let progress = match expected_examples {
                Some(n) if n > 0 => outcome.examples as f64 / n as f64,
                _ => outcome.raw_words as f64 / expected_words.max(1) as f64,
            };
            let alpha = shard.rate.next_alpha(progress.min(1.0), shard.epoch);

            outcome.effective_words += self.sample_sentence(model, &sentence, scratch);
            outcome.loss += self.train_sentence(model, alpha, scratch, compute_loss);
            outcome.examples += 1;
            outcome.raw_words += sentence.len() as u64;
        }
        Ok(outcome)
    }
}

/// Log probability of a sentence under a skip-gram hierarchical-softmax model.
///
/// Words not in the vocabulary are ignored. There is no downsampling and no
/// window shrinking, so this is deterministic.
pub fn score_sentence_sg(model: &ModelView<'_>, sentence: &[String]) -> f64 {
    let Some(syn1) = model.weights.syn1.as_ref() else {
        return 0.0;
    };
    let indexes: Vec<usize> = sentence
        .iter()
        .take(model.params.max_sentence_length)
        .filter_map(|w| model.vocab.get(w))
        .collect();
    let window = model.params.window;
    let mut log_prob = 0.0;
    for (pos, &word) in indexes.iter().enumerate() {
        let Some(code) = model.vocab.word(word).huffman.as_ref() else {
            continue;
        };
        let start = pos.saturating_sub(window);
        let end = (pos + window + 1).min(indexes.len());
        for c in (start..end).filter(|&c| c != pos) {
            let l1 = model.weights.syn0.row(indexes[c]);
            for (&bit, &point) in code.code.iter().zip(&code.point) {
                let l2 = syn1.row(point as usize);
                let f: real = l1.iter().zip(l2).map(|(x, y)| x.get() * y.get()).sum();
                let sgn: real = if bit == 0 { 1.0 } else { -1.0 };
                let f = sgn * f;
                if f <= -MAX_EXP || f >= MAX_EXP {
                    continue;
                }
                log_prob += log_sigmoid(f);
            }
        }
    }
    log_prob
}
