//! The model: vocabulary, weights and the training entry points.

use std::cmp::Reverse;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::cache::{Cache, PreparedModel};
use crate::config::Word2VecConfig;
use crate::corpus::{Corpus, Sentence};
use crate::cum_table::CumTable;
use crate::error::{Error, Result};
use crate::kernel::{score_sentence_sg, GradientKernel, KernelParams, ModelView, SkipGramKernel};
use crate::real;
use crate::schedule::RateScheduler;
use crate::telemetry::{log_train_end, TrainReport, TrainingCallback};
use crate::trainer::{EpochPlan, TrainingRunState, TrainingScheduler};
use crate::vectors::Vectors;
use crate::vocab::huffman::assign_binary_codes;
use crate::vocab::{
    PrepareReport, ScanSummary, TrimDecision, TrimRule, Vocabulary, VocabularyBuilder, VocabularyStats,
};
use crate::weights::Weights;

/// Arguments to [`Word2Vec::train`].
///
/// Exactly one of `corpus_iterable` and `corpus_file` must be set, and at
/// least one of `total_examples` and `total_words`. File mode needs
/// `total_words`. Unset options fall back to the model's configuration.
#[derive(Default, Clone, Copy)]
pub struct TrainRequest<'a> {
    pub corpus_iterable: Option<&'a dyn Corpus>,
    /// A [`LineSentence`](crate::corpus::LineSentence)-format file, split
    /// between the workers by byte offset.
    pub corpus_file: Option<&'a Path>,
    /// Number of sentences in the corpus.
    pub total_examples: Option<u64>,
    /// Number of raw words in the corpus.
    pub total_words: Option<u64>,
    pub epochs: Option<usize>,
    pub start_alpha: Option<real>,
    pub end_alpha: Option<real>,
    pub queue_factor: Option<usize>,
    pub report_delay: Option<Duration>,
    pub compute_loss: Option<bool>,
}

impl<'a> TrainRequest<'a> {
    pub fn iterable(corpus: &'a dyn Corpus) -> Self {
        TrainRequest {
            corpus_iterable: Some(corpus),
            ..TrainRequest::default()
        }
    }

    pub fn file(path: &'a Path) -> Self {
        TrainRequest {
            corpus_file: Some(path),
            ..TrainRequest::default()
        }
    }

    pub fn total_examples(mut self, n: u64) -> Self {
        self.total_examples = Some(n);
        self
    }

    pub fn total_words(mut self, n: u64) -> Self {
        self.total_words = Some(n);
        self
    }

    pub fn epochs(mut self, n: usize) -> Self {
        self.epochs = Some(n);
        self
    }
}

/// Rough memory use of a model, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryReport {
    pub vocab: usize,
    pub vectors: usize,
    pub syn1: usize,
    pub syn1neg: usize,
    pub total: usize,
}

#[derive(Clone, Copy)]
enum TrainingCorpus<'a> {
    Iterable(&'a dyn Corpus),
    File(&'a Path),
}

/// Validated training arguments.
struct TrainingArgs<'a> {
    corpus: TrainingCorpus<'a>,
    epochs: usize,
    start_alpha: real,
    end_alpha: real,
}

pub struct Word2Vec {
    config: Word2VecConfig,
    kernel_params: KernelParams,
    trim_rule: Option<Box<TrimRule>>,
    callbacks: Vec<Box<dyn TrainingCallback>>,
    rng: StdRng,

    raw_vocab: Option<VocabularyStats>,
    vocab: Vocabulary,
    weights: Option<Weights>,
    cum_table: Option<CumTable>,
    prepare_report: PrepareReport,

    corpus_count: u64,
    corpus_total_words: u64,
    min_alpha_yet_reached: real,
    train_count: u64,
    total_train_time: Duration,
    running_training_loss: f64,
}

impl Word2Vec {
    pub fn new(config: Word2VecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Word2Vec {
            kernel_params: KernelParams {
                sg: config.sg,
                hs: config.hs,
                negative: config.negative,
                cbow_mean: config.cbow_mean,
                window: config.window,
                shrink_windows: config.shrink_windows,
                max_sentence_length: config.max_sentence_length,
            },
            trim_rule: None,
            callbacks: vec![],
            rng: StdRng::seed_from_u64(config.seed),
            raw_vocab: None,
            vocab: Vocabulary::new(),
            weights: None,
            cum_table: None,
            prepare_report: PrepareReport::default(),
            corpus_count: 0,
            corpus_total_words: 0,
            min_alpha_yet_reached: config.alpha,
            train_count: 0,
            total_train_time: Duration::ZERO,
            running_training_loss: 0.0,
            config,
        })
    }

    /// Override which words survive pruning and `min_count`.
    pub fn with_trim_rule(
        mut self,
        rule: impl Fn(&str, u64, u64) -> TrimDecision + Send + Sync + 'static,
    ) -> Self {
        self.trim_rule = Some(Box::new(rule));
        self
    }

    pub fn add_callback(&mut self, callback: Box<dyn TrainingCallback>) {
        self.callbacks.push(callback);
    }

    pub fn config(&self) -> &Word2VecConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn weights(&self) -> Option<&Weights> {
        self.weights.as_ref()
    }

    pub fn cum_table(&self) -> Option<&CumTable> {
        self.cum_table.as_ref()
    }

    /// Raw counts from the last scan, if they were kept.
    pub fn raw_vocab(&self) -> Option<&VocabularyStats> {
        self.raw_vocab.as_ref()
    }

    pub fn prepare_report(&self) -> &PrepareReport {
        &self.prepare_report
    }

    /// Sentences seen by the last vocabulary scan.
    pub fn corpus_count(&self) -> u64 {
        self.corpus_count
    }

    /// Raw words seen by the last vocabulary scan.
    pub fn corpus_total_words(&self) -> u64 {
        self.corpus_total_words
    }

    pub fn min_alpha_yet_reached(&self) -> real {
        self.min_alpha_yet_reached
    }

    /// Whether a `train` call starting at `start_alpha` would raise the
    /// learning rate above the lowest one an earlier call reached.
    pub fn alpha_regresses(&self, start_alpha: real) -> bool {
        self.train_count > 0 && start_alpha > self.min_alpha_yet_reached
    }

    /// Number of completed `train` calls.
    pub fn train_count(&self) -> u64 {
        self.train_count
    }

    pub fn total_train_time(&self) -> Duration {
        self.total_train_time
    }

    /// Loss summed over the last `train` call, if `compute_loss` was on.
    pub fn running_training_loss(&self) -> f64 {
        self.running_training_loss
    }

    fn cache(&self) -> Option<Cache> {
        self.config.cache_dir.as_ref().map(Cache::new)
    }

    fn set_scan_summary(&mut self, summary: &ScanSummary) {
        self.corpus_count = summary.corpus_count;
        self.corpus_total_words = summary.total_words;
    }

    /// Count the words of `corpus`, or load counts from the cache.
    ///
    /// Fails if `expected_sentences` is given and the corpus has a different
    /// number of sentences.
    pub fn scan_vocab(&mut self, corpus: &dyn Corpus, expected_sentences: Option<u64>) -> Result<ScanSummary> {
        let cache = self.cache();
        self.scan_with_cache(corpus, expected_sentences, cache.as_ref())
    }

    fn scan_with_cache(
        &mut self,
        corpus: &dyn Corpus,
        expected_sentences: Option<u64>,
        cache: Option<&Cache>,
    ) -> Result<ScanSummary> {
        if let Some((summary, stats)) = cache.and_then(Cache::load_raw_vocab) {
            match expected_sentences {
                Some(n) if n != summary.corpus_count => warn!(
                    "cached vocabulary scan covered {} sentences, expected {n}; rescanning",
                    summary.corpus_count
                ),
                _ => {
                    self.set_scan_summary(&summary);
                    self.raw_vocab = Some(stats);
                    return Ok(summary);
                }
            }
        }

        let (summary, stats) = VocabularyStats::scan(
            corpus,
            expected_sentences,
            self.config.progress_per,
            self.config.max_vocab_size,
            self.trim_rule.as_deref(),
            self.config.show_progress,
        )?;
        if let Some(cache) = cache {
            cache.save_raw_vocab(&summary, &stats)?;
        }
        self.set_scan_summary(&summary);
        self.raw_vocab = Some(stats);
        Ok(summary)
    }

    /// Turn the scanned counts into the final vocabulary, then build the
    /// Huffman codes and sampling table the objectives need.
    pub fn prepare_vocab(&mut self, update: bool) -> Result<PrepareReport> {
        let raw = self
            .raw_vocab
            .take()
            .ok_or_else(|| Error::Config("scan a corpus before preparing the vocabulary".to_string()))?;
        let builder = VocabularyBuilder {
            min_count: self.config.min_count,
            max_final_vocab: self.config.max_final_vocab,
            sample: self.config.sample,
            sorted_vocab: self.config.sorted_vocab,
            null_word: self.config.null_word,
            show_progress: self.config.show_progress,
        };
        let report = match builder.prepare(&raw, &mut self.vocab, update, self.trim_rule.as_deref()) {
            Ok(report) => report,
            Err(err) => {
                self.raw_vocab = Some(raw);
                return Err(err);
            }
        };
        if self.config.keep_raw_vocab {
            self.raw_vocab = Some(raw);
        } else {
            info!("deleting the raw counts dictionary of {} items", raw.len());
        }

        if self.config.hs {
            self.vocab.clear_huffman_codes();
            assign_binary_codes(&mut self.vocab);
        }
        if self.config.negative > 0 {
            self.cum_table = Some(CumTable::build(
                &self.vocab.counts(),
                self.config.ns_exponent,
                self.config.cum_table_domain,
            ));
        }
        self.prepare_report = report;
        Ok(report)
    }

    /// Allocate the weight matrices for the current vocabulary.
    ///
    /// In update mode the existing rows are kept and only new words get
    /// fresh vectors.
    pub fn prepare_weights(&mut self, update: bool) -> Result<()> {
        let vocab_size = self.vocab.len();
        if update {
            let weights = self.weights.as_mut().ok_or(Error::NoPriorVocabulary)?;
            weights.grow(vocab_size, &mut self.rng)?;
        } else {
            self.weights = Some(Weights::new(
                vocab_size,
                self.config.vector_size,
                self.config.hs,
                self.config.negative > 0,
                &mut self.rng,
            )?);
        }
        Ok(())
    }

    pub fn estimate_memory(&self, vocab_size: Option<usize>) -> MemoryReport {
        let vocab_size = vocab_size.unwrap_or(self.vocab.len());
        let matrix = vocab_size * self.config.vector_size * std::mem::size_of::<real>();
        let mut report = MemoryReport {
            vocab: vocab_size * if self.config.hs { 700 } else { 500 },
            vectors: matrix,
            syn1: if self.config.hs { matrix } else { 0 },
            syn1neg: if self.config.negative > 0 { matrix } else { 0 },
            total: 0,
        };
        report.total = report.vocab + report.vectors + report.syn1 + report.syn1neg;
        info!(
            "estimated required memory for {vocab_size} words and {} dimensions: {} bytes",
            self.config.vector_size, report.total
        );
        report
    }

    /// Scan, prepare and allocate: everything needed before `train`.
    ///
    /// With a cache directory configured, a fully prepared model in the cache
    /// skips all of it, and cached raw counts skip the scan.
    pub fn build_vocab(
        &mut self,
        corpus: &dyn Corpus,
        expected_sentences: Option<u64>,
        update: bool,
    ) -> Result<PrepareReport> {
        if update && self.vocab.is_empty() {
            return Err(Error::NoPriorVocabulary);
        }
        let cache = self.cache();
        if !update {
            if let Some(report) = self.restore_prepared(cache.as_ref(), expected_sentences) {
                return Ok(report);
            }
        }

        // Cached counts describe the corpus the vocabulary was first built
        // from, not the one being added.
        let raw_cache = if update { None } else { cache.as_ref() };
        self.scan_with_cache(corpus, expected_sentences, raw_cache)?;
        let report = self.prepare_vocab(update)?;
        self.estimate_memory(None);
        self.prepare_weights(update)?;
        if let Some(cache) = &cache {
            self.save_prepared(cache)?;
        }
        Ok(report)
    }

    fn restore_prepared(&mut self, cache: Option<&Cache>, expected_sentences: Option<u64>) -> Option<PrepareReport> {
        let (model, cum_table) = cache?.load_prepared()?;
        let report = model.report;
        let summary = model.summary;
        if let Some(n) = expected_sentences.filter(|&n| n != summary.corpus_count) {
            warn!(
                "cached model was built from {} sentences, expected {n}; rebuilding",
                summary.corpus_count
            );
            return None;
        }
        if model.vector_size != self.config.vector_size {
            warn!(
                "cached model has {} dimensions, configured for {}; rebuilding",
                model.vector_size, self.config.vector_size
            );
            return None;
        }
        let (vocab, weights) = match model.into_parts() {
            Ok(parts) => parts,
            Err(err) => {
                warn!("ignoring unusable cached model: {err}");
                return None;
            }
        };
        if (self.config.hs && weights.syn1.is_none())
            || (self.config.negative > 0 && (weights.syn1neg.is_none() || cum_table.is_none()))
        {
            warn!("cached model was built for a different objective; rebuilding");
            return None;
        }
        self.vocab = vocab;
        self.weights = Some(weights);
        self.cum_table = cum_table;
        self.prepare_report = report;
        self.set_scan_summary(&summary);
        Some(report)
    }

    fn save_prepared(&self, cache: &Cache) -> Result<()> {
        let weights = self.weights.as_ref().ok_or(Error::WeightsNotInitialized)?;
        let summary = ScanSummary {
            total_words: self.corpus_total_words,
            corpus_count: self.corpus_count,
        };
        cache.save_prepared(
            &PreparedModel::capture(&self.prepare_report, &summary, &self.vocab, weights),
            self.cum_table.as_ref(),
        )
    }

    /// Write the current vocabulary and weights to the configured cache.
    pub fn save_to_cache(&self) -> Result<()> {
        let cache = self
            .cache()
            .ok_or_else(|| Error::Config("no cache_dir configured".to_string()))?;
        self.save_prepared(&cache)
    }

    fn check_training_sanity<'r>(&self, req: &TrainRequest<'r>) -> Result<TrainingArgs<'r>> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));
        if self.vocab.is_empty() {
            return Err(Error::VocabularyNotBuilt);
        }
        let Some(weights) = &self.weights else {
            return Err(Error::WeightsNotInitialized);
        };
        if weights.vocab_size() != self.vocab.len() {
            return fail("the vocabulary changed; call prepare_weights before training");
        }
        if self.config.negative > 0 && self.cum_table.is_none() {
            return fail("negative sampling needs a sampling table; build the vocabulary first");
        }
        let corpus = match (req.corpus_iterable, req.corpus_file) {
            (Some(corpus), None) => TrainingCorpus::Iterable(corpus),
            (None, Some(path)) => TrainingCorpus::File(path),
            (None, None) => return fail("either corpus_iterable or corpus_file must be given"),
            (Some(_), Some(_)) => return fail("only one of corpus_iterable and corpus_file may be given"),
        };
        if req.total_examples.is_none() && req.total_words.is_none() {
            return fail(
                "you must specify either total_examples or total_words, for proper learning-rate \
                 and progress calculations",
            );
        }
        if req.corpus_file.is_some() && req.total_words.is_none() {
            return fail("training from a corpus file requires total_words");
        }
        let epochs = req.epochs.unwrap_or(self.config.epochs);
        if epochs == 0 {
            return fail("epochs must be a positive integer");
        }
        let start_alpha = req.start_alpha.unwrap_or(self.config.alpha);
        let end_alpha = req.end_alpha.unwrap_or(self.config.min_alpha);
        if self.alpha_regresses(start_alpha) {
            warn!(
                "effective alpha {start_alpha} is higher than the lowest alpha already reached \
                 ({}); training will unlearn some of what it learned",
                self.min_alpha_yet_reached
            );
        }
        Ok(TrainingArgs {
            corpus,
            epochs,
            start_alpha,
            end_alpha,
        })
    }

    /// Train with the built-in [`SkipGramKernel`].
    pub fn train(&mut self, req: &TrainRequest<'_>) -> Result<TrainReport> {
        self.train_with(&SkipGramKernel::new(), req)
    }

    /// Train with any [`GradientKernel`].
    pub fn train_with<K: GradientKernel + ?Sized>(
        &mut self,
        kernel: &K,
        req: &TrainRequest<'_>,
    ) -> Result<TrainReport> {
        let args = self.check_training_sanity(req)?;
        let corpus = args.corpus;
        let start = Instant::now();
        let Some(weights) = self.weights.as_ref() else {
            return Err(Error::WeightsNotInitialized);
        };
        info!(
            "training model with {} workers on {} vocabulary and {} features, using sg={} hs={} \
             sample={} negative={} window={} shrink_windows={}",
            self.config.workers,
            self.vocab.len(),
            self.config.vector_size,
            self.config.sg,
            self.config.hs,
            self.config.sample,
            self.config.negative,
            self.config.window,
            self.config.shrink_windows
        );

        let rate = RateScheduler::new(args.start_alpha, args.end_alpha, args.epochs);
        let scheduler = TrainingScheduler {
            kernel,
            model: ModelView {
                vocab: &self.vocab,
                weights,
                cum_table: self.cum_table.as_ref(),
                params: &self.kernel_params,
            },
            workers: self.config.workers,
            queue_factor: req.queue_factor.unwrap_or(self.config.queue_factor).max(1),
            batch_words: self.config.batch_words,
            report_delay: req.report_delay.unwrap_or_else(|| self.config.report_delay()),
            compute_loss: req.compute_loss.unwrap_or(self.config.compute_loss),
            seed: self.rng.gen(),
        };

        let mut state = TrainingRunState::default();
        for callback in &mut self.callbacks {
            callback.on_train_begin(args.epochs);
        }
        for epoch in 0..args.epochs {
            for callback in &mut self.callbacks {
                callback.on_epoch_begin(epoch);
            }
            let plan = EpochPlan {
                epoch,
                total_examples: req.total_examples,
                total_words: req.total_words,
                rate: &rate,
            };
            let report = match corpus {
                TrainingCorpus::Iterable(corpus) => scheduler.train_epoch_iterable(corpus, &plan)?,
                TrainingCorpus::File(path) => scheduler.train_epoch_file(path, &plan)?,
            };
            state.record(&report);
            for callback in &mut self.callbacks {
                callback.on_epoch_end(&report);
            }
        }

        let elapsed = start.elapsed();
        self.min_alpha_yet_reached = rate.min_alpha_yet_reached();
        self.train_count += 1;
        self.total_train_time += elapsed;
        self.running_training_loss = state.running_loss;

        let report = TrainReport {
            epochs: args.epochs,
            trained_words: state.trained_words,
            raw_words: state.raw_words,
            jobs: state.jobs,
            loss: state.running_loss,
            elapsed,
            min_alpha_yet_reached: self.min_alpha_yet_reached,
        };
        log_train_end(&report);
        for callback in &mut self.callbacks {
            callback.on_train_end(&report);
        }
        Ok(report)
    }

    fn view(&self) -> Result<ModelView<'_>> {
        if self.vocab.is_empty() {
            return Err(Error::VocabularyNotBuilt);
        }
        let weights = self.weights.as_ref().ok_or(Error::WeightsNotInitialized)?;
        Ok(ModelView {
            vocab: &self.vocab,
            weights,
            cum_table: self.cum_table.as_ref(),
            params: &self.kernel_params,
        })
    }

    /// Log probability of each sentence, under a skip-gram model trained
    /// with hierarchical softmax.
    pub fn score(&self, sentences: &[Sentence]) -> Result<Vec<f64>> {
        if !(self.config.hs && self.config.sg) {
            return Err(Error::ObjectiveNotConfigured {
                operation: "score",
                objective: "skip-gram with hierarchical softmax (sg and hs)",
            });
        }
        let model = self.view()?;
        Ok(sentences
            .iter()
            .map(|sentence| score_sentence_sg(&model, sentence))
            .collect())
    }

    /// The `topn` most likely center words for the given context words.
    ///
    /// Returns `Ok(None)` if none of the context words are in the vocabulary.
    pub fn predict_output_word(&self, context: &[&str], topn: usize) -> Result<Option<Vec<(String, real)>>> {
        if self.config.negative == 0 {
            return Err(Error::ObjectiveNotConfigured {
                operation: "predict_output_word",
                objective: "negative sampling (negative > 0)",
            });
        }
        let model = self.view()?;
        let Some(syn1neg) = model.weights.syn1neg.as_ref() else {
            return Err(Error::WeightsNotInitialized);
        };
        let indexes: Vec<usize> = context.iter().filter_map(|w| self.vocab.get(w)).collect();
        if indexes.is_empty() {
            warn!("all the input context words are out-of-vocabulary for the current model");
            return Ok(None);
        }

        let size = model.weights.vector_size();
        let mut l1 = vec![0.0 as real; size];
        for &i in &indexes {
            for (h, x) in l1.iter_mut().zip(model.weights.syn0.row(i)) {
                *h += x.get();
            }
        }
        if self.config.cbow_mean {
            let n = indexes.len() as real;
            l1.iter_mut().for_each(|h| *h /= n);
        }

        // Softmax over every word, shifted by the max for stability.
        let scores: Vec<f64> = (0..self.vocab.len())
            .map(|w| {
                l1.iter()
                    .zip(syn1neg.row(w))
                    .map(|(a, b)| (a * b.get()) as f64)
                    .sum::<f64>()
            })
            .collect();
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        let mut ranked: Vec<(usize, f64)> = exps.into_iter().map(|e| e / total).enumerate().collect();
        ranked.sort_by_key(|&(_, p)| Reverse(OrderedFloat(p)));
        ranked.truncate(topn);
        Ok(Some(
            ranked
                .into_iter()
                .map(|(i, p)| (self.vocab.word(i).word.clone(), p as real))
                .collect(),
        ))
    }

    pub fn vectors(&self) -> Result<Vectors> {
        let model = self.view()?;
        Ok(Vectors::from_model(model.vocab, model.weights))
    }

    /// Save the input vectors in word2vec text or binary format.
    pub fn save_vectors(&self, path: &Path, binary: bool) -> Result<()> {
        self.vectors()?.save(path, binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Sentence> {
        let text = [
            "the quick brown fox jumps over the lazy dog",
            "the dog barks at the fox",
            "a quick brown dog runs",
            "the lazy fox sleeps",
        ];
        (0..20)
            .flat_map(|_| text.iter())
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    fn config() -> Word2VecConfig {
        Word2VecConfig {
            vector_size: 10,
            min_count: 1,
            workers: 2,
            epochs: 2,
            batch_words: 20,
            ..Word2VecConfig::default()
        }
    }

    #[test]
    fn training_needs_vocab_and_weights() {
        let corpus = corpus();
        let mut model = Word2Vec::new(config()).unwrap();
        let req = TrainRequest::iterable(&corpus).total_examples(80);
        assert!(matches!(model.train(&req), Err(Error::VocabularyNotBuilt)));

        model.scan_vocab(&corpus, None).unwrap();
        model.prepare_vocab(false).unwrap();
        assert!(matches!(model.train(&req), Err(Error::WeightsNotInitialized)));
        model.prepare_weights(false).unwrap();
        model.train(&req).unwrap();
    }

    #[test]
    fn request_validation() {
        let corpus = corpus();
        let mut model = Word2Vec::new(config()).unwrap();
        model.build_vocab(&corpus, None, false).unwrap();
        let path = Path::new("corpus.txt");

        let bad = [
            TrainRequest::default().total_examples(80),
            TrainRequest {
                corpus_file: Some(path),
                ..TrainRequest::iterable(&corpus)
            }
            .total_examples(80),
            TrainRequest::iterable(&corpus),
            TrainRequest::iterable(&corpus).total_examples(80).epochs(0),
            TrainRequest::file(path).total_examples(80),
        ];
        for req in &bad {
            assert!(matches!(model.train(req), Err(Error::Config(_))));
        }
        assert_eq!(model.train_count(), 0);
    }

    #[test]
    fn update_needs_a_prior_vocabulary() {
        let corpus = corpus();
        let mut model = Word2Vec::new(config()).unwrap();
        assert!(matches!(
            model.build_vocab(&corpus, None, true),
            Err(Error::NoPriorVocabulary)
        ));
        assert!(matches!(
            model.prepare_weights(true),
            Err(Error::NoPriorVocabulary)
        ));
    }

    #[test]
    fn objective_specific_operations() {
        let corpus = corpus();
        let mut model = Word2Vec::new(config()).unwrap();
        model.build_vocab(&corpus, None, false).unwrap();
        assert!(matches!(
            model.score(&corpus[..1]),
            Err(Error::ObjectiveNotConfigured { operation: "score", .. })
        ));
        assert_eq!(model.predict_output_word(&["zzz", "yyy"], 3).unwrap(), None);
        let top = model.predict_output_word(&["quick", "brown"], 3).unwrap().unwrap();
        assert_eq!(top.len(), 3);
        assert!(top[0].1 >= top[1].1 && top[1].1 >= top[2].1);

        let mut hs = Word2Vec::new(Word2VecConfig {
            hs: true,
            negative: 0,
            sg: true,
            ..config()
        })
        .unwrap();
        hs.build_vocab(&corpus, None, false).unwrap();
        assert!(matches!(
            hs.predict_output_word(&["quick"], 3),
            Err(Error::ObjectiveNotConfigured { .. })
        ));
        let scores = hs.score(&corpus[..2]).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|&s| s < 0.0));
    }

    #[test]
    fn restarting_above_the_reached_alpha_is_flagged() {
        let corpus = corpus();
        let mut model = Word2Vec::new(config()).unwrap();
        model.build_vocab(&corpus, None, false).unwrap();
        let alpha = model.config().alpha;
        assert!(!model.alpha_regresses(alpha));

        model
            .train(&TrainRequest::iterable(&corpus).total_examples(80))
            .unwrap();
        let reached = model.min_alpha_yet_reached();
        assert!(reached < alpha);
        assert!(model.alpha_regresses(alpha));
        assert!(!model.alpha_regresses(reached));

        // A second call that starts high still trains; it only warns.
        model
            .train(&TrainRequest::iterable(&corpus).total_examples(80))
            .unwrap();
        assert_eq!(model.train_count(), 2);
    }

    #[test]
    fn memory_estimate() {
        let model = Word2Vec::new(Word2VecConfig {
            hs: true,
            negative: 5,
            vector_size: 100,
            ..Word2VecConfig::default()
        })
        .unwrap();
        let report = model.estimate_memory(Some(1000));
        assert_eq!(report.vocab, 700_000);
        assert_eq!(report.vectors, 400_000);
        assert_eq!(report.syn1, 400_000);
        assert_eq!(report.syn1neg, 400_000);
        assert_eq!(report.total, 1_900_000);
    }

    #[test]
    fn same_seed_same_model() {
        let corpus = corpus();
        let run = || {
            let mut model = Word2Vec::new(Word2VecConfig {
                workers: 1,
                ..config()
            })
            .unwrap();
            model.build_vocab(&corpus, None, false).unwrap();
            model
                .train(&TrainRequest::iterable(&corpus).total_examples(80))
                .unwrap();
            model.weights().unwrap().syn0.to_vec()
        };
        assert_eq!(run(), run());
    }
}
