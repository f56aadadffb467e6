//! Batching the corpus into jobs for the in-memory scheduler.

use std::io;
use std::sync::mpsc::SyncSender;

use log::{debug, warn};

use crate::corpus::{raw_word_count, Corpus, Sentence};
use crate::error::Result;
use crate::real;
use crate::schedule::RateScheduler;

/// One unit of work: some sentences and the learning rate to train them at.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub sentences: Vec<Sentence>,
    pub alpha: real,
}

/// Groups sentences into batches of at most `batch_words` words.
///
/// A sentence that would overflow the current batch starts the next one. A
/// single sentence longer than `batch_words` becomes a batch of its own. No
/// batch is ever empty.
pub struct Batches<I> {
    inner: I,
    batch_words: usize,
    batch: Vec<Sentence>,
    batch_size: usize,
}

impl<I> Batches<I>
where
    I: Iterator<Item = io::Result<Sentence>>,
{
    pub fn new(inner: I, batch_words: usize) -> Self {
        Batches {
            inner,
            batch_words,
            batch: vec![],
            batch_size: 0,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = io::Result<Sentence>>,
{
    type Item = io::Result<Vec<Sentence>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let sentence = match self.inner.next() {
                Some(Ok(sentence)) => sentence,
                Some(Err(err)) => return Some(Err(err)),
                None if self.batch.is_empty() => return None,
                None => {
                    self.batch_size = 0;
                    return Some(Ok(std::mem::take(&mut self.batch)));
                }
            };
            let n = sentence.len();
            if self.batch_size + n <= self.batch_words || self.batch.is_empty() {
                self.batch.push(sentence);
                self.batch_size += n;
            } else {
                let full = std::mem::replace(&mut self.batch, vec![sentence]);
                self.batch_size = n;
                return Some(Ok(full));
            }
        }
    }
}

/// What the producer pushed during one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pushed {
    pub jobs: u64,
    pub examples: u64,
    pub words: u64,
}

/// Fills the job queue for one epoch.
pub struct JobProducer<'a> {
    pub batch_words: usize,
    pub rate: &'a RateScheduler,
    pub cur_epoch: usize,
    pub total_examples: Option<u64>,
    pub total_words: Option<u64>,
    pub workers: usize,
}

impl JobProducer<'_> {
    /// Where the producer is in the epoch, as a fraction.
    ///
    /// Sentence counts are preferred when both totals are known.
    fn epoch_progress(&self, pushed: &Pushed) -> f64 {
        let progress = match (self.total_examples, self.total_words) {
            (Some(total), _) if total > 0 => pushed.examples as f64 / total as f64,
            (_, Some(total)) if total > 0 => pushed.words as f64 / total as f64,
            _ => 0.0,
        };
        progress.min(1.0)
    }

    /// Batch the corpus into `jobs`, then send one `None` per worker.
    ///
    /// Each job carries the learning rate for the corpus position at the
    /// time it was queued. If every worker has gone away, this stops early
    /// and returns what it managed to push.
    pub fn run(&self, corpus: &dyn Corpus, jobs: &SyncSender<Option<Job>>) -> Result<Pushed> {
        let mut pushed = Pushed::default();
        let mut next_alpha = self.rate.next_alpha(0.0, self.cur_epoch);

        for batch in Batches::new(corpus.sentences(), self.batch_words) {
            let batch = batch?;
            let examples = batch.len() as u64;
            let words = raw_word_count(&batch);
            let job = Job {
                sentences: batch,
                alpha: next_alpha,
            };
            if jobs.send(Some(job)).is_err() {
                debug!("job queue closed, producer stopping after {} jobs", pushed.jobs);
                return Ok(pushed);
            }
            pushed.jobs += 1;
            pushed.examples += examples;
            pushed.words += words;

            if self.rate.end_alpha() < next_alpha {
                next_alpha = self
                    .rate
                    .next_alpha(self.epoch_progress(&pushed), self.cur_epoch);
            }
        }

        if pushed.jobs == 0 {
            warn!(
                "train() called with an empty corpus (if not intended, be sure to provide a \
                 corpus that offers restartable iteration)"
            );
        }
        for _ in 0..self.workers {
            if jobs.send(None).is_err() {
                break;
            }
        }
        debug!(
            "job loop exiting, total {} jobs, {} sentences, {} words",
            pushed.jobs, pushed.examples, pushed.words
        );
        Ok(pushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn sentences(lens: &[usize]) -> Vec<Sentence> {
        lens.iter()
            .enumerate()
            .map(|(i, &n)| (0..n).map(|j| format!("s{i}w{j}")).collect())
            .collect()
    }

    fn batch_sizes(corpus: &[Sentence], budget: usize) -> Vec<usize> {
        Batches::new(corpus.sentences(), budget)
            .map(|b| raw_word_count(&b.unwrap()) as usize)
            .collect()
    }

    #[test]
    fn one_word_sentences() {
        let corpus = sentences(&[1; 25]);
        assert_eq!(batch_sizes(&corpus, 10), [10, 10, 5]);
        let first: Vec<Vec<Sentence>> = Batches::new(corpus.sentences(), 10)
            .map(std::result::Result::unwrap)
            .collect();
        assert_eq!(first[0][0], corpus[0]);
        assert_eq!(first[2][4], corpus[24]);
    }

    #[test]
    fn oversized_sentence_gets_its_own_batch() {
        let corpus = sentences(&[3, 15, 4, 4, 4]);
        assert_eq!(batch_sizes(&corpus, 10), [3, 15, 8, 4]);
        let corpus = sentences(&[15]);
        assert_eq!(batch_sizes(&corpus, 10), [15]);
        assert!(batch_sizes(&[], 10).is_empty());
    }

    #[test]
    fn io_errors_pass_through() {
        let items: Vec<io::Result<Sentence>> = vec![
            Ok(vec!["a".into()]),
            Err(io::Error::new(io::ErrorKind::Other, "boom")),
        ];
        let mut batches = Batches::new(items.into_iter(), 10);
        assert!(batches.next().unwrap().is_err());
    }

    #[test]
    fn producer_decays_alpha_and_sends_sentinels() {
        let corpus = sentences(&[1; 25]);
        let rate = RateScheduler::new(0.025, 0.0001, 1);
        let producer = JobProducer {
            batch_words: 10,
            rate: &rate,
            cur_epoch: 0,
            total_examples: Some(25),
            total_words: None,
            workers: 2,
        };
        let (tx, rx) = sync_channel(16);
        let pushed = producer.run(&corpus, &tx).unwrap();
        drop(tx);
        assert_eq!(
            pushed,
            Pushed {
                jobs: 3,
                examples: 25,
                words: 25
            }
        );
        let got: Vec<Option<Job>> = rx.iter().collect();
        assert_eq!(got.len(), 5);
        assert!(got[3].is_none() && got[4].is_none());
        let alphas: Vec<real> = got[..3].iter().map(|j| j.as_ref().unwrap().alpha).collect();
        assert_eq!(alphas[0], 0.025);
        assert!(alphas[0] > alphas[1] && alphas[1] > alphas[2]);
    }

    #[test]
    fn producer_stops_when_workers_are_gone() {
        let corpus = sentences(&[1; 25]);
        let rate = RateScheduler::new(0.025, 0.0001, 1);
        let producer = JobProducer {
            batch_words: 10,
            rate: &rate,
            cur_epoch: 0,
            total_examples: None,
            total_words: Some(25),
            workers: 2,
        };
        let (tx, rx) = sync_channel(1);
        drop(rx);
        assert_eq!(producer.run(&corpus, &tx).unwrap().jobs, 0);
    }
}
