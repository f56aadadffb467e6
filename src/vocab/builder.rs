//! Turning raw counts into the final vocabulary.

use std::cmp::Reverse;

use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vocab::stats::VocabularyStats;
use crate::vocab::{keep_vocab_item, TrimRule, VocabWord, Vocabulary};

/// The pseudo-word used for padding.
pub const NULL_WORD: &str = "\0";

/// What `prepare` kept, dropped and downsampled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareReport {
    pub drop_unique: u64,
    pub drop_total: u64,
    pub retain_unique: u64,
    pub retain_total: u64,
    pub downsample_unique: u64,
    /// Expected number of word occurrences left after downsampling.
    pub downsample_total: u64,
    pub effective_min_count: u64,
    pub num_retained_words: usize,
}

/// Vocabulary policy: which words to keep and how often to sample them.
#[derive(Debug, Clone)]
pub struct VocabularyBuilder {
    pub min_count: u64,
    pub max_final_vocab: Option<usize>,
    pub sample: f64,
    pub sorted_vocab: bool,
    pub null_word: bool,
    pub show_progress: bool,
}

/// The smallest `min_count` that keeps the vocabulary within
/// `max_final_vocab` words, but never less than `min_count`.
pub fn effective_min_count(raw: &VocabularyStats, min_count: u64, max_final_vocab: Option<usize>) -> u64 {
    let Some(max_final_vocab) = max_final_vocab else {
        return min_count;
    };
    let mut counts: Vec<u64> = raw.entries().iter().map(|e| e.count).collect();
    counts.sort_unstable_by_key(|&c| Reverse(c));
    let calc_min_count = if max_final_vocab < counts.len() {
        counts[max_final_vocab] + 1
    } else {
        1
    };
    let effective = calc_min_count.max(min_count);
    info!(
        "max_final_vocab={max_final_vocab} and min_count={min_count} resulted in \
         calc_min_count={calc_min_count}, effective_min_count={effective}"
    );
    effective
}

/// The count above which a word starts getting downsampled.
///
/// `None` means downsampling is off.
pub fn threshold_count(sample: f64, retain_total: u64) -> Option<f64> {
    if sample <= 0.0 {
        None
    } else if sample < 1.0 {
        Some(sample * retain_total as f64)
    } else {
        Some((sample * (3.0 + 5f64.sqrt()) / 2.0).round())
    }
}

/// Probability of keeping one occurrence of a word seen `count` times.
pub fn keep_probability(count: u64, threshold: Option<f64>) -> f64 {
    match threshold {
        Some(t) if count > 0 && t > 0.0 => {
            let v = count as f64;
            (((v / t).sqrt() + 1.0) * (t / v)).min(1.0)
        }
        _ => 1.0,
    }
}

/// Scale a probability to the `u32` form the kernel compares random draws against.
pub fn sample_int(p: f64) -> u32 {
    (p * u32::MAX as f64).round() as u32
}

fn progress_bar(len: usize, show: bool) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if !show {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb
}

fn pct(part: u64, whole: u64) -> f64 {
    part as f64 * 100.0 / whole.max(1) as f64
}

impl VocabularyBuilder {
    /// Apply the vocabulary settings to `raw`, writing the result into `vocab`.
    ///
    /// In fresh mode `vocab` is replaced. In update mode words already in
    /// `vocab` get their counts increased and new words are appended; no
    /// existing index moves.
    pub fn prepare(
        &self,
        raw: &VocabularyStats,
        vocab: &mut Vocabulary,
        update: bool,
        trim_rule: Option<&TrimRule>,
    ) -> Result<PrepareReport> {
        if update && vocab.is_empty() {
            return Err(Error::NoPriorVocabulary);
        }
        let min_count = effective_min_count(raw, self.min_count, self.max_final_vocab);
        let mut report = PrepareReport {
            effective_min_count: min_count,
            ..PrepareReport::default()
        };

        // (index, raw count this pass) of every retained word
        let mut retained: Vec<(usize, u64)> = Vec::new();
        let pb = progress_bar(raw.len(), self.show_progress);

        if !update {
            info!("creating a fresh vocabulary");
            vocab.clear();
            for e in raw.entries() {
                if keep_vocab_item(&e.word, e.count, min_count, trim_rule) {
                    let i = vocab.push(VocabWord::new(e.word.clone(), e.count));
                    retained.push((i, e.count));
                    report.retain_total += e.count;
                } else {
                    report.drop_unique += 1;
                    report.drop_total += e.count;
                }
                pb.inc(1);
            }
            let original_unique = retained.len() as u64 + report.drop_unique;
            info!(
                "effective_min_count={min_count} retains {} unique words ({:.2}% of original {original_unique}, drops {})",
                retained.len(),
                pct(retained.len() as u64, original_unique),
                report.drop_unique
            );
            let original_total = report.retain_total + report.drop_total;
            info!(
                "effective_min_count={min_count} leaves {} word corpus ({:.2}% of original {original_total}, drops {})",
                report.retain_total,
                pct(report.retain_total, original_total),
                report.drop_total
            );
        } else {
            info!("updating model with new vocabulary");
            let mut new_words = 0u64;
            let mut pre_existing = 0u64;
            for e in raw.entries() {
                if keep_vocab_item(&e.word, e.count, min_count, trim_rule) {
                    let i = match vocab.get(&e.word) {
                        Some(i) => {
                            pre_existing += 1;
                            vocab.word_mut(i).count += e.count;
                            i
                        }
                        None => {
                            new_words += 1;
                            vocab.push(VocabWord::new(e.word.clone(), e.count))
                        }
                    };
                    retained.push((i, e.count));
                    report.retain_total += e.count;
                } else {
                    report.drop_unique += 1;
                    report.drop_total += e.count;
                }
                pb.inc(1);
            }
            let original_unique = new_words + pre_existing + report.drop_unique;
            info!(
                "added {new_words} new unique words ({:.2}% of original {original_unique}) and increased \
                 the count of {pre_existing} pre-existing words ({:.2}% of original {original_unique})",
                pct(new_words, original_unique),
                pct(pre_existing, original_unique)
            );
        }
        pb.finish_and_clear();
        report.retain_unique = retained.len() as u64;
        report.num_retained_words = retained.len();

        let threshold = threshold_count(self.sample, report.retain_total);
        let mut downsample_total = 0.0f64;
        for &(i, v) in &retained {
            let p = keep_probability(v, threshold);
            if p < 1.0 {
                report.downsample_unique += 1;
            }
            downsample_total += p * v as f64;
            vocab.word_mut(i).sample_int = sample_int(p);
        }
        report.downsample_total = downsample_total as u64;
        info!(
            "sample={} downsamples {} most-common words",
            self.sample, report.downsample_unique
        );
        info!(
            "downsampling leaves estimated {} word corpus ({:.1}% of prior {})",
            report.downsample_total,
            pct(report.downsample_total, report.retain_total),
            report.retain_total
        );

        if self.sorted_vocab && !update {
            debug!("sorting vocabulary by descending frequency");
            vocab.sort_by_descending_frequency();
        }
        if self.null_word && !vocab.contains(NULL_WORD) {
            vocab.push(VocabWord::new(NULL_WORD.to_string(), 1));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::stats::RawEntry;

    fn raw(pairs: &[(&str, u64)]) -> VocabularyStats {
        VocabularyStats::from_entries(
            pairs
                .iter()
                .map(|&(w, c)| RawEntry {
                    word: w.to_string(),
                    count: c,
                })
                .collect(),
        )
    }

    fn builder() -> VocabularyBuilder {
        VocabularyBuilder {
            min_count: 1,
            max_final_vocab: None,
            sample: 0.0,
            sorted_vocab: true,
            null_word: false,
            show_progress: false,
        }
    }

    fn words(vocab: &Vocabulary) -> Vec<&str> {
        vocab.iter().map(|vw| vw.word.as_str()).collect()
    }

    #[test]
    fn min_count_drops_rare_words() {
        let raw = raw(&[("a", 10), ("b", 1), ("c", 5)]);
        let mut vocab = Vocabulary::new();
        let b = VocabularyBuilder {
            min_count: 2,
            ..builder()
        };
        let report = b.prepare(&raw, &mut vocab, false, None).unwrap();
        assert_eq!(words(&vocab), ["a", "c"]);
        assert_eq!(report.drop_unique, 1);
        assert_eq!(report.drop_total, 1);
        assert_eq!(report.retain_total, 15);
        assert_eq!(report.num_retained_words, 2);
        assert!(vocab.total_count() <= raw.total_count());
    }

    #[test]
    fn max_final_vocab_raises_min_count() {
        let raw = raw(&[("a", 10), ("b", 7), ("c", 5), ("d", 5), ("e", 1)]);
        assert_eq!(effective_min_count(&raw, 1, Some(2)), 6);
        assert_eq!(effective_min_count(&raw, 8, Some(2)), 8);
        assert_eq!(effective_min_count(&raw, 2, Some(10)), 2);

        let mut vocab = Vocabulary::new();
        let b = VocabularyBuilder {
            max_final_vocab: Some(3),
            ..builder()
        };
        let report = b.prepare(&raw, &mut vocab, false, None).unwrap();
        // "c" and "d" tie at the cutoff, so both go
        assert_eq!(words(&vocab), ["a", "b"]);
        assert_eq!(report.effective_min_count, 6);
        assert!(vocab.iter().all(|vw| vw.count >= report.effective_min_count));
    }

    #[test]
    fn unsorted_keeps_scan_order() {
        let raw = raw(&[("x", 1), ("y", 3), ("z", 2)]);
        let mut vocab = Vocabulary::new();
        let b = VocabularyBuilder {
            sorted_vocab: false,
            null_word: true,
            ..builder()
        };
        b.prepare(&raw, &mut vocab, false, None).unwrap();
        assert_eq!(words(&vocab), ["x", "y", "z", NULL_WORD]);
    }

    #[test]
    fn update_appends_without_moving() {
        let mut vocab = Vocabulary::new();
        let b = builder();
        b.prepare(&raw(&[("a", 3), ("b", 2)]), &mut vocab, false, None)
            .unwrap();
        assert_eq!(words(&vocab), ["a", "b"]);

        let report = b
            .prepare(&raw(&[("c", 9), ("a", 1)]), &mut vocab, true, None)
            .unwrap();
        assert_eq!(words(&vocab), ["a", "b", "c"]);
        assert_eq!(vocab.word(0).count, 4);
        assert_eq!(vocab.get("c"), Some(2));
        assert_eq!(report.retain_total, 10);
    }

    #[test]
    fn update_needs_a_vocabulary() {
        let mut vocab = Vocabulary::new();
        let err = builder()
            .prepare(&raw(&[("a", 3)]), &mut vocab, true, None)
            .unwrap_err();
        assert!(matches!(err, Error::NoPriorVocabulary));
    }

    #[test]
    fn downsampling_thresholds() {
        assert_eq!(threshold_count(0.0, 100), None);
        assert_eq!(threshold_count(0.5, 100), Some(50.0));
        // 2 * 2.618... = 5.236, rounded
        assert_eq!(threshold_count(2.0, 100), Some(5.0));

        assert_eq!(keep_probability(3, Some(50.0)), 1.0);
        let p = keep_probability(200, Some(2.0));
        let expected = ((100f64).sqrt() + 1.0) * (2.0 / 200.0);
        assert!((p - expected).abs() < 1e-12);
        assert_eq!(sample_int(1.0), u32::MAX);
        assert_eq!(sample_int(0.0), 0);

        let raw = raw(&[("the", 1000), ("cat", 2)]);
        let mut vocab = Vocabulary::new();
        let b = VocabularyBuilder {
            sample: 1e-3,
            ..builder()
        };
        let report = b.prepare(&raw, &mut vocab, false, None).unwrap();
        assert_eq!(report.downsample_unique, 1);
        assert!(vocab.word(0).sample_int < vocab.word(1).sample_int);
        assert_eq!(vocab.word(1).sample_int, u32::MAX);
        assert!(report.downsample_total < report.retain_total);
    }
}
