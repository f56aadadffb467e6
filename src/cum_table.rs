//! The cumulative distribution table used to draw negative samples.

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// `table[i]` is the cumulative share of words `0..=i`, scaled to `domain`.
///
/// Word `i` is drawn with probability proportional to `count[i]^ns_exponent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumTable {
    table: Vec<u32>,
    domain: u32,
}

impl CumTable {
    /// Build the table in two passes: first the normalizer, then the running sum.
    ///
    /// Summing all the weights up front, rather than normalizing as we go,
    /// keeps rounding error from drifting the last entry away from `domain`.
    pub fn build(counts: &[u64], ns_exponent: f64, domain: u32) -> CumTable {
        let weight = |count: u64| (count as f64).powf(ns_exponent);
        let train_words_pow: f64 = counts.iter().map(|&c| weight(c)).sum();

        let n = counts.len();
        let table: Vec<u32> = if n == 0 {
            vec![]
        } else if train_words_pow > 0.0 && train_words_pow.is_finite() {
            let mut cumulative = 0.0;
            counts
                .iter()
                .map(|&c| {
                    cumulative += weight(c);
                    (cumulative / train_words_pow * domain as f64).round() as u32
                })
                .collect()
        } else {
            warn!("word counts give no usable sampling weights; drawing negative samples uniformly");
            (1..=n)
                .map(|i| (i as f64 / n as f64 * domain as f64).round() as u32)
                .collect()
        };
        if let Some(&last) = table.last() {
            assert_eq!(last, domain, "cumulative table must end at its domain");
        }
        debug!("built cumulative table over {n} words, ns_exponent={ns_exponent}");
        CumTable { table, domain }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn domain(&self) -> u32 {
        self.domain
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.table
    }

    /// Index of the first entry that is `>= target`.
    pub fn search(&self, target: u32) -> usize {
        self.table.partition_point(|&v| v < target)
    }

    /// Draw a word index. Panics if the table is empty.
    pub fn draw(&self, rng: &mut impl Rng) -> usize {
        let target = rng.gen_range(0..=self.domain);
        self.search(target)
    }
}
