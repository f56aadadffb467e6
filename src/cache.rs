//! On-disk cache of vocabulary scans and prepared models.
//!
//! A cache directory holds:
//!
//! - `vocab.json`: raw counts as `[word, count]` pairs, in scan order
//! - `vocab-stats.json`: the scan's `total_words` and `corpus_count`
//! - `model.bincode`: the final vocabulary, weights and the totals of the
//!   corpus they were last built from, tagged with a schema version
//! - `cum_table.bincode`: the negative-sampling table, if any
//!
//! The two JSON files are written only by a scan, so they always describe
//! the same corpus even after an online update rewrites the model.
//!
//! Writes are not atomic. A file that fails to parse is treated as missing:
//! we log a warning and the caller rebuilds it.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cum_table::CumTable;
use crate::error::{Error, Result};
use crate::real;
use crate::vocab::stats::RawEntry;
use crate::vocab::{PrepareReport, ScanSummary, Vocabulary, VocabularyStats};
use crate::weights::{Matrix, Weights};

const RAW_VOCAB_FILE: &str = "vocab.json";
const STATS_FILE: &str = "vocab-stats.json";
const MODEL_FILE: &str = "model.bincode";
const CUM_TABLE_FILE: &str = "cum_table.bincode";

/// Bump when the layout of [`PreparedModel`] changes.
pub const SCHEMA_VERSION: u32 = 2;

/// Everything needed to resume training without rebuilding the vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedModel {
    pub schema_version: u32,
    /// How the vocabulary was built.
    pub report: PrepareReport,
    /// Totals of the last corpus scanned into this vocabulary.
    pub summary: ScanSummary,
    pub vocab: Vocabulary,
    pub vector_size: usize,
    pub syn0: Vec<real>,
    pub syn1: Option<Vec<real>>,
    pub syn1neg: Option<Vec<real>>,
}

impl PreparedModel {
    pub fn capture(report: &PrepareReport, summary: &ScanSummary, vocab: &Vocabulary, weights: &Weights) -> Self {
        PreparedModel {
            schema_version: SCHEMA_VERSION,
            report: *report,
            summary: *summary,
            vocab: vocab.clone(),
            vector_size: weights.vector_size(),
            syn0: weights.syn0.to_vec(),
            syn1: weights.syn1.as_ref().map(Matrix::to_vec),
            syn1neg: weights.syn1neg.as_ref().map(Matrix::to_vec),
        }
    }

    pub fn into_parts(self) -> Result<(Vocabulary, Weights)> {
        let cols = self.vector_size;
        let matrix = |values: &[real]| Matrix::from_values(values.len() / cols.max(1), cols, values);
        let mut vocab = self.vocab;
        vocab.rebuild_index();
        let weights = Weights {
            syn0: matrix(&self.syn0)?,
            syn1: self.syn1.as_deref().map(matrix).transpose()?,
            syn1neg: self.syn1neg.as_deref().map(matrix).transpose()?,
        };
        if weights.syn0.rows() != vocab.len() {
            return Err(Error::Config(format!(
                "cached model has {} vectors for {} words",
                weights.syn0.rows(),
                vocab.len()
            )));
        }
        Ok((vocab, weights))
    }
}

pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Cache { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn create(&self, name: &str) -> Result<BufWriter<File>> {
        fs::create_dir_all(&self.dir)?;
        Ok(BufWriter::new(File::create(self.path(name))?))
    }

    /// Read a cache file, or `None` if it is missing or unreadable.
    fn load<T>(&self, name: &str, parse: impl FnOnce(BufReader<File>) -> Result<T>) -> Option<T> {
        let path = self.path(name);
        let f = match File::open(&path) {
            Ok(f) => BufReader::new(f),
            Err(_) => return None,
        };
        match parse(f) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("ignoring corrupt cache file {}: {err}", path.display());
                None
            }
        }
    }

    fn load_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.load(name, |f| Ok(serde_json::from_reader(f)?))
    }

    fn load_bincode<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.load(name, |f| Ok(bincode::deserialize_from(f)?))
    }

    fn save_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let mut f = self.create(name)?;
        serde_json::to_writer(&mut f, value)?;
        f.flush()?;
        Ok(())
    }

    fn save_bincode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let mut f = self.create(name)?;
        bincode::serialize_into(&mut f, value)?;
        f.flush()?;
        Ok(())
    }

    /// A previous scan's results, if both files are present and readable.
    pub fn load_raw_vocab(&self) -> Option<(ScanSummary, VocabularyStats)> {
        let pairs: Vec<(String, u64)> = self.load_json(RAW_VOCAB_FILE)?;
        let summary: ScanSummary = self.load_json(STATS_FILE)?;
        info!(
            "loaded {} raw word counts from cache {}",
            pairs.len(),
            self.dir.display()
        );
        let entries = pairs
            .into_iter()
            .map(|(word, count)| RawEntry { word, count })
            .collect();
        Some((summary, VocabularyStats::from_entries(entries)))
    }

    pub fn save_raw_vocab(&self, summary: &ScanSummary, stats: &VocabularyStats) -> Result<()> {
        let pairs: Vec<(&str, u64)> = stats
            .entries()
            .iter()
            .map(|e| (e.word.as_str(), e.count))
            .collect();
        self.save_json(RAW_VOCAB_FILE, &pairs)?;
        self.save_json(STATS_FILE, summary)?;
        Ok(())
    }

    /// A fully prepared model, if both of its files are present and readable
    /// and it was written with the current schema.
    pub fn load_prepared(&self) -> Option<(PreparedModel, Option<CumTable>)> {
        if ![MODEL_FILE, CUM_TABLE_FILE]
            .iter()
            .all(|name| self.path(name).exists())
        {
            return None;
        }
        let model: PreparedModel = self.load_bincode(MODEL_FILE)?;
        if model.schema_version != SCHEMA_VERSION {
            warn!(
                "cached model has schema version {}, expected {SCHEMA_VERSION}; rebuilding",
                model.schema_version
            );
            return None;
        }
        let cum_table: Option<CumTable> = self.load_bincode(CUM_TABLE_FILE)?;
        info!("loaded prepared model from cache {}", self.dir.display());
        Some((model, cum_table))
    }

    pub fn save_prepared(&self, model: &PreparedModel, cum_table: Option<&CumTable>) -> Result<()> {
        self.save_bincode(MODEL_FILE, model)?;
        self.save_bincode(CUM_TABLE_FILE, &cum_table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::VocabWord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempdir::TempDir;

    fn summary() -> ScanSummary {
        ScanSummary {
            total_words: 6,
            corpus_count: 2,
        }
    }

    #[test]
    fn raw_vocab_keeps_scan_order() {
        let dir = TempDir::new("cache").unwrap();
        let cache = Cache::new(dir.path().join("nested"));
        assert!(cache.load_raw_vocab().is_none());

        let mut stats = VocabularyStats::new();
        for w in ["zebra", "apple", "zebra", "mango", "apple", "zebra"] {
            stats.add_word(w);
        }
        cache.save_raw_vocab(&summary(), &stats).unwrap();

        let (loaded_summary, loaded) = cache.load_raw_vocab().unwrap();
        assert_eq!(loaded_summary, summary());
        assert_eq!(loaded.entries(), stats.entries());
        assert_eq!(loaded.count("zebra"), Some(3));
    }

    #[test]
    fn corrupt_files_are_ignored() {
        let dir = TempDir::new("cache").unwrap();
        let cache = Cache::new(dir.path());
        fs::write(dir.path().join(RAW_VOCAB_FILE), "[[\"a\", 1], [\"b\"").unwrap();
        fs::write(dir.path().join(STATS_FILE), "{}").unwrap();
        assert!(cache.load_raw_vocab().is_none());

        fs::write(dir.path().join(MODEL_FILE), [1u8, 2, 3]).unwrap();
        fs::write(dir.path().join(CUM_TABLE_FILE), b"").unwrap();
        assert!(cache.load_prepared().is_none());
    }

    #[test]
    fn prepared_model_needs_every_file() {
        let dir = TempDir::new("cache").unwrap();
        let cache = Cache::new(dir.path());

        let mut vocab = Vocabulary::new();
        vocab.push(VocabWord::new("a".to_string(), 3));
        vocab.push(VocabWord::new("b".to_string(), 2));
        let weights = Weights::new(2, 3, true, false, &mut StdRng::seed_from_u64(5)).unwrap();
        let model = PreparedModel::capture(&PrepareReport::default(), &summary(), &vocab, &weights);
        let table = CumTable::build(&vocab.counts(), 0.75, 1000);

        cache.save_bincode(MODEL_FILE, &model).unwrap();
        assert!(cache.load_prepared().is_none());

        cache.save_prepared(&model, Some(&table)).unwrap();
        assert!(!dir.path().join(STATS_FILE).exists());
        let (loaded, loaded_table) = cache.load_prepared().unwrap();
        assert_eq!(loaded_table, Some(table));
        assert_eq!(loaded.summary, summary());

        let (vocab2, weights2) = loaded.into_parts().unwrap();
        assert_eq!(vocab2.get("b"), Some(1));
        assert_eq!(weights2.syn0.to_vec(), weights.syn0.to_vec());
        assert_eq!(weights2.syn1.map(|m| m.rows()), Some(2));
        assert!(weights2.syn1neg.is_none());
    }

    #[test]
    fn stale_schema_is_rebuilt() {
        let dir = TempDir::new("cache").unwrap();
        let cache = Cache::new(dir.path());
        let weights = Weights::new(0, 3, false, true, &mut StdRng::seed_from_u64(5)).unwrap();
        let mut model = PreparedModel::capture(&PrepareReport::default(), &summary(), &Vocabulary::new(), &weights);
        model.schema_version = SCHEMA_VERSION + 1;
        cache.save_prepared(&model, None).unwrap();
        assert!(cache.load_prepared().is_none());
    }
}
