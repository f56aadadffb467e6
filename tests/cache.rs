use std::fs;
use std::path::Path;

use tempdir::TempDir;

use embtrain::{Error, Sentence, TrainRequest, Word2Vec, Word2VecConfig};

fn corpus() -> Vec<Sentence> {
    let text = [
        "alpha beta gamma alpha",
        "beta gamma delta alpha",
        "gamma alpha beta epsilon",
    ];
    (0..10)
        .flat_map(|_| text.iter())
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect()
}

fn config(dir: &Path) -> Word2VecConfig {
    Word2VecConfig {
        vector_size: 8,
        min_count: 1,
        workers: 2,
        epochs: 1,
        cache_dir: Some(dir.to_path_buf()),
        ..Word2VecConfig::default()
    }
}

fn syn0(model: &Word2Vec) -> Vec<f32> {
    model.weights().unwrap().syn0.to_vec()
}

#[test]
fn prepared_model_is_reused() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();

    let mut first = Word2Vec::new(config(dir.path())).unwrap();
    let report = first.build_vocab(&corpus, None, false).unwrap();
    for name in ["vocab.json", "vocab-stats.json", "model.bincode", "cum_table.bincode"] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }

    // The corpus is never read on a cache hit.
    let mut second = Word2Vec::new(config(dir.path())).unwrap();
    let empty: Vec<Sentence> = vec![];
    let cached = second.build_vocab(&empty, None, false).unwrap();
    assert_eq!(cached, report);
    assert_eq!(second.corpus_count(), 30);
    assert_eq!(second.vocab().words(), first.vocab().words());
    assert_eq!(syn0(&second), syn0(&first));
    assert_eq!(second.cum_table(), first.cum_table());

    second
        .train(&TrainRequest::iterable(&corpus).total_examples(30))
        .unwrap();
}

#[test]
fn corrupt_model_falls_back_to_raw_counts() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();
    let mut first = Word2Vec::new(config(dir.path())).unwrap();
    first.build_vocab(&corpus, None, false).unwrap();

    fs::write(dir.path().join("model.bincode"), b"not a model").unwrap();
    let mut second = Word2Vec::new(config(dir.path())).unwrap();
    let empty: Vec<Sentence> = vec![];
    second.build_vocab(&empty, None, false).unwrap();
    assert_eq!(second.vocab().words(), first.vocab().words());
    assert_eq!(second.corpus_total_words(), first.corpus_total_words());
}

#[test]
fn corrupt_counts_are_rescanned() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();
    Word2Vec::new(config(dir.path()))
        .unwrap()
        .build_vocab(&corpus, None, false)
        .unwrap();

    fs::remove_file(dir.path().join("model.bincode")).unwrap();
    fs::write(dir.path().join("vocab.json"), "[[\"alpha\", 3]").unwrap();
    let mut model = Word2Vec::new(config(dir.path())).unwrap();
    model.build_vocab(&corpus, None, false).unwrap();
    assert_eq!(model.vocab().len(), 5);
    assert_eq!(model.corpus_count(), 30);
}

#[test]
fn cached_counts_for_a_different_corpus_are_rescanned() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();
    Word2Vec::new(config(dir.path()))
        .unwrap()
        .build_vocab(&corpus, None, false)
        .unwrap();
    fs::remove_file(dir.path().join("model.bincode")).unwrap();

    let smaller = &corpus[..3];
    let mut model = Word2Vec::new(config(dir.path())).unwrap();
    model.build_vocab(&smaller.to_vec(), Some(3), false).unwrap();
    assert_eq!(model.corpus_count(), 3);

    // A rescan that still disagrees with the caller is an error.
    fs::remove_file(dir.path().join("model.bincode")).unwrap();
    let mut model = Word2Vec::new(config(dir.path())).unwrap();
    let err = model.build_vocab(&corpus, Some(4), false).unwrap_err();
    assert!(matches!(err, Error::CorpusSizeMismatch { expected: 4, observed: 30 }));
}

#[test]
fn changed_vector_size_rebuilds() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();
    Word2Vec::new(config(dir.path()))
        .unwrap()
        .build_vocab(&corpus, None, false)
        .unwrap();

    let mut model = Word2Vec::new(Word2VecConfig {
        vector_size: 12,
        ..config(dir.path())
    })
    .unwrap();
    model.build_vocab(&corpus, None, false).unwrap();
    assert_eq!(model.weights().unwrap().vector_size(), 12);
}

#[test]
fn online_update_keeps_scan_totals_consistent() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();
    let mut model = Word2Vec::new(config(dir.path())).unwrap();
    model.build_vocab(&corpus, None, false).unwrap();
    assert_eq!(model.corpus_count(), 30);
    assert_eq!(model.corpus_total_words(), 120);

    let more: Vec<Sentence> = (0..4)
        .map(|_| vec!["zeta".to_string(), "alpha".to_string()])
        .collect();
    model.build_vocab(&more, None, true).unwrap();
    assert_eq!(model.corpus_count(), 4);

    // The updated model restores with the totals of its last scan.
    let mut restored = Word2Vec::new(config(dir.path())).unwrap();
    restored.build_vocab(&corpus, None, false).unwrap();
    assert_eq!(restored.vocab().words(), model.vocab().words());
    assert_eq!(restored.corpus_count(), 4);
    assert_eq!(restored.corpus_total_words(), 8);

    // Without the model, the cached raw counts still pair with the totals of
    // the corpus they were counted from.
    fs::remove_file(dir.path().join("model.bincode")).unwrap();
    let mut rebuilt = Word2Vec::new(config(dir.path())).unwrap();
    rebuilt.build_vocab(&corpus, None, false).unwrap();
    assert_eq!(rebuilt.corpus_count(), 30);
    assert_eq!(rebuilt.corpus_total_words(), 120);
    assert_eq!(rebuilt.vocab().total_count(), 120);
    assert!(rebuilt.vocab().get("zeta").is_none());
}

#[test]
fn prepared_model_for_a_different_corpus_is_rebuilt() {
    let dir = TempDir::new("embtrain-cache").unwrap();
    let corpus = corpus();
    Word2Vec::new(config(dir.path()))
        .unwrap()
        .build_vocab(&corpus, None, false)
        .unwrap();

    let mut model = Word2Vec::new(config(dir.path())).unwrap();
    model.build_vocab(&corpus[..3].to_vec(), Some(3), false).unwrap();
    assert_eq!(model.corpus_count(), 3);
    assert_eq!(model.corpus_total_words(), 12);

    // The matching count takes the cached model as before.
    let mut again = Word2Vec::new(config(dir.path())).unwrap();
    let empty: Vec<Sentence> = vec![];
    again.build_vocab(&empty, Some(3), false).unwrap();
    assert_eq!(again.vocab().words(), model.vocab().words());
}
