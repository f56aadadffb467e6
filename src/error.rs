//! Error types.

use std::io;

/// Errors from vocabulary building, caching and training.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value or a combination of training arguments makes no sense.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An online vocabulary update was requested, but there is nothing to update.
    #[error(
        "cannot do an online vocabulary update of a model which has no prior vocabulary; \
         build the vocabulary with a corpus first"
    )]
    NoPriorVocabulary,

    /// The number of sentences seen while scanning differs from the size the caller promised.
    #[error("incorrect corpus size: expected {expected} sentences, scanned {observed}")]
    CorpusSizeMismatch { expected: u64, observed: u64 },

    /// Training or scoring was requested before `build_vocab`.
    #[error("you must first build the vocabulary before training the model")]
    VocabularyNotBuilt,

    /// Training was requested before the weight matrices were allocated.
    #[error("you must initialize the weights before training the model")]
    WeightsNotInitialized,

    /// The operation needs an objective the model was not configured with.
    #[error("{operation} is only implemented for {objective}; enable it in the configuration")]
    ObjectiveNotConfigured {
        operation: &'static str,
        objective: &'static str,
    },

    /// A worker or the job producer reported an error through the progress queue.
    #[error("training worker failed: {0}")]
    WorkerFailed(String),

    /// The progress queue disconnected before every worker reported completion.
    #[error("progress queue closed with {remaining} workers unaccounted for")]
    WorkerLost { remaining: usize },

    /// A worker thread panicked.
    #[error("a training worker thread panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
