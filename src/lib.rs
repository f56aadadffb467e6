//! Vocabulary building and multi-threaded training orchestration for
//! word2vec-style embeddings.
//!
//! The pipeline is: scan the corpus into raw counts ([`vocab::stats`]), turn
//! those into a final vocabulary ([`vocab::builder`]), attach Huffman codes
//! ([`vocab::huffman`]) and/or a negative-sampling table ([`cum_table`]),
//! allocate [`weights`], and then run epochs through the
//! [`trainer::TrainingScheduler`], which hands work to a [`kernel::GradientKernel`].
//! [`Word2Vec`] ties it all together.

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

mod error;
pub use error::{Error, Result};

pub mod cache;
pub mod config;
pub mod corpus;
pub mod cum_table;
pub mod jobs;
pub mod kernel;
pub mod model;
pub mod schedule;
pub mod telemetry;
pub mod trainer;
pub mod vectors;
pub mod vocab;
pub mod weights;

pub use config::Word2VecConfig;
pub use corpus::{Corpus, JsonLineSentence, LineSentence, Sentence};
pub use model::{TrainRequest, Word2Vec};
pub use telemetry::{EpochReport, TrainReport, TrainingCallback};
