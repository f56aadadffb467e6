use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use stderrlog::Timestamp;

use embtrain::{real, LineSentence, TrainRequest, Word2Vec, Word2VecConfig};

#[derive(Parser)]
#[command(about = "Train word embeddings on a text corpus", long_about = None, version)]
struct Options {
    /// Use text data from FILE to train the model, one sentence per line
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting word vectors
    #[arg(long = "output", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Read model settings from a JSON FILE; flags below override it
    #[arg(long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Set size of word vectors
    #[arg(long = "size")]
    vector_size: Option<usize>,

    /// Set max skip length between words
    #[arg(long)]
    window: Option<usize>,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; useful
    /// range is (0, 1e-5)
    #[arg(long)]
    sample: Option<f64>,

    /// Use Hierarchical Softmax
    #[arg(long)]
    hs: bool,

    /// Number of negative examples; common values are 3 - 10 (0 = not used)
    #[arg(long)]
    negative: Option<usize>,

    /// Use N threads
    #[arg(long = "threads", value_name = "N")]
    workers: Option<usize>,

    /// Number of passes over the corpus
    #[arg(long = "iter")]
    epochs: Option<usize>,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N")]
    min_count: Option<u64>,

    /// Set the starting learning rate
    #[arg(long)]
    alpha: Option<real>,

    /// Use the continuous bag of words model
    #[arg(long, conflicts_with = "sg")]
    cbow: bool,

    /// Use the skip-gram model
    #[arg(long)]
    sg: bool,

    /// Reuse vocabulary scans and prepared models from DIR
    #[arg(long = "cache-dir", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Give each thread its own part of the training file instead of
    /// sharing batches through a queue
    #[arg(long = "corpus-file-mode")]
    corpus_file_mode: bool,

    /// Save the resulting vectors in binary mode
    #[arg(long)]
    binary: bool,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(clap::Args)]
struct LogArgs {
    /// Silence log messages
    #[arg(short, long)]
    quiet: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Prefix log lines with timestamps
    #[arg(long)]
    ts: bool,
}

impl LogArgs {
    fn setup_logging(&self) -> Result<()> {
        // Warnings and info by default.
        stderrlog::new()
            .quiet(self.quiet)
            .verbosity(2 + self.verbose as usize)
            .timestamp(if self.ts { Timestamp::Second } else { Timestamp::Off })
            .init()
            .context("error setting up logging")?;
        Ok(())
    }
}

impl Options {
    fn config(&self) -> Result<Word2VecConfig> {
        let mut config = match &self.config_file {
            Some(path) => Word2VecConfig::from_json_file(path)
                .with_context(|| format!("error reading config file {}", path.display()))?,
            None => Word2VecConfig::default(),
        };
        if let Some(n) = self.vector_size {
            config.vector_size = n;
        }
        if let Some(n) = self.window {
            config.window = n;
        }
        if let Some(x) = self.sample {
            config.sample = x;
        }
        if self.hs {
            config.hs = true;
        }
        if let Some(n) = self.negative {
            config.negative = n;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(n) = self.epochs {
            config.epochs = n;
        }
        if let Some(n) = self.min_count {
            config.min_count = n;
        }
        if let Some(x) = self.alpha {
            config.alpha = x;
        }
        if self.cbow {
            config.sg = false;
        }
        if self.sg {
            config.sg = true;
        }
        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir.clone();
        }
        config.validate().context("invalid settings")?;
        Ok(config)
    }
}

fn save_vocab(model: &Word2Vec, path: &Path) -> Result<()> {
    let mut fo = BufWriter::new(File::create(path).context("error creating vocabulary file")?);
    for vw in model.vocab().iter() {
        writeln!(fo, "{} {}", vw.word, vw.count)?;
    }
    fo.flush()?;
    Ok(())
}

fn run(options: &Options) -> Result<()> {
    options.log.setup_logging()?;
    let config = options.config()?;
    let max_sentence_length = config.max_sentence_length;
    let mut model = Word2Vec::new(config)?;

    let corpus = LineSentence::new(&options.train_file, max_sentence_length);
    let report = model
        .build_vocab(&corpus, None, false)
        .with_context(|| format!("error reading training file {}", options.train_file.display()))?;
    info!(
        "vocab size: {}, words in train file: {}, effective min_count: {}",
        model.vocab().len(),
        model.corpus_total_words(),
        report.effective_min_count
    );
    if let Some(path) = &options.save_vocab_file {
        save_vocab(&model, path)?;
    }

    let Some(output_file) = &options.output_file else {
        return Ok(());
    };
    let req = if options.corpus_file_mode {
        TrainRequest::file(&options.train_file)
    } else {
        TrainRequest::iterable(&corpus).total_examples(model.corpus_count())
    };
    let req = req.total_words(model.corpus_total_words());
    model.train(&req).context("training failed")?;

    model
        .save_vectors(output_file, options.binary)
        .context("error writing output file")?;
    Ok(())
}

fn main() {
    let options = Options::parse();
    if let Err(err) = run(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
