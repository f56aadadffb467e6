//! Sentence sources.
//!
//! A [`Corpus`] must be restartable: every call to `sentences` starts again
//! from the beginning, since vocabulary scanning and every training epoch each
//! make their own pass.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A sentence is a sequence of tokens.
pub type Sentence = Vec<String>;

pub type Sentences<'a> = Box<dyn Iterator<Item = io::Result<Sentence>> + Send + 'a>;

pub trait Corpus: Sync {
    /// Iterate over the whole corpus from the start.
    fn sentences(&self) -> Sentences<'_>;
}

impl Corpus for Vec<Sentence> {
    fn sentences(&self) -> Sentences<'_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}

impl Corpus for [Sentence] {
    fn sentences(&self) -> Sentences<'_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}

/// Split a line into whitespace-separated tokens, `max_len` tokens per sentence.
fn split_line(line: &[u8], max_len: usize, out: &mut Vec<Sentence>) {
    let text = String::from_utf8_lossy(line);
    let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    for chunk in words.chunks(max_len.max(1)) {
        out.push(chunk.to_vec());
    }
}

/// Iterator over the sentences of a line-oriented reader.
pub struct LineReader<R> {
    reader: R,
    max_sentence_length: usize,
    pending: std::vec::IntoIter<Sentence>,
    buf: Vec<u8>,
    /// Byte offset of the next unread line.
    pos: u64,
    /// Stop before any line that starts at or after this offset.
    end: Option<u64>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R, max_sentence_length: usize) -> Self {
        LineReader {
            reader,
            max_sentence_length,
            pending: Vec::new().into_iter(),
            buf: Vec::new(),
            pos: 0,
            end: None,
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<Sentence>;

    fn next(&mut self) -> Option<io::Result<Sentence>> {
        loop {
            if let Some(sentence) = self.pending.next() {
                return Some(Ok(sentence));
            }
            if matches!(self.end, Some(end) if self.pos >= end) {
                return None;
            }
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => {
                    self.pos += n as u64;
                    let mut sentences = vec![];
                    split_line(&self.buf, self.max_sentence_length, &mut sentences);
                    self.pending = sentences.into_iter();
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// A text file with one sentence per line and whitespace-separated tokens.
///
/// Lines longer than `max_sentence_length` tokens are split into several
/// sentences. This is also the format the file-sharded trainer reads.
#[derive(Debug, Clone)]
pub struct LineSentence {
    path: PathBuf,
    max_sentence_length: usize,
}

impl LineSentence {
    pub fn new(path: impl Into<PathBuf>, max_sentence_length: usize) -> Self {
        LineSentence {
            path: path.into(),
            max_sentence_length,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start reading at byte `offset`.
    ///
    /// A nonzero offset usually lands in the middle of a line; that partial
    /// line is skipped, so reading starts at the next sentence boundary.
    pub fn open_at(
        path: &Path,
        offset: u64,
        max_sentence_length: usize,
    ) -> io::Result<LineReader<BufReader<File>>> {
        let mut f = BufReader::new(File::open(path)?);
        let mut pos = 0;
        if offset > 0 {
            f.seek(SeekFrom::Start(offset - 1))?;
            // If the byte before `offset` is a newline, we are already at a
            // line start and this consumes just that byte.
            let mut partial = vec![];
            pos = offset - 1 + f.read_until(b'\n', &mut partial)? as u64;
        }
        let mut reader = LineReader::new(f, max_sentence_length);
        reader.pos = pos;
        Ok(reader)
    }

    /// Read the lines that start in the byte range `start..end`.
    ///
    /// Cutting a file at any set of offsets and reading each piece this way
    /// visits every line exactly once.
    pub fn open_range(
        path: &Path,
        start: u64,
        end: u64,
        max_sentence_length: usize,
    ) -> io::Result<LineReader<BufReader<File>>> {
        let mut reader = LineSentence::open_at(path, start, max_sentence_length)?;
        reader.end = Some(end);
        Ok(reader)
    }
}

impl Corpus for LineSentence {
    fn sentences(&self) -> Sentences<'_> {
        match LineSentence::open_at(&self.path, 0, self.max_sentence_length) {
            Ok(reader) => Box::new(reader),
            Err(err) => Box::new(std::iter::once(Err(err))),
        }
    }
}

/// A file with one JSON array of tokens per line.
#[derive(Debug, Clone)]
pub struct JsonLineSentence {
    path: PathBuf,
}

impl JsonLineSentence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonLineSentence { path: path.into() }
    }
}

impl Corpus for JsonLineSentence {
    fn sentences(&self) -> Sentences<'_> {
        let f = match File::open(&self.path) {
            Ok(f) => BufReader::new(f),
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        Box::new(
            f.lines()
                .filter(|line| !matches!(line, Ok(line) if line.trim().is_empty()))
                .map(|line| {
                    let line = line?;
                    serde_json::from_str::<Sentence>(&line)
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
                }),
        )
    }
}

/// Number of tokens in a batch of sentences.
pub fn raw_word_count(sentences: &[Sentence]) -> u64 {
    sentences.iter().map(|s| s.len() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempdir::TempDir;

    fn words(s: &str) -> Sentence {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn line_sentence_splits_long_lines() {
        let dir = TempDir::new("corpus").unwrap();
        let path = dir.path().join("corpus.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "a b c d e").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "f g").unwrap();
        drop(f);

        let corpus = LineSentence::new(&path, 2);
        let got: Vec<Sentence> = corpus.sentences().map(Result::unwrap).collect();
        assert_eq!(
            got,
            vec![words("a b"), words("c d"), words("e"), words("f g")]
        );
        // restartable
        assert_eq!(corpus.sentences().count(), 4);
    }

    #[test]
    fn open_at_skips_partial_line() {
        let dir = TempDir::new("corpus").unwrap();
        let path = dir.path().join("corpus.txt");
        std::fs::write(&path, "one two\nthree four\nfive\n").unwrap();

        let from_mid: Vec<Sentence> = LineSentence::open_at(&path, 3, 100)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(from_mid, vec![words("three four"), words("five")]);

        // offset 8 is exactly the start of the second line
        let from_start: Vec<Sentence> = LineSentence::open_at(&path, 8, 100)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(from_start, vec![words("three four"), words("five")]);
    }

    #[test]
    fn ranges_cover_every_line_once() {
        let dir = TempDir::new("corpus").unwrap();
        let path = dir.path().join("corpus.txt");
        let text = "a b\nc\nd e f\n\ng h\ni\n";
        std::fs::write(&path, text).unwrap();
        let size = text.len() as u64;

        for pieces in 1..=8u64 {
            let mut seen = vec![];
            for i in 0..pieces {
                let reader =
                    LineSentence::open_range(&path, size * i / pieces, size * (i + 1) / pieces, 100)
                        .unwrap();
                seen.extend(reader.map(Result::unwrap));
            }
            assert_eq!(
                seen,
                vec![words("a b"), words("c"), words("d e f"), words("g h"), words("i")],
                "{pieces} pieces"
            );
        }
    }

    #[test]
    fn json_lines() {
        let dir = TempDir::new("corpus").unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "[\"x\", \"y\"]\n\n[\"z\"]\n").unwrap();
        let got: Vec<Sentence> = JsonLineSentence::new(&path)
            .sentences()
            .map(Result::unwrap)
            .collect();
        assert_eq!(got, vec![words("x y"), words("z")]);

        std::fs::write(&path, "not json\n").unwrap();
        assert!(JsonLineSentence::new(&path).sentences().next().unwrap().is_err());
    }

    #[test]
    fn missing_file_is_an_error_item() {
        let corpus = LineSentence::new("/nonexistent/corpus.txt", 10);
        let mut it = corpus.sentences();
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }
}
