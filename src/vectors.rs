//! Trained word vectors, in the classic word2vec file formats.
//!
//! Both formats start with a `"<num_words> <size>\n"` header. Each word then
//! follows as `"<word> "` and its vector: space-separated decimals in the
//! text format, or `size` raw native-endian `f32`s in the binary format. Every
//! record ends with a newline.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::ops::Index;
use std::path::Path;

use crate::error::Result;
use crate::real;
use crate::vocab::Vocabulary;
use crate::weights::Weights;

pub struct Vectors {
    /// Embedding vector length (number of dimensions).
    size: usize,

    /// The vocabulary.
    vocab: Vec<String>,

    /// `embeddings[k * size..(k+1) * size]` is the vector embedding for word `k`.
    embeddings: Vec<real>,
}

pub fn norm(v: &[real]) -> real {
    v.iter().copied().map(|e| e * e).sum::<real>().sqrt()
}

pub fn dot(a: &[real], b: &[real]) -> real {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl Index<usize> for Vectors {
    type Output = [real];

    fn index(&self, i: usize) -> &[real] {
        &self.embeddings[i * self.size..][..self.size]
    }
}

impl Vectors {
    /// Snapshot the input vectors of a model.
    pub fn from_model(vocab: &Vocabulary, weights: &Weights) -> Self {
        Vectors {
            size: weights.vector_size(),
            vocab: vocab.iter().map(|vw| vw.word.clone()).collect(),
            embeddings: weights.syn0.to_vec(),
        }
    }

    pub fn save(&self, file_name: &Path, binary: bool) -> Result<()> {
        let mut fo = BufWriter::new(File::create(file_name)?);
        writeln!(fo, "{} {}", self.num_words(), self.size)?;
        for (a, word) in self.vocab.iter().enumerate() {
            write!(fo, "{word} ")?;
            let word_vec = &self[a];
            if binary {
                fo.write_all(bytemuck::cast_slice::<real, u8>(word_vec))?;
            } else {
                for f in word_vec {
                    write!(fo, "{f} ")?;
                }
            }
            writeln!(fo)?;
        }
        fo.flush()?;
        Ok(())
    }

    pub fn load(file_name: &Path, binary: bool) -> Result<Self> {
        let mut f = BufReader::new(File::open(file_name)?);
        let mut line = String::new();
        f.read_line(&mut line)?;
        let mut fields = line.split_whitespace();
        let mut header = || -> Result<usize> {
            let field = fields.next().ok_or_else(|| invalid("missing vector file header"))?;
            Ok(field
                .parse::<usize>()
                .map_err(|_| invalid("invalid vector file header"))?)
        };
        let num_words = header()?;
        let size = header()?;

        let mut vocab: Vec<String> = Vec::with_capacity(num_words);
        let mut m: Vec<real> = vec![0.0; num_words * size];
        for b in 0..num_words {
            let row = &mut m[b * size..][..size];
            if binary {
                let mut vocab_word = Vec::<u8>::new();
                let count = f.read_until(b' ', &mut vocab_word)?;
                if count == 0 {
                    return Err(invalid("vector file ends early").into());
                }
                if vocab_word.last() == Some(&b' ') {
                    vocab_word.pop();
                }
                vocab_word.retain(|c| *c != b'\n');
                vocab.push(String::from_utf8(vocab_word).map_err(|_| invalid("invalid word in vector file"))?);

                f.read_exact(bytemuck::cast_slice_mut::<real, u8>(row))?;
            } else {
                line.clear();
                if f.read_line(&mut line)? == 0 {
                    return Err(invalid("vector file ends early").into());
                }
                let mut fields = line.split(' ').filter(|s| !s.trim().is_empty());
                let word = fields.next().ok_or_else(|| invalid("missing word in vector file"))?;
                vocab.push(word.to_string());
                for x in row.iter_mut() {
                    let field = fields.next().ok_or_else(|| invalid("short vector in vector file"))?;
                    *x = field
                        .trim()
                        .parse()
                        .map_err(|_| invalid("invalid number in vector file"))?;
                }
            }
        }

        Ok(Vectors {
            size,
            vocab,
            embeddings: m,
        })
    }

    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    /// Returns the vector size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the index for a word as string. Exact match only, case-sensitive.
    pub fn lookup_word(&self, word: &str) -> Option<usize> {
        self.vocab.iter().position(|v| v == word)
    }

    /// Get the word for a word-index. Panics if `word` is out of range.
    pub fn word(&self, word: usize) -> &str {
        &self.vocab[word]
    }

    /// Cosine similarity of two words' vectors.
    pub fn similarity(&self, a: usize, b: usize) -> real {
        dot(&self[a], &self[b]) / (norm(&self[a]) * norm(&self[b]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::VocabWord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempdir::TempDir;

    fn sample() -> Vectors {
        let mut vocab = Vocabulary::new();
        for w in ["king", "queen", "\u{e9}t\u{e9}"] {
            vocab.push(VocabWord::new(w.to_string(), 1));
        }
        let weights = Weights::new(3, 5, false, true, &mut StdRng::seed_from_u64(11)).unwrap();
        Vectors::from_model(&vocab, &weights)
    }

    #[test]
    fn binary_file_is_exact() {
        let dir = TempDir::new("vectors").unwrap();
        let path = dir.path().join("vectors.bin");
        let v = sample();
        v.save(&path, true).unwrap();
        let loaded = Vectors::load(&path, true).unwrap();
        assert_eq!(loaded.num_words(), 3);
        assert_eq!(loaded.size(), 5);
        assert_eq!(loaded.word(2), "\u{e9}t\u{e9}");
        assert_eq!(loaded.embeddings, v.embeddings);
    }

    #[test]
    fn text_file_layout() {
        let dir = TempDir::new("vectors").unwrap();
        let path = dir.path().join("vectors.txt");
        let v = sample();
        v.save(&path, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("3 5"));
        assert!(lines.next().unwrap().starts_with("king "));

        let loaded = Vectors::load(&path, false).unwrap();
        assert_eq!(loaded.lookup_word("queen"), Some(1));
        for (a, b) in loaded.embeddings.iter().zip(&v.embeddings) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!((loaded.similarity(0, 0) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn truncated_file_is_an_error() {
        let dir = TempDir::new("vectors").unwrap();
        let path = dir.path().join("vectors.txt");
        std::fs::write(&path, "2 3\nfoo 1 2 3\n").unwrap();
        assert!(Vectors::load(&path, false).is_err());
        std::fs::write(&path, "two 3\n").unwrap();
        assert!(Vectors::load(&path, false).is_err());
    }
}
