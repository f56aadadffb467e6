//! The weight matrices shared by all training workers.
//!
//! Workers update these rows concurrently without locks, in the usual
//! asynchronous-SGD (Hogwild) fashion. Each element is a [`Real`], an `f32`
//! stored in an `AtomicU32` and accessed with `Ordering::Relaxed`, so a
//! read-modify-write from one thread can interleave with another thread's
//! and one of the two updates can be lost. That is accepted: it never tears
//! a value and it keeps the hot loop lock-free.

use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use rand::Rng;

use crate::error::{Error, Result};
use crate::real;

/// Alignment of every matrix allocation, in bytes.
const ALIGNMENT: usize = 128;

#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn new(value: real) -> Self {
        Real {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Not atomic as a whole; see the module docs.
    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

impl std::fmt::Debug for Real {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.get().fmt(f)
    }
}

/// A dense row-major matrix of [`Real`]s.
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: AlignedBox<[Real]>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        // AlignedBox refuses zero-length allocations.
        let data = AlignedBox::slice_from_default(ALIGNMENT, (rows * cols).max(1))
            .map_err(|err| Error::Config(format!("weight allocation failed: {err:?}")))?;
        Ok(Matrix { rows, cols, data })
    }

    pub fn from_values(rows: usize, cols: usize, values: &[real]) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(Error::Config(format!(
                "expected {} weights for a {rows}x{cols} matrix, got {}",
                rows * cols,
                values.len()
            )));
        }
        let m = Matrix::zeros(rows, cols)?;
        for (cell, &v) in m.data.iter().zip(values) {
            cell.set(v);
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[Real] {
        &self.data[i * self.cols..][..self.cols]
    }

    pub fn to_vec(&self) -> Vec<real> {
        self.data[..self.rows * self.cols]
            .iter()
            .map(Real::get)
            .collect()
    }

    /// Returns a matrix with `rows` rows. Existing rows keep their values; new
    /// rows are filled by `init`.
    fn grown(&self, rows: usize, mut init: impl FnMut(&[Real])) -> Result<Self> {
        let m = Matrix::zeros(rows, self.cols)?;
        for i in 0..rows {
            if i < self.rows {
                for (dst, src) in m.row(i).iter().zip(self.row(i)) {
                    dst.set(src.get());
                }
            } else {
                init(m.row(i));
            }
        }
        Ok(m)
    }
}

/// Input vectors plus whichever output layers the objective needs.
pub struct Weights {
    /// Input (word) vectors, one row per vocabulary index.
    pub syn0: Matrix,
    /// Hierarchical-softmax output layer, one row per internal tree node.
    pub syn1: Option<Matrix>,
    /// Negative-sampling output layer, one row per vocabulary index.
    pub syn1neg: Option<Matrix>,
}

fn init_row(row: &[Real], rng: &mut impl Rng) {
    let size = row.len() as real;
    for cell in row {
        cell.set((rng.gen::<real>() - 0.5) / size);
    }
}

impl Weights {
    /// Fresh weights: small random input vectors, zeroed output layers.
    pub fn new(
        vocab_size: usize,
        vector_size: usize,
        hs: bool,
        negative: bool,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let syn0 = Matrix::zeros(vocab_size, vector_size)?;
        for i in 0..vocab_size {
            init_row(syn0.row(i), &mut *rng);
        }
        Ok(Weights {
            syn0,
            syn1: if hs {
                Some(Matrix::zeros(vocab_size, vector_size)?)
            } else {
                None
            },
            syn1neg: if negative {
                Some(Matrix::zeros(vocab_size, vector_size)?)
            } else {
                None
            },
        })
    }

    /// Grow every matrix to `vocab_size` rows, keeping all trained rows.
    pub fn grow(&mut self, vocab_size: usize, rng: &mut impl Rng) -> Result<()> {
        if vocab_size < self.syn0.rows() {
            return Err(Error::Config(format!(
                "cannot shrink weights from {} to {vocab_size} rows",
                self.syn0.rows()
            )));
        }
        self.syn0 = self.syn0.grown(vocab_size, |row| init_row(row, &mut *rng))?;
        if let Some(syn1) = &self.syn1 {
            self.syn1 = Some(syn1.grown(vocab_size, |_| {})?);
        }
        if let Some(syn1neg) = &self.syn1neg {
            self.syn1neg = Some(syn1neg.grown(vocab_size, |_| {})?);
        }
        Ok(())
    }

    pub fn vector_size(&self) -> usize {
        self.syn0.cols()
    }

    pub fn vocab_size(&self) -> usize {
        self.syn0.rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn init_is_small_and_seeded() {
        let a = Weights::new(4, 8, true, true, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = Weights::new(4, 8, true, true, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.syn0.to_vec(), b.syn0.to_vec());
        assert!(a.syn0.to_vec().iter().all(|v| v.abs() <= 0.5 / 8.0));
        assert!(a.syn1.unwrap().to_vec().iter().all(|&v| v == 0.0));
        assert!(a.syn1neg.unwrap().to_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn grow_keeps_old_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut w = Weights::new(2, 3, false, true, &mut rng).unwrap();
        let before = w.syn0.to_vec();
        w.syn1neg.as_ref().unwrap().row(1)[2].set(0.5);
        w.grow(5, &mut rng).unwrap();
        assert_eq!(w.vocab_size(), 5);
        assert_eq!(&w.syn0.to_vec()[..6], &before[..]);
        assert_eq!(w.syn1neg.as_ref().unwrap().row(1)[2].get(), 0.5);
        assert!(w.syn1.is_none());
        assert!(w.grow(1, &mut rng).is_err());
    }

    #[test]
    fn empty_matrix() {
        let m = Matrix::zeros(0, 10).unwrap();
        assert!(m.to_vec().is_empty());
    }
}
