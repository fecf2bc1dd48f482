//! Compressed sparse row matrix for fused feature vectors.
//!
//! Only nonzero entries are stored. Downstream, an absent entry means
//! "missing", not "zero".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl CsrMatrix {
    /// An empty matrix with `n_cols` columns.
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append a row from `(column, value)` pairs given in ascending column order.
    ///
    /// Zero values are dropped. Panics in debug builds if a column is out of
    /// range or the order is not strictly ascending.
    pub fn push_row(&mut self, entries: impl IntoIterator<Item = (usize, f32)>) {
        let mut last: Option<usize> = None;
        for (col, value) in entries {
            debug_assert!(col < self.n_cols, "column {} out of range {}", col, self.n_cols);
            debug_assert!(last.map_or(true, |l| col > l), "columns must be ascending");
            last = Some(col);
            if value != 0.0 {
                self.indices.push(col as u32);
                self.values.push(value);
            }
        }
        self.indptr.push(self.indices.len());
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[u32], &[f32]) {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        (&self.indices[start..end], &self.values[start..end])
    }

    /// Stored value at `(i, j)`, or `None` when absent.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        let (cols, vals) = self.row(i);
        cols.binary_search(&(j as u32)).ok().map(|k| vals[k])
    }

    /// New matrix made of the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut out = Self::new(self.n_cols);
        for &r in rows {
            let (cols, vals) = self.row(r);
            out.indices.extend_from_slice(cols);
            out.values.extend_from_slice(vals);
            out.indptr.push(out.indices.len());
        }
        out
    }

    /// Row `i` as a dense vector, absent entries as zero.
    pub fn dense_row(&self, i: usize) -> Vec<f32> {
        let mut dense = vec![0.0; self.n_cols];
        let (cols, vals) = self.row(i);
        for (&c, &v) in cols.iter().zip(vals) {
            dense[c as usize] = v;
        }
        dense
    }
}
