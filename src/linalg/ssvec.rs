//! Semi-sparse vectors: a dense value array paired with an index list of
//! touched positions (the delta).
//!
//! The delta is the basis of all incremental updates in the pivot loop: the
//! FTRAN/BTRAN results, the pivot row, and the accumulated flip right-hand
//! side all travel as [`DeltaVector`]s. The index list is maintained as a
//! superset of the nonzero support; readers must tolerate structural zeros,
//! and [`DeltaVector::setup`] compacts the list by a nonzero scan.

use crate::{E, I};

const NOT_IN_DELTA: i64 = -1;

/// Dense vector with a touched-index delta.
#[derive(Debug, Clone)]
pub struct DeltaVector {
    values: Vec<E>,
    idx: Vec<I>,
    /// Position of each dense index inside `idx`, or -1.
    pos: Vec<i64>,
}

impl DeltaVector {
    pub fn new(dim: usize) -> Self {
        Self {
            values: vec![0.; dim],
            idx: Vec::with_capacity(dim.min(64)),
            pos: vec![NOT_IN_DELTA; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Number of touched positions.
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Reallocates to a new dimension, clearing all entries.
    pub fn resize(&mut self, dim: usize) {
        self.clear();
        self.values.resize(dim, 0.);
        self.pos.resize(dim, NOT_IN_DELTA);
    }

    /// Clears values and the delta index.
    pub fn clear(&mut self) {
        for &i in &self.idx {
            self.values[i] = 0.;
            self.pos[i] = NOT_IN_DELTA;
        }
        self.idx.clear();
    }

    #[inline]
    pub fn value(&self, i: I) -> E {
        self.values[i]
    }

    /// Sets position `i` to `x` and marks it touched.
    #[inline]
    pub fn set_value(&mut self, i: I, x: E) {
        if self.pos[i] == NOT_IN_DELTA {
            self.pos[i] = self.idx.len() as i64;
            self.idx.push(i);
        }
        self.values[i] = x;
    }

    /// Accumulates `x` into position `i`, marking it touched.
    #[inline]
    pub fn add_value(&mut self, i: I, x: E) {
        self.set_value(i, self.values[i] + x);
    }

    /// Removes position `i` from the delta index and zeroes its value.
    pub fn clear_idx(&mut self, i: I) {
        let p = self.pos[i];
        if p == NOT_IN_DELTA {
            return;
        }
        let p = p as usize;
        let last = self.idx.len() - 1;
        let moved = self.idx[last];
        self.idx.swap(p, last);
        self.pos[moved] = p as i64;
        self.idx.pop();
        self.pos[i] = NOT_IN_DELTA;
        self.values[i] = 0.;
    }

    /// Accumulates `alpha` times a sparse column into the vector.
    pub fn mult_add(&mut self, alpha: E, idx: &[I], val: &[E]) {
        for (&i, &v) in idx.iter().zip(val.iter()) {
            self.add_value(i, alpha * v);
        }
    }

    /// Compacts the delta index, dropping entries whose value is below `eps`
    /// in magnitude.
    pub fn setup(&mut self, eps: E) {
        let mut k = 0;
        for p in 0..self.idx.len() {
            let i = self.idx[p];
            if self.values[i].abs() > eps {
                self.idx[k] = i;
                self.pos[i] = k as i64;
                k += 1;
            } else {
                self.values[i] = 0.;
                self.pos[i] = NOT_IN_DELTA;
            }
        }
        self.idx.truncate(k);
    }

    /// Rebuilds the delta index from a full scan of the dense array.
    ///
    /// Used after a dense kernel (FTRAN/BTRAN) has written values without
    /// maintaining the index.
    pub fn setup_from_dense(&mut self, eps: E) {
        for &i in &self.idx {
            self.pos[i] = NOT_IN_DELTA;
        }
        self.idx.clear();
        for i in 0..self.values.len() {
            if self.values[i].abs() > eps {
                self.pos[i] = self.idx.len() as i64;
                self.idx.push(i);
            } else {
                self.values[i] = 0.;
            }
        }
    }

    /// The touched positions, unsorted.
    pub fn index_mem(&self) -> &[I] {
        &self.idx
    }

    /// The dense value array, parallel to positions `0..dim`.
    pub fn values(&self) -> &[E] {
        &self.values
    }

    /// Mutable access to the dense value array.
    ///
    /// Callers writing through this slice must follow up with
    /// [`DeltaVector::setup_from_dense`] to restore the index.
    pub fn values_mut(&mut self) -> &mut [E] {
        &mut self.values
    }

    /// Iterates over `(index, value)` pairs of the delta.
    pub fn iter(&self) -> impl Iterator<Item = (I, E)> + '_ {
        self.idx.iter().map(move |&i| (i, self.values[i]))
    }

    /// Copies the delta into an owned sparse column.
    pub fn to_sparse_col(&self) -> super::SparseCol {
        let mut idx = Vec::with_capacity(self.idx.len());
        let mut val = Vec::with_capacity(self.idx.len());
        for &i in &self.idx {
            idx.push(i);
            val.push(self.values[i]);
        }
        super::SparseCol { idx, val }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut v = DeltaVector::new(8);
        v.set_value(3, 1.5);
        v.set_value(5, -2.0);
        v.set_value(3, 2.5);
        assert_eq!(v.len(), 2);
        assert_eq!(v.value(3), 2.5);

        v.clear_idx(3);
        assert_eq!(v.len(), 1);
        assert_eq!(v.value(3), 0.);
        assert_eq!(v.index_mem(), &[5]);

        v.clear();
        assert_eq!(v.len(), 0);
        assert_eq!(v.value(5), 0.);
    }

    #[test]
    fn test_mult_add_and_setup() {
        let mut v = DeltaVector::new(6);
        v.set_value(0, 1.0);
        v.mult_add(2.0, &[0, 2, 4], &[-0.5, 1.0, 0.0]);
        assert_eq!(v.value(0), 0.0);
        assert_eq!(v.value(2), 2.0);
        // index is a superset of the support: 0 and 4 are structural zeros
        assert_eq!(v.len(), 3);

        v.setup(1e-12);
        assert_eq!(v.len(), 1);
        assert_eq!(v.index_mem(), &[2]);
    }

    #[test]
    fn test_setup_from_dense() {
        let mut v = DeltaVector::new(4);
        v.values_mut()[1] = 3.0;
        v.values_mut()[3] = 1e-14;
        v.setup_from_dense(1e-12);
        assert_eq!(v.index_mem(), &[1]);
        assert_eq!(v.value(3), 0.);
    }
}
