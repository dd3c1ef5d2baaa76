//! LP problem data.
//!
//! A [`LinearProgram`] holds the sparse constraint matrix, objective, column
//! bounds, and row sides of
//!
//! ```text
//! min/max  c^T x
//! s.t.     lhs <= A x <= rhs
//!          l <= x <= u
//! ```
//!
//! The matrix is kept both as a faer [`SparseColMat`] (used for products and
//! residual checks at the crate boundary) and as a paired column/row
//! compressed index consulted by the pivot engine, with every entry repeated
//! in the transposed index.

use derive_more::{Display, Error};
use faer::sparse::{SparseColMat, Triplet};
use faer::Col;

use crate::settings::ObjSense;
use crate::{is_unbounded, E, I};

#[derive(Debug, Display, Error, PartialEq)]
pub enum ModelError {
    #[display("crossed bounds for column {index}: lower {lower} > upper {upper}")]
    ColumnBoundCrossing { index: usize, lower: E, upper: E },
    #[display("crossed sides for row {index}: lhs {lhs} > rhs {rhs}")]
    RowSideCrossing { index: usize, lhs: E, rhs: E },
    #[display("matrix entry ({row}, {col}) outside of {nrows} x {ncols}")]
    EntryOutOfRange {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },
    #[display("dimension mismatch: {message}")]
    DimensionMismatch { message: String },
}

/// Sparse matrix stored column-wise and row-wise at once.
#[derive(Debug, Clone, Default)]
pub struct PairedMatrix {
    nrows: usize,
    ncols: usize,
    col_ptr: Vec<I>,
    col_idx: Vec<I>,
    col_val: Vec<E>,
    row_ptr: Vec<I>,
    row_idx: Vec<I>,
    row_val: Vec<E>,
}

impl PairedMatrix {
    pub fn from_entries(
        nrows: usize,
        ncols: usize,
        entries: &[(I, I, E)],
    ) -> Result<Self, ModelError> {
        for &(r, c, _) in entries {
            if r >= nrows || c >= ncols {
                return Err(ModelError::EntryOutOfRange {
                    row: r,
                    col: c,
                    nrows,
                    ncols,
                });
            }
        }

        let mut col_ptr = vec![0; ncols + 1];
        let mut row_ptr = vec![0; nrows + 1];
        for &(r, c, v) in entries {
            if v == 0. {
                continue;
            }
            col_ptr[c + 1] += 1;
            row_ptr[r + 1] += 1;
        }
        for j in 0..ncols {
            col_ptr[j + 1] += col_ptr[j];
        }
        for i in 0..nrows {
            row_ptr[i + 1] += row_ptr[i];
        }

        let nnz = col_ptr[ncols];
        let mut col_idx = vec![0; nnz];
        let mut col_val = vec![0.; nnz];
        let mut row_idx = vec![0; nnz];
        let mut row_val = vec![0.; nnz];
        let mut col_fill = col_ptr.clone();
        let mut row_fill = row_ptr.clone();
        for &(r, c, v) in entries {
            if v == 0. {
                continue;
            }
            let p = col_fill[c];
            col_idx[p] = r;
            col_val[p] = v;
            col_fill[c] += 1;
            let q = row_fill[r];
            row_idx[q] = c;
            row_val[q] = v;
            row_fill[r] += 1;
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptr,
            col_idx,
            col_val,
            row_ptr,
            row_idx,
            row_val,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.col_val.len()
    }

    /// Row indices and values of column `j`.
    pub fn col(&self, j: I) -> (&[I], &[E]) {
        let lo = self.col_ptr[j];
        let hi = self.col_ptr[j + 1];
        (&self.col_idx[lo..hi], &self.col_val[lo..hi])
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: I) -> (&[I], &[E]) {
        let lo = self.row_ptr[i];
        let hi = self.row_ptr[i + 1];
        (&self.row_idx[lo..hi], &self.row_val[lo..hi])
    }
}

/// A linear program over ranged rows and boxed columns.
#[derive(Debug)]
pub struct LinearProgram {
    a: SparseColMat<I, E>,
    index: PairedMatrix,
    c: Col<E>,
    lower: Col<E>,
    upper: Col<E>,
    lhs: Col<E>,
    rhs: Col<E>,
    sense: ObjSense,
}

impl LinearProgram {
    /// Creates a new linear program, validating bound ordering.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sense: ObjSense,
        c: Col<E>,
        nrows: usize,
        entries: &[(I, I, E)],
        lhs: Col<E>,
        rhs: Col<E>,
        lower: Col<E>,
        upper: Col<E>,
    ) -> Result<Self, ModelError> {
        let ncols = c.nrows();
        if lower.nrows() != ncols || upper.nrows() != ncols {
            return Err(ModelError::DimensionMismatch {
                message: format!(
                    "objective has {} entries, bounds have {}/{}",
                    ncols,
                    lower.nrows(),
                    upper.nrows()
                ),
            });
        }
        if lhs.nrows() != nrows || rhs.nrows() != nrows {
            return Err(ModelError::DimensionMismatch {
                message: format!(
                    "{} rows declared, sides have {}/{}",
                    nrows,
                    lhs.nrows(),
                    rhs.nrows()
                ),
            });
        }
        for j in 0..ncols {
            if lower[j] > upper[j] {
                return Err(ModelError::ColumnBoundCrossing {
                    index: j,
                    lower: lower[j],
                    upper: upper[j],
                });
            }
        }
        for i in 0..nrows {
            if lhs[i] > rhs[i] {
                return Err(ModelError::RowSideCrossing {
                    index: i,
                    lhs: lhs[i],
                    rhs: rhs[i],
                });
            }
        }

        // Repeated coordinates are accumulated before either store is built
        // so the paired index and the faer matrix agree entry for entry.
        let mut merged: std::collections::HashMap<(I, I), E> = std::collections::HashMap::new();
        for &(r, c, v) in entries {
            *merged.entry((r, c)).or_insert(0.) += v;
        }
        let mut entries: Vec<(I, I, E)> = merged
            .into_iter()
            .filter(|&(_, v)| v != 0.)
            .map(|((r, c), v)| (r, c, v))
            .collect();
        entries.sort_unstable_by_key(|&(r, c, _)| (c, r));
        let entries = &entries[..];

        let index = PairedMatrix::from_entries(nrows, ncols, entries)?;
        let triplets: Vec<Triplet<I, I, E>> = entries
            .iter()
            .map(|&(r, c, v)| Triplet::new(r, c, v))
            .collect();
        let a = SparseColMat::try_new_from_triplets(nrows, ncols, triplets.as_slice()).map_err(
            |_| ModelError::DimensionMismatch {
                message: "failed to assemble sparse matrix".to_string(),
            },
        )?;

        Ok(Self {
            a,
            index,
            c,
            lower,
            upper,
            lhs,
            rhs,
            sense,
        })
    }

    /// Returns the number of structural variables (columns of `A`).
    pub fn n_cols(&self) -> usize {
        self.c.nrows()
    }

    /// Returns the number of rows of `A`.
    pub fn n_rows(&self) -> usize {
        self.lhs.nrows()
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    pub fn sense(&self) -> ObjSense {
        self.sense
    }

    pub fn set_sense(&mut self, sense: ObjSense) {
        self.sense = sense;
    }

    pub fn obj(&self) -> &Col<E> {
        &self.c
    }

    pub fn obj_mut(&mut self) -> &mut Col<E> {
        &mut self.c
    }

    pub fn lower(&self) -> &Col<E> {
        &self.lower
    }

    pub fn upper(&self) -> &Col<E> {
        &self.upper
    }

    pub fn lhs(&self) -> &Col<E> {
        &self.lhs
    }

    pub fn rhs(&self) -> &Col<E> {
        &self.rhs
    }

    /// The faer view of the constraint matrix.
    pub fn matrix(&self) -> &SparseColMat<I, E> {
        &self.a
    }

    /// The paired column/row index consulted by the pivot engine.
    pub fn paired(&self) -> &PairedMatrix {
        &self.index
    }

    /// Row activities `A x` for a structural point.
    pub fn activity(&self, x: &Col<E>) -> Col<E> {
        let mut act = Col::zeros(self.n_rows());
        for j in 0..self.n_cols() {
            let xj = x[j];
            if xj == 0. {
                continue;
            }
            let (rows, vals) = self.index.col(j);
            for (k, &i) in rows.iter().enumerate() {
                act[i] += vals[k] * xj;
            }
        }
        act
    }

    /// Objective value `c^T x` in the problem's own sense.
    pub fn obj_value(&self, x: &Col<E>) -> E {
        let mut v = 0.;
        for j in 0..self.n_cols() {
            v += self.c[j] * x[j];
        }
        v
    }

    /// Whether column `j` has two finite bounds.
    pub fn is_boxed(&self, j: I) -> bool {
        !is_unbounded(self.lower[j]) && !is_unbounded(self.upper[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INFTY;

    fn simple_lp() -> LinearProgram {
        // min 2 x0 + x1
        // s.t. 1 <= x0 + x1 <= 4
        //      -x0 + x1 <= 2
        //      0 <= x <= 3
        LinearProgram::new(
            ObjSense::Minimize,
            Col::from_fn(2, |j| [2., 1.][j]),
            2,
            &[(0, 0, 1.), (0, 1, 1.), (1, 0, -1.), (1, 1, 1.)],
            Col::from_fn(2, |i| [1., -INFTY][i]),
            Col::from_fn(2, |i| [4., 2.][i]),
            Col::from_fn(2, |_| 0.),
            Col::from_fn(2, |_| 3.),
        )
        .unwrap()
    }

    #[test]
    fn test_dims_and_access() {
        let lp = simple_lp();
        assert_eq!(lp.dims(), (2, 2));
        assert_eq!(lp.paired().nnz(), 4);

        let (rows, vals) = lp.paired().col(0);
        assert_eq!(rows, &[0, 1]);
        assert_eq!(vals, &[1., -1.]);

        let (cols, vals) = lp.paired().row(1);
        assert_eq!(cols, &[0, 1]);
        assert_eq!(vals, &[-1., 1.]);
    }

    #[test]
    fn test_activity() {
        let lp = simple_lp();
        let x = Col::from_fn(2, |j| [1.5, 0.5][j]);
        let act = lp.activity(&x);
        assert!((act[0] - 2.0).abs() < 1e-12);
        assert!((act[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bound_crossing_is_rejected() {
        let err = LinearProgram::new(
            ObjSense::Minimize,
            Col::from_fn(1, |_| 1.),
            0,
            &[],
            Col::zeros(0),
            Col::zeros(0),
            Col::from_fn(1, |_| 2.),
            Col::from_fn(1, |_| 1.),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ColumnBoundCrossing { index: 0, .. }));
    }
}
