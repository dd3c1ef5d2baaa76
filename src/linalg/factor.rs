//! Sparse LU factorization of the simplex basis with incremental column
//! updates.
//!
//! The factorization represents `B = F * V` for the current basis column
//! selection: `F` collects the lower-triangular eliminations of the last
//! refactorization plus any Forest-Tomlin row operations appended since, and
//! `V` is upper triangular up to the maintained row/column pivot order.
//! FTRAN solves `B z = b`, BTRAN solves `B^T w = d`; both run in expected
//! `O(nnz)` via reachability-based sparse elimination.
//!
//! Two update methods are supported:
//! - **Eta**: a product-form eta factor in basis-slot space is appended; the
//!   triangular factors are left untouched.
//! - **Forest-Tomlin**: the spike column replaces the leaving pivot column of
//!   `V`, the pivot order is cyclically permuted to keep `V` triangular, and
//!   the resulting row spike is eliminated with row operations.
//!
//! The factorization owns its sparse storage exclusively; basis columns are
//! passed in by value and no alias into the factors is exposed across pivots.

use derive_more::{Display, Error};

use crate::linalg::ssvec::DeltaVector;
use crate::linalg::SparseCol;
use crate::settings::FactorUpdate;
use crate::{E, I};

const NO_POS: I = usize::MAX;
const DROP_TOL: E = 1e-14;
const GROWTH_LIMIT: E = 1e10;

/// Life-cycle state of the factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorState {
    /// Freshly refactorized, no updates applied.
    Fresh,
    /// `k` column updates applied since the last refactorization.
    Updated(usize),
    /// An update was refused or corrupted the factors; a refactorization is
    /// required before further solves.
    Stale,
}

#[derive(Debug, Display, Error, PartialEq)]
pub enum FactorError {
    #[display("singular basis matrix: no acceptable pivot for slot {slot}")]
    Singular { slot: usize },
}

/// A product-form eta factor in basis-slot space.
#[derive(Debug, Clone)]
struct Eta {
    slot: I,
    col: SparseCol,
    pivot: E,
}

/// Sparse LU of the basis matrix with Eta or Forest-Tomlin column updates.
pub struct Factorization {
    m: usize,
    method: FactorUpdate,
    eps_pivot: E,
    eps_update: E,
    max_update: usize,

    /// Elimination columns of the last refactorization, in pivot order.
    /// Entry `(r, l)` at position `p` means `x[r] -= l * x[urow[p]]`.
    lcols: Vec<Vec<(I, E)>>,

    /// Columns of `V` per basis slot, entries `(brow, val)`.
    ucols: Vec<Vec<(I, E)>>,
    /// Pivot position -> basis slot.
    uorder: Vec<I>,
    /// Basis slot -> pivot position.
    upos: Vec<I>,
    /// Pivot position -> basis row.
    urow: Vec<I>,
    /// Basis row -> pivot position.
    rowpos: Vec<I>,
    /// Pivot value per basis slot.
    udiag: Vec<E>,

    etas: Vec<Eta>,
    /// Forest-Tomlin row operations `(target_row, source_row, mu)`, in order.
    ftops: Vec<(I, I, E)>,

    state: FactorState,
    update_count: usize,
    stability: E,
    singular: bool,

    work: Vec<E>,
    touched: Vec<I>,
    is_touched: Vec<bool>,
    visited: Vec<bool>,
    topo: Vec<I>,
    stack: Vec<(I, usize)>,
}

impl Factorization {
    pub fn new(method: FactorUpdate, eps_pivot: E, eps_update: E, max_update: usize) -> Self {
        Self {
            m: 0,
            method,
            eps_pivot,
            eps_update,
            max_update,
            lcols: Vec::new(),
            ucols: Vec::new(),
            uorder: Vec::new(),
            upos: Vec::new(),
            urow: Vec::new(),
            rowpos: Vec::new(),
            udiag: Vec::new(),
            etas: Vec::new(),
            ftops: Vec::new(),
            state: FactorState::Stale,
            update_count: 0,
            stability: 0.,
            singular: false,
            work: Vec::new(),
            touched: Vec::new(),
            is_touched: Vec::new(),
            visited: Vec::new(),
            topo: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Preallocates all internal buffers for an `m x m` basis.
    pub fn resize(&mut self, m: usize) {
        self.m = m;
        self.lcols = vec![Vec::new(); m];
        self.ucols = vec![Vec::new(); m];
        self.uorder = vec![0; m];
        self.upos = vec![0; m];
        self.urow = vec![0; m];
        self.rowpos = vec![NO_POS; m];
        self.udiag = vec![0.; m];
        self.etas.clear();
        self.ftops.clear();
        self.work = vec![0.; m];
        self.is_touched = vec![false; m];
        self.visited = vec![false; m];
        self.touched = Vec::with_capacity(m);
        self.topo = Vec::with_capacity(m);
        self.stack = Vec::with_capacity(m);
        self.state = FactorState::Stale;
    }

    pub fn dim(&self) -> usize {
        self.m
    }

    pub fn state(&self) -> FactorState {
        self.state
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    /// Estimated numerical stability, derived from pivot magnitudes. Values
    /// near 1 are good; small values suggest an early refactorization.
    pub fn stability(&self) -> E {
        self.stability
    }

    pub fn is_singular(&self) -> bool {
        self.singular
    }

    pub fn set_method(&mut self, method: FactorUpdate) {
        self.method = method;
    }

    /// Factorizes the given basis columns from scratch.
    ///
    /// Columns are processed in slot order with partial pivoting; a slot
    /// without a pivot above `eps_pivot` renders the basis singular.
    pub fn factorize(&mut self, cols: &[SparseCol]) -> Result<(), FactorError> {
        let m = cols.len();
        if m != self.m {
            self.resize(m);
        }
        for p in 0..m {
            self.lcols[p].clear();
            self.ucols[p].clear();
            self.rowpos[p] = NO_POS;
        }
        self.etas.clear();
        self.ftops.clear();
        self.update_count = 0;
        self.singular = false;
        debug_assert!(self.work.iter().all(|&v| v == 0.));

        let mut min_piv = E::INFINITY;
        let mut max_piv = 0.;

        for k in 0..m {
            // Scatter the column and record its pattern.
            for (r, v) in cols[k].iter() {
                self.work[r] += v;
                if !self.is_touched[r] {
                    self.is_touched[r] = true;
                    self.touched.push(r);
                }
            }

            // Reach: topological order of the pivot positions this column
            // depends on, via DFS over the elimination pattern.
            self.topo.clear();
            for t in 0..self.touched.len() {
                let p0 = self.rowpos[self.touched[t]];
                if p0 == NO_POS || self.visited[p0] {
                    continue;
                }
                self.visited[p0] = true;
                self.stack.push((p0, 0));
                loop {
                    let (p, cur) = match self.stack.last() {
                        Some(&top) => top,
                        None => break,
                    };
                    if cur < self.lcols[p].len() {
                        self.stack.last_mut().unwrap().1 += 1;
                        let child_row = self.lcols[p][cur].0;
                        let cp = self.rowpos[child_row];
                        if cp != NO_POS && !self.visited[cp] {
                            self.visited[cp] = true;
                            self.stack.push((cp, 0));
                        }
                    } else {
                        self.stack.pop();
                        self.topo.push(p);
                    }
                }
            }

            // Numeric elimination in reverse postorder.
            for t in (0..self.topo.len()).rev() {
                let p = self.topo[t];
                self.visited[p] = false;
                let xv = self.work[self.urow[p]];
                if xv == 0. {
                    continue;
                }
                for e in 0..self.lcols[p].len() {
                    let (r, l) = self.lcols[p][e];
                    if !self.is_touched[r] {
                        self.is_touched[r] = true;
                        self.touched.push(r);
                    }
                    self.work[r] -= xv * l;
                }
            }

            // Partial pivoting among the unpivoted rows.
            let mut prow = NO_POS;
            let mut pval: E = 0.;
            for &r in &self.touched {
                if self.rowpos[r] == NO_POS && self.work[r].abs() > pval.abs() {
                    prow = r;
                    pval = self.work[r];
                }
            }
            if prow == NO_POS || pval.abs() < self.eps_pivot {
                self.singular = true;
                self.state = FactorState::Stale;
                // Clean scratch before bailing out.
                for &r in &self.touched {
                    self.work[r] = 0.;
                    self.is_touched[r] = false;
                }
                self.touched.clear();
                return Err(FactorError::Singular { slot: k });
            }

            // Split the worked column into U entries (pivoted rows), the
            // pivot, and L multipliers (remaining rows).
            for &r in &self.touched {
                let v = self.work[r];
                self.work[r] = 0.;
                self.is_touched[r] = false;
                if v.abs() <= DROP_TOL {
                    continue;
                }
                if r == prow {
                    continue;
                }
                if self.rowpos[r] != NO_POS {
                    self.ucols[k].push((r, v));
                } else {
                    self.lcols[k].push((r, v / pval));
                }
            }
            self.touched.clear();

            self.ucols[k].push((prow, pval));
            self.udiag[k] = pval;
            self.uorder[k] = k;
            self.upos[k] = k;
            self.urow[k] = prow;
            self.rowpos[prow] = k;

            min_piv = min_piv.min(pval.abs());
            max_piv = E::max(max_piv, pval.abs());
        }

        self.stability = if m == 0 { 1. } else { min_piv / max_piv };
        self.state = FactorState::Fresh;
        Ok(())
    }

    /// Solves `B z = b` in place: on entry `x` is indexed by basis row, on
    /// exit by basis slot.
    pub fn ftran(&mut self, x: &mut [E]) {
        debug_assert_eq!(x.len(), self.m);
        self.solve_lower(x);
        self.solve_upper(x);
        for e in 0..self.etas.len() {
            let eta = &self.etas[e];
            let t = x[eta.slot] / eta.pivot;
            x[eta.slot] = t;
            if t != 0. {
                for (i, v) in eta.col.iter() {
                    if i != eta.slot {
                        x[i] -= v * t;
                    }
                }
            }
        }
    }

    /// Solves `B^T w = d` in place: on entry `x` is indexed by basis slot, on
    /// exit by basis row.
    pub fn btran(&mut self, x: &mut [E]) {
        debug_assert_eq!(x.len(), self.m);
        for e in (0..self.etas.len()).rev() {
            let eta = &self.etas[e];
            let mut s = 0.;
            for (i, v) in eta.col.iter() {
                if i != eta.slot {
                    s += v * x[i];
                }
            }
            x[eta.slot] = (x[eta.slot] - s) / eta.pivot;
        }
        self.solve_upper_transposed(x);
        self.solve_lower_transposed(x);
    }

    fn solve_lower(&mut self, x: &mut [E]) {
        for p in 0..self.m {
            let xv = x[self.urow[p]];
            if xv != 0. {
                for &(r, l) in &self.lcols[p] {
                    x[r] -= xv * l;
                }
            }
        }
        for &(tgt, src, mu) in &self.ftops {
            x[tgt] -= mu * x[src];
        }
    }

    fn solve_upper(&mut self, x: &mut [E]) {
        for p in (0..self.m).rev() {
            let slot = self.uorder[p];
            let r = self.urow[p];
            let xv = x[r] / self.udiag[slot];
            self.work[slot] = xv;
            if xv != 0. {
                for &(row, val) in &self.ucols[slot] {
                    if row != r {
                        x[row] -= xv * val;
                    }
                }
            }
        }
        x.copy_from_slice(&self.work[..self.m]);
        // The scratch array must read as all zeros on entry everywhere else.
        self.work.fill(0.);
    }

    fn solve_upper_transposed(&mut self, x: &mut [E]) {
        for p in 0..self.m {
            let slot = self.uorder[p];
            let r = self.urow[p];
            let mut s = x[slot];
            for &(row, val) in &self.ucols[slot] {
                if row != r {
                    s -= val * self.work[row];
                }
            }
            self.work[r] = s / self.udiag[slot];
        }
        x.copy_from_slice(&self.work[..self.m]);
        self.work.fill(0.);
    }

    fn solve_lower_transposed(&mut self, x: &mut [E]) {
        for &(tgt, src, mu) in self.ftops.iter().rev() {
            x[src] -= mu * x[tgt];
        }
        for p in (0..self.m).rev() {
            let mut s = 0.;
            for &(r, l) in &self.lcols[p] {
                s += l * x[r];
            }
            x[self.urow[p]] -= s;
        }
    }

    /// Replaces the basis column at `slot` with `new_col` without a full
    /// refactorization.
    ///
    /// `alpha` must be the FTRAN result `B^{-1} new_col` with respect to the
    /// current factorization (the pivot engine has it at hand from the
    /// iteration). Returns the new state; on [`FactorState::Stale`] the
    /// caller must refactorize.
    pub fn update(&mut self, slot: I, new_col: &SparseCol, alpha: &DeltaVector) -> FactorState {
        if self.state == FactorState::Stale {
            return FactorState::Stale;
        }
        if self.update_count >= self.max_update {
            self.state = FactorState::Stale;
            return FactorState::Stale;
        }

        match self.method {
            FactorUpdate::Eta => self.update_eta(slot, alpha),
            FactorUpdate::ForestTomlin => self.update_forest_tomlin(slot, new_col),
        }
    }

    fn update_eta(&mut self, slot: I, alpha: &DeltaVector) -> FactorState {
        let pivot = alpha.value(slot);
        let mut max_abs: E = pivot.abs();
        for (_, v) in alpha.iter() {
            max_abs = E::max(max_abs, v.abs());
        }
        if pivot.abs() < self.eps_update || max_abs / pivot.abs() > GROWTH_LIMIT {
            self.state = FactorState::Stale;
            return FactorState::Stale;
        }

        self.etas.push(Eta {
            slot,
            col: alpha.to_sparse_col(),
            pivot,
        });
        self.finish_update(pivot.abs(), max_abs)
    }

    fn update_forest_tomlin(&mut self, slot: I, new_col: &SparseCol) -> FactorState {
        let m = self.m;

        // Spike: F^{-1} applied to the incoming column, in basis-row space.
        debug_assert!(self.work.iter().all(|&v| v == 0.));
        for (r, v) in new_col.iter() {
            self.work[r] += v;
        }
        {
            // Inline lower solve on `work` (cannot call solve_lower, which
            // borrows all of self).
            for p in 0..m {
                let xv = self.work[self.urow[p]];
                if xv != 0. {
                    for e in 0..self.lcols[p].len() {
                        let (r, l) = self.lcols[p][e];
                        self.work[r] -= xv * l;
                    }
                }
            }
            for e in 0..self.ftops.len() {
                let (tgt, src, mu) = self.ftops[e];
                self.work[tgt] -= mu * self.work[src];
            }
        }

        let t = self.upos[slot];
        let rt = self.urow[t];

        // The spike replaces the column of `slot`.
        self.ucols[slot].clear();
        let mut spike_max: E = 0.;
        for r in 0..m {
            let v = self.work[r];
            self.work[r] = 0.;
            if v.abs() > DROP_TOL {
                self.ucols[slot].push((r, v));
                spike_max = E::max(spike_max, v.abs());
            }
        }

        // Cyclic permutation: positions t+1.. shift left, the spike moves to
        // the last position together with the freed pivot row.
        for p in t..m - 1 {
            let s = self.uorder[p + 1];
            let r = self.urow[p + 1];
            self.uorder[p] = s;
            self.upos[s] = p;
            self.urow[p] = r;
            self.rowpos[r] = p;
        }
        self.uorder[m - 1] = slot;
        self.upos[slot] = m - 1;
        self.urow[m - 1] = rt;
        self.rowpos[rt] = m - 1;

        // Eliminate the row spike: entries of row `rt` below the diagonal.
        let mut max_mu: E = 0.;
        for p in t..m - 1 {
            let cslot = self.uorder[p];
            let w = match col_find_remove(&mut self.ucols[cslot], rt) {
                Some(w) => w,
                None => continue,
            };
            if w.abs() <= DROP_TOL {
                continue;
            }
            let src = self.urow[p];
            let mu = w / self.udiag[cslot];
            max_mu = E::max(max_mu, mu.abs());
            self.ftops.push((rt, src, mu));
            for p2 in p + 1..m {
                let s2 = self.uorder[p2];
                if let Some(v2) = col_value(&self.ucols[s2], src) {
                    col_add(&mut self.ucols[s2], rt, -mu * v2);
                }
            }
        }

        let new_pivot = col_value(&self.ucols[slot], rt).unwrap_or(0.);
        self.udiag[slot] = new_pivot;

        if new_pivot.abs() < self.eps_update || max_mu > GROWTH_LIMIT {
            self.state = FactorState::Stale;
            return FactorState::Stale;
        }
        self.finish_update(new_pivot.abs(), spike_max.max(1.) * (1. + max_mu))
    }

    fn finish_update(&mut self, pivot_abs: E, scale: E) -> FactorState {
        self.update_count += 1;
        self.stability = E::min(self.stability, pivot_abs / scale.max(1.));
        self.state = FactorState::Updated(self.update_count);
        self.state
    }
}

fn col_value(col: &[(I, E)], row: I) -> Option<E> {
    col.iter().find(|&&(r, _)| r == row).map(|&(_, v)| v)
}

fn col_find_remove(col: &mut Vec<(I, E)>, row: I) -> Option<E> {
    let p = col.iter().position(|&(r, _)| r == row)?;
    Some(col.swap_remove(p).1)
}

fn col_add(col: &mut Vec<(I, E)>, row: I, delta: E) {
    if delta == 0. {
        return;
    }
    for e in col.iter_mut() {
        if e.0 == row {
            e.1 += delta;
            return;
        }
    }
    col.push((row, delta));
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small deterministic generator for test matrices.
    struct XorShift(u64);

    impl XorShift {
        fn next_f64(&mut self) -> f64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            (x >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    /// A sparse, diagonally dominant (hence invertible) matrix as columns.
    fn test_matrix(m: usize, seed: u64) -> Vec<SparseCol> {
        let mut rng = XorShift(seed | 1);
        let mut cols = Vec::with_capacity(m);
        for j in 0..m {
            let mut col = SparseCol::new();
            col.idx.push(j);
            col.val.push(4.0 + rng.next_f64());
            for i in 0..m {
                if i != j && rng.next_f64() < 0.3 {
                    col.idx.push(i);
                    col.val.push(rng.next_f64() - 0.5);
                }
            }
            cols.push(col);
        }
        cols
    }

    fn mat_vec(cols: &[SparseCol], z: &[E]) -> Vec<E> {
        let m = cols.len();
        let mut out = vec![0.; m];
        for (slot, col) in cols.iter().enumerate() {
            for (r, v) in col.iter() {
                out[r] += v * z[slot];
            }
        }
        out
    }

    fn mat_t_vec(cols: &[SparseCol], w: &[E]) -> Vec<E> {
        cols.iter()
            .map(|col| col.iter().map(|(r, v)| v * w[r]).sum())
            .collect()
    }

    fn check_solves(f: &mut Factorization, cols: &[SparseCol], seed: u64, tol: E) {
        let m = cols.len();
        let mut rng = XorShift(seed | 1);
        let b: Vec<E> = (0..m).map(|_| rng.next_f64() - 0.5).collect();

        let mut z = b.clone();
        f.ftran(&mut z);
        let bz = mat_vec(cols, &z);
        for i in 0..m {
            assert!((bz[i] - b[i]).abs() < tol, "ftran residual {}", bz[i] - b[i]);
        }

        let mut w = b.clone();
        f.btran(&mut w);
        let btw = mat_t_vec(cols, &w);
        for i in 0..m {
            assert!(
                (btw[i] - b[i]).abs() < tol,
                "btran residual {}",
                btw[i] - b[i]
            );
        }
    }

    #[test]
    fn test_factorize_and_solve() {
        for seed in [1u64, 7, 42] {
            let cols = test_matrix(12, seed);
            let mut f = Factorization::new(FactorUpdate::ForestTomlin, 1e-12, 1e-10, 50);
            f.resize(12);
            f.factorize(&cols).unwrap();
            assert_eq!(f.state(), FactorState::Fresh);
            check_solves(&mut f, &cols, seed.wrapping_mul(3), 1e-9);
        }
    }

    #[test]
    fn test_singular_detection() {
        let mut cols = test_matrix(6, 3);
        cols[4] = cols[1].clone();
        let mut f = Factorization::new(FactorUpdate::Eta, 1e-12, 1e-10, 50);
        f.resize(6);
        let err = f.factorize(&cols).unwrap_err();
        assert!(matches!(err, FactorError::Singular { .. }));
        assert!(f.is_singular());
    }

    fn run_update_sequence(method: FactorUpdate) {
        let m = 10;
        let mut cols = test_matrix(m, 5);
        let mut f = Factorization::new(method, 1e-12, 1e-10, 50);
        f.resize(m);
        f.factorize(&cols).unwrap();

        for (k, slot) in [3usize, 7, 0, 9, 3, 5].iter().copied().enumerate() {
            // Fresh diagonally dominant column for the same slot keeps the
            // basis comfortably invertible across the update sequence.
            let new_col = test_matrix(m, 99 + k as u64)[slot].clone();

            // alpha = B^{-1} new_col with the current factorization.
            let mut alpha = DeltaVector::new(m);
            for (r, v) in new_col.iter() {
                alpha.add_value(r, v);
            }
            f.ftran(alpha.values_mut());
            alpha.setup_from_dense(1e-14);

            let state = f.update(slot, &new_col, &alpha);
            assert!(state != FactorState::Stale, "update {} went stale", k);
            assert_eq!(f.update_count(), k + 1);

            cols[slot] = new_col;
            check_solves(&mut f, &cols, 1000 + k as u64, 1e-7);
        }
    }

    #[test]
    fn test_eta_updates() {
        run_update_sequence(FactorUpdate::Eta);
    }

    #[test]
    fn test_forest_tomlin_updates() {
        run_update_sequence(FactorUpdate::ForestTomlin);
    }

    #[test]
    fn test_update_count_resets_on_refactor() {
        let m = 8;
        let cols = test_matrix(m, 11);
        let mut f = Factorization::new(FactorUpdate::ForestTomlin, 1e-12, 1e-10, 4);
        f.resize(m);
        f.factorize(&cols).unwrap();

        let mut current = cols.clone();
        for k in 0..4 {
            let new_col = test_matrix(m, 77 + k as u64)[k].clone();
            let mut alpha = DeltaVector::new(m);
            for (r, v) in new_col.iter() {
                alpha.add_value(r, v);
            }
            f.ftran(alpha.values_mut());
            alpha.setup_from_dense(1e-14);
            assert!(f.update(k, &new_col, &alpha) != FactorState::Stale);
            current[k] = new_col;
        }
        // The configured maximum is reached; the next update is refused.
        let extra = current[0].clone();
        let mut alpha = DeltaVector::new(m);
        for (r, v) in extra.iter() {
            alpha.add_value(r, v);
        }
        f.ftran(alpha.values_mut());
        alpha.setup_from_dense(1e-14);
        assert_eq!(f.update(1, &extra, &alpha), FactorState::Stale);

        f.factorize(&current).unwrap();
        assert_eq!(f.update_count(), 0);
        assert_eq!(f.state(), FactorState::Fresh);
        check_solves(&mut f, &current, 5, 1e-9);
    }
}
