//! The revised simplex driver and its iteration state.
//!
//! One [`SimplexSolver`] owns an exclusive view of the LP for the duration
//! of a solve: the basis descriptor, the factorization, and the iteration
//! vectors. Iterations are atomic; callbacks and terminators are only
//! consulted at iteration boundaries.
//!
//! The engine always minimizes internally and pivots in COLUMN
//! representation; a MAXIMIZE sense and the solution mapping are handled at
//! the boundary. The entering (primal) and leaving (dual) algorithms share
//! the same state and can hand over to each other when unshifting reveals
//! residual infeasibilities.

pub mod desc;
pub mod pricer;
pub mod ratio;
pub mod start;

use derive_more::{Display, Error};
use faer::Col;

use crate::callback::{Callback, IterationState, Logger, NoOpCallback, Verbosity};
use crate::linalg::factor::{FactorState, Factorization};
use crate::linalg::ssvec::DeltaVector;
use crate::linalg::SparseCol;
use crate::lp::{LinearProgram, PairedMatrix};
use crate::scale::{ScaleFactors, Scaler, Scalers};
use crate::settings::{Algorithm, ObjSense, Representation, Settings, SimplifierSelection};
use crate::terminators::{MultipleTerminators, Progress, Terminator};
use crate::{is_unbounded, SolveStats, Status, E, I, INFTY};

use desc::{Descriptor, VarStatus};
use pricer::{Pricer, Pricers};
use ratio::{EnterChoice, LeaveChoice, RatioTester, RatioTesters};
use start::{Starter, Starters};

const MAX_ROUNDS: usize = 8;
const MAX_UNSTABLE_RETRIES: usize = 5;
const CYCLE_THRESHOLD: usize = 400;

#[derive(Debug, Display, Error, PartialEq)]
pub enum SolveError {
    #[display("invalid basis: {message}")]
    InvalidBasis { message: String },
}

/// Which side of the pivot drives an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Enter,
    Leave,
}

/// Driver life-cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Loaded,
    Factorized,
    Pricing,
    RatioTesting,
    Updating,
    Terminated,
}

/// Final solution data in the problem's own scale and sense.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: Status,
    pub objective: E,
    /// Structural variable values.
    pub primal: Col<E>,
    /// Row activities `A x`.
    pub slacks: Col<E>,
    /// Dual multipliers per row.
    pub duals: Col<E>,
    /// Reduced costs per structural variable.
    pub reduced_costs: Col<E>,
    /// Farkas multipliers certifying infeasibility, if status is Infeasible.
    pub farkas: Option<Col<E>>,
    /// Primal ray certifying unboundedness, if status is Unbounded.
    pub ray: Option<Col<E>>,
}

/// Outcome of one inner simplex loop.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LoopResult {
    LocalOptimal,
    Unbounded { enter_id: I, dir: E },
    Infeasible { leave_slot: I, sign: E },
    Aborted(Status),
}

// ---------------------------------------------------------------------------
// Core iteration state shared with the strategy objects.
// ---------------------------------------------------------------------------

/// The engine view of the problem plus all iteration vectors.
///
/// Strategies (pricers, ratio testers, starters) receive this as an explicit
/// context argument instead of holding a back-pointer into the solver.
pub(crate) struct Core {
    pub(crate) n: usize,
    pub(crate) m: usize,
    /// Scaled matrix, column- and row-wise.
    pub(crate) mat: PairedMatrix,
    /// Engine costs over structural then logical variables (minimization).
    pub(crate) cost: Vec<E>,
    /// True (scaled) bounds.
    pub(crate) lb: Vec<E>,
    pub(crate) ub: Vec<E>,
    /// Working bounds, widened by shifts.
    pub(crate) wlb: Vec<E>,
    pub(crate) wub: Vec<E>,

    pub(crate) desc: Descriptor,
    /// Basis slot -> variable id.
    pub(crate) basis: Vec<I>,
    /// Variable id -> basis slot, or -1.
    pub(crate) pos: Vec<i64>,
    pub(crate) factor: Factorization,

    /// Values of the basic variables per slot.
    pub(crate) fvec: Vec<E>,
    /// Dual multipliers per row.
    pub(crate) y: Vec<E>,
    /// Pricing values `a_j^T y` per structural column.
    pub(crate) pval: Vec<E>,
    /// Working dual bounds on `pval` (structural columns).
    pub(crate) pdlow: Vec<E>,
    pub(crate) pdup: Vec<E>,
    /// Working dual bounds on `y` (logical variables).
    pub(crate) cdlow: Vec<E>,
    pub(crate) cdup: Vec<E>,

    /// `-sum_{nonbasic} xval_j * col_j`, the FTRAN right-hand side of fvec.
    pub(crate) prim_rhs: Vec<E>,
    /// Flip accumulation pending an FTRAN correction of fvec.
    pub(crate) upd_prim_rhs: DeltaVector,
    /// Free or one-sided variables temporarily pinned for dual feasibility:
    /// `(id, original status, original wlb, original wub)`.
    pub(crate) temp_fixed: Vec<(I, VarStatus, E, E)>,

    pub(crate) total_shift: E,
    pub(crate) eps: E,
    pub(crate) feastol: E,
    pub(crate) opttol: E,
    pub(crate) representation: Representation,

    /// Number of leaving iterations performed, for the long-step gate.
    pub(crate) leave_count: usize,
    /// Bound flips performed by the last ratio-test call.
    pub(crate) boundflips: usize,
    /// Flip attempts skipped due to an unexpected status.
    pub(crate) flip_warns: usize,

    work_d: Vec<E>,
}

/// Per-iteration sparse vectors, kept apart from [`Core`] so strategies can
/// borrow both simultaneously. Each vector owns its delta; nothing aliases.
pub(crate) struct IterWork {
    /// FTRAN of the entering column, in slot space.
    pub(crate) alpha: DeltaVector,
    /// BTRAN of the leaving unit vector, in row space.
    pub(crate) rho: DeltaVector,
    /// Pivot-row update of the structural pricing values (`a_j^T rho`).
    pub(crate) zp: DeltaVector,
    /// Pivot-row update of the dual multipliers (a copy of `rho`).
    pub(crate) zc: DeltaVector,
}

impl IterWork {
    fn new(m: usize, n: usize) -> Self {
        Self {
            alpha: DeltaVector::new(m),
            rho: DeltaVector::new(m),
            zp: DeltaVector::new(n),
            zc: DeltaVector::new(m),
        }
    }

    fn resize(&mut self, m: usize, n: usize) {
        self.alpha.resize(m);
        self.rho.resize(m);
        self.zp.resize(n);
        self.zc.resize(m);
    }
}

/// Accumulates `mult` times the column of variable `id` into a dense vector.
pub(crate) fn add_var_col(target: &mut [E], mat: &PairedMatrix, n: usize, id: I, mult: E) {
    if id < n {
        let (rows, vals) = mat.col(id);
        for (k, &i) in rows.iter().enumerate() {
            target[i] += mult * vals[k];
        }
    } else {
        target[id - n] -= mult;
    }
}

/// Dot product of the column of variable `id` with a dense row-space vector.
pub(crate) fn var_col_dot(mat: &PairedMatrix, n: usize, id: I, dense: &[E]) -> E {
    if id < n {
        let (rows, vals) = mat.col(id);
        let mut s = 0.;
        for (k, &i) in rows.iter().enumerate() {
            s += vals[k] * dense[i];
        }
        s
    } else {
        -dense[id - n]
    }
}

impl Core {
    fn new() -> Self {
        Self {
            n: 0,
            m: 0,
            mat: PairedMatrix::default(),
            cost: Vec::new(),
            lb: Vec::new(),
            ub: Vec::new(),
            wlb: Vec::new(),
            wub: Vec::new(),
            desc: Descriptor::new(0, 0),
            basis: Vec::new(),
            pos: Vec::new(),
            factor: Factorization::new(
                crate::settings::FactorUpdate::ForestTomlin,
                1e-20,
                1e-16,
                200,
            ),
            fvec: Vec::new(),
            y: Vec::new(),
            pval: Vec::new(),
            pdlow: Vec::new(),
            pdup: Vec::new(),
            cdlow: Vec::new(),
            cdup: Vec::new(),
            prim_rhs: Vec::new(),
            upd_prim_rhs: DeltaVector::new(0),
            temp_fixed: Vec::new(),
            total_shift: 0.,
            eps: 1e-16,
            feastol: 1e-6,
            opttol: 1e-6,
            representation: Representation::Column,
            leave_count: 0,
            boundflips: 0,
            flip_warns: 0,
            work_d: Vec::new(),
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.n + self.m
    }

    #[inline]
    pub(crate) fn is_basic(&self, id: I) -> bool {
        self.pos[id] >= 0
    }

    /// Current value of a variable: working bound for nonbasic, fvec entry
    /// for basic.
    pub(crate) fn xval(&self, id: I) -> E {
        if self.pos[id] >= 0 {
            return self.fvec[self.pos[id] as usize];
        }
        match self.desc.status(id) {
            VarStatus::PLower | VarStatus::PFixed => self.wlb[id],
            VarStatus::PUpper => self.wub[id],
            VarStatus::PFree => 0.,
            _ => self.wlb[id],
        }
    }

    /// Reduced cost of a nonbasic variable.
    #[inline]
    pub(crate) fn reduced_cost(&self, id: I) -> E {
        if id < self.n {
            self.cost[id] - self.pval[id]
        } else {
            self.y[id - self.n]
        }
    }

    /// Signed infeasibility of the basic variable in `slot`: positive above
    /// its upper working bound, negative below its lower one, zero inside.
    pub(crate) fn ftest(&self, slot: I) -> E {
        let id = self.basis[slot];
        let v = self.fvec[slot];
        if v > self.wub[id] {
            v - self.wub[id]
        } else if v < self.wlb[id] {
            v - self.wlb[id]
        } else {
            0.
        }
    }

    pub(crate) fn var_col(&self, id: I) -> SparseCol {
        if id < self.n {
            let (rows, vals) = self.mat.col(id);
            SparseCol::from_slices(rows, vals)
        } else {
            SparseCol::unit(id - self.n, -1.)
        }
    }

    fn basis_cols(&self) -> Vec<SparseCol> {
        self.basis.iter().map(|&id| self.var_col(id)).collect()
    }

    pub(crate) fn refactorize(&mut self) -> Result<(), crate::linalg::factor::FactorError> {
        let cols = self.basis_cols();
        self.factor.factorize(&cols)?;
        self.compute_fvec();
        self.compute_duals();
        Ok(())
    }

    /// Rebuilds `prim_rhs` and solves for the basic values.
    pub(crate) fn compute_fvec(&mut self) {
        self.prim_rhs.iter_mut().for_each(|v| *v = 0.);
        for id in 0..self.total() {
            if self.pos[id] >= 0 {
                continue;
            }
            let xv = self.xval(id);
            if xv != 0. {
                add_var_col(&mut self.prim_rhs, &self.mat, self.n, id, -xv);
            }
        }
        self.fvec.copy_from_slice(&self.prim_rhs);
        self.factor.ftran(&mut self.fvec);
    }

    /// Recomputes the dual multipliers and pricing values from scratch.
    pub(crate) fn compute_duals(&mut self) {
        for slot in 0..self.m {
            self.work_d[slot] = self.cost[self.basis[slot]];
        }
        self.y.copy_from_slice(&self.work_d);
        self.factor.btran(&mut self.y);
        for j in 0..self.n {
            self.pval[j] = var_col_dot(&self.mat, self.n, j, &self.y);
        }
    }

    /// Installs the working dual bounds matching the current statuses.
    pub(crate) fn setup_dual_bounds(&mut self) {
        for j in 0..self.n {
            let (low, up) = match self.desc.status(j) {
                VarStatus::PLower => (-INFTY, self.cost[j]),
                VarStatus::PUpper => (self.cost[j], INFTY),
                VarStatus::PFree => (self.cost[j], self.cost[j]),
                _ => (-INFTY, INFTY),
            };
            self.pdlow[j] = low;
            self.pdup[j] = up;
        }
        for i in 0..self.m {
            let (low, up) = match self.desc.status(self.n + i) {
                VarStatus::PLower => (0., INFTY),
                VarStatus::PUpper => (-INFTY, 0.),
                VarStatus::PFree => (0., 0.),
                _ => (-INFTY, INFTY),
            };
            self.cdlow[i] = low;
            self.cdup[i] = up;
        }
    }

    /// Working dual bounds of a single nonbasic variable, refreshed after a
    /// flip or a status change.
    pub(crate) fn reset_dual_bounds(&mut self, id: I) {
        if id < self.n {
            let (low, up) = match self.desc.status(id) {
                VarStatus::PLower => (-INFTY, self.cost[id]),
                VarStatus::PUpper => (self.cost[id], INFTY),
                VarStatus::PFree => (self.cost[id], self.cost[id]),
                _ => (-INFTY, INFTY),
            };
            self.pdlow[id] = low;
            self.pdup[id] = up;
        } else {
            let i = id - self.n;
            let (low, up) = match self.desc.status(id) {
                VarStatus::PLower => (0., INFTY),
                VarStatus::PUpper => (-INFTY, 0.),
                VarStatus::PFree => (0., 0.),
                _ => (-INFTY, INFTY),
            };
            self.cdlow[i] = low;
            self.cdup[i] = up;
        }
    }

    /// Flips a nonbasic variable to its opposite bound, accumulating the
    /// right-hand-side correction. Returns `false` (and counts a warning)
    /// for a status that cannot flip.
    pub(crate) fn flip(&mut self, id: I) -> bool {
        let range = match self.desc.status(id) {
            VarStatus::PUpper => {
                self.desc.set_status(id, VarStatus::PLower);
                self.wlb[id] - self.wub[id]
            }
            VarStatus::PLower => {
                self.desc.set_status(id, VarStatus::PUpper);
                self.wub[id] - self.wlb[id]
            }
            _ => {
                self.flip_warns += 1;
                return false;
            }
        };
        assert!(
            range.abs() < crate::INFINITY_THRESHOLD,
            "attempted to flip a variable without finite range"
        );
        // upd_prim_rhs tracks the pending FTRAN correction; prim_rhs itself
        // is kept current.
        if id < self.n {
            let (rows, vals) = self.mat.col(id);
            self.upd_prim_rhs.mult_add(range, rows, vals);
            for (k, &i) in rows.iter().enumerate() {
                self.prim_rhs[i] -= range * vals[k];
            }
        } else {
            let i = id - self.n;
            self.upd_prim_rhs.add_value(i, -range);
            self.prim_rhs[i] += range;
        }
        self.reset_dual_bounds(id);
        true
    }

    pub(crate) fn shift_wlb(&mut self, id: I, v: E) {
        if !is_unbounded(self.wlb[id]) {
            self.total_shift += (self.wlb[id] - v).abs();
        }
        self.wlb[id] = v;
    }

    pub(crate) fn shift_wub(&mut self, id: I, v: E) {
        if !is_unbounded(self.wub[id]) {
            self.total_shift += (self.wub[id] - v).abs();
        }
        self.wub[id] = v;
    }

    /// Shifts a working dual bound (structural side) to `v`.
    pub(crate) fn shift_pdup(&mut self, j: I, v: E) {
        if !is_unbounded(self.pdup[j]) {
            self.total_shift += (self.pdup[j] - v).abs();
        }
        self.pdup[j] = v;
    }

    pub(crate) fn shift_pdlow(&mut self, j: I, v: E) {
        if !is_unbounded(self.pdlow[j]) {
            self.total_shift += (self.pdlow[j] - v).abs();
        }
        self.pdlow[j] = v;
    }

    pub(crate) fn shift_cdup(&mut self, i: I, v: E) {
        if !is_unbounded(self.cdup[i]) {
            self.total_shift += (self.cdup[i] - v).abs();
        }
        self.cdup[i] = v;
    }

    pub(crate) fn shift_cdlow(&mut self, i: I, v: E) {
        if !is_unbounded(self.cdlow[i]) {
            self.total_shift += (self.cdlow[i] - v).abs();
        }
        self.cdlow[i] = v;
    }

    /// Engine objective value (minimization orientation).
    pub(crate) fn obj_value(&self) -> E {
        let mut v = 0.;
        for id in 0..self.total() {
            let c = self.cost[id];
            if c != 0. {
                v += c * self.xval(id);
            }
        }
        v
    }

    /// Infinity norm of `B fvec - prim_rhs`.
    pub(crate) fn basis_residual(&mut self) -> E {
        self.work_d.iter_mut().for_each(|v| *v = 0.);
        for slot in 0..self.m {
            let xv = self.fvec[slot];
            if xv != 0. {
                let id = self.basis[slot];
                if id < self.n {
                    let (rows, vals) = self.mat.col(id);
                    for (k, &i) in rows.iter().enumerate() {
                        self.work_d[i] += xv * vals[k];
                    }
                } else {
                    self.work_d[id - self.n] -= xv;
                }
            }
        }
        let mut r: E = 0.;
        for i in 0..self.m {
            r = r.max((self.work_d[i] - self.prim_rhs[i]).abs());
        }
        r
    }

    /// Maximum violation of the working bounds by the basic variables.
    pub(crate) fn primal_infeasibility(&self) -> E {
        (0..self.m).fold(0., |acc: E, slot| acc.max(self.ftest(slot).abs()))
    }

    /// Maximum reduced-cost sign violation over the nonbasic variables.
    pub(crate) fn dual_infeasibility(&self) -> E {
        let mut worst: E = 0.;
        for id in 0..self.total() {
            if self.pos[id] >= 0 {
                continue;
            }
            let d = self.reduced_cost(id);
            let viol = match self.desc.status(id) {
                VarStatus::PLower => -d,
                VarStatus::PUpper => d,
                VarStatus::PFree => d.abs(),
                _ => 0.,
            };
            worst = worst.max(viol);
        }
        worst
    }

    fn resize(&mut self, m: usize, n: usize) {
        self.n = n;
        self.m = m;
        let total = n + m;
        self.cost = vec![0.; total];
        self.lb = vec![0.; total];
        self.ub = vec![0.; total];
        self.wlb = vec![0.; total];
        self.wub = vec![0.; total];
        self.desc.resize(m, n);
        self.basis = vec![0; m];
        self.pos = vec![-1; total];
        self.factor.resize(m);
        self.fvec = vec![0.; m];
        self.y = vec![0.; m];
        self.pval = vec![0.; n];
        self.pdlow = vec![-INFTY; n];
        self.pdup = vec![INFTY; n];
        self.cdlow = vec![-INFTY; m];
        self.cdup = vec![INFTY; m];
        self.prim_rhs = vec![0.; m];
        self.upd_prim_rhs.resize(m);
        self.temp_fixed.clear();
        self.work_d = vec![0.; m];
        self.total_shift = 0.;
        self.leave_count = 0;
        self.boundflips = 0;
        self.flip_warns = 0;
    }

    /// Installs the basis described by the descriptor statuses, assigning
    /// slots to basic variables in id order.
    fn install_from_desc(&mut self) -> Result<(), SolveError> {
        let mut slot = 0;
        self.pos.iter_mut().for_each(|p| *p = -1);
        for id in 0..self.total() {
            if self.desc.status(id).is_basic() {
                if slot >= self.m {
                    return Err(SolveError::InvalidBasis {
                        message: format!("more than {} basic variables", self.m),
                    });
                }
                self.basis[slot] = id;
                self.pos[id] = slot as i64;
                slot += 1;
            }
        }
        if slot != self.m {
            return Err(SolveError::InvalidBasis {
                message: format!("{} basic variables, expected {}", slot, self.m),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// The sequential revised simplex solver.
pub struct SimplexSolver<'a> {
    lp: &'a LinearProgram,
    settings: Settings,
    logger: Logger,

    core: Core,
    work: IterWork,
    pricer: Pricers,
    tester: RatioTesters,
    scale: ScaleFactors,
    sense_factor: E,

    state: DriverState,
    mode: Mode,
    stats: SolveStats,
    solution: Option<Solution>,
    warm_desc: Option<Descriptor>,

    last_obj: E,
    no_improve: usize,
    perturbed: bool,
}

impl<'a> SimplexSolver<'a> {
    /// Creates a solver for the given LP with the given settings.
    pub fn new(lp: &'a LinearProgram, settings: Settings) -> Self {
        Self::with_logger(lp, settings, Logger::default())
    }

    pub fn with_logger(lp: &'a LinearProgram, settings: Settings, logger: Logger) -> Self {
        let pricer = Pricers::from_selection(settings.pricer, settings.partial_pricing);
        let tester = RatioTesters::from_selection(settings.ratiotester);
        Self {
            lp,
            settings,
            logger,
            core: Core::new(),
            work: IterWork::new(0, 0),
            pricer,
            tester,
            scale: ScaleFactors::identity(0, 0),
            sense_factor: 1.,
            state: DriverState::Uninitialized,
            mode: Mode::Leave,
            stats: SolveStats::default(),
            solution: None,
            warm_desc: None,
            last_obj: INFTY,
            no_improve: 0,
            perturbed: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &SolveStats {
        &self.stats
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Final basis descriptor, available after a solve for warm starting.
    pub fn descriptor(&self) -> &Descriptor {
        &self.core.desc
    }

    /// Provides a starting basis for the next solve. The descriptor must
    /// have exactly one basic variable per row.
    pub fn set_basis(&mut self, desc: Descriptor) -> Result<(), SolveError> {
        let (m, n) = self.lp.dims();
        if desc.n_rows() != m || desc.n_cols() != n {
            return Err(SolveError::InvalidBasis {
                message: format!(
                    "descriptor is {}x{}, problem is {}x{}",
                    desc.n_rows(),
                    desc.n_cols(),
                    m,
                    n
                ),
            });
        }
        if desc.n_basic() != m {
            return Err(SolveError::InvalidBasis {
                message: format!("{} basic variables, expected {}", desc.n_basic(), m),
            });
        }
        self.warm_desc = Some(desc);
        Ok(())
    }

    /// Runs the solver with the limits configured in the settings.
    pub fn solve(&mut self) -> Result<Status, SolveError> {
        let mut terminator = MultipleTerminators::from_settings(&self.settings);
        let mut callback = NoOpCallback;
        self.solve_with(&mut callback, &mut terminator)
    }

    /// Runs the solver with a caller-provided callback and terminator.
    pub fn solve_with(
        &mut self,
        callback: &mut dyn Callback,
        terminator: &mut dyn Terminator,
    ) -> Result<Status, SolveError> {
        self.initialize()?;
        terminator.initialize();

        if self.settings.representation == Representation::Row {
            self.logger.log(
                Verbosity::Info1,
                "row representation requested; pivoting in its column equivalent",
            );
        }
        if self.settings.simplifier == SimplifierSelection::Main {
            self.logger.log(
                Verbosity::Info1,
                "simplifier 'main' is delegated to an external presolve; continuing without",
            );
        }

        if self.core.refactorize().is_err() {
            self.logger
                .log(Verbosity::Warning, "initial basis singular, restarting from slack basis");
            self.install_slack_basis();
            if self.core.refactorize().is_err() {
                self.state = DriverState::Terminated;
                return Ok(self.finish(Status::Singular));
            }
        }
        self.stats.refactorizations += 1;
        self.state = DriverState::Factorized;

        self.mode = match self.settings.algorithm {
            Algorithm::Enter => Mode::Enter,
            Algorithm::Leave => Mode::Leave,
        };

        let mut status = Status::Unknown;
        for round in 0..MAX_ROUNDS {
            let result = match self.mode {
                Mode::Enter => self.enter_loop(callback, terminator),
                Mode::Leave => self.leave_loop(callback, terminator),
            };
            match result {
                LoopResult::LocalOptimal => {
                    self.unshift();
                    let pviol = self.core.primal_infeasibility();
                    let dviol = self.core.dual_infeasibility();
                    if pviol <= self.settings.fp_feastol && dviol <= self.settings.fp_opttol {
                        status = Status::Optimal;
                        break;
                    }
                    if round + 1 == MAX_ROUNDS {
                        status = Status::Unknown;
                        break;
                    }
                    // Hand over to the algorithm that can repair the
                    // remaining violations.
                    let next = if pviol > self.settings.fp_feastol {
                        Mode::Leave
                    } else {
                        Mode::Enter
                    };
                    self.logger.log(
                        Verbosity::Info2,
                        &format!(
                            "unshift left violations (primal {:.2e}, dual {:.2e}); switching sides",
                            pviol, dviol
                        ),
                    );
                    self.mode = next;
                }
                LoopResult::Unbounded { enter_id, dir } => {
                    status = Status::Unbounded;
                    let ray = self.extract_ray(enter_id, dir);
                    self.finish_with_certificates(status, None, Some(ray));
                    self.state = DriverState::Terminated;
                    return Ok(status);
                }
                LoopResult::Infeasible { leave_slot, sign } => {
                    status = Status::Infeasible;
                    let farkas = self.extract_farkas(leave_slot, sign);
                    self.finish_with_certificates(status, Some(farkas), None);
                    self.state = DriverState::Terminated;
                    return Ok(status);
                }
                LoopResult::Aborted(s) => {
                    status = s;
                    break;
                }
            }
        }

        self.state = DriverState::Terminated;
        Ok(self.finish(status))
    }

    // -- setup ----------------------------------------------------------------

    fn initialize(&mut self) -> Result<(), SolveError> {
        let (m, n) = self.lp.dims();
        self.core.resize(m, n);
        self.work.resize(m, n);
        self.stats = SolveStats::default();
        self.solution = None;
        self.last_obj = INFTY;
        self.no_improve = 0;
        self.perturbed = false;

        self.sense_factor = match self.lp.sense() {
            ObjSense::Minimize => 1.,
            ObjSense::Maximize => -1.,
        };

        self.scale = Scalers::from_selection(self.settings.scaler).compute(self.lp);

        // Engine arrays: scaled matrix, costs, bounds.
        let mat = self.lp.paired();
        let mut entries = Vec::with_capacity(mat.nnz());
        for j in 0..n {
            let (rows, vals) = mat.col(j);
            for (k, &i) in rows.iter().enumerate() {
                entries.push((i, j, vals[k] * self.scale.row[i] * self.scale.col[j]));
            }
        }
        self.core.mat = PairedMatrix::from_entries(m, n, &entries).map_err(|e| {
            SolveError::InvalidBasis {
                message: e.to_string(),
            }
        })?;

        for j in 0..n {
            self.core.cost[j] = self.sense_factor * self.lp.obj()[j] * self.scale.col[j];
            self.core.lb[j] = scale_bound(self.lp.lower()[j], 1. / self.scale.col[j]);
            self.core.ub[j] = scale_bound(self.lp.upper()[j], 1. / self.scale.col[j]);
        }
        for i in 0..m {
            self.core.cost[n + i] = 0.;
            self.core.lb[n + i] = scale_bound(self.lp.lhs()[i], self.scale.row[i]);
            self.core.ub[n + i] = scale_bound(self.lp.rhs()[i], self.scale.row[i]);
        }
        self.core.wlb.copy_from_slice(&self.core.lb);
        self.core.wub.copy_from_slice(&self.core.ub);

        self.core.eps = self.settings.epsilon_zero;
        self.core.feastol = self.settings.fp_feastol;
        self.core.opttol = self.settings.fp_opttol;
        self.core.representation = self.settings.representation;
        self.core.factor = Factorization::new(
            self.settings.factor_update,
            self.settings.epsilon_factorization,
            self.settings.epsilon_update,
            self.settings.factor_update_max,
        );
        self.core.factor.resize(m);

        // Starting basis: warm descriptor if provided and consistent,
        // otherwise the configured starter.
        let installed = if let Some(desc) = self.warm_desc.take() {
            self.core.desc = desc;
            self.core.install_from_desc().is_ok()
        } else {
            false
        };
        if !installed {
            let starter = Starters::from_selection(self.settings.starter);
            self.core.desc = starter.start(&self.core);
            self.core
                .install_from_desc()
                .map_err(|e| SolveError::InvalidBasis {
                    message: format!("starter produced an invalid basis: {}", e),
                })?;
        }

        self.pricer = Pricers::from_selection(self.settings.pricer, self.settings.partial_pricing);
        self.tester = RatioTesters::from_selection(self.settings.ratiotester);
        self.tester
            .reset(self.settings.fp_feastol, self.settings.epsilon_zero);

        self.state = DriverState::Loaded;
        Ok(())
    }

    fn install_slack_basis(&mut self) {
        self.core.desc = start::slack_descriptor(&self.core);
        self.core
            .install_from_desc()
            .expect("slack basis is always installable");
    }

    // -- the inner loops -------------------------------------------------------

    /// Ensures the working bounds admit the current basic solution, shifting
    /// where needed, so the entering algorithm starts primal feasible.
    fn prepare_enter(&mut self) {
        for slot in 0..self.core.m {
            let id = self.core.basis[slot];
            let v = self.core.fvec[slot];
            if v < self.core.wlb[id] - self.core.feastol {
                self.core.shift_wlb(id, v);
            } else if v > self.core.wub[id] + self.core.feastol {
                self.core.shift_wub(id, v);
            }
        }
        self.stats.total_shift = self.core.total_shift;
    }

    /// Makes the current basis dual feasible by choosing bound sides by
    /// reduced-cost sign, pinning free variables whose reduced cost cannot
    /// be repaired by a bound choice.
    fn prepare_leave(&mut self) {
        let opttol = self.core.opttol;
        let mut moved = false;
        for id in 0..self.core.total() {
            if self.core.is_basic(id) {
                continue;
            }
            let d = self.core.reduced_cost(id);
            match self.core.desc.status(id) {
                VarStatus::PLower if d < -opttol => {
                    if !is_unbounded(self.core.wub[id]) {
                        self.core.desc.set_status(id, VarStatus::PUpper);
                        moved = true;
                    } else {
                        self.pin_for_dual(id);
                        moved = true;
                    }
                }
                VarStatus::PUpper if d > opttol => {
                    if !is_unbounded(self.core.wlb[id]) {
                        self.core.desc.set_status(id, VarStatus::PLower);
                        moved = true;
                    } else {
                        self.pin_for_dual(id);
                        moved = true;
                    }
                }
                VarStatus::PFree if d.abs() > opttol => {
                    self.pin_for_dual(id);
                    moved = true;
                }
                _ => {}
            }
        }
        self.core.setup_dual_bounds();
        if moved {
            self.core.compute_fvec();
        }
        self.stats.total_shift = self.core.total_shift;
    }

    /// Temporarily fixes a variable at its current value so its reduced cost
    /// is unconstrained; undone by `unshift`.
    fn pin_for_dual(&mut self, id: I) {
        let old_status = self.core.desc.status(id);
        let v = self.core.xval(id);
        self.core
            .temp_fixed
            .push((id, old_status, self.core.wlb[id], self.core.wub[id]));
        self.core.wlb[id] = v;
        self.core.wub[id] = v;
        self.core.desc.set_status(id, VarStatus::PFixed);
        self.core.total_shift += 1.;
    }

    /// Removes shifts and pins, restoring the true bounds.
    fn unshift(&mut self) {
        while let Some((id, status, wlb, wub)) = self.core.temp_fixed.pop() {
            self.core.wlb[id] = wlb;
            self.core.wub[id] = wub;
            self.core.desc.set_status(id, status);
        }
        self.core.wlb.copy_from_slice(&self.core.lb);
        self.core.wub.copy_from_slice(&self.core.ub);
        // Nonbasic values may have moved back; recompute the basic solution
        // and duals against the true bounds.
        self.core.compute_fvec();
        self.core.compute_duals();
        self.core.setup_dual_bounds();
        self.core.total_shift = 0.;
    }

    fn maybe_refactor(&mut self) -> Result<(), Status> {
        let needs = self.core.factor.state() == FactorState::Stale
            || self.core.factor.update_count() >= self.settings.factor_update_max
            || self.core.basis_residual() > self.settings.refactor_tol;
        if !needs {
            return Ok(());
        }
        if self.core.refactorize().is_err() {
            self.logger
                .log(Verbosity::Warning, "refactorization found a singular basis");
            self.install_slack_basis();
            if self.core.refactorize().is_err() {
                return Err(Status::Singular);
            }
        }
        self.stats.refactorizations += 1;
        self.pricer.refactored(&self.core);
        self.state = DriverState::Factorized;
        Ok(())
    }

    /// Cycling watchdog: perturb once, abort on the second stall.
    fn check_progress(&mut self) -> Option<Status> {
        let obj = self.core.obj_value();
        if (obj - self.last_obj).abs() > 1e-12 * (1. + obj.abs()) {
            self.no_improve = 0;
        } else {
            self.no_improve += 1;
        }
        self.last_obj = obj;
        if self.no_improve <= CYCLE_THRESHOLD {
            return None;
        }
        if self.perturbed {
            return Some(Status::AbortCycling);
        }
        self.logger
            .log(Verbosity::Info2, "stalling; perturbing degenerate bounds");
        let mut h: u64 = 0x9e3779b97f4a7c15;
        for slot in 0..self.core.m {
            let id = self.core.basis[slot];
            let v = self.core.fvec[slot];
            h = h.wrapping_mul(6364136223846793005).wrapping_add(slot as u64);
            let jitter = self.core.feastol * (0.25 + 0.5 * ((h >> 33) as E / (1u64 << 31) as E));
            if (v - self.core.wlb[id]).abs() <= self.core.feastol {
                let nb = self.core.wlb[id] - jitter;
                self.core.shift_wlb(id, nb);
            }
            if (self.core.wub[id] - v).abs() <= self.core.feastol {
                let nb = self.core.wub[id] + jitter;
                self.core.shift_wub(id, nb);
            }
        }
        self.perturbed = true;
        self.no_improve = 0;
        None
    }

    fn iteration_boundary(
        &mut self,
        callback: &mut dyn Callback,
        terminator: &mut dyn Terminator,
    ) -> Option<Status> {
        let objective = self.current_objective();
        let state = IterationState {
            iteration: self.stats.iterations,
            objective,
            primal_infeasibility: self.core.primal_infeasibility(),
            dual_infeasibility: self.core.dual_infeasibility(),
            status: Status::InProgress,
            stats: self.stats,
        };
        callback.call(&state);
        let progress = Progress {
            iteration: self.stats.iterations,
            objective,
            sense: self.lp.sense(),
        };
        terminator.terminate(&progress)
    }

    /// The entering (primal) algorithm: price a nonbasic column, ratio-test
    /// along its FTRAN, update.
    fn enter_loop(
        &mut self,
        callback: &mut dyn Callback,
        terminator: &mut dyn Terminator,
    ) -> LoopResult {
        self.prepare_enter();
        self.pricer.setup(&self.core, Mode::Enter);
        let mut unstable_retries = 0;

        loop {
            if let Err(s) = self.maybe_refactor() {
                return LoopResult::Aborted(s);
            }

            self.state = DriverState::Pricing;
            let q = match self.pricer.select_enter(&self.core) {
                Some(q) => q,
                None => return LoopResult::LocalOptimal,
            };
            let d = self.core.reduced_cost(q);
            let dir = match self.core.desc.status(q) {
                VarStatus::PUpper => -1.,
                VarStatus::PFree if d > 0. => -1.,
                _ => 1.,
            };

            // FTRAN of the entering column.
            self.work.alpha.clear();
            load_var_col(&mut self.work.alpha, &self.core, q);
            self.core.factor.ftran(self.work.alpha.values_mut());
            self.work.alpha.setup_from_dense(self.core.eps);

            self.state = DriverState::RatioTesting;
            let range = bound_range(self.core.wlb[q], self.core.wub[q]);
            let mut val = range;
            let choice = self
                .tester
                .select_leave(&mut self.core, &mut self.work, q, dir, &mut val);

            self.state = DriverState::Updating;
            match choice {
                LeaveChoice::Unbounded => {
                    return LoopResult::Unbounded { enter_id: q, dir };
                }
                LeaveChoice::Unstable => {
                    unstable_retries += 1;
                    if unstable_retries > MAX_UNSTABLE_RETRIES {
                        return LoopResult::Aborted(Status::Unknown);
                    }
                    if self.core.factor.update_count() > 0 {
                        if self.core.refactorize().is_err() {
                            return LoopResult::Aborted(Status::Singular);
                        }
                        self.stats.refactorizations += 1;
                    } else {
                        self.widen_blocking_bounds(dir);
                    }
                    continue;
                }
                LeaveChoice::Flip => {
                    // The entering variable itself reaches its opposite
                    // bound: a bound flip without a basis change.
                    let t = range;
                    for k in 0..self.work.alpha.len() {
                        let slot = self.work.alpha.index_mem()[k];
                        let a = self.work.alpha.value(slot);
                        self.core.fvec[slot] -= dir * t * a;
                    }
                    let _flipped = self.core.flip(q);
                    debug_assert!(_flipped);
                    self.core.upd_prim_rhs.clear();
                    self.stats.bound_flips += 1;
                }
                LeaveChoice::Slot(r) => {
                    let t = val.max(0.);
                    self.apply_enter_pivot(q, r, dir, t);
                }
            }

            unstable_retries = 0;
            self.stats.iterations += 1;
            self.stats.enter_iterations += 1;
            self.stats.total_shift = self.core.total_shift;

            if let Some(s) = self.check_progress() {
                return LoopResult::Aborted(s);
            }
            if let Some(s) = self.iteration_boundary(callback, terminator) {
                return LoopResult::Aborted(s);
            }
        }
    }

    fn apply_enter_pivot(&mut self, q: I, r: I, dir: E, t: E) {
        let p = self.core.basis[r];
        let alpha_r = self.work.alpha.value(r);

        // Move the basics along the direction.
        for k in 0..self.work.alpha.len() {
            let slot = self.work.alpha.index_mem()[k];
            let a = self.work.alpha.value(slot);
            self.core.fvec[slot] -= dir * t * a;
        }
        let enter_value = self.core.xval(q) + dir * t;

        // The leaving variable exits at the bound it hit.
        let hits_lower = dir * alpha_r > 0.;
        let leave_status = if self.core.wlb[p] == self.core.wub[p] {
            VarStatus::PFixed
        } else if hits_lower {
            VarStatus::PLower
        } else {
            VarStatus::PUpper
        };

        // Dual updates via the pivot row of the leaving slot.
        self.work.rho.clear();
        self.work.rho.set_value(r, 1.);
        self.core.factor.btran(self.work.rho.values_mut());
        self.work.rho.setup_from_dense(self.core.eps);
        self.compute_pivot_row(r);
        let d_q = self.core.reduced_cost(q);
        let theta_d = d_q / alpha_r;
        self.apply_dual_step(theta_d);

        // prim_rhs: q stops being nonbasic, p starts.
        let old_xq = self.core.xval(q);
        add_var_col(&mut self.core.prim_rhs, &self.core.mat, self.core.n, q, old_xq);
        self.core.desc.set_status(p, leave_status);
        self.core.pos[p] = -1;
        let p_value = self.core.xval(p);
        add_var_col(
            &mut self.core.prim_rhs,
            &self.core.mat,
            self.core.n,
            p,
            -p_value,
        );

        self.core.desc.set_status(
            q,
            VarStatus::dual_from_bounds(self.core.lb[q], self.core.ub[q]),
        );
        self.core.basis[r] = q;
        self.core.pos[q] = r as i64;
        self.core.fvec[r] = enter_value;

        // Freshly nonbasic variables need a pricing value.
        if p < self.core.n {
            self.core.pval[p] = var_col_dot(&self.core.mat, self.core.n, p, &self.core.y);
        }
        self.core.reset_dual_bounds(p);

        let col = self.core.var_col(q);
        let state = self.core.factor.update(r, &col, &self.work.alpha);
        if state == FactorState::Stale {
            self.logger
                .log(Verbosity::Info3, "column update refused; refactorization pending");
        }

        self.pricer.entered(&mut self.core, &self.work, q, r, p);
    }

    /// The leaving (dual) algorithm: price an infeasible basic, ratio-test
    /// along its BTRAN row, update.
    fn leave_loop(
        &mut self,
        callback: &mut dyn Callback,
        terminator: &mut dyn Terminator,
    ) -> LoopResult {
        self.prepare_leave();
        self.pricer.setup(&self.core, Mode::Leave);
        let mut unstable_retries = 0;

        loop {
            if let Err(s) = self.maybe_refactor() {
                return LoopResult::Aborted(s);
            }

            self.state = DriverState::Pricing;
            let r = match self.pricer.select_leave(&self.core) {
                Some(r) => r,
                None => return LoopResult::LocalOptimal,
            };
            let viol = self.core.ftest(r);
            let sign = if viol > 0. { 1. } else { -1. };

            // BTRAN of the leaving slot; the pivot row follows from it.
            self.work.rho.clear();
            self.work.rho.set_value(r, 1.);
            self.core.factor.btran(self.work.rho.values_mut());
            self.work.rho.setup_from_dense(self.core.eps);
            self.compute_pivot_row(r);

            self.state = DriverState::RatioTesting;
            let mut val = sign * INFTY;
            let choice = self
                .tester
                .select_enter(&mut self.core, &mut self.work, r, &mut val);

            self.state = DriverState::Updating;
            if self.core.flip_warns > 0 {
                self.logger.log(
                    Verbosity::Warning,
                    &format!(
                        "{} flip candidates had an unexpected status and were skipped",
                        self.core.flip_warns
                    ),
                );
                self.core.flip_warns = 0;
            }
            let q = match choice {
                EnterChoice::Infeasible => {
                    return LoopResult::Infeasible {
                        leave_slot: r,
                        sign,
                    };
                }
                EnterChoice::Unstable => {
                    unstable_retries += 1;
                    if unstable_retries > MAX_UNSTABLE_RETRIES {
                        return LoopResult::Aborted(Status::Unknown);
                    }
                    if self.core.factor.update_count() > 0 {
                        if self.core.refactorize().is_err() {
                            return LoopResult::Aborted(Status::Singular);
                        }
                        self.stats.refactorizations += 1;
                    }
                    continue;
                }
                EnterChoice::Id(q) => q,
            };

            if self.core.boundflips > 0 {
                self.stats.bound_flips += self.core.boundflips;
                self.stats.long_steps += 1;
                self.apply_flip_correction();
            }

            if !self.apply_leave_pivot(r, q, sign, val) {
                unstable_retries += 1;
                if unstable_retries > MAX_UNSTABLE_RETRIES {
                    return LoopResult::Aborted(Status::Unknown);
                }
                continue;
            }

            unstable_retries = 0;
            self.stats.iterations += 1;
            self.stats.leave_iterations += 1;
            self.core.leave_count += 1;
            self.stats.total_shift = self.core.total_shift;

            if let Some(s) = self.check_progress() {
                return LoopResult::Aborted(s);
            }
            if let Some(s) = self.iteration_boundary(callback, terminator) {
                return LoopResult::Aborted(s);
            }
        }
    }

    /// Applies the pending bound-flip correction: one FTRAN of the
    /// accumulated right-hand side updates the basic solution to reflect
    /// every flip at once.
    fn apply_flip_correction(&mut self) {
        if self.core.upd_prim_rhs.is_empty() {
            self.core.boundflips = 0;
            return;
        }
        let m = self.core.m;
        for i in 0..m {
            self.core.work_d[i] = self.core.upd_prim_rhs.value(i);
        }
        self.core.upd_prim_rhs.clear();
        // fvec -= B^{-1} * updPrimRhs
        let mut delta = std::mem::take(&mut self.core.work_d);
        self.core.factor.ftran(&mut delta);
        for slot in 0..m {
            self.core.fvec[slot] -= delta[slot];
            delta[slot] = 0.;
        }
        self.core.work_d = delta;
        self.core.boundflips = 0;
    }

    fn apply_leave_pivot(&mut self, r: I, q: I, sign: E, theta: E) -> bool {
        let p = self.core.basis[r];

        // FTRAN of the entering column; validate the pivot element before
        // touching any state.
        self.work.alpha.clear();
        load_var_col(&mut self.work.alpha, &self.core, q);
        self.core.factor.ftran(self.work.alpha.values_mut());
        self.work.alpha.setup_from_dense(self.core.eps);
        let alpha_r = self.work.alpha.value(r);
        if alpha_r.abs() < self.settings.epsilon_update {
            // The pivot element vanished numerically; force a fresh start on
            // this iteration.
            self.logger
                .log(Verbosity::Info3, "vanishing pivot in leave update; refactorizing");
            let _ = self.core.refactorize();
            self.stats.refactorizations += 1;
            return false;
        }

        // Dual step.
        self.apply_dual_step(theta);

        // Primal step: drive the leaving variable onto its violated bound.
        let target = if sign > 0. {
            self.core.wub[p]
        } else {
            self.core.wlb[p]
        };
        let delta = (self.core.fvec[r] - target) / alpha_r;
        for k in 0..self.work.alpha.len() {
            let slot = self.work.alpha.index_mem()[k];
            let a = self.work.alpha.value(slot);
            self.core.fvec[slot] -= delta * a;
        }
        let enter_value = self.core.xval(q) + delta;

        // Status and bookkeeping.
        let leave_status = if self.core.wlb[p] == self.core.wub[p] {
            VarStatus::PFixed
        } else if sign > 0. {
            VarStatus::PUpper
        } else {
            VarStatus::PLower
        };
        let old_xq = self.core.xval(q);
        add_var_col(&mut self.core.prim_rhs, &self.core.mat, self.core.n, q, old_xq);
        self.core.desc.set_status(p, leave_status);
        self.core.pos[p] = -1;
        let p_value = self.core.xval(p);
        add_var_col(
            &mut self.core.prim_rhs,
            &self.core.mat,
            self.core.n,
            p,
            -p_value,
        );

        self.core.desc.set_status(
            q,
            VarStatus::dual_from_bounds(self.core.lb[q], self.core.ub[q]),
        );
        self.core.basis[r] = q;
        self.core.pos[q] = r as i64;
        self.core.fvec[r] = enter_value;

        if p < self.core.n {
            self.core.pval[p] = var_col_dot(&self.core.mat, self.core.n, p, &self.core.y);
        }
        self.core.reset_dual_bounds(p);

        let col = self.core.var_col(q);
        let state = self.core.factor.update(r, &col, &self.work.alpha);
        if state == FactorState::Stale {
            self.logger
                .log(Verbosity::Info3, "column update refused; refactorization pending");
        }

        self.pricer.left(&mut self.core, &self.work, r, q);
        true
    }

    /// Computes the pivot row `a_j^T rho` into `zp` (structural part) and a
    /// copy of `rho` into `zc` (logical part). Each vector has its own
    /// delta; the ratio testers may clear entries without affecting `rho`.
    fn compute_pivot_row(&mut self, _r: I) {
        self.work.zp.clear();
        self.work.zc.clear();
        for k in 0..self.work.rho.len() {
            let i = self.work.rho.index_mem()[k];
            let rv = self.work.rho.value(i);
            self.work.zc.set_value(i, rv);
            let (cols, vals) = self.core.mat.row(i);
            for (e, &j) in cols.iter().enumerate() {
                self.work.zp.add_value(j, vals[e] * rv);
            }
        }
        self.work.zp.setup(self.core.eps);
    }

    /// Moves the duals along `rho` by `theta` and updates the pricing
    /// values through the pivot row.
    fn apply_dual_step(&mut self, theta: E) {
        if theta == 0. {
            return;
        }
        for k in 0..self.work.rho.len() {
            let i = self.work.rho.index_mem()[k];
            self.core.y[i] += theta * self.work.rho.value(i);
        }
        for k in 0..self.work.zp.len() {
            let j = self.work.zp.index_mem()[k];
            self.core.pval[j] += theta * self.work.zp.value(j);
        }
    }

    /// Shifts the working bound blocking the entering step on every slot the
    /// direction touches, restoring room for a stable pivot.
    fn widen_blocking_bounds(&mut self, dir: E) {
        let feastol = self.core.feastol;
        for k in 0..self.work.alpha.len() {
            let slot = self.work.alpha.index_mem()[k];
            let u = -dir * self.work.alpha.value(slot);
            let id = self.core.basis[slot];
            if u > self.core.eps && !is_unbounded(self.core.wub[id]) {
                let nb = self.core.wub[id] + feastol * (1. + self.core.wub[id].abs());
                self.core.shift_wub(id, nb);
            } else if u < -self.core.eps && !is_unbounded(self.core.wlb[id]) {
                let nb = self.core.wlb[id] - feastol * (1. + self.core.wlb[id].abs());
                self.core.shift_wlb(id, nb);
            }
        }
    }

    // -- termination ----------------------------------------------------------

    fn current_objective(&self) -> E {
        self.sense_factor * self.core.obj_value()
    }

    fn finish(&mut self, status: Status) -> Status {
        self.finish_with_certificates(status, None, None);
        status
    }

    fn finish_with_certificates(
        &mut self,
        status: Status,
        farkas: Option<Col<E>>,
        ray: Option<Col<E>>,
    ) {
        let n = self.core.n;
        let m = self.core.m;

        let mut primal = Col::zeros(n);
        for j in 0..n {
            primal[j] = self.core.xval(j) * self.scale.col[j];
        }
        let mut slacks = Col::zeros(m);
        for i in 0..m {
            slacks[i] = self.core.xval(n + i) / self.scale.row[i];
        }
        let mut duals = Col::zeros(m);
        for i in 0..m {
            duals[i] = self.sense_factor * self.core.y[i] * self.scale.row[i];
        }
        let mut reduced_costs = Col::zeros(n);
        for j in 0..n {
            let d = self.core.cost[j] - self.core.pval[j];
            reduced_costs[j] = self.sense_factor * d / self.scale.col[j];
        }

        let objective = self.lp.obj_value(&primal);
        self.solution = Some(Solution {
            status,
            objective,
            primal,
            slacks,
            duals,
            reduced_costs,
            farkas,
            ray,
        });
    }

    /// Primal ray from an unbounded entering direction, mapped back to the
    /// original column scale.
    fn extract_ray(&mut self, enter_id: I, dir: E) -> Col<E> {
        let n = self.core.n;
        let mut ray = Col::zeros(n);
        if enter_id < n {
            ray[enter_id] = dir;
        }
        for k in 0..self.work.alpha.len() {
            let slot = self.work.alpha.index_mem()[k];
            let id = self.core.basis[slot];
            if id < n {
                ray[id] = -dir * self.work.alpha.value(slot);
            }
        }
        for j in 0..n {
            ray[j] *= self.scale.col[j];
        }
        ray
    }

    /// Farkas multipliers from an infeasible leaving direction, mapped back
    /// to the original row scale.
    fn extract_farkas(&mut self, _leave_slot: I, sign: E) -> Col<E> {
        let m = self.core.m;
        let mut farkas = Col::zeros(m);
        for k in 0..self.work.rho.len() {
            let i = self.work.rho.index_mem()[k];
            farkas[i] = sign * self.work.rho.value(i) * self.scale.row[i];
        }
        farkas
    }
}

/// Loads the column of variable `id` into a delta vector.
pub(crate) fn load_var_col(target: &mut DeltaVector, core: &Core, id: I) {
    if id < core.n {
        let (rows, vals) = core.mat.col(id);
        for (k, &i) in rows.iter().enumerate() {
            target.add_value(i, vals[k]);
        }
    } else {
        target.add_value(id - core.n, -1.);
    }
}

fn preferred_nonbasic(cost: E, lb: E, ub: E) -> VarStatus {
    match (is_unbounded(lb), is_unbounded(ub)) {
        (true, true) => VarStatus::PFree,
        (false, true) => VarStatus::PLower,
        (true, false) => VarStatus::PUpper,
        (false, false) => {
            if lb == ub {
                VarStatus::PFixed
            } else if cost >= 0. {
                VarStatus::PLower
            } else {
                VarStatus::PUpper
            }
        }
    }
}

fn bound_range(lb: E, ub: E) -> E {
    if is_unbounded(lb) || is_unbounded(ub) {
        INFTY
    } else {
        ub - lb
    }
}

fn scale_bound(v: E, factor: E) -> E {
    if is_unbounded(v) {
        v
    } else {
        v * factor
    }
}
