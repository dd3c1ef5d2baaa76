//! # pivoters
//!
//! A sequential revised simplex solver for sparse linear programs of the form
//!
//! ```text
//! min/max  c^T x
//! s.t.     lhs <= A x <= rhs
//!          l <= x <= u
//! ```
//!
//! where any bound may be infinite. The solver returns an optimal basic
//! solution, a Farkas certificate of infeasibility, or a primal ray proving
//! unboundedness, together with a termination [`Status`].
//!
//! The crate is organized around the pivot engine: sparse delta vectors
//! ([`linalg::ssvec`]), an LU-refactorable basis with Eta or Forest-Tomlin
//! column updates ([`linalg::factor`]), pricing and ratio-test strategies
//! ([`simplex::pricer`], [`simplex::ratio`]), and the iteration driver
//! ([`simplex::SimplexSolver`]). File readers, basis I/O, scaling, and
//! settings persistence live behind narrow interfaces in [`interface`],
//! [`scale`], and [`settings`].

use serde::{Deserialize, Serialize};

pub type E = f64;
pub type I = usize;

/// Sentinel magnitude above which a bound is treated as absent.
pub const INFINITY_THRESHOLD: E = 1e20;

/// Value used to represent an absent bound.
pub const INFTY: E = 1e100;

/// Returns `true` if `x` represents an infinite bound.
#[inline]
pub fn is_unbounded(x: E) -> bool {
    x.abs() >= INFINITY_THRESHOLD
}

pub mod callback;
pub mod interface;
pub mod linalg;
pub mod lp;
pub mod scale;
pub mod settings;
pub mod simplex;
pub mod terminators;

#[cfg(test)]
pub mod tests;

/// Termination status of a solve.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    /// The solver is still running.
    InProgress,
    /// An optimal solution was found.
    Optimal,
    /// The problem is infeasible; Farkas multipliers are available.
    Infeasible,
    /// The problem is unbounded; a primal ray is available.
    Unbounded,
    /// The solver stopped due to the time limit.
    AbortTime,
    /// The solver stopped due to the iteration limit.
    AbortIter,
    /// The objective crossed the configured limit.
    AbortValue,
    /// Progress stalled and anti-cycling measures were exhausted.
    AbortCycling,
    /// The basis matrix is singular at the working tolerance.
    Singular,
    /// The solver was interrupted (e.g., by user or signal).
    Interrupted,
    /// The status is unknown or not determined.
    Unknown,
}

impl Status {
    /// Whether the status is terminal, i.e. the solve has finished.
    pub fn is_terminal(self) -> bool {
        self != Status::InProgress
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let txt = match self {
            Status::InProgress => "in progress",
            Status::Optimal => "optimal",
            Status::Infeasible => "infeasible",
            Status::Unbounded => "unbounded",
            Status::AbortTime => "time limit reached",
            Status::AbortIter => "iteration limit reached",
            Status::AbortValue => "objective limit reached",
            Status::AbortCycling => "aborted due to cycling",
            Status::Singular => "singular basis",
            Status::Interrupted => "interrupted",
            Status::Unknown => "unknown",
        };
        write!(f, "{}", txt)
    }
}

/// Counters accumulated over one call to `solve`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SolveStats {
    /// Total simplex iterations (entering + leaving).
    pub iterations: usize,
    /// Iterations performed by the entering (primal) algorithm.
    pub enter_iterations: usize,
    /// Iterations performed by the leaving (dual) algorithm.
    pub leave_iterations: usize,
    /// Number of basis refactorizations.
    pub refactorizations: usize,
    /// Number of nonbasic bound flips performed by the ratio test.
    pub bound_flips: usize,
    /// Number of ratio-test calls that flipped at least one bound.
    pub long_steps: usize,
    /// Total amount of bound shifting applied for feasibility.
    pub total_shift: E,
}
