//! End-to-end tests: the six solver scenarios, certificate checks, and
//! property tests over seeded random LPs.

pub mod netlib;
pub mod properties;
pub mod scenarios;

use faer::Col;

use crate::callback::Logger;
use crate::lp::LinearProgram;
use crate::settings::{ObjSense, Settings};
use crate::simplex::{SimplexSolver, Solution};
use crate::{is_unbounded, SolveStats, Status, E, INFTY};

/// Solves and returns status, solution, and stats.
pub fn solve(lp: &LinearProgram, settings: Settings) -> (Status, Solution, SolveStats) {
    let mut solver = SimplexSolver::with_logger(lp, settings, Logger::silent());
    let status = solver.solve().expect("solver setup failed");
    let solution = solver.solution().expect("no solution recorded").clone();
    let stats = *solver.stats();
    (status, solution, stats)
}

/// Deterministic generator for test data.
pub struct XorShift(pub u64);

impl XorShift {
    pub fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// A random LP that is feasible (a reference point is baked into the row
/// sides) and bounded (every column is boxed).
pub fn random_feasible_lp(seed: u64, m: usize, n: usize) -> LinearProgram {
    let mut rng = XorShift(seed.wrapping_mul(2654435761).max(1));
    let mut entries = Vec::new();
    for j in 0..n {
        let mut hits = 0;
        for i in 0..m {
            if rng.next_f64() < 0.4 {
                entries.push((i, j, rng.range(-2., 2.)));
                hits += 1;
            }
        }
        if hits == 0 && m > 0 {
            let i = (rng.next_f64() * m as f64) as usize % m;
            entries.push((i, j, rng.range(0.5, 2.)));
        }
    }

    let x0: Vec<E> = (0..n).map(|_| rng.range(0., 1.)).collect();
    let mut act = vec![0.; m];
    for &(i, j, v) in &entries {
        act[i] += v * x0[j];
    }

    let c = Col::from_fn(n, |_| rng.range(-1., 1.));
    let lhs = Col::from_fn(m, |i| act[i] - rng.range(0.1, 2.));
    let rhs = Col::from_fn(m, |i| act[i] + rng.range(0.1, 2.));
    let lower = Col::from_fn(n, |_| 0.);
    let upper = Col::from_fn(n, |_| 2.);

    LinearProgram::new(ObjSense::Minimize, c, m, &entries, lhs, rhs, lower, upper).unwrap()
}

/// Checks primal feasibility, dual feasibility, and complementary slackness
/// of an optimal solution.
pub fn check_optimal(lp: &LinearProgram, sol: &Solution, tol: E) {
    let (m, n) = lp.dims();
    let x = &sol.primal;
    let act = lp.activity(x);
    let sf = match lp.sense() {
        ObjSense::Minimize => 1.,
        ObjSense::Maximize => -1.,
    };

    // Primal feasibility.
    for j in 0..n {
        let slack = tol * (1. + x[j].abs());
        if !is_unbounded(lp.lower()[j]) {
            assert!(x[j] >= lp.lower()[j] - slack, "x[{}] below bound", j);
        }
        if !is_unbounded(lp.upper()[j]) {
            assert!(x[j] <= lp.upper()[j] + slack, "x[{}] above bound", j);
        }
    }
    for i in 0..m {
        let slack = tol * (1. + act[i].abs());
        if !is_unbounded(lp.lhs()[i]) {
            assert!(act[i] >= lp.lhs()[i] - slack, "row {} below lhs", i);
        }
        if !is_unbounded(lp.rhs()[i]) {
            assert!(act[i] <= lp.rhs()[i] + slack, "row {} above rhs", i);
        }
        assert!(
            (act[i] - sol.slacks[i]).abs() <= tol * (1. + act[i].abs()),
            "slack {} inconsistent with activity",
            i
        );
    }

    // Reduced costs match the duals, and their signs match the bounds.
    for j in 0..n {
        let (rows, vals) = lp.paired().col(j);
        let mut aty = 0.;
        for (k, &i) in rows.iter().enumerate() {
            aty += vals[k] * sol.duals[i];
        }
        let d = lp.obj()[j] - aty;
        assert!(
            (d - sol.reduced_costs[j]).abs() <= tol * (1. + d.abs()),
            "reduced cost {} inconsistent",
            j
        );

        let d = sf * d;
        let at_lower = !is_unbounded(lp.lower()[j]) && x[j] <= lp.lower()[j] + tol;
        let at_upper = !is_unbounded(lp.upper()[j]) && x[j] >= lp.upper()[j] - tol;
        let slack = tol * (1. + d.abs());
        if at_lower && at_upper {
            // Fixed variable: any sign.
        } else if at_lower {
            assert!(d >= -slack, "column {} violates dual sign at lower", j);
        } else if at_upper {
            assert!(d <= slack, "column {} violates dual sign at upper", j);
        } else {
            assert!(d.abs() <= slack, "interior column {} has nonzero reduced cost", j);
        }
    }

    // Complementary slackness for the rows.
    for i in 0..m {
        let y = sf * sol.duals[i];
        if y > tol {
            assert!(
                !is_unbounded(lp.lhs()[i]) && (act[i] - lp.lhs()[i]).abs() <= tol * (1. + y.abs()),
                "row {} has positive dual but is not at its lhs",
                i
            );
        } else if y < -tol {
            assert!(
                !is_unbounded(lp.rhs()[i]) && (lp.rhs()[i] - act[i]).abs() <= tol * (1. + y.abs()),
                "row {} has negative dual but is not at its rhs",
                i
            );
        }
    }
}

/// Checks that Farkas multipliers certify infeasibility: the supported bound
/// value strictly dominates the supremum of `y^T A x` over the box.
pub fn check_farkas(lp: &LinearProgram, y: &Col<E>, tol: E) {
    let (m, n) = lp.dims();
    let mut value = 0.;
    for i in 0..m {
        if y[i] > tol {
            assert!(
                !is_unbounded(lp.lhs()[i]),
                "positive multiplier on a row without lhs"
            );
            value += y[i] * lp.lhs()[i];
        } else if y[i] < -tol {
            assert!(
                !is_unbounded(lp.rhs()[i]),
                "negative multiplier on a row without rhs"
            );
            value += y[i] * lp.rhs()[i];
        }
    }

    let mut sup = 0.;
    for j in 0..n {
        let (rows, vals) = lp.paired().col(j);
        let mut t = 0.;
        for (k, &i) in rows.iter().enumerate() {
            t += vals[k] * y[i];
        }
        if t > tol {
            assert!(!is_unbounded(lp.upper()[j]), "certificate leaks at column {}", j);
            sup += t * lp.upper()[j];
        } else if t < -tol {
            assert!(!is_unbounded(lp.lower()[j]), "certificate leaks at column {}", j);
            sup += t * lp.lower()[j];
        }
    }
    assert!(
        value - sup > tol,
        "Farkas certificate is not separating: value {} vs sup {}",
        value,
        sup
    );
}

/// Checks that a primal ray proves unboundedness: it respects the finite
/// row sides and bounds, and improves the objective.
pub fn check_ray(lp: &LinearProgram, ray: &Col<E>, tol: E) {
    let (m, n) = lp.dims();
    let mut norm = 0.;
    for j in 0..n {
        norm += ray[j].abs();
        if ray[j] > tol {
            assert!(is_unbounded(lp.upper()[j]), "ray increases a bounded column");
        } else if ray[j] < -tol {
            assert!(is_unbounded(lp.lower()[j]), "ray decreases a bounded column");
        }
    }
    assert!(norm > tol, "ray is numerically zero");

    let act = lp.activity(ray);
    for i in 0..m {
        if !is_unbounded(lp.rhs()[i]) {
            assert!(act[i] <= tol * (1. + norm), "ray violates rhs of row {}", i);
        }
        if !is_unbounded(lp.lhs()[i]) {
            assert!(act[i] >= -tol * (1. + norm), "ray violates lhs of row {}", i);
        }
    }

    let mut cr = 0.;
    for j in 0..n {
        cr += lp.obj()[j] * ray[j];
    }
    match lp.sense() {
        ObjSense::Minimize => assert!(cr < -tol, "ray does not improve a minimization"),
        ObjSense::Maximize => assert!(cr > tol, "ray does not improve a maximization"),
    }
}

/// Shared builder for the boxed knapsack-style LP used by the long-step and
/// warm-start scenarios: `max sum c_j x_j` with `x in [0,1]^k` under a
/// single capacity row.
pub fn boxed_profit_lp(k: usize, capacity: E) -> LinearProgram {
    let entries: Vec<(usize, usize, E)> = (0..k).map(|j| (0, j, 1.)).collect();
    LinearProgram::new(
        ObjSense::Maximize,
        Col::from_fn(k, |j| 1. + 0.2 * j as E),
        1,
        &entries,
        Col::from_fn(1, |_| -INFTY),
        Col::from_fn(1, |_| capacity),
        Col::from_fn(k, |_| 0.),
        Col::from_fn(k, |_| 1.),
    )
    .unwrap()
}
