//! Property tests over seeded random LPs: every solve of a feasible bounded
//! instance must reach OPTIMAL with a KKT-consistent solution, the two
//! stabilized ratio testers must agree on the terminal objective, and the
//! basis bookkeeping must stay consistent.

use rstest::rstest;
use rstest_reuse::{apply, template};

use super::{check_optimal, random_feasible_lp, solve};
use crate::callback::Logger;
use crate::settings::{Algorithm, RatioTesterSelection, ScalerSelection, Settings};
use crate::simplex::SimplexSolver;
use crate::Status;

#[template]
#[rstest]
pub fn random_cases(#[values(1u64, 2, 3, 4, 5)] seed: u64) {}

#[apply(random_cases)]
fn random_lps_reach_optimal(
    seed: u64,
    #[values(Algorithm::Enter, Algorithm::Leave)] algorithm: Algorithm,
    #[values(RatioTesterSelection::Fast, RatioTesterSelection::BoundFlipping)]
    tester: RatioTesterSelection,
) {
    let lp = random_feasible_lp(seed, 6, 10);
    let mut settings = Settings::default();
    settings.scaler = ScalerSelection::Off;
    settings.algorithm = algorithm;
    settings.ratiotester = tester;

    let (status, sol, stats) = solve(&lp, settings);
    assert_eq!(status, Status::Optimal, "seed {} failed", seed);
    assert!(stats.iterations < 500, "suspicious iteration count");
    check_optimal(&lp, &sol, 1e-5);
}

#[apply(random_cases)]
fn bound_flipping_matches_fast_objective(seed: u64) {
    let lp = random_feasible_lp(seed, 5, 12);

    let mut fast = Settings::default();
    fast.scaler = ScalerSelection::Off;
    fast.ratiotester = RatioTesterSelection::Fast;
    let (s1, sol1, _) = solve(&lp, fast);

    let mut flipping = Settings::default();
    flipping.scaler = ScalerSelection::Off;
    flipping.ratiotester = RatioTesterSelection::BoundFlipping;
    let (s2, sol2, _) = solve(&lp, flipping);

    assert_eq!(s1, Status::Optimal);
    assert_eq!(s2, Status::Optimal);
    assert!(
        (sol1.objective - sol2.objective).abs() <= 1e-5 * (1. + sol1.objective.abs()),
        "seed {}: {} vs {}",
        seed,
        sol1.objective,
        sol2.objective
    );
}

#[apply(random_cases)]
fn scaling_does_not_change_the_objective(
    seed: u64,
    #[values(ScalerSelection::UniEqui, ScalerSelection::BiEqui, ScalerSelection::Geo1, ScalerSelection::Geo8)]
    scaler: ScalerSelection,
) {
    let lp = random_feasible_lp(seed, 5, 8);

    let mut plain = Settings::default();
    plain.scaler = ScalerSelection::Off;
    let (s1, sol1, _) = solve(&lp, plain);

    let mut scaled = Settings::default();
    scaled.scaler = scaler;
    let (s2, sol2, _) = solve(&lp, scaled);

    assert_eq!(s1, Status::Optimal);
    assert_eq!(s2, Status::Optimal);
    assert!(
        (sol1.objective - sol2.objective).abs() <= 1e-5 * (1. + sol1.objective.abs()),
        "seed {}: {} vs {}",
        seed,
        sol1.objective,
        sol2.objective
    );
    check_optimal(&lp, &sol2, 1e-5);
}

#[apply(random_cases)]
fn descriptor_stays_consistent(seed: u64) {
    let lp = random_feasible_lp(seed, 7, 9);
    let mut settings = Settings::default();
    settings.scaler = ScalerSelection::Off;

    let mut solver = SimplexSolver::with_logger(&lp, settings, Logger::silent());
    let status = solver.solve().unwrap();
    assert_eq!(status, Status::Optimal);

    let desc = solver.descriptor();
    assert!(desc.is_consistent(), "basic count drifted: {}", desc.dump());
    assert_eq!(desc.n_basic(), lp.n_rows());
}

#[test]
fn iteration_limit_aborts_with_partial_state() {
    let lp = random_feasible_lp(11, 8, 14);
    let mut settings = Settings::default();
    settings.scaler = ScalerSelection::Off;
    settings.iter_limit = 1;

    let mut solver = SimplexSolver::with_logger(&lp, settings, Logger::silent());
    let status = solver.solve().unwrap();
    if status == Status::AbortIter {
        // Partial state remains inspectable.
        assert!(solver.solution().is_some());
        assert!(solver.stats().iterations >= 1);
    } else {
        // The instance happened to finish within the budget.
        assert_eq!(status, Status::Optimal);
    }
}

#[test]
fn time_limit_zero_aborts_at_the_first_boundary() {
    // This instance always needs at least one leaving iteration, so the
    // terminator is guaranteed a boundary to fire on.
    let lp = super::boxed_profit_lp(8, 2.5);
    let mut settings = Settings::default();
    settings.scaler = ScalerSelection::Off;
    settings.time_limit = 0.;

    let (status, _, _) = solve(&lp, settings);
    assert_eq!(status, Status::AbortTime);
}
