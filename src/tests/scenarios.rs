//! The solver scenarios: boxes, certificates, the Klee-Minty cube, long
//! steps, and warm starts.

use faer::Col;
use rstest::rstest;

use super::{boxed_profit_lp, check_farkas, check_optimal, check_ray, solve};
use crate::lp::LinearProgram;
use crate::settings::{
    Algorithm, ObjSense, PricerSelection, RatioTesterSelection, Representation, ScalerSelection,
    Settings,
};
use crate::simplex::SimplexSolver;
use crate::{Status, E, INFTY};

fn base_settings() -> Settings {
    let mut s = Settings::default();
    s.scaler = ScalerSelection::Off;
    s
}

/// min x + y over the unit box: no rows at all.
fn unit_box_lp() -> LinearProgram {
    LinearProgram::new(
        ObjSense::Minimize,
        Col::from_fn(2, |_| 1.),
        0,
        &[],
        Col::zeros(0),
        Col::zeros(0),
        Col::from_fn(2, |_| 0.),
        Col::from_fn(2, |_| 1.),
    )
    .unwrap()
}

#[rstest]
fn box_lp_is_optimal_at_origin(
    #[values(
        PricerSelection::Dantzig,
        PricerSelection::ParMult,
        PricerSelection::Devex,
        PricerSelection::Steep,
        PricerSelection::Auto
    )]
    pricer: PricerSelection,
    #[values(
        RatioTesterSelection::Textbook,
        RatioTesterSelection::Harris,
        RatioTesterSelection::Fast,
        RatioTesterSelection::BoundFlipping
    )]
    tester: RatioTesterSelection,
) {
    let lp = unit_box_lp();
    let mut settings = base_settings();
    settings.pricer = pricer;
    settings.ratiotester = tester;

    let (status, sol, _) = solve(&lp, settings);
    assert_eq!(status, Status::Optimal);
    assert!(sol.objective.abs() < 1e-9);
    assert!(sol.primal[0].abs() < 1e-9);
    assert!(sol.primal[1].abs() < 1e-9);
    check_optimal(&lp, &sol, 1e-6);
}

#[rstest]
fn unbounded_direction_yields_a_ray(
    #[values(Algorithm::Enter, Algorithm::Leave)] algorithm: Algorithm,
) {
    // min -x, x >= 0.
    let lp = LinearProgram::new(
        ObjSense::Minimize,
        Col::from_fn(1, |_| -1.),
        0,
        &[],
        Col::zeros(0),
        Col::zeros(0),
        Col::from_fn(1, |_| 0.),
        Col::from_fn(1, |_| INFTY),
    )
    .unwrap();
    let mut settings = base_settings();
    settings.algorithm = algorithm;

    let (status, sol, _) = solve(&lp, settings);
    assert_eq!(status, Status::Unbounded);
    let ray = sol.ray.expect("unbounded status must carry a ray");
    check_ray(&lp, &ray, 1e-9);
    // For this problem the ray is the positive x axis; normalized, c^T r = -1.
    assert!(ray[0] > 0.);
    assert!((lp.obj()[0] * ray[0] / ray[0].abs() + 1.).abs() < 1e-9);
}

#[rstest]
fn contradictory_rows_yield_farkas(
    #[values(
        RatioTesterSelection::Harris,
        RatioTesterSelection::Fast,
        RatioTesterSelection::BoundFlipping
    )]
    tester: RatioTesterSelection,
) {
    // min 0 subject to x <= -1 and x >= 1 with x free.
    let lp = LinearProgram::new(
        ObjSense::Minimize,
        Col::from_fn(1, |_| 0.),
        2,
        &[(0, 0, 1.), (1, 0, 1.)],
        Col::from_fn(2, |i| [-INFTY, 1.][i]),
        Col::from_fn(2, |i| [-1., INFTY][i]),
        Col::from_fn(1, |_| -INFTY),
        Col::from_fn(1, |_| INFTY),
    )
    .unwrap();
    let mut settings = base_settings();
    settings.ratiotester = tester;

    let (status, sol, _) = solve(&lp, settings);
    assert_eq!(status, Status::Infeasible);
    let farkas = sol.farkas.expect("infeasible status must carry multipliers");
    check_farkas(&lp, &farkas, 1e-9);

    // The supported bound value is 2 for this pair of rows.
    let value: E = (0..2)
        .map(|i| {
            if farkas[i] > 0. {
                farkas[i] * lp.lhs()[i]
            } else {
                farkas[i] * lp.rhs()[i]
            }
        })
        .sum();
    assert!((value / value.abs() - 1.).abs() < 1e-9);
    assert!((value - 2. * farkas[1].abs()).abs() < 1e-9);
}

/// The dimension-3 Klee-Minty cube, with the last coordinate and the
/// objective rescaled so the optimum sits at (0, 0, 1) with objective 100.
fn klee_minty_lp() -> LinearProgram {
    LinearProgram::new(
        ObjSense::Maximize,
        Col::from_fn(3, |j| [1., 0.1, 100.][j]),
        3,
        &[
            (0, 0, 1.),
            (1, 0, 20.),
            (1, 1, 1.),
            (2, 0, 0.02),
            (2, 1, 0.002),
            (2, 2, 1.),
        ],
        Col::from_fn(3, |_| -INFTY),
        Col::from_fn(3, |i| [1., 100., 1.][i]),
        Col::from_fn(3, |_| 0.),
        Col::from_fn(3, |_| INFTY),
    )
    .unwrap()
}

#[rstest]
fn klee_minty_reaches_the_far_corner(
    #[values(PricerSelection::Dantzig, PricerSelection::Steep)] pricer: PricerSelection,
) {
    let lp = klee_minty_lp();
    let mut settings = base_settings();
    settings.algorithm = Algorithm::Enter;
    settings.pricer = pricer;
    settings.ratiotester = RatioTesterSelection::Fast;

    let (status, sol, stats) = solve(&lp, settings);
    assert_eq!(status, Status::Optimal);
    assert!((sol.objective - 100.).abs() < 1e-6, "objective {}", sol.objective);
    assert!(sol.primal[0].abs() < 1e-7);
    assert!(sol.primal[1].abs() < 1e-7);
    assert!((sol.primal[2] - 1.).abs() < 1e-7);
    check_optimal(&lp, &sol, 1e-6);

    if pricer == PricerSelection::Steep {
        assert!(stats.iterations <= 7, "steepest edge took {} iterations", stats.iterations);
    }
}

#[test]
fn bound_flipping_long_step_agrees_with_fast() {
    let lp = boxed_profit_lp(6, 2.5);

    let mut fast = base_settings();
    fast.ratiotester = RatioTesterSelection::Fast;
    let (status_fast, sol_fast, _) = solve(&lp, fast);
    assert_eq!(status_fast, Status::Optimal);

    let mut flipping = base_settings();
    flipping.ratiotester = RatioTesterSelection::BoundFlipping;
    let (status_flip, sol_flip, stats_flip) = solve(&lp, flipping);
    assert_eq!(status_flip, Status::Optimal);

    // Best take: the two most profitable columns fully, half of the next.
    assert!((sol_fast.objective - 4.6).abs() < 1e-6);
    assert!((sol_flip.objective - sol_fast.objective).abs() < 1e-6);
    check_optimal(&lp, &sol_flip, 1e-6);

    assert!(stats_flip.long_steps >= 1, "no long step was taken");
    assert!(stats_flip.bound_flips >= 1, "no bound was flipped");
}

#[test]
fn row_representation_is_accepted() {
    let lp = boxed_profit_lp(4, 1.5);
    let mut settings = base_settings();
    settings.representation = Representation::Row;
    settings.ratiotester = RatioTesterSelection::BoundFlipping;

    let (status, sol, _) = solve(&lp, settings);
    assert_eq!(status, Status::Optimal);
    check_optimal(&lp, &sol, 1e-6);
}

#[test]
fn warm_start_reuses_the_basis() {
    let lp = boxed_profit_lp(8, 2.5);
    let mut settings = base_settings();
    settings.ratiotester = RatioTesterSelection::Fast;

    let mut cold = SimplexSolver::with_logger(&lp, settings.clone(), crate::callback::Logger::silent());
    assert_eq!(cold.solve().unwrap(), Status::Optimal);
    let cold_iters = cold.stats().iterations;
    assert!(cold_iters >= 2, "cold start finished in {} iterations", cold_iters);
    let basis = cold.descriptor().clone();

    // Perturb the objective slightly; the optimal basis is unchanged.
    let perturbed = LinearProgram::new(
        lp.sense(),
        Col::from_fn(8, |j| lp.obj()[j] + if j % 2 == 0 { 1e-3 } else { -1e-3 }),
        1,
        &(0..8).map(|j| (0usize, j, 1.)).collect::<Vec<_>>(),
        Col::from_fn(1, |_| -INFTY),
        Col::from_fn(1, |_| 2.5),
        Col::from_fn(8, |_| 0.),
        Col::from_fn(8, |_| 1.),
    )
    .unwrap();

    let mut warm =
        SimplexSolver::with_logger(&perturbed, settings, crate::callback::Logger::silent());
    warm.set_basis(basis).unwrap();
    assert_eq!(warm.solve().unwrap(), Status::Optimal);

    assert_eq!(warm.stats().refactorizations, 1);
    assert!(
        warm.stats().iterations * 2 <= cold_iters,
        "warm start took {} iterations against {} cold",
        warm.stats().iterations,
        cold_iters
    );
    check_optimal(&perturbed, warm.solution().unwrap(), 1e-6);
}

#[test]
fn end_to_end_from_lp_format() {
    let text = "\
MINIMIZE
 obj: 2 x + 3 y
SUBJECT TO
 c1: x + y >= 4
 c2: x - y <= 2
BOUNDS
 x <= 10
 y <= 10
END
";
    let (lp, names) = crate::interface::read_str(text, ObjSense::Minimize).unwrap();
    assert_eq!(names.cols.len(), 2);

    let (status, sol, _) = solve(&lp, base_settings());
    assert_eq!(status, Status::Optimal);
    // The x - y <= 2 row caps the cheap variable: optimum at (3, 1).
    assert!((sol.objective - 9.).abs() < 1e-6, "objective {}", sol.objective);
    assert!((sol.primal[0] - 3.).abs() < 1e-6);
    assert!((sol.primal[1] - 1.).abs() < 1e-6);
    check_optimal(&lp, &sol, 1e-6);
}
