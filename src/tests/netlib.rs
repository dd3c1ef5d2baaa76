//! Netlib checks, gated behind a local copy of the test set.
//!
//! Point `PIVOTERS_NETLIB` at a directory containing uncompressed netlib
//! MPS files (e.g. `afiro.mps`) and run with `--ignored` to enable.

use crate::settings::{ObjSense, RatioTesterSelection, Settings};
use crate::tests::{check_optimal, solve};
use crate::Status;

fn netlib_case(name: &str) -> Option<String> {
    let dir = std::env::var("PIVOTERS_NETLIB").ok()?;
    let path = format!("{}/{}.mps", dir, name);
    std::fs::read_to_string(path).ok()
}

#[test]
#[ignore = "requires a local netlib copy; set PIVOTERS_NETLIB"]
fn afiro_boundflipping_matches_fast() {
    let text = match netlib_case("afiro") {
        Some(text) => text,
        None => return,
    };
    let (lp, _names) = crate::interface::read_str(&text, ObjSense::Minimize).unwrap();

    let mut fast = Settings::default();
    fast.ratiotester = RatioTesterSelection::Fast;
    let (s1, sol1, _) = solve(&lp, fast);
    assert_eq!(s1, Status::Optimal);

    let mut flipping = Settings::default();
    flipping.ratiotester = RatioTesterSelection::BoundFlipping;
    let (s2, sol2, _) = solve(&lp, flipping);
    assert_eq!(s2, Status::Optimal);

    let reference = -464.753142;
    assert!(
        (sol1.objective - reference).abs() <= 1e-4 * reference.abs(),
        "fast objective {}",
        sol1.objective
    );
    assert!(
        (sol2.objective - sol1.objective).abs() <= 1e-6 * (1. + sol1.objective.abs()),
        "testers disagree: {} vs {}",
        sol1.objective,
        sol2.objective
    );
    check_optimal(&lp, &sol2, 1e-5);
}
