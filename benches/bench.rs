use faer::Col;

use pivoters::callback::Logger;
use pivoters::lp::LinearProgram;
use pivoters::settings::{ObjSense, RatioTesterSelection, ScalerSelection, Settings};
use pivoters::simplex::SimplexSolver;

fn main() {
    divan::main();
}

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

fn bench_lp(seed: u64, m: usize, n: usize) -> LinearProgram {
    let mut rng = XorShift(seed | 1);
    let mut entries = Vec::new();
    for j in 0..n {
        for i in 0..m {
            if rng.next_f64() < 0.2 {
                entries.push((i, j, 4. * rng.next_f64() - 2.));
            }
        }
    }
    let x0: Vec<f64> = (0..n).map(|_| rng.next_f64()).collect();
    let mut act = vec![0.; m];
    for &(i, j, v) in &entries {
        act[i] += v * x0[j];
    }
    LinearProgram::new(
        ObjSense::Minimize,
        Col::from_fn(n, |_| 2. * rng.next_f64() - 1.),
        m,
        &entries,
        Col::from_fn(m, |i| act[i] - 1.),
        Col::from_fn(m, |i| act[i] + 1.),
        Col::from_fn(n, |_| 0.),
        Col::from_fn(n, |_| 2.),
    )
    .unwrap()
}

#[divan::bench(args = ["fast", "boundflipping"])]
fn solve_random_lp(bencher: divan::Bencher, tester: &str) {
    let lp = bench_lp(7, 40, 80);
    let mut settings = Settings::default();
    settings.scaler = ScalerSelection::Off;
    settings.ratiotester = tester.parse::<RatioTesterSelection>().unwrap();

    bencher.bench_local(|| {
        let mut solver =
            SimplexSolver::with_logger(&lp, settings.clone(), Logger::silent());
        solver.solve().unwrap()
    });
}
