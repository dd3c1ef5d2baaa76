//! LP scaling.
//!
//! Scalers compute positive row and column multipliers `R`, `C` so the
//! engine works on `A' = R A C`; solutions map back through the same
//! factors. Factors are rounded to powers of two so scaling introduces no
//! rounding error of its own.

use enum_dispatch::enum_dispatch;

use crate::lp::LinearProgram;
use crate::settings::ScalerSelection;
use crate::E;

/// Positive multipliers applied as `A' = R A C`.
#[derive(Debug, Clone)]
pub struct ScaleFactors {
    pub row: Vec<E>,
    pub col: Vec<E>,
}

impl ScaleFactors {
    pub fn identity(n_rows: usize, n_cols: usize) -> Self {
        Self {
            row: vec![1.; n_rows],
            col: vec![1.; n_cols],
        }
    }
}

#[enum_dispatch]
pub trait Scaler {
    /// Computes scale factors for the given LP.
    fn compute(&self, lp: &LinearProgram) -> ScaleFactors;
}

/// No scaling.
#[derive(Debug, Clone, Default)]
pub struct NoScaler;

impl Scaler for NoScaler {
    fn compute(&self, lp: &LinearProgram) -> ScaleFactors {
        ScaleFactors::identity(lp.n_rows(), lp.n_cols())
    }
}

/// Equilibrium scaling: divide by the largest magnitude per column, and per
/// row first when `both` is set.
#[derive(Debug, Clone)]
pub struct EquiliScaler {
    both: bool,
}

impl EquiliScaler {
    pub fn new(both: bool) -> Self {
        Self { both }
    }
}

impl Scaler for EquiliScaler {
    fn compute(&self, lp: &LinearProgram) -> ScaleFactors {
        let (m, n) = lp.dims();
        let mut f = ScaleFactors::identity(m, n);
        let mat = lp.paired();

        if self.both {
            for i in 0..m {
                let (_, vals) = mat.row(i);
                let max = vals.iter().fold(0., |acc: E, &v| acc.max(v.abs()));
                if max > 0. {
                    f.row[i] = round_pow2(1. / max);
                }
            }
        }
        for j in 0..n {
            let (rows, vals) = mat.col(j);
            let mut max: E = 0.;
            for (k, &i) in rows.iter().enumerate() {
                max = max.max((vals[k] * f.row[i]).abs());
            }
            if max > 0. {
                f.col[j] = round_pow2(1. / max);
            }
        }
        f
    }
}

/// Geometric-mean scaling over a fixed number of passes.
#[derive(Debug, Clone)]
pub struct GeoScaler {
    passes: usize,
}

impl GeoScaler {
    pub fn new(passes: usize) -> Self {
        Self { passes }
    }
}

impl Scaler for GeoScaler {
    fn compute(&self, lp: &LinearProgram) -> ScaleFactors {
        let (m, n) = lp.dims();
        let mut f = ScaleFactors::identity(m, n);
        let mat = lp.paired();

        for _ in 0..self.passes {
            for i in 0..m {
                let (cols, vals) = mat.row(i);
                let mut min = E::INFINITY;
                let mut max: E = 0.;
                for (k, &j) in cols.iter().enumerate() {
                    let v = (vals[k] * f.row[i] * f.col[j]).abs();
                    if v > 0. {
                        min = min.min(v);
                        max = max.max(v);
                    }
                }
                if max > 0. {
                    f.row[i] /= (min * max).sqrt();
                }
            }
            for j in 0..n {
                let (rows, vals) = mat.col(j);
                let mut min = E::INFINITY;
                let mut max: E = 0.;
                for (k, &i) in rows.iter().enumerate() {
                    let v = (vals[k] * f.row[i] * f.col[j]).abs();
                    if v > 0. {
                        min = min.min(v);
                        max = max.max(v);
                    }
                }
                if max > 0. {
                    f.col[j] /= (min * max).sqrt();
                }
            }
        }
        for r in f.row.iter_mut() {
            *r = round_pow2(*r);
        }
        for c in f.col.iter_mut() {
            *c = round_pow2(*c);
        }
        f
    }
}

/// The configured scaler strategies.
#[enum_dispatch(Scaler)]
pub enum Scalers {
    Off(NoScaler),
    Equili(EquiliScaler),
    Geo(GeoScaler),
}

impl Scalers {
    pub fn from_selection(selection: ScalerSelection) -> Self {
        match selection {
            ScalerSelection::Off => Scalers::Off(NoScaler),
            ScalerSelection::UniEqui => Scalers::Equili(EquiliScaler::new(false)),
            ScalerSelection::BiEqui => Scalers::Equili(EquiliScaler::new(true)),
            ScalerSelection::Geo1 => Scalers::Geo(GeoScaler::new(1)),
            ScalerSelection::Geo8 => Scalers::Geo(GeoScaler::new(8)),
        }
    }
}

/// Rounds a positive factor to the nearest power of two.
fn round_pow2(x: E) -> E {
    debug_assert!(x > 0.);
    (x.log2().round()).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ObjSense;
    use crate::INFTY;
    use faer::Col;

    fn lopsided_lp() -> LinearProgram {
        LinearProgram::new(
            ObjSense::Minimize,
            Col::from_fn(2, |_| 1.),
            2,
            &[(0, 0, 1000.), (0, 1, 2000.), (1, 0, 0.001), (1, 1, 0.004)],
            Col::from_fn(2, |_| -INFTY),
            Col::from_fn(2, |_| 1.),
            Col::from_fn(2, |_| 0.),
            Col::from_fn(2, |_| INFTY),
        )
        .unwrap()
    }

    fn scaled_range(lp: &LinearProgram, f: &ScaleFactors) -> (E, E) {
        let mat = lp.paired();
        let mut min = E::INFINITY;
        let mut max: E = 0.;
        for j in 0..lp.n_cols() {
            let (rows, vals) = mat.col(j);
            for (k, &i) in rows.iter().enumerate() {
                let v = (vals[k] * f.row[i] * f.col[j]).abs();
                min = min.min(v);
                max = max.max(v);
            }
        }
        (min, max)
    }

    #[test]
    fn test_factors_are_positive_powers_of_two() {
        let lp = lopsided_lp();
        for scaler in [
            Scalers::from_selection(ScalerSelection::BiEqui),
            Scalers::from_selection(ScalerSelection::Geo8),
        ] {
            let f = scaler.compute(&lp);
            for &v in f.row.iter().chain(f.col.iter()) {
                assert!(v > 0.);
                assert_eq!(v.log2().fract(), 0.);
            }
        }
    }

    #[test]
    fn test_equilibration_tames_the_range() {
        let lp = lopsided_lp();
        let (min0, max0) = scaled_range(&lp, &ScaleFactors::identity(2, 2));
        let f = Scalers::from_selection(ScalerSelection::BiEqui).compute(&lp);
        let (min1, max1) = scaled_range(&lp, &f);
        assert!(max1 / min1 < max0 / min0);
        assert!(max1 <= 2.0);
    }

    #[test]
    fn test_off_is_identity() {
        let lp = lopsided_lp();
        let f = Scalers::from_selection(ScalerSelection::Off).compute(&lp);
        assert!(f.row.iter().all(|&v| v == 1.));
        assert!(f.col.iter().all(|&v| v == 1.));
    }
}
