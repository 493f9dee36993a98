//! Geometric-mean combination of two independently estimated ensembles.

use pz_core::{Ensemble, EnsembleCube, Error, RedshiftGrid, Result};

/// Per realization `sqrt(max(a * b, 0))`, renormalized; averages recomputed.
///
/// Both cubes must share bins, realizations and grid.
pub fn hybrid(a: &EnsembleCube, b: &EnsembleCube, grid: &RedshiftGrid) -> Result<EnsembleCube> {
    if a.n_bins() != b.n_bins() || a.realizations() != b.realizations() {
        return Err(Error::Configuration(format!(
            "hybrid: shapes differ ({} bins x {} realizations vs {} x {})",
            a.n_bins(),
            a.realizations(),
            b.n_bins(),
            b.realizations()
        )));
    }
    a.validate(grid)?;
    b.validate(grid)?;

    let mut zeroed = 0usize;
    let bins = a
        .bins
        .iter()
        .zip(&b.bins)
        .map(|(ea, eb)| {
            let data = ea
                .data
                .iter()
                .zip(&eb.data)
                .map(|(ca, cb)| {
                    let mut curve: Vec<f64> = ca.iter().zip(cb).map(|(x, y)| (x * y).max(0.0).sqrt()).collect();
                    if !grid.normalize(&mut curve) {
                        zeroed += 1;
                    }
                    curve
                })
                .collect();
            Ensemble::from_realizations(data, grid)
        })
        .collect::<Result<Vec<_>>>()?;

    if zeroed > 0 {
        tracing::warn!(zeroed, "hybrid realizations without overlap were zero-filled");
    }
    EnsembleCube::new(bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube(curves: Vec<Vec<f64>>, grid: &RedshiftGrid) -> EnsembleCube {
        EnsembleCube::new(vec![Ensemble::from_realizations(curves, grid).unwrap()]).unwrap()
    }

    #[test]
    fn test_hybrid_of_identical_is_identity() {
        let g = RedshiftGrid::linspace(0.0, 1.0, 4).unwrap();
        let mut c = vec![0.0, 1.0, 2.0, 1.0, 0.0];
        g.normalize(&mut c);
        let a = cube(vec![c.clone()], &g);
        let h = hybrid(&a, &a, &g).unwrap();
        for (x, y) in h.curve(0, 0).iter().zip(&c) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_hybrid_of_overlapping_gaussians() {
        let g = RedshiftGrid::linspace(0.0, 3.0, 600).unwrap();
        let gauss = |mu: f64| {
            let mut y: Vec<f64> = g.points().iter().map(|z| (-0.5 * ((z - mu) / 0.2).powi(2)).exp()).collect();
            g.normalize(&mut y);
            y
        };
        let (a, b) = (gauss(1.0), gauss(1.2));
        let h = hybrid(&cube(vec![a.clone()], &g), &cube(vec![b.clone()], &g), &g).unwrap();

        let mut expected: Vec<f64> = a.iter().zip(&b).map(|(x, y)| (x * y).sqrt()).collect();
        g.normalize(&mut expected);
        for (x, y) in h.curve(0, 0).iter().zip(&expected) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
        // geometric mean of equal-width Gaussians sits halfway with the same width
        let mid = gauss(1.1);
        for (x, y) in h.curve(0, 0).iter().zip(&mid) {
            assert_relative_eq!(*x, *y, epsilon = 1e-9);
        }
        assert_relative_eq!(g.integrate(h.curve(0, 0)), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hybrid_disjoint_support_is_zero() {
        let g = RedshiftGrid::linspace(0.0, 1.0, 4).unwrap();
        let a = cube(vec![vec![1.0, 1.0, 0.0, 0.0, 0.0]], &g);
        let b = cube(vec![vec![0.0, 0.0, 0.0, 1.0, 1.0]], &g);
        let h = hybrid(&a, &b, &g).unwrap();
        assert!(h.bins[0].is_zero());
    }

    #[test]
    fn test_hybrid_shape_mismatch() {
        let g = RedshiftGrid::linspace(0.0, 1.0, 4).unwrap();
        let a = cube(vec![vec![0.0; 5]], &g);
        let b = cube(vec![vec![0.0; 5], vec![0.0; 5]], &g);
        assert!(matches!(hybrid(&a, &b, &g), Err(Error::Configuration(_))));
    }
}
