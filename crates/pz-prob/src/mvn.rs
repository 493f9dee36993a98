//! Multivariate normal sampling from an empirical (possibly singular) covariance.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use pz_core::{Error, Result};
use rand::Rng;
use rand_distr::StandardNormal;

/// `(P + P^T) / 2`.
#[inline]
pub fn symmetrize(p: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (p + p.transpose())
}

/// `N(mean, cov)` sampled as `mean + L z` with `L = V sqrt(max(Lambda, 0))`.
///
/// The eigen square root tolerates positive semi-definite and slightly
/// indefinite covariances; a zero covariance yields the mean exactly.
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    mean: DVector<f64>,
    factor: DMatrix<f64>,
}

impl MultivariateNormal {
    /// Build from a mean vector and covariance matrix.
    pub fn new(mean: &[f64], cov: &DMatrix<f64>) -> Result<Self> {
        let d = mean.len();
        if cov.nrows() != d || cov.ncols() != d {
            return Err(Error::Configuration(format!(
                "covariance shape {}x{} does not match mean length {d}",
                cov.nrows(),
                cov.ncols()
            )));
        }
        if mean.iter().any(|m| !m.is_finite()) || cov.iter().any(|c| !c.is_finite()) {
            return Err(Error::Computation("MVN parameters must be finite".to_string()));
        }

        let eig = SymmetricEigen::new(symmetrize(cov));
        let mut factor = eig.eigenvectors;
        for (j, &lam) in eig.eigenvalues.iter().enumerate() {
            let s = lam.max(0.0).sqrt();
            factor.column_mut(j).scale_mut(s);
        }
        Ok(Self { mean: DVector::from_column_slice(mean), factor })
    }

    /// Dimension.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Draw one sample.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z = DVector::<f64>::from_fn(self.dim(), |_, _| rng.sample(StandardNormal));
        (&self.mean + &self.factor * z).iter().copied().collect()
    }

    /// Draw `n` samples.
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|_| self.sample(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::sample_covariance;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_zero_covariance_returns_mean() {
        let mvn = MultivariateNormal::new(&[0.1, -0.2], &DMatrix::zeros(2, 2)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..5 {
            assert_eq!(mvn.sample(&mut rng), vec![0.1, -0.2]);
        }
    }

    #[test]
    fn test_empirical_moments() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 0.6, 0.6, 2.0]);
        let mvn = MultivariateNormal::new(&[1.0, -1.0], &cov).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let draws = mvn.sample_n(&mut rng, 20_000);
        let est = sample_covariance(&draws, 2).unwrap();
        assert_relative_eq!(est[(0, 0)], 1.0, epsilon = 0.05);
        assert_relative_eq!(est[(0, 1)], 0.6, epsilon = 0.05);
        assert_relative_eq!(est[(1, 1)], 2.0, epsilon = 0.1);
        let m0 = draws.iter().map(|d| d[0]).sum::<f64>() / draws.len() as f64;
        assert_relative_eq!(m0, 1.0, epsilon = 0.03);
    }

    #[test]
    fn test_singular_covariance_is_sampled() {
        // Rank one: both coordinates move together.
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let mvn = MultivariateNormal::new(&[0.0, 0.0], &cov).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let s = mvn.sample(&mut rng);
        assert_relative_eq!(s[0], s[1], epsilon = 1e-6);
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(MultivariateNormal::new(&[0.0], &DMatrix::zeros(2, 2)).is_err());
    }
}
