//! Symmetric Dirichlet sampling through normalized Gamma variates.

use pz_core::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Gamma};

/// `Dir(alpha, ..., alpha)` over `k` components.
#[derive(Debug, Clone)]
pub struct SymmetricDirichlet {
    k: usize,
    gamma: Gamma<f64>,
}

impl SymmetricDirichlet {
    /// Create a sampler; `alpha` must be positive and finite, `k >= 1`.
    pub fn new(alpha: f64, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Configuration("Dirichlet needs at least one component".to_string()));
        }
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(Error::Configuration(format!("Dirichlet alpha must be > 0, got {alpha}")));
        }
        let gamma = Gamma::new(alpha, 1.0)
            .map_err(|e| Error::Computation(format!("Gamma({alpha}, 1): {e}")))?;
        Ok(Self { k, gamma })
    }

    /// Draw one weight vector summing to one.
    ///
    /// Small concentrations can underflow every Gamma variate to zero; the
    /// limit of the distribution then puts all mass on one component, which
    /// is picked uniformly.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let mut w: Vec<f64> = (0..self.k).map(|_| self.gamma.sample(rng)).collect();
        let total: f64 = w.iter().sum();
        if total > 0.0 && total.is_finite() {
            for v in w.iter_mut() {
                *v /= total;
            }
        } else {
            w.fill(0.0);
            w[rng.random_range(0..self.k)] = 1.0;
        }
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_weights_sum_to_one() {
        let d = SymmetricDirichlet::new(0.25, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let w = d.sample(&mut rng);
            assert_eq!(w.len(), 4);
            assert!(w.iter().all(|&v| (0.0..=1.0).contains(&v)));
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_symmetric_mean() {
        let d = SymmetricDirichlet::new(1.0, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 20_000;
        let mut acc = [0.0; 3];
        for _ in 0..n {
            for (a, w) in acc.iter_mut().zip(d.sample(&mut rng)) {
                *a += w;
            }
        }
        for a in acc {
            assert_relative_eq!(a / n as f64, 1.0 / 3.0, epsilon = 0.01);
        }
    }

    #[test]
    fn test_tiny_alpha_degenerates_to_vertex() {
        let d = SymmetricDirichlet::new(1e-300, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let w = d.sample(&mut rng);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_eq!(w.iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SymmetricDirichlet::new(0.0, 3).is_err());
        assert!(SymmetricDirichlet::new(1.0, 0).is_err());
    }
}
