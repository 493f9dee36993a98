//! The shared redshift grid and density-curve primitives defined on it.
//!
//! Every density in the pipeline is sampled on one [`RedshiftGrid`]. Curves
//! are plain `&[f64]` slices whose length must equal [`RedshiftGrid::len`].

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Ordered, strictly increasing redshift sample points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct RedshiftGrid {
    points: Vec<f64>,
}

impl RedshiftGrid {
    /// `intervals + 1` evenly spaced points on `[z_min, z_max]`.
    pub fn linspace(z_min: f64, z_max: f64, intervals: usize) -> Result<Self> {
        if intervals == 0 {
            return Err(Error::Configuration("grid needs at least one interval".to_string()));
        }
        if !(z_min.is_finite() && z_max.is_finite() && z_max > z_min) {
            return Err(Error::Configuration(format!(
                "grid bounds must be finite with z_max > z_min, got [{z_min}, {z_max}]"
            )));
        }
        let step = (z_max - z_min) / intervals as f64;
        let mut points: Vec<f64> = (0..=intervals).map(|i| z_min + step * i as f64).collect();
        // Pin the endpoint exactly; accumulated rounding would otherwise leak into digitize.
        points[intervals] = z_max;
        Ok(Self { points })
    }

    /// Wrap explicit sample points.
    pub fn from_points(points: Vec<f64>) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::Configuration(format!(
                "grid needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|z| !z.is_finite()) {
            return Err(Error::Configuration("grid points must be finite".to_string()));
        }
        if points.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::Configuration(
                "grid points must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// Grid points.
    #[inline]
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: a valid grid has at least two points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First grid point.
    pub fn z_min(&self) -> f64 {
        self.points[0]
    }

    /// Last grid point.
    pub fn z_max(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    /// Fail unless `curve` is sampled on this grid.
    pub fn check(&self, what: &str, curve: &[f64]) -> Result<()> {
        crate::ensure_len(what, self.points.len(), curve.len())
    }

    /// Trapezoidal integral of `y` over the grid.
    pub fn integrate(&self, y: &[f64]) -> f64 {
        debug_assert_eq!(y.len(), self.points.len());
        self.points
            .windows(2)
            .zip(y.windows(2))
            .map(|(z, v)| 0.5 * (z[1] - z[0]) * (v[0] + v[1]))
            .sum()
    }

    /// Trapezoidal integral of `f(z) * y(z)`.
    pub fn integrate_weighted(&self, y: &[f64], f: impl Fn(f64) -> f64) -> f64 {
        debug_assert_eq!(y.len(), self.points.len());
        let mut acc = 0.0;
        for i in 1..self.points.len() {
            let (z0, z1) = (self.points[i - 1], self.points[i]);
            acc += 0.5 * (z1 - z0) * (f(z0) * y[i - 1] + f(z1) * y[i]);
        }
        acc
    }

    /// First moment `int z p(z) dz`.
    pub fn mean(&self, y: &[f64]) -> f64 {
        self.integrate_weighted(y, |z| z)
    }

    /// Dispersion `sqrt(int (z - mu)^2 p(z) dz)` around the first moment.
    pub fn dispersion(&self, y: &[f64]) -> f64 {
        let mu = self.mean(y);
        self.integrate_weighted(y, |z| (z - mu) * (z - mu)).max(0.0).sqrt()
    }

    /// Normalize `y` in place to unit integral.
    ///
    /// Returns `false` and zero-fills when the integral is not a positive
    /// finite number; never divides by zero.
    pub fn normalize(&self, y: &mut [f64]) -> bool {
        let mass = self.integrate(y);
        if mass.is_finite() && mass > 0.0 {
            for v in y.iter_mut() {
                *v /= mass;
            }
            true
        } else {
            y.fill(0.0);
            false
        }
    }

    /// Clip negatives to zero, then [`Self::normalize`].
    pub fn clip_and_normalize(&self, y: &mut [f64]) -> bool {
        for v in y.iter_mut() {
            if !(*v > 0.0) {
                *v = 0.0;
            }
        }
        self.normalize(y)
    }

    /// Grid index of the point at or below `z`.
    ///
    /// `z` in `[g_i, g_{i+1})` maps to `i`; `z >= z_max` maps to the last
    /// point; `z < z_min` (and NaN) maps to `None`.
    pub fn digitize(&self, z: f64) -> Option<usize> {
        let count = self.points.partition_point(|&g| g <= z);
        count.checked_sub(1)
    }

    /// True when `y` integrates to one within `tol` or is identically zero.
    pub fn is_density_or_zero(&self, y: &[f64], tol: f64) -> bool {
        if y.iter().all(|&v| v == 0.0) {
            return true;
        }
        y.iter().all(|v| v.is_finite()) && (self.integrate(y) - 1.0).abs() <= tol
    }
}

impl TryFrom<Vec<f64>> for RedshiftGrid {
    type Error = Error;

    fn try_from(points: Vec<f64>) -> Result<Self> {
        Self::from_points(points)
    }
}

impl From<RedshiftGrid> for Vec<f64> {
    fn from(grid: RedshiftGrid) -> Self {
        grid.points
    }
}
