//! Interpolating cubic spline with not-a-knot end conditions.
//!
//! The third derivative is continuous across the second and penultimate
//! knots, so any cubic polynomial is reproduced exactly. Evaluation outside
//! the knot range extrapolates with the end segments' polynomials.
//!
//! Fewer than four knots degrade gracefully: three knots give the
//! interpolating parabola, two give the straight line.

use pz_core::{Error, Result};

/// Piecewise cubic interpolant stored as knot values plus second derivatives.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit a not-a-knot spline through `(x, y)`.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        let n = x.len();
        if n < 2 {
            return Err(Error::Configuration("CubicSpline requires at least 2 knots".into()));
        }
        if y.len() != n {
            return Err(Error::Configuration(format!(
                "CubicSpline: x length ({}) != y length ({})",
                n,
                y.len()
            )));
        }
        for i in 0..n {
            if !x[i].is_finite() || !y[i].is_finite() {
                return Err(Error::Configuration(format!(
                    "CubicSpline: knot {} has non-finite value (x={}, y={})",
                    i, x[i], y[i]
                )));
            }
        }
        for i in 1..n {
            if x[i] <= x[i - 1] {
                return Err(Error::Configuration(format!(
                    "CubicSpline: x must be strictly increasing, but x[{}]={} >= x[{}]={}",
                    i - 1,
                    x[i - 1],
                    i,
                    x[i]
                )));
            }
        }

        let m = second_derivatives(x, y);
        Ok(Self { x: x.to_vec(), y: y.to_vec(), m })
    }

    /// Evaluate at `t`, extrapolating beyond the end knots.
    pub fn evaluate(&self, t: f64) -> f64 {
        let i = self.find_segment(t);
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let h = x1 - x0;
        let a = x1 - t;
        let b = t - x0;
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        m0 * a * a * a / (6.0 * h)
            + m1 * b * b * b / (6.0 * h)
            + (self.y[i] / h - m0 * h / 6.0) * a
            + (self.y[i + 1] / h - m1 * h / 6.0) * b
    }

    /// Evaluate at every point of `ts`.
    pub fn evaluate_many(&self, ts: &[f64]) -> Vec<f64> {
        ts.iter().map(|&t| self.evaluate(t)).collect()
    }

    /// Segment whose polynomial covers `t`; clamped to the end segments.
    fn find_segment(&self, t: f64) -> usize {
        let k = self.x.partition_point(|&xi| xi <= t);
        k.saturating_sub(1).min(self.x.len() - 2)
    }
}

fn second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 2 {
        return vec![0.0; 2];
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let slope: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();
    if n == 3 {
        // Parabola: constant second derivative.
        let c = 2.0 * (slope[1] - slope[0]) / (x[2] - x[0]);
        return vec![c; 3];
    }

    // Unknowns M_1..M_{n-2}; M_0 and M_{n-1} eliminated by the not-a-knot conditions.
    let k = n - 2;
    let mut sub = vec![0.0; k];
    let mut diag = vec![0.0; k];
    let mut sup = vec![0.0; k];
    let mut rhs = vec![0.0; k];
    for r in 0..k {
        let i = r + 1;
        sub[r] = h[i - 1];
        diag[r] = 2.0 * (h[i - 1] + h[i]);
        sup[r] = h[i];
        rhs[r] = 6.0 * (slope[i] - slope[i - 1]);
    }
    let (h0, h1) = (h[0], h[1]);
    diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
    sup[0] = (h1 * h1 - h0 * h0) / h1;
    // n >= 4, so the first and last rows are distinct.
    let (ha, hb) = (h[n - 3], h[n - 2]);
    sub[k - 1] = (ha * ha - hb * hb) / ha;
    diag[k - 1] = (ha + hb) * (2.0 * ha + hb) / ha;

    let interior = thomas(&sub, &diag, &sup, &rhs);

    let mut m = vec![0.0; n];
    m[1..=k].copy_from_slice(&interior);
    m[0] = ((h0 + h1) * m[1] - h0 * m[2]) / h1;
    m[n - 1] = ((ha + hb) * m[n - 2] - hb * m[n - 3]) / ha;
    m
}

/// Tridiagonal solve (Thomas algorithm).
fn thomas(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = sup[i] / denom;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }
    let mut out = vec![0.0; n];
    out[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = d[i] - c[i] * out[i + 1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cubic(x: f64) -> f64 {
        x * x * x - 2.0 * x * x + 0.5 * x - 1.0
    }

    #[test]
    fn test_reproduces_cubic_including_extrapolation() {
        let x = [0.0, 0.3, 1.0, 1.2, 2.0, 3.5];
        let y: Vec<f64> = x.iter().map(|&v| cubic(v)).collect();
        let s = CubicSpline::new(&x, &y).unwrap();
        for t in [-0.5, 0.0, 0.15, 0.77, 1.1, 2.9, 3.5, 4.2] {
            assert_relative_eq!(s.evaluate(t), cubic(t), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_four_knots_reproduce_cubic() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|&v| cubic(v)).collect();
        let s = CubicSpline::new(&x, &y).unwrap();
        assert_relative_eq!(s.evaluate(1.5), cubic(1.5), epsilon = 1e-10);
        assert_relative_eq!(s.evaluate(-1.0), cubic(-1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_three_knots_parabola() {
        let x = [0.0, 1.0, 3.0];
        let y = [1.0, 2.0, 10.0]; // x^2 + 1
        let s = CubicSpline::new(&x, &y).unwrap();
        assert_relative_eq!(s.evaluate(2.0), 5.0, epsilon = 1e-12);
        assert_relative_eq!(s.evaluate(-1.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_two_knots_line() {
        let s = CubicSpline::new(&[0.0, 2.0], &[1.0, 5.0]).unwrap();
        assert_relative_eq!(s.evaluate(1.0), 3.0, epsilon = 1e-12);
        assert_relative_eq!(s.evaluate(3.0), 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_passes_through_knots() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.15).collect();
        let y: Vec<f64> = x.iter().map(|v| (-(v - 1.0) * (v - 1.0) / 0.2).exp()).collect();
        let s = CubicSpline::new(&x, &y).unwrap();
        for (xi, yi) in x.iter().zip(&y) {
            assert_relative_eq!(s.evaluate(*xi), *yi, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_knots() {
        assert!(CubicSpline::new(&[0.0], &[1.0]).is_err());
        assert!(CubicSpline::new(&[0.0, 1.0], &[1.0]).is_err());
        assert!(CubicSpline::new(&[0.0, 0.0, 1.0], &[1.0, 1.0, 1.0]).is_err());
        assert!(CubicSpline::new(&[0.0, f64::NAN], &[1.0, 1.0]).is_err());
    }
}
