//! Sample statistics: location, robust scale, covariance, correlation.
//!
//! Empty inputs produce `NaN` rather than an error so these helpers can be
//! used inside Monte-Carlo loops where empty selections are expected.

use nalgebra::DMatrix;
pub use pz_core::quantile_linear_sorted;
use statrs::distribution::{ContinuousCDF, Normal};

/// Arithmetic mean; `NaN` for empty input.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Variance with `ddof` delta degrees of freedom; `NaN` if `len <= ddof`.
pub fn variance(xs: &[f64], ddof: usize) -> f64 {
    if xs.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - ddof) as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub fn std_dev(xs: &[f64], ddof: usize) -> f64 {
    variance(xs, ddof).sqrt()
}

/// Quantile via sorting + linear interpolation.
pub fn quantile_linear(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut v = data.to_vec();
    v.sort_by(f64::total_cmp);
    quantile_linear_sorted(&v, q)
}

/// Median.
pub fn median(data: &[f64]) -> f64 {
    quantile_linear(data, 0.5)
}

/// Median absolute deviation around the median (unscaled).
pub fn median_abs_deviation(data: &[f64]) -> f64 {
    let m = median(data);
    let dev: Vec<f64> = data.iter().map(|x| (x - m).abs()).collect();
    median(&dev)
}

/// MAD scaled to a normal-consistent standard deviation, `MAD / Phi^-1(3/4)`.
pub fn scaled_mad(data: &[f64]) -> f64 {
    median_abs_deviation(data) / Normal::standard().inverse_cdf(0.75)
}

/// Sample covariance (`N - 1`) of row observations over `dim` variables.
///
/// Returns `None` with fewer than two observations.
pub fn sample_covariance(rows: &[Vec<f64>], dim: usize) -> Option<DMatrix<f64>> {
    if rows.len() < 2 {
        return None;
    }
    let n = rows.len() as f64;
    let mut mu = vec![0.0; dim];
    for row in rows {
        for (m, x) in mu.iter_mut().zip(row) {
            *m += x;
        }
    }
    for m in mu.iter_mut() {
        *m /= n;
    }

    let mut cov = DMatrix::<f64>::zeros(dim, dim);
    for row in rows {
        for i in 0..dim {
            let di = row[i] - mu[i];
            for j in i..dim {
                cov[(i, j)] += di * (row[j] - mu[j]);
            }
        }
    }
    for i in 0..dim {
        for j in i..dim {
            let v = cov[(i, j)] / (n - 1.0);
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }
    Some(cov)
}

/// Pearson correlation of row observations over `dim` variables.
///
/// Variables with zero variance get `NaN` rows and columns.
pub fn correlation_matrix(rows: &[Vec<f64>], dim: usize) -> DMatrix<f64> {
    let Some(cov) = sample_covariance(rows, dim) else {
        return DMatrix::from_element(dim, dim, f64::NAN);
    };
    let sd: Vec<f64> = (0..dim).map(|i| cov[(i, i)].sqrt()).collect();
    DMatrix::from_fn(dim, dim, |i, j| {
        if sd[i] > 0.0 && sd[j] > 0.0 {
            if i == j { 1.0 } else { cov[(i, j)] / (sd[i] * sd[j]) }
        } else {
            f64::NAN
        }
    })
}
