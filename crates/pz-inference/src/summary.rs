//! Moment summaries of ensemble cubes.
//!
//! One operator covers every (sample, label) combination: the caller passes
//! the sample kind and a free-form label as data.

use nalgebra::DMatrix;
use pz_core::{EnsembleCube, Error, RedshiftGrid, Result, SampleKind};
use pz_prob::stats::{correlation_matrix, sample_covariance, std_dev};
use serde::{Deserialize, Serialize};

/// Per-realization and average moments of an [`EnsembleCube`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    /// Sample kind
    pub sample: SampleKind,
    /// Free-form label (e.g. estimator and configuration name)
    pub label: String,
    /// Mean redshift `[realization][bin]`
    pub mu: Vec<Vec<f64>>,
    /// Dispersion `[realization][bin]`
    pub eta: Vec<Vec<f64>>,
    /// Mean of each bin's average curve
    pub average_mu: Vec<f64>,
    /// Dispersion of each bin's average curve
    pub average_eta: Vec<f64>,
    /// `std(mu) / (1 + average_mu)` per bin (population std)
    pub sigma_mu: Vec<f64>,
    /// `std(eta) / (1 + average_mu)` per bin (population std)
    pub sigma_eta: Vec<f64>,
    /// Bin-bin correlation of `mu`
    pub rho_mu: Vec<Vec<f64>>,
    /// Bin-bin correlation of `eta`
    pub rho_eta: Vec<Vec<f64>>,
}

impl EnsembleSummary {
    /// Summarize `cube` on `grid`.
    pub fn from_cube(sample: SampleKind, label: impl Into<String>, cube: &EnsembleCube, grid: &RedshiftGrid) -> Result<Self> {
        cube.validate(grid)?;
        let n_bins = cube.n_bins();
        let realizations = cube.realizations();

        let mut mu = vec![vec![0.0; n_bins]; realizations];
        let mut eta = vec![vec![0.0; n_bins]; realizations];
        for b in 0..n_bins {
            for r in 0..realizations {
                let curve = cube.curve(b, r);
                mu[r][b] = grid.mean(curve);
                eta[r][b] = grid.dispersion(curve);
            }
        }
        let average_mu: Vec<f64> = cube.bins.iter().map(|e| grid.mean(&e.average)).collect();
        let average_eta: Vec<f64> = cube.bins.iter().map(|e| grid.dispersion(&e.average)).collect();

        let column = |rows: &[Vec<f64>], b: usize| rows.iter().map(|row| row[b]).collect::<Vec<_>>();
        let sigma_mu = (0..n_bins).map(|b| std_dev(&column(&mu, b), 0) / (1.0 + average_mu[b])).collect();
        let sigma_eta = (0..n_bins).map(|b| std_dev(&column(&eta, b), 0) / (1.0 + average_mu[b])).collect();

        let rho_mu = to_rows(&correlation_matrix(&mu, n_bins));
        let rho_eta = to_rows(&correlation_matrix(&eta, n_bins));

        let label = label.into();
        tracing::debug!(sample = ?sample, label = %label, bins = n_bins, realizations, "ensemble summarized");
        Ok(Self { sample, label, mu, eta, average_mu, average_eta, sigma_mu, sigma_eta, rho_mu, rho_eta })
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.average_mu.len()
    }

    /// Sample covariance (`N - 1`) of per-realization means across bins.
    ///
    /// Zero with fewer than two realizations.
    pub fn mu_covariance(&self) -> DMatrix<f64> {
        sample_covariance(&self.mu, self.n_bins()).unwrap_or_else(|| DMatrix::zeros(self.n_bins(), self.n_bins()))
    }

    /// Sample covariance (`N - 1`) of per-realization dispersions across bins.
    pub fn eta_covariance(&self) -> DMatrix<f64> {
        sample_covariance(&self.eta, self.n_bins()).unwrap_or_else(|| DMatrix::zeros(self.n_bins(), self.n_bins()))
    }
}

fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows()).map(|i| m.row(i).iter().copied().collect()).collect()
}

/// Truth moments per bin, optionally with the truth average curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthSummary {
    /// True mean redshift per bin
    pub mean: Vec<f64>,
    /// True dispersion per bin
    pub dispersion: Vec<f64>,
    /// True average density per bin (needed by Correct)
    pub average: Option<Vec<Vec<f64>>>,
}

impl TruthSummary {
    /// Explicit truth moments.
    pub fn new(mean: Vec<f64>, dispersion: Vec<f64>) -> Result<Self> {
        pz_core::ensure_len("truth dispersion", mean.len(), dispersion.len())?;
        Ok(Self { mean, dispersion, average: None })
    }

    /// Attach truth average curves.
    pub fn with_average(mut self, average: Vec<Vec<f64>>) -> Result<Self> {
        pz_core::ensure_len("truth average (bins)", self.mean.len(), average.len())?;
        self.average = Some(average);
        Ok(self)
    }

    /// Truth taken from the average curves of a truth ensemble.
    pub fn from_ensemble(summary: &EnsembleSummary, cube: &EnsembleCube) -> Result<Self> {
        if cube.n_bins() != summary.n_bins() {
            return Err(Error::Configuration(format!(
                "truth cube has {} bins, summary has {}",
                cube.n_bins(),
                summary.n_bins()
            )));
        }
        let average = cube.bins.iter().map(|e| e.average.clone()).collect();
        Self::new(summary.average_mu.clone(), summary.average_eta.clone())?.with_average(average)
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.mean.len()
    }
}
