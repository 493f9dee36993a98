//! Covariance-weighted chi-square validation of calibrated observables.
//!
//! Observables are concatenated angular power spectra. A
//! [`DataVectorLayout`] fixes where each bin pair's spectrum lives in the
//! data vector and which multipoles survive the per-bin [`ScaleCut`]s. The
//! chi-square of each realization's residual against a reference vector is
//! then evaluated in the eigenbasis of the masked covariance:
//!
//! ```text
//! chi2 = sum_k (v_k . Delta)^2 / lambda_k / dof,   dof = unmasked - discarded
//! ```
//!
//! Eigenmodes with `lambda_k <= tolerance` are discarded rather than
//! inverted, so rank-deficient covariances are scored on their support.

use std::ops::Range;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use pz_core::{ComovingDistance, Degeneracy, Error, PipelineConfig, Result, SampleKind, TomographicBins};
use pz_prob::mvn::symmetrize;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibrate::CalibrationStrategy;
use crate::parallel;

/// Lowest multipole edge of the default binning.
pub const DEFAULT_ELL_MIN: f64 = 20.0;
/// Highest multipole edge of the default binning.
pub const DEFAULT_ELL_MAX: f64 = 2000.0;
/// Number of default multipole bins.
pub const DEFAULT_ELL_BINS: usize = 20;

/// Geometric centres of `n` log-spaced multipole bins on `[ell_min, ell_max]`.
pub fn log_ell_bins(ell_min: f64, ell_max: f64, n: usize) -> Result<Vec<f64>> {
    if !(ell_min > 0.0) || !(ell_max > ell_min) || !ell_max.is_finite() || n == 0 {
        return Err(Error::Configuration(format!(
            "need 0 < ell_min < ell_max and n > 0, got {ell_min}, {ell_max}, {n}"
        )));
    }
    let ratio = (ell_max / ell_min).ln() / n as f64;
    let edges: Vec<f64> = (0..=n).map(|k| ell_min * (ratio * k as f64).exp()).collect();
    Ok(edges.windows(2).map(|w| (w[0] * w[1]).sqrt()).collect())
}

// ---------------------------------------------------------------------------
// Scale cuts
// ---------------------------------------------------------------------------

/// Per-bin maximum multipole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleCut {
    ell_max: Vec<f64>,
}

impl ScaleCut {
    /// Wavenumber threshold in `1/Mpc` for a sample, given `h`.
    ///
    /// Lens (clustering) spectra are cut at `0.1 h`; source (shear)
    /// spectra at `10 h`, which leaves them effectively uncut.
    pub fn k_max_for(sample: SampleKind, h: f64) -> f64 {
        match sample {
            SampleKind::Lens => 0.1 * h,
            SampleKind::Source => 10.0 * h,
        }
    }

    /// `ell_max = k_max * chi(z) - 1/2` for each redshift.
    pub fn from_redshifts(k_max: f64, z: &[f64], distance: &dyn ComovingDistance) -> Result<Self> {
        if !(k_max > 0.0) || !k_max.is_finite() {
            return Err(Error::Configuration(format!("k_max must be finite and > 0, got {k_max}")));
        }
        Self::from_ell_max(z.iter().map(|&z| k_max * distance.comoving_distance(z) - 0.5).collect())
    }

    /// Cuts anchored at each bin's lower edge.
    pub fn from_lower_edges(k_max: f64, bins: &TomographicBins, distance: &dyn ComovingDistance) -> Result<Self> {
        Self::from_redshifts(k_max, bins.lower_edges(), distance)
    }

    /// Externally supplied cutoffs.
    pub fn from_ell_max(ell_max: Vec<f64>) -> Result<Self> {
        if let Some(b) = ell_max.iter().position(|v| v.is_nan()) {
            return Err(Error::Configuration(format!("bin {b}: ell_max is NaN")));
        }
        Ok(Self { ell_max })
    }

    /// Cutoff per bin.
    pub fn ell_max(&self) -> &[f64] {
        &self.ell_max
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.ell_max.len()
    }
}

// ---------------------------------------------------------------------------
// Data-vector layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum BlockShape {
    /// Upper triangle `i <= j` of `n x n`
    Auto { n: usize },
    /// Full `n_a x n_b`
    Cross { n_a: usize, n_b: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SpectrumBlock {
    shape: BlockShape,
    offset: usize,
    included: Vec<bool>,
    cut_a: Vec<f64>,
    cut_b: Vec<f64>,
}

impl SpectrumBlock {
    fn pairs(&self) -> usize {
        self.included.len()
    }

    fn pair_index(&self, i: usize, j: usize) -> Option<(usize, usize, usize)> {
        match self.shape {
            BlockShape::Auto { n } => {
                let (i, j) = if i <= j { (i, j) } else { (j, i) };
                (j < n).then_some((i * n + j - i * (i + 1) / 2, i, j))
            }
            BlockShape::Cross { n_a, n_b } => (i < n_a && j < n_b).then_some((i * n_b + j, i, j)),
        }
    }

    fn for_each_pair(&self, mut f: impl FnMut(usize, usize, usize)) {
        match self.shape {
            BlockShape::Auto { n } => {
                for i in 0..n {
                    for j in i..n {
                        f(i * n + j - i * (i + 1) / 2, i, j);
                    }
                }
            }
            BlockShape::Cross { n_a, n_b } => {
                for i in 0..n_a {
                    for j in 0..n_b {
                        f(i * n_b + j, i, j);
                    }
                }
            }
        }
    }
}

/// Concatenated spectrum blocks sharing one multipole binning.
///
/// Auto blocks order pairs as the upper triangle (`i <= j`, row by row);
/// cross blocks as `i * n_b + j`. Every pair keeps its slot even when
/// excluded; excluded slots are masked out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataVectorLayout {
    ell: Vec<f64>,
    blocks: Vec<SpectrumBlock>,
}

impl DataVectorLayout {
    /// Empty layout over multipoles `ell`.
    pub fn new(ell: Vec<f64>) -> Result<Self> {
        if ell.is_empty() || ell.iter().any(|v| !v.is_finite()) {
            return Err(Error::Configuration("ell must be non-empty and finite".to_string()));
        }
        Ok(Self { ell, blocks: Vec::new() })
    }

    /// Layout over the default 20 log bins on `[20, 2000]`.
    pub fn with_default_ell() -> Result<Self> {
        Self::new(log_ell_bins(DEFAULT_ELL_MIN, DEFAULT_ELL_MAX, DEFAULT_ELL_BINS)?)
    }

    /// Append an auto-spectrum block; `diagonal_only` keeps only `i == j`.
    pub fn with_auto(mut self, cut: &ScaleCut, diagonal_only: bool) -> Self {
        let n = cut.n_bins();
        let shape = BlockShape::Auto { n };
        let mut block = SpectrumBlock {
            shape,
            offset: self.len(),
            included: vec![false; n * (n + 1) / 2],
            cut_a: cut.ell_max.clone(),
            cut_b: cut.ell_max.clone(),
        };
        let mut included = std::mem::take(&mut block.included);
        block.for_each_pair(|k, i, j| included[k] = !diagonal_only || i == j);
        block.included = included;
        self.blocks.push(block);
        self
    }

    /// Append a cross-spectrum block keeping pairs where `keep(i, j)`.
    pub fn with_cross(mut self, cut_a: &ScaleCut, cut_b: &ScaleCut, keep: impl Fn(usize, usize) -> bool) -> Self {
        let (n_a, n_b) = (cut_a.n_bins(), cut_b.n_bins());
        let mut block = SpectrumBlock {
            shape: BlockShape::Cross { n_a, n_b },
            offset: self.len(),
            included: vec![false; n_a * n_b],
            cut_a: cut_a.ell_max.clone(),
            cut_b: cut_b.ell_max.clone(),
        };
        let mut included = std::mem::take(&mut block.included);
        block.for_each_pair(|k, i, j| included[k] = keep(i, j));
        block.included = included;
        self.blocks.push(block);
        self
    }

    /// Multipoles per spectrum.
    pub fn ell(&self) -> &[f64] {
        &self.ell
    }

    /// Number of blocks.
    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total data-vector length.
    pub fn len(&self) -> usize {
        self.blocks.last().map_or(0, |b| b.offset + b.pairs() * self.ell.len())
    }

    /// True if no block has been added.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Range of `block` in the data vector.
    pub fn block_range(&self, block: usize) -> Option<Range<usize>> {
        self.blocks.get(block).map(|b| b.offset..b.offset + b.pairs() * self.ell.len())
    }

    /// Range of pair `(i, j)` of `block`; auto blocks accept either order.
    pub fn slot(&self, block: usize, i: usize, j: usize) -> Option<Range<usize>> {
        let b = self.blocks.get(block)?;
        let (k, _, _) = b.pair_index(i, j)?;
        let start = b.offset + k * self.ell.len();
        Some(start..start + self.ell.len())
    }

    /// Whether pair `(i, j)` of `block` is part of the data vector.
    pub fn is_included(&self, block: usize, i: usize, j: usize) -> bool {
        self.blocks
            .get(block)
            .and_then(|b| b.pair_index(i, j).map(|(k, _, _)| b.included[k]))
            .unwrap_or(false)
    }

    /// Write `spectrum` into the slot of pair `(i, j)` of `block`.
    pub fn insert(&self, data: &mut [f64], block: usize, i: usize, j: usize, spectrum: &[f64]) -> Result<()> {
        pz_core::ensure_len("data vector", self.len(), data.len())?;
        pz_core::ensure_len("spectrum", self.ell.len(), spectrum.len())?;
        let range = self
            .slot(block, i, j)
            .ok_or_else(|| Error::Configuration(format!("block {block} has no pair ({i}, {j})")))?;
        data[range].copy_from_slice(spectrum);
        Ok(())
    }

    /// Keep entries of included pairs with `ell < min(cut_a[i], cut_b[j])`.
    pub fn mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.len()];
        let n_ell = self.ell.len();
        for b in &self.blocks {
            b.for_each_pair(|k, i, j| {
                if !b.included[k] {
                    return;
                }
                let cut = b.cut_a[i].min(b.cut_b[j]);
                let start = b.offset + k * n_ell;
                for (m, &l) in mask[start..start + n_ell].iter_mut().zip(&self.ell) {
                    *m = l < cut;
                }
            });
        }
        mask
    }
}

/// True when lens bin `i` lies in front of source bin `j` (midpoint order).
pub fn lens_in_front(lens: &TomographicBins, source: &TomographicBins, i: usize, j: usize) -> bool {
    let mid = |e: &[f64], k: usize| 0.5 * (e[k] + e[k + 1]);
    i < lens.n_bins() && j < source.n_bins() && mid(lens.edges(), i) < mid(source.edges(), j)
}

// ---------------------------------------------------------------------------
// Chi-square
// ---------------------------------------------------------------------------

/// How the masked covariance is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChiSquareMode {
    /// Eigen-decomposition of the full masked covariance.
    #[default]
    Full,
    /// Variances only.
    Diagonal,
}

/// Chi-square settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChiSquareConfig {
    /// Inversion mode
    pub mode: ChiSquareMode,
    /// Eigenvalues (or variances) at or below this are discarded
    pub eigen_tolerance: f64,
    /// Worker threads (0 = rayon global pool)
    pub n_threads: usize,
}

impl Default for ChiSquareConfig {
    fn default() -> Self {
        Self { mode: ChiSquareMode::Full, eigen_tolerance: 0.0, n_threads: 0 }
    }
}

impl From<&PipelineConfig> for ChiSquareConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self { n_threads: config.n_threads, ..Self::default() }
    }
}

/// Reduced chi-square per realization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    /// `chi2 / dof` per realization (NaN when `dof == 0`)
    pub values: Vec<f64>,
    /// Degrees of freedom
    pub dof: usize,
    /// Unmasked entries
    pub unmasked: usize,
    /// Discarded eigenmodes (or variances)
    pub discarded_modes: usize,
    /// Set when modes were discarded
    pub degeneracy: Option<Degeneracy>,
}

/// Masked covariance, decomposed once and reused across observables.
#[derive(Debug, Clone)]
pub struct MaskedPrecision {
    len: usize,
    indices: Vec<usize>,
    /// Kept eigenvectors as rows (`dof x unmasked`)
    projection: DMatrix<f64>,
    precision: Vec<f64>,
    discarded: usize,
    n_threads: usize,
}

impl MaskedPrecision {
    /// Decompose `covariance` restricted to `mask`.
    pub fn new(covariance: &DMatrix<f64>, mask: &[bool], config: &ChiSquareConfig) -> Result<Self> {
        if covariance.nrows() != mask.len() || covariance.ncols() != mask.len() {
            return Err(Error::Configuration(format!(
                "covariance is {}x{}, mask has {} entries",
                covariance.nrows(),
                covariance.ncols(),
                mask.len()
            )));
        }
        let indices: Vec<usize> = mask.iter().enumerate().filter(|(_, m)| **m).map(|(k, _)| k).collect();
        let m = indices.len();
        let masked = DMatrix::from_fn(m, m, |a, b| covariance[(indices[a], indices[b])]);
        if masked.iter().any(|v| !v.is_finite()) {
            return Err(Error::Computation("masked covariance is not finite".to_string()));
        }

        let tol = config.eigen_tolerance;
        let (projection, precision) = match config.mode {
            ChiSquareMode::Full => {
                let eig = SymmetricEigen::new(symmetrize(&masked));
                let keep: Vec<usize> = (0..m).filter(|&k| eig.eigenvalues[k] > tol).collect();
                let projection = DMatrix::from_fn(keep.len(), m, |r, c| eig.eigenvectors[(c, keep[r])]);
                let precision = keep.iter().map(|&k| 1.0 / eig.eigenvalues[k]).collect();
                (projection, precision)
            }
            ChiSquareMode::Diagonal => {
                let keep: Vec<usize> = (0..m).filter(|&k| masked[(k, k)] > tol).collect();
                let projection = DMatrix::from_fn(keep.len(), m, |r, c| if c == keep[r] { 1.0 } else { 0.0 });
                let precision = keep.iter().map(|&k| 1.0 / masked[(k, k)]).collect();
                (projection, precision)
            }
        };
        let discarded = m - projection.nrows();
        if discarded > 0 {
            tracing::warn!(unmasked = m, discarded, mode = ?config.mode, "discarding non-positive covariance modes");
        }
        Ok(Self { len: mask.len(), indices, projection, precision, discarded, n_threads: config.n_threads })
    }

    /// Degrees of freedom.
    pub fn dof(&self) -> usize {
        self.precision.len()
    }

    /// Unmasked entries.
    pub fn unmasked(&self) -> usize {
        self.indices.len()
    }

    /// Discarded modes.
    pub fn discarded_modes(&self) -> usize {
        self.discarded
    }

    /// Reduced chi-square of every row of `observables` against `reference`.
    pub fn evaluate(&self, observables: &[Vec<f64>], reference: &[f64]) -> Result<ChiSquareResult> {
        pz_core::ensure_len("reference", self.len, reference.len())?;
        for (r, row) in observables.iter().enumerate() {
            pz_core::ensure_len(&format!("observable {r}"), reference.len(), row.len())?;
        }

        let dof = self.dof();
        let values = parallel::install(self.n_threads, || {
            Ok(observables
                .par_iter()
                .map(|row| {
                    if dof == 0 {
                        return f64::NAN;
                    }
                    let delta = DVector::from_iterator(
                        self.indices.len(),
                        self.indices.iter().map(|&k| row[k] - reference[k]),
                    );
                    let p = &self.projection * delta;
                    let chi2: f64 = p.iter().zip(&self.precision).map(|(x, w)| x * x * w).sum();
                    chi2 / dof as f64
                })
                .collect::<Vec<_>>())
        })?;

        Ok(ChiSquareResult {
            values,
            dof,
            unmasked: self.unmasked(),
            discarded_modes: self.discarded,
            degeneracy: (self.discarded > 0).then_some(Degeneracy::SingularCovariance),
        })
    }
}

/// Reduced chi-square of each realization's residual against `reference`.
pub fn chi_square(
    observables: &[Vec<f64>],
    reference: &[f64],
    covariance: &DMatrix<f64>,
    mask: &[bool],
    config: &ChiSquareConfig,
) -> Result<ChiSquareResult> {
    MaskedPrecision::new(covariance, mask, config)?.evaluate(observables, reference)
}

/// Chi-square of one calibration strategy's observables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyChiSquare {
    /// Strategy
    pub strategy: CalibrationStrategy,
    /// Result
    pub result: ChiSquareResult,
}

/// One chi-square array per strategy, sharing one covariance decomposition.
pub fn validate_strategies(
    runs: &[(CalibrationStrategy, Vec<Vec<f64>>)],
    reference: &[f64],
    covariance: &DMatrix<f64>,
    mask: &[bool],
    config: &ChiSquareConfig,
) -> Result<Vec<StrategyChiSquare>> {
    let start = std::time::Instant::now();
    let precision = MaskedPrecision::new(covariance, mask, config)?;
    let out = runs
        .iter()
        .map(|(strategy, observables)| {
            let result = precision.evaluate(observables, reference)?;
            tracing::debug!(strategy = ?strategy, realizations = result.values.len(), dof = result.dof, "chi-square");
            Ok(StrategyChiSquare { strategy: *strategy, result })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(
        strategies = out.len(),
        unmasked = precision.unmasked(),
        dof = precision.dof(),
        wall_s = start.elapsed().as_secs_f64(),
        "validation complete"
    );
    Ok(out)
}
