//! Clustered bootstrap estimation of tomographic redshift densities.
//!
//! For each bin and each realization the target and reference selections
//! are resampled with replacement, aggregated per SOM cluster, filtered to
//! clusters occupied by both draws, and the per-cluster true-redshift
//! histograms are averaged with the target cluster weights. The Stack
//! source instead sums per-galaxy photo-z likelihoods of the resampled
//! target records.
//!
//! Realization `r` of bin `b` draws from its own stream
//! `stream_rng(seed, b, r)`, so the ensemble is bit-identical for any
//! thread count.

use pz_core::{Degeneracy, Ensemble, EnsembleCube, Error, GalaxyBatch, PipelineConfig, RedshiftGrid, Result};
use pz_prob::stats::{median, scaled_mad};
use pz_prob::stream_rng;
use pz_som::ClusterMap;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::parallel;

/// Default number of bootstrap realizations per bin.
pub const DEFAULT_REALIZATIONS: usize = 100;

/// Default `sigma_z` of the Stack likelihood width `sigma_z * (1 + z_phot)`.
pub const DEFAULT_STACK_WIDTH: f64 = 0.05;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-record weight of the target population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetWeighting {
    /// Every record counts once (lens samples).
    #[default]
    Unweighted,
    /// `1 / sigma^2` shape-noise weights (source samples).
    InverseVariance,
}

/// Which true redshifts are histogrammed inside retained clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramSource {
    /// Reference spectroscopic redshifts (the DIR estimator).
    #[default]
    Reference,
    /// The target population's own true redshifts, weighted like the target.
    TargetTruth,
    /// Stacked Gaussian photo-z likelihoods `N(z_phot, sigma_z (1 + z_phot))`
    /// of the resampled target records, weighted like the target. Clusters
    /// only enter the diagnostics.
    Stack,
}

/// Bootstrap estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Realizations per bin
    pub realizations: usize,
    /// Master seed
    pub seed: u64,
    /// Target record weights
    pub target_weighting: TargetWeighting,
    /// Histogrammed redshifts
    pub histogram_source: HistogramSource,
    /// `sigma_z` of the Stack likelihoods
    pub stack_width: f64,
    /// Worker threads (0 = global rayon pool)
    pub n_threads: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            realizations: DEFAULT_REALIZATIONS,
            seed: 0,
            target_weighting: TargetWeighting::Unweighted,
            histogram_source: HistogramSource::Reference,
            stack_width: DEFAULT_STACK_WIDTH,
            n_threads: 0,
        }
    }
}

impl From<&PipelineConfig> for BootstrapConfig {
    /// Realizations, seed and threads from the pipeline; estimator choices default.
    fn from(config: &PipelineConfig) -> Self {
        Self { realizations: config.realizations, seed: config.seed, n_threads: config.n_threads, ..Self::default() }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Per-realization filter and representativeness diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RealizationDiagnostics {
    /// Clusters occupied by both resampled populations
    pub retained_clusters: usize,
    /// Fraction of resampled target weight inside retained clusters.
    ///
    /// Measured in target weight, so under inverse-variance weighting this is
    /// a weighted mass fraction rather than a galaxy count fraction.
    pub retained_fraction: f64,
    /// Median over retained clusters of (target mean photo-z - reference mean true-z)
    pub bias_median: f64,
    /// Normal-scaled MAD of the same per-cluster bias
    pub bias_scatter: f64,
    /// RMS of `1 - (reference occupancy / target occupancy)` over retained clusters
    pub occupancy_rms: f64,
    /// False when the realization's density had no mass and was zero-filled
    pub normalized: bool,
}

/// Ensemble and diagnostics for one bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEstimate {
    /// Bin index
    pub bin: usize,
    /// Bootstrap realizations and their average
    pub ensemble: Ensemble,
    /// One entry per realization
    pub diagnostics: Vec<RealizationDiagnostics>,
    /// Non-fatal degeneracy, if any realization hit one
    pub degeneracy: Option<Degeneracy>,
}

/// Ensembles for every bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleEstimate {
    /// `[bins][realizations][grid]`
    pub cube: EnsembleCube,
    /// `[bins][realizations]`
    pub diagnostics: Vec<Vec<RealizationDiagnostics>>,
    /// Per-bin degeneracy
    pub degeneracies: Vec<Option<Degeneracy>>,
    /// Wall-clock seconds
    pub wall_s: f64,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A galaxy batch with a cluster id per record.
#[derive(Debug, Clone)]
pub struct ClusteredSample<'a> {
    batch: &'a GalaxyBatch,
    cluster: Vec<usize>,
}

impl<'a> ClusteredSample<'a> {
    /// Look up clusters through the batch's cell ids.
    pub fn new(batch: &'a GalaxyBatch, map: &ClusterMap) -> Result<Self> {
        let cluster = map.assign(batch.cell_id()?)?;
        Ok(Self { batch, cluster })
    }

    /// Use precomputed cluster ids.
    pub fn from_clusters(batch: &'a GalaxyBatch, cluster: Vec<usize>) -> Result<Self> {
        pz_core::ensure_len("cluster ids", batch.len(), cluster.len())?;
        Ok(Self { batch, cluster })
    }

    /// Underlying batch.
    pub fn batch(&self) -> &GalaxyBatch {
        self.batch
    }

    /// Cluster id per record.
    pub fn clusters(&self) -> &[usize] {
        &self.cluster
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Bootstrap ensemble estimator over a fixed target/reference pair.
#[derive(Debug)]
pub struct BootstrapEstimator<'a> {
    config: BootstrapConfig,
    grid: &'a RedshiftGrid,
    cluster_count: usize,
    target: ClusteredSample<'a>,
    reference: ClusteredSample<'a>,
    target_weight: Vec<f64>,
    reference_z: &'a [f64],
    source: Histogrammed<'a>,
    point_width: Vec<f64>,
}

/// Resolved histogram source with the columns it reads.
#[derive(Debug, Clone, Copy)]
enum Histogrammed<'a> {
    Reference,
    TargetTruth(&'a [f64]),
    Stack { width: f64 },
}

impl<'a> BootstrapEstimator<'a> {
    /// Validate inputs and precompute record weights.
    pub fn new(
        config: BootstrapConfig,
        grid: &'a RedshiftGrid,
        cluster_count: usize,
        target: ClusteredSample<'a>,
        reference: ClusteredSample<'a>,
    ) -> Result<Self> {
        if config.realizations == 0 {
            return Err(Error::Configuration("realizations must be > 0".to_string()));
        }
        if cluster_count == 0 {
            return Err(Error::Configuration("cluster_count must be > 0".to_string()));
        }
        target.batch.validate()?;
        reference.batch.validate()?;
        for (name, sample) in [("target", &target), ("reference", &reference)] {
            if let Some(c) = sample.cluster.iter().find(|&&c| c >= cluster_count) {
                return Err(Error::Configuration(format!(
                    "{name}: cluster id {c} >= cluster count {cluster_count}"
                )));
            }
        }

        let target_weight = match config.target_weighting {
            TargetWeighting::Unweighted => vec![1.0; target.batch.len()],
            TargetWeighting::InverseVariance => {
                let sigma = target.batch.sigma.as_deref().ok_or_else(|| {
                    Error::Configuration("inverse-variance weighting needs target sigma".to_string())
                })?;
                sigma
                    .iter()
                    .enumerate()
                    .map(|(k, &s)| {
                        if s.is_finite() && s > 0.0 {
                            Ok(1.0 / (s * s))
                        } else {
                            Err(Error::Configuration(format!("target sigma[{k}] = {s} is not positive")))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };
        let (target_batch, reference_batch): (&'a GalaxyBatch, &'a GalaxyBatch) = (target.batch, reference.batch);
        let reference_z = reference_batch.redshift()?;
        let source = match config.histogram_source {
            HistogramSource::Reference => Histogrammed::Reference,
            HistogramSource::TargetTruth => Histogrammed::TargetTruth(target_batch.redshift()?),
            HistogramSource::Stack => {
                if !(config.stack_width.is_finite() && config.stack_width > 0.0) {
                    return Err(Error::Configuration(format!(
                        "stack_width must be finite and > 0, got {}",
                        config.stack_width
                    )));
                }
                Histogrammed::Stack { width: config.stack_width }
            }
        };

        Ok(Self {
            config,
            grid,
            cluster_count,
            target,
            reference,
            target_weight,
            reference_z,
            source,
            point_width: point_widths(grid.points()),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Estimate one bin from its target selection and reference masks.
    pub fn estimate_bin(&self, bin: usize, target_mask: &[bool], reference_mask: &[bool]) -> Result<BinEstimate> {
        pz_core::ensure_len("target mask", self.target.batch.len(), target_mask.len())?;
        pz_core::ensure_len("reference mask", self.reference.batch.len(), reference_mask.len())?;
        let t_idx = selected(target_mask);
        let r_idx = selected(reference_mask);
        let realizations = self.config.realizations;

        if t_idx.is_empty() || r_idx.is_empty() {
            tracing::warn!(
                bin,
                target = t_idx.len(),
                reference = r_idx.len(),
                "empty population, emitting zero densities"
            );
            return Ok(BinEstimate {
                bin,
                ensemble: Ensemble::zeros(realizations, self.grid.len()),
                diagnostics: vec![RealizationDiagnostics::default(); realizations],
                degeneracy: Some(Degeneracy::EmptyPopulation),
            });
        }

        let results: Vec<(Vec<f64>, RealizationDiagnostics)> = (0..realizations)
            .into_par_iter()
            .map(|r| {
                let mut rng = stream_rng(self.config.seed, bin as u64, r as u64);
                self.realization(&t_idx, &r_idx, &mut rng)
            })
            .collect();

        let (data, diagnostics): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let zeroed = diagnostics.iter().filter(|d| !d.normalized).count();
        let degeneracy = if zeroed > 0 {
            tracing::warn!(bin, zeroed, "realizations without density mass were zero-filled");
            Some(Degeneracy::UnnormalizableDensity)
        } else {
            None
        };
        let ensemble = Ensemble::from_realizations(data, self.grid)?;

        tracing::debug!(
            bin,
            target = t_idx.len(),
            reference = r_idx.len(),
            realizations,
            "bin estimated"
        );
        Ok(BinEstimate { bin, ensemble, diagnostics, degeneracy })
    }

    /// Estimate every bin; masks are `[bin][record]`.
    pub fn estimate(&self, target_masks: &[Vec<bool>], reference_masks: &[Vec<bool>]) -> Result<EnsembleEstimate> {
        pz_core::ensure_len("reference masks (bins)", target_masks.len(), reference_masks.len())?;
        let start = std::time::Instant::now();

        let bins = parallel::install(self.config.n_threads, || {
            target_masks
                .iter()
                .zip(reference_masks)
                .enumerate()
                .map(|(b, (t, r))| self.estimate_bin(b, t, r))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut ensembles = Vec::with_capacity(bins.len());
        let mut diagnostics = Vec::with_capacity(bins.len());
        let mut degeneracies = Vec::with_capacity(bins.len());
        for b in bins {
            ensembles.push(b.ensemble);
            diagnostics.push(b.diagnostics);
            degeneracies.push(b.degeneracy);
        }
        let cube = EnsembleCube::new(ensembles)?;
        let wall_s = start.elapsed().as_secs_f64();

        tracing::info!(
            bins = cube.n_bins(),
            realizations = self.config.realizations,
            clusters = self.cluster_count,
            wall_s,
            "bootstrap estimation complete"
        );
        Ok(EnsembleEstimate { cube, diagnostics, degeneracies, wall_s })
    }

    fn realization<R: Rng + ?Sized>(
        &self,
        t_idx: &[usize],
        r_idx: &[usize],
        rng: &mut R,
    ) -> (Vec<f64>, RealizationDiagnostics) {
        let k = self.cluster_count;
        let t_draw: Vec<usize> = (0..t_idx.len()).map(|_| t_idx[rng.random_range(0..t_idx.len())]).collect();
        let r_draw: Vec<usize> = (0..r_idx.len()).map(|_| r_idx[rng.random_range(0..r_idx.len())]).collect();

        let t_cluster = &self.target.cluster;
        let r_cluster = &self.reference.cluster;
        let t_zphot = &self.target.batch.z_phot;
        let r_zphot = &self.reference.batch.z_phot;

        let mut t_weight = vec![0.0; k];
        let mut t_zphot_sum = vec![0.0; k];
        for &i in &t_draw {
            let c = t_cluster[i];
            let w = self.target_weight[i];
            t_weight[c] += w;
            t_zphot_sum[c] += w * t_zphot[i];
        }

        let mut r_count = vec![0usize; k];
        let mut r_zphot_sum = vec![0.0; k];
        let mut r_z_sum = vec![0.0; k];
        for &i in &r_draw {
            let c = r_cluster[i];
            r_count[c] += 1;
            r_zphot_sum[c] += r_zphot[i];
            r_z_sum[c] += self.reference_z[i];
        }

        let retained: Vec<bool> = (0..k).map(|c| t_weight[c] > 0.0 && r_count[c] > 0).collect();

        // Cluster histograms are normalized individually and then averaged with
        // the target weights; accumulate each cluster's mass first so no
        // per-cluster histogram is materialized.
        let grid = self.grid;
        let mut mass = vec![0.0; k];
        let mut curve = vec![0.0; grid.len()];
        match self.source {
            Histogrammed::Reference => {
                let points: Vec<(usize, usize)> = r_draw
                    .iter()
                    .filter(|&&i| retained[r_cluster[i]])
                    .filter_map(|&i| grid.digitize(self.reference_z[i]).map(|p| (r_cluster[i], p)))
                    .collect();
                for &(c, p) in &points {
                    mass[c] += self.point_width[p];
                }
                for &(c, p) in &points {
                    curve[p] += t_weight[c] / mass[c];
                }
            }
            Histogrammed::TargetTruth(target_z) => {
                let points: Vec<(usize, usize, f64)> = t_draw
                    .iter()
                    .filter(|&&i| retained[t_cluster[i]])
                    .filter_map(|&i| grid.digitize(target_z[i]).map(|p| (t_cluster[i], p, self.target_weight[i])))
                    .collect();
                for &(c, p, w) in &points {
                    mass[c] += w * self.point_width[p];
                }
                for &(c, p, w) in &points {
                    if mass[c] > 0.0 {
                        curve[p] += t_weight[c] * w / mass[c];
                    }
                }
            }
            Histogrammed::Stack { width } => {
                for &i in &t_draw {
                    let sd = width * (1.0 + t_zphot[i]);
                    let w = self.target_weight[i] / sd;
                    for (v, z) in curve.iter_mut().zip(grid.points()) {
                        let u = (z - t_zphot[i]) / sd;
                        *v += w * (-0.5 * u * u).exp();
                    }
                }
            }
        }
        let normalized = grid.normalize(&mut curve);

        let diagnostics = diagnose(&retained, &t_weight, &t_zphot_sum, &r_count, &r_z_sum, r_draw.len(), normalized);
        (curve, diagnostics)
    }
}

fn selected(mask: &[bool]) -> Vec<usize> {
    mask.iter().enumerate().filter(|(_, m)| **m).map(|(i, _)| i).collect()
}

/// Trapezoid weight of a unit spike at each grid point.
fn point_widths(points: &[f64]) -> Vec<f64> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let left = if i > 0 { points[i] - points[i - 1] } else { 0.0 };
            let right = if i + 1 < n { points[i + 1] - points[i] } else { 0.0 };
            0.5 * (left + right)
        })
        .collect()
}

fn diagnose(
    retained: &[bool],
    t_weight: &[f64],
    t_zphot_sum: &[f64],
    r_count: &[usize],
    r_z_sum: &[f64],
    n_reference: usize,
    normalized: bool,
) -> RealizationDiagnostics {
    let t_total: f64 = t_weight.iter().sum();
    let mut kept_weight = 0.0;
    let mut bias = Vec::new();
    let mut dev2 = 0.0;
    for c in (0..retained.len()).filter(|&c| retained[c]) {
        kept_weight += t_weight[c];
        bias.push(t_zphot_sum[c] / t_weight[c] - r_z_sum[c] / r_count[c] as f64);
        let ratio = (r_count[c] as f64 / n_reference as f64) / (t_weight[c] / t_total);
        dev2 += (1.0 - ratio) * (1.0 - ratio);
    }
    if bias.is_empty() {
        return RealizationDiagnostics { normalized, ..Default::default() };
    }
    RealizationDiagnostics {
        retained_clusters: bias.len(),
        retained_fraction: kept_weight / t_total,
        bias_median: median(&bias),
        bias_scatter: scaled_mad(&bias),
        occupancy_rms: (dev2 / bias.len() as f64).sqrt(),
        normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pz_core::Population;

    fn grid() -> RedshiftGrid {
        RedshiftGrid::linspace(0.0, 2.0, 20).unwrap()
    }

    fn samples() -> (GalaxyBatch, GalaxyBatch) {
        let target = GalaxyBatch::new(Population::Target, vec![0.5, 0.6, 1.4, 1.5])
            .with_sigma(vec![0.2, 0.2, 0.4, 0.4])
            .with_redshift(vec![0.52, 0.58, 1.38, 1.52]);
        let reference = GalaxyBatch::new(Population::Reference, vec![0.5, 0.55, 1.45, 1.5])
            .with_redshift(vec![0.5, 0.55, 1.45, 1.5]);
        (target, reference)
    }

    #[test]
    fn test_point_widths_match_trapezoid() {
        let g = grid();
        let w = point_widths(g.points());
        let mut spike = vec![0.0; g.len()];
        spike[7] = 1.0;
        assert_relative_eq!(g.integrate(&spike), w[7], epsilon = 1e-15);
        spike[7] = 0.0;
        spike[0] = 1.0;
        assert_relative_eq!(g.integrate(&spike), w[0], epsilon = 1e-15);
    }

    #[test]
    fn test_estimate_bin_densities_normalized() {
        let g = grid();
        let (t, r) = samples();
        let est = BootstrapEstimator::new(
            BootstrapConfig { realizations: 16, seed: 3, ..Default::default() },
            &g,
            1,
            ClusteredSample::from_clusters(&t, vec![0; 4]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0; 4]).unwrap(),
        )
        .unwrap();
        let out = est.estimate_bin(0, &[true; 4], &[true; 4]).unwrap();
        assert_eq!(out.ensemble.realizations(), 16);
        assert!(out.degeneracy.is_none());
        for curve in &out.ensemble.data {
            assert!(curve.iter().all(|&v| v >= 0.0));
            assert_relative_eq!(g.integrate(curve), 1.0, epsilon = 1e-12);
        }
        for d in &out.diagnostics {
            assert!(d.normalized);
            assert_eq!(d.retained_clusters, 1);
            assert_relative_eq!(d.retained_fraction, 1.0);
        }
    }

    #[test]
    fn test_disjoint_clusters_zero_fill() {
        let g = grid();
        let (t, r) = samples();
        let est = BootstrapEstimator::new(
            BootstrapConfig { realizations: 4, ..Default::default() },
            &g,
            2,
            ClusteredSample::from_clusters(&t, vec![0; 4]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![1; 4]).unwrap(),
        )
        .unwrap();
        let out = est.estimate_bin(0, &[true; 4], &[true; 4]).unwrap();
        assert_eq!(out.degeneracy, Some(Degeneracy::UnnormalizableDensity));
        assert!(out.ensemble.is_zero());
        assert!(out.ensemble.average.iter().all(|&v| v == 0.0));
        assert_eq!(out.diagnostics[0].retained_clusters, 0);
        assert_eq!(out.diagnostics[0].retained_fraction, 0.0);
    }

    #[test]
    fn test_empty_mask_gives_zeros() {
        let g = grid();
        let (t, r) = samples();
        let est = BootstrapEstimator::new(
            BootstrapConfig { realizations: 5, ..Default::default() },
            &g,
            2,
            ClusteredSample::from_clusters(&t, vec![0, 0, 1, 1]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0, 0, 1, 1]).unwrap(),
        )
        .unwrap();
        let out = est.estimate_bin(0, &[false; 4], &[true; 4]).unwrap();
        assert_eq!(out.degeneracy, Some(Degeneracy::EmptyPopulation));
        assert_eq!(out.ensemble.data.len(), 5);
        assert!(out.ensemble.data.iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn test_truth_variant_inverse_variance() {
        let g = grid();
        let (t, r) = samples();
        let cfg = BootstrapConfig {
            realizations: 8,
            seed: 1,
            target_weighting: TargetWeighting::InverseVariance,
            histogram_source: HistogramSource::TargetTruth,
            ..Default::default()
        };
        let est = BootstrapEstimator::new(
            cfg,
            &g,
            2,
            ClusteredSample::from_clusters(&t, vec![0, 0, 1, 1]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0, 0, 1, 1]).unwrap(),
        )
        .unwrap();
        let out = est.estimate_bin(0, &[true; 4], &[true; 4]).unwrap();
        for curve in &out.ensemble.data {
            assert!(g.is_density_or_zero(curve, 1e-12));
        }
    }

    #[test]
    fn test_stack_centers_on_photo_z() {
        let g = RedshiftGrid::linspace(0.0, 2.0, 400).unwrap();
        let t = GalaxyBatch::new(Population::Target, vec![0.8; 4]);
        let (_, r) = samples();
        let cfg = BootstrapConfig {
            realizations: 3,
            histogram_source: HistogramSource::Stack,
            stack_width: 0.05,
            ..Default::default()
        };
        let est = BootstrapEstimator::new(
            cfg,
            &g,
            1,
            ClusteredSample::from_clusters(&t, vec![0; 4]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0; 4]).unwrap(),
        )
        .unwrap();
        let out = est.estimate_bin(0, &[true; 4], &[true; 4]).unwrap();
        for curve in &out.ensemble.data {
            assert_relative_eq!(g.integrate(curve), 1.0, epsilon = 1e-12);
            assert_relative_eq!(g.mean(curve), 0.8, epsilon = 1e-4);
            // sigma_z (1 + z_phot)
            assert_relative_eq!(g.dispersion(curve), 0.09, epsilon = 1e-3);
        }

        let bad = BootstrapConfig { histogram_source: HistogramSource::Stack, stack_width: 0.0, ..Default::default() };
        let err = BootstrapEstimator::new(
            bad,
            &g,
            1,
            ClusteredSample::from_clusters(&t, vec![0; 4]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0; 4]).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_config_from_pipeline() {
        let pipeline = PipelineConfig { realizations: 7, seed: 42, n_threads: 2, ..Default::default() };
        let cfg = BootstrapConfig::from(&pipeline);
        assert_eq!(cfg.realizations, 7);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.n_threads, 2);
        assert_eq!(cfg.histogram_source, HistogramSource::Reference);
    }

    #[test]
    fn test_missing_inputs_are_configuration_errors() {
        let g = grid();
        let (t, r) = samples();
        let no_sigma = GalaxyBatch::new(Population::Target, vec![0.5]);
        let cfg = BootstrapConfig { target_weighting: TargetWeighting::InverseVariance, ..Default::default() };
        let err = BootstrapEstimator::new(
            cfg,
            &g,
            1,
            ClusteredSample::from_clusters(&no_sigma, vec![0]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0; 4]).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let out_of_range = BootstrapEstimator::new(
            BootstrapConfig::default(),
            &g,
            1,
            ClusteredSample::from_clusters(&t, vec![0, 0, 1, 1]).unwrap(),
            ClusteredSample::from_clusters(&r, vec![0; 4]).unwrap(),
        );
        assert!(out_of_range.is_err());
    }

    #[test]
    fn test_diagnostics_bias() {
        let retained = [true, false];
        let d = diagnose(&retained, &[2.0, 2.0], &[2.0, 0.0], &[1, 0], &[0.8, 0.0], 1, true);
        assert_eq!(d.retained_clusters, 1);
        assert_relative_eq!(d.retained_fraction, 0.5);
        assert_relative_eq!(d.bias_median, 0.2, epsilon = 1e-12);
        assert_eq!(d.bias_scatter, 0.0);
        // reference occupancy 1/1, target occupancy 2/4 -> ratio 2
        assert_relative_eq!(d.occupancy_rms, 1.0);
    }
}
