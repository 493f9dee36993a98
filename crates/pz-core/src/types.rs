//! Common data types for photo-z calibration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::RedshiftGrid;
use crate::{Error, Result, ensure_len};

/// Which of the two disjoint galaxy populations a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Population {
    /// Photometrically selected sample whose redshift density is estimated.
    Target,
    /// Truth-labelled (spectroscopic) sample used for calibration.
    Reference,
}

/// Tomographic sample kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    /// Clustering sample.
    Lens,
    /// Weak-lensing (shape-bearing) sample.
    Source,
}

/// Non-fatal statistical degeneracy, recorded on results instead of raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degeneracy {
    /// A bin has no target or no reference members.
    EmptyPopulation,
    /// A density had zero (or non-finite) integral and was zero-filled.
    UnnormalizableDensity,
    /// Non-positive covariance eigenmodes were discarded.
    SingularCovariance,
}

/// Columnar galaxy records for one population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyBatch {
    /// Population tag
    pub population: Population,

    /// Named photometry columns (magnitudes and their errors)
    pub photometry: BTreeMap<String, Vec<f64>>,

    /// Point-estimate photometric redshift
    pub z_phot: Vec<f64>,

    /// True or spectroscopic redshift
    pub redshift: Option<Vec<f64>>,

    /// Shape noise; `None` for samples without shapes
    pub sigma: Option<Vec<f64>>,

    /// SOM cell id, filled by the cell mapper
    pub cell_id: Option<Vec<usize>>,
}

impl GalaxyBatch {
    /// Create a batch holding only point photo-z values.
    pub fn new(population: Population, z_phot: Vec<f64>) -> Self {
        Self {
            population,
            photometry: BTreeMap::new(),
            z_phot,
            redshift: None,
            sigma: None,
            cell_id: None,
        }
    }

    /// Attach a photometry column.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.photometry.insert(name.into(), values);
        self
    }

    /// Attach true redshifts.
    pub fn with_redshift(mut self, redshift: Vec<f64>) -> Self {
        self.redshift = Some(redshift);
        self
    }

    /// Attach shape noise.
    pub fn with_sigma(mut self, sigma: Vec<f64>) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// Attach precomputed cell ids.
    pub fn with_cell_id(mut self, cell_id: Vec<usize>) -> Self {
        self.cell_id = Some(cell_id);
        self
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.z_phot.len()
    }

    /// True if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.z_phot.is_empty()
    }

    /// Photometry column by name.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.photometry
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Configuration(format!("missing photometry column '{name}'")))
    }

    /// True redshifts, or a configuration error if absent.
    pub fn redshift(&self) -> Result<&[f64]> {
        self.redshift
            .as_deref()
            .ok_or_else(|| Error::Configuration(format!("{:?} batch has no redshift column", self.population)))
    }

    /// Cell ids, or a configuration error if the batch was never mapped.
    pub fn cell_id(&self) -> Result<&[usize]> {
        self.cell_id
            .as_deref()
            .ok_or_else(|| Error::Configuration(format!("{:?} batch has no cell ids", self.population)))
    }

    /// Reject ragged columns.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        for (name, col) in &self.photometry {
            ensure_len(name, n, col.len())?;
        }
        if let Some(z) = &self.redshift {
            ensure_len("redshift", n, z.len())?;
        }
        if let Some(s) = &self.sigma {
            ensure_len("sigma", n, s.len())?;
        }
        if let Some(c) = &self.cell_id {
            ensure_len("cell_id", n, c.len())?;
        }
        Ok(())
    }
}

/// Bootstrap realizations of one bin's density, plus their mean curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    /// `[realization][grid]`
    pub data: Vec<Vec<f64>>,

    /// Normalized mean of `data`
    pub average: Vec<f64>,
}

impl Ensemble {
    /// All-zero ensemble.
    pub fn zeros(realizations: usize, grid_len: usize) -> Self {
        Self { data: vec![vec![0.0; grid_len]; realizations], average: vec![0.0; grid_len] }
    }

    /// Build from realizations, computing the normalized average.
    pub fn from_realizations(data: Vec<Vec<f64>>, grid: &RedshiftGrid) -> Result<Self> {
        for curve in &data {
            grid.check("realization", curve)?;
        }
        let average = mean_curve(&data, grid);
        Ok(Self { data, average })
    }

    /// Number of realizations.
    pub fn realizations(&self) -> usize {
        self.data.len()
    }

    /// True when every realization is identically zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|c| c.iter().all(|&v| v == 0.0))
    }
}

fn mean_curve(data: &[Vec<f64>], grid: &RedshiftGrid) -> Vec<f64> {
    let mut average = vec![0.0; grid.len()];
    if data.is_empty() {
        return average;
    }
    for curve in data {
        for (a, v) in average.iter_mut().zip(curve) {
            *a += v;
        }
    }
    let n = data.len() as f64;
    for a in average.iter_mut() {
        *a /= n;
    }
    grid.normalize(&mut average);
    average
}

/// One [`Ensemble`] per tomographic bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleCube {
    /// Per-bin ensembles
    pub bins: Vec<Ensemble>,
}

impl EnsembleCube {
    /// Wrap per-bin ensembles; all bins must share one realization count.
    pub fn new(bins: Vec<Ensemble>) -> Result<Self> {
        if let Some(first) = bins.first() {
            let r = first.realizations();
            for (b, e) in bins.iter().enumerate() {
                if e.realizations() != r {
                    return Err(Error::Configuration(format!(
                        "bin {b}: expected {r} realizations, got {}",
                        e.realizations()
                    )));
                }
            }
        }
        Ok(Self { bins })
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// Realizations per bin (0 for an empty cube).
    pub fn realizations(&self) -> usize {
        self.bins.first().map_or(0, Ensemble::realizations)
    }

    /// Curve of bin `b`, realization `r`.
    pub fn curve(&self, b: usize, r: usize) -> &[f64] {
        &self.bins[b].data[r]
    }

    /// Per-bin average curves.
    pub fn averages(&self) -> Vec<&[f64]> {
        self.bins.iter().map(|e| e.average.as_slice()).collect()
    }

    /// Check every curve against the grid.
    pub fn validate(&self, grid: &RedshiftGrid) -> Result<()> {
        for (b, e) in self.bins.iter().enumerate() {
            grid.check(&format!("bin {b} average"), &e.average)?;
            for curve in &e.data {
                grid.check(&format!("bin {b} realization"), curve)?;
            }
        }
        Ok(())
    }

    /// Build from `[realization][bin][grid]` data, recomputing averages.
    pub fn from_realization_major(data: Vec<Vec<Vec<f64>>>, n_bins: usize, grid: &RedshiftGrid) -> Result<Self> {
        let mut per_bin: Vec<Vec<Vec<f64>>> = (0..n_bins).map(|_| Vec::with_capacity(data.len())).collect();
        for (r, draw) in data.into_iter().enumerate() {
            ensure_len(&format!("realization {r} bins"), n_bins, draw.len())?;
            for (b, curve) in draw.into_iter().enumerate() {
                per_bin[b].push(curve);
            }
        }
        let bins = per_bin
            .into_iter()
            .map(|d| Ensemble::from_realizations(d, grid))
            .collect::<Result<Vec<_>>>()?;
        Self::new(bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_batch_validate() {
        let ok = GalaxyBatch::new(Population::Target, vec![0.1, 0.2])
            .with_column("mag_i", vec![20.0, 21.0])
            .with_sigma(vec![0.3, 0.3]);
        assert!(ok.validate().is_ok());

        let ragged = ok.clone().with_redshift(vec![0.5]);
        assert!(matches!(ragged.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_batch_missing_columns() {
        let b = GalaxyBatch::new(Population::Reference, vec![0.1]);
        assert!(b.column("mag_g").is_err());
        assert!(b.redshift().is_err());
        assert!(b.cell_id().is_err());
    }

    #[test]
    fn test_ensemble_average_normalized() {
        let grid = RedshiftGrid::linspace(0.0, 1.0, 2).unwrap();
        let e = Ensemble::from_realizations(vec![vec![0.0, 2.0, 0.0], vec![0.0, 0.0, 0.0]], &grid).unwrap();
        assert_relative_eq!(grid.integrate(&e.average), 1.0, epsilon = 1e-12);
        assert!(!e.is_zero());
        assert!(Ensemble::zeros(3, 3).is_zero());
    }

    #[test]
    fn test_cube_realization_major() {
        let grid = RedshiftGrid::linspace(0.0, 1.0, 2).unwrap();
        let data = vec![
            vec![vec![0.0, 2.0, 0.0], vec![1.0, 1.0, 1.0]],
            vec![vec![0.0, 2.0, 0.0], vec![1.0, 1.0, 1.0]],
            vec![vec![0.0, 2.0, 0.0], vec![1.0, 1.0, 1.0]],
        ];
        let cube = EnsembleCube::from_realization_major(data, 2, &grid).unwrap();
        assert_eq!(cube.n_bins(), 2);
        assert_eq!(cube.realizations(), 3);
        assert_eq!(cube.curve(1, 2), &[1.0, 1.0, 1.0]);
        assert!(cube.validate(&grid).is_ok());
    }

    #[test]
    fn test_cube_rejects_mismatched_realizations() {
        let bins = vec![Ensemble::zeros(2, 3), Ensemble::zeros(3, 3)];
        assert!(EnsembleCube::new(bins).is_err());
    }
}
