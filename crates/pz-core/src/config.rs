//! Pipeline configuration.
//!
//! One explicit object carrying grid bounds, sample sizes and binning,
//! passed by reference to every stage.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bins::{BinKind, TomographicBins};
use crate::grid::RedshiftGrid;
use crate::{Error, Result};

/// Tomographic binning for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Edge placement
    pub kind: BinKind,
    /// Lower photo-z bound
    pub z_min: f64,
    /// Upper photo-z bound
    pub z_max: f64,
    /// Number of bins
    pub n_bins: usize,
}

impl BinningConfig {
    /// Edges for this binning; quantile edges come from the selected `z_phot`.
    pub fn bins(&self, z_phot: &[f64], selected: &[bool]) -> Result<TomographicBins> {
        TomographicBins::build(self.kind, z_phot, selected, self.z_min, self.z_max, self.n_bins)
    }
}

/// Full calibration pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lower grid bound
    pub grid_min: f64,
    /// Upper grid bound
    pub grid_max: f64,
    /// Number of grid intervals (points = intervals + 1)
    pub grid_intervals: usize,
    /// Bootstrap realizations per bin
    pub realizations: usize,
    /// Master seed
    pub seed: u64,
    /// Rows per SOM mapping chunk
    pub chunk_size: usize,
    /// Clusters as a fraction of SOM cells
    pub cluster_fraction: f64,
    /// Lens binning
    pub lens: BinningConfig,
    /// Source binning
    pub source: BinningConfig,
    /// Worker threads; 0 uses the global rayon pool
    pub n_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid_min: 0.0,
            grid_max: 3.0,
            grid_intervals: 300,
            realizations: 100,
            seed: 0,
            chunk_size: 100_000,
            cluster_fraction: 0.25,
            lens: BinningConfig { kind: BinKind::EqualWidth, z_min: 0.2, z_max: 1.2, n_bins: 5 },
            source: BinningConfig { kind: BinKind::Quantile, z_min: 0.0, z_max: 3.0, n_bins: 5 },
            n_threads: 0,
        }
    }
}

impl PipelineConfig {
    /// Parse from JSON; missing fields take their defaults. Validates.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The shared redshift grid.
    pub fn grid(&self) -> Result<RedshiftGrid> {
        RedshiftGrid::linspace(self.grid_min, self.grid_max, self.grid_intervals)
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        self.grid()?;
        if self.realizations == 0 {
            return Err(Error::Configuration("realizations must be > 0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be > 0".to_string()));
        }
        if !(self.cluster_fraction > 0.0 && self.cluster_fraction <= 1.0) {
            return Err(Error::Configuration(format!(
                "cluster_fraction must be in (0, 1], got {}",
                self.cluster_fraction
            )));
        }
        for (name, b) in [("lens", &self.lens), ("source", &self.source)] {
            if b.n_bins == 0 {
                return Err(Error::Configuration(format!("{name}: n_bins must be > 0")));
            }
            if !(b.z_min.is_finite() && b.z_max.is_finite() && b.z_max > b.z_min) {
                return Err(Error::Configuration(format!(
                    "{name}: invalid range [{}, {}]",
                    b.z_min, b.z_max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = PipelineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.grid().unwrap().len(), 301);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let c = PipelineConfig::from_json_str(r#"{"realizations": 20, "seed": 7}"#).unwrap();
        assert_eq!(c.realizations, 20);
        assert_eq!(c.seed, 7);
        assert_eq!(c.chunk_size, 100_000);
        assert_eq!(c.source.kind, BinKind::Quantile);
    }

    #[test]
    fn test_invalid_json_config() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"realizations": 0}"#),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"cluster_fraction": 1.5}"#),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(PipelineConfig::from_json_str("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_binning_dispatch() {
        let c = PipelineConfig::default();
        let z: Vec<f64> = (0..100).map(|i| 0.01 * i as f64).collect();
        let sel = vec![true; z.len()];

        let lens = c.lens.bins(&z, &sel).unwrap();
        assert_eq!(lens.n_bins(), 5);
        assert!((lens.edges()[1] - 0.4).abs() < 1e-12);

        let source = c.source.bins(&z, &sel).unwrap();
        assert_eq!(source.n_bins(), 5);
        assert_eq!(source.edges()[0], 0.0);
        assert_eq!(source.edges()[5], 3.0);
        // 20th percentile of 0.00..0.99
        assert!((source.edges()[1] - 0.198).abs() < 1e-12);
    }
}
