//! Seam traits
//!
//! The calibration chain depends on a pretrained SOM and on a background
//! cosmology only through these traits, so callers inject the concrete
//! model once and pass it by reference to every stage.

use serde::{Deserialize, Serialize};

use crate::Result;

/// How photometry columns are turned into SOM features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnUsage {
    /// Columns as-is.
    Columns,
    /// Adjacent colors `c[i] - c[i + 1]`.
    Colors,
    /// Adjacent colors followed by the reference magnitude.
    MagAndColors,
}

impl ColumnUsage {
    /// Feature dimension produced from `n_columns` input columns.
    pub fn feature_dimension(self, n_columns: usize) -> usize {
        match self {
            ColumnUsage::Columns => n_columns,
            ColumnUsage::Colors => n_columns.saturating_sub(1),
            ColumnUsage::MagAndColors => n_columns.saturating_sub(1) + 1,
        }
    }
}

/// Pretrained self-organizing map: shared, read-only.
pub trait SomModel: Send + Sync {
    /// Grid rows
    fn n_rows(&self) -> usize;

    /// Grid columns
    fn n_columns(&self) -> usize;

    /// Total number of cells
    fn cell_count(&self) -> usize {
        self.n_rows() * self.n_columns()
    }

    /// Photometry columns the features are built from, in order
    fn feature_columns(&self) -> &[String];

    /// Reference magnitude column (used by [`ColumnUsage::MagAndColors`])
    fn reference_column(&self) -> &str;

    /// Feature construction mode
    fn column_usage(&self) -> ColumnUsage;

    /// Best matching unit `(row, col)` for each feature row
    fn best_matching_units(&self, features: &[Vec<f64>]) -> Result<Vec<(usize, usize)>>;

    /// Row-major cell weight vectors, `cell_count` entries
    fn codebook(&self) -> &[Vec<f64>];
}

/// Line-of-sight comoving distance in Mpc.
pub trait ComovingDistance: Send + Sync {
    /// Comoving distance to redshift `z`
    fn comoving_distance(&self, z: f64) -> f64;
}
