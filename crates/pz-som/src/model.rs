//! Pretrained codebook SOM.

use std::path::Path;

use pz_core::{ColumnUsage, Error, Result, SomModel};
use serde::{Deserialize, Serialize};

/// Rectangular SOM with a row-major codebook of `rows * columns` weight vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfOrganizingMap {
    rows: usize,
    columns: usize,
    feature_columns: Vec<String>,
    reference_column: String,
    column_usage: ColumnUsage,
    codebook: Vec<Vec<f64>>,
}

impl SelfOrganizingMap {
    /// Assemble a trained map and check its shape.
    pub fn new(
        rows: usize,
        columns: usize,
        feature_columns: Vec<String>,
        reference_column: impl Into<String>,
        column_usage: ColumnUsage,
        codebook: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let som = Self {
            rows,
            columns,
            feature_columns,
            reference_column: reference_column.into(),
            column_usage,
            codebook,
        };
        som.validate()?;
        Ok(som)
    }

    /// Parse a serialized map.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let som: Self = serde_json::from_str(json)?;
        som.validate()?;
        Ok(som)
    }

    /// Load a serialized map from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Feature dimension of every codebook vector.
    pub fn dimension(&self) -> usize {
        self.column_usage.feature_dimension(self.feature_columns.len())
    }

    fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(Error::Configuration(format!(
                "SOM grid must be non-empty, got {}x{}",
                self.rows, self.columns
            )));
        }
        let dim = self.dimension();
        if dim == 0 {
            return Err(Error::Configuration("SOM feature dimension is zero".to_string()));
        }
        pz_core::ensure_len("SOM codebook", self.rows * self.columns, self.codebook.len())?;
        for (cell, w) in self.codebook.iter().enumerate() {
            if w.len() != dim {
                return Err(Error::Configuration(format!(
                    "SOM codebook cell {cell}: expected dimension {dim}, got {}",
                    w.len()
                )));
            }
            if w.iter().any(|v| !v.is_finite()) {
                return Err(Error::Configuration(format!("SOM codebook cell {cell} is not finite")));
            }
        }
        Ok(())
    }

    /// Nearest codebook cell; non-finite feature components are ignored.
    /// Ties go to the lowest cell id.
    fn nearest_cell(&self, x: &[f64]) -> usize {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (cell, w) in self.codebook.iter().enumerate() {
            let d: f64 = w
                .iter()
                .zip(x)
                .filter(|(_, xi)| xi.is_finite())
                .map(|(wi, xi)| (wi - xi) * (wi - xi))
                .sum();
            if d < best_d {
                best_d = d;
                best = cell;
            }
        }
        best
    }
}

impl SomModel for SelfOrganizingMap {
    fn n_rows(&self) -> usize {
        self.rows
    }

    fn n_columns(&self) -> usize {
        self.columns
    }

    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn reference_column(&self) -> &str {
        &self.reference_column
    }

    fn column_usage(&self) -> ColumnUsage {
        self.column_usage
    }

    fn best_matching_units(&self, features: &[Vec<f64>]) -> Result<Vec<(usize, usize)>> {
        let dim = self.dimension();
        features
            .iter()
            .enumerate()
            .map(|(k, x)| {
                if x.len() != dim {
                    return Err(Error::Configuration(format!(
                        "feature row {k}: expected dimension {dim}, got {}",
                        x.len()
                    )));
                }
                let cell = self.nearest_cell(x);
                Ok((cell / self.columns, cell % self.columns))
            })
            .collect()
    }

    fn codebook(&self) -> &[Vec<f64>] {
        &self.codebook
    }
}
