//! Tomographic bin edges and selection masks.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How bin edges are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinKind {
    /// Equal-width edges (lens samples).
    EqualWidth,
    /// Equal-count edges from photo-z quantiles (source samples).
    Quantile,
}

/// Photo-z bin edges; bin `i` selects `edges[i] <= z_phot < edges[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomographicBins {
    edges: Vec<f64>,
}

impl TomographicBins {
    /// Wrap explicit edges (from an external selection stage).
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::Configuration(format!(
                "bin edges need at least 2 values, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Configuration(
                "bin edges must be finite and non-decreasing".to_string(),
            ));
        }
        Ok(Self { edges })
    }

    /// `n_bins` equal-width bins over `[z_min, z_max]`.
    pub fn equal_width(z_min: f64, z_max: f64, n_bins: usize) -> Result<Self> {
        check_range(z_min, z_max, n_bins)?;
        let step = (z_max - z_min) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|i| z_min + step * i as f64).collect();
        edges[n_bins] = z_max;
        Self::from_edges(edges)
    }

    /// `n_bins` equal-count bins from the photo-z of the selected records.
    ///
    /// Interior edges are linear-interpolated quantiles; the outer edges are
    /// pinned to `z_min` and `z_max`.
    pub fn quantile(z_phot: &[f64], selected: &[bool], z_min: f64, z_max: f64, n_bins: usize) -> Result<Self> {
        check_range(z_min, z_max, n_bins)?;
        crate::ensure_len("selection", z_phot.len(), selected.len())?;
        let mut values: Vec<f64> = z_phot
            .iter()
            .zip(selected)
            .filter(|(z, s)| **s && z.is_finite())
            .map(|(z, _)| *z)
            .collect();
        if values.is_empty() {
            return Err(Error::Configuration("quantile bins need at least one selected record".to_string()));
        }
        values.sort_by(f64::total_cmp);

        let mut edges = Vec::with_capacity(n_bins + 1);
        edges.push(z_min);
        for i in 1..n_bins {
            let q = quantile_linear_sorted(&values, i as f64 / n_bins as f64);
            edges.push(q.clamp(z_min, z_max));
        }
        edges.push(z_max);
        Self::from_edges(edges)
    }

    /// Build from a kind and range.
    pub fn build(kind: BinKind, z_phot: &[f64], selected: &[bool], z_min: f64, z_max: f64, n_bins: usize) -> Result<Self> {
        match kind {
            BinKind::EqualWidth => Self::equal_width(z_min, z_max, n_bins),
            BinKind::Quantile => Self::quantile(z_phot, selected, z_min, z_max, n_bins),
        }
    }

    /// Edge array.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Lower edges, one per bin.
    pub fn lower_edges(&self) -> &[f64] {
        &self.edges[..self.edges.len() - 1]
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Per-bin membership `lo <= z_phot < hi`, intersected with `base`.
    pub fn selection_masks(&self, z_phot: &[f64], base: Option<&[bool]>) -> Result<Vec<Vec<bool>>> {
        if let Some(base) = base {
            crate::ensure_len("base mask", z_phot.len(), base.len())?;
        }
        Ok(self
            .edges
            .windows(2)
            .map(|w| {
                z_phot
                    .iter()
                    .enumerate()
                    .map(|(k, &z)| w[0] <= z && z < w[1] && base.is_none_or(|m| m[k]))
                    .collect()
            })
            .collect())
    }
}

fn check_range(z_min: f64, z_max: f64, n_bins: usize) -> Result<()> {
    if n_bins == 0 {
        return Err(Error::Configuration("n_bins must be > 0".to_string()));
    }
    if !(z_min.is_finite() && z_max.is_finite() && z_max > z_min) {
        return Err(Error::Configuration(format!("invalid bin range [{z_min}, {z_max}]")));
    }
    Ok(())
}

/// Quantile of sorted data (linear interpolation); `NaN` for empty input.
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}
