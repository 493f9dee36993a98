//! Cell mapping: photometry -> SOM features -> BMU cell ids.
//!
//! Batches are mapped in fixed-size chunks to bound the size of the
//! feature matrix held at once; chunks are independent and run on rayon.

use std::ops::Range;

use pz_core::{ColumnUsage, Error, GalaxyBatch, Result, SomModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default rows per mapping chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// BMU coordinates and flattened cell ids for every record of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellAssignment {
    /// `(row, col)` per record
    pub coordinates: Vec<(usize, usize)>,
    /// `row * columns + col` per record
    pub cell_id: Vec<usize>,
}

/// Per-cell occupancy and weighted mean of an auxiliary quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellStatistics {
    /// Number of records per cell
    pub count: Vec<usize>,
    /// Summed weight per cell
    pub weight: Vec<f64>,
    /// Weighted mean per cell; `NaN` for cells without weight
    pub mean: Vec<f64>,
}

/// Feature rows for `range` of `batch`, following the model's column usage.
pub fn build_features(model: &dyn SomModel, batch: &GalaxyBatch, range: Range<usize>) -> Result<Vec<Vec<f64>>> {
    if range.end > batch.len() || range.start > range.end {
        return Err(Error::Configuration(format!(
            "feature range {}..{} out of bounds for batch of {}",
            range.start,
            range.end,
            batch.len()
        )));
    }
    let columns = model
        .feature_columns()
        .iter()
        .map(|name| batch.column(name).map(|c| &c[range.clone()]))
        .collect::<Result<Vec<_>>>()?;
    let reference = match model.column_usage() {
        ColumnUsage::MagAndColors => Some(&batch.column(model.reference_column())?[range.clone()]),
        _ => None,
    };

    let dim = model.column_usage().feature_dimension(columns.len());
    let rows = range
        .clone()
        .enumerate()
        .map(|(k, _)| {
            let mut row = Vec::with_capacity(dim);
            match model.column_usage() {
                ColumnUsage::Columns => row.extend(columns.iter().map(|c| c[k])),
                ColumnUsage::Colors | ColumnUsage::MagAndColors => {
                    row.extend(columns.windows(2).map(|w| w[0][k] - w[1][k]));
                }
            }
            if let Some(mag) = reference {
                row.push(mag[k]);
            }
            row
        })
        .collect();
    Ok(rows)
}

/// Map every record of `batch` to its BMU cell.
pub fn map_cells(model: &dyn SomModel, batch: &GalaxyBatch, chunk_size: usize) -> Result<CellAssignment> {
    if chunk_size == 0 {
        return Err(Error::Configuration("chunk_size must be > 0".to_string()));
    }
    batch.validate()?;
    let start = std::time::Instant::now();
    let n = batch.len();
    let n_chunks = n.div_ceil(chunk_size);
    let columns = model.n_columns();

    let chunks = (0..n_chunks)
        .into_par_iter()
        .map(|c| {
            let range = c * chunk_size..((c + 1) * chunk_size).min(n);
            let features = build_features(model, batch, range)?;
            model.best_matching_units(&features)
        })
        .collect::<Result<Vec<_>>>()?;

    let coordinates: Vec<(usize, usize)> = chunks.into_iter().flatten().collect();
    pz_core::ensure_len("BMU output", n, coordinates.len())?;
    let cell_count = model.cell_count();
    let mut cell_id = Vec::with_capacity(n);
    for &(r, c) in &coordinates {
        let id = r * columns + c;
        if id >= cell_count {
            return Err(Error::Computation(format!("BMU ({r}, {c}) outside {cell_count} cells")));
        }
        cell_id.push(id);
    }

    tracing::info!(
        population = ?batch.population,
        records = n,
        chunks = n_chunks,
        wall_s = start.elapsed().as_secs_f64(),
        "cell mapping complete"
    );
    Ok(CellAssignment { coordinates, cell_id })
}

/// Map `batch` and store the cell ids on it.
pub fn assign_cells(model: &dyn SomModel, batch: &mut GalaxyBatch, chunk_size: usize) -> Result<()> {
    let assignment = map_cells(model, batch, chunk_size)?;
    batch.cell_id = Some(assignment.cell_id);
    Ok(())
}

/// Per-cell count and weighted mean of `values`.
///
/// Records with non-finite value or weight are skipped.
pub fn cell_statistics(
    cell_id: &[usize],
    cell_count: usize,
    values: &[f64],
    weights: Option<&[f64]>,
) -> Result<CellStatistics> {
    pz_core::ensure_len("values", cell_id.len(), values.len())?;
    if let Some(w) = weights {
        pz_core::ensure_len("weights", cell_id.len(), w.len())?;
    }

    let mut count = vec![0usize; cell_count];
    let mut weight = vec![0.0; cell_count];
    let mut sum = vec![0.0; cell_count];
    for (k, (&cell, &v)) in cell_id.iter().zip(values).enumerate() {
        if cell >= cell_count {
            return Err(Error::Configuration(format!("cell id {cell} >= cell count {cell_count}")));
        }
        let w = weights.map_or(1.0, |w| w[k]);
        if !v.is_finite() || !w.is_finite() {
            continue;
        }
        count[cell] += 1;
        weight[cell] += w;
        sum[cell] += w * v;
    }

    let mean = sum.iter().zip(&weight).map(|(s, w)| if *w > 0.0 { s / w } else { f64::NAN }).collect();
    Ok(CellStatistics { count, weight, mean })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SelfOrganizingMap;
    use pz_core::Population;

    fn batch() -> GalaxyBatch {
        GalaxyBatch::new(Population::Target, vec![0.0; 3])
            .with_column("mag_g", vec![22.0, 21.0, 20.0])
            .with_column("mag_r", vec![21.5, 21.0, 19.0])
            .with_column("mag_i", vec![21.0, 20.5, 18.5])
    }

    fn som(usage: ColumnUsage, dim: usize) -> SelfOrganizingMap {
        SelfOrganizingMap::new(
            1,
            2,
            vec!["mag_g".into(), "mag_r".into(), "mag_i".into()],
            "mag_i",
            usage,
            vec![vec![0.0; dim], vec![1.0; dim]],
        )
        .unwrap()
    }

    #[test]
    fn test_features_by_usage() {
        let b = batch();
        let cols = build_features(&som(ColumnUsage::Columns, 3), &b, 0..1).unwrap();
        assert_eq!(cols, vec![vec![22.0, 21.5, 21.0]]);

        let colors = build_features(&som(ColumnUsage::Colors, 2), &b, 0..1).unwrap();
        assert_eq!(colors, vec![vec![0.5, 0.5]]);

        let magcol = build_features(&som(ColumnUsage::MagAndColors, 3), &b, 2..3).unwrap();
        assert_eq!(magcol, vec![vec![1.0, 0.5, 18.5]]);
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let b = GalaxyBatch::new(Population::Target, vec![0.0]).with_column("mag_g", vec![1.0]);
        let err = build_features(&som(ColumnUsage::Colors, 2), &b, 0..1).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_map_cells_chunking_is_invariant() {
        let b = batch();
        let model = som(ColumnUsage::Colors, 2);
        let one = map_cells(&model, &b, 1).unwrap();
        let all = map_cells(&model, &b, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(one, all);
        // colors (0.5, 0.5), (0, 0.5), (1, 0.5): nearest of [0,0] and [1,1]
        assert_eq!(all.cell_id, vec![0, 0, 1]);
    }

    #[test]
    fn test_assign_cells_writes_back() {
        let mut b = batch();
        assign_cells(&som(ColumnUsage::Colors, 2), &mut b, 2).unwrap();
        assert_eq!(b.cell_id().unwrap().len(), 3);
    }

    #[test]
    fn test_cell_statistics_empty_cells_nan() {
        let stats = cell_statistics(&[0, 0, 2], 4, &[1.0, 3.0, 0.0], None).unwrap();
        assert_eq!(stats.count, vec![2, 0, 1, 0]);
        assert_eq!(stats.mean[0], 2.0);
        assert!(stats.mean[1].is_nan());
        assert_eq!(stats.mean[2], 0.0);
        assert!(stats.mean[3].is_nan());

        let weighted = cell_statistics(&[0, 0], 1, &[1.0, 3.0], Some(&[3.0, 1.0])).unwrap();
        assert_eq!(weighted.mean[0], 1.5);
        assert!(cell_statistics(&[5], 2, &[1.0], None).is_err());
    }
}
