//! # pz-core
//!
//! Core types, errors and seam traits for photometric-redshift calibration.
//!
//! Every other crate in the workspace builds on the records defined here:
//! the shared [`RedshiftGrid`], galaxy batches, tomographic bins, bootstrap
//! ensembles and the pipeline configuration.

#![warn(missing_docs)]

pub mod bins;
pub mod config;
pub mod error;
pub mod grid;
pub mod traits;
pub mod types;

pub use bins::{BinKind, TomographicBins, quantile_linear_sorted};
pub use config::{BinningConfig, PipelineConfig};
pub use error::{Error, Result, ensure_len};
pub use grid::RedshiftGrid;
pub use traits::{ColumnUsage, ComovingDistance, SomModel};
pub use types::{Degeneracy, Ensemble, EnsembleCube, GalaxyBatch, Population, SampleKind};
