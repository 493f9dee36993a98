//! # pz-inference
//!
//! Estimation, calibration and validation of tomographic redshift densities.
//!
//! - [`bootstrap`]: clustered bootstrap ensembles (DIR, Truth and Stack variants)
//! - [`hybrid`] and [`synthesis`]: combining ensembles
//! - [`summary`]: moment summaries of ensemble cubes
//! - [`calibrate`]: Shift / Scale / Correct calibration toward a truth summary
//! - [`cosmology`] and [`validation`]: scale cuts and chi-square scoring
//!
//! Every Monte-Carlo stage draws realization `r` from its own RNG stream, so
//! results do not depend on the thread count.

#![warn(missing_docs)]

mod parallel;

pub mod bootstrap;
pub mod calibrate;
pub mod cosmology;
pub mod hybrid;
pub mod summary;
pub mod synthesis;
pub mod validation;

pub use bootstrap::{
    BinEstimate, BootstrapConfig, BootstrapEstimator, ClusteredSample, EnsembleEstimate, HistogramSource,
    RealizationDiagnostics, TargetWeighting,
};
pub use calibrate::{
    CalibrationDraw, CalibrationOutcome, CalibrationStrategy, Calibrator, apply_correct, apply_scale, apply_shift,
    draw_calibration,
};
pub use cosmology::FlatCosmology;
pub use hybrid::hybrid;
pub use summary::{EnsembleSummary, TruthSummary};
pub use synthesis::{SynthesisConfig, synthesize};
pub use validation::{
    ChiSquareConfig, ChiSquareMode, ChiSquareResult, DataVectorLayout, MaskedPrecision, ScaleCut, StrategyChiSquare,
    chi_square, validate_strategies,
};
