//! Probability and numerics building blocks for photo-z calibration.
//!
//! This crate hosts the reusable math the estimation and calibration stages
//! share:
//! - composite Simpson quadrature
//! - robust sample statistics (quantiles, scaled MAD, covariance, correlation)
//! - a not-a-knot cubic spline with extrapolation
//! - multivariate normal and Dirichlet sampling
//! - counter-based RNG streams for reproducible parallel Monte Carlo

#![warn(missing_docs)]

pub mod dirichlet;
pub mod math;
pub mod mvn;
pub mod rng;
pub mod spline;
pub mod stats;

pub use dirichlet::SymmetricDirichlet;
pub use mvn::MultivariateNormal;
pub use rng::stream_rng;
pub use spline::CubicSpline;
