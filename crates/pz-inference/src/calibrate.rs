//! Shift / Scale / Correct calibration of ensemble densities toward a truth summary.
//!
//! - **Shift** translates each bin's average curve by `delta`, drawn from
//!   `MVN(mu_truth - average_mu, Cov(mu))`.
//! - **Scale** additionally stretches about the estimated mean by
//!   `1 + zeta / eta`, with `zeta ~ MVN(eta_truth - average_eta, Cov(eta))`.
//! - **Correct** adds the curve-level difference `truth_average - average`
//!   to every realization.
//!
//! Every output curve is clipped at zero and renormalized.

use pz_core::{Ensemble, EnsembleCube, Error, RedshiftGrid, Result};
use pz_prob::{CubicSpline, MultivariateNormal, stream_rng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::summary::{EnsembleSummary, TruthSummary};

/// RNG stream reserved for calibration draws.
const CALIBRATION_STREAM: u64 = 0x4341_4C42;

/// Calibration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStrategy {
    /// Mean offset
    Shift,
    /// Mean offset and width rescaling
    Scale,
    /// Non-parametric curve correction
    Correct,
}

impl CalibrationStrategy {
    /// All strategies, in validation order.
    pub const ALL: [CalibrationStrategy; 3] = [Self::Shift, Self::Scale, Self::Correct];
}

/// Per-realization, per-bin calibration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDraw {
    /// Mean offset `[realization][bin]`
    pub shift: Vec<Vec<f64>>,
    /// Dispersion perturbation `[realization][bin]` (Scale only)
    pub scale: Option<Vec<Vec<f64>>>,
}

impl CalibrationDraw {
    /// Number of realizations.
    pub fn realizations(&self) -> usize {
        self.shift.len()
    }

    /// The draw with every offset and perturbation negated.
    pub fn negated(&self) -> Self {
        Self { shift: negate(&self.shift), scale: self.scale.as_deref().map(negate) }
    }
}

fn negate(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.iter().map(|r| r.iter().map(|v| -v).collect()).collect()
}

fn check_bins(truth: &TruthSummary, estimate: &EnsembleSummary) -> Result<()> {
    if truth.n_bins() != estimate.n_bins() {
        return Err(Error::Configuration(format!(
            "truth has {} bins, estimate has {}",
            truth.n_bins(),
            estimate.n_bins()
        )));
    }
    Ok(())
}

fn difference(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Draw Shift or Scale parameters for `realizations` realizations.
pub fn draw_calibration(
    strategy: CalibrationStrategy,
    truth: &TruthSummary,
    estimate: &EnsembleSummary,
    realizations: usize,
    seed: u64,
) -> Result<CalibrationDraw> {
    if strategy == CalibrationStrategy::Correct {
        return Err(Error::Configuration("Correct is applied without a parametric draw".to_string()));
    }
    check_bins(truth, estimate)?;
    let mut rng = stream_rng(seed, CALIBRATION_STREAM, 0);

    let shift_mvn = MultivariateNormal::new(&difference(&truth.mean, &estimate.average_mu), &estimate.mu_covariance())?;
    let shift = shift_mvn.sample_n(&mut rng, realizations);
    let scale = match strategy {
        CalibrationStrategy::Scale => {
            let mvn = MultivariateNormal::new(
                &difference(&truth.dispersion, &estimate.average_eta),
                &estimate.eta_covariance(),
            )?;
            Some(mvn.sample_n(&mut rng, realizations))
        }
        _ => None,
    };
    Ok(CalibrationDraw { shift, scale })
}

fn check_draw(cube: &EnsembleCube, draw: &CalibrationDraw) -> Result<()> {
    for (r, row) in draw.shift.iter().enumerate() {
        pz_core::ensure_len(&format!("shift draw {r} (bins)"), cube.n_bins(), row.len())?;
    }
    if let Some(scale) = &draw.scale {
        pz_core::ensure_len("scale draw (realizations)", draw.realizations(), scale.len())?;
        for (r, row) in scale.iter().enumerate() {
            pz_core::ensure_len(&format!("scale draw {r} (bins)"), cube.n_bins(), row.len())?;
        }
    }
    Ok(())
}

/// Resample every bin's average curve at remapped coordinates, one realization per draw.
fn remap(
    cube: &EnsembleCube,
    grid: &RedshiftGrid,
    realizations: usize,
    coordinate: impl Fn(usize, usize, f64) -> f64 + Sync,
) -> Result<EnsembleCube> {
    cube.validate(grid)?;
    let bins = cube
        .bins
        .iter()
        .enumerate()
        .map(|(b, e)| {
            let spline = CubicSpline::new(grid.points(), &e.average)?;
            let data: Vec<Vec<f64>> = (0..realizations)
                .into_par_iter()
                .map(|r| {
                    let mut curve: Vec<f64> = grid.points().iter().map(|&z| spline.evaluate(coordinate(r, b, z))).collect();
                    grid.clip_and_normalize(&mut curve);
                    curve
                })
                .collect();
            Ensemble::from_realizations(data, grid)
        })
        .collect::<Result<Vec<_>>>()?;
    EnsembleCube::new(bins)
}

/// Translate each bin's average by `shift[r][b]`.
pub fn apply_shift(cube: &EnsembleCube, grid: &RedshiftGrid, draw: &CalibrationDraw) -> Result<EnsembleCube> {
    check_draw(cube, draw)?;
    remap(cube, grid, draw.realizations(), |r, b, z| z - draw.shift[r][b])
}

/// Translate and stretch each bin's average about the estimated mean.
///
/// A bin whose estimated dispersion is not positive, or whose perturbation
/// is exactly zero, is only translated.
pub fn apply_scale(
    cube: &EnsembleCube,
    grid: &RedshiftGrid,
    draw: &CalibrationDraw,
    estimate: &EnsembleSummary,
) -> Result<EnsembleCube> {
    check_draw(cube, draw)?;
    pz_core::ensure_len("estimate bins", cube.n_bins(), estimate.n_bins())?;
    let Some(scale) = &draw.scale else {
        return Err(Error::Configuration("Scale needs dispersion perturbations".to_string()));
    };
    remap(cube, grid, draw.realizations(), |r, b, z| {
        let delta = draw.shift[r][b];
        let zeta = scale[r][b];
        let (mu, eta) = (estimate.average_mu[b], estimate.average_eta[b]);
        if zeta == 0.0 || eta.is_nan() || eta <= 0.0 {
            z - delta
        } else {
            mu + (z - mu - delta) / (1.0 + zeta / eta)
        }
    })
}

/// Add `truth_average - average` to every realization of every bin.
pub fn apply_correct(cube: &EnsembleCube, grid: &RedshiftGrid, truth_average: &[Vec<f64>]) -> Result<EnsembleCube> {
    cube.validate(grid)?;
    pz_core::ensure_len("truth average (bins)", cube.n_bins(), truth_average.len())?;
    let bins = cube
        .bins
        .iter()
        .zip(truth_average)
        .enumerate()
        .map(|(b, (e, truth))| {
            grid.check(&format!("truth average {b}"), truth)?;
            let correction = difference(truth, &e.average);
            let data = e
                .data
                .iter()
                .map(|curve| {
                    let mut out: Vec<f64> = curve.iter().zip(&correction).map(|(v, c)| v + c).collect();
                    grid.clip_and_normalize(&mut out);
                    out
                })
                .collect();
            Ensemble::from_realizations(data, grid)
        })
        .collect::<Result<Vec<_>>>()?;
    EnsembleCube::new(bins)
}

/// Calibrated ensemble plus the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    /// Strategy applied
    pub strategy: CalibrationStrategy,
    /// Calibrated ensemble
    pub cube: EnsembleCube,
    /// Draw used (None for Correct)
    pub draw: Option<CalibrationDraw>,
}

/// Applies any strategy against one truth summary and one estimate.
#[derive(Debug, Clone)]
pub struct Calibrator<'a> {
    grid: &'a RedshiftGrid,
    truth: &'a TruthSummary,
    estimate: &'a EnsembleSummary,
    realizations: usize,
    seed: u64,
}

impl<'a> Calibrator<'a> {
    /// New calibrator; fails on mismatched bin counts.
    pub fn new(
        grid: &'a RedshiftGrid,
        truth: &'a TruthSummary,
        estimate: &'a EnsembleSummary,
        realizations: usize,
        seed: u64,
    ) -> Result<Self> {
        check_bins(truth, estimate)?;
        if realizations == 0 {
            return Err(Error::Configuration("realizations must be > 0".to_string()));
        }
        Ok(Self { grid, truth, estimate, realizations, seed })
    }

    /// Calibrate `cube` with `strategy`.
    pub fn calibrate(&self, strategy: CalibrationStrategy, cube: &EnsembleCube) -> Result<CalibrationOutcome> {
        pz_core::ensure_len("cube bins", self.truth.n_bins(), cube.n_bins())?;
        let start = std::time::Instant::now();
        let (calibrated, draw) = match strategy {
            CalibrationStrategy::Shift => {
                let draw = draw_calibration(strategy, self.truth, self.estimate, self.realizations, self.seed)?;
                (apply_shift(cube, self.grid, &draw)?, Some(draw))
            }
            CalibrationStrategy::Scale => {
                let draw = draw_calibration(strategy, self.truth, self.estimate, self.realizations, self.seed)?;
                (apply_scale(cube, self.grid, &draw, self.estimate)?, Some(draw))
            }
            CalibrationStrategy::Correct => {
                let average = self.truth.average.as_deref().ok_or_else(|| {
                    Error::Configuration("Correct needs truth average curves".to_string())
                })?;
                (apply_correct(cube, self.grid, average)?, None)
            }
        };
        tracing::info!(
            strategy = ?strategy,
            bins = calibrated.n_bins(),
            realizations = calibrated.realizations(),
            wall_s = start.elapsed().as_secs_f64(),
            "calibration complete"
        );
        Ok(CalibrationOutcome { strategy, cube: calibrated, draw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pz_core::SampleKind;

    fn gaussian(grid: &RedshiftGrid, mu: f64, sd: f64) -> Vec<f64> {
        let mut y: Vec<f64> = grid.points().iter().map(|z| (-0.5 * ((z - mu) / sd).powi(2)).exp()).collect();
        grid.normalize(&mut y);
        y
    }

    fn setup() -> (RedshiftGrid, EnsembleCube) {
        let g = RedshiftGrid::linspace(0.0, 3.0, 300).unwrap();
        let e = Ensemble::from_realizations(
            vec![gaussian(&g, 0.95, 0.2), gaussian(&g, 1.0, 0.2), gaussian(&g, 1.05, 0.2)],
            &g,
        )
        .unwrap();
        (g, EnsembleCube::new(vec![e]).unwrap())
    }

    #[test]
    fn test_zero_offset_zero_covariance_shift_is_identity() {
        let (g, cube) = setup();
        let draw = CalibrationDraw { shift: vec![vec![0.0]; 4], scale: None };
        let out = apply_shift(&cube, &g, &draw).unwrap();
        assert_eq!(out.realizations(), 4);
        for r in 0..4 {
            for (x, y) in out.curve(0, r).iter().zip(&cube.bins[0].average) {
                assert_relative_eq!(*x, *y, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_scale_with_zero_zeta_equals_shift() {
        let (g, cube) = setup();
        let est = EnsembleSummary::from_cube(SampleKind::Lens, "dir", &cube, &g).unwrap();
        let draw = CalibrationDraw { shift: vec![vec![0.03], vec![-0.02]], scale: Some(vec![vec![0.0], vec![0.0]]) };
        let shifted = apply_shift(&cube, &g, &draw).unwrap();
        let scaled = apply_scale(&cube, &g, &draw, &est).unwrap();
        assert_eq!(shifted, scaled);
    }

    #[test]
    fn test_scale_widens() {
        let (g, cube) = setup();
        let est = EnsembleSummary::from_cube(SampleKind::Lens, "dir", &cube, &g).unwrap();
        let draw = CalibrationDraw { shift: vec![vec![0.0]], scale: Some(vec![vec![0.05]]) };
        let scaled = apply_scale(&cube, &g, &draw, &est).unwrap();
        let eta = g.dispersion(scaled.curve(0, 0));
        assert_relative_eq!(eta, est.average_eta[0] + 0.05, epsilon = 1e-3);
    }

    #[test]
    fn test_draws_follow_truth_offset() {
        let (g, cube) = setup();
        let est = EnsembleSummary::from_cube(SampleKind::Lens, "dir", &cube, &g).unwrap();
        let truth = TruthSummary::new(vec![est.average_mu[0] + 0.1], vec![est.average_eta[0]]).unwrap();
        let draw = draw_calibration(CalibrationStrategy::Shift, &truth, &est, 2000, 5).unwrap();
        let mean = draw.shift.iter().map(|d| d[0]).sum::<f64>() / 2000.0;
        // Cov(mu) ~ 0.0025 -> standard error ~ 0.0011
        assert_relative_eq!(mean, 0.1, epsilon = 0.006);
        assert!(draw.scale.is_none());

        let scale = draw_calibration(CalibrationStrategy::Scale, &truth, &est, 10, 5).unwrap();
        assert_eq!(scale.scale.as_ref().map(Vec::len), Some(10));
    }

    #[test]
    fn test_correct_moves_average_to_truth() {
        let (g, cube) = setup();
        let truth_curve = gaussian(&g, 1.0, 0.21);
        let out = apply_correct(&cube, &g, &[truth_curve.clone()]).unwrap();
        for (x, y) in out.bins[0].average.iter().zip(&truth_curve) {
            assert_relative_eq!(*x, *y, epsilon = 1e-3);
        }
        for r in 0..out.realizations() {
            assert!(g.is_density_or_zero(out.curve(0, r), 1e-12));
        }
    }

    #[test]
    fn test_calibrator_errors() {
        let (g, cube) = setup();
        let est = EnsembleSummary::from_cube(SampleKind::Lens, "dir", &cube, &g).unwrap();
        let truth = TruthSummary::new(vec![1.0], vec![0.2]).unwrap();
        let cal = Calibrator::new(&g, &truth, &est, 3, 0).unwrap();
        assert!(matches!(cal.calibrate(CalibrationStrategy::Correct, &cube), Err(Error::Configuration(_))));
        assert!(cal.calibrate(CalibrationStrategy::Shift, &cube).is_ok());

        let two = TruthSummary::new(vec![1.0, 1.0], vec![0.2, 0.2]).unwrap();
        assert!(Calibrator::new(&g, &two, &est, 3, 0).is_err());
    }
}
