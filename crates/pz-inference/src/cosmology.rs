//! Flat w0-wa background cosmology for multipole scale cuts.

use pz_core::{ComovingDistance, Error, Result};
use pz_prob::math::simpson;
use serde::{Deserialize, Serialize};

/// Speed of light [km/s].
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Simpson intervals per unit redshift.
const STEPS_PER_UNIT_Z: f64 = 256.0;

/// Spatially flat cosmology with matter, radiation and w0-wa dark energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatCosmology {
    /// Dimensionless Hubble parameter
    pub h: f64,
    /// Matter density
    pub omega_m: f64,
    /// Radiation density
    pub omega_r: f64,
    /// Dark-energy equation of state today
    pub w0: f64,
    /// Dark-energy equation of state evolution
    pub wa: f64,
}

impl Default for FlatCosmology {
    fn default() -> Self {
        Self {
            h: 0.6736,
            omega_m: 0.315_193_355_726_963_16,
            omega_r: 7.948_264_018_270_915e-5,
            w0: -1.0,
            wa: 0.0,
        }
    }
}

impl FlatCosmology {
    /// Validated cosmology.
    pub fn new(h: f64, omega_m: f64, omega_r: f64, w0: f64, wa: f64) -> Result<Self> {
        let c = Self { h, omega_m, omega_r, w0, wa };
        c.validate()?;
        Ok(c)
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.h > 0.0) || !self.h.is_finite() {
            return Err(Error::Configuration(format!("h must be finite and > 0, got {}", self.h)));
        }
        if !(self.omega_m >= 0.0) || !(self.omega_r >= 0.0) || self.omega_m + self.omega_r > 1.0 {
            return Err(Error::Configuration(format!(
                "need omega_m, omega_r >= 0 and omega_m + omega_r <= 1, got {} and {}",
                self.omega_m, self.omega_r
            )));
        }
        if !self.w0.is_finite() || !self.wa.is_finite() {
            return Err(Error::Configuration("w0 and wa must be finite".to_string()));
        }
        Ok(())
    }

    /// Dark-energy density.
    pub fn omega_de(&self) -> f64 {
        1.0 - self.omega_m - self.omega_r
    }

    /// Hubble distance `c / H0` [Mpc].
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT_KM_S / (100.0 * self.h)
    }

    /// `H(z) / H0`.
    pub fn e_of_z(&self, z: f64) -> f64 {
        let a = 1.0 + z;
        let de = self.omega_de()
            * a.powf(3.0 * (1.0 + self.w0 + self.wa))
            * (-3.0 * self.wa * z / a).exp();
        (self.omega_r * a.powi(4) + self.omega_m * a.powi(3) + de).sqrt()
    }
}

impl ComovingDistance for FlatCosmology {
    /// Line-of-sight comoving distance [Mpc].
    fn comoving_distance(&self, z: f64) -> f64 {
        if !(z > 0.0) {
            return 0.0;
        }
        let steps = ((z * STEPS_PER_UNIT_Z).ceil() as usize).max(64);
        self.hubble_distance() * simpson(|x| 1.0 / self.e_of_z(x), 0.0, z, steps)
    }
}
