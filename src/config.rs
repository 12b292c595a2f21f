// src/config.rs
/*!
Serializable description of a full estimation run.

```json
{
  "nmesh": 64,
  "assignment": "CIC",
  "interlacing": true,
  "binning": { "nbins": 32, "kmin": 0.0, "kmax": 100.0, "spacing": "linear" },
  "ell_max": 4,
  "box_size": 1000.0,
  "velocity_to_displacement": 1e-5
}
```

`validate()` runs every precondition the estimators would reject, so a bad
file fails before any process enters a collective call.

[`EstimatorConfig::power_spectrum`] and [`EstimatorConfig::multipoles`] run the
particle pipelines the document describes. `interlacing` selects the
interlaced monopole estimator; the multipoles are always computed without it.
Results are converted to physical units unless `box_size` is `1.0`.
*/

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::binning::{BinSpacing, PowerSpectrumBinning};
use crate::comm::Communicator;
use crate::error::{Result, SpectraError};
use crate::estimators::{
    compute_power_spectrum, compute_power_spectrum_interlacing, compute_power_spectrum_multipoles_from_particles,
};
use crate::particles::assignment::DensityAssignment;
use crate::particles::ParticleContainer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    pub nbins: usize,
    pub kmin: f64,
    pub kmax: f64,
    #[serde(default = "default_spacing")]
    pub spacing: BinSpacing,
}

fn default_spacing() -> BinSpacing {
    BinSpacing::Linear
}

impl BinningConfig {
    pub fn build(&self) -> Result<PowerSpectrumBinning> {
        PowerSpectrumBinning::new(self.nbins, self.kmin, self.kmax, self.spacing)
    }

    /// One binning per multipole `ℓ = 0..=ell_max`.
    pub fn build_multipoles(&self, ell_max: usize) -> Result<Vec<PowerSpectrumBinning>> {
        let template = self.build()?;
        Ok(vec![template; ell_max + 1])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub nmesh: usize,
    #[serde(default = "default_assignment")]
    pub assignment: DensityAssignment,
    #[serde(default)]
    pub interlacing: bool,
    pub binning: BinningConfig,
    #[serde(default)]
    pub ell_max: usize,
    /// Side length of the box in physical units; `1.0` keeps grid units.
    #[serde(default = "default_box_size")]
    pub box_size: f64,
    /// Velocity → displacement factor (units of the box) for redshift space.
    #[serde(default)]
    pub velocity_to_displacement: f64,
}

fn default_assignment() -> DensityAssignment {
    DensityAssignment::Cic
}

fn default_box_size() -> f64 {
    1.0
}

impl EstimatorConfig {
    pub fn new(nmesh: usize, binning: BinningConfig) -> Self {
        Self {
            nmesh,
            assignment: default_assignment(),
            interlacing: false,
            binning,
            ell_max: 0,
            box_size: default_box_size(),
            velocity_to_displacement: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.nmesh == 0 {
            return Err(SpectraError::InvalidGrid("nmesh must be > 0".into()));
        }
        if !(self.box_size > 0.0 && self.box_size.is_finite()) {
            return Err(SpectraError::InvalidGrid(format!("box_size must be positive, got {}", self.box_size)));
        }
        if !self.velocity_to_displacement.is_finite() {
            return Err(SpectraError::InvalidGrid("velocity_to_displacement must be finite".into()));
        }
        self.binning.build()?;
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, output_file: &Path) -> Result<()> {
        let mut file = File::create(output_file)?;
        file.write_all(self.to_json_string()?.as_bytes())?;
        Ok(())
    }
}


// ======================================================================================
// ----------------------------------- Running ------------------------------------------
// ======================================================================================

impl EstimatorConfig {
    /// Shot-noise subtracted monopole of `particles`.
    pub fn power_spectrum<P>(&self, particles: &P, comm: &dyn Communicator) -> Result<PowerSpectrumBinning>
    where
        P: ParticleContainer + ?Sized,
    {
        self.validate()?;
        let mut pofk = self.binning.build()?;
        if self.interlacing {
            compute_power_spectrum_interlacing(self.nmesh, particles, &mut pofk, self.assignment, comm)?;
        } else {
            compute_power_spectrum(self.nmesh, particles, &mut pofk, self.assignment, comm)?;
        }
        self.convert_units(&mut pofk, particles.ndim())?;
        Ok(pofk)
    }

    /// Redshift-space multipoles `ℓ = 0..=ell_max`, displacing by `velocity_to_displacement`.
    pub fn multipoles<P>(&self, particles: &mut P, comm: &dyn Communicator) -> Result<Vec<PowerSpectrumBinning>>
    where
        P: ParticleContainer + ?Sized,
    {
        self.validate()?;
        let mut pell = self.binning.build_multipoles(self.ell_max)?;
        compute_power_spectrum_multipoles_from_particles(
            self.nmesh,
            particles,
            self.velocity_to_displacement,
            &mut pell,
            self.assignment,
            comm,
        )?;
        let ndim = particles.ndim();
        for binning in pell.iter_mut() {
            self.convert_units(binning, ndim)?;
        }
        Ok(pell)
    }

    fn convert_units(&self, binning: &mut PowerSpectrumBinning, ndim: usize) -> Result<()> {
        if self.box_size == 1.0 {
            return Ok(());
        }
        binning.to_physical_units(self.box_size, ndim)
    }
}
