// src/binning/power.rs
/*!
A one-dimensional **binning result** over wavenumber magnitude.

# Lifecycle
1. The caller builds a `PowerSpectrumBinning` with fixed geometry.
2. An estimator calls [`reset`](PowerSpectrumBinning::reset), accumulates with
   [`add_to_bin`](PowerSpectrumBinning::add_to_bin) and finishes with
   [`normalize`](PowerSpectrumBinning::normalize), the only collective step.
3. The caller inspects or rescales the result (`scale`, `to_physical_units`),
   once per normalized result.

# Geometry
- Edges: `kmin + i·(kmax-kmin)/n` (linear) or `kmin·(kmax/kmin)^{i/n}` (log).
- A magnitude is binned by `floor` on the (linear or log) axis, then checked
  against the stored edges so every bin is exactly `[lo, hi)`; values outside
  `[kmin, kmax)` are dropped.
- `k[i]` is the bin center: arithmetic for linear bins, geometric for log bins.

# Accumulators
- `count[i]  = Σ w`
- `pofk[i]   = Σ w·value`, after `normalize` the mean value (`0` for empty bins)
- `kbin[i]   = Σ w·|k|`,   after `normalize` the realized mean `|k|` (bin center for empty bins)
*/

use std::fs::File;
use std::io::Write;
use std::ops::AddAssign;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::comm::Communicator;
use crate::error::{Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinSpacing {
    Linear,
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSpectrumBinning {
    pub n: usize,
    pub kmin: f64,
    pub kmax: f64,
    pub spacing: BinSpacing,
    /// Bin centers.
    pub k: Vec<f64>,
    pub count: Vec<f64>,
    pub pofk: Vec<f64>,
    pub kbin: Vec<f64>,
    #[serde(default)]
    normalized: bool,
    #[serde(default)]
    scaled: bool,
}


// ======================================================================================
// --------------------------------- Construction ---------------------------------------
// ======================================================================================

impl PowerSpectrumBinning {
    pub fn new(n: usize, kmin: f64, kmax: f64, spacing: BinSpacing) -> Result<Self> {
        if n == 0 {
            return Err(SpectraError::InvalidBinning("number of bins must be > 0".into()));
        }
        if !(kmin >= 0.0 && kmax > kmin && kmax.is_finite()) {
            return Err(SpectraError::InvalidBinning(format!(
                "require 0 <= kmin < kmax < inf, got kmin={kmin}, kmax={kmax}"
            )));
        }
        if spacing == BinSpacing::Log && kmin <= 0.0 {
            return Err(SpectraError::InvalidBinning(format!(
                "logarithmic bins require kmin > 0, got kmin={kmin}"
            )));
        }

        let mut out = Self {
            n,
            kmin,
            kmax,
            spacing,
            k: vec![0.0; n],
            count: vec![0.0; n],
            pofk: vec![0.0; n],
            kbin: vec![0.0; n],
            normalized: false,
            scaled: false,
        };
        for i in 0..n {
            let (lo, hi) = out.edges(i);
            out.k[i] = match spacing {
                BinSpacing::Linear => 0.5 * (lo + hi),
                BinSpacing::Log => (lo * hi).sqrt(),
            };
        }
        Ok(out)
    }

    #[inline]
    pub fn linear(n: usize, kmin: f64, kmax: f64) -> Result<Self> {
        Self::new(n, kmin, kmax, BinSpacing::Linear)
    }

    #[inline]
    pub fn log(n: usize, kmin: f64, kmax: f64) -> Result<Self> {
        Self::new(n, kmin, kmax, BinSpacing::Log)
    }

    /// Same geometry, zeroed accumulators.
    pub fn empty_like(&self) -> Self {
        let mut out = self.clone();
        out.reset();
        out
    }

    /// Lower edge of bin `j`; `j == n` gives `kmax`.
    fn lower_edge(&self, j: usize) -> f64 {
        if j == 0 {
            return self.kmin;
        }
        if j >= self.n {
            return self.kmax;
        }
        match self.spacing {
            BinSpacing::Linear => self.kmin + j as f64 * self.linear_width(),
            BinSpacing::Log => self.kmin * (self.kmax / self.kmin).powf(j as f64 / self.n as f64),
        }
    }

    #[inline]
    fn linear_width(&self) -> f64 {
        (self.kmax - self.kmin) / self.n as f64
    }

    /// `[lo, hi)` of bin `i`.
    pub fn edges(&self, i: usize) -> (f64, f64) {
        (self.lower_edge(i), self.lower_edge(i + 1))
    }

    /// Re-check the geometry; fields are public and may have been edited.
    pub fn validate(&self) -> Result<()> {
        let lens_ok = [self.k.len(), self.count.len(), self.pofk.len(), self.kbin.len()]
            .iter()
            .all(|&l| l == self.n);
        if self.n == 0 || !(self.kmax > self.kmin && self.kmin >= 0.0) || !lens_ok {
            return Err(SpectraError::InvalidBinning(format!(
                "inconsistent binning: n={}, kmin={}, kmax={}",
                self.n, self.kmin, self.kmax
            )));
        }
        Ok(())
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn is_scaled(&self) -> bool {
        self.scaled
    }

    fn same_geometry(&self, other: &Self) -> bool {
        self.n == other.n && self.kmin == other.kmin && self.kmax == other.kmax && self.spacing == other.spacing
    }
}


// ======================================================================================
// --------------------------------- Accumulation ---------------------------------------
// ======================================================================================

impl PowerSpectrumBinning {
    pub fn reset(&mut self) {
        self.count.iter_mut().for_each(|x| *x = 0.0);
        self.pofk.iter_mut().for_each(|x| *x = 0.0);
        self.kbin.iter_mut().for_each(|x| *x = 0.0);
        self.normalized = false;
        self.scaled = false;
    }

    /// Bin of `kmag`, or `None` outside `[kmin, kmax)`.
    ///
    /// The `floor` estimate is moved onto the bin whose stored edges contain
    /// `kmag`, so `bin_index(edges(i).0) == Some(i)` for every bin.
    #[inline]
    pub fn bin_index(&self, kmag: f64) -> Option<usize> {
        if !(kmag >= self.kmin && kmag < self.kmax) {
            return None;
        }
        let t = match self.spacing {
            BinSpacing::Linear => (kmag - self.kmin) / self.linear_width(),
            BinSpacing::Log => (kmag / self.kmin).ln() / (self.kmax / self.kmin).ln() * self.n as f64,
        };
        let mut i = if t.is_finite() && t > 0.0 { (t.floor() as usize).min(self.n - 1) } else { 0 };
        while i > 0 && kmag < self.lower_edge(i) {
            i -= 1;
        }
        while i + 1 < self.n && kmag >= self.lower_edge(i + 1) {
            i += 1;
        }
        Some(i)
    }

    #[inline]
    pub fn add_to_bin(&mut self, kmag: f64, value: f64, weight: f64) {
        debug_assert!(!self.normalized, "add_to_bin on a normalized binning; call reset() first");
        if let Some(i) = self.bin_index(kmag) {
            self.count[i] += weight;
            self.pofk[i] += weight * value;
            self.kbin[i] += weight * kmag;
        }
    }

    /// Sum the accumulators over every process, then turn sums into means.
    ///
    /// # Errors
    /// `AlreadyNormalized` if called twice without a `reset`.
    pub fn normalize(&mut self, comm: &dyn Communicator) -> Result<()> {
        if self.normalized {
            return Err(SpectraError::AlreadyNormalized);
        }
        let n = self.n;
        let mut buffer = Vec::with_capacity(3 * n);
        buffer.extend_from_slice(&self.count);
        buffer.extend_from_slice(&self.pofk);
        buffer.extend_from_slice(&self.kbin);
        comm.reduce_sum(&mut buffer);
        self.count.copy_from_slice(&buffer[..n]);
        self.pofk.copy_from_slice(&buffer[n..2 * n]);
        self.kbin.copy_from_slice(&buffer[2 * n..]);

        for i in 0..n {
            if self.count[i] > 0.0 {
                self.pofk[i] /= self.count[i];
                self.kbin[i] /= self.count[i];
            } else {
                self.pofk[i] = 0.0;
                self.kbin[i] = self.k[i];
            }
        }
        self.normalized = true;
        Ok(())
    }

    /// Element-wise sum of `count`, `pofk` and `kbin`.
    ///
    /// # Errors
    /// `IncompatibleBinning` if geometry or normalization state differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if !self.same_geometry(other) {
            return Err(SpectraError::IncompatibleBinning(format!(
                "n={} [{}, {}) {:?} vs n={} [{}, {}) {:?}",
                self.n, self.kmin, self.kmax, self.spacing, other.n, other.kmin, other.kmax, other.spacing
            )));
        }
        if self.normalized != other.normalized || self.scaled != other.scaled {
            return Err(SpectraError::IncompatibleBinning(
                "cannot combine binnings in different normalization or unit states".into(),
            ));
        }
        for i in 0..self.n {
            self.count[i] += other.count[i];
            self.pofk[i] += other.pofk[i];
            self.kbin[i] += other.kbin[i];
        }
        Ok(())
    }

    /// Divide `count`, `pofk` and `kbin` by `n`, turning a sum of `n` merged results into their mean.
    ///
    /// # Errors
    /// `InvalidBinning` for `n == 0`.
    pub fn average_over(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(SpectraError::InvalidBinning("cannot average over zero results".into()));
        }
        let inv = 1.0 / n as f64;
        for i in 0..self.n {
            self.count[i] *= inv;
            self.pofk[i] *= inv;
            self.kbin[i] *= inv;
        }
        Ok(())
    }
}

impl AddAssign<&PowerSpectrumBinning> for PowerSpectrumBinning {
    /// # Panics
    /// If the binnings are incompatible; use [`merge`](PowerSpectrumBinning::merge) to get an error instead.
    fn add_assign(&mut self, rhs: &PowerSpectrumBinning) {
        if let Err(e) = self.merge(rhs) {
            panic!("PowerSpectrumBinning += : {e}");
        }
    }
}


// ======================================================================================
// -------------------------------- Post-processing -------------------------------------
// ======================================================================================

impl PowerSpectrumBinning {
    /// Multiply the k-axis (`k`, `kbin`) by `k_factor` and `pofk` by `value_factor`.
    ///
    /// # Errors
    /// - `NotNormalized` before [`normalize`](Self::normalize).
    /// - `AlreadyScaled` on a second call without a `reset`.
    pub fn scale(&mut self, k_factor: f64, value_factor: f64) -> Result<()> {
        if !self.normalized {
            return Err(SpectraError::NotNormalized);
        }
        if self.scaled {
            return Err(SpectraError::AlreadyScaled);
        }
        self.kmin *= k_factor;
        self.kmax *= k_factor;
        self.k.iter_mut().for_each(|x| *x *= k_factor);
        self.kbin.iter_mut().for_each(|x| *x *= k_factor);
        self.pofk.iter_mut().for_each(|x| *x *= value_factor);
        self.scaled = true;
        Ok(())
    }

    /// Grid units → physical units for a box of side `box_size` in `ndim` dimensions.
    pub fn to_physical_units(&mut self, box_size: f64, ndim: usize) -> Result<()> {
        if !(box_size > 0.0 && box_size.is_finite()) {
            return Err(SpectraError::InvalidBinning(format!("box size must be positive, got {box_size}")));
        }
        self.scale(1.0 / box_size, box_size.powi(ndim as i32))
    }

    /// `pofk[i] -= shot_noise` for every bin.
    pub fn subtract_shot_noise(&mut self, shot_noise: f64) {
        self.pofk.iter_mut().for_each(|x| *x -= shot_noise);
    }

    pub fn save(&self, output_file: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(output_file)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
