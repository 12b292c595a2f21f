// src/field/smoothing.rs
//! Stateless low-pass filters applied to every local Fourier cell in one pass.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::grid::{FourierField, GridStatus};
use crate::error::{Result, SpectraError};

/// Below this `kR` the top-hat windows are replaced by their limit `1`.
const TOPHAT_SMALL_KR: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingFilter {
    /// `1` for `kR < 1`, else `0`.
    SharpK,
    /// `exp(-(kR)²/2)`.
    Gaussian,
    /// Fourier transform of the indicator of a disc (2-D) or ball (3-D).
    TopHat,
}

impl FromStr for SmoothingFilter {
    type Err = SpectraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sharpk" => Ok(Self::SharpK),
            "gaussian" => Ok(Self::Gaussian),
            "tophat" => Ok(Self::TopHat),
            _ => Err(SpectraError::UnknownFilter(s.to_string())),
        }
    }
}

impl fmt::Display for SmoothingFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SharpK => "sharpk",
            Self::Gaussian => "gaussian",
            Self::TopHat => "tophat",
        };
        f.write_str(name)
    }
}

impl SmoothingFilter {
    /// Window value at `kR` in `ndim` dimensions.
    ///
    /// # Errors
    /// `Unsupported` for a top-hat outside 2-D/3-D.
    pub fn window(&self, kr: f64, ndim: usize) -> Result<f64> {
        match self {
            Self::SharpK => Ok(if kr < 1.0 { 1.0 } else { 0.0 }),
            Self::Gaussian => Ok((-0.5 * kr * kr).exp()),
            Self::TopHat => {
                check_tophat_dimension(ndim)?;
                if kr < TOPHAT_SMALL_KR {
                    return Ok(1.0);
                }
                Ok(match ndim {
                    2 => 2.0 / (kr * kr) * (1.0 - kr.cos()),
                    _ => 3.0 * (kr.sin() - kr * kr.cos()) / (kr * kr * kr),
                })
            }
        }
    }
}

fn check_tophat_dimension(ndim: usize) -> Result<()> {
    if ndim == 2 || ndim == 3 {
        Ok(())
    } else {
        Err(SpectraError::Unsupported(format!(
            "tophat filter is only implemented in 2D and 3D, got ndim={ndim}"
        )))
    }
}

/// Multiply every local Fourier cell by `filter(|k| · smoothing_scale)`.
pub fn smoothing_filter_fourier_space<F: FourierField>(
    grid: &mut F,
    smoothing_scale: f64,
    filter: SmoothingFilter,
) -> Result<()> {
    grid.require_status(GridStatus::Fourier)?;
    let geometry = *grid.geometry();
    let ndim = geometry.ndim;
    debug!(%filter, smoothing_scale, "smoothing in Fourier space");

    grid.fourier_values_mut()
        .par_iter_mut()
        .enumerate()
        .try_for_each_init(
            || (vec![0isize; ndim], vec![0.0; ndim]),
            |(modes, kvec), (idx, value)| {
                let kmag = geometry.wavevector(idx, modes, kvec);
                *value *= filter.window(kmag * smoothing_scale, ndim)?;
                Ok(())
            },
        )
}
