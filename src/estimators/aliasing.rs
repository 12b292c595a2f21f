// src/estimators/aliasing.rs
/*!
Aliasing reduction for the particle power spectrum.

- **Interlacing**: a second density field from the particles shifted by half a
  cell along every axis is phase-corrected and averaged with the first one,
  cancelling the leading alias of the assignment kernel. The shift enters the
  assignment as an offset, so particle positions are never written.
- **Direct summation**: `δ(k) = (1/N_p) Σ_i exp(-i k·x_i)` evaluated for every
  mode; alias free and `O(N_p × cells)`. Every process must hold the same
  particles; each one evaluates its own share of the modes.
*/

use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{info, warn};

use super::{density_grid, owned_range, shot_noise};
use super::power_spectrum::bin_up_power_spectrum;
use crate::binning::PowerSpectrumBinning;
use crate::comm::Communicator;
use crate::error::{Result, SpectraError};
use crate::field::geometry::GridGeometry;
use crate::field::grid::{FourierField, Grid};
use crate::particles::assignment::{deconvolve_window, DensityAssignment};
use crate::particles::ParticleContainer;

// ======================================================================================
// --------------------------------- Interlacing ----------------------------------------
// ======================================================================================

/// Power spectrum from two interlaced grids, window-deconvolved, with
/// `1/NumPartTotal` shot noise removed.
pub fn compute_power_spectrum_interlacing<P>(
    nmesh: usize,
    particles: &P,
    pofk: &mut PowerSpectrumBinning,
    method: DensityAssignment,
    comm: &dyn Communicator,
) -> Result<()>
where
    P: ParticleContainer + ?Sized,
{
    pofk.validate()?;
    let ctx = comm.context();
    if ctx.is_root() {
        info!(nmesh, num_total = particles.num_total(), nbins = pofk.n, %method, "power spectrum (interlaced)");
    }

    let mut grid = density_grid(particles, nmesh, method, 0.0, comm)?;
    let shift = 1.0 / (2.0 * nmesh as f64);
    let mut shifted = density_grid(particles, nmesh, method, shift, comm)?;
    grid.forward_transform()?;
    shifted.forward_transform()?;

    let geometry = *grid.geometry();
    let ndim = geometry.ndim;
    grid.fourier_values_mut()
        .par_iter_mut()
        .zip(shifted.fourier_values().par_iter())
        .enumerate()
        .for_each_init(
            || (vec![0isize; ndim], vec![0.0; ndim]),
            |(modes, kvec), (idx, (a, b))| {
                geometry.wavevector(idx, modes, kvec);
                let ksum: f64 = kvec.iter().sum();
                let phase = Complex64::from_polar(1.0, ksum * shift);
                *a = (*a + phase * b) * 0.5;
            },
        );
    drop(shifted);

    deconvolve_window(&mut grid, method)?;
    bin_up_power_spectrum(&grid, pofk, comm)?;
    pofk.subtract_shot_noise(shot_noise(particles.num_total()));
    Ok(())
}


// ======================================================================================
// ------------------------------- Direct summation -------------------------------------
// ======================================================================================

/// Alias-free power spectrum by brute-force Fourier sums over the local particles,
/// with `1/NumPart` shot noise removed.
pub fn compute_power_spectrum_direct_summation<P>(
    nmesh: usize,
    particles: &P,
    pofk: &mut PowerSpectrumBinning,
    comm: &dyn Communicator,
) -> Result<()>
where
    P: ParticleContainer + ?Sized,
{
    pofk.validate()?;
    let geometry = GridGeometry::new(particles.ndim(), nmesh)?;
    let num_part = particles.num_local();
    if num_part == 0 {
        return Err(SpectraError::InvalidGrid("direct summation needs at least one particle".into()));
    }

    let ctx = comm.context();
    if ctx.is_root() {
        if ctx.is_distributed() {
            warn!(
                world_size = ctx.world_size,
                "direct summation assumes every process holds the same particles"
            );
        }
        info!(nmesh, num_part, nbins = pofk.n, "power spectrum (direct summation)");
    }

    let ndim = geometry.ndim;
    let norm = 1.0 / num_part as f64;
    let axes: Vec<&[f64]> = (0..ndim).map(|d| particles.positions(d)).collect();
    let cells = owned_range(geometry.num_fourier_cells(), &geometry, ctx);

    let mut values = vec![Complex64::new(0.0, 0.0); geometry.num_fourier_cells()];
    values[cells.clone()]
        .par_iter_mut()
        .enumerate()
        .for_each_init(
            || (vec![0isize; ndim], vec![0.0; ndim]),
            |(modes, kvec), (offset, value)| {
                let idx = cells.start + offset;
                geometry.wavevector(idx, modes, kvec);
                let mut sum = (0..num_part).fold(Complex64::new(0.0, 0.0), |acc, i| {
                    let kx: f64 = kvec.iter().zip(axes.iter()).map(|(k, x)| k * x[i]).sum();
                    acc + Complex64::new(kx.cos(), -kx.sin())
                });
                if idx == 0 {
                    sum -= 1.0;
                }
                *value = sum * norm;
            },
        );

    let grid = Grid::from_fourier_values(geometry, values)?;
    bin_up_power_spectrum(&grid, pofk, comm)?;
    pofk.subtract_shot_noise(shot_noise(num_part));
    Ok(())
}
