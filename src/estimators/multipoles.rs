// src/estimators/multipoles.rs
/*!
Legendre multipoles of the power spectrum with respect to a fixed line of sight.

For every Fourier cell `μ = k·r̂ / |k|` (`μ = 0` at `k = 0`). The ℓ-th result
first accumulates the moment `⟨μ^ℓ |δ|²⟩`; after normalization the moments are
turned into `⟨L_ℓ(μ) |δ|²⟩` with [`moments_to_multipoles`].

The particle variant moves the particles into redshift space along each
coordinate axis in turn, measures the multipoles with that axis as line of
sight, moves them back and averages the per-axis results.
*/

use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, info};

use super::{deconvolved_density, owned_range, shot_noise};
use crate::binning::PowerSpectrumBinning;
use crate::comm::Communicator;
use crate::error::{Result, SpectraError};
use crate::field::grid::{FourierField, GridStatus};
use crate::math::legendre::moments_to_multipoles;
use crate::particles::assignment::DensityAssignment;
use crate::particles::ParticleContainer;

/// Unnormalized `w·|δ|²·μ^ℓ` for every `ℓ < templates.len()`.
fn accumulate_moments<F: FourierField>(
    grid: &F,
    cells: Range<usize>,
    templates: &[PowerSpectrumBinning],
    los_unit: &[f64],
) -> Vec<PowerSpectrumBinning> {
    let geometry = *grid.geometry();
    let ndim = geometry.ndim;
    let values = grid.fourier_values();
    let empty: Vec<PowerSpectrumBinning> = templates.iter().map(PowerSpectrumBinning::empty_like).collect();

    cells
        .into_par_iter()
        .fold(
            || (empty.clone(), vec![0isize; ndim], vec![0.0; ndim]),
            |(mut pell, mut modes, mut kvec), idx| {
                let kmag = geometry.wavevector(idx, &mut modes, &mut kvec);
                let weight = geometry.hermitian_weight(idx);
                let power = values[idx].norm_sqr();
                let mu = if kmag > 0.0 {
                    kvec.iter().zip(los_unit).map(|(k, r)| k * r).sum::<f64>() / kmag
                } else {
                    0.0
                };
                let mut mu_ell = 1.0;
                for binning in pell.iter_mut() {
                    binning.add_to_bin(kmag, power * mu_ell, weight);
                    mu_ell *= mu;
                }
                (pell, modes, kvec)
            },
        )
        .map(|(pell, _, _)| pell)
        .reduce(
            || empty.clone(),
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
                a
            },
        )
}

/// Multipoles `P_ℓ(k)`, `ℓ = 0..pell.len()`, of a Fourier-space field.
///
/// No shot noise is subtracted.
///
/// # Errors
/// - `InvalidBinning` if `pell` is empty or one of its entries is inconsistent.
/// - `DimensionMismatch` if `line_of_sight.len() != grid.ndim()`.
/// - `ZeroLineOfSight` for a zero-length direction.
pub fn compute_power_spectrum_multipoles<F: FourierField>(
    grid: &F,
    pell: &mut [PowerSpectrumBinning],
    line_of_sight: &[f64],
    comm: &dyn Communicator,
) -> Result<()> {
    let ndim = grid.ndim();
    if line_of_sight.len() != ndim {
        return Err(SpectraError::DimensionMismatch { expected: ndim, actual: line_of_sight.len() });
    }
    if pell.is_empty() {
        return Err(SpectraError::InvalidBinning("need at least one multipole binning".into()));
    }
    for binning in pell.iter() {
        binning.validate()?;
    }
    let rnorm = line_of_sight.iter().map(|r| r * r).sum::<f64>().sqrt();
    if !(rnorm > 0.0) {
        return Err(SpectraError::ZeroLineOfSight);
    }
    grid.require_status(GridStatus::Fourier)?;

    let los_unit: Vec<f64> = line_of_sight.iter().map(|r| r / rnorm).collect();
    let geometry = grid.geometry();
    let cells = owned_range(geometry.num_fourier_cells(), geometry, comm.context());
    let moments = accumulate_moments(grid, cells, pell, &los_unit);

    for (dst, mut src) in pell.iter_mut().zip(moments) {
        src.normalize(comm)?;
        *dst = src;
    }

    let mut rows: Vec<Vec<f64>> = pell.iter().map(|b| b.pofk.clone()).collect();
    moments_to_multipoles(&mut rows);
    for (binning, row) in pell.iter_mut().zip(rows) {
        binning.pofk = row;
    }
    Ok(())
}

/// Redshift-space multipoles of a particle set, averaged over the coordinate axes.
///
/// Along each axis the particles are displaced by `v_axis · velocity_to_displacement`
/// (periodic), redistributed, assigned and displaced back with the same factor.
/// The particles are moved back even when redistribution or assignment fails.
/// The window is deconvolved and `1/NumPartTotal` is subtracted from the monopole.
pub fn compute_power_spectrum_multipoles_from_particles<P>(
    nmesh: usize,
    particles: &mut P,
    velocity_to_displacement: f64,
    pell: &mut [PowerSpectrumBinning],
    method: DensityAssignment,
    comm: &dyn Communicator,
) -> Result<()>
where
    P: ParticleContainer + ?Sized,
{
    if pell.is_empty() {
        return Err(SpectraError::InvalidBinning("need at least one multipole binning".into()));
    }
    for binning in pell.iter() {
        binning.validate()?;
    }
    let ndim = particles.ndim();
    let ctx = comm.context();
    if ctx.is_root() {
        info!(
            nmesh,
            num_total = particles.num_total(),
            ell_max = pell.len() - 1,
            %method,
            "power spectrum multipoles (redshift space)"
        );
    }

    let mut total: Option<Vec<PowerSpectrumBinning>> = None;
    for axis in 0..ndim {
        if ctx.is_root() {
            debug!(axis, "displacing particles along line of sight");
        }
        let mut line_of_sight = vec![0.0; ndim];
        line_of_sight[axis] = 1.0;

        particles.displace_along_axis(axis, velocity_to_displacement);
        let density = particles
            .redistribute()
            .and_then(|()| deconvolved_density(&*particles, nmesh, method, comm));
        // undo the displacement whether or not the assignment succeeded
        particles.displace_along_axis(axis, -velocity_to_displacement);
        let restored = particles.redistribute();
        let density = density?;
        restored?;

        let mut current: Vec<PowerSpectrumBinning> = pell.iter().map(PowerSpectrumBinning::empty_like).collect();
        compute_power_spectrum_multipoles(&density, &mut current, &line_of_sight, comm)?;

        match total.as_mut() {
            None => total = Some(current),
            Some(acc) => {
                for (a, c) in acc.iter_mut().zip(current.iter()) {
                    a.merge(c)?;
                }
            }
        }
    }

    if let Some(mut acc) = total {
        for binning in acc.iter_mut() {
            binning.average_over(ndim)?;
        }
        acc[0].subtract_shot_noise(shot_noise(particles.num_total()));
        for (dst, src) in pell.iter_mut().zip(acc) {
            *dst = src;
        }
    }
    Ok(())
}
