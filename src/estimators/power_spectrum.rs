// src/estimators/power_spectrum.rs
//! Plain power spectrum: `P(k) = ⟨|δ(k)|²⟩` over spherical shells in `|k|`,
//! each stored half-complex cell weighted by its Hermitian multiplicity.

use std::ops::Range;

use rayon::prelude::*;
use tracing::info;

use super::{deconvolved_density, owned_range, shot_noise};
use crate::binning::PowerSpectrumBinning;
use crate::comm::Communicator;
use crate::error::Result;
use crate::field::grid::{FourierField, GridStatus};
use crate::particles::assignment::DensityAssignment;
use crate::particles::ParticleContainer;

/// Unnormalized accumulation of `w·|δ|²` over the Fourier cells in `cells`.
pub(crate) fn accumulate_power<F: FourierField>(
    grid: &F,
    cells: Range<usize>,
    template: &PowerSpectrumBinning,
) -> PowerSpectrumBinning {
    let geometry = *grid.geometry();
    let ndim = geometry.ndim;
    let values = grid.fourier_values();
    let empty = template.empty_like();

    cells
        .into_par_iter()
        .fold(
            || (empty.clone(), vec![0isize; ndim], vec![0.0; ndim]),
            |(mut binning, mut modes, mut kvec), idx| {
                let kmag = geometry.wavevector(idx, &mut modes, &mut kvec);
                binning.add_to_bin(kmag, values[idx].norm_sqr(), geometry.hermitian_weight(idx));
                (binning, modes, kvec)
            },
        )
        .map(|(binning, _, _)| binning)
        .reduce(
            || empty.clone(),
            |mut a, b| {
                a += &b;
                a
            },
        )
}

/// Bin `|δ(k)|²` of a Fourier-space field into `pofk` (reset, accumulate, normalize).
///
/// The result is in grid units and carries no shot-noise correction.
pub fn bin_up_power_spectrum<F: FourierField>(
    grid: &F,
    pofk: &mut PowerSpectrumBinning,
    comm: &dyn Communicator,
) -> Result<()> {
    pofk.validate()?;
    grid.require_status(GridStatus::Fourier)?;

    let geometry = grid.geometry();
    let cells = owned_range(geometry.num_fourier_cells(), geometry, comm.context());
    *pofk = accumulate_power(grid, cells, pofk);
    pofk.normalize(comm)
}

/// Particles → density → `P(k)` with window deconvolution and `1/NumPartTotal`
/// shot noise removed from every bin.
pub fn compute_power_spectrum<P>(
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
        info!(nmesh, num_total = particles.num_total(), nbins = pofk.n, %method, "power spectrum");
    }

    let density = deconvolved_density(particles, nmesh, method, comm)?;
    bin_up_power_spectrum(&density, pofk, comm)?;
    pofk.subtract_shot_noise(shot_noise(particles.num_total()));
    Ok(())
}
