// src/estimators/mod.rs
/*!
Spectral estimators.

Grid-level entry points (`bin_up_power_spectrum`, `compute_power_spectrum_multipoles`,
`compute_bispectrum`, `compute_polyspectrum`) take a Fourier-space field and a
caller-owned binning that they reset, fill and normalize in place.
Particle-level pipelines assign, transform, deconvolve, estimate and subtract
shot noise.

# Work sharing
- A slab grid (part of the mesh) contributes every one of its local cells.
- A full-mesh grid is treated as **replicated** on every process: each process
  contributes only its own contiguous share of the cells, so the reduced result
  does not depend on the number of processes.

Particle pipelines build one full-mesh grid per process from the all-reduced
mass of every process's local particles.
*/

pub mod power_spectrum;
pub mod aliasing;
pub mod multipoles;
pub mod polyspectrum;

pub use aliasing::{compute_power_spectrum_direct_summation, compute_power_spectrum_interlacing};
pub use multipoles::{compute_power_spectrum_multipoles, compute_power_spectrum_multipoles_from_particles};
pub use polyspectrum::{
    compute_bispectrum, compute_bispectrum_from_particles, compute_polyspectrum,
    compute_polyspectrum_from_particles,
};
pub use power_spectrum::{bin_up_power_spectrum, compute_power_spectrum};

use std::ops::Range;

use crate::comm::{Communicator, ExecutionContext};
use crate::error::Result;
use crate::field::geometry::GridGeometry;
use crate::field::grid::{FourierField, Grid, GridStatus};
use crate::particles::assignment::{assign_mass, deconvolve_window, mass_to_density_contrast, DensityAssignment};
use crate::particles::ParticleContainer;

/// Contiguous share of `total` cells this process is responsible for.
pub(crate) fn owned_range(total: usize, geometry: &GridGeometry, ctx: ExecutionContext) -> Range<usize> {
    if !geometry.owns_full_mesh() || ctx.world_size == 1 {
        return 0..total;
    }
    let per = total / ctx.world_size;
    let rem = total % ctx.world_size;
    let start = ctx.rank * per + ctx.rank.min(rem);
    let len = per + usize::from(ctx.rank < rem);
    start..start + len
}

/// Shot-noise level of a Poisson sample of `num_particles` points in grid units.
#[inline]
pub fn shot_noise(num_particles: usize) -> f64 {
    1.0 / num_particles as f64
}

/// Full-mesh density contrast of the particles of every process, with
/// each particle shifted by `offset` along every axis.
pub(crate) fn density_grid<P>(
    particles: &P,
    nmesh: usize,
    method: DensityAssignment,
    offset: f64,
    comm: &dyn Communicator,
) -> Result<Grid>
where
    P: ParticleContainer + ?Sized,
{
    let geometry = GridGeometry::new(particles.ndim(), nmesh)?;
    let mut mass = assign_mass(particles, &geometry, method, offset)?;
    comm.reduce_sum(&mut mass);
    let mut grid = Grid::from_real_values(geometry, vec![0.0; geometry.num_real_cells()])?;
    mass_to_density_contrast(&mut grid, &mass, particles.num_total())?;
    Ok(grid)
}

/// Assign, transform and deconvolve: the common head of every particle pipeline.
pub(crate) fn deconvolved_density<P>(
    particles: &P,
    nmesh: usize,
    method: DensityAssignment,
    comm: &dyn Communicator,
) -> Result<Grid>
where
    P: ParticleContainer + ?Sized,
{
    let mut grid = density_grid(particles, nmesh, method, 0.0, comm)?;
    grid.forward_transform()?;
    deconvolve_window(&mut grid, method)?;
    debug_assert_eq!(grid.status(), GridStatus::Fourier);
    Ok(grid)
}
