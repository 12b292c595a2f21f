// src/particles/assignment.rs
/*!
Particle → mesh **mass assignment** and the matching Fourier-space window
deconvolution.

# Kernels (per axis, `u = x·Nmesh`)
- `NGP` (order 1): all mass to node `round(u)`.
- `CIC` (order 2): linear weights on nodes `floor(u)`, `floor(u)+1`.
- `TSC` (order 3): quadratic weights on the three nodes around `round(u)`.
- `PCS` (order 4): cubic B-spline weights on nodes `floor(u)-1 … floor(u)+2`.

The N-dimensional weight is the product of the per-axis weights, and the
window in Fourier space is `Π_j sinc(π n_j / Nmesh)^order`.

# Output
`particles_to_grid` leaves the grid in real space holding the density contrast
`δ = W · Nmesh^N / NumPartTotal − 1`.
*/

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ParticleContainer;
use crate::error::{Result, SpectraError};
use crate::field::geometry::GridGeometry;
use crate::field::grid::{FourierField, GridStatus};

/// Largest kernel support (PCS).
pub const MAX_SUPPORT: usize = 4;

/// Lower bound on particles per rayon task; each task owns a full mass buffer.
const PARTICLES_PER_TASK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DensityAssignment {
    Ngp,
    Cic,
    Tsc,
    Pcs,
}

impl FromStr for DensityAssignment {
    type Err = SpectraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NGP" => Ok(Self::Ngp),
            "CIC" => Ok(Self::Cic),
            "TSC" => Ok(Self::Tsc),
            "PCS" => Ok(Self::Pcs),
            _ => Err(SpectraError::UnknownAssignment(s.to_string())),
        }
    }
}

impl fmt::Display for DensityAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ngp => "NGP",
            Self::Cic => "CIC",
            Self::Tsc => "TSC",
            Self::Pcs => "PCS",
        };
        f.write_str(name)
    }
}

impl DensityAssignment {
    /// Kernel order, also the number of nodes touched per axis.
    #[inline]
    pub fn order(&self) -> usize {
        match self {
            Self::Ngp => 1,
            Self::Cic => 2,
            Self::Tsc => 3,
            Self::Pcs => 4,
        }
    }

    /// Extra `(left, right)` axis-0 planes a slab needs to receive mass from
    /// particles owned by its neighbours.
    #[inline]
    pub fn slices_needed(&self) -> (usize, usize) {
        match self {
            Self::Ngp | Self::Cic => (0, 1),
            Self::Tsc | Self::Pcs => (1, 2),
        }
    }

    /// Node weights along one axis for grid coordinate `u = x·Nmesh`.
    /// Returns the first node index; `weights[..order()]` are valid.
    #[inline]
    pub fn axis_weights(&self, u: f64, weights: &mut [f64; MAX_SUPPORT]) -> isize {
        match self {
            Self::Ngp => {
                weights[0] = 1.0;
                (u + 0.5).floor() as isize
            }
            Self::Cic => {
                let i = u.floor();
                let dx = u - i;
                weights[0] = 1.0 - dx;
                weights[1] = dx;
                i as isize
            }
            Self::Tsc => {
                let i = (u + 0.5).floor();
                let dx = u - i;
                weights[0] = 0.5 * (0.5 - dx) * (0.5 - dx);
                weights[1] = 0.75 - dx * dx;
                weights[2] = 0.5 * (0.5 + dx) * (0.5 + dx);
                i as isize - 1
            }
            Self::Pcs => {
                let i = u.floor();
                let start = i - 1.0;
                for (j, w) in weights.iter_mut().enumerate() {
                    let s = (u - (start + j as f64)).abs();
                    *w = if s < 1.0 {
                        (4.0 - 6.0 * s * s + 3.0 * s * s * s) / 6.0
                    } else if s < 2.0 {
                        (2.0 - s).powi(3) / 6.0
                    } else {
                        0.0
                    };
                }
                start as isize
            }
        }
    }

    /// Fourier-space window of this kernel for mode numbers `modes`.
    #[inline]
    pub fn window(&self, modes: &[isize], nmesh: usize) -> f64 {
        let p = self.order() as i32;
        modes
            .iter()
            .map(|&n| {
                let x = PI * n as f64 / nmesh as f64;
                let sinc = if n == 0 { 1.0 } else { x.sin() / x };
                sinc.powi(p)
            })
            .product()
    }
}


// ======================================================================================
// --------------------------------- Assignment -----------------------------------------
// ======================================================================================

/// Deposit the local particles (each shifted by `offset` along every axis,
/// positions untouched) onto `grid` and convert the result to a density contrast.
pub fn particles_to_grid<P, F>(particles: &P, grid: &mut F, method: DensityAssignment, offset: f64) -> Result<()>
where
    P: ParticleContainer + ?Sized,
    F: FourierField,
{
    let mass = assign_mass(particles, grid.geometry(), method, offset)?;
    mass_to_density_contrast(grid, &mass, particles.num_total())
}

/// Raw per-cell mass `W` of the local particles on the cells owned by `geometry`.
pub fn assign_mass<P>(particles: &P, geometry: &GridGeometry, method: DensityAssignment, offset: f64) -> Result<Vec<f64>>
where
    P: ParticleContainer + ?Sized,
{
    if particles.ndim() != geometry.ndim {
        return Err(SpectraError::DimensionMismatch { expected: geometry.ndim, actual: particles.ndim() });
    }
    debug!(%method, num_local = particles.num_local(), offset, "assigning particles to grid");

    let ndim = geometry.ndim;
    let ncells = geometry.num_real_cells();
    let nmesh = geometry.nmesh as f64;
    let support = method.order();
    let axes: Vec<&[f64]> = (0..ndim).map(|d| particles.positions(d)).collect();

    // one mass buffer per rayon task, summed at the end
    let mass = (0..particles.num_local())
        .into_par_iter()
        .with_min_len(PARTICLES_PER_TASK)
        .fold(
            || DepositScratch::new(ncells, ndim),
            |mut acc, i| {
                for d in 0..ndim {
                    let u = (axes[d][i] + offset) * nmesh;
                    acc.start[d] = method.axis_weights(u, &mut acc.weights[d]);
                }
                acc.scatter(geometry, support);
                acc
            },
        )
        .map(|acc| acc.mass)
        .reduce(
            || vec![0.0; ncells],
            |mut a, b| {
                a.iter_mut().zip(b.iter()).for_each(|(x, y)| *x += y);
                a
            },
        );
    Ok(mass)
}

/// Write `δ = W · Nmesh^N / num_total − 1` into `grid`, leaving it in real space.
pub fn mass_to_density_contrast<F: FourierField>(grid: &mut F, mass: &[f64], num_total: usize) -> Result<()> {
    let geometry = *grid.geometry();
    if mass.len() != geometry.num_real_cells() {
        return Err(SpectraError::DimensionMismatch { expected: geometry.num_real_cells(), actual: mass.len() });
    }
    if num_total == 0 {
        return Err(SpectraError::InvalidGrid("cannot build a density field from zero particles".into()));
    }
    let norm = geometry.num_cells_total() as f64 / num_total as f64;
    grid.fill_real(0.0);
    grid.real_values_mut()
        .par_iter_mut()
        .zip(mass.par_iter())
        .for_each(|(delta, &w)| *delta = w * norm - 1.0);
    Ok(())
}

struct DepositScratch {
    mass: Vec<f64>,
    start: Vec<isize>,
    weights: Vec<[f64; MAX_SUPPORT]>,
    offsets: Vec<usize>,
    coord: Vec<isize>,
}

impl DepositScratch {
    fn new(ncells: usize, ndim: usize) -> Self {
        Self {
            mass: vec![0.0; ncells],
            start: vec![0; ndim],
            weights: vec![[0.0; MAX_SUPPORT]; ndim],
            offsets: vec![0; ndim],
            coord: vec![0; ndim],
        }
    }

    /// Visit the `support^ndim` nodes of one particle (odometer over offsets).
    fn scatter(&mut self, geometry: &GridGeometry, support: usize) {
        let ndim = self.start.len();
        self.offsets.iter_mut().for_each(|o| *o = 0);
        loop {
            let mut w = 1.0;
            for d in 0..ndim {
                self.coord[d] = self.start[d] + self.offsets[d] as isize;
                w *= self.weights[d][self.offsets[d]];
            }
            if let Some(idx) = geometry.local_real_index(&self.coord) {
                self.mass[idx] += w;
            }

            let mut axis = ndim;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                self.offsets[axis] += 1;
                if self.offsets[axis] < support {
                    break;
                }
                self.offsets[axis] = 0;
            }
        }
    }
}


// ======================================================================================
// -------------------------------- Deconvolution ---------------------------------------
// ======================================================================================

/// Divide every local Fourier cell by the assignment window.
pub fn deconvolve_window<F: FourierField>(grid: &mut F, method: DensityAssignment) -> Result<()> {
    grid.require_status(GridStatus::Fourier)?;
    let geometry = *grid.geometry();
    let ndim = geometry.ndim;
    debug!(%method, "deconvolving assignment window");

    grid.fourier_values_mut()
        .par_iter_mut()
        .enumerate()
        .for_each_init(
            || vec![0isize; ndim],
            |modes, (idx, value)| {
                geometry.mode_numbers(idx, modes);
                *value /= method.window(modes, geometry.nmesh);
            },
        );
    Ok(())
}
