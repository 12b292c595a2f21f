// src/estimators/polyspectrum.rs
/*!
Bispectrum and general polyspectrum estimator (convolution-theorem form).

# Algorithm
1. For every shell `i` two copies of the field are made: `F_i`, the field with
   every mode outside `[klow_i, khigh_i)` zeroed, and the indicator `N_i`
   (`1` inside the shell, `0` outside). While masking, the mean `|k|` and the
   mean `|δ|²` of the shell are reduced over all processes. Both copies are
   taken to real space and kept (owned cells only); the Fourier copies are dropped.
2. For every **sorted** tuple `i₁ ≤ … ≤ i_K` that can close a polygon,
   `Σ_x Π_j F_{i_j}(x)` and `Σ_x Π_j N_{i_j}(x)` are summed over the owned
   cells, reduced in a single collective call and scaled by `(1/(2π Nmesh))^ndim`.
   The count sum is rounded to a whole number of closed configurations; the
   estimate is their ratio, or exactly `0` when no configuration closes.
   Tuples that cannot close are set to exactly `0`.
3. Every unsorted tuple takes the value and count of its sorted permutation.

The bispectrum is additionally divided by `P₁P₂ + P₂P₃ + P₃P₁` (reduced
bispectrum) when that sum is positive.

# Memory
Shells are filtered one after the other; at most one Fourier-space pair is
alive at a time, plus `2·nbins` real-space arrays.
*/

use std::f64::consts::PI;
use std::ops::Range;

use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, info};

use super::{deconvolved_density, owned_range};
use crate::binning::PolyspectrumBinning;
use crate::comm::Communicator;
use crate::error::{Result, SpectraError};
use crate::field::geometry::GridGeometry;
use crate::field::grid::{FourierField, GridStatus};
use crate::particles::assignment::DensityAssignment;
use crate::particles::ParticleContainer;

/// Real-space `F_i` and `N_i` of every shell, restricted to the owned cells.
struct ShellFields {
    filtered: Vec<Vec<f64>>,
    indicator: Vec<Vec<f64>>,
}

#[inline]
fn squared_norm(geometry: &GridGeometry, idx: usize, modes: &mut [isize], kvec: &mut [f64]) -> f64 {
    geometry.wavevector(idx, modes, kvec);
    kvec.iter().map(|k| k * k).sum()
}

/// `(Σ|k|, Σ|δ|², n)` over the owned Fourier cells inside `[k2lo, k2hi)`.
fn shell_statistics<F: FourierField>(grid: &F, cells: Range<usize>, k2lo: f64, k2hi: f64) -> [f64; 3] {
    let geometry = *grid.geometry();
    let ndim = geometry.ndim;
    let values = grid.fourier_values();
    cells
        .into_par_iter()
        .fold(
            || ([0.0; 3], vec![0isize; ndim], vec![0.0; ndim]),
            |(mut acc, mut modes, mut kvec), idx| {
                let k2 = squared_norm(&geometry, idx, &mut modes, &mut kvec);
                if k2 >= k2lo && k2 < k2hi {
                    acc[0] += k2.sqrt();
                    acc[1] += values[idx].norm_sqr();
                    acc[2] += 1.0;
                }
                (acc, modes, kvec)
            },
        )
        .map(|(acc, _, _)| acc)
        .reduce(|| [0.0; 3], |a, b| [a[0] + b[0], a[1] + b[1], a[2] + b[2]])
}

/// Zero `field` outside `[k2lo, k2hi)` and set `indicator` to the shell mask.
fn mask_shell<F: FourierField>(field: &mut F, indicator: &mut F, k2lo: f64, k2hi: f64) {
    let geometry = *field.geometry();
    let ndim = geometry.ndim;
    field
        .fourier_values_mut()
        .par_iter_mut()
        .zip(indicator.fourier_values_mut().par_iter_mut())
        .enumerate()
        .for_each_init(
            || (vec![0isize; ndim], vec![0.0; ndim]),
            |(modes, kvec), (idx, (f, n))| {
                let k2 = squared_norm(&geometry, idx, modes, kvec);
                if k2 >= k2lo && k2 < k2hi {
                    *n = Complex64::new(1.0, 0.0);
                } else {
                    *f = Complex64::new(0.0, 0.0);
                    *n = Complex64::new(0.0, 0.0);
                }
            },
        );
}

/// Step 1: filter every shell, fill `binning.kmean` / `binning.pofk`.
fn build_shells<F: FourierField>(
    grid: &F,
    binning: &mut PolyspectrumBinning,
    comm: &dyn Communicator,
) -> Result<ShellFields> {
    let geometry = *grid.geometry();
    let ctx = comm.context();
    let fourier_cells = owned_range(geometry.num_fourier_cells(), &geometry, ctx);
    let real_cells = owned_range(geometry.num_real_cells(), &geometry, ctx);

    let mut shells = ShellFields {
        filtered: Vec::with_capacity(binning.n),
        indicator: Vec::with_capacity(binning.n),
    };
    for i in 0..binning.n {
        let k2lo = binning.klow[i] * binning.klow[i];
        let k2hi = binning.khigh[i] * binning.khigh[i];

        let mut stats = shell_statistics(grid, fourier_cells.clone(), k2lo, k2hi);
        comm.reduce_sum(&mut stats);
        let [ksum, psum, nk] = stats;
        binning.kmean[i] = if nk == 0.0 { binning.kbin[i] } else { ksum / nk };
        binning.pofk[i] = if nk == 0.0 { 0.0 } else { psum / nk };
        if ctx.is_root() {
            debug!(shell = i, klow = binning.klow[i], khigh = binning.khigh[i], modes = nk, "shell filtered");
        }

        let mut filtered = grid.clone();
        let mut indicator = grid.clone();
        mask_shell(&mut filtered, &mut indicator, k2lo, k2hi);
        filtered.inverse_transform()?;
        indicator.inverse_transform()?;
        shells.filtered.push(filtered.real_values()[real_cells.clone()].to_vec());
        shells.indicator.push(indicator.real_values()[real_cells.clone()].to_vec());
    }
    Ok(shells)
}

/// Steps 2 and 3 on a binning whose shells are built.
fn integrate_tuples(
    shells: &ShellFields,
    binning: &mut PolyspectrumBinning,
    geometry: &GridGeometry,
    reduced_bispectrum: bool,
    comm: &dyn Communicator,
) {
    let total = binning.values.len();
    let mut closing: Vec<(usize, Vec<usize>)> = Vec::new();
    let mut tuple = vec![0usize; binning.order];
    for flat in 0..total {
        binning.values.unravel_into(flat, &mut tuple);
        if !tuple.windows(2).all(|w| w[0] <= w[1]) {
            continue;
        }
        binning.computed.data[flat] = true;
        if binning.can_close_polygon(&tuple) {
            closing.push((flat, tuple.clone()));
        } else {
            binning.values.data[flat] = 0.0;
            binning.counts.data[flat] = 0.0;
        }
    }

    let ncells = shells.filtered.first().map_or(0, Vec::len);
    let partial: Vec<(f64, f64)> = closing
        .par_iter()
        .map(|(_, t)| {
            let mut signal = 0.0;
            let mut count = 0.0;
            for cell in 0..ncells {
                let mut pf = 1.0;
                let mut pn = 1.0;
                for &i in t {
                    pf *= shells.filtered[i][cell];
                    pn *= shells.indicator[i][cell];
                }
                signal += pf;
                count += pn;
            }
            (signal, count)
        })
        .collect();
    let mut sums: Vec<f64> = partial.into_iter().flat_map(|(s, c)| [s, c]).collect();
    comm.reduce_sum(&mut sums);

    let cells_total = geometry.num_cells_total() as f64;
    let norm = (1.0 / (geometry.nmesh as f64 * 2.0 * PI)).powi(geometry.ndim as i32);
    for ((flat, t), pair) in closing.iter().zip(sums.chunks_exact(2)) {
        // Σ_x Π N_i(x) is Nmesh^ndim times the number of closed configurations
        let configurations = (pair[1] / cells_total).round();
        if configurations < 1.0 {
            binning.values.data[*flat] = 0.0;
            binning.counts.data[*flat] = 0.0;
            continue;
        }
        let count = configurations * cells_total * norm;
        let signal = pair[0] * norm;
        let mut value = signal / count;
        if reduced_bispectrum {
            let p = &binning.pofk;
            let denom = p[t[0]] * p[t[1]] + p[t[1]] * p[t[2]] + p[t[2]] * p[t[0]];
            if denom > 0.0 {
                value /= denom;
            }
        }
        binning.values.data[*flat] = value;
        binning.counts.data[*flat] = count;
    }

    for flat in 0..total {
        if binning.computed.data[flat] {
            continue;
        }
        let source = binning.values.canonical_index(flat);
        binning.values.data[flat] = binning.values.data[source];
        binning.counts.data[flat] = binning.counts.data[source];
        binning.computed.data[flat] = true;
    }
}

fn estimate<F: FourierField>(
    grid: &F,
    binning: &mut PolyspectrumBinning,
    reduced_bispectrum: bool,
    comm: &dyn Communicator,
) -> Result<()> {
    if binning.order < 2 {
        return Err(SpectraError::InvalidOrder(binning.order));
    }
    if binning.n == 0 {
        return Err(SpectraError::InvalidBinning("number of bins must be > 0".into()));
    }
    grid.require_status(GridStatus::Fourier)?;
    let geometry = *grid.geometry();
    if !geometry.owns_full_mesh() {
        return Err(SpectraError::Unsupported(
            "polyspectrum estimation needs a grid covering the whole mesh".into(),
        ));
    }

    if comm.context().is_root() {
        info!(
            nmesh = geometry.nmesh,
            nbins = binning.n,
            order = binning.order,
            "polyspectrum"
        );
    }

    binning.reset();
    let shells = build_shells(grid, binning, comm)?;
    integrate_tuples(&shells, binning, &geometry, reduced_bispectrum, comm);

    if comm.context().is_root() {
        info!(tuples = binning.num_canonical(), "polyspectrum done");
    }
    Ok(())
}

/// Reduced bispectrum `Q(k₁,k₂,k₃)` of a Fourier-space field.
///
/// # Errors
/// `InvalidOrder` unless `binning.order == 3`.
pub fn compute_bispectrum<F: FourierField>(
    grid: &F,
    binning: &mut PolyspectrumBinning,
    comm: &dyn Communicator,
) -> Result<()> {
    if binning.order != 3 {
        return Err(SpectraError::InvalidOrder(binning.order));
    }
    estimate(grid, binning, true, comm)
}

/// Polyspectrum of order `binning.order` of a Fourier-space field.
pub fn compute_polyspectrum<F: FourierField>(
    grid: &F,
    binning: &mut PolyspectrumBinning,
    comm: &dyn Communicator,
) -> Result<()> {
    estimate(grid, binning, false, comm)
}

/// Particles → deconvolved density → [`compute_bispectrum`].
pub fn compute_bispectrum_from_particles<P>(
    nmesh: usize,
    particles: &P,
    binning: &mut PolyspectrumBinning,
    method: DensityAssignment,
    comm: &dyn Communicator,
) -> Result<()>
where
    P: ParticleContainer + ?Sized,
{
    if binning.order != 3 {
        return Err(SpectraError::InvalidOrder(binning.order));
    }
    let density = deconvolved_density(particles, nmesh, method, comm)?;
    compute_bispectrum(&density, binning, comm)
}

/// Particles → deconvolved density → [`compute_polyspectrum`].
pub fn compute_polyspectrum_from_particles<P>(
    nmesh: usize,
    particles: &P,
    binning: &mut PolyspectrumBinning,
    method: DensityAssignment,
    comm: &dyn Communicator,
) -> Result<()>
where
    P: ParticleContainer + ?Sized,
{
    if binning.order < 2 {
        return Err(SpectraError::InvalidOrder(binning.order));
    }
    let density = deconvolved_density(particles, nmesh, method, comm)?;
    compute_polyspectrum(&density, binning, comm)
}
