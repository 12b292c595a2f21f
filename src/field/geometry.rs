// src/field/geometry.rs
/*!
Index ↔ coordinate ↔ wavevector bookkeeping for a periodic `Nmesh^N` mesh
decomposed into contiguous slabs along axis 0.

# Layout
- Real space, local slab: shape `[local_nx, N, …, N]`, row-major (last axis fastest).
  Global coordinate on axis 0 is `local_x_start + i0`.
- Fourier space (half-complex along the last axis):
  shape `[local_nx, N, …, N, N/2+1]` for `ndim ≥ 2`, `[N/2+1]` for `ndim == 1`.
- Mode numbers: `n_j ∈ [-N/2, N/2)` on every axis but the last, `n_last ∈ [0, N/2]`.
- Wavevectors: `k_j = 2π n_j` (unit box).

# Hermitian weight
Only half of the complex coefficients of a real field are stored. A stored
cell on the `n_last = 0` plane, or on the `n_last = N/2` plane when `N` is even,
stands for itself (weight `1`); every other stored cell also stands for its
conjugate partner (weight `2`). Summed over the full mesh the weights give `N^ndim`.
*/

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectraError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub ndim: usize,
    pub nmesh: usize,
    /// Number of axis-0 planes owned locally.
    pub local_nx: usize,
    /// Global axis-0 index of the first local plane.
    pub local_x_start: usize,
}

impl GridGeometry {
    /// A geometry that owns the whole mesh.
    pub fn new(ndim: usize, nmesh: usize) -> Result<Self> {
        Self::slab(ndim, nmesh, 0, nmesh)
    }

    /// A geometry owning planes `[local_x_start, local_x_start + local_nx)` of axis 0.
    pub fn slab(ndim: usize, nmesh: usize, local_x_start: usize, local_nx: usize) -> Result<Self> {
        if ndim == 0 {
            return Err(SpectraError::InvalidGrid("ndim must be > 0".into()));
        }
        if nmesh == 0 {
            return Err(SpectraError::InvalidGrid("nmesh must be > 0".into()));
        }
        if local_x_start + local_nx > nmesh {
            return Err(SpectraError::InvalidGrid(format!(
                "slab [{local_x_start}, {}) exceeds nmesh={nmesh}",
                local_x_start + local_nx
            )));
        }
        if ndim == 1 && (local_x_start != 0 || local_nx != nmesh) {
            return Err(SpectraError::InvalidGrid(
                "one-dimensional meshes cannot be split into slabs".into(),
            ));
        }
        Ok(Self { ndim, nmesh, local_nx, local_x_start })
    }

    /// `true` if this geometry covers the whole mesh.
    #[inline]
    pub fn owns_full_mesh(&self) -> bool {
        self.local_x_start == 0 && self.local_nx == self.nmesh
    }

    /// Length of the half-complex last axis, `N/2 + 1`.
    #[inline]
    pub fn nlast(&self) -> usize {
        self.nmesh / 2 + 1
    }

    /// `N^ndim`, the global number of real cells.
    #[inline]
    pub fn num_cells_total(&self) -> usize {
        self.nmesh.pow(self.ndim as u32)
    }

    pub fn real_shape(&self) -> Vec<usize> {
        let mut shape = vec![self.nmesh; self.ndim];
        shape[0] = self.local_nx;
        shape
    }

    pub fn fourier_shape(&self) -> Vec<usize> {
        let mut shape = self.real_shape();
        let last = self.ndim - 1;
        shape[last] = self.nlast();
        shape
    }

    #[inline]
    pub fn num_real_cells(&self) -> usize {
        self.real_shape().iter().product()
    }

    #[inline]
    pub fn num_fourier_cells(&self) -> usize {
        self.fourier_shape().iter().product()
    }

    // ======================================================================
    // ------------------------------- Fourier -------------------------------
    // ======================================================================

    /// Integer mode numbers `n_j` of local Fourier cell `idx`.
    #[inline]
    pub fn mode_numbers(&self, idx: usize, out: &mut [isize]) {
        debug_assert_eq!(out.len(), self.ndim);
        let n = self.nmesh;
        let nlast = self.nlast();
        let last = self.ndim - 1;

        out[last] = (idx % nlast) as isize;
        let mut rem = idx / nlast;
        for axis in (0..last).rev() {
            let extent = if axis == 0 { self.local_nx } else { n };
            let mut c = rem % extent;
            rem /= extent;
            if axis == 0 {
                c += self.local_x_start;
            }
            out[axis] = if c < n / 2 { c as isize } else { c as isize - n as isize };
        }
    }

    /// Fill `kvec` with `2π n` for local Fourier cell `idx`; returns `|k|`.
    #[inline]
    pub fn wavevector(&self, idx: usize, modes: &mut [isize], kvec: &mut [f64]) -> f64 {
        self.mode_numbers(idx, modes);
        let mut k2 = 0.0;
        for (k, &m) in kvec.iter_mut().zip(modes.iter()) {
            *k = 2.0 * PI * m as f64;
            k2 += *k * *k;
        }
        k2.sqrt()
    }

    /// Allocating convenience around [`wavevector`](Self::wavevector).
    pub fn wavevector_and_norm(&self, idx: usize) -> (Vec<f64>, f64) {
        let mut modes = vec![0isize; self.ndim];
        let mut kvec = vec![0.0; self.ndim];
        let kmag = self.wavevector(idx, &mut modes, &mut kvec);
        (kvec, kmag)
    }

    /// `1` on the self-conjugate planes of the last axis, `2` elsewhere.
    #[inline]
    pub fn hermitian_weight(&self, idx: usize) -> f64 {
        let last = idx % self.nlast();
        if last == 0 || (self.nmesh % 2 == 0 && last == self.nmesh / 2) {
            1.0
        } else {
            2.0
        }
    }

    // ======================================================================
    // --------------------------------- Real --------------------------------
    // ======================================================================

    /// Global integer coordinates of local real cell `idx`.
    #[inline]
    pub fn real_coords(&self, idx: usize, out: &mut [usize]) {
        debug_assert_eq!(out.len(), self.ndim);
        let mut rem = idx;
        for axis in (0..self.ndim).rev() {
            let extent = if axis == 0 { self.local_nx } else { self.nmesh };
            out[axis] = rem % extent;
            rem /= extent;
        }
        out[0] += self.local_x_start;
    }

    /// Local flat index of a (periodically wrapped) global coordinate, or
    /// `None` if the wrapped axis-0 plane is not owned locally.
    #[inline]
    pub fn local_real_index(&self, coord: &[isize]) -> Option<usize> {
        debug_assert_eq!(coord.len(), self.ndim);
        let n = self.nmesh as isize;
        let mut flat = 0usize;
        for (axis, &c) in coord.iter().enumerate() {
            let w = c.rem_euclid(n) as usize;
            if axis == 0 {
                if w < self.local_x_start || w >= self.local_x_start + self.local_nx {
                    return None;
                }
                flat = w - self.local_x_start;
            } else {
                flat = flat * self.nmesh + w;
            }
        }
        Some(flat)
    }
}
