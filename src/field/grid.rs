// src/field/grid.rs
/*!
The **field collaborator**: a periodic `Nmesh^N` scalar field that is either in
real space or in (half-complex) Fourier space, never both.

- [`FourierField`] is the boundary every estimator is written against.
- [`Grid`] is the in-memory implementation. A grid that owns the full mesh
  can be transformed; a slab grid (a contiguous range of axis-0 planes) is a
  read/write view used for distributed binning and cannot be transformed on its own.

# Conventions
- Forward transform (real → Fourier) is normalized by `1/Nmesh^N`.
- Inverse transform (Fourier → real) is unnormalized, so `inverse ∘ forward` is the identity.
- Real cell `i` sits at `x = i / Nmesh` in the unit box.

# Invariants
- Real storage has `geometry.num_real_cells()` values, Fourier storage
  `geometry.num_fourier_cells()` values.
- Accessing the representation that is not current is a programming error and panics.
*/

use std::fs::File;
use std::io::Write;
use std::path::Path;

use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::FftDirection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fft::fft_nd;
use super::geometry::GridGeometry;
use crate::error::{Result, SpectraError};


// ======================================================================================
// ------------------------------------ Status ------------------------------------------
// ======================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridStatus {
    Real,
    Fourier,
}


// ======================================================================================
// -------------------------------- FourierField ----------------------------------------
// ======================================================================================

/// What the estimators need from a field container.
pub trait FourierField: Clone + Send + Sync {
    fn geometry(&self) -> &GridGeometry;
    fn status(&self) -> GridStatus;

    fn forward_transform(&mut self) -> Result<()>;
    fn inverse_transform(&mut self) -> Result<()>;

    /// # Panics
    /// If the field is not in real space.
    fn real_values(&self) -> &[f64];
    /// # Panics
    /// If the field is not in real space.
    fn real_values_mut(&mut self) -> &mut [f64];
    /// # Panics
    /// If the field is not in Fourier space.
    fn fourier_values(&self) -> &[Complex64];
    /// # Panics
    /// If the field is not in Fourier space.
    fn fourier_values_mut(&mut self) -> &mut [Complex64];

    /// Switch to real space and set every local cell to `value`.
    fn fill_real(&mut self, value: f64);

    #[inline]
    fn ndim(&self) -> usize {
        self.geometry().ndim
    }

    fn require_status(&self, expected: GridStatus) -> Result<()> {
        let actual = self.status();
        if actual == expected {
            Ok(())
        } else {
            Err(SpectraError::GridStatus { expected, actual })
        }
    }
}


// ======================================================================================
// --------------------------------- GridConfig -----------------------------------------
// ======================================================================================

/// `d`-dimensional cubic mesh with `nmesh` cells per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub d: usize,
    pub nmesh: usize,
}

impl GridConfig {
    /// Panics if `d == 0` or `nmesh == 0`.
    #[inline]
    pub fn new(d: usize, nmesh: usize) -> Self {
        assert!(d > 0 && nmesh > 0, "GridConfig requires d>0 and nmesh>0; got d={d}, nmesh={nmesh}");
        Self { d, nmesh }
    }
}


// ======================================================================================
// ------------------------------------ Grid --------------------------------------------
// ======================================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "values")]
enum Storage {
    Real(Vec<f64>),
    Fourier(Vec<Complex64>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Grid {
    geometry: GridGeometry,
    #[serde(flatten)]
    storage: Storage,
}

impl Grid {
    /// A zeroed real-space grid that owns the full mesh.
    pub fn new(cfg: GridConfig) -> Result<Self> {
        let geometry = GridGeometry::new(cfg.d, cfg.nmesh)?;
        Ok(Self::zeroed(geometry))
    }

    /// A zeroed real-space grid owning axis-0 planes `[local_x_start, local_x_start + local_nx)`.
    pub fn slab(cfg: GridConfig, local_x_start: usize, local_nx: usize) -> Result<Self> {
        let geometry = GridGeometry::slab(cfg.d, cfg.nmesh, local_x_start, local_nx)?;
        Ok(Self::zeroed(geometry))
    }

    fn zeroed(geometry: GridGeometry) -> Self {
        Self { storage: Storage::Real(vec![0.0; geometry.num_real_cells()]), geometry }
    }

    pub fn from_real_values(geometry: GridGeometry, values: Vec<f64>) -> Result<Self> {
        if values.len() != geometry.num_real_cells() {
            return Err(SpectraError::DimensionMismatch {
                expected: geometry.num_real_cells(),
                actual: values.len(),
            });
        }
        Ok(Self { geometry, storage: Storage::Real(values) })
    }

    pub fn from_fourier_values(geometry: GridGeometry, values: Vec<Complex64>) -> Result<Self> {
        if values.len() != geometry.num_fourier_cells() {
            return Err(SpectraError::DimensionMismatch {
                expected: geometry.num_fourier_cells(),
                actual: values.len(),
            });
        }
        Ok(Self { geometry, storage: Storage::Fourier(values) })
    }

    /// Copy of axis-0 planes `[start, start + nx)` of a full-mesh grid, in its
    /// current representation.
    pub fn extract_slab(&self, start: usize, nx: usize) -> Result<Self> {
        if !self.geometry.owns_full_mesh() {
            return Err(SpectraError::Unsupported("extract_slab requires a full-mesh grid".into()));
        }
        let geometry = GridGeometry::slab(self.geometry.ndim, self.geometry.nmesh, start, nx)?;
        if geometry.ndim == 1 {
            return Ok(self.clone());
        }
        let nplanes = self.geometry.nmesh;
        let storage = match &self.storage {
            Storage::Real(v) => {
                let per_plane = v.len() / nplanes;
                Storage::Real(v[start * per_plane..(start + nx) * per_plane].to_vec())
            }
            Storage::Fourier(v) => {
                let per_plane = v.len() / nplanes;
                Storage::Fourier(v[start * per_plane..(start + nx) * per_plane].to_vec())
            }
        };
        Ok(Self { geometry, storage })
    }

    fn require_full_mesh(&self, what: &str) -> Result<()> {
        if self.geometry.owns_full_mesh() {
            Ok(())
        } else {
            Err(SpectraError::Unsupported(format!(
                "{what} on a slab grid [{}, {}) of nmesh={}",
                self.geometry.local_x_start,
                self.geometry.local_x_start + self.geometry.local_nx,
                self.geometry.nmesh
            )))
        }
    }

    /// Save geometry, status and local values as pretty JSON.
    pub fn save(&self, output_file: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(output_file)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}


// ======================================================================================
// ------------------------------ Transforms (r2c/c2r) ----------------------------------
// ======================================================================================

impl Grid {
    /// Real → half-complex, scaled by `1/N^d`.
    fn r2c(&self, real: &[f64]) -> Vec<Complex64> {
        let n = self.geometry.nmesh;
        let nlast = self.geometry.nlast();
        let shape = self.geometry.real_shape();

        let mut full: Vec<Complex64> = real.par_iter().map(|&x| Complex64::new(x, 0.0)).collect();
        fft_nd(&mut full, &shape, FftDirection::Forward);

        let norm = 1.0 / self.geometry.num_cells_total() as f64;
        full.par_chunks(n)
            .flat_map_iter(|row| row[..nlast].iter().map(move |c| *c * norm))
            .collect()
    }

    /// Half-complex → real, unnormalized. The missing half is rebuilt from
    /// Hermitian symmetry.
    fn c2r(&self, half: &[Complex64]) -> Vec<f64> {
        let n = self.geometry.nmesh;
        let d = self.geometry.ndim;
        let nlast = self.geometry.nlast();
        let shape = self.geometry.real_shape();

        let mut full: Vec<Complex64> = (0..self.geometry.num_real_cells())
            .into_par_iter()
            .map_init(
                || vec![0usize; d],
                |coord, flat| {
                    let mut rem = flat;
                    for c in coord.iter_mut().rev() {
                        *c = rem % n;
                        rem /= n;
                    }
                    if coord[d - 1] < nlast {
                        half[half_index(coord, nlast, n)]
                    } else {
                        for c in coord.iter_mut() {
                            *c = (n - *c) % n;
                        }
                        half[half_index(coord, nlast, n)].conj()
                    }
                },
            )
            .collect();
        fft_nd(&mut full, &shape, FftDirection::Inverse);
        full.into_par_iter().map(|c| c.re).collect()
    }
}

#[inline(always)]
fn half_index(coord: &[usize], nlast: usize, n: usize) -> usize {
    let last = coord.len() - 1;
    coord[..last].iter().fold(0usize, |flat, &c| flat * n + c) * nlast + coord[last]
}


// ======================================================================================
// -------------------------------- FourierField impl -----------------------------------
// ======================================================================================

impl FourierField for Grid {
    #[inline]
    fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    #[inline]
    fn status(&self) -> GridStatus {
        match self.storage {
            Storage::Real(_) => GridStatus::Real,
            Storage::Fourier(_) => GridStatus::Fourier,
        }
    }

    fn forward_transform(&mut self) -> Result<()> {
        self.require_status(GridStatus::Real)?;
        self.require_full_mesh("forward_transform")?;
        debug!(ndim = self.geometry.ndim, nmesh = self.geometry.nmesh, "forward transform");
        let values = self.r2c(self.real_values());
        self.storage = Storage::Fourier(values);
        Ok(())
    }

    fn inverse_transform(&mut self) -> Result<()> {
        self.require_status(GridStatus::Fourier)?;
        self.require_full_mesh("inverse_transform")?;
        debug!(ndim = self.geometry.ndim, nmesh = self.geometry.nmesh, "inverse transform");
        let values = self.c2r(self.fourier_values());
        self.storage = Storage::Real(values);
        Ok(())
    }

    #[inline]
    fn real_values(&self) -> &[f64] {
        match &self.storage {
            Storage::Real(v) => v,
            Storage::Fourier(_) => panic!("real_values() called on a grid in Fourier space"),
        }
    }

    #[inline]
    fn real_values_mut(&mut self) -> &mut [f64] {
        match &mut self.storage {
            Storage::Real(v) => v,
            Storage::Fourier(_) => panic!("real_values_mut() called on a grid in Fourier space"),
        }
    }

    #[inline]
    fn fourier_values(&self) -> &[Complex64] {
        match &self.storage {
            Storage::Fourier(v) => v,
            Storage::Real(_) => panic!("fourier_values() called on a grid in real space"),
        }
    }

    #[inline]
    fn fourier_values_mut(&mut self) -> &mut [Complex64] {
        match &mut self.storage {
            Storage::Fourier(v) => v,
            Storage::Real(_) => panic!("fourier_values_mut() called on a grid in real space"),
        }
    }

    fn fill_real(&mut self, value: f64) {
        match &mut self.storage {
            Storage::Real(v) => v.par_iter_mut().for_each(|x| *x = value),
            Storage::Fourier(_) => {
                self.storage = Storage::Real(vec![value; self.geometry.num_real_cells()]);
            }
        }
    }
}
