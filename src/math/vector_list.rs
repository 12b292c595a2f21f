// src/math/vector_list.rs
//! Axis-major point storage for particle coordinates.

use std::array::from_fn;

use num_traits::Float;
use rayon::prelude::*;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SpectraError};


// ======================================================================================
// --------------------------------- Storage --------------------------------------------
// ======================================================================================

/// `D`-dimensional points kept as one contiguous column per axis
/// (`axes[d][i]` is coordinate `d` of point `i`).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorList<T, const D: usize> {
    axes: [Vec<T>; D],
}

impl<T, const D: usize> VectorList<T, D> {
    #[inline]
    pub fn len(&self) -> usize {
        if D == 0 { 0 } else { self.axes[0].len() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn dim(&self, d: usize) -> &[T] {
        &self.axes[d]
    }

    #[inline]
    pub fn dim_mut(&mut self, d: usize) -> &mut [T] {
        &mut self.axes[d]
    }

    /// Columns must all have the same length.
    pub fn try_from_axes(columns: Vec<Vec<T>>) -> Result<Self> {
        let found = columns.len();
        let axes: [Vec<T>; D] = columns
            .try_into()
            .map_err(|_| SpectraError::DimensionMismatch { expected: D, actual: found })?;
        let n = if D == 0 { 0 } else { axes[0].len() };
        if let Some(col) = axes.iter().find(|c| c.len() != n) {
            return Err(SpectraError::DimensionMismatch { expected: n, actual: col.len() });
        }
        Ok(Self { axes })
    }
}

impl<T: Copy, const D: usize> VectorList<T, D> {
    /// Transpose a list of points into columns.
    pub fn from_points(points: &[[T; D]]) -> Self {
        Self { axes: from_fn(|d| points.iter().map(|p| p[d]).collect()) }
    }

    pub fn to_points(&self) -> Vec<[T; D]> {
        (0..self.len()).map(|i| from_fn(|d| self.axes[d][i])).collect()
    }
}

impl<T: Copy + Default, const D: usize> VectorList<T, D> {
    pub fn zeros(n: usize) -> Self {
        Self { axes: from_fn(|_| vec![T::default(); n]) }
    }
}


// ======================================================================================
// ------------------------------ Periodic unit box -------------------------------------
// ======================================================================================

impl<T: Float + Send + Sync, const D: usize> VectorList<T, D> {
    pub fn wrap_unit_box(&mut self) {
        for column in self.axes.iter_mut() {
            column.par_iter_mut().for_each(|x| *x = wrap_unit(*x));
        }
    }

    /// `axes[d][i] = wrap(axes[d][i] + factor · shift[i])`.
    ///
    /// # Panics
    /// If `shift` does not hold one value per point.
    pub fn displace_axis_wrapped(&mut self, d: usize, shift: &[T], factor: T) {
        assert_eq!(
            shift.len(),
            self.len(),
            "displace_axis_wrapped: {} shifts for {} points",
            shift.len(),
            self.len()
        );
        self.axes[d]
            .par_iter_mut()
            .zip(shift.par_iter())
            .for_each(|(x, &s)| *x = wrap_unit(*x + s * factor));
    }
}

/// Fold `x` into `[0, 1)`; a result that rounds up to `1` becomes `0`.
#[inline(always)]
pub fn wrap_unit<T: Float>(x: T) -> T {
    let y = x - x.floor();
    if y >= T::one() { T::zero() } else { y }
}


// ======================================================================================
// ------------------------------------- Serde ------------------------------------------
// ======================================================================================

impl<T: Serialize, const D: usize> Serialize for VectorList<T, D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.axes.as_slice().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>, const D: usize> Deserialize<'de> for VectorList<T, D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> std::result::Result<Self, De::Error> {
        let columns = Vec::<Vec<T>>::deserialize(deserializer)?;
        Self::try_from_axes(columns).map_err(de::Error::custom)
    }
}
