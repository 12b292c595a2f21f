// src/math/tensor.rs
/*!
A **dense bin-index tensor**: an `nbins^order` array backed by a flat `Vec<T>`
in row-major (C-style) order, used to store bispectrum and polyspectrum
results indexed by tuples of radial bin indices.

# Highlights

- `BinTensor::new(nbins, order)`: default-initialized cube of shape `[nbins; order]`.
- `index(&[usize])` / `unravel(flat)`: row-major linearization and its inverse.
- `canonical_index(flat)`: flat index of the **sorted** version of a tuple.
  All permutations of one bin tuple share the same canonical index.
- `is_canonical(flat)`: the tuple is non-decreasing (`i₁ ≤ i₂ ≤ … ≤ i_K`).
- `par_fill`: parallel constant fill.

# Invariants
- `data.len() == nbins.pow(order)`.
- Unlike periodic lattices, bin indices never wrap: out-of-range indices panic.
*/

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

//===================================================================
// -------------------------- Basic Struct --------------------------
//===================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinTensor<T> {
    /// `[nbins; order]`
    pub shape: Vec<usize>,
    /// Flat, row-major storage.
    pub data: Vec<T>,
}

impl<T: Copy + Default> BinTensor<T> {
    /// # Panics
    /// If `nbins == 0`, `order == 0` or `nbins^order` overflows `usize`.
    pub fn new(nbins: usize, order: usize) -> Self {
        assert!(nbins > 0 && order > 0, "BinTensor requires nbins>0 and order>0; got nbins={nbins}, order={order}");
        let size = nbins
            .checked_pow(order as u32)
            .unwrap_or_else(|| panic!("BinTensor: nbins^order overflows usize (nbins={nbins}, order={order})"));
        Self {
            shape: vec![nbins; order],
            data: vec![T::default(); size],
        }
    }
}

impl<T> BinTensor<T> {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bins per axis.
    #[inline(always)]
    pub fn nbins(&self) -> usize {
        self.shape[0]
    }

    /// Number of axes (statistic order).
    #[inline(always)]
    pub fn order(&self) -> usize {
        self.shape.len()
    }
}

//===================================================================
// ------------------------ Index Conversion ------------------------
//===================================================================

impl<T> BinTensor<T> {
    /// Row-major flat index of a bin tuple.
    #[inline(always)]
    pub fn index(&self, indices: &[usize]) -> usize {
        assert_eq!(indices.len(), self.shape.len(), "BinTensor index rank mismatch");
        let n = self.nbins();
        indices.iter().fold(0usize, |flat, &i| {
            assert!(i < n, "BinTensor bin index {i} out of range (nbins={n})");
            flat * n + i
        })
    }

    /// Inverse of [`index`](Self::index).
    #[inline]
    pub fn unravel(&self, flat: usize) -> Vec<usize> {
        let mut out = vec![0usize; self.order()];
        self.unravel_into(flat, &mut out);
        out
    }

    /// Allocation-free [`unravel`](Self::unravel).
    #[inline]
    pub fn unravel_into(&self, flat: usize, out: &mut [usize]) {
        debug_assert_eq!(out.len(), self.order());
        let n = self.nbins();
        let mut rem = flat;
        for slot in out.iter_mut().rev() {
            *slot = rem % n;
            rem /= n;
        }
    }

    /// Flat index of the sorted permutation of the tuple at `flat`.
    #[inline]
    pub fn canonical_index(&self, flat: usize) -> usize {
        let mut tuple = self.unravel(flat);
        tuple.sort_unstable();
        self.index(&tuple)
    }

    /// `true` if the tuple at `flat` is non-decreasing.
    #[inline]
    pub fn is_canonical(&self, flat: usize) -> bool {
        self.unravel(flat).windows(2).all(|w| w[0] <= w[1])
    }
}

//===================================================================
// ---------------------------- Accessors ---------------------------
//===================================================================

impl<T: Copy> BinTensor<T> {
    #[inline(always)]
    pub fn get(&self, indices: &[usize]) -> T {
        self.data[self.index(indices)]
    }

    #[inline(always)]
    pub fn set(&mut self, indices: &[usize], val: T) {
        let k = self.index(indices);
        self.data[k] = val;
    }
}

impl<T: Copy + Send + Sync> BinTensor<T> {
    #[inline]
    pub fn par_fill(&mut self, value: T) {
        self.data.par_iter_mut().for_each(|x| *x = value);
    }
}
