// src/binning/polyspectrum.rs
/*!
Result container for the bispectrum (`order = 3`) and general polyspectra.

# Shells
Requested centers `k[0..n]` (linear between `kmin` and `kmax`) are turned into
shells whose edges sit halfway between neighbouring centers:

- `klow[0] = k[0]`, `khigh[n-1] = k[n-1]`,
- `khigh[i] = k[i] + (k[i+1] - k[i])/2` and `klow[i+1] = khigh[i]`,
- `kbin[i] = (klow[i] + khigh[i]) / 2`.

A single shell covers `[kmin, kmax)`.

# Results
`values` / `counts` are `n^order` row-major tensors indexed by the tuple of
shell indices. `computed` records which entries hold an estimate (computed
directly, zeroed by the polygon test, or copied from their sorted tuple).
*/

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectraError};
use crate::math::tensor::BinTensor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyspectrumBinning {
    pub n: usize,
    pub order: usize,
    pub kmin: f64,
    pub kmax: f64,
    /// Requested shell centers.
    pub k: Vec<f64>,
    pub klow: Vec<f64>,
    pub khigh: Vec<f64>,
    /// Shell midpoints, used by the polygon test.
    pub kbin: Vec<f64>,
    /// Realized mean `|k|` per shell.
    pub kmean: Vec<f64>,
    /// Mean `|δ(k)|²` per shell.
    pub pofk: Vec<f64>,
    pub values: BinTensor<f64>,
    pub counts: BinTensor<f64>,
    pub computed: BinTensor<bool>,
}

impl PolyspectrumBinning {
    /// `n` shells with linearly spaced centers in `[kmin, kmax]`.
    pub fn new(n: usize, order: usize, kmin: f64, kmax: f64) -> Result<Self> {
        if n == 0 {
            return Err(SpectraError::InvalidBinning("number of bins must be > 0".into()));
        }
        if !(kmin >= 0.0 && kmax > kmin && kmax.is_finite()) {
            return Err(SpectraError::InvalidBinning(format!(
                "require 0 <= kmin < kmax < inf, got kmin={kmin}, kmax={kmax}"
            )));
        }
        let centers = if n == 1 {
            vec![0.5 * (kmin + kmax)]
        } else {
            (0..n).map(|i| kmin + (kmax - kmin) * i as f64 / (n - 1) as f64).collect()
        };
        Self::build(centers, order, kmin, kmax)
    }

    /// Shells around caller-chosen, strictly increasing centers.
    pub fn from_centers(centers: Vec<f64>, order: usize) -> Result<Self> {
        if centers.len() < 2 {
            return Err(SpectraError::InvalidBinning("from_centers needs at least two centers".into()));
        }
        if !centers.windows(2).all(|w| w[1] > w[0]) || centers[0] < 0.0 {
            return Err(SpectraError::InvalidBinning("centers must be non-negative and strictly increasing".into()));
        }
        let (kmin, kmax) = (centers[0], centers[centers.len() - 1]);
        Self::build(centers, order, kmin, kmax)
    }

    fn build(k: Vec<f64>, order: usize, kmin: f64, kmax: f64) -> Result<Self> {
        if order < 2 {
            return Err(SpectraError::InvalidOrder(order));
        }
        let n = k.len();
        if n.checked_pow(order as u32).is_none() {
            return Err(SpectraError::InvalidBinning(format!("{n}^{order} result entries overflow")));
        }

        let mut klow = vec![0.0; n];
        let mut khigh = vec![0.0; n];
        if n == 1 {
            klow[0] = kmin;
            khigh[0] = kmax;
        } else {
            for i in 0..n {
                klow[i] = if i == 0 { k[0] } else { khigh[i - 1] };
                khigh[i] = if i + 1 < n { k[i] + 0.5 * (k[i + 1] - k[i]) } else { k[n - 1] };
            }
        }
        let kbin: Vec<f64> = klow.iter().zip(&khigh).map(|(lo, hi)| 0.5 * (lo + hi)).collect();

        Ok(Self {
            n,
            order,
            kmin,
            kmax,
            kmean: kbin.clone(),
            pofk: vec![0.0; n],
            k,
            klow,
            khigh,
            kbin,
            values: BinTensor::new(n, order),
            counts: BinTensor::new(n, order),
            computed: BinTensor::new(n, order),
        })
    }

    /// Spacing used by the polygon test.
    pub fn deltak(&self) -> f64 {
        if self.n > 1 {
            self.k[1] - self.k[0]
        } else {
            self.kmax - self.kmin
        }
    }

    pub fn reset(&mut self) {
        self.values.par_fill(0.0);
        self.counts.par_fill(0.0);
        self.computed.par_fill(false);
        self.pofk.iter_mut().for_each(|x| *x = 0.0);
        self.kmean.clone_from(&self.kbin);
    }

    /// `false` if the shells of the sorted tuple cannot close a polygon:
    /// `Σ_{j<K-1} kbin[i_j] < kbin[i_{K-1}] - K·Δk/2`.
    pub fn can_close_polygon(&self, sorted_tuple: &[usize]) -> bool {
        let (last, rest) = match sorted_tuple.split_last() {
            Some(parts) => parts,
            None => return false,
        };
        let ksum: f64 = rest.iter().map(|&i| self.kbin[i]).sum();
        ksum >= self.kbin[*last] - self.order as f64 * self.deltak() / 2.0
    }

    /// Number of sorted tuples, `C(n + K - 1, K)`.
    pub fn num_canonical(&self) -> usize {
        (0..self.values.len()).filter(|&f| self.values.is_canonical(f)).count()
    }

    #[inline]
    pub fn value_at(&self, tuple: &[usize]) -> f64 {
        self.values.get(tuple)
    }

    #[inline]
    pub fn count_at(&self, tuple: &[usize]) -> f64 {
        self.counts.get(tuple)
    }

    pub fn save(&self, output_file: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(output_file)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
