// src/particles/mod.rs
/*!
The **particle collaborator**: positions (unit box, `[0, 1)`) and velocities
of the particles owned by this process.

- [`ParticleContainer`] is what the estimators consume.
- [`Particles<D>`] stores both arrays as SoA [`VectorList`]s.

A serial container owns every particle, so `num_total() == num_local()` and
`redistribute()` has nothing to migrate. A container holding one share of a
distributed set records the global count with [`Particles::with_total`].
*/

pub mod assignment;

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectraError};
use crate::math::vector_list::VectorList;

pub trait ParticleContainer: Send + Sync {
    fn ndim(&self) -> usize;
    fn num_local(&self) -> usize;
    /// Number of particles summed over every process.
    fn num_total(&self) -> usize;

    fn positions(&self, axis: usize) -> &[f64];
    fn velocities(&self, axis: usize) -> &[f64];

    /// `x_axis += v_axis · factor`, wrapped back into `[0, 1)`.
    fn displace_along_axis(&mut self, axis: usize, factor: f64);

    /// Migrate particles whose positions left the locally owned region.
    fn redistribute(&mut self) -> Result<()>;
}


// ======================================================================================
// ---------------------------------- Particles -----------------------------------------
// ======================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particles<const D: usize> {
    positions: VectorList<f64, D>,
    velocities: VectorList<f64, D>,
    num_total: usize,
}

impl<const D: usize> Particles<D> {
    /// Particles at rest at the given positions.
    pub fn from_points(points: Vec<[f64; D]>) -> Self {
        let positions = VectorList::from_points(&points);
        let n = positions.len();
        Self { positions, velocities: VectorList::zeros(n), num_total: n }
    }

    pub fn from_points_and_velocities(points: Vec<[f64; D]>, velocities: Vec<[f64; D]>) -> Result<Self> {
        if points.len() != velocities.len() {
            return Err(SpectraError::DimensionMismatch { expected: points.len(), actual: velocities.len() });
        }
        let positions = VectorList::from_points(&points);
        let n = positions.len();
        Ok(Self { positions, velocities: VectorList::from_points(&velocities), num_total: n })
    }

    /// `n` particles at rest, uniformly distributed in the unit box.
    pub fn random_uniform<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Self> {
        let unit = Uniform::new(0.0, 1.0).map_err(|e| SpectraError::InvalidDistribution(e.to_string()))?;
        let mut positions = VectorList::<f64, D>::zeros(n);
        for d in 0..D {
            for x in positions.dim_mut(d) {
                *x = unit.sample(rng);
            }
        }
        // sampling returns values in [0, 1); the wrap only guards the upper edge
        positions.wrap_unit_box();
        Ok(Self { positions, velocities: VectorList::zeros(n), num_total: n })
    }

    /// Replace the velocities with i.i.d. `Normal(0, sigma)` components.
    pub fn with_gaussian_velocities<R: Rng + ?Sized>(mut self, sigma: f64, rng: &mut R) -> Result<Self> {
        let dist = Normal::new(0.0, sigma).map_err(|e| SpectraError::InvalidDistribution(e.to_string()))?;
        for d in 0..D {
            for v in self.velocities.dim_mut(d) {
                *v = dist.sample(rng);
            }
        }
        Ok(self)
    }

    /// Record that these particles are one share of a set of `num_total` particles.
    pub fn with_total(mut self, num_total: usize) -> Self {
        assert!(
            num_total >= self.positions.len(),
            "Particles::with_total: total {num_total} is smaller than the local count {}",
            self.positions.len()
        );
        self.num_total = num_total;
        self
    }

    #[inline]
    pub fn position_list(&self) -> &VectorList<f64, D> {
        &self.positions
    }
}

impl<const D: usize> ParticleContainer for Particles<D> {
    #[inline]
    fn ndim(&self) -> usize {
        D
    }

    #[inline]
    fn num_local(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    fn num_total(&self) -> usize {
        self.num_total
    }

    #[inline]
    fn positions(&self, axis: usize) -> &[f64] {
        self.positions.dim(axis)
    }

    #[inline]
    fn velocities(&self, axis: usize) -> &[f64] {
        self.velocities.dim(axis)
    }

    fn displace_along_axis(&mut self, axis: usize, factor: f64) {
        self.positions.displace_axis_wrapped(axis, self.velocities.dim(axis), factor);
    }

    #[inline]
    fn redistribute(&mut self) -> Result<()> {
        Ok(())
    }
}
