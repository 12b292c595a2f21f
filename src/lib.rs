// src/lib.rs
/*!
# polyspectra

Power spectrum, Legendre multipole, bispectrum and general polyspectrum
estimators for periodic density fields sampled on a regular mesh.

Data flows leaf → root:

- `particles` deposit mass on a `field::Grid` (`particles::assignment`),
- the grid is forward-transformed and the assignment window deconvolved,
- `estimators` bin the Fourier modes into a `binning` result, combining
  per-process partial sums through a `comm::Communicator`.

Conventions: positions live in `[0, 1)`, wavevectors are `k = 2π·n`, and the
forward transform is normalized by `1/Nmesh^N`. Results are in grid units until
`PowerSpectrumBinning::to_physical_units` is applied.
*/

pub mod error;
pub mod comm;
pub mod math;
pub mod field;
pub mod particles;
pub mod binning;
pub mod estimators;
pub mod config;

pub use error::{Result, SpectraError};
pub use comm::{Communicator, ExecutionContext, SerialComm, ThreadGroupComm};
pub use field::{FourierField, Grid, GridConfig, GridGeometry, GridStatus};
pub use particles::{ParticleContainer, Particles};
pub use particles::assignment::DensityAssignment;
pub use binning::{BinSpacing, PolyspectrumBinning, PowerSpectrumBinning};
pub use config::{BinningConfig, EstimatorConfig};
