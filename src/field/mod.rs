// src/field/mod.rs
pub mod geometry;
pub mod fft;
pub mod grid;
pub mod smoothing;

pub use geometry::GridGeometry;
pub use grid::{FourierField, Grid, GridConfig, GridStatus};
pub use smoothing::{smoothing_filter_fourier_space, SmoothingFilter};
