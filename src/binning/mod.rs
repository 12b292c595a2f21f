// src/binning/mod.rs
pub mod power;
pub mod polyspectrum;

pub use power::{BinSpacing, PowerSpectrumBinning};
pub use polyspectrum::PolyspectrumBinning;
