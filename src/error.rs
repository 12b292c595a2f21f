// src/error.rs
//! Crate-wide error type.
//!
//! Every variant except `Io`/`Json` is a *fatal precondition*: the estimators
//! check them before the first collective call, so all processes fail the same
//! way and no reduction is left half-entered.

use thiserror::Error;

use crate::field::grid::GridStatus;

#[derive(Debug, Error)]
pub enum SpectraError {
    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("line of sight vector has zero length")]
    ZeroLineOfSight,

    #[error("unknown density assignment method `{0}` (options: NGP, CIC, TSC, PCS)")]
    UnknownAssignment(String),

    #[error("unknown smoothing filter `{0}` (options: sharpk, gaussian, tophat)")]
    UnknownFilter(String),

    #[error("invalid statistic order {0} for this estimator")]
    InvalidOrder(usize),

    #[error("grid is in {actual:?} space, operation requires {expected:?} space")]
    GridStatus { expected: GridStatus, actual: GridStatus },

    #[error("binning has already been normalized; call reset() before accumulating again")]
    AlreadyNormalized,

    #[error("binning must be normalized before it can be rescaled")]
    NotNormalized,

    #[error("binning has already been rescaled")]
    AlreadyScaled,

    #[error("incompatible binnings: {0}")]
    IncompatibleBinning(String),

    #[error("invalid sampling distribution: {0}")]
    InvalidDistribution(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpectraError>;
