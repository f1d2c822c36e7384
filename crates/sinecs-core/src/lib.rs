//! # sinecs Core
//!
//! The numerical backbone of sinecs. This crate reconstructs a sparse
//! time-domain signal from a handful of sine-Fourier coefficients measured at
//! irregular frequencies, using proximal-gradient optimisation (ISTA and its
//! accelerated variant FISTA) over an L1 sparsity prior.
//!
//! ## Architecture
//!
//! A [`session::ReconstructionSession`] ingests frequency samples, assembles a
//! dense [`operator::FourierOperator`] once, and hands both to the
//! [`solver::driver::IterationDriver`], which repeats the forward prediction,
//! gradient step and shrinkage kernels until consecutive iterates agree. All
//! kernels run on a [`sinecs_compute::ComputeBackend`].
//!
//! ## Modules
//!
//! - [`types`]: Time grid, frequency samples, parameters and result records.
//! - [`operator`]: Sine-Fourier operator assembly and application.
//! - [`solver`]: Kernels, momentum strategies and the iteration driver.
//! - [`session`]: Sample ingestion, runs and result export.
//! - [`signal`]: Synthetic test signals with known coefficients.
//! - [`archive`]: Hierarchical key-value archive persisted as JSON.

pub mod archive;
pub mod operator;
pub mod session;
pub mod signal;
pub mod solver;
pub mod types;

pub use archive::{Archive, ArchiveError, ArchiveGroup, Dataset};
pub use operator::FourierOperator;
pub use session::ReconstructionSession;
pub use signal::{SignalComponent, TestSignal};
pub use solver::{CancelToken, IterationReport, SolverError};
pub use types::{
    ExperimentResults, FrequencySample, InitialGuess, ReconstructionParams, ReconstructionRecord,
    TimeGrid, Variant,
};
