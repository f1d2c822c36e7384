//! Proximal-gradient reconstruction solver.
//!
//! The solver minimises
//!
//! $$
//! \tfrac{1}{2}\lVert \mathbf{S}\mathbf{r} - \mathbf{s} \rVert_2^2 + \lambda \lVert \mathbf{r} \rVert_1
//! $$
//!
//! where $\mathbf{S}$ is the sine-Fourier operator, $\mathbf{s}$ the measured
//! coefficients and $\mathbf{r}$ the time-domain candidate. Each iteration runs
//! three kernels: a frequency-axis prediction, a time-axis gradient step and a
//! point-wise soft threshold. The [`driver::IterationDriver`] orders them and
//! applies an optional momentum strategy ([`momentum`]).

pub mod driver;
pub mod kernels;
pub mod momentum;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sinecs_compute::ComputeError;
use thiserror::Error;

use crate::types::Variant;

/// Errors that can occur while ingesting samples or reconstructing.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Reconstruction not ready: {0}")]
    NotReady(String),

    #[error("Reconstruction failed to converge after {iterations} iterations (last change: {change:.2e})")]
    ConvergenceFailure { iterations: usize, change: f64 },

    #[error("Reconstruction cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error("Compute backend error: {0}")]
    ComputeError(#[from] ComputeError),
}

/// Cooperative cancellation flag, checked by the driver at every barrier.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Summary of a completed reconstruction run.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub variant: Variant,
    /// Number of iterations executed, including the converging one.
    pub iterations: usize,
    /// Squared distance between the last two iterates.
    pub final_change: f64,
    pub elapsed: Duration,
}
