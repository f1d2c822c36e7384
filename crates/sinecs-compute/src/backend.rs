//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over different execution environments
//! so that the reconstruction kernels in `sinecs-core` remain device-agnostic.
//! Every primitive here dispatches a flat grid of independent workers (one per
//! output element) and returns only once every worker has finished, which makes
//! each call a full barrier for the caller.

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Device error: {0}")]
    DeviceError(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
}

/// Abstraction over compute backends.
///
/// Reconstruction code operates against this trait. Implementations provide
/// device-specific execution for the hot-path operations: operator assembly,
/// frequency-axis and time-axis reductions, and point-wise updates.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Fill a `rows x cols` matrix, one independent unit of work per entry.
    ///
    /// This is the entry point for assembling the sine-Fourier operator.
    fn parallel_matrix_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: &(dyn Fn(usize, usize) -> f64 + Send + Sync),
    ) -> Result<Array2<f64>, ComputeError>;

    /// Fill a vector of length `len`, one independent unit of work per index.
    ///
    /// Each worker is free to perform a full reduction (e.g. over a matrix
    /// row or column) before writing its single output element.
    fn parallel_vector_fill(
        &self,
        len: usize,
        fill_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Array1<f64>, ComputeError>;

    /// Apply `map_fn` to every element of `vector` in place.
    fn parallel_map_inplace(
        &self,
        vector: &mut Array1<f64>,
        map_fn: &(dyn Fn(f64) -> f64 + Send + Sync),
    );

    /// Matrix-vector product $\mathbf{y} = \mathbf{A}\mathbf{x}$, one worker per row.
    fn matvec(
        &self,
        matrix: &Array2<f64>,
        vector: &Array1<f64>,
    ) -> Result<Array1<f64>, ComputeError> {
        if matrix.ncols() != vector.len() {
            return Err(ComputeError::ShapeMismatch {
                expected: matrix.ncols(),
                actual: vector.len(),
            });
        }
        self.parallel_vector_fill(matrix.nrows(), &|row| matrix.row(row).dot(vector))
    }

    /// Transposed product $\mathbf{y} = \mathbf{A}^T\mathbf{x}$, one worker per column.
    fn matvec_transpose(
        &self,
        matrix: &Array2<f64>,
        vector: &Array1<f64>,
    ) -> Result<Array1<f64>, ComputeError> {
        if matrix.nrows() != vector.len() {
            return Err(ComputeError::ShapeMismatch {
                expected: matrix.nrows(),
                actual: vector.len(),
            });
        }
        self.parallel_vector_fill(matrix.ncols(), &|col| matrix.column(col).dot(vector))
    }
}
