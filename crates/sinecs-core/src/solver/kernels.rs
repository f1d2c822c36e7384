//! Per-iteration numerical kernels.
//!
//! Each kernel is a single flat-grid dispatch on the compute backend. The
//! frequency-axis kernel ([`predict_residual`]) must complete before either
//! time-axis kernel reads its output; the backend call returning is that
//! barrier. Kernels never write into a buffer they read from: the gradient
//! step produces a fresh vector, and shrinkage touches each element once.

use ndarray::Array1;
use sinecs_compute::ComputeBackend;

use super::SolverError;
use crate::operator::FourierOperator;

/// Soft threshold of a single value: the proximal operator of
/// `threshold * |x|`.
///
/// Values with `|x| <= threshold` map to exactly zero, others move towards
/// zero by `threshold` without changing sign. NaN passes through unchanged.
#[inline]
pub fn shrink_value(x: f64, threshold: f64) -> f64 {
    if x.abs() <= threshold {
        0.0
    } else {
        x - threshold.copysign(x)
    }
}

/// Residual of the forward prediction against the measurements:
/// `residual[f] = sum_t S[f, t] * candidate[t] - measured[f]`.
///
/// One worker per frequency, each reducing over every time sample.
pub fn predict_residual(
    backend: &dyn ComputeBackend,
    operator: &FourierOperator,
    candidate: &Array1<f64>,
    measured: &Array1<f64>,
) -> Result<Array1<f64>, SolverError> {
    operator.check_time_len(candidate.len())?;
    operator.check_frequency_len(measured.len())?;
    let matrix = operator.matrix();
    Ok(backend.parallel_vector_fill(operator.num_frequencies(), &|f| {
        matrix.row(f).dot(candidate) - measured[f]
    })?)
}

/// One gradient-descent step on the data-fidelity term:
/// `next[t] = candidate[t] - step_size * sum_f S[f, t] * residual[f]`.
///
/// One worker per time sample, each reducing over every frequency. The factor
/// of two from the gradient of the squared norm is absorbed into `step_size`.
pub fn gradient_step(
    backend: &dyn ComputeBackend,
    operator: &FourierOperator,
    candidate: &Array1<f64>,
    residual: &Array1<f64>,
    step_size: f64,
) -> Result<Array1<f64>, SolverError> {
    operator.check_time_len(candidate.len())?;
    operator.check_frequency_len(residual.len())?;
    let matrix = operator.matrix();
    Ok(backend.parallel_vector_fill(operator.num_time_samples(), &|t| {
        candidate[t] - step_size * matrix.column(t).dot(residual)
    })?)
}

/// Soft-threshold every sample of `candidate` in place.
pub fn shrink(backend: &dyn ComputeBackend, candidate: &mut Array1<f64>, threshold: f64) {
    backend.parallel_map_inplace(candidate, &|x| shrink_value(x, threshold));
}

/// Sum of squared differences between two iterates.
pub fn squared_distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
