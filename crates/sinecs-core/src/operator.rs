//! Sine-Fourier operator assembly and application.
//!
//! The operator maps a time-domain signal sampled on a [`TimeGrid`] to its
//! sine-transform coefficients at an arbitrary (possibly irregular) set of
//! frequencies:
//!
//! $$
//! S_{f,t} = \sin(2\pi \nu_f t) \, \frac{\Delta t}{T}
//! $$
//!
//! where $\Delta t$ is the coarse sampling interval and $T$ the grid span.
//! The matrix is assembled once per frequency set and is read-only afterwards.

use ndarray::{Array1, Array2};
use sinecs_compute::ComputeBackend;

use crate::solver::SolverError;
use crate::types::TimeGrid;

/// Dense `F x T` sine-Fourier operator.
#[derive(Debug, Clone, PartialEq)]
pub struct FourierOperator {
    matrix: Array2<f64>,
    /// Grid span divided by the coarse step; the inverse of the entry scale.
    scale: f64,
}

impl FourierOperator {
    /// Assemble the operator for `frequency` on `grid`, one worker per entry.
    pub fn build(
        backend: &dyn ComputeBackend,
        frequency: &Array1<f64>,
        grid: &TimeGrid,
    ) -> Result<Self, SolverError> {
        if frequency.is_empty() {
            return Err(SolverError::InvalidInput(
                "operator needs at least one frequency".into(),
            ));
        }
        if grid.len() < 2 {
            return Err(SolverError::InvalidInput(format!(
                "operator needs at least 2 time samples, got {}",
                grid.len()
            )));
        }
        if frequency.iter().any(|f| !f.is_finite()) {
            return Err(SolverError::InvalidInput(
                "frequencies must be finite".into(),
            ));
        }

        let times = grid.times();
        let weight = grid.step() / grid.span();
        let matrix = backend.parallel_matrix_fill(frequency.len(), times.len(), &|f, t| {
            (2.0 * std::f64::consts::PI * frequency[f] * times[t]).sin() * weight
        })?;

        log::debug!(
            "Assembled {}x{} sine-Fourier operator",
            matrix.nrows(),
            matrix.ncols()
        );

        Ok(Self {
            matrix,
            scale: grid.span() / grid.step(),
        })
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn num_frequencies(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_time_samples(&self) -> usize {
        self.matrix.ncols()
    }

    /// Forward transform: predicted sine coefficients of `signal`.
    pub fn apply(
        &self,
        backend: &dyn ComputeBackend,
        signal: &Array1<f64>,
    ) -> Result<Array1<f64>, SolverError> {
        self.check_time_len(signal.len())?;
        Ok(backend.matvec(&self.matrix, signal)?)
    }

    /// Adjoint transform: $\mathbf{S}^T \mathbf{c}$ for frequency-domain `coefficients`.
    pub fn apply_transpose(
        &self,
        backend: &dyn ComputeBackend,
        coefficients: &Array1<f64>,
    ) -> Result<Array1<f64>, SolverError> {
        self.check_frequency_len(coefficients.len())?;
        Ok(backend.matvec_transpose(&self.matrix, coefficients)?)
    }

    /// Pseudo-inverse style starting point from the measured coefficients:
    ///
    /// $$
    /// r_t = \sum_f 2 \, S_{f,t} \, \frac{T}{\Delta t} \, s_f
    /// $$
    ///
    /// For frequencies that complete whole periods on the grid the rows of
    /// $\mathbf{S}$ are near-orthogonal, so this already reproduces the
    /// measured coefficients up to the $(T + \Delta t)/T$ discretisation factor.
    pub fn adjoint_estimate(
        &self,
        backend: &dyn ComputeBackend,
        measured: &Array1<f64>,
    ) -> Result<Array1<f64>, SolverError> {
        let factor = 2.0 * self.scale;
        let mut estimate = self.apply_transpose(backend, measured)?;
        backend.parallel_map_inplace(&mut estimate, &|x| factor * x);
        Ok(estimate)
    }

    pub(crate) fn check_time_len(&self, len: usize) -> Result<(), SolverError> {
        if len != self.num_time_samples() {
            return Err(SolverError::InvalidInput(format!(
                "time-domain vector has {} samples, operator expects {}",
                len,
                self.num_time_samples()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_frequency_len(&self, len: usize) -> Result<(), SolverError> {
        if len != self.num_frequencies() {
            return Err(SolverError::InvalidInput(format!(
                "frequency-domain vector has {} entries, operator expects {}",
                len,
                self.num_frequencies()
            )));
        }
        Ok(())
    }
}
