//! ISTA/FISTA iteration driver.
//!
//! One parametrised loop serves every [`Variant`]: the variant selects the
//! kernel order and the momentum strategy. The loop stops when the squared
//! distance between consecutive iterates drops below the configured threshold,
//! and fails with [`SolverError::ConvergenceFailure`] when the iteration cap is
//! reached or the iterates stop being finite.

use std::time::Instant;

use ndarray::Array1;
use sinecs_compute::ComputeBackend;

use super::kernels::{gradient_step, predict_residual, shrink, squared_distance};
use super::momentum::{Momentum, Nesterov, NoMomentum};
use super::{CancelToken, IterationReport, SolverError};
use crate::operator::FourierOperator;
use crate::types::{ReconstructionParams, Variant};

/// Order in which the kernels run inside one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOrder {
    /// Predict, gradient step, shrink.
    GradientFirst,
    /// Shrink, predict, gradient step.
    ShrinkFirst,
}

impl Variant {
    fn step_order(&self) -> StepOrder {
        match self {
            Variant::Ista | Variant::Fista => StepOrder::GradientFirst,
            Variant::NaiveIsta => StepOrder::ShrinkFirst,
        }
    }
}

/// Runs the proximal-gradient loop against a fixed operator and measurement
/// vector. The driver borrows everything it reads; the candidate buffer is
/// moved in and handed back on success.
pub struct IterationDriver<'a> {
    backend: &'a dyn ComputeBackend,
    operator: &'a FourierOperator,
    measured: &'a Array1<f64>,
    params: &'a ReconstructionParams,
}

impl<'a> IterationDriver<'a> {
    pub fn new(
        backend: &'a dyn ComputeBackend,
        operator: &'a FourierOperator,
        measured: &'a Array1<f64>,
        params: &'a ReconstructionParams,
    ) -> Result<Self, SolverError> {
        params.validate()?;
        operator.check_frequency_len(measured.len())?;
        Ok(Self {
            backend,
            operator,
            measured,
            params,
        })
    }

    /// Iterate from `initial` until convergence.
    pub fn run(
        &self,
        variant: Variant,
        initial: Array1<f64>,
        cancel: &CancelToken,
    ) -> Result<(Array1<f64>, IterationReport), SolverError> {
        match variant {
            Variant::Fista => self.iterate(variant, initial, &mut Nesterov::new(), cancel),
            Variant::Ista | Variant::NaiveIsta => {
                self.iterate(variant, initial, &mut NoMomentum, cancel)
            }
        }
    }

    fn iterate<M: Momentum>(
        &self,
        variant: Variant,
        initial: Array1<f64>,
        momentum: &mut M,
        cancel: &CancelToken,
    ) -> Result<(Array1<f64>, IterationReport), SolverError> {
        self.operator.check_time_len(initial.len())?;
        momentum.reset();

        let start = Instant::now();
        let order = variant.step_order();
        let threshold = self.params.convergence_threshold;
        let max_iterations = self.params.max_iterations;

        log::info!(
            "Starting {} reconstruction ({} frequencies x {} time samples)",
            variant,
            self.operator.num_frequencies(),
            self.operator.num_time_samples()
        );

        let mut candidate = initial;
        let mut change = f64::INFINITY;

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Err(SolverError::Cancelled {
                    iterations: iteration - 1,
                });
            }

            let next = self.advance(&candidate, order, momentum, cancel, iteration)?;
            change = squared_distance(&next, &candidate);
            candidate = next;

            log::debug!("iteration {}: squared change {:.3e}", iteration, change);

            if !change.is_finite() {
                log::warn!(
                    "{} reconstruction diverged at iteration {}",
                    variant,
                    iteration
                );
                return Err(SolverError::ConvergenceFailure {
                    iterations: iteration,
                    change,
                });
            }

            if change < threshold {
                let elapsed = start.elapsed();
                log::info!(
                    "{} converged after {} iterations in {:.3}s",
                    variant,
                    iteration,
                    elapsed.as_secs_f64()
                );
                return Ok((
                    candidate,
                    IterationReport {
                        variant,
                        iterations: iteration,
                        final_change: change,
                        elapsed,
                    },
                ));
            }
        }

        log::warn!(
            "{} did not converge within {} iterations (last change {:.3e})",
            variant,
            max_iterations,
            change
        );
        Err(SolverError::ConvergenceFailure {
            iterations: max_iterations,
            change,
        })
    }

    /// One full iteration: the proximal-gradient update blended with the
    /// current candidate by `momentum`.
    fn advance<M: Momentum>(
        &self,
        candidate: &Array1<f64>,
        order: StepOrder,
        momentum: &mut M,
        cancel: &CancelToken,
        iteration: usize,
    ) -> Result<Array1<f64>, SolverError> {
        let update = self.step(candidate, order, cancel, iteration)?;
        Ok(momentum.blend(update, candidate))
    }

    /// One proximal-gradient update, without momentum.
    fn step(
        &self,
        candidate: &Array1<f64>,
        order: StepOrder,
        cancel: &CancelToken,
        iteration: usize,
    ) -> Result<Array1<f64>, SolverError> {
        let sparse = self.params.step_size_sparse;
        let manifold = self.params.step_size_manifold;

        match order {
            StepOrder::GradientFirst => {
                let residual = self.predict_checked(candidate, cancel, iteration)?;
                let mut next =
                    gradient_step(self.backend, self.operator, candidate, &residual, manifold)?;
                shrink(self.backend, &mut next, sparse);
                Ok(next)
            }
            StepOrder::ShrinkFirst => {
                let mut shrunk = candidate.clone();
                shrink(self.backend, &mut shrunk, sparse);
                let residual = self.predict_checked(&shrunk, cancel, iteration)?;
                gradient_step(self.backend, self.operator, &shrunk, &residual, manifold)
            }
        }
    }

    /// Frequency-axis kernel followed by the cancellation check at the
    /// frequency/time barrier.
    fn predict_checked(
        &self,
        candidate: &Array1<f64>,
        cancel: &CancelToken,
        iteration: usize,
    ) -> Result<Array1<f64>, SolverError> {
        let residual = predict_residual(self.backend, self.operator, candidate, self.measured)?;
        if cancel.is_cancelled() {
            return Err(SolverError::Cancelled {
                iterations: iteration - 1,
            });
        }
        Ok(residual)
    }
}
