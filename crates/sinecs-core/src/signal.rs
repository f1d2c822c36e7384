//! Synthetic test signals with known sine-Fourier coefficients.
//!
//! Test signals stand in for the magnetic field a sensing experiment would
//! measure. They provide ground truth for validating reconstructions and can
//! be written to an archive alongside the result for overlay plots.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use sinecs_compute::ComputeBackend;

use crate::archive::Archive;
use crate::operator::FourierOperator;
use crate::solver::SolverError;
use crate::types::TimeGrid;

/// One additive component of a test signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalComponent {
    /// `amplitude * sin(2π f t + phase)` over the whole grid.
    Sine {
        amplitude: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
    },
    /// A single sine period of `frequency` starting at `time_start`, zero
    /// elsewhere.
    NeuralPulse {
        time_start: f64,
        amplitude: f64,
        frequency: f64,
    },
}

impl SignalComponent {
    pub fn evaluate(&self, t: f64) -> f64 {
        match *self {
            SignalComponent::Sine {
                amplitude,
                frequency,
                phase,
            } => amplitude * (2.0 * std::f64::consts::PI * frequency * t + phase).sin(),
            SignalComponent::NeuralPulse {
                time_start,
                amplitude,
                frequency,
            } => {
                if t >= time_start && t < time_start + 1.0 / frequency {
                    amplitude * (2.0 * std::f64::consts::PI * frequency * (t - time_start)).sin()
                } else {
                    0.0
                }
            }
        }
    }

    fn validate(&self) -> Result<(), SolverError> {
        let (values, frequency) = match *self {
            SignalComponent::Sine {
                amplitude,
                frequency,
                phase,
            } => ([amplitude, frequency, phase], frequency),
            SignalComponent::NeuralPulse {
                time_start,
                amplitude,
                frequency,
            } => ([time_start, amplitude, frequency], frequency),
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::InvalidInput(
                "signal component has non-finite parameters".into(),
            ));
        }
        if matches!(self, SignalComponent::NeuralPulse { .. }) && frequency <= 0.0 {
            return Err(SolverError::InvalidInput(format!(
                "neural pulse frequency must be positive, got {frequency}"
            )));
        }
        Ok(())
    }
}

/// A sum of [`SignalComponent`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSignal {
    #[serde(default, rename = "component")]
    pub components: Vec<SignalComponent>,
}

impl TestSignal {
    /// Logical archive group the sampled signal is stored under.
    pub const GROUP: &'static str = "test_signal";

    pub fn new(components: Vec<SignalComponent>) -> Result<Self, SolverError> {
        let signal = Self { components };
        signal.validate()?;
        Ok(signal)
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        self.components.iter().try_for_each(SignalComponent::validate)
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        self.components.iter().map(|c| c.evaluate(t)).sum()
    }

    /// Sample the signal on every point of `grid`.
    pub fn sample(&self, grid: &TimeGrid) -> Array1<f64> {
        grid.times().mapv(|t| self.evaluate(t))
    }

    /// Exact sine-transform coefficients of the sampled signal at `frequency`,
    /// computed with the same operator the reconstruction inverts.
    pub fn sine_coefficients(
        &self,
        backend: &dyn ComputeBackend,
        grid: &TimeGrid,
        frequency: &[f64],
    ) -> Result<Array1<f64>, SolverError> {
        self.validate()?;
        let frequency = Array1::from_vec(frequency.to_vec());
        let operator = FourierOperator::build(backend, &frequency, grid)?;
        operator.apply(backend, &self.sample(grid))
    }

    pub fn write_to_archive(&self, archive: &mut Archive, grid: &TimeGrid) {
        let group = archive.require_group(Self::GROUP);
        grid.write_to_group(group);
        group.insert("amplitude", self.sample(grid).to_vec());
    }
}
