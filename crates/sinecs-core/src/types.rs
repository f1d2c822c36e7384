//! Core types shared across the reconstruction pipeline.
//!
//! This module defines the fundamental data structures: the time grid a
//! signal is reconstructed on, measured frequency samples, reconstruction
//! parameters, and the result record handed to the archive.

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::Deserialize;

use crate::archive::{Archive, ArchiveError, ArchiveGroup};
use crate::solver::SolverError;

/// Ordered, strictly increasing sample times (seconds) with the coarse
/// sampling interval used to normalise the sine-Fourier operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    times: Array1<f64>,
    step: f64,
}

impl TimeGrid {
    /// Largest sample count [`TimeGrid::uniform`] will allocate.
    pub const MAX_SAMPLES: usize = 1 << 27;

    /// Build a grid from explicit sample times and the coarse step.
    ///
    /// Fails with [`SolverError::InvalidInput`] when fewer than two samples are
    /// given, when the times are not strictly increasing or not finite, or when
    /// the step is not a positive finite number.
    pub fn new(times: Vec<f64>, step: f64) -> Result<Self, SolverError> {
        if times.len() < 2 {
            return Err(SolverError::InvalidInput(format!(
                "time grid needs at least 2 samples, got {}",
                times.len()
            )));
        }
        if !(step.is_finite() && step > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "time step must be positive and finite, got {step}"
            )));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(SolverError::InvalidInput(
                "time grid contains non-finite samples".into(),
            ));
        }
        if let Some(i) = (1..times.len()).find(|&i| times[i] <= times[i - 1]) {
            return Err(SolverError::InvalidInput(format!(
                "time grid must be strictly increasing (index {i})"
            )));
        }
        Ok(Self {
            times: Array1::from_vec(times),
            step,
        })
    }

    /// Uniform grid over the half-open interval `[start, stop)`.
    pub fn uniform(start: f64, stop: f64, step: f64) -> Result<Self, SolverError> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite() && step > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "invalid uniform grid: start={start}, stop={stop}, step={step}"
            )));
        }
        let ratio = (stop - start) / step;
        // Absorb floating-point noise so [0, 1) with step 1e-3 has 1000 samples.
        let count = if (ratio - ratio.round()).abs() < 1e-9 {
            ratio.round()
        } else {
            ratio.ceil()
        };
        if !(count <= Self::MAX_SAMPLES as f64) {
            return Err(SolverError::InvalidInput(format!(
                "uniform grid over [{start}, {stop}) with step {step} exceeds {} samples",
                Self::MAX_SAMPLES
            )));
        }
        let count = if count > 0.0 { count as usize } else { 0 };
        let times = (0..count).map(|i| start + i as f64 * step).collect();
        Self::new(times, step)
    }

    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    /// Coarse sampling interval $\Delta t$.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false: a valid grid holds at least two samples.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// First and last sample time.
    pub fn end_points(&self) -> [f64; 2] {
        [self.times[0], self.times[self.times.len() - 1]]
    }

    /// Grid span $T$ (last minus first sample time).
    pub fn span(&self) -> f64 {
        let [start, end] = self.end_points();
        end - start
    }

    pub fn write_to_group(&self, group: &mut ArchiveGroup) {
        group.insert("time_coarse", self.times.to_vec());
        group.insert("time_step_coarse", self.step);
        group.insert("time_end_points", self.end_points().to_vec());
    }

    pub fn read_from_group(group: &ArchiveGroup) -> Result<Self, ArchiveError> {
        let times = group.array("time_coarse")?.to_vec();
        let step = group.scalar("time_step_coarse")?;
        Self::new(times, step).map_err(|e| ArchiveError::Invalid(e.to_string()))
    }
}

/// A single measured sine-Fourier coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    /// Frequency (Hz).
    pub frequency: f64,
    /// Measured sine-coefficient amplitude.
    pub amplitude: f64,
}

/// Frequency-domain measurements handed over by the sensing experiment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentResults {
    pub frequency: Vec<f64>,
    pub frequency_amplitude: Vec<f64>,
}

impl ExperimentResults {
    pub fn new(frequency: Vec<f64>, frequency_amplitude: Vec<f64>) -> Self {
        Self {
            frequency,
            frequency_amplitude,
        }
    }

    /// Parse `frequency,amplitude` rows. Blank lines, `#` comments and a
    /// non-numeric header row are skipped.
    pub fn from_csv_str(content: &str) -> Result<Self, SolverError> {
        let mut results = Self::default();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 2 {
                return Err(SolverError::InvalidInput(format!(
                    "line {}: expected 'frequency,amplitude'",
                    line_no + 1
                )));
            }
            match (fields[0].parse::<f64>(), fields[1].parse::<f64>()) {
                (Ok(f), Ok(a)) => {
                    results.frequency.push(f);
                    results.frequency_amplitude.push(a);
                }
                _ if results.frequency.is_empty() => continue, // header
                _ => {
                    return Err(SolverError::InvalidInput(format!(
                        "line {}: cannot parse '{}'",
                        line_no + 1,
                        line
                    )))
                }
            }
        }
        Ok(results)
    }
}

/// Which proximal-gradient variant the iteration driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Plain ISTA: predict, gradient step, shrink.
    Ista,
    /// ISTA with Nesterov momentum.
    #[default]
    Fista,
    /// Shrink first, then predict and gradient step; no momentum.
    NaiveIsta,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Ista, Variant::Fista, Variant::NaiveIsta];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Ista => "ista",
            Variant::Fista => "fista",
            Variant::NaiveIsta => "naive_ista",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Variant::Ista => "Iterative Shrinkage-Thresholding Algorithm",
            Variant::Fista => "Fast ISTA with Nesterov momentum",
            Variant::NaiveIsta => "ISTA with the shrinkage applied before the gradient step",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| SolverError::InvalidInput(format!("unknown variant '{s}'")))
    }
}

/// Starting point of the optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialGuess {
    /// Scaled adjoint of the operator applied to the measurements.
    #[default]
    Adjoint,
    Zero,
}

/// Hyperparameters of a reconstruction run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReconstructionParams {
    /// Shrinkage threshold applied every iteration.
    #[serde(default = "default_step_size_sparse")]
    pub step_size_sparse: f64,
    /// Gradient step size on the data-fidelity term. The large default
    /// reflects the small scale of the operator entries ($\Delta t / T$).
    #[serde(default = "default_step_size_manifold")]
    pub step_size_manifold: f64,
    /// Bound on the squared distance between consecutive iterates.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub initial_guess: InitialGuess,
}

fn default_step_size_sparse() -> f64 {
    0.1
}
fn default_step_size_manifold() -> f64 {
    100_000.0
}
fn default_convergence_threshold() -> f64 {
    1.0
}
fn default_max_iterations() -> usize {
    10_000
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            step_size_sparse: default_step_size_sparse(),
            step_size_manifold: default_step_size_manifold(),
            convergence_threshold: default_convergence_threshold(),
            max_iterations: default_max_iterations(),
            initial_guess: InitialGuess::default(),
        }
    }
}

impl ReconstructionParams {
    /// Check that every hyperparameter is usable by the iteration driver.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.step_size_sparse.is_finite() && self.step_size_sparse >= 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "step_size_sparse must be finite and non-negative, got {}",
                self.step_size_sparse
            )));
        }
        if !(self.step_size_manifold.is_finite() && self.step_size_manifold > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "step_size_manifold must be finite and positive, got {}",
                self.step_size_manifold
            )));
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "convergence_threshold must be finite and positive, got {}",
                self.convergence_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::InvalidInput(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn write_to_group(&self, group: &mut ArchiveGroup) {
        group.insert("step_size_sparse", self.step_size_sparse);
        group.insert("step_size_manifold", self.step_size_manifold);
        group.insert("convergence_threshold", self.convergence_threshold);
        group.insert("max_iterations", self.max_iterations as f64);
    }

    /// Read parameters from an archive group, falling back to defaults for
    /// keys that are absent.
    pub fn from_group(group: &ArchiveGroup) -> Result<Self, ArchiveError> {
        let defaults = Self::default();
        let read = |key: &str, fallback: f64| -> Result<f64, ArchiveError> {
            if group.contains(key) {
                group.scalar(key)
            } else {
                Ok(fallback)
            }
        };
        Ok(Self {
            step_size_sparse: read("step_size_sparse", defaults.step_size_sparse)?,
            step_size_manifold: read("step_size_manifold", defaults.step_size_manifold)?,
            convergence_threshold: read("convergence_threshold", defaults.convergence_threshold)?,
            max_iterations: read("max_iterations", defaults.max_iterations as f64)? as usize,
            initial_guess: defaults.initial_guess,
        })
    }
}

/// Snapshot of a finished reconstruction, as persisted to the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionRecord {
    pub time_grid: TimeGrid,
    /// Selected frequencies (Hz).
    pub frequency: Array1<f64>,
    /// Measured amplitudes at the selected frequencies.
    pub frequency_amplitude: Array1<f64>,
    /// Reconstructed time-domain amplitude, one value per grid sample.
    pub amplitude: Array1<f64>,
}

impl ReconstructionRecord {
    /// Logical archive group the record is stored under.
    pub const GROUP: &'static str = "reconstruction";

    pub fn write_to_archive(&self, archive: &mut Archive) {
        let group = archive.require_group(Self::GROUP);
        self.time_grid.write_to_group(group);
        group.insert("frequency", self.frequency.to_vec());
        group.insert("frequency_amplitude", self.frequency_amplitude.to_vec());
        group.insert("amplitude", self.amplitude.to_vec());
    }

    pub fn read_from_archive(archive: &Archive) -> Result<Self, ArchiveError> {
        let group = archive.group(Self::GROUP)?;
        let time_grid = TimeGrid::read_from_group(group)?;
        let amplitude = Array1::from_vec(group.array("amplitude")?.to_vec());
        if amplitude.len() != time_grid.len() {
            return Err(ArchiveError::Invalid(format!(
                "amplitude has {} samples but the time grid has {}",
                amplitude.len(),
                time_grid.len()
            )));
        }
        Ok(Self {
            time_grid,
            frequency: Array1::from_vec(group.array("frequency")?.to_vec()),
            frequency_amplitude: Array1::from_vec(group.array("frequency_amplitude")?.to_vec()),
            amplitude,
        })
    }

    /// Root-mean-square difference from a reference signal on the same grid.
    pub fn rms_error(&self, reference: &Array1<f64>) -> Option<f64> {
        if reference.len() != self.amplitude.len() {
            return None;
        }
        let diff = &self.amplitude - reference;
        Some((diff.mapv(|d| d * d).sum() / diff.len() as f64).sqrt())
    }
}
