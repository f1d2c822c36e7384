//! Reconstruction session: sample ingestion, running, and result export.
//!
//! A [`ReconstructionSession`] borrows a [`TimeGrid`] for its whole lifetime
//! and exclusively owns the selected frequency samples, the assembled operator
//! and the reconstructed amplitude. `run` takes `&mut self`, so a session can
//! never have two runs in flight.

use std::collections::HashSet;
use std::sync::Arc;

use ndarray::Array1;
use rand::Rng;
use sinecs_compute::ComputeBackend;

use crate::archive::Archive;
use crate::operator::FourierOperator;
use crate::signal::TestSignal;
use crate::solver::driver::IterationDriver;
use crate::solver::{CancelToken, IterationReport, SolverError};
use crate::types::{
    ExperimentResults, FrequencySample, InitialGuess, ReconstructionParams, ReconstructionRecord,
    TimeGrid, Variant,
};

/// Default frequency cutoff (Hz) when ingesting raw arrays.
pub const DEFAULT_FREQUENCY_CUTOFF: f64 = 3000.0;
/// Default frequency cutoff (Hz) when ingesting experiment results.
pub const DEFAULT_EXPERIMENT_FREQUENCY_CUTOFF: f64 = 100_000.0;
/// Default number of frequency samples drawn at ingestion.
pub const DEFAULT_NUMBER_OF_SAMPLES: usize = 100;

pub struct ReconstructionSession<'g> {
    time_grid: &'g TimeGrid,
    params: ReconstructionParams,
    backend: Arc<dyn ComputeBackend>,
    frequency: Option<Array1<f64>>,
    frequency_amplitude: Option<Array1<f64>>,
    operator: Option<FourierOperator>,
    amplitude: Option<Array1<f64>>,
    report: Option<IterationReport>,
}

impl<'g> ReconstructionSession<'g> {
    pub fn new(
        time_grid: &'g TimeGrid,
        params: ReconstructionParams,
        backend: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            time_grid,
            params,
            backend,
            frequency: None,
            frequency_amplitude: None,
            operator: None,
            amplitude: None,
            report: None,
        }
    }

    pub fn params(&self) -> &ReconstructionParams {
        &self.params
    }

    pub fn time_grid(&self) -> &TimeGrid {
        self.time_grid
    }

    /// Selected frequency samples, in input order.
    pub fn samples(&self) -> Vec<FrequencySample> {
        match (&self.frequency, &self.frequency_amplitude) {
            (Some(f), Some(a)) => f
                .iter()
                .zip(a.iter())
                .map(|(&frequency, &amplitude)| FrequencySample {
                    frequency,
                    amplitude,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn report(&self) -> Option<&IterationReport> {
        self.report.as_ref()
    }

    /// Draw `sample_count` distinct entries uniformly at random from those with
    /// frequency below `frequency_cutoff` and store them as the measurement set.
    ///
    /// Repeated frequencies count once, keeping the first entry. Selected
    /// entries keep their input order. On error the session is left exactly
    /// as it was.
    pub fn ingest_samples<R: Rng + ?Sized>(
        &mut self,
        frequency: &[f64],
        frequency_amplitude: &[f64],
        sample_count: usize,
        frequency_cutoff: f64,
        rng: &mut R,
    ) -> Result<(), SolverError> {
        if frequency.len() != frequency_amplitude.len() {
            return Err(SolverError::InvalidInput(format!(
                "{} frequencies but {} amplitudes",
                frequency.len(),
                frequency_amplitude.len()
            )));
        }
        if sample_count == 0 {
            return Err(SolverError::InvalidInput(
                "sample count must be at least 1".into(),
            ));
        }
        if frequency
            .iter()
            .chain(frequency_amplitude.iter())
            .any(|v| !v.is_finite())
        {
            return Err(SolverError::InvalidInput(
                "frequency samples must be finite".into(),
            ));
        }

        // A repeated frequency would give the operator two identical rows.
        // The first occurrence wins.
        let mut seen = HashSet::with_capacity(frequency.len());
        let distinct: Vec<usize> = (0..frequency.len())
            .filter(|&i| seen.insert((frequency[i] + 0.0).to_bits()))
            .collect();
        if distinct.len() < frequency.len() {
            log::debug!(
                "Dropped {} repeated frequencies",
                frequency.len() - distinct.len()
            );
        }

        let eligible: Vec<usize> = distinct
            .into_iter()
            .filter(|&i| frequency[i] < frequency_cutoff)
            .collect();
        if sample_count > eligible.len() {
            return Err(SolverError::InvalidInput(format!(
                "requested {} samples but only {} distinct frequencies lie below {} Hz",
                sample_count,
                eligible.len(),
                frequency_cutoff
            )));
        }

        let mut picked: Vec<usize> = rand::seq::index::sample(rng, eligible.len(), sample_count)
            .into_iter()
            .map(|k| eligible[k])
            .collect();
        picked.sort_unstable();

        log::info!(
            "Selected {} of {} eligible frequency samples (cutoff {} Hz)",
            sample_count,
            eligible.len(),
            frequency_cutoff
        );

        self.frequency = Some(picked.iter().map(|&i| frequency[i]).collect());
        self.frequency_amplitude = Some(picked.iter().map(|&i| frequency_amplitude[i]).collect());
        self.operator = None;
        self.amplitude = None;
        self.report = None;
        Ok(())
    }

    /// Ingest measurements produced by the sensing experiment.
    pub fn ingest_experiment_results<R: Rng + ?Sized>(
        &mut self,
        results: &ExperimentResults,
        sample_count: usize,
        frequency_cutoff: f64,
        rng: &mut R,
    ) -> Result<(), SolverError> {
        self.ingest_samples(
            &results.frequency,
            &results.frequency_amplitude,
            sample_count,
            frequency_cutoff,
            rng,
        )
    }

    /// Ingest the exact sine coefficients of a test signal at `frequency`.
    pub fn ingest_test_signal<R: Rng + ?Sized>(
        &mut self,
        signal: &TestSignal,
        frequency: &[f64],
        sample_count: usize,
        frequency_cutoff: f64,
        rng: &mut R,
    ) -> Result<(), SolverError> {
        let coefficients = signal
            .sine_coefficients(self.backend.as_ref(), self.time_grid, frequency)?
            .to_vec();
        self.ingest_samples(
            frequency,
            &coefficients,
            sample_count,
            frequency_cutoff,
            rng,
        )
    }

    /// Run the iteration driver to convergence and store the result.
    pub fn run(&mut self, variant: Variant) -> Result<&IterationReport, SolverError> {
        self.run_with_cancel(variant, &CancelToken::new())
    }

    /// As [`run`](Self::run), stopping early with [`SolverError::Cancelled`]
    /// once `cancel` is triggered.
    pub fn run_with_cancel(
        &mut self,
        variant: Variant,
        cancel: &CancelToken,
    ) -> Result<&IterationReport, SolverError> {
        let (frequency, measured) = match (&self.frequency, &self.frequency_amplitude) {
            (Some(f), Some(a)) => (f, a),
            _ => {
                return Err(SolverError::NotReady(
                    "no frequency samples have been ingested".into(),
                ))
            }
        };
        self.params.validate()?;
        self.amplitude = None;
        self.report = None;

        let backend = self.backend.as_ref();
        if self.operator.is_none() {
            self.operator = Some(FourierOperator::build(backend, frequency, self.time_grid)?);
        }
        let Some(operator) = self.operator.as_ref() else {
            return Err(SolverError::NotReady("operator was not assembled".into()));
        };

        let initial = match self.params.initial_guess {
            InitialGuess::Adjoint => operator.adjoint_estimate(backend, measured)?,
            InitialGuess::Zero => Array1::zeros(self.time_grid.len()),
        };

        let driver = IterationDriver::new(backend, operator, measured, &self.params)?;
        let (amplitude, report) = driver.run(variant, initial, cancel)?;

        self.amplitude = Some(amplitude);
        Ok(&*self.report.insert(report))
    }

    /// Read-only view of the time grid and reconstructed amplitude.
    pub fn export_result(&self) -> Result<(&TimeGrid, &Array1<f64>), SolverError> {
        match &self.amplitude {
            Some(amplitude) => Ok((self.time_grid, amplitude)),
            None => Err(SolverError::NotReady(
                "run has not completed on this session".into(),
            )),
        }
    }

    /// Owned snapshot of the result together with the selected samples.
    pub fn record(&self) -> Result<ReconstructionRecord, SolverError> {
        let (time_grid, amplitude) = self.export_result()?;
        let (frequency, frequency_amplitude) = match (&self.frequency, &self.frequency_amplitude) {
            (Some(f), Some(a)) => (f.clone(), a.clone()),
            _ => return Err(SolverError::NotReady("no frequency samples".into())),
        };
        Ok(ReconstructionRecord {
            time_grid: time_grid.clone(),
            frequency,
            frequency_amplitude,
            amplitude: amplitude.clone(),
        })
    }

    /// Write the result, parameters and run summary into the
    /// `"reconstruction"` group of `archive`.
    pub fn write_to_archive(&self, archive: &mut Archive) -> Result<(), SolverError> {
        self.record()?.write_to_archive(archive);
        let group = archive.require_group(ReconstructionRecord::GROUP);
        self.params.write_to_group(group);
        if let Some(report) = &self.report {
            group.insert("variant", report.variant.name());
            group.insert("iterations", report.iterations as f64);
        }
        Ok(())
    }
}
