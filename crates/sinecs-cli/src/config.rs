//! TOML configuration deserialisation for reconstruction jobs.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use sinecs_core::session::{
    DEFAULT_EXPERIMENT_FREQUENCY_CUTOFF, DEFAULT_FREQUENCY_CUTOFF, DEFAULT_NUMBER_OF_SAMPLES,
};
use sinecs_core::{ReconstructionParams, TestSignal, TimeGrid, Variant};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub time: TimeConfig,
    /// Ground-truth signal. Required unless samples are read from a file.
    #[serde(default)]
    pub signal: Option<TestSignal>,
    pub samples: SamplesConfig,
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Uniform time grid over `[start, stop)` in seconds.
#[derive(Debug, Deserialize)]
pub struct TimeConfig {
    #[serde(default)]
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl TimeConfig {
    pub fn grid(&self) -> anyhow::Result<TimeGrid> {
        TimeGrid::uniform(self.start, self.stop, self.step).with_context(|| {
            format!(
                "invalid time grid [{}, {}) with step {}",
                self.start, self.stop, self.step
            )
        })
    }
}

/// Frequency sampling settings.
#[derive(Debug, Deserialize)]
pub struct SamplesConfig {
    pub frequencies: FrequencySpec,
    /// How many frequencies to draw (default: 100).
    #[serde(default = "default_number")]
    pub number: usize,
    /// Only frequencies strictly below the cutoff (Hz) are eligible.
    #[serde(default)]
    pub cutoff: Option<f64>,
    /// Seed for the sample selection; drawn at random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_number() -> usize {
    DEFAULT_NUMBER_OF_SAMPLES
}

impl SamplesConfig {
    pub fn cutoff(&self) -> f64 {
        self.cutoff.unwrap_or(match self.frequencies {
            FrequencySpec::File { .. } => DEFAULT_EXPERIMENT_FREQUENCY_CUTOFF,
            _ => DEFAULT_FREQUENCY_CUTOFF,
        })
    }
}

/// Largest number of candidate frequencies a range may expand to.
const MAX_FREQUENCIES: usize = 10_000_000;

/// Where the candidate frequencies come from: a range or explicit list
/// (coefficients computed from `[signal]`), or a `frequency,amplitude` CSV of
/// measured coefficients.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FrequencySpec {
    Range { range: [f64; 2], step: f64 },
    List { values: Vec<f64> },
    File { file: String },
}

impl FrequencySpec {
    /// Candidate frequencies of a range or list specification. Range end
    /// points are inclusive.
    pub fn values(&self) -> anyhow::Result<Vec<f64>> {
        match self {
            FrequencySpec::Range { range, step } => {
                let [start, end] = *range;
                if !(step.is_finite() && *step > 0.0) {
                    bail!("frequency step must be positive, got {}", step);
                }
                if !(start.is_finite() && end.is_finite()) || end < start {
                    bail!("invalid frequency range [{}, {}]", start, end);
                }
                let count = ((end - start) / step + 1e-9).floor();
                if !(count < MAX_FREQUENCIES as f64) {
                    bail!(
                        "frequency range [{}, {}] with step {} exceeds {} values",
                        start,
                        end,
                        step,
                        MAX_FREQUENCIES
                    );
                }
                let count = count as usize + 1;
                Ok((0..count).map(|i| start + i as f64 * step).collect())
            }
            FrequencySpec::List { values } => Ok(values.clone()),
            FrequencySpec::File { file } => {
                bail!("frequencies are read from '{}', not listed", file)
            }
        }
    }
}

/// Solver settings: variant selection plus [`ReconstructionParams`].
#[derive(Debug, Default, Deserialize)]
pub struct ReconstructionConfig {
    #[serde(default)]
    pub variant: Variant,
    /// Worker threads for the CPU backend (default: all cores).
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(flatten)]
    pub params: ReconstructionParams,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the JSON archive (default: true).
    #[serde(default = "default_true")]
    pub save_archive: bool,
    /// Whether to save the reconstructed amplitude as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_archive: true,
            save_csv: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Check everything that can be checked without running the solver.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.time.grid()?;
        self.reconstruction
            .params
            .validate()
            .context("invalid [reconstruction] settings")?;
        if self.reconstruction.threads == Some(0) {
            bail!("[reconstruction] threads must be at least 1");
        }
        if let Some(signal) = &self.signal {
            signal.validate().context("invalid [signal]")?;
        }
        if self.samples.number == 0 {
            bail!("[samples] number must be at least 1");
        }
        match &self.samples.frequencies {
            FrequencySpec::File { .. } => {}
            spec => {
                if self.signal.is_none() {
                    bail!("[signal] is required when frequencies are listed rather than read from a file");
                }
                let eligible = spec
                    .values()?
                    .into_iter()
                    .filter(|&f| f < self.samples.cutoff())
                    .map(|f| (f + 0.0).to_bits())
                    .collect::<HashSet<_>>()
                    .len();
                if self.samples.number > eligible {
                    bail!(
                        "[samples] number is {} but only {} distinct frequencies lie below the {} Hz cutoff",
                        self.samples.number,
                        eligible,
                        self.samples.cutoff()
                    );
                }
            }
        }
        Ok(())
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config: JobConfig =
        toml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinecs_core::InitialGuess;

    const JOB: &str = r#"
[time]
stop = 1.0
step = 1e-3

[[signal.component]]
type = "sine"
amplitude = 1.0
frequency = 10.0

[samples]
frequencies = { range = [10.0, 30.0], step = 10.0 }
number = 3
cutoff = 100.0
seed = 7

[reconstruction]
variant = "ista"
step_size_sparse = 1e-3
step_size_manifold = 1000.0
initial_guess = "zero"
"#;

    #[test]
    fn test_parse_full_job() {
        let job: JobConfig = toml::from_str(JOB).unwrap();
        job.validate().unwrap();

        assert_eq!(job.time.grid().unwrap().len(), 1000);
        assert_eq!(job.signal.as_ref().unwrap().components.len(), 1);
        assert_eq!(job.samples.frequencies.values().unwrap(), vec![10.0, 20.0, 30.0]);
        assert_eq!(job.samples.seed, Some(7));
        assert_eq!(job.reconstruction.variant, Variant::Ista);
        assert_eq!(job.reconstruction.params.step_size_manifold, 1000.0);
        assert_eq!(job.reconstruction.params.initial_guess, InitialGuess::Zero);
        assert_eq!(job.reconstruction.params.max_iterations, 10_000);
        assert_eq!(job.output.directory, "./output");
        assert!(job.output.save_archive);
    }

    #[test]
    fn test_defaults_for_file_source() {
        let job: JobConfig = toml::from_str(
            r#"
[time]
stop = 0.1
step = 5e-7

[samples]
frequencies = { file = "measurements.csv" }
"#,
        )
        .unwrap();
        job.validate().unwrap();
        assert_eq!(job.samples.number, DEFAULT_NUMBER_OF_SAMPLES);
        assert_eq!(job.samples.cutoff(), DEFAULT_EXPERIMENT_FREQUENCY_CUTOFF);
        assert_eq!(job.reconstruction.variant, Variant::Fista);
        assert_eq!(job.reconstruction.params, ReconstructionParams::default());
    }

    #[test]
    fn test_listed_frequencies_need_signal() {
        let job: JobConfig = toml::from_str(
            r#"
[time]
stop = 1.0
step = 1e-3

[samples]
frequencies = { values = [1.0, 2.0] }
number = 1
"#,
        )
        .unwrap();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_too_many_samples_rejected() {
        let job: JobConfig = toml::from_str(&JOB.replace("number = 3", "number = 4")).unwrap();
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("only 3 distinct frequencies"));
    }

    #[test]
    fn test_repeated_listed_frequencies_count_once() {
        let job: JobConfig = toml::from_str(&JOB.replace(
            "{ range = [10.0, 30.0], step = 10.0 }",
            "{ values = [10.0, 10.0, 20.0] }",
        ))
        .unwrap();
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("only 2 distinct frequencies"));
    }

    #[test]
    fn test_range_includes_end_point() {
        let spec = FrequencySpec::Range {
            range: [0.1, 0.3],
            step: 0.1,
        };
        assert_eq!(spec.values().unwrap().len(), 3);
    }

    #[test]
    fn test_oversized_range_rejected() {
        let spec = FrequencySpec::Range {
            range: [0.0, 1.0],
            step: 1e-300,
        };
        let err = spec.values().unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let job: JobConfig =
            toml::from_str(&JOB.replace("step = 10.0", "step = 1e-300")).unwrap();
        assert!(job.validate().is_err());
    }
}
