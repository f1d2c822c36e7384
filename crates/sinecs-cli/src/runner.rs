//! Reconstruction runner: ties together sampling, the session and output.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

use sinecs_compute::{ComputeBackend, CpuBackend};
use sinecs_core::{
    Archive, ExperimentResults, IterationReport, ReconstructionRecord, ReconstructionSession,
};

use crate::config::{FrequencySpec, JobConfig};

/// Results from a reconstruction run.
pub struct ReconstructionOutput {
    pub record: ReconstructionRecord,
    pub report: IterationReport,
    /// Ground-truth signal sampled on the grid, when `[signal]` was given.
    pub ground_truth: Option<Array1<f64>>,
    pub archive: Archive,
    pub seed: u64,
}

impl ReconstructionOutput {
    /// RMS difference from the ground truth, if one is known.
    pub fn rms_error(&self) -> Option<f64> {
        self.ground_truth
            .as_ref()
            .and_then(|truth| self.record.rms_error(truth))
    }
}

/// Run a full reconstruction from a parsed job configuration. Relative file
/// paths in the job are resolved against `base_dir`.
pub fn run_reconstruction(job: &JobConfig, base_dir: &Path) -> Result<ReconstructionOutput> {
    let grid = job.time.grid()?;
    println!(
        "Time grid: {} samples over [{}, {}] s (step {} s)",
        grid.len(),
        grid.end_points()[0],
        grid.end_points()[1],
        grid.step()
    );

    let backend = create_backend(job.reconstruction.threads)?;
    let seed = job.samples.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    println!("Sampling seed: {}", seed);

    let mut session =
        ReconstructionSession::new(&grid, job.reconstruction.params.clone(), backend);
    let number = job.samples.number;
    let cutoff = job.samples.cutoff();

    match (&job.samples.frequencies, &job.signal) {
        (FrequencySpec::File { file }, _) => {
            let path = base_dir.join(file);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read measurements from {}", path.display()))?;
            let results = ExperimentResults::from_csv_str(&content)
                .with_context(|| format!("malformed measurements in {}", path.display()))?;
            println!(
                "Loaded {} measured coefficients from {}",
                results.frequency.len(),
                path.display()
            );
            session.ingest_experiment_results(&results, number, cutoff, &mut rng)?;
        }
        (spec, Some(signal)) => {
            let frequency = spec.values()?;
            println!(
                "Computing {} sine coefficients of the test signal",
                frequency.len()
            );
            session.ingest_test_signal(signal, &frequency, number, cutoff, &mut rng)?;
        }
        (_, None) => bail!("[signal] is required when frequencies are listed"),
    }
    println!("Selected {} frequencies below {} Hz", number, cutoff);

    let variant = job.reconstruction.variant;
    println!("Running {} ({})...", variant, variant.description());
    let report = session
        .run(variant)
        .with_context(|| format!("{} reconstruction failed", variant))?
        .clone();
    println!(
        "  converged after {} iterations in {:.3} s (final change {:.3e})",
        report.iterations,
        report.elapsed.as_secs_f64(),
        report.final_change
    );

    let mut archive = Archive::new();
    session.write_to_archive(&mut archive)?;
    let ground_truth = job.signal.as_ref().map(|signal| {
        signal.write_to_archive(&mut archive, &grid);
        signal.sample(&grid)
    });

    let output = ReconstructionOutput {
        record: session.record()?,
        report,
        ground_truth,
        archive,
        seed,
    };
    if let Some(rms) = output.rms_error() {
        println!("RMS error against ground truth: {:.6e}", rms);
    }
    Ok(output)
}

/// Write the archive as pretty-printed JSON.
pub fn write_archive(archive: &Archive, path: &Path) -> Result<()> {
    archive
        .save(path)
        .with_context(|| format!("cannot write archive {}", path.display()))?;
    println!("Archive written to: {}", path.display());
    Ok(())
}

/// Write the reconstructed amplitude to a CSV file with a metadata header.
pub fn write_reconstruction_csv(
    output: &ReconstructionOutput,
    path: &Path,
    job: &JobConfig,
) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let params = &job.reconstruction.params;

    writeln!(file, "# sinecs reconstruction")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# variant: {}", output.report.variant)?;
    writeln!(file, "# iterations: {}", output.report.iterations)?;
    writeln!(file, "# step_size_sparse: {}", params.step_size_sparse)?;
    writeln!(file, "# step_size_manifold: {}", params.step_size_manifold)?;
    writeln!(file, "# convergence_threshold: {}", params.convergence_threshold)?;
    writeln!(file, "# frequencies: {}", output.record.frequency.len())?;
    writeln!(file, "# seed: {}", output.seed)?;
    if let Some(rms) = output.rms_error() {
        writeln!(file, "# rms_error: {:.6e}", rms)?;
    }
    writeln!(file, "#")?;

    let times = output.record.time_grid.times();
    match &output.ground_truth {
        Some(truth) => {
            writeln!(file, "time_s,amplitude,ground_truth")?;
            for ((t, a), g) in times.iter().zip(output.record.amplitude.iter()).zip(truth.iter()) {
                writeln!(file, "{:.9e},{:.9e},{:.9e}", t, a, g)?;
            }
        }
        None => {
            writeln!(file, "time_s,amplitude")?;
            for (t, a) in times.iter().zip(output.record.amplitude.iter()) {
                writeln!(file, "{:.9e},{:.9e}", t, a)?;
            }
        }
    }
    file.flush()?;

    println!("Reconstruction written to: {}", path.display());
    Ok(())
}

/// Create the CPU backend, optionally with a dedicated thread pool.
fn create_backend(threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    let backend = match threads {
        Some(n) => CpuBackend::with_threads(n)?,
        None => CpuBackend::new(),
    };
    println!("Backend: {}", backend.device_info().name);
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(frequencies: &str, with_signal: bool) -> JobConfig {
        let signal = if with_signal {
            "[[signal.component]]\ntype = \"sine\"\namplitude = 1.0\nfrequency = 10.0\n"
        } else {
            ""
        };
        toml::from_str(&format!(
            r#"
[time]
stop = 1.0
step = 1e-3

{signal}
[samples]
frequencies = {frequencies}
number = 3
cutoff = 100.0
seed = 11

[reconstruction]
step_size_sparse = 1e-3
step_size_manifold = 1000.0
threads = 2
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_run_from_test_signal() {
        let job = job("{ values = [10.0, 20.0, 30.0] }", true);
        job.validate().unwrap();
        let output = run_reconstruction(&job, Path::new(".")).unwrap();

        assert_eq!(output.seed, 11);
        assert_eq!(output.record.frequency.len(), 3);
        assert!(output.archive.group("reconstruction").is_ok());
        assert!(output.archive.group("test_signal").is_ok());
        assert!(output.rms_error().unwrap() < 0.05);
    }

    #[test]
    fn test_run_from_measurement_file_and_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        // coefficients of sin(2π·10 t) on the [0, 1) ms grid
        let peak = 500.0 * 1e-3 / 0.999;
        std::fs::write(
            dir.path().join("measurements.csv"),
            format!("frequency,amplitude\n10,{peak}\n20,0\n30,0\n400,1\n"),
        )
        .unwrap();

        let job = job("{ file = \"measurements.csv\" }", false);
        job.validate().unwrap();
        let output = run_reconstruction(&job, dir.path()).unwrap();
        assert!(output.ground_truth.is_none());
        assert!(output.rms_error().is_none());
        assert!(output.record.frequency.iter().all(|&f| f < 100.0));

        let archive_path = dir.path().join("out").join("archive.json");
        write_archive(&output.archive, &archive_path).unwrap();
        let loaded = Archive::load(&archive_path).unwrap();
        assert_eq!(
            ReconstructionRecord::read_from_archive(&loaded).unwrap(),
            output.record
        );

        let csv_path = dir.path().join("out").join("reconstruction.csv");
        write_reconstruction_csv(&output, &csv_path, &job).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let rows: Vec<&str> = csv.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows[0], "time_s,amplitude");
        assert_eq!(rows.len(), 1 + 1000);
    }

    #[test]
    fn test_missing_measurement_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = job("{ file = \"absent.csv\" }", false);
        let err = run_reconstruction(&job, dir.path()).err().unwrap();
        assert!(format!("{err:#}").contains("absent.csv"));
    }
}
