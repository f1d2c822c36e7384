//! sinecs command-line interface.
//!
//! Run reconstructions from TOML configuration files:
//! ```sh
//! sinecs run job.toml
//! sinecs validate job.toml
//! sinecs variants
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use sinecs_core::Variant;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sinecs")]
#[command(about = "sinecs: sparse signal reconstruction from sine-Fourier coefficients")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reconstruction from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Algorithm variant (overrides config file setting).
        #[arg(long)]
        variant: Option<Variant>,
    },
    /// Validate a configuration file without running the reconstruction.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the available algorithm variants.
    Variants,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output,
            variant,
        } => {
            println!("sinecs reconstruction");
            println!("=====================");
            let mut job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());
            if let Some(variant) = variant {
                job.reconstruction.variant = variant;
            }

            let base_dir = config.parent().unwrap_or(Path::new("."));
            let result = runner::run_reconstruction(&job, base_dir)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_archive {
                runner::write_archive(&result.archive, &out_dir.join("archive.json"))?;
            }
            if job.output.save_csv {
                runner::write_reconstruction_csv(
                    &result,
                    &out_dir.join("reconstruction.csv"),
                    &job,
                )?;
            }

            println!("Reconstruction complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let _job = config::load_config(&config)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Variants => {
            println!("Available variants:");
            println!();
            for variant in Variant::ALL {
                let default = if variant == Variant::default() {
                    " (default)"
                } else {
                    ""
                };
                println!("  {:<12} {}{}", variant.name(), variant.description(), default);
            }
            Ok(())
        }
    }
}
