//! Strata command-line interface.
//!
//! Run thermal flux simulations from TOML job files:
//! ```sh
//! strata run job.toml
//! strata validate job.toml
//! ```

mod config;
mod runner;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Strata: near-field thermal radiation in layered periodic structures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML job file.
    Run {
        /// Path to the job file.
        config: PathBuf,
        /// Output directory (overrides the job file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build and initialise the structure without integrating.
    Validate {
        /// Path to the job file.
        config: PathBuf,
    },
}

fn job_dir(config: &Path) -> &Path {
    config.parent().unwrap_or_else(|| Path::new("."))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Strata flux solver");
            println!("==================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_simulation(&job, job_dir(&config))?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_spectrum {
                runner::write_spectrum_csv(&result.spectrum, &out_dir.join("spectrum.csv"), &job)?;
            }
            if job.output.save_json {
                runner::write_spectrum_json(&result.spectrum, &out_dir.join("spectrum.json"))?;
            }
            if let Some(points) = &result.realization {
                runner::write_realization_csv(points, &out_dir.join("realization.csv"))?;
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let sim = runner::build_simulation(&job, job_dir(&config))?;
            println!("{}", sim.system_info());
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
    }
}
