use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcmc_pipeline::config::JobConfig;
use mcmc_pipeline::pipeline;
use mcmc_pipeline::sampler;

/// Declarative MCMC sampling jobs from a YAML description.
#[derive(Parser)]
#[command(name = "mcmc-pipeline", version, about)]
struct Args {
    /// Full path to the job configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Job id appended to output names, for batch submission.
    #[arg(long)]
    job_id: Option<String>,

    /// Override the configured base random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Disable per-chain progress bars.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = JobConfig::from_path(&args.config)?;
    if let Some(job_id) = args.job_id {
        config.job_id = job_id;
    }
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }

    tracing::debug!(engines = %sampler::known_engines(), "engine registry");
    let outcome = pipeline::run_job(&config, !args.quiet)?;

    if let Some(report) = &outcome.diagnostics {
        println!("{}", report.message);
    }
    Ok(())
}
