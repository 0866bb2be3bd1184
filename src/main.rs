use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mortality_pipeline::app::{PredictError, PredictUseCase, PredictionRequest};
use mortality_pipeline::config::{Config, CONFIG_ENV_VAR};
use mortality_pipeline::model::ModelCache;
use mortality_pipeline::observability::{init_logging, init_metrics};
use mortality_pipeline::pipeline::processing::clean::CleanSummary;
use mortality_pipeline::pipeline::tasks::{self, MergeSummary};
use mortality_pipeline::server;

#[derive(Parser)]
#[command(name = "mortality_pipeline")]
#[command(about = "Clean, merge and model US maternal mortality data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the mortality-rate and health-system tables
    Clean,
    /// Join the cleaned mortality-rate and health-system tables
    Merge,
    /// Clean the regional breakdown and derive the binary label
    Regional,
    /// Clean and join the KFF tables
    Kff,
    /// Run every cleaning and merge step in order
    Run,
    /// Fit the logistic model and print its summary
    Fit,
    /// Predict the probability of high mortality for one profile
    Predict {
        #[arg(long)]
        region: String,
        #[arg(long)]
        race: String,
        #[arg(long)]
        education: String,
        /// Ten-year age group, e.g. 15-24
        #[arg(long)]
        age: String,
    },
    /// Score pairwise interaction terms out of sample
    Search,
    /// Serve predictions over HTTP
    Serve {
        /// Overrides server.port from the configuration
        #[arg(long)]
        port: Option<u16>,
    },
}

fn print_clean(summary: &CleanSummary) {
    println!(
        "  {:<24} read {:>4}  kept {:>4}  dropped {:>4}  -> {}",
        summary.source_id,
        summary.rows_read,
        summary.rows_kept,
        summary.rows_dropped,
        summary.output.display()
    );
    if !summary.incomplete.is_empty() {
        warn!(source = %summary.source_id, states = ?summary.incomplete, "states without an abbreviation");
        println!("    incomplete (no abbreviation): {}", summary.incomplete.join(", "));
    }
}

fn print_merge(summary: &MergeSummary) {
    println!(
        "  merged {} rows [{}] -> {}",
        summary.rows,
        summary.columns.join(", "),
        summary.output.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let _log_guard = init_logging(&config.paths.log_dir).context("initializing logging")?;

    match cli.command {
        Commands::Clean => {
            println!("Cleaning source tables...");
            for summary in tasks::run_clean(&config)? {
                print_clean(&summary);
            }
        }
        Commands::Merge => {
            println!("Merging cleaned tables...");
            print_merge(&tasks::run_merge(&config)?);
        }
        Commands::Regional => {
            println!("Cleaning regional breakdown...");
            print_clean(&tasks::run_regional(&config)?);
        }
        Commands::Kff => {
            println!("Cleaning and merging KFF tables...");
            let (cleaned, merged) = tasks::run_kff(&config)?;
            cleaned.iter().for_each(print_clean);
            print_merge(&merged);
        }
        Commands::Run => {
            println!("Running full pipeline...");
            let summary = tasks::run_all(&config)?;
            summary.cleaned.iter().for_each(print_clean);
            print_merge(&summary.merged);
            print_clean(&summary.regional);
            summary.kff_cleaned.iter().for_each(print_clean);
            print_merge(&summary.kff_merged);
        }
        Commands::Fit => {
            let model = tasks::fit_model(&config).context("fitting model")?;
            println!("{}", model.summary());
        }
        Commands::Predict {
            region,
            race,
            education,
            age,
        } => {
            let cache = ModelCache::new(config.paths.training_data(), config.model.training_spec());
            let use_case = PredictUseCase::new(Box::new(cache), config.model.threshold);
            let request = PredictionRequest {
                region,
                race,
                education,
                age,
            };
            match use_case.execute(&request) {
                Ok(response) => {
                    println!("{}", response.explanation);
                    println!("probability: {}", response.probability);
                }
                Err(PredictError::Invalid(failure)) => {
                    anyhow::bail!("{}", failure.message);
                }
                Err(PredictError::Pipeline(e)) => return Err(e).context("predicting"),
            }
        }
        Commands::Search => {
            let report = tasks::search_interactions(&config).context("running interaction search")?;
            println!("{}", report.render());
        }
        Commands::Serve { port } => {
            init_metrics()?;
            let cache = ModelCache::new(config.paths.training_data(), config.model.training_spec());
            // fit up front so a bad training file fails at startup
            let model = cache.get().context("fitting model at startup")?;
            info!(observations = model.observations(), "model ready");

            let use_case = Arc::new(PredictUseCase::new(Box::new(cache), config.model.threshold));
            let port = port.unwrap_or(config.server.port);
            server::start_server(use_case, &config.server.host, port).await?;
        }
    }

    Ok(())
}
