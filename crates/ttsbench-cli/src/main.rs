//! ttsbench - download and benchmark offline TTS models
//!
//! Examples:
//!   ttsbench models list                          # Catalog with readiness
//!   ttsbench models pull kokoro-en-v0_19          # Download with dependencies
//!   ttsbench bench tone-en --suite prompts/en.json --mode cold
//!   ttsbench report --run-id 20260101T000000Z-ab12cd34

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use ttsbench_core::RunMode;

mod commands;

/// Offline TTS benchmark: model lifecycle and cold/warm timing runs
#[derive(Parser, Debug)]
#[command(
    name = "ttsbench",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and download catalog models
    #[command(name = "models", alias = "model")]
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },

    /// Run a prompt suite against a model
    ///
    /// The model must be ready; every prompt gets an audio.wav and a
    /// result.json under <exports_dir>/<run_id>/<model_id>/<prompt_id>/.
    Bench {
        /// Catalog id of the model
        model: String,

        /// Prompt suite JSON file
        #[arg(short, long, value_name = "FILE")]
        suite: PathBuf,

        /// Timing discipline: cold or warm
        #[arg(short, long, default_value = "warm")]
        mode: RunMode,

        /// Synthesis repetitions per prompt in warm mode
        #[arg(short, long, default_value = "3")]
        iterations: u32,

        /// Inference threads (defaults to the configured value)
        #[arg(short, long)]
        threads: Option<u32>,

        /// Execution provider (defaults to the configured value)
        #[arg(long)]
        provider: Option<String>,

        /// Speaker index
        #[arg(long, default_value = "0")]
        speaker: u32,

        /// Speaking rate multiplier
        #[arg(long, default_value = "1.0")]
        speed: f32,

        /// Run id (defaults to a timestamp)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Aggregate result records into tts_results.json and tts_report.md
    Report {
        /// Only include this run
        #[arg(long)]
        run_id: Option<String>,

        /// Output directory (defaults to <exports_dir>/report)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ModelCommands {
    /// List catalog models and their readiness
    #[command(alias = "ls")]
    List,

    /// Show readiness of one model
    Status {
        /// Catalog id of the model
        model: String,
    },

    /// Download a model and its dependencies
    ///
    /// Interrupted downloads resume where they stopped.
    #[command(alias = "download")]
    Pull {
        /// Catalog id of the model
        model: String,

        /// Download only the model itself
        #[arg(long)]
        no_deps: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Models { command } => match command {
            ModelCommands::List => commands::list_models(&config),
            ModelCommands::Status { model } => commands::model_status(&config, &model),
            ModelCommands::Pull { model, no_deps } => {
                commands::pull_model(&config, &model, no_deps).await
            }
        },
        Commands::Bench {
            model,
            suite,
            mode,
            iterations,
            threads,
            provider,
            speaker,
            speed,
            run_id,
        } => {
            let args = commands::BenchArgs {
                suite,
                mode,
                iterations,
                threads,
                provider,
                speaker,
                speed,
                run_id,
            };
            commands::bench(&config, &model, args).await
        }
        Commands::Report { run_id, output } => {
            commands::report(&config, run_id.as_deref(), output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bench_args() {
        let cli = Cli::parse_from([
            "ttsbench", "bench", "tone-en", "--suite", "en.json", "--mode", "cold", "--threads", "2",
        ]);
        match cli.command {
            Commands::Bench {
                model, mode, threads, iterations, ..
            } => {
                assert_eq!(model, "tone-en");
                assert_eq!(mode, RunMode::Cold);
                assert_eq!(threads, Some(2));
                assert_eq!(iterations, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_pull_args() {
        let cli = Cli::parse_from(["ttsbench", "--verbose", "models", "pull", "kokoro", "--no-deps"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Models {
                command: ModelCommands::Pull { no_deps: true, .. }
            }
        ));
    }
}
