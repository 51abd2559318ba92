//! Command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use ttsbench_core::{
    collect_records, summarize, write_report, BenchConfig, Catalog, EngineHost, HubClient,
    LoadOptions, ModelDownloader, ModelStore, PromptSuite, ReadinessEvaluator, ReadyState,
    RunMode, RunSettings, SuiteRunner, ToneEngine,
};

const PROGRESS_STEPS: u64 = 1000;

/// Options of the `bench` command
#[derive(Debug)]
pub struct BenchArgs {
    pub suite: PathBuf,
    pub mode: RunMode,
    pub iterations: u32,
    pub threads: Option<u32>,
    pub provider: Option<String>,
    pub speaker: u32,
    pub speed: f32,
    pub run_id: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    BenchConfig::load(path).context("Failed to load configuration")
}

fn load_catalog(config: &BenchConfig) -> Result<Arc<Catalog>> {
    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("Failed to load catalog {}", config.catalog_path.display()))?;
    Ok(Arc::new(catalog))
}

fn evaluator(config: &BenchConfig) -> Result<ReadinessEvaluator> {
    Ok(ReadinessEvaluator::new(
        load_catalog(config)?,
        ModelStore::new(&config.models_dir),
    ))
}

pub fn list_models(config: &BenchConfig) -> Result<()> {
    let readiness = evaluator(config)?;
    let catalog = readiness.catalog();

    println!("{:<32} {:<22} {:<7} STATUS", "MODEL", "ENGINE", "SOURCE");
    for model in catalog.models() {
        let state = readiness.evaluate(model);
        println!(
            "{:<32} {:<22} {:<7} {}",
            model.id,
            model.engine,
            model.source.kind(),
            state
        );
    }
    println!("\n{} models, models dir {}", catalog.len(), config.models_dir.display());
    Ok(())
}

pub fn model_status(config: &BenchConfig, model_id: &str) -> Result<()> {
    let readiness = evaluator(config)?;
    let model = readiness.catalog().require(model_id)?;
    let state = readiness.evaluate(model);

    println!("{}: {}", model.id, state);
    if !model.dependencies.is_empty() {
        println!("dependencies: {}", model.dependencies.join(", "));
    }
    if let ReadyState::MissingFiles { paths } = &state {
        for path in paths {
            println!("  missing {path}");
        }
    }
    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(PROGRESS_STEPS);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("##-"),
    );
    Ok(bar)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn to_steps(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * PROGRESS_STEPS as f64).round() as u64
}

fn resume_hint(model_id: &str) -> String {
    format!("Partial files were kept; run `ttsbench models pull {model_id}` again to resume.")
}

pub async fn pull_model(config: &BenchConfig, model_id: &str, no_deps: bool) -> Result<()> {
    let catalog = load_catalog(config)?;
    let store = ModelStore::new(&config.models_dir);
    let model = catalog.require(model_id)?.clone();

    let hub = HubClient::new(&config.hub_endpoint, &config.user_agent)?;
    let downloader = ModelDownloader::new(hub, store.clone(), Arc::clone(&catalog));

    let bar = progress_bar()?;
    bar.set_message(model.id.clone());
    let on_progress = |fraction: f64| bar.set_position(to_steps(fraction));
    let outcome = if no_deps {
        downloader.download(&model, on_progress).await
    } else {
        downloader.download_with_dependencies(&model, on_progress).await
    };
    match outcome {
        Ok(()) => bar.finish_with_message(format!("{} downloaded", model.id)),
        Err(e) => {
            bar.abandon_with_message("failed");
            warn!(category = e.category(), "Download of {} failed: {}", model.id, e);
            if e.is_transient() {
                eprintln!("{}", resume_hint(&model.id));
            }
            return Err(e).with_context(|| format!("Download of {} failed", model.id));
        }
    }

    let state = ReadinessEvaluator::new(catalog, store).evaluate(&model);
    println!("{}: {}", model.id, state);
    Ok(())
}

pub async fn bench(config: &BenchConfig, model_id: &str, args: BenchArgs) -> Result<()> {
    let readiness = evaluator(config)?;
    let model = readiness.catalog().require(model_id)?.clone();

    let state = readiness.evaluate(&model);
    if !state.is_ready() {
        bail!(
            "{} is not ready: {}. Run `ttsbench models pull {}` first.",
            model.id,
            state,
            model.id
        );
    }

    let mut host = EngineHost::new().with_engine(Box::new(ToneEngine::new(readiness)));
    if !host.supports(&model) {
        bail!(
            "No engine '{}' for {} (available: {})",
            model.engine,
            model.id,
            host.engine_ids().join(", ")
        );
    }

    let suite = PromptSuite::load(&args.suite)
        .with_context(|| format!("Failed to load prompt suite {}", args.suite.display()))?;

    let mut settings = RunSettings::new(LoadOptions {
        threads: args.threads.unwrap_or(config.threads),
        provider: args.provider.unwrap_or_else(|| config.provider.clone()),
    });
    if let Some(run_id) = args.run_id {
        settings.run_id = run_id;
    }
    settings.run_mode = args.mode;
    settings.warm_iterations = args.iterations;
    settings.speaker_id = args.speaker;
    settings.speed = args.speed;

    let runner = SuiteRunner::new(&config.exports_dir).with_device(config.device_info());
    let written = runner
        .run_suite(&mut host, &model, &suite, &settings, |p| {
            println!("[{}/{}] {} {}", p.prompt_index, p.prompt_total, p.model_id, p.prompt_id);
        })
        .await
        .with_context(|| format!("Benchmark of {} failed", model.id))?;

    info!("Wrote {} result records", written.len());
    println!(
        "Run {} complete: {}",
        settings.run_id,
        config.exports_dir.join(&settings.run_id).display()
    );
    Ok(())
}

pub fn report(config: &BenchConfig, run_id: Option<&str>, output: Option<PathBuf>) -> Result<()> {
    let records = collect_records(&config.exports_dir, run_id)?;
    if records.is_empty() {
        bail!("No result records found under {}", config.exports_dir.display());
    }

    let rows = summarize(&records);
    let out_dir = output.unwrap_or_else(|| config.exports_dir.join("report"));
    let paths = write_report(&rows, &config.exports_dir, &out_dir)?;

    print!("{}", std::fs::read_to_string(&paths.markdown)?);
    println!();
    for path in paths.all() {
        println!("Wrote: {}", path.display());
    }
    Ok(())
}
