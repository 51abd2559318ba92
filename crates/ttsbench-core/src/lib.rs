//! # ttsbench core
//!
//! Model lifecycle and benchmark orchestration for offline text-to-speech
//! backends.
//!
//! ## Features
//!
//! - Readiness checks across a model's dependency closure
//! - Required-file resolution against a model hub with a cached manifest
//! - Sequential, resumable, byte-verified downloads with monotonic progress
//! - Cold and warm timing runs over a prompt suite with per-prompt records
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ttsbench_core::{
//!     BenchConfig, Catalog, EngineHost, HubClient, ModelDownloader, ModelStore, PromptSuite,
//!     ReadinessEvaluator, RunSettings, SuiteRunner, ToneEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BenchConfig::load(None)?;
//!     let catalog = Arc::new(Catalog::load(&config.catalog_path)?);
//!     let store = ModelStore::new(&config.models_dir);
//!     let model = catalog.require("tone-en")?.clone();
//!
//!     let hub = HubClient::new(&config.hub_endpoint, &config.user_agent)?;
//!     let downloader = ModelDownloader::new(hub, store.clone(), Arc::clone(&catalog));
//!     downloader.download_with_dependencies(&model, |p| eprintln!("{:.0}%", p * 100.0)).await?;
//!
//!     let readiness = ReadinessEvaluator::new(Arc::clone(&catalog), store);
//!     let mut host = EngineHost::new().with_engine(Box::new(ToneEngine::new(readiness)));
//!     let suite = PromptSuite::load("prompts/en.json".as_ref())?;
//!     let settings = RunSettings::new(config.load_options());
//!     SuiteRunner::new(&config.exports_dir)
//!         .run_suite(&mut host, &model, &suite, &settings, |p| println!("{}/{}", p.prompt_index, p.prompt_total))
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod hub;
pub mod manifest;
pub mod readiness;
pub mod report;
pub mod result;
pub mod store;
pub mod suite;
pub mod wav_writer;

// Re-export main types for convenience
pub use catalog::{Catalog, Model, ModelMeta, ModelSource};
pub use config::BenchConfig;
pub use download::ModelDownloader;
pub use engine::{
    EngineHost, LoadInfo, LoadOptions, ReleaseGuard, Synthesis, SynthesisRequest, ToneEngine,
    TtsEngine,
};
pub use error::{BenchError, BenchResult};
pub use hub::{HubClient, RepoListing};
pub use manifest::ManifestResolver;
pub use readiness::{ReadinessEvaluator, ReadyState};
pub use report::{
    collect_records, render_bar_chart, summarize, write_report, ReportPaths, SummaryRow,
};
pub use result::{DeviceInfo, Metrics, ResultRecord, TextStats};
pub use store::{Manifest, ManifestState, ModelStore};
pub use suite::{Prompt, PromptSuite, RunMode, RunSettings, SuiteProgress, SuiteRunner};

/// Version information for the ttsbench-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
