//! Prompt suites and the cold/warm benchmark protocol.
//!
//! ```text
//! <exports_root>/<run_id>/<model_id>/<prompt_id>/
//!     audio.wav
//!     result.json
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::Model;
use crate::engine::{EngineHost, LoadOptions, ReleaseGuard, SynthesisRequest};
use crate::error::{BenchError, BenchResult};
use crate::result::{
    AudioInfo, DeviceInfo, InputInfo, Metrics, ModelRef, RecordSettings, ResultRecord, TextStats,
    Timing, AUDIO_FILE_NAME, RESULT_FILE_NAME, RESULT_SCHEMA_VERSION,
};
use crate::store::is_path_segment;
use crate::wav_writer::write_wav;

/// One benchmark input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique within its suite; used as a directory name
    pub id: String,
    /// Text to synthesize
    pub text: String,
}

/// Ordered list of prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSuite {
    /// Suite name, e.g. `en`
    pub id: String,
    /// Prompts in run order
    pub prompts: Vec<Prompt>,
}

impl PromptSuite {
    /// Parse and validate a suite from JSON
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or an invalid suite.
    pub fn from_json_str(json: &str) -> BenchResult<Self> {
        let suite: Self = serde_json::from_str(json)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Read a suite file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchError::file(format!("Failed to read prompt suite {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    /// Check that prompt ids are unique, usable as directory names, and
    /// that every prompt has text
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidInput`] naming the first offending prompt.
    pub fn validate(&self) -> BenchResult<()> {
        let mut seen = HashSet::new();
        for prompt in &self.prompts {
            if !is_path_segment(&prompt.id) {
                return Err(BenchError::invalid_input(format!(
                    "suite '{}': invalid prompt id '{}'",
                    self.id, prompt.id
                )));
            }
            if !seen.insert(prompt.id.as_str()) {
                return Err(BenchError::invalid_input(format!(
                    "suite '{}': duplicate prompt id '{}'",
                    self.id, prompt.id
                )));
            }
            if prompt.text.trim().is_empty() {
                return Err(BenchError::invalid_input(format!(
                    "suite '{}': prompt '{}' has no text",
                    self.id, prompt.id
                )));
            }
        }
        Ok(())
    }

    /// Number of prompts
    #[must_use]
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Whether the suite has no prompts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

/// Timing discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Release and reload before every prompt, synthesize once
    Cold,
    /// Load once, synthesize each prompt several times and keep the median
    #[default]
    Warm,
}

impl RunMode {
    /// Lowercase name as written to result records
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cold" => Ok(Self::Cold),
            "warm" => Ok(Self::Warm),
            other => Err(BenchError::invalid_input(format!(
                "unknown run mode '{other}' (expected cold or warm)"
            ))),
        }
    }
}

/// Parameters of one suite run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Directory name grouping every record of this run
    pub run_id: String,
    /// Timing discipline
    pub run_mode: RunMode,
    /// Synthesis repetitions per prompt in warm mode (at least one is run)
    pub warm_iterations: u32,
    /// Engine load options
    pub load_options: LoadOptions,
    /// Speaker index
    pub speaker_id: u32,
    /// Speaking rate multiplier
    pub speed: f32,
}

impl RunSettings {
    /// Warm run with a fresh time-based run id
    #[must_use]
    pub fn new(load_options: LoadOptions) -> Self {
        Self {
            run_id: new_run_id(),
            run_mode: RunMode::Warm,
            warm_iterations: 3,
            load_options,
            speaker_id: 0,
            speed: 1.0,
        }
    }

    /// Synthesis calls per prompt under this setting
    #[must_use]
    pub fn iterations(&self) -> u32 {
        match self.run_mode {
            RunMode::Cold => 1,
            RunMode::Warm => self.warm_iterations.max(1),
        }
    }
}

/// Sortable run id: UTC timestamp plus a short random suffix
#[must_use]
pub fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Observation emitted before each prompt runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteProgress {
    /// Run id
    pub run_id: String,
    /// Model id
    pub model_id: String,
    /// 1-based position of the prompt
    pub prompt_index: usize,
    /// Prompts in the suite
    pub prompt_total: usize,
    /// Prompt id
    pub prompt_id: String,
}

/// Median synthesis time; the lower of the two middle values for even counts
#[must_use]
pub fn median_ms(times: &[u64]) -> u64 {
    if times.is_empty() {
        return 0;
    }
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    sorted[(sorted.len() - 1) / 2]
}

/// Runs prompt suites and exports one record per prompt
#[derive(Debug, Clone)]
pub struct SuiteRunner {
    exports_root: PathBuf,
    device: DeviceInfo,
}

impl SuiteRunner {
    /// Create a runner exporting under `exports_root`
    pub fn new(exports_root: impl Into<PathBuf>) -> Self {
        Self {
            exports_root: exports_root.into(),
            device: DeviceInfo::detect(),
        }
    }

    /// Override the device description written to records
    #[must_use]
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Root all runs are exported under
    #[must_use]
    pub fn exports_root(&self) -> &Path {
        &self.exports_root
    }

    /// Directory of one prompt's artifacts
    #[must_use]
    pub fn prompt_dir(&self, run_id: &str, model_id: &str, prompt_id: &str) -> PathBuf {
        self.exports_root.join(run_id).join(model_id).join(prompt_id)
    }

    /// Run every prompt of `suite` against `model` and return the written
    /// record paths in suite order.
    ///
    /// Readiness is re-checked once through the model's engine. Whatever
    /// happens, no engine is left loaded in `host` when this returns.
    ///
    /// # Errors
    ///
    /// Fails before any work when the model is not ready or the settings are
    /// invalid; a load, synthesis or export failure aborts the remaining
    /// prompts and keeps the records already written.
    pub async fn run_suite<F>(
        &self,
        host: &mut EngineHost,
        model: &Model,
        suite: &PromptSuite,
        settings: &RunSettings,
        mut on_progress: F,
    ) -> BenchResult<Vec<PathBuf>>
    where
        F: FnMut(&SuiteProgress) + Send,
    {
        let state = host.ensure_ready(model)?;
        if !state.is_ready() {
            return Err(BenchError::not_ready(&model.id, state.to_string()));
        }
        if !is_path_segment(&settings.run_id) {
            return Err(BenchError::invalid_input(format!(
                "invalid run id '{}'",
                settings.run_id
            )));
        }
        if !(settings.speed.is_finite() && settings.speed > 0.0) {
            return Err(BenchError::invalid_input(format!(
                "speed must be positive, got {}",
                settings.speed
            )));
        }
        suite.validate()?;

        info!(
            "Running suite {} ({} prompts) on {} [{} mode, run {}]",
            suite.id,
            suite.len(),
            model.id,
            settings.run_mode,
            settings.run_id
        );

        let mut host = ReleaseGuard::new(host);
        let iterations = settings.iterations();
        let total = suite.len();
        let mut written = Vec::with_capacity(total);

        for (index, prompt) in suite.prompts.iter().enumerate() {
            on_progress(&SuiteProgress {
                run_id: settings.run_id.clone(),
                model_id: model.id.clone(),
                prompt_index: index + 1,
                prompt_total: total,
                prompt_id: prompt.id.clone(),
            });

            let load_ms = match settings.run_mode {
                RunMode::Cold => {
                    host.release();
                    host.load(model, &settings.load_options).await?.load_time_ms
                }
                RunMode::Warm if index == 0 => {
                    host.load(model, &settings.load_options).await?.load_time_ms
                }
                RunMode::Warm => 0,
            };

            let request = SynthesisRequest {
                model_id: model.id.clone(),
                text: prompt.text.clone(),
                speaker_id: settings.speaker_id,
                speed: settings.speed,
            };
            let mut times = Vec::with_capacity(iterations as usize);
            let mut synthesis = host.synthesize(&request).await?;
            times.push(synthesis.synthesis_time_ms);
            for _ in 1..iterations {
                synthesis = host.synthesize(&request).await?;
                times.push(synthesis.synthesis_time_ms);
            }
            let synthesis_ms = median_ms(&times);
            debug!("Prompt {} synthesis times {:?} -> {} ms", prompt.id, times, synthesis_ms);

            let dir = self.prompt_dir(&settings.run_id, &model.id, &prompt.id);
            let wav_path = dir.join(AUDIO_FILE_NAME);
            write_wav(&wav_path, &synthesis.samples, synthesis.sample_rate)?;

            let stats = TextStats::of(&prompt.text);
            let record = ResultRecord {
                schema_version: RESULT_SCHEMA_VERSION,
                run_id: settings.run_id.clone(),
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                device: self.device.clone(),
                model: ModelRef {
                    id: model.id.clone(),
                    name: model.display_name.clone(),
                    engine: model.engine.clone(),
                },
                settings: RecordSettings {
                    threads: settings.load_options.threads,
                    provider: settings.load_options.provider.clone(),
                    speaker_id: settings.speaker_id,
                    speed: settings.speed,
                    run_mode: settings.run_mode.to_string(),
                    warm_iterations: iterations,
                },
                input: InputInfo {
                    prompt_id: prompt.id.clone(),
                    suite_id: suite.id.clone(),
                    text: prompt.text.clone(),
                    words: stats.words,
                    chars: stats.chars,
                },
                timing_ms: Timing {
                    load: load_ms,
                    synthesis: synthesis_ms,
                },
                audio: AudioInfo {
                    sample_rate: synthesis.sample_rate,
                    samples: synthesis.samples.len(),
                    duration_sec: synthesis.audio_duration_sec,
                    wav_path: wav_path.display().to_string(),
                },
                metrics: Metrics::compute(stats.words, synthesis_ms, synthesis.audio_duration_sec),
            };

            let record_path = dir.join(RESULT_FILE_NAME);
            record.save(&record_path)?;
            info!(
                "[{}/{}] {} load={} ms synth={} ms rtf={:.3}",
                index + 1,
                total,
                prompt.id,
                load_ms,
                synthesis_ms,
                record.metrics.rtf
            );
            written.push(record_path);
        }

        Ok(written)
    }
}
