//! Synthetic reference backend.
//!
//! Produces a decaying tone per word so the whole pipeline (readiness gate,
//! load, synthesis, export, report) can run without a native runtime. Files
//! are checked through the readiness evaluator like any other backend.

use std::f32::consts::TAU;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{LoadInfo, LoadOptions, Synthesis, SynthesisRequest, TtsEngine};
use crate::catalog::Model;
use crate::error::{BenchError, BenchResult};
use crate::readiness::{ReadinessEvaluator, ReadyState};

/// Engine id of [`ToneEngine`]
pub const TONE_ENGINE_ID: &str = "tone";

const SAMPLE_RATE: u32 = 16_000;
const NUM_SPEAKERS: u32 = 4;
const SECONDS_PER_WORD: f32 = 0.3;
const BASE_FREQUENCY: f32 = 220.0;

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros().div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Deterministic tone generator registered as engine `tone`
#[derive(Debug)]
pub struct ToneEngine {
    readiness: ReadinessEvaluator,
    loaded: Option<String>,
}

impl ToneEngine {
    /// Create an engine that gates loads on `readiness`
    #[must_use]
    pub const fn new(readiness: ReadinessEvaluator) -> Self {
        Self {
            readiness,
            loaded: None,
        }
    }

    fn render(words: usize, speaker_id: u32, speed: f32) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let word_len = (SECONDS_PER_WORD / speed * SAMPLE_RATE as f32) as usize;
        let frequency = BASE_FREQUENCY * (1.0 + 0.25 * (speaker_id % NUM_SPEAKERS) as f32);

        let mut samples = Vec::with_capacity(words.max(1) * word_len);
        for _ in 0..words.max(1) {
            for i in 0..word_len {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / SAMPLE_RATE as f32;
                let envelope = (-6.0 * t * speed).exp();
                samples.push(0.5 * envelope * (TAU * frequency * t).sin());
            }
        }
        samples
    }
}

#[async_trait]
impl TtsEngine for ToneEngine {
    fn engine_id(&self) -> &str {
        TONE_ENGINE_ID
    }

    fn ensure_ready(&self, model: &Model) -> ReadyState {
        self.readiness.evaluate(model)
    }

    async fn load(&mut self, model: &Model, options: &LoadOptions) -> BenchResult<LoadInfo> {
        let start = Instant::now();
        self.release();

        let state = self.readiness.evaluate(model);
        if !state.is_ready() {
            return Err(BenchError::not_ready(&model.id, state.to_string()));
        }

        let mut bytes = 0u64;
        for file in &model.files {
            let path = self.readiness.store().file_path(&model.id, file);
            bytes += tokio::fs::metadata(&path).await?.len();
        }
        debug!(
            "Tone engine opened {} files ({} bytes) for {} with {} threads",
            model.files.len(),
            bytes,
            model.id,
            options.threads
        );

        self.loaded = Some(model.id.clone());
        Ok(LoadInfo {
            sample_rate: SAMPLE_RATE,
            num_speakers: NUM_SPEAKERS,
            load_time_ms: elapsed_ms(start),
        })
    }

    async fn synthesize(&mut self, request: &SynthesisRequest) -> BenchResult<Synthesis> {
        if self.loaded.as_deref() != Some(request.model_id.as_str()) {
            return Err(BenchError::engine(format!(
                "tone engine has not loaded '{}'",
                request.model_id
            )));
        }
        if !(request.speed.is_finite() && request.speed > 0.0) {
            return Err(BenchError::invalid_input(format!(
                "speed must be positive, got {}",
                request.speed
            )));
        }
        if request.text.trim().is_empty() {
            return Err(BenchError::invalid_input("text must not be empty"));
        }

        let start = Instant::now();
        let words = request.text.split_whitespace().count();
        let samples = Self::render(words, request.speaker_id, request.speed);
        #[allow(clippy::cast_precision_loss)]
        let audio_duration_sec = samples.len() as f64 / f64::from(SAMPLE_RATE);

        Ok(Synthesis {
            samples,
            sample_rate: SAMPLE_RATE,
            synthesis_time_ms: elapsed_ms(start),
            audio_duration_sec,
        })
    }

    fn release(&mut self) {
        if let Some(id) = self.loaded.take() {
            debug!("Tone engine released {}", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{Catalog, ModelSource};
    use crate::store::ModelStore;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (ToneEngine, Model) {
        let model = Model::new("tone-en", TONE_ENGINE_ID, ModelSource::LocalBundle { name: "tone".into() })
            .with_files(["voice.txt"]);
        let catalog = Arc::new(Catalog::from_models(vec![model.clone()]).unwrap());
        let store = ModelStore::new(dir.path());
        (ToneEngine::new(ReadinessEvaluator::new(catalog, store)), model)
    }

    #[tokio::test]
    async fn test_load_refuses_missing_files() {
        let dir = TempDir::new().unwrap();
        let (mut engine, model) = setup(&dir);

        assert!(!engine.ensure_ready(&model).is_ready());
        let err = engine.load(&model, &LoadOptions::default()).await.unwrap_err();
        assert!(matches!(err, BenchError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_tone_length_scales_with_words_and_speed() {
        let dir = TempDir::new().unwrap();
        let (mut engine, model) = setup(&dir);
        std::fs::create_dir_all(dir.path().join("tone-en")).unwrap();
        std::fs::write(dir.path().join("tone-en/voice.txt"), "x").unwrap();

        let info = engine.load(&model, &LoadOptions::default()).await.unwrap();
        assert_eq!(info.sample_rate, SAMPLE_RATE);

        let mut request = SynthesisRequest {
            model_id: "tone-en".into(),
            text: "one two".into(),
            speaker_id: 1,
            speed: 1.0,
        };
        let normal = engine.synthesize(&request).await.unwrap();
        assert!((normal.audio_duration_sec - 0.6).abs() < 1e-3);
        assert!(normal.samples.iter().all(|s| (-1.0..=1.0).contains(s)));

        request.speed = 2.0;
        let fast = engine.synthesize(&request).await.unwrap();
        assert!((fast.audio_duration_sec - 0.3).abs() < 1e-3);

        engine.release();
        engine.release();
        assert!(engine.synthesize(&request).await.is_err());
    }
}
