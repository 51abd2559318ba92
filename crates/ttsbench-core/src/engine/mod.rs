//! Inference engine contract and the single-engine host.
//!
//! Backends implement [`TtsEngine`] and are registered with an [`EngineHost`]
//! under their engine id. The host keeps at most one engine loaded at a time
//! and releases it before anything else is loaded.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::catalog::Model;
use crate::error::{BenchError, BenchResult};
use crate::readiness::ReadyState;

pub mod tone;

pub use tone::ToneEngine;

/// Execution provider used when none is configured
pub const DEFAULT_PROVIDER: &str = "cpu";

/// Options a model is loaded with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Inference threads
    pub threads: u32,
    /// Execution provider, e.g. `cpu`
    pub provider: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            provider: DEFAULT_PROVIDER.to_string(),
        }
    }
}

/// What a successful load reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadInfo {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Number of selectable speakers
    pub num_speakers: u32,
    /// Wall-clock load time
    pub load_time_ms: u64,
}

/// One synthesis call against the loaded model
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Model that must currently be loaded
    pub model_id: String,
    /// Text to speak
    pub text: String,
    /// Speaker index
    pub speaker_id: u32,
    /// Speaking rate multiplier
    pub speed: f32,
}

/// Audio produced by one synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Mono samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Wall-clock synthesis time
    pub synthesis_time_ms: u64,
    /// `samples.len() / sample_rate`
    pub audio_duration_sec: f64,
}

/// An offline TTS backend
#[async_trait]
pub trait TtsEngine: Send + Sync + std::fmt::Debug {
    /// Engine id models refer to in the catalog
    fn engine_id(&self) -> &str;

    /// Whether `model` can be loaded right now
    fn ensure_ready(&self, model: &Model) -> ReadyState;

    /// Load `model`, replacing whatever this engine had loaded
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not ready or the backend fails to load it.
    async fn load(&mut self, model: &Model, options: &LoadOptions) -> BenchResult<LoadInfo>;

    /// Synthesize with the loaded model
    ///
    /// # Errors
    ///
    /// Returns an error if nothing (or another model) is loaded, or synthesis fails.
    async fn synthesize(&mut self, request: &SynthesisRequest) -> BenchResult<Synthesis>;

    /// Free loaded state; calling it with nothing loaded is a no-op
    fn release(&mut self);
}

#[derive(Debug, Clone)]
struct ActiveEngine {
    engine_id: String,
    model_id: String,
    options: LoadOptions,
    info: LoadInfo,
}

/// Registry of backends that allows exactly one loaded engine at a time
#[derive(Debug, Default)]
pub struct EngineHost {
    engines: HashMap<String, Box<dyn TtsEngine>>,
    active: Option<ActiveEngine>,
}

impl EngineHost {
    /// Create an empty host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its engine id, replacing any previous one
    pub fn register(&mut self, engine: Box<dyn TtsEngine>) {
        let id = engine.engine_id().to_string();
        if self.active.as_ref().is_some_and(|a| a.engine_id == id) {
            self.release();
        }
        debug!("Registered engine {}", id);
        self.engines.insert(id, engine);
    }

    /// Builder form of [`Self::register`]
    #[must_use]
    pub fn with_engine(mut self, engine: Box<dyn TtsEngine>) -> Self {
        self.register(engine);
        self
    }

    /// Registered engine ids, sorted
    #[must_use]
    pub fn engine_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Whether a backend exists for `model`
    #[must_use]
    pub fn supports(&self, model: &Model) -> bool {
        self.engines.contains_key(&model.engine)
    }

    fn engine_mut(&mut self, engine_id: &str) -> BenchResult<&mut Box<dyn TtsEngine>> {
        self.engines
            .get_mut(engine_id)
            .ok_or_else(|| BenchError::engine(format!("no engine registered for '{engine_id}'")))
    }

    /// Ask the model's backend whether it is ready
    ///
    /// # Errors
    ///
    /// Returns an error when no backend is registered for the model's engine.
    pub fn ensure_ready(&self, model: &Model) -> BenchResult<ReadyState> {
        self.engines
            .get(&model.engine)
            .map(|engine| engine.ensure_ready(model))
            .ok_or_else(|| BenchError::engine(format!("no engine registered for '{}'", model.engine)))
    }

    /// Id of the loaded model, if any
    #[must_use]
    pub fn loaded_model(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.model_id.as_str())
    }

    /// Whether anything is loaded
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    /// Load `model` with `options`.
    ///
    /// The same model with the same options on the same backend is reused and
    /// reports a zero load time. Anything else releases the active engine first.
    ///
    /// # Errors
    ///
    /// Returns an error when no backend matches or the backend fails to load.
    pub async fn load(&mut self, model: &Model, options: &LoadOptions) -> BenchResult<LoadInfo> {
        if let Some(active) = &self.active {
            if active.engine_id == model.engine && active.model_id == model.id && active.options == *options {
                debug!("Model {} already loaded", model.id);
                return Ok(LoadInfo {
                    load_time_ms: 0,
                    ..active.info
                });
            }
        }
        self.release();

        let engine = self.engine_mut(&model.engine)?;
        let info = engine.load(model, options).await?;
        info!(
            "Loaded {} on {} in {} ms ({} Hz, {} speakers, {} threads, {})",
            model.id,
            model.engine,
            info.load_time_ms,
            info.sample_rate,
            info.num_speakers,
            options.threads,
            options.provider
        );
        self.active = Some(ActiveEngine {
            engine_id: model.engine.clone(),
            model_id: model.id.clone(),
            options: options.clone(),
            info,
        });
        Ok(info)
    }

    /// Synthesize with the loaded engine
    ///
    /// # Errors
    ///
    /// Returns an error when nothing is loaded, the request targets another
    /// model, or the backend fails.
    pub async fn synthesize(&mut self, request: &SynthesisRequest) -> BenchResult<Synthesis> {
        let Some(active) = &self.active else {
            return Err(BenchError::engine("no model loaded"));
        };
        if active.model_id != request.model_id {
            return Err(BenchError::engine(format!(
                "model '{}' requested but '{}' is loaded",
                request.model_id, active.model_id
            )));
        }
        let engine_id = active.engine_id.clone();
        self.engine_mut(&engine_id)?.synthesize(request).await
    }

    /// Release the loaded engine; returns whether anything was loaded
    pub fn release(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        if let Some(engine) = self.engines.get_mut(&active.engine_id) {
            engine.release();
        }
        info!("Released {} ({})", active.model_id, active.engine_id);
        true
    }
}

/// Borrow of an [`EngineHost`] that releases its engine when dropped
#[derive(Debug)]
pub struct ReleaseGuard<'a> {
    host: &'a mut EngineHost,
}

impl<'a> ReleaseGuard<'a> {
    /// Guard `host` until the end of the current scope
    pub fn new(host: &'a mut EngineHost) -> Self {
        Self { host }
    }
}

impl Deref for ReleaseGuard<'_> {
    type Target = EngineHost;

    fn deref(&self) -> &EngineHost {
        self.host
    }
}

impl DerefMut for ReleaseGuard<'_> {
    fn deref_mut(&mut self) -> &mut EngineHost {
        self.host
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.host.release();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend shared by engine and suite tests.

    use std::sync::{Arc, Mutex};

    use super::*;

    /// Counters observed from outside the host
    #[derive(Debug, Default)]
    pub struct Calls {
        pub loads: usize,
        pub releases: usize,
        pub synths: usize,
    }

    #[derive(Debug)]
    pub struct ScriptedEngine {
        pub id: String,
        pub calls: Arc<Mutex<Calls>>,
        /// Synthesis times returned in order, cycling
        pub synth_times: Vec<u64>,
        pub fail_synth_at: Option<usize>,
        loaded: Option<String>,
    }

    impl ScriptedEngine {
        pub fn new(id: &str, synth_times: Vec<u64>) -> (Self, Arc<Mutex<Calls>>) {
            let calls = Arc::new(Mutex::new(Calls::default()));
            (
                Self {
                    id: id.to_string(),
                    calls: Arc::clone(&calls),
                    synth_times,
                    fail_synth_at: None,
                    loaded: None,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl TtsEngine for ScriptedEngine {
        fn engine_id(&self) -> &str {
            &self.id
        }

        fn ensure_ready(&self, _model: &Model) -> ReadyState {
            ReadyState::Ready
        }

        async fn load(&mut self, model: &Model, _options: &LoadOptions) -> BenchResult<LoadInfo> {
            self.calls.lock().unwrap().loads += 1;
            self.loaded = Some(model.id.clone());
            Ok(LoadInfo {
                sample_rate: 8000,
                num_speakers: 1,
                load_time_ms: 25,
            })
        }

        async fn synthesize(&mut self, request: &SynthesisRequest) -> BenchResult<Synthesis> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.synths;
            calls.synths += 1;
            if self.fail_synth_at == Some(n) {
                return Err(BenchError::engine("scripted failure"));
            }
            if self.loaded.as_deref() != Some(request.model_id.as_str()) {
                return Err(BenchError::engine("not loaded"));
            }
            let ms = self.synth_times[n % self.synth_times.len()];
            // Sample count tags the call so tests can tell iterations apart.
            Ok(Synthesis {
                samples: vec![0.1; 800 + n],
                sample_rate: 8000,
                synthesis_time_ms: ms,
                audio_duration_sec: (800 + n) as f64 / 8000.0,
            })
        }

        fn release(&mut self) {
            if self.loaded.take().is_some() {
                self.calls.lock().unwrap().releases += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedEngine;
    use super::*;
    use crate::catalog::ModelSource;

    fn model(id: &str, engine: &str) -> Model {
        Model::new(id, engine, ModelSource::System)
    }

    #[tokio::test]
    async fn test_one_engine_loaded_at_a_time() {
        let (a, a_calls) = ScriptedEngine::new("a", vec![10]);
        let (b, b_calls) = ScriptedEngine::new("b", vec![10]);
        let mut host = EngineHost::new().with_engine(Box::new(a)).with_engine(Box::new(b));
        assert_eq!(host.engine_ids(), vec!["a", "b"]);

        let opts = LoadOptions::default();
        host.load(&model("m1", "a"), &opts).await.unwrap();
        host.load(&model("m2", "b"), &opts).await.unwrap();

        assert_eq!(host.loaded_model(), Some("m2"));
        assert_eq!(a_calls.lock().unwrap().releases, 1);
        assert_eq!(b_calls.lock().unwrap().releases, 0);
    }

    #[tokio::test]
    async fn test_same_model_and_options_is_reused() {
        let (a, calls) = ScriptedEngine::new("a", vec![10]);
        let mut host = EngineHost::new().with_engine(Box::new(a));
        let m = model("m1", "a");

        let first = host.load(&m, &LoadOptions::default()).await.unwrap();
        let second = host.load(&m, &LoadOptions::default()).await.unwrap();
        assert_eq!(first.load_time_ms, 25);
        assert_eq!(second.load_time_ms, 0);
        assert_eq!(calls.lock().unwrap().loads, 1);

        let threads = LoadOptions {
            threads: 4,
            ..LoadOptions::default()
        };
        host.load(&m, &threads).await.unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.loads, 2);
        assert_eq!(calls.releases, 1);
    }

    #[tokio::test]
    async fn test_synthesize_requires_loaded_model() {
        let (a, _) = ScriptedEngine::new("a", vec![10]);
        let mut host = EngineHost::new().with_engine(Box::new(a));
        let request = SynthesisRequest {
            model_id: "m1".into(),
            text: "hi".into(),
            speaker_id: 0,
            speed: 1.0,
        };
        assert!(host.synthesize(&request).await.is_err());

        host.load(&model("m1", "a"), &LoadOptions::default()).await.unwrap();
        assert!(host.synthesize(&request).await.is_ok());

        let other = SynthesisRequest {
            model_id: "m2".into(),
            ..request
        };
        assert!(host.synthesize(&other).await.is_err());
    }

    #[tokio::test]
    async fn test_release_guard_and_idempotent_release() {
        let (a, calls) = ScriptedEngine::new("a", vec![10]);
        let mut host = EngineHost::new().with_engine(Box::new(a));
        {
            let mut guard = ReleaseGuard::new(&mut host);
            guard.load(&model("m1", "a"), &LoadOptions::default()).await.unwrap();
            assert!(guard.is_loaded());
        }
        assert!(!host.is_loaded());
        assert!(!host.release());
        assert_eq!(calls.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_unknown_engine() {
        let host = EngineHost::new();
        let err = host.ensure_ready(&model("m1", "missing")).unwrap_err();
        assert!(matches!(err, BenchError::EngineError { .. }));
    }
}
