//! Per-prompt benchmark result records.
//!
//! One JSON document per `(run_id, model_id, prompt_id)`, written next to the
//! exported audio and never modified afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::BenchResult;

/// Version of the result record layout
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// File name of a result record inside its prompt directory
pub const RESULT_FILE_NAME: &str = "result.json";

/// File name of the exported audio inside its prompt directory
pub const AUDIO_FILE_NAME: &str = "audio.wav";

/// Word and character counts of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStats {
    /// Whitespace-separated tokens
    pub words: usize,
    /// Unicode scalar values after NFC normalization
    pub chars: usize,
}

impl TextStats {
    /// Count words and characters of `text`
    #[must_use]
    pub fn of(text: &str) -> Self {
        Self {
            words: text.split_whitespace().count(),
            chars: text.nfc().count(),
        }
    }
}

/// Host the benchmark ran on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Hardware model, or CPU architecture when unknown
    pub model: String,
    /// Vendor, or OS family when unknown
    pub manufacturer: String,
    /// Operating system
    pub sdk: String,
}

impl DeviceInfo {
    /// Describe the current host
    #[must_use]
    pub fn detect() -> Self {
        Self {
            model: std::env::consts::ARCH.to_string(),
            manufacturer: std::env::consts::FAMILY.to_string(),
            sdk: std::env::consts::OS.to_string(),
        }
    }
}

/// Model identity as recorded in a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Catalog id
    pub id: String,
    /// Display name
    pub name: String,
    /// Engine id
    pub engine: String,
}

/// Run settings a record was produced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSettings {
    /// Inference threads
    pub threads: u32,
    /// Execution provider
    pub provider: String,
    /// Speaker index
    pub speaker_id: u32,
    /// Speaking rate multiplier
    pub speed: f32,
    /// `cold` or `warm`
    pub run_mode: String,
    /// Synthesis repetitions per prompt in warm mode
    pub warm_iterations: u32,
}

/// Prompt the record was produced for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    /// Prompt id within its suite
    pub prompt_id: String,
    /// Suite the prompt came from
    #[serde(default)]
    pub suite_id: String,
    /// Prompt text
    pub text: String,
    /// Word count
    pub words: usize,
    /// Character count
    pub chars: usize,
}

/// Wall-clock timings in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Model load time attributed to this prompt
    pub load: u64,
    /// Synthesis time (median in warm mode)
    pub synthesis: u64,
}

/// Exported audio facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of mono samples
    pub samples: usize,
    /// Duration in seconds
    pub duration_sec: f64,
    /// Path of the exported WAV
    pub wav_path: String,
}

/// Throughput and real-time metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Words per second of synthesis time; tokens are words
    pub tokens_per_second: f64,
    /// Words per second of synthesis time
    pub words_per_second: f64,
    /// Real-time factor: synthesis seconds per second of audio
    pub rtf: f64,
    /// `1 / rtf`
    pub speed_score: f64,
}

impl Metrics {
    /// Derive metrics; rates are zero when their denominator is zero
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(words: usize, synthesis_ms: u64, duration_sec: f64) -> Self {
        let synthesis_sec = synthesis_ms as f64 / 1000.0;
        let per_second = if synthesis_sec > 0.0 {
            words as f64 / synthesis_sec
        } else {
            0.0
        };
        let rtf = if duration_sec > 0.0 {
            synthesis_sec / duration_sec
        } else {
            0.0
        };
        let speed_score = if rtf > 0.0 { 1.0 / rtf } else { 0.0 };

        Self {
            tokens_per_second: per_second,
            words_per_second: per_second,
            rtf,
            speed_score,
        }
    }
}

/// One persisted benchmark measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Always [`RESULT_SCHEMA_VERSION`]
    pub schema_version: u32,
    /// Run the record belongs to
    #[serde(default)]
    pub run_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Host description
    pub device: DeviceInfo,
    /// Model identity
    pub model: ModelRef,
    /// Settings
    pub settings: RecordSettings,
    /// Prompt
    pub input: InputInfo,
    /// Timings
    pub timing_ms: Timing,
    /// Audio
    pub audio: AudioInfo,
    /// Derived metrics
    pub metrics: Metrics,
}

impl ResultRecord {
    /// Read a record from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid record.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the record as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> BenchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtf_and_speed_score() {
        let m = Metrics::compute(5, 500, 0.5);
        assert!((m.rtf - 1.0).abs() < 1e-9);
        assert!((m.speed_score - 1.0).abs() < 1e-9);
        assert!((m.tokens_per_second - 10.0).abs() < 1e-9);
        assert_eq!(m.tokens_per_second, m.words_per_second);
    }

    #[test]
    fn test_zero_duration_zeroes_rtf() {
        let m = Metrics::compute(5, 500, 0.0);
        assert_eq!(m.rtf, 0.0);
        assert_eq!(m.speed_score, 0.0);

        let m = Metrics::compute(5, 0, 1.0);
        assert_eq!(m.tokens_per_second, 0.0);
        assert_eq!(m.rtf, 0.0);
    }

    #[test]
    fn test_text_stats() {
        let stats = TextStats::of("  Hello,\tworld!\nagain ");
        assert_eq!(stats.words, 3);

        // "e" + combining acute composes to a single scalar under NFC
        assert_eq!(TextStats::of("caf\u{0065}\u{0301}").chars, 4);
        assert_eq!(TextStats::of("").words, 0);
    }

    #[test]
    fn test_record_json_layout() {
        let record = ResultRecord {
            schema_version: RESULT_SCHEMA_VERSION,
            run_id: "r1".into(),
            timestamp_ms: 1_700_000_000_000,
            device: DeviceInfo::detect(),
            model: ModelRef {
                id: "tone".into(),
                name: "Tone".into(),
                engine: "tone".into(),
            },
            settings: RecordSettings {
                threads: 2,
                provider: "cpu".into(),
                speaker_id: 0,
                speed: 1.0,
                run_mode: "warm".into(),
                warm_iterations: 3,
            },
            input: InputInfo {
                prompt_id: "p1".into(),
                suite_id: "en".into(),
                text: "hi there".into(),
                words: 2,
                chars: 8,
            },
            timing_ms: Timing { load: 12, synthesis: 500 },
            audio: AudioInfo {
                sample_rate: 16000,
                samples: 8000,
                duration_sec: 0.5,
                wav_path: "/x/audio.wav".into(),
            },
            metrics: Metrics::compute(2, 500, 0.5),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["timing_ms"]["synthesis"], 500);
        assert_eq!(value["metrics"]["rtf"], 1.0);
        assert_eq!(value["settings"]["run_mode"], "warm");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("r1/tone/p1").join(RESULT_FILE_NAME);
        record.save(&path).unwrap();
        assert_eq!(ResultRecord::load(&path).unwrap(), record);
    }
}
