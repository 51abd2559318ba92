// Catalog entry types for benchmarkable TTS models

use serde::{Deserialize, Serialize};

/// Revision used when a catalog entry does not pin one.
pub const DEFAULT_REVISION: &str = "main";

fn default_revision() -> String {
    DEFAULT_REVISION.to_string()
}

/// Where a model's files come from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ModelSource {
    /// Files live in a Hugging Face repository and are downloaded on demand
    #[serde(rename = "hf")]
    HuggingFace {
        /// Repository id, e.g. `csukuangfj/kokoro-en-v0_19`
        repo: String,
        /// Branch, tag or commit
        #[serde(rename = "rev", default = "default_revision")]
        revision: String,
    },
    /// Files are pushed onto the device out of band
    #[serde(rename = "local")]
    LocalBundle {
        /// Bundle name as shipped by the pusher
        name: String,
    },
    /// Provided by the platform, nothing to fetch
    #[serde(rename = "system")]
    System,
}

impl ModelSource {
    /// Short label used in logs and listings
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::HuggingFace { .. } => "hf",
            Self::LocalBundle { .. } => "local",
            Self::System => "system",
        }
    }
}

/// Descriptive metadata carried by catalog entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Language tag or free-form language list
    #[serde(default)]
    pub languages: String,
    /// One-line description
    #[serde(default)]
    pub description: String,
    /// Rough download size in megabytes, 0 when unknown
    #[serde(default)]
    pub size_hint_mb: u64,
}

/// Immutable description of a model, loaded once from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Unique catalog key, also the on-disk directory name
    pub id: String,
    /// Human-readable model name
    pub display_name: String,
    /// Id of the inference engine that runs this model
    pub engine: String,
    /// Architecture family (vits, kokoro, matcha, vocoder, asset, ...)
    pub model_type: String,
    /// Where the files come from
    pub source: ModelSource,
    /// Explicit relative paths, always required
    #[serde(default)]
    pub files: Vec<String>,
    /// Path prefixes whose remote expansion is also required
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Ids of models that must be present before this one is usable
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Descriptive metadata
    #[serde(default)]
    pub meta: ModelMeta,
}

impl Model {
    /// Create a model with no files, prefixes or dependencies
    pub fn new(
        id: impl Into<String>,
        engine: impl Into<String>,
        source: ModelSource,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            engine: engine.into(),
            model_type: String::new(),
            source,
            files: Vec::new(),
            prefixes: Vec::new(),
            dependencies: Vec::new(),
            meta: ModelMeta::default(),
        }
    }

    /// Set the explicit file list
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Set the prefix list
    #[must_use]
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the dependency ids
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Repository and revision for hub-sourced models
    #[must_use]
    pub fn hub_repo(&self) -> Option<(&str, &str)> {
        match &self.source {
            ModelSource::HuggingFace { repo, revision } => Some((repo, revision)),
            _ => None,
        }
    }

    /// Whether files for this model are fetched from the hub
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self.source, ModelSource::HuggingFace { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_deserializes_from_catalog_shape() {
        let hf: ModelSource =
            serde_json::from_str(r#"{"kind":"hf","repo":"csukuangfj/vits-ljs","rev":"v1"}"#).unwrap();
        assert_eq!(
            hf,
            ModelSource::HuggingFace {
                repo: "csukuangfj/vits-ljs".into(),
                revision: "v1".into()
            }
        );

        let hf_default: ModelSource =
            serde_json::from_str(r#"{"kind":"hf","repo":"a/b"}"#).unwrap();
        assert_eq!(hf_default.kind(), "hf");
        assert!(matches!(hf_default, ModelSource::HuggingFace { ref revision, .. } if revision == "main"));

        let local: ModelSource = serde_json::from_str(r#"{"kind":"local","name":"nemo"}"#).unwrap();
        assert_eq!(local, ModelSource::LocalBundle { name: "nemo".into() });

        let system: ModelSource = serde_json::from_str(r#"{"kind":"system"}"#).unwrap();
        assert_eq!(system, ModelSource::System);
    }

    #[test]
    fn test_model_defaults_optional_lists() {
        let model: Model = serde_json::from_str(
            r#"{
                "id": "kitten-nano",
                "display_name": "Kitten (nano)",
                "engine": "sherpa_offline_tts",
                "model_type": "kitten",
                "source": {"kind": "hf", "repo": "csukuangfj/kitten-nano-en-v0_1-fp16"},
                "files": ["model.fp16.onnx", "tokens.txt", "voices.bin"]
            }"#,
        )
        .unwrap();
        assert!(model.prefixes.is_empty());
        assert!(model.dependencies.is_empty());
        assert_eq!(model.meta, ModelMeta::default());
        assert_eq!(model.hub_repo(), Some(("csukuangfj/kitten-nano-en-v0_1-fp16", "main")));
        assert!(model.is_remote());
    }
}
