//! Readiness evaluation: is a model, with all of its dependencies, usable
//! from local storage right now?

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::catalog::{Catalog, Model, ModelSource};
use crate::store::{ManifestState, ModelStore};

/// Reason reported for a remote model that has never been downloaded
pub const REASON_NOT_DOWNLOADED: &str = "not downloaded";

/// Reason reported when a manifest exists but cannot be parsed
pub const REASON_MANIFEST_UNREADABLE: &str = "manifest unreadable; re-download";

/// Outcome of a readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadyState {
    /// Every required file is present
    Ready,
    /// Some files are absent; paths are `<model_id>/<relative>`, sorted, unique
    MissingFiles {
        /// Fully qualified missing paths
        paths: Vec<String>,
    },
    /// Nothing usable yet; a download has to happen first
    NeedsDownload {
        /// Human-readable cause
        reason: String,
    },
}

impl ReadyState {
    /// Build a `MissingFiles` state (or `Ready` when `paths` is empty),
    /// normalizing order and duplicates
    pub fn missing<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Self::Ready
        } else {
            Self::MissingFiles {
                paths: set.into_iter().collect(),
            }
        }
    }

    /// Build a `NeedsDownload` state
    pub fn needs_download(reason: impl Into<String>) -> Self {
        Self::NeedsDownload {
            reason: reason.into(),
        }
    }

    /// Whether the model can be used as is
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::MissingFiles { paths } => match paths.as_slice() {
                [only] => write!(f, "missing file {only}"),
                [first, rest @ ..] => {
                    write!(f, "missing {} files ({first} and {} more)", paths.len(), rest.len())
                }
                [] => write!(f, "ready"),
            },
            Self::NeedsDownload { reason } => write!(f, "needs download: {reason}"),
        }
    }
}

/// Walks a model's dependency closure and reports whether it is usable
#[derive(Debug, Clone)]
pub struct ReadinessEvaluator {
    catalog: Arc<Catalog>,
    store: ModelStore,
}

impl ReadinessEvaluator {
    /// Create an evaluator over `catalog` and the files under `store`
    pub fn new(catalog: Arc<Catalog>, store: ModelStore) -> Self {
        Self { catalog, store }
    }

    /// The catalog dependencies are resolved against
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The model store files are looked up in
    #[must_use]
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Readiness of `model` including its dependencies.
    ///
    /// The first member (dependencies first, then the model) that needs a
    /// download wins outright; otherwise missing files from every member are
    /// merged.
    #[must_use]
    pub fn evaluate(&self, model: &Model) -> ReadyState {
        let mut missing: BTreeSet<String> = BTreeSet::new();

        for member in self.catalog.dependency_closure(model) {
            match self.evaluate_local(member) {
                ReadyState::Ready => {}
                ReadyState::MissingFiles { paths } => missing.extend(paths),
                ReadyState::NeedsDownload { reason } => {
                    if member.id == model.id {
                        return ReadyState::NeedsDownload { reason };
                    }
                    return ReadyState::needs_download(format!(
                        "dependency '{}': {reason}",
                        member.id
                    ));
                }
            }
        }

        ReadyState::missing(missing)
    }

    /// Readiness of `model` alone, ignoring its dependencies
    #[must_use]
    pub fn evaluate_local(&self, model: &Model) -> ReadyState {
        let state = match &model.source {
            ModelSource::System => ReadyState::Ready,
            ModelSource::LocalBundle { .. } => self.missing_among(model, &model.files),
            ModelSource::HuggingFace { .. } => match self.store.read_manifest(&model.id) {
                ManifestState::Absent => ReadyState::needs_download(REASON_NOT_DOWNLOADED),
                ManifestState::Unreadable(_) => {
                    ReadyState::needs_download(REASON_MANIFEST_UNREADABLE)
                }
                ManifestState::Present(manifest) => {
                    self.missing_among(model, &manifest.union_with(&model.files))
                }
            },
        };
        debug!("Local readiness of {} ({}): {}", model.id, model.source.kind(), state);
        state
    }

    fn missing_among(&self, model: &Model, required: &[String]) -> ReadyState {
        ReadyState::missing(
            required
                .iter()
                .filter(|rel| !self.store.file_exists(&model.id, rel))
                .map(|rel| format!("{}/{rel}", model.id)),
        )
    }
}
