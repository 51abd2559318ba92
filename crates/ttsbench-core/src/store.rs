//! On-disk layout of downloaded models.
//!
//! ```text
//! <models_root>/
//!   <model_id>/
//!     .ttsbench-manifest.json     {"files": [...]}
//!     model.onnx
//!     espeak-ng-data/...
//!     voices.bin.part             partial download, resumable
//! ```

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BenchError, BenchResult};

/// File name of the per-model manifest
pub const MANIFEST_FILE_NAME: &str = ".ttsbench-manifest.json";

/// Suffix appended to a target path while it is being downloaded
pub const DOWNLOAD_TEMP_SUFFIX: &str = ".part";

/// Complete required file set of a remote model at the time it was resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Relative paths, sorted and deduplicated
    pub files: Vec<String>,
}

impl Manifest {
    /// Build a manifest from arbitrary paths, sorting and deduplicating them
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        Self {
            files: set.into_iter().collect(),
        }
    }

    /// Whether every path in `paths` is already listed
    #[must_use]
    pub fn contains_all(&self, paths: &[String]) -> bool {
        paths.iter().all(|p| self.files.contains(p))
    }

    /// Sorted union of the manifest and `extra`
    #[must_use]
    pub fn union_with(&self, extra: &[String]) -> Vec<String> {
        let set: BTreeSet<&String> = self.files.iter().chain(extra.iter()).collect();
        set.into_iter().cloned().collect()
    }
}

/// Result of looking for a model's manifest on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestState {
    /// No manifest has ever been written
    Absent,
    /// A manifest exists but could not be read or parsed
    Unreadable(String),
    /// A valid manifest
    Present(Manifest),
}

/// Whether `path` is a plain relative path that stays inside its model directory
#[must_use]
pub fn is_safe_relative(path: &str) -> bool {
    let p = Path::new(path);
    !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Whether `name` can be used as a single directory name under a root
#[must_use]
pub fn is_path_segment(name: &str) -> bool {
    is_safe_relative(name) && !name.contains(['/', '\\']) && name != "."
}

/// Filesystem view of the models root
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The models root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all files of `model_id`
    #[must_use]
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.root.join(model_id)
    }

    /// Final location of a model file
    #[must_use]
    pub fn file_path(&self, model_id: &str, relative: &str) -> PathBuf {
        self.model_dir(model_id).join(relative)
    }

    /// Partial-download location of a model file
    #[must_use]
    pub fn temp_path(&self, model_id: &str, relative: &str) -> PathBuf {
        self.model_dir(model_id)
            .join(format!("{relative}{DOWNLOAD_TEMP_SUFFIX}"))
    }

    /// Location of the model's manifest
    #[must_use]
    pub fn manifest_path(&self, model_id: &str) -> PathBuf {
        self.model_dir(model_id).join(MANIFEST_FILE_NAME)
    }

    /// Whether a completed model file is present
    #[must_use]
    pub fn file_exists(&self, model_id: &str, relative: &str) -> bool {
        self.file_path(model_id, relative).is_file()
    }

    /// Read the manifest, classifying missing and corrupt files
    #[must_use]
    pub fn read_manifest(&self, model_id: &str) -> ManifestState {
        let path = self.manifest_path(model_id);
        if !path.exists() {
            return ManifestState::Absent;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return ManifestState::Unreadable(e.to_string()),
        };
        match serde_json::from_str::<Manifest>(&content) {
            Ok(m) => ManifestState::Present(m),
            Err(e) => {
                debug!("Manifest {:?} is corrupt: {}", path, e);
                ManifestState::Unreadable(e.to_string())
            }
        }
    }

    /// Persist a manifest, replacing any previous one atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the model directory cannot be created or the file
    /// cannot be written.
    pub fn write_manifest(&self, model_id: &str, manifest: &Manifest) -> BenchResult<()> {
        let dir = self.model_dir(model_id);
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(manifest)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.manifest_path(model_id))
            .map_err(|e| BenchError::file(format!("Failed to persist manifest: {e}")))?;
        debug!("Wrote manifest for {} ({} files)", model_id, manifest.files.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_sorts_and_dedups() {
        let m = Manifest::new(["b.bin", "a.bin", "b.bin"]);
        assert_eq!(m.files, vec!["a.bin", "b.bin"]);
        assert!(m.contains_all(&["a.bin".to_string()]));
        assert!(!m.contains_all(&["c.bin".to_string()]));
        assert_eq!(
            m.union_with(&["c.bin".to_string(), "a.bin".to_string()]),
            vec!["a.bin", "b.bin", "c.bin"]
        );
    }

    #[test]
    fn test_manifest_states() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());

        assert_eq!(store.read_manifest("m"), ManifestState::Absent);

        store.write_manifest("m", &Manifest::new(["x.onnx"])).unwrap();
        assert_eq!(
            store.read_manifest("m"),
            ManifestState::Present(Manifest::new(["x.onnx"]))
        );

        std::fs::write(store.manifest_path("m"), "{not json").unwrap();
        assert!(matches!(store.read_manifest("m"), ManifestState::Unreadable(_)));
    }

    #[test]
    fn test_paths() {
        let store = ModelStore::new("/models");
        assert_eq!(
            store.file_path("kokoro", "espeak-ng-data/phontab"),
            PathBuf::from("/models/kokoro/espeak-ng-data/phontab")
        );
        assert_eq!(
            store.temp_path("kokoro", "model.onnx"),
            PathBuf::from("/models/kokoro/model.onnx.part")
        );
    }

    #[test]
    fn test_safe_relative_paths() {
        assert!(is_safe_relative("model.onnx"));
        assert!(is_safe_relative("espeak-ng-data/voices/en"));
        assert!(!is_safe_relative(""));
        assert!(!is_safe_relative("../etc/passwd"));
        assert!(!is_safe_relative("/abs/path"));
    }
}
