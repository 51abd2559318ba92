//! Required-file resolution for hub models.
//!
//! A model's required set is its explicit `files` plus every remote path under
//! one of its `prefixes`. Expanding prefixes needs a listing call, so the
//! result is cached as the model's manifest and reused for as long as it
//! covers every explicit file the catalog currently declares. Explicit files
//! that disappear from the catalog never shrink a cached manifest.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::Model;
use crate::error::{BenchError, BenchResult};
use crate::hub::RepoListing;
use crate::store::{Manifest, ManifestState, ModelStore};

/// Computes and caches the authoritative file set of hub models
#[derive(Clone)]
pub struct ManifestResolver {
    listing: Arc<dyn RepoListing>,
    store: ModelStore,
}

impl std::fmt::Debug for ManifestResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestResolver")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ManifestResolver {
    /// Create a resolver that lists repositories through `listing` and caches
    /// manifests in `store`
    pub fn new(listing: Arc<dyn RepoListing>, store: ModelStore) -> Self {
        Self { listing, store }
    }

    /// Sorted, deduplicated relative paths `model` needs locally.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidInput`] for models that are not hub-sourced,
    /// a resolve error when the listing cannot be fetched, and a file error when
    /// a freshly resolved manifest cannot be persisted.
    pub async fn resolve_required_paths(&self, model: &Model) -> BenchResult<Vec<String>> {
        let Some((repo, revision)) = model.hub_repo() else {
            return Err(BenchError::invalid_input(format!(
                "model '{}' is not hub-sourced ({})",
                model.id,
                model.source.kind()
            )));
        };

        if model.prefixes.is_empty() {
            return Ok(Manifest::new(model.files.iter().cloned()).files);
        }

        if let ManifestState::Present(cached) = self.store.read_manifest(&model.id) {
            if cached.contains_all(&model.files) {
                debug!("Reusing cached manifest for {} ({} files)", model.id, cached.files.len());
                return Ok(cached.files);
            }
            info!("Cached manifest for {} misses explicit files, re-resolving", model.id);
        }

        let listing = self.listing.list_files(repo, revision).await?;
        let listed: BTreeSet<&str> = listing.iter().map(String::as_str).collect();

        for file in &model.files {
            if !listed.contains(file.as_str()) {
                warn!("Explicit file {} not in listing of {}@{}", file, repo, revision);
            }
        }

        let expanded = listing
            .iter()
            .filter(|f| model.prefixes.iter().any(|p| f.starts_with(p.as_str())))
            .cloned();
        let manifest = Manifest::new(model.files.iter().cloned().chain(expanded));

        self.store.write_manifest(&model.id, &manifest)?;
        info!(
            "Resolved {} required files for {} from {}@{}",
            manifest.files.len(),
            model.id,
            repo,
            revision
        );
        Ok(manifest.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelSource, DEFAULT_REVISION};
    use crate::hub::MockRepoListing;
    use tempfile::TempDir;

    fn hf(id: &str) -> Model {
        Model::new(
            id,
            "sherpa_offline_tts",
            ModelSource::HuggingFace {
                repo: format!("csukuangfj/{id}"),
                revision: DEFAULT_REVISION.to_string(),
            },
        )
    }

    fn resolver(dir: &TempDir, listing: MockRepoListing) -> ManifestResolver {
        ManifestResolver::new(Arc::new(listing), ModelStore::new(dir.path()))
    }

    #[tokio::test]
    async fn test_no_prefixes_needs_no_listing() {
        let dir = TempDir::new().unwrap();
        let mut listing = MockRepoListing::new();
        listing.expect_list_files().times(0);

        let model = hf("vits").with_files(["tokens.txt", "model.onnx", "tokens.txt"]);
        let paths = resolver(&dir, listing)
            .resolve_required_paths(&model)
            .await
            .unwrap();
        assert_eq!(paths, vec!["model.onnx", "tokens.txt"]);
    }

    #[tokio::test]
    async fn test_prefix_expansion_persists_manifest() {
        let dir = TempDir::new().unwrap();
        let mut listing = MockRepoListing::new();
        listing
            .expect_list_files()
            .withf(|repo, rev| repo == "csukuangfj/kokoro" && rev == "main")
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    "README.md".into(),
                    "dict/jieba.dict.utf8".into(),
                    "dict/pos_dict/char_state_tab.utf8".into(),
                    "model.onnx".into(),
                ])
            });

        let store = ModelStore::new(dir.path());
        let model = hf("kokoro")
            .with_files(["model.onnx", "voices.bin"])
            .with_prefixes(["dict/"]);
        let paths = resolver(&dir, listing)
            .resolve_required_paths(&model)
            .await
            .unwrap();

        let expected = vec![
            "dict/jieba.dict.utf8".to_string(),
            "dict/pos_dict/char_state_tab.utf8".to_string(),
            "model.onnx".to_string(),
            "voices.bin".to_string(),
        ];
        assert_eq!(paths, expected);
        assert_eq!(
            store.read_manifest("kokoro"),
            ManifestState::Present(Manifest { files: expected })
        );
    }

    #[tokio::test]
    async fn test_cached_superset_manifest_skips_listing() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        store
            .write_manifest("espeak", &Manifest::new(["espeak-ng-data/phontab", "tokens.txt"]))
            .unwrap();

        let mut listing = MockRepoListing::new();
        listing.expect_list_files().times(0);

        let model = hf("espeak")
            .with_files(["tokens.txt"])
            .with_prefixes(["espeak-ng-data/"]);
        let paths = resolver(&dir, listing)
            .resolve_required_paths(&model)
            .await
            .unwrap();
        assert_eq!(paths, vec!["espeak-ng-data/phontab", "tokens.txt"]);
    }

    #[tokio::test]
    async fn test_removed_explicit_file_does_not_shrink_manifest() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        store
            .write_manifest("espeak", &Manifest::new(["old.bin", "espeak-ng-data/phontab"]))
            .unwrap();

        let mut listing = MockRepoListing::new();
        listing.expect_list_files().times(0);

        let model = hf("espeak").with_prefixes(["espeak-ng-data/"]);
        let paths = resolver(&dir, listing)
            .resolve_required_paths(&model)
            .await
            .unwrap();
        assert_eq!(paths, vec!["espeak-ng-data/phontab", "old.bin"]);
    }

    #[tokio::test]
    async fn test_new_explicit_file_triggers_reresolution() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        store
            .write_manifest("espeak", &Manifest::new(["espeak-ng-data/phontab"]))
            .unwrap();

        let mut listing = MockRepoListing::new();
        listing
            .expect_list_files()
            .times(1)
            .returning(|_, _| Ok(vec!["espeak-ng-data/phontab".into(), "espeak-ng-data/voices/en".into()]));

        let model = hf("espeak")
            .with_files(["lexicon.txt"])
            .with_prefixes(["espeak-ng-data/"]);
        let paths = resolver(&dir, listing)
            .resolve_required_paths(&model)
            .await
            .unwrap();
        // lexicon.txt is not listed remotely but stays required
        assert_eq!(
            paths,
            vec!["espeak-ng-data/phontab", "espeak-ng-data/voices/en", "lexicon.txt"]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let mut listing = MockRepoListing::new();
        listing
            .expect_list_files()
            .returning(|repo, _| Err(BenchError::resolve(repo, "listing returned HTTP 503")));

        let model = hf("espeak").with_prefixes(["espeak-ng-data/"]);
        let err = resolver(&dir, listing)
            .resolve_required_paths(&model)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ResolveError { .. }));
        assert_eq!(
            ModelStore::new(dir.path()).read_manifest("espeak"),
            ManifestState::Absent
        );
    }

    #[tokio::test]
    async fn test_rejects_non_hub_models() {
        let dir = TempDir::new().unwrap();
        let model = Model::new("android", "system_tts", ModelSource::System);
        let err = resolver(&dir, MockRepoListing::new())
            .resolve_required_paths(&model)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::InvalidInput { .. }));
    }
}
