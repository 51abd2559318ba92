//! Resumable, byte-verified downloads of hub models.
//!
//! Everything is sequential: one member of a dependency closure at a time,
//! one file at a time in sorted path order. A failure aborts the whole
//! operation without retrying; calling again is safe because finished files
//! are skipped and `.part` files resume with a range request.

use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Model};
use crate::error::{BenchError, BenchResult};
use crate::hub::HubClient;
use crate::manifest::ManifestResolver;
use crate::store::{is_safe_relative, Manifest, ManifestState, ModelStore};

/// Forwards progress fractions while keeping them in `[0, 1]` and non-decreasing
struct ProgressTracker<F: FnMut(f64)> {
    sink: F,
    last: f64,
    emitted: bool,
}

impl<F: FnMut(f64)> ProgressTracker<F> {
    fn new(sink: F) -> Self {
        Self {
            sink,
            last: 0.0,
            emitted: false,
        }
    }

    fn emit(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if self.emitted && fraction < self.last {
            return;
        }
        self.last = fraction;
        self.emitted = true;
        (self.sink)(fraction);
    }

    fn finish(&mut self) {
        if !self.emitted || self.last < 1.0 {
            self.last = 1.0;
            self.emitted = true;
            (self.sink)(1.0);
        }
    }
}

/// Compare the bytes on disk against what the server announced
fn check_length(path: &Path, expected: Option<u64>, actual: u64) -> BenchResult<()> {
    match expected {
        Some(expected) if expected != actual => Err(BenchError::SizeMismatch {
            path: path.display().to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Remote size from the `Content-Range: bytes */<size>` header of a 416 response
fn unsatisfied_range_total(response: &reqwest::Response) -> Option<u64> {
    let value = response
        .headers()
        .get(reqwest::header::CONTENT_RANGE)?
        .to_str()
        .ok()?;
    parse_unsatisfied_range(value)
}

fn parse_unsatisfied_range(value: &str) -> Option<u64> {
    value.trim().strip_prefix("bytes */")?.trim().parse().ok()
}

/// Move a finished `.part` file into place, copying when a rename is impossible
async fn finalize(temp: &Path, target: &Path, url: &str) -> BenchResult<()> {
    let rename_err = match tokio::fs::rename(temp, target).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    warn!("Rename of {:?} failed ({}), falling back to copy", temp, rename_err);

    let temp_len = tokio::fs::metadata(temp).await?.len();
    let copied = tokio::fs::copy(temp, target).await.map_err(|e| {
        BenchError::download(url, format!("rename failed ({rename_err}) and copy failed: {e}"))
    })?;
    let target_len = tokio::fs::metadata(target).await.map(|m| m.len()).unwrap_or(0);

    if copied != temp_len || target_len != temp_len {
        let _ = tokio::fs::remove_file(target).await;
        return Err(BenchError::SizeMismatch {
            path: target.display().to_string(),
            expected: temp_len,
            actual: target_len,
        });
    }

    tokio::fs::remove_file(temp).await?;
    Ok(())
}

/// Downloads hub models and their dependency closures into a [`ModelStore`]
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    hub: HubClient,
    resolver: ManifestResolver,
    store: ModelStore,
    catalog: Arc<Catalog>,
}

impl ModelDownloader {
    /// Create a downloader; `hub` is used both for listings and transfers
    pub fn new(hub: HubClient, store: ModelStore, catalog: Arc<Catalog>) -> Self {
        let resolver = ManifestResolver::new(Arc::new(hub.clone()), store.clone());
        Self {
            hub,
            resolver,
            store,
            catalog,
        }
    }

    /// Replace the resolver, e.g. to list repositories through another source
    #[must_use]
    pub fn with_resolver(mut self, resolver: ManifestResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The store files are written to
    #[must_use]
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Download every required file of `model` alone.
    ///
    /// `on_progress` receives non-decreasing fractions in `[0, 1]`; the last
    /// value is exactly `1.0` on success.
    ///
    /// A `.part` file is resumed with a range request. When the server answers
    /// 416 and reports a size equal to the partial file, the file is taken as
    /// complete; any other 416 deletes it and fails, and the next call fetches
    /// that file from zero.
    ///
    /// # Errors
    ///
    /// Fails for non-hub models, unresolvable listings, non-2xx responses,
    /// empty bodies, byte-count mismatches and finalize failures.
    pub async fn download<F>(&self, model: &Model, on_progress: F) -> BenchResult<()>
    where
        F: FnMut(f64) + Send,
    {
        let mut tracker = ProgressTracker::new(on_progress);
        self.download_member(model, &mut |fraction| tracker.emit(fraction))
            .await?;
        tracker.finish();
        Ok(())
    }

    /// Download `model` and its hub-sourced dependencies, dependencies first.
    ///
    /// With `n` eligible members, overall progress is
    /// `(member_index + member_fraction) / n`.
    ///
    /// # Errors
    ///
    /// The first failing member aborts the operation; see [`Self::download`].
    pub async fn download_with_dependencies<F>(&self, model: &Model, on_progress: F) -> BenchResult<()>
    where
        F: FnMut(f64) + Send,
    {
        let members: Vec<&Model> = self
            .catalog
            .dependency_closure(model)
            .into_iter()
            .filter(|m| m.is_remote())
            .collect();
        let count = members.len();
        info!(
            "Downloading {} with {} hub member(s): {:?}",
            model.id,
            count,
            members.iter().map(|m| m.id.as_str()).collect::<Vec<_>>()
        );

        let mut tracker = ProgressTracker::new(on_progress);
        for (index, member) in members.into_iter().enumerate() {
            let base = index as f64;
            self.download_member(member, &mut |fraction| {
                tracker.emit((base + fraction) / count as f64);
            })
            .await
            .map_err(|e| {
                warn!(
                    category = e.category(),
                    transient = e.is_transient(),
                    "Member {} of {} failed: {}",
                    member.id,
                    model.id,
                    e
                );
                e
            })?;
        }
        tracker.finish();
        Ok(())
    }

    async fn download_member(
        &self,
        model: &Model,
        progress: &mut (dyn FnMut(f64) + Send),
    ) -> BenchResult<()> {
        let Some((repo, revision)) = model.hub_repo() else {
            return Err(BenchError::invalid_input(format!(
                "model '{}' is not hub-sourced ({})",
                model.id,
                model.source.kind()
            )));
        };

        let required = self.resolver.resolve_required_paths(model).await?;
        if let Some(bad) = required.iter().find(|p| !is_safe_relative(p)) {
            return Err(BenchError::invalid_input(format!(
                "refusing to download '{bad}' for {}: path escapes the model directory",
                model.id
            )));
        }

        // Persist before transferring so an interrupted run still leaves an
        // accurate manifest behind.
        let manifest = Manifest::new(required.iter().cloned());
        if self.store.read_manifest(&model.id) != ManifestState::Present(manifest.clone()) {
            self.store.write_manifest(&model.id, &manifest)?;
        }

        let total = required.len();
        if total == 0 {
            progress(1.0);
            return Ok(());
        }

        for (index, relative) in required.iter().enumerate() {
            let target = self.store.file_path(&model.id, relative);
            if target.is_file() {
                debug!("Skipping already-downloaded {}/{}", model.id, relative);
            } else {
                self.transfer_file(model, repo, revision, relative, index, total, progress)
                    .await?;
            }
            progress((index + 1) as f64 / total as f64);
        }

        info!("Model {} complete ({} files)", model.id, total);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer_file(
        &self,
        model: &Model,
        repo: &str,
        revision: &str,
        relative: &str,
        index: usize,
        total: usize,
        progress: &mut (dyn FnMut(f64) + Send),
    ) -> BenchResult<()> {
        let url = self.hub.resolve_url(repo, revision, relative);
        let target = self.store.file_path(&model.id, relative);
        let temp = self.store.temp_path(&model.id, relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let resume_from = tokio::fs::metadata(&temp)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let mut response = self.hub.fetch(&url, resume_from).await?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            // A run interrupted between stream end and rename leaves a complete .part.
            if unsatisfied_range_total(&response) == Some(resume_from) {
                info!("Partial file for {}/{} is already complete", model.id, relative);
                finalize(&temp, &target, &url).await?;
                return Ok(());
            }
            // Otherwise the partial file no longer matches; the next call starts from zero.
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(BenchError::download(
                &url,
                format!("HTTP {status} resuming from byte {resume_from}; partial file discarded"),
            ));
        }
        if !status.is_success() {
            return Err(BenchError::download(&url, format!("HTTP {status}")));
        }

        let resuming = resume_from > 0 && status == StatusCode::PARTIAL_CONTENT;
        if resume_from > 0 && !resuming {
            warn!("Server ignored range request for {}, restarting from zero", url);
        }
        let already = if resuming { resume_from } else { 0 };
        let expected = response.content_length().map(|len| len + already);

        let mut file = if resuming {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&temp)
                .await?
        } else {
            tokio::fs::File::create(&temp).await?
        };

        let mut bytes_read = already;
        let mut received: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BenchError::download(&url, format!("stream interrupted: {e}")))?
        {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            bytes_read += chunk.len() as u64;

            if let Some(total_expected) = expected.filter(|&t| t > 0) {
                let within = (bytes_read as f64 / total_expected as f64).min(1.0);
                progress((index as f64 + within) / total as f64);
            }
        }
        file.flush().await?;
        drop(file);

        if received == 0 && !resuming {
            return Err(BenchError::download(&url, "empty response body"));
        }
        check_length(&temp, expected, bytes_read)?;
        finalize(&temp, &target, &url).await?;

        info!(
            "Downloaded {}/{} ({} bytes{})",
            model.id,
            relative,
            bytes_read,
            if resuming { ", resumed" } else { "" }
        );
        Ok(())
    }
}
