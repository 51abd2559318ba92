//! Model catalog: the immutable set of benchmarkable models.
//!
//! A catalog is loaded once from JSON (`{"schema_version": 1, "models": [...]}`)
//! and validated up front: ids must be unique and the dependency graph must be
//! acyclic. Everything downstream (readiness, downloads, suites) borrows models
//! from it.

/// Catalog entry types
pub mod types;

pub use types::{Model, ModelMeta, ModelSource, DEFAULT_REVISION};

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{BenchError, BenchResult};
use crate::store::is_path_segment;

/// Catalog schema version understood by this crate
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    schema_version: u32,
    #[serde(default)]
    models: Vec<Model>,
}

/// Validated, indexed collection of models
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: Vec<Model>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from models, rejecting duplicate ids and dependency cycles
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::CatalogError`] on duplicate or empty ids, ids that
    /// are not a single path segment, and
    /// [`BenchError::DependencyCycle`] when the dependency graph has a cycle.
    pub fn from_models(models: Vec<Model>) -> BenchResult<Self> {
        let mut index = HashMap::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            if model.id.trim().is_empty() {
                return Err(BenchError::catalog(format!("entry {i} has an empty id")));
            }
            if !is_path_segment(&model.id) {
                return Err(BenchError::catalog(format!(
                    "model id '{}' must be a single path segment",
                    model.id
                )));
            }
            if index.insert(model.id.clone(), i).is_some() {
                return Err(BenchError::catalog(format!("duplicate model id '{}'", model.id)));
            }
        }

        let catalog = Self { models, index };
        catalog.check_acyclic()?;
        Ok(catalog)
    }

    /// Parse a catalog from its JSON representation
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, the schema version is not
    /// supported, or validation fails.
    pub fn from_json_str(json: &str) -> BenchResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| BenchError::catalog(format!("invalid catalog JSON: {e}")))?;
        if file.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(BenchError::catalog(format!(
                "unsupported catalog schema_version {} (expected {CATALOG_SCHEMA_VERSION})",
                file.schema_version
            )));
        }
        Self::from_models(file.models)
    }

    /// Load and validate a catalog file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BenchError::catalog(format!("failed to read {}: {e}", path.display())))?;
        let catalog = Self::from_json_str(&content)?;
        info!("Loaded catalog with {} models from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// All models in catalog order
    #[must_use]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Number of models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog has no models
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Look up a model by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Model> {
        self.index.get(id).map(|&i| &self.models[i])
    }

    /// Look up a model by id, failing if it is unknown
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ModelNotFound`] for unknown ids.
    pub fn require(&self, id: &str) -> BenchResult<&Model> {
        self.get(id).ok_or_else(|| BenchError::model_not_found(id))
    }

    /// Transitive dependencies of `model` followed by `model` itself.
    ///
    /// Dependencies come before their dependents, each model appears at most
    /// once, and ids missing from the catalog are skipped.
    #[must_use]
    pub fn dependency_closure<'a>(&'a self, model: &'a Model) -> Vec<&'a Model> {
        let mut visited: HashSet<&'a str> = HashSet::new();
        visited.insert(model.id.as_str());

        let mut closure = Vec::new();
        for dep in &model.dependencies {
            self.visit(dep, &mut visited, &mut closure);
        }
        closure.push(model);
        closure
    }

    fn visit<'a>(&'a self, id: &str, visited: &mut HashSet<&'a str>, out: &mut Vec<&'a Model>) {
        let Some(model) = self.get(id) else {
            debug!("Skipping unknown dependency '{}'", id);
            return;
        };
        if !visited.insert(model.id.as_str()) {
            return;
        }
        for dep in &model.dependencies {
            self.visit(dep, visited, out);
        }
        out.push(model);
    }

    fn check_acyclic(&self) -> BenchResult<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn dfs(
            catalog: &Catalog,
            i: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> BenchResult<()> {
            marks[i] = Mark::InProgress;
            stack.push(i);
            for dep in &catalog.models[i].dependencies {
                let Some(&j) = catalog.index.get(dep) else {
                    continue;
                };
                match marks[j] {
                    Mark::Done => {}
                    Mark::Unvisited => dfs(catalog, j, marks, stack)?,
                    Mark::InProgress => {
                        let start = stack.iter().position(|&k| k == j).unwrap_or(0);
                        let mut path: Vec<String> = stack[start..]
                            .iter()
                            .map(|&k| catalog.models[k].id.clone())
                            .collect();
                        path.push(catalog.models[j].id.clone());
                        return Err(BenchError::DependencyCycle { path });
                    }
                }
            }
            stack.pop();
            marks[i] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.models.len()];
        let mut stack = Vec::new();
        for i in 0..self.models.len() {
            if marks[i] == Mark::Unvisited {
                dfs(self, i, &mut marks, &mut stack)?;
            }
        }
        Ok(())
    }
}
