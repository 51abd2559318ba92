//! Error types for the benchmark core.

/// Result type alias for benchmark operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Main error type for model lifecycle and benchmark operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchError {
    /// Catalog could not be parsed or failed validation
    #[error("Catalog error: {message}")]
    CatalogError {
        /// Error message describing the catalog issue
        message: String,
    },

    /// A model id was not present in the catalog
    #[error("Model '{model_id}' not found")]
    ModelNotFound {
        /// The model id that was not found
        model_id: String,
    },

    /// The catalog declares a dependency cycle
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle {
        /// Model ids forming the cycle, first id repeated at the end
        path: Vec<String>,
    },

    /// The model is not ready for benchmarking
    #[error("Model '{model_id}' is not ready: {reason}")]
    NotReady {
        /// The model that failed the readiness gate
        model_id: String,
        /// Human readable readiness summary
        reason: String,
    },

    /// Remote listing could not be resolved
    #[error("Resolve error for {repo}: {message}")]
    ResolveError {
        /// Remote repository id
        repo: String,
        /// Error message describing the failure
        message: String,
    },

    /// Transfer of a single file failed
    #[error("Download failed for {url}: {message}")]
    DownloadFailed {
        /// URL being fetched
        url: String,
        /// Error message describing the failure
        message: String,
    },

    /// Transferred byte count did not match the expected length
    #[error("Size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Local path of the file
        path: String,
        /// Expected byte count
        expected: u64,
        /// Observed byte count
        actual: u64,
    },

    /// Network or transport error
    #[error("Network error: {message}")]
    NetworkError {
        /// Error message describing the network issue
        message: String,
    },

    /// Inference engine failure (load or synthesis)
    #[error("Engine error: {message}")]
    EngineError {
        /// Error message describing the engine failure
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    FileError {
        /// Error message describing the file operation failure
        message: String,
    },

    /// Invalid input error
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the invalid input
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl BenchError {
    /// Create a new catalog error
    #[must_use]
    pub fn catalog<S: Into<String>>(message: S) -> Self {
        Self::CatalogError {
            message: message.into(),
        }
    }

    /// Create a new model not found error
    #[must_use]
    pub fn model_not_found<S: Into<String>>(model_id: S) -> Self {
        Self::ModelNotFound {
            model_id: model_id.into(),
        }
    }

    /// Create a new not-ready error
    #[must_use]
    pub fn not_ready<S: Into<String>, R: Into<String>>(model_id: S, reason: R) -> Self {
        Self::NotReady {
            model_id: model_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new resolve error
    #[must_use]
    pub fn resolve<S: Into<String>, M: Into<String>>(repo: S, message: M) -> Self {
        Self::ResolveError {
            repo: repo.into(),
            message: message.into(),
        }
    }

    /// Create a new download error
    #[must_use]
    pub fn download<S: Into<String>, M: Into<String>>(url: S, message: M) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new network error
    #[must_use]
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Create a new engine error
    #[must_use]
    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self::EngineError {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::FileError {
            message: message.into(),
        }
    }

    /// Create a new invalid input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Whether re-invoking the failed operation may succeed.
    ///
    /// Nothing retries automatically; this only tells callers that a resumed
    /// download is worth attempting.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. }
                | Self::DownloadFailed { .. }
                | Self::SizeMismatch { .. }
                | Self::ResolveError { .. }
        )
    }

    /// Get the error category for logging
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::CatalogError { .. } | Self::DependencyCycle { .. } => "catalog",
            Self::ModelNotFound { .. } => "model",
            Self::NotReady { .. } => "readiness",
            Self::ResolveError { .. } => "resolve",
            Self::DownloadFailed { .. } | Self::SizeMismatch { .. } => "transfer",
            Self::NetworkError { .. } => "network",
            Self::EngineError { .. } => "engine",
            Self::FileError { .. } => "file",
            Self::InvalidInput { .. } => "input",
            Self::ConfigurationError { .. } => "configuration",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::file(format!("JSON serialization error: {err}"))
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("TOML parse error: {err}"))
    }
}
