//! Error types. One enum per concern, `thiserror` only.

use std::path::PathBuf;

/// Configuration could not be loaded or failed validation.
///
/// Raised before any file is touched; a run never starts with an invalid config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported config format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error("config validation failed:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}

/// A file could not be turned into content blocks.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("file too large: {path} ({size} bytes > {limit})")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid input to the confidence policy.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfidenceError {
    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    FactorOutOfRange { name: &'static str, value: f64 },

    #[error("weights must sum to 1.0, got {0:.3}")]
    WeightSum(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git is not installed or not on PATH")]
    NotInstalled,

    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("file is not tracked by git: {0}")]
    Untracked(PathBuf),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("cannot run git: {0}")]
    Io(#[from] std::io::Error),
}

/// The atomic write primitive failed; the original file is left intact.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("{path} has no parent directory")]
    NoParent { path: PathBuf },

    #[error("atomic write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error for callers that drive a whole run.
#[derive(Debug, thiserror::Error)]
pub enum DocHealError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Confidence(#[from] ConfidenceError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = DocHealError> = std::result::Result<T, E>;
