use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the BatchSweep system
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Parameter space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Harvest error: {0}")]
    Harvest(#[from] HarvestError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Parameter space and identifier errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Invalid configuration identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Value {value} is not present in dimension {dimension}")]
    ValueNotInDimension { dimension: String, value: String },

    #[error("Expected {expected} dimension values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Dimension {dimension} has no values")]
    EmptyDimension { dimension: String },

    #[error("Dimension {dimension} has {cardinality} values, at most {max} are encodable")]
    CardinalityTooLarge {
        dimension: String,
        cardinality: usize,
        max: usize,
    },

    #[error("Duplicate dimension name: {dimension}")]
    DuplicateDimension { dimension: String },

    #[error("Parameter space has no dimensions")]
    NoDimensions,
}

/// Job-description template errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Override key {key:?} does not exist in the base template")]
    KeyMismatch { key: String },

    #[error("Override {key:?} expects {expected}, got {value}")]
    TypeMismatch {
        key: String,
        expected: String,
        value: String,
    },

    #[error("Invalid template: {message}")]
    Invalid { message: String },
}

/// Directory provisioning errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Provisioning IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document serialization failed for {path}: {message}")]
    Document { path: PathBuf, message: String },

    #[error("Launch template has no file name: {path}")]
    InvalidLaunchTemplate { path: PathBuf },

    #[error("Trial count must be at least 1")]
    NoTrials,
}

impl ProvisionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Harvesting and aggregation errors
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Job mapping length mismatch: {job_ids} job identifiers for {trial_paths} trial paths")]
    JobMappingLengthMismatch { job_ids: usize, trial_paths: usize },

    #[error("Job mapping conflict: {message}")]
    JobMappingConflict { message: String },

    #[error("Invalid job identifier range: {start}..{end}")]
    InvalidJobRange { start: u64, end: u64 },

    #[error("No result artifact in {trial}")]
    ArtifactMissing { trial: PathBuf },

    #[error("Failed to parse artifact {path}: {message}")]
    ArtifactParse { path: PathBuf, message: String },

    #[error("Simplification failed: {message}")]
    SimplificationFailure { message: String },

    #[error("Plotting failed: {message}")]
    PlotFailure { message: String },

    #[error("Summary write failed for {path}: {message}")]
    Summary { path: PathBuf, message: String },

    #[error("Harvest IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarvestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for BatchSweep operations
pub type SweepResult<T> = Result<T, SweepError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::SweepError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SweepError::Config(format!($($arg)*))
    };
}
