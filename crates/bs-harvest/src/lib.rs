//! # bs-harvest
//!
//! Harvesting phase of a BatchSweep experiment: correlating scheduler job
//! identifiers with trial directories, copying job outputs out of scratch
//! storage, and aggregating result artifacts into summary CSVs.
//!
//! The optimization framework's artifact format, the symbolic simplifier and
//! the plotting routine are external collaborators reached through the
//! [`ArtifactLoader`], [`Simplifier`] and [`Plotter`] traits.

mod aggregator;
mod artifact;
mod collaborators;
mod collector;
mod mapping;
mod summary;

pub use aggregator::{
    AggregationReport, AggregationSettings, ResultAggregator, SkippedTrial, TrialOutcome, TrialStage,
};
pub use artifact::{locate_artifact, ArtifactLoader, ArtifactPattern, JsonSnapshotLoader, ParsedArtifact};
pub use collaborators::{
    normalize_expression, strip_imaginary, CommandPlotter, CommandSimplifier,
    ExpressionNormalizer, Plotter, Simplifier,
};
pub use collector::{CollectedJob, CollectionReport, JobArtifactCollector, SkipReason, SkippedJob};
pub use mapping::{discover_from_logs, JobDiscovery, JobIdRange, JobMapping, LogDiscovery};
pub use summary::{format_bucket_fitness, ParameterBuckets, SummaryWriter, SUMMARY_HEADER};
