//! # bs-runner
//!
//! Ties the BatchSweep crates together: an [`ExperimentConfig`] loaded from
//! JSON describes one parameter study, and an [`Experiment`] runs its
//! provisioning, collection, aggregation and retargeting passes.

pub mod config;
pub mod experiment;

pub use config::*;
pub use experiment::*;

/// Install the `tracing` subscriber used by the `batchsweep` binary.
///
/// The filter comes from `BATCHSWEEP_LOG` and defaults to `info`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
