//! # bs-space
//!
//! Configuration encoding and job-description rendering for BatchSweep.
//!
//! A [`ParameterSpace`] maps every combination of discrete hyperparameter
//! values to a compact digit-string identifier, and [`render`] turns the
//! resolved values of one identifier into a [`JobDescription`] ready to be
//! written into each trial directory.

mod space;
mod template;

pub use space::{Dimension, ParameterSpace};
pub use template::{render, Hyperparameters, JobDescription};
