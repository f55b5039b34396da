//! Business logic: the metric engine, annotation resolution, deck assembly,
//! the end-to-end pipeline, the scenario harness, and starter-config
//! generation.

pub mod annotations;
pub mod deck;
pub mod harness;
pub mod metrics;
pub mod pipeline;
pub mod starter;
