//! # WBR Engine
//!
//! Metric engine and deck builder for Weekly Business Review decks.
//!
//! A declarative YAML configuration names data sources (database queries
//! and/or CSV files), declares metrics (direct columns, filtered
//! aggregations, or functions of other metrics), and lays out a deck of
//! visualization blocks. This crate loads and merges the daily inputs,
//! materializes the metrics (including auto-generated WOW/MOM/YOY growth
//! metrics), computes the trailing 6-week and 12-month rollups with
//! period-to-date comparisons, and emits a render-agnostic deck document.
//!
//! ## Architecture
//!
//! - [`models`]: configuration model, calendar math, daily tables, and the
//!   deck document
//! - [`io`]: CSV and annotation loading
//! - [`db`]: database connectors behind one `execute_query` capability
//! - [`transformations`]: source namespacing and merging
//! - [`preprocessing`]: gather-all config validation
//! - [`services`]: the metric engine, annotation resolution, deck assembly,
//!   the scenario harness, and the end-to-end pipeline
//! - [`http`]: Axum server exposing the report endpoints
//!
//! The build pipeline is synchronous per request: loading, merging, metric
//! materialization, and deck assembly all operate on request-local state, so
//! a server can process independent requests in parallel.

pub mod algorithms;
pub mod db;
pub mod error;
pub mod formatting;
pub mod io;
pub mod models;
pub mod parsing;
pub mod preprocessing;
pub mod services;
pub mod transformations;

#[cfg(feature = "http-server")]
pub mod http;

pub use error::{WbrError, WbrResult};
