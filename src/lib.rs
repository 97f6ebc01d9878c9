//! library-aggregator crate
//!
//! Builds the data set behind a directory of third-party libraries. Declarative YAML
//! records are validated, enriched with live statistics from GitHub, the npm registry
//! and Bundlephobia, and returned as a collection of typed records.
//!
//! # Module Organization
//!
//! - [`schema`]: record shapes and their validators
//! - [`sources`]: discovery and parsing of the declarative record files
//! - [`facts`]: cache and rate-limited fetch gateways to the outside world
//! - [`enrich`]: per-record enrichment with external statistics
//! - [`pipeline`]: drives loading and enrichment across a whole directory
//! - [`config`]: configuration file loading

/// Result type alias using `ohno::AppError` as the default error type.
pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod config;
pub mod enrich;
mod error;
pub mod facts;
pub mod pipeline;
pub mod schema;
pub mod sources;

pub use error::{AggregateError, EnrichmentSource, FetchError};
