//! Command-line interface for library-aggregator
//!
//! - **aggregate**: run the full pipeline and write the library records as JSON
//! - **validate**: load and validate every source document, without network access
//! - **init**: generate a default configuration file

mod aggregate;
mod common;
mod init;
mod validate;

pub use aggregate::{AggregateArgs, process_aggregate};
pub use init::{InitArgs, init_config};
pub use validate::{ValidateArgs, validate_sources};
