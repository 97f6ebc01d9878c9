//! Builds the data set behind a directory of third-party libraries.
//!
//! # Overview
//!
//! Each library is described by a YAML document in a data directory. `library-aggregator`
//! validates every document, enriches it with live statistics from GitHub, the npm
//! registry, and Bundlephobia, and writes the resulting records as JSON.
//!
//! # Usage
//!
//! **Produce the data set:**
//! ```bash
//! library-aggregator aggregate --data-dir data --output libraries.json
//! ```
//!
//! **Check the source documents without touching the network:**
//! ```bash
//! library-aggregator validate --data-dir data
//! ```
//!
//! **Generate a configuration file:**
//! ```bash
//! library-aggregator init aggregate.yml
//! ```
//!
//! # Source Documents
//!
//! ```yaml
//! title: React Table
//! description: Headless UI for building powerful tables and datagrids
//! githubRepo: TanStack/table
//! npmPackage: "@tanstack/react-table"
//! license: MIT
//! frameworks:
//!   react: https://tanstack.com/table/latest/docs/framework/react/react-table
//!   vue: true
//! features:
//!   typescript: true
//!   headless: true
//!   virtualization: via TanStack Virtual
//! ```
//!
//! `title` and `description` are required. Framework values are `true`, `false`, or a
//! documentation URL; feature values are `true`, `false`, or a short note.
//!
//! # Caching
//!
//! Fetched statistics are cached for a day in the platform cache directory. Use
//! `--ignore-cache` to refetch everything, `--no-cache` to keep nothing on disk, and
//! `--cache-dir` to put the cache somewhere else.
//!
//! # GitHub Rate Limits
//!
//! Unauthenticated GitHub API access is limited to 60 requests an hour. Provide a token
//! through the `GITHUB_TOKEN` environment variable or `--github-token` to raise it.

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use library_aggregator::Result;

mod commands;

use crate::commands::{AggregateArgs, InitArgs, ValidateArgs, init_config, process_aggregate, validate_sources};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "library-aggregator", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and enrich every library record, then write them as JSON
    Aggregate(Box<AggregateArgs>),
    /// Validate the library source documents without fetching anything
    Validate(ValidateArgs),
    /// Generate a default configuration file
    Init(InitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        Command::Aggregate(aggregate_args) => process_aggregate(aggregate_args).await,
        Command::Validate(validate_args) => validate_sources(validate_args),
        Command::Init(init_args) => init_config(init_args),
    }
}
