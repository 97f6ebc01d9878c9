//! Drives loading, validation, and enrichment across a whole data directory.

use crate::AggregateError;
use crate::enrich::Enricher;
use crate::facts::{CacheGateway, Fetcher};
use crate::schema::{LibraryRecord, RawRecord};
use crate::sources::{list_source_files, load_source};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString, IntoStaticStr};

const LOG_TARGET: &str = "  pipeline";

/// What a run does when a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the first failure, once the records already in flight have settled.
    #[default]
    FailFast,

    /// Process every record, then report all failures together.
    CollectErrors,
}

/// A source document that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSource {
    pub id: String,
    pub path: PathBuf,
    pub record: RawRecord,
}

/// Turns a directory of source documents into library records.
#[derive(Debug)]
pub struct Pipeline<C, F> {
    enricher: Enricher<C, F>,
    policy: FailurePolicy,
}

impl<C: CacheGateway, F: Fetcher> Pipeline<C, F> {
    #[must_use]
    pub const fn new(enricher: Enricher<C, F>, policy: FailurePolicy) -> Self {
        Self { enricher, policy }
    }

    #[must_use]
    pub const fn enricher(&self) -> &Enricher<C, F> {
        &self.enricher
    }

    /// Load and validate every source document in `dir`, see [`validate_sources`].
    ///
    /// # Errors
    ///
    /// As [`validate_sources`], under this pipeline's policy.
    pub fn validate_sources(&self, dir: impl AsRef<Path>) -> Result<Vec<ValidatedSource>, AggregateError> {
        validate_sources(dir, self.policy)
    }

    /// Produce the library record of every source document in `dir`.
    ///
    /// All documents are validated before any enrichment starts. Records are then
    /// enriched concurrently on the calling task; the order of the result is unspecified.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::FailFast`], the first failure to occur. Under
    /// [`FailurePolicy::CollectErrors`], [`AggregateError::Failures`] listing every failure.
    /// [`AggregateError::Incomplete`] if fewer records are produced than documents found.
    pub async fn run(&self, dir: impl AsRef<Path>) -> Result<Vec<LibraryRecord>, AggregateError> {
        let dir = dir.as_ref();
        let sources = self.validate_sources(dir)?;
        let expected = sources.len();

        log::info!(target: LOG_TARGET, "Enriching {expected} records from '{}'", dir.display());

        let mut in_flight: FuturesUnordered<_> = sources
            .into_iter()
            .map(|source| async move { self.enricher.enrich(&source.id, source.record).await })
            .collect();

        let mut records = Vec::with_capacity(expected);
        let mut failures = Vec::new();

        // a failing record never cancels its siblings, whatever the policy
        while let Some(result) = in_flight.next().await {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::error!(target: LOG_TARGET, "{e}");
                    failures.push(e);
                }
            }
        }

        match self.policy {
            FailurePolicy::FailFast => {
                if let Some(first) = failures.into_iter().next() {
                    return Err(first);
                }
            }
            FailurePolicy::CollectErrors => collect_failures(expected, failures)?,
        }

        if records.len() != expected {
            return Err(AggregateError::Incomplete {
                expected,
                produced: records.len(),
            });
        }

        log::info!(target: LOG_TARGET, "Produced {} library records", records.len());
        Ok(records)
    }
}

/// Load and validate every source document in `dir` without touching the network.
///
/// # Errors
///
/// Fails when the directory cannot be listed, or when any document cannot be read,
/// cannot be parsed, does not validate, or reuses another document's id. Under
/// [`FailurePolicy::CollectErrors`] every such problem is reported together.
pub fn validate_sources(dir: impl AsRef<Path>, policy: FailurePolicy) -> Result<Vec<ValidatedSource>, AggregateError> {
    let files = list_source_files(dir)?;
    let total = files.len();

    let mut seen: HashMap<String, PathBuf> = HashMap::with_capacity(total);
    let mut sources = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for path in files {
        match load_validated(path, &mut seen) {
            Ok(source) => sources.push(source),
            Err(e) => on_failure(policy, e, &mut failures)?,
        }
    }

    collect_failures(total, failures)?;
    Ok(sources)
}

/// Either propagate `error` or set it aside, depending on `policy`.
fn on_failure(policy: FailurePolicy, error: AggregateError, failures: &mut Vec<AggregateError>) -> Result<(), AggregateError> {
    log::error!(target: LOG_TARGET, "{error}");
    match policy {
        FailurePolicy::FailFast => Err(error),
        FailurePolicy::CollectErrors => {
            failures.push(error);
            Ok(())
        }
    }
}

fn load_validated(path: PathBuf, seen: &mut HashMap<String, PathBuf>) -> Result<ValidatedSource, AggregateError> {
    let document = load_source(&path)?;

    if let Some(first) = seen.get(&document.id) {
        return Err(AggregateError::DuplicateId {
            id: document.id,
            first: first.clone(),
            second: path,
        });
    }
    let _ = seen.insert(document.id.clone(), path.clone());

    let record = document.validate()?;
    Ok(ValidatedSource {
        id: document.id,
        path,
        record,
    })
}

fn collect_failures(total: usize, failures: Vec<AggregateError>) -> Result<(), AggregateError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(AggregateError::Failures { total, failures })
    }
}
