use crate::schema::ValidationError;
use std::path::PathBuf;
use strum::Display;

/// The enrichment sub-procedure an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EnrichmentSource {
    #[strum(serialize = "repository statistics")]
    Repository,
    #[strum(serialize = "download statistics")]
    Downloads,
    #[strum(serialize = "bundle size statistics")]
    BundleSize,
}

/// Failure talking to one of the external services.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to '{url}' failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to '{url}' timed out")]
    Timeout { url: String },

    #[error("request to '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("response from '{url}' is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response from '{url}': {detail}")]
    Shape { url: String, detail: String },
}

impl FetchError {
    /// The HTTP status code, when the service answered with a non-success status.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Everything that can stop a record, or the whole run, from being produced.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("unable to read '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse '{}' as YAML: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("record id '{id}' is declared by both '{}' and '{}'", first.display(), second.display())]
    DuplicateId { id: String, first: PathBuf, second: PathBuf },

    #[error("{source_kind} for record '{record}': repository '{declared}' is now known as '{actual}', update the record")]
    IdentityMismatch {
        record: String,
        source_kind: EnrichmentSource,
        declared: String,
        actual: String,
    },

    #[error("{source_kind} for record '{record}' could not be fetched: {source}")]
    Fetch {
        record: String,
        source_kind: EnrichmentSource,
        #[source]
        source: FetchError,
    },

    #[error("unable to encode record '{record}'")]
    Encode {
        record: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected {expected} library records but produced {produced}")]
    Incomplete { expected: usize, produced: usize },

    #[error("{} of {total} records failed:{}", failures.len(), list_failures(failures))]
    Failures { total: usize, failures: Vec<Self> },
}

impl AggregateError {
    /// The record this error is attributed to, when there is one.
    #[must_use]
    pub fn record(&self) -> Option<&str> {
        match self {
            Self::Validation(e) => Some(e.origin()),
            Self::IdentityMismatch { record, .. } | Self::Fetch { record, .. } | Self::Encode { record, .. } => Some(record),
            Self::DuplicateId { id, .. } => Some(id),
            _ => None,
        }
    }

    /// The enrichment sub-procedure this error came from, when there is one.
    #[must_use]
    pub const fn source_kind(&self) -> Option<EnrichmentSource> {
        match self {
            Self::IdentityMismatch { source_kind, .. } | Self::Fetch { source_kind, .. } => Some(*source_kind),
            _ => None,
        }
    }
}

fn list_failures(failures: &[AggregateError]) -> String {
    use core::fmt::Write;

    let mut s = String::new();
    for failure in failures {
        let _ = write!(s, "\n  - {failure}");
    }
    s
}
