//! Discovery and parsing of the declarative record files.
//!
//! Each library is described by one YAML document in the data directory. The file
//! name without its extension is the record id.

use crate::AggregateError;
use crate::schema::{RawRecord, ValidationError, validate_raw_record};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "   sources";

/// File extensions recognized as source documents.
pub const SOURCE_EXTENSIONS: &[&str] = &["yml", "yaml"];

/// A parsed but not yet validated source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    pub path: PathBuf,
    pub value: Value,
}

impl SourceDocument {
    /// Validate the document as a [`RawRecord`], attributing errors to its file.
    ///
    /// # Errors
    ///
    /// Fails when the document does not have the raw record shape.
    pub fn validate(&self) -> Result<RawRecord, ValidationError> {
        validate_raw_record(&self.origin(), &self.value)
    }

    /// How errors refer to this document.
    #[must_use]
    pub fn origin(&self) -> String {
        self.path.display().to_string()
    }
}

/// List the source documents directly inside `dir`, sorted by path.
///
/// Subdirectories are not searched.
///
/// # Errors
///
/// Fails when the directory cannot be read.
pub fn list_source_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, AggregateError> {
    let dir = dir.as_ref();
    let _ = fs::metadata(dir).map_err(|source| AggregateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry_result in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry_result.map_err(|e| AggregateError::Io {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if is_source_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    log::debug!(target: LOG_TARGET, "Found {} source documents in '{}'", files.len(), dir.display());
    Ok(files)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// The record id derived from a source document's path.
#[must_use]
pub fn record_id(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Read and parse one source document.
///
/// # Errors
///
/// Fails with [`AggregateError::Io`] when the file cannot be read and with
/// [`AggregateError::Parse`] when it is not well-formed YAML.
pub fn load_source(path: impl AsRef<Path>) -> Result<SourceDocument, AggregateError> {
    let path = path.as_ref();

    let text = fs::read_to_string(path).map_err(|source| AggregateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_yaml::from_str(&text).map_err(|source| AggregateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!(target: LOG_TARGET, "Loaded '{}'", path.display());

    Ok(SourceDocument {
        id: record_id(path),
        path: path.to_path_buf(),
        value,
    })
}
