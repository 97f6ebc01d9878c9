//! Shapes of library records and the validators that produce them.
//!
//! A [`RawRecord`] is what a source document declares. A [`LibraryRecord`] is a raw
//! record plus the statistics blocks gathered during enrichment. Neither type can be
//! deserialized directly; both are only produced by the validators in this module,
//! which report the first violated constraint as a [`ValidationError`].

mod keys;
mod records;
mod support;
mod validator;

pub use keys::{Feature, Framework};
pub use records::{BundleStats, GithubStats, LibraryRecord, NpmStats, RawRecord};
pub use support::{NoteKind, Support, SupportKey, SupportMap};
pub use validator::{Constraint, GITHUB_REPO_PATTERN, ValidationError, validate_library_record, validate_raw_record};
