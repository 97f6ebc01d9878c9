use core::fmt::Debug;
use core::hash::Hash;
use core::str::FromStr;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// How a string value of a support entry is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    /// The string must be an http(s) URL, typically a link to documentation.
    Url,

    /// The string is free text qualifying the support.
    Text,
}

/// Whether a library supports a framework or feature.
///
/// Source documents write either a boolean or a string for each entry; a string
/// means "supported" with a link or qualifying note attached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Support {
    #[default]
    Absent,
    Flag(bool),
    Note(String),
}

impl Support {
    /// Returns `true` for `Flag(true)` and for any note.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        matches!(self, Self::Flag(true) | Self::Note(_))
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Note(note) => Some(note),
            _ => None,
        }
    }
}

impl Serialize for Support {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Flag(flag) => serializer.serialize_bool(*flag),
            Self::Note(note) => serializer.serialize_str(note),
        }
    }
}

/// A closed enumeration of keys allowed in a [`SupportMap`].
///
/// Adding a variant to an implementing enum is all it takes to make the validator
/// accept the new key.
pub trait SupportKey: Copy + Ord + Hash + Debug + IntoEnumIterator + FromStr + Into<&'static str> + 'static {
    /// Name of the record field holding the map.
    const FIELD: &'static str;

    /// How string values in the map are validated.
    const NOTE_KIND: NoteKind;

    /// The key as written in source documents.
    fn name(self) -> &'static str {
        self.into()
    }

    /// All valid key names, comma separated.
    #[must_use]
    fn known_names() -> String {
        Self::iter().map(Self::name).collect::<Vec<_>>().join(", ")
    }
}

/// Support entries keyed by a closed enumeration.
///
/// Only entries present in the source are stored; lookups of any other key yield
/// [`Support::Absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportMap<K: SupportKey> {
    entries: BTreeMap<K, Support>,
}

impl<K: SupportKey> Default for SupportMap<K> {
    fn default() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<K: SupportKey> SupportMap<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record support for `key`. Inserting [`Support::Absent`] removes the entry.
    pub fn insert(&mut self, key: K, support: Support) {
        if support == Support::Absent {
            let _ = self.entries.remove(&key);
        } else {
            let _ = self.entries.insert(key, support);
        }
    }

    #[must_use]
    pub fn get(&self, key: K) -> &Support {
        static ABSENT: Support = Support::Absent;
        self.entries.get(&key).unwrap_or(&ABSENT)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: SupportKey> Serialize for SupportMap<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, support) in &self.entries {
            map.serialize_entry(key.name(), support)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Feature, Framework};

    #[test]
    fn missing_keys_read_as_absent() {
        let map = SupportMap::<Framework>::new();
        assert_eq!(map.get(Framework::React), &Support::Absent);
        assert!(map.is_empty());
    }

    #[test]
    fn inserting_absent_removes_entry() {
        let mut map = SupportMap::<Framework>::new();
        map.insert(Framework::Vue, Support::Flag(true));
        assert_eq!(map.len(), 1);

        map.insert(Framework::Vue, Support::Absent);
        assert!(map.is_empty());
    }

    #[test]
    fn false_flags_are_kept_but_not_supported() {
        let mut map = SupportMap::<Feature>::new();
        map.insert(Feature::Typescript, Support::Flag(true));
        map.insert(Feature::DarkMode, Support::Flag(false));
        map.insert(Feature::Ssr, Support::Note("experimental".into()));

        assert_eq!(map.len(), 3);
        assert!(map.get(Feature::Typescript).is_supported());
        assert!(!map.get(Feature::DarkMode).is_supported());
        assert!(map.get(Feature::Ssr).is_supported());
    }

    #[test]
    fn serializes_by_source_names() {
        let mut map = SupportMap::<Framework>::new();
        map.insert(Framework::WebComponents, Support::Flag(true));
        map.insert(Framework::React, Support::Note("https://example.com/react".into()));

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "react": "https://example.com/react", "webComponents": true })
        );
    }

    #[test]
    fn note_accessor() {
        assert_eq!(Support::Note("beta".into()).note(), Some("beta"));
        assert_eq!(Support::Flag(true).note(), None);
        assert!(!Support::Absent.is_supported());
    }
}
