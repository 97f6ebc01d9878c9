//! Path utilities for safe filesystem operations.

use std::path::PathBuf;

/// Sanitize a string for use as a single path component.
///
/// `..` sequences and characters that are unsafe in file names are replaced with `_`,
/// while single dots survive so names like `lib.js` stay readable.
#[must_use]
pub fn sanitize_path_component(s: &str) -> String {
    let s = s.replace("..", "__");
    s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// Map a cache key to a relative file path.
///
/// Each `/`-separated segment of the key becomes a directory level, so keys that only
/// differ in where a slash sits (`a_b/c` vs `a/b_c`) never share a file.
#[must_use]
pub fn cache_key_path(key: &str) -> PathBuf {
    let mut segments: Vec<String> = key.split('/').map(sanitize_path_component).collect();
    if let Some(last) = segments.last_mut() {
        last.push_str(".json");
    }
    segments.into_iter().collect()
}
