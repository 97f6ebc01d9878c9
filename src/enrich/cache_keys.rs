//! Deterministic cache keys, one per source kind and identifier.

#[must_use]
pub fn repository_info_key(repo: &str) -> String {
    format!("gh-{repo}-info")
}

#[must_use]
pub fn contributors_key(repo: &str) -> String {
    format!("gh-{repo}-contributors")
}

#[must_use]
pub fn downloads_key(package: &str) -> String {
    format!("npm-{package}")
}

#[must_use]
pub fn bundle_size_key(package: &str) -> String {
    format!("bundlephobia-{package}")
}
