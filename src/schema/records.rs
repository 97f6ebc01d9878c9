use super::keys::{Feature, Framework};
use super::support::SupportMap;
use serde::{Deserialize, Serialize};

/// A library as declared by its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub title: String,
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_url: Option<String>,

    /// Repository on GitHub as `owner/repo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub npm_package: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_bundlephobia: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_model: Option<String>,

    pub frameworks: SupportMap<Framework>,
    pub features: SupportMap<Feature>,
}

impl RawRecord {
    /// A record with only the required fields set.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            home_url: None,
            demo_url: None,
            github_repo: None,
            npm_package: None,
            ignore_bundlephobia: None,
            license: None,
            revenue_model: None,
            frameworks: SupportMap::new(),
            features: SupportMap::new(),
        }
    }

    /// The npm package whose bundle size should be measured, if any.
    #[must_use]
    pub fn bundle_size_package(&self) -> Option<&str> {
        if self.ignore_bundlephobia == Some(true) {
            return None;
        }
        self.npm_package.as_deref()
    }
}

/// Repository statistics from GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubStats {
    pub url: String,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub watchers: u64,
    pub subscribers: u64,
    pub network: u64,

    /// Estimated from the contributors listing, see the repository enrichment.
    pub contributors: u64,
}

/// Weekly download statistics from the npm registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpmStats {
    pub url: String,
    pub downloads: u64,
}

/// Bundle size as measured by Bundlephobia, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStats {
    pub url: String,
    pub raw_size: u64,
    pub gzip_size: u64,
}

/// A validated record plus whatever statistics enrichment produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryRecord {
    /// Derived from the source file name; unique across a collection.
    pub id: String,

    #[serde(flatten)]
    pub record: RawRecord,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundlephobia: Option<BundleStats>,
}

impl LibraryRecord {
    /// A record with no statistics attached yet.
    #[must_use]
    pub fn new(id: impl Into<String>, record: RawRecord) -> Self {
        Self {
            id: id.into(),
            record,
            github: None,
            npm: None,
            bundlephobia: None,
        }
    }
}
