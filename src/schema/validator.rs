use super::records::{BundleStats, GithubStats, LibraryRecord, NpmStats, RawRecord};
use super::support::{NoteKind, Support, SupportKey, SupportMap};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use url::Url;

/// Pattern a `githubRepo` value must match: `owner/repo`, neither part made of dots only.
pub const GITHUB_REPO_PATTERN: &str = r"^[A-Za-z0-9_.-]*[A-Za-z0-9_-][A-Za-z0-9_.-]*/[A-Za-z0-9_.-]*[A-Za-z0-9_-][A-Za-z0-9_.-]*$";

static GITHUB_REPO_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(GITHUB_REPO_PATTERN).expect("invalid regex"));

const RAW_KEYS: &[&str] = &[
    "title",
    "description",
    "homeUrl",
    "demoUrl",
    "githubRepo",
    "npmPackage",
    "ignoreBundlephobia",
    "license",
    "revenueModel",
    "frameworks",
    "features",
];

const LIBRARY_KEYS: &[&str] = &["id", "github", "npm", "bundlephobia"];
const GITHUB_KEYS: &[&str] = &["url", "stars", "forks", "openIssues", "watchers", "subscribers", "network", "contributors"];
const NPM_KEYS: &[&str] = &["url", "downloads"];
const BUNDLEPHOBIA_KEYS: &[&str] = &["url", "rawSize", "gzipSize"];

/// The constraint a value failed to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Constraint {
    #[error("must be a mapping")]
    NotAMapping,

    #[error("is required")]
    Missing,

    #[error("must not be empty")]
    Empty,

    #[error("must be {expected}")]
    WrongType { expected: &'static str },

    #[error("must match the pattern `{pattern}`")]
    PatternMismatch { pattern: &'static str },

    #[error("must be an http or https URL")]
    InvalidUrl,

    #[error("is not a known key (expected one of: {allowed})")]
    UnknownKey { allowed: String },

    #[error("is only allowed when {requires}")]
    Unexpected { requires: &'static str },
}

/// A source document or record that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record '{origin}': {field} {constraint}")]
pub struct ValidationError {
    origin: String,
    field: String,
    constraint: Constraint,
}

impl ValidationError {
    #[must_use]
    pub fn new(origin: impl Into<String>, field: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            origin: origin.into(),
            field: field.into(),
            constraint,
        }
    }

    /// The file or record the invalid value came from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Dotted path of the offending field, `document` for the whole document.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub const fn constraint(&self) -> &Constraint {
        &self.constraint
    }
}

/// Validate a parsed source document into a [`RawRecord`].
///
/// `origin` identifies the document in error messages, usually its file path.
pub fn validate_raw_record(origin: &str, value: &Value) -> Result<RawRecord, ValidationError> {
    let object = Object::new(origin, "", value, &[RAW_KEYS])?;
    raw_fields(&object)
}

/// Validate a record together with its optional statistics blocks into a [`LibraryRecord`].
pub fn validate_library_record(origin: &str, value: &Value) -> Result<LibraryRecord, ValidationError> {
    let object = Object::new(origin, "", value, &[RAW_KEYS, LIBRARY_KEYS])?;
    let id = object.required_string("id")?;
    let record = raw_fields(&object)?;

    let github = object
        .optional_object("github", GITHUB_KEYS)?
        .map(|o| {
            Ok::<_, ValidationError>(GithubStats {
                url: o.required_url("url")?,
                stars: o.required_count("stars")?,
                forks: o.required_count("forks")?,
                open_issues: o.required_count("openIssues")?,
                watchers: o.required_count("watchers")?,
                subscribers: o.required_count("subscribers")?,
                network: o.required_count("network")?,
                contributors: o.required_count("contributors")?,
            })
        })
        .transpose()?;

    let npm = object
        .optional_object("npm", NPM_KEYS)?
        .map(|o| {
            Ok::<_, ValidationError>(NpmStats {
                url: o.required_url("url")?,
                downloads: o.required_count("downloads")?,
            })
        })
        .transpose()?;

    let bundlephobia = object
        .optional_object("bundlephobia", BUNDLEPHOBIA_KEYS)?
        .map(|o| {
            Ok::<_, ValidationError>(BundleStats {
                url: o.required_url("url")?,
                raw_size: o.required_count("rawSize")?,
                gzip_size: o.required_count("gzipSize")?,
            })
        })
        .transpose()?;

    if github.is_some() && record.github_repo.is_none() {
        return Err(object.error("github", Constraint::Unexpected { requires: "githubRepo is set" }));
    }

    if npm.is_some() && record.npm_package.is_none() {
        return Err(object.error("npm", Constraint::Unexpected { requires: "npmPackage is set" }));
    }

    if bundlephobia.is_some() && record.bundle_size_package().is_none() {
        return Err(object.error(
            "bundlephobia",
            Constraint::Unexpected {
                requires: "npmPackage is set and ignoreBundlephobia is not true",
            },
        ));
    }

    Ok(LibraryRecord {
        id,
        record,
        github,
        npm,
        bundlephobia,
    })
}

fn raw_fields(object: &Object<'_>) -> Result<RawRecord, ValidationError> {
    Ok(RawRecord {
        title: object.required_string("title")?,
        description: object.required_string("description")?,
        home_url: object.optional_url("homeUrl")?,
        demo_url: object.optional_url("demoUrl")?,
        github_repo: object.optional_github_repo("githubRepo")?,
        npm_package: object.optional_string("npmPackage")?,
        ignore_bundlephobia: object.optional_bool("ignoreBundlephobia")?,
        license: object.optional_string("license")?,
        revenue_model: object.optional_string("revenueModel")?,
        frameworks: object.support_map()?,
        features: object.support_map()?,
    })
}

fn is_web_url(s: &str) -> bool {
    Url::parse(s).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

/// A mapping under validation, with the path prefix used in error messages.
struct Object<'a> {
    origin: &'a str,
    prefix: String,
    map: &'a Map<String, Value>,
}

impl<'a> Object<'a> {
    fn new(origin: &'a str, prefix: &str, value: &'a Value, allowed: &[&[&str]]) -> Result<Self, ValidationError> {
        let Value::Object(map) = value else {
            let field = if prefix.is_empty() { "document" } else { prefix.trim_end_matches('.') };
            return Err(ValidationError::new(origin, field, Constraint::NotAMapping));
        };

        let object = Self {
            origin,
            prefix: prefix.to_string(),
            map,
        };

        for key in map.keys() {
            if !allowed.iter().any(|keys| keys.contains(&key.as_str())) {
                let allowed = allowed.iter().flat_map(|keys| keys.iter().copied()).collect::<Vec<_>>().join(", ");
                return Err(object.error(key, Constraint::UnknownKey { allowed }));
            }
        }

        Ok(object)
    }

    fn error(&self, key: &str, constraint: Constraint) -> ValidationError {
        ValidationError::new(self.origin, format!("{}{key}", self.prefix), constraint)
    }

    /// The value under `key`, treating an explicit `null` as absent.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.error(key, Constraint::WrongType { expected: "a string" })),
        }
    }

    fn required_string(&self, key: &str) -> Result<String, ValidationError> {
        let s = self.optional_string(key)?.ok_or_else(|| self.error(key, Constraint::Missing))?;
        if s.trim().is_empty() {
            return Err(self.error(key, Constraint::Empty));
        }
        Ok(s)
    }

    fn optional_url(&self, key: &str) -> Result<Option<String>, ValidationError> {
        let url = self.optional_string(key)?;
        if let Some(url) = &url
            && !is_web_url(url)
        {
            return Err(self.error(key, Constraint::InvalidUrl));
        }
        Ok(url)
    }

    fn required_url(&self, key: &str) -> Result<String, ValidationError> {
        self.optional_url(key)?.ok_or_else(|| self.error(key, Constraint::Missing))
    }

    fn optional_github_repo(&self, key: &str) -> Result<Option<String>, ValidationError> {
        let repo = self.optional_string(key)?;
        if let Some(repo) = &repo
            && !GITHUB_REPO_REGEX.is_match(repo)
        {
            return Err(self.error(
                key,
                Constraint::PatternMismatch {
                    pattern: GITHUB_REPO_PATTERN,
                },
            ));
        }
        Ok(repo)
    }

    fn optional_bool(&self, key: &str) -> Result<Option<bool>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.error(key, Constraint::WrongType { expected: "a boolean" })),
        }
    }

    fn required_count(&self, key: &str) -> Result<u64, ValidationError> {
        match self.get(key) {
            None => Err(self.error(key, Constraint::Missing)),
            Some(v) => v.as_u64().ok_or_else(|| {
                self.error(
                    key,
                    Constraint::WrongType {
                        expected: "a non-negative integer",
                    },
                )
            }),
        }
    }

    fn optional_object(&self, key: &str, allowed: &[&str]) -> Result<Option<Object<'a>>, ValidationError> {
        self.get(key)
            .map(|value| Object::new(self.origin, &format!("{}{key}.", self.prefix), value, &[allowed]))
            .transpose()
    }

    fn support_map<K: SupportKey>(&self) -> Result<SupportMap<K>, ValidationError> {
        let mut support_map = SupportMap::new();
        let Some(value) = self.get(K::FIELD) else {
            return Ok(support_map);
        };

        let Value::Object(entries) = value else {
            return Err(self.error(K::FIELD, Constraint::NotAMapping));
        };

        for (name, entry) in entries {
            let field = format!("{}.{name}", K::FIELD);
            let Ok(key) = name.parse::<K>() else {
                return Err(self.error(&field, Constraint::UnknownKey { allowed: K::known_names() }));
            };

            let support = match entry {
                Value::Null => Support::Absent,
                Value::Bool(flag) => Support::Flag(*flag),
                Value::String(note) => match K::NOTE_KIND {
                    NoteKind::Url if !is_web_url(note) => return Err(self.error(&field, Constraint::InvalidUrl)),
                    _ => Support::Note(note.clone()),
                },
                _ => {
                    let expected = match K::NOTE_KIND {
                        NoteKind::Url => "a boolean or a URL",
                        NoteKind::Text => "a boolean or a string",
                    };
                    return Err(self.error(&field, Constraint::WrongType { expected }));
                }
            };

            support_map.insert(key, support);
        }

        Ok(support_map)
    }
}
