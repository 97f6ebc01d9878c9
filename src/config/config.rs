use crate::Result;
use crate::enrich::{DEFAULT_BUNDLEPHOBIA_API, DEFAULT_GITHUB_API, DEFAULT_NPM_API, Endpoints};
use crate::pipeline::FailurePolicy;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// Commented default configuration, as written by `init`.
pub const DEFAULT_CONFIG_YAML: &str = include_str!("../../default_config.yml");

/// File names searched for, in order, when no configuration path is given.
pub const CONFIG_FILE_CANDIDATES: &[&str] = &["aggregate.toml", "aggregate.yml", "aggregate.yaml", "aggregate.json"];

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the source documents.
    #[serde(default = "default_data_dir")]
    pub data_dir: Utf8PathBuf,

    /// Cache lifetime in days.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_github_api")]
    pub github_api: String,

    #[serde(default = "default_npm_api")]
    pub npm_api: String,

    #[serde(default = "default_bundlephobia_api")]
    pub bundlephobia_api: String,
}

fn default_data_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("data")
}

const fn default_cache_ttl() -> u64 {
    1
}

const fn default_max_concurrent_requests() -> usize {
    5
}

const fn default_min_request_interval_ms() -> u64 {
    100
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.to_string()
}

fn default_npm_api() -> String {
    DEFAULT_NPM_API.to_string()
}

fn default_bundlephobia_api() -> String {
    DEFAULT_BUNDLEPHOBIA_API.to_string()
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, the first of [`CONFIG_FILE_CANDIDATES`] found in
    /// `base_dir` is used. Returns the configuration and any validation warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<(Self, Vec<String>)> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration from {path}"))?;
            (path.clone(), text)
        } else {
            let mut found = None;
            for name in CONFIG_FILE_CANDIDATES {
                let path = base_dir.join(name);
                match fs::read_to_string(&path) {
                    Ok(text) => {
                        found = Some((path, text));
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration from {path}")),
                }
            }

            let Some(result) = found else {
                return Ok((Self::default(), Vec::new()));
            };
            result
        };

        let config = Self::parse(&final_path, &text)?;

        let mut warnings = Vec::new();
        config.validate(&mut warnings);
        Ok((config, warnings))
    }

    /// Parse configuration text, choosing the format from the path's extension.
    fn parse(path: &Utf8Path, text: &str) -> Result<Self> {
        let extension = path.extension().unwrap_or_default();
        let config: Self = match extension {
            "toml" => toml::from_str(text).into_app_err_with(|| format!("parsing TOML configuration from {path}"))?,
            "yml" | "yaml" => serde_yaml::from_str(text).into_app_err_with(|| format!("parsing YAML configuration from {path}"))?,
            "json" => serde_json::from_str(text).into_app_err_with(|| format!("parsing JSON configuration from {path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails
    pub fn save(&self, output_path: &Utf8Path) -> Result<()> {
        let extension = output_path.extension().unwrap_or_default();
        let text = match extension {
            "toml" => toml::to_string_pretty(self)
                .into_app_err_with(|| format!("serializing configuration to TOML for saving to {output_path}"))?,
            "yml" | "yaml" => serde_yaml::to_string(self)
                .into_app_err_with(|| format!("serializing configuration to YAML for saving to {output_path}"))?,
            "json" => serde_json::to_string_pretty(self)
                .into_app_err_with(|| format!("serializing configuration to JSON for saving to {output_path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };

        fs::write(output_path, text).into_app_err_with(|| format!("writing configuration to {output_path}"))?;
        Ok(())
    }

    /// Save the default configuration, keeping its comments when writing YAML
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default_with_comments(output_path: &Utf8Path) -> Result<()> {
        let extension = output_path.extension().unwrap_or_default();

        if matches!(extension, "yml" | "yaml") {
            fs::write(output_path, DEFAULT_CONFIG_YAML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
            Ok(())
        } else {
            Self::default().save(output_path)
        }
    }

    #[must_use]
    pub const fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl.saturating_mul(SECONDS_PER_DAY))
    }

    #[must_use]
    pub const fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            github_api: self.github_api.trim_end_matches('/').to_string(),
            npm_api: self.npm_api.trim_end_matches('/').to_string(),
            bundlephobia_api: self.bundlephobia_api.trim_end_matches('/').to_string(),
        }
    }

    /// Detect settings that are legal but almost certainly not what was meant
    fn validate(&self, warnings: &mut Vec<String>) {
        if self.max_concurrent_requests == 0 {
            warnings.push("max_concurrent_requests is 0; requests will be made one at a time".to_string());
        }

        if self.cache_ttl == 0 {
            warnings.push("cache_ttl is 0; every cached entry is treated as expired".to_string());
        }

        for (name, endpoint) in [
            ("github_api", &self.github_api),
            ("npm_api", &self.npm_api),
            ("bundlephobia_api", &self.bundlephobia_api),
        ] {
            let is_http = url::Url::parse(endpoint).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !is_http {
                warnings.push(format!("{name} '{endpoint}' is not an http or https URL"));
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_ttl: default_cache_ttl(),
            max_concurrent_requests: default_max_concurrent_requests(),
            min_request_interval_ms: default_min_request_interval_ms(),
            failure_policy: FailurePolicy::default(),
            github_api: default_github_api(),
            npm_api: default_npm_api(),
            bundlephobia_api: default_bundlephobia_api(),
        }
    }
}
