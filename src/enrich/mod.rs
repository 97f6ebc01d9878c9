//! Per-record enrichment with external statistics.
//!
//! An [`Enricher`] takes a validated [`RawRecord`] and attaches up to three blocks of
//! statistics to it: repository statistics from GitHub, weekly downloads from the npm
//! registry, and bundle sizes from Bundlephobia. Each block is produced by an
//! independent sub-procedure that follows the same steps:
//!
//! 1. Look the block up in the [`CacheGateway`] under a deterministic key.
//! 2. On a miss, fetch it through the [`Fetcher`].
//! 3. Transform the response into the block's shape.
//! 4. Write the transformed block back to the cache.
//! 5. Merge it into the record.
//!
//! The sub-procedures of one record run concurrently. Any failure aborts the record.

mod bundle_size;
mod cache_keys;
mod downloads;
mod repository;

pub use cache_keys::{bundle_size_key, contributors_key, downloads_key, repository_info_key};
pub use repository::{CONTRIBUTORS_PAGE_SIZE, estimate_contributors, last_page};

use crate::facts::{CacheGateway, FetchResponse, Fetcher};
use crate::schema::{LibraryRecord, RawRecord, validate_library_record};
use crate::{AggregateError, EnrichmentSource, FetchError};
use serde::Serialize;
use serde::de::DeserializeOwned;

const LOG_TARGET: &str = "    enrich";

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_NPM_API: &str = "https://api.npmjs.org";
pub const DEFAULT_BUNDLEPHOBIA_API: &str = "https://bundlephobia.com";

/// Base URLs of the external services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub github_api: String,
    pub npm_api: String,
    pub bundlephobia_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: DEFAULT_GITHUB_API.to_string(),
            npm_api: DEFAULT_NPM_API.to_string(),
            bundlephobia_api: DEFAULT_BUNDLEPHOBIA_API.to_string(),
        }
    }
}

impl Endpoints {
    /// All three services served from a single base URL, as with a local mock server.
    #[must_use]
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            github_api: base.to_string(),
            npm_api: base.to_string(),
            bundlephobia_api: base.to_string(),
        }
    }
}

/// Attaches external statistics to records.
#[derive(Debug)]
pub struct Enricher<C, F> {
    cache: C,
    fetcher: F,
    endpoints: Endpoints,
}

impl<C: CacheGateway, F: Fetcher> Enricher<C, F> {
    #[must_use]
    pub const fn new(cache: C, fetcher: F, endpoints: Endpoints) -> Self {
        Self { cache, fetcher, endpoints }
    }

    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Produce the library record for `record`, identified by `id`.
    ///
    /// # Errors
    ///
    /// Fails with the first sub-procedure error, naming the record and the
    /// statistics that could not be obtained, or with a validation error if the
    /// merged record does not have the library record shape.
    pub async fn enrich(&self, id: &str, record: RawRecord) -> Result<LibraryRecord, AggregateError> {
        log::debug!(target: LOG_TARGET, "Enriching record '{id}'");

        let (github, npm, bundlephobia) = tokio::try_join!(
            self.repository_stats(id, record.github_repo.as_deref()),
            self.download_stats(id, record.npm_package.as_deref()),
            self.bundle_stats(id, record.bundle_size_package()),
        )?;

        let mut library = LibraryRecord::new(id, record);
        library.github = github;
        library.npm = npm;
        library.bundlephobia = bundlephobia;

        let value = serde_json::to_value(&library).map_err(|source| AggregateError::Encode {
            record: id.to_string(),
            source,
        })?;

        Ok(validate_library_record(id, &value)?)
    }

    /// Return the cached value under `key`, or load it, cache it, and return it.
    ///
    /// A cached payload that does not decode as `T` is discarded and reloaded.
    /// Nothing is cached when `load` fails.
    async fn cached<T, Fut>(&self, key: &str, load: impl FnOnce() -> Fut) -> Result<T, AggregateError>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, AggregateError>>,
    {
        if let Some(payload) = self.cache.get(key) {
            match serde_json::from_value(payload) {
                Ok(value) => return Ok(value),
                Err(e) => log::warn!(target: LOG_TARGET, "Discarding malformed cache entry '{key}': {e}"),
            }
        }

        let value = load().await?;

        match serde_json::to_value(&value) {
            Ok(payload) => self.cache.set(key, &payload),
            Err(e) => log::warn!(target: LOG_TARGET, "Could not encode cache entry '{key}': {e}"),
        }

        Ok(value)
    }

    /// Fetch `url` on behalf of one sub-procedure of record `id`.
    async fn fetch(&self, id: &str, source_kind: EnrichmentSource, url: &str) -> Result<FetchResponse, AggregateError> {
        self.fetcher.fetch(url).await.map_err(|e| {
            log::debug!(target: LOG_TARGET, "Could not fetch {source_kind} for record '{id}': {e}");
            fetch_error(id, source_kind, e)
        })
    }
}

fn fetch_error(id: &str, source_kind: EnrichmentSource, source: FetchError) -> AggregateError {
    AggregateError::Fetch {
        record: id.to_string(),
        source_kind,
        source,
    }
}

/// Decode a response body into the service's expected shape.
fn decode<T: DeserializeOwned>(id: &str, source_kind: EnrichmentSource, url: &str, response: FetchResponse) -> Result<T, AggregateError> {
    serde_json::from_value(response.into_data()).map_err(|e| {
        fetch_error(
            id,
            source_kind,
            FetchError::Shape {
                url: url.to_string(),
                detail: e.to_string(),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::MemoryCache;
    use crate::facts::scripted::ScriptedFetcher;
    use crate::schema::{BundleStats, GithubStats, NpmStats};
    use serde_json::json;

    const API: &str = "https://mock.test";

    fn enricher(cache: MemoryCache, fetcher: ScriptedFetcher) -> Enricher<MemoryCache, ScriptedFetcher> {
        Enricher::new(cache, fetcher, Endpoints::single_host(API))
    }

    fn full_record() -> RawRecord {
        let mut raw = RawRecord::new("Table", "A table component");
        raw.github_repo = Some("acme/table".into());
        raw.npm_package = Some("acme-table".into());
        raw
    }

    fn repo_response(full_name: &str) -> serde_json::Value {
        json!({
            "full_name": full_name,
            "html_url": format!("https://github.com/{full_name}"),
            "stargazers_count": 1200,
            "forks_count": 80,
            "open_issues_count": 15,
            "watchers_count": 1200,
            "subscribers_count": 40,
            "network_count": 80,
            "description": "ignored",
        })
    }

    fn contributors(n: usize) -> serde_json::Value {
        json!((0..n).map(|i| json!({ "login": format!("user{i}") })).collect::<Vec<_>>())
    }

    fn full_fetcher() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .respond(format!("{API}/repos/acme/table"), repo_response("acme/table"))
            .respond(format!("{API}/repos/acme/table/contributors?per_page=100"), contributors(37))
            .respond(format!("{API}/downloads/point/last-week/acme-table"), json!({ "downloads": 5000, "package": "acme-table" }))
            .respond(format!("{API}/api/size?package=acme-table"), json!({ "size": 30_000, "gzip": 9_000 }))
    }

    #[tokio::test]
    async fn populates_all_blocks() {
        let enricher = enricher(MemoryCache::new(), full_fetcher());

        let library = enricher.enrich("table", full_record()).await.unwrap();

        assert_eq!(library.id, "table");
        assert_eq!(
            library.github,
            Some(GithubStats {
                url: "https://github.com/acme/table".into(),
                stars: 1200,
                forks: 80,
                open_issues: 15,
                watchers: 1200,
                subscribers: 40,
                network: 80,
                contributors: 37,
            })
        );
        assert_eq!(
            library.npm,
            Some(NpmStats {
                url: "https://www.npmjs.com/package/acme-table".into(),
                downloads: 5000,
            })
        );
        assert_eq!(
            library.bundlephobia,
            Some(BundleStats {
                url: "https://bundlephobia.com/package/acme-table".into(),
                raw_size: 30_000,
                gzip_size: 9_000,
            })
        );

        for key in [
            repository_info_key("acme/table"),
            contributors_key("acme/table"),
            downloads_key("acme-table"),
            bundle_size_key("acme-table"),
        ] {
            assert!(enricher.cache().contains(&key), "missing cache entry {key}");
        }
    }

    #[tokio::test]
    async fn record_without_sources_needs_no_fetch() {
        let enricher = enricher(MemoryCache::new(), ScriptedFetcher::new());

        let library = enricher.enrich("plain", RawRecord::new("Plain", "No stats")).await.unwrap();

        assert_eq!(library, LibraryRecord::new("plain", RawRecord::new("Plain", "No stats")));
        assert_eq!(enricher.fetcher().request_count(), 0);
        assert!(enricher.cache().is_empty());
    }

    #[tokio::test]
    async fn warm_cache_means_no_fetch() {
        let warm = enricher(MemoryCache::new(), full_fetcher());
        let expected = warm.enrich("table", full_record()).await.unwrap();

        let entries: Vec<_> = [
            repository_info_key("acme/table"),
            contributors_key("acme/table"),
            downloads_key("acme-table"),
            bundle_size_key("acme-table"),
        ]
        .into_iter()
        .map(|key| {
            let value = warm.cache().get(&key).unwrap();
            (key, value)
        })
        .collect();

        let cold_fetcher = enricher(MemoryCache::with_entries(entries), ScriptedFetcher::new());
        let actual = cold_fetcher.enrich("table", full_record()).await.unwrap();

        assert_eq!(actual, expected);
        assert_eq!(cold_fetcher.fetcher().request_count(), 0);
    }

    #[tokio::test]
    async fn blocks_equal_cached_values() {
        let cache = MemoryCache::with_entries([
            (downloads_key("acme-table"), json!({ "url": "https://www.npmjs.com/package/acme-table", "downloads": 7 })),
            (
                bundle_size_key("acme-table"),
                json!({ "url": "https://bundlephobia.com/package/acme-table", "rawSize": 10, "gzipSize": 3 }),
            ),
        ]);
        let mut raw = RawRecord::new("Table", "A table component");
        raw.npm_package = Some("acme-table".into());

        let enricher = enricher(cache, ScriptedFetcher::new());
        let library = enricher.enrich("table", raw).await.unwrap();

        assert_eq!(library.npm.unwrap().downloads, 7);
        let bundle = library.bundlephobia.unwrap();
        assert_eq!((bundle.raw_size, bundle.gzip_size), (10, 3));
        assert_eq!(enricher.fetcher().request_count(), 0);
    }

    #[tokio::test]
    async fn malformed_cache_entry_is_refetched() {
        let cache = MemoryCache::with_entries([(downloads_key("acme-table"), json!("garbage"))]);
        let fetcher = ScriptedFetcher::new().respond(format!("{API}/downloads/point/last-week/acme-table"), json!({ "downloads": 9 }));
        let mut raw = RawRecord::new("Table", "A table component");
        raw.npm_package = Some("acme-table".into());
        raw.ignore_bundlephobia = Some(true);

        let enricher = enricher(cache, fetcher);
        let library = enricher.enrich("table", raw).await.unwrap();

        assert_eq!(library.npm.unwrap().downloads, 9);
        assert_eq!(
            enricher.cache().get(&downloads_key("acme-table")),
            Some(json!({ "url": "https://www.npmjs.com/package/acme-table", "downloads": 9 }))
        );
    }

    #[tokio::test]
    async fn identity_mismatch_fails_without_caching() {
        let fetcher = ScriptedFetcher::new()
            .respond(format!("{API}/repos/acme/table"), repo_response("newowner/table"))
            .respond(format!("{API}/repos/acme/table/contributors?per_page=100"), contributors(3));
        let mut raw = RawRecord::new("Table", "A table component");
        raw.github_repo = Some("acme/table".into());

        let enricher = enricher(MemoryCache::new(), fetcher);
        let err = enricher.enrich("table", raw).await.unwrap_err();

        match &err {
            AggregateError::IdentityMismatch {
                record,
                source_kind,
                declared,
                actual,
            } => {
                assert_eq!(record, "table");
                assert_eq!(*source_kind, EnrichmentSource::Repository);
                assert_eq!(declared, "acme/table");
                assert_eq!(actual, "newowner/table");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!enricher.cache().contains(&repository_info_key("acme/table")));
    }

    #[tokio::test]
    async fn identity_check_is_case_sensitive() {
        let fetcher = ScriptedFetcher::new()
            .respond(format!("{API}/repos/acme/table"), repo_response("Acme/Table"))
            .respond(format!("{API}/repos/acme/table/contributors?per_page=100"), contributors(3));
        let mut raw = RawRecord::new("Table", "A table component");
        raw.github_repo = Some("acme/table".into());

        let err = enricher(MemoryCache::new(), fetcher).enrich("table", raw).await.unwrap_err();

        assert!(matches!(err, AggregateError::IdentityMismatch { .. }));
    }

    #[tokio::test]
    async fn ignore_bundlephobia_skips_bundle_fetch() {
        let mut raw = full_record();
        raw.ignore_bundlephobia = Some(true);

        let enricher = enricher(MemoryCache::new(), full_fetcher());
        let library = enricher.enrich("table", raw).await.unwrap();

        assert!(library.bundlephobia.is_none());
        assert!(library.npm.is_some());
        assert!(enricher.fetcher().requests().iter().all(|url| !url.contains("/api/size")));
        assert!(!enricher.cache().contains(&bundle_size_key("acme-table")));
    }

    #[tokio::test]
    async fn bundle_failure_is_a_hard_error() {
        let fetcher = ScriptedFetcher::new()
            .respond(format!("{API}/downloads/point/last-week/broken"), json!({ "downloads": 1 }))
            .fail(format!("{API}/api/size?package=broken"), 500);
        let mut raw = RawRecord::new("Broken", "Breaks the bundler");
        raw.npm_package = Some("broken".into());

        let err = enricher(MemoryCache::new(), fetcher).enrich("broken", raw).await.unwrap_err();

        assert_eq!(err.record(), Some("broken"));
        assert_eq!(err.source_kind(), Some(EnrichmentSource::BundleSize));
        assert!(err.to_string().contains("bundle size statistics"));
    }

    #[tokio::test]
    async fn missing_repository_reports_repository_statistics() {
        let mut raw = RawRecord::new("Gone", "Deleted repository");
        raw.github_repo = Some("acme/gone".into());

        let err = enricher(MemoryCache::new(), ScriptedFetcher::new()).enrich("gone", raw).await.unwrap_err();

        assert_eq!(err.record(), Some("gone"));
        assert_eq!(err.source_kind(), Some(EnrichmentSource::Repository));
        assert!(matches!(&err, AggregateError::Fetch { source, .. } if source.status() == Some(404)));
    }

    #[tokio::test]
    async fn unexpected_response_shape_is_a_fetch_error() {
        let fetcher = ScriptedFetcher::new().respond(format!("{API}/downloads/point/last-week/odd"), json!({ "error": "package not found" }));
        let mut raw = RawRecord::new("Odd", "Odd package");
        raw.npm_package = Some("odd".into());
        raw.ignore_bundlephobia = Some(true);

        let err = enricher(MemoryCache::new(), fetcher).enrich("odd", raw).await.unwrap_err();

        assert!(matches!(
            err,
            AggregateError::Fetch {
                source_kind: EnrichmentSource::Downloads,
                source: FetchError::Shape { .. },
                ..
            }
        ));
    }

    #[test]
    fn single_host_trims_trailing_slash() {
        let endpoints = Endpoints::single_host("http://127.0.0.1:8080/");
        assert_eq!(endpoints.github_api, "http://127.0.0.1:8080");
        assert_eq!(endpoints.npm_api, "http://127.0.0.1:8080");
        assert_eq!(endpoints.bundlephobia_api, "http://127.0.0.1:8080");
    }

    #[test]
    fn default_endpoints_are_public_services() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.github_api, DEFAULT_GITHUB_API);
        assert_eq!(endpoints.npm_api, DEFAULT_NPM_API);
        assert_eq!(endpoints.bundlephobia_api, DEFAULT_BUNDLEPHOBIA_API);
    }

    /// Collects log records so tests can assert on levels.
    struct CapturedLogs(std::sync::Mutex<Vec<(log::Level, String)>>);

    impl log::Log for CapturedLogs {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            let mut records = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            records.push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static CAPTURED: CapturedLogs = CapturedLogs(std::sync::Mutex::new(Vec::new()));

    #[tokio::test]
    async fn fetch_failures_are_left_to_the_caller_to_report() {
        let _ = log::set_logger(&CAPTURED);
        log::set_max_level(log::LevelFilter::Trace);
        let mut raw = RawRecord::new("Quiet", "Fails quietly");
        raw.npm_package = Some("quiet-missing".into());
        raw.ignore_bundlephobia = Some(true);

        let _ = enricher(MemoryCache::new(), ScriptedFetcher::new())
            .enrich("quiet-record", raw)
            .await
            .unwrap_err();

        let records = CAPTURED.0.lock().unwrap();
        let mine: Vec<_> = records.iter().filter(|(_, msg)| msg.contains("quiet-record")).collect();
        assert!(!mine.is_empty());
        assert!(mine.iter().all(|(level, _)| *level > log::Level::Warn), "{mine:?}");
    }
}
