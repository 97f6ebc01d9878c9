use super::{Enricher, LOG_TARGET, contributors_key, decode, fetch_error, repository_info_key};
use crate::facts::{CacheGateway, Fetcher};
use crate::schema::GithubStats;
use crate::{AggregateError, EnrichmentSource, FetchError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static PAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"page=(\d+)>; rel=.last.").expect("invalid regex"));

/// Number of contributors requested per page.
pub const CONTRIBUTORS_PAGE_SIZE: u64 = 100;

/// The fields we use from GitHub's repository endpoint.
#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    full_name: String,
    html_url: String,
    stargazers_count: u64,
    forks_count: u64,
    open_issues_count: u64,
    watchers_count: u64,
    subscribers_count: u64,
    network_count: u64,
}

/// Repository metadata, as cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryInfo {
    url: String,
    stars: u64,
    forks: u64,
    open_issues: u64,
    watchers: u64,
    subscribers: u64,
    network: u64,
}

/// Extract the `rel="last"` page number from a `Link` header.
#[must_use]
pub fn last_page(link: &str) -> Option<u64> {
    PAGE_REGEX.captures(link)?.get(1)?.as_str().parse().ok()
}

/// Estimate the total number of contributors from the last page of the listing.
///
/// Every page before the last is assumed to be full. GitHub caps the listing, so
/// this is an approximation and not an exact count.
#[must_use]
pub const fn estimate_contributors(last_page: u64, entries_on_last_page: u64) -> u64 {
    CONTRIBUTORS_PAGE_SIZE
        .saturating_mul(last_page.saturating_sub(1))
        .saturating_add(entries_on_last_page)
}

impl<C: CacheGateway, F: Fetcher> Enricher<C, F> {
    /// GitHub statistics for `repo`, or `None` when the record names no repository.
    pub(super) async fn repository_stats(&self, id: &str, repo: Option<&str>) -> Result<Option<GithubStats>, AggregateError> {
        let Some(repo) = repo else {
            return Ok(None);
        };

        let (info, contributors) = tokio::try_join!(self.repository_info(id, repo), self.contributor_count(id, repo))?;

        Ok(Some(GithubStats {
            url: info.url,
            stars: info.stars,
            forks: info.forks,
            open_issues: info.open_issues,
            watchers: info.watchers,
            subscribers: info.subscribers,
            network: info.network,
            contributors,
        }))
    }

    /// Repository metadata, failing when GitHub knows the repository under another name.
    async fn repository_info(&self, id: &str, repo: &str) -> Result<RepositoryInfo, AggregateError> {
        self.cached(&repository_info_key(repo), || async move {
            let url = format!("{}/repos/{repo}", self.endpoints.github_api);
            log::info!(target: LOG_TARGET, "Fetching repository statistics for '{repo}'");

            let response = self.fetch(id, EnrichmentSource::Repository, &url).await?;
            let body: RepositoryResponse = decode(id, EnrichmentSource::Repository, &url, response)?;

            // Redirects after a rename or transfer are not followed silently
            if body.full_name != repo {
                log::debug!(target: LOG_TARGET, "Repository '{repo}' of record '{id}' has moved to '{}'", body.full_name);
                return Err(AggregateError::IdentityMismatch {
                    record: id.to_string(),
                    source_kind: EnrichmentSource::Repository,
                    declared: repo.to_string(),
                    actual: body.full_name,
                });
            }

            Ok(RepositoryInfo {
                url: body.html_url,
                stars: body.stargazers_count,
                forks: body.forks_count,
                open_issues: body.open_issues_count,
                watchers: body.watchers_count,
                subscribers: body.subscribers_count,
                network: body.network_count,
            })
        })
        .await
    }

    /// Estimated contributor count, needing at most two requests.
    async fn contributor_count(&self, id: &str, repo: &str) -> Result<u64, AggregateError> {
        self.cached(&contributors_key(repo), || async move {
            let url = format!(
                "{}/repos/{repo}/contributors?per_page={CONTRIBUTORS_PAGE_SIZE}",
                self.endpoints.github_api
            );
            log::info!(target: LOG_TARGET, "Fetching contributors for '{repo}'");

            let first = self.fetch(id, EnrichmentSource::Repository, &url).await?;
            let on_first_page = count_entries(id, &url, first.data())?;

            if on_first_page < CONTRIBUTORS_PAGE_SIZE {
                return Ok(on_first_page);
            }

            let Some(last) = first.link().and_then(last_page).filter(|&last| last > 1) else {
                return Ok(on_first_page);
            };

            let last_url = format!("{url}&page={last}");
            let last_response = self.fetch(id, EnrichmentSource::Repository, &last_url).await?;
            let on_last_page = count_entries(id, &last_url, last_response.data())?;

            log::debug!(target: LOG_TARGET, "Repository '{repo}' has {last} pages of contributors, {on_last_page} on the last");

            Ok::<_, AggregateError>(estimate_contributors(last, on_last_page))
        })
        .await
    }
}

/// Count the entries of a contributors page. An empty repository answers with no body.
fn count_entries(id: &str, url: &str, data: &Value) -> Result<u64, AggregateError> {
    match data {
        Value::Array(entries) => Ok(entries.len() as u64),
        Value::Null => Ok(0),
        _ => Err(fetch_error(
            id,
            EnrichmentSource::Repository,
            FetchError::Shape {
                url: url.to_string(),
                detail: "expected an array of contributors".to_string(),
            },
        )),
    }
}
