use super::{Enricher, LOG_TARGET, decode, downloads_key};
use crate::facts::{CacheGateway, Fetcher};
use crate::schema::NpmStats;
use crate::{AggregateError, EnrichmentSource};
use serde::Deserialize;

/// Body of the npm registry's point download statistics.
#[derive(Debug, Deserialize)]
struct DownloadsResponse {
    downloads: u64,
}

impl<C: CacheGateway, F: Fetcher> Enricher<C, F> {
    /// Last-week downloads for `package`, or `None` when the record names no package.
    pub(super) async fn download_stats(&self, id: &str, package: Option<&str>) -> Result<Option<NpmStats>, AggregateError> {
        let Some(package) = package else {
            return Ok(None);
        };

        let stats = self
            .cached(&downloads_key(package), || async move {
                let url = format!("{}/downloads/point/last-week/{package}", self.endpoints.npm_api);
                log::info!(target: LOG_TARGET, "Fetching download statistics for package '{package}'");

                let response = self.fetch(id, EnrichmentSource::Downloads, &url).await?;
                let body: DownloadsResponse = decode(id, EnrichmentSource::Downloads, &url, response)?;

                Ok::<_, AggregateError>(NpmStats {
                    url: format!("https://www.npmjs.com/package/{package}"),
                    downloads: body.downloads,
                })
            })
            .await?;

        Ok(Some(stats))
    }
}
