use super::{Enricher, LOG_TARGET, bundle_size_key, decode};
use crate::facts::{CacheGateway, Fetcher};
use crate::schema::BundleStats;
use crate::{AggregateError, EnrichmentSource};
use serde::Deserialize;

/// Body of Bundlephobia's size endpoint, sizes in bytes.
#[derive(Debug, Deserialize)]
struct SizeResponse {
    size: u64,
    gzip: u64,
}

impl<C: CacheGateway, F: Fetcher> Enricher<C, F> {
    /// Bundle sizes for `package`, or `None` when the record opts out or names no package.
    ///
    /// Some packages break Bundlephobia's build step. Those fail the record like any
    /// other fetch error, and the record has to set `ignoreBundlephobia`.
    pub(super) async fn bundle_stats(&self, id: &str, package: Option<&str>) -> Result<Option<BundleStats>, AggregateError> {
        let Some(package) = package else {
            return Ok(None);
        };

        let stats = self
            .cached(&bundle_size_key(package), || async move {
                let url = format!("{}/api/size?package={package}", self.endpoints.bundlephobia_api);
                log::info!(target: LOG_TARGET, "Fetching bundle size statistics for package '{package}'");

                let response = self.fetch(id, EnrichmentSource::BundleSize, &url).await?;
                let body: SizeResponse = decode(id, EnrichmentSource::BundleSize, &url, response)?;

                Ok::<_, AggregateError>(BundleStats {
                    url: format!("https://bundlephobia.com/package/{package}"),
                    raw_size: body.size,
                    gzip_size: body.gzip,
                })
            })
            .await?;

        Ok(Some(stats))
    }
}
