//! Gateways to state and services outside the pipeline.
//!
//! Enrichment never touches the network or the disk directly. It goes through a
//! [`CacheGateway`], which remembers previously fetched payloads across runs, and a
//! [`Fetcher`], which performs rate-limited HTTP GETs. Both are injected, so tests can
//! substitute [`MemoryCache`] and scripted fetchers.
//!
//! The production implementations are [`FileCache`], a TTL-aware directory of JSON
//! documents, and [`HttpFetcher`], which funnels every request through one shared
//! [`Throttler`].

mod cache;
mod fetcher;
mod path_utils;
#[cfg(test)]
pub(crate) mod scripted;
mod throttler;

pub use cache::{CacheGateway, FileCache, MemoryCache};
pub use fetcher::{FetchResponse, Fetcher, HttpFetcher};
pub use throttler::Throttler;
