use super::common::{Common, CommonArgs};
use camino::Utf8PathBuf;
use chrono::Utc;
use clap::Parser;
use directories::BaseDirs;
use library_aggregator::Result;
use library_aggregator::enrich::{Endpoints, Enricher};
use library_aggregator::facts::{CacheGateway, FileCache, HttpFetcher, MemoryCache, Throttler};
use library_aggregator::pipeline::{FailurePolicy, Pipeline};
use library_aggregator::schema::LibraryRecord;
use ohno::IntoAppError;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Parser, Debug)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN")]
    pub github_token: Option<String>,

    /// Directory where fetched statistics are cached [default: the platform cache directory]
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Keep fetched statistics in memory only, for this run
    #[arg(long, conflicts_with_all = ["cache_dir", "ignore_cache"])]
    pub no_cache: bool,

    /// Refetch everything, but still refresh the cache
    #[arg(long)]
    pub ignore_cache: bool,

    /// Process every record and report all failures, instead of stopping at the first
    #[arg(long)]
    pub collect_errors: bool,

    /// Write the records to this file instead of to standard output
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,
}

pub async fn process_aggregate(args: &AggregateArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let config = &common.config;

    let policy = if args.collect_errors {
        FailurePolicy::CollectErrors
    } else {
        config.failure_policy
    };

    let endpoints = config.endpoints();
    let throttler = Throttler::new(config.max_concurrent_requests, config.min_request_interval());
    let fetcher = HttpFetcher::new(throttler, &endpoints.github_api, args.github_token.as_deref())?;

    let records = if args.no_cache {
        run(MemoryCache::new(), fetcher, endpoints, policy, common.data_dir.as_std_path()).await?
    } else {
        let cache_dir = if let Some(cache_path) = &args.cache_dir {
            cache_path.as_std_path().to_path_buf()
        } else {
            BaseDirs::new()
                .into_app_err("Failed to determine cache directory")?
                .cache_dir()
                .join("library-aggregator")
        };

        let cache = FileCache::new(cache_dir, config.cache_ttl_duration(), Utc::now(), args.ignore_cache);
        run(cache, fetcher, endpoints, policy, common.data_dir.as_std_path()).await?
    };

    write_records(records, args.output.as_ref())
}

async fn run<C: CacheGateway>(
    cache: C,
    fetcher: HttpFetcher,
    endpoints: Endpoints,
    policy: FailurePolicy,
    data_dir: &Path,
) -> Result<Vec<LibraryRecord>> {
    let pipeline = Pipeline::new(Enricher::new(cache, fetcher, endpoints), policy);
    Ok(pipeline.run(data_dir).await?)
}

/// Write the records as pretty JSON, sorted by id so that unchanged inputs give identical output.
fn write_records(mut records: Vec<LibraryRecord>, output: Option<&Utf8PathBuf>) -> Result<()> {
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut json = serde_json::to_string_pretty(&records).into_app_err("serializing library records")?;
    json.push('\n');

    if let Some(path) = output {
        fs::write(path, json).into_app_err_with(|| format!("writing library records to {path}"))?;
        eprintln!("Wrote {} library record(s) to {path}", records.len());
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(json.as_bytes()).into_app_err("writing library records to standard output")?;
        stdout.flush().into_app_err("writing library records to standard output")?;
    }

    Ok(())
}
