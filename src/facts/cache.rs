//! Key/value stores for previously fetched external payloads.
//!
//! [`FileCache`] wraps a cache directory, TTL, and timestamp so that callers
//! don't need to thread those values through every lookup.

use super::path_utils::cache_key_path;
use crate::Result;
use chrono::{DateTime, Utc};
use core::time::Duration;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const LOG_TARGET: &str = "     cache";

/// A store mapping cache keys to already-decoded payloads.
///
/// Implementations are shared by many concurrent enrichment tasks. There is no
/// locking discipline across a `get`/`set` pair: two tasks missing on the same key
/// both fetch and both write, which is harmless because a key always maps to the
/// same payload.
pub trait CacheGateway: Send + Sync {
    /// Look up a payload; `None` on a miss.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a payload. Failures to persist are logged, not reported.
    fn set(&self, key: &str, payload: &Value);
}

impl<T: CacheGateway + ?Sized> CacheGateway for Arc<T> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &str, payload: &Value) {
        (**self).set(key, payload);
    }
}

impl<T: CacheGateway + ?Sized> CacheGateway for &T {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &str, payload: &Value) {
        (**self).set(key, payload);
    }
}

/// On-disk representation of a cache entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct Envelope<T> {
    timestamp: DateTime<Utc>,
    payload: T,
}

/// A TTL-aware, directory-backed JSON cache.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
    now: DateTime<Utc>,
    ignore: bool,
}

impl FileCache {
    /// Create a new cache.
    ///
    /// With `ignore_cache` set every lookup misses, but fresh payloads are still
    /// written so the next run can use them.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, cache_ttl: Duration, now: DateTime<Utc>, ignore_cache: bool) -> Self {
        Self {
            dir: cache_dir.into(),
            ttl: cache_ttl,
            now,
            ignore: ignore_cache,
        }
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the timestamp used by this cache.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Write an envelope to disk.
    fn write_envelope(&self, key: &str, envelope: &Envelope<&Value>) -> Result<()> {
        let path = self.dir.join(cache_key_path(key));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;
        }

        let file = File::create(&path).into_app_err_with(|| format!("creating cache file '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);

        #[cfg(debug_assertions)]
        let result = serde_json::to_writer_pretty(&mut writer, envelope);
        #[cfg(not(debug_assertions))]
        let result = serde_json::to_writer(&mut writer, envelope);

        result.into_app_err_with(|| format!("writing cache file '{}'", path.display()))?;
        writer
            .flush()
            .into_app_err_with(|| format!("flushing cache file '{}'", path.display()))?;
        Ok(())
    }
}

impl CacheGateway for FileCache {
    fn get(&self, key: &str) -> Option<Value> {
        if self.ignore {
            return None;
        }

        let path = self.dir.join(cache_key_path(key));

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Cache miss for {key}: {e:#}");
                return None;
            }
        };

        let reader = BufReader::new(file);
        let envelope: Envelope<Value> = match serde_json::from_reader(reader) {
            Ok(data) => data,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Cache miss for {key}: {e:#}");
                return None;
            }
        };

        // Future timestamps mean clock skew; treat them as fresh
        let age = self.now.signed_duration_since(envelope.timestamp);
        if age.num_seconds() < 0 {
            log::debug!(target: LOG_TARGET, "Cache timestamp is in the future for {key} (clock skew detected), treating as fresh");
        } else {
            let age_duration = age.to_std().unwrap_or(Duration::MAX);

            if age_duration >= self.ttl {
                log::debug!(
                    target: LOG_TARGET,
                    "Cache expired for {key} (age: {:.1} hours, TTL: {:.1} hours)",
                    age_duration.as_secs_f64() / 3600.0,
                    self.ttl.as_secs_f64() / 3600.0
                );
                return None;
            }

            log::debug!(target: LOG_TARGET, "Cache hit for {key} (age: {:.1} hours)", age_duration.as_secs_f64() / 3600.0);
        }

        Some(envelope.payload)
    }

    fn set(&self, key: &str, payload: &Value) {
        let envelope = Envelope {
            timestamp: self.now,
            payload,
        };

        if let Err(e) = self.write_envelope(key, &envelope) {
            log::warn!(target: LOG_TARGET, "Could not save cache entry for {key}: {e:#}");
        }
    }
}

/// An in-memory cache, for tests and for runs that must not touch the disk.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache pre-populated with the given entries.
    #[must_use]
    pub fn with_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheGateway for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let value = self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned();
        log::debug!(target: LOG_TARGET, "Cache {} for {key}", if value.is_some() { "hit" } else { "miss" });
        value
    }

    fn set(&self, key: &str, payload: &Value) {
        let _ = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), payload.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_cache(dir: &Path, ttl_secs: u64) -> FileCache {
        FileCache::new(dir, Duration::from_secs(ttl_secs), Utc::now(), false)
    }

    fn write_raw_envelope(path: &Path, timestamp: DateTime<Utc>, payload: Value) {
        let envelope = Envelope { timestamp, payload };
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        serde_json::to_writer(file, &envelope).unwrap();
    }

    #[test]
    fn set_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = make_cache(tmp.path(), 3600);

        let payload = json!({ "url": "https://www.npmjs.com/package/lib", "downloads": 42 });
        cache.set("npm-lib", &payload);

        assert_eq!(cache.get("npm-lib"), Some(payload));
    }

    #[test]
    fn keys_with_slashes_become_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = make_cache(tmp.path(), 3600);

        cache.set("gh-owner/repo-contributors", &json!(12));

        assert!(tmp.path().join("gh-owner").join("repo-contributors.json").exists());
        assert_eq!(cache.get("gh-owner/repo-contributors"), Some(json!(12)));
    }

    #[test]
    fn get_nonexistent_key() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = make_cache(tmp.path(), 3600);

        assert_eq!(cache.get("npm-nope"), None);
    }

    #[test]
    fn get_invalid_json() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("npm-bad.json"), "not valid json").unwrap();
        let cache = make_cache(tmp.path(), 3600);

        assert_eq!(cache.get("npm-bad"), None);
    }

    #[test]
    fn get_expired_entry() {
        let tmp = tempfile::tempdir().unwrap();
        write_raw_envelope(&tmp.path().join("npm-old.json"), Utc::now() - chrono::Duration::hours(2), json!(1));

        let cache = make_cache(tmp.path(), 3600);
        assert_eq!(cache.get("npm-old"), None);
    }

    #[test]
    fn future_timestamp_treated_as_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        write_raw_envelope(&tmp.path().join("npm-future.json"), Utc::now() + chrono::Duration::hours(1), json!("future"));

        let cache = make_cache(tmp.path(), 3600);
        assert_eq!(cache.get("npm-future"), Some(json!("future")));
    }

    #[test]
    fn exactly_at_ttl_boundary_is_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let now = Utc::now();
        write_raw_envelope(&tmp.path().join("npm-boundary.json"), now - chrono::Duration::seconds(3600), json!(1));

        let cache = FileCache::new(tmp.path(), Duration::from_secs(3600), now, false);
        assert_eq!(cache.get("npm-boundary"), None);
    }

    #[test]
    fn ignore_cache_misses_but_still_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let ignoring = FileCache::new(tmp.path(), Duration::from_secs(3600), Utc::now(), true);

        ignoring.set("npm-lib", &json!(7));
        assert_eq!(ignoring.get("npm-lib"), None);
        assert_eq!(make_cache(tmp.path(), 3600).get("npm-lib"), Some(json!(7)));
    }

    #[test]
    fn set_overwrites_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = make_cache(tmp.path(), 3600);

        cache.set("npm-lib", &json!(1));
        cache.set("npm-lib", &json!(2));

        assert_eq!(cache.get("npm-lib"), Some(json!(2)));
    }

    #[test]
    fn set_into_unwritable_dir_does_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let file_in_the_way = tmp.path().join("blocker");
        fs::write(&file_in_the_way, "x").unwrap();

        let cache = make_cache(&file_in_the_way, 3600);
        cache.set("npm-lib", &json!(1));
        assert_eq!(cache.get("npm-lib"), None);
    }

    #[test]
    fn accessors() {
        let now = Utc::now();
        let cache = FileCache::new("/some/path", Duration::from_secs(3600), now, false);
        assert_eq!(cache.dir(), Path::new("/some/path"));
        assert_eq!(cache.now(), now);
    }

    #[test]
    fn memory_cache_round_trip() {
        let cache = MemoryCache::with_entries([("npm-lib", json!(3))]);
        assert!(cache.contains("npm-lib"));
        assert_eq!(cache.get("npm-lib"), Some(json!(3)));
        assert_eq!(cache.get("npm-other"), None);

        cache.set("npm-other", &json!(4));
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_empty());
    }

    #[test]
    fn shared_gateways_delegate() {
        let cache = Arc::new(MemoryCache::new());
        let shared: &dyn CacheGateway = &cache;
        shared.set("k", &json!(true));
        assert_eq!((&*cache).get("k"), Some(json!(true)));
    }
}
