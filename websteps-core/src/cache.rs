use crate::error::{CoreError, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CACHE_FILE_NAME: &str = "cache.sqlite3";
pub const DEFAULT_TRIM_INTERVAL: Duration = Duration::from_secs(60);
/// Shorter trim intervals are raised to this.
pub const MIN_TRIM_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15 * 60);

/// Decides how long a cached probe stays valid.
pub trait CachingPolicy: Send + Sync {
    /// Maximum age of an entry, or `None` to keep entries forever.
    fn max_age(&self) -> Option<Duration>;

    fn name(&self) -> &'static str;

    /// Whether an entry created at `created_at` (unix seconds) is too old
    /// at `now` (unix seconds).
    fn is_stale(&self, created_at: i64, now: i64) -> bool {
        match self.max_age() {
            Some(max_age) => now - created_at > max_age.as_secs() as i64,
            None => false,
        }
    }
}

/// Entries never expire. Used when operators want an ever-growing oracle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CachingForever;

impl CachingPolicy for CachingForever {
    fn max_age(&self) -> Option<Duration> {
        None
    }

    fn name(&self) -> &'static str {
        "forever"
    }
}

/// Entries expire after a bounded TTL, since DNS, TLS and routing change.
#[derive(Debug, Clone, Copy)]
pub struct ReasonableCaching {
    pub max_age: Duration,
}

impl ReasonableCaching {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }
}

impl Default for ReasonableCaching {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl CachingPolicy for ReasonableCaching {
    fn max_age(&self) -> Option<Duration> {
        Some(self.max_age)
    }

    fn name(&self) -> &'static str {
        "reasonable"
    }
}

/// Where the cache lives and how it behaves.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Keep entries forever and never trim.
    pub mostly_cache: bool,
    pub trim_interval: Duration,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mostly_cache: false,
            trim_interval: DEFAULT_TRIM_INTERVAL,
        }
    }

    pub fn mostly_cache(mut self, mostly_cache: bool) -> Self {
        self.mostly_cache = mostly_cache;
        self
    }

    pub fn trim_interval(mut self, interval: Duration) -> Self {
        self.trim_interval = interval.max(MIN_TRIM_INTERVAL);
        self
    }

    pub fn policy(&self) -> Arc<dyn CachingPolicy> {
        if self.mostly_cache {
            Arc::new(CachingForever)
        } else {
            Arc::new(ReasonableCaching::default())
        }
    }
}

/// A stored probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// "dns" or "endpoint"
    pub kind: String,
    /// JSON-serialized measurement.
    pub value: String,
    pub created_at: i64,
}

/// Persistent key/value store of probe results, keyed by fingerprint.
///
/// Shared by every concurrent caller. Two callers racing on the same
/// fingerprint both write; the last write wins.
pub struct ProbeCache {
    conn: Mutex<Connection>,
    policy: Arc<dyn CachingPolicy>,
    path: PathBuf,
}

impl ProbeCache {
    /// Opens (creating it if needed) the cache inside `dir` with the
    /// reasonable caching policy.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_with_policy(dir, Arc::new(ReasonableCaching::default()))
    }

    pub fn open_with_config(config: &CacheConfig) -> Result<Self> {
        Self::open_with_policy(&config.dir, config.policy())
    }

    pub fn open_with_policy(dir: &Path, policy: Arc<dyn CachingPolicy>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CACHE_FILE_NAME);
        let conn = Connection::open(&path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            CREATE TABLE IF NOT EXISTS probe_cache (
                fingerprint TEXT PRIMARY KEY,
                kind TEXT NOT NULL CHECK(kind IN ('dns', 'endpoint')),
                value TEXT NOT NULL,    -- JSON measurement
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_probe_cache_created ON probe_cache(created_at);
            ",
        )?;

        debug!(
            "Opened probe cache {} with {} policy",
            path.display(),
            policy.name()
        );
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &dyn CachingPolicy {
        self.policy.as_ref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CoreError::CachePoisoned)
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM probe_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the raw entry regardless of its age.
    pub fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT fingerprint, kind, value, created_at FROM probe_cache WHERE fingerprint = ?1",
                params![fingerprint],
                |row| {
                    Ok(CacheEntry {
                        fingerprint: row.get(0)?,
                        kind: row.get(1)?,
                        value: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Returns the entry when it is still fresh under the active policy.
    pub fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now().timestamp();
        Ok(self
            .get(fingerprint)?
            .filter(|entry| !self.policy.is_stale(entry.created_at, now)))
    }

    pub fn put(&self, fingerprint: &str, kind: &str, value: &str) -> Result<()> {
        self.put_at(fingerprint, kind, value, Utc::now().timestamp())
    }

    /// Stores an entry with an explicit creation time (unix seconds).
    pub fn put_at(&self, fingerprint: &str, kind: &str, value: &str, created_at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO probe_cache (fingerprint, kind, value, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![fingerprint, kind, value, created_at],
        )?;
        Ok(())
    }

    /// Deletes every entry older than the policy allows. Returns how many
    /// entries were removed. A no-op under [`CachingForever`].
    pub fn trim(&self) -> Result<usize> {
        self.trim_at(Utc::now().timestamp())
    }

    pub fn trim_at(&self, now: i64) -> Result<usize> {
        let Some(max_age) = self.policy.max_age() else {
            return Ok(0);
        };
        let cutoff = now - max_age.as_secs() as i64;
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM probe_cache WHERE created_at < ?1",
            params![cutoff],
        )?;
        if removed > 0 {
            info!("Trimmed {} stale cache entries", removed);
        }
        Ok(removed)
    }

    /// Trims the cache every `interval`, but at most once per
    /// [`MIN_TRIM_INTERVAL`], until `cancel` fires.
    pub fn start_trimmer(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let interval = interval.max(MIN_TRIM_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Cache trimmer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = cache.trim() {
                            warn!("Cache trim failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
