//! In-memory TTL cache with hit/miss statistics and per-key single-flight.
//!
//! Entries expire lazily on access and proactively via an optional sweeper
//! task. The map sits behind a mutex so the cache can be shared between the
//! request path and the background refresher on a multi-threaded runtime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use skycast_core::CacheConfig;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{WeatherError, WeatherResult};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Rough in-memory footprint, used for advisory size statistics
pub trait ApproxSize {
    fn approx_size(&self) -> usize;
}

impl ApproxSize for serde_json::Value {
    fn approx_size(&self) -> usize {
        use serde_json::Value;
        match self {
            Value::Null => 4,
            Value::Bool(_) => 4,
            Value::Number(_) => 8,
            Value::String(s) => s.len(),
            Value::Array(items) => items.iter().map(ApproxSize::approx_size).sum::<usize>() + 2,
            Value::Object(map) => {
                map.iter()
                    .map(|(k, v)| k.len() + v.approx_size())
                    .sum::<usize>()
                    + 2
            }
        }
    }
}

impl ApproxSize for String {
    fn approx_size(&self) -> usize {
        self.len()
    }
}

/// A stored value and its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: Instant,
    /// `None` never expires
    pub expires_at: Option<Instant>,
    set_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Snapshot of cache statistics. Sizes are approximate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub key_size: usize,
    pub value_size: usize,
}

/// Remaining lifetime of a live key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    Remaining(Duration),
    NoExpiry,
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Applied when `set` is called without a TTL
    pub default_ttl: Duration,
    /// Sweep interval; zero disables the sweeper
    pub check_period: Duration,
    pub max_keys: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            check_period: DEFAULT_CHECK_PERIOD,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            check_period: Duration::from_secs(config.check_period_secs),
            max_keys: config.max_keys.max(1),
        }
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    key_size: usize,
    value_size: usize,
    next_seq: u64,
}

impl<V: ApproxSize> Inner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            key_size: 0,
            value_size: 0,
            next_seq: 0,
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.key_size = self.key_size.saturating_sub(entry.key.len());
        self.value_size = self.value_size.saturating_sub(entry.value.approx_size());
        Some(entry)
    }

    /// Look up a live entry, evicting it first if it has expired
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut CacheEntry<V>> {
        let expired = self.entries.get(key).map(|e| e.is_expired(now))?;
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Make room for one new key: expired entries go first, then the
    /// least-recently-set entry.
    fn make_room(&mut self, max_keys: usize, now: Instant) {
        if self.entries.len() < max_keys {
            return;
        }
        let purged = self.purge_expired(now);
        if purged > 0 {
            tracing::debug!("Cache full, purged {} expired entries", purged);
        }
        while self.entries.len() >= max_keys {
            let oldest = self
                .entries
                .values()
                .min_by_key(|e| e.set_seq)
                .map(|e| e.key.clone());
            match oldest {
                Some(key) => {
                    tracing::debug!("Cache full, evicting least recently set key {}", key);
                    self.remove(&key);
                }
                None => break,
            }
        }
    }

    fn insert(&mut self, key: String, value: V, expires_at: Option<Instant>, now: Instant) {
        self.remove(&key);
        self.next_seq += 1;
        self.key_size += key.len();
        self.value_size += value.approx_size();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at: now,
            expires_at,
            set_seq: self.next_seq,
        };
        self.entries.insert(key, entry);
    }
}

/// Keyed store with per-entry expiry.
///
/// A TTL of zero stores the value without expiry.
pub struct TtlCache<V = serde_json::Value> {
    inner: Mutex<Inner<V>>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    options: CacheOptions,
}

impl<V: Clone + ApproxSize> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl<V: Clone + ApproxSize> TtlCache<V> {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            in_flight: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    fn expiry_for(&self, ttl: Option<Duration>, now: Instant) -> Option<Instant> {
        let ttl = ttl.unwrap_or(self.options.default_ttl);
        if ttl.is_zero() {
            None
        } else {
            Some(now + ttl)
        }
    }

    /// Get a live value, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let value = inner.live(key, now).map(|e| e.value.clone());
        match value {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        value
    }

    /// Store a value. `None` uses the default TTL, zero means no expiry.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let expires_at = self.expiry_for(ttl, now);
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(key) {
            inner.make_room(self.options.max_keys, now);
        }
        inner.insert(key.to_string(), value, expires_at, now);
    }

    /// Remove a key. Returns the number of entries removed (0 or 1).
    pub fn del(&self, key: &str) -> usize {
        usize::from(self.inner.lock().remove(key).is_some())
    }

    pub fn del_multiple<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        let mut inner = self.inner.lock();
        keys.iter()
            .filter(|k| inner.remove(k.as_ref()).is_some())
            .count()
    }

    /// Existence check that honors expiry. Does not touch hit/miss counters.
    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().live(key, Instant::now()).is_some()
    }

    pub fn get_ttl(&self, key: &str) -> Option<TtlStatus> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let entry = inner.live(key, now)?;
        Some(match entry.expires_at {
            Some(at) => TtlStatus::Remaining(at.saturating_duration_since(now)),
            None => TtlStatus::NoExpiry,
        })
    }

    /// Restart a live key's countdown from now. Returns false if the key is
    /// absent or already expired.
    pub fn set_ttl(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let expires_at = self.expiry_for(Some(ttl), now);
        let mut inner = self.inner.lock();
        match inner.live(key, now) {
            Some(entry) => {
                entry.expires_at = expires_at;
                entry.created_at = now;
                true
            }
            None => false,
        }
    }

    /// Bulk get; missing or expired keys are omitted.
    pub fn get_multiple<S: AsRef<str>>(&self, keys: &[S]) -> HashMap<String, V> {
        keys.iter()
            .filter_map(|k| self.get(k.as_ref()).map(|v| (k.as_ref().to_string(), v)))
            .collect()
    }

    pub fn set_multiple<I>(&self, items: I)
    where
        I: IntoIterator<Item = (String, V, Option<Duration>)>,
    {
        for (key, value, ttl) in items {
            self.set(&key, value, ttl);
        }
    }

    /// All live keys
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key.clone())
            .collect()
    }

    /// Clone of a live entry, without touching statistics
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.inner.lock().live(key, Instant::now()).map(|e| e.clone())
    }

    /// Live value, counting a hit only when one is found
    fn cached_hit(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let value = inner.live(key, Instant::now()).map(|e| e.value.clone());
        if value.is_some() {
            inner.hits += 1;
        }
        value
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        CacheStats {
            keys: inner.entries.values().filter(|e| !e.is_expired(now)).count(),
            hits: inner.hits,
            misses: inner.misses,
            key_size: inner.key_size,
            value_size: inner.value_size,
        }
    }

    /// Drop every entry and reset statistics.
    pub fn flush(&self) {
        *self.inner.lock() = Inner::new();
        tracing::debug!("Cache flushed");
    }

    /// Evict all expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired(Instant::now())
    }

    /// Return the cached value or run `fetch` and cache its success.
    ///
    /// Concurrent callers missing the same key wait for the first caller's
    /// fetch and then read its result from the cache instead of fetching
    /// again. Errors are never cached; a follower that finds nothing after
    /// the leader failed performs its own fetch.
    ///
    /// Each call counts exactly once in the statistics: a hit when the
    /// value came from the cache, including after waiting on another
    /// caller's fetch, and a miss when this call fetched.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.cached_hit(key) {
            return Ok(value);
        }

        let gate = self
            .in_flight
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let result = {
            let _guard = gate.lock().await;
            match self.cached_hit(key) {
                Some(value) => Ok(value),
                None => {
                    self.inner.lock().misses += 1;
                    let fetched = fetch().await;
                    if let Ok(value) = &fetched {
                        self.set(key, value.clone(), ttl);
                    }
                    fetched
                }
            }
        };

        let mut in_flight = self.in_flight.lock();
        if let Some(current) = in_flight.get(key) {
            // map + our clone; anyone else still holds the gate
            if Arc::ptr_eq(current, &gate) && Arc::strong_count(&gate) == 2 {
                in_flight.remove(key);
            }
        }

        result
    }
}

impl TtlCache<serde_json::Value> {
    /// Typed single-flight fetch over a JSON-valued cache.
    ///
    /// The fetched item is stored as JSON on success and decoded on the way
    /// out, so one cache instance can hold every kind of weather data.
    pub async fn get_or_fetch_json<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> WeatherResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = WeatherResult<T>>,
    {
        let value = self
            .get_or_try_insert_with(key, Some(ttl), || async move {
                let item = fetch().await?;
                serde_json::to_value(&item)
                    .map_err(|e| WeatherError::upstream(format!("cannot encode {}: {}", key, e)))
            })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| WeatherError::upstream(format!("cannot decode cached {}: {}", key, e)))
    }
}

impl<V> TtlCache<V>
where
    V: Clone + ApproxSize + Send + 'static,
{
    /// Start the periodic expiry sweep. The task holds only a weak reference
    /// and exits when the cache is dropped or the handle is stopped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<SweeperHandle> {
        let period = self.options.check_period;
        if period.is_zero() {
            return None;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(cache) = weak.upgrade() else { break };
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!("Cache sweep evicted {} expired entries", purged);
                        }
                    }
                }
            }
        });

        Some(SweeperHandle { token, handle })
    }
}

/// Stop handle for the expiry sweeper
pub struct SweeperHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Cache sweeper ended abnormally: {}", e);
        }
    }
}
