//! A bounded key-value cache whose entries expire a fixed time after they
//! were stored.
//!
//! Expiry is by insertion time only: reading an entry never extends its life.
//! Separately, when more than `capacity` entries are held, expired entries
//! are dropped first and then the least recently *used* entries, so the
//! cache stays bounded even when nothing has expired.
//!
//! [`TimedCache`] takes `&mut self` for every operation, reads included,
//! because reads update recency. Sharing one between threads needs an
//! external lock; it assumes one writer at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// A source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time, so a
/// test can keep one handle and give the other to a cache.
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::from_secs(0))),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = match self.elapsed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *elapsed += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = match self.elapsed.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        self.origin + elapsed
    }
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    ttl: Duration,
    last_used: u64,
}

impl<V> Entry<V> {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted) > self.ttl
    }
}

pub struct TimedCache<V, C = SystemClock> {
    clock: C,
    capacity: usize,
    default_ttl: Duration,
    entries: HashMap<String, Entry<V>>,

    // last_used tick -> key; the first entry is the least recently used.
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl<V> TimedCache<V, SystemClock> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        TimedCache::with_clock(capacity, default_ttl, SystemClock)
    }
}

impl<V, C: Clock> TimedCache<V, C> {
    pub fn with_clock(capacity: usize, default_ttl: Duration, clock: C) -> Self {
        TimedCache {
            clock,
            capacity,
            default_ttl,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of entries held, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value for `key` unless it is absent or has outlived its
    /// TTL. Expired entries are dropped on the way out.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let now = self.clock.now();
        let expired = self.entries.get(key)?.expired(now);
        if expired {
            debug!(key, "cache entry expired");
            self.remove(key);
            return None;
        }

        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        self.recency.insert(tick, key.to_owned());
        entry.last_used = tick;
        Some(&entry.value)
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl;
        self.set(key, value, ttl);
    }

    /// Stores `value` under `key`, replacing (and restarting the TTL of) any
    /// previous entry.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }
        let key = key.into();
        self.remove(&key);

        let tick = self.next_tick();
        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: self.clock.now(),
                ttl,
                last_used: tick,
            },
        );

        if self.entries.len() > self.capacity {
            self.purge_expired();
        }
        while self.entries.len() > self.capacity {
            let lru = match self.recency.values().next() {
                Some(key) => key.clone(),
                None => break,
            };
            debug!(key = %lru, "evicting least recently used cache entry");
            self.remove(&lru);
        }
    }

    /// Drops every entry whose key starts with `prefix` and returns how many
    /// were dropped. An empty prefix clears the cache.
    pub fn invalidate(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_used);
        Some(entry.value)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
