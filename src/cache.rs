//! A bounded cache whose entries expire.
//!
//! The cache is used to remember the outcome of expensive status lookups
//! for a while. Each entry carries an absolute expiry time. Expired entries
//! are never returned and are dropped when looked up. When the cache grows
//! beyond its capacity, it is purged by evicting the entries that expire
//! soonest.

use std::{fmt, str};
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use chrono::TimeDelta;
use dashmap::DashMap;
use log::debug;
use crate::util::duration::{self, DurationError};
use crate::x509::Time;


//------------ Expires -------------------------------------------------------

/// A value that knows when it expires.
///
/// If a value provides an expiry time, it is used when the value is added
/// to a cache without an explicit expiry time.
pub trait Expires {
    fn expires(&self) -> Option<Time> {
        None
    }
}


//------------ Horizon -------------------------------------------------------

/// Determines the expiry time for new cache entries.
#[derive(Clone)]
pub enum Horizon {
    /// Entries expire a fixed time after they are added.
    After(TimeDelta),

    /// A function provides the expiry time.
    Compute(Arc<dyn Fn() -> Time + Send + Sync>),
}

impl Horizon {
    /// Creates a horizon from a closure.
    pub fn compute(op: impl Fn() -> Time + Send + Sync + 'static) -> Self {
        Horizon::Compute(Arc::new(op))
    }

    /// Returns the expiry time for an entry added now.
    ///
    /// Horizons too far out for [`Time`] end at [`Time::MAX`].
    pub fn expires(&self) -> Time {
        match *self {
            Horizon::After(delta) => Time::now().saturating_add(delta),
            Horizon::Compute(ref op) => op(),
        }
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Horizon::After(TimeDelta::hours(48))
    }
}

impl From<TimeDelta> for Horizon {
    fn from(delta: TimeDelta) -> Self {
        Horizon::After(delta)
    }
}

impl str::FromStr for Horizon {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        duration::parse(s).map(Horizon::After)
    }
}

impl fmt::Debug for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Horizon::After(delta) => {
                f.debug_tuple("After").field(&delta).finish()
            }
            Horizon::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}


//------------ ExpiringCache -------------------------------------------------

/// A concurrent cache with expiring entries and a maximum size.
pub struct ExpiringCache<K, V> {
    /// The entries.
    entries: DashMap<K, Entry<V>>,

    /// The number of entries that triggers a purge when exceeded.
    max_entries: usize,

    /// The expiry for entries that bring none of their own.
    horizon: Horizon,
}

#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    expires: Time,
}

impl<K: Eq + Hash + Clone, V: Clone> ExpiringCache<K, V> {
    /// The default maximum number of entries.
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;

    /// Creates a cache with default capacity and horizon.
    pub fn new() -> Self {
        Self::with_options(Self::DEFAULT_MAX_ENTRIES, Horizon::default())
    }

    /// Creates a cache with the given capacity and horizon.
    pub fn with_options(max_entries: usize, horizon: Horizon) -> Self {
        ExpiringCache {
            entries: DashMap::new(),
            max_entries,
            horizon,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value for `key` unless it has expired.
    ///
    /// An expired entry is removed.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where K: Borrow<Q>, Q: Hash + Eq + ?Sized {
        self.get_at(key, Time::now())
    }

    /// Returns the value for `key` unless it has expired at `now`.
    pub fn get_at<Q>(&self, key: &Q, now: Time) -> Option<V>
    where K: Borrow<Q>, Q: Hash + Eq + ?Sized {
        {
            let entry = self.entries.get(key)?;
            if now <= entry.expires {
                return Some(entry.value.clone())
            }
        }
        self.entries.remove_if(key, |_, entry| now > entry.expires);
        None
    }

    /// Adds a value to the cache.
    ///
    /// The entry expires at `expires` if given, else when the value says
    /// it expires, else according to the cache’s horizon. If the cache
    /// holds more than its maximum number of entries afterwards, it is
    /// purged.
    ///
    /// Returns the value.
    pub fn set(&self, key: K, value: V, expires: Option<Time>) -> V
    where V: Expires {
        let expires = expires.or_else(|| value.expires()).unwrap_or_else(|| {
            self.horizon.expires()
        });
        self.insert(key, value, expires)
    }

    /// Adds a value with an explicit expiry time.
    pub fn insert(&self, key: K, value: V, expires: Time) -> V {
        self.entries.insert(key, Entry { value: value.clone(), expires });
        if self.entries.len() > self.max_entries {
            self.purge(0)
        }
        value
    }

    /// Removes an entry and returns its value if it hadn’t expired.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where K: Borrow<Q>, Q: Hash + Eq + ?Sized {
        let (_, entry) = self.entries.remove(key)?;
        if Time::now() <= entry.expires {
            Some(entry.value)
        }
        else {
            None
        }
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.clear()
    }

    /// Purges the cache.
    ///
    /// Makes room for `space` entries or, if that is zero, for a tenth of
    /// the capacity but at least one entry by evicting the entries that
    /// expire soonest. Afterwards, also drops all remaining entries that
    /// have already expired.
    pub fn purge(&self, space: usize) {
        self.purge_at(space, Time::now())
    }

    fn purge_at(&self, space: usize, now: Time) {
        let mut sorted: Vec<_> = self.entries.iter().map(|item| {
            (item.key().clone(), item.value().expires)
        }).collect();
        if sorted.is_empty() {
            return
        }
        sorted.sort_by_key(|&(_, expires)| expires);

        let free = if space > 0 {
            space
        }
        else {
            (self.max_entries / 10).max(1)
        };
        let limit = self.max_entries.saturating_sub(free);
        let excess = sorted.len().saturating_sub(limit);
        let mut evicted = excess;
        for (key, _) in sorted.drain(..excess) {
            self.entries.remove(&key);
        }
        for (key, expires) in sorted {
            if now <= expires {
                break
            }
            self.entries.remove(&key);
            evicted += 1;
        }
        debug!("Cache purge evicted {} entries.", evicted);
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for ExpiringCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("len", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("horizon", &self.horizon)
            .finish()
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Value(u32);

    impl Expires for Value { }

    #[derive(Clone, Debug, PartialEq)]
    struct Dated(Time);

    impl Expires for Dated {
        fn expires(&self) -> Option<Time> {
            Some(self.0)
        }
    }

    #[test]
    fn get_and_set() {
        let cache = ExpiringCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.set("one", Value(1), None), Value(1));
        assert_eq!(cache.get("one"), Some(Value(1)));
        assert_eq!(cache.get("two"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove("one"), Some(Value(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_never_returned() {
        let cache = ExpiringCache::new();
        let past = Time::now() - TimeDelta::seconds(1);
        cache.set("old", Value(1), Some(past));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn value_expiry_and_horizon() {
        let cache = ExpiringCache::new();
        let soon = Time::now() + TimeDelta::minutes(5);
        cache.set("dated", Dated(soon), None);
        assert!(cache.get_at("dated", soon).is_some());
        assert!(
            cache.get_at("dated", soon + TimeDelta::seconds(1)).is_none()
        );

        let later = Time::now() + TimeDelta::days(3);
        let cache = ExpiringCache::with_options(
            10, Horizon::compute(move || later)
        );
        cache.set("value", Value(1), None);
        assert!(cache.get_at("value", later).is_some());
        assert!(
            cache.get_at("value", later + TimeDelta::seconds(1)).is_none()
        );

        let cache = ExpiringCache::with_options(
            10, "12 hours".parse().unwrap()
        );
        cache.set("value", Value(1), None);
        let now = Time::now();
        assert!(cache.get_at("value", now + TimeDelta::hours(11)).is_some());
        assert!(cache.get_at("value", now + TimeDelta::hours(13)).is_none());
    }

    #[test]
    fn distant_horizon() {
        let cache = ExpiringCache::with_options(
            10, "100000000 weeks".parse().unwrap()
        );
        cache.set("far", Value(1), None);
        assert_eq!(cache.get("far"), Some(Value(1)));

        let cache = ExpiringCache::with_options(
            10, TimeDelta::max_value().into()
        );
        cache.set("farther", Value(2), None);
        assert!(cache.get_at("farther", Time::MAX).is_some());
    }

    #[test]
    fn evict_soonest() {
        let cache = ExpiringCache::with_options(10, Horizon::default());
        let now = Time::now();
        for i in 0..10u32 {
            cache.set(i, Value(i), Some(now + TimeDelta::hours(i64::from(i) + 1)));
        }
        assert_eq!(cache.len(), 10);

        // The eleventh expires last. Purging frees one slot of ten.
        cache.set(10, Value(10), Some(now + TimeDelta::days(1)));
        assert!(cache.len() <= 10);
        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(Value(2)));
        assert_eq!(cache.get(&10), Some(Value(10)));
    }

    #[test]
    fn purge_drops_expired_prefix() {
        let cache = ExpiringCache::with_options(100, Horizon::default());
        let now = Time::now();
        for i in 0..5u32 {
            cache.set(
                i, Value(i), Some(now - TimeDelta::minutes(i64::from(i) + 1))
            );
        }
        for i in 5..10u32 {
            cache.set(i, Value(i), Some(now + TimeDelta::hours(1)));
        }
        cache.purge(0);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.get(&7), Some(Value(7)));
    }

    #[test]
    fn purge_with_space() {
        let cache = ExpiringCache::with_options(10, Horizon::default());
        let now = Time::now();
        for i in 0..8u32 {
            cache.set(i, Value(i), Some(now + TimeDelta::hours(i64::from(i) + 1)));
        }
        cache.purge(5);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some(Value(3)));
    }
}
