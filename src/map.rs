//! The public map type.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter;
use std::sync::atomic::{AtomicUsize, Ordering};

use conc::Guard;
use parking_lot::RwLock;
use slog::Logger;

use crate::error::Error;
use crate::iter::{IntoIter, Iter};
use crate::slot::Entry;
use crate::table::{Insert, Table};

/// The capacity a map is given when none is requested explicitly.
const DEFAULT_CAPACITY: usize = 32;

/// A lock-free, concurrent hash map.
///
/// `get`, fresh inserts, overwrites, and `remove` all proceed through per-slot atomics without
/// acquiring any map-wide lock; only a table resize -- doubling the bucket array once the load
/// factor exceeds 3/4 -- takes an exclusive lock, and only for the duration of the rebuild.
///
/// ```
/// use atomichash::AtomicHashMap;
///
/// let map = AtomicHashMap::new().unwrap();
/// map.put("a", 1).unwrap();
/// assert_eq!(map.get(&"a").as_deref().copied(), Some(1));
/// assert_eq!(map.count(), 1);
/// ```
pub struct AtomicHashMap<K: 'static, V: 'static, S = RandomState> {
    table: RwLock<Table<K, V>>,
    count: AtomicUsize,
    hasher: S,
    log: Logger,
}

impl<K, V> AtomicHashMap<K, V, RandomState> {
    /// Construct a map with a small default capacity and the default hasher.
    pub fn new() -> Result<Self, Error> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Construct a map able to hold at least `capacity` entries before its first resize.
    ///
    /// `capacity` is rounded up to the next power of two (minimum 1).
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }
}

impl<K, V, S: Default> Default for AtomicHashMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default()).expect("allocating the default capacity failed")
    }
}

impl<K, V, S> AtomicHashMap<K, V, S> {
    /// Construct a map with the default capacity and a caller-supplied hash/equality policy.
    pub fn with_hasher(hasher: S) -> Result<Self, Error> {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    /// Construct a map with the given capacity and hash/equality policy.
    ///
    /// Logs to a discarding drain; use [`with_logger`] to wire up a real one.
    ///
    /// [`with_logger`]: AtomicHashMap::with_logger
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self, Error> {
        Self::with_capacity_and_hasher_and_logger(
            capacity,
            hasher,
            Logger::root(slog::Discard, slog::o!()),
        )
    }

    /// Construct a map with the given capacity, hash/equality policy, and diagnostic logger.
    ///
    /// The hot paths (`get`/`put`/`remove`) never touch `log`; only a resize -- already a
    /// serialization point -- emits a `debug` record through it, the same division the teacher
    /// workspace draws between its disk-I/O driver's structured logging and its per-request
    /// fast paths.
    pub fn with_capacity_and_hasher_and_logger(
        capacity: usize,
        hasher: S,
        log: Logger,
    ) -> Result<Self, Error> {
        let capacity = capacity.next_power_of_two().max(1);
        let table = Table::try_with_capacity(capacity).map_err(|()| Error::Alloc)?;
        Ok(AtomicHashMap {
            table: RwLock::new(table),
            count: AtomicUsize::new(0),
            hasher,
            log,
        })
    }

    /// Rebuild this map's logger, keeping its table and hasher.
    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// The number of live entries, as of some recent quiescent moment.
    ///
    /// Advisory in the presence of concurrent mutation.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// The current bucket array size. Always a power of two, monotonically non-decreasing.
    pub fn capacity(&self) -> usize {
        self.table.read().capacity()
    }

    /// `true` if `count() == 0`.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl<K: Hash, V, S: BuildHasher> AtomicHashMap<K, V, S> {
    fn hash_of(&self, key: &K) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> AtomicHashMap<K, V, S> {
    /// `get(k) -> optional V`.
    ///
    /// Returns a hazard-pointer-guarded reference rather than a clone: the map never requires
    /// `V: Clone` just to read a value back out.
    pub fn get(&self, key: &K) -> Option<Guard<V>> {
        let hash = self.hash_of(key);
        let guard = self.table.read();
        guard.get(hash, key).map(|entry| entry.map(|e| &e.val))
    }

    /// `get(k).is_some()`, without materializing a guard.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// `remove(k) -> bool`.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_of(key);
        let removed = self.table.read().remove(hash, key);
        if removed {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// A scoped snapshot view over the live entries.
    ///
    /// Excludes concurrent writers (and resize) for its lifetime, per spec's writer-exclusive
    /// iteration contract; see [`Iter`].
    pub fn iter(&self) -> Iter<'_, K, V>
    where
        K: Clone,
        V: Clone,
    {
        Iter::new(self.table.write())
    }

    /// Remove every entry for which `f` returns `false`.
    ///
    /// Takes the resize guard exclusively for the duration of the scan, the same way [`iter`]
    /// does, so `f` sees a consistent snapshot and no resize can interleave with the removals
    /// it decides on.
    ///
    /// [`iter`]: AtomicHashMap::iter
    pub fn retain<F: FnMut(&K, &V) -> bool>(&self, mut f: F)
    where
        K: Clone,
    {
        let table = self.table.write();
        let mut removed = 0;
        for index in 0..table.capacity() {
            if let Some(entry) = table.occupied_at(index) {
                let keep = f(&entry.key, &entry.val);
                if keep {
                    continue;
                }
                let key = entry.key.clone();
                drop(entry);
                // Held exclusively: `remove` still goes through the ordinary probe/CAS path
                // (no other writer can be racing it), keeping tombstoning single-sourced.
                let hash = self.hash_of(&key);
                if table.remove(hash, &key) {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.count.fetch_sub(removed, Ordering::Relaxed);
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone, S: BuildHasher> AtomicHashMap<K, V, S> {
    /// `put(k, v) -> Ok or AllocationError`.
    ///
    /// Returns `Ok(None)` for a fresh insert, `Ok(Some(old))` when an existing key's value was
    /// replaced. `put` only returns once any resize it triggered has completed.
    pub fn put(&self, key: K, val: V) -> Result<Option<Guard<V>>, Error> {
        let hash = self.hash_of(&key);
        let mut key = key;
        let mut val = val;

        loop {
            let outcome = {
                let table = self.table.read();
                table.insert(hash, key, val)
            };

            match outcome {
                Insert::Fresh => {
                    let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
                    let capacity = self.capacity();
                    if 4 * count > 3 * capacity {
                        self.resize()?;
                    }
                    return Ok(None);
                }
                Insert::Overwrote(old) => return Ok(Some(old.map(|e| &e.val))),
                Insert::Full(k, v) => {
                    // Several inserters raced past the load-factor threshold before any of them
                    // resized. Force a resize and retry with the same key/val the probe never
                    // got to claim; the retry goes through the same load-factor check above, so
                    // it cannot return having left the table still over threshold.
                    self.resize()?;
                    key = k;
                    val = v;
                }
            }
        }
    }

    /// Double the bucket array and re-home every live entry.
    ///
    /// Acquires the resize guard exclusively (blocking until every shared holder -- every
    /// in-flight `get`/`put`/`remove` -- has finished), re-checks the load factor in case a
    /// racing resize already ran, then rebuilds and republishes the table.
    fn resize(&self) -> Result<(), Error> {
        let mut table = self.table.write();
        let count = self.count.load(Ordering::Relaxed);
        let capacity = table.capacity();
        if 4 * count <= 3 * capacity {
            // A concurrent `put` already grew the table while we waited for the write lock.
            return Ok(());
        }

        let new_capacity = capacity.saturating_mul(2);
        let mut grown = Table::try_with_capacity(new_capacity).map_err(|()| Error::Alloc)?;
        table.rehash_into(&mut grown, |key| self.hash_of(key));

        slog::debug!(
            self.log,
            "resizing atomichash map";
            "old_capacity" => capacity,
            "new_capacity" => new_capacity,
            "live_entries" => count,
        );

        *table = grown;
        Ok(())
    }
}

impl<K: fmt::Debug + Hash + Eq + Clone, V: fmt::Debug + Clone, S: BuildHasher> fmt::Debug
    for AtomicHashMap<K, V, S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> iter::FromIterator<(K, V)> for AtomicHashMap<K, V, RandomState> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries: Vec<_> = iter.into_iter().collect();
        let map = AtomicHashMap::with_capacity(entries.len().max(1))
            .expect("allocating a map sized for a known-length iterator failed");
        for (key, val) in entries {
            map.put(key, val).expect("allocating during from_iter resize failed");
        }
        map
    }
}

impl<K: Hash + Eq + Clone, V: Clone, S: BuildHasher> IntoIterator for AtomicHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter::new(self.table.into_inner())
    }
}

impl<'a, K: Hash + Eq + Clone, V: Clone, S: BuildHasher> IntoIterator for &'a AtomicHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}
