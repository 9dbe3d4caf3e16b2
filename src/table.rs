//! The bucket array and its linear-probing protocol.
//!
//! A `Table` is a fixed-size, power-of-two array of [`Slot`]s. It knows nothing about resizing,
//! hashing policy, or the logical entry count -- those are [`crate::AtomicHashMap`]'s concerns.
//! What it owns is the probe sequence and the per-slot CAS protocols for `get` / `insert` /
//! `remove`, all of which take `&self`: many callers run these concurrently through the same
//! shared guard, and correctness rests entirely on the atomics inside each `Slot`.

use std::sync::atomic::Ordering;

use conc::Guard;

use crate::slot::{Entry, Slot, State};

/// Outcome of [`Table::insert`].
pub(crate) enum Insert<K: 'static, V: 'static> {
    /// The key was not previously present; a new slot was claimed.
    Fresh,
    /// The key was already present; its value was replaced in place. Carries a guarded
    /// reference to the entry that was displaced.
    Overwrote(Guard<Entry<K, V>>),
    /// The probe sequence covered every slot without finding room or a match.
    ///
    /// Not expected to occur in a table respecting the 0.75 load-factor invariant, but several
    /// inserters can race past that threshold before any of them acquires the resize guard;
    /// this lets the caller detect the exhausted case and force an immediate resize instead of
    /// looping forever. Hands the key/val back -- nothing was claimed, so the caller can retry
    /// without needing `K`/`V` to be `Clone` just to survive this rare path.
    Full(K, V),
}

pub(crate) struct Table<K: 'static, V: 'static> {
    slots: Box<[Slot<K, V>]>,
}

impl<K, V> Table<K, V> {
    /// Allocate a table of the given capacity, which must be a power of two.
    ///
    /// Fallible: a resize that cannot grow the bucket array must leave the map in its pre-call
    /// state rather than abort (spec's `AllocationError` contract), so this goes through
    /// `try_reserve_exact` instead of an infallible `Vec` push.
    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self, ()> {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|_| ())?;
        slots.extend((0..capacity).map(|_| Slot::new()));
        Ok(Table {
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }
}

impl<K: Eq, V> Table<K, V> {
    /// `get(k) -> optional V`, implemented by probing until an `Empty` slot or a matching
    /// `Occupied` slot is found.
    pub(crate) fn get(&self, hash: u64, key: &K) -> Option<Guard<Entry<K, V>>> {
        let mask = self.mask();
        let start = hash as usize & mask;
        for step in 0..self.slots.len() {
            let slot = &self.slots[(start + step) & mask];
            match slot.state(Ordering::Acquire) {
                State::Empty => return None,
                State::Occupied => {
                    if let Some(entry) = slot.entry(Ordering::Acquire) {
                        if entry.key == *key {
                            return Some(entry);
                        }
                    }
                }
                // A writer may be mid-overwrite of a different key's slot along our probe path,
                // or mid-publish of a fresh one; either way we have nothing to match yet, and
                // unlike `insert` we are not at risk of creating a duplicate by continuing.
                State::Writing | State::Deleted => {}
            }
        }
        None
    }

    /// `put(k, v)`, implemented per spec: fresh insert claims an `Empty` slot via CAS; a key
    /// already present is overwritten in place by CAS-ing the slot's `entry` pointer alone
    /// (spec §4.3's "value type does admit atomic publishing" case -- `conc::Atomic` is
    /// exactly that), so `state` stays `Occupied` throughout and a concurrent `get`/`remove`
    /// never observes a transient non-`Occupied` state for a key that is live the whole time.
    ///
    /// A losing claimant on the `Empty -> Writing` CAS must not simply keep probing: the winner
    /// may be publishing the very key this caller is trying to insert, and if the caller moved
    /// on, it could claim a later `Empty` slot for the same key, violating the at-most-one rule.
    /// So on CAS failure it re-examines the *same* slot, spinning while it is `Writing`.
    pub(crate) fn insert(&self, hash: u64, mut key: K, mut val: V) -> Insert<K, V> {
        let mask = self.mask();
        let start = hash as usize & mask;
        for step in 0..self.slots.len() {
            let slot = &self.slots[(start + step) & mask];
            loop {
                match slot.state(Ordering::Acquire) {
                    State::Empty => match slot.claim() {
                        Ok(()) => {
                            slot.publish(Entry { key, val });
                            return Insert::Fresh;
                        }
                        Err(State::Writing) => {
                            spin_until_published(slot);
                            continue;
                        }
                        // Another thread raced us and already published or tombstoned; fall
                        // through to re-examine below without re-probing from scratch.
                        Err(_) => continue,
                    },
                    State::Writing => {
                        spin_until_published(slot);
                        continue;
                    }
                    State::Occupied => {
                        let current = match slot.entry(Ordering::Acquire) {
                            Some(current) => current,
                            // The publishing store hasn't become visible to us yet even though
                            // the state already reads `Occupied`; re-examine the same slot.
                            None => continue,
                        };
                        if current.key != key {
                            break;
                        }
                        match slot.overwrite(&current, Entry { key, val }) {
                            Ok(old) => return Insert::Overwrote(old),
                            // A concurrent overwrite or `remove` changed the payload first;
                            // take the key/val back and re-examine the slot rather than
                            // re-probing from scratch.
                            Err(entry) => {
                                key = entry.key;
                                val = entry.val;
                                continue;
                            }
                        }
                    }
                    State::Deleted => break,
                }
            }
        }
        Insert::Full(key, val)
    }

    /// `remove(k) -> bool`.
    pub(crate) fn remove(&self, hash: u64, key: &K) -> bool {
        let mask = self.mask();
        let start = hash as usize & mask;
        for step in 0..self.slots.len() {
            let slot = &self.slots[(start + step) & mask];
            loop {
                match slot.state(Ordering::Acquire) {
                    State::Empty => return false,
                    State::Occupied => {
                        let matches = slot
                            .entry(Ordering::Acquire)
                            .map_or(false, |entry| entry.key == *key);
                        if !matches {
                            break;
                        }
                        match slot.tombstone() {
                            Ok(_removed) => return true,
                            // Raced with a concurrent overwrite or another remove; re-examine.
                            Err(_) => continue,
                        }
                    }
                    State::Writing | State::Deleted => break,
                }
            }
        }
        false
    }
}

impl<K: Eq + Clone, V: Clone> Table<K, V> {
    /// Re-insert every occupied entry of `self` into `dest`, under `hash_one`.
    ///
    /// Called only from the single-threaded resize rebuild, which holds the map's resize guard
    /// exclusively: `dest` is a brand-new table no reader has ever observed, so insertion here
    /// needs no CAS, and `self` has no concurrent writers to race.
    ///
    /// The entries are cloned rather than moved because `conc::Atomic` only ever hands back a
    /// hazard-protected [`Guard`], never ownership of the boxed payload back out; cloning is the
    /// one safe way to relocate a value it is still possible another, slower-draining hazard is
    /// momentarily protecting.
    pub(crate) fn rehash_into(&self, dest: &mut Table<K, V>, hash_one: impl Fn(&K) -> u64) {
        for slot in self.slots.iter() {
            if slot.state(Ordering::Acquire) != State::Occupied {
                continue;
            }
            if let Some(entry) = slot.entry(Ordering::Acquire) {
                let hash = hash_one(&entry.key);
                dest.insert_unique(hash, entry.key.clone(), entry.val.clone());
            }
        }
    }
}

impl<K, V> Table<K, V> {
    /// Place a key/value known not to already be present into an `Empty` slot, without CAS.
    fn insert_unique(&mut self, hash: u64, key: K, val: V) {
        let mask = self.mask();
        let mut index = hash as usize & mask;
        loop {
            if self.slots[index].state(Ordering::Relaxed) == State::Empty {
                self.slots[index] = Slot::occupied(key, val);
                return;
            }
            index = (index + 1) & mask;
        }
    }

    /// Iterate every occupied slot in index order, yielding a guarded entry for each.
    ///
    /// Used by [`crate::iter::Iter`], which holds the map's resize guard exclusively for its
    /// whole lifetime, so this walk cannot race a resize or another writer.
    pub(crate) fn occupied(&self) -> impl Iterator<Item = Guard<Entry<K, V>>> + '_ {
        self.slots.iter().filter_map(|slot| {
            if slot.state(Ordering::Acquire) == State::Occupied {
                slot.entry(Ordering::Acquire)
            } else {
                None
            }
        })
    }

    /// The guarded entry at `index`, if that slot is currently `Occupied`.
    ///
    /// Index-addressed counterpart of [`Table::occupied`], used by [`crate::iter::Iter`] and
    /// [`crate::iter::IntoIter`] to resume a walk one slot at a time across `next()` calls,
    /// rather than materializing the whole snapshot up front.
    pub(crate) fn occupied_at(&self, index: usize) -> Option<Guard<Entry<K, V>>> {
        let slot = &self.slots[index];
        if slot.state(Ordering::Acquire) == State::Occupied {
            slot.entry(Ordering::Acquire)
        } else {
            None
        }
    }
}

fn spin_until_published<K, V>(slot: &Slot<K, V>) {
    while slot.state(Ordering::Acquire) == State::Writing {
        std::hint::spin_loop();
    }
}
