//! Scoped snapshot iteration.
//!
//! Spec §4.6 makes iteration writer-exclusive rather than an epoch snapshot: constructing an
//! [`Iter`] takes the map's resize guard in exclusive mode, which both blocks out concurrent
//! `get`/`put`/`remove`/resize for the iterator's lifetime and blocks the iterator's
//! construction behind any of those already in flight. [`IntoIter`] is the owned counterpart,
//! grounded in the teacher's `IntoIter`: it consumes the map's table directly, so there is no
//! guard to hold at all.

use parking_lot::RwLockWriteGuard;

use crate::table::Table;

/// A scoped snapshot view over a map's live entries, yielded by [`crate::AtomicHashMap::iter`].
///
/// Holds the map's resize guard exclusively from construction to drop: no concurrent write
/// (ordinary or resize) can interleave with a walk in progress. Iteration order is unspecified.
pub struct Iter<'a, K: 'static, V: 'static> {
    table: RwLockWriteGuard<'a, Table<K, V>>,
    next: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(table: RwLockWriteGuard<'a, Table<K, V>>) -> Self {
        Iter { table, next: 0 }
    }
}

impl<'a, K: Clone, V: Clone> Iterator for Iter<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let capacity = self.table.capacity();
        while self.next < capacity {
            let index = self.next;
            self.next += 1;
            if let Some(entry) = self.table.occupied_at(index) {
                return Some((entry.key.clone(), entry.val.clone()));
            }
        }
        None
    }
}

/// An owned iterator over a map's entries, produced by `IntoIterator for AtomicHashMap`.
pub struct IntoIter<K: 'static, V: 'static> {
    table: Table<K, V>,
    next: usize,
}

impl<K, V> IntoIter<K, V> {
    pub(crate) fn new(table: Table<K, V>) -> Self {
        IntoIter { table, next: 0 }
    }
}

impl<K: Clone, V: Clone> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let capacity = self.table.capacity();
        while self.next < capacity {
            let index = self.next;
            self.next += 1;
            if let Some(entry) = self.table.occupied_at(index) {
                return Some((entry.key.clone(), entry.val.clone()));
            }
        }
        None
    }
}
