//! A lock-free, concurrent hash map.
//!
//! `get`, inserting a previously unseen key, removing a present key, and overwriting an
//! existing key's value all proceed through per-slot atomics alone -- no map-wide lock is ever
//! taken on those paths. The one place the map does serialize is a table *resize*: doubling the
//! bucket array once the load factor exceeds 3/4, which briefly excludes every other operation
//! while the larger table is built and published.
//!
//! The API derives from `std::collections::HashMap`'s shape -- `get`/`put`/`remove`/`iter` --
//! the way `chashmap`'s does, generalized here to atomics-per-slot rather than a lock per
//! bucket.
//!
//! # Example
//!
//! ```
//! use atomichash::AtomicHashMap;
//!
//! let map = AtomicHashMap::new().unwrap();
//! map.put("a", 1).unwrap();
//! map.put("b", 2).unwrap();
//!
//! assert_eq!(map.get(&"a").as_deref().copied(), Some(1));
//! assert!(map.remove(&"b"));
//! assert_eq!(map.get(&"b").as_deref().copied(), None);
//! assert_eq!(map.count(), 1);
//! ```
//!
//! # Design
//!
//! Every bucket (a [`Slot`](crate::slot::Slot), internal) carries a small state machine --
//! `Empty` / `Writing` / `Occupied` / `Deleted` -- held in an atomic tag. `get` probes slots
//! linearly until it finds `Empty` (absent) or a matching `Occupied` key. `put` claims an
//! `Empty` slot with a compare-and-swap before writing the key/value, so a racing reader never
//! observes a half-written entry. `remove` tombstones a slot to `Deleted` rather than clearing
//! it, because clearing would break the probe chain for any later key that collided into the
//! same bucket. None of this needs a lock: the [`crate::AtomicHashMap`] itself holds its
//! [`Table`](crate::table::Table) behind a `parking_lot::RwLock` taken in shared mode by every
//! ordinary operation (cheap, contention-free, and still letting many readers/writers run their
//! own per-slot CAS protocol concurrently) and in exclusive mode only by resize and by
//! [`iter`](crate::AtomicHashMap::iter).

mod error;
mod iter;
mod map;
mod slot;
mod table;

pub use crate::error::Error;
pub use crate::iter::{IntoIter, Iter};
pub use crate::map::AtomicHashMap;

#[cfg(test)]
mod tests;
