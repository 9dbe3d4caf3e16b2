//! Error types.

use quick_error::quick_error;

quick_error! {
    /// An error produced by the map.
    #[derive(Debug)]
    pub enum Error {
        /// The allocator could not satisfy a request for a new table.
        ///
        /// Raised by [`AtomicHashMap::new`](crate::AtomicHashMap::new),
        /// [`AtomicHashMap::with_capacity`](crate::AtomicHashMap::with_capacity), and
        /// [`AtomicHashMap::put`](crate::AtomicHashMap::put) when a triggered resize cannot
        /// allocate the doubled table. The map is left in its pre-call state; the caller may
        /// retry.
        Alloc {
            display("failed to allocate a hash table of the requested capacity")
        }
    }
}
