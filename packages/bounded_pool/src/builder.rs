use std::num::NonZero;

use crate::BytePool;

/// Builder for creating an instance of [`BytePool`].
///
/// A capacity is mandatory - the whole point of the pool is that its footprint is decided
/// here and never changes afterwards.
///
/// # Examples
///
/// ```
/// use bounded_pool::BytePool;
/// use new_zealand::nz;
///
/// let pool = BytePool::builder().capacity(nz!(4096)).build();
///
/// assert_eq!(pool.capacity(), 4096);
/// ```
#[derive(Debug)]
#[must_use]
pub struct BytePoolBuilder {
    capacity: Option<NonZero<usize>>,
}

impl BytePoolBuilder {
    pub(crate) fn new() -> Self {
        Self { capacity: None }
    }

    /// Sets the size of the arena, in bytes.
    ///
    /// This is the total budget available to all leases combined. Once the builder has
    /// run, no operation can change it.
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if no capacity was set.
    #[must_use]
    pub fn build(self) -> BytePool {
        let capacity = self
            .capacity
            .expect("a capacity is required to build a BytePool");

        BytePool::new_inner(capacity)
    }
}
