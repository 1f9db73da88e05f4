use std::num::NonZero;
use std::sync::Mutex;

use crate::BytePoolBuilder;

pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - continued execution \
    would risk handing out corrupted pool state";

/// A fixed-capacity byte arena guarded by a mutex.
///
/// Payloads are copied in with [`store()`][1], addressed through the returned [`Lease`],
/// and copied back out with [`read_into()`][2] or [`with_bytes()`][3]. Releasing the lease
/// via [`release()`][4] returns the bytes to the arena, coalescing adjacent free space.
///
/// The sum of live lease sizes never exceeds the capacity configured at build time. When a
/// request cannot be satisfied, [`store()`][1] returns `None` and increments the counter
/// reported by [`exhausted_count()`][5]; a correctly sized deployment never observes this.
///
/// # Sharing
///
/// The pool is `Send + Sync` and is intended to be shared between producer threads and the
/// dispatcher thread, typically behind an `Arc`. The internal mutex is held only for the
/// duration of a copy; no user code ever runs under it.
///
/// # Example
///
/// ```rust
/// use bounded_pool::BytePool;
/// use new_zealand::nz;
///
/// let pool = BytePool::builder().capacity(nz!(64)).build();
///
/// let lease = pool.store(&[1, 2, 3]).expect("pool has room");
/// pool.with_bytes(&lease, |bytes| assert_eq!(bytes, &[1, 2, 3]));
/// pool.release(lease);
/// ```
///
/// [1]: Self::store
/// [2]: Self::read_into
/// [3]: Self::with_bytes
/// [4]: Self::release
/// [5]: Self::exhausted_count
#[derive(Debug)]
pub struct BytePool {
    inner: Mutex<PoolInner>,
}

/// A handle to bytes stored in a [`BytePool`].
///
/// A lease is move-only: it cannot be copied or cloned, so the bytes it identifies can only
/// be returned to the arena once, by passing the lease to [`BytePool::release()`]. There is
/// no way to construct a lease other than [`BytePool::store()`], so a lease is always backed
/// by a live chunk of the pool that issued it.
///
/// Handing a lease to a pool other than the one that issued it is a logic error and corrupts
/// that pool's accounting; the dispatch engine prevents this structurally by pairing every
/// lease-carrying structure with the pool it draws from.
#[derive(Debug, Eq, PartialEq)]
pub struct Lease {
    offset: usize,
    len: usize,
}

impl Lease {
    /// The number of stored bytes this lease identifies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the lease identifies an empty payload.
    ///
    /// Empty payloads are legal - an event can be pure signal - and consume no arena space.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct PoolInner {
    arena: Box<[u8]>,

    /// Free blocks, ordered by offset. Adjacent blocks are always coalesced on release,
    /// so no two entries ever touch.
    free: Vec<Block>,

    in_use: usize,

    exhausted: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Block {
    offset: usize,
    len: usize,
}

impl Block {
    fn end(&self) -> usize {
        self.offset
            .checked_add(self.len)
            .expect("free list blocks always lie within the arena, which fits in memory")
    }
}

impl BytePool {
    #[must_use]
    pub(crate) fn new_inner(capacity: NonZero<usize>) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                arena: vec![0; capacity.get()].into_boxed_slice(),
                free: vec![Block {
                    offset: 0,
                    len: capacity.get(),
                }],
                in_use: 0,
                exhausted: 0,
            }),
        }
    }

    /// Starts building a new [`BytePool`].
    pub fn builder() -> BytePoolBuilder {
        BytePoolBuilder::new()
    }

    /// Copies `payload` into a free chunk of the arena and returns a lease to it.
    ///
    /// Returns `None` when no contiguous free chunk of sufficient size exists, in which
    /// case the exhaustion counter is incremented and the arena is left untouched. The
    /// caller decides what a failed store means; for the event channels built on top of
    /// this pool it means the event is dropped and counted, never that anybody blocks.
    ///
    /// An empty payload always succeeds and consumes no space.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bounded_pool::BytePool;
    /// use new_zealand::nz;
    ///
    /// let pool = BytePool::builder().capacity(nz!(8)).build();
    ///
    /// let lease = pool.store(&[0xAB; 8]).expect("exactly fits");
    /// assert!(pool.store(&[0u8]).is_none());
    /// assert_eq!(pool.exhausted_count(), 1);
    ///
    /// pool.release(lease);
    /// assert!(pool.store(&[0u8]).is_some());
    /// ```
    #[must_use]
    pub fn store(&self, payload: &[u8]) -> Option<Lease> {
        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);

        if payload.is_empty() {
            return Some(Lease { offset: 0, len: 0 });
        }

        // First fit. The free list is short in practice (coalescing keeps it dense) and
        // first fit preserves low offsets for reuse, which keeps fragmentation predictable.
        let Some(position) = inner.free.iter().position(|b| b.len >= payload.len()) else {
            inner.exhausted = inner
                .exhausted
                .checked_add(1)
                .expect("a monotonic u64 diagnostic counter cannot realistically overflow");
            return None;
        };

        let block = *inner
            .free
            .get(position)
            .expect("position was just located in the free list");

        let offset = block.offset;

        if block.len == payload.len() {
            _ = inner.free.remove(position);
        } else {
            let shrunk = Block {
                offset: block
                    .offset
                    .checked_add(payload.len())
                    .expect("the block was verified to be at least payload-sized"),
                len: block
                    .len
                    .checked_sub(payload.len())
                    .expect("the block was verified to be at least payload-sized"),
            };

            *inner
                .free
                .get_mut(position)
                .expect("position was just located in the free list") = shrunk;
        }

        let end = offset
            .checked_add(payload.len())
            .expect("free list blocks always lie within the arena");

        inner
            .arena
            .get_mut(offset..end)
            .expect("free list blocks always lie within the arena")
            .copy_from_slice(payload);

        inner.in_use = inner
            .in_use
            .checked_add(payload.len())
            .expect("live lease sizes can never sum beyond the arena capacity");

        Some(Lease {
            offset,
            len: payload.len(),
        })
    }

    /// Copies the leased bytes into `dst` and returns how many bytes were copied.
    ///
    /// Copies `min(lease.len(), dst.len())` bytes. The lease stays live; pair this with
    /// [`release()`][Self::release] once the bytes are no longer needed.
    pub fn read_into(&self, lease: &Lease, dst: &mut [u8]) -> usize {
        self.with_bytes(lease, |bytes| {
            let len = bytes.len().min(dst.len());

            dst.get_mut(..len)
                .expect("len was clamped to the destination length")
                .copy_from_slice(bytes.get(..len).expect("len was clamped to the chunk length"));

            len
        })
    }

    /// Exposes the leased bytes to a closure, under the pool lock.
    ///
    /// Keep the closure small - producer threads storing into the same pool wait while
    /// it runs.
    pub fn with_bytes<R>(&self, lease: &Lease, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.inner.lock().expect(ERR_POISONED_LOCK);

        let end = lease
            .offset
            .checked_add(lease.len)
            .expect("a live lease always lies within the arena");

        f(inner
            .arena
            .get(lease.offset..end)
            .expect("a live lease always lies within the arena"))
    }

    /// Returns the leased chunk to the arena.
    ///
    /// Free space adjacent to the chunk is coalesced, so a pool that has released every
    /// lease is back to one contiguous free block regardless of allocation history.
    pub fn release(&self, lease: Lease) {
        if lease.len == 0 {
            return;
        }

        let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);

        inner.in_use = inner
            .in_use
            .checked_sub(lease.len)
            .expect("a released lease accounts for bytes that were marked in use");

        let mut block = Block {
            offset: lease.offset,
            len: lease.len,
        };

        // The free list is ordered by offset; find where this block belongs.
        let insert_at = inner.free.partition_point(|b| b.offset < block.offset);

        // Coalesce with the following block, if contiguous.
        if let Some(next) = inner.free.get(insert_at).copied() {
            debug_assert!(
                block.end() <= next.offset,
                "released lease overlaps the free list - pool accounting is corrupted"
            );

            if block.end() == next.offset {
                block.len = block
                    .len
                    .checked_add(next.len)
                    .expect("coalesced blocks always lie within the arena");
                _ = inner.free.remove(insert_at);
            }
        }

        // Coalesce with the preceding block, if contiguous.
        if insert_at > 0 {
            let prev_at = insert_at
                .checked_sub(1)
                .expect("insert_at was just verified to be positive");

            let prev = *inner
                .free
                .get(prev_at)
                .expect("prev_at is a valid free list position");

            debug_assert!(
                prev.end() <= block.offset,
                "released lease overlaps the free list - pool accounting is corrupted"
            );

            if prev.end() == block.offset {
                inner
                    .free
                    .get_mut(prev_at)
                    .expect("prev_at is a valid free list position")
                    .len = prev
                    .len
                    .checked_add(block.len)
                    .expect("coalesced blocks always lie within the arena");
                return;
            }
        }

        inner.free.insert(insert_at, block);
    }

    /// The size of the arena, in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().expect(ERR_POISONED_LOCK).arena.len()
    }

    /// The number of bytes currently held by live leases.
    ///
    /// Always less than or equal to [`capacity()`][Self::capacity].
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.lock().expect(ERR_POISONED_LOCK).in_use
    }

    /// How many store requests have been refused because the arena could not satisfy them.
    ///
    /// Monotonically increasing. A non-zero value in production means the deployment is
    /// undersized for its traffic.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Diagnostic-only counter; mutation would be invisible to behavior.
    pub fn exhausted_count(&self) -> u64 {
        self.inner.lock().expect(ERR_POISONED_LOCK).exhausted
    }
}
