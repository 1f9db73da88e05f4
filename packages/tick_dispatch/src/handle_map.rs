use frame_channel::{EventKind, ProducerHandle};

use crate::{SourceClass, SourceIndex};

/// Why a handle association could not be recorded at registration time.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum MapInsertError {
    /// An association for this kind and producer handle already exists.
    #[error("an association for this kind and producer handle already exists")]
    DuplicateKey,

    /// The map was built for a fixed number of associations and they are all taken.
    #[error("the map is at its configured capacity of {max} associations")]
    CapacityExhausted {
        /// The configured association capacity.
        max: usize,
    },
}

/// Translates a producer-assigned handle into the dense index of an external event source.
///
/// The dispatcher consults [`lookup()`][Self::lookup] once per dequeued event, on the hot
/// path. A lookup miss is not an error condition for the dispatcher: the event is dropped
/// and counted and the tick continues. [`insert()`][Self::insert] runs only during the
/// single-threaded registration phase; maps that compute their answer instead of storing
/// it keep the default no-op implementation.
pub trait HandleMap {
    /// Records that events carrying `kind` and `handle` belong to the source at `index`.
    ///
    /// Called by the dispatcher system during external-source registration, never by user
    /// code directly.
    fn insert(
        &mut self,
        kind: EventKind,
        handle: ProducerHandle,
        index: SourceIndex,
    ) -> Result<(), MapInsertError> {
        _ = (kind, handle, index);
        Ok(())
    }

    /// Resolves the dense source index for one dequeued event, or `None` when the pair is
    /// unknown - in which case the dispatcher drops the event and increments its dropped
    /// counter.
    fn lookup(&self, kind: EventKind, handle: ProducerHandle) -> Option<SourceIndex>;
}

/// The trivial map for deployments where producer handles are dense by construction.
///
/// It requires that the producer assigns handles in the same order the dispatcher
/// registers sources, so that `handle - offset` *is* the dense index. No association is
/// stored; registration order coincidence is verified in debug builds.
///
/// # Example
///
/// ```rust
/// use frame_channel::{EventKind, ProducerHandle};
/// use tick_dispatch::{HandleMap, OneToOneHandleMap};
///
/// let map = OneToOneHandleMap::new(100);
///
/// let index = map
///     .lookup(EventKind::new(0), ProducerHandle::new(102))
///     .expect("handle is above the offset");
/// assert_eq!(index.get(), 2);
///
/// assert!(map.lookup(EventKind::new(0), ProducerHandle::new(99)).is_none());
/// ```
#[derive(Debug)]
pub struct OneToOneHandleMap {
    offset: u32,
}

impl OneToOneHandleMap {
    /// Creates a map that resolves `handle` to dense index `handle - offset`.
    #[must_use]
    pub fn new(offset: u32) -> Self {
        Self { offset }
    }
}

impl HandleMap for OneToOneHandleMap {
    fn insert(
        &mut self,
        kind: EventKind,
        handle: ProducerHandle,
        index: SourceIndex,
    ) -> Result<(), MapInsertError> {
        _ = kind;

        // The one-to-one contract: registration order on both sides coincides. There is
        // nothing to store, but a violated contract should not wait for production to
        // show up as misdelivered events.
        debug_assert_eq!(
            handle.get().checked_sub(self.offset),
            u32::try_from(index.get()).ok(),
            "one-to-one handle maps require producer handles to follow registration order"
        );
        debug_assert_eq!(index.class(), SourceClass::External);

        Ok(())
    }

    fn lookup(&self, kind: EventKind, handle: ProducerHandle) -> Option<SourceIndex> {
        _ = kind;

        let dense = handle.get().checked_sub(self.offset)?;

        Some(SourceIndex::external(
            usize::try_from(dense).expect("u32 always fits in usize on supported platforms"),
        ))
    }
}

/// A general map backed by a bounded hash table.
///
/// Use this when producer handles are sparse, shared across kinds, or assigned in an
/// order unrelated to registration. Capacity is fixed at construction like every other
/// count in the engine; the table is reserved up front and never rehashes.
///
/// # Example
///
/// ```rust
/// use frame_channel::{EventKind, ProducerHandle};
/// use tick_dispatch::{HandleMap, SourceIndex, TableHandleMap};
///
/// let mut map = TableHandleMap::new(8);
///
/// // Registration normally does this through the dispatcher system.
/// map.insert(
///     EventKind::new(2),
///     ProducerHandle::new(0x500),
///     SourceIndex::external(3),
/// )
/// .expect("map has room");
///
/// let resolved = map
///     .lookup(EventKind::new(2), ProducerHandle::new(0x500))
///     .expect("association was recorded");
/// assert_eq!(resolved.get(), 3);
/// ```
#[derive(Debug)]
pub struct TableHandleMap {
    entries: foldhash::HashMap<(EventKind, ProducerHandle), SourceIndex>,
    max: usize,
}

impl TableHandleMap {
    /// Creates a map with room for `max_associations` entries.
    #[must_use]
    pub fn new(max_associations: usize) -> Self {
        Self {
            entries: foldhash::HashMap::with_capacity_and_hasher(
                max_associations,
                foldhash::fast::RandomState::default(),
            ),
            max: max_associations,
        }
    }
}

impl HandleMap for TableHandleMap {
    fn insert(
        &mut self,
        kind: EventKind,
        handle: ProducerHandle,
        index: SourceIndex,
    ) -> Result<(), MapInsertError> {
        if self.entries.contains_key(&(kind, handle)) {
            return Err(MapInsertError::DuplicateKey);
        }

        if self.entries.len() == self.max {
            return Err(MapInsertError::CapacityExhausted { max: self.max });
        }

        _ = self.entries.insert((kind, handle), index);

        Ok(())
    }

    fn lookup(&self, kind: EventKind, handle: ProducerHandle) -> Option<SourceIndex> {
        self.entries.get(&(kind, handle)).copied()
    }
}
