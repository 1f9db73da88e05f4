/// A producer-chosen tag classifying the events that travel through a channel.
///
/// The dispatch layer treats the value as opaque; it only has to match between the code
/// that posts events and the handle map that resolves them. Typical deployments use one
/// kind per traffic class (e.g. frame reception vs. transmission confirmation).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EventKind(u16);

impl EventKind {
    /// Wraps a raw kind tag.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// The raw kind tag.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// An opaque per-event handle assigned by the producer.
///
/// The value is meaningful only to the handle map bound to the receiving dispatcher,
/// which translates it into a dense event-source index. A handle the map cannot resolve
/// causes the event to be dropped and counted, never a failure of the dispatch loop.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProducerHandle(u32);

impl ProducerHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// A dequeued event, as seen by the consumer.
///
/// The payload borrows the receiver port's scratch buffer and is valid until the next
/// dequeue from the same port. Consumers that need the bytes longer must copy them.
#[derive(Debug)]
pub struct EventView<'a> {
    kind: EventKind,
    handle: ProducerHandle,
    payload: &'a [u8],
}

impl<'a> EventView<'a> {
    pub(crate) fn new(kind: EventKind, handle: ProducerHandle, payload: &'a [u8]) -> Self {
        Self {
            kind,
            handle,
            payload,
        }
    }

    /// The kind tag the producer posted this event with.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The producer-assigned handle this event was posted with.
    #[must_use]
    pub fn producer_handle(&self) -> ProducerHandle {
        self.handle
    }

    /// The event payload.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
