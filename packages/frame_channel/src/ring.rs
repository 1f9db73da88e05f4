use std::cell::UnsafeCell;
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};

use bounded_pool::Lease;
use num_integer::Integer;

use crate::{EventKind, ProducerHandle};

/// One queued event. The tag pair travels inline; the payload bytes stay in the pool,
/// identified by the lease, until the consumer takes the event out.
#[derive(Debug)]
pub(crate) struct QueuedEvent {
    pub(crate) kind: EventKind,
    pub(crate) handle: ProducerHandle,
    pub(crate) lease: Lease,
}

/// A bounded single-producer single-consumer ring of queued events.
///
/// `head` and `tail` are monotonic sequence numbers; the slot of sequence number `n` is
/// `n mod depth`. The producer owns `tail` and only observes `head`; the consumer owns
/// `head` and only observes `tail`. A slot is published by the release store of the
/// advanced counter and claimed by the matching acquire load on the other side, so each
/// slot is accessed by exactly one side at any time.
#[derive(Debug)]
pub(crate) struct Ring {
    slots: Box<[UnsafeCell<Option<QueuedEvent>>]>,

    /// Sequence number of the next slot to read. Written only by the consumer.
    head: AtomicUsize,

    /// Sequence number of the next slot to write. Written only by the producer.
    tail: AtomicUsize,
}

// SAFETY: The ring hands each slot to exactly one side at a time: the producer writes a
// slot strictly before the release store that publishes it, and the consumer reads it
// strictly after the acquire load that observes that store. `QueuedEvent` itself is `Send`.
unsafe impl Send for Ring {}

// SAFETY: See above - the head/tail protocol guarantees no slot is ever accessed from two
// threads at once, and the port types restrict each end to a single caller via `&mut self`.
unsafe impl Sync for Ring {}

impl Ring {
    pub(crate) fn new(depth: NonZero<usize>) -> Self {
        let mut slots = Vec::with_capacity(depth.get());
        slots.resize_with(depth.get(), || UnsafeCell::new(None));

        Self {
            slots: slots.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Enqueues one event. Never blocks: when the ring is at depth the event is handed
    /// back to the caller, who is responsible for the lease it carries.
    pub(crate) fn push(&self, event: QueuedEvent) -> Result<(), QueuedEvent> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) == self.slots.len() {
            return Err(event);
        }

        let (_, slot_index) = tail.div_rem(&self.slots.len());

        let slot = self
            .slots
            .get(slot_index)
            .expect("slot index is a residue modulo the slot count");

        // SAFETY: The slot at `tail` is unpublished, so only the producer (us) may touch
        // it, and `&mut self`-based ports guarantee a single producer thread.
        unsafe {
            *slot.get() = Some(event);
        }

        self.tail.store(tail.wrapping_add(1), Ordering::Release);

        Ok(())
    }

    /// Dequeues one event, oldest first, if any is published.
    pub(crate) fn pop(&self) -> Option<QueuedEvent> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let (_, slot_index) = head.div_rem(&self.slots.len());

        let slot = self
            .slots
            .get(slot_index)
            .expect("slot index is a residue modulo the slot count");

        // SAFETY: The slot at `head` was published by the producer's release store that we
        // observed via the acquire load of `tail`, and the producer will not touch it again
        // until we advance `head`.
        let event = unsafe { (*slot.get()).take() };

        self.head.store(head.wrapping_add(1), Ordering::Release);

        Some(event.expect("a published slot always contains an event"))
    }
}
