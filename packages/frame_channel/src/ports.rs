use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bounded_pool::BytePool;

use crate::{EventKind, EventView, ProducerHandle, QueuedEvent, Ring};

/// Why a send failed. Every variant means the event was dropped; none of them means
/// anybody waited.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SendError {
    /// The ring already holds `depth` events. The oldest ones have not been dequeued yet.
    #[error("the queue is at its configured depth and the event was dropped")]
    QueueFull,

    /// The payload exceeds the maximum configured for this port pair. Oversized payloads
    /// fail outright - they are never truncated.
    #[error("payload of {len} bytes exceeds the configured maximum of {max}")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
        /// Maximum payload length this port pair accepts.
        max: usize,
    },

    /// The payload pool had no chunk left for the payload. In a correctly sized
    /// deployment this never happens.
    #[error("the payload pool could not satisfy the request and the event was dropped")]
    PoolExhausted,
}

/// State shared by the two ends of a port pair.
#[derive(Debug)]
struct Channel {
    ring: Ring,
    pool: Arc<BytePool>,
    max_payload: usize,

    /// Events dropped at the sender side, for any reason. Monotonic.
    blocked: AtomicU64,
}

impl Channel {
    fn note_blocked(&self) {
        _ = self.blocked.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Events still queued at teardown hold pool leases; hand them back so the pool's
        // accounting stays exact even across partial shutdowns.
        while let Some(event) = self.ring.pop() {
            self.pool.release(event.lease);
        }
    }
}

/// Creates a connected sender-port/receiver-port pair.
///
/// The two ports form a bounded FIFO channel for exactly one producer context and exactly
/// one consumer (a dispatcher). `depth` fixes how many events may be in flight; payloads
/// up to `max_payload` bytes are copied into `pool` on send and back out on receive.
///
/// Everything the channel will ever own is reserved here, during the single-threaded
/// setup phase: the ring slots and the receiver's scratch buffer. Nothing is allocated
/// per event except the pool lease.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use bounded_pool::BytePool;
/// use frame_channel::{EventKind, ProducerHandle, port_pair};
/// use new_zealand::nz;
///
/// let pool = Arc::new(BytePool::builder().capacity(nz!(256)).build());
/// let (mut tx, mut rx) = port_pair(nz!(4), 8, &pool);
///
/// tx.try_send(EventKind::new(1), ProducerHandle::new(7), b"frame")
///     .expect("ring has room");
///
/// let event = rx.try_recv().expect("one event is queued");
/// assert_eq!(event.producer_handle().get(), 7);
/// assert_eq!(event.payload(), b"frame");
/// ```
#[must_use]
pub fn port_pair(
    depth: NonZero<usize>,
    max_payload: usize,
    pool: &Arc<BytePool>,
) -> (SenderPort, ReceiverPort) {
    let channel = Arc::new(Channel {
        ring: Ring::new(depth),
        pool: Arc::clone(pool),
        max_payload,
        blocked: AtomicU64::new(0),
    });

    (
        SenderPort {
            channel: Arc::clone(&channel),
        },
        ReceiverPort {
            scratch: vec![0; max_payload].into_boxed_slice(),
            channel,
        },
    )
}

/// The write end of a port pair; one per producer context.
///
/// Sending never blocks: it either copies the event in or reports why it could not, and
/// a failed send increments the pair's blocked counter. This keeps the producer side
/// safe to call from interrupt-like contexts that must not wait on the consumer.
///
/// The port is `Send` but all sending goes through `&mut self`, so exactly one thread
/// at a time can act as the producer.
#[derive(Debug)]
pub struct SenderPort {
    channel: Arc<Channel>,
}

impl SenderPort {
    /// Enqueues one event for the connected receiver port.
    ///
    /// On success the payload has been copied into the pool and the event is visible to
    /// the consumer in FIFO position. On failure the event is gone - there is no retry
    /// queue - and the blocked counter has been incremented.
    pub fn try_send(
        &mut self,
        kind: EventKind,
        handle: ProducerHandle,
        payload: &[u8],
    ) -> Result<(), SendError> {
        if payload.len() > self.channel.max_payload {
            self.channel.note_blocked();
            return Err(SendError::PayloadTooLarge {
                len: payload.len(),
                max: self.channel.max_payload,
            });
        }

        let Some(lease) = self.channel.pool.store(payload) else {
            self.channel.note_blocked();
            return Err(SendError::PoolExhausted);
        };

        match self.channel.ring.push(QueuedEvent {
            kind,
            handle,
            lease,
        }) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                // The ring did not take the event, so the lease comes straight back.
                self.channel.pool.release(rejected.lease);
                self.channel.note_blocked();
                Err(SendError::QueueFull)
            }
        }
    }

    /// How many events have been dropped at this pair's sender side. Monotonic.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Diagnostic-only counter; mutation would be invisible to behavior.
    pub fn blocked_count(&self) -> u64 {
        self.channel.blocked.load(Ordering::Relaxed)
    }

    /// The number of events the ring can hold.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.channel.ring.depth()
    }

    /// The maximum payload length this pair accepts.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.channel.max_payload
    }
}

/// The read end of a port pair; owned by exactly one dispatcher.
///
/// Dequeuing returns at most one event per call. The payload of the returned view lives
/// in the port's own scratch buffer, so it is valid until the next dequeue - long enough
/// for the dispatcher to run one callback, which is the only consumer the engine has.
#[derive(Debug)]
pub struct ReceiverPort {
    channel: Arc<Channel>,
    scratch: Box<[u8]>,
}

impl ReceiverPort {
    /// Dequeues the oldest queued event, if any.
    ///
    /// The payload bytes are copied out of the pool into the port's scratch buffer and
    /// the pool chunk is released before this returns, so pool occupancy reflects only
    /// events that are actually in flight.
    pub fn try_recv(&mut self) -> Option<EventView<'_>> {
        let event = self.channel.ring.pop()?;

        let len = self.channel.pool.read_into(&event.lease, &mut self.scratch);
        self.channel.pool.release(event.lease);

        Some(EventView::new(
            event.kind,
            event.handle,
            self.scratch
                .get(..len)
                .expect("the copied length never exceeds the scratch buffer"),
        ))
    }

    /// How many events have been dropped at this pair's sender side. Monotonic.
    ///
    /// Exposed on both ends so the dispatcher's owner can collect diagnostics without
    /// reaching into producer contexts.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Diagnostic-only counter; mutation would be invisible to behavior.
    pub fn blocked_count(&self) -> u64 {
        self.channel.blocked.load(Ordering::Relaxed)
    }

    /// The number of events the ring can hold.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.channel.ring.depth()
    }

    /// The maximum payload length this pair accepts.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.channel.max_payload
    }
}
