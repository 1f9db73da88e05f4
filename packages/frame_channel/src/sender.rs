use std::fmt;

use crate::{EventKind, ProducerHandle, SendError, SenderPort};

/// Picks the destination connection point for a posted event.
///
/// Returns the index of the port to use, or `None` when the event has no destination,
/// in which case the post fails with [`PostError::NoRoute`].
pub type PortRouter = Box<dyn Fn(EventKind, ProducerHandle) -> Option<usize> + Send>;

/// Why a post failed. Every variant means the event was dropped.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum PostError {
    /// The bound port refused the event; see the inner error for the reason.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The router declined the event or named a connection point that does not exist.
    #[error("no connection point routes this event")]
    NoRoute,
}

/// Bundles one or more sender ports ("connection points") under a single posting surface.
///
/// Independent producer contexts each get their own `EventSender` so they never share a
/// handle-to-port map: a sender with exactly one port posts straight to it, and a sender
/// with several uses the router supplied at construction to pick the destination.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use bounded_pool::BytePool;
/// use frame_channel::{EventKind, EventSender, ProducerHandle, port_pair};
/// use new_zealand::nz;
///
/// let pool = Arc::new(BytePool::builder().capacity(nz!(256)).build());
/// let (tx, _rx) = port_pair(nz!(4), 8, &pool);
///
/// let mut sender = EventSender::new(tx);
/// sender
///     .post_event(EventKind::new(1), ProducerHandle::new(0), b"frame")
///     .expect("ring has room");
/// ```
pub struct EventSender {
    ports: Vec<SenderPort>,
    router: Option<PortRouter>,
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("ports", &self.ports.len())
            .field("has_router", &self.router.is_some())
            .finish()
    }
}

impl EventSender {
    /// Creates a sender around exactly one connection point.
    ///
    /// With a single port there is nothing to route; every event goes to it directly.
    #[must_use]
    pub fn new(port: SenderPort) -> Self {
        Self {
            ports: vec![port],
            router: None,
        }
    }

    /// Creates a sender around several connection points plus the router that picks
    /// between them.
    ///
    /// # Panics
    ///
    /// Panics if `ports` is empty - a sender with nowhere to send is a configuration
    /// error, not a runtime condition.
    #[must_use]
    pub fn with_router(
        ports: Vec<SenderPort>,
        router: impl Fn(EventKind, ProducerHandle) -> Option<usize> + Send + 'static,
    ) -> Self {
        assert!(
            !ports.is_empty(),
            "an EventSender requires at least one connection point"
        );

        Self {
            ports,
            router: Some(Box::new(router)),
        }
    }

    /// Posts one event toward the dispatcher connected to the selected port.
    ///
    /// Non-blocking like everything on the producer side: the event is either enqueued
    /// or dropped-and-counted, and the error says which constraint refused it.
    pub fn post_event(
        &mut self,
        kind: EventKind,
        handle: ProducerHandle,
        payload: &[u8],
    ) -> Result<(), PostError> {
        let port_index = if self.ports.len() == 1 {
            0
        } else {
            let router = self
                .router
                .as_ref()
                .expect("construction guarantees a router whenever there is more than one port");

            router(kind, handle).ok_or(PostError::NoRoute)?
        };

        let port = self
            .ports
            .get_mut(port_index)
            .ok_or(PostError::NoRoute)?;

        port.try_send(kind, handle, payload)?;

        Ok(())
    }

    /// The number of connection points this sender owns.
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Events dropped across all of this sender's connection points. Monotonic.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Diagnostic-only counter; mutation would be invisible to behavior.
    pub fn blocked_count(&self) -> u64 {
        self.ports
            .iter()
            .map(SenderPort::blocked_count)
            .fold(0, |total, count| {
                total
                    .checked_add(count)
                    .expect("summing a handful of u64 diagnostic counters cannot overflow")
            })
    }
}
