use std::fmt;
use std::time::Duration;

use frame_channel::{EventKind, ProducerHandle, ReceiverPort};

use crate::source::SourceSlot;
use crate::timer::TimerSlab;
use crate::{
    CallbackContext, CallbackFn, HandleMap, MapInsertError, SourceClass, SourceIndex, Trigger,
};

/// Identifies one dispatcher within a [`DispatcherSystem`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DispatcherId {
    index: usize,
}

/// Why an event source could not be registered.
///
/// Both variants are configuration errors under the engine's static sizing contract - a
/// correctly sized deployment registers everything it was built for. They surface as
/// `Err` rather than panicking outright so setup code can report *which* registration
/// exceeded the budget before failing.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum RegisterError {
    /// The system-wide maximum for this class of sources is already reached.
    #[error("the dispatcher system is at its configured capacity of {max} sources of this class")]
    CapacityExhausted {
        /// Which registry ran out.
        class: SourceClass,
        /// The configured maximum for that registry.
        max: usize,
    },

    /// The dispatcher's handle map refused to record the association.
    #[error(transparent)]
    HandleMapRejected(#[from] MapInsertError),
}

/// Builder for creating an instance of [`DispatcherSystem`].
///
/// Every capacity is mandatory and final: the registries and timer arenas they size are
/// reserved during construction and never resized. This is where a deployment's
/// worst-case footprint is decided.
#[derive(Debug)]
#[must_use]
pub struct DispatcherSystemBuilder {
    max_dispatchers: Option<usize>,
    max_external_sources: Option<usize>,
    max_internal_sources: Option<usize>,
    max_timers: Option<usize>,
}

impl DispatcherSystemBuilder {
    pub(crate) fn new() -> Self {
        Self {
            max_dispatchers: None,
            max_external_sources: None,
            max_internal_sources: None,
            max_timers: None,
        }
    }

    /// Sets how many dispatchers the system will hold.
    pub fn max_dispatchers(mut self, max: usize) -> Self {
        self.max_dispatchers = Some(max);
        self
    }

    /// Sets the system-wide maximum of external event sources, across all dispatchers.
    pub fn max_external_sources(mut self, max: usize) -> Self {
        self.max_external_sources = Some(max);
        self
    }

    /// Sets the system-wide maximum of internal event sources, across all dispatchers.
    pub fn max_internal_sources(mut self, max: usize) -> Self {
        self.max_internal_sources = Some(max);
        self
    }

    /// Sets how many live timers each dispatcher's arena holds room for.
    pub fn max_timers(mut self, max: usize) -> Self {
        self.max_timers = Some(max);
        self
    }

    /// Builds the system with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if any capacity was left unset.
    #[must_use]
    pub fn build(self) -> DispatcherSystem {
        let max_dispatchers = self
            .max_dispatchers
            .expect("a dispatcher count is required to build a DispatcherSystem");

        DispatcherSystem {
            dispatchers: Vec::with_capacity(max_dispatchers),
            max_dispatchers,
            max_external: self
                .max_external_sources
                .expect("an external source capacity is required to build a DispatcherSystem"),
            max_internal: self
                .max_internal_sources
                .expect("an internal source capacity is required to build a DispatcherSystem"),
            max_timers: self
                .max_timers
                .expect("a timer capacity is required to build a DispatcherSystem"),
            used_external: 0,
            used_internal: 0,
        }
    }
}

/// One dispatcher: its input ports, its registries, its timers, its clock.
struct Dispatcher {
    ports: Vec<ReceiverPort>,
    handle_map: Box<dyn HandleMap + Send>,
    tick_period: Duration,

    /// Advanced once per [`DispatcherSystem::dispatch_tick()`] call; the engine's only
    /// notion of time.
    tick: u64,

    external: Vec<SourceSlot>,
    internal: Vec<SourceSlot>,
    timers: TimerSlab,

    /// Events dequeued but not deliverable: handle map misses and out-of-range or
    /// wrong-class lookups. Monotonic.
    dropped: u64,
}

/// A set of dispatchers sharing one static capacity budget.
///
/// The system is the engine's single root value: it owns every registry, timer arena and
/// counter, and every operation takes it by reference. There is no global state anywhere
/// in the engine, so two systems in one process cannot interfere.
///
/// # Life cycle
///
/// Construction and registration happen in a single-threaded setup phase:
/// [`builder()`][Self::builder], then [`add_dispatcher()`][Self::add_dispatcher] per
/// dispatcher, then source registration. Once threads start, the only entry point that
/// may be called is [`dispatch_tick()`][Self::dispatch_tick] - once per tick period, from
/// the one thread that owns the dispatcher in question. The `&mut self` receiver makes
/// concurrent entry unrepresentable; what it cannot express is *which* thread calls, so
/// keep each dispatcher with one owning thread for its entire life.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use bounded_pool::BytePool;
/// use frame_channel::{EventKind, ProducerHandle, port_pair};
/// use new_zealand::nz;
/// use tick_dispatch::{DispatcherSystem, OneToOneHandleMap, Trigger};
///
/// let pool = Arc::new(BytePool::builder().capacity(nz!(256)).build());
/// let (mut tx, rx) = port_pair(nz!(4), 8, &pool);
///
/// let mut system = DispatcherSystem::builder()
///     .max_dispatchers(1)
///     .max_external_sources(4)
///     .max_internal_sources(1)
///     .max_timers(4)
///     .build();
///
/// let engine = system.add_dispatcher(
///     vec![rx],
///     Box::new(OneToOneHandleMap::new(0)),
///     Duration::from_millis(10),
/// );
///
/// system
///     .register_external_source(engine, EventKind::new(1), ProducerHandle::new(0), |cx| {
///         assert!(matches!(cx.trigger(), Trigger::Event(_)));
///     })
///     .expect("capacity was sized for this");
///
/// tx.try_send(EventKind::new(1), ProducerHandle::new(0), b"frame")
///     .expect("ring has room");
///
/// system.dispatch_tick(engine);
/// assert_eq!(system.tick(engine), 1);
/// ```
pub struct DispatcherSystem {
    dispatchers: Vec<Dispatcher>,
    max_dispatchers: usize,
    max_external: usize,
    max_internal: usize,
    max_timers: usize,
    used_external: usize,
    used_internal: usize,
}

impl fmt::Debug for DispatcherSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherSystem")
            .field("dispatchers", &self.dispatchers.len())
            .field("external_sources", &self.used_external)
            .field("internal_sources", &self.used_internal)
            .finish_non_exhaustive()
    }
}

impl DispatcherSystem {
    /// Starts building a new [`DispatcherSystem`].
    pub fn builder() -> DispatcherSystemBuilder {
        DispatcherSystemBuilder::new()
    }

    /// Binds a new dispatcher to its receiver ports and handle mapping strategy.
    ///
    /// The order of `ports` is final: every [`dispatch_tick()`][Self::dispatch_tick]
    /// services them in exactly this order. `tick_period` records the real-time cadence
    /// at which the owning thread promises to call `dispatch_tick`; the engine itself
    /// counts only ticks, but the embedding scheduler reads the period back through
    /// [`tick_period()`][Self::tick_period].
    ///
    /// # Panics
    ///
    /// Panics when the system already holds the configured number of dispatchers.
    pub fn add_dispatcher(
        &mut self,
        ports: Vec<ReceiverPort>,
        handle_map: Box<dyn HandleMap + Send>,
        tick_period: Duration,
    ) -> DispatcherId {
        assert!(
            self.dispatchers.len() < self.max_dispatchers,
            "the dispatcher system was built for {} dispatchers",
            self.max_dispatchers
        );

        self.dispatchers.push(Dispatcher {
            ports,
            handle_map,
            tick_period,
            tick: 0,
            external: Vec::with_capacity(self.max_external),
            internal: Vec::with_capacity(self.max_internal),
            timers: TimerSlab::new(self.max_timers),
            dropped: 0,
        });

        DispatcherId {
            index: self
                .dispatchers
                .len()
                .checked_sub(1)
                .expect("a dispatcher was just pushed, so the list is not empty"),
        }
    }

    /// Registers an event source fed by this dispatcher's receiver ports.
    ///
    /// The returned dense index equals the source's registration order on its
    /// dispatcher. The association `(kind, producer_handle) -> index` is recorded in the
    /// dispatcher's handle map so arriving events can be resolved.
    pub fn register_external_source(
        &mut self,
        dispatcher: DispatcherId,
        kind: EventKind,
        producer_handle: ProducerHandle,
        callback: impl CallbackFn,
    ) -> Result<SourceIndex, RegisterError> {
        if self.used_external == self.max_external {
            return Err(RegisterError::CapacityExhausted {
                class: SourceClass::External,
                max: self.max_external,
            });
        }

        let entry = self.dispatcher_mut(dispatcher);

        let index = SourceIndex::external(entry.external.len());

        entry.handle_map.insert(kind, producer_handle, index)?;

        entry.external.push(SourceSlot {
            callback: Some(Box::new(callback)),
        });

        self.used_external = self
            .used_external
            .checked_add(1)
            .expect("bounded by max_external, which fits in usize");

        Ok(index)
    }

    /// Registers a software-only event source and bootstraps it.
    ///
    /// The callback runs exactly once, right here, with a [`Trigger::SourceInit`]
    /// context - the only callback invocation that ever happens outside the per-tick
    /// loop. Registration is part of the single-threaded setup phase, so the bootstrap
    /// is guaranteed to precede all dispatching; its purpose is to let the source
    /// install the timers that will drive it from then on.
    pub fn register_internal_source(
        &mut self,
        dispatcher: DispatcherId,
        callback: impl CallbackFn,
    ) -> Result<SourceIndex, RegisterError> {
        if self.used_internal == self.max_internal {
            return Err(RegisterError::CapacityExhausted {
                class: SourceClass::Internal,
                max: self.max_internal,
            });
        }

        let entry = self.dispatcher_mut(dispatcher);

        let index = SourceIndex::internal(entry.internal.len());

        let mut callback: crate::EventCallback = Box::new(callback);

        let mut cx = CallbackContext::new(
            &mut entry.timers,
            entry.tick,
            Trigger::SourceInit,
            index,
            None,
            None,
            None,
        );
        callback(&mut cx);

        entry.internal.push(SourceSlot {
            callback: Some(callback),
        });

        self.used_internal = self
            .used_internal
            .checked_add(1)
            .expect("bounded by max_internal, which fits in usize");

        Ok(index)
    }

    /// Runs one tick of one dispatcher. This is the engine's sole periodic entry point;
    /// call it once per tick period from the dispatcher's owning thread.
    ///
    /// One call performs, in this fixed order:
    ///
    /// 1. Services every bound receiver port once, in port order, dequeuing **at most
    ///    one** event per port. Each event is resolved through the handle map to an
    ///    external source and its callback runs; an unresolvable event is dropped and
    ///    counted. Draining one event per port per tick is what makes the loop
    ///    starvation-free: no queue, however busy, can keep another from being serviced.
    /// 2. Advances the tick counter by one and fires every timer that is now due, in
    ///    timer-slot order.
    ///
    /// With empty queues and no due timer a call performs zero callback invocations and
    /// changes nothing but the tick counter.
    pub fn dispatch_tick(&mut self, dispatcher: DispatcherId) {
        let entry = self.dispatcher_mut(dispatcher);

        // Split borrows: ports, registry, timers and counters are disjoint fields, and
        // the callback contract only hands user code the timer arena (via the context).
        let Dispatcher {
            ports,
            handle_map,
            tick,
            external,
            timers,
            dropped,
            ..
        } = entry;

        for port in ports.iter_mut() {
            let Some(event) = port.try_recv() else {
                continue;
            };

            let Some(index) = handle_map.lookup(event.kind(), event.producer_handle()) else {
                *dropped = count_drop(*dropped);
                continue;
            };

            if index.class() != SourceClass::External {
                *dropped = count_drop(*dropped);
                continue;
            }

            let Some(slot) = external.get_mut(index.get()) else {
                // The map answered with an index nothing was registered under. Treated
                // exactly like a miss: the dispatch loop must survive any map.
                *dropped = count_drop(*dropped);
                continue;
            };

            let mut callback = slot
                .callback
                .take()
                .expect("a registered source holds its callback whenever it is not running");

            let mut cx = CallbackContext::new(
                timers,
                *tick,
                Trigger::Event(event.kind()),
                index,
                Some(event.payload()),
                None,
                None,
            );
            callback(&mut cx);

            slot.callback = Some(callback);
        }

        *tick = tick
            .checked_add(1)
            .expect("tick arithmetic cannot realistically overflow u64");
        let now = *tick;

        // Slot order, bounded before the sweep: timers armed during the sweep are never
        // due on the tick that armed them, so they cannot be missed, only deferred to
        // where they belong.
        for slot in 0..timers.slot_count() {
            let Some(firing) = timers.begin_fire(slot, now) else {
                continue;
            };

            let mut callback = firing.callback;

            let mut cx = CallbackContext::new(
                timers,
                now,
                Trigger::TimerElapsed,
                firing.owner,
                None,
                Some(crate::TimerHandle { slot }),
                Some(firing.context_datum),
            );
            callback(&mut cx);

            timers.finish_fire(slot, now, callback);
        }
    }

    /// The number of dispatchers added so far.
    #[must_use]
    pub fn dispatcher_count(&self) -> usize {
        self.dispatchers.len()
    }

    /// The number of external sources registered on the given dispatcher.
    #[must_use]
    pub fn external_source_count(&self, dispatcher: DispatcherId) -> usize {
        self.dispatcher_ref(dispatcher).external.len()
    }

    /// The number of internal sources registered on the given dispatcher.
    #[must_use]
    pub fn internal_source_count(&self, dispatcher: DispatcherId) -> usize {
        self.dispatcher_ref(dispatcher).internal.len()
    }

    /// The given dispatcher's current tick count.
    #[must_use]
    pub fn tick(&self, dispatcher: DispatcherId) -> u64 {
        self.dispatcher_ref(dispatcher).tick
    }

    /// The real-time cadence the given dispatcher was configured for.
    #[must_use]
    pub fn tick_period(&self, dispatcher: DispatcherId) -> Duration {
        self.dispatcher_ref(dispatcher).tick_period
    }

    /// How many dequeued events the given dispatcher has dropped because no registered
    /// source could be resolved for them. Monotonic.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Diagnostic-only counter; mutation would be invisible to behavior.
    pub fn dropped_count(&self, dispatcher: DispatcherId) -> u64 {
        self.dispatcher_ref(dispatcher).dropped
    }

    /// How many timers the given dispatcher currently holds, armed or idle.
    #[must_use]
    pub fn live_timer_count(&self, dispatcher: DispatcherId) -> usize {
        self.dispatcher_ref(dispatcher).timers.live_count()
    }

    fn dispatcher_ref(&self, dispatcher: DispatcherId) -> &Dispatcher {
        self.dispatchers
            .get(dispatcher.index)
            .expect("a DispatcherId is only ever minted by add_dispatcher on this system")
    }

    fn dispatcher_mut(&mut self, dispatcher: DispatcherId) -> &mut Dispatcher {
        self.dispatchers
            .get_mut(dispatcher.index)
            .expect("a DispatcherId is only ever minted by add_dispatcher on this system")
    }
}

fn count_drop(dropped: u64) -> u64 {
    dropped
        .checked_add(1)
        .expect("a monotonic u64 diagnostic counter cannot realistically overflow")
}
