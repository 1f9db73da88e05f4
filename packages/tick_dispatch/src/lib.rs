//! Deterministic tick-driven event dispatching with dense-handle sources and pool-backed
//! timers.
//!
//! This crate is the consumer-facing core of a CAN-bus middleware deployment. Producer
//! threads hand frames to [`frame_channel`] ports; a [`DispatcherSystem`] owns the other
//! end of those ports and, once per tick, drains them and advances its timers, invoking
//! registered callbacks through one uniform [`CallbackContext`] surface.
//!
//! Everything is sized once, at construction, and never resized: the source registries,
//! the timer arenas, the handle maps. That is the engine's determinism guarantee - the
//! worst case is the configured case.
//!
//! # Dispatching model
//!
//! * **External sources** are fed by receiver ports. Each dequeued event carries a
//!   producer-assigned handle; the dispatcher's [`HandleMap`] translates it into the
//!   dense index assigned at registration. Unresolvable events are dropped and counted,
//!   never fatal.
//! * **Internal sources** run their callback exactly once, at registration, to bootstrap
//!   timers - the engine's way of starting periodic work before any frame arrives.
//! * **Timers** are periodic or single-shot, measured in ticks, owned by the source whose
//!   callback created them. Single-shot timers may be retriggered - including by their
//!   own callback, which is how tick-by-tick polling loops are written.
//!
//! Within one dispatcher everything is strictly single-threaded: one owning thread calls
//! [`dispatch_tick()`][DispatcherSystem::dispatch_tick], callbacks never overlap, and no
//! entry point blocks.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bounded_pool::BytePool;
//! use frame_channel::port_pair;
//! use new_zealand::nz;
//! use tick_dispatch::{
//!     DispatcherSystem, EventKind, OneToOneHandleMap, ProducerHandle, Trigger,
//! };
//!
//! let pool = Arc::new(BytePool::builder().capacity(nz!(1024)).build());
//! let (mut tx, rx) = port_pair(nz!(8), 16, &pool);
//!
//! let mut system = DispatcherSystem::builder()
//!     .max_dispatchers(1)
//!     .max_external_sources(2)
//!     .max_internal_sources(1)
//!     .max_timers(8)
//!     .build();
//!
//! let engine = system.add_dispatcher(
//!     vec![rx],
//!     Box::new(OneToOneHandleMap::new(0)),
//!     Duration::from_millis(10),
//! );
//!
//! // An internal source bootstraps a periodic timer at registration time.
//! system
//!     .register_internal_source(engine, |cx| {
//!         if cx.trigger() == Trigger::SourceInit {
//!             _ = cx.create_periodic_timer(nz!(10), |_cx| { /* housekeeping */ }, 0);
//!         }
//!     })
//!     .expect("capacity was sized for this");
//!
//! // An external source receives frames posted by a producer context.
//! system
//!     .register_external_source(engine, EventKind::new(1), ProducerHandle::new(0), |cx| {
//!         let payload = cx.payload().expect("event triggers always carry a payload");
//!         assert_eq!(payload, b"frame");
//!     })
//!     .expect("capacity was sized for this");
//!
//! tx.try_send(EventKind::new(1), ProducerHandle::new(0), b"frame")
//!     .expect("ring has room");
//!
//! // The owning thread calls this once per tick period, forever.
//! system.dispatch_tick(engine);
//! ```

mod context;
mod handle_map;
mod source;
mod system;
mod timer;

pub use context::*;
pub use handle_map::*;
pub use source::*;
pub use system::*;
pub use timer::TimerHandle;

pub use frame_channel::{EventKind, ProducerHandle, ReceiverPort};
