//! Bounded single-producer single-consumer event channels with pool-backed payloads.
//!
//! This crate is the producer-facing half of a deterministic event dispatch deployment.
//! A [`port_pair()`] connects one producer context (an interrupt-like CAN reception
//! routine, an application send-request path) to one dispatcher through a fixed-depth
//! FIFO ring. Payload bytes never touch the general heap in steady state: the sender
//! copies them into a [`bounded_pool::BytePool`] lease and the receiver copies them back
//! out and releases the lease, all within the footprint reserved at setup time.
//!
//! [`EventSender`] bundles one or more sender ports ("connection points") behind the
//! single [`post_event()`][EventSender::post_event] surface that generated middleware
//! code calls.
//!
//! # Non-blocking by design
//!
//! Nothing in this crate waits. A send either succeeds or fails immediately -
//! [`SendError`] says why - and every failure increments the pair's blocked counter so
//! diagnostics can tell an undersized deployment from a healthy one.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bounded_pool::BytePool;
//! use frame_channel::{EventKind, ProducerHandle, port_pair};
//! use new_zealand::nz;
//!
//! let pool = Arc::new(BytePool::builder().capacity(nz!(1024)).build());
//! let (mut tx, mut rx) = port_pair(nz!(8), 64, &pool);
//!
//! // Producer context, possibly another thread:
//! tx.try_send(EventKind::new(1), ProducerHandle::new(0), &[0xDE, 0xAD])
//!     .expect("ring has room");
//!
//! // Dispatcher context:
//! let event = rx.try_recv().expect("one event is queued");
//! assert_eq!(event.payload(), &[0xDE, 0xAD]);
//! ```

mod event;
mod ports;
mod ring;
mod sender;

pub use event::*;
pub use ports::*;
pub(crate) use ring::*;
pub use sender::*;
