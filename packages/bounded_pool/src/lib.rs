//! A fixed-capacity byte pool that hands out leases instead of pointers and never grows.
//!
//! This crate provides [`BytePool`], a mutex-guarded arena of bytes whose capacity is fixed
//! at construction time. Callers copy payloads in with [`store()`][BytePool::store] and get
//! back a [`Lease`] - a move-only handle that identifies the stored bytes without borrowing
//! the pool. The bytes are read back with [`read_into()`][BytePool::read_into] or
//! [`with_bytes()`][BytePool::with_bytes] and returned with [`release()`][BytePool::release].
//!
//! The pool is the one structure in a dispatch deployment that is genuinely shared between
//! threads, so it carries its own lock; everything built on top of it can stay lock-free or
//! single-threaded.
//!
//! # Determinism
//!
//! The arena is allocated once, up front. There is no grow or shrink operation, so the
//! worst-case memory footprint of a deployment is known the moment the pool is built.
//! When the arena cannot satisfy a request, [`store()`][BytePool::store] reports the
//! failure to the caller and counts it; it never falls back to the general heap.
//!
//! # Example
//!
//! ```rust
//! use bounded_pool::BytePool;
//! use new_zealand::nz;
//!
//! let pool = BytePool::builder().capacity(nz!(256)).build();
//!
//! let lease = pool.store(b"frame payload").expect("pool has room");
//! assert_eq!(pool.in_use(), 13);
//!
//! let mut buf = [0_u8; 64];
//! let len = pool.read_into(&lease, &mut buf);
//! assert_eq!(&buf[..len], b"frame payload");
//!
//! pool.release(lease);
//! assert_eq!(pool.in_use(), 0);
//! ```

mod builder;
mod pool;

pub use builder::*;
pub use pool::*;
