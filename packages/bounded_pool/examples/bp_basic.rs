//! Basic usage of the `bounded_pool` crate:
//!
//! * Building a pool of fixed capacity.
//! * Storing payloads and holding leases.
//! * Observing exhaustion instead of growth.
//! * Releasing leases back to the arena.

use bounded_pool::BytePool;
use new_zealand::nz;

fn main() {
    let pool = BytePool::builder().capacity(nz!(256)).build();

    // Storing a payload copies it into the arena and yields a lease.
    let first = pool.store(&[0x11; 100]).expect("arena has room");
    let second = pool.store(&[0x22; 100]).expect("arena has room");

    println!(
        "Pool holds {} of {} bytes across live leases",
        pool.in_use(),
        pool.capacity()
    );

    // A third 100-byte payload does not fit; the pool refuses rather than grows.
    assert!(pool.store(&[0x33; 100]).is_none());
    println!(
        "Refused store requests so far: {}",
        pool.exhausted_count()
    );

    // Reading copies the bytes back out; the lease stays live until released.
    let mut buf = [0_u8; 100];
    let len = pool.read_into(&first, &mut buf);
    println!("Read back {len} bytes, first is {:#04x}", buf[0]);

    pool.release(first);
    pool.release(second);

    println!("After release the arena is empty: {} bytes in use", pool.in_use());
}
