//! Basic usage of the `frame_channel` crate:
//!
//! * Creating a port pair over a shared payload pool.
//! * Posting events from a producer thread.
//! * Draining them on the consumer side.
//! * Observing the blocked counter when the ring is full.

use std::sync::Arc;
use std::thread;

use bounded_pool::BytePool;
use frame_channel::{EventKind, ProducerHandle, port_pair};
use new_zealand::nz;

fn main() {
    let pool = Arc::new(BytePool::builder().capacity(nz!(1024)).build());
    let (mut tx, mut rx) = port_pair(nz!(8), 16, &pool);

    let producer = thread::spawn(move || {
        for n in 0..20_u32 {
            let payload = n.to_le_bytes();
            if tx
                .try_send(EventKind::new(1), ProducerHandle::new(n), &payload)
                .is_err()
            {
                // A full ring drops the event; nobody waits.
                thread::yield_now();
            }
        }
        tx
    });

    let mut received = 0_usize;
    loop {
        match rx.try_recv() {
            Some(event) => {
                println!(
                    "received handle {} with {} payload bytes",
                    event.producer_handle().get(),
                    event.payload().len()
                );
                received += 1;
            }
            None => {
                if producer.is_finished() {
                    break;
                }
                thread::yield_now();
            }
        }
    }

    let tx = producer.join().expect("producer thread panicked");

    // The producer may have squeezed in a few more sends after our last empty poll.
    while let Some(event) = rx.try_recv() {
        println!(
            "received handle {} with {} payload bytes",
            event.producer_handle().get(),
            event.payload().len()
        );
        received += 1;
    }

    println!("delivered {received} events, {} dropped at the sender", tx.blocked_count());
}
