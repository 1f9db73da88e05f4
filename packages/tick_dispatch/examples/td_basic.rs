//! A small end-to-end deployment of the dispatch engine:
//!
//! * One producer thread posting CAN-like frames.
//! * One dispatcher draining them and running a periodic supervision timer.
//! * Everything sized once, up front.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bounded_pool::BytePool;
use frame_channel::port_pair;
use new_zealand::nz;
use tick_dispatch::{DispatcherSystem, EventKind, OneToOneHandleMap, ProducerHandle, Trigger};

const KIND_FRAME_RX: EventKind = EventKind::new(1);

fn main() {
    let pool = Arc::new(BytePool::builder().capacity(nz!(4096)).build());
    let (mut tx, rx) = port_pair(nz!(16), 8, &pool);

    let mut system = DispatcherSystem::builder()
        .max_dispatchers(1)
        .max_external_sources(1)
        .max_internal_sources(1)
        .max_timers(2)
        .build();

    let engine = system.add_dispatcher(
        vec![rx],
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(10),
    );

    // The frame sink: one external source per registered message.
    system
        .register_external_source(engine, KIND_FRAME_RX, ProducerHandle::new(0), |cx| {
            let payload = cx.payload().expect("event triggers always carry a payload");
            println!("frame on source {}: {payload:02x?}", cx.source().get());
        })
        .expect("capacity was sized for this");

    // A supervision task: bootstrapped by an internal source, runs every 5 ticks.
    system
        .register_internal_source(engine, |cx| {
            if cx.trigger() == Trigger::SourceInit {
                _ = cx.create_periodic_timer(
                    nz!(5),
                    |cx| println!("supervision at tick {}", cx.tick()),
                    0,
                );
            }
        })
        .expect("capacity was sized for this");

    // An interrupt-like producer context.
    let producer = thread::spawn(move || {
        for n in 0..10_u8 {
            _ = tx.try_send(KIND_FRAME_RX, ProducerHandle::new(0), &[n, 0xCA, 0xFE]);
            thread::sleep(Duration::from_millis(3));
        }
    });

    // The dispatcher's owning thread: one tick per period, forever (here: 20 ticks).
    for _ in 0..20 {
        system.dispatch_tick(engine);
        thread::sleep(Duration::from_millis(10));
    }

    producer.join().expect("producer thread panicked");

    println!(
        "done after {} ticks, {} events dropped",
        system.tick(engine),
        system.dropped_count(engine)
    );
}
