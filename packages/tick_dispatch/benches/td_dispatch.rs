//! Hot-path benchmarks for the `tick_dispatch` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bounded_pool::BytePool;
use criterion::{Criterion, criterion_group, criterion_main};
use frame_channel::port_pair;
use new_zealand::nz;
use tick_dispatch::{DispatcherSystem, EventKind, OneToOneHandleMap, ProducerHandle};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("td_dispatch");

    // The cost of a tick that has nothing to do - the floor every deployment pays.
    group.bench_function("empty_tick", |b| {
        let pool = Arc::new(BytePool::builder().capacity(nz!(1024)).build());
        let (_tx, rx) = port_pair(nz!(16), 8, &pool);

        let mut system = DispatcherSystem::builder()
            .max_dispatchers(1)
            .max_external_sources(1)
            .max_internal_sources(0)
            .max_timers(1)
            .build();
        let engine = system.add_dispatcher(
            vec![rx],
            Box::new(OneToOneHandleMap::new(0)),
            Duration::from_millis(1),
        );

        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                system.dispatch_tick(black_box(engine));
            }

            start.elapsed()
        });
    });

    // Post one event and dispatch it, end to end through pool, ring, map and callback.
    group.bench_function("post_and_dispatch_one", |b| {
        let pool = Arc::new(BytePool::builder().capacity(nz!(1024)).build());
        let (mut tx, rx) = port_pair(nz!(16), 8, &pool);

        let mut system = DispatcherSystem::builder()
            .max_dispatchers(1)
            .max_external_sources(1)
            .max_internal_sources(0)
            .max_timers(1)
            .build();
        let engine = system.add_dispatcher(
            vec![rx],
            Box::new(OneToOneHandleMap::new(0)),
            Duration::from_millis(1),
        );

        system
            .register_external_source(engine, EventKind::new(1), ProducerHandle::new(0), |cx| {
                _ = black_box(cx.payload());
            })
            .expect("capacity was sized for this");

        let payload = [0xA5_u8; 8];

        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                tx.try_send(EventKind::new(1), ProducerHandle::new(0), black_box(&payload))
                    .expect("ring is drained every iteration");
                system.dispatch_tick(engine);
            }

            start.elapsed()
        });
    });

    // A tick that fires one periodic timer, the steady-state cost of scheduled work.
    group.bench_function("tick_with_due_timer", |b| {
        let mut system = DispatcherSystem::builder()
            .max_dispatchers(1)
            .max_external_sources(0)
            .max_internal_sources(1)
            .max_timers(1)
            .build();
        let engine = system.add_dispatcher(
            Vec::new(),
            Box::new(OneToOneHandleMap::new(0)),
            Duration::from_millis(1),
        );

        system
            .register_internal_source(engine, |cx| {
                _ = cx.create_periodic_timer(nz!(1), |cx| _ = black_box(cx.tick()), 0);
            })
            .expect("capacity was sized for this");

        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                system.dispatch_tick(black_box(engine));
            }

            start.elapsed()
        });
    });

    group.finish();
}
