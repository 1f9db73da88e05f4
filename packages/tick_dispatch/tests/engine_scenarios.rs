//! End-to-end scenarios for the dispatch engine: queues, handle resolution, timers and
//! their interaction across whole ticks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bounded_pool::BytePool;
use frame_channel::{SendError, port_pair};
use new_zealand::nz;
use tick_dispatch::{
    DispatcherSystem, EventKind, OneToOneHandleMap, ProducerHandle, TableHandleMap,
    TimerHandle, Trigger,
};

fn payload_pool() -> Arc<BytePool> {
    Arc::new(BytePool::builder().capacity(nz!(4096)).build())
}

fn system_of(max_external: usize, max_internal: usize, max_timers: usize) -> DispatcherSystem {
    DispatcherSystem::builder()
        .max_dispatchers(2)
        .max_external_sources(max_external)
        .max_internal_sources(max_internal)
        .max_timers(max_timers)
        .build()
}

/// Shared recorder for observing callback activity from test assertions.
type Log = Arc<Mutex<Vec<(String, u64)>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<(String, u64)> {
    log.lock().expect("no test thread panicked").clone()
}

#[test]
fn full_queue_blocks_one_and_delivers_four_in_fifo_order() {
    // Queue depth 4: posting 5 events blocks exactly 1; the 4 that fit arrive in FIFO
    // order across 4 successive ticks, one per tick.
    let pool = payload_pool();
    let (mut tx, rx) = port_pair(nz!(4), 8, &pool);

    let mut system = system_of(1, 0, 1);
    let engine = system.add_dispatcher(
        vec![rx],
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let received = log();
    let recorder = Arc::clone(&received);
    system
        .register_external_source(engine, EventKind::new(1), ProducerHandle::new(0), move |cx| {
            let payload = cx.payload().expect("event triggers always carry a payload");
            recorder
                .lock()
                .expect("no test thread panicked")
                .push((format!("{}", payload[0]), cx.tick()));
        })
        .expect("capacity was sized for this");

    for n in 0..4_u8 {
        tx.try_send(EventKind::new(1), ProducerHandle::new(0), &[n])
            .expect("ring has room");
    }
    assert_eq!(
        tx.try_send(EventKind::new(1), ProducerHandle::new(0), &[4]),
        Err(SendError::QueueFull)
    );
    assert_eq!(tx.blocked_count(), 1);

    // One event per port per tick: four ticks drain the four queued events.
    for _ in 0..4 {
        system.dispatch_tick(engine);
    }

    let seen: Vec<String> = entries(&received).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seen, ["0", "1", "2", "3"]);

    // Nothing remains: a fifth tick delivers nothing.
    system.dispatch_tick(engine);
    assert_eq!(entries(&received).len(), 4);
}

#[test]
fn n_sources_resolve_to_n_distinct_dense_indexes() {
    const SOURCES: u32 = 5;

    let pool = payload_pool();
    let (mut tx, rx) = port_pair(nz!(8), 8, &pool);

    let mut system = system_of(SOURCES as usize, 0, 1);
    let engine = system.add_dispatcher(
        vec![rx],
        Box::new(OneToOneHandleMap::new(100)),
        Duration::from_millis(1),
    );

    let hits = log();
    for n in 0..SOURCES {
        let recorder = Arc::clone(&hits);
        let index = system
            .register_external_source(
                engine,
                EventKind::new(7),
                ProducerHandle::new(100 + n),
                move |cx| {
                    recorder
                        .lock()
                        .expect("no test thread panicked")
                        .push((format!("source-{}", cx.source().get()), cx.tick()));
                },
            )
            .expect("capacity was sized for this");
        assert_eq!(index.get(), n as usize);
    }

    for n in 0..SOURCES {
        tx.try_send(EventKind::new(7), ProducerHandle::new(100 + n), &[])
            .expect("ring has room");
    }

    for _ in 0..SOURCES {
        system.dispatch_tick(engine);
    }

    let seen: Vec<String> = entries(&hits).into_iter().map(|(s, _)| s).collect();
    assert_eq!(
        seen,
        ["source-0", "source-1", "source-2", "source-3", "source-4"]
    );
}

#[test]
fn unresolved_handles_drop_and_dispatching_continues() {
    let pool = payload_pool();
    let (mut tx, rx) = port_pair(nz!(8), 8, &pool);

    let mut system = system_of(1, 0, 1);
    let engine = system.add_dispatcher(
        vec![rx],
        Box::new(TableHandleMap::new(4)),
        Duration::from_millis(1),
    );

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    system
        .register_external_source(engine, EventKind::new(1), ProducerHandle::new(50), move |_cx| {
            _ = counter.fetch_add(1, Ordering::Relaxed);
        })
        .expect("capacity was sized for this");

    // Unknown handle, then a resolvable event behind it.
    tx.try_send(EventKind::new(1), ProducerHandle::new(999), &[])
        .expect("ring has room");
    tx.try_send(EventKind::new(1), ProducerHandle::new(50), &[])
        .expect("ring has room");

    system.dispatch_tick(engine);
    assert_eq!(system.dropped_count(engine), 1);
    assert_eq!(delivered.load(Ordering::Relaxed), 0);

    system.dispatch_tick(engine);
    assert_eq!(system.dropped_count(engine), 1);
    assert_eq!(delivered.load(Ordering::Relaxed), 1);
}

#[test]
fn periodic_timer_fires_at_exact_multiples() {
    // Period 10, created at tick 0: ticks 1..=25 fire the callback exactly at 10 and 20.
    let mut system = system_of(0, 1, 2);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = log();
    let recorder = Arc::clone(&fires);
    system
        .register_internal_source(engine, move |cx| {
            if cx.trigger() == Trigger::SourceInit {
                let inner = Arc::clone(&recorder);
                _ = cx.create_periodic_timer(
                    nz!(10),
                    move |cx| {
                        inner
                            .lock()
                            .expect("no test thread panicked")
                            .push(("fire".to_string(), cx.tick()));
                    },
                    0,
                );
            }
        })
        .expect("capacity was sized for this");

    for _ in 1..=25 {
        system.dispatch_tick(engine);
    }

    let fired_at: Vec<u64> = entries(&fires).into_iter().map(|(_, t)| t).collect();
    assert_eq!(fired_at, [10, 20]);
}

#[test]
fn single_shot_fires_once_and_self_retrigger_measures_from_now() {
    // Delay 3 armed at tick 0 fires at tick 3; retriggering itself with delay 4 from
    // within that callback fires again at tick 7, then never again.
    let mut system = system_of(0, 1, 2);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = log();
    let recorder = Arc::clone(&fires);
    system
        .register_internal_source(engine, move |cx| {
            let inner = Arc::clone(&recorder);
            _ = cx.create_single_shot_timer(
                3,
                move |cx| {
                    let mut fired = inner.lock().expect("no test thread panicked");
                    fired.push(("fire".to_string(), cx.tick()));

                    if fired.len() == 1 {
                        // None means "this timer"; the new delay counts from the
                        // current tick, not from the original arming tick.
                        cx.retrigger_single_shot_timer(None, 4);
                    }
                },
                0,
                false,
            );
        })
        .expect("capacity was sized for this");

    for _ in 1..=20 {
        system.dispatch_tick(engine);
    }

    let fired_at: Vec<u64> = entries(&fires).into_iter().map(|(_, t)| t).collect();
    assert_eq!(fired_at, [3, 7]);

    // Idle but addressable: the slot is still occupied.
    assert_eq!(system.live_timer_count(engine), 1);
}

#[test]
fn kill_at_due_time_reclaims_the_slot() {
    let mut system = system_of(0, 1, 1);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fires);
    system
        .register_internal_source(engine, move |cx| {
            let inner = Arc::clone(&counter);
            _ = cx.create_single_shot_timer(
                2,
                move |_cx| {
                    _ = inner.fetch_add(1, Ordering::Relaxed);
                },
                0,
                true,
            );
        })
        .expect("capacity was sized for this");

    assert_eq!(system.live_timer_count(engine), 1);

    for _ in 0..5 {
        system.dispatch_tick(engine);
    }

    assert_eq!(fires.load(Ordering::Relaxed), 1);
    assert_eq!(system.live_timer_count(engine), 0);
}

#[test]
fn events_drain_before_timers_within_one_tick() {
    // A queued event and a timer due on the same tick: the event's callback runs first.
    let pool = payload_pool();
    let (mut tx, rx) = port_pair(nz!(2), 8, &pool);

    let mut system = system_of(1, 1, 1);
    let engine = system.add_dispatcher(
        vec![rx],
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let order = log();

    let recorder = Arc::clone(&order);
    system
        .register_external_source(engine, EventKind::new(1), ProducerHandle::new(0), move |cx| {
            recorder
                .lock()
                .expect("no test thread panicked")
                .push(("event".to_string(), cx.tick()));
        })
        .expect("capacity was sized for this");

    let recorder = Arc::clone(&order);
    system
        .register_internal_source(engine, move |cx| {
            let inner = Arc::clone(&recorder);
            // Delay zero means the very next tick advance.
            _ = cx.create_single_shot_timer(
                0,
                move |cx| {
                    inner
                        .lock()
                        .expect("no test thread panicked")
                        .push(("timer".to_string(), cx.tick()));
                },
                0,
                true,
            );
        })
        .expect("capacity was sized for this");

    tx.try_send(EventKind::new(1), ProducerHandle::new(0), &[])
        .expect("ring has room");

    system.dispatch_tick(engine);

    let seen: Vec<String> = entries(&order).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seen, ["event", "timer"]);
}

#[test]
fn every_port_is_serviced_every_tick() {
    // A busy first port cannot starve the second: each tick takes at most one event
    // from each, in port order.
    let pool = payload_pool();
    let (mut tx_a, rx_a) = port_pair(nz!(8), 8, &pool);
    let (mut tx_b, rx_b) = port_pair(nz!(8), 8, &pool);

    let mut system = system_of(2, 0, 1);
    let engine = system.add_dispatcher(
        vec![rx_a, rx_b],
        Box::new(TableHandleMap::new(4)),
        Duration::from_millis(1),
    );

    let order = log();
    for (name, handle) in [("a", 0_u32), ("b", 1_u32)] {
        let recorder = Arc::clone(&order);
        system
            .register_external_source(
                engine,
                EventKind::new(1),
                ProducerHandle::new(handle),
                move |cx| {
                    recorder
                        .lock()
                        .expect("no test thread panicked")
                        .push((name.to_string(), cx.tick()));
                },
            )
            .expect("capacity was sized for this");
    }

    // Port A has a backlog of four; port B has one event.
    for _ in 0..4 {
        tx_a.try_send(EventKind::new(1), ProducerHandle::new(0), &[])
            .expect("ring has room");
    }
    tx_b.try_send(EventKind::new(1), ProducerHandle::new(1), &[])
        .expect("ring has room");

    system.dispatch_tick(engine);

    // B was serviced on the very first tick despite A's backlog.
    let seen: Vec<String> = entries(&order).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seen, ["a", "b"]);
}

#[test]
fn suspend_parks_a_single_shot_until_retriggered() {
    // A controller timer (period 1) suspends a single-shot before it can fire, then
    // retriggers it later; the single-shot fires only at the retriggered due tick.
    let mut system = system_of(0, 1, 3);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = log();
    let victim: Arc<Mutex<Option<TimerHandle>>> = Arc::new(Mutex::new(None));

    let recorder = Arc::clone(&fires);
    let victim_cell = Arc::clone(&victim);
    system
        .register_internal_source(engine, move |cx| {
            let inner = Arc::clone(&recorder);
            let handle = cx.create_single_shot_timer(
                5,
                move |cx| {
                    inner
                        .lock()
                        .expect("no test thread panicked")
                        .push(("victim".to_string(), cx.tick()));
                },
                0,
                false,
            );
            *victim_cell.lock().expect("no test thread panicked") = Some(handle);

            let controller_victim = Arc::clone(&victim_cell);
            _ = cx.create_periodic_timer(
                nz!(1),
                move |cx| {
                    let handle = controller_victim
                        .lock()
                        .expect("no test thread panicked")
                        .expect("the victim timer was created during bootstrap");
                    match cx.tick() {
                        1 => cx.suspend_single_shot_timer(Some(handle)),
                        3 => cx.retrigger_single_shot_timer(Some(handle), 9),
                        _ => {}
                    }
                },
                0,
            );
        })
        .expect("capacity was sized for this");

    for _ in 1..=20 {
        system.dispatch_tick(engine);
    }

    // Without the suspension it would have fired at tick 5; instead it fired only at
    // the retriggered due tick 3 + 9 = 12.
    let fired_at: Vec<u64> = entries(&fires).into_iter().map(|(_, t)| t).collect();
    assert_eq!(fired_at, [12]);
}

#[test]
fn killing_a_periodic_timer_from_its_own_callback_stops_it() {
    let mut system = system_of(0, 1, 1);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = log();
    let recorder = Arc::clone(&fires);
    system
        .register_internal_source(engine, move |cx| {
            let inner = Arc::clone(&recorder);
            _ = cx.create_periodic_timer(
                nz!(2),
                move |cx| {
                    let mut fired = inner.lock().expect("no test thread panicked");
                    fired.push(("fire".to_string(), cx.tick()));
                    if fired.len() == 2 {
                        // None addresses the currently firing timer.
                        cx.kill_timer(None);
                    }
                },
                0,
            );
        })
        .expect("capacity was sized for this");

    for _ in 1..=10 {
        system.dispatch_tick(engine);
    }

    let fired_at: Vec<u64> = entries(&fires).into_iter().map(|(_, t)| t).collect();
    assert_eq!(fired_at, [2, 4]);
    assert_eq!(system.live_timer_count(engine), 0);
}

#[test]
fn context_datum_tells_shared_callbacks_apart() {
    // Three timers share one callback body; the context datum says which fired.
    let mut system = system_of(0, 1, 3);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = log();
    let recorder = Arc::clone(&fires);
    system
        .register_internal_source(engine, move |cx| {
            for datum in 0..3_u32 {
                let inner = Arc::clone(&recorder);
                _ = cx.create_single_shot_timer(
                    u64::from(datum) + 1,
                    move |cx| {
                        let datum = cx
                            .context_datum()
                            .expect("timer callbacks always carry their datum");
                        inner
                            .lock()
                            .expect("no test thread panicked")
                            .push((format!("timer-{datum}"), cx.tick()));
                    },
                    datum,
                    true,
                );
            }
        })
        .expect("capacity was sized for this");

    for _ in 1..=5 {
        system.dispatch_tick(engine);
    }

    let seen: Vec<String> = entries(&fires).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seen, ["timer-0", "timer-1", "timer-2"]);
}

#[test]
fn self_retrigger_every_tick_until_condition_then_switch_period() {
    // The pattern the self-reference exists for: poll every tick until a condition
    // holds, then continue at a slower cadence.
    let mut system = system_of(0, 1, 1);
    let engine = system.add_dispatcher(
        Vec::new(),
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let fires = log();
    let recorder = Arc::clone(&fires);
    system
        .register_internal_source(engine, move |cx| {
            let inner = Arc::clone(&recorder);
            _ = cx.create_single_shot_timer(
                1,
                move |cx| {
                    let mut fired = inner.lock().expect("no test thread panicked");
                    fired.push(("poll".to_string(), cx.tick()));

                    // "Condition" becomes true on the third poll; switch to period 5.
                    if fired.len() < 3 {
                        cx.retrigger_single_shot_timer(None, 1);
                    } else if fired.len() == 3 {
                        cx.retrigger_single_shot_timer(None, 5);
                    }
                },
                0,
                false,
            );
        })
        .expect("capacity was sized for this");

    for _ in 1..=8 {
        system.dispatch_tick(engine);
    }

    let fired_at: Vec<u64> = entries(&fires).into_iter().map(|(_, t)| t).collect();
    assert_eq!(fired_at, [1, 2, 3, 8]);
}

#[test]
fn dispatchers_do_not_interfere() {
    let pool = payload_pool();
    let (mut tx_a, rx_a) = port_pair(nz!(4), 8, &pool);
    let (_tx_b, rx_b) = port_pair(nz!(4), 8, &pool);

    let mut system = system_of(2, 0, 2);
    let first = system.add_dispatcher(
        vec![rx_a],
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );
    let second = system.add_dispatcher(
        vec![rx_b],
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(5),
    );

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    system
        .register_external_source(first, EventKind::new(1), ProducerHandle::new(0), move |_cx| {
            _ = counter.fetch_add(1, Ordering::Relaxed);
        })
        .expect("capacity was sized for this");

    tx_a.try_send(EventKind::new(1), ProducerHandle::new(0), &[])
        .expect("ring has room");

    // Ticking the second dispatcher does not drain the first's port.
    system.dispatch_tick(second);
    assert_eq!(hits.load(Ordering::Relaxed), 0);
    assert_eq!(system.tick(second), 1);
    assert_eq!(system.tick(first), 0);

    system.dispatch_tick(first);
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn ports_of_differing_payload_sizes_coexist_on_one_dispatcher() {
    let pool = payload_pool();
    let (mut tx_small, rx_small) = port_pair(nz!(4), 4, &pool);
    let (mut tx_large, rx_large) = port_pair(nz!(4), 64, &pool);

    let mut system = system_of(2, 0, 1);
    let engine = system.add_dispatcher(
        vec![rx_small, rx_large],
        Box::new(TableHandleMap::new(4)),
        Duration::from_millis(1),
    );

    let sizes = log();
    for handle in [0_u32, 1] {
        let recorder = Arc::clone(&sizes);
        system
            .register_external_source(
                engine,
                EventKind::new(1),
                ProducerHandle::new(handle),
                move |cx| {
                    let len = cx.payload().expect("event triggers carry a payload").len();
                    recorder
                        .lock()
                        .expect("no test thread panicked")
                        .push((format!("len-{len}"), cx.tick()));
                },
            )
            .expect("capacity was sized for this");
    }

    tx_small
        .try_send(EventKind::new(1), ProducerHandle::new(0), &[0_u8; 4])
        .expect("ring has room");
    tx_large
        .try_send(EventKind::new(1), ProducerHandle::new(1), &[0_u8; 64])
        .expect("ring has room");

    system.dispatch_tick(engine);

    let seen: Vec<String> = entries(&sizes).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seen, ["len-4", "len-64"]);
}

#[test]
fn producer_thread_to_dispatcher_thread_end_to_end() {
    const FRAMES: u32 = 500;

    let pool = payload_pool();
    let (mut tx, rx) = port_pair(nz!(16), 8, &pool);

    let mut system = system_of(1, 0, 1);
    let engine = system.add_dispatcher(
        vec![rx],
        Box::new(OneToOneHandleMap::new(0)),
        Duration::from_millis(1),
    );

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    system
        .register_external_source(engine, EventKind::new(1), ProducerHandle::new(0), move |cx| {
            assert_eq!(cx.payload().map(<[u8]>::len), Some(4));
            _ = counter.fetch_add(1, Ordering::Relaxed);
        })
        .expect("capacity was sized for this");

    let producer = thread::spawn(move || {
        let mut sent = 0_u32;
        let mut dropped = 0_u32;
        while sent + dropped < FRAMES {
            let n = sent + dropped;
            match tx.try_send(EventKind::new(1), ProducerHandle::new(0), &n.to_le_bytes()) {
                Ok(()) => sent += 1,
                // Fail-fast is the contract; a real producer just drops and counts.
                Err(_) => {
                    dropped += 1;
                    thread::yield_now();
                }
            }
        }
        (sent, dropped)
    });

    // The dispatcher thread ticks until the producer is done and the queue is dry.
    while !producer.is_finished() {
        system.dispatch_tick(engine);
    }
    for _ in 0..16 {
        system.dispatch_tick(engine);
    }

    let (sent, dropped) = producer.join().expect("producer thread panicked");
    assert_eq!(sent as usize, delivered.load(Ordering::Relaxed));
    assert_eq!(u64::from(sent + dropped), u64::from(FRAMES));
    assert_eq!(pool.in_use(), 0);
}
