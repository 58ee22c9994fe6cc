//! Integration tests for common tickbus workflows.
//!
//! These tests drive the public surface the way a tick-based application
//! would: subscribe during setup, publish from game logic and worker
//! threads, drain once per tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tickbus::{Event, EventBus, EventChannel, EventRecorder, TickDriver};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct DamageDealt {
    target: u32,
    amount: u32,
}

impl Event for DamageDealt {}

#[derive(Debug)]
struct EntityDied {
    entity: u32,
}

impl Event for EntityDied {}

#[derive(Debug)]
struct RespawnRequested {
    entity: u32,
}

impl Event for RespawnRequested {}

// =============================================================================
// Tick Loop Scenarios
// =============================================================================

#[test]
fn test_full_tick_loop_with_immediate_queued_and_delayed_events() {
    init_tracing();
    let bus = EventBus::new();

    let deaths = Arc::new(AtomicUsize::new(0));
    let respawns = Arc::new(AtomicUsize::new(0));

    // Damage handler turns lethal hits into a queued death plus a delayed
    // respawn, exercising publish from inside a handler.
    let combat_bus = bus.clone();
    let damage_token = bus.subscribe(move |event: &DamageDealt| {
        if event.amount >= 100 {
            combat_bus.publish_queued(EntityDied {
                entity: event.target,
            });
            combat_bus.publish_delayed(
                RespawnRequested {
                    entity: event.target,
                },
                2,
            );
        }
    });

    let d = deaths.clone();
    let death_token = bus.subscribe(move |_: &EntityDied| {
        d.fetch_add(1, Ordering::SeqCst);
    });
    let r = respawns.clone();
    let respawn_token = bus.subscribe(move |_: &RespawnRequested| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    // Tick 0: lethal hit lands immediately, death is queued for the drain.
    bus.publish(DamageDealt {
        target: 9,
        amount: 120,
    })
    .unwrap();
    assert_eq!(deaths.load(Ordering::SeqCst), 0);

    bus.drain().unwrap();
    assert_eq!(deaths.load(Ordering::SeqCst), 1);
    assert_eq!(respawns.load(Ordering::SeqCst), 0);

    // Tick 1: respawn still pending.
    bus.drain().unwrap();
    assert_eq!(respawns.load(Ordering::SeqCst), 0);

    // Tick 2: respawn due.
    bus.drain().unwrap();
    assert_eq!(respawns.load(Ordering::SeqCst), 1);

    drop((damage_token, death_token, respawn_token));
}

#[test]
fn test_worker_threads_feed_the_dispatch_thread() {
    init_tracing();
    let bus = EventBus::new();
    let total = Arc::new(AtomicUsize::new(0));

    let t = total.clone();
    let token = bus.subscribe(move |event: &DamageDealt| {
        t.fetch_add(event.amount as usize, Ordering::SeqCst);
    });

    let mut workers = Vec::new();
    for worker in 0..4_u32 {
        let bus = bus.clone();
        workers.push(thread::spawn(move || {
            for hit in 0..50_u32 {
                bus.publish_queued(DamageDealt {
                    target: worker,
                    amount: hit % 7,
                });
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    // Nothing reaches subscribers until the dispatch thread drains.
    assert_eq!(total.load(Ordering::SeqCst), 0);
    bus.drain().unwrap();

    let expected: usize = (0..50_u32).map(|hit| (hit % 7) as usize).sum::<usize>() * 4;
    assert_eq!(total.load(Ordering::SeqCst), expected);
    drop(token);
}

#[test]
fn test_driver_thread_runs_the_tick_loop() {
    init_tracing();
    let bus = EventBus::new();
    let respawns = Arc::new(AtomicUsize::new(0));

    let r = respawns.clone();
    let token = bus.subscribe(move |_: &RespawnRequested| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    let handle = TickDriver::new(bus.clone()).spawn(std::time::Duration::from_millis(5));
    bus.publish_delayed(RespawnRequested { entity: 1 }, 3);

    thread::sleep(std::time::Duration::from_millis(150));
    handle.stop();

    assert_eq!(respawns.load(Ordering::SeqCst), 1);
    drop(token);
}

// =============================================================================
// Channels and Inspection
// =============================================================================

#[test]
fn test_channel_raise_reaches_local_listeners_and_bus_subscribers() {
    init_tracing();
    let recorder = Arc::new(EventRecorder::new());
    let bus = EventBus::builder().observer(recorder.clone()).build();

    let bus_side = Arc::new(AtomicUsize::new(0));
    let b = bus_side.clone();
    let token = bus.subscribe(move |_: &DamageDealt| {
        b.fetch_add(1, Ordering::SeqCst);
    });

    let channel = EventChannel::with_bus("combat.damage", bus);
    let local_side = Arc::new(AtomicUsize::new(0));
    let l = local_side.clone();
    channel.register(move |_: &DamageDealt| {
        l.fetch_add(1, Ordering::SeqCst);
    });

    channel
        .raise(DamageDealt {
            target: 3,
            amount: 10,
        })
        .unwrap();

    assert_eq!(local_side.load(Ordering::SeqCst), 1);
    assert_eq!(bus_side.load(Ordering::SeqCst), 1);

    let history = recorder.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, Some("combat.damage".to_string()));
    drop(token);
}

#[test]
fn test_diagnostics_reflect_registrations_and_queues() {
    init_tracing();
    let bus = EventBus::new();

    let t1 = bus.subscribe(|_: &DamageDealt| {});
    let mut t2 = bus.subscribe(|_: &EntityDied| {});

    assert_eq!(bus.handler_count::<DamageDealt>(), 1);
    assert_eq!(bus.registered_events().len(), 2);

    bus.publish_queued(EntityDied { entity: 1 });
    bus.publish_delayed(RespawnRequested { entity: 1 }, 5);
    assert_eq!(bus.queued_len(), 1);
    assert_eq!(bus.delayed_len(), 1);

    t2.release();
    assert_eq!(bus.registered_events().len(), 1);

    bus.drain().unwrap();
    assert_eq!(bus.queued_len(), 0);
    assert_eq!(bus.delayed_len(), 1);
    assert_eq!(bus.current_tick(), 1);
    drop(t1);
}
