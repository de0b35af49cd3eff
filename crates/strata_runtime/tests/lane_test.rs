//! Integration tests for lane scheduling: sync lanes gating the render
//! rendezvous, unsync lanes free-running, and frequency retuning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strata_core::EntityComponentSystem;
use strata_runtime::{Barrier, RuntimeConfig, TickManager};

#[test]
fn slow_unsync_lane_does_not_block_render_frames() {
    let ecs = EntityComponentSystem::new();
    let barrier = Barrier::new();
    let mut render = barrier.register("Render");

    ecs.register_tick_action("Slow", |_| thread::sleep(Duration::from_millis(300)));

    let config = RuntimeConfig::main_lane(100, true).with_lane("Slow", 5, false);
    let manager = TickManager::start(&ecs, &barrier, &config).unwrap();

    let start = Instant::now();
    for _ in 0..20 {
        render.request_tick();
        ecs.update();
        render.free_threads();
    }
    let elapsed = start.elapsed();

    // Twenty frames gated only by the 100 Hz main lane take a fraction
    // of a second; a 300 ms sleep per slow tick must not show up here.
    assert!(
        elapsed < Duration::from_secs(2),
        "render frames stalled: {elapsed:?}"
    );
    // The main lane may still be departing the last cycle.
    assert!(barrier.generation() >= 19);

    let slow = Arc::clone(manager.lane("Slow").unwrap());
    drop(render);
    manager.shutdown();
    assert!(slow.stats().ticks() >= 1);
}

#[test]
fn slow_sync_lane_gates_every_generation() {
    let ecs = EntityComponentSystem::new();
    let barrier = Barrier::new();
    let mut render = barrier.register("Render");

    ecs.register_tick_action("Heavy", |_| thread::sleep(Duration::from_millis(50)));

    let config = RuntimeConfig::main_lane(1_000, true).with_lane("Heavy", 1_000, true);
    let manager = TickManager::start(&ecs, &barrier, &config).unwrap();

    let start = Instant::now();
    for _ in 0..5 {
        render.request_tick();
        ecs.update();
        render.free_threads();
    }
    let elapsed = start.elapsed();

    // Each new frame waits for the previous cycle to close, which in
    // turn waits for the heavy lane's 50 ms tick.
    assert!(
        elapsed >= Duration::from_millis(150),
        "sync lane did not gate frames: {elapsed:?}"
    );
    assert!(barrier.generation() >= 4);

    drop(render);
    manager.shutdown();
}

#[test]
fn zero_frequency_lane_ticks_once_until_retuned() {
    let ecs = EntityComponentSystem::new();
    let barrier = Barrier::new();

    let count = Arc::new(AtomicU64::new(0));
    {
        let count = Arc::clone(&count);
        ecs.register_tick_action("Once", move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }

    let config = RuntimeConfig::main_lane(100, false).with_lane("Once", 0, false);
    let manager = TickManager::start(&ecs, &barrier, &config).unwrap();

    thread::sleep(Duration::from_millis(200));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(manager.lane("Once").unwrap().stats().ticks(), 1);

    // Raising the frequency wakes the lane from idle.
    assert!(manager.set_frequency("Once", 200));
    thread::sleep(Duration::from_millis(200));
    assert!(count.load(Ordering::SeqCst) > 1);

    manager.shutdown();
}

#[test]
fn lane_stats_track_rate_and_delta() {
    let ecs = EntityComponentSystem::new();
    let barrier = Barrier::new();
    let config = RuntimeConfig::main_lane(200, false);
    let manager = TickManager::start(&ecs, &barrier, &config).unwrap();

    thread::sleep(Duration::from_millis(300));
    let main = manager.lane("Main").unwrap();
    let ticks = main.stats().ticks();
    assert!(ticks >= 10, "expected a free-running lane, got {ticks} ticks");
    // Delta hovers around the 5 ms period; allow a generous ceiling for
    // loaded test machines.
    assert!(main.stats().delta() < Duration::from_millis(100));

    manager.shutdown();
}
