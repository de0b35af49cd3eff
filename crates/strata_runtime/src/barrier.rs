//! # Generation Barrier
//!
//! The rendezvous point between synchronized simulation lanes and the
//! render thread. Each participant holds a [`BarrierHandle`]; a cycle
//! opens once every registered handle has called
//! [`BarrierHandle::request_tick`], and the next cycle cannot open until
//! every handle has called [`BarrierHandle::free_threads`]. Completed
//! cycles are counted as *generations*.
//!
//! Registration is dynamic: handles may be created while no cycle is
//! running, and dropping a handle deregisters its owner. A drop in the
//! middle of a cycle is a caller bug; in debug builds it asserts, in
//! release builds it is logged and the participant counts are repaired
//! so the remaining threads are not left blocked.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

#[derive(Debug)]
struct BarrierState {
    /// Number of fully completed cycles.
    generation: u64,
    /// Registered participants.
    expected: usize,
    /// Participants that have arrived in the current cycle.
    arrived: usize,
    /// Participants that have departed the current cycle.
    departed: usize,
    /// True from the moment all participants arrive until all depart.
    running: bool,
}

impl BarrierState {
    /// Closes the current cycle and resets per-cycle counters.
    fn advance(&mut self) {
        self.generation += 1;
        self.arrived = 0;
        self.departed = 0;
        self.running = false;
    }
}

/// A reusable rendezvous with dynamic membership.
///
/// Unlike [`std::sync::Barrier`], participants are explicit handles
/// rather than an up-front thread count, and the release happens in two
/// phases: all participants are held until the last arrives, and the
/// barrier stays closed to the next cycle until the last departs.
#[derive(Debug)]
pub struct Barrier {
    state: Mutex<BarrierState>,
    cv: Condvar,
}

impl Barrier {
    /// Creates a barrier with no participants.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BarrierState {
                generation: 0,
                expected: 0,
                arrived: 0,
                departed: 0,
                running: false,
            }),
            cv: Condvar::new(),
        })
    }

    /// Registers a new participant.
    ///
    /// Blocks while a cycle is running: membership may only change
    /// between cycles, otherwise the arrival count of the cycle in
    /// flight would be corrupted.
    pub fn register(self: &Arc<Self>, name: impl Into<String>) -> BarrierHandle {
        let name = name.into();
        let mut state = self.state.lock();
        while state.running {
            self.cv.wait(&mut state);
        }
        state.expected += 1;
        debug!(participant = %name, expected = state.expected, "barrier participant registered");
        drop(state);
        BarrierHandle {
            barrier: Arc::clone(self),
            name,
            in_cycle: false,
        }
    }

    /// Number of completed cycles.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of registered participants.
    #[must_use]
    pub fn participants(&self) -> usize {
        self.state.lock().expected
    }

    /// Number of participants that have arrived in the current cycle.
    #[must_use]
    pub fn checked_in(&self) -> usize {
        self.state.lock().arrived
    }
}

/// One participant's membership in a [`Barrier`].
///
/// Dropping the handle deregisters the participant.
#[derive(Debug)]
pub struct BarrierHandle {
    barrier: Arc<Barrier>,
    name: String,
    /// True between `request_tick` returning and `free_threads`.
    in_cycle: bool,
}

impl BarrierHandle {
    /// The participant name given at registration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The barrier this handle belongs to.
    #[must_use]
    pub fn barrier(&self) -> &Arc<Barrier> {
        &self.barrier
    }

    /// Arrives at the barrier and blocks until every participant has
    /// arrived.
    ///
    /// If a previous cycle is still draining, waits for it to close
    /// first. Returns once the cycle this participant joined is open;
    /// the caller must later call [`free_threads`](Self::free_threads)
    /// exactly once to let the barrier move on.
    pub fn request_tick(&mut self) {
        debug_assert!(!self.in_cycle, "request_tick called twice without free_threads");
        let mut state = self.barrier.state.lock();
        // A cycle already in flight must fully drain before we may join
        // the next one.
        while state.running {
            self.barrier.cv.wait(&mut state);
        }
        state.arrived += 1;
        self.in_cycle = true;
        let generation = state.generation;
        if state.arrived == state.expected {
            trace!(participant = %self.name, generation, "cycle open");
            state.running = true;
            self.barrier.cv.notify_all();
        } else {
            // The generation cannot advance past `generation` while we
            // hold an undeparted arrival, so this wait cannot miss its
            // cycle.
            while !(state.running && state.generation == generation) {
                self.barrier.cv.wait(&mut state);
            }
        }
    }

    /// Departs the current cycle.
    ///
    /// The last participant to depart closes the cycle and advances the
    /// generation.
    pub fn free_threads(&mut self) {
        debug_assert!(self.in_cycle, "free_threads called without request_tick");
        if !self.in_cycle {
            return;
        }
        self.in_cycle = false;
        let mut state = self.barrier.state.lock();
        state.departed += 1;
        if state.departed == state.expected {
            trace!(participant = %self.name, generation = state.generation, "cycle closed");
            state.advance();
            self.barrier.cv.notify_all();
        }
    }
}

impl Drop for BarrierHandle {
    fn drop(&mut self) {
        debug_assert!(
            !self.in_cycle,
            "barrier handle {:?} dropped mid-cycle",
            self.name
        );
        let mut state = self.barrier.state.lock();
        if state.running {
            if self.in_cycle {
                // Arrived but never departed. Shrink the membership and
                // re-check the close condition in its stead.
                error!(participant = %self.name, "handle dropped mid-cycle; repairing barrier");
                state.expected -= 1;
                state.arrived -= 1;
            } else {
                // Already departed the running cycle; remove its
                // contribution from both sides.
                state.expected -= 1;
                state.arrived -= 1;
                state.departed -= 1;
            }
            if state.departed == state.expected {
                state.advance();
            }
        } else {
            // Between cycles: nobody is blocked on this handle's
            // departure, but the remaining arrivals may now be complete.
            state.expected -= 1;
            if state.expected > 0 && state.arrived == state.expected {
                state.running = true;
            }
        }
        debug!(participant = %self.name, expected = state.expected, "barrier participant deregistered");
        drop(state);
        self.barrier.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_single_participant_cycles_alone() {
        let barrier = Barrier::new();
        let mut handle = barrier.register("only");
        for expected_generation in 0..5 {
            assert_eq!(barrier.generation(), expected_generation);
            handle.request_tick();
            handle.free_threads();
        }
        assert_eq!(barrier.generation(), 5);
    }

    #[test]
    fn test_registration_waits_for_cycle_to_close() {
        let barrier = Barrier::new();
        let mut first = barrier.register("first");
        first.request_tick();

        let registered = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let handle = barrier.register("late");
                handle.barrier().participants()
            })
        };

        // The cycle is open; the second registration must be held back.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(barrier.participants(), 1);

        first.free_threads();
        assert_eq!(registered.join().unwrap(), 2);
    }

    #[test]
    fn test_two_participants_advance_in_lockstep() {
        let barrier = Barrier::new();
        let mut a = barrier.register("a");
        let mut b = barrier.register("b");

        let worker = thread::spawn(move || {
            for _ in 0..100 {
                b.request_tick();
                b.free_threads();
            }
        });
        for _ in 0..100 {
            a.request_tick();
            let generation_inside = a.barrier().generation();
            a.free_threads();
            // While we were inside the cycle the generation could not
            // have advanced past the one we joined.
            assert!(a.barrier().generation() >= generation_inside);
        }
        worker.join().unwrap();
        assert_eq!(barrier.generation(), 100);
    }

    #[test]
    fn test_drop_between_cycles_releases_remaining_waiter() {
        let barrier = Barrier::new();
        let mut stayer = barrier.register("stayer");
        let leaver = barrier.register("leaver");

        let waiter = thread::spawn(move || {
            stayer.request_tick();
            stayer.free_threads();
        });

        // The stayer is blocked waiting for the leaver to arrive;
        // dropping the leaver must open the cycle for the stayer alone.
        thread::sleep(Duration::from_millis(50));
        drop(leaver);
        waiter.join().unwrap();
        assert_eq!(barrier.generation(), 1);
        // Both handles are gone now: the leaver was dropped here, the
        // stayer at its thread's exit.
        assert_eq!(barrier.participants(), 0);
    }
}
