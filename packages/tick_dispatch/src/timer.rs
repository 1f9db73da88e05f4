use std::fmt;
use std::num::NonZero;

use crate::{EventCallback, SourceIndex};

/// Identifies a timer slot within one dispatcher.
///
/// Handles are stable for as long as the timer exists. Once a timer is killed its slot -
/// and therefore its handle value - may be reused by a later creation, so a handle must
/// not be kept around after the timer it names is gone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimerHandle {
    pub(crate) slot: usize,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum TimerKind {
    /// Re-arms itself `period` ticks after every fire.
    Periodic { period: NonZero<u64> },

    /// Fires once; afterwards the slot is reclaimed or stays addressable for retriggering.
    SingleShot { kill_at_due_time: bool },
}

#[derive(Clone, Copy, Debug)]
enum TimerState {
    /// No timer lives here; the slot index is on the free list.
    Vacant,

    /// Fires when the dispatcher tick reaches `due`.
    Armed { due: u64 },

    /// A single-shot that has fired or been suspended. Addressable, consuming its slot,
    /// waiting for a retrigger.
    Idle,

    /// Its callback is running right now. What the callback asked for is recorded here
    /// and applied when the callback returns, so the slot cannot be reused mid-call.
    Firing { rearm: Option<u64>, killed: bool },
}

struct TimerSlot {
    kind: TimerKind,
    state: TimerState,

    /// Lifted out while the timer's own callback runs.
    callback: Option<EventCallback>,

    context_datum: u32,
    owner: SourceIndex,
}

/// Everything a firing timer hands to the dispatch loop for the callback invocation.
pub(crate) struct FiringTimer {
    pub(crate) callback: EventCallback,
    pub(crate) context_datum: u32,
    pub(crate) owner: SourceIndex,
}

/// The per-dispatcher timer arena.
///
/// Slots are reserved up front and recycled through a free list; a handle is an index
/// into this arena, never a pointer, so nothing dangles and nothing moves. Capacity
/// overflow is a configuration error and panics, like every other violated sizing
/// contract in the engine.
pub(crate) struct TimerSlab {
    slots: Vec<TimerSlot>,
    free: Vec<usize>,
    capacity: usize,
}

impl fmt::Debug for TimerSlab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSlab")
            .field("live", &self.live_count())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl TimerSlab {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots
            .len()
            .checked_sub(self.free.len())
            .expect("the free list only ever holds indexes of existing slots")
    }

    /// The iteration bound for one tick's fire sweep. Slots created mid-sweep may extend
    /// the slab past this bound, but a timer armed once the tick has advanced is due no
    /// earlier than the next advance, so skipping them is not an approximation - they
    /// simply are not due yet.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn create(
        &mut self,
        kind: TimerKind,
        due: u64,
        callback: EventCallback,
        context_datum: u32,
        owner: SourceIndex,
    ) -> TimerHandle {
        let slot = TimerSlot {
            kind,
            state: TimerState::Armed { due },
            callback: Some(callback),
            context_datum,
            owner,
        };

        let index = if let Some(index) = self.free.pop() {
            *self
                .slots
                .get_mut(index)
                .expect("the free list only ever holds indexes of existing slots") = slot;
            index
        } else {
            assert!(
                self.slots.len() < self.capacity,
                "timer capacity exhausted - the dispatcher system was sized for {} timers per dispatcher",
                self.capacity
            );
            self.slots.push(slot);
            self.slots
                .len()
                .checked_sub(1)
                .expect("a slot was just pushed, so the slab is not empty")
        };

        TimerHandle { slot: index }
    }

    /// Starts the fire of the timer in `slot` if it is due at `tick`.
    ///
    /// Returns the lifted-out callback plus the invocation data; the caller must pass the
    /// callback back through [`finish_fire()`][Self::finish_fire] once it has run. While
    /// the fire is in flight the slot is in the `Firing` state and cannot be reused.
    pub(crate) fn begin_fire(&mut self, slot: usize, tick: u64) -> Option<FiringTimer> {
        let entry = self.slots.get_mut(slot)?;

        match entry.state {
            TimerState::Armed { due } if due <= tick => {
                entry.state = TimerState::Firing {
                    rearm: None,
                    killed: false,
                };

                Some(FiringTimer {
                    callback: entry
                        .callback
                        .take()
                        .expect("an armed timer always holds its callback"),
                    context_datum: entry.context_datum,
                    owner: entry.owner,
                })
            }
            _ => None,
        }
    }

    /// Applies whatever the callback asked for during the fire and returns the callback
    /// to its slot - unless the timer ends here, in which case the slot is reclaimed.
    pub(crate) fn finish_fire(&mut self, slot: usize, tick: u64, callback: EventCallback) {
        let (rearm, killed, kind) = {
            let entry = self
                .slots
                .get(slot)
                .expect("the firing slot exists for the duration of the callback");

            let TimerState::Firing { rearm, killed } = entry.state else {
                unreachable!("the slot stays in the Firing state for the duration of the callback")
            };

            (rearm, killed, entry.kind)
        };

        if killed {
            self.vacate(slot);
            return;
        }

        match kind {
            TimerKind::Periodic { period } => {
                let due = tick
                    .checked_add(period.get())
                    .expect("tick arithmetic cannot realistically overflow u64");
                self.arm_slot(slot, due, callback);
            }
            TimerKind::SingleShot { kill_at_due_time } => {
                if let Some(due) = rearm {
                    self.arm_slot(slot, due, callback);
                } else if kill_at_due_time {
                    self.vacate(slot);
                } else {
                    self.idle_slot(slot, callback);
                }
            }
        }
    }

    /// Re-arms a single-shot timer to fire at `due`.
    ///
    /// Legal on an armed timer (the pending fire moves), an idle timer (the addressable
    /// single-shot comes back to life), and on the currently firing timer from inside its
    /// own callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle names no live timer or the timer is periodic - both are
    /// programming errors under the engine's static configuration contract.
    pub(crate) fn retrigger(&mut self, slot: usize, due: u64) {
        let entry = self.live_entry_mut(slot, "retrigger");

        assert!(
            matches!(entry.kind, TimerKind::SingleShot { .. }),
            "only single-shot timers can be retriggered - periodic timers re-arm themselves"
        );

        match &mut entry.state {
            TimerState::Armed { due: pending } => *pending = due,
            TimerState::Idle => entry.state = TimerState::Armed { due },
            TimerState::Firing { rearm, .. } => *rearm = Some(due),
            TimerState::Vacant => unreachable!("live_entry_mut rejects vacant slots"),
        }
    }

    /// Takes an armed single-shot timer back to idle without firing it. Suspending an
    /// already idle timer is a no-op; suspending the currently firing timer cancels a
    /// rearm requested earlier in the same callback but cannot rescue a
    /// `kill_at_due_time` timer from its scheduled end.
    ///
    /// # Panics
    ///
    /// Panics when the handle names no live timer or the timer is periodic.
    pub(crate) fn suspend(&mut self, slot: usize) {
        let entry = self.live_entry_mut(slot, "suspend");

        assert!(
            matches!(entry.kind, TimerKind::SingleShot { .. }),
            "only single-shot timers can be suspended - kill a periodic timer instead"
        );

        match &mut entry.state {
            TimerState::Armed { .. } => entry.state = TimerState::Idle,
            TimerState::Idle => {}
            TimerState::Firing { rearm, .. } => *rearm = None,
            TimerState::Vacant => unreachable!("live_entry_mut rejects vacant slots"),
        }
    }

    /// Releases a timer's slot, periodic or single-shot. Killing the currently firing
    /// timer from inside its own callback is legal; the slot is reclaimed as soon as the
    /// callback returns.
    ///
    /// # Panics
    ///
    /// Panics when the handle names no live timer.
    pub(crate) fn kill(&mut self, slot: usize) {
        let entry = self.live_entry_mut(slot, "kill");

        if let TimerState::Firing { killed, .. } = &mut entry.state {
            *killed = true;
            return;
        }

        self.vacate(slot);
    }

    fn live_entry_mut(&mut self, slot: usize, operation: &str) -> &mut TimerSlot {
        let entry = self
            .slots
            .get_mut(slot)
            .unwrap_or_else(|| panic!("{operation} requires a handle to a live timer"));

        assert!(
            !matches!(entry.state, TimerState::Vacant),
            "{operation} was given a handle to a timer that no longer exists"
        );

        entry
    }

    fn arm_slot(&mut self, slot: usize, due: u64, callback: EventCallback) {
        let entry = self
            .slots
            .get_mut(slot)
            .expect("only existing slots are ever re-armed");

        entry.state = TimerState::Armed { due };
        entry.callback = Some(callback);
    }

    fn idle_slot(&mut self, slot: usize, callback: EventCallback) {
        let entry = self
            .slots
            .get_mut(slot)
            .expect("only existing slots are ever idled");

        entry.state = TimerState::Idle;
        entry.callback = Some(callback);
    }

    fn vacate(&mut self, slot: usize) {
        let entry = self
            .slots
            .get_mut(slot)
            .expect("only existing slots are ever vacated");

        // Dropping the callback releases whatever the closure captured.
        entry.callback = None;
        entry.state = TimerState::Vacant;

        self.free.push(slot);
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::EventCallback;

    fn noop() -> EventCallback {
        Box::new(|_cx| {})
    }

    fn slab(capacity: usize) -> TimerSlab {
        TimerSlab::new(capacity)
    }

    #[test]
    fn armed_timer_fires_exactly_at_due() {
        let mut timers = slab(2);

        let handle = timers.create(
            TimerKind::SingleShot {
                kill_at_due_time: false,
            },
            5,
            noop(),
            7,
            SourceIndex::internal(0),
        );

        assert!(timers.begin_fire(handle.slot, 4).is_none());

        let firing = timers.begin_fire(handle.slot, 5).expect("due now");
        assert_eq!(firing.context_datum, 7);
        timers.finish_fire(handle.slot, 5, firing.callback);

        // Fired once, now idle: not due again.
        assert!(timers.begin_fire(handle.slot, 6).is_none());
        assert_eq!(timers.live_count(), 1);
    }

    #[test]
    fn periodic_rearms_from_the_fire_tick() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::Periodic { period: nz!(3) },
            3,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        let firing = timers.begin_fire(handle.slot, 3).expect("due now");
        timers.finish_fire(handle.slot, 3, firing.callback);

        assert!(timers.begin_fire(handle.slot, 5).is_none());
        assert!(timers.begin_fire(handle.slot, 6).is_some());
    }

    #[test]
    fn kill_at_due_time_vacates_after_the_fire() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::SingleShot {
                kill_at_due_time: true,
            },
            1,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        let firing = timers.begin_fire(handle.slot, 1).expect("due now");
        timers.finish_fire(handle.slot, 1, firing.callback);

        assert_eq!(timers.live_count(), 0);

        // The slot is reusable by the next creation.
        let reused = timers.create(
            TimerKind::SingleShot {
                kill_at_due_time: false,
            },
            9,
            noop(),
            0,
            SourceIndex::internal(0),
        );
        assert_eq!(reused.slot, handle.slot);
    }

    #[test]
    fn rearm_during_fire_wins_over_kill_at_due_time() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::SingleShot {
                kill_at_due_time: true,
            },
            1,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        let firing = timers.begin_fire(handle.slot, 1).expect("due now");
        timers.retrigger(handle.slot, 4);
        timers.finish_fire(handle.slot, 1, firing.callback);

        assert_eq!(timers.live_count(), 1);
        assert!(timers.begin_fire(handle.slot, 4).is_some());
    }

    #[test]
    fn kill_during_fire_vacates_after_the_callback() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::Periodic { period: nz!(1) },
            1,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        let firing = timers.begin_fire(handle.slot, 1).expect("due now");
        timers.kill(handle.slot);

        // The slot survives until the callback is done.
        assert_eq!(timers.live_count(), 1);

        timers.finish_fire(handle.slot, 1, firing.callback);
        assert_eq!(timers.live_count(), 0);
    }

    #[test]
    fn suspend_then_retrigger_rearms_from_the_new_due() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::SingleShot {
                kill_at_due_time: false,
            },
            2,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        timers.suspend(handle.slot);
        assert!(timers.begin_fire(handle.slot, 2).is_none());

        timers.retrigger(handle.slot, 10);
        assert!(timers.begin_fire(handle.slot, 9).is_none());
        assert!(timers.begin_fire(handle.slot, 10).is_some());
    }

    #[test]
    #[should_panic]
    fn retrigger_of_a_periodic_timer_panics() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::Periodic { period: nz!(2) },
            2,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        timers.retrigger(handle.slot, 5);
    }

    #[test]
    #[should_panic]
    fn stale_handle_after_kill_panics() {
        let mut timers = slab(1);

        let handle = timers.create(
            TimerKind::SingleShot {
                kill_at_due_time: false,
            },
            1,
            noop(),
            0,
            SourceIndex::internal(0),
        );

        timers.kill(handle.slot);
        timers.retrigger(handle.slot, 3);
    }

    #[test]
    #[should_panic]
    fn creating_beyond_capacity_panics() {
        let mut timers = slab(1);

        for _ in 0..2 {
            _ = timers.create(
                TimerKind::SingleShot {
                    kill_at_due_time: false,
                },
                1,
                noop(),
                0,
                SourceIndex::internal(0),
            );
        }
    }
}
