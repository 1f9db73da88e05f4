use std::num::NonZero;

use frame_channel::EventKind;

use crate::timer::{TimerKind, TimerSlab};
use crate::{CallbackFn, SourceIndex, TimerHandle};

/// What caused the running callback to be invoked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Trigger {
    /// An external event arrived through one of the dispatcher's receiver ports. The
    /// payload is available through [`CallbackContext::payload()`].
    Event(EventKind),

    /// A timer owned by this dispatcher reached its due tick. The timer accessors on the
    /// context say which one.
    TimerElapsed,

    /// An internal event source is being registered. Runs exactly once per internal
    /// source, before any dispatching, so the callback can install its timers.
    SourceInit,
}

/// The single value every callback receives.
///
/// All introspection goes through accessors, so one callback function can serve many
/// event sources and timers and decide from the context alone what it was invoked for.
/// Besides reading event data, a callback may create, retrigger, suspend and kill timers
/// on its own dispatcher - and nothing else: queues and pools are out of its reach.
///
/// The context, and every borrow obtained from it, is valid only for the duration of the
/// callback invocation.
#[derive(Debug)]
pub struct CallbackContext<'a> {
    timers: &'a mut TimerSlab,
    tick: u64,
    trigger: Trigger,
    source: SourceIndex,
    payload: Option<&'a [u8]>,
    current_timer: Option<TimerHandle>,
    current_datum: Option<u32>,
}

impl<'a> CallbackContext<'a> {
    pub(crate) fn new(
        timers: &'a mut TimerSlab,
        tick: u64,
        trigger: Trigger,
        source: SourceIndex,
        payload: Option<&'a [u8]>,
        current_timer: Option<TimerHandle>,
        current_datum: Option<u32>,
    ) -> Self {
        Self {
            timers,
            tick,
            trigger,
            source,
            payload,
            current_timer,
            current_datum,
        }
    }

    /// What this invocation is about: event arrival, timer expiry, or source bootstrap.
    #[must_use]
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// The dense index of the event source this invocation concerns.
    ///
    /// For timer expiries this is the source whose callback created the timer.
    #[must_use]
    pub fn source(&self) -> SourceIndex {
        self.source
    }

    /// The dispatcher's current tick count.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The payload of the event being delivered.
    ///
    /// `Some` only when [`trigger()`][Self::trigger] is [`Trigger::Event`]. The bytes
    /// live in the receiver port's scratch buffer and must be copied out if they are
    /// needed after the callback returns.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload
    }

    /// The timer whose expiry caused this invocation, if any.
    #[must_use]
    pub fn timer(&self) -> Option<TimerHandle> {
        self.current_timer
    }

    /// The context datum of the timer whose expiry caused this invocation, if any.
    ///
    /// The datum is the small integer supplied at timer creation; a callback shared by
    /// many timer instances uses it to tell which logical object fired (typically an
    /// index into an application-side table).
    #[must_use]
    pub fn context_datum(&self) -> Option<u32> {
        self.current_datum
    }

    /// Creates a periodic timer owned by the current event source.
    ///
    /// The timer first fires `period` ticks from now and re-arms itself after every
    /// fire. It runs until killed. Discard the handle if the timer is meant to run
    /// forever; it is only needed to kill the timer later.
    #[must_use = "the handle is the only way to address the timer later; discard it explicitly if the timer runs forever"]
    pub fn create_periodic_timer(
        &mut self,
        period: NonZero<u64>,
        callback: impl CallbackFn,
        context_datum: u32,
    ) -> TimerHandle {
        let due = self
            .tick
            .checked_add(period.get())
            .expect("tick arithmetic cannot realistically overflow u64");

        self.timers.create(
            TimerKind::Periodic { period },
            due,
            Box::new(callback),
            context_datum,
            self.source,
        )
    }

    /// Creates a single-shot timer owned by the current event source.
    ///
    /// The timer fires once, `delay` ticks from now; a delay of zero means the next
    /// tick. With `kill_at_due_time` the slot is reclaimed at the fire; otherwise the
    /// timer goes idle and stays addressable so any callback holding the context can
    /// retrigger it later.
    #[must_use = "the handle is the only way to address the timer later; discard it explicitly for fire-and-forget timers"]
    pub fn create_single_shot_timer(
        &mut self,
        delay: u64,
        callback: impl CallbackFn,
        context_datum: u32,
        kill_at_due_time: bool,
    ) -> TimerHandle {
        self.timers.create(
            TimerKind::SingleShot { kill_at_due_time },
            self.due_after(delay),
            Box::new(callback),
            context_datum,
            self.source,
        )
    }

    /// Re-arms a single-shot timer to fire `delay` ticks from *now* - the current tick,
    /// not the timer's original arming tick.
    ///
    /// Passing `None` inside a timer's own callback retriggers that same timer. This
    /// self-reference is how "fire every tick until some condition holds, then switch
    /// cadence" logic is written: the callback keeps retriggering itself with the delay
    /// it wants next.
    ///
    /// # Panics
    ///
    /// Panics when the handle names no live timer, the timer is periodic, or `None` is
    /// passed outside a timer callback.
    pub fn retrigger_single_shot_timer(&mut self, timer: Option<TimerHandle>, delay: u64) {
        let handle = self.resolve(timer);
        let due = self.due_after(delay);
        self.timers.retrigger(handle.slot, due);
    }

    /// Takes an armed single-shot timer back to idle without firing it. The timer stays
    /// addressable for a later retrigger.
    ///
    /// # Panics
    ///
    /// Panics when the handle names no live timer, the timer is periodic, or `None` is
    /// passed outside a timer callback.
    pub fn suspend_single_shot_timer(&mut self, timer: Option<TimerHandle>) {
        let handle = self.resolve(timer);
        self.timers.suspend(handle.slot);
    }

    /// Destroys a timer, periodic or single-shot, releasing its slot for reuse.
    ///
    /// Passing `None` inside a timer's own callback kills that timer; the slot is
    /// reclaimed when the callback returns.
    ///
    /// # Panics
    ///
    /// Panics when the handle names no live timer or `None` is passed outside a timer
    /// callback.
    pub fn kill_timer(&mut self, timer: Option<TimerHandle>) {
        let handle = self.resolve(timer);
        self.timers.kill(handle.slot);
    }

    fn resolve(&self, timer: Option<TimerHandle>) -> TimerHandle {
        timer.or(self.current_timer).expect(
            "a None timer reference means the current timer and is only meaningful inside \
             a timer callback",
        )
    }

    /// A delay of `n` fires at the `n`-th tick advance after arming; zero is promoted to
    /// one, so no timer ever fires retroactively.
    fn due_after(&self, delay: u64) -> u64 {
        self.tick
            .checked_add(delay.max(1))
            .expect("tick arithmetic cannot realistically overflow u64")
    }
}
