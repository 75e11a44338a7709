//! Time driver for embassy-time, running off the CT16B0 timebase
//!
//! Time is [`SoftClock::micros_wide`] at one tick per microsecond. There is
//! no dedicated alarm hardware: the queue is checked from the overflow
//! interrupt, so a wakeup fires on the first overflow at or after its
//! deadline.
use core::cell::{Cell, RefCell};
use core::task::Waker;

use critical_section::{CriticalSection, Mutex};
use embassy_time_driver::Driver;
use embassy_time_queue_utils::Queue;

use crate::ctimer::CtimerInstance;
use crate::time::{OverflowTimer, SoftClock, TIMEBASE};

struct TimebaseDriver<T: 'static> {
    clock: &'static SoftClock<T>,
    queue: Mutex<RefCell<Queue>>,
    /// Earliest deadline in `queue`, `u64::MAX` when it is empty
    next_alarm: Mutex<Cell<u64>>,
}

embassy_time_driver::time_driver_impl!(
    static DRIVER: TimebaseDriver<CtimerInstance> = TimebaseDriver::new(&TIMEBASE)
);

impl<T: OverflowTimer> TimebaseDriver<T> {
    const fn new(clock: &'static SoftClock<T>) -> Self {
        Self {
            clock,
            queue: Mutex::new(RefCell::new(Queue::new())),
            next_alarm: Mutex::new(Cell::new(u64::MAX)),
        }
    }

    fn ticks(&self) -> u64 {
        self.clock.micros_wide()
    }

    /// Wake everything due at `now` and remember the next deadline.
    fn dispatch(&self, cs: CriticalSection, now: u64) {
        let next = self.queue.borrow_ref_mut(cs).next_expiration(now);
        self.next_alarm.borrow(cs).set(next);
    }

    fn schedule(&self, at: u64, waker: &Waker) {
        critical_section::with(|cs| {
            let changed = self.queue.borrow_ref_mut(cs).schedule_wake(at, waker);
            if changed {
                // Also wakes right away if `at` has already passed
                self.dispatch(cs, self.ticks());
            }
        })
    }

    fn service(&self) {
        critical_section::with(|cs| {
            let now = self.ticks();
            if now >= self.next_alarm.borrow(cs).get() {
                self.dispatch(cs, now);
            }
        })
    }
}

impl<T: OverflowTimer + Sync> Driver for TimebaseDriver<T> {
    fn now(&self) -> u64 {
        self.ticks()
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        self.schedule(at, waker)
    }
}

/// Called from the CT16B0 handler after the timebase has advanced.
pub(crate) fn on_overflow() {
    DRIVER.service()
}
