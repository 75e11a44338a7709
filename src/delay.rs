//! Busy-wait delays on top of a microsecond clock
//!
//! Nothing here sleeps or yields: the core spins for the whole wait and the
//! wait cannot be cancelled. Code driven by a scheduler should poll a
//! [`Deadline`] instead.
use crate::time::{OverflowTimer, SoftClock};

/// A free running microsecond counter that wraps at `u32::MAX`.
pub trait MicrosClock {
    fn now_micros(&self) -> u32;
}

impl<T: OverflowTimer> MicrosClock for SoftClock<T> {
    fn now_micros(&self) -> u32 {
        self.micros()
    }
}

/// Longest span a [`Deadline`] is set ahead; longer requests are clamped to it
pub const MAX_DEADLINE_MICROS: u32 = 1 << 30;

/// A point in microsecond time, compared against a [`MicrosClock`] without
/// caring about wraparound. It is never set more than
/// [`MAX_DEADLINE_MICROS`] ahead, so it stays inside the 2^31 µs window where
/// the wrapping comparison holds.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: u32,
}

impl Deadline {
    pub fn after_micros<C: MicrosClock + ?Sized>(clock: &C, us: u32) -> Self {
        Self::from_start(clock.now_micros(), us)
    }

    pub fn from_start(start: u32, us: u32) -> Self {
        Self {
            at: start.wrapping_add(us.min(MAX_DEADLINE_MICROS)),
        }
    }

    pub fn at(&self) -> u32 {
        self.at
    }

    /// Microseconds left, 0 once the deadline has passed
    pub fn remaining_at(&self, now: u32) -> u32 {
        let diff = self.at.wrapping_sub(now) as i32;
        if diff > 0 {
            diff as u32
        } else {
            0
        }
    }

    pub fn remaining<C: MicrosClock + ?Sized>(&self, clock: &C) -> u32 {
        self.remaining_at(clock.now_micros())
    }

    pub fn is_elapsed<C: MicrosClock + ?Sized>(&self, clock: &C) -> bool {
        self.remaining(clock) == 0
    }
}

/// Blocking delay provider borrowing a microsecond clock
pub struct Delay<'a, C: ?Sized> {
    clock: &'a C,
}

impl<'a, C: MicrosClock + ?Sized> Delay<'a, C> {
    pub fn new(clock: &'a C) -> Self {
        Self { clock }
    }

    /// Spin for `ms` milliseconds.
    ///
    /// Each millisecond is counted once 1000 µs have passed since the previous
    /// checkpoint, and the checkpoint then moves by exactly 1000 µs, so a
    /// slow poll does not add up over a long delay.
    pub fn delay_ms(&self, ms: u32) {
        self.block_ms(ms)
    }

    /// Spin for `us` microseconds. A zero wait returns without reading the
    /// clock.
    pub fn delay_us(&self, us: u16) {
        self.block_us(us as u32)
    }

    fn block_ms(&self, mut ms: u32) {
        let mut start = self.clock.now_micros();
        while ms > 0 {
            if self.clock.now_micros().wrapping_sub(start) >= 1000 {
                ms -= 1;
                start = start.wrapping_add(1000);
            } else {
                core::hint::spin_loop();
            }
        }
    }

    fn block_us(&self, mut us: u32) {
        while us > 0 {
            let chunk = us.min(MAX_DEADLINE_MICROS);
            let deadline = Deadline::after_micros(self.clock, chunk);
            while !deadline.is_elapsed(self.clock) {
                core::hint::spin_loop();
            }
            us -= chunk;
        }
    }
}

impl<C: MicrosClock + ?Sized> embedded_hal_1::delay::DelayNs for Delay<'_, C> {
    fn delay_ns(&mut self, ns: u32) {
        self.block_us(ns.div_ceil(1000))
    }

    fn delay_us(&mut self, us: u32) {
        self.block_us(us)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.block_ms(ms)
    }
}

macro_rules! impl_delay_02 {
    ($($t:ty),+) => {
        $(
            impl<C: MicrosClock + ?Sized> embedded_hal_02::blocking::delay::DelayMs<$t> for Delay<'_, C> {
                fn delay_ms(&mut self, ms: $t) {
                    self.block_ms(ms as u32)
                }
            }

            impl<C: MicrosClock + ?Sized> embedded_hal_02::blocking::delay::DelayUs<$t> for Delay<'_, C> {
                fn delay_us(&mut self, us: $t) {
                    self.block_us(us as u32)
                }
            }
        )+
    };
}

impl_delay_02!(u8, u16, u32);

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use embedded_hal_1::delay::DelayNs;

    use super::*;

    /// Clock that moves forward by `step` µs every time it is read
    struct SteppingClock {
        now: Cell<u32>,
        step: u32,
        reads: Cell<u32>,
    }

    impl SteppingClock {
        fn starting_at(now: u32, step: u32) -> Self {
            Self {
                now: Cell::new(now),
                step,
                reads: Cell::new(0),
            }
        }

        fn peek(&self) -> u32 {
            self.now.get()
        }
    }

    impl MicrosClock for SteppingClock {
        fn now_micros(&self) -> u32 {
            let now = self.now.get();
            self.now.set(now.wrapping_add(self.step));
            self.reads.set(self.reads.get() + 1);
            now
        }
    }

    #[test]
    fn delay_ms_waits_full_duration() {
        let clock = SteppingClock::starting_at(0, 7);
        Delay::new(&clock).delay_ms(1000);
        let elapsed = clock.peek();
        assert!(elapsed >= 1_000_000, "returned early after {elapsed} µs");
        assert!(elapsed <= 1_000_000 + 2 * 7, "overshot to {elapsed} µs");
    }

    #[test]
    fn delay_ms_overshoot_does_not_accumulate() {
        // Every millisecond is observed 200 µs late; restarting the checkpoint
        // from the observed time would stretch the delay to 12 ms
        let clock = SteppingClock::starting_at(0, 600);
        Delay::new(&clock).delay_ms(10);
        let elapsed = clock.peek();
        assert!((10_000..=10_000 + 2 * 600).contains(&elapsed), "elapsed {elapsed} µs");
    }

    #[test]
    fn delay_ms_zero_returns_immediately() {
        let clock = SteppingClock::starting_at(0, 1);
        Delay::new(&clock).delay_ms(0);
        assert_eq!(clock.reads.get(), 1);
    }

    #[test]
    fn delay_us_zero_returns_promptly() {
        let clock = SteppingClock::starting_at(42, 1);
        Delay::new(&clock).delay_us(0);
        assert_eq!(clock.reads.get(), 0);

        // The same through a deadline that has already arrived
        let deadline = Deadline::after_micros(&clock, 0);
        assert!(deadline.is_elapsed(&clock));
    }

    #[test]
    fn delay_us_survives_counter_wrap() {
        let start = u32::MAX - 50;
        let clock = SteppingClock::starting_at(start, 3);
        Delay::new(&clock).delay_us(100);
        let elapsed = clock.peek().wrapping_sub(start);
        assert!((100..=100 + 2 * 3).contains(&elapsed), "elapsed {elapsed} µs");
    }

    #[test]
    fn delay_ms_survives_counter_wrap() {
        let start = u32::MAX - 1500;
        let clock = SteppingClock::starting_at(start, 11);
        Delay::new(&clock).delay_ms(3);
        let elapsed = clock.peek().wrapping_sub(start);
        assert!((3000..=3000 + 2 * 11).contains(&elapsed), "elapsed {elapsed} µs");
    }

    #[test]
    fn deadline_remaining_counts_down_and_saturates() {
        let deadline = Deadline::from_start(1000, 500);
        assert_eq!(deadline.at(), 1500);
        assert_eq!(deadline.remaining_at(1000), 500);
        assert_eq!(deadline.remaining_at(1499), 1);
        assert_eq!(deadline.remaining_at(1500), 0);
        assert_eq!(deadline.remaining_at(90_000), 0);

        let wrapped = Deadline::from_start(u32::MAX - 9, 20);
        assert_eq!(wrapped.at(), 10);
        assert_eq!(wrapped.remaining_at(u32::MAX), 11);
        assert_eq!(wrapped.remaining_at(10), 0);
    }

    #[test]
    fn far_deadline_is_clamped_instead_of_already_elapsed() {
        let deadline = Deadline::from_start(100, u32::MAX);
        assert_eq!(deadline.remaining_at(100), MAX_DEADLINE_MICROS);

        // 2^31 µs ahead would compare as already passed
        let clock = SteppingClock::starting_at(0, 1);
        let deadline = Deadline::after_micros(&clock, 1 << 31);
        assert!(!deadline.is_elapsed(&clock));
        assert_eq!(deadline.at(), MAX_DEADLINE_MICROS);
    }

    #[test]
    fn embedded_hal_delays() {
        let clock = SteppingClock::starting_at(0, 5);
        let mut delay = Delay::new(&clock);

        DelayNs::delay_ns(&mut delay, 1);
        assert!(clock.peek() >= 1);

        let start = clock.peek();
        DelayNs::delay_us(&mut delay, 100_000);
        assert!(clock.peek() - start >= 100_000);

        let start = clock.peek();
        embedded_hal_02::blocking::delay::DelayMs::<u8>::delay_ms(&mut delay, 2);
        assert!(clock.peek() - start >= 2000);
    }
}
