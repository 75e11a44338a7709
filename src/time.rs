//! Millisecond / microsecond timebase driven by the CT16B0 match interrupt.
//!
//! The timer ticks once per microsecond and resets every
//! [`TIMEBASE_MATCH`](crate::ctimer::TIMEBASE_MATCH) ticks. Each reset raises
//! an interrupt whose handler calls [`SoftClock::on_overflow`]. The handler
//! keeps three counters:
//!
//! * a raw overflow count, combined with the live timer value to give
//!   microseconds,
//! * whole milliseconds,
//! * a fixed-point fraction of a millisecond, in units of 8 µs, which carries
//!   into the millisecond count. Overflow periods that are not a whole number
//!   of milliseconds therefore do not drift, at the cost of up to one unit of
//!   jitter per overflow.
//!
//! All counters wrap silently (milliseconds after ~49.7 days). Compare
//! timestamps with `wrapping_sub`, never with `<`.
use core::sync::atomic::{compiler_fence, AtomicU32, AtomicU8, Ordering};

use cortex_m::peripheral::NVIC;

use crate::ctimer::{self, CtimerInstance, TIMEBASE_MATCH};
use crate::delay::Delay;

/// Right shift applied to the sub-millisecond remainder so it fits a `u8`
pub const FRACT_SHIFT: u32 = 3;
/// One millisecond in fractional units
pub const FRACT_MAX: u8 = (1000 >> FRACT_SHIFT) as u8;

/// Length of one timer overflow in microseconds, for a timer clocked from
/// `core_hz` through `prescale` (register value) and resetting after
/// `match_value` ticks.
pub const fn overflow_period_micros(core_hz: u32, prescale: u32, match_value: u32) -> u32 {
    let cycles = (prescale as u64 + 1) * match_value as u64;
    (cycles * 1_000_000 / core_hz as u64) as u32
}

/// What a single overflow adds to the clock
///
/// Only built by [`from_overflow_period`](Self::from_overflow_period), which
/// keeps the fraction below [`FRACT_MAX`] so the handler's `u8` sum cannot
/// overflow.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Increments {
    period_micros: u32,
    millis_inc: u32,
    fract_inc: u8,
}

impl Increments {
    pub const fn from_overflow_period(period_micros: u32) -> Self {
        Self {
            period_micros,
            millis_inc: period_micros / 1000,
            fract_inc: ((period_micros % 1000) >> FRACT_SHIFT) as u8,
        }
    }

    /// Overflow period in microseconds, which is also the timer ticks per
    /// overflow at one tick per microsecond
    pub const fn period_micros(&self) -> u32 {
        self.period_micros
    }

    pub const fn millis_inc(&self) -> u32 {
        self.millis_inc
    }

    /// Fraction of a millisecond in units of `1 << FRACT_SHIFT` µs, below [`FRACT_MAX`]
    pub const fn fract_inc(&self) -> u8 {
        self.fract_inc
    }
}

impl Default for Increments {
    fn default() -> Self {
        Self::from_overflow_period(TIMEBASE_MATCH)
    }
}

/// Hardware underneath a [`SoftClock`]: a free running counter that resets
/// once per period and flags that reset with an interrupt.
pub trait OverflowTimer {
    /// Live counter value
    fn counter(&self) -> u32;
    /// The overflow interrupt flag is raised and not yet cleared
    fn overflow_pending(&self) -> bool;
    fn clear_overflow(&self);
    /// Mask the overflow interrupt line, returning whether it was unmasked
    fn mask_interrupt(&self) -> bool;
    fn unmask_interrupt(&self);
}

/// Counters advanced by the overflow interrupt and read from thread mode.
///
/// Only the interrupt handler writes; readers mask that one interrupt line
/// for the duration of the read. Counters are atomics with plain load/store
/// so this also works on cores without read-modify-write atomics.
pub struct SoftClock<T> {
    timer: T,
    overflow_count: AtomicU32,
    /// Times `overflow_count` has wrapped, extends it for [`micros_wide`](Self::micros_wide)
    overflow_epoch: AtomicU32,
    millis: AtomicU32,
    fract: AtomicU8,
    period_micros: AtomicU32,
    millis_inc: AtomicU32,
    fract_inc: AtomicU8,
}

impl<T: OverflowTimer> SoftClock<T> {
    /// A clock at zero, assuming a 1000 µs overflow period until
    /// [`configure`](Self::configure) says otherwise.
    pub const fn new(timer: T) -> Self {
        let inc = Increments::from_overflow_period(TIMEBASE_MATCH);
        Self {
            timer,
            overflow_count: AtomicU32::new(0),
            overflow_epoch: AtomicU32::new(0),
            millis: AtomicU32::new(0),
            fract: AtomicU8::new(0),
            period_micros: AtomicU32::new(inc.period_micros),
            millis_inc: AtomicU32::new(inc.millis_inc),
            fract_inc: AtomicU8::new(inc.fract_inc),
        }
    }

    /// Set the per-overflow increments. Call before the interrupt is unmasked.
    pub fn configure(&self, inc: Increments) {
        debug_assert!(inc.fract_inc < FRACT_MAX);
        self.masked(|| {
            self.period_micros.store(inc.period_micros, Ordering::Relaxed);
            self.millis_inc.store(inc.millis_inc, Ordering::Relaxed);
            self.fract_inc.store(inc.fract_inc, Ordering::Relaxed);
        });
    }

    pub fn increments(&self) -> Increments {
        Increments {
            period_micros: self.period_micros.load(Ordering::Relaxed),
            millis_inc: self.millis_inc.load(Ordering::Relaxed),
            fract_inc: self.fract_inc.load(Ordering::Relaxed),
        }
    }

    /// Body of the overflow interrupt handler.
    ///
    /// Must only run in the overflow interrupt (or with it masked); it is the
    /// single writer of the counters.
    pub fn on_overflow(&self) {
        let inc = self.increments();

        let mut m = self.millis.load(Ordering::Relaxed);
        let mut f = self.fract.load(Ordering::Relaxed);

        m = m.wrapping_add(inc.millis_inc);
        // Both terms are below FRACT_MAX, the sum fits
        f += inc.fract_inc;
        if f >= FRACT_MAX {
            f -= FRACT_MAX;
            m = m.wrapping_add(1);
        }

        self.fract.store(f, Ordering::Relaxed);
        self.millis.store(m, Ordering::Relaxed);
        let overflows = self.overflow_count.load(Ordering::Relaxed).wrapping_add(1);
        self.overflow_count.store(overflows, Ordering::Relaxed);
        if overflows == 0 {
            let epoch = self.overflow_epoch.load(Ordering::Relaxed);
            self.overflow_epoch.store(epoch.wrapping_add(1), Ordering::Relaxed);
        }

        self.timer.clear_overflow();
    }

    /// Milliseconds since the timebase started, wrapping at `u32::MAX`.
    pub fn millis(&self) -> u32 {
        self.masked(|| self.millis.load(Ordering::Relaxed))
    }

    /// Microseconds since the timebase started, wrapping at `u32::MAX`.
    pub fn micros(&self) -> u32 {
        let (overflows, ticks, period) = self.snapshot();
        (overflows as u32).wrapping_mul(period).wrapping_add(ticks)
    }

    /// Same reading as [`micros`](Self::micros) without truncation to 32 bits.
    pub fn micros_wide(&self) -> u64 {
        let (overflows, ticks, period) = self.snapshot();
        overflows
            .wrapping_mul(period as u64)
            .wrapping_add(ticks as u64)
    }

    /// Overflow count and live counter, corrected for an overflow the
    /// handler has not processed yet.
    fn snapshot(&self) -> (u64, u32, u32) {
        self.masked(|| {
            let period = self.period_micros.load(Ordering::Relaxed);
            let epoch = self.overflow_epoch.load(Ordering::Relaxed) as u64;
            let mut overflows = epoch << 32 | self.overflow_count.load(Ordering::Relaxed) as u64;
            let ticks = self.timer.counter();

            // The counter already wrapped but the interrupt is still pending:
            // count that overflow now or the result lags by a whole period.
            // A counter just below the match value means the flag was raised
            // after it was sampled.
            if self.timer.overflow_pending() && ticks < period.saturating_sub(1) {
                overflows = overflows.wrapping_add(1);
            }
            (overflows, ticks, period)
        })
    }

    /// Run `f` with the overflow interrupt masked, restoring its previous state.
    fn masked<R>(&self, f: impl FnOnce() -> R) -> R {
        let was_unmasked = self.timer.mask_interrupt();
        compiler_fence(Ordering::SeqCst);
        let r = f();
        compiler_fence(Ordering::SeqCst);
        if was_unmasked {
            self.timer.unmask_interrupt();
        }
        r
    }
}

impl OverflowTimer for CtimerInstance {
    fn counter(&self) -> u32 {
        ctimer::counter(self.regs())
    }

    fn overflow_pending(&self) -> bool {
        ctimer::match0_pending(self.regs())
    }

    fn clear_overflow(&self) {
        ctimer::clear_match0(self.regs())
    }

    fn mask_interrupt(&self) -> bool {
        let irq = self.interrupt();
        let was_enabled = NVIC::is_enabled(irq);
        NVIC::mask(irq);
        was_enabled
    }

    fn unmask_interrupt(&self) {
        // SAFETY: only used to restore a line that `mask_interrupt` found enabled,
        // so no mask based critical section is broken.
        unsafe { NVIC::unmask(self.interrupt()) }
    }
}

/// The timebase shared by the whole firmware, running on CT16B0
pub(crate) static TIMEBASE: SoftClock<CtimerInstance> = SoftClock::new(CtimerInstance::Ct16b0);

/// The process-wide timebase, e.g. to build a [`Delay`] from it.
pub fn timebase() -> &'static SoftClock<CtimerInstance> {
    &TIMEBASE
}

/// Milliseconds since [`crate::init`], wrapping after ~49.7 days.
pub fn millis() -> u32 {
    TIMEBASE.millis()
}

/// Microseconds since [`crate::init`], wrapping after ~71.6 minutes.
pub fn micros() -> u32 {
    TIMEBASE.micros()
}

/// Busy-wait for `ms` milliseconds.
pub fn delay(ms: u32) {
    Delay::new(&TIMEBASE).delay_ms(ms)
}

/// Busy-wait for `us` microseconds.
pub fn delay_microseconds(us: u16) {
    Delay::new(&TIMEBASE).delay_us(us)
}

#[cfg(all(feature = "rt", target_os = "none"))]
mod handler {
    use cortex_m_rt::interrupt;

    use crate::pac::interrupt;

    #[interrupt]
    fn CT16B0() {
        super::TIMEBASE.on_overflow();
        #[cfg(feature = "time-driver")]
        crate::time_driver::on_overflow();
    }
}
