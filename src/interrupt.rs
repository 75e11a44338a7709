//! Global interrupt masking
//!
//! The timebase readers only mask their own NVIC line. These primitives are
//! for callers that need every interrupt held off.

pub use critical_section::CriticalSection;

/// Mask all maskable interrupts (`cpsid i`).
#[inline]
pub fn disable() {
    cortex_m::interrupt::disable()
}

/// Unmask all interrupts (`cpsie i`).
///
/// # Safety
///
/// Must not be called inside a critical section that relies on interrupts
/// staying masked, such as the closure passed to [`free`].
#[inline]
pub unsafe fn enable() {
    cortex_m::interrupt::enable()
}

/// Run `f` in a critical section, nesting safely inside other critical
/// sections.
#[inline]
pub fn free<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    critical_section::with(f)
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use critical_section::Mutex;

    use super::*;

    #[test]
    fn free_nests_and_returns_the_closure_value() {
        static SHARED: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

        let seen = free(|cs| {
            SHARED.borrow(cs).set(7);
            free(|inner| SHARED.borrow(inner).get() + 1)
        });
        assert_eq!(seen, 8);
        assert_eq!(free(|cs| SHARED.borrow(cs).get()), 7);
    }
}
