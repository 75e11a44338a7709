#![cfg_attr(not(test), no_std)]
#![doc = "Embassy-style HAL for the NXP LPC1114: clock and PLL bring-up, the four counter/timers, and a millisecond/microsecond timebase with busy-wait delays."]
#![doc = ""]
#![doc = "## Feature flags"]
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clocks;
pub mod ctimer;
pub mod delay;
pub mod interrupt;
pub mod pac;
pub mod time;
#[cfg(feature = "time-driver")]
mod time_driver;
pub mod uart;

pub use crate::clocks::config::ClockConfig;
pub use crate::clocks::{ClockError, Clocks};
pub use crate::delay::{Deadline, Delay};
pub use crate::time::{delay, delay_microseconds, micros, millis};

/// HAL configuration for the LPC1114
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Clock tree, 48 MHz from a 12 MHz crystal by default
    pub clocks: ClockConfig,
}

impl Config {
    pub fn new(clocks: ClockConfig) -> Self {
        Self { clocks }
    }
}

/// Initialize the HAL: bring up the clocks, program the counter/timers and
/// start the timebase.
///
/// This must be called once, before [`millis`], [`micros`] or any delay is
/// used. A second call returns [`ClockError::AlreadyConfigured`].
pub fn init(config: Config) -> Result<(), ClockError> {
    clocks::init(config.clocks)?;
    let clocks = clocks::with_clocks(Clocks::clone)
        .ok_or_else(|| ClockError::prog_err("clocks were not recorded by init"))?;

    // The handler must see the right increments from its first run
    let increments = timebase_increments(clocks.ahb_clk)?;
    time::TIMEBASE.configure(increments);
    ctimer::init_all(&clocks)?;

    info!(
        "timebase running: {} us per overflow, {} ms + {}/{} per overflow",
        increments.period_micros(),
        increments.millis_inc(),
        increments.fract_inc(),
        time::FRACT_MAX
    );
    Ok(())
}

/// Per-overflow increments of the timebase when the AHB clock runs at `ahb_clk`
fn timebase_increments(ahb_clk: u32) -> Result<time::Increments, ClockError> {
    let prescale = ctimer::prescale_for(ahb_clk, ctimer::TICK_HZ)?;
    let period = time::overflow_period_micros(ahb_clk, prescale, ctimer::TIMEBASE_MATCH);
    Ok(time::Increments::from_overflow_period(period))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_gives_a_whole_millisecond_overflow() {
        let clocks = clocks::plan(&Config::default().clocks).unwrap();
        let increments = timebase_increments(clocks.ahb_clk).unwrap();
        assert_eq!(increments.period_micros(), 1000);
        assert_eq!(increments.millis_inc(), 1);
        assert_eq!(increments.fract_inc(), 0);
    }

    #[test]
    fn slower_ahb_clock_keeps_the_period() {
        // 24 MHz: prescale 23, still 1 µs per tick
        let increments = timebase_increments(24_000_000).unwrap();
        assert_eq!(increments.period_micros(), 1000);
    }

    #[test]
    fn uneven_ahb_clock_is_rejected() {
        assert!(matches!(
            timebase_increments(12_500_000),
            Err(ClockError::BadConfiguration { .. })
        ));
    }
}
