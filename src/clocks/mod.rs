//! System clock bring-up
use core::cell::RefCell;

use config::{ClockConfig, MainClockSelect, PllClockSelect, SysOscRange, SysPll, IRC_FREQ};
use critical_section::Mutex;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::ReadWrite;

use crate::pac::{self, SysconRegisters, CLKUEN, MAINCLKSEL, PDRUNCFG, SYSOSCCTRL, SYSPLLCLKSEL, SYSPLLCTRL, SYSPLLSTAT};

pub mod config;

/// Highest core/AHB frequency the LPC1114 is rated for
const MAX_CORE_FREQ: u32 = 50_000_000;
/// Highest PLL output frequency
const MAX_PLL_OUT_FREQ: u32 = 100_000_000;
/// Allowed range of the PLL current controlled oscillator
const PLL_CCO_RANGE: core::ops::RangeInclusive<u32> = 156_000_000..=320_000_000;

static CLOCKS: Mutex<RefCell<Option<Clocks>>> = Mutex::new(RefCell::new(None));

/// `init` is the main entrypoint for configuring clocks.
///
/// This should be called once on startup, before the timers or the timebase
/// are touched.
///
/// The whole configuration is checked before any register is written, so an
/// `Err` means the hardware has not been modified (apart from
/// [`ClockError::AlreadyConfigured`], where a previous call already did).
///
/// The waits on the clock-source update handshakes and on PLL lock have no
/// timeout: if the hardware never reports ready, this never returns. Use
/// [`init_with_timeout`] where a watchdog or supervisor can act on a failure.
///
/// Once this function has completed successfully, the resulting frequencies
/// are stored in a write-once static and can be read with [`with_clocks`].
pub fn init(config: ClockConfig) -> Result<(), ClockError> {
    init_inner(pac::syscon(), config, WaitPolicy::Forever)
}

/// Same sequence as [`init`], but every wait gives up after `max_spins` polls
/// and reports [`ClockError::Timeout`]. The hardware is left partially
/// configured in that case.
pub fn init_with_timeout(config: ClockConfig, max_spins: u32) -> Result<(), ClockError> {
    init_inner(pac::syscon(), config, WaitPolicy::Spins(max_spins))
}

fn init_inner(syscon: &SysconRegisters, config: ClockConfig, wait: WaitPolicy) -> Result<(), ClockError> {
    // Ensure we haven't already configured the clocks
    critical_section::with(|cs| {
        if CLOCKS.borrow_ref(cs).is_some() {
            Err(ClockError::AlreadyConfigured)
        } else {
            Ok(())
        }
    })?;

    let clocks = bring_up(syscon, &config, wait)?;
    info!("clocks: main_clk = {} Hz, ahb_clk = {} Hz", clocks.main_clk, clocks.ahb_clk);

    // Store the configured clocks object statically so we can retrieve it to
    // check coherency later
    critical_section::with(|cs| {
        *CLOCKS.borrow_ref_mut(cs) = Some(clocks);
    });
    Ok(())
}

/// Plan, then program, the clock tree described by `config`.
pub(crate) fn bring_up(
    syscon: &SysconRegisters,
    config: &ClockConfig,
    wait: WaitPolicy,
) -> Result<Clocks, ClockError> {
    let clocks = plan(config)?;
    let operator = ClockOperator { config, syscon, wait };

    operator.setup_sys_osc();
    operator.setup_sys_pll()?;
    operator.setup_main_clock()?;
    operator.setup_ahb();

    Ok(clocks)
}

/// Compute the frequencies `config` would produce, rejecting anything outside
/// the part's limits.
pub(crate) fn plan(config: &ClockConfig) -> Result<Clocks, ClockError> {
    let mut clocks = Clocks {
        irc_osc: StaticClock { enabled: true },
        ..Default::default()
    };

    let osc = &config.sys_osc;
    let osc_range = match osc.range {
        SysOscRange::Low1To20Mhz => 1_000_000..=20_000_000,
        SysOscRange::High15To25Mhz => 15_000_000..=25_000_000,
    };
    if !osc_range.contains(&osc.freq) {
        return Err(ClockError::bad_config("sys_osc frequency outside the selected range"));
    }
    clocks.sys_osc = Some(osc.freq);

    clocks.sys_pllclkin = Some(match config.pll_clock_select {
        PllClockSelect::Irc => IRC_FREQ,
        PllClockSelect::SysOsc => osc.freq,
    });

    if let Some(pll) = config.sys_pll {
        clocks.sys_pllclkout = Some(check_pll(&pll, clocks.ensure_pllclkin()?)?);
    }

    clocks.main_clk = match config.main_clock_select {
        MainClockSelect::Irc => clocks.irc_osc.frequency(),
        MainClockSelect::PllInput => clocks.ensure_pllclkin()?,
        MainClockSelect::PllOutput => clocks.ensure_pllclkout()?,
    };

    if config.ahb_div == 0 {
        return Err(ClockError::bad_config("ahb_div of 0 gates the system clock"));
    }
    clocks.ahb_clk = clocks.main_clk / config.ahb_div as u32;
    if clocks.ahb_clk > MAX_CORE_FREQ {
        return Err(ClockError::bad_config("ahb clock above 50 MHz"));
    }

    Ok(clocks)
}

fn check_pll(pll: &SysPll, input: u32) -> Result<u32, ClockError> {
    if pll.msel > 31 {
        return Err(ClockError::bad_config("sys pll msel out of allowed range"));
    }
    if pll.psel > 3 {
        return Err(ClockError::bad_config("sys pll psel out of allowed range"));
    }
    let out = pll.output_freq(input);
    if out > MAX_PLL_OUT_FREQ {
        return Err(ClockError::bad_config("sys pll output above 100 MHz"));
    }
    if !PLL_CCO_RANGE.contains(&pll.cco_freq(input)) {
        return Err(ClockError::bad_config("sys pll cco outside 156..=320 MHz"));
    }
    Ok(out)
}

/// Clock frequencies after [`init`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clocks {
    /// 12 MHz internal RC oscillator, running out of reset
    pub irc_osc: StaticClock<IRC_FREQ>,
    /// Crystal oscillator or external clock on XTALIN
    pub sys_osc: Option<u32>,
    /// Input of the system PLL, selected by SYSPLLCLKSEL
    pub sys_pllclkin: Option<u32>,
    /// Output of the system PLL, if it is running
    pub sys_pllclkout: Option<u32>,
    /// "Main Clock", selected by MAINCLKSEL
    pub main_clk: u32,
    /// `main_clk` divided by SYSAHBCLKDIV; clocks the core, memories and
    /// the counter/timers
    pub ahb_clk: u32,
}

impl Clocks {
    fn ensure_pllclkin(&self) -> Result<u32, ClockError> {
        self.sys_pllclkin
            .ok_or_else(|| ClockError::prog_err("sys_pllclkin should have been planned by now"))
    }

    fn ensure_pllclkout(&self) -> Result<u32, ClockError> {
        self.sys_pllclkout
            .ok_or_else(|| ClockError::bad_config("main clock uses sys_pllclkout, but the pll is disabled"))
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct StaticClock<const F: u32> {
    pub enabled: bool,
}

impl<const F: u32> StaticClock<F> {
    pub fn as_option(self) -> Option<u32> {
        self.into()
    }

    fn frequency(&self) -> u32 {
        F
    }
}

impl<const F: u32> From<StaticClock<F>> for Option<u32> {
    fn from(value: StaticClock<F>) -> Self {
        value.enabled.then_some(F)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The requested configuration was impossible or conflicting
    BadConfiguration { reason: &'static str },
    /// A programming error occurred. This should be impossible.
    Programming { reason: &'static str },
    /// Attempted to re-configure the clocks, calling `init` twice.
    AlreadyConfigured,
    /// A bounded wait ran out before the hardware reported ready
    Timeout { what: &'static str },
}

impl ClockError {
    pub(crate) fn bad_config(reason: &'static str) -> Self {
        Self::BadConfiguration { reason }
    }

    pub(crate) fn prog_err(reason: &'static str) -> Self {
        Self::Programming { reason }
    }
}

/// How long to poll a hardware ready flag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WaitPolicy {
    Forever,
    Spins(u32),
}

struct ClockOperator<'a> {
    config: &'a ClockConfig,
    syscon: &'a SysconRegisters,
    wait: WaitPolicy,
}

impl ClockOperator<'_> {
    /// Power the system oscillator and give it time to settle.
    fn setup_sys_osc(&self) {
        let osc = &self.config.sys_osc;
        let range = match osc.range {
            SysOscRange::Low1To20Mhz => SYSOSCCTRL::FREQRANGE::Low1To20Mhz,
            SysOscRange::High15To25Mhz => SYSOSCCTRL::FREQRANGE::High15To25Mhz,
        };
        self.syscon.pdruncfg.modify(PDRUNCFG::SYSOSC_PD::CLEAR);
        self.syscon
            .sysoscctrl
            .write(SYSOSCCTRL::BYPASS.val(osc.bypass as u32) + range);

        // Coarse wait, the oscillator has no ready flag
        spin(self.config.osc_settle_spins);
        trace!("clocks: sys_osc powered");
    }

    /// ```text
    ///           ┌─────┐      ┌──────────┐
    /// irc_osc ─▶│00   │      │          │
    /// sys_osc ─▶│01   │─────▶│ Sys PLL  │───▶ sys_pllclkout
    ///           └─────┘      │          │
    ///              ▲         └──────────┘
    ///              │              ▲
    ///     SYSPLLCLKSEL[1:0]  SYSPLLCTRL, PDRUNCFG[7]
    /// ```
    fn setup_sys_pll(&self) -> Result<(), ClockError> {
        self.syscon
            .syspllclksel
            .write(SYSPLLCLKSEL::SEL.val(self.config.pll_clock_select as u32));
        self.update_clock_source(&self.syscon.syspllclkuen, "syspllclkuen")?;

        let Some(pll) = self.config.sys_pll else {
            self.syscon.pdruncfg.modify(PDRUNCFG::SYSPLL_PD::SET);
            return Ok(());
        };

        self.syscon
            .syspllctrl
            .write(SYSPLLCTRL::MSEL.val(pll.msel as u32) + SYSPLLCTRL::PSEL.val(pll.psel as u32));
        self.syscon.pdruncfg.modify(PDRUNCFG::SYSPLL_PD::CLEAR);

        let stat = &self.syscon.syspllstat;
        self.wait_for("syspllstat lock", || stat.is_set(SYSPLLSTAT::LOCK))?;
        debug!("clocks: sys pll locked (msel = {}, psel = {})", pll.msel, pll.psel);
        Ok(())
    }

    fn setup_main_clock(&self) -> Result<(), ClockError> {
        self.syscon
            .mainclksel
            .write(MAINCLKSEL::SEL.val(self.config.main_clock_select as u32));
        self.update_clock_source(&self.syscon.mainclkuen, "mainclkuen")
    }

    fn setup_ahb(&self) {
        self.syscon.sysahbclkdiv.set(self.config.ahb_div as u32);
        self.syscon.sysahbclkctrl.set(self.config.ahb_clock_gates);
    }

    /// A new clock source selection only takes effect after the update
    /// register sees a 0 -> 1 transition.
    fn update_clock_source(
        &self,
        uen: &ReadWrite<u32, CLKUEN::Register>,
        what: &'static str,
    ) -> Result<(), ClockError> {
        uen.write(CLKUEN::ENA::SET);
        uen.write(CLKUEN::ENA::CLEAR);
        uen.write(CLKUEN::ENA::SET);
        self.wait_for(what, || uen.is_set(CLKUEN::ENA))
    }

    fn wait_for(&self, what: &'static str, mut ready: impl FnMut() -> bool) -> Result<(), ClockError> {
        match self.wait {
            WaitPolicy::Forever => {
                while !ready() {}
                Ok(())
            }
            WaitPolicy::Spins(max) => {
                for _ in 0..max {
                    if ready() {
                        return Ok(());
                    }
                }
                error!("clocks: timed out waiting for {}", what);
                Err(ClockError::Timeout { what })
            }
        }
    }
}

fn spin(count: u32) {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "none")] {
            cortex_m::asm::delay(count);
        } else {
            for _ in 0..count {
                core::hint::spin_loop();
            }
        }
    }
}

/// For cases where you want to view the clock state set up by [`init`], this
/// function runs the provided closure *inside of a critical section*, so move
/// with purpose! You can clone-out the Clocks struct if necessary, or perform
/// a more directed query and return that instead.
///
/// Returns `None` if the clocks have not yet been initialized.
pub fn with_clocks<F: FnOnce(&Clocks) -> R, R>(f: F) -> Option<R> {
    critical_section::with(|cs| {
        let c = CLOCKS.borrow_ref(cs);
        let c = c.as_ref()?;
        Some(f(c))
    })
}
