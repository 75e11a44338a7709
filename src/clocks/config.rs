/// Frequency of the internal RC oscillator
pub const IRC_FREQ: u32 = 12_000_000;

/// Clock tree settings consumed by [`init`](super::init).
///
/// [`ClockConfig::default()`] brings the core up at 48 MHz from a 12 MHz
/// crystal through the system PLL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockConfig {
    pub sys_osc: SysOsc,
    /// Number of busy-loop iterations to wait after powering the system
    /// oscillator. Not calibrated to real time.
    pub osc_settle_spins: u32,
    pub pll_clock_select: PllClockSelect,
    /// If None, the PLL stays powered down and `main_clock_select` must not
    /// refer to its output.
    pub sys_pll: Option<SysPll>,
    pub main_clock_select: MainClockSelect,
    /// AHB clock = main clock / `ahb_div`. Allowed range: `1..=255`.
    pub ahb_div: u8,
    /// Value written to SYSAHBCLKCTRL. A set bit enables the bus clock of the
    /// matching peripheral.
    pub ahb_clock_gates: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sys_osc: SysOsc {
                freq: 12_000_000,
                bypass: false,
                range: SysOscRange::Low1To20Mhz,
            },
            osc_settle_spins: 200,
            pll_clock_select: PllClockSelect::SysOsc,
            // M = 4, P = 2: 12 MHz * 4 = 48 MHz, FCCO = 192 MHz
            sys_pll: Some(SysPll { msel: 3, psel: 1 }),
            main_clock_select: MainClockSelect::PllOutput,
            ahb_div: 1,
            ahb_clock_gates: AHB_CLOCK_GATES_ALL,
        }
    }
}

/// Every AHB clock gate the LPC1114 implements (SYSAHBCLKCTRL bits 0..=17)
pub const AHB_CLOCK_GATES_ALL: u32 = 0x3_FFFF;

/// ```text
///               ┌────────────┐          sys_osc_clk
///  XTALIN ─────▶│  System    │──────────────────────▶
/// XTALOUT ─────▶│ oscillator │
///               └────────────┘
///                  ▲      ▲
///                  │      │
///          PDRUNCFG[5]  SYSOSCCTRL[1:0]
///                       (bypass, range)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SysOsc {
    /// Frequency of the crystal or external clock
    pub freq: u32,
    /// Feed XTALIN straight through instead of driving a crystal
    pub bypass: bool,
    pub range: SysOscRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SysOscRange {
    Low1To20Mhz,
    High15To25Mhz,
}

/// ```text
///           ┌─────┐
/// irc_osc ─▶│00   │
/// sys_osc ─▶│01   │───▶ sys_pllclkin
///           └─────┘
///              ▲
///              │
///     SYSPLLCLKSEL[1:0]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PllClockSelect {
    Irc = 0b00,
    SysOsc = 0b01,
}

/// ```text
///                ┌──────────────────────────────┐
///                │          System PLL          │
/// sys_pllclkin ─▶│ FCLKOUT = M * FCLKIN         │───▶ sys_pllclkout
///                │ FCCO    = 2 * P * FCLKOUT    │
///                └──────────────────────────────┘
///                              ▲
///                              │
///                    SYSPLLCTRL[4:0] MSEL
///                    SYSPLLCTRL[6:5] PSEL
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SysPll {
    /// Feedback divider selector, M = `msel + 1`.
    ///
    /// Allowed range: `0..=31`.
    pub msel: u8,
    /// Post divider selector, P = `2^psel`.
    ///
    /// Allowed range: `0..=3`.
    pub psel: u8,
}

impl SysPll {
    /// Output frequency for the given input
    pub fn output_freq(&self, input: u32) -> u32 {
        input * (self.msel as u32 + 1)
    }

    /// Frequency of the current controlled oscillator for the given input
    pub fn cco_freq(&self, input: u32) -> u32 {
        2 * (1 << self.psel) * self.output_freq(input)
    }
}

/// ```text
///                 ┌─────┐
///       irc_osc ─▶│00   │
///  sys_pllclkin ─▶│01   │
///       wdt_osc ─▶│10   │───▶ main_clk
/// sys_pllclkout ─▶│11   │
///                 └─────┘
///                    ▲
///                    │
///           MAINCLKSEL[1:0]
/// ```
///
/// The watchdog oscillator is not offered as a main clock source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainClockSelect {
    Irc = 0b00,
    PllInput = 0b01,
    PllOutput = 0b11,
}
