//! Counter/timers (CT16B0, CT16B1, CT32B0, CT32B1)
//!
//! All four are run from the AHB clock through a prescaler so that they tick
//! at [`TICK_HZ`]. CT16B0 additionally resets on match channel 0 and raises
//! its interrupt, which drives the [timebase](crate::time).
use cortex_m::peripheral::NVIC;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use crate::clocks::{ClockError, Clocks};
use crate::pac::{self, CtimerRegisters, Interrupt, IR, MCR, TCR};

/// Tick rate every counter/timer is configured for: one tick per microsecond
pub const TICK_HZ: u32 = 1_000_000;

/// Match value of the timebase timer, in ticks
pub const TIMEBASE_MATCH: u32 = 1000;

/// One of the four counter/timer blocks
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtimerInstance {
    Ct16b0,
    Ct16b1,
    Ct32b0,
    Ct32b1,
}

impl CtimerInstance {
    pub const ALL: [CtimerInstance; 4] = [Self::Ct16b0, Self::Ct16b1, Self::Ct32b0, Self::Ct32b1];

    pub fn regs(self) -> &'static CtimerRegisters {
        match self {
            Self::Ct16b0 => pac::ct16b0(),
            Self::Ct16b1 => pac::ct16b1(),
            Self::Ct32b0 => pac::ct32b0(),
            Self::Ct32b1 => pac::ct32b1(),
        }
    }

    pub fn interrupt(self) -> Interrupt {
        match self {
            Self::Ct16b0 => Interrupt::CT16B0,
            Self::Ct16b1 => Interrupt::CT16B1,
            Self::Ct32b0 => Interrupt::CT32B0,
            Self::Ct32b1 => Interrupt::CT32B1,
        }
    }

    /// Bit of SYSAHBCLKCTRL gating this block's bus clock
    pub fn ahb_clock_bit(self) -> u32 {
        match self {
            Self::Ct16b0 => 7,
            Self::Ct16b1 => 8,
            Self::Ct32b0 => 9,
            Self::Ct32b1 => 10,
        }
    }
}

/// Prescale register value so that an `input_hz` clock ticks the counter at
/// `tick_hz`. The counter advances every PR + 1 input cycles.
pub fn prescale_for(input_hz: u32, tick_hz: u32) -> Result<u32, ClockError> {
    if tick_hz == 0 || input_hz < tick_hz {
        return Err(ClockError::bad_config("timer tick rate above its input clock"));
    }
    if input_hz % tick_hz != 0 {
        return Err(ClockError::bad_config("timer input clock is not a multiple of the tick rate"));
    }
    Ok(input_hz / tick_hz - 1)
}

/// Stop and reset the counter, then load the prescaler.
pub fn configure_prescale(regs: &CtimerRegisters, prescale: u32) {
    regs.tcr.write(TCR::CEN::CLEAR + TCR::CRST::SET);
    regs.pr.set(prescale);
    regs.pc.set(0);
    regs.tcr.write(TCR::CEN::CLEAR + TCR::CRST::CLEAR);
}

/// Reset the counter and raise the MR0 interrupt flag whenever it matches
/// `match_value`.
pub fn configure_periodic_match(regs: &CtimerRegisters, match_value: u32) {
    regs.mr[0].set(match_value);
    regs.mcr.write(MCR::MR0I::SET + MCR::MR0R::SET);
    // Drop anything left pending from before
    regs.ir.write(IR::MR0INT::SET);
}

pub fn start(regs: &CtimerRegisters) {
    regs.tcr.modify(TCR::CEN::SET);
}

pub fn stop(regs: &CtimerRegisters) {
    regs.tcr.modify(TCR::CEN::CLEAR);
}

pub fn counter(regs: &CtimerRegisters) -> u32 {
    regs.tc.get()
}

pub fn match0_pending(regs: &CtimerRegisters) -> bool {
    regs.ir.is_set(IR::MR0INT)
}

pub fn clear_match0(regs: &CtimerRegisters) {
    // Write-one-to-clear; writing the other bits as 0 leaves them alone
    regs.ir.write(IR::MR0INT::SET);
}

/// Program all four counter/timers to [`TICK_HZ`], arm CT16B0 as the
/// timebase and unmask its interrupt line, then start every counter.
///
/// The overflow handler advances [`crate::time::TIMEBASE`], so the timebase
/// must already be configured for the resulting overflow period.
pub fn init_all(clocks: &Clocks) -> Result<(), ClockError> {
    let syscon = pac::syscon();
    let gates = CtimerInstance::ALL
        .iter()
        .fold(0u32, |acc, t| acc | (1 << t.ahb_clock_bit()));
    syscon.sysahbclkctrl.set(syscon.sysahbclkctrl.get() | gates);

    NVIC::mask(Interrupt::CT16B0);
    NVIC::unpend(Interrupt::CT16B0);

    let regs = CtimerInstance::ALL.map(CtimerInstance::regs);
    program_timers(&regs, clocks.ahb_clk)?;

    // SAFETY: the handler only touches the timebase, which the caller has
    // configured, and no mask based critical section is active here.
    unsafe { NVIC::unmask(Interrupt::CT16B0) };

    start_timers(&regs);
    Ok(())
}

/// Prescaler and match programming behind [`init_all`]; `timers` is ordered
/// like [`CtimerInstance::ALL`], so the first entry is the timebase. Nothing
/// is written if the prescaler cannot be derived.
pub(crate) fn program_timers(timers: &[&CtimerRegisters; 4], ahb_clk: u32) -> Result<(), ClockError> {
    let prescale = prescale_for(ahb_clk, TICK_HZ)?;

    for regs in timers {
        configure_prescale(regs, prescale);
    }
    configure_periodic_match(timers[0], TIMEBASE_MATCH);
    debug!("ctimer: timers programmed, prescale = {}", prescale);
    Ok(())
}

pub(crate) fn start_timers(timers: &[&CtimerRegisters; 4]) {
    for regs in timers {
        start(regs);
    }
    trace!("ctimer: all timers running");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pac::testing::RamBlock;

    const IR_OFFSET: usize = 0x00;
    const TCR_OFFSET: usize = 0x04;
    const PR_OFFSET: usize = 0x0C;
    const MCR_OFFSET: usize = 0x14;
    const MR0_OFFSET: usize = 0x18;

    #[test]
    fn prescale_divides_48mhz_to_1mhz() {
        assert_eq!(prescale_for(48_000_000, TICK_HZ), Ok(47));
        assert_eq!(prescale_for(12_000_000, TICK_HZ), Ok(11));
        assert_eq!(prescale_for(1_000_000, TICK_HZ), Ok(0));
    }

    #[test]
    fn prescale_rejects_uneven_or_slow_clocks() {
        assert!(prescale_for(12_500_000, TICK_HZ).is_err());
        assert!(prescale_for(500_000, TICK_HZ).is_err());
        assert!(prescale_for(48_000_000, 0).is_err());
    }

    #[test]
    fn timers_are_programmed_and_started() {
        let blocks: [RamBlock<CtimerRegisters>; 4] = core::array::from_fn(|_| RamBlock::new());

        let regs = [blocks[0].regs(), blocks[1].regs(), blocks[2].regs(), blocks[3].regs()];
        program_timers(&regs, 48_000_000).unwrap();
        for block in &blocks {
            assert_eq!(block.peek(TCR_OFFSET), 0, "counter started before the interrupt is armed");
        }
        start_timers(&regs);

        for block in &blocks {
            assert_eq!(block.peek(PR_OFFSET), 47);
            assert_eq!(block.peek(TCR_OFFSET), 1, "counter not enabled");
        }

        // Only the timebase resets and interrupts on match
        assert_eq!(blocks[0].peek(MCR_OFFSET), 0b11);
        assert_eq!(blocks[0].peek(MR0_OFFSET), 1000);
        for block in &blocks[1..] {
            assert_eq!(block.peek(MCR_OFFSET), 0);
            assert_eq!(block.peek(MR0_OFFSET), 0);
        }

        // Stopping one counter leaves the others and its own setup alone
        stop(regs[1]);
        assert_eq!(blocks[1].peek(TCR_OFFSET), 0);
        assert_eq!(blocks[1].peek(PR_OFFSET), 47);
        for i in [0, 2, 3] {
            assert_eq!(blocks[i].peek(TCR_OFFSET), 1);
        }
        start(regs[1]);
        assert_eq!(blocks[1].peek(TCR_OFFSET), 1);
    }

    #[test]
    fn bad_core_clock_leaves_timers_untouched() {
        let blocks: [RamBlock<CtimerRegisters>; 4] = core::array::from_fn(|_| RamBlock::new());
        let regs = [blocks[0].regs(), blocks[1].regs(), blocks[2].regs(), blocks[3].regs()];

        assert!(program_timers(&regs, 12_500_000).is_err());
        for block in &blocks {
            assert_eq!(block.peek(PR_OFFSET), 0);
            assert_eq!(block.peek(MCR_OFFSET), 0);
        }
    }

    #[test]
    fn match0_pending_reads_ir() {
        let block = RamBlock::<CtimerRegisters>::new();
        assert!(!match0_pending(block.regs()));

        // A capture flag alone is not a match
        block.poke(IR_OFFSET, 1 << 4);
        assert!(!match0_pending(block.regs()));

        block.poke(IR_OFFSET, 1);
        assert!(match0_pending(block.regs()));
    }

    #[test]
    fn instances_map_to_their_irq_lines() {
        let lines: Vec<u16> = CtimerInstance::ALL
            .iter()
            .map(|t| t.interrupt() as u16)
            .collect();
        assert_eq!(lines, [16, 17, 18, 19]);
    }
}
