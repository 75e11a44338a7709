//! Register blocks of the LPC111x that this HAL touches.
//!
//! Only the SYSCON clock registers and the four counter/timer blocks are
//! described. Layouts follow UM10398 (LPC111x/LPC11Cxx user manual).
#![allow(non_camel_case_types)]

use paste::paste;
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

register_bitfields![u32,
    // Power-down configuration; a set bit powers the block down.
    pub PDRUNCFG [
        IRCOUT_PD OFFSET(0) NUMBITS(1) [],
        IRC_PD OFFSET(1) NUMBITS(1) [],
        FLASH_PD OFFSET(2) NUMBITS(1) [],
        BOD_PD OFFSET(3) NUMBITS(1) [],
        ADC_PD OFFSET(4) NUMBITS(1) [],
        SYSOSC_PD OFFSET(5) NUMBITS(1) [],
        WDTOSC_PD OFFSET(6) NUMBITS(1) [],
        SYSPLL_PD OFFSET(7) NUMBITS(1) []
    ],
    pub SYSOSCCTRL [
        BYPASS OFFSET(0) NUMBITS(1) [],
        FREQRANGE OFFSET(1) NUMBITS(1) [
            Low1To20Mhz = 0,
            High15To25Mhz = 1
        ]
    ],
    pub SYSPLLCTRL [
        // Feedback divider, M = MSEL + 1
        MSEL OFFSET(0) NUMBITS(5) [],
        // Post divider, P = 2^PSEL
        PSEL OFFSET(5) NUMBITS(2) []
    ],
    pub SYSPLLSTAT [
        LOCK OFFSET(0) NUMBITS(1) []
    ],
    pub SYSPLLCLKSEL [
        SEL OFFSET(0) NUMBITS(2) [
            IrcOsc = 0,
            SysOsc = 1
        ]
    ],
    pub MAINCLKSEL [
        SEL OFFSET(0) NUMBITS(2) [
            IrcOsc = 0,
            PllInput = 1,
            WdtOsc = 2,
            PllOutput = 3
        ]
    ],
    // Shared layout of SYSPLLCLKUEN and MAINCLKUEN
    pub CLKUEN [
        ENA OFFSET(0) NUMBITS(1) []
    ],
    // Counter/timer interrupt register; write 1 to clear a flag.
    pub IR [
        MR0INT OFFSET(0) NUMBITS(1) [],
        MR1INT OFFSET(1) NUMBITS(1) [],
        MR2INT OFFSET(2) NUMBITS(1) [],
        MR3INT OFFSET(3) NUMBITS(1) [],
        CR0INT OFFSET(4) NUMBITS(1) []
    ],
    pub TCR [
        CEN OFFSET(0) NUMBITS(1) [],
        CRST OFFSET(1) NUMBITS(1) []
    ],
    pub MCR [
        MR0I OFFSET(0) NUMBITS(1) [],
        MR0R OFFSET(1) NUMBITS(1) [],
        MR0S OFFSET(2) NUMBITS(1) [],
        MR1I OFFSET(3) NUMBITS(1) [],
        MR1R OFFSET(4) NUMBITS(1) [],
        MR1S OFFSET(5) NUMBITS(1) []
    ]
];

register_structs! {
    /// System configuration block (clock generation and power control)
    pub SysconRegisters {
        (0x000 => pub sysmemremap: ReadWrite<u32>),
        (0x004 => pub presetctrl: ReadWrite<u32>),
        (0x008 => pub syspllctrl: ReadWrite<u32, SYSPLLCTRL::Register>),
        (0x00C => pub syspllstat: ReadOnly<u32, SYSPLLSTAT::Register>),
        (0x010 => _reserved0),
        (0x020 => pub sysoscctrl: ReadWrite<u32, SYSOSCCTRL::Register>),
        (0x024 => _reserved1),
        (0x040 => pub syspllclksel: ReadWrite<u32, SYSPLLCLKSEL::Register>),
        (0x044 => pub syspllclkuen: ReadWrite<u32, CLKUEN::Register>),
        (0x048 => _reserved2),
        (0x070 => pub mainclksel: ReadWrite<u32, MAINCLKSEL::Register>),
        (0x074 => pub mainclkuen: ReadWrite<u32, CLKUEN::Register>),
        (0x078 => pub sysahbclkdiv: ReadWrite<u32>),
        (0x07C => _reserved3),
        (0x080 => pub sysahbclkctrl: ReadWrite<u32>),
        (0x084 => _reserved4),
        (0x238 => pub pdruncfg: ReadWrite<u32, PDRUNCFG::Register>),
        (0x23C => @END),
    },

    /// 16- and 32-bit counter/timer block, `CT16Bn` / `CT32Bn`
    pub CtimerRegisters {
        (0x00 => pub ir: ReadWrite<u32, IR::Register>),
        (0x04 => pub tcr: ReadWrite<u32, TCR::Register>),
        (0x08 => pub tc: ReadWrite<u32>),
        (0x0C => pub pr: ReadWrite<u32>),
        (0x10 => pub pc: ReadWrite<u32>),
        (0x14 => pub mcr: ReadWrite<u32, MCR::Register>),
        (0x18 => pub mr: [ReadWrite<u32>; 4]),
        (0x28 => @END),
    }
}

macro_rules! peripherals {
    ($($name:ident: $regs:ty = $addr:expr,)*) => {
        paste! {
            $(
                #[doc = concat!("Base address of the `", stringify!($name), "` register block.")]
                pub const [<$name _BASE>]: usize = $addr;

                #[doc = concat!("The `", stringify!($name), "` register block.")]
                #[inline(always)]
                pub fn [<$name:lower>]() -> &'static $regs {
                    // SAFETY: fixed address from the LPC111x memory map, valid for the
                    // whole program and only ever accessed through volatile cells.
                    unsafe { &*([<$name _BASE>] as *const $regs) }
                }
            )*
        }
    };
}

peripherals! {
    SYSCON: SysconRegisters = 0x4004_8000,
    CT16B0: CtimerRegisters = 0x4000_C000,
    CT16B1: CtimerRegisters = 0x4001_0000,
    CT32B0: CtimerRegisters = 0x4001_4000,
    CT32B1: CtimerRegisters = 0x4001_8000,
}

/// NVIC interrupt lines of the LPC111x.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Interrupt {
    WAKEUP0 = 0,
    WAKEUP1 = 1,
    WAKEUP2 = 2,
    WAKEUP3 = 3,
    WAKEUP4 = 4,
    WAKEUP5 = 5,
    WAKEUP6 = 6,
    WAKEUP7 = 7,
    WAKEUP8 = 8,
    WAKEUP9 = 9,
    WAKEUP10 = 10,
    WAKEUP11 = 11,
    WAKEUP12 = 12,
    CAN = 13,
    SSP1 = 14,
    I2C = 15,
    CT16B0 = 16,
    CT16B1 = 17,
    CT32B0 = 18,
    CT32B1 = 19,
    SSP0 = 20,
    UART = 21,
    ADC = 24,
    WDT = 25,
    BOD = 26,
    PIO_3 = 28,
    PIO_2 = 29,
    PIO_1 = 30,
    PIO_0 = 31,
}

// SAFETY: every discriminant is a valid LPC111x NVIC line (< 32).
unsafe impl cortex_m::interrupt::InterruptNumber for Interrupt {
    #[inline(always)]
    fn number(self) -> u16 {
        self as u16
    }
}

/// Lower-case alias required by `cortex_m_rt::interrupt`.
pub use self::Interrupt as interrupt;

#[cfg(all(feature = "rt", target_os = "none"))]
mod vectors {
    extern "C" {
        fn WAKEUP0();
        fn WAKEUP1();
        fn WAKEUP2();
        fn WAKEUP3();
        fn WAKEUP4();
        fn WAKEUP5();
        fn WAKEUP6();
        fn WAKEUP7();
        fn WAKEUP8();
        fn WAKEUP9();
        fn WAKEUP10();
        fn WAKEUP11();
        fn WAKEUP12();
        fn CAN();
        fn SSP1();
        fn I2C();
        fn CT16B0();
        fn CT16B1();
        fn CT32B0();
        fn CT32B1();
        fn SSP0();
        fn UART();
        fn ADC();
        fn WDT();
        fn BOD();
        fn PIO_3();
        fn PIO_2();
        fn PIO_1();
        fn PIO_0();
    }

    #[doc(hidden)]
    pub union Vector {
        handler: unsafe extern "C" fn(),
        reserved: u32,
    }

    #[doc(hidden)]
    #[link_section = ".vector_table.interrupts"]
    #[no_mangle]
    pub static __INTERRUPTS: [Vector; 32] = [
        Vector { handler: WAKEUP0 },
        Vector { handler: WAKEUP1 },
        Vector { handler: WAKEUP2 },
        Vector { handler: WAKEUP3 },
        Vector { handler: WAKEUP4 },
        Vector { handler: WAKEUP5 },
        Vector { handler: WAKEUP6 },
        Vector { handler: WAKEUP7 },
        Vector { handler: WAKEUP8 },
        Vector { handler: WAKEUP9 },
        Vector { handler: WAKEUP10 },
        Vector { handler: WAKEUP11 },
        Vector { handler: WAKEUP12 },
        Vector { handler: CAN },
        Vector { handler: SSP1 },
        Vector { handler: I2C },
        Vector { handler: CT16B0 },
        Vector { handler: CT16B1 },
        Vector { handler: CT32B0 },
        Vector { handler: CT32B1 },
        Vector { handler: SSP0 },
        Vector { handler: UART },
        Vector { reserved: 0 },
        Vector { reserved: 0 },
        Vector { handler: ADC },
        Vector { handler: WDT },
        Vector { handler: BOD },
        Vector { reserved: 0 },
        Vector { handler: PIO_3 },
        Vector { handler: PIO_2 },
        Vector { handler: PIO_1 },
        Vector { handler: PIO_0 },
    ];
}

/// RAM-backed register blocks for host tests.
#[cfg(test)]
pub(crate) mod testing {
    use core::cell::UnsafeCell;
    use core::mem::size_of;

    /// A zeroed, word-aligned chunk of memory shaped like the register block `R`.
    pub(crate) struct RamBlock<R> {
        words: UnsafeCell<[u32; 0x240 / 4]>,
        _regs: core::marker::PhantomData<R>,
    }

    impl<R> RamBlock<R> {
        pub(crate) fn new() -> Self {
            assert!(size_of::<R>() <= 0x240);
            Self {
                words: UnsafeCell::new([0; 0x240 / 4]),
                _regs: core::marker::PhantomData,
            }
        }

        pub(crate) fn regs(&self) -> &R {
            // SAFETY: the buffer is large enough and aligned for any block in this module,
            // and every register cell is a `u32` accessed volatilely.
            unsafe { &*(self.words.get() as *const R) }
        }

        /// Write a word behind the register block's back, e.g. a read-only status flag.
        pub(crate) fn poke(&self, offset: usize, value: u32) {
            // SAFETY: in bounds, see `new`
            unsafe { (self.words.get() as *mut u32).add(offset / 4).write_volatile(value) }
        }

        pub(crate) fn peek(&self, offset: usize) -> u32 {
            // SAFETY: in bounds, see `new`
            unsafe { (self.words.get() as *const u32).add(offset / 4).read_volatile() }
        }
    }
}
