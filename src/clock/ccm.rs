//! CCM (Clock Controller Module) registers used by the memory controllers
//!
//! Only the clock-tree selectors feeding SEMC and FlexSPI2 are modelled.

use bitflags::bitflags;

use crate::drivers::register::{Divider, Field};

/// CCM register block base address
pub const CCM_BASE: usize = 0x400F_C000;

/// Register offsets from [`CCM_BASE`]
pub mod regs {
    /// Bus clock divider register
    pub const CBCDR: usize = 0x14;
    /// Bus clock multiplexer register
    pub const CBCMR: usize = 0x18;
    /// Clock gating register 3
    pub const CCGR3: usize = 0x74;
}

/// Absolute address of a CCM register.
#[inline]
pub const fn reg(offset: usize) -> usize {
    CCM_BASE + offset
}

bitflags! {
    /// CBCDR single-bit selectors
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CbcdrFlags: u32 {
        /// SEMC runs from the alternate (PLL) source, not the peripheral clock
        const SEMC_CLK_SEL = 1 << 6;
        /// Alternate source is PLL3 PFD1 instead of PLL2 PFD2
        const SEMC_ALT_CLK_SEL = 1 << 7;
    }
}

/// AHB divider: CPU clock = peripheral clock / (n + 1)
pub const AHB_PODF: Divider = Divider::new(10, 3);
/// SEMC post divider
pub const SEMC_PODF: Divider = Divider::new(16, 3);

/// FlexSPI2 source select (2 bits)
pub const FLEXSPI2_CLK_SEL: Field = Field::new(8, 2);
/// FlexSPI2 post divider
pub const FLEXSPI2_PODF: Divider = Divider::new(29, 3);

/// CCGR3 gate for SEMC
pub const CCGR3_SEMC: Field = Field::new(4, 2);
/// Gate setting: clock on in all modes
pub const CCGR_ON: u32 = 3;

/// Snapshot of CBCDR.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Cbcdr(u32);

impl Cbcdr {
    /// Bits owned by the SEMC clock selection.
    pub const SEMC_MASK: u32 =
        CbcdrFlags::SEMC_CLK_SEL.bits()
            | CbcdrFlags::SEMC_ALT_CLK_SEL.bits()
            | SEMC_PODF.field().mask();

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn flags(self) -> CbcdrFlags {
        CbcdrFlags::from_bits_truncate(self.0)
    }

    /// Divisor between the peripheral clock and the CPU clock.
    #[inline]
    pub const fn ahb_divisor(self) -> u32 {
        AHB_PODF.decode(self.0)
    }

    /// Divisor applied to the SEMC source clock.
    #[inline]
    pub const fn semc_divisor(self) -> u32 {
        SEMC_PODF.decode(self.0)
    }

    /// Replace every SEMC clock field with the ones in `selection`.
    #[inline]
    pub const fn with_semc(self, selection: u32) -> Self {
        Self((self.0 & !Self::SEMC_MASK) | (selection & Self::SEMC_MASK))
    }
}

impl core::fmt::Debug for Cbcdr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cbcdr")
            .field("flags", &self.flags())
            .field("ahb_div", &self.ahb_divisor())
            .field("semc_div", &self.semc_divisor())
            .finish()
    }
}

/// Snapshot of CBCMR.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Cbcmr(u32);

impl Cbcmr {
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// FlexSPI2 source select, 0..=3.
    #[inline]
    pub const fn flexspi2_source(self) -> u32 {
        FLEXSPI2_CLK_SEL.decode(self.0)
    }

    /// Divisor applied to the FlexSPI2 source clock, 1..=8.
    #[inline]
    pub const fn flexspi2_divisor(self) -> u32 {
        FLEXSPI2_PODF.decode(self.0)
    }
}

impl core::fmt::Debug for Cbcmr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cbcmr")
            .field("flexspi2_sel", &self.flexspi2_source())
            .field("flexspi2_div", &self.flexspi2_divisor())
            .finish()
    }
}
