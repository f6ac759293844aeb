//! Clock-tree analysis for the external memory controllers
//!
//! Derives the real SEMC and FlexSPI2 clock from the CCM selector registers.
//! Everything here is a pure function of a [`ClockConfig`] snapshot.
//!
//! # Clock sources
//! - PLL2 PFD2: 396 MHz
//! - PLL2: 528 MHz
//! - PLL3 PFD0: 720 MHz
//! - PLL3 PFD1: 664.62 MHz
//! - peripheral clock: CPU clock times the AHB divider

pub mod ccm;

use ccm::{Cbcdr, CbcdrFlags, Cbcmr, SEMC_PODF};

use crate::drivers::Mmio;
use crate::mm::{ExtMemWindow, RegionDescriptor};

/// PLL2 PFD2 output in Hz
pub const PLL2_PFD2_HZ: f32 = 396e6;
/// PLL2 output in Hz
pub const PLL2_HZ: f32 = 528e6;
/// PLL3 PFD0 output in Hz
pub const PLL3_PFD0_HZ: f32 = 720e6;
/// PLL3 PFD1 output in Hz
pub const PLL3_PFD1_HZ: f32 = 664.62e6;

/// Frequency reported when no external memory was brought up.
pub const NO_EXTMEM_HZ: f32 = -1.0;
/// Frequency reported for a region outside the known windows.
pub const UNKNOWN_HZ: f32 = 0.0;

/// Supported SEMC operating points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemcClock {
    /// PLL3 PFD1 / 5 (~132.9 MHz)
    Mhz133,
    /// PLL3 PFD1 / 4 (~166.2 MHz)
    #[default]
    Mhz166,
    /// PLL3 PFD1 / 3 (~221.5 MHz)
    Mhz221,
    /// PLL2 PFD2 / 2 (198 MHz)
    Mhz198,
    /// Peripheral clock / 4
    CpuDiv4,
    /// Peripheral clock / 3
    CpuDiv3,
}

impl SemcClock {
    /// CBCDR bits selecting this operating point.
    pub const fn cbcdr_bits(self) -> u32 {
        let alt = CbcdrFlags::SEMC_CLK_SEL.bits() | CbcdrFlags::SEMC_ALT_CLK_SEL.bits();
        match self {
            Self::Mhz133 => alt | SEMC_PODF.encode(5),
            Self::Mhz166 => alt | SEMC_PODF.encode(4),
            Self::Mhz221 => alt | SEMC_PODF.encode(3),
            Self::Mhz198 => CbcdrFlags::SEMC_CLK_SEL.bits() | SEMC_PODF.encode(2),
            Self::CpuDiv4 => SEMC_PODF.encode(4),
            Self::CpuDiv3 => SEMC_PODF.encode(3),
        }
    }
}

/// Snapshot of the clock-tree selectors plus the running CPU clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    pub cbcdr: Cbcdr,
    pub cbcmr: Cbcmr,
    /// CPU clock in Hz, after the AHB divider
    pub cpu_hz: f32,
}

impl ClockConfig {
    /// Read the live selector registers.
    pub fn read<B: Mmio + ?Sized>(bus: &B, cpu_hz: f32) -> Self {
        Self {
            cbcdr: Cbcdr::from_bits(bus.read(ccm::reg(ccm::regs::CBCDR))),
            cbcmr: Cbcmr::from_bits(bus.read(ccm::reg(ccm::regs::CBCMR))),
            cpu_hz,
        }
    }

    /// SEMC clock in Hz.
    pub fn semc_hz(&self) -> f32 {
        semc_frequency(self.cbcdr, self.cpu_hz)
    }

    /// FlexSPI2 (PSRAM) clock in Hz.
    pub fn psram_hz(&self) -> f32 {
        psram_frequency(self.cbcmr)
    }
}

/// SEMC clock derived from CBCDR.
///
/// On the alternate path the source is a fixed PLL output; otherwise it is
/// the peripheral clock, recovered by multiplying the CPU clock back up by
/// the AHB divisor. The SEMC post divider applies on both paths.
pub fn semc_frequency(cbcdr: Cbcdr, cpu_hz: f32) -> f32 {
    let flags = cbcdr.flags();
    let source = if flags.contains(CbcdrFlags::SEMC_CLK_SEL) {
        if flags.contains(CbcdrFlags::SEMC_ALT_CLK_SEL) {
            PLL3_PFD1_HZ
        } else {
            PLL2_PFD2_HZ
        }
    } else {
        cpu_hz * cbcdr.ahb_divisor() as f32
    };
    source / cbcdr.semc_divisor() as f32
}

/// FlexSPI2 clock derived from CBCMR.
pub fn psram_frequency(cbcmr: Cbcmr) -> f32 {
    let source = match cbcmr.flexspi2_source() {
        3 => PLL2_HZ,
        2 => PLL3_PFD1_HZ,
        1 => PLL3_PFD0_HZ,
        _ => PLL2_PFD2_HZ,
    };
    source / cbcmr.flexspi2_divisor() as f32
}

/// Operating frequency of the published external memory region.
///
/// [`NO_EXTMEM_HZ`] when nothing was published, [`UNKNOWN_HZ`] when the
/// region's base is not a known window.
pub fn frequency(region: Option<&RegionDescriptor>, clocks: &ClockConfig) -> f32 {
    let Some(region) = region.filter(|r| r.size() != 0) else {
        return NO_EXTMEM_HZ;
    };
    match region.window() {
        Some(ExtMemWindow::Sdram) => clocks.semc_hz(),
        Some(ExtMemWindow::Psram) => clocks.psram_hz(),
        None => UNKNOWN_HZ,
    }
}
