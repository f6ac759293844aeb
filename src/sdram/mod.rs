//! External SDRAM bring-up
//!
//! Brings the SEMC controller and an IS42S16160J-6 SDRAM online, then
//! publishes the region and carves the allocation pool over it.
//!
//! # Sequence
//! 1. Short-circuit if a region is already published
//! 2. Pads, clock selection, clock gate
//! 3. Controller software reset (bounded wait)
//! 4. Controller, geometry and timing registers at the derived frequency
//! 5. Device init: precharge-all, 2x auto-refresh, mode register set
//! 6. Refresh enable, then a 32-step walking-pattern self-test
//! 7. Publish region, create pool
//!
//! Any failure aborts and leaves the context disabled; nothing is retried.
//! After a failure every allocation is served by the fallback heap.

pub mod timing;

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;

use log::{debug, info, warn};
use spin::Once;

use crate::clock::ccm::{self, Cbcdr, CCGR3_SEMC, CCGR_ON};
use crate::clock::{self, semc_frequency, ClockConfig, SemcClock};
use crate::drivers::semc::{
    bmcr0, bmcr1, br, mcr, reg, regs, sdramcr0, BrFlags, CommandFailed, IpCommands, McrFlags,
    Sdramcr0Flags, Sdramcr3Flags, SdramCommand,
};
use crate::drivers::{wait_with_timeout, Mmio, Platform};
use crate::mm::{ExtMemAllocator, ExtMemWindow, RegionDescriptor, MIB};
use timing::{RefreshSchedule, SdramTiming, IS42S16160J_6};

/// Size of the fitted SDRAM
pub const SDRAM_SIZE: usize = 32 * MIB;

/// Above this SEMC frequency CAS latency 3 is needed, else 2
pub const CAS2_MAX_HZ: f32 = 166.5e6;

/// Above this SEMC frequency read data is sampled on the DQS loopback
pub const DQS_MIN_HZ: f32 = 133e6;

/// Self-test starting pattern
pub const PROBE_PATTERN: u32 = 0x5A69_8421;

/// Self-test write/read rounds, one per bit position
pub const PROBE_ITERATIONS: usize = 32;

/// BR memory-size select for 32 MiB (4 KiB << 13)
const BR_MS_32MIB: u32 = 13;
/// Bus timeout, in 255-cycle units
const BUS_TIMEOUT: u32 = 0x1F;
/// 9-bit column address
const COLUMN_9BIT: u32 = 3;
/// 8-word bursts
const BURST_8: u32 = 3;

/// Why bring-up stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringupError {
    /// The controller never finished its software reset.
    ResetTimeout { waited_us: u32 },
    /// An IP command came back with the error bit set.
    Protocol { command: SdramCommand },
    /// Self-test read back something other than what was written.
    SelfTestMismatch { iteration: usize, wrote: u32, read: u32 },
    /// Refresh scheduling does not fit the controller's fields.
    ConfigurationOverflow { prescale: u32, refresh: u32 },
}

impl From<CommandFailed> for BringupError {
    fn from(err: CommandFailed) -> Self {
        Self::Protocol { command: err.command }
    }
}

impl fmt::Display for BringupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResetTimeout { waited_us } => {
                write!(f, "controller reset did not complete after {} us", waited_us)
            }
            Self::Protocol { command } => write!(f, "IP command {:?} reported an error", command),
            Self::SelfTestMismatch { iteration, wrote, read } => write!(
                f,
                "self-test mismatch in round {}: wrote {:#010x}, read {:#010x}",
                iteration, wrote, read
            ),
            Self::ConfigurationOverflow { prescale, refresh } => write!(
                f,
                "refresh schedule out of range (prescale {}, refresh {})",
                prescale, refresh
            ),
        }
    }
}

/// Externally visible bring-up state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtMemState {
    /// No external memory usable; allocations use the fallback.
    Disabled,
    /// Region published and pool created.
    Ready,
}

/// Bring-up parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdramConfig {
    /// SEMC operating point
    pub clock: SemcClock,
    /// Budget for the controller software reset
    pub reset_timeout_us: u32,
    /// Settle time between enabling the controller and the first command
    pub settle_delay_us: u32,
    /// Refresh prescaler period in controller cycles
    pub refresh_prescale_cycles: u32,
}

impl SdramConfig {
    pub const DEFAULT: Self = Self {
        clock: SemcClock::Mhz166,
        reset_timeout_us: 1500,
        settle_delay_us: 100,
        refresh_prescale_cycles: 160,
    };

    /// Default parameters at another operating point.
    pub const fn with_clock(clock: SemcClock) -> Self {
        Self { clock, ..Self::DEFAULT }
    }
}

impl Default for SdramConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// CAS latency for a controller clock of `freq_hz`.
#[inline]
pub fn cas_latency(freq_hz: f32) -> u32 {
    if freq_hz > CAS2_MAX_HZ {
        3
    } else {
        2
    }
}

/// Mode register word: CAS latency and an 8-word burst.
#[inline]
pub const fn mode_register(cas: u32) -> u32 {
    (cas << 4) | BURST_8
}

/// Process-wide external memory context.
///
/// Holds the published region (assigned at most once) and the allocator
/// facade fed from it. Meant to live in a `static`; it also implements
/// `GlobalAlloc` so the same static can be the global allocator.
pub struct ExtMem<F> {
    region: Once<RegionDescriptor>,
    allocator: ExtMemAllocator<F>,
}

impl<F: GlobalAlloc> ExtMem<F> {
    /// Create a disabled context allocating from `fallback`.
    pub const fn new(fallback: F) -> Self {
        Self {
            region: Once::new(),
            allocator: ExtMemAllocator::new(fallback),
        }
    }

    /// Bring up the SDRAM and publish it.
    ///
    /// Returns the already-published region without touching hardware if
    /// an earlier call (or [`ExtMem::adopt`]) got there first.
    pub fn bring_up<B: Mmio, P: Platform>(
        &self,
        bus: &mut B,
        platform: &mut P,
        config: &SdramConfig,
    ) -> Result<RegionDescriptor, BringupError> {
        if let Some(region) = self.region.get() {
            debug!("[SEMC] region already published at {:#010x}, skipping bring-up", region.base());
            return Ok(*region);
        }

        let region = Sequencer { bus: &mut *bus, platform, config }.run().map_err(|err| {
            warn!("[SEMC] bring-up aborted: {}", err);
            err
        })?;
        Ok(self.publish(bus, region))
    }

    /// Publish a region found by an earlier boot path (e.g. PSRAM detected
    /// by the startup code) and build the pool over it.
    ///
    /// An empty region is ignored. Returns the region in effect.
    pub fn adopt<B: Mmio>(
        &self,
        bus: &mut B,
        region: RegionDescriptor,
    ) -> Option<RegionDescriptor> {
        if region.size() == 0 {
            return self.region();
        }
        Some(self.publish(bus, region))
    }

    fn publish<B: Mmio>(&self, bus: &mut B, region: RegionDescriptor) -> RegionDescriptor {
        let mut fresh = false;
        let published = *self.region.call_once(|| {
            fresh = true;
            region
        });
        if fresh {
            let window = bus.window(published.base(), published.size());
            // SAFETY: Mmio implementors guarantee the window is valid memory
            // of the requested size; nothing else uses it once published
            unsafe { self.allocator.init_pool(window, published.size()) };
            info!("[EXTMEM] {} MiB at {} ready for allocation", published.size_mib(), published);
        }
        published
    }

    pub fn state(&self) -> ExtMemState {
        match self.region.get() {
            Some(_) => ExtMemState::Ready,
            None => ExtMemState::Disabled,
        }
    }

    /// The published region, if any.
    pub fn region(&self) -> Option<RegionDescriptor> {
        self.region.get().copied()
    }

    /// Bus address of the region, `None` until published.
    pub fn base(&self) -> Option<usize> {
        self.region.get().map(RegionDescriptor::base)
    }

    /// Size of the region in bytes, 0 until published.
    pub fn size(&self) -> usize {
        self.region.get().map_or(0, RegionDescriptor::size)
    }

    /// Region size in MiB as seen by code that only knows about PSRAM.
    pub fn legacy_psram_mib(&self) -> u8 {
        self.region.get().map_or(0, RegionDescriptor::size_mib)
    }

    /// Operating frequency of the region under `clocks`.
    ///
    /// -1 if nothing was published, 0 for an unrecognised window.
    pub fn frequency(&self, clocks: &ClockConfig) -> f32 {
        clock::frequency(self.region.get(), clocks)
    }

    /// The allocator facade.
    pub fn allocator(&self) -> &ExtMemAllocator<F> {
        &self.allocator
    }
}

// SAFETY: delegates to the facade, see ExtMemAllocator
unsafe impl<F: GlobalAlloc> GlobalAlloc for ExtMem<F> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarded GlobalAlloc contract
        unsafe { self.allocator.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarded GlobalAlloc contract
        unsafe { self.allocator.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: forwarded GlobalAlloc contract
        unsafe { self.allocator.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: forwarded GlobalAlloc contract
        unsafe { self.allocator.realloc(ptr, layout, new_size) }
    }
}

/// One bring-up attempt.
struct Sequencer<'a, B, P> {
    bus: &'a mut B,
    platform: &'a mut P,
    config: &'a SdramConfig,
}

impl<B: Mmio, P: Platform> Sequencer<'_, B, P> {
    const BASE: usize = ExtMemWindow::Sdram.base();

    fn run(&mut self) -> Result<RegionDescriptor, BringupError> {
        self.platform.configure_pads();

        let freq = self.select_clock();
        self.reset()?;
        let cas = self.configure_controller(freq);
        self.configure_device(freq, cas)?;
        self.init_device(cas)?;
        self.self_test()?;

        Ok(RegionDescriptor::in_window(ExtMemWindow::Sdram, SDRAM_SIZE))
    }

    /// Program the SEMC clock selector and ungate the controller clock.
    fn select_clock(&mut self) -> f32 {
        let cbcdr = ccm::reg(ccm::regs::CBCDR);
        let selected =
            Cbcdr::from_bits(self.bus.read(cbcdr)).with_semc(self.config.clock.cbcdr_bits());
        self.bus.write(cbcdr, selected.bits());

        let freq = semc_frequency(selected, self.platform.cpu_clock_hz());
        info!("[SEMC] clock {:?}: {} Hz", self.config.clock, freq as u32);

        self.platform.delay_us(1);
        self.bus
            .modify(ccm::reg(ccm::regs::CCGR3), |v| CCGR3_SEMC.replace(v, CCGR_ON));
        freq
    }

    /// Clear all chip selects and soft-reset the controller.
    fn reset(&mut self) -> Result<(), BringupError> {
        for n in 0..regs::BR_COUNT {
            self.bus.write(regs::br(n), 0);
        }
        self.bus.write(reg(regs::MCR), McrFlags::SWRST.bits());

        let bus = &*self.bus;
        wait_with_timeout(&*self.platform, self.config.reset_timeout_us, || {
            !McrFlags::from_bits_truncate(bus.read(reg(regs::MCR))).contains(McrFlags::SWRST)
        })
        .map_err(|t| BringupError::ResetTimeout { waited_us: t.waited_us })
    }

    /// Module control and bus arbitration; returns the CAS latency.
    fn configure_controller(&mut self, freq: f32) -> u32 {
        let mut flags = McrFlags::MDIS;
        if freq > DQS_MIN_HZ {
            flags |= McrFlags::DQSMD;
        }
        self.bus
            .write(reg(regs::MCR), flags.bits() | mcr::BTO.encode(BUS_TIMEOUT));

        // Arbitration weights, tuned once and independent of frequency
        self.bus.write(
            reg(regs::BMCR0),
            bmcr0::WQOS.encode(5)
                | bmcr0::WAGE.encode(8)
                | bmcr0::WSH.encode(0x40)
                | bmcr0::WRWS.encode(0x10),
        );
        self.bus.write(
            reg(regs::BMCR1),
            bmcr1::WQOS.encode(5)
                | bmcr1::WAGE.encode(8)
                | bmcr1::WPH.encode(0x60)
                | bmcr1::WRWS.encode(0x24)
                | bmcr1::WBR.encode(0x40),
        );

        self.bus
            .modify(reg(regs::MCR), |v| v & !McrFlags::MDIS.bits());

        let cas = cas_latency(freq);
        debug!("[SEMC] CAS latency {}", cas);
        cas
    }

    /// Chip select, geometry, timing and refresh registers.
    fn configure_device(&mut self, freq: f32, cas: u32) -> Result<(), BringupError> {
        self.bus.write(
            regs::br(0),
            br::BA.encode((Self::BASE >> 12) as u32)
                | br::MS.encode(BR_MS_32MIB)
                | BrFlags::VLD.bits(),
        );
        self.bus.write(
            reg(regs::SDRAMCR0),
            sdramcr0::CL.encode(cas)
                | sdramcr0::COL.encode(COLUMN_9BIT)
                | sdramcr0::BL.encode(BURST_8)
                | Sdramcr0Flags::PS.bits(),
        );

        let timing = SdramTiming::at(&IS42S16160J_6, freq);
        debug!("[SEMC] timing {:?}", timing);
        self.bus.write(reg(regs::SDRAMCR1), timing.sdramcr1());
        self.bus.write(reg(regs::SDRAMCR2), timing.sdramcr2());

        let refresh = RefreshSchedule::compute(freq, self.config.refresh_prescale_cycles)?;
        debug!("[SEMC] refresh {:?}", refresh);
        self.bus.write(reg(regs::SDRAMCR3), refresh.sdramcr3());

        // IP commands move one 4-byte word, no byte masking
        self.bus.write(reg(regs::IPCR1), 0);
        self.bus.write(reg(regs::IPCR2), 0);
        Ok(())
    }

    /// JEDEC power-up commands, then turn on periodic refresh.
    fn init_device(&mut self, cas: u32) -> Result<(), BringupError> {
        self.platform.delay_us(self.config.settle_delay_us);

        let mut ip = IpCommands::new(self.bus, Self::BASE as u32);
        ip.issue(SdramCommand::PrechargeAll)?;
        ip.issue(SdramCommand::AutoRefresh)?;
        ip.issue(SdramCommand::AutoRefresh)?;
        ip.write(SdramCommand::ModeSet, mode_register(cas))?;

        self.bus
            .modify(reg(regs::SDRAMCR3), |v| v | Sdramcr3Flags::REN.bits());
        Ok(())
    }

    /// Walk the probe pattern through every bit position.
    fn self_test(&mut self) -> Result<(), BringupError> {
        let mut ip = IpCommands::new(self.bus, Self::BASE as u32);
        let mut pattern = PROBE_PATTERN;
        for iteration in 0..PROBE_ITERATIONS {
            ip.write(SdramCommand::Write, pattern)?;
            let read = ip.read(SdramCommand::Read)?;
            if read != pattern {
                return Err(BringupError::SelfTestMismatch { iteration, wrote: pattern, read });
            }
            pattern = pattern.rotate_right(1);
        }
        Ok(())
    }
}
