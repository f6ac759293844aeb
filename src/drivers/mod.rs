//! Hardware seams for external memory bring-up
//!
//! Everything that touches the chip goes through two traits:
//! - [`Mmio`]: 32-bit register reads/writes at absolute bus addresses, plus
//!   the CPU pointer for an external memory window
//! - [`Platform`]: the board collaborators (pad/mux configurator, monotonic
//!   microsecond counter, busy-delay, CPU clock)
//!
//! Two wait disciplines: [`wait_with_timeout`] for bounded polls and
//! [`spin_until`] for polls the hardware always finishes.

pub mod register;
pub mod semc;

use core::ptr;

/// Register bus used by the bring-up code.
///
/// # Safety
/// Implementors must route `read`/`write` to the register at `addr` (or a
/// faithful model of it) and `window` must return a pointer valid for reads
/// and writes of `size` bytes for as long as the implementor is alive.
pub unsafe trait Mmio {
    /// Read the 32-bit register at `addr`.
    fn read(&self, addr: usize) -> u32;

    /// Write the 32-bit register at `addr`.
    fn write(&mut self, addr: usize, value: u32);

    /// Read-modify-write the register at `addr`.
    fn modify(&mut self, addr: usize, f: impl FnOnce(u32) -> u32) {
        let value = f(self.read(addr));
        self.write(addr, value);
    }

    /// CPU pointer for the external memory window at bus address `base`.
    fn window(&mut self, base: usize, size: usize) -> *mut u8 {
        let _ = size;
        base as *mut u8
    }
}

/// Board collaborators consumed during bring-up.
pub trait Platform {
    /// Program pad electrical settings and pin muxes for the memory bus.
    fn configure_pads(&mut self);

    /// Free-running monotonic microsecond counter (wraps).
    fn micros(&self) -> u32;

    /// Busy-wait for `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Actual CPU clock in Hz (after the AHB divider).
    fn cpu_clock_hz(&self) -> f32;
}

/// Direct volatile access to the i.MX RT register file.
///
/// Addresses are physical; the Cortex-M7 runs without an MMU so they are
/// also the CPU addresses.
pub struct Imxrt {
    _private: (),
}

impl Imxrt {
    /// Take the register file.
    ///
    /// # Safety
    /// Only one instance may exist, and it must run on an i.MX RT part
    /// whose CCM and SEMC sit at the addresses in this crate.
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

// SAFETY: every address used by this crate is a documented i.MX RT1060
// peripheral register or external memory window.
// Audited: 2026-10-16
unsafe impl Mmio for Imxrt {
    fn read(&self, addr: usize) -> u32 {
        // SAFETY: MMIO register address, see impl note
        unsafe { ptr::read_volatile(addr as *const u32) }
    }

    fn write(&mut self, addr: usize, value: u32) {
        // SAFETY: MMIO register address, see impl note
        unsafe { ptr::write_volatile(addr as *mut u32, value) }
    }
}

/// A bounded poll ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    /// Microseconds that had elapsed when the poll gave up.
    pub waited_us: u32,
}

/// Poll `ready` until it returns true or `timeout_us` elapses.
///
/// Elapsed time is measured with wrapping arithmetic against the platform's
/// monotonic counter, so counter wrap during the wait is harmless.
pub fn wait_with_timeout<P: Platform + ?Sized>(
    platform: &P,
    timeout_us: u32,
    mut ready: impl FnMut() -> bool,
) -> Result<(), TimedOut> {
    let start = platform.micros();
    loop {
        if ready() {
            return Ok(());
        }
        let waited_us = platform.micros().wrapping_sub(start);
        if waited_us > timeout_us {
            return Err(TimedOut { waited_us });
        }
        core::hint::spin_loop();
    }
}

/// Poll `ready` until it returns true, with no timeout.
///
/// Only for status bits the hardware always resolves; a bit that never
/// resolves means the part is dead.
pub fn spin_until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        core::hint::spin_loop();
    }
}
