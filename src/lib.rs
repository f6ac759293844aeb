//! imxrt-extmem - External SDRAM bring-up for i.MX RT
//!
//! Brings the SEMC controller and an attached 32 MiB SDRAM online at boot
//! and turns the result into heap memory.
//!
//! # Components
//! - Clock analysis: SEMC / FlexSPI2 frequency from the CCM selectors
//! - Timing: datasheet nanoseconds to controller cycles, refresh schedule
//! - IP commands: the controller's command/acknowledge handshake
//! - Bring-up: reset, configure, initialise and self-test, publish once
//! - Allocation: pool over the region, fallback heap for everything else
//!
//! # Board wiring
//! ```ignore
//! use imxrt_extmem::drivers::Imxrt;
//! use imxrt_extmem::{ExtMem, SdramConfig};
//! use linked_list_allocator::LockedHeap;
//!
//! #[global_allocator]
//! static EXTMEM: ExtMem<LockedHeap> = ExtMem::new(LockedHeap::empty());
//!
//! fn startup(board: &mut Board) {
//!     // SAFETY: only user of the SEMC/CCM blocks during startup
//!     let mut bus = unsafe { Imxrt::steal() };
//!     if EXTMEM.bring_up(&mut bus, board, &SdramConfig::default()).is_err() {
//!         // keeps running from internal RAM
//!     }
//! }
//! ```
//!
//! # Safety
//! Raw register access is confined to [`drivers::Imxrt`]; everything else
//! goes through the [`drivers::Mmio`] trait so it can run against a model.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod clock;
pub mod drivers;
pub mod mm;
pub mod sdram;

#[cfg(test)]
mod sim;

pub use clock::{ClockConfig, SemcClock};
pub use drivers::{Mmio, Platform};
pub use mm::{ExtMemAllocator, ExtMemWindow, RegionDescriptor};
pub use sdram::{BringupError, ExtMem, ExtMemState, SdramConfig};
