//! Memory management for the external memory window
//!
//! Provides:
//! - Region descriptors for the known external windows
//! - A pool carved over a discovered region
//! - The pool-first allocator facade with a generic fallback
//!
//! # Principles
//! - A pointer is owned by exactly one tier, decided by address
//! - No pool means every allocation uses the fallback

mod allocator;
mod pool;
mod region;

pub use allocator::ExtMemAllocator;
pub use pool::Pool;
pub use region::{ExtMemWindow, RegionDescriptor, MIB};
