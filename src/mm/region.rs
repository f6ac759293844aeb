//! External Memory Region Types
//!
//! A [`RegionDescriptor`] is what bring-up publishes: where the external
//! memory lives on the bus and how big it is. The known windows are fixed by
//! the i.MX RT memory map.

use core::fmt;

/// Bytes per MiB
pub const MIB: usize = 1 << 20;

/// External memory windows the controllers decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtMemWindow {
    /// SEMC chip select 0
    Sdram,
    /// FlexSPI2 (QSPI PSRAM)
    Psram,
}

impl ExtMemWindow {
    /// Bus address of the window.
    #[inline]
    pub const fn base(self) -> usize {
        match self {
            Self::Sdram => 0x8000_0000,
            Self::Psram => 0x7000_0000,
        }
    }

    /// Window starting exactly at `base`, if any.
    pub const fn from_base(base: usize) -> Option<Self> {
        match base {
            0x8000_0000 => Some(Self::Sdram),
            0x7000_0000 => Some(Self::Psram),
            _ => None,
        }
    }
}

/// A discovered external memory region.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionDescriptor {
    base: usize,
    size: usize,
}

impl RegionDescriptor {
    #[inline]
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Region at the start of a known window.
    #[inline]
    pub const fn in_window(window: ExtMemWindow, size: usize) -> Self {
        Self::new(window.base(), size)
    }

    /// Bus address of the first byte.
    #[inline]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Size in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Size in whole MiB, saturating at 255 for the legacy byte-wide mirror.
    #[inline]
    pub const fn size_mib(&self) -> u8 {
        let mib = self.size / MIB;
        if mib > u8::MAX as usize {
            u8::MAX
        } else {
            mib as u8
        }
    }

    /// One past the last byte.
    #[inline]
    pub const fn end(&self) -> usize {
        self.base + self.size
    }

    /// Which known window this region sits in.
    #[inline]
    pub const fn window(&self) -> Option<ExtMemWindow> {
        ExtMemWindow::from_base(self.base)
    }

    /// Check whether `addr` lies inside the region.
    #[inline]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end()
    }
}

impl fmt::Debug for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionDescriptor({:#010x}, {} KiB)", self.base, self.size / 1024)
    }
}

impl fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}..{:#010x}", self.base, self.end())
    }
}
