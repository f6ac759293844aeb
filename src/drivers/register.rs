//! Typed Register Fields
//!
//! Multi-bit register fields are described by their bit offset and width
//! instead of raw masks, so encoding rules can be tested without hardware.
//! Single-bit controls live in `bitflags` types next to each register map.

/// A contiguous bit field inside a 32-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    offset: u32,
    width: u32,
}

impl Field {
    /// Describe a field of `width` bits starting at bit `offset`.
    pub const fn new(offset: u32, width: u32) -> Self {
        debug_assert!(width > 0 && offset + width <= 32);
        Self { offset, width }
    }

    /// Largest raw value the field can hold.
    #[inline]
    pub const fn max(self) -> u32 {
        ((1u64 << self.width) - 1) as u32
    }

    /// Mask of the field in register position.
    #[inline]
    pub const fn mask(self) -> u32 {
        self.max() << self.offset
    }

    /// Place `value` into the field, truncating to its width.
    #[inline]
    pub const fn encode(self, value: u32) -> u32 {
        (value & self.max()) << self.offset
    }

    /// Extract the field's raw value from a register word.
    #[inline]
    pub const fn decode(self, reg: u32) -> u32 {
        (reg >> self.offset) & self.max()
    }

    /// Return `reg` with this field replaced by `value`.
    #[inline]
    pub const fn replace(self, reg: u32, value: u32) -> u32 {
        (reg & !self.mask()) | self.encode(value)
    }
}

/// A clock divider field: raw value `n` divides by `n + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Divider(Field);

impl Divider {
    pub const fn new(offset: u32, width: u32) -> Self {
        Self(Field::new(offset, width))
    }

    /// Underlying raw field.
    #[inline]
    pub const fn field(self) -> Field {
        self.0
    }

    /// Encode a divisor (1-based) into register position.
    #[inline]
    pub const fn encode(self, divisor: u32) -> u32 {
        self.0.encode(divisor.saturating_sub(1))
    }

    /// Decode the divisor (1-based) held in a register word.
    #[inline]
    pub const fn decode(self, reg: u32) -> u32 {
        self.0.decode(reg) + 1
    }
}
