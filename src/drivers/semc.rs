//! SEMC (Smart External Memory Controller) register map and IP command engine
//!
//! # Memory Map (i.MX RT1060)
//! - Register block: 0x402F_0000
//! - SDRAM window (CS0): 0x8000_0000
//!
//! IP commands are the controller's side door for talking to the SDRAM
//! device directly: the target address goes in IPCR0, optional write data in
//! IPTXDAT, and the opcode (guarded by a key in the upper half-word) in
//! IPCMD. Completion and error are reported in INTR.

use bitflags::bitflags;

use super::register::Field;
use super::{spin_until, Mmio};

/// SEMC register block base address
pub const SEMC_BASE: usize = 0x402F_0000;

/// Register offsets from [`SEMC_BASE`]
pub mod regs {
    /// Module control
    pub const MCR: usize = 0x00;
    /// Bus (AXI) master control, queue 0
    pub const BMCR0: usize = 0x08;
    /// Bus (AXI) master control, queue 1
    pub const BMCR1: usize = 0x0C;
    /// Base register 0 (SDRAM CS0); BR1..BR8 follow at 4-byte stride
    pub const BR0: usize = 0x10;
    /// Number of base registers
    pub const BR_COUNT: usize = 9;
    /// Interrupt status
    pub const INTR: usize = 0x3C;
    pub const SDRAMCR0: usize = 0x40;
    pub const SDRAMCR1: usize = 0x44;
    pub const SDRAMCR2: usize = 0x48;
    pub const SDRAMCR3: usize = 0x4C;
    /// IP command target address
    pub const IPCR0: usize = 0x90;
    /// IP command data size
    pub const IPCR1: usize = 0x94;
    /// IP command byte mask
    pub const IPCR2: usize = 0x98;
    pub const IPCMD: usize = 0x9C;
    pub const IPTXDAT: usize = 0xA0;
    pub const IPRXDAT: usize = 0xB0;

    /// Absolute address of base register `n`.
    pub const fn br(n: usize) -> usize {
        super::SEMC_BASE + BR0 + 4 * n
    }
}

/// Absolute address of a SEMC register.
#[inline]
pub const fn reg(offset: usize) -> usize {
    SEMC_BASE + offset
}

bitflags! {
    /// MCR single-bit controls
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct McrFlags: u32 {
        /// Software reset, self-clearing
        const SWRST = 1 << 0;
        /// Module disable
        const MDIS = 1 << 1;
        /// Sample read data on the looped-back DQS pad
        const DQSMD = 1 << 2;
    }

    /// INTR status bits (write 1 to clear)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntrFlags: u32 {
        const IPCMDDONE = 1 << 0;
        const IPCMDERR = 1 << 1;
    }

    /// SDRAMCR3 single-bit controls
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sdramcr3Flags: u32 {
        /// Periodic refresh enable
        const REN = 1 << 0;
    }

    /// Base register single-bit controls
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BrFlags: u32 {
        const VLD = 1 << 0;
    }

    /// SDRAMCR0 single-bit controls
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sdramcr0Flags: u32 {
        /// 16-bit port size
        const PS = 1 << 0;
    }
}

/// MCR fields
pub mod mcr {
    use super::Field;
    /// Bus timeout
    pub const BTO: Field = Field::new(24, 5);
}

/// BMCR0 fields (queue 0 arbitration weights)
pub mod bmcr0 {
    use super::Field;
    pub const WQOS: Field = Field::new(0, 4);
    pub const WAGE: Field = Field::new(4, 4);
    pub const WSH: Field = Field::new(8, 8);
    pub const WRWS: Field = Field::new(16, 8);
}

/// BMCR1 fields (queue 1 arbitration weights)
pub mod bmcr1 {
    use super::Field;
    pub const WQOS: Field = Field::new(0, 4);
    pub const WAGE: Field = Field::new(4, 4);
    pub const WPH: Field = Field::new(8, 8);
    pub const WRWS: Field = Field::new(16, 8);
    pub const WBR: Field = Field::new(24, 8);
}

/// Base register fields
pub mod br {
    use super::Field;
    /// Memory size select: window is 4 KiB << MS
    pub const MS: Field = Field::new(1, 5);
    /// Base address bits [31:12]
    pub const BA: Field = Field::new(12, 20);
}

/// SDRAMCR0 fields (device geometry)
pub mod sdramcr0 {
    use super::Field;
    /// Burst length: 2^BL words
    pub const BL: Field = Field::new(4, 3);
    /// Column address width: 12 - COL bits
    pub const COL: Field = Field::new(8, 2);
    /// CAS latency
    pub const CL: Field = Field::new(10, 2);
}

/// SDRAMCR1 fields; each holds cycles - 1
pub mod sdramcr1 {
    use super::Field;
    /// tRP: precharge to activate
    pub const PRE2ACT: Field = Field::new(0, 4);
    /// tRCD: activate to read/write
    pub const ACT2RW: Field = Field::new(4, 4);
    /// tRFC: refresh recovery
    pub const RFRC: Field = Field::new(8, 5);
    /// tWR: write recovery
    pub const WRC: Field = Field::new(13, 3);
    /// Minimum self-refresh time
    pub const CKEOFF: Field = Field::new(16, 4);
    /// tRAS: activate to precharge
    pub const ACT2PRE: Field = Field::new(20, 4);
}

/// SDRAMCR2 fields
pub mod sdramcr2 {
    use super::Field;
    /// Self-refresh recovery, cycles - 1
    pub const SRRC: Field = Field::new(0, 8);
    /// Refresh to refresh, raw cycles
    pub const REF2REF: Field = Field::new(8, 8);
    /// Activate to activate (row to row), raw cycles
    pub const ACT2ACT: Field = Field::new(16, 8);
    /// Idle timeout
    pub const ITO: Field = Field::new(24, 8);
}

/// SDRAMCR3 fields (refresh scheduling)
pub mod sdramcr3 {
    use super::Field;
    /// Prescaler period in units of 16 cycles; 0 means 256
    pub const PRESCALE: Field = Field::new(8, 8);
    /// Refresh threshold in prescaler periods
    pub const RT: Field = Field::new(16, 8);
    /// Urgent refresh threshold in prescaler periods
    pub const UT: Field = Field::new(24, 8);
}

/// IPCMD fields
pub mod ipcmd {
    use super::Field;
    pub const CMD: Field = Field::new(0, 16);
    /// Must hold [`KEY_VALUE`] or the command is ignored
    pub const KEY: Field = Field::new(16, 16);
    pub const KEY_VALUE: u32 = 0xA55A;
}

/// SDRAM IP command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SdramCommand {
    Read = 0x8,
    Write = 0x9,
    ModeSet = 0xA,
    Active = 0xB,
    AutoRefresh = 0xC,
    SelfRefresh = 0xD,
    Precharge = 0xE,
    PrechargeAll = 0xF,
}

impl SdramCommand {
    /// IPCMD word for this opcode, key included.
    #[inline]
    pub const fn ipcmd(self) -> u32 {
        ipcmd::KEY.encode(ipcmd::KEY_VALUE) | ipcmd::CMD.encode(self as u32)
    }

    /// Decode an IPCMD word; `None` if the key or opcode is invalid.
    pub fn from_ipcmd(word: u32) -> Option<Self> {
        if ipcmd::KEY.decode(word) != ipcmd::KEY_VALUE {
            return None;
        }
        match ipcmd::CMD.decode(word) {
            0x8 => Some(Self::Read),
            0x9 => Some(Self::Write),
            0xA => Some(Self::ModeSet),
            0xB => Some(Self::Active),
            0xC => Some(Self::AutoRefresh),
            0xD => Some(Self::SelfRefresh),
            0xE => Some(Self::Precharge),
            0xF => Some(Self::PrechargeAll),
            _ => None,
        }
    }
}

/// An IP command finished with the error bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFailed {
    pub command: SdramCommand,
}

/// IP command engine bound to one SDRAM chip select.
pub struct IpCommands<'a, B: Mmio> {
    bus: &'a mut B,
    target: u32,
}

impl<'a, B: Mmio> IpCommands<'a, B> {
    /// Issue commands at bus address `target` (the SDRAM base).
    pub fn new(bus: &'a mut B, target: u32) -> Self {
        Self { bus, target }
    }

    /// Run one command to completion.
    ///
    /// The payload, when given, is staged in IPTXDAT before the command is
    /// issued. Completion is polled with no timeout. There are no retries:
    /// an error bit fails the command and the caller decides what to do.
    pub fn execute(
        &mut self,
        cmd: SdramCommand,
        payload: Option<u32>,
    ) -> Result<(), CommandFailed> {
        self.bus
            .write(reg(regs::INTR), (IntrFlags::IPCMDDONE | IntrFlags::IPCMDERR).bits());
        self.bus.write(reg(regs::IPCR0), self.target);
        if let Some(data) = payload {
            self.bus.write(reg(regs::IPTXDAT), data);
        }
        self.bus.write(reg(regs::IPCMD), cmd.ipcmd());

        let bus = &*self.bus;
        spin_until(|| {
            IntrFlags::from_bits_truncate(bus.read(reg(regs::INTR))).contains(IntrFlags::IPCMDDONE)
        });

        let status = IntrFlags::from_bits_truncate(self.bus.read(reg(regs::INTR)));
        if status.contains(IntrFlags::IPCMDERR) {
            return Err(CommandFailed { command: cmd });
        }
        Ok(())
    }

    /// Run a command that carries no data.
    pub fn issue(&mut self, cmd: SdramCommand) -> Result<(), CommandFailed> {
        self.execute(cmd, None)
    }

    /// Run a command carrying `data` to the device.
    pub fn write(&mut self, cmd: SdramCommand, data: u32) -> Result<(), CommandFailed> {
        self.execute(cmd, Some(data))
    }

    /// Run a command and return the word the device sent back.
    pub fn read(&mut self, cmd: SdramCommand) -> Result<u32, CommandFailed> {
        self.execute(cmd, None)?;
        Ok(self.bus.read(reg(regs::IPRXDAT)))
    }
}
