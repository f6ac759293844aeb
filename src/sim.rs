//! Simulated SEMC/CCM register bus and board for host tests.
//!
//! The bus models just enough of the controller for bring-up: a
//! self-clearing (or stuck) software reset, write-1-to-clear INTR, and IP
//! commands that execute against a word-addressed device memory. Faults can
//! be injected per command or per write.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::vec::Vec;

use crate::clock::ccm;
use crate::drivers::semc::{reg, regs, IntrFlags, McrFlags, SdramCommand};
use crate::drivers::{Mmio, Platform};

/// SDRAM window base as seen by the IP command engine.
pub const SDRAM_TEST_BASE: u32 = 0x8000_0000;

/// CBCDR reset value on the RT1060.
pub const CBCDR_RESET: u32 = 0x000A_8300;

pub struct SimSemc {
    regs: BTreeMap<usize, u32>,
    device: BTreeMap<u32, u32>,
    reset_completes: bool,
    failing: Vec<SdramCommand>,
    corrupt: Option<(usize, u32)>,
    writes_issued: usize,
    commands: Vec<SdramCommand>,
    mode_register: Option<u32>,
    register_writes: usize,
    rxdat_reads: Cell<usize>,
    ram: Vec<u64>,
}

impl SimSemc {
    pub fn new() -> Self {
        let mut regs = BTreeMap::new();
        regs.insert(ccm::reg(ccm::regs::CBCDR), CBCDR_RESET);
        Self {
            regs,
            device: BTreeMap::new(),
            reset_completes: true,
            failing: Vec::new(),
            corrupt: None,
            writes_issued: 0,
            commands: Vec::new(),
            mode_register: None,
            register_writes: 0,
            rxdat_reads: Cell::new(0),
            ram: Vec::new(),
        }
    }

    /// Software reset never clears.
    pub fn stuck_in_reset(mut self) -> Self {
        self.reset_completes = false;
        self
    }

    /// Every execution of `cmd` reports an error.
    pub fn fail_command(&mut self, cmd: SdramCommand) {
        self.failing.push(cmd);
    }

    /// XOR `mask` into the data of the `nth` (0-based) Write command.
    pub fn corrupt_write(&mut self, nth: usize, mask: u32) {
        self.corrupt = Some((nth, mask));
    }

    /// Raise INTR bits as if left over from an earlier command.
    pub fn force_intr(&mut self, flags: IntrFlags) {
        *self.regs.entry(reg(regs::INTR)).or_insert(0) |= flags.bits();
    }

    pub fn commands(&self) -> &[SdramCommand] {
        &self.commands
    }

    pub fn mode_register(&self) -> Option<u32> {
        self.mode_register
    }

    pub fn register_writes(&self) -> usize {
        self.register_writes
    }

    pub fn rxdat_reads(&self) -> usize {
        self.rxdat_reads.get()
    }

    fn get(&self, addr: usize) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    fn run(&mut self, cmd: SdramCommand) {
        self.commands.push(cmd);
        let mut status = IntrFlags::IPCMDDONE;
        if self.failing.contains(&cmd) {
            status |= IntrFlags::IPCMDERR;
        } else {
            let target = self.get(reg(regs::IPCR0));
            let txdat = self.get(reg(regs::IPTXDAT));
            match cmd {
                SdramCommand::Write => {
                    let mut data = txdat;
                    if let Some((nth, mask)) = self.corrupt {
                        if nth == self.writes_issued {
                            data ^= mask;
                        }
                    }
                    self.writes_issued += 1;
                    self.device.insert(target, data);
                }
                SdramCommand::Read => {
                    let data = self.device.get(&target).copied().unwrap_or(0);
                    self.regs.insert(reg(regs::IPRXDAT), data);
                }
                SdramCommand::ModeSet => self.mode_register = Some(txdat),
                _ => {}
            }
        }
        *self.regs.entry(reg(regs::INTR)).or_insert(0) |= status.bits();
    }
}

// SAFETY: window() hands out a heap buffer owned by the simulator that
// stays alive and unmoved until the simulator is dropped.
unsafe impl Mmio for SimSemc {
    fn read(&self, addr: usize) -> u32 {
        if addr == reg(regs::IPRXDAT) {
            self.rxdat_reads.set(self.rxdat_reads.get() + 1);
        }
        self.get(addr)
    }

    fn write(&mut self, addr: usize, value: u32) {
        self.register_writes += 1;
        if addr == reg(regs::MCR) {
            let mut value = McrFlags::from_bits_retain(value);
            if self.reset_completes {
                value.remove(McrFlags::SWRST);
            }
            self.regs.insert(addr, value.bits());
        } else if addr == reg(regs::INTR) {
            *self.regs.entry(addr).or_insert(0) &= !value;
        } else if addr == reg(regs::IPCMD) {
            self.regs.insert(addr, value);
            if let Some(cmd) = SdramCommand::from_ipcmd(value) {
                self.run(cmd);
            }
        } else {
            self.regs.insert(addr, value);
        }
    }

    fn window(&mut self, _base: usize, size: usize) -> *mut u8 {
        self.ram = vec![0u64; size.div_ceil(8)];
        self.ram.as_mut_ptr() as *mut u8
    }
}

/// Board model: every counter read advances time by [`Self::TICK_US`].
pub struct SimPlatform {
    now: Cell<u32>,
    pads_configured: usize,
    delayed_us: u64,
}

impl SimPlatform {
    pub const TICK_US: u32 = 10;
    pub const CPU_HZ: f32 = 600e6;

    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
            pads_configured: 0,
            delayed_us: 0,
        }
    }

    pub fn pads_configured(&self) -> usize {
        self.pads_configured
    }

    pub fn delayed_us(&self) -> u64 {
        self.delayed_us
    }

    pub fn now(&self) -> u32 {
        self.now.get()
    }
}

impl Platform for SimPlatform {
    fn configure_pads(&mut self) {
        self.pads_configured += 1;
    }

    fn micros(&self) -> u32 {
        let now = self.now.get().wrapping_add(Self::TICK_US);
        self.now.set(now);
        now
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us += u64::from(us);
        self.now.set(self.now.get().wrapping_add(us));
    }

    fn cpu_clock_hz(&self) -> f32 {
        Self::CPU_HZ
    }
}
