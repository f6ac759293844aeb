//! SDRAM timing in controller clock cycles
//!
//! Datasheet constraints are given in nanoseconds; the controller wants
//! whole cycles at whatever frequency the clock tree actually produced.
//! Conversion always rounds up, and never below one cycle.

use crate::drivers::semc::{sdramcr1, sdramcr2, sdramcr3};
use crate::sdram::BringupError;

/// 64 ms refresh budget spread over 8192 rows, in whole nanoseconds
pub const ROW_REFRESH_NS: u32 = 64 * 1_000_000 / 8192;

/// Largest representable refresh prescaler (field value 0)
pub const MAX_PRESCALE: u32 = 256;

/// Cycles needed to cover `ns` nanoseconds at `freq_hz`.
///
/// `freq_hz` must be positive and finite.
pub fn clocks(ns: f32, freq_hz: f32) -> u32 {
    let exact = ns * 1.0e-9 * freq_hz;
    let whole = exact as u32;
    let cycles = if (whole as f32) < exact { whole + 1 } else { whole };
    cycles.max(1)
}

/// Datasheet timing constraints in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingNs {
    /// tRAS: activate to precharge
    pub act_to_precharge: f32,
    /// Minimum self-refresh (CKE low) time
    pub self_refresh_min: f32,
    /// tWR: write recovery
    pub write_recovery: f32,
    /// tRFC: refresh recovery
    pub refresh_recovery: f32,
    /// tRCD: activate to read/write
    pub act_to_rw: f32,
    /// tRP: precharge to activate
    pub precharge_to_act: f32,
    /// tRRD/tRC: activate to activate
    pub act_to_act: f32,
    /// tRC: refresh to refresh
    pub refresh_to_refresh: f32,
    /// tXSR: self-refresh exit recovery
    pub self_refresh_recovery: f32,
}

/// ISSI IS42S16160J-6 (32 MiB, 166 MHz)
pub const IS42S16160J_6: TimingNs = TimingNs {
    act_to_precharge: 42.0,
    self_refresh_min: 42.0,
    write_recovery: 12.0,
    refresh_recovery: 67.0,
    act_to_rw: 18.0,
    precharge_to_act: 18.0,
    act_to_act: 60.0,
    refresh_to_refresh: 60.0,
    self_refresh_recovery: 67.0,
};

/// Timing converted to cycles at one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdramTiming {
    pub act_to_precharge: u32,
    pub self_refresh_min: u32,
    pub write_recovery: u32,
    pub refresh_recovery: u32,
    pub act_to_rw: u32,
    pub precharge_to_act: u32,
    pub act_to_act: u32,
    pub refresh_to_refresh: u32,
    pub self_refresh_recovery: u32,
}

impl SdramTiming {
    /// Convert every constraint at `freq_hz`.
    pub fn at(ns: &TimingNs, freq_hz: f32) -> Self {
        Self {
            act_to_precharge: clocks(ns.act_to_precharge, freq_hz),
            self_refresh_min: clocks(ns.self_refresh_min, freq_hz),
            write_recovery: clocks(ns.write_recovery, freq_hz),
            refresh_recovery: clocks(ns.refresh_recovery, freq_hz),
            act_to_rw: clocks(ns.act_to_rw, freq_hz),
            precharge_to_act: clocks(ns.precharge_to_act, freq_hz),
            act_to_act: clocks(ns.act_to_act, freq_hz),
            refresh_to_refresh: clocks(ns.refresh_to_refresh, freq_hz),
            self_refresh_recovery: clocks(ns.self_refresh_recovery, freq_hz),
        }
    }

    /// SDRAMCR1 word. Every field here encodes "n + 1 cycles".
    pub fn sdramcr1(&self) -> u32 {
        sdramcr1::ACT2PRE.encode(self.act_to_precharge - 1)
            | sdramcr1::CKEOFF.encode(self.self_refresh_min - 1)
            | sdramcr1::WRC.encode(self.write_recovery - 1)
            | sdramcr1::RFRC.encode(self.refresh_recovery - 1)
            | sdramcr1::ACT2RW.encode(self.act_to_rw - 1)
            | sdramcr1::PRE2ACT.encode(self.precharge_to_act - 1)
    }

    /// SDRAMCR2 word. REF2REF and ACT2ACT take the raw cycle count.
    pub fn sdramcr2(&self) -> u32 {
        sdramcr2::SRRC.encode(self.self_refresh_recovery - 1)
            | sdramcr2::REF2REF.encode(self.refresh_to_refresh)
            | sdramcr2::ACT2ACT.encode(self.act_to_act)
            | sdramcr2::ITO.encode(0)
    }
}

/// Periodic refresh scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    /// Prescaler period in nanoseconds
    pub period_ns: u32,
    /// Prescaler, in units of 16 cycles
    pub prescale: u32,
    /// Refresh threshold, in prescaler periods
    pub refresh: u32,
    /// Urgent refresh threshold, in prescaler periods
    pub urgent: u32,
}

impl RefreshSchedule {
    /// Schedule for a prescaler period of `prescale_cycles` at `freq_hz`.
    ///
    /// Fails with `ConfigurationOverflow` when the prescaler or refresh
    /// threshold does not fit its register field. A prescaler of 0 is
    /// rejected too, since the field reads 0 as 256.
    pub fn compute(freq_hz: f32, prescale_cycles: u32) -> Result<Self, BringupError> {
        let cycle_ns = 1.0e9 / freq_hz;
        let period_ns = (prescale_cycles as f32 * cycle_ns) as u32;
        // whole nanoseconds per 16-cycle tick, then cycles
        let prescale = ((period_ns / 16) as f32 / cycle_ns) as u32;
        let refresh = ROW_REFRESH_NS.checked_div(period_ns);

        match refresh {
            Some(refresh)
                if (1..=MAX_PRESCALE).contains(&prescale) && refresh <= sdramcr3::RT.max() =>
            {
                Ok(Self {
                    period_ns,
                    prescale,
                    refresh,
                    urgent: refresh,
                })
            }
            _ => Err(BringupError::ConfigurationOverflow {
                prescale,
                refresh: refresh.unwrap_or(u32::MAX),
            }),
        }
    }

    /// SDRAMCR3 word, refresh still disabled. A prescaler of 256 encodes as 0.
    pub fn sdramcr3(&self) -> u32 {
        sdramcr3::PRESCALE.encode(self.prescale)
            | sdramcr3::RT.encode(self.refresh)
            | sdramcr3::UT.encode(self.urgent)
    }
}
