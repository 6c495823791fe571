//! Hardware seam: the operations the core needs from programmable I/O engines
//!
//! The core never touches registers directly. A board support layer
//! implements [`PioHardware`] by mapping engine indices to its peripheral
//! handles through a fixed table; tests use [`crate::sim::SimulatedPio`].

use crate::core::{LaneId, ProgramOffset, Role};
use crate::error::{BusError, Result};

/// Fractional clock divider in the hardware's 16.8 fixed-point format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockDivider {
    /// Integer part (1..=65535)
    pub integer: u16,
    /// Fractional part in 1/256 steps
    pub fraction: u8,
}

impl ClockDivider {
    /// Divider for `baud_rate` bits per second at `oversampling` cycles per bit
    ///
    /// Computes `system_clock_hz / (baud_rate * oversampling)`.
    pub fn from_baud(system_clock_hz: u32, baud_rate: u32, oversampling: u32) -> Result<Self> {
        if baud_rate == 0 {
            return Err(BusError::invalid_baud_rate("baud rate must be positive"));
        }
        let div = system_clock_hz as f64 / (baud_rate as f64 * oversampling.max(1) as f64);
        if !(1.0..65536.0).contains(&div) {
            return Err(BusError::invalid_baud_rate(format!(
                "{} baud needs clock divider {:.3}, outside 1.0..65536",
                baud_rate, div
            )));
        }
        let integer = div.trunc() as u16;
        let fraction = ((div - integer as f64) * 256.0) as u8;
        Ok(ClockDivider { integer, fraction })
    }

    /// Divider as a float, the form the SDK accepts
    pub fn as_f32(&self) -> f32 {
        self.integer as f32 + self.fraction as f32 / 256.0
    }

    /// Bit rate this divider actually produces
    pub fn bit_rate(&self, system_clock_hz: u32, oversampling: u32) -> f64 {
        system_clock_hz as f64 / (self.as_f32() as f64 * oversampling.max(1) as f64)
    }
}

impl std::fmt::Display for ClockDivider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}/256", self.integer, self.fraction)
    }
}

/// A microcode program for one role
///
/// The instructions are opaque here; only their count matters for
/// placement in instruction memory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    /// Role this program implements
    pub role: Role,
    /// Name used in logs
    pub name: String,
    /// Encoded instructions
    pub code: Vec<u16>,
}

impl Program {
    /// Create a program
    pub fn new(role: Role, name: impl Into<String>, code: Vec<u16>) -> Self {
        Program {
            role,
            name: name.into(),
            code,
        }
    }

    /// Number of instruction slots the program occupies
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True if the program has no instructions
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// The programs the loader can place, one per supported role
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramSet {
    transmit: Program,
    receive: Program,
}

impl ProgramSet {
    /// Create a program set, checking each program's role
    pub fn new(transmit: Program, receive: Program) -> Result<Self> {
        if transmit.role != Role::Transmit {
            return Err(BusError::WrongRole {
                expected: Role::Transmit,
                actual: transmit.role,
            });
        }
        if receive.role != Role::Receive {
            return Err(BusError::WrongRole {
                expected: Role::Receive,
                actual: receive.role,
            });
        }
        Ok(ProgramSet { transmit, receive })
    }

    /// Program for `role`, if the set has one
    pub fn get(&self, role: Role) -> Option<&Program> {
        match role {
            Role::Transmit => Some(&self.transmit),
            Role::Receive => Some(&self.receive),
            Role::Other => None,
        }
    }
}

/// Per-lane settings applied when a lane starts running its program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneConfig {
    /// Role of the program at `offset`
    pub role: Role,
    /// Entry point of the resident program
    pub offset: ProgramOffset,
    /// GPIO pin driven (transmit) or sampled (receive)
    pub pin: u8,
    /// Clock divider for the requested baud rate
    pub divider: ClockDivider,
}

/// Operations on programmable I/O engines
///
/// All calls come from a single control flow; implementations need no
/// internal locking.
pub trait PioHardware {
    /// System clock feeding the engines
    fn system_clock_hz(&self) -> u32;

    /// Number of engines the chip provides
    fn engine_count(&self) -> u8;

    /// Write `program` into `engine`'s instruction memory
    ///
    /// Fails with [`BusError::ProgramSpace`] when no contiguous range fits.
    fn add_program(&mut self, engine: u8, program: &Program) -> Result<ProgramOffset>;

    /// Free the instruction memory taken by `program` at `offset`
    fn remove_program(&mut self, engine: u8, program: &Program, offset: ProgramOffset);

    /// Reserve a specific lane; false if it is already claimed
    fn claim_lane(&mut self, lane: LaneId) -> bool;

    /// Stop and release a lane
    fn unclaim_lane(&mut self, lane: LaneId);

    /// Configure pins and divider and start the lane at `config.offset`
    fn init_lane(&mut self, lane: LaneId, config: &LaneConfig) -> Result<()>;

    /// Change a running lane's clock divider
    fn set_clock_divider(&mut self, lane: LaneId, divider: ClockDivider);

    /// True if the lane's output FIFO cannot take another word
    fn is_tx_fifo_full(&self, lane: LaneId) -> bool;

    /// Push a word into the lane's output FIFO without checking space
    fn put(&mut self, lane: LaneId, word: u32);

    /// Number of words waiting in the lane's input FIFO
    fn rx_fifo_level(&self, lane: LaneId) -> usize;

    /// Pop a word from the lane's input FIFO, if any
    fn get(&mut self, lane: LaneId) -> Option<u32>;

    /// Called on every spin of a busy-wait
    fn idle(&mut self) {}
}
