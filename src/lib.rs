//! # ARINC-429 over Programmable I/O
//!
//! A Rust library for driving an ARINC-429 avionics serial bus with the
//! shared programmable I/O engines of a microcontroller.
//!
//! ARINC-429 is a unidirectional 32-bit word bus used in civil avionics.
//! This library provides:
//!
//! - Odd parity word generation and checking
//! - A lane registry tracking which engine lanes are free or bound
//! - A program loader that shares one resident program between all lanes
//!   of the same role in an engine
//! - Transmit and receive operations with blocking, non-blocking and
//!   bounded variants
//! - A line-oriented command frontend
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization support
//!
//! ## Example
//!
//! ```
//! use arinc429_pio::{Arinc429BusBuilder, Program, ProgramSet, Role, SimulatedPio, Word};
//! use arinc429_pio::spec::HIGH_SPEED;
//!
//! let programs = ProgramSet::new(
//!     Program::new(Role::Transmit, "arinc_tx", vec![0xE081; 10]),
//!     Program::new(Role::Receive, "arinc_rx", vec![0x2020; 8]),
//! )?;
//! let mut bus = Arinc429BusBuilder::new(programs).build(SimulatedPio::default())?;
//! bus.hardware_mut().wire(2, 3);
//!
//! let tx = bus.bind_transmitter(2, HIGH_SPEED)?;
//! let rx = bus.bind_receiver(3, HIGH_SPEED)?;
//! let word = Word::with_odd_parity(0x0000_1234);
//! bus.send_blocking(&tx, word);
//! assert_eq!(bus.receive(&rx), word.raw());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bus;
pub mod console;
pub mod core;
pub mod encoding;
pub mod error;
pub mod frontend;
pub mod hardware;
pub mod loader;
pub mod receiver;
pub mod registry;
pub mod sim;
pub mod transmitter;
pub mod wait;

pub use crate::bus::{Arinc429Bus, Arinc429BusBuilder};
pub use crate::core::{LaneId, Platform, ProgramOffset, Role, Word};
pub use crate::encoding::OddParity;
pub use crate::error::{BusError, CommandError, Result};
pub use crate::frontend::{Arguments, CommandFrontend};
pub use crate::hardware::{ClockDivider, PioHardware, Program, ProgramSet};
pub use crate::loader::{LaneHandle, ProgramLoader};
pub use crate::receiver::Receiver;
pub use crate::registry::{LaneRegistry, LaneSlot};
pub use crate::sim::{SimConfig, SimulatedPio};
pub use crate::transmitter::Transmitter;
pub use crate::wait::{CancelToken, WaitPolicy};

/// ARINC-429 and engine constants
pub mod spec {
    /// Low-speed bit rate in bits per second
    pub const LOW_SPEED: u32 = 12_500;

    /// High-speed bit rate in bits per second
    pub const HIGH_SPEED: u32 = 100_000;

    /// Word length in bits
    pub const WORD_LENGTH: usize = 32;

    /// Largest engine count of any supported platform
    pub const MAX_ENGINES: usize = 3;

    /// Lanes (state machines) per engine
    pub const LANES_PER_ENGINE: usize = 4;

    /// Words per lane FIFO with input and output joined
    pub const FIFO_DEPTH: usize = 8;

    /// Instruction slots per engine
    pub const INSTRUCTION_MEMORY: usize = 32;

    /// Clock cycles per bit of the transmit program
    pub const TX_OVERSAMPLING: u32 = 16;

    /// Clock cycles per bit of the receive program
    pub const RX_OVERSAMPLING: u32 = 32;

    /// Default system clock in Hz
    pub const DEFAULT_SYSTEM_CLOCK_HZ: u32 = 125_000_000; // 125 MHz

    /// Longest command name the frontend distinguishes
    pub const MAX_COMMAND_LENGTH: usize = 16;

    /// Line buffer capacity of the frontend
    pub const LINE_BUFFER_LENGTH: usize = 40;
}
