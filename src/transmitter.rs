//! ARINC-429 transmitter over a bound lane

use crate::core::Role;
use crate::error::{BusError, Result};
use crate::hardware::{ClockDivider, PioHardware};
use crate::loader::LaneHandle;
use crate::wait::WaitPolicy;
use tracing::debug;

/// Send side of a lane bound to [`Role::Transmit`]
///
/// The output FIFO holds [`crate::spec::FIFO_DEPTH`] words.
#[derive(Debug, PartialEq, Eq)]
pub struct Transmitter {
    handle: LaneHandle,
}

impl Transmitter {
    /// Wrap a transmit handle
    pub fn new(handle: LaneHandle) -> Result<Self> {
        if handle.role() != Role::Transmit {
            return Err(BusError::WrongRole {
                expected: Role::Transmit,
                actual: handle.role(),
            });
        }
        Ok(Transmitter { handle })
    }

    /// The underlying lane handle
    pub fn handle(&self) -> &LaneHandle {
        &self.handle
    }

    /// Give back the lane handle, e.g. to release it
    pub fn into_handle(self) -> LaneHandle {
        self.handle
    }

    /// Apply a new baud rate, 16 clock cycles per bit
    pub fn set_baud_rate<H: PioHardware>(&mut self, hw: &mut H, baud_rate: u32) -> Result<()> {
        let oversampling = Role::Transmit.oversampling();
        let divider = ClockDivider::from_baud(hw.system_clock_hz(), baud_rate, oversampling)?;
        hw.set_clock_divider(self.handle.lane(), divider);
        self.handle.set_baud_rate(baud_rate);
        debug!(lane = %self.handle.lane(), baud_rate, %divider, "transmit baud rate set");
        Ok(())
    }

    /// Queue a word, spinning until the FIFO has room
    ///
    /// Never returns if the FIFO stays full.
    pub fn send_blocking<H: PioHardware>(&self, hw: &mut H, message: impl Into<u32>) {
        let lane = self.handle.lane();
        while hw.is_tx_fifo_full(lane) {
            hw.idle();
            std::hint::spin_loop();
        }
        hw.put(lane, message.into());
    }

    /// Queue a word if the FIFO has room
    ///
    /// Returns false, leaving the FIFO untouched, when it is full.
    pub fn send_non_blocking<H: PioHardware>(&self, hw: &mut H, message: impl Into<u32>) -> bool {
        let lane = self.handle.lane();
        if hw.is_tx_fifo_full(lane) {
            return false;
        }
        hw.put(lane, message.into());
        true
    }

    /// Queue a word, spinning no longer than `policy` allows
    pub fn send_until<H: PioHardware>(
        &self,
        hw: &mut H,
        message: impl Into<u32>,
        policy: &WaitPolicy,
    ) -> Result<()> {
        let lane = self.handle.lane();
        policy.wait_until(hw, |h| !h.is_tx_fifo_full(lane))?;
        hw.put(lane, message.into());
        Ok(())
    }
}
