//! ARINC-429 receiver over a bound lane

use crate::core::Role;
use crate::error::{BusError, Result};
use crate::hardware::{ClockDivider, PioHardware};
use crate::loader::LaneHandle;
use crate::wait::WaitPolicy;
use tracing::debug;

/// Receive side of a lane bound to [`Role::Receive`]
#[derive(Debug, PartialEq, Eq)]
pub struct Receiver {
    handle: LaneHandle,
}

impl Receiver {
    /// Wrap a receive handle
    pub fn new(handle: LaneHandle) -> Result<Self> {
        if handle.role() != Role::Receive {
            return Err(BusError::WrongRole {
                expected: Role::Receive,
                actual: handle.role(),
            });
        }
        Ok(Receiver { handle })
    }

    /// The underlying lane handle
    pub fn handle(&self) -> &LaneHandle {
        &self.handle
    }

    /// Give back the lane handle
    pub fn into_handle(self) -> LaneHandle {
        self.handle
    }

    /// Apply a new baud rate, 32 clock cycles per bit
    pub fn set_baud_rate<H: PioHardware>(&mut self, hw: &mut H, baud_rate: u32) -> Result<()> {
        let oversampling = Role::Receive.oversampling();
        let divider = ClockDivider::from_baud(hw.system_clock_hz(), baud_rate, oversampling)?;
        hw.set_clock_divider(self.handle.lane(), divider);
        self.handle.set_baud_rate(baud_rate);
        debug!(lane = %self.handle.lane(), baud_rate, %divider, "receive baud rate set");
        Ok(())
    }

    /// True if at least one word is waiting
    pub fn is_available<H: PioHardware>(&self, hw: &H) -> bool {
        hw.rx_fifo_level(self.handle.lane()) > 0
    }

    /// Take the next word, spinning until one arrives
    ///
    /// Never returns if nothing arrives; check [`is_available`](Self::is_available)
    /// first to avoid blocking.
    pub fn receive<H: PioHardware>(&self, hw: &mut H) -> u32 {
        let lane = self.handle.lane();
        loop {
            if let Some(word) = hw.get(lane) {
                return word;
            }
            hw.idle();
            std::hint::spin_loop();
        }
    }

    /// Take the next word if one is waiting
    pub fn try_receive<H: PioHardware>(&self, hw: &mut H) -> Option<u32> {
        hw.get(self.handle.lane())
    }

    /// Take the next word, spinning no longer than `policy` allows
    pub fn receive_until<H: PioHardware>(&self, hw: &mut H, policy: &WaitPolicy) -> Result<u32> {
        let lane = self.handle.lane();
        policy.wait_until(hw, |h| h.rx_fifo_level(lane) > 0)?;
        hw.get(lane).ok_or(BusError::Timeout)
    }
}
