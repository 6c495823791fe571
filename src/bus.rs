//! High-level ARINC-429 bus: hardware, registry and loader in one place

use crate::core::{Platform, Role, Word};
use crate::encoding::OddParity;
use crate::error::{BusError, Result};
use crate::hardware::{PioHardware, ProgramSet};
use crate::loader::{LaneHandle, ProgramLoader};
use crate::receiver::Receiver;
use crate::registry::LaneRegistry;
use crate::transmitter::Transmitter;
use crate::wait::WaitPolicy;
use rand::RngCore;
use tracing::debug;

/// An ARINC-429 bus over a set of programmable I/O engines
///
/// Owns the hardware and the lane registry, so every binding goes through
/// one place and cannot interleave with another.
pub struct Arinc429Bus<H: PioHardware> {
    hw: H,
    registry: LaneRegistry,
    loader: ProgramLoader,
    platform: Platform,
}

impl<H: PioHardware> Arinc429Bus<H> {
    /// Create a bus with every lane free
    ///
    /// Fails with [`BusError::PlatformMismatch`] when `hw` does not have the
    /// platform's engine count.
    pub fn new(hw: H, programs: ProgramSet, platform: Platform) -> Result<Self> {
        let actual = hw.engine_count();
        if actual != platform.engine_count() {
            return Err(BusError::PlatformMismatch {
                platform,
                expected: platform.engine_count(),
                actual,
            });
        }
        Ok(Arinc429Bus {
            hw,
            registry: LaneRegistry::new(platform),
            loader: ProgramLoader::new(programs),
            platform,
        })
    }

    /// Target platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The hardware
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Mutable access to the hardware
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// The lane registry
    pub fn registry(&self) -> &LaneRegistry {
        &self.registry
    }

    /// Bind a lane to `role`
    pub fn bind_role(&mut self, role: Role, pin: u8, baud_rate: u32) -> Result<LaneHandle> {
        self.loader
            .bind_role(&mut self.registry, &mut self.hw, role, pin, baud_rate)
    }

    /// Bind a transmit lane driving `pin`
    pub fn bind_transmitter(&mut self, pin: u8, baud_rate: u32) -> Result<Transmitter> {
        Transmitter::new(self.bind_role(Role::Transmit, pin, baud_rate)?)
    }

    /// Bind a receive lane sampling `pin`
    pub fn bind_receiver(&mut self, pin: u8, baud_rate: u32) -> Result<Receiver> {
        Receiver::new(self.bind_role(Role::Receive, pin, baud_rate)?)
    }

    /// Return a lane to the free pool
    pub fn release(&mut self, handle: LaneHandle) -> Result<()> {
        self.loader.release(&mut self.registry, &mut self.hw, handle)
    }

    /// Release every bound lane and clear the registry
    pub fn reset(&mut self) -> Result<()> {
        for (lane, role, offset) in self.registry.bound_lanes() {
            self.loader
                .release_lane(&mut self.registry, &mut self.hw, lane, role, offset)?;
        }
        self.registry.reset();
        debug!(platform = %self.platform, "bus reset");
        Ok(())
    }

    /// Change a transmitter's baud rate
    pub fn set_tx_baud_rate(&mut self, tx: &mut Transmitter, baud_rate: u32) -> Result<()> {
        tx.set_baud_rate(&mut self.hw, baud_rate)
    }

    /// Change a receiver's baud rate
    pub fn set_rx_baud_rate(&mut self, rx: &mut Receiver, baud_rate: u32) -> Result<()> {
        rx.set_baud_rate(&mut self.hw, baud_rate)
    }

    /// Send, spinning until the FIFO has room
    pub fn send_blocking(&mut self, tx: &Transmitter, message: impl Into<u32>) {
        tx.send_blocking(&mut self.hw, message)
    }

    /// Send if the FIFO has room
    pub fn send_non_blocking(&mut self, tx: &Transmitter, message: impl Into<u32>) -> bool {
        tx.send_non_blocking(&mut self.hw, message)
    }

    /// Send, spinning within `policy`
    pub fn send_until(
        &mut self,
        tx: &Transmitter,
        message: impl Into<u32>,
        policy: &WaitPolicy,
    ) -> Result<()> {
        tx.send_until(&mut self.hw, message, policy)
    }

    /// Generate an odd-parity word from `rng` and send it without blocking
    ///
    /// Returns the word if it was queued.
    pub fn send_random<R: RngCore + ?Sized>(
        &mut self,
        tx: &Transmitter,
        rng: &mut R,
    ) -> Option<Word> {
        let word = OddParity::random_message(rng);
        tx.send_non_blocking(&mut self.hw, word).then_some(word)
    }

    /// True if a word is waiting
    pub fn is_available(&self, rx: &Receiver) -> bool {
        rx.is_available(&self.hw)
    }

    /// Receive, spinning until a word arrives
    pub fn receive(&mut self, rx: &Receiver) -> u32 {
        rx.receive(&mut self.hw)
    }

    /// Receive if a word is waiting
    pub fn try_receive(&mut self, rx: &Receiver) -> Option<u32> {
        rx.try_receive(&mut self.hw)
    }

    /// Receive, spinning within `policy`
    pub fn receive_until(&mut self, rx: &Receiver, policy: &WaitPolicy) -> Result<u32> {
        rx.receive_until(&mut self.hw, policy)
    }
}

/// Builder for [`Arinc429Bus`]
pub struct Arinc429BusBuilder {
    programs: ProgramSet,
    platform: Platform,
}

impl Arinc429BusBuilder {
    /// Create a builder for the given programs
    pub fn new(programs: ProgramSet) -> Self {
        Arinc429BusBuilder {
            programs,
            platform: Platform::default(),
        }
    }

    /// Set the platform
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Build the bus over `hw`
    pub fn build<H: PioHardware>(self, hw: H) -> Result<Arinc429Bus<H>> {
        Arinc429Bus::new(hw, self.programs, self.platform)
    }
}
