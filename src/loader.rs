//! Program loader and role binder
//!
//! Binding picks the first free lane, reuses the engine's copy of the
//! role's program when one is resident, loads it otherwise, and starts the
//! lane with the requested pin and baud rate. Every lane of one role in one
//! engine runs the same program at the same offset.

use crate::core::{LaneId, ProgramOffset, Role};
use crate::error::{BusError, Result};
use crate::hardware::{ClockDivider, LaneConfig, PioHardware, ProgramSet};
use crate::registry::LaneRegistry;
use tracing::{debug, info, warn};

/// A lane bound to a role, owned by the caller while it uses the role
///
/// Not `Clone`: the handle is the one token that can release its lane.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LaneHandle {
    lane: LaneId,
    role: Role,
    offset: ProgramOffset,
    pin: u8,
    baud_rate: u32,
}

impl LaneHandle {
    /// Engine and lane index
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Engine index
    pub fn engine(&self) -> u8 {
        self.lane.engine
    }

    /// Role the lane is bound to
    pub fn role(&self) -> Role {
        self.role
    }

    /// Offset of the program the lane runs
    pub fn offset(&self) -> ProgramOffset {
        self.offset
    }

    /// Pin the lane drives or samples
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Baud rate last applied
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub(crate) fn set_baud_rate(&mut self, baud_rate: u32) {
        self.baud_rate = baud_rate;
    }
}

impl std::fmt::Display for LaneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} offset {} pin {} @ {} baud",
            self.lane, self.role, self.offset, self.pin, self.baud_rate
        )
    }
}

/// Binds roles to lanes, loading or sharing programs as needed
#[derive(Debug, Clone)]
pub struct ProgramLoader {
    programs: ProgramSet,
}

impl ProgramLoader {
    /// Create a loader for the given programs
    pub fn new(programs: ProgramSet) -> Self {
        ProgramLoader { programs }
    }

    /// The programs this loader places
    pub fn programs(&self) -> &ProgramSet {
        &self.programs
    }

    /// Bind a free lane to `role` on `pin` at `baud_rate`
    ///
    /// Fails with [`BusError::ResourceExhausted`] when no lane is free and
    /// [`BusError::UnsupportedRole`] when the set has no program for `role`.
    /// On any failure the registry is unchanged and a program loaded by
    /// this call is removed again.
    pub fn bind_role<H: PioHardware>(
        &self,
        registry: &mut LaneRegistry,
        hw: &mut H,
        role: Role,
        pin: u8,
        baud_rate: u32,
    ) -> Result<LaneHandle> {
        let lane = registry.find_free_lane().ok_or_else(|| {
            warn!(%role, "no more lanes available");
            BusError::ResourceExhausted
        })?;
        let program = self.programs.get(role).ok_or_else(|| {
            warn!(%role, "no program for role");
            BusError::UnsupportedRole(role)
        })?;
        let divider =
            ClockDivider::from_baud(hw.system_clock_hz(), baud_rate, role.oversampling())?;

        let (offset, loaded) = match registry.find_resident_program(lane.engine, role) {
            Some(offset) => (offset, false),
            None => {
                let offset = hw.add_program(lane.engine, program).inspect_err(|err| {
                    warn!(
                        engine = lane.engine,
                        program = %program.name,
                        %err,
                        "program load failed"
                    );
                })?;
                (offset, true)
            }
        };

        let config = LaneConfig {
            role,
            offset,
            pin,
            divider,
        };
        if let Err(err) = Self::start_lane(hw, lane, &config) {
            if loaded {
                hw.remove_program(lane.engine, program, offset);
            }
            return Err(err);
        }
        registry.mark_bound(lane, role, offset);

        if loaded {
            info!(engine = lane.engine, lane = lane.lane, %offset, %role, "added program");
        } else {
            info!(engine = lane.engine, lane = lane.lane, %offset, %role, "reused program");
        }

        Ok(LaneHandle {
            lane,
            role,
            offset,
            pin,
            baud_rate,
        })
    }

    /// Stop a bound lane and return it to the free pool
    ///
    /// The role's program is removed from the engine once no lane uses it.
    pub fn release<H: PioHardware>(
        &self,
        registry: &mut LaneRegistry,
        hw: &mut H,
        handle: LaneHandle,
    ) -> Result<()> {
        self.release_lane(registry, hw, handle.lane, handle.role, handle.offset)
    }

    /// Release the lane bound to `role` at `offset`
    ///
    /// Fails with [`BusError::NotBound`], touching nothing, when the lane
    /// is free or now belongs to another binding.
    pub(crate) fn release_lane<H: PioHardware>(
        &self,
        registry: &mut LaneRegistry,
        hw: &mut H,
        lane: LaneId,
        role: Role,
        offset: ProgramOffset,
    ) -> Result<()> {
        registry.release(lane, role, offset)?;
        hw.unclaim_lane(lane);

        if registry.lanes_with_role(lane.engine, role) == 0 {
            if let Some(program) = self.programs.get(role) {
                hw.remove_program(lane.engine, program, offset);
                debug!(engine = lane.engine, %offset, %role, "removed program");
            }
        }
        debug!(engine = lane.engine, lane = lane.lane, %role, "released lane");
        Ok(())
    }

    fn start_lane<H: PioHardware>(hw: &mut H, lane: LaneId, config: &LaneConfig) -> Result<()> {
        if !hw.claim_lane(lane) {
            return Err(BusError::LaneUnavailable {
                engine: lane.engine,
                lane: lane.lane,
            });
        }
        if let Err(err) = hw.init_lane(lane, config) {
            hw.unclaim_lane(lane);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::Platform;
    use crate::hardware::Program;
    use crate::registry::LaneSlot;
    use crate::sim::SimulatedPio;
    use crate::spec::HIGH_SPEED;
    use proptest::prelude::*;
    use std::collections::HashSet;

    pub(crate) fn test_programs() -> ProgramSet {
        ProgramSet::new(
            Program::new(Role::Transmit, "arinc_tx", vec![0xE081; 10]),
            Program::new(Role::Receive, "arinc_rx", vec![0x2020; 8]),
        )
        .unwrap()
    }

    fn setup(platform: Platform) -> (ProgramLoader, LaneRegistry, SimulatedPio) {
        (
            ProgramLoader::new(test_programs()),
            LaneRegistry::new(platform),
            SimulatedPio::for_platform(platform),
        )
    }

    #[test]
    fn test_bind_loads_then_shares() -> Result<()> {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);

        let a = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 2, HIGH_SPEED)?;
        let b = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 4, HIGH_SPEED)?;

        assert_eq!(a.lane(), LaneId { engine: 0, lane: 0 });
        assert_eq!(b.lane(), LaneId { engine: 0, lane: 1 });
        assert_eq!(a.offset(), b.offset());
        // Program placed once
        assert_eq!(hw.used_instructions(0), 10);
        assert!(hw.is_claimed(b.lane()));
        Ok(())
    }

    #[test]
    fn test_different_roles_get_own_programs() -> Result<()> {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);

        let tx = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 2, HIGH_SPEED)?;
        let rx = loader.bind_role(&mut registry, &mut hw, Role::Receive, 3, HIGH_SPEED)?;

        assert_eq!(tx.engine(), rx.engine());
        assert_ne!(tx.offset(), rx.offset());
        assert_eq!(hw.used_instructions(0), 18);
        Ok(())
    }

    #[test]
    fn test_exhaustion_after_all_lanes() -> Result<()> {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        let mut seen = HashSet::new();
        for pin in 0..8 {
            let handle =
                loader.bind_role(&mut registry, &mut hw, Role::Transmit, pin, HIGH_SPEED)?;
            assert!(seen.insert(handle.lane()));
        }
        assert_eq!(
            loader.bind_role(&mut registry, &mut hw, Role::Transmit, 9, HIGH_SPEED),
            Err(BusError::ResourceExhausted)
        );
        // Each engine holds exactly one copy
        assert_eq!(hw.used_instructions(0), 10);
        assert_eq!(hw.used_instructions(1), 10);
        Ok(())
    }

    #[test]
    fn test_unsupported_role_leaves_state_untouched() {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        assert_eq!(
            loader.bind_role(&mut registry, &mut hw, Role::Other, 2, HIGH_SPEED),
            Err(BusError::UnsupportedRole(Role::Other))
        );
        assert_eq!(registry.free_lanes(), 8);
        assert_eq!(hw.used_instructions(0), 0);
    }

    #[test]
    fn test_invalid_baud_rate_rejected_before_load() {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        assert!(matches!(
            loader.bind_role(&mut registry, &mut hw, Role::Receive, 2, 0),
            Err(BusError::InvalidBaudRate(_))
        ));
        assert_eq!(registry.free_lanes(), 8);
        assert_eq!(hw.used_instructions(0), 0);
    }

    #[test]
    fn test_claim_failure_rolls_back_program() {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        // Lane taken behind the registry's back
        assert!(hw.claim_lane(LaneId { engine: 0, lane: 0 }));

        assert_eq!(
            loader.bind_role(&mut registry, &mut hw, Role::Transmit, 2, HIGH_SPEED),
            Err(BusError::LaneUnavailable { engine: 0, lane: 0 })
        );
        assert_eq!(registry.free_lanes(), 8);
        assert_eq!(hw.used_instructions(0), 0);
    }

    #[test]
    fn test_program_space_exhausted() {
        let big = ProgramSet::new(
            Program::new(Role::Transmit, "tx", vec![0; 20]),
            Program::new(Role::Receive, "rx", vec![0; 20]),
        )
        .unwrap();
        let loader = ProgramLoader::new(big);
        let mut registry = LaneRegistry::new(Platform::Rp2040);
        let mut hw = SimulatedPio::for_platform(Platform::Rp2040);

        loader
            .bind_role(&mut registry, &mut hw, Role::Transmit, 2, HIGH_SPEED)
            .unwrap();
        assert_eq!(
            loader.bind_role(&mut registry, &mut hw, Role::Receive, 3, HIGH_SPEED),
            Err(BusError::ProgramSpace {
                engine: 0,
                needed: 20
            })
        );
        assert_eq!(registry.free_lanes(), 7);
    }

    #[test]
    fn test_release_frees_lane_and_program() -> Result<()> {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        let a = loader.bind_role(&mut registry, &mut hw, Role::Receive, 2, HIGH_SPEED)?;
        let b = loader.bind_role(&mut registry, &mut hw, Role::Receive, 3, HIGH_SPEED)?;
        let a_lane = a.lane();

        loader.release(&mut registry, &mut hw, a)?;
        assert!(!hw.is_claimed(a_lane));
        assert_eq!(registry.find_free_lane(), Some(a_lane));
        // Still resident for b
        assert_eq!(hw.used_instructions(0), 8);

        let (b_lane, b_offset) = (b.lane(), b.offset());
        loader.release(&mut registry, &mut hw, b)?;
        assert_eq!(hw.used_instructions(0), 0);
        assert_eq!(
            loader.release_lane(&mut registry, &mut hw, b_lane, Role::Receive, b_offset),
            Err(BusError::NotBound { engine: 0, lane: 1 })
        );
        Ok(())
    }

    #[test]
    fn test_stale_release_leaves_new_owner_running() -> Result<()> {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        let tx = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 2, HIGH_SPEED)?;
        let (lane, tx_offset) = (tx.lane(), tx.offset());
        loader.release(&mut registry, &mut hw, tx)?;

        let rx = loader.bind_role(&mut registry, &mut hw, Role::Receive, 3, HIGH_SPEED)?;
        assert_eq!(rx.lane(), lane);

        assert_eq!(
            loader.release_lane(&mut registry, &mut hw, lane, Role::Transmit, tx_offset),
            Err(BusError::NotBound { engine: 0, lane: 0 })
        );
        assert_eq!(
            registry.lane(lane),
            Some(LaneSlot::Bound {
                role: Role::Receive,
                offset: rx.offset()
            })
        );
        assert!(hw.is_claimed(lane));
        assert_eq!(hw.used_instructions(0), 8);
        Ok(())
    }

    #[test]
    fn test_rebind_after_release_reuses_low_lane() -> Result<()> {
        let (loader, mut registry, mut hw) = setup(Platform::Rp2040);
        let a = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 2, HIGH_SPEED)?;
        let _b = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 3, HIGH_SPEED)?;
        let lane = a.lane();
        loader.release(&mut registry, &mut hw, a)?;

        let c = loader.bind_role(&mut registry, &mut hw, Role::Transmit, 4, HIGH_SPEED)?;
        assert_eq!(c.lane(), lane);
        Ok(())
    }

    proptest! {
        #[test]
        fn test_same_role_same_engine_shares_offset(
            roles in proptest::collection::vec(
                prop_oneof![Just(Role::Transmit), Just(Role::Receive)],
                1..12,
            )
        ) {
            let (loader, mut registry, mut hw) = setup(Platform::Rp2350);
            let mut handles = Vec::new();
            for (pin, role) in roles.iter().enumerate() {
                match loader.bind_role(&mut registry, &mut hw, *role, pin as u8, HIGH_SPEED) {
                    Ok(handle) => handles.push(handle),
                    Err(err) => prop_assert_eq!(err, BusError::ResourceExhausted),
                }
            }
            for a in &handles {
                for b in &handles {
                    if a.engine() == b.engine() && a.role() == b.role() {
                        prop_assert_eq!(a.offset(), b.offset());
                    }
                    if a != b {
                        prop_assert_ne!(a.lane(), b.lane());
                    }
                }
            }
        }
    }
}
