//! Lane registry: bookkeeping of which lanes are bound and to what

use crate::core::{LaneId, Platform, ProgramOffset, Role};
use crate::error::{BusError, Result};
use crate::spec;
use tracing::debug;

/// State of one lane
///
/// A free lane carries no offset; a bound lane always carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LaneSlot {
    /// Available for allocation
    #[default]
    Free,
    /// Running the program for `role` loaded at `offset`
    Bound {
        /// Role the lane serves
        role: Role,
        /// Load offset of the role's program in this engine
        offset: ProgramOffset,
    },
}

impl LaneSlot {
    /// Check if the lane is free
    pub fn is_free(&self) -> bool {
        matches!(self, LaneSlot::Free)
    }

    /// Role of a bound lane
    pub fn role(&self) -> Option<Role> {
        match self {
            LaneSlot::Free => None,
            LaneSlot::Bound { role, .. } => Some(*role),
        }
    }

    /// Program offset of a bound lane
    pub fn offset(&self) -> Option<ProgramOffset> {
        match self {
            LaneSlot::Free => None,
            LaneSlot::Bound { offset, .. } => Some(*offset),
        }
    }
}

/// Fixed table of lane states, indexed by engine then lane
///
/// Scans are always in engine order, then lane order, so allocation is
/// first-fit towards the lowest indices.
#[derive(Debug, Clone)]
pub struct LaneRegistry {
    engine_count: u8,
    slots: [[LaneSlot; spec::LANES_PER_ENGINE]; spec::MAX_ENGINES],
}

impl LaneRegistry {
    /// Create a registry with every lane of `platform` free
    pub fn new(platform: Platform) -> Self {
        LaneRegistry {
            engine_count: platform.engine_count(),
            slots: [[LaneSlot::Free; spec::LANES_PER_ENGINE]; spec::MAX_ENGINES],
        }
    }

    /// Number of engines tracked
    pub fn engine_count(&self) -> u8 {
        self.engine_count
    }

    /// Total number of lanes tracked
    pub fn capacity(&self) -> usize {
        self.engine_count as usize * spec::LANES_PER_ENGINE
    }

    /// Mark every lane free
    pub fn reset(&mut self) {
        for engine in self.slots.iter_mut() {
            engine.fill(LaneSlot::Free);
        }
        debug!(engines = self.engine_count, "lane registry reset");
    }

    /// First free lane in engine order, then lane order
    pub fn find_free_lane(&self) -> Option<LaneId> {
        self.ids().find(|id| self.slots[id.engine as usize][id.lane as usize].is_free())
    }

    /// Offset of the program for `role` if some lane of `engine` already runs it
    pub fn find_resident_program(&self, engine: u8, role: Role) -> Option<ProgramOffset> {
        if engine >= self.engine_count {
            return None;
        }
        self.slots[engine as usize]
            .iter()
            .find_map(|slot| match slot {
                LaneSlot::Bound { role: r, offset } if *r == role => Some(*offset),
                _ => None,
            })
    }

    /// Record `lane` as bound to `role` at `offset`
    ///
    /// The lane must be free, as returned by [`find_free_lane`](Self::find_free_lane).
    pub fn mark_bound(&mut self, lane: LaneId, role: Role, offset: ProgramOffset) {
        if let Some(slot) = self.slot_mut(lane) {
            debug_assert!(slot.is_free(), "{} bound twice", lane);
            *slot = LaneSlot::Bound { role, offset };
        }
    }

    /// Return a bound lane to the free pool
    ///
    /// The slot is freed only while it still holds `role` at `offset`, so
    /// a record of an earlier binding cannot free the lane's next owner.
    pub fn release(&mut self, lane: LaneId, role: Role, offset: ProgramOffset) -> Result<()> {
        let slot = self.slot_mut(lane).ok_or(BusError::InvalidLane {
            engine: lane.engine,
            lane: lane.lane,
        })?;
        if *slot != (LaneSlot::Bound { role, offset }) {
            return Err(BusError::NotBound {
                engine: lane.engine,
                lane: lane.lane,
            });
        }
        *slot = LaneSlot::Free;
        Ok(())
    }

    /// State of one lane
    pub fn lane(&self, lane: LaneId) -> Option<LaneSlot> {
        if lane.engine >= self.engine_count {
            return None;
        }
        self.slots[lane.engine as usize].get(lane.lane as usize).copied()
    }

    /// Number of free lanes
    pub fn free_lanes(&self) -> usize {
        self.ids()
            .filter(|id| self.slots[id.engine as usize][id.lane as usize].is_free())
            .count()
    }

    /// Number of lanes in `engine` bound to `role`
    pub fn lanes_with_role(&self, engine: u8, role: Role) -> usize {
        if engine >= self.engine_count {
            return 0;
        }
        self.slots[engine as usize]
            .iter()
            .filter(|slot| slot.role() == Some(role))
            .count()
    }

    /// Every bound lane with its role and offset
    pub fn bound_lanes(&self) -> Vec<(LaneId, Role, ProgramOffset)> {
        self.ids()
            .filter_map(|id| match self.slots[id.engine as usize][id.lane as usize] {
                LaneSlot::Bound { role, offset } => Some((id, role, offset)),
                LaneSlot::Free => None,
            })
            .collect()
    }

    /// Copy of the whole table
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            engines: self.engine_count,
            lanes: self
                .ids()
                .map(|id| (id, self.slots[id.engine as usize][id.lane as usize]))
                .collect(),
        }
    }

    fn ids(&self) -> impl Iterator<Item = LaneId> {
        let lanes = spec::LANES_PER_ENGINE as u8;
        (0..self.engine_count)
            .flat_map(move |engine| (0..lanes).map(move |lane| LaneId { engine, lane }))
    }

    fn slot_mut(&mut self, lane: LaneId) -> Option<&mut LaneSlot> {
        if lane.engine >= self.engine_count {
            return None;
        }
        self.slots[lane.engine as usize].get_mut(lane.lane as usize)
    }
}

/// Point-in-time copy of a registry
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistrySnapshot {
    /// Number of engines
    pub engines: u8,
    /// Every lane in scan order
    pub lanes: Vec<(LaneId, LaneSlot)>,
}

#[cfg(feature = "serde")]
impl RegistrySnapshot {
    /// Render the snapshot as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
