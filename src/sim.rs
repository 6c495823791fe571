//! In-memory model of programmable I/O engines
//!
//! `SimulatedPio` keeps per-engine instruction memory and per-lane FIFOs,
//! and carries transmitted words across configurable pin wiring to receive
//! lanes running at a matching bit rate. Program placement follows the
//! hardware allocator: the highest free range that fits.

use crate::core::{LaneId, Platform, ProgramOffset, Role};
use crate::error::{BusError, Result};
use crate::hardware::{ClockDivider, LaneConfig, PioHardware, Program};
use crate::spec;
use std::collections::VecDeque;

/// Relative bit-rate mismatch a receiver tolerates
const BIT_RATE_TOLERANCE: f64 = 0.01;

/// Settings for a simulated chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Chip model, fixing the engine count
    pub platform: Platform,
    /// System clock in Hz
    pub system_clock_hz: u32,
    /// Depth of each lane's input and output FIFO
    pub fifo_depth: usize,
    /// Instruction slots per engine
    pub instruction_memory: usize,
    /// Shift one word per transmit lane on every busy-wait spin
    pub free_running: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            platform: Platform::Rp2040,
            system_clock_hz: spec::DEFAULT_SYSTEM_CLOCK_HZ,
            fifo_depth: spec::FIFO_DEPTH,
            instruction_memory: spec::INSTRUCTION_MEMORY,
            free_running: true,
        }
    }
}

/// Counters kept by the simulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Words shifted out by transmit lanes
    pub shifted: u64,
    /// Words that reached a receive FIFO
    pub delivered: u64,
    /// Words written to a full output FIFO
    pub tx_overflows: u64,
    /// Words lost to a full input FIFO
    pub rx_overruns: u64,
}

#[derive(Debug, Clone, Default)]
struct SimLane {
    claimed: bool,
    config: Option<LaneConfig>,
    tx_fifo: VecDeque<u32>,
    rx_fifo: VecDeque<u32>,
}

#[derive(Debug, Clone)]
struct SimEngine {
    used: Vec<bool>,
    lanes: [SimLane; spec::LANES_PER_ENGINE],
}

/// Simulated programmable I/O block set
#[derive(Debug, Clone)]
pub struct SimulatedPio {
    config: SimConfig,
    engines: Vec<SimEngine>,
    wires: Vec<(u8, u8)>,
    stats: SimStats,
}

impl SimulatedPio {
    /// Create a simulator with the given settings
    pub fn new(config: SimConfig) -> Self {
        let engines = (0..config.platform.engine_count())
            .map(|_| SimEngine {
                used: vec![false; config.instruction_memory],
                lanes: Default::default(),
            })
            .collect();
        SimulatedPio {
            config,
            engines,
            wires: Vec::new(),
            stats: SimStats::default(),
        }
    }

    /// Create a default simulator for `platform`
    pub fn for_platform(platform: Platform) -> Self {
        Self::new(SimConfig {
            platform,
            ..SimConfig::default()
        })
    }

    /// Simulator settings
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Counters since creation
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Connect output pin `from` to input pin `to`
    pub fn wire(&mut self, from: u8, to: u8) {
        if !self.wires.contains(&(from, to)) {
            self.wires.push((from, to));
        }
    }

    /// Loop a pin back onto itself
    pub fn loopback(&mut self, pin: u8) {
        self.wire(pin, pin);
    }

    /// Instruction slots in use in `engine`
    pub fn used_instructions(&self, engine: u8) -> usize {
        self.engines
            .get(engine as usize)
            .map(|e| e.used.iter().filter(|u| **u).count())
            .unwrap_or(0)
    }

    /// True if the lane is claimed
    pub fn is_claimed(&self, lane: LaneId) -> bool {
        self.lane(lane).is_some_and(|l| l.claimed)
    }

    /// Configuration the lane was started with
    pub fn lane_config(&self, lane: LaneId) -> Option<LaneConfig> {
        self.lane(lane).and_then(|l| l.config)
    }

    /// Words waiting in the lane's output FIFO
    pub fn tx_fifo_level(&self, lane: LaneId) -> usize {
        self.lane(lane).map(|l| l.tx_fifo.len()).unwrap_or(0)
    }

    /// Place a word in a receive lane's input FIFO as if it arrived on the wire
    ///
    /// Returns false when the FIFO is full or the lane is not receiving.
    pub fn inject(&mut self, lane: LaneId, word: u32) -> bool {
        let depth = self.config.fifo_depth;
        match self.lane_mut(lane) {
            Some(l) if matches!(l.config, Some(c) if c.role == Role::Receive) => {
                if l.rx_fifo.len() < depth {
                    l.rx_fifo.push_back(word);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Shift one word out of every transmit lane that has one
    ///
    /// Returns the number of words shifted.
    pub fn step(&mut self) -> usize {
        let mut outgoing = Vec::new();
        for engine in &mut self.engines {
            for lane in &mut engine.lanes {
                let Some(config) = lane.config else { continue };
                if config.role != Role::Transmit {
                    continue;
                }
                if let Some(word) = lane.tx_fifo.pop_front() {
                    outgoing.push((config, word));
                }
            }
        }
        for (config, word) in &outgoing {
            self.stats.shifted += 1;
            self.deliver(config, *word);
        }
        outgoing.len()
    }

    /// Step until every output FIFO is empty
    pub fn drain(&mut self) -> usize {
        let mut total = 0;
        loop {
            let shifted = self.step();
            if shifted == 0 {
                return total;
            }
            total += shifted;
        }
    }

    fn deliver(&mut self, from: &LaneConfig, word: u32) {
        let clock = self.config.system_clock_hz;
        let depth = self.config.fifo_depth;
        let tx_rate = from.divider.bit_rate(clock, Role::Transmit.oversampling());
        let targets: Vec<u8> = self
            .wires
            .iter()
            .filter(|(src, _)| *src == from.pin)
            .map(|(_, dst)| *dst)
            .collect();

        for engine in &mut self.engines {
            for lane in &mut engine.lanes {
                let Some(config) = lane.config else { continue };
                if config.role != Role::Receive || !targets.contains(&config.pin) {
                    continue;
                }
                let rx_rate = config.divider.bit_rate(clock, Role::Receive.oversampling());
                if ((rx_rate - tx_rate) / tx_rate).abs() > BIT_RATE_TOLERANCE {
                    continue;
                }
                if lane.rx_fifo.len() < depth {
                    lane.rx_fifo.push_back(word);
                    self.stats.delivered += 1;
                } else {
                    self.stats.rx_overruns += 1;
                }
            }
        }
    }

    fn lane(&self, id: LaneId) -> Option<&SimLane> {
        self.engines
            .get(id.engine as usize)
            .and_then(|e| e.lanes.get(id.lane as usize))
    }

    fn lane_mut(&mut self, id: LaneId) -> Option<&mut SimLane> {
        self.engines
            .get_mut(id.engine as usize)
            .and_then(|e| e.lanes.get_mut(id.lane as usize))
    }
}

impl Default for SimulatedPio {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl PioHardware for SimulatedPio {
    fn system_clock_hz(&self) -> u32 {
        self.config.system_clock_hz
    }

    fn engine_count(&self) -> u8 {
        self.engines.len() as u8
    }

    fn add_program(&mut self, engine: u8, program: &Program) -> Result<ProgramOffset> {
        let memory = self
            .engines
            .get_mut(engine as usize)
            .ok_or(BusError::InvalidEngine(engine))?;
        let len = program.len();
        let size = memory.used.len();
        if len == 0 || len > size {
            return Err(BusError::ProgramSpace {
                engine,
                needed: len,
            });
        }
        let offset = (0..=size - len)
            .rev()
            .find(|&start| memory.used[start..start + len].iter().all(|u| !u))
            .ok_or(BusError::ProgramSpace {
                engine,
                needed: len,
            })?;
        memory.used[offset..offset + len]
            .iter_mut()
            .for_each(|u| *u = true);
        Ok(ProgramOffset::new(offset as u8))
    }

    fn remove_program(&mut self, engine: u8, program: &Program, offset: ProgramOffset) {
        if let Some(memory) = self.engines.get_mut(engine as usize) {
            let start = offset.value() as usize;
            let end = (start + program.len()).min(memory.used.len());
            if start < end {
                memory.used[start..end].iter_mut().for_each(|u| *u = false);
            }
        }
    }

    fn claim_lane(&mut self, lane: LaneId) -> bool {
        match self.lane_mut(lane) {
            Some(l) if !l.claimed => {
                l.claimed = true;
                true
            }
            _ => false,
        }
    }

    fn unclaim_lane(&mut self, lane: LaneId) {
        if let Some(l) = self.lane_mut(lane) {
            *l = SimLane::default();
        }
    }

    fn init_lane(&mut self, lane: LaneId, config: &LaneConfig) -> Result<()> {
        if lane.engine as usize >= self.engines.len() {
            return Err(BusError::InvalidEngine(lane.engine));
        }
        let l = self.lane_mut(lane).ok_or(BusError::InvalidLane {
            engine: lane.engine,
            lane: lane.lane,
        })?;
        if !l.claimed {
            return Err(BusError::LaneUnavailable {
                engine: lane.engine,
                lane: lane.lane,
            });
        }
        l.config = Some(*config);
        l.tx_fifo.clear();
        l.rx_fifo.clear();
        Ok(())
    }

    fn set_clock_divider(&mut self, lane: LaneId, divider: ClockDivider) {
        if let Some(config) = self.lane_mut(lane).and_then(|l| l.config.as_mut()) {
            config.divider = divider;
        }
    }

    fn is_tx_fifo_full(&self, lane: LaneId) -> bool {
        self.lane(lane)
            .map(|l| l.tx_fifo.len() >= self.config.fifo_depth)
            .unwrap_or(true)
    }

    fn put(&mut self, lane: LaneId, word: u32) {
        let depth = self.config.fifo_depth;
        let accepted = match self.lane_mut(lane) {
            Some(l) if l.tx_fifo.len() < depth => {
                l.tx_fifo.push_back(word);
                true
            }
            _ => false,
        };
        if !accepted {
            self.stats.tx_overflows += 1;
        }
    }

    fn rx_fifo_level(&self, lane: LaneId) -> usize {
        self.lane(lane).map(|l| l.rx_fifo.len()).unwrap_or(0)
    }

    fn get(&mut self, lane: LaneId) -> Option<u32> {
        self.lane_mut(lane).and_then(|l| l.rx_fifo.pop_front())
    }

    fn idle(&mut self) {
        if self.config.free_running {
            self.step();
        }
    }
}
