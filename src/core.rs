//! Core types for ARINC-429 over programmable I/O engines

use crate::encoding::OddParity;
use crate::error::{BusError, Result};
use crate::spec;
use bitfield::bitfield;

/// Target microcontroller, which fixes the number of engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Platform {
    /// Two engines
    #[default]
    Rp2040,
    /// Three engines
    Rp2350,
}

impl Platform {
    /// Number of engines on this platform
    pub fn engine_count(&self) -> u8 {
        match self {
            Platform::Rp2040 => 2,
            Platform::Rp2350 => 3,
        }
    }

    /// Total number of allocatable lanes
    pub fn lane_count(&self) -> usize {
        self.engine_count() as usize * spec::LANES_PER_ENGINE
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Rp2040 => write!(f, "RP2040"),
            Platform::Rp2350 => write!(f, "RP2350"),
        }
    }
}

/// Logical function a lane is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// ARINC-429 transmitter
    Transmit,
    /// ARINC-429 receiver
    Receive,
    /// Reserved for programs this crate does not manage
    Other,
}

impl Role {
    /// Clock cycles per bit the role's program expects
    pub fn oversampling(&self) -> u32 {
        match self {
            Role::Transmit => spec::TX_OVERSAMPLING,
            Role::Receive => spec::RX_OVERSAMPLING,
            Role::Other => 1,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Transmit => write!(f, "Transmit"),
            Role::Receive => write!(f, "Receive"),
            Role::Other => write!(f, "Other"),
        }
    }
}

/// Position of one lane: engine index and lane index within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneId {
    /// Engine index
    pub engine: u8,
    /// Lane index within the engine
    pub lane: u8,
}

impl LaneId {
    /// Create a lane id, checking both indices against the largest platform
    ///
    /// Engine 2 passes even though an RP2040 has only two engines; use
    /// [`LaneId::for_platform`] to check against a specific chip.
    pub fn new(engine: u8, lane: u8) -> Result<Self> {
        if engine as usize >= spec::MAX_ENGINES {
            return Err(BusError::InvalidEngine(engine));
        }
        if lane as usize >= spec::LANES_PER_ENGINE {
            return Err(BusError::InvalidLane { engine, lane });
        }
        Ok(LaneId { engine, lane })
    }

    /// Create a lane id that exists on `platform`
    pub fn for_platform(platform: Platform, engine: u8, lane: u8) -> Result<Self> {
        if engine >= platform.engine_count() {
            return Err(BusError::InvalidEngine(engine));
        }
        Self::new(engine, lane)
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PIO[{}] SM[{}]", self.engine, self.lane)
    }
}

/// Load address of a program inside an engine's instruction memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramOffset(u8);

impl ProgramOffset {
    /// Wrap a raw offset
    pub fn new(offset: u8) -> Self {
        ProgramOffset(offset)
    }

    /// Get the raw offset
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for ProgramOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitfield! {
    /// Conventional ARINC-429 field layout of a word
    ///
    /// Bits 7-0 label, 9-8 SDI, 28-10 data, 30-29 SSM, 31 parity.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct WordFields(u32);
    impl Debug;
    pub u8, label, set_label: 7, 0;
    pub u8, sdi, set_sdi: 9, 8;
    pub u32, data, set_data: 28, 10;
    pub u8, ssm, set_ssm: 30, 29;
    pub parity, set_parity: 31;
}

/// A 32-bit ARINC-429 word
///
/// Only the parity bit has meaning here: the population count of a valid
/// word is odd. Label, SDI, data and SSM are exposed as a view for callers
/// that interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Word(u32);

impl Word {
    /// Create a word, rejecting even parity
    pub fn new(raw: u32) -> Result<Self> {
        if !OddParity::is_valid(raw) {
            return Err(BusError::parity_error(format!(
                "word 0x{:08X} has {} set bits",
                raw,
                raw.count_ones()
            )));
        }
        Ok(Word(raw))
    }

    /// Create a word without parity validation
    pub fn new_unchecked(raw: u32) -> Self {
        Word(raw)
    }

    /// Create a word from arbitrary bits, fixing bit 31 for odd parity
    pub fn with_odd_parity(raw: u32) -> Self {
        Word(OddParity::apply(raw))
    }

    /// Get the raw 32-bit value
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Check odd parity
    pub fn has_odd_parity(&self) -> bool {
        OddParity::is_valid(self.0)
    }

    /// Field view of this word
    pub fn fields(&self) -> WordFields {
        WordFields(self.0)
    }

    /// Label (bits 7-0)
    pub fn label(&self) -> u8 {
        self.fields().label()
    }

    /// Source/destination identifier (bits 9-8)
    pub fn sdi(&self) -> u8 {
        self.fields().sdi()
    }

    /// Data field (bits 28-10)
    pub fn data(&self) -> u32 {
        self.fields().data()
    }

    /// Sign/status matrix (bits 30-29)
    pub fn ssm(&self) -> u8 {
        self.fields().ssm()
    }

    /// Parity bit (bit 31)
    pub fn parity_bit(&self) -> bool {
        self.fields().parity()
    }
}

impl From<Word> for u32 {
    fn from(word: Word) -> u32 {
        word.0
    }
}

impl From<WordFields> for Word {
    fn from(fields: WordFields) -> Word {
        Word(fields.0)
    }
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_engines() {
        assert_eq!(Platform::Rp2040.engine_count(), 2);
        assert_eq!(Platform::Rp2350.engine_count(), 3);
        assert_eq!(Platform::Rp2350.lane_count(), 12);
        assert_eq!(Platform::default(), Platform::Rp2040);
    }

    #[test]
    fn test_lane_id_creation() {
        assert!(LaneId::new(0, 0).is_ok());
        assert!(LaneId::new(2, 3).is_ok());
        assert_eq!(LaneId::new(3, 0), Err(BusError::InvalidEngine(3)));
        assert!(LaneId::new(0, 4).is_err());
    }

    #[test]
    fn test_lane_id_for_platform() {
        assert_eq!(
            LaneId::for_platform(Platform::Rp2040, 2, 0),
            Err(BusError::InvalidEngine(2))
        );
        assert_eq!(
            LaneId::for_platform(Platform::Rp2350, 2, 3),
            Ok(LaneId { engine: 2, lane: 3 })
        );
        assert_eq!(
            LaneId::for_platform(Platform::Rp2040, 1, 4),
            Err(BusError::InvalidLane { engine: 1, lane: 4 })
        );
    }

    #[test]
    fn test_word_parity_validation() {
        assert!(Word::new(0x0000_0001).is_ok());
        assert!(Word::new(0x8000_0000).is_ok());
        assert!(Word::new(0x0000_0003).is_err());
        assert!(Word::new(0).is_err());
    }

    #[test]
    fn test_word_with_odd_parity() {
        let word = Word::with_odd_parity(0x0000_0003);
        assert_eq!(word.raw(), 0x8000_0003);
        assert!(word.has_odd_parity());

        let word = Word::with_odd_parity(0x0000_0007);
        assert_eq!(word.raw(), 0x0000_0007);
    }

    #[test]
    fn test_word_fields() {
        let mut fields = WordFields(0);
        fields.set_label(0o203);
        fields.set_sdi(2);
        fields.set_data(0x4_1234);
        fields.set_ssm(3);
        let word = Word::from(fields);

        assert_eq!(word.label(), 0o203);
        assert_eq!(word.sdi(), 2);
        assert_eq!(word.data(), 0x4_1234);
        assert_eq!(word.ssm(), 3);
        assert!(!word.parity_bit());
    }

    #[test]
    fn test_display() {
        assert_eq!(Role::Receive.to_string(), "Receive");
        assert_eq!(LaneId { engine: 1, lane: 2 }.to_string(), "PIO[1] SM[2]");
        assert_eq!(Word::new_unchecked(0xAB).to_string(), "0x000000AB");
    }
}
