//! Event types consumed by the point aggregator.

use crate::channel::ChannelAddress;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of process classes, including the derived total in class 0.
pub const N_PROCESS_CLASSES: usize = 6;

/// Emission point of a simulated light source.
///
/// Equality is exact on all three components. Events at the same point are
/// expected to carry bit-identical coordinates copied from the generator,
/// never recomputed values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Coordinate {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Coordinate {
    #[inline]
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Coordinate {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Coordinate> for [f32; 3] {
    fn from(c: Coordinate) -> Self {
        [c.x, c.y, c.z]
    }
}

/// Physical mechanism by which a detected photon was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessClass {
    /// Total hits. Derived from the raw hit count, never counted independently.
    Total = 0,
    Scintillation = 1,
    Cherenkov = 2,
    /// Photon re-emitted by a wavelength-shifting surface.
    WavelengthShifted = 3,
    /// Photon reaching the sensor without re-emission.
    Direct = 4,
    Other = 5,
}

impl TryFrom<u8> for ProcessClass {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Total),
            1 => Ok(Self::Scintillation),
            2 => Ok(Self::Cherenkov),
            3 => Ok(Self::WavelengthShifted),
            4 => Ok(Self::Direct),
            5 => Ok(Self::Other),
            other => Err(Error::InvalidProcessClass(other)),
        }
    }
}

/// Per-process hit counts of one SiPM in one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCounts([u32; N_PROCESS_CLASSES]);

impl ProcessCounts {
    /// Builds counts from the raw hit total and a per-process breakdown.
    ///
    /// Breakdown entries for class 0 are ignored: the total always comes
    /// from `n_hits`. Repeated classes are summed.
    ///
    /// # Errors
    /// Returns [`Error::InvalidProcessClass`] for classes outside `0..6`.
    pub fn from_breakdown<I>(n_hits: u32, breakdown: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u8, u32)>,
    {
        let mut counts = [0u32; N_PROCESS_CLASSES];
        for (class, count) in breakdown {
            let class = ProcessClass::try_from(class)?;
            if class != ProcessClass::Total {
                let slot = &mut counts[class as usize];
                *slot = slot.saturating_add(count);
            }
        }
        counts[ProcessClass::Total as usize] = n_hits;
        Ok(Self(counts))
    }

    /// Total hit count (class 0).
    #[inline]
    #[must_use]
    pub fn total(&self) -> u32 {
        self.0[ProcessClass::Total as usize]
    }

    /// Count for one class.
    #[inline]
    #[must_use]
    pub fn get(&self, class: ProcessClass) -> u32 {
        self.0[class as usize]
    }
}

/// Hit counts of one SiPM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorHit {
    pub address: ChannelAddress,
    pub counts: ProcessCounts,
}

/// One simulated event at one emission point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitEvent {
    pub point: Coordinate,
    pub hits: Vec<SensorHit>,
}

impl HitEvent {
    #[must_use]
    pub fn new(point: Coordinate) -> Self {
        Self {
            point,
            hits: Vec::new(),
        }
    }

    /// Appends one SiPM's counts.
    pub fn push(&mut self, address: ChannelAddress, counts: ProcessCounts) {
        self.hits.push(SensorHit { address, counts });
    }
}
