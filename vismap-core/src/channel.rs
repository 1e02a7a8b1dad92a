//! Detector-channel index mapping.
//!
//! Each photon-detection region is a fixed megatile → tile → SiPM hierarchy.
//! The mapper flattens a hierarchical address into a position in the
//! region's per-tile and per-sensor arrays:
//!
//! ```text
//! tile_index   = tile + N_TILE * megatile
//! sensor_index = sensor + N_SENSOR * (tile + N_TILE * megatile)
//! ```
//!
//! Coordinates are bounds-checked before use, so no two valid addresses
//! share a slot.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of detection regions.
pub const N_REGIONS: usize = 3;

/// One of the detector's sensor-panel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// The main anode readout plane (2 × 30 × 160).
    Main,
    /// First lateral panel (1 × 10 × 60).
    Edge0,
    /// Second lateral panel (1 × 10 × 60).
    Edge1,
}

impl Region {
    /// All regions in output order.
    pub const ALL: [Region; N_REGIONS] = [Region::Main, Region::Edge0, Region::Edge1];

    /// Number of megatiles in the region.
    #[inline]
    #[must_use]
    pub const fn n_megatiles(self) -> u32 {
        match self {
            Region::Main => 2,
            Region::Edge0 | Region::Edge1 => 1,
        }
    }

    /// Number of tiles per megatile.
    #[inline]
    #[must_use]
    pub const fn tiles_per_megatile(self) -> u32 {
        match self {
            Region::Main => 30,
            Region::Edge0 | Region::Edge1 => 10,
        }
    }

    /// Number of SiPMs per tile.
    #[inline]
    #[must_use]
    pub const fn sensors_per_tile(self) -> u32 {
        match self {
            Region::Main => 160,
            Region::Edge0 | Region::Edge1 => 60,
        }
    }

    /// Total tiles in the region.
    #[inline]
    #[must_use]
    pub const fn n_tiles(self) -> usize {
        (self.n_megatiles() * self.tiles_per_megatile()) as usize
    }

    /// Total SiPMs in the region.
    #[inline]
    #[must_use]
    pub const fn n_sensors(self) -> usize {
        self.n_tiles() * self.sensors_per_tile() as usize
    }

    /// Suffix used in output field names.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Region::Main => "main",
            Region::Edge0 => "edge0",
            Region::Edge1 => "edge1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Level of the channel hierarchy, used in range errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Megatile,
    Tile,
    Sensor,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Megatile => "megatile",
            Level::Tile => "tile",
            Level::Sensor => "sensor",
        })
    }
}

/// A hierarchical SiPM address inside one region.
///
/// Only constructible through validation, so the flat indices derived from
/// it are always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    region: Region,
    megatile: u32,
    tile: u32,
    sensor: u32,
}

impl ChannelAddress {
    /// Creates a validated address.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if any level exceeds the region's
    /// cardinality.
    pub fn new(region: Region, megatile: u32, tile: u32, sensor: u32) -> Result<Self> {
        Self::from_signed(
            region,
            i64::from(megatile),
            i64::from(tile),
            i64::from(sensor),
        )
    }

    /// Creates a validated address from signed coordinates, as found in
    /// external inputs. Negative values are out of range.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if any level is negative or exceeds
    /// the region's cardinality.
    pub fn from_signed(region: Region, megatile: i64, tile: i64, sensor: i64) -> Result<Self> {
        Ok(Self {
            region,
            megatile: check(region, Level::Megatile, megatile, region.n_megatiles())?,
            tile: check(region, Level::Tile, tile, region.tiles_per_megatile())?,
            sensor: check(region, Level::Sensor, sensor, region.sensors_per_tile())?,
        })
    }

    #[inline]
    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    #[inline]
    #[must_use]
    pub fn megatile(&self) -> u32 {
        self.megatile
    }

    #[inline]
    #[must_use]
    pub fn tile(&self) -> u32 {
        self.tile
    }

    #[inline]
    #[must_use]
    pub fn sensor(&self) -> u32 {
        self.sensor
    }

    /// Flat tile index of this address.
    #[inline]
    #[must_use]
    pub fn tile_index(&self) -> usize {
        (self.tile + self.region.tiles_per_megatile() * self.megatile) as usize
    }

    /// Flat sensor index of this address.
    #[inline]
    #[must_use]
    pub fn sensor_index(&self) -> usize {
        let tile = self.tile + self.region.tiles_per_megatile() * self.megatile;
        (self.sensor + self.region.sensors_per_tile() * tile) as usize
    }
}

fn check(region: Region, level: Level, index: i64, limit: u32) -> Result<u32> {
    match u32::try_from(index) {
        Ok(index) if index < limit => Ok(index),
        _ => Err(Error::IndexOutOfRange {
            region,
            level,
            index,
            limit,
        }),
    }
}

/// Flat tile index for `(megatile, tile)` in `region`.
///
/// # Errors
/// Returns [`Error::IndexOutOfRange`] if either coordinate exceeds its cardinality.
pub fn tile_index(region: Region, megatile: u32, tile: u32) -> Result<usize> {
    check(region, Level::Megatile, i64::from(megatile), region.n_megatiles())?;
    check(region, Level::Tile, i64::from(tile), region.tiles_per_megatile())?;
    Ok((tile + region.tiles_per_megatile() * megatile) as usize)
}

/// Flat sensor index for `(megatile, tile, sensor)` in `region`.
///
/// # Errors
/// Returns [`Error::IndexOutOfRange`] if any coordinate exceeds its cardinality.
pub fn sensor_index(region: Region, megatile: u32, tile: u32, sensor: u32) -> Result<usize> {
    ChannelAddress::new(region, megatile, tile, sensor).map(|addr| addr.sensor_index())
}

/// Recovers the hierarchical address of a flat sensor index.
///
/// # Errors
/// Returns [`Error::IndexOutOfRange`] if `flat` is not below the region's sensor count.
#[allow(clippy::cast_possible_truncation)]
pub fn decode_sensor_index(region: Region, flat: usize) -> Result<ChannelAddress> {
    if flat >= region.n_sensors() {
        return Err(Error::IndexOutOfRange {
            region,
            level: Level::Sensor,
            index: i64::try_from(flat).unwrap_or(i64::MAX),
            limit: region.n_sensors() as u32,
        });
    }
    let flat = flat as u32;
    let sensor = flat % region.sensors_per_tile();
    let tile_flat = flat / region.sensors_per_tile();
    let tile = tile_flat % region.tiles_per_megatile();
    let megatile = tile_flat / region.tiles_per_megatile();
    Ok(ChannelAddress {
        region,
        megatile,
        tile,
        sensor,
    })
}

/// Mapping from detector-side anode identifiers to regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnodeMap {
    /// Anode identifier of the main plane.
    pub main: i32,
    /// Anode identifier of the first lateral panel.
    pub edge0: i32,
    /// Anode identifier of the second lateral panel.
    pub edge1: i32,
    /// Anodes that carry no tiles of interest and are skipped.
    pub ignored: Vec<i32>,
}

impl Default for AnodeMap {
    fn default() -> Self {
        Self {
            main: 11,
            edge0: 12,
            edge1: 13,
            ignored: vec![10],
        }
    }
}

impl AnodeMap {
    /// Resolves an anode identifier.
    ///
    /// Returns `Ok(None)` for ignored anodes.
    ///
    /// # Errors
    /// Returns [`Error::UnknownAnode`] for any identifier that is neither
    /// mapped nor ignored.
    pub fn region(&self, anode_id: i32) -> Result<Option<Region>> {
        if anode_id == self.main {
            Ok(Some(Region::Main))
        } else if anode_id == self.edge0 {
            Ok(Some(Region::Edge0))
        } else if anode_id == self.edge1 {
            Ok(Some(Region::Edge1))
        } else if self.ignored.contains(&anode_id) {
            Ok(None)
        } else {
            Err(Error::UnknownAnode(anode_id))
        }
    }

    /// Checks that the three region identifiers are distinct and not ignored.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] describing the clash.
    pub fn validate(&self) -> Result<()> {
        let ids = [self.main, self.edge0, self.edge1];
        for (i, a) in ids.iter().enumerate() {
            if ids[i + 1..].contains(a) {
                return Err(Error::ConfigError(format!(
                    "anode identifier {a} assigned to more than one region"
                )));
            }
            if self.ignored.contains(a) {
                return Err(Error::ConfigError(format!(
                    "anode identifier {a} is both mapped and ignored"
                )));
            }
        }
        Ok(())
    }
}

/// One value per region, addressed by [`Region`] rather than position.
#[derive(Debug, Clone, PartialEq)]
pub struct PerRegion<T> {
    pub main: T,
    pub edge0: T,
    pub edge1: T,
}

impl<T> PerRegion<T> {
    /// Builds each region's value from the region tag.
    pub fn from_fn(mut f: impl FnMut(Region) -> T) -> Self {
        Self {
            main: f(Region::Main),
            edge0: f(Region::Edge0),
            edge1: f(Region::Edge1),
        }
    }

    #[inline]
    pub fn get(&self, region: Region) -> &T {
        match region {
            Region::Main => &self.main,
            Region::Edge0 => &self.edge0,
            Region::Edge1 => &self.edge1,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, region: Region) -> &mut T {
        match region {
            Region::Main => &mut self.main,
            Region::Edge0 => &mut self.edge0,
            Region::Edge1 => &mut self.edge1,
        }
    }

    /// Iterates `(region, value)` in output order.
    pub fn iter(&self) -> impl Iterator<Item = (Region, &T)> {
        Region::ALL.into_iter().map(move |r| (r, self.get(r)))
    }

    /// Applies `f` to every region's value.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(Region, &mut T)) {
        f(Region::Main, &mut self.main);
        f(Region::Edge0, &mut self.edge0);
        f(Region::Edge1, &mut self.edge1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_region_cardinalities() {
        assert_eq!(Region::Main.n_sensors(), 9600);
        assert_eq!(Region::Main.n_tiles(), 60);
        assert_eq!(Region::Edge0.n_sensors(), 600);
        assert_eq!(Region::Edge0.n_tiles(), 10);
        assert_eq!(Region::Edge1.n_sensors(), 600);
        assert_eq!(Region::Edge1.n_tiles(), 10);
    }

    #[test]
    fn test_sensor_index_is_bijective() {
        for region in Region::ALL {
            let mut seen = HashSet::with_capacity(region.n_sensors());
            for mt in 0..region.n_megatiles() {
                for t in 0..region.tiles_per_megatile() {
                    for s in 0..region.sensors_per_tile() {
                        let flat = sensor_index(region, mt, t, s).unwrap();
                        assert!(flat < region.n_sensors());
                        assert!(seen.insert(flat), "{region}: {flat} aliased");

                        let addr = decode_sensor_index(region, flat).unwrap();
                        assert_eq!((addr.megatile(), addr.tile(), addr.sensor()), (mt, t, s));
                    }
                }
            }
            assert_eq!(seen.len(), region.n_sensors());
        }
    }

    #[test]
    fn test_tile_index_layout() {
        assert_eq!(tile_index(Region::Main, 0, 0).unwrap(), 0);
        assert_eq!(tile_index(Region::Main, 1, 0).unwrap(), 30);
        assert_eq!(tile_index(Region::Main, 1, 29).unwrap(), 59);
        assert_eq!(tile_index(Region::Edge1, 0, 9).unwrap(), 9);
    }

    #[test]
    fn test_sensor_index_known_values() {
        // 5 + 160 * (3 + 30 * 1)
        assert_eq!(sensor_index(Region::Main, 1, 3, 5).unwrap(), 5285);
        // 59 + 60 * 9
        assert_eq!(sensor_index(Region::Edge0, 0, 9, 59).unwrap(), 599);
    }

    #[test]
    fn test_negative_coordinate_rejected() {
        let err = ChannelAddress::from_signed(Region::Edge0, 0, -1, 3).unwrap_err();
        assert_eq!(
            err,
            Error::IndexOutOfRange {
                region: Region::Edge0,
                level: Level::Tile,
                index: -1,
                limit: 10,
            }
        );
        let addr = ChannelAddress::from_signed(Region::Edge0, 0, 9, 59).unwrap();
        assert_eq!(addr.sensor_index(), 599);
    }

    #[test]
    fn test_out_of_range_sensor_rejected() {
        let err = sensor_index(Region::Main, 0, 0, 200).unwrap_err();
        assert_eq!(
            err,
            Error::IndexOutOfRange {
                region: Region::Main,
                level: Level::Sensor,
                index: 200,
                limit: 160,
            }
        );
    }

    #[test]
    fn test_out_of_range_tile_and_megatile_rejected() {
        // Would alias onto (1, 0, 0) without the check.
        assert!(sensor_index(Region::Main, 0, 30, 0).is_err());
        assert!(sensor_index(Region::Edge0, 1, 0, 0).is_err());
        assert!(tile_index(Region::Edge1, 0, 10).is_err());
        assert!(decode_sensor_index(Region::Edge1, 600).is_err());
    }

    #[test]
    fn test_anode_map_lookup() {
        let map = AnodeMap::default();
        assert_eq!(map.region(11).unwrap(), Some(Region::Main));
        assert_eq!(map.region(12).unwrap(), Some(Region::Edge0));
        assert_eq!(map.region(13).unwrap(), Some(Region::Edge1));
        assert_eq!(map.region(10).unwrap(), None);
        assert_eq!(map.region(14).unwrap_err(), Error::UnknownAnode(14));
        assert_eq!(map.region(0).unwrap_err(), Error::UnknownAnode(0));
    }

    #[test]
    fn test_anode_map_validation() {
        assert!(AnodeMap::default().validate().is_ok());

        let clash = AnodeMap {
            edge1: 11,
            ..AnodeMap::default()
        };
        assert!(clash.validate().is_err());

        let ignored = AnodeMap {
            ignored: vec![12],
            ..AnodeMap::default()
        };
        assert!(ignored.validate().is_err());
    }

    #[test]
    fn test_per_region_access() {
        let mut v = PerRegion::from_fn(|r| r.n_tiles());
        assert_eq!(*v.get(Region::Main), 60);
        *v.get_mut(Region::Edge1) += 1;
        let collected: Vec<_> = v.iter().map(|(r, n)| (r, *n)).collect();
        assert_eq!(
            collected,
            vec![(Region::Main, 60), (Region::Edge0, 10), (Region::Edge1, 11)]
        );
    }
}
