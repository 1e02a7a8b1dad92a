//! Aggregate record schema.
//!
//! One record per emission point. Field names and order are the external
//! contract shared with every consumer of existing visibility maps.

use crate::channel::{PerRegion, Region};
use crate::event::Coordinate;
use crate::{Error, Result};
use std::slice;

/// Name of the record table inside every store.
pub const DEFAULT_TABLE_NAME: &str = "photonLib";

/// Name and element count of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub len: usize,
}

const fn field(name: &'static str, len: usize) -> FieldSpec {
    FieldSpec { name, len }
}

const TILES_MAIN: usize = Region::Main.n_tiles();
const TILES_EDGE: usize = Region::Edge0.n_tiles();
const SIPM_MAIN: usize = Region::Main.n_sensors();
const SIPM_EDGE: usize = Region::Edge0.n_sensors();

/// Number of fields in a record.
pub const N_FIELDS: usize = 18;

/// Record fields in storage order.
pub const FIELDS: [FieldSpec; N_FIELDS] = [
    field("x", 1),
    field("y", 1),
    field("z", 1),
    field("vis_tot", 1),
    field("vis_dir", 1),
    field("vis_wls", 1),
    field("vis_tot_tile_main", TILES_MAIN),
    field("vis_tot_tile_edge0", TILES_EDGE),
    field("vis_tot_tile_edge1", TILES_EDGE),
    field("vis_dir_tile_main", TILES_MAIN),
    field("vis_dir_tile_edge0", TILES_EDGE),
    field("vis_dir_tile_edge1", TILES_EDGE),
    field("vis_wls_tile_main", TILES_MAIN),
    field("vis_wls_tile_edge0", TILES_EDGE),
    field("vis_wls_tile_edge1", TILES_EDGE),
    field("vis_sipm_main", SIPM_MAIN),
    field("vis_sipm_edge0", SIPM_EDGE),
    field("vis_sipm_edge1", SIPM_EDGE),
];

/// Number of `f32` values in a flattened record.
pub const RECORD_LEN: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < N_FIELDS {
        total += FIELDS[i].len;
        i += 1;
    }
    total
};

/// Total, direct and wavelength-shifted visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Visibility {
    pub tot: f32,
    pub dir: f32,
    pub wls: f32,
}

/// Per-tile visibility of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct TileVisibility {
    pub tot: Vec<f32>,
    pub dir: Vec<f32>,
    pub wls: Vec<f32>,
}

impl TileVisibility {
    #[must_use]
    pub fn zeroed(region: Region) -> Self {
        let n = region.n_tiles();
        Self {
            tot: vec![0.0; n],
            dir: vec![0.0; n],
            wls: vec![0.0; n],
        }
    }
}

/// Normalized visibility of one emission point.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub point: Coordinate,
    pub vis: Visibility,
    pub tiles: PerRegion<TileVisibility>,
    pub sipm: PerRegion<Vec<f32>>,
}

impl AggregateRecord {
    /// An all-zero record at `point`.
    #[must_use]
    pub fn zeroed(point: Coordinate) -> Self {
        Self {
            point,
            vis: Visibility::default(),
            tiles: PerRegion::from_fn(TileVisibility::zeroed),
            sipm: PerRegion::from_fn(|r| vec![0.0; r.n_sensors()]),
        }
    }

    /// Field values in [`FIELDS`] order.
    #[must_use]
    pub fn slices(&self) -> [&[f32]; N_FIELDS] {
        let Self {
            point,
            vis,
            tiles,
            sipm,
        } = self;
        [
            slice::from_ref(&point.x),
            slice::from_ref(&point.y),
            slice::from_ref(&point.z),
            slice::from_ref(&vis.tot),
            slice::from_ref(&vis.dir),
            slice::from_ref(&vis.wls),
            &tiles.main.tot,
            &tiles.edge0.tot,
            &tiles.edge1.tot,
            &tiles.main.dir,
            &tiles.edge0.dir,
            &tiles.edge1.dir,
            &tiles.main.wls,
            &tiles.edge0.wls,
            &tiles.edge1.wls,
            &sipm.main,
            &sipm.edge0,
            &sipm.edge1,
        ]
    }

    fn slices_mut(&mut self) -> [&mut [f32]; N_FIELDS] {
        let Self {
            point,
            vis,
            tiles,
            sipm,
        } = self;
        [
            slice::from_mut(&mut point.x),
            slice::from_mut(&mut point.y),
            slice::from_mut(&mut point.z),
            slice::from_mut(&mut vis.tot),
            slice::from_mut(&mut vis.dir),
            slice::from_mut(&mut vis.wls),
            &mut tiles.main.tot,
            &mut tiles.edge0.tot,
            &mut tiles.edge1.tot,
            &mut tiles.main.dir,
            &mut tiles.edge0.dir,
            &mut tiles.edge1.dir,
            &mut tiles.main.wls,
            &mut tiles.edge0.wls,
            &mut tiles.edge1.wls,
            &mut sipm.main,
            &mut sipm.edge0,
            &mut sipm.edge1,
        ]
    }

    /// `(name, values)` pairs in storage order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &[f32])> {
        FIELDS.iter().map(|f| f.name).zip(self.slices())
    }

    /// Appends the flattened record to `out`.
    pub fn write_flat(&self, out: &mut Vec<f32>) {
        out.reserve(RECORD_LEN);
        for values in self.slices() {
            out.extend_from_slice(values);
        }
    }

    /// Flattens the record into [`RECORD_LEN`] values.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(RECORD_LEN);
        self.write_flat(&mut out);
        out
    }

    /// Rebuilds a record from [`RECORD_LEN`] flattened values.
    ///
    /// # Errors
    /// Returns [`Error::RecordLength`] if `values` has the wrong length.
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() != RECORD_LEN {
            return Err(Error::RecordLength {
                expected: RECORD_LEN,
                found: values.len(),
            });
        }
        let mut record = Self::zeroed(Coordinate::default());
        let mut offset = 0;
        for dst in record.slices_mut() {
            let end = offset + dst.len();
            dst.copy_from_slice(&values[offset..end]);
            offset = end;
        }
        Ok(record)
    }
}
