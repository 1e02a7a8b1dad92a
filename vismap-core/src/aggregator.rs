//! Streaming point aggregation.
//!
//! Events arrive ordered and grouped by emission point. The aggregator keeps
//! one open [`PointAccumulator`]; when an event arrives at a different point
//! the open point is normalized and emitted as an [`AggregateRecord`], and
//! the accumulator is reset in place for the new point.
//!
//! Points are contiguous runs: a coordinate that reappears after another
//! point was seen opens a new record rather than merging with the earlier one.

use crate::channel::{PerRegion, Region};
use crate::config::VisConfig;
use crate::event::{Coordinate, HitEvent, ProcessClass};
use crate::record::{AggregateRecord, TileVisibility, Visibility};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-sensor accumulation convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Many small events per point; sensor counts are summed and normalized
    /// once when the point closes.
    #[default]
    Incremental,
    /// One simulated batch per point; each event overwrites the sensor slot
    /// with its already-normalized value.
    Batch,
}

/// How hit counts are split and normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumeRules {
    pub photons_per_event: f64,
    pub direct: ProcessClass,
    pub wls: ProcessClass,
    pub mode: AggregationMode,
}

impl ConsumeRules {
    /// Extract rules from a configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &VisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            photons_per_event: config.photons_per_event,
            direct: ProcessClass::try_from(config.direct_process)?,
            wls: ProcessClass::try_from(config.wls_process)?,
            mode: config.mode,
        })
    }
}

impl Default for ConsumeRules {
    fn default() -> Self {
        Self {
            photons_per_event: crate::config::DEFAULT_PHOTONS_PER_EVENT,
            direct: ProcessClass::Direct,
            wls: ProcessClass::WavelengthShifted,
            mode: AggregationMode::Incremental,
        }
    }
}

#[derive(Debug, Clone)]
struct TileSums {
    tot: Vec<f64>,
    dir: Vec<f64>,
    wls: Vec<f64>,
}

impl TileSums {
    fn zeroed(region: Region) -> Self {
        let n = region.n_tiles();
        Self {
            tot: vec![0.0; n],
            dir: vec![0.0; n],
            wls: vec![0.0; n],
        }
    }
}

/// Raw hit sums of one open emission point.
///
/// Sums are kept in `f64` so large integer counts stay exact until
/// normalization.
#[derive(Debug, Clone)]
pub struct PointAccumulator {
    point: Coordinate,
    events: u32,
    tot: f64,
    dir: f64,
    wls: f64,
    tiles: PerRegion<TileSums>,
    sipm: PerRegion<Vec<f64>>,
}

impl PointAccumulator {
    /// Opens an empty accumulator at `point`.
    #[must_use]
    pub fn new(point: Coordinate) -> Self {
        Self {
            point,
            events: 0,
            tot: 0.0,
            dir: 0.0,
            wls: 0.0,
            tiles: PerRegion::from_fn(TileSums::zeroed),
            sipm: PerRegion::from_fn(|r| vec![0.0; r.n_sensors()]),
        }
    }

    #[inline]
    #[must_use]
    pub fn point(&self) -> Coordinate {
        self.point
    }

    /// Number of events merged into this point.
    #[inline]
    #[must_use]
    pub fn events(&self) -> u32 {
        self.events
    }

    /// Raw total hits at point level.
    #[inline]
    #[must_use]
    pub fn total_hits(&self) -> f64 {
        self.tot
    }

    /// Zeroes every sum in place and moves the accumulator to `point`.
    pub fn reset(&mut self, point: Coordinate) {
        self.point = point;
        self.events = 0;
        self.tot = 0.0;
        self.dir = 0.0;
        self.wls = 0.0;
        self.tiles.for_each_mut(|_, t| {
            t.tot.fill(0.0);
            t.dir.fill(0.0);
            t.wls.fill(0.0);
        });
        self.sipm.for_each_mut(|_, s| s.fill(0.0));
    }

    /// Merges one event.
    ///
    /// Total, direct and WLS counts go into the point and tile sums. Only the
    /// total is tracked per sensor. In batch mode every sensor slot is
    /// cleared first, so the sensor arrays hold only this event's values.
    pub fn add_event(&mut self, event: &HitEvent, rules: &ConsumeRules) {
        if rules.mode == AggregationMode::Batch {
            self.sipm.for_each_mut(|_, s| s.fill(0.0));
        }
        for hit in &event.hits {
            let total = f64::from(hit.counts.total());
            let dir = f64::from(hit.counts.get(rules.direct));
            let wls = f64::from(hit.counts.get(rules.wls));

            self.tot += total;
            self.dir += dir;
            self.wls += wls;

            let region = hit.address.region();
            let tile = hit.address.tile_index();
            let tiles = self.tiles.get_mut(region);
            tiles.tot[tile] += total;
            tiles.dir[tile] += dir;
            tiles.wls[tile] += wls;

            let slot = &mut self.sipm.get_mut(region)[hit.address.sensor_index()];
            match rules.mode {
                AggregationMode::Incremental => *slot += total,
                AggregationMode::Batch => *slot = total / rules.photons_per_event,
            }
        }
        self.events += 1;
    }

    /// Normalizes by `events × photons_per_event` and emits the record.
    ///
    /// The sums are left untouched; call [`Self::reset`] before reusing the
    /// accumulator for another point. In batch mode sensor slots already hold normalized values and are
    /// copied through unchanged.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn finalize(&self, rules: &ConsumeRules) -> AggregateRecord {
        let scale = f64::from(self.events) * rules.photons_per_event;
        let norm = |v: f64| -> f32 {
            if scale > 0.0 {
                (v / scale) as f32
            } else {
                0.0
            }
        };
        let normalize = |values: &[f64]| -> Vec<f32> { values.iter().map(|&v| norm(v)).collect() };

        let tiles = PerRegion::from_fn(|r| {
            let sums = self.tiles.get(r);
            TileVisibility {
                tot: normalize(&sums.tot),
                dir: normalize(&sums.dir),
                wls: normalize(&sums.wls),
            }
        });
        let sipm = PerRegion::from_fn(|r| {
            let sums = self.sipm.get(r);
            match rules.mode {
                AggregationMode::Incremental => normalize(sums),
                AggregationMode::Batch => sums.iter().map(|&v| v as f32).collect(),
            }
        });

        AggregateRecord {
            point: self.point,
            vis: Visibility {
                tot: norm(self.tot),
                dir: norm(self.dir),
                wls: norm(self.wls),
            },
            tiles,
            sipm,
        }
    }
}

#[derive(Debug)]
enum State {
    /// No point opened yet.
    Init,
    Accumulating(PointAccumulator),
    /// The last open point was finalized.
    Closed,
}

/// Groups an ordered event stream into one record per emission point.
#[derive(Debug)]
pub struct PointAggregator {
    rules: ConsumeRules,
    state: State,
    emitted: usize,
}

impl PointAggregator {
    #[must_use]
    pub fn new(rules: ConsumeRules) -> Self {
        Self {
            rules,
            state: State::Init,
            emitted: 0,
        }
    }

    /// Build an aggregator from a validated configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &VisConfig) -> Result<Self> {
        Ok(Self::new(ConsumeRules::from_config(config)?))
    }

    /// The active per-sensor convention.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> AggregationMode {
        self.rules.mode
    }

    #[inline]
    #[must_use]
    pub fn rules(&self) -> &ConsumeRules {
        &self.rules
    }

    /// Emission point currently open, if any.
    #[must_use]
    pub fn open_point(&self) -> Option<Coordinate> {
        match &self.state {
            State::Accumulating(acc) => Some(acc.point()),
            State::Init | State::Closed => None,
        }
    }

    /// Events merged into the open point so far.
    #[must_use]
    pub fn events_at_point(&self) -> u32 {
        match &self.state {
            State::Accumulating(acc) => acc.events(),
            State::Init | State::Closed => 0,
        }
    }

    /// Number of records emitted so far.
    #[must_use]
    pub fn records_emitted(&self) -> usize {
        self.emitted
    }

    /// Consumes one event.
    ///
    /// Returns the finalized record of the previous point when `event`
    /// opens a new one.
    pub fn observe(&mut self, event: &HitEvent) -> Option<AggregateRecord> {
        if let State::Accumulating(acc) = &mut self.state {
            if acc.point() == event.point {
                acc.add_event(event, &self.rules);
                return None;
            }
            let record = acc.finalize(&self.rules);
            self.emitted += 1;
            acc.reset(event.point);
            acc.add_event(event, &self.rules);
            return Some(record);
        }

        let mut next = PointAccumulator::new(event.point);
        next.add_event(event, &self.rules);
        self.state = State::Accumulating(next);
        None
    }

    /// Finalizes and emits the open point.
    ///
    /// Returns `Ok(None)` when no point was ever opened (empty input).
    /// Must be called once after the last event, otherwise the last point
    /// is lost.
    ///
    /// # Errors
    /// Returns [`Error::DoubleFinalize`] if the open point was already
    /// finalized.
    ///
    /// # Panics
    /// Panics on a double finalize in debug builds.
    pub fn finalize_current(&mut self) -> Result<Option<AggregateRecord>> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Accumulating(acc) => {
                self.emitted += 1;
                Ok(Some(acc.finalize(&self.rules)))
            }
            State::Init => {
                self.state = State::Init;
                Ok(None)
            }
            State::Closed => {
                if cfg!(debug_assertions) {
                    panic!("emission point finalized twice");
                }
                Err(Error::DoubleFinalize)
            }
        }
    }

    /// Aggregates a complete event sequence, flushing the last point.
    ///
    /// # Errors
    /// Propagates [`Self::finalize_current`] errors.
    pub fn aggregate_all<'a, I>(&mut self, events: I) -> Result<Vec<AggregateRecord>>
    where
        I: IntoIterator<Item = &'a HitEvent>,
    {
        let mut records: Vec<AggregateRecord> = events
            .into_iter()
            .filter_map(|event| self.observe(event))
            .collect();
        records.extend(self.finalize_current()?);
        Ok(records)
    }
}
