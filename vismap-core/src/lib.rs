//! vismap-core: Core types for building photon visibility maps.
//!
//! This crate provides the detector-channel index mapper, the event and
//! aggregate record types, and the streaming point aggregator that turns an
//! ordered event stream into one normalized record per emission point.
//!

pub mod aggregator;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod record;

pub use aggregator::{AggregationMode, ConsumeRules, PointAccumulator, PointAggregator};
pub use channel::{AnodeMap, ChannelAddress, Level, PerRegion, Region};
pub use config::VisConfig;
pub use error::{Error, Result};
pub use event::{Coordinate, HitEvent, ProcessClass, ProcessCounts, SensorHit};
pub use record::{AggregateRecord, FieldSpec, TileVisibility, Visibility, FIELDS, RECORD_LEN};
