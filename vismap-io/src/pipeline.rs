//! Build drivers: event stream in, one aggregate record per point out.

use crate::events::{read_input_list, resolve_events, EventChain, EventFileReader};
use crate::store::{create_store, RecordSink, StoreSchema};
use crate::{Error, Result};
use log::info;
use std::path::Path;
use vismap_core::{AggregateRecord, AggregationMode, HitEvent, PointAggregator, VisConfig};

/// Counts reported by a build run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Events consumed.
    pub events: u64,
    /// Records (emission points) written.
    pub points: usize,
}

/// Streams `events` through `aggregator`, appending each closed point to `sink`.
///
/// The last point is finalized when the stream ends, then the sink is
/// flushed. The first failing event aborts the build.
///
/// # Errors
/// Returns the first event, aggregation, or sink error.
pub fn build_vis_tree<I, S>(
    events: I,
    aggregator: &mut PointAggregator,
    sink: &mut S,
) -> Result<BuildSummary>
where
    I: IntoIterator<Item = Result<HitEvent>>,
    S: RecordSink + ?Sized,
{
    let mut summary = BuildSummary::default();

    for event in events {
        let event = event?;
        let closing_events = aggregator.events_at_point();
        if let Some(record) = aggregator.observe(&event) {
            write_point(sink, &mut summary, &record, closing_events)?;
        }
        summary.events += 1;
    }

    let closing_events = aggregator.events_at_point();
    if let Some(record) = aggregator.finalize_current()? {
        write_point(sink, &mut summary, &record, closing_events)?;
    }
    sink.finish()?;
    Ok(summary)
}

fn write_point<S: RecordSink + ?Sized>(
    sink: &mut S,
    summary: &mut BuildSummary,
    record: &AggregateRecord,
    events: u32,
) -> Result<()> {
    let p = record.point;
    info!(
        "[{}] closing point ({}, {}, {}): {events} events",
        summary.events, p.x, p.y, p.z
    );
    sink.append(record)?;
    summary.points += 1;
    Ok(())
}

/// Builds a visibility tree from one event file.
///
/// # Errors
/// Returns [`Error::FatalInput`] if `input` cannot be opened, or any build error.
pub fn build_from_file(input: &Path, output: &Path, config: &VisConfig) -> Result<BuildSummary> {
    config.validate()?;
    let reader = EventFileReader::open(input)?;
    let mut aggregator = PointAggregator::from_config(config)?;
    let mut sink = create_store(output, &StoreSchema::new(&config.table_name))?;

    info!("building {} from {}", output.display(), input.display());
    let events = resolve_events(reader, config.anodes.clone());
    let summary = build_vis_tree(events, &mut aggregator, &mut sink)?;
    info!(
        "wrote {} points from {} events to {}",
        summary.points,
        summary.events,
        output.display()
    );
    Ok(summary)
}

/// Builds a photon library from the event files named in `input_list`.
///
/// The files are chained in list order and aggregated in batch mode.
///
/// # Errors
/// Returns [`Error::FatalInput`] if the list is unreadable or empty, or any
/// build error.
pub fn build_photon_library(
    input_list: &Path,
    output: &Path,
    config: &VisConfig,
) -> Result<BuildSummary> {
    let config = config.clone().with_mode(AggregationMode::Batch);
    config.validate()?;

    let paths = read_input_list(input_list)?;
    if paths.is_empty() {
        return Err(Error::fatal(input_list, "no event files listed"));
    }
    info!("chaining {} event files", paths.len());

    let mut aggregator = PointAggregator::from_config(&config)?;
    let mut sink = create_store(output, &StoreSchema::new(&config.table_name))?;
    let events = resolve_events(EventChain::new(paths), config.anodes.clone());
    let summary = build_vis_tree(events, &mut aggregator, &mut sink)?;
    info!(
        "photon library: {} points from {} events written to {}",
        summary.points,
        summary.events,
        output.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use approx::assert_relative_eq;
    use vismap_core::{ChannelAddress, ConsumeRules, ProcessCounts, Region};

    fn event(point: [f32; 3], hits: u32) -> HitEvent {
        let mut event = HitEvent::new(point.into());
        let address = ChannelAddress::new(Region::Main, 0, 0, 0).unwrap();
        event.push(address, ProcessCounts::from_breakdown(hits, [(4, hits)]).unwrap());
        event
    }

    fn aggregator() -> PointAggregator {
        PointAggregator::new(ConsumeRules {
            photons_per_event: 10.0,
            ..ConsumeRules::default()
        })
    }

    #[test]
    fn test_build_groups_points() {
        let events = [
            event([0.0, 0.0, 0.0], 2),
            event([0.0, 0.0, 0.0], 4),
            event([1.0, 0.0, 0.0], 5),
        ];
        let mut sink = MemoryStore::default();
        let mut agg = aggregator();
        let summary = build_vis_tree(events.into_iter().map(Ok), &mut agg, &mut sink).unwrap();

        assert_eq!(summary, BuildSummary { events: 3, points: 2 });
        assert_eq!(sink.records.len(), 2);
        assert_relative_eq!(sink.records[0].vis.tot, 0.3);
        assert_relative_eq!(sink.records[0].vis.dir, 0.3);
        assert_relative_eq!(sink.records[1].vis.tot, 0.5);
        assert_eq!(sink.records[1].point.x, 1.0);
    }

    #[test]
    fn test_build_empty_stream() {
        let mut sink = MemoryStore::default();
        let summary = build_vis_tree(
            std::iter::empty::<Result<HitEvent>>(),
            &mut aggregator(),
            &mut sink,
        )
        .unwrap();
        assert_eq!(summary, BuildSummary::default());
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_build_stops_on_bad_event() {
        let events = vec![
            Ok(event([0.0; 3], 1)),
            Err(Error::InvalidFormat("broken".to_string())),
            Ok(event([1.0, 0.0, 0.0], 1)),
        ];
        let mut sink = MemoryStore::default();
        let err = build_vis_tree(events, &mut aggregator(), &mut sink).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert!(sink.records.is_empty());
    }
}
