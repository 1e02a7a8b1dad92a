//! Simulation event stream reader.
//!
//! Events are stored as a sequence of JSON documents, one per simulated
//! event, mirroring the readout hierarchy anode → megatile → tile → SiPM.
//! Files are read lazily so arbitrarily long streams never sit in memory.

use crate::{Error, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use vismap_core::{AnodeMap, ChannelAddress, Coordinate, HitEvent, ProcessCounts};

/// One simulated event as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Generator emission point.
    pub point: Coordinate,
    #[serde(default)]
    pub anodes: Vec<AnodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnodeRecord {
    /// Detector-side anode identifier.
    pub id: i32,
    #[serde(default)]
    pub megatiles: Vec<MegatileRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MegatileRecord {
    pub index: i64,
    #[serde(default)]
    pub tiles: Vec<TileRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub index: i64,
    #[serde(default)]
    pub sipms: Vec<SipmRecord>,
}

/// Hits recorded by one SiPM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipmRecord {
    pub index: i64,
    /// Raw number of hit records (process class 0).
    pub n_hits: u32,
    /// Hit counts keyed by process class.
    #[serde(default)]
    pub processes: BTreeMap<u8, u32>,
}

impl EventRecord {
    /// Resolves anode identifiers and hierarchical addresses.
    ///
    /// Ignored anodes are dropped.
    ///
    /// # Errors
    /// Returns an error for unknown anodes, out-of-range channel coordinates,
    /// or invalid process classes.
    pub fn resolve(&self, anodes: &AnodeMap) -> vismap_core::Result<HitEvent> {
        let mut event = HitEvent::new(self.point);
        for anode in &self.anodes {
            let Some(region) = anodes.region(anode.id)? else {
                debug!("skipping ignored anode {}", anode.id);
                continue;
            };
            for megatile in &anode.megatiles {
                for tile in &megatile.tiles {
                    for sipm in &tile.sipms {
                        let address = ChannelAddress::from_signed(
                            region,
                            megatile.index,
                            tile.index,
                            sipm.index,
                        )?;
                        let counts = ProcessCounts::from_breakdown(
                            sipm.n_hits,
                            sipm.processes.iter().map(|(&class, &count)| (class, count)),
                        )?;
                        event.push(address, counts);
                    }
                }
            }
        }
        Ok(event)
    }
}

/// Lazily reads [`EventRecord`]s from one file.
pub struct EventFileReader {
    path: PathBuf,
    stream: StreamDeserializer<'static, IoRead<BufReader<File>>, EventRecord>,
}

impl EventFileReader {
    /// Opens an event file.
    ///
    /// # Errors
    /// Returns [`Error::FatalInput`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::fatal(path, e))?;
        let stream = serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter();
        Ok(Self {
            path: path.to_path_buf(),
            stream,
        })
    }
}

impl Iterator for EventFileReader {
    type Item = Result<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next().map(|item| {
            item.map_err(|e| Error::InvalidFormat(format!("{}: {e}", self.path.display())))
        })
    }
}

/// Reads a list of event files, one path per line.
///
/// Blank lines and lines starting with `#` are skipped.
///
/// # Errors
/// Returns [`Error::FatalInput`] if the list cannot be read.
pub fn read_input_list<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::fatal(path, e))?;
    let mut paths = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::fatal(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        paths.push(PathBuf::from(line));
    }
    Ok(paths)
}

/// Several event files read back to back as one ordered stream.
pub struct EventChain {
    pending: VecDeque<PathBuf>,
    current: Option<EventFileReader>,
}

impl EventChain {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            pending: paths.into(),
            current: None,
        }
    }

    /// Builds a chain from a list file (see [`read_input_list`]).
    ///
    /// # Errors
    /// Returns [`Error::FatalInput`] if the list cannot be read.
    pub fn from_list_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(read_input_list(path)?))
    }
}

impl Iterator for EventChain {
    type Item = Result<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = &mut self.current {
                if let Some(item) = reader.next() {
                    return Some(item);
                }
                self.current = None;
            }
            let path = self.pending.pop_front()?;
            info!("adding file {}", path.display());
            match EventFileReader::open(&path) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Resolves raw records into [`HitEvent`]s as they are read.
pub fn resolve_events<I>(records: I, anodes: AnodeMap) -> impl Iterator<Item = Result<HitEvent>>
where
    I: IntoIterator<Item = Result<EventRecord>>,
{
    records
        .into_iter()
        .map(move |record| -> Result<HitEvent> { Ok(record?.resolve(&anodes)?) })
}
