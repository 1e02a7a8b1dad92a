//! vismap-io: file I/O and drivers for photon visibility maps.
//!
//! This crate reads simulation event streams, stores aggregate records in
//! memory-mapped (or HDF5) tables, and joins records from many shards
//! through a bounded cache of open stores.
//!

pub mod cache;
mod error;
pub mod events;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod join;
pub mod manifest;
pub mod pipeline;
pub mod store;

pub use cache::{LruCache, ResourceOpener};
pub use error::{Error, Result};
pub use events::{resolve_events, EventChain, EventFileReader, EventRecord};
#[cfg(feature = "hdf5")]
pub use hdf5::{Hdf5RecordReader, Hdf5RecordWriter};
pub use join::{join_files, join_manifest, JoinSummary, StoreOpener};
pub use manifest::{default_output_path, shard_path, Manifest, ManifestEntry, DEFAULT_JOIN_OUTPUT};
pub use pipeline::{build_from_file, build_photon_library, build_vis_tree, BuildSummary};
pub use store::{
    create_store, open_store, MappedRecordReader, MemoryStore, RecordFileWriter, RecordSink,
    RecordSource, StoreFormat, StoreSchema,
};
