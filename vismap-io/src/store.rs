//! Aggregate record stores.
//!
//! A store is an ordered table of [`AggregateRecord`]s with random access by
//! entry index. The default on-disk form is a flat binary file read through
//! a memory map:
//!
//! ```text
//! b"VISMAP01" | u32 floats-per-record | u32 table-name length | table name
//! record 0 | record 1 | ...              (little-endian f32, fixed size)
//! ```
//!
//! Files ending in `.h5`/`.hdf5` use the HDF5 backend when the `hdf5`
//! feature is enabled.

use crate::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use vismap_core::record::DEFAULT_TABLE_NAME;
use vismap_core::{AggregateRecord, RECORD_LEN};

const MAGIC: &[u8; 8] = b"VISMAP01";
const RECORD_BYTES: usize = RECORD_LEN * 4;

/// Layout information shared by every record of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    /// Name of the record table.
    pub table: String,
}

impl StoreSchema {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_NAME)
    }
}

/// Read access to a store.
pub trait RecordSource {
    /// Schema the store was written with.
    fn schema(&self) -> &StoreSchema;

    /// Number of records.
    fn len(&self) -> usize;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the record at `index`.
    ///
    /// # Errors
    /// Returns [`Error::EntryOutOfRange`] past the last record, or a decoding error.
    fn read(&self, index: usize) -> Result<AggregateRecord>;
}

/// Append access to a store.
pub trait RecordSink {
    /// Appends one record.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    fn append(&mut self, record: &AggregateRecord) -> Result<()>;

    /// Number of records appended.
    fn len(&self) -> usize;

    /// Returns true if nothing has been appended.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes buffered records.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    fn finish(&mut self) -> Result<()>;
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn schema(&self) -> &StoreSchema {
        (**self).schema()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn read(&self, index: usize) -> Result<AggregateRecord> {
        (**self).read(index)
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn append(&mut self, record: &AggregateRecord) -> Result<()> {
        (**self).append(record)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// An in-memory store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    pub schema: StoreSchema,
    pub records: Vec<AggregateRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            records: Vec::new(),
        }
    }
}

impl RecordSource for MemoryStore {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn read(&self, index: usize) -> Result<AggregateRecord> {
        self.records
            .get(index)
            .cloned()
            .ok_or_else(|| Error::EntryOutOfRange {
                path: PathBuf::from("<memory>"),
                index,
                len: self.records.len(),
            })
    }
}

impl RecordSink for MemoryStore {
    fn append(&mut self, record: &AggregateRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writer for the binary store format.
pub struct RecordFileWriter {
    writer: BufWriter<File>,
    count: usize,
    scratch: Vec<u8>,
}

impl RecordFileWriter {
    /// Creates (or truncates) a store and writes its header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, schema: &StoreSchema) -> Result<Self> {
        let table_len = u32::try_from(schema.table.len())
            .map_err(|_| Error::InvalidFormat("table name too long".to_string()))?;
        let record_len = u32::try_from(RECORD_LEN)
            .map_err(|_| Error::InvalidFormat("record too large".to_string()))?;

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&record_len.to_le_bytes())?;
        writer.write_all(&table_len.to_le_bytes())?;
        writer.write_all(schema.table.as_bytes())?;

        Ok(Self {
            writer,
            count: 0,
            scratch: Vec::with_capacity(RECORD_BYTES),
        })
    }
}

impl RecordSink for RecordFileWriter {
    fn append(&mut self, record: &AggregateRecord) -> Result<()> {
        self.scratch.clear();
        for values in record.slices() {
            for v in values {
                self.scratch.extend_from_slice(&v.to_le_bytes());
            }
        }
        self.writer.write_all(&self.scratch)?;
        self.count += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Memory-mapped reader for the binary store format.
pub struct MappedRecordReader {
    mmap: Mmap,
    path: PathBuf,
    schema: StoreSchema,
    data_offset: usize,
    count: usize,
}

impl MappedRecordReader {
    /// Opens a store and checks that it holds `table`.
    ///
    /// # Errors
    /// Returns [`Error::MissingResource`] if the file cannot be opened or
    /// holds a different table, and [`Error::InvalidFormat`] for a corrupt
    /// header or truncated payload.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::missing(path, e))?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file).map_err(|e| Error::missing(path, e))? };

        let (schema, data_offset) = parse_header(&mmap, path)?;
        if schema.table != table {
            return Err(Error::missing(
                path,
                format!("table '{table}' not found (store holds '{}')", schema.table),
            ));
        }

        let payload = mmap.len() - data_offset;
        if payload % RECORD_BYTES != 0 {
            return Err(Error::InvalidFormat(format!(
                "payload size {payload} is not a multiple of {RECORD_BYTES} (file: {})",
                path.display()
            )));
        }

        Ok(Self {
            count: payload / RECORD_BYTES,
            mmap,
            path: path.to_path_buf(),
            schema,
            data_offset,
        })
    }
}

fn parse_header(bytes: &[u8], path: &Path) -> Result<(StoreSchema, usize)> {
    let corrupt = |what: &str| Error::InvalidFormat(format!("{what} (file: {})", path.display()));

    if bytes.get(..MAGIC.len()) != Some(MAGIC.as_slice()) {
        return Err(corrupt("missing store signature"));
    }
    let record_len = read_u32(bytes, 8).ok_or_else(|| corrupt("truncated header"))?;
    if usize::try_from(record_len).ok() != Some(RECORD_LEN) {
        return Err(corrupt(&format!(
            "record length {record_len} does not match schema length {RECORD_LEN}"
        )));
    }
    let table_len = read_u32(bytes, 12).ok_or_else(|| corrupt("truncated header"))? as usize;
    let table_end = 16 + table_len;
    let table = bytes
        .get(16..table_end)
        .ok_or_else(|| corrupt("truncated table name"))?;
    let table = std::str::from_utf8(table).map_err(|_| corrupt("table name is not UTF-8"))?;
    Ok((StoreSchema::new(table), table_end))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

impl RecordSource for MappedRecordReader {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    fn len(&self) -> usize {
        self.count
    }

    fn read(&self, index: usize) -> Result<AggregateRecord> {
        if index >= self.count {
            return Err(Error::EntryOutOfRange {
                path: self.path.clone(),
                index,
                len: self.count,
            });
        }
        let start = self.data_offset + index * RECORD_BYTES;
        let values: Vec<f32> = self.mmap[start..start + RECORD_BYTES]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(AggregateRecord::from_flat(&values)?)
    }
}

/// On-disk store flavour, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Binary,
    Hdf5,
}

impl StoreFormat {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("h5" | "hdf5") => Self::Hdf5,
            _ => Self::Binary,
        }
    }
}

/// Opens a store for reading, dispatching on the file extension.
///
/// # Errors
/// Returns an error if the store cannot be opened or does not hold `table`.
pub fn open_store(path: &Path, table: &str) -> Result<Box<dyn RecordSource>> {
    match StoreFormat::from_path(path) {
        StoreFormat::Binary => Ok(Box::new(MappedRecordReader::open(path, table)?)),
        #[cfg(feature = "hdf5")]
        StoreFormat::Hdf5 => Ok(Box::new(crate::hdf5::Hdf5RecordReader::open(path, table)?)),
        #[cfg(not(feature = "hdf5"))]
        StoreFormat::Hdf5 => Err(hdf5_disabled(path)),
    }
}

/// Creates a store for writing, dispatching on the file extension.
///
/// # Errors
/// Returns an error if the store cannot be created.
pub fn create_store(path: &Path, schema: &StoreSchema) -> Result<Box<dyn RecordSink>> {
    match StoreFormat::from_path(path) {
        StoreFormat::Binary => Ok(Box::new(RecordFileWriter::create(path, schema)?)),
        #[cfg(feature = "hdf5")]
        StoreFormat::Hdf5 => Ok(Box::new(crate::hdf5::Hdf5RecordWriter::create(
            path, schema,
        )?)),
        #[cfg(not(feature = "hdf5"))]
        StoreFormat::Hdf5 => Err(hdf5_disabled(path)),
    }
}

#[cfg(not(feature = "hdf5"))]
fn hdf5_disabled(path: &Path) -> Error {
    Error::InvalidFormat(format!(
        "{}: built without HDF5 support (enable the `hdf5` feature)",
        path.display()
    ))
}
