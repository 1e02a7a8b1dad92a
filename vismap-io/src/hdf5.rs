//! HDF5 record store.
//!
//! One group per table. Scalar fields are 1-D datasets of length `rows`,
//! array fields are 2-D datasets of shape `(rows, len)`.

use crate::store::{RecordSink, RecordSource, StoreSchema};
use crate::{Error, Result};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group};
use ndarray::{s, ArrayView1, ArrayView2};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use vismap_core::record::FieldSpec;
use vismap_core::{AggregateRecord, FIELDS, RECORD_LEN};

const FORMAT_VERSION: &str = "0.1";

/// Dataset layout options for new stores.
#[derive(Clone, Debug)]
pub struct Hdf5WriteOptions {
    pub chunk_rows: usize,
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for Hdf5WriteOptions {
    fn default() -> Self {
        Self {
            chunk_rows: 64,
            compression: Some(1),
            shuffle: true,
        }
    }
}

/// Streaming writer appending records to an HDF5 table.
pub struct Hdf5RecordWriter {
    file: File,
    datasets: Vec<Dataset>,
    count: usize,
}

impl Hdf5RecordWriter {
    /// Creates a store with default layout options.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file or datasets cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, schema: &StoreSchema) -> Result<Self> {
        Self::with_options(path, schema, &Hdf5WriteOptions::default())
    }

    /// Creates a store.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file or datasets cannot be created.
    pub fn with_options<P: AsRef<Path>>(
        path: P,
        schema: &StoreSchema,
        options: &Hdf5WriteOptions,
    ) -> Result<Self> {
        let file = File::create(path)?;
        set_attr_str_file(&file, "vismap_format_version", FORMAT_VERSION)?;

        let group = file.create_group(&schema.table)?;
        group
            .new_attr::<u64>()
            .create("record_len")?
            .write_scalar(&(RECORD_LEN as u64))?;

        let datasets = FIELDS
            .iter()
            .map(|spec| create_extendable_dataset(&group, spec, options))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            file,
            datasets,
            count: 0,
        })
    }
}

impl RecordSink for Hdf5RecordWriter {
    fn append(&mut self, record: &AggregateRecord) -> Result<()> {
        for ((name, values), dataset) in record.fields().zip(&self.datasets) {
            append_row(dataset, name, self.count, values)?;
        }
        self.count += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }

    fn finish(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Random-access reader over an HDF5 table.
pub struct Hdf5RecordReader {
    _file: File,
    path: PathBuf,
    schema: StoreSchema,
    datasets: Vec<Dataset>,
    count: usize,
}

impl Hdf5RecordReader {
    /// Opens `table` inside an HDF5 store.
    ///
    /// # Errors
    /// Returns [`Error::MissingResource`] if the file or table is absent, and
    /// [`Error::InvalidFormat`] if the table does not have the record layout.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::missing(path, e))?;
        let group = file
            .group(table)
            .map_err(|_| Error::missing(path, format!("table '{table}' not found")))?;

        let datasets = FIELDS
            .iter()
            .map(|spec| open_field(&group, spec, path))
            .collect::<Result<Vec<_>>>()?;
        let count = datasets
            .first()
            .and_then(|ds| ds.shape().first().copied())
            .unwrap_or(0);
        if datasets
            .iter()
            .any(|ds| ds.shape().first().copied() != Some(count))
        {
            return Err(Error::InvalidFormat(format!(
                "fields of table '{table}' have different lengths (file: {})",
                path.display()
            )));
        }

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
            schema: StoreSchema::new(table),
            datasets,
            count,
        })
    }
}

impl RecordSource for Hdf5RecordReader {
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
        let mut values = Vec::with_capacity(RECORD_LEN);
        for (spec, dataset) in FIELDS.iter().zip(&self.datasets) {
            let row = if spec.len == 1 {
                dataset.read_slice_1d::<f32, _>(s![index..=index])?
            } else {
                dataset.read_slice_1d::<f32, _>(s![index, ..])?
            };
            values.extend(row.iter().copied());
        }
        Ok(AggregateRecord::from_flat(&values)?)
    }
}

fn create_extendable_dataset(
    group: &Group,
    spec: &FieldSpec,
    options: &Hdf5WriteOptions,
) -> Result<Dataset> {
    let mut builder = if spec.len == 1 {
        group
            .new_dataset::<f32>()
            .shape((0..,))
            .chunk((options.chunk_rows,))
    } else {
        group
            .new_dataset::<f32>()
            .shape((0.., spec.len))
            .chunk((options.chunk_rows, spec.len))
    };

    if let Some(level) = options.compression {
        builder = builder.deflate(level);
    }

    if options.shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(spec.name)?)
}

fn append_row(dataset: &Dataset, name: &str, offset: usize, data: &[f32]) -> Result<()> {
    let new_len = offset + 1;
    if data.len() == 1 {
        dataset.resize((new_len,))?;
        dataset.write_slice(ArrayView1::from(data), s![offset..new_len])?;
    } else {
        dataset.resize((new_len, data.len()))?;
        let view = ArrayView2::from_shape((1, data.len()), data)
            .map_err(|e| Error::InvalidFormat(format!("field {name}: {e}")))?;
        dataset.write_slice(view, s![offset..new_len, ..])?;
    }
    Ok(())
}

fn open_field(group: &Group, spec: &FieldSpec, path: &Path) -> Result<Dataset> {
    let dataset = group.dataset(spec.name).map_err(|_| {
        Error::InvalidFormat(format!(
            "field '{}' missing (file: {})",
            spec.name,
            path.display()
        ))
    })?;
    let shape = dataset.shape();
    let expected_ndim = if spec.len == 1 { 1 } else { 2 };
    if shape.len() != expected_ndim || (expected_ndim == 2 && shape[1] != spec.len) {
        return Err(Error::InvalidFormat(format!(
            "field '{}' has shape {shape:?} (file: {})",
            spec.name,
            path.display()
        )));
    }
    Ok(dataset)
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vismap_core::Coordinate;

    fn record(x: f32) -> AggregateRecord {
        let mut r = AggregateRecord::zeroed(Coordinate::new(x, -x, 2.0 * x));
        r.vis.dir = 0.5 * x;
        r.tiles.main.wls[59] = x;
        r.sipm.edge0[17] = x / 4.0;
        r
    }

    #[test]
    fn test_hdf5_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.h5");
        let mut writer = Hdf5RecordWriter::create(&path, &StoreSchema::default()).unwrap();
        for i in 0..3u8 {
            writer.append(&record(f32::from(i))).unwrap();
        }
        writer.finish().unwrap();
        drop(writer);

        let reader = Hdf5RecordReader::open(&path, "photonLib").unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.read(1).unwrap(), record(1.0));
        assert_eq!(reader.read(2).unwrap(), record(2.0));
        assert!(matches!(
            reader.read(3),
            Err(Error::EntryOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_hdf5_missing_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.h5");
        let mut writer = Hdf5RecordWriter::create(&path, &StoreSchema::new("other")).unwrap();
        writer.finish().unwrap();
        drop(writer);

        let err = Hdf5RecordReader::open(&path, "photonLib").err().unwrap();
        assert!(matches!(err, Error::MissingResource { .. }));
    }

    #[test]
    fn test_hdf5_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Hdf5RecordReader::open(dir.path().join("absent.h5"), "photonLib")
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingResource { .. }));
    }
}
