//! Manifest-driven random-access join.
//!
//! Copies the records named by a manifest, in manifest order, out of many
//! shard stores into one output store. Shards are opened through an
//! [`LruCache`] so only a bounded number are open at any time.

use crate::cache::{LruCache, ResourceOpener};
use crate::manifest::{Manifest, ManifestEntry};
use crate::store::{create_store, open_store, RecordSink, RecordSource, StoreSchema};
use crate::{Error, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};
use vismap_core::VisConfig;

/// Counts reported by a join run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JoinSummary {
    /// Manifest entries processed.
    pub requested: usize,
    /// Records copied to the output.
    pub written: usize,
    /// Entries whose shard or record was unavailable.
    pub skipped: usize,
}

/// Opens shard stores holding a given table.
#[derive(Clone, Debug)]
pub struct StoreOpener {
    table: String,
}

impl StoreOpener {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl ResourceOpener<PathBuf> for StoreOpener {
    type Resource = Box<dyn RecordSource>;

    fn open(&mut self, key: &PathBuf) -> Result<Self::Resource> {
        open_store(key, &self.table)
    }
}

/// Copies every resolvable manifest entry into a new sink.
///
/// The output is created by `create_sink` from the schema of the first
/// entry's shard. Later entries whose shard cannot be opened, or whose
/// index is past the end of the shard, are logged and skipped.
///
/// # Errors
/// Returns [`Error::FatalInput`] if `entries` is empty or the first shard
/// cannot be opened. Sink errors and corrupt records are returned as is.
pub fn join_manifest<O, S, F>(
    entries: &[ManifestEntry],
    cache: &mut LruCache<PathBuf, O>,
    create_sink: F,
) -> Result<(S, JoinSummary)>
where
    O: ResourceOpener<PathBuf>,
    O::Resource: RecordSource,
    S: RecordSink,
    F: FnOnce(&StoreSchema) -> Result<S>,
{
    let Some(first) = entries.first() else {
        return Err(Error::fatal("manifest", "no entries"));
    };
    let first_shard = first.shard_path();
    let schema = cache
        .try_get(&first_shard)
        .map_err(|e| Error::fatal(&first_shard, e))?
        .schema()
        .clone();
    let mut sink = create_sink(&schema)?;

    let mut summary = JoinSummary::default();
    for (i, entry) in entries.iter().enumerate() {
        summary.requested += 1;
        let shard = entry.shard_path();
        info!("[{i}] {} entry {}", shard.display(), entry.entry);

        let source = match cache.try_get(&shard) {
            Ok(source) => source,
            Err(e) => {
                warn!("skipping entry {} of {}: {e}", entry.entry, shard.display());
                summary.skipped += 1;
                continue;
            }
        };

        let Ok(index) = usize::try_from(entry.entry) else {
            warn!("skipping entry {}: index does not fit in memory", entry.entry);
            summary.skipped += 1;
            continue;
        };
        match source.read(index) {
            Ok(record) => {
                sink.append(&record)?;
                summary.written += 1;
            }
            Err(e @ Error::EntryOutOfRange { .. }) => {
                warn!("skipping: {e}");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    sink.finish()?;
    Ok((sink, summary))
}

/// Joins the entries of a manifest file into `output`.
///
/// # Errors
/// Returns [`Error::FatalInput`] if the manifest is unreadable or empty, or
/// its first shard cannot be opened.
pub fn join_files(manifest: &Path, output: &Path, config: &VisConfig) -> Result<JoinSummary> {
    config.validate()?;
    let entries = Manifest::from_file(manifest)?.entries;
    if entries.is_empty() {
        return Err(Error::fatal(manifest, "manifest has no entries"));
    }
    info!(
        "joining {} entries from {} into {}",
        entries.len(),
        manifest.display(),
        output.display()
    );

    let mut cache = LruCache::new(config.cache_capacity, StoreOpener::new(&config.table_name))?;
    let (_, summary) = join_manifest(&entries, &mut cache, |schema| create_store(output, schema))?;
    info!(
        "wrote {} of {} entries to {} ({} skipped)",
        summary.written,
        summary.requested,
        output.display(),
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use vismap_core::{AggregateRecord, Coordinate};

    fn shard(table: &str, xs: &[f32]) -> MemoryStore {
        let mut store = MemoryStore::new(StoreSchema::new(table));
        store.records = xs
            .iter()
            .map(|&x| AggregateRecord::zeroed(Coordinate::new(x, 0.0, 0.0)))
            .collect();
        store
    }

    fn memory_cache(
        shards: HashMap<PathBuf, MemoryStore>,
        capacity: usize,
    ) -> LruCache<PathBuf, impl FnMut(&PathBuf) -> Result<MemoryStore>> {
        LruCache::new(capacity, move |path: &PathBuf| {
            shards
                .get(path)
                .cloned()
                .ok_or_else(|| Error::missing(path, "not found"))
        })
        .unwrap()
    }

    fn xs(store: &MemoryStore) -> Vec<f32> {
        store.records.iter().map(|r| r.point.x).collect()
    }

    #[test]
    fn test_join_preserves_order_and_skips_missing() {
        let shards = HashMap::from([(
            PathBuf::from("f1_vtree.vmap"),
            shard("photonLib", &[10.0, 11.0]),
        )]);
        let entries = [
            ManifestEntry::new("f1.vmap", 0),
            ManifestEntry::new("f2.vmap", 3),
            ManifestEntry::new("f1.vmap", 1),
        ];
        let mut cache = memory_cache(shards, 1);
        let (out, summary) =
            join_manifest(&entries, &mut cache, |s| Ok(MemoryStore::new(s.clone()))).unwrap();

        assert_eq!(xs(&out), vec![10.0, 11.0]);
        assert_eq!(out.schema.table, "photonLib");
        assert_eq!(
            summary,
            JoinSummary {
                requested: 3,
                written: 2,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_join_first_entry_missing_is_fatal() {
        let shards = HashMap::from([(
            PathBuf::from("f1_vtree.vmap"),
            shard("photonLib", &[1.0]),
        )]);
        let entries = [
            ManifestEntry::new("gone.vmap", 0),
            ManifestEntry::new("f1.vmap", 0),
        ];
        let mut cache = memory_cache(shards, 4);
        let err = join_manifest(&entries, &mut cache, |s| Ok(MemoryStore::new(s.clone())))
            .err()
            .unwrap();
        assert!(matches!(err, Error::FatalInput { .. }));
    }

    #[test]
    fn test_join_skips_out_of_range_entry() {
        let shards = HashMap::from([(
            PathBuf::from("a_vtree.vmap"),
            shard("photonLib", &[1.0, 2.0]),
        )]);
        let entries = [
            ManifestEntry::new("a.vmap", 1),
            ManifestEntry::new("a.vmap", 9),
            ManifestEntry::new("a.vmap", 0),
        ];
        let mut cache = memory_cache(shards, 2);
        let (out, summary) =
            join_manifest(&entries, &mut cache, |s| Ok(MemoryStore::new(s.clone()))).unwrap();
        assert_eq!(xs(&out), vec![2.0, 1.0]);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_join_empty_manifest_is_fatal() {
        let mut cache = memory_cache(HashMap::new(), 1);
        let err = join_manifest(&[], &mut cache, |s| Ok(MemoryStore::new(s.clone())))
            .err()
            .unwrap();
        assert!(matches!(err, Error::FatalInput { .. }));
    }
}
