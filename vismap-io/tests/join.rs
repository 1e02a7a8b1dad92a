#![allow(clippy::float_cmp)]
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vismap_core::{AggregateRecord, Coordinate, VisConfig};
use vismap_io::{
    join_files, join_manifest, open_store, shard_path, Error, JoinSummary, LruCache,
    ManifestEntry, RecordFileWriter, RecordSink, RecordSource, StoreOpener, StoreSchema,
};

// Writes a shard under its `_vtree` name and returns the manifest-facing path.
fn write_shard(dir: &Path, name: &str, table: &str, xs: &[f32]) -> PathBuf {
    let manifest_path = dir.join(name);
    let mut writer = RecordFileWriter::create(shard_path(&manifest_path), &StoreSchema::new(table))
        .unwrap();
    for &x in xs {
        let mut record = AggregateRecord::zeroed(Coordinate::new(x, 0.0, 0.0));
        record.sipm.main[0] = x * 0.5;
        writer.append(&record).unwrap();
    }
    writer.finish().unwrap();
    manifest_path
}

fn manifest_json(entries: &[(&Path, u64)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(path, entry)| {
            format!(
                "  {{ \"entry\": {entry}, \"filepath\": {} }}",
                serde_json::to_string(path.to_str().unwrap()).unwrap()
            )
        })
        .collect();
    format!("// shard manifest\n[\n{}\n]\n", items.join(",\n"))
}

fn xs(path: &Path) -> Vec<f32> {
    let store = open_store(path, "photonLib").unwrap();
    (0..store.len()).map(|i| store.read(i).unwrap().point.x).collect()
}

#[test]
fn test_join_preserves_manifest_order_with_missing_shard() {
    let dir = TempDir::new().unwrap();
    let f1 = write_shard(dir.path(), "f1.vmap", "photonLib", &[1.0, 2.0]);
    let f2 = dir.path().join("f2.vmap");

    let manifest = dir.path().join("files.json");
    std::fs::write(&manifest, manifest_json(&[(&f1, 0), (&f2, 3), (&f1, 1)])).unwrap();
    let output = dir.path().join("vis_map.vmap");

    let summary = join_files(&manifest, &output, &VisConfig::default()).unwrap();
    assert_eq!(
        summary,
        JoinSummary {
            requested: 3,
            written: 2,
            skipped: 1
        }
    );
    assert_eq!(xs(&output), vec![1.0, 2.0]);

    let store = open_store(&output, "photonLib").unwrap();
    assert_eq!(store.read(1).unwrap().sipm.main[0], 1.0);
}

#[test]
fn test_join_missing_first_shard_is_fatal() {
    let dir = TempDir::new().unwrap();
    let f1 = write_shard(dir.path(), "f1.vmap", "photonLib", &[1.0]);
    let gone = dir.path().join("gone.vmap");

    let manifest = dir.path().join("files.json");
    std::fs::write(&manifest, manifest_json(&[(&gone, 0), (&f1, 0)])).unwrap();

    let err = join_files(&manifest, &dir.path().join("out.vmap"), &VisConfig::default())
        .err()
        .unwrap();
    match err {
        Error::FatalInput { path, .. } => assert_eq!(path, shard_path(&gone)),
        other => panic!("expected FatalInput, got {other}"),
    }
}

#[test]
fn test_join_skips_shard_with_wrong_table() {
    let dir = TempDir::new().unwrap();
    let good = write_shard(dir.path(), "good.vmap", "photonLib", &[5.0]);
    let other = write_shard(dir.path(), "other.vmap", "otherTree", &[6.0]);

    let manifest = dir.path().join("files.json");
    std::fs::write(&manifest, manifest_json(&[(&good, 0), (&other, 0), (&good, 0)])).unwrap();
    let output = dir.path().join("joined.vmap");

    let summary = join_files(&manifest, &output, &VisConfig::default()).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(xs(&output), vec![5.0, 5.0]);
}

#[test]
fn test_join_with_small_cache_reopens_shards() {
    let dir = TempDir::new().unwrap();
    let a = write_shard(dir.path(), "a.vmap", "photonLib", &[1.0, 2.0]);
    let b = write_shard(dir.path(), "b.vmap", "photonLib", &[3.0, 4.0]);
    let c = write_shard(dir.path(), "c.vmap", "photonLib", &[5.0]);
    let entries = [
        ManifestEntry::new(&a, 1),
        ManifestEntry::new(&b, 0),
        ManifestEntry::new(&c, 0),
        ManifestEntry::new(&a, 0),
        ManifestEntry::new(&b, 1),
    ];

    let mut cache = LruCache::new(2, StoreOpener::new("photonLib")).unwrap();
    let output = dir.path().join("out.vmap");
    let (_, summary) = join_manifest(&entries, &mut cache, |schema| {
        RecordFileWriter::create(&output, schema)
    })
    .unwrap();

    assert_eq!(summary.written, 5);
    assert_eq!(cache.len(), 2);
    assert_eq!(
        cache.keys().cloned().collect::<Vec<_>>(),
        vec![shard_path(&b), shard_path(&a)]
    );
    assert_eq!(xs(&output), vec![2.0, 3.0, 5.0, 1.0, 4.0]);
}

#[test]
fn test_empty_manifest_is_fatal() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("files.json");
    std::fs::write(&manifest, "[ /* nothing yet */ ]").unwrap();

    let err = join_files(&manifest, &dir.path().join("out.vmap"), &VisConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::FatalInput { .. }));
}
