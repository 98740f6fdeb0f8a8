mod common;
use common::*;

use std::fs::File;
use std::io::Write;
use tempfile::TempDir;
use weblake::{
    ArtifactStore, CollectionFailure, CombinedLogParser, LocalStore, MemoryStore,
    RawLogCollector, StoreLayout, StoredRecord,
};

fn prepared_store() -> (MemoryStore, StoreLayout) {
    let store = MemoryStore::new();
    let layout = StoreLayout::default();
    layout.initialize(&store).unwrap();
    (store, layout)
}

#[test]
fn test_gzip_source_is_decompressed() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let temp_dir = TempDir::new().unwrap();
    let gz_path = temp_dir.path().join("access.log.gz");
    let mut encoder = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
    for n in 0..4 {
        writeln!(encoder, "{}", render_log_line(n)).unwrap();
    }
    encoder.finish().unwrap();

    let (store, layout) = prepared_store();
    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let outcome = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(&gz_path, 3)
        .unwrap();

    assert_eq!(outcome.stats.records_uploaded, 4);
    assert_eq!(outcome.stats.batches_uploaded, 2);
    assert_eq!(read_text(&store, outcome.artifact.as_str()).lines().count(), 4);
}

#[test]
fn test_zstd_source_is_decompressed() {
    let content: String = (0..5).map(|n| render_log_line(n) + "\n").collect();
    let compressed = zstd::encode_all(content.as_bytes(), 0).unwrap();
    let temp_dir = TempDir::new().unwrap();
    let zst_path = temp_dir.path().join("access.log.zst");
    std::fs::write(&zst_path, compressed).unwrap();

    let (store, layout) = prepared_store();
    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let outcome = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(&zst_path, 100)
        .unwrap();

    assert_eq!(outcome.stats.records_uploaded, 5);
}

#[test]
fn test_stored_records_keep_parsed_fields() {
    let line = r#"198.51.100.7 - frank [10/Oct/2023:13:55:36 -0700] "POST /api/v1/items HTTP/2.0" 201 - "https://example.org/form" "curl/8.1.2""#;
    let file = write_log_file(&format!("{}\r\n", line));

    let (store, layout) = prepared_store();
    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let outcome = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(file.path(), 10)
        .unwrap();

    let raw = read_text(&store, outcome.artifact.as_str());
    assert!(raw.ends_with('\n'));
    let record: StoredRecord = serde_json::from_str(raw.trim_end()).unwrap();
    assert_eq!(record.ip(), "198.51.100.7");
    assert_eq!(record.timestamp(), "2023-10-10T13:55:36");
    assert_eq!(record.method(), "POST");
    assert_eq!(record.url(), "/api/v1/items");
    assert_eq!(record.protocol(), "HTTP/2.0");
    assert_eq!(record.status(), 201);
    assert_eq!(record.size(), -1);
    assert_eq!(record.referer(), "https://example.org/form");
    assert_eq!(record.user_agent(), "curl/8.1.2");
}

#[test]
fn test_mixed_input_counts_every_outcome() {
    let content = format!(
        "{}\n\nnot an access log\n{}\n10.0.0.1 - - [bad time] \"GET / HTTP/1.1\" 200 1 \"-\" \"-\"\n   \n{}\n",
        render_log_line(1),
        render_log_line(2),
        render_log_line(3)
    );
    let file = write_log_file(&content);

    let (store, layout) = prepared_store();
    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let outcome = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(file.path(), 2)
        .unwrap();

    let stats = outcome.stats;
    assert_eq!(stats.lines_read, 7);
    assert_eq!(stats.lines_skipped_empty, 2);
    assert_eq!(stats.lines_parsed, 3);
    assert_eq!(stats.parse_failures, 2);
    assert_eq!(stats.records_uploaded, 3);
    assert_eq!(stats.batches_uploaded, 2);
    assert_eq!(stats.failure_examples.len(), 2);
}

#[test]
fn test_empty_source_still_yields_one_artifact() {
    let file = write_log_file("");

    let (store, layout) = prepared_store();
    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let outcome = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(file.path(), 10)
        .unwrap();

    assert_eq!(store.file_paths(), vec![outcome.artifact.as_str().to_string()]);
    assert_eq!(read_text(&store, outcome.artifact.as_str()), "");
}

#[test]
fn test_unreadable_source_creates_nothing() {
    let (store, layout) = prepared_store();
    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let temp_dir = TempDir::new().unwrap();

    let failure = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(&temp_dir.path().join("missing.log"), 10)
        .unwrap_err();

    assert!(matches!(failure, CollectionFailure::SourceUnavailable { .. }));
    assert!(store.file_paths().is_empty());
}

#[test]
fn test_collect_into_local_store() {
    let root = TempDir::new().unwrap();
    let store = LocalStore::open_root(root.path()).unwrap();
    let layout = StoreLayout::default();
    layout.initialize(&store).unwrap();
    let file = log_file_with_lines(12);

    let clock = fixed_clock();
    let parser = CombinedLogParser::new().unwrap();
    let outcome = RawLogCollector::new(&store, &clock, &layout, &parser)
        .collect(file.path(), 5)
        .unwrap();

    assert!(store.exists(outcome.artifact.as_str()).unwrap());
    let on_disk = root
        .path()
        .join("logs")
        .join("raw")
        .join("weblogs_20231010_135536.json");
    let content = std::fs::read_to_string(on_disk).unwrap();
    assert_eq!(content.lines().count(), 12);
    assert_eq!(outcome.stats.batches_uploaded, 3);
}
