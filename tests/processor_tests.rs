use image::{Rgb, RgbImage};
use shardflow::engine::imaging::encode_jpeg;
use shardflow::engine::store::{MemoryStore, ObjectStore};
use shardflow::pipeline::{LogObserver, RunObserver, StageStats, fetch_pool_size, run_processor};
use shardflow::process_batch;
use shardflow::types::{FailureRecord, ImageMetadata, Opts, QueueRecord};
use shardflow::utils::WorkerThreadLimits;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    failures: Mutex<Vec<(String, String)>>,
    stages: Mutex<Vec<StageStats>>,
}

impl RunObserver for Recorder {
    fn stage_finished(&self, stats: &StageStats) {
        self.stages.lock().unwrap().push(stats.clone());
    }

    fn item_failed(&self, record: &FailureRecord, _failures: usize) {
        self.failures
            .lock()
            .unwrap()
            .push((record.item_id.clone(), record.stage.clone()));
    }
}

fn jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode_jpeg(&RgbImage::from_pixel(width, height, Rgb(color)), 90).unwrap()
}

fn record(id: &str, key: &str) -> QueueRecord {
    QueueRecord {
        message_id: id.to_string(),
        body: key.to_string(),
    }
}

fn test_opts() -> Opts {
    let mut opts = Opts {
        num_workers: 3,
        num_colors: 3,
        max_iterations: 20,
        ..Opts::default()
    };
    opts.resize.width = 32;
    opts.resize.height = 32;
    opts
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 6 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[test]
fn test_batch_publishes_image_and_metadata_per_record() {
    let source = Arc::new(MemoryStore::new());
    source.put("photos/abcdef.jpg", &jpeg(64, 32, [200, 20, 20])).unwrap();
    source.put("photos/12ffee.jpg", &jpeg(20, 40, [20, 20, 200])).unwrap();
    let output = Arc::new(MemoryStore::new());
    let records = vec![
        record("m-1", "photos/abcdef.jpg"),
        record("m-2", "photos/12ffee.jpg"),
    ];

    let summary = run_processor(
        records,
        source,
        output.clone(),
        &test_opts(),
        Arc::new(LogObserver),
    )
    .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.succeeded, 2);
    assert!(summary.report.is_empty());
    assert_eq!(
        output.keys().unwrap(),
        vec![
            "photos/12/ffee.jpg",
            "photos/12/ffee.json",
            "photos/ab/cdef.jpg",
            "photos/ab/cdef.json",
        ]
    );

    let thumb = image::load_from_memory(&output.get("photos/ab/cdef.jpg").unwrap()).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (32, 32));

    let doc: ImageMetadata =
        serde_json::from_slice(&output.get("photos/ab/cdef.json").unwrap()).unwrap();
    assert_eq!(doc.key, "photos/abcdef.jpg");
    assert_eq!(doc.item_identifier, "m-1");
    assert!(!doc.hexcolors.is_empty());
    assert!(doc.hexcolors.len() <= 3);
    assert!(doc.hexcolors.iter().all(|c| is_hex_color(c)));
}

#[test]
fn test_batch_reports_each_failed_record_once() {
    let source = Arc::new(MemoryStore::new());
    source.put("photos/aa0001.jpg", &jpeg(16, 16, [0, 128, 0])).unwrap();
    source.put("photos/bb0002.jpg", b"not an image").unwrap();
    source.put("flat.jpg", &jpeg(16, 16, [0, 0, 0])).unwrap();
    let output = Arc::new(MemoryStore::new());
    let recorder = Arc::new(Recorder::default());
    let records = vec![
        record("ok", "photos/aa0001.jpg"),
        record("missing", "photos/cc0003.jpg"),
        record("garbage", "photos/bb0002.jpg"),
        record("unshardable", "flat.jpg"),
    ];

    let summary = run_processor(
        records,
        source,
        output.clone(),
        &test_opts(),
        recorder.clone(),
    )
    .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.report.len(), 3);
    assert_eq!(summary.succeeded + summary.report.len(), summary.records);
    for id in ["missing", "garbage", "unshardable"] {
        assert!(summary.report.contains(id), "{id} not reported");
    }
    assert!(!summary.report.contains("ok"));

    let mut failures = recorder.failures.lock().unwrap().clone();
    failures.sort();
    assert_eq!(
        failures,
        vec![
            ("garbage".to_string(), "resize".to_string()),
            ("missing".to_string(), "fetch".to_string()),
            ("unshardable".to_string(), "publish-image".to_string()),
        ]
    );
    assert!(output.get("photos/aa/0001.json").is_ok());
}

#[test]
fn test_report_serializes_in_partial_failure_shape() {
    let output = Arc::new(MemoryStore::new());
    let summary = run_processor(
        vec![record("abc-123", "photos/zz.jpg")],
        Arc::new(MemoryStore::new()),
        output,
        &test_opts(),
        Arc::new(LogObserver),
    )
    .unwrap();
    assert_eq!(
        serde_json::to_string(&summary.report).unwrap(),
        r#"{"batchItemFailures":[{"itemIdentifier":"abc-123"}]}"#
    );
}

#[test]
fn test_empty_batch_is_an_empty_report() {
    let summary = run_processor(
        Vec::new(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        &test_opts(),
        Arc::new(LogObserver),
    )
    .unwrap();
    assert_eq!(summary.succeeded, 0);
    assert_eq!(
        serde_json::to_string(&summary.report).unwrap(),
        r#"{"batchItemFailures":[]}"#
    );
}

#[test]
fn test_invalid_settings_fail_before_processing() {
    let opts = Opts {
        num_colors: 0,
        ..test_opts()
    };
    let err = run_processor(
        vec![record("m", "photos/abcd.jpg")],
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        &opts,
        Arc::new(LogObserver),
    )
    .unwrap_err();
    assert!(err.to_string().contains("NUM_COLORS"));
}

#[test]
fn test_fetch_pool_is_one_per_record_up_to_the_cap() {
    let cap = WorkerThreadLimits::MAX_FETCH_WORKERS;
    assert_eq!(fetch_pool_size(0), 1);
    assert_eq!(fetch_pool_size(7), 7);
    assert_eq!(fetch_pool_size(cap), cap);
    assert_eq!(fetch_pool_size(100_000), cap);
}

#[test]
fn test_large_batch_runs_a_bounded_fetch_pool() {
    let cap = WorkerThreadLimits::MAX_FETCH_WORKERS;
    let records: Vec<QueueRecord> = (0..cap * 3)
        .map(|i| record(&format!("m-{i}"), &format!("photos/{i:06}.jpg")))
        .collect();
    let recorder = Arc::new(Recorder::default());

    let summary = run_processor(
        records,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        &test_opts(),
        recorder.clone(),
    )
    .unwrap();

    // Nothing exists in the source bucket, so every record fails at fetch.
    assert_eq!(summary.records, cap * 3);
    assert_eq!(summary.report.len(), cap * 3);
    let stages = recorder.stages.lock().unwrap();
    assert_eq!(stages[0].name, "fetch");
    assert_eq!(stages[0].workers, cap);
    assert_eq!(stages[0].failed, cap * 3);
    assert!(stages[1..].iter().all(|s| s.workers == 3));
}

#[test]
fn test_process_batch_between_directory_buckets() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    std::fs::create_dir_all(data.join("photos")).unwrap();
    std::fs::write(data.join("photos/9f00aa.jpg"), jpeg(40, 40, [250, 250, 0])).unwrap();
    let out = tmp.path().join("out");
    let opts = Opts {
        data_bucket: Some(data),
        output_bucket: Some(out.clone()),
        ..test_opts()
    };

    let summary = process_batch(
        vec![record("m-9", "photos/9f00aa.jpg")],
        &opts,
        Arc::new(LogObserver),
    )
    .unwrap();

    assert!(summary.report.is_empty());
    assert!(out.join("photos/9f/00aa.jpg").is_file());
    let doc: ImageMetadata =
        serde_json::from_slice(&std::fs::read(out.join("photos/9f/00aa.json")).unwrap()).unwrap();
    assert_eq!(doc.item_identifier, "m-9");
}

#[test]
fn test_process_batch_requires_output_bucket() {
    let tmp = TempDir::new().unwrap();
    let opts = Opts {
        data_bucket: Some(tmp.path().to_path_buf()),
        ..test_opts()
    };
    let err = process_batch(Vec::new(), &opts, Arc::new(LogObserver)).unwrap_err();
    assert!(err.to_string().contains("OUTPUT_BUCKET"));
}
