use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use shardflow::engine::imaging::{ExtendMode, ResizeOptions, encode_jpeg, resize_image};
use shardflow::engine::keys::{metadata_key, shard_key};
use shardflow::engine::palette::{extract_palette, normalize, to_hex};
use shardflow::engine::queue::{
    DiscardQueue, MemoryQueue, MessageQueue, SpoolQueue, load_batch, parse_batch,
};
use shardflow::engine::store::{LocalStore, MemoryStore, ObjectStore};
use shardflow::types::{Opts, PipelineTask, QueueRecord, TaskState};
use shardflow::engine::arg_parser::CommonArgs;
use shardflow::engine::cli::layer_opts;
use shardflow::utils::{
    PackagePaths, apply_env_with, apply_file_to_opts, load_shardflow_toml, parse_shardflow_toml,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tempfile::TempDir;

// --- shard_key / metadata_key ---

#[test]
fn test_shard_key_inserts_one_level() {
    assert_eq!(shard_key("a/bcdef/rest").unwrap(), "a/bc/def/rest");
    assert_eq!(shard_key("photos/abcdef.jpg").unwrap(), "photos/ab/cdef.jpg");
}

#[test]
fn test_shard_key_keeps_every_character() {
    for key in ["x/0123456789/y/z.jpg", "bucket/ffee.png", "a/bcd/e"] {
        let sharded = shard_key(key).unwrap();
        assert_eq!(sharded.split('/').count(), key.split('/').count() + 1);
        assert_eq!(sharded.replacen('/', "", 2), key.replacen('/', "", 1));
    }
}

#[test]
fn test_shard_key_rejects_short_or_flat_keys() {
    assert!(shard_key("flat.jpg").is_err());
    assert!(shard_key("a/b").is_err());
    assert!(shard_key("a/").is_err());
    assert!(shard_key("a/bc").is_err());
}

#[test]
fn test_shard_key_never_leaves_an_empty_segment() {
    for key in ["a/bc/d", "photos/ab/cd.jpg", "a/éè/x"] {
        let err = shard_key(key).unwrap_err();
        assert!(err.to_string().contains("nothing left"), "{key}: {err}");
    }
    assert_eq!(shard_key("a/bcd/e").unwrap(), "a/bc/d/e");
}

#[test]
fn test_shard_key_counts_characters_not_bytes() {
    assert_eq!(shard_key("a/éèxyz").unwrap(), "a/éè/xyz");
}

#[test]
fn test_metadata_key_swaps_suffix_then_shards() {
    assert_eq!(
        metadata_key("photos/abcdef.jpg").unwrap(),
        "photos/ab/cdef.json"
    );
    assert_eq!(
        metadata_key("photos/abcdef.png").unwrap(),
        "photos/ab/cdef.png.json"
    );
}

// --- palette ---

#[test]
fn test_normalize_scales_16_bit_to_8_bit() {
    assert_eq!(normalize(0), 0);
    assert_eq!(normalize(257), 1);
    assert_eq!(normalize(32768), 127);
    assert_eq!(normalize(65535), 255);
}

#[test]
fn test_to_hex_is_fixed_width_lowercase() {
    assert_eq!(to_hex([0, 0, 0]), "000000");
    assert_eq!(to_hex([65535, 0, 32768]), "ff007f");
    assert_eq!(to_hex([2570, 2570, 2570]), "0a0a0a");
}

fn two_tone(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    }))
}

#[test]
fn test_palette_finds_both_colors_of_two_tone_image() {
    let palette = extract_palette(&two_tone(8, 4), 2, 10).unwrap();
    let hex: Vec<String> = palette.iter().map(|c| to_hex(c.rgb)).collect();
    assert_eq!(hex, vec!["0000ff", "ff0000"]);
    assert_eq!(palette[0].weight, 16);
    assert_eq!(palette[1].weight, 16);
}

#[test]
fn test_palette_clamps_k_to_distinct_colors() {
    let palette = extract_palette(&two_tone(8, 4), 5, 10).unwrap();
    assert_eq!(palette.len(), 2);
}

#[test]
fn test_palette_is_heaviest_first() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(10, 1, |x, _| {
        if x < 7 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
    }));
    let palette = extract_palette(&img, 2, 10).unwrap();
    assert_eq!(to_hex(palette[0].rgb), "000000");
    assert_eq!(palette[0].weight, 7);
}

#[test]
fn test_palette_rejects_degenerate_input() {
    assert!(extract_palette(&two_tone(4, 4), 0, 10).is_err());
    assert!(extract_palette(&two_tone(4, 4), 2, 0).is_err());
    let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    assert!(extract_palette(&empty, 2, 10).is_err());
}

// --- imaging ---

fn black_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_jpeg(&RgbImage::from_pixel(width, height, Rgb([0, 0, 0])), 95).unwrap()
}

fn small(crop: bool) -> ResizeOptions {
    ResizeOptions {
        width: 32,
        height: 32,
        crop,
        ..ResizeOptions::default()
    }
}

#[test]
fn test_resize_fits_and_extends_with_white() {
    let out = resize_image(&black_jpeg(64, 32), &small(false)).unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!(img.dimensions(), (32, 32));
    // 64x32 fits as 32x16, centred: rows 0..8 are border.
    let border = img.get_pixel(16, 1);
    let inside = img.get_pixel(16, 16);
    assert!(border[0] > 200 && border[1] > 200 && border[2] > 200);
    assert!(inside[0] < 60 && inside[1] < 60 && inside[2] < 60);
}

#[test]
fn test_resize_extend_black_leaves_no_white() {
    let opts = ResizeOptions {
        extend: ExtendMode::Black,
        ..small(false)
    };
    let out = resize_image(&black_jpeg(64, 32), &opts).unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert!(img.get_pixel(16, 1)[0] < 60);
}

#[test]
fn test_resize_crop_fills_the_box() {
    let out = resize_image(&black_jpeg(64, 32), &small(true)).unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!(img.dimensions(), (32, 32));
    assert!(img.get_pixel(16, 1)[0] < 60);
}

#[test]
fn test_resize_rejects_garbage_and_zero_target() {
    assert!(resize_image(b"definitely not a jpeg", &small(false)).is_err());
    let zero = ResizeOptions {
        width: 0,
        ..small(false)
    };
    assert!(resize_image(&black_jpeg(8, 8), &zero).is_err());
}

// --- queue ---

#[test]
fn test_parse_batch_event_document() {
    let input = r#"{"Records":[
        {"messageId":"m1","body":"photos/aa.jpg","attributes":{"ApproximateReceiveCount":"1"}},
        {"messageId":"m2","body":"photos/bb.jpg"}
    ]}"#;
    let records = parse_batch(input).unwrap();
    assert_eq!(
        records,
        vec![
            QueueRecord {
                message_id: "m1".to_string(),
                body: "photos/aa.jpg".to_string()
            },
            QueueRecord {
                message_id: "m2".to_string(),
                body: "photos/bb.jpg".to_string()
            },
        ]
    );
}

#[test]
fn test_parse_batch_json_lines() {
    let input = "{\"messageId\":\"a\",\"body\":\"k/1\"}\n\n{\"messageId\":\"b\",\"body\":\"k/2\"}\n";
    let records = parse_batch(input).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].body, "k/2");
}

#[test]
fn test_parse_batch_rejects_malformed_line() {
    let err = parse_batch("{\"messageId\":\"a\",\"body\":\"k\"}\nnot json\n").unwrap_err();
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn test_spool_queue_round_trips_through_load_batch() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("spool.jsonl");
    let queue = SpoolQueue::open(&path).unwrap();
    assert_eq!(queue.path(), path.as_path());
    for body in ["k/1", "k/2", "k/1"] {
        queue.send(body).unwrap();
    }
    drop(queue);

    let records = load_batch(&path).unwrap();
    let bodies: Vec<&str> = records.iter().map(|r| r.body.as_str()).collect();
    assert_eq!(bodies, vec!["k/1", "k/2", "k/1"]);
    let ids: HashSet<&str> = records.iter().map(|r| r.message_id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.len() == 32));
}

#[test]
fn test_discard_queue_counts_what_it_drops() {
    let queue = DiscardQueue::default();
    for body in ["a", "b", "c"] {
        queue.send(body).unwrap();
    }
    assert_eq!(queue.sent(), 3);
}

#[test]
fn test_memory_queue_keeps_send_order() {
    let queue = MemoryQueue::new();
    queue.send("x").unwrap();
    queue.send("y").unwrap();
    let records = queue.records().unwrap();
    assert_eq!(records[0].body, "x");
    assert_eq!(records[1].body, "y");
    assert_ne!(records[0].message_id, records[1].message_id);
}

// --- stores ---

#[test]
fn test_memory_store_pages_within_prefix() {
    let store = MemoryStore::new().with_page_size(2);
    for key in ["p/0a/1", "p/0a/2", "p/0a/3", "p/0b/1", "p/0/x"] {
        store.put(key, b"").unwrap();
    }
    let first = store.list_page("p/0a", None).unwrap();
    assert_eq!(first.keys, vec!["p/0a/1", "p/0a/2"]);
    let token = first.next_token.unwrap();
    let second = store.list_page("p/0a", Some(&token)).unwrap();
    assert_eq!(second.keys, vec!["p/0a/3"]);
    assert!(second.next_token.is_none());
}

#[test]
fn test_local_store_lists_gets_and_puts() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path()).unwrap().with_page_size(2);
    for key in ["p/0a/x.jpg", "p/0a/y/z.jpg", "p/0ab/w.jpg", "p/0b/v.jpg"] {
        store.put(key, key.as_bytes()).unwrap();
    }

    let first = store.list_page("p/0a", None).unwrap();
    assert_eq!(first.keys, vec!["p/0a/x.jpg", "p/0a/y/z.jpg"]);
    let second = store
        .list_page("p/0a", first.next_token.as_deref())
        .unwrap();
    assert_eq!(second.keys, vec!["p/0ab/w.jpg"]);
    assert!(second.next_token.is_none());

    assert_eq!(store.get("p/0b/v.jpg").unwrap(), b"p/0b/v.jpg");
    assert!(store.get("p/0b/missing.jpg").is_err());
    assert!(store.list_page("q/00", None).unwrap().keys.is_empty());
}

#[test]
fn test_local_store_pages_one_listing_snapshot() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path()).unwrap().with_page_size(2);
    for i in 0..6 {
        store.put(&format!("p/3a/k{i}"), b"x").unwrap();
    }

    let first = store.list_page("p/3a", None).unwrap();
    assert_eq!(first.keys, vec!["p/3a/k0", "p/3a/k1"]);
    // Written after the listing started: later pages come from the first walk.
    store.put("p/3a/k1x", b"x").unwrap();
    let mut token = first.next_token;
    let mut rest = Vec::new();
    while let Some(t) = token {
        let page = store.list_page("p/3a", Some(&t)).unwrap();
        rest.extend(page.keys);
        token = page.next_token;
    }
    assert_eq!(rest, vec!["p/3a/k2", "p/3a/k3", "p/3a/k4", "p/3a/k5"]);

    // A new listing walks again.
    let again = store.list_page("p/3a", None).unwrap();
    let next = store
        .list_page("p/3a", again.next_token.as_deref())
        .unwrap();
    assert_eq!(next.keys, vec!["p/3a/k1x", "p/3a/k2"]);
}

#[test]
fn test_local_store_rejects_escaping_keys() {
    let tmp = TempDir::new().unwrap();
    let store = LocalStore::open(tmp.path()).unwrap();
    assert!(store.put("../outside", b"x").is_err());
    assert!(store.get("").is_err());
}

#[test]
fn test_local_store_open_requires_directory() {
    let tmp = TempDir::new().unwrap();
    assert!(LocalStore::open(&tmp.path().join("nope")).is_err());
    let made = LocalStore::open_or_create(&tmp.path().join("made")).unwrap();
    assert!(made.root().is_dir());
    assert!(made.root().ends_with("made"));
}

// --- types ---

#[test]
fn test_task_state_only_moves_forward() {
    let mut task = PipelineTask::new(QueueRecord {
        message_id: "m".to_string(),
        body: "k/ab".to_string(),
    });
    assert!(task.content().is_err());
    task.advance(TaskState::Fetched).unwrap();
    task.advance(TaskState::Published).unwrap();
    assert!(task.advance(TaskState::Transformed).is_err());
    assert!(task.advance(TaskState::Published).is_err());
    assert_eq!(task.state, TaskState::Published);
}

#[test]
fn test_opts_checks() {
    assert!(Opts::default().check_orchestrator().is_ok());
    let wide = Opts {
        shard_width: 4,
        ..Opts::default()
    };
    assert!(wide.check_orchestrator().is_err());
    let no_workers = Opts {
        num_workers: 0,
        ..Opts::default()
    };
    assert!(no_workers.check_processor().is_err());
}

// --- configuration layers ---

#[test]
fn test_package_paths_derive_from_package_name() {
    let paths = PackagePaths::get();
    assert_eq!(paths.pkg_name(), "shardflow");
    assert_eq!(paths.config_filename(), ".shardflow.toml");
    assert_eq!(paths.spool_filename(), "shardflow.queue.jsonl");
}

#[test]
fn test_env_overrides_and_ignores_empty_values() {
    let vars: HashMap<&str, &str> = [
        ("DATA_BUCKET", "/data"),
        ("SPLIT", "photos"),
        ("NUM_WORKERS", " 12 "),
        ("NUM_COLORS", ""),
    ]
    .into_iter()
    .collect();
    let mut opts = Opts::default();
    let colors = opts.num_colors;
    apply_env_with(&mut opts, |k| vars.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(opts.data_bucket, Some(PathBuf::from("/data")));
    assert_eq!(opts.split, "photos");
    assert_eq!(opts.num_workers, 12);
    assert_eq!(opts.num_colors, colors);
}

#[test]
fn test_env_rejects_non_numeric_pool_size() {
    let mut opts = Opts::default();
    let err = apply_env_with(&mut opts, |k| {
        (k == "NUM_WORKERS").then(|| "many".to_string())
    })
    .unwrap_err();
    assert!(err.to_string().contains("NUM_WORKERS"));
}

#[test]
fn test_settings_file_applies_present_fields_only() {
    let file = parse_shardflow_toml(
        r#"
[settings]
output_bucket = "out"
shard_width = 1
workers = 6

[settings.resize]
width = 128
crop = true
extend = "copy"
"#,
    )
    .unwrap();
    let mut opts = Opts::default();
    let height = opts.resize.height;
    apply_file_to_opts(&file, &mut opts);
    assert_eq!(opts.output_bucket, Some(PathBuf::from("out")));
    assert_eq!(opts.shard_width, 1);
    assert_eq!(opts.num_workers, 6);
    assert_eq!(opts.resize.width, 128);
    assert_eq!(opts.resize.height, height);
    assert!(opts.resize.crop);
    assert_eq!(opts.resize.extend, ExtendMode::Copy);
    assert!(opts.data_bucket.is_none());
}

#[test]
fn test_settings_file_missing_is_none_and_malformed_is_an_error() {
    let tmp = TempDir::new().unwrap();
    assert!(load_shardflow_toml(tmp.path()).unwrap().is_none());

    std::fs::write(tmp.path().join(".shardflow.toml"), "[settings\nworkers = ").unwrap();
    let err = load_shardflow_toml(tmp.path()).unwrap_err();
    assert!(format!("{err:#}").contains(".shardflow.toml"));
}

#[test]
fn test_layering_holds_back_a_broken_settings_file() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(".shardflow.toml"), "[settings]\nworkers = \"six\"\n").unwrap();
    let common = CommonArgs {
        verbose: Some(true),
        config_dir: tmp.path().to_path_buf(),
    };

    let layered = layer_opts(&common).unwrap();
    assert_eq!(layered.skipped.len(), 1);
    assert!(format!("{:#}", layered.skipped[0]).contains(".shardflow.toml"));
    assert!(layered.opts.verbose);
}
