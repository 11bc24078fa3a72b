//! Message queue collaborator: publish one body per key, and load inbound batches.
//!
//! [`SpoolQueue`] appends one JSON record per line to a spool file, which `process` can read back
//! as a batch. [`MemoryQueue`] collects records in process.

use anyhow::{Context, Result, anyhow};
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{BatchEvent, QueueRecord};

pub trait MessageQueue: Send + Sync {
    fn send(&self, body: &str) -> Result<()>;
}

/// Message ids are the first 32 hex chars of blake3(run nonce, sequence, body).
fn message_id(nonce: &[u8; 16], seq: u64, body: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(nonce);
    hasher.update(&seq.to_le_bytes());
    hasher.update(body.as_bytes());
    hasher.finalize().to_hex().as_str()[..32].to_string()
}

/// Distinguishes runs appending to the same spool, so ids never repeat across runs.
fn run_nonce(namespace: &str) -> [u8; 16] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = blake3::Hasher::new();
    hasher.update(namespace.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let mut nonce = [0u8; 16];
    nonce.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
    nonce
}

/// Append-only JSON-lines spool file standing in for the queue target.
pub struct SpoolQueue {
    path: PathBuf,
    nonce: [u8; 16],
    seq: AtomicU64,
    writer: Mutex<LineWriter<File>>,
}

impl SpoolQueue {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create spool directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open queue spool {}", path.display()))?;
        Ok(SpoolQueue {
            path: path.to_path_buf(),
            nonce: run_nonce(&path.to_string_lossy()),
            seq: AtomicU64::new(0),
            writer: Mutex::new(LineWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageQueue for SpoolQueue {
    fn send(&self, body: &str) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let record = QueueRecord {
            message_id: message_id(&self.nonce, seq, body),
            body: body.to_string(),
        };
        let line = serde_json::to_string(&record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("spool writer lock poisoned"))?;
        writeln!(writer, "{line}").with_context(|| format!("append to {}", self.path.display()))
    }
}

/// In-process queue; keeps every record sent.
pub struct MemoryQueue {
    nonce: [u8; 16],
    seq: AtomicU64,
    records: Mutex<Vec<QueueRecord>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        MemoryQueue {
            nonce: run_nonce("memory"),
            seq: AtomicU64::new(0),
            records: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Result<Vec<QueueRecord>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| anyhow!("memory queue lock poisoned"))?
            .clone())
    }
}

impl MessageQueue for MemoryQueue {
    fn send(&self, body: &str) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let record = QueueRecord {
            message_id: message_id(&self.nonce, seq, body),
            body: body.to_string(),
        };
        self.records
            .lock()
            .map_err(|_| anyhow!("memory queue lock poisoned"))?
            .push(record);
        Ok(())
    }
}

/// Accepts and drops every message (dry runs).
#[derive(Debug, Default)]
pub struct DiscardQueue {
    sent: AtomicU64,
}

impl DiscardQueue {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl MessageQueue for DiscardQueue {
    fn send(&self, _body: &str) -> Result<()> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Parse an inbound batch: either an event document `{"Records":[...]}` or spool lines.
pub fn parse_batch(input: &str) -> Result<Vec<QueueRecord>> {
    if let Ok(event) = serde_json::from_str::<BatchEvent>(input) {
        return Ok(event.records);
    }
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<QueueRecord>(line)
                .with_context(|| format!("batch line {}: not a queue record", i + 1))
        })
        .collect()
}

pub fn load_batch(path: &Path) -> Result<Vec<QueueRecord>> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("read batch {}", path.display()))?;
    parse_batch(&input).with_context(|| format!("parse batch {}", path.display()))
}
