//! Object storage collaborator: paginated list, get and put by key.
//!
//! [`LocalStore`] treats a directory as a bucket (keys are `/`-separated paths relative to it).
//! [`MemoryStore`] keeps objects in a sorted map, for dry runs and tests.

use anyhow::{Context, Result, anyhow, bail};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

use crate::utils::config::ShardConsts;

/// One listing step: up to a page of keys in ascending order, and the token for the next step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// `Some` when more keys remain under the prefix; pass it back as `continuation`.
    pub next_token: Option<String>,
}

pub trait ObjectStore: Send + Sync {
    /// List keys starting with `prefix` that sort after `continuation`.
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    fn get(&self, key: &str) -> Result<Vec<u8>>;

    fn put(&self, key: &str, body: &[u8]) -> Result<()>;
}

/// Cut a sorted, prefix-filtered key list into one page after `continuation`.
fn page_from_sorted(keys: &[String], continuation: Option<&str>, page_size: usize) -> ListPage {
    let start = match continuation {
        Some(token) => keys.partition_point(|k| k.as_str() <= token),
        None => 0,
    };
    let page: Vec<String> = keys[start..].iter().take(page_size).cloned().collect();
    let next_token = if start + page.len() < keys.len() {
        page.last().cloned()
    } else {
        None
    };
    ListPage {
        keys: page,
        next_token,
    }
}

/// Convert a path relative to the bucket root into a key (forward slashes on every platform).
pub fn path_to_key(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Directory-backed bucket.
///
/// A listing walks the prefix's directory once, on its first page. Later pages are cut from that
/// sorted snapshot, which is dropped when the last page is served.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
    listings: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

impl LocalStore {
    /// Open an existing directory as a bucket.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("bucket directory does not exist: {}", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalize bucket {}", root.display()))?;
        Ok(LocalStore {
            root,
            page_size: ShardConsts::DEFAULT_PAGE_SIZE,
            listings: Mutex::new(HashMap::new()),
        })
    }

    /// Open a bucket directory, creating it first if needed (output buckets).
    pub fn open_or_create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create bucket directory {}", root.display()))?;
        Self::open(root)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn listings(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Vec<String>>>>> {
        self.listings
            .lock()
            .map_err(|_| anyhow!("listing cache lock poisoned"))
    }

    /// Every key under `prefix`, sorted.
    fn walk_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // Only the directory holding the prefix's last segment can contain matches.
        let (dir, leaf) = match prefix.rfind('/') {
            Some(i) => (self.root.join(&prefix[..i]), &prefix[i + 1..]),
            None => (self.root.clone(), prefix),
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let walker = WalkDir::new(&dir).into_iter().filter_entry(|e| {
            e.depth() != 1 || e.file_name().to_str().is_some_and(|n| n.starts_with(leaf))
        });
        for entry in walker {
            let entry = entry.with_context(|| format!("list objects under {prefix:?}"))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = path_to_key(rel);
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|seg| seg == "..") {
            bail!("invalid object key {key:?}");
        }
        Ok(self.root.join(key.trim_start_matches('/')))
    }
}

impl ObjectStore for LocalStore {
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let cached = match continuation {
            Some(_) => self.listings()?.get(prefix).cloned(),
            None => None,
        };
        // Walk outside the lock; other shards list concurrently.
        let keys = match cached {
            Some(keys) => keys,
            None => Arc::new(self.walk_prefix(prefix)?),
        };

        let page = page_from_sorted(&keys, continuation, self.page_size);
        let mut listings = self.listings()?;
        if page.next_token.is_some() {
            listings.insert(prefix.to_string(), keys);
        } else {
            listings.remove(prefix);
        }
        Ok(page)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        std::fs::read(&path).with_context(|| format!("read object {}", path.display()))
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(&path, body).with_context(|| format!("write object {}", path.display()))
    }
}

/// In-process bucket over a sorted map.
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            page_size: ShardConsts::DEFAULT_PAGE_SIZE,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn objects(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.objects()?.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.objects()?.len())
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let objects = self.objects()?;
        let start = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix),
        };
        let mut matching = objects
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(k, _)| k)
            .skip_while(|k| k.as_str() < prefix)
            .take_while(|k| k.starts_with(prefix));
        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };
        Ok(ListPage { keys, next_token })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects()?
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no such key: {key}"))
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        self.objects()?.insert(key.to_string(), body.to_vec());
        Ok(())
    }
}
