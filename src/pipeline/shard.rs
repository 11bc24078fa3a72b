//! Sharded enumeration: one listing thread per shard prefix, all forwarding pages onto one stream.

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::store::ObjectStore;
use crate::types::{EnumerationPage, Shard};
use crate::utils::config::ShardConsts;

use super::observer::RunObserver;

/// Every `width`-character hex suffix under `base`, in lexicographic order (`16^width` shards).
pub fn make_shards(base: &str, width: usize) -> Vec<Shard> {
    let mut suffixes = vec![String::new()];
    for _ in 0..width {
        suffixes = suffixes
            .iter()
            .flat_map(|head| {
                ShardConsts::HEX_CHARSET.iter().map(move |&c| {
                    let mut s = head.clone();
                    s.push(c as char);
                    s
                })
            })
            .collect();
    }
    suffixes.iter().map(|s| Shard::new(base, s)).collect()
}

/// What one shard thread did before returning.
#[derive(Clone, Debug)]
pub struct ShardOutcome {
    pub shard: Shard,
    pub pages: usize,
    pub keys: usize,
    /// Listing error that ended the shard early, if any.
    pub error: Option<String>,
}

/// Totals over every shard, returned by the enumeration barrier.
#[derive(Clone, Debug, Default)]
pub struct EnumerationStats {
    pub shards: usize,
    pub pages: usize,
    pub keys: usize,
    pub failed_shards: Vec<Shard>,
}

impl EnumerationStats {
    fn absorb(&mut self, outcome: ShardOutcome) {
        self.shards += 1;
        self.pages += outcome.pages;
        self.keys += outcome.keys;
        if outcome.error.is_some() {
            self.failed_shards.push(outcome.shard);
        }
    }
}

/// Completion barrier over all shard threads. The page stream closes when it fires.
pub struct EnumerationHandle {
    handle: JoinHandle<Result<EnumerationStats>>,
}

impl EnumerationHandle {
    pub fn wait(self) -> Result<EnumerationStats> {
        self.handle
            .join()
            .map_err(|_| anyhow!("enumeration supervisor panicked"))?
    }
}

/// Start one listing thread per shard. `page_tx` is owned by the supervisor and dropped only
/// after every shard thread has returned, so no thread can send on a closed stream.
pub fn spawn_enumerators(
    store: Arc<dyn ObjectStore>,
    shards: Vec<Shard>,
    page_tx: Sender<EnumerationPage>,
    observer: Arc<dyn RunObserver>,
) -> EnumerationHandle {
    let handle = thread::spawn(move || {
        let tasks: Vec<JoinHandle<ShardOutcome>> = shards
            .into_iter()
            .map(|shard| {
                let store = Arc::clone(&store);
                let page_tx = page_tx.clone();
                let observer = Arc::clone(&observer);
                thread::spawn(move || {
                    list_shard(store.as_ref(), shard, &page_tx, observer.as_ref())
                })
            })
            .collect();

        let mut stats = EnumerationStats::default();
        let mut panicked = 0_usize;
        for t in tasks {
            match t.join() {
                Ok(outcome) => stats.absorb(outcome),
                Err(_) => panicked += 1,
            }
        }
        drop(page_tx);
        debug!(
            "enumeration done: {} shards, {} pages, {} keys, {} failed",
            stats.shards,
            stats.pages,
            stats.keys,
            stats.failed_shards.len()
        );
        if panicked > 0 {
            return Err(anyhow!("{panicked} shard thread(s) panicked"));
        }
        Ok(stats)
    });
    EnumerationHandle { handle }
}

/// Paginate one shard, forwarding every page as it arrives (blocking until a dispatcher takes it).
/// A listing error ends the shard without retry; pages already sent stand.
pub fn list_shard(
    store: &dyn ObjectStore,
    shard: Shard,
    page_tx: &Sender<EnumerationPage>,
    observer: &dyn RunObserver,
) -> ShardOutcome {
    let mut outcome = ShardOutcome {
        shard: shard.clone(),
        pages: 0,
        keys: 0,
        error: None,
    };
    let mut token: Option<String> = None;
    loop {
        let page = match store.list_page(shard.prefix(), token.as_deref()) {
            Ok(page) => page,
            Err(e) => {
                observer.shard_failed(&shard, &e);
                outcome.error = Some(format!("{e:#}"));
                break;
            }
        };
        let keys = page.keys.len();
        let sent = page_tx.send(EnumerationPage {
            shard: shard.clone(),
            keys: page.keys,
        });
        if sent.is_err() {
            outcome.error = Some("page stream closed".to_string());
            break;
        }
        outcome.pages += 1;
        outcome.keys += keys;
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    outcome
}
