//! In-memory store backend for testing and local development
//!
//! Follows etcd's revision model: a single store-wide revision is bumped once
//! per transaction that writes, every written key records it as its
//! `mod_revision`, and deleting a key drops it entirely so its version reads
//! as 0 again.

use super::{
    Compare, CompareTarget, Entry, KvClient, KvStore, Txn, TxnOp, TxnOpResponse, TxnResponse,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tinycluster_core::{Error, Result};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    mod_revision: i64,
    version: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    revision: i64,
    data: BTreeMap<String, StoredValue>,
}

impl MemoryState {
    fn entry(&self, key: &str) -> Option<Entry> {
        self.data.get(key).map(|stored| Entry {
            key: key.to_string(),
            value: stored.value.clone(),
            mod_revision: stored.mod_revision,
            version: stored.version,
        })
    }

    fn compare_holds(&self, cmp: &Compare) -> bool {
        let stored = self.data.get(&cmp.key);
        let (actual, expected) = match cmp.target {
            CompareTarget::Version(v) => (stored.map_or(0, |s| s.version), v),
            CompareTarget::ModRevision(r) => (stored.map_or(0, |s| s.mod_revision), r),
        };
        cmp.op.holds(actual, expected)
    }

    fn put(&mut self, key: &str, value: Vec<u8>, revision: i64) {
        let version = self.data.get(key).map_or(0, |s| s.version) + 1;
        self.data.insert(
            key.to_string(),
            StoredValue {
                value,
                mod_revision: revision,
                version,
            },
        );
    }

    fn execute(&mut self, txn: &Txn, revision: i64, wrote: &mut bool) -> TxnResponse {
        let succeeded = txn.compares.iter().all(|cmp| self.compare_holds(cmp));
        if !succeeded {
            return TxnResponse {
                succeeded,
                responses: Vec::new(),
            };
        }

        let mut responses = Vec::with_capacity(txn.success.len());
        for op in &txn.success {
            let response = match op {
                TxnOp::Put { key, value } => {
                    self.put(key, value.clone(), revision);
                    *wrote = true;
                    TxnOpResponse::Put
                }
                TxnOp::Delete { key } => {
                    *wrote |= self.data.remove(key).is_some();
                    TxnOpResponse::Delete
                }
                TxnOp::Txn(inner) => TxnOpResponse::Txn(self.execute(inner, revision, wrote)),
            };
            responses.push(response);
        }

        TxnResponse {
            succeeded,
            responses,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    txn_count: AtomicU64,
    dial_delay: Mutex<Option<Duration>>,
    unreachable: Mutex<bool>,
}

/// Shared in-process store. Clones (and every client dialed from them) see
/// the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent dial take `delay` before returning.
    pub fn set_dial_delay(&self, delay: Option<Duration>) {
        *lock(&self.shared.dial_delay) = delay;
    }

    /// Make every subsequent dial fail as if no endpoint answered.
    pub fn set_unreachable(&self, unreachable: bool) {
        *lock(&self.shared.unreachable) = unreachable;
    }

    /// Unconditional write, bypassing any guard. Returns the new revision.
    pub fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> i64 {
        let mut state = lock(&self.shared.state);
        state.revision += 1;
        let revision = state.revision;
        state.put(key, value.into(), revision);
        revision
    }

    /// Unconditional delete. Returns whether the key existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = lock(&self.shared.state);
        let existed = state.data.remove(key).is_some();
        if existed {
            state.revision += 1;
        }
        existed
    }

    pub fn entry(&self, key: &str) -> Option<Entry> {
        lock(&self.shared.state).entry(key)
    }

    /// Current store-wide revision.
    pub fn revision(&self) -> i64 {
        lock(&self.shared.state).revision
    }

    /// Number of transactions executed through clients so far.
    pub fn txn_count(&self) -> u64 {
        self.shared.txn_count.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock leaves the map consistent (every
    // mutation is a single insert/remove), so poisoning is ignored.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl KvStore for MemoryStore {
    type Client = MemoryClient;

    async fn dial(&self) -> Result<MemoryClient> {
        let delay = *lock(&self.shared.dial_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *lock(&self.shared.unreachable) {
            return Err(Error::other(
                "failed to connect to store",
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no reachable endpoint"),
            ));
        }
        Ok(MemoryClient {
            shared: self.shared.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    shared: Arc<Shared>,
}

#[async_trait]
impl KvClient for MemoryClient {
    async fn range(&mut self, key: &str, prefix: bool) -> Result<Vec<Entry>> {
        let state = lock(&self.shared.state);
        if !prefix {
            return Ok(state.entry(key).into_iter().collect());
        }
        let entries = state
            .data
            .range(key.to_string()..)
            .take_while(|(k, _)| k.starts_with(key))
            .map(|(k, stored)| Entry {
                key: k.clone(),
                value: stored.value.clone(),
                mod_revision: stored.mod_revision,
                version: stored.version,
            })
            .collect();
        Ok(entries)
    }

    async fn txn(&mut self, txn: Txn) -> Result<TxnResponse> {
        self.shared.txn_count.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.shared.state);
        let revision = state.revision + 1;
        let mut wrote = false;
        let response = state.execute(&txn, revision, &mut wrote);
        if wrote {
            state.revision = revision;
        }
        Ok(response)
    }
}
