//! Store Abstraction
//!
//! The machine database needs four things from its key-value store:
//! linearizable point reads, prefix reads, atomic multi-condition
//! transactions, and a per-key revision that grows on every write. etcd v3
//! provides all of them; [`MemoryStore`] provides the same semantics
//! in-process for tests and local runs.
//!
//! ```text
//! repository ──▶ ops (get / create / update / delete)
//!                  │
//!                  ▼
//!          ClientFactory::new_client ──▶ KvStore::dial ──▶ KvClient
//!                                                         │
//!                                           range() / txn(Txn)
//! ```

mod etcd;
mod factory;
mod memory;
pub mod ops;

pub use etcd::{EtcdClient, EtcdStore};
pub use factory::{ClientFactory, DEFAULT_DIAL_TIMEOUT};
pub use memory::{MemoryClient, MemoryStore};

use async_trait::async_trait;
use tinycluster_core::Result;

/// A live key/value pair as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
    /// Store revision of the last write to this key
    pub mod_revision: i64,
    /// Number of writes since the key was (re)created; 0 means absent
    pub version: i64,
}

/// A dialable store handle. Cloning is cheap; each dial yields a fresh client.
#[async_trait]
pub trait KvStore: Clone + Send + Sync + 'static {
    type Client: KvClient;

    async fn dial(&self) -> Result<Self::Client>;
}

/// A live connection to the store.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// Read `key`, or every key starting with `key` when `prefix` is set.
    /// Results are ordered by key.
    async fn range(&mut self, key: &str, prefix: bool) -> Result<Vec<Entry>>;

    /// Execute `txn` atomically.
    async fn txn(&mut self, txn: Txn) -> Result<TxnResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    Greater,
}

impl CompareOp {
    pub fn holds(self, actual: i64, expected: i64) -> bool {
        match self {
            CompareOp::Equal => actual == expected,
            CompareOp::Greater => actual > expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareTarget {
    Version(i64),
    ModRevision(i64),
}

/// A transaction guard over one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compare {
    pub key: String,
    pub op: CompareOp,
    pub target: CompareTarget,
}

impl Compare {
    pub fn version(key: impl Into<String>, op: CompareOp, version: i64) -> Self {
        Self {
            key: key.into(),
            op,
            target: CompareTarget::Version(version),
        }
    }

    pub fn mod_revision(key: impl Into<String>, op: CompareOp, revision: i64) -> Self {
        Self {
            key: key.into(),
            op,
            target: CompareTarget::ModRevision(revision),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    Txn(Txn),
}

impl TxnOp {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        TxnOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        TxnOp::Delete { key: key.into() }
    }

    pub fn txn(txn: Txn) -> Self {
        TxnOp::Txn(txn)
    }
}

/// `if all(compares) { success }`, executed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txn {
    pub compares: Vec<Compare>,
    pub success: Vec<TxnOp>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, compares: impl IntoIterator<Item = Compare>) -> Self {
        self.compares.extend(compares);
        self
    }

    pub fn and_then(mut self, ops: impl IntoIterator<Item = TxnOp>) -> Self {
        self.success.extend(ops);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOpResponse {
    Put,
    Delete,
    Txn(TxnResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnResponse {
    /// Whether the guards held (the ops ran)
    pub succeeded: bool,
    pub responses: Vec<TxnOpResponse>,
}

impl TxnResponse {
    /// The response of a nested transaction at position `index`.
    pub fn nested(&self, index: usize) -> Option<&TxnResponse> {
        match self.responses.get(index) {
            Some(TxnOpResponse::Txn(inner)) => Some(inner),
            _ => None,
        }
    }
}
