//! etcd Backend
//!
//! Translates the store transaction model onto etcd v3 transactions.

use super::{
    Compare, CompareOp, CompareTarget, Entry, KvClient, KvStore, Txn, TxnOp, TxnOpResponse,
    TxnResponse,
};
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions, SortOrder, SortTarget};
use std::sync::Arc;
use std::time::Duration;
use tinycluster_core::{Error, Result};
use tracing::debug;

/// Dial parameters for an etcd cluster.
#[derive(Debug, Clone)]
pub struct EtcdStore {
    endpoints: Arc<[String]>,
    connect_timeout: Duration,
}

impl EtcdStore {
    pub fn new(endpoints: Vec<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoints: endpoints.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    type Client = EtcdClient;

    async fn dial(&self) -> Result<EtcdClient> {
        let options = ConnectOptions::new().with_connect_timeout(self.connect_timeout);
        let client = Client::connect(&self.endpoints[..], Some(options))
            .await
            .map_err(|e| Error::other("failed to connect to etcd", e))?;
        debug!(endpoints = ?self.endpoints, "Connected to etcd");
        Ok(EtcdClient { client })
    }
}

/// A live etcd connection. Dropping it closes the channel.
pub struct EtcdClient {
    client: Client,
}

#[async_trait]
impl KvClient for EtcdClient {
    async fn range(&mut self, key: &str, prefix: bool) -> Result<Vec<Entry>> {
        let mut options = GetOptions::new().with_sort(SortTarget::Key, SortOrder::Ascend);
        if prefix {
            options = options.with_prefix();
        }
        let resp = self
            .client
            .get(key, Some(options))
            .await
            .map_err(|e| Error::other("etcd range failed", e))?;
        Ok(resp.kvs().iter().map(entry_from_kv).collect())
    }

    async fn txn(&mut self, txn: Txn) -> Result<TxnResponse> {
        let resp = self
            .client
            .txn(to_etcd_txn(txn))
            .await
            .map_err(|e| Error::other("etcd transaction failed", e))?;
        Ok(from_etcd_response(resp))
    }
}

fn entry_from_kv(kv: &etcd_client::KeyValue) -> Entry {
    Entry {
        key: String::from_utf8_lossy(kv.key()).into_owned(),
        value: kv.value().to_vec(),
        mod_revision: kv.mod_revision(),
        version: kv.version(),
    }
}

fn to_etcd_compare(cmp: Compare) -> etcd_client::Compare {
    let op = match cmp.op {
        CompareOp::Equal => etcd_client::CompareOp::Equal,
        CompareOp::Greater => etcd_client::CompareOp::Greater,
    };
    match cmp.target {
        CompareTarget::Version(version) => etcd_client::Compare::version(cmp.key, op, version),
        CompareTarget::ModRevision(revision) => {
            etcd_client::Compare::mod_revision(cmp.key, op, revision)
        }
    }
}

fn to_etcd_op(op: TxnOp) -> etcd_client::TxnOp {
    match op {
        TxnOp::Put { key, value } => etcd_client::TxnOp::put(key, value, None),
        TxnOp::Delete { key } => etcd_client::TxnOp::delete(key, None),
        TxnOp::Txn(inner) => etcd_client::TxnOp::txn(to_etcd_txn(inner)),
    }
}

fn to_etcd_txn(txn: Txn) -> etcd_client::Txn {
    let compares: Vec<_> = txn.compares.into_iter().map(to_etcd_compare).collect();
    let success: Vec<_> = txn.success.into_iter().map(to_etcd_op).collect();
    etcd_client::Txn::new().when(compares).and_then(success)
}

fn from_etcd_response(resp: etcd_client::TxnResponse) -> TxnResponse {
    // Only put, delete and nested txn ops are ever submitted
    let responses = resp
        .op_responses()
        .into_iter()
        .filter_map(|op| match op {
            etcd_client::TxnOpResponse::Put(_) => Some(TxnOpResponse::Put),
            etcd_client::TxnOpResponse::Delete(_) => Some(TxnOpResponse::Delete),
            etcd_client::TxnOpResponse::Txn(inner) => {
                Some(TxnOpResponse::Txn(from_etcd_response(inner)))
            }
            etcd_client::TxnOpResponse::Get(_) => None,
        })
        .collect();

    TxnResponse {
        succeeded: resp.succeeded(),
        responses,
    }
}
