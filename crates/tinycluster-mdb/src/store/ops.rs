//! Primitive Operations
//!
//! Conditional reads and writes, each issued as a single store transaction so
//! unrelated callers can never interleave between a check and its write.

use super::{Compare, CompareOp, Entry, KvClient, Txn, TxnOp, TxnResponse};
use crate::context::CallContext;
use crate::observability::{events, metrics};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tinycluster_core::{Error, Result};

/// Pacing between conflicting update attempts.
///
/// Attempts are unbounded; only the wait between them is shaped here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Value of `key`, or [`Error::NotFound`].
pub async fn get<C: KvClient>(ctx: &CallContext, client: &mut C, key: &str) -> Result<Vec<u8>> {
    let (value, _) = get_with_revision(ctx, client, key).await?;
    Ok(value)
}

/// Value of `key` together with its current mod revision.
pub async fn get_with_revision<C: KvClient>(
    ctx: &CallContext,
    client: &mut C,
    key: &str,
) -> Result<(Vec<u8>, i64)> {
    let entries = ctx.run(client.range(key, false)).await?;
    match entries.into_iter().find(|e| e.version > 0) {
        Some(entry) => Ok((entry.value, entry.mod_revision)),
        None => Err(Error::NotFound),
    }
}

/// Values of every live key under `prefix`, ordered by key.
pub async fn get_all_by_prefix<C: KvClient>(
    ctx: &CallContext,
    client: &mut C,
    prefix: &str,
) -> Result<Vec<Vec<u8>>> {
    let entries: Vec<Entry> = ctx.run(client.range(prefix, true)).await?;
    Ok(entries
        .into_iter()
        .filter(|e| e.version > 0)
        .map(|e| e.value)
        .collect())
}

/// Write `value` at `key` only if the key has no live version.
pub async fn create_if_absent<C: KvClient>(
    ctx: &CallContext,
    client: &mut C,
    key: &str,
    value: Vec<u8>,
) -> Result<()> {
    let txn = Txn::new()
        .when([Compare::version(key, CompareOp::Equal, 0)])
        .and_then([TxnOp::put(key, value)]);
    let resp = submit(ctx, client, "create", txn).await?;
    if !resp.succeeded {
        return Err(Error::AlreadyExists);
    }
    Ok(())
}

/// Replace the value at `key`, guarded by its mod revision.
///
/// When another writer lands between the caller's read and this write, the
/// revision is re-read and the write resubmitted until it lands, the key
/// disappears ([`Error::NotFound`]), or the context ends.
pub async fn update_if_unmodified<C: KvClient>(
    ctx: &CallContext,
    client: &mut C,
    key: &str,
    expected_revision: i64,
    value: Vec<u8>,
    policy: &RetryPolicy,
) -> Result<()> {
    let mut revision = expected_revision;
    let mut backoff = policy.backoff();
    let mut attempt: u32 = 1;

    loop {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let txn = Txn::new()
            .when([Compare::version(key, CompareOp::Greater, 0)])
            .and_then([TxnOp::txn(
                Txn::new()
                    .when([Compare::mod_revision(key, CompareOp::Equal, revision)])
                    .and_then([TxnOp::put(key, value.clone())]),
            )]);
        let resp = submit(ctx, client, "update", txn).await?;
        if !resp.succeeded {
            return Err(Error::NotFound);
        }
        match resp.nested(0) {
            Some(inner) if inner.succeeded => return Ok(()),
            Some(_) => {}
            None => {
                return Err(Error::other(
                    "malformed update response",
                    "missing nested transaction result",
                ))
            }
        }

        metrics::record_update_conflict();
        events::update_conflict(key, attempt, revision);

        if let Some(wait) = backoff.next_backoff() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = ctx.done() => continue,
            }
        }

        let (_, fresh) = get_with_revision(ctx, client, key).await?;
        revision = fresh;
        attempt += 1;
    }
}

/// Delete `key` if it has a live version, else [`Error::NotFound`].
pub async fn delete_if_present<C: KvClient>(
    ctx: &CallContext,
    client: &mut C,
    key: &str,
) -> Result<()> {
    let txn = Txn::new()
        .when([Compare::version(key, CompareOp::Greater, 0)])
        .and_then([TxnOp::delete(key)]);
    let resp = submit(ctx, client, "delete", txn).await?;
    if !resp.succeeded {
        return Err(Error::NotFound);
    }
    Ok(())
}

async fn submit<C: KvClient>(
    ctx: &CallContext,
    client: &mut C,
    op: &'static str,
    txn: Txn,
) -> Result<TxnResponse> {
    let result = ctx.run(client.txn(txn)).await;
    let outcome = match &result {
        Ok(resp) if resp.succeeded => "succeeded",
        Ok(_) => "guard_failed",
        Err(_) => "error",
    };
    metrics::record_txn(op, outcome);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemoryClient, MemoryStore};
    use tinycluster_core::ErrorKind;

    async fn fixture(pairs: &[(&str, &str)]) -> (MemoryStore, MemoryClient) {
        let store = MemoryStore::new();
        for (k, v) in pairs {
            store.put(k, *v);
        }
        let client = store.dial().await.unwrap();
        (store, client)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_get_existing_value() {
        let (_, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::background();
        assert_eq!(get(&ctx, &mut client, "key").await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn test_get_missing_value() {
        let (_, mut client) = fixture(&[]).await;
        let ctx = CallContext::background();
        let err = get(&ctx, &mut client, "notfound").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_get_with_revision_tracks_writes() {
        let (store, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::background();

        let (_, initial) = get_with_revision(&ctx, &mut client, "key").await.unwrap();
        for _ in 0..3 {
            store.put("key", "value");
        }
        let (value, current) = get_with_revision(&ctx, &mut client, "key").await.unwrap();
        assert_eq!(value, b"value");
        assert_eq!(current - initial, 3);
    }

    #[tokio::test]
    async fn test_get_all_by_prefix() {
        let (_, mut client) =
            fixture(&[("key", "value"), ("key/key1", "value1"), ("key/key2", "value2")]).await;
        let ctx = CallContext::background();

        let values = get_all_by_prefix(&ctx, &mut client, "key").await.unwrap();
        assert_eq!(values, vec![b"value".to_vec(), b"value1".to_vec(), b"value2".to_vec()]);

        let none = get_all_by_prefix(&ctx, &mut client, "other").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_create_if_absent() {
        let (store, mut client) = fixture(&[]).await;
        let ctx = CallContext::background();

        create_if_absent(&ctx, &mut client, "key", b"value".to_vec())
            .await
            .unwrap();
        assert_eq!(store.entry("key").unwrap().value, b"value");

        let err = create_if_absent(&ctx, &mut client, "key", b"other".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.entry("key").unwrap().value, b"value");
    }

    #[tokio::test]
    async fn test_update_with_current_revision() {
        let (store, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::background();
        let (_, rev) = get_with_revision(&ctx, &mut client, "key").await.unwrap();

        update_if_unmodified(&ctx, &mut client, "key", rev, b"next".to_vec(), &fast_policy())
            .await
            .unwrap();
        assert_eq!(store.entry("key").unwrap().value, b"next");
        assert_eq!(store.txn_count(), 1);
    }

    #[tokio::test]
    async fn test_update_retries_after_concurrent_write() {
        let (store, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::background();
        let (_, stale) = get_with_revision(&ctx, &mut client, "key").await.unwrap();

        store.put("key", "someone else");

        update_if_unmodified(&ctx, &mut client, "key", stale, b"mine".to_vec(), &fast_policy())
            .await
            .unwrap();
        let entry = store.entry("key").unwrap();
        assert_eq!(entry.value, b"mine");
        assert!(entry.mod_revision > stale + 1);
        assert_eq!(store.txn_count(), 2, "one conflicting attempt, one landing");
    }

    #[tokio::test]
    async fn test_update_after_delete_is_not_found() {
        let (store, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::background();
        let (_, rev) = get_with_revision(&ctx, &mut client, "key").await.unwrap();

        store.delete("key");

        let err = update_if_unmodified(&ctx, &mut client, "key", rev, b"x".to_vec(), &fast_policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.entry("key").is_none());
    }

    #[tokio::test]
    async fn test_update_checks_cancellation_before_attempt() {
        let (store, mut client) = fixture(&[("key", "value")]).await;
        let (ctx, handle) = CallContext::cancellable();
        let (_, rev) = get_with_revision(&ctx, &mut client, "key").await.unwrap();

        handle.cancel();

        let err = update_if_unmodified(&ctx, &mut client, "key", rev, b"x".to_vec(), &fast_policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContextCanceled);
        assert_eq!(store.txn_count(), 0);
        assert_eq!(store.entry("key").unwrap().value, b"value");
    }

    #[tokio::test]
    async fn test_update_expired_deadline_times_out() {
        let (_, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::with_timeout(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let err = update_if_unmodified(&ctx, &mut client, "key", 1, b"x".to_vec(), &fast_policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_delete_if_present() {
        let (store, mut client) = fixture(&[("key", "value")]).await;
        let ctx = CallContext::background();

        delete_if_present(&ctx, &mut client, "key").await.unwrap();
        assert!(store.entry("key").is_none());

        let err = delete_if_present(&ctx, &mut client, "key").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_retry_policy_backoff_is_unbounded() {
        let mut backoff = RetryPolicy::default().backoff();
        for _ in 0..64 {
            assert!(backoff.next_backoff().is_some());
        }
    }
}
