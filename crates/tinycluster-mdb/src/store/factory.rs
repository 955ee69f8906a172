//! Store Client Factory
//!
//! Opens one client per repository call. The dial runs in a spawned task that
//! is raced against the dial timeout and the caller's context; whichever
//! loses is dropped, and an abandoned dial is aborted so its late result is
//! never reused.

use super::KvStore;
use crate::context::CallContext;
use crate::observability::{events, metrics};
use std::time::{Duration, Instant};
use tinycluster_core::{Error, Result};
use tracing::debug;

/// Default bound on opening a store connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientFactory<S> {
    store: S,
    dial_timeout: Duration,
}

impl<S: KvStore> ClientFactory<S> {
    pub fn new(store: S, dial_timeout: Duration) -> Self {
        Self {
            store,
            dial_timeout,
        }
    }

    /// Open a client, failing with [`Error::TimedOut`] if neither the dial
    /// timeout nor the context allow it to finish.
    pub async fn new_client(&self, ctx: &CallContext) -> Result<S::Client> {
        let store = self.store.clone();
        let started = Instant::now();
        let mut dial = tokio::spawn(async move { store.dial().await });

        // An ended context wins even over a dial that is already done
        let outcome = tokio::select! {
            biased;
            reason = ctx.done() => {
                dial.abort();
                events::store_dial_timed_out(self.dial_timeout, &reason.to_string());
                Err(Error::TimedOut)
            }
            _ = tokio::time::sleep(self.dial_timeout) => {
                dial.abort();
                events::store_dial_timed_out(self.dial_timeout, "dial_timeout");
                Err(Error::TimedOut)
            }
            joined = &mut dial => match joined {
                Ok(result) => result,
                Err(e) => Err(Error::other("store dial task failed", e)),
            },
        };

        metrics::record_dial(started.elapsed(), outcome.is_ok());
        if outcome.is_ok() {
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Store client ready");
        }
        outcome
    }
}
