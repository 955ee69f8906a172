//! Structured Events
//!
//! Each event type has a dedicated function so field names stay consistent
//! wherever the event is emitted.
//!
//! Event types:
//! - `machine_registered` - A new machine record was created
//! - `machine_updated` - An existing machine record was replaced
//! - `machine_unchanged` - An update carried no change and was skipped
//! - `machine_deleted` - A machine record was removed
//! - `update_conflict` - A guarded update lost a race and will retry
//! - `store_dial_timed_out` - Opening a store client was abandoned
//! - `query_key_ignored` - A query carried a key with no matching field

use std::time::Duration;
use tracing::{debug, info, warn};

/// Emit a machine registered event
pub fn machine_registered(mac: &str, name: &str, ipv4_addr: &str) {
    info!(
        event_type = "machine_registered",
        mac = %mac,
        name = %name,
        ipv4_addr = %ipv4_addr,
        "Machine registered"
    );
}

/// Emit a machine updated event
pub fn machine_updated(mac: &str, name: &str, ipv4_addr: &str) {
    info!(
        event_type = "machine_updated",
        mac = %mac,
        name = %name,
        ipv4_addr = %ipv4_addr,
        "Machine updated"
    );
}

pub fn machine_unchanged(mac: &str) {
    debug!(
        event_type = "machine_unchanged",
        mac = %mac,
        "Machine unchanged, skipping write"
    );
}

/// Emit a machine deleted event
pub fn machine_deleted(mac: &str) {
    info!(
        event_type = "machine_deleted",
        mac = %mac,
        "Machine deleted"
    );
}

/// Emit an update conflict event
pub fn update_conflict(key: &str, attempt: u32, expected_revision: i64) {
    debug!(
        event_type = "update_conflict",
        key = %key,
        attempt = attempt,
        expected_revision = expected_revision,
        "Concurrent write detected, retrying update"
    );
}

/// Emit a store dial timed out event
pub fn store_dial_timed_out(dial_timeout: Duration, reason: &str) {
    warn!(
        event_type = "store_dial_timed_out",
        dial_timeout_ms = dial_timeout.as_millis() as u64,
        reason = %reason,
        "Store dial timed out"
    );
}

pub fn query_key_ignored(key: &str) {
    debug!(
        event_type = "query_key_ignored",
        key = %key,
        "Ignoring unknown query key"
    );
}
