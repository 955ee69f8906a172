//! Machine Repository
//!
//! Maps [`Machine`] records onto store keys of the form
//! `/<namespace>/machines/v1/<mac>`, each holding the JSON-encoded record.
//! Every call opens its own client through the [`ClientFactory`] and drops it
//! before returning.

use crate::config::DEFAULT_NAMESPACE;
use crate::context::CallContext;
use crate::observability::events;
use crate::store::ops::{self, RetryPolicy};
use crate::store::{ClientFactory, KvStore};
use async_trait::async_trait;
use tinycluster_core::{Error, Machine, Result};
use tracing::{debug, instrument};

#[async_trait]
pub trait MachineRepository: Send + Sync {
    /// All live machines, ordered by MAC.
    async fn get_machines(&self, ctx: &CallContext) -> Result<Vec<Machine>>;

    /// Create a record. [`Error::AlreadyExists`] if the MAC is taken.
    async fn register_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()>;

    /// Replace the record with the same MAC. [`Error::NotFound`] if absent.
    async fn update_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()>;

    /// Remove the record with the same MAC. [`Error::NotFound`] if absent.
    async fn delete_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()>;
}

/// Key layout for machine records under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineKeys {
    prefix: String,
}

impl MachineKeys {
    /// Surrounding slashes in `namespace` are ignored; an empty namespace
    /// falls back to [`DEFAULT_NAMESPACE`].
    pub fn new(namespace: &str) -> Self {
        let namespace = match namespace.trim_matches('/') {
            "" => DEFAULT_NAMESPACE,
            trimmed => trimmed,
        };
        Self {
            prefix: format!("/{namespace}/machines/v1/"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the record for `mac`. A blank MAC would address the prefix
    /// itself, so it is rejected with [`Error::InvalidArgument`].
    pub fn key(&self, mac: &str) -> Result<String> {
        if mac.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "machine MAC must not be empty".to_string(),
            ));
        }
        Ok(format!("{}{}", self.prefix, mac))
    }
}

/// [`MachineRepository`] backed by a [`KvStore`].
pub struct StoreMachineRepository<S> {
    factory: ClientFactory<S>,
    keys: MachineKeys,
    retry: RetryPolicy,
}

impl<S: KvStore> StoreMachineRepository<S> {
    pub fn new(factory: ClientFactory<S>, namespace: &str) -> Self {
        Self {
            factory,
            keys: MachineKeys::new(namespace),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn keys(&self) -> &MachineKeys {
        &self.keys
    }
}

fn encode(machine: &Machine) -> Result<Vec<u8>> {
    serde_json::to_vec(machine).map_err(|e| Error::other("failed to encode machine record", e))
}

fn decode(bytes: &[u8]) -> Result<Machine> {
    serde_json::from_slice(bytes).map_err(|e| Error::other("failed to decode machine record", e))
}

#[async_trait]
impl<S: KvStore> MachineRepository for StoreMachineRepository<S> {
    #[instrument(skip(self, ctx))]
    async fn get_machines(&self, ctx: &CallContext) -> Result<Vec<Machine>> {
        let mut client = self.factory.new_client(ctx).await?;
        let values = ops::get_all_by_prefix(ctx, &mut client, self.keys.prefix()).await?;
        let machines = values
            .iter()
            .map(|bytes| decode(bytes))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = machines.len(), "Loaded machines");
        Ok(machines)
    }

    #[instrument(skip(self, ctx, machine), fields(mac = %machine.mac))]
    async fn register_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()> {
        let key = self.keys.key(&machine.mac)?;
        let value = encode(machine)?;
        let mut client = self.factory.new_client(ctx).await?;
        ops::create_if_absent(ctx, &mut client, &key, value).await?;
        events::machine_registered(&machine.mac, &machine.name, &machine.ipv4_addr);
        Ok(())
    }

    #[instrument(skip(self, ctx, machine), fields(mac = %machine.mac))]
    async fn update_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()> {
        let key = self.keys.key(&machine.mac)?;
        let mut client = self.factory.new_client(ctx).await?;

        let (bytes, revision) = ops::get_with_revision(ctx, &mut client, &key).await?;
        if decode(&bytes)? == *machine {
            events::machine_unchanged(&machine.mac);
            return Ok(());
        }

        let value = encode(machine)?;
        ops::update_if_unmodified(ctx, &mut client, &key, revision, value, &self.retry).await?;
        events::machine_updated(&machine.mac, &machine.name, &machine.ipv4_addr);
        Ok(())
    }

    #[instrument(skip(self, ctx, machine), fields(mac = %machine.mac))]
    async fn delete_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()> {
        let key = self.keys.key(&machine.mac)?;
        let mut client = self.factory.new_client(ctx).await?;
        ops::delete_if_present(ctx, &mut client, &key).await?;
        events::machine_deleted(&machine.mac);
        Ok(())
    }
}
