//! Machine Usecase
//!
//! Lookup by name or query, and the register-or-update decision. Stateless;
//! every call goes to the repository.

mod query;

pub use query::{MachineQuery, QueryField};

use crate::context::CallContext;
use crate::repository::MachineRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tinycluster_core::{Error, Machine, Result};
use tracing::{debug, instrument};

#[async_trait]
pub trait MachineUsecase: Send + Sync {
    async fn get_all_machines(&self, ctx: &CallContext) -> Result<Vec<Machine>>;

    /// First machine carrying `name`, if any.
    async fn get_machine_by_name(&self, ctx: &CallContext, name: &str) -> Result<Option<Machine>>;

    /// Every machine matching `query`, in store order.
    async fn get_machine_by_query(
        &self,
        ctx: &CallContext,
        query: &MachineQuery,
    ) -> Result<Vec<Machine>>;

    /// Update the record if any machine shares the name, IPv4 address or
    /// MAC of `machine`, otherwise register it.
    async fn register_or_update_machine(&self, ctx: &CallContext, machine: &Machine)
        -> Result<()>;

    async fn delete_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()>;
}

pub struct MachineService {
    repo: Arc<dyn MachineRepository>,
}

impl MachineService {
    pub fn new(repo: Arc<dyn MachineRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MachineUsecase for MachineService {
    async fn get_all_machines(&self, ctx: &CallContext) -> Result<Vec<Machine>> {
        self.repo.get_machines(ctx).await
    }

    async fn get_machine_by_name(&self, ctx: &CallContext, name: &str) -> Result<Option<Machine>> {
        let query = MachineQuery::new().with(QueryField::Name, name);
        let mut found = self.get_machine_by_query(ctx, &query).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    async fn get_machine_by_query(
        &self,
        ctx: &CallContext,
        query: &MachineQuery,
    ) -> Result<Vec<Machine>> {
        let machines = self.repo.get_machines(ctx).await?;
        Ok(machines.into_iter().filter(|m| query.matches(m)).collect())
    }

    #[instrument(skip(self, ctx, machine), fields(mac = %machine.mac))]
    async fn register_or_update_machine(
        &self,
        ctx: &CallContext,
        machine: &Machine,
    ) -> Result<()> {
        if machine.mac.trim().is_empty() {
            return Err(Error::InvalidArgument("machine MAC must not be empty".to_string()));
        }

        let query = MachineQuery::new()
            .with(QueryField::Name, machine.name.as_str())
            .with(QueryField::Ipv4, machine.ipv4_addr.as_str())
            .with(QueryField::Mac, machine.mac.as_str())
            .any();
        let existing = self.get_machine_by_query(ctx, &query).await?;

        if existing.is_empty() {
            debug!("No matching machine, registering");
            self.repo.register_machine(ctx, machine).await
        } else {
            debug!(matches = existing.len(), "Matching machine found, updating");
            self.repo.update_machine(ctx, machine).await
        }
    }

    async fn delete_machine(&self, ctx: &CallContext, machine: &Machine) -> Result<()> {
        self.repo.delete_machine(ctx, machine).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tinycluster_core::ErrorKind;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        List,
        Register(String),
        Update(String),
        Delete(String),
    }

    #[derive(Default)]
    struct FakeRepository {
        machines: Vec<Machine>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeRepository {
        fn with(machines: Vec<Machine>) -> Arc<Self> {
            Arc::new(Self {
                machines,
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl MachineRepository for FakeRepository {
        async fn get_machines(&self, _ctx: &CallContext) -> Result<Vec<Machine>> {
            self.record(Call::List);
            Ok(self.machines.clone())
        }

        async fn register_machine(&self, _ctx: &CallContext, machine: &Machine) -> Result<()> {
            self.record(Call::Register(machine.mac.clone()));
            Ok(())
        }

        async fn update_machine(&self, _ctx: &CallContext, machine: &Machine) -> Result<()> {
            self.record(Call::Update(machine.mac.clone()));
            Ok(())
        }

        async fn delete_machine(&self, _ctx: &CallContext, machine: &Machine) -> Result<()> {
            self.record(Call::Delete(machine.mac.clone()));
            Ok(())
        }
    }

    fn fleet() -> Vec<Machine> {
        vec![
            Machine::new("mac1", "machine1", "19.168.0.2"),
            Machine::new("mac2", "machine2", "19.168.1.2"),
            Machine::new("mac3", "machine2", "19.168.2.2"),
        ]
    }

    #[tokio::test]
    async fn test_get_machine_by_name() {
        let repo = FakeRepository::with(fleet());
        let usecase = MachineService::new(repo.clone());
        let ctx = CallContext::background();

        let found = usecase.get_machine_by_name(&ctx, "machine2").await.unwrap();
        assert_eq!(found.map(|m| m.mac), Some("mac2".to_string()));

        let missing = usecase.get_machine_by_name(&ctx, "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_machine_by_query_keeps_store_order() {
        let usecase = MachineService::new(FakeRepository::with(fleet()));
        let ctx = CallContext::background();

        let query = MachineQuery::new()
            .with(QueryField::Name, "machine2")
            .with(QueryField::Mac, "mac1")
            .any();
        let macs: Vec<String> = usecase
            .get_machine_by_query(&ctx, &query)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.mac)
            .collect();
        assert_eq!(macs, vec!["mac1", "mac2", "mac3"]);
    }

    #[tokio::test]
    async fn test_upsert_registers_unknown_machine() {
        let repo = FakeRepository::with(fleet());
        let usecase = MachineService::new(repo.clone());

        let fresh = Machine::new("mac9", "machine9", "19.168.9.2");
        usecase
            .register_or_update_machine(&CallContext::background(), &fresh)
            .await
            .unwrap();
        assert_eq!(repo.calls(), vec![Call::List, Call::Register("mac9".to_string())]);
    }

    #[tokio::test]
    async fn test_upsert_updates_on_ipv4_match() {
        let repo = FakeRepository::with(fleet());
        let usecase = MachineService::new(repo.clone());

        // Same address as machine1, different MAC and name
        let moved = Machine::new("mac7", "renamed", "19.168.0.2");
        usecase
            .register_or_update_machine(&CallContext::background(), &moved)
            .await
            .unwrap();
        assert_eq!(repo.calls(), vec![Call::List, Call::Update("mac7".to_string())]);
    }

    #[tokio::test]
    async fn test_upsert_updates_on_mac_match() {
        let repo = FakeRepository::with(fleet());
        let usecase = MachineService::new(repo.clone());

        let changed = Machine::new("mac1", "machine1-new", "19.168.0.99");
        usecase
            .register_or_update_machine(&CallContext::background(), &changed)
            .await
            .unwrap();
        assert_eq!(repo.calls(), vec![Call::List, Call::Update("mac1".to_string())]);
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty_mac() {
        let repo = FakeRepository::with(fleet());
        let usecase = MachineService::new(repo.clone());

        let err = usecase
            .register_or_update_machine(&CallContext::background(), &Machine::new("", "x", "y"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_passes_through() {
        let repo = FakeRepository::with(fleet());
        let usecase = MachineService::new(repo.clone());

        usecase
            .delete_machine(&CallContext::background(), &fleet()[0])
            .await
            .unwrap();
        assert_eq!(repo.calls(), vec![Call::Delete("mac1".to_string())]);
    }
}
