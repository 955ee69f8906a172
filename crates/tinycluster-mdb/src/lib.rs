//! tinycluster machine database
//!
//! Optimistic-concurrency machine inventory over etcd: store abstraction and
//! primitives, the machine repository, and the lookup/upsert usecase.

pub mod config;
pub mod context;
pub mod observability;
pub mod repository;
pub mod store;
pub mod usecase;
pub mod version;

pub use config::MdbConfig;
pub use context::{CallContext, CancelHandle, ContextError};
pub use repository::{MachineKeys, MachineRepository, StoreMachineRepository};
pub use usecase::{MachineQuery, MachineService, MachineUsecase, QueryField};
