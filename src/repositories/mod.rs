//! Repository layer for data access operations.
//!
//! Services depend on the store traits; the Postgres repositories are the
//! production implementations.

mod credit_repo;
mod message_repo;
mod traits;
mod workflow_repo;

#[cfg(test)]
pub mod memory;

use std::sync::Arc;

pub use credit_repo::CreditRepository;
pub use message_repo::MessageRepository;
pub use traits::{LedgerStore, MessageStore, WorkflowStore};
pub use workflow_repo::WorkflowRepository;

use crate::db::AsyncDbPool;

/// Aggregates all stores for convenient access.
///
/// Cloning only bumps reference counts.
#[derive(Clone)]
pub struct Repositories {
    pub messages: Arc<dyn MessageStore>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Repositories {
    /// Creates the Postgres-backed stores sharing one pool.
    pub fn new(pool: AsyncDbPool) -> Self {
        Self {
            messages: Arc::new(MessageRepository::new(pool.clone())),
            workflows: Arc::new(WorkflowRepository::new(pool.clone())),
            ledger: Arc::new(CreditRepository::new(pool)),
        }
    }

    #[cfg(test)]
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            messages: store.clone(),
            workflows: store.clone(),
            ledger: store,
        }
    }
}
