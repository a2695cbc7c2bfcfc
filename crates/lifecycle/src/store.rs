//! Persistence contract for resource records
//!
//! The engine never deletes records; it inserts a record on first persist
//! and updates it afterwards. Every state transition is written with a single
//! `update` call so action and status always land together.

use crate::types::ResourceRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from a [`ResourceStore`] backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record under this id
    #[error("resource record {id} not found")]
    NotFound { id: i64 },

    /// Backend-specific failure (I/O, serialization, ...)
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Storage backend for resource records.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Load a record by id.
    async fn get(&self, id: i64) -> Result<ResourceRecord, StoreError>;

    /// Insert a new record and return its assigned id.
    async fn create(&self, record: &ResourceRecord) -> Result<i64, StoreError>;

    /// Overwrite an existing record.
    async fn update(&self, id: i64, record: &ResourceRecord) -> Result<(), StoreError>;

    /// Find the most recent record for a resource name within a stack.
    async fn get_by_name_and_stack(
        &self,
        name: &str,
        stack_id: &str,
    ) -> Result<Option<ResourceRecord>, StoreError>;

    /// All records belonging to a stack.
    async fn list_by_stack(&self, stack_id: &str) -> Result<Vec<ResourceRecord>, StoreError>;
}

/// In-memory store, used by tests and embedded schedulers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<i64, ResourceRecord>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records ever inserted (records are never removed).
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<ResourceRecord, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn create(&self, record: &ResourceRecord) -> Result<i64, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = record.clone();
        stored.id = Some(id);
        self.records.write().await.insert(id, stored);
        log::debug!("Inserted resource record {id} ({})", record.name);
        Ok(id)
    }

    async fn update(&self, id: i64, record: &ResourceRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let slot = records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        *slot = record.clone();
        slot.id = Some(id);
        Ok(())
    }

    async fn get_by_name_and_stack(
        &self,
        name: &str,
        stack_id: &str,
    ) -> Result<Option<ResourceRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .rev()
            .find(|r| r.name == name && r.stack_id.as_deref() == Some(stack_id))
            .cloned())
    }

    async fn list_by_stack(&self, stack_id: &str) -> Result<Vec<ResourceRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.stack_id.as_deref() == Some(stack_id))
            .cloned()
            .collect())
    }
}
