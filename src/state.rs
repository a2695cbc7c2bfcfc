//! File-backed resource store
//!
//! All records live in one JSON document (`resources.json`) under the state
//! directory. Every operation re-reads the file, so a second process (for
//! example `stackwright signal ... --unset-hook pre-create`) sees and makes
//! changes while an `apply` is waiting on a hook. Writes go through a
//! temporary file and a rename.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lifecycle::{ResourceRecord, ResourceStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const STORE_FILE: &str = "resources.json";

// ============================================================================
// On-disk Layout
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    next_id: i64,
    #[serde(default)]
    records: BTreeMap<i64, ResourceRecord>,
}

// ============================================================================
// FileStore
// ============================================================================

/// [`ResourceStore`] persisted as JSON on disk
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) the store in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        Ok(Self {
            path: dir.join(STORE_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoreFile, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(backend(&self.path, &e)),
        };
        serde_json::from_str(&content).map_err(|e| backend(&self.path, &e))
    }

    async fn write(&self, file: &StoreFile) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(file).map_err(|e| backend(&self.path, &e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(|e| backend(&tmp, &e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| backend(&self.path, &e))?;
        log::debug!("Saved {} records to {}", file.records.len(), self.path.display());
        Ok(())
    }

    /// Latest record of every (stack, name) pair, ordered by stack then name
    pub async fn latest(&self, stack_id: Option<&str>) -> Result<Vec<ResourceRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let file = self.read().await?;
        let mut latest: BTreeMap<(String, String), ResourceRecord> = BTreeMap::new();
        for record in file.records.into_values() {
            let Some(stack) = record.stack_id.clone() else {
                continue;
            };
            if stack_id.is_some_and(|s| s != stack) {
                continue;
            }
            // ids only grow, so later entries win
            latest.insert((stack, record.name.clone()), record);
        }
        Ok(latest.into_values().collect())
    }
}

fn backend(path: &Path, err: &dyn std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {err}", path.display()))
}

#[async_trait]
impl ResourceStore for FileStore {
    async fn get(&self, id: i64) -> Result<ResourceRecord, StoreError> {
        let _guard = self.lock.lock().await;
        self.read().await?
            .records
            .remove(&id)
            .ok_or(StoreError::NotFound { id })
    }

    async fn create(&self, record: &ResourceRecord) -> Result<i64, StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        file.next_id += 1;
        let id = file.next_id;
        let mut record = record.clone();
        record.id = Some(id);
        file.records.insert(id, record);
        self.write(&file).await?;
        Ok(id)
    }

    async fn update(&self, id: i64, record: &ResourceRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let Some(slot) = file.records.get_mut(&id) else {
            return Err(StoreError::NotFound { id });
        };
        *slot = record.clone();
        slot.id = Some(id);
        self.write(&file).await
    }

    async fn get_by_name_and_stack(
        &self,
        name: &str,
        stack_id: &str,
    ) -> Result<Option<ResourceRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read()
            .await?
            .records
            .into_values()
            .filter(|r| r.name == name && r.stack_id.as_deref() == Some(stack_id))
            .next_back())
    }

    async fn list_by_stack(&self, stack_id: &str) -> Result<Vec<ResourceRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read()
            .await?
            .records
            .into_values()
            .filter(|r| r.stack_id.as_deref() == Some(stack_id))
            .collect())
    }
}
