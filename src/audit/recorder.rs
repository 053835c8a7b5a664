// Audit recorder interface

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use super::record::{FlagId, FlaggedEntryRecord};

/// Persistence for flagged entries.
///
/// Records are never hard-deleted; `dismiss_flag` only flips `dismissed`.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record_flag(
        &self,
        user_id: &str,
        entry_id: &str,
        matched_keywords: &[String],
    ) -> Result<FlagId>;

    async fn dismiss_flag(&self, flag_id: FlagId) -> Result<()>;

    async fn list_flags(&self) -> Result<Vec<FlaggedEntryRecord>>;

    async fn flags_for_user(&self, user_id: &str) -> Result<Vec<FlaggedEntryRecord>> {
        Ok(self
            .list_flags()
            .await?
            .into_iter()
            .filter(|record| record.user_id == user_id)
            .collect())
    }
}

/// In-process recorder, used by tests and ephemeral daemons
#[derive(Debug, Default)]
pub struct MemoryAuditRecorder {
    records: Mutex<Vec<FlaggedEntryRecord>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditRecorder for MemoryAuditRecorder {
    async fn record_flag(
        &self,
        user_id: &str,
        entry_id: &str,
        matched_keywords: &[String],
    ) -> Result<FlagId> {
        let record = FlaggedEntryRecord::new(
            user_id.to_string(),
            entry_id.to_string(),
            matched_keywords.to_vec(),
        );
        let id = record.id;

        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit store lock poisoned"))?;
        records.push(record);

        Ok(id)
    }

    async fn dismiss_flag(&self, flag_id: FlagId) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit store lock poisoned"))?;

        match records.iter_mut().find(|r| r.id == flag_id) {
            Some(record) => {
                record.dismissed = true;
                Ok(())
            }
            None => bail!("Flag not found: {}", flag_id),
        }
    }

    async fn list_flags(&self) -> Result<Vec<FlaggedEntryRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit store lock poisoned"))?;
        Ok(records.clone())
    }
}
