// JSONL flag log
//
// Append-only event log at ~/.lifeline/flags.jsonl. Dismissals are appended
// as their own events; current state is the fold of all events.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::record::{FlagId, FlaggedEntryRecord};
use super::recorder::AuditRecorder;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum FlagEvent {
    Recorded(FlaggedEntryRecord),
    Dismissed {
        id: FlagId,
        at: DateTime<Utc>,
    },
}

/// File-backed recorder; safe to share between processes via file locks
#[derive(Debug, Clone)]
pub struct JsonlAuditRecorder {
    file_path: PathBuf,
}

impl JsonlAuditRecorder {
    pub fn new(file_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(Self { file_path })
    }

    /// Recorder at ~/.lifeline/flags.jsonl
    pub fn in_home() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        Self::new(home.join(".lifeline").join("flags.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn append(path: &Path, event: &FlagEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open flag log: {}", path.display()))?;

        file.lock_exclusive()
            .context("Failed to lock flag log")?;

        let json = serde_json::to_string(event).context("Failed to serialize flag event")?;
        let written = writeln!(file, "{}", json).context("Failed to write flag event");

        file.unlock().context("Failed to unlock flag log")?;
        written
    }

    fn load(path: &Path) -> Result<Vec<FlaggedEntryRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)
            .with_context(|| format!("Failed to open flag log: {}", path.display()))?;
        file.lock_shared().context("Failed to lock flag log")?;

        let mut order = Vec::new();
        let mut records: HashMap<FlagId, FlaggedEntryRecord> = HashMap::new();

        for (line_no, line) in BufReader::new(&file).lines().enumerate() {
            let line = line.context("Failed to read flag log")?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<FlagEvent>(&line) {
                Ok(FlagEvent::Recorded(record)) => {
                    order.push(record.id);
                    records.insert(record.id, record);
                }
                Ok(FlagEvent::Dismissed { id, .. }) => {
                    if let Some(record) = records.get_mut(&id) {
                        record.dismissed = true;
                    }
                }
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed flag log line");
                }
            }
        }

        file.unlock().context("Failed to unlock flag log")?;

        Ok(order
            .into_iter()
            .filter_map(|id| records.remove(&id))
            .collect())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
    {
        let path = self.file_path.clone();
        tokio::task::spawn_blocking(move || f(path))
            .await
            .context("Flag log task panicked")?
    }
}

#[async_trait]
impl AuditRecorder for JsonlAuditRecorder {
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

        self.blocking(move |path| Self::append(&path, &FlagEvent::Recorded(record)))
            .await?;

        Ok(id)
    }

    async fn dismiss_flag(&self, flag_id: FlagId) -> Result<()> {
        self.blocking(move |path| {
            if !Self::load(&path)?.iter().any(|r| r.id == flag_id) {
                bail!("Flag not found: {}", flag_id);
            }
            Self::append(
                &path,
                &FlagEvent::Dismissed {
                    id: flag_id,
                    at: Utc::now(),
                },
            )
        })
        .await
    }

    async fn list_flags(&self) -> Result<Vec<FlaggedEntryRecord>> {
        self.blocking(|path| Self::load(&path)).await
    }
}
