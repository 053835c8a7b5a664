// Flagged entry records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a persisted flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub Uuid);

impl FlagId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlagId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FlagId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reviewable record of a detection during a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedEntryRecord {
    pub id: FlagId,
    pub user_id: String,
    /// Opaque reference to the journal entry, chat message or post
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub matched_keywords: Vec<String>,
    pub dismissed: bool,
}

impl FlaggedEntryRecord {
    pub fn new(user_id: String, entry_id: String, matched_keywords: Vec<String>) -> Self {
        Self {
            id: FlagId::new(),
            user_id,
            entry_id,
            timestamp: Utc::now(),
            matched_keywords,
            dismissed: false,
        }
    }
}
