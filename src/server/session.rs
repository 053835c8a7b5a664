// Session management for concurrent HTTP clients

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time;
use uuid::Uuid;

use super::ServerError;
use crate::crisis::{EscalationState, Language, SafetySession};
use crate::metrics::Metrics;

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub language: Language,
    pub state: EscalationState,
}

struct SessionEntry {
    session: SafetySession,
    last_activity: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_expired(&self, timeout_minutes: u64) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_activity);
        elapsed.num_minutes() >= timeout_minutes as i64
    }
}

type Sessions = DashMap<String, SessionEntry>;

/// Concurrent session manager using DashMap
pub struct SessionManager {
    sessions: Arc<Sessions>,
    max_sessions: usize,
    timeout_minutes: u64,
    metrics: Option<Arc<Metrics>>,
}

impl SessionManager {
    pub fn new(max_sessions: usize, timeout_minutes: u64, metrics: Option<Arc<Metrics>>) -> Self {
        let manager = Self {
            sessions: Arc::new(DashMap::new()),
            max_sessions,
            timeout_minutes,
            metrics,
        };

        manager.start_cleanup_task();
        manager
    }

    /// Register a session and return its id
    pub fn create(&self, session: SafetySession) -> Result<String, ServerError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(ServerError::SessionLimit {
                active: self.sessions.len(),
                max: self.max_sessions,
            });
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                session,
                last_activity: now,
                created_at: now,
            },
        );

        tracing::info!(session_id = %id, "Created new session");
        Ok(id)
    }

    /// Run `f` against a session, marking it active
    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SafetySession) -> R,
    ) -> Result<R, ServerError> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ServerError::SessionNotFound(session_id.to_string()))?;

        entry.last_activity = Utc::now();
        Ok(f(&mut entry.session))
    }

    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, ServerError> {
        self.with_session(session_id, |session| SessionSnapshot {
            session_id: session_id.to_string(),
            user_id: session.user_id().to_string(),
            language: session.language(),
            state: session.state().clone(),
        })
    }

    /// Age of a session, if it exists
    pub fn age(&self, session_id: &str) -> Option<chrono::Duration> {
        self.sessions
            .get(session_id)
            .map(|entry| Utc::now().signed_duration_since(entry.created_at))
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove idle sessions and refresh the active-session gauge
    fn cleanup_expired(sessions: &Sessions, timeout_minutes: u64, metrics: Option<&Metrics>) -> usize {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|entry| entry.value().is_expired(timeout_minutes))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for session_id in expired {
            // Activity since the scan keeps the session
            let Some((_, entry)) =
                sessions.remove_if(&session_id, |_, entry| entry.is_expired(timeout_minutes))
            else {
                continue;
            };

            for held in entry.session.controller().held() {
                tracing::warn!(
                    session_id = %session_id,
                    attempt_id = %held.attempt_id,
                    surface = held.surface.as_str(),
                    entry_id = %held.entry_id,
                    "Expired session dropped a held submission"
                );
            }
            removed += 1;
            tracing::debug!(session_id = %session_id, "Removed expired session");
        }

        if removed > 0 {
            tracing::info!(removed, active = sessions.len(), "Cleaned up expired sessions");
        }
        if let Some(metrics) = metrics {
            metrics.set_active_sessions(sessions.len());
        }
        removed
    }

    /// Background expiry; stops once the manager is dropped
    fn start_cleanup_task(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!("No runtime, session cleanup task not started");
            return;
        }

        let sessions: Weak<Sessions> = Arc::downgrade(&self.sessions);
        let timeout_minutes = self.timeout_minutes;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(60));

            loop {
                interval.tick().await;
                let Some(sessions) = sessions.upgrade() else {
                    break;
                };
                Self::cleanup_expired(&sessions, timeout_minutes, metrics.as_deref());
            }
        });
    }
}
