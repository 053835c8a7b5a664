// Background audit worker
//
// The escalation controller hands flag requests to an unbounded channel and
// never waits on storage. This worker drains the channel, writes through the
// recorder and owns retry and logging of failed writes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::record::FlagId;
use super::recorder::AuditRecorder;
use crate::errors::SafetyError;
use crate::metrics::Metrics;

/// Attempts per record request, including the first
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Backoff before the first retry; doubles each retry
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Work item for the audit worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditRequest {
    Record {
        attempt_id: Uuid,
        user_id: String,
        entry_id: String,
        matched_keywords: Vec<String>,
    },
    Dismiss {
        flag_id: FlagId,
    },
}

/// Sending half held by escalation controllers
#[derive(Debug, Clone)]
pub struct AuditHandle {
    tx: mpsc::UnboundedSender<AuditRequest>,
}

impl AuditHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a request without waiting; returns false if the worker is gone
    pub fn send(&self, request: AuditRequest) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(e) => {
                warn!(request = ?e.0, "Audit worker unavailable, flag not queued");
                false
            }
        }
    }
}

/// Drains audit requests into a recorder
pub struct AuditWorker {
    rx: mpsc::UnboundedReceiver<AuditRequest>,
    recorder: Arc<dyn AuditRecorder>,
    metrics: Option<Arc<Metrics>>,
    retry_base_delay: Duration,
}

impl AuditWorker {
    pub fn new(rx: mpsc::UnboundedReceiver<AuditRequest>, recorder: Arc<dyn AuditRecorder>) -> Self {
        Self {
            rx,
            recorder,
            metrics: None,
            retry_base_delay: RETRY_BASE_DELAY,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Create a handle and spawn the worker on the current runtime
    pub fn spawn(recorder: Arc<dyn AuditRecorder>, metrics: Option<Arc<Metrics>>) -> AuditHandle {
        let (handle, rx) = AuditHandle::channel();
        let mut worker = Self::new(rx, recorder);
        if let Some(metrics) = metrics {
            worker = worker.with_metrics(metrics);
        }
        tokio::spawn(worker.run());
        handle
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Audit worker started");

        while let Some(request) = self.rx.recv().await {
            self.process(request).await;
        }

        info!("Audit worker stopped");
    }

    async fn process(&self, request: AuditRequest) {
        match request {
            AuditRequest::Record {
                attempt_id,
                user_id,
                entry_id,
                matched_keywords,
            } => {
                let mut delay = self.retry_base_delay;

                for attempt in 1..=MAX_WRITE_ATTEMPTS {
                    match self
                        .recorder
                        .record_flag(&user_id, &entry_id, &matched_keywords)
                        .await
                    {
                        Ok(flag_id) => {
                            info!(%flag_id, %attempt_id, entry_id = %entry_id, "Recorded flagged entry");
                            self.count("ok");
                            return;
                        }
                        Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                            debug!(%attempt_id, attempt, error = %e, "Flag write failed, retrying");
                            tokio::time::sleep(delay).await;
                            delay *= 2;
                        }
                        Err(e) => {
                            let failure = SafetyError::AuditWriteFailure(e.to_string());
                            error!(%attempt_id, entry_id = %entry_id, error = %failure, "Giving up on flag write");
                            self.count("failed");
                        }
                    }
                }
            }
            AuditRequest::Dismiss { flag_id } => {
                if let Err(e) = self.recorder.dismiss_flag(flag_id).await {
                    let failure = SafetyError::AuditWriteFailure(e.to_string());
                    error!(%flag_id, error = %failure, "Failed to dismiss flag");
                    self.count("failed");
                } else {
                    self.count("ok");
                }
            }
        }
    }

    fn count(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_audit_write(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{FlaggedEntryRecord, MemoryAuditRecorder};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` writes, then delegates
    struct FlakyRecorder {
        failures: u32,
        calls: AtomicU32,
        inner: MemoryAuditRecorder,
    }

    #[async_trait]
    impl AuditRecorder for FlakyRecorder {
        async fn record_flag(&self, user_id: &str, entry_id: &str, kw: &[String]) -> Result<FlagId> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                bail!("store unavailable");
            }
            self.inner.record_flag(user_id, entry_id, kw).await
        }

        async fn dismiss_flag(&self, flag_id: FlagId) -> Result<()> {
            self.inner.dismiss_flag(flag_id).await
        }

        async fn list_flags(&self) -> Result<Vec<FlaggedEntryRecord>> {
            self.inner.list_flags().await
        }
    }

    fn record_request() -> AuditRequest {
        AuditRequest::Record {
            attempt_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            entry_id: "journal:1".to_string(),
            matched_keywords: vec!["die".to_string()],
        }
    }

    async fn run_with(recorder: Arc<FlakyRecorder>, requests: Vec<AuditRequest>) {
        let (handle, rx) = AuditHandle::channel();
        let worker = AuditWorker::new(rx, recorder).with_retry_delay(Duration::from_millis(1));
        for request in requests {
            assert!(handle.send(request));
        }
        drop(handle);
        worker.run().await;
    }

    #[tokio::test]
    async fn test_worker_retries_transient_failures() {
        let recorder = Arc::new(FlakyRecorder {
            failures: 2,
            calls: AtomicU32::new(0),
            inner: MemoryAuditRecorder::new(),
        });

        run_with(Arc::clone(&recorder), vec![record_request()]).await;

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_gives_up_after_max_attempts() {
        let recorder = Arc::new(FlakyRecorder {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            inner: MemoryAuditRecorder::new(),
        });

        run_with(Arc::clone(&recorder), vec![record_request(), record_request()]).await;

        assert_eq!(recorder.calls.load(Ordering::SeqCst), MAX_WRITE_ATTEMPTS * 2);
        assert!(recorder.inner.is_empty());
    }

    #[tokio::test]
    async fn test_send_after_worker_dropped() {
        let (handle, rx) = AuditHandle::channel();
        drop(rx);
        assert!(!handle.send(record_request()));
    }
}
