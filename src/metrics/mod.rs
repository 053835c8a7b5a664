// Prometheus metrics for detections, escalations and audit writes

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::crisis::{DetectionResult, Language, Surface};

pub struct Metrics {
    registry: Registry,
    detections: IntCounterVec,
    escalations: IntCounterVec,
    audit_writes: IntCounterVec,
    active_sessions: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let detections = IntCounterVec::new(
            Opts::new("lifeline_detections_total", "Detector invocations by outcome"),
            &["language", "outcome"],
        )?;
        let escalations = IntCounterVec::new(
            Opts::new("lifeline_escalations_total", "Flagged submissions by surface"),
            &["surface"],
        )?;
        let audit_writes = IntCounterVec::new(
            Opts::new("lifeline_audit_writes_total", "Audit writes by result"),
            &["result"],
        )?;
        let active_sessions = IntGauge::new("lifeline_active_sessions", "Open safety sessions")?;

        registry.register(Box::new(detections.clone()))?;
        registry.register(Box::new(escalations.clone()))?;
        registry.register(Box::new(audit_writes.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;

        Ok(Self {
            registry,
            detections,
            escalations,
            audit_writes,
            active_sessions,
        })
    }

    pub fn record_detection(&self, language: Language, result: &DetectionResult) {
        let outcome = if result.fail_safe {
            "fail_safe"
        } else if result.matched {
            "match"
        } else {
            "clear"
        };
        self.detections
            .with_label_values(&[language.as_str(), outcome])
            .inc();
    }

    pub fn record_escalation(&self, surface: Surface) {
        self.escalations.with_label_values(&[surface.as_str()]).inc();
    }

    pub fn record_audit_write(&self, result: &str) {
        self.audit_writes.with_label_values(&[result]).inc();
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.set(count as i64);
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("Failed to encode metrics")?;
        String::from_utf8(buf).context("Metrics are not UTF-8")
    }
}
