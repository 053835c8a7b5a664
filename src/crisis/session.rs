// Per-session wiring of bridge and controller

use std::sync::Arc;
use uuid::Uuid;

use super::bridge::{MonitoredField, Observation, Surface, TriggerBridge};
use super::detector::{DetectionResult, Detector};
use super::escalation::{EscalationController, EscalationState, Submission, SubmissionOutcome};
use super::lexicon::Language;
use super::resources::{ContactAction, ContactChannel};

/// Detection and escalation state for one user session or tab
pub struct SafetySession {
    user_id: String,
    bridge: TriggerBridge,
    controller: EscalationController,
}

impl SafetySession {
    pub fn new(
        user_id: impl Into<String>,
        detector: Arc<Detector>,
        language: Language,
        controller: EscalationController,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            bridge: TriggerBridge::new(detector, language),
            controller,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn language(&self) -> Language {
        self.bridge.language()
    }

    pub fn controller(&self) -> &EscalationController {
        &self.controller
    }

    pub fn state(&self) -> &EscalationState {
        self.controller.state()
    }

    /// Feed a live field value; returns the observation for callers that
    /// count detections
    pub fn on_field_change(&mut self, field: MonitoredField, text: &str) -> Observation {
        let observation = self.bridge.observe(field, text);
        if let Observation::Triggered(signal) = &observation {
            self.controller.raise(signal.clone());
        }
        observation
    }

    /// Start a new submission attempt
    pub fn submit(
        &mut self,
        surface: Surface,
        entry_id: impl Into<String>,
        fields: Vec<(MonitoredField, String)>,
    ) -> (Submission, DetectionResult, SubmissionOutcome) {
        self.resubmit(Uuid::new_v4(), surface, entry_id, fields)
    }

    /// Submit under a caller-chosen attempt id; replays are not re-audited
    pub fn resubmit(
        &mut self,
        attempt_id: Uuid,
        surface: Surface,
        entry_id: impl Into<String>,
        fields: Vec<(MonitoredField, String)>,
    ) -> (Submission, DetectionResult, SubmissionOutcome) {
        let detection = self.bridge.scan_submission(&fields);
        let submission = Submission {
            attempt_id,
            surface,
            user_id: self.user_id.clone(),
            entry_id: entry_id.into(),
            fields,
        };

        let outcome = self.controller.submit(submission.clone(), &detection);
        (submission, detection, outcome)
    }

    pub fn dismiss(&mut self) -> Vec<Submission> {
        self.controller.dismiss()
    }

    pub fn contact(&self, channel: ContactChannel) -> Option<ContactAction> {
        self.controller.contact(channel)
    }

    pub fn set_region(&mut self, region: &str) {
        self.controller.set_region(region);
    }

    pub fn set_language(&mut self, language: Language) {
        self.bridge.set_language(language);
    }

    /// Forget a field's last value after the host clears it
    pub fn clear_field(&mut self, field: MonitoredField) {
        self.bridge.forget(field);
    }
}
