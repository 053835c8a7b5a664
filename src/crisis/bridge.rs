// Trigger bridge
//
// One detection path for every monitored input. Fields from any screen
// feed the same bridge, and a positive result becomes a single escalation
// signal regardless of where it came from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::detector::{DetectionResult, Detector};
use super::lexicon::Language;

/// Content flow a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Journal,
    Chat,
    Community,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Journal => "journal",
            Surface::Chat => "chat",
            Surface::Community => "community",
        }
    }
}

/// Free-text input watched for trigger phrases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredField {
    JournalTitle,
    JournalBody,
    ChatDraft,
    CommunityTitle,
    CommunityBody,
}

impl MonitoredField {
    pub fn surface(&self) -> Surface {
        match self {
            MonitoredField::JournalTitle | MonitoredField::JournalBody => Surface::Journal,
            MonitoredField::ChatDraft => Surface::Chat,
            MonitoredField::CommunityTitle | MonitoredField::CommunityBody => Surface::Community,
        }
    }
}

/// Request to show the crisis modal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationSignal {
    pub field: Option<MonitoredField>,
    pub phrases: Vec<String>,
    pub fail_safe: bool,
}

impl EscalationSignal {
    pub fn from_detection(field: Option<MonitoredField>, result: &DetectionResult) -> Option<Self> {
        result.matched.then(|| Self {
            field,
            phrases: result.matched_phrases.clone(),
            fail_safe: result.fail_safe,
        })
    }
}

/// What happened when a field value was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Same value as last time; detector not run
    Unchanged,
    Clear,
    Triggered(EscalationSignal),
}

impl Observation {
    pub fn signal(self) -> Option<EscalationSignal> {
        match self {
            Observation::Triggered(signal) => Some(signal),
            _ => None,
        }
    }
}

pub struct TriggerBridge {
    detector: Arc<Detector>,
    language: Language,
    /// Last observed text per field
    last_seen: HashMap<MonitoredField, String>,
}

impl TriggerBridge {
    pub fn new(detector: Arc<Detector>, language: Language) -> Self {
        Self {
            detector,
            language,
            last_seen: HashMap::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Switch language; every field is re-evaluated on its next observation
    pub fn set_language(&mut self, language: Language) {
        if self.language != language {
            self.language = language;
            self.last_seen.clear();
        }
    }

    /// Run detection for a changed field value
    pub fn observe(&mut self, field: MonitoredField, text: &str) -> Observation {
        if self.last_seen.get(&field).map(String::as_str) == Some(text) {
            return Observation::Unchanged;
        }
        self.last_seen.insert(field, text.to_string());

        let result = self.detector.detect(text, self.language);
        match EscalationSignal::from_detection(Some(field), &result) {
            Some(signal) => {
                tracing::debug!(field = ?field, phrases = ?signal.phrases, "Field triggered escalation");
                Observation::Triggered(signal)
            }
            None => Observation::Clear,
        }
    }

    /// Combined detection over all fields of a submission
    pub fn scan_submission(&self, fields: &[(MonitoredField, String)]) -> DetectionResult {
        self.detector
            .detect_all(fields.iter().map(|(_, text)| text.as_str()), self.language)
    }

    /// Drop a field's last value, e.g. after it is cleared on submit
    pub fn forget(&mut self, field: MonitoredField) {
        self.last_seen.remove(&field);
    }
}
