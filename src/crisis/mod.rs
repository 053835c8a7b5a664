// Crisis detection and escalation
// Lexicons, detector, crisis resources and the per-session escalation flow

mod bridge;
mod detector;
mod escalation;
mod lexicon;
mod region;
mod resources;
mod session;

pub use bridge::{EscalationSignal, MonitoredField, Observation, Surface, TriggerBridge};
pub use detector::{fingerprint, normalize, DetectionResult, Detector};
pub use escalation::{
    EscalationController, EscalationState, ModalState, Submission, SubmissionDecision,
    SubmissionOutcome, SubmissionPolicy, SurfacePolicies, Transition,
};
pub use lexicon::{Language, LexiconStore, TriggerLexicon, TriggerPhrase};
pub use region::{RegionLocator, DEFAULT_GEOLOCATION_ENDPOINT};
pub use resources::{ContactAction, ContactChannel, CrisisResource, RegionCode, ResourceTable};
pub use session::SafetySession;
