// Escalation modal controller
//
// Owns modal visibility, the matched-phrase snapshot and the resolved crisis
// resource for one user session. Subscribers (the modal owner) watch the
// published EscalationState.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bridge::{EscalationSignal, MonitoredField, Surface};
use super::detector::DetectionResult;
use super::resources::{ContactAction, ContactChannel, CrisisResource, ResourceTable};
use crate::audit::{AuditHandle, AuditRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalState {
    Closed,
    Open,
}

/// Snapshot published to the modal owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationState {
    pub is_open: bool,
    pub matched_phrases: Vec<String>,
    pub resource: CrisisResource,
    /// Opened because detection failed rather than matched
    pub fail_safe: bool,
    pub trigger_field: Option<MonitoredField>,
}

impl EscalationState {
    fn closed(resource: CrisisResource) -> Self {
        Self {
            is_open: false,
            matched_phrases: Vec::new(),
            resource,
            fail_safe: false,
            trigger_field: None,
        }
    }
}

/// Whether a flagged submission may proceed while the modal is shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPolicy {
    #[serde(default)]
    pub block_submission_on_trigger: bool,
}

impl SubmissionPolicy {
    pub fn blocking() -> Self {
        Self {
            block_submission_on_trigger: true,
        }
    }
}

/// Submission policy per content surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfacePolicies {
    #[serde(default)]
    pub journal: SubmissionPolicy,
    #[serde(default)]
    pub chat: SubmissionPolicy,
    #[serde(default)]
    pub community: SubmissionPolicy,
}

impl SurfacePolicies {
    pub fn uniform(policy: SubmissionPolicy) -> Self {
        Self {
            journal: policy,
            chat: policy,
            community: policy,
        }
    }

    pub fn for_surface(&self, surface: Surface) -> SubmissionPolicy {
        match surface {
            Surface::Journal => self.journal,
            Surface::Chat => self.chat,
            Surface::Community => self.community,
        }
    }
}

/// One attempt to persist user content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub attempt_id: Uuid,
    pub surface: Surface,
    pub user_id: String,
    pub entry_id: String,
    pub fields: Vec<(MonitoredField, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionDecision {
    /// Persist now; the modal may be showing in parallel
    Proceed,
    /// Hold until the modal is dismissed
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub decision: SubmissionDecision,
    /// An audit record was queued by this call
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened,
    Updated,
    Unchanged,
}

/// Attempt ids remembered for audit deduplication
const RECENT_ATTEMPTS: usize = 256;

/// Bounded set of recently audited attempt ids, oldest evicted first
#[derive(Debug, Default)]
struct RecentAttempts {
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl RecentAttempts {
    /// Returns true if the id was not already remembered
    fn insert(&mut self, attempt_id: Uuid) -> bool {
        if !self.seen.insert(attempt_id) {
            return false;
        }
        self.order.push_back(attempt_id);
        if self.order.len() > RECENT_ATTEMPTS {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    #[cfg(test)]
    fn contains(&self, attempt_id: &Uuid) -> bool {
        self.seen.contains(attempt_id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct EscalationController {
    state: ModalState,
    snapshot: EscalationState,
    resources: Arc<ResourceTable>,
    policies: SurfacePolicies,
    audit: AuditHandle,
    audited_attempts: RecentAttempts,
    /// One entry per attempt id, in submit order
    held: Vec<Submission>,
    publisher: watch::Sender<EscalationState>,
}

impl EscalationController {
    pub fn new(
        resources: Arc<ResourceTable>,
        region: &str,
        policies: SurfacePolicies,
        audit: AuditHandle,
    ) -> Self {
        let snapshot = EscalationState::closed(resources.resolve(region).clone());
        let (publisher, _) = watch::channel(snapshot.clone());

        Self {
            state: ModalState::Closed,
            snapshot,
            resources,
            policies,
            audit,
            audited_attempts: RecentAttempts::default(),
            held: Vec::new(),
            publisher,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EscalationState> {
        self.publisher.subscribe()
    }

    pub fn modal_state(&self) -> ModalState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ModalState::Open
    }

    pub fn state(&self) -> &EscalationState {
        &self.snapshot
    }

    pub fn resource(&self) -> &CrisisResource {
        &self.snapshot.resource
    }

    pub fn held(&self) -> &[Submission] {
        &self.held
    }

    pub fn policies(&self) -> &SurfacePolicies {
        &self.policies
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot.clone());
    }

    /// Show the modal for a positive detection.
    ///
    /// Never writes audit records. While open, an identical phrase set is a
    /// no-op and a different one replaces the snapshot.
    pub fn raise(&mut self, signal: EscalationSignal) -> Transition {
        let transition = match self.state {
            ModalState::Closed => {
                self.state = ModalState::Open;
                info!(phrases = ?signal.phrases, fail_safe = signal.fail_safe, "Crisis modal opened");
                Transition::Opened
            }
            ModalState::Open
                if self.snapshot.matched_phrases == signal.phrases
                    && self.snapshot.fail_safe == signal.fail_safe =>
            {
                return Transition::Unchanged;
            }
            ModalState::Open => {
                debug!(phrases = ?signal.phrases, "Crisis modal snapshot updated");
                Transition::Updated
            }
        };

        self.snapshot.is_open = true;
        self.snapshot.matched_phrases = signal.phrases;
        self.snapshot.fail_safe = signal.fail_safe;
        self.snapshot.trigger_field = signal.field;
        self.publish();

        transition
    }

    /// Gate a submission attempt on its detection result.
    ///
    /// A positive detection opens the modal and queues exactly one audit
    /// record per distinct attempt id. The surface policy decides whether the
    /// content may be persisted now or is held until dismissal.
    pub fn submit(&mut self, submission: Submission, detection: &DetectionResult) -> SubmissionOutcome {
        let Some(signal) = EscalationSignal::from_detection(None, detection) else {
            return SubmissionOutcome {
                decision: SubmissionDecision::Proceed,
                flagged: false,
            };
        };

        self.raise(signal);

        let flagged = self.audited_attempts.insert(submission.attempt_id);
        if flagged {
            self.audit.send(AuditRequest::Record {
                attempt_id: submission.attempt_id,
                user_id: submission.user_id.clone(),
                entry_id: submission.entry_id.clone(),
                matched_keywords: detection.matched_phrases.clone(),
            });
        } else {
            debug!(attempt_id = %submission.attempt_id, "Attempt already audited");
        }

        let policy = self.policies.for_surface(submission.surface);
        let decision = if policy.block_submission_on_trigger {
            info!(
                attempt_id = %submission.attempt_id,
                surface = submission.surface.as_str(),
                "Holding flagged submission until dismissal"
            );
            self.hold(submission);
            SubmissionDecision::Held
        } else {
            SubmissionDecision::Proceed
        };

        SubmissionOutcome { decision, flagged }
    }

    /// A resubmitted attempt replaces its earlier content in place
    fn hold(&mut self, submission: Submission) {
        match self
            .held
            .iter_mut()
            .find(|held| held.attempt_id == submission.attempt_id)
        {
            Some(existing) => *existing = submission,
            None => {
                if !self.held.is_empty() {
                    warn!(
                        attempt_id = %submission.attempt_id,
                        held = self.held.len() + 1,
                        "Multiple submissions held behind the crisis modal"
                    );
                }
                self.held.push(submission);
            }
        }
    }

    /// Close the modal, releasing every held submission in submit order
    pub fn dismiss(&mut self) -> Vec<Submission> {
        if self.state == ModalState::Closed {
            return Vec::new();
        }

        self.state = ModalState::Closed;
        self.snapshot = EscalationState::closed(self.snapshot.resource.clone());
        self.publish();
        info!(released = self.held.len(), "Crisis modal dismissed");

        std::mem::take(&mut self.held)
    }

    /// Contact action for the current resource; does not close the modal
    pub fn contact(&self, channel: ContactChannel) -> Option<ContactAction> {
        if self.state == ModalState::Closed {
            return None;
        }

        let action = self.snapshot.resource.contact(channel);
        info!(channel = ?channel, region = %self.snapshot.resource.region_code, "Crisis contact requested");
        Some(action)
    }

    /// Re-resolve the crisis resource for a new region
    pub fn set_region(&mut self, region: &str) {
        let resource = self.resources.resolve(region).clone();
        if resource != self.snapshot.resource {
            self.snapshot.resource = resource;
            self.publish();
        }
    }
}
