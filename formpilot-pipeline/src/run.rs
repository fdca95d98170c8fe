//! The Application Run record: one end-to-end attempt on one target page.
//!
//! Retry counters live here, per run and per field, so concurrent runs can
//! never interfere through shared process state. Artifacts written under a
//! run key inherit its TTL and are purged by the store regardless of the
//! terminal state reached.
use chrono::{DateTime, Utc};
use formpilot_common::DocumentKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use uuid::Uuid;

/// What lands on the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRequest {
    pub run_id: Uuid,
    pub target_url: String,
    /// Path to the candidate profile document.
    pub profile_ref: PathBuf,
    /// Document overrides; merged over the profile's own documents map.
    #[serde(default)]
    pub document_refs: BTreeMap<DocumentKind, PathBuf>,
}

impl ApplicationRequest {
    pub fn new(target_url: impl Into<String>, profile_ref: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_url: target_url.into(),
            profile_ref: profile_ref.into(),
            document_refs: BTreeMap::new(),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoFieldsDetected,
    Driver,
    Internal,
}

/// Why a run was deliberately stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    Captcha,
    RequiredFieldUnresolved,
    Cancelled,
    ReviewRejected,
}

/// Lifecycle of one application attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum RunState {
    Queued,
    Detecting,
    Mapping,
    Filling,
    Uploading,
    ReadyToSubmit,
    Submitted,
    Completed,
    Failed(FailureReason),
    Aborted(AbortReason),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed(_) | RunState::Aborted(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Detecting => "detecting",
            RunState::Mapping => "mapping",
            RunState::Filling => "filling",
            RunState::Uploading => "uploading",
            RunState::ReadyToSubmit => "ready_to_submit",
            RunState::Submitted => "submitted",
            RunState::Completed => "completed",
            RunState::Failed(_) => "failed",
            RunState::Aborted(_) => "aborted",
        }
    }
}

/// One logged step outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub at: DateTime<Utc>,
    pub stage: String,
    pub detail: String,
}

/// The run record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRun {
    pub id: Uuid,
    pub target_url: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    /// Ordered log of step outcomes.
    pub log: Vec<StepOutcome>,
    /// Per-field retry counters, keyed by locator display form.
    pub field_retries: HashMap<String, u32>,
    /// Driver-level failures observed so far (state machine retry budget).
    pub driver_failures: u32,
    /// Locators skipped after exhausting their retry budget.
    pub skipped_fields: Vec<String>,
    /// Store keys of captured screenshots.
    pub screenshot_refs: Vec<String>,
    /// Seconds after which the run's stored artifacts expire.
    pub ttl_secs: i64,
}

impl ApplicationRun {
    pub fn new(request: &ApplicationRequest, ttl_secs: i64) -> Self {
        Self {
            id: request.run_id,
            target_url: request.target_url.clone(),
            state: RunState::Queued,
            created_at: Utc::now(),
            log: Vec::new(),
            field_retries: HashMap::new(),
            driver_failures: 0,
            skipped_fields: Vec::new(),
            screenshot_refs: Vec::new(),
            ttl_secs,
        }
    }

    /// Move to `next`, logging the transition.
    pub fn transition(&mut self, next: RunState) {
        self.record(
            "transition",
            format!("{} -> {}", self.state.label(), next.label()),
        );
        tracing::info!(
            target: "run",
            run_id = %self.id,
            from = self.state.label(),
            to = next.label(),
            "state transition"
        );
        self.state = next;
    }

    /// Append a step outcome to the ordered log.
    pub fn record(&mut self, stage: &str, detail: impl Into<String>) {
        self.log.push(StepOutcome {
            at: Utc::now(),
            stage: stage.to_string(),
            detail: detail.into(),
        });
    }

    /// Bump and return the retry count for one field.
    pub fn bump_field_retry(&mut self, locator_key: &str) -> u32 {
        let count = self.field_retries.entry(locator_key.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

/// Emitted exactly once when a run reaches a terminal state; consumed by
/// the notification/UI collaborators outside this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub run_id: Uuid,
    pub final_state: RunState,
    pub filled_field_count: usize,
    pub unresolved_field_count: usize,
    pub screenshot_refs: Vec<String>,
}
