//! The Application State Machine.
//!
//! `Queued → Detecting → Mapping → Filling → Uploading → ReadyToSubmit →
//! Submitted → Completed`, with `Failed(reason)` reachable from any
//! non-terminal state and `Aborted(reason)` for policy stops. The central
//! contract is retry granularity: a transient DOM change costs a local
//! re-detection for that one field, never the accumulated mapping work;
//! driver failures burn a separate, state-machine-level budget.
use crate::detect::FormDetector;
use crate::documents::{self, DocumentResolution};
use crate::map::{FieldMapper, FieldMapping, MappingTarget};
use crate::profile::CandidateProfile;
use crate::run::{AbortReason, ApplicationRun, FailureReason, OutcomeEvent, RunState};
use crate::schema::FormSchema;
use async_trait::async_trait;
use formpilot_common::{CaptchaKind, PilotError, Result};
use formpilot_config::{DetectionConfig, MappingConfig, RetryConfig};
use formpilot_driver::{FieldLocator, PageDriver};
use formpilot_llm::traits::InferenceClient;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Review/confirmation hook consulted between `ReadyToSubmit` and
/// `Submitted`. The chat UI plugs in here; headless runs auto-approve.
#[async_trait]
pub trait SubmitGate: Send + Sync {
    async fn approve(&self, run: &ApplicationRun) -> bool;
}

/// Default gate: commit without review.
pub struct AutoApprove;

#[async_trait]
impl SubmitGate for AutoApprove {
    async fn approve(&self, _run: &ApplicationRun) -> bool {
        true
    }
}

/// External CAPTCHA solving collaborator. Solving internals are out of
/// scope here; without a solver a CAPTCHA aborts the run.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, kind: CaptchaKind) -> Result<()>;
}

/// Artifacts produced during one run, handed to the worker for TTL-bound
/// persistence.
#[derive(Debug, Default)]
pub struct RunArtifacts {
    pub schema_snapshot: Option<String>,
    pub mapping_log: Option<String>,
    /// (store key, PNG bytes)
    pub screenshots: Vec<(String, Vec<u8>)>,
}

pub struct PipelineEngine {
    detector: FormDetector,
    mapper: FieldMapper,
    retries: RetryConfig,
    mapping_cfg: MappingConfig,
    capability: Option<Arc<dyn InferenceClient + Send + Sync>>,
    gate: Arc<dyn SubmitGate>,
    solver: Option<Arc<dyn CaptchaSolver>>,
}

impl PipelineEngine {
    pub fn new(
        detection: DetectionConfig,
        mapping: MappingConfig,
        retries: RetryConfig,
    ) -> Result<Self> {
        Ok(Self {
            detector: FormDetector::new(detection),
            mapper: FieldMapper::new(&mapping)?,
            retries,
            mapping_cfg: mapping,
            capability: None,
            gate: Arc::new(AutoApprove),
            solver: None,
        })
    }

    pub fn with_capability(
        mut self,
        capability: Arc<dyn InferenceClient + Send + Sync>,
    ) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn SubmitGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    fn capability_ref(&self) -> Option<&dyn InferenceClient> {
        self.capability.as_deref().map(|c| c as &dyn InferenceClient)
    }

    /// Execute one Application Run to a terminal state.
    ///
    /// Always returns an outcome event (exactly one per run) plus the
    /// artifacts to persist. The driver context itself is owned and
    /// released by the caller.
    pub async fn execute<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        profile: &CandidateProfile,
        cancel: &CancellationToken,
    ) -> (OutcomeEvent, RunArtifacts) {
        let mut artifacts = RunArtifacts::default();
        let mut filled = 0usize;
        let mut unresolved = 0usize;

        self.drive(driver, run, profile, cancel, &mut artifacts, &mut filled, &mut unresolved)
            .await;

        debug_assert!(run.state.is_terminal());
        let event = OutcomeEvent {
            run_id: run.id,
            final_state: run.state.clone(),
            filled_field_count: filled,
            unresolved_field_count: unresolved,
            screenshot_refs: run.screenshot_refs.clone(),
        };
        info!(
            target: "run.outcome",
            run_id = %event.run_id,
            final_state = run.state.label(),
            filled = event.filled_field_count,
            unresolved = event.unresolved_field_count,
            "run reached terminal state"
        );
        (event, artifacts)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        profile: &CandidateProfile,
        cancel: &CancellationToken,
        artifacts: &mut RunArtifacts,
        filled: &mut usize,
        unresolved: &mut usize,
    ) {
        // ---- Detecting ----
        if cancel.is_cancelled() {
            self.abort(driver, run, artifacts, AbortReason::Cancelled).await;
            return;
        }
        run.transition(RunState::Detecting);

        if self.navigate_with_retry(driver, run, artifacts).await.is_err() {
            return;
        }
        if self.captcha_guard(driver, run, artifacts).await.is_err() {
            return;
        }

        let report = match self.detector.detect(driver, self.capability_ref()).await {
            Ok(report) => report,
            Err(PilotError::Detection(msg)) => {
                run.record("detect", msg);
                self.fail(driver, run, artifacts, FailureReason::NoFieldsDetected).await;
                return;
            }
            Err(e) => {
                run.record("detect", e.to_string());
                self.fail(driver, run, artifacts, FailureReason::Driver).await;
                return;
            }
        };
        for conflict in &report.conflicts {
            run.record(
                "detect.conflict",
                format!(
                    "{}: kept {:?} ({:?}), discarded {:?} ({:?})",
                    conflict.locator,
                    conflict.kept,
                    conflict.kept_origin,
                    conflict.discarded,
                    conflict.discarded_origin
                ),
            );
        }
        artifacts.schema_snapshot = serde_json::to_string(&report.schema).ok();
        let mut schema = report.schema;

        // ---- Mapping ----
        if cancel.is_cancelled() {
            self.abort(driver, run, artifacts, AbortReason::Cancelled).await;
            return;
        }
        run.transition(RunState::Mapping);

        let mappings = self
            .mapper
            .map(&schema, profile, self.capability_ref())
            .await;
        let resolution =
            documents::resolve(&schema, &profile.documents, self.capability_ref()).await;
        artifacts.mapping_log = serde_json::to_string(&serde_json::json!({
            "mappings": &mappings,
            "documents": &resolution,
        }))
        .ok();

        if let Some(blocker) = self.required_blocker(&mappings, &resolution) {
            run.record("mapping", format!("required field unresolved: {blocker}"));
            self.abort(driver, run, artifacts, AbortReason::RequiredFieldUnresolved)
                .await;
            return;
        }

        // ---- Filling ----
        run.transition(RunState::Filling);
        if self.captcha_guard(driver, run, artifacts).await.is_err() {
            return;
        }

        for mapping in &mappings {
            // cancellation applies between fields, never mid-field
            if cancel.is_cancelled() {
                self.abort(driver, run, artifacts, AbortReason::Cancelled).await;
                return;
            }

            let value = match &mapping.target {
                MappingTarget::Attribute(attribute) => {
                    if mapping.confidence < self.mapping_cfg.acceptance_threshold {
                        run.record(
                            "fill.skip",
                            format!("{}: below acceptance threshold", mapping.locator),
                        );
                        *unresolved += 1;
                        continue;
                    }
                    match profile.render(*attribute) {
                        Some(value) => value,
                        None => {
                            run.record(
                                "fill.skip",
                                format!("{}: profile has no {}", mapping.locator, attribute.name()),
                            );
                            *unresolved += 1;
                            continue;
                        }
                    }
                }
                MappingTarget::Generated => {
                    if !self.mapping_cfg.allow_generated {
                        run.record(
                            "fill.skip",
                            format!("{}: generated content disabled", mapping.locator),
                        );
                        *unresolved += 1;
                        continue;
                    }
                    match self.generate_content(mapping, profile).await {
                        Some(value) => value,
                        None => {
                            run.record(
                                "fill.skip",
                                format!("{}: generated content unavailable", mapping.locator),
                            );
                            *unresolved += 1;
                            continue;
                        }
                    }
                }
                MappingTarget::Document(_) => continue,
                MappingTarget::Unresolved => {
                    run.record("fill.unresolved", mapping.locator.to_string());
                    *unresolved += 1;
                    continue;
                }
            };

            match self
                .fill_with_retry(driver, run, artifacts, &mut schema, mapping, &value)
                .await
            {
                Ok(true) => *filled += 1,
                Ok(false) => *unresolved += 1,
                Err(()) => return,
            }
        }

        // ---- Uploading ----
        if cancel.is_cancelled() {
            self.abort(driver, run, artifacts, AbortReason::Cancelled).await;
            return;
        }
        run.transition(RunState::Uploading);

        for upload in &resolution.resolved {
            if cancel.is_cancelled() {
                self.abort(driver, run, artifacts, AbortReason::Cancelled).await;
                return;
            }
            match self
                .upload_with_retry(driver, run, artifacts, &upload.locator, &upload.path)
                .await
            {
                Ok(true) => *filled += 1,
                Ok(false) => *unresolved += 1,
                Err(()) => return,
            }
        }
        *unresolved += resolution.unresolved.len();

        // ---- ReadyToSubmit ----
        if cancel.is_cancelled() {
            self.abort(driver, run, artifacts, AbortReason::Cancelled).await;
            return;
        }
        run.transition(RunState::ReadyToSubmit);
        if self.captcha_guard(driver, run, artifacts).await.is_err() {
            return;
        }

        if !self.gate.approve(run).await {
            run.record("submit", "review hook rejected the filled state");
            self.abort(driver, run, artifacts, AbortReason::ReviewRejected).await;
            return;
        }

        match driver.submit(None).await {
            Ok(()) => {
                run.transition(RunState::Submitted);
                run.transition(RunState::Completed);
            }
            Err(e) => {
                run.record("submit", e.to_string());
                self.fail(driver, run, artifacts, FailureReason::Driver).await;
            }
        }
    }

    /// A page-required field with no mapping and no permitted fallback
    /// blocks the run; so does a required upload nothing matched.
    fn required_blocker(
        &self,
        mappings: &[FieldMapping],
        resolution: &DocumentResolution,
    ) -> Option<String> {
        for mapping in mappings {
            if !mapping.required {
                continue;
            }
            match mapping.target {
                MappingTarget::Unresolved => return Some(mapping.locator.to_string()),
                MappingTarget::Generated if !self.mapping_cfg.allow_generated => {
                    return Some(mapping.locator.to_string())
                }
                _ => {}
            }
        }
        resolution
            .unresolved
            .iter()
            .find(|u| u.required)
            .map(|u| u.locator.to_string())
    }

    async fn navigate_with_retry<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
    ) -> std::result::Result<(), ()> {
        let url = run.target_url.clone();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match driver.navigate(&url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(target: "run.navigate", run_id = %run.id, attempt, error = %e, "navigation failed");
                    run.record("navigate", format!("attempt {attempt}: {e}"));
                    if attempt >= self.retries.driver_attempts {
                        self.fail(driver, run, artifacts, FailureReason::Driver).await;
                        return Err(());
                    }
                }
            }
        }
    }

    /// Fill one field, retrying stale locators with bounded local
    /// re-detection. `Ok(false)` means the field was skipped and the run
    /// continues; `Err(())` means a terminal state was entered.
    async fn fill_with_retry<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
        schema: &mut FormSchema,
        mapping: &FieldMapping,
        value: &str,
    ) -> std::result::Result<bool, ()> {
        let key = mapping.locator.to_string();
        let mut locator = mapping.locator.clone();
        let mut redetects = 0u32;

        loop {
            match driver.fill(&locator, value).await {
                Ok(()) => {
                    run.record("fill", key);
                    return Ok(true);
                }
                Err(PilotError::NotInteractable(msg)) => {
                    let attempts = run.bump_field_retry(&key);
                    run.record("fill.retry", format!("{key}: {msg} (attempt {attempts})"));
                    if attempts >= self.retries.field_attempts {
                        run.skipped_fields.push(key.clone());
                        run.record("fill.skip", format!("{key}: retry budget exhausted"));
                        return Ok(false);
                    }
                    if redetects < self.retries.redetect_limit {
                        redetects += 1;
                        if let Some(fresh) =
                            self.redetect_locator(driver, schema, mapping).await
                        {
                            run.record("fill.redetect", format!("{key} -> {fresh}"));
                            locator = fresh;
                        }
                    }
                }
                Err(e) => {
                    run.driver_failures += 1;
                    run.record("fill.driver_error", format!("{key}: {e}"));
                    if run.driver_failures >= self.retries.driver_attempts {
                        self.fail(driver, run, artifacts, FailureReason::Driver).await;
                        return Err(());
                    }
                }
            }
        }
    }

    async fn upload_with_retry<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
        locator: &FieldLocator,
        path: &Path,
    ) -> std::result::Result<bool, ()> {
        let key = locator.to_string();
        loop {
            match driver.upload(locator, path).await {
                Ok(()) => {
                    run.record("upload", key);
                    return Ok(true);
                }
                Err(PilotError::NotInteractable(msg)) => {
                    let attempts = run.bump_field_retry(&key);
                    run.record("upload.retry", format!("{key}: {msg} (attempt {attempts})"));
                    if attempts >= self.retries.field_attempts {
                        run.skipped_fields.push(key.clone());
                        run.record("upload.skip", format!("{key}: retry budget exhausted"));
                        return Ok(false);
                    }
                }
                Err(e) => {
                    run.driver_failures += 1;
                    run.record("upload.driver_error", format!("{key}: {e}"));
                    if run.driver_failures >= self.retries.driver_attempts {
                        self.fail(driver, run, artifacts, FailureReason::Driver).await;
                        return Err(());
                    }
                }
            }
        }
    }

    /// Bounded local re-detection: refresh the schema and find the field
    /// this mapping belonged to, by label first, original locator second.
    async fn redetect_locator<D: PageDriver>(
        &self,
        driver: &mut D,
        schema: &mut FormSchema,
        mapping: &FieldMapping,
    ) -> Option<FieldLocator> {
        let report = match self.detector.detect(driver, self.capability_ref()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(target: "run.redetect", error = %e, "re-detection failed");
                return None;
            }
        };
        *schema = report.schema;

        let found = schema
            .fields
            .iter()
            .find(|f| !mapping.label.is_empty() && f.label == mapping.label)
            .or_else(|| schema.find(&mapping.locator))?;
        Some(found.locator.clone())
    }

    /// CAPTCHA is a policy decision, not an error: route to the solver if
    /// one is configured, otherwise abort with a screenshot.
    async fn captcha_guard<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
    ) -> std::result::Result<(), ()> {
        match driver.scan_captcha().await {
            Ok(None) => Ok(()),
            Ok(Some(kind)) => {
                run.record("captcha", format!("{kind:?} widget present"));
                match &self.solver {
                    Some(solver) => match solver.solve(kind).await {
                        Ok(()) => {
                            run.record("captcha", "external solver succeeded");
                            Ok(())
                        }
                        Err(e) => {
                            run.record("captcha", format!("external solver failed: {e}"));
                            self.abort(driver, run, artifacts, AbortReason::Captcha).await;
                            Err(())
                        }
                    },
                    None => {
                        self.abort(driver, run, artifacts, AbortReason::Captcha).await;
                        Err(())
                    }
                }
            }
            Err(e) => {
                // a failed scan neither proves nor disproves a CAPTCHA
                run.record("captcha", format!("scan failed: {e}"));
                Ok(())
            }
        }
    }

    async fn generate_content(
        &self,
        mapping: &FieldMapping,
        profile: &CandidateProfile,
    ) -> Option<String> {
        let capability = self.capability.as_deref()?;
        let prompt = format!(
            "Write a short, professional answer (3-5 sentences) to this job application question: \"{}\".\nCandidate: {} {}. Background: {}",
            mapping.label,
            profile.personal.first_name,
            profile.personal.last_name,
            profile.summary.as_deref().unwrap_or("not provided"),
        );
        match capability.generate(&prompt, None, Some(400), Some(0.4)).await {
            Ok(resp) if !resp.text.trim().is_empty() => Some(resp.text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(target: "run.generate", error = %e, "content generation unavailable");
                None
            }
        }
    }

    async fn fail<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
        reason: FailureReason,
    ) {
        self.capture_screenshot(driver, run, artifacts).await;
        run.transition(RunState::Failed(reason));
    }

    async fn abort<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
        reason: AbortReason,
    ) {
        self.capture_screenshot(driver, run, artifacts).await;
        run.transition(RunState::Aborted(reason));
    }

    /// Best-effort diagnostics before entering a terminal failure state.
    async fn capture_screenshot<D: PageDriver>(
        &self,
        driver: &mut D,
        run: &mut ApplicationRun,
        artifacts: &mut RunArtifacts,
    ) {
        match driver.screenshot().await {
            Ok(bytes) => {
                let key = format!("{}/shot-{}.png", run.id, run.screenshot_refs.len());
                run.screenshot_refs.push(key.clone());
                artifacts.screenshots.push((key, bytes));
            }
            Err(e) => {
                run.record("screenshot", format!("capture failed: {e}"));
            }
        }
    }
}
