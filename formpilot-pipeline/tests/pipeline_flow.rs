//! End-to-end pipeline behavior against a scripted in-memory driver.
use async_trait::async_trait;
use formpilot_common::{CaptchaKind, DocumentKind, PilotError, Result};
use formpilot_config::{DetectionConfig, MappingConfig, RetryConfig};
use formpilot_driver::{FieldLocator, PageDriver, RawElement};
use formpilot_pipeline::profile::PersonalInfo;
use formpilot_pipeline::run::{AbortReason, FailureReason};
use formpilot_pipeline::{
    ApplicationRequest, ApplicationRun, CandidateProfile, PipelineEngine, RunState,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeDriver {
    elements: Vec<RawElement>,
    /// Per-locator countdown of NotInteractable failures before a fill
    /// succeeds (u32::MAX = never succeeds).
    flaky_fills: HashMap<String, u32>,
    /// One entry consumed per captcha scan; empty queue scans clean.
    captcha_schedule: VecDeque<Option<CaptchaKind>>,
    fill_log: Vec<(String, String)>,
    upload_log: Vec<(String, PathBuf)>,
    submitted: bool,
    collect_calls: u32,
    settle_calls: u32,
    screenshots_taken: u32,
}

impl FakeDriver {
    fn with_elements(elements: Vec<RawElement>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn collect_elements(&mut self) -> Result<Vec<RawElement>> {
        self.collect_calls += 1;
        Ok(self.elements.clone())
    }

    async fn walk_tab_order(&mut self, _limit: usize) -> Result<Vec<RawElement>> {
        Ok(vec![])
    }

    async fn fill(&mut self, locator: &FieldLocator, value: &str) -> Result<()> {
        let key = locator.to_string();
        if let Some(remaining) = self.flaky_fills.get_mut(&key) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(PilotError::NotInteractable(format!("{key}: stale")));
            }
        }
        self.fill_log.push((key, value.to_string()));
        Ok(())
    }

    async fn upload(&mut self, locator: &FieldLocator, path: &Path) -> Result<()> {
        self.upload_log.push((locator.to_string(), path.to_path_buf()));
        Ok(())
    }

    async fn submit(&mut self, _locator: Option<&FieldLocator>) -> Result<()> {
        self.submitted = true;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.screenshots_taken += 1;
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn scan_captcha(&mut self) -> Result<Option<CaptchaKind>> {
        Ok(self.captcha_schedule.pop_front().flatten())
    }

    async fn settle(&mut self, _wait: Duration) -> Result<()> {
        self.settle_calls += 1;
        Ok(())
    }
}

fn input(selector: &str, input_type: &str, label: &str, required: bool) -> RawElement {
    RawElement {
        tag: "input".into(),
        input_type: input_type.into(),
        name: selector.trim_start_matches('#').into(),
        label_text: label.into(),
        required,
        selector: selector.into(),
        ..RawElement::default()
    }
}

fn standard_form() -> Vec<RawElement> {
    vec![
        input("#email", "email", "Email", true),
        input("#confirm_email", "email", "Confirm email", true),
        input("#phone", "tel", "Phone", false),
        input("input[name=\"resume\"]", "file", "Resume upload", true),
    ]
}

fn profile_with_resume() -> CandidateProfile {
    let mut documents = BTreeMap::new();
    documents.insert(DocumentKind::Resume, PathBuf::from("/tmp/ada-resume.pdf"));
    CandidateProfile {
        personal: PersonalInfo {
            first_name: "Ada".into(),
            last_name: "Krawczyk".into(),
            email: "ada.krawczyk@example.com".into(),
            phone: "+48 600 123 456".into(),
            location: None,
            linkedin: None,
            website: None,
        },
        summary: None,
        education: vec![],
        experience: vec![],
        skills: vec![],
        languages: vec![],
        salary_expectation: None,
        availability: None,
        documents,
    }
}

fn engine() -> PipelineEngine {
    PipelineEngine::new(
        DetectionConfig::default(),
        MappingConfig::default(),
        RetryConfig::default(),
    )
    .unwrap()
}

fn run_for(url: &str) -> ApplicationRun {
    let request = ApplicationRequest::new(url, "profile.yaml");
    ApplicationRun::new(&request, 3600)
}

#[tokio::test]
async fn standard_form_reaches_completed_with_everything_filled() {
    let mut driver = FakeDriver::with_elements(standard_form());
    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let (event, artifacts) = engine()
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    assert_eq!(run.state, RunState::Completed);
    assert!(driver.submitted);

    // duplicate email kinds both fill from the same attribute
    let fills: HashMap<_, _> = driver.fill_log.iter().cloned().collect();
    assert_eq!(
        fills.get("css:#email").map(String::as_str),
        Some("ada.krawczyk@example.com")
    );
    assert_eq!(
        fills.get("css:#confirm_email").map(String::as_str),
        Some("ada.krawczyk@example.com")
    );
    assert_eq!(fills.get("css:#phone").map(String::as_str), Some("+48600123456"));

    assert_eq!(driver.upload_log.len(), 1);
    assert_eq!(driver.upload_log[0].1, PathBuf::from("/tmp/ada-resume.pdf"));

    assert_eq!(event.filled_field_count, 4);
    assert_eq!(event.unresolved_field_count, 0);
    assert!(artifacts.schema_snapshot.is_some());
    assert!(artifacts.mapping_log.is_some());
}

#[tokio::test]
async fn empty_page_fails_with_no_fields_detected_after_one_settle_retry() {
    let mut driver = FakeDriver::with_elements(vec![]);
    let mut run = run_for("https://jobs.example/blank");
    let profile = profile_with_resume();

    let (event, _) = engine()
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    assert_eq!(run.state, RunState::Failed(FailureReason::NoFieldsDetected));
    assert_eq!(event.final_state, RunState::Failed(FailureReason::NoFieldsDetected));
    // initial harvest + exactly one settle-wait retry, then give up
    assert_eq!(driver.collect_calls, 2);
    assert_eq!(driver.settle_calls, 1);
    assert!(!driver.submitted);
    // diagnostics captured before the terminal state
    assert!(driver.screenshots_taken >= 1);
    assert!(!event.screenshot_refs.is_empty());
}

#[tokio::test]
async fn one_stuck_field_is_skipped_after_bounded_redetection_and_the_run_continues() {
    let mut driver = FakeDriver::with_elements(standard_form());
    driver.flaky_fills.insert("css:#phone".into(), u32::MAX);

    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let retries = RetryConfig {
        field_attempts: 3,
        redetect_limit: 2,
        driver_attempts: 2,
    };
    let engine = PipelineEngine::new(
        DetectionConfig::default(),
        MappingConfig::default(),
        retries,
    )
    .unwrap();

    let (event, _) = engine
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    // the run is not aborted by one bad field
    assert_eq!(run.state, RunState::Completed);
    assert!(driver.submitted);
    assert_eq!(run.skipped_fields, vec!["css:#phone".to_string()]);
    assert_eq!(run.field_retries.get("css:#phone"), Some(&3));
    // initial detection + at most redetect_limit local re-detections
    assert_eq!(driver.collect_calls, 1 + 2);
    // the other fields still landed
    assert_eq!(event.filled_field_count, 3);
    assert_eq!(event.unresolved_field_count, 1);
}

#[tokio::test]
async fn captcha_during_filling_without_solver_aborts_with_screenshot() {
    let mut driver = FakeDriver::with_elements(standard_form());
    // first scan (after navigation) clean, second scan (entering Filling) hits
    driver.captcha_schedule.push_back(None);
    driver.captcha_schedule.push_back(Some(CaptchaKind::Recaptcha));

    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let (event, artifacts) = engine()
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    assert_eq!(run.state, RunState::Aborted(AbortReason::Captcha));
    assert_eq!(event.final_state, RunState::Aborted(AbortReason::Captcha));
    assert!(!driver.submitted);
    assert!(driver.fill_log.is_empty());
    assert_eq!(driver.screenshots_taken, 1);
    assert_eq!(artifacts.screenshots.len(), 1);
    assert_eq!(event.screenshot_refs.len(), 1);
}

#[tokio::test]
async fn required_field_without_mapping_aborts_the_run() {
    let mut elements = standard_form();
    elements.push(input("#referral", "text", "Referral code *", true));

    let mut driver = FakeDriver::with_elements(elements);
    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let (_, _) = engine()
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    assert_eq!(
        run.state,
        RunState::Aborted(AbortReason::RequiredFieldUnresolved)
    );
    assert!(driver.fill_log.is_empty());
    assert!(!driver.submitted);
}

#[tokio::test]
async fn optional_unresolved_fields_do_not_block_submission() {
    let mut elements = standard_form();
    elements.push(input("#referral", "text", "Referral code", false));

    let mut driver = FakeDriver::with_elements(elements);
    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let (event, _) = engine()
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(event.unresolved_field_count, 1);
}

#[tokio::test]
async fn unavailable_capability_degrades_to_dom_only_detection() {
    use formpilot_llm::scripted::ScriptedClient;
    use std::sync::Arc;

    // two fields is below the default DOM-coverage floor, so the visual
    // strategy is consulted; its capability never answers
    let mut driver = FakeDriver::with_elements(vec![
        input("#email", "email", "Email", false),
        input("#phone", "tel", "Phone", false),
    ]);
    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let engine = engine().with_capability(Arc::new(ScriptedClient::new()));
    let (event, _) = engine
        .execute(&mut driver, &mut run, &profile, &CancellationToken::new())
        .await;

    // the dead capability cost a screenshot, not the run
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(event.filled_field_count, 2);
    assert_eq!(driver.screenshots_taken, 1);
}

#[tokio::test]
async fn cancellation_between_transitions_aborts_cleanly() {
    let mut driver = FakeDriver::with_elements(standard_form());
    let mut run = run_for("https://jobs.example/apply");
    let profile = profile_with_resume();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let (event, _) = engine().execute(&mut driver, &mut run, &profile, &cancel).await;

    assert_eq!(run.state, RunState::Aborted(AbortReason::Cancelled));
    assert_eq!(event.final_state, RunState::Aborted(AbortReason::Cancelled));
    assert!(driver.fill_log.is_empty());
    assert!(!driver.submitted);
}
