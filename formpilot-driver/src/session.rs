use crate::behavioral::BehavioralEngine;
use crate::fingerprint::FingerprintPool;
use crate::stealth::{build_stealth_arguments, StealthScripts};
use crate::traits::{FieldLocator, PageDriver, RawElement};
use async_trait::async_trait;
use fantoccini::actions::{InputSource, KeyAction, KeyActions};
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use formpilot_common::{CaptchaKind, PilotError, Result, StealthLevel};
use serde_json::json;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};
use webdriver::capabilities::Capabilities;
use fantoccini::error::ErrorStatus;

/// WebDriver key code for Tab.
const TAB_KEY: char = '\u{e004}';

/// Harvests every visible interactive element with its label context.
/// Elements without id or name are stamped with a synthetic attribute so the
/// returned selector stays resolvable.
const COLLECT_ELEMENTS_SCRIPT: &str = r#"
    const fields = [];
    const nodes = Array.from(document.querySelectorAll('input, select, textarea'));
    nodes.forEach((el, idx) => {
        const rect = el.getBoundingClientRect();
        const type = (el.getAttribute('type') || '').toLowerCase();
        if (rect.width === 0 || rect.height === 0) return;
        if (type === 'hidden' || type === 'submit' || type === 'button') return;
        let selector;
        if (el.id) {
            selector = '#' + CSS.escape(el.id);
        } else if (el.getAttribute('name')) {
            selector = el.tagName.toLowerCase() + '[name="' + el.getAttribute('name') + '"]';
        } else {
            el.setAttribute('data-formpilot-idx', String(idx));
            selector = '[data-formpilot-idx="' + idx + '"]';
        }
        let label = '';
        if (el.id) {
            const lab = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (lab) label = lab.textContent.trim();
        }
        if (!label) {
            const wrap = el.closest('label');
            if (wrap) label = wrap.textContent.trim();
        }
        if (!label && el.parentElement) {
            label = el.parentElement.textContent.trim().substring(0, 120);
        }
        const options = el.tagName.toLowerCase() === 'select'
            ? Array.from(el.options).map(o => o.textContent.trim())
            : [];
        fields.push({
            tag: el.tagName.toLowerCase(),
            input_type: type || el.tagName.toLowerCase(),
            name: el.getAttribute('name') || '',
            id: el.id || '',
            placeholder: el.getAttribute('placeholder') || '',
            aria_label: el.getAttribute('aria-label') || '',
            label_text: label,
            required: el.required || el.getAttribute('aria-required') === 'true' || label.includes('*'),
            options: options,
            selector: selector,
            tab_stop: null
        });
    });
    return fields;
"#;

/// Describes `document.activeElement` in the same shape as the harvest
/// script, or returns null when focus sits on the body.
const DESCRIBE_ACTIVE_SCRIPT: &str = r#"
    const el = document.activeElement;
    if (!el || el === document.body) return null;
    const tag = el.tagName.toLowerCase();
    if (tag !== 'input' && tag !== 'select' && tag !== 'textarea' && !el.isContentEditable) return null;
    const type = (el.getAttribute('type') || '').toLowerCase();
    let selector;
    if (el.id) {
        selector = '#' + CSS.escape(el.id);
    } else if (el.getAttribute('name')) {
        selector = tag + '[name="' + el.getAttribute('name') + '"]';
    } else if (el.getAttribute('data-formpilot-idx')) {
        selector = '[data-formpilot-idx="' + el.getAttribute('data-formpilot-idx') + '"]';
    } else {
        return null;
    }
    return {
        tag: tag,
        input_type: type || tag,
        name: el.getAttribute('name') || '',
        id: el.id || '',
        placeholder: el.getAttribute('placeholder') || '',
        aria_label: el.getAttribute('aria-label') || '',
        label_text: '',
        required: el.required || false,
        options: [],
        selector: selector,
        tab_stop: null
    };
"#;

const FOCUS_AT_POINT_SCRIPT: &str = r#"
    const el = document.elementFromPoint(arguments[0], arguments[1]);
    if (el && typeof el.focus === 'function') { el.focus(); return true; }
    return false;
"#;

/// DOM patterns for the CAPTCHA families we can recognise.
const CAPTCHA_PATTERNS: &[(&str, CaptchaKind)] = &[
    (
        ".g-recaptcha, iframe[src*='recaptcha'], #g-recaptcha-response",
        CaptchaKind::Recaptcha,
    ),
    (".h-captcha, iframe[src*='hcaptcha']", CaptchaKind::Hcaptcha),
    (
        ".cf-turnstile, iframe[src*='turnstile']",
        CaptchaKind::Turnstile,
    ),
    (
        "iframe[src*='arkoselabs'], #FunCaptcha",
        CaptchaKind::Arkose,
    ),
];

/// One stealth-hardened browser context, owned by exactly one Application
/// Run. Fingerprint signals are randomized once at launch; all input goes
/// through the behavioral engine's human pacing.
pub struct StealthSession {
    client: Client,
    behavioral: BehavioralEngine,
    fingerprints: FingerprintPool,
    level: StealthLevel,
}

impl StealthSession {
    /// Launch a new browser context against a running WebDriver service
    /// (Chromedriver by default).
    pub async fn launch(webdriver_url: &str, headless: bool, level: StealthLevel) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();
        let mut fingerprints = FingerprintPool::new();
        let profile = fingerprints.session_profile().clone();

        let mut args = build_stealth_arguments(level, &profile);
        if headless {
            args.push("--headless".to_string());
            args.push("--disable-gpu".to_string());
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .map_err(|e| PilotError::Driver(format!("webdriver connect failed: {e}")))?;

        info!(
            target: "driver.session",
            user_agent = %profile.user_agent,
            viewport = ?profile.viewport,
            "browser context launched"
        );

        Ok(Self {
            client,
            behavioral: BehavioralEngine::new(),
            fingerprints,
            level,
        })
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| PilotError::Driver(format!("close failed: {e}")))
    }

    async fn apply_stealth_scripts(&mut self) -> Result<()> {
        self.execute(StealthScripts::core_evasions(), vec![]).await?;

        match self.level {
            StealthLevel::Lightweight => {}
            StealthLevel::Balanced => {
                self.execute(StealthScripts::canvas_evasions(), vec![]).await?;
            }
            StealthLevel::Maximum => {
                self.execute(StealthScripts::canvas_evasions(), vec![]).await?;
                self.execute(StealthScripts::webgl_evasions(), vec![]).await?;

                let platform = self.fingerprints.session_profile().platform.clone();
                self.execute(
                    &format!(
                        "Object.defineProperty(navigator, 'platform', {{ get: () => '{}' }});",
                        platform
                    ),
                    vec![],
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn execute(&mut self, script: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| PilotError::Driver(format!("script execution failed: {e}")))
    }

    async fn press_tab(&mut self) -> Result<()> {
        let keys = KeyActions::new("keyboard".to_string())
            .then(KeyAction::Down { value: TAB_KEY })
            .then(KeyAction::Up { value: TAB_KEY });
        self.client
            .perform_actions(keys)
            .await
            .map_err(|e| PilotError::Driver(format!("tab press failed: {e}")))
    }

    /// Resolve a locator to a live element, strategy-dependent.
    async fn resolve(&mut self, locator: &FieldLocator) -> Result<Element> {
        match locator {
            FieldLocator::Css { selector } => self
                .client
                .find(Locator::Css(selector.as_str()))
                .await
                .map_err(|e| interaction_error(locator, e)),
            FieldLocator::Region { x, y, width, height } => {
                let cx = x + width / 2;
                let cy = y + height / 2;
                let hit = self
                    .execute(FOCUS_AT_POINT_SCRIPT, vec![json!(cx), json!(cy)])
                    .await?;
                if hit.as_bool() != Some(true) {
                    return Err(PilotError::NotInteractable(format!(
                        "{locator}: nothing focusable at region center"
                    )));
                }
                self.client
                    .active_element()
                    .await
                    .map_err(|e| interaction_error(locator, e))
            }
            FieldLocator::TabStop { index } => {
                self.execute(
                    "if (document.activeElement) document.activeElement.blur();",
                    vec![],
                )
                .await?;
                for _ in 0..=*index {
                    self.press_tab().await?;
                    self.behavioral.random_delay(60, 140).await;
                }
                self.client
                    .active_element()
                    .await
                    .map_err(|e| interaction_error(locator, e))
            }
        }
    }
}

#[async_trait]
impl PageDriver for StealthSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.behavioral.random_delay(300, 1200).await;
        self.client
            .goto(url)
            .await
            .map_err(|e| PilotError::Driver(format!("navigation to {url} failed: {e}")))?;
        self.apply_stealth_scripts().await?;
        Ok(())
    }

    async fn collect_elements(&mut self) -> Result<Vec<RawElement>> {
        let raw = self.execute(COLLECT_ELEMENTS_SCRIPT, vec![]).await?;
        let elements: Vec<RawElement> = serde_json::from_value(raw)
            .map_err(|e| PilotError::Driver(format!("malformed element harvest: {e}")))?;
        debug!(target: "driver.collect", count = elements.len(), "harvested interactive elements");
        Ok(elements)
    }

    async fn walk_tab_order(&mut self, limit: usize) -> Result<Vec<RawElement>> {
        self.execute(
            "if (document.activeElement) document.activeElement.blur();",
            vec![],
        )
        .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut stops = Vec::new();

        for index in 0..limit {
            self.press_tab().await?;
            self.behavioral.random_delay(60, 140).await;

            let described = self.execute(DESCRIBE_ACTIVE_SCRIPT, vec![]).await?;
            if described.is_null() {
                continue;
            }
            let mut element: RawElement = serde_json::from_value(described)
                .map_err(|e| PilotError::Driver(format!("malformed focus description: {e}")))?;

            // focus wrapped around to an element we already visited
            if !seen.insert(element.selector.clone()) {
                break;
            }
            element.tab_stop = Some(index as u32);
            stops.push(element);
        }

        debug!(target: "driver.taborder", count = stops.len(), "walked focus order");
        Ok(stops)
    }

    async fn fill(&mut self, locator: &FieldLocator, value: &str) -> Result<()> {
        let element = self.resolve(locator).await?;
        self.behavioral.between_actions().await;

        let tag = element
            .prop("tagName")
            .await
            .map_err(|e| interaction_error(locator, e))?
            .unwrap_or_default()
            .to_ascii_lowercase();

        if tag == "select" {
            if element.select_by_label(value).await.is_err() {
                element
                    .select_by_value(value)
                    .await
                    .map_err(|e| interaction_error(locator, e))?;
            }
            return Ok(());
        }

        let input_type = element
            .prop("type")
            .await
            .map_err(|e| interaction_error(locator, e))?
            .unwrap_or_default();

        if input_type == "checkbox" || input_type == "radio" {
            if matches!(value, "true" | "yes" | "1" | "on") {
                element.click().await.map_err(|e| interaction_error(locator, e))?;
            }
            return Ok(());
        }

        element.click().await.map_err(|e| interaction_error(locator, e))?;
        // clearing can fail on some custom widgets; typing still works then
        if let Err(e) = element.clear().await {
            debug!(target: "driver.fill", locator = %locator, error = %e, "clear failed, typing over");
        }
        self.behavioral
            .type_text_human_like(&element, value)
            .await
            .map_err(|e| PilotError::NotInteractable(format!("{locator}: {e}")))?;
        Ok(())
    }

    async fn upload(&mut self, locator: &FieldLocator, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PilotError::Driver(format!(
                "upload file missing: {}",
                path.display()
            )));
        }
        let element = self.resolve(locator).await?;
        self.behavioral.between_actions().await;
        element
            .send_keys(&path.to_string_lossy())
            .await
            .map_err(|e| interaction_error(locator, e))?;
        Ok(())
    }

    async fn submit(&mut self, locator: Option<&FieldLocator>) -> Result<()> {
        let element = match locator {
            Some(l) => self.resolve(l).await?,
            None => self
                .client
                .find(Locator::Css("button[type='submit'], input[type='submit']"))
                .await
                .map_err(|e| {
                    interaction_error(&FieldLocator::css("button[type='submit']"), e)
                })?,
        };
        // a person pauses before committing
        self.behavioral.random_delay(500, 1500).await;
        element
            .click()
            .await
            .map_err(|e| PilotError::Driver(format!("submit click failed: {e}")))?;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .map_err(|e| PilotError::Driver(format!("screenshot failed: {e}")))
    }

    async fn scan_captcha(&mut self) -> Result<Option<CaptchaKind>> {
        for &(pattern, kind) in CAPTCHA_PATTERNS {
            let hits = self
                .client
                .find_all(Locator::Css(pattern))
                .await
                .map_err(|e| PilotError::Driver(format!("captcha scan failed: {e}")))?;
            if !hits.is_empty() {
                warn!(target: "driver.captcha", kind = ?kind, "captcha widget present");
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }
}

/// Classify a WebDriver command failure: stale/missing/blocked elements are
/// locally retryable, everything else is a driver failure.
fn interaction_error(locator: &FieldLocator, e: CmdError) -> PilotError {
    match &e {
        CmdError::Standard(w) => match w.error {
            ErrorStatus::StaleElementReference
            | ErrorStatus::ElementNotInteractable
            | ErrorStatus::ElementClickIntercepted
            | ErrorStatus::InvalidElementState
            | ErrorStatus::NoSuchElement => {
                PilotError::NotInteractable(format!("{locator}: {e}"))
            }
            _ => PilotError::Driver(format!("{locator}: {e}")),
        },
        _ => PilotError::Driver(format!("{locator}: {e}")),
    }
}
