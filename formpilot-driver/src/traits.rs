use async_trait::async_trait;
use formpilot_common::{CaptchaKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Stable handle on one detected form element.
///
/// The variant reflects the detection strategy that produced it: DOM fields
/// carry a CSS selector, visual fields a screen region (resolved to the
/// element under its center at interaction time), tab-order fields the
/// focus-stop index they were found at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FieldLocator {
    Css { selector: String },
    Region { x: i64, y: i64, width: i64, height: i64 },
    TabStop { index: u32 },
}

impl FieldLocator {
    pub fn css(selector: impl Into<String>) -> Self {
        FieldLocator::Css {
            selector: selector.into(),
        }
    }
}

impl fmt::Display for FieldLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLocator::Css { selector } => write!(f, "css:{selector}"),
            FieldLocator::Region { x, y, width, height } => {
                write!(f, "region:{x},{y} {width}x{height}")
            }
            FieldLocator::TabStop { index } => write!(f, "tab:{index}"),
        }
    }
}

/// One interactive element as harvested from the page, before any semantic
/// interpretation. Field names mirror the JSON produced by the in-page
/// collection script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawElement {
    pub tag: String,
    #[serde(default)]
    pub input_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub aria_label: String,
    #[serde(default)]
    pub label_text: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    pub selector: String,
    #[serde(default)]
    pub tab_stop: Option<u32>,
}

/// Everything the pipeline needs from a browser, per Application Run.
///
/// Implementations must keep the two failure modes distinct: transport and
/// navigation problems surface as `PilotError::Driver`, while a locator
/// that no longer resolves to an interactable element surfaces as
/// `PilotError::NotInteractable` so the caller can re-detect locally
/// instead of aborting.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Harvest visible interactive elements with their labels and
    /// attributes. Input to the DOM detection strategy.
    async fn collect_elements(&mut self) -> Result<Vec<RawElement>>;

    /// Walk the page's natural focus order for up to `limit` stops and
    /// describe each focused element. Input to the tab-order strategy.
    async fn walk_tab_order(&mut self, limit: usize) -> Result<Vec<RawElement>>;

    async fn fill(&mut self, locator: &FieldLocator, value: &str) -> Result<()>;

    async fn upload(&mut self, locator: &FieldLocator, path: &Path) -> Result<()>;

    /// Click the submit control; `None` falls back to the page's default
    /// submit button.
    async fn submit(&mut self, locator: Option<&FieldLocator>) -> Result<()>;

    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Scan the DOM for known CAPTCHA widget patterns. A hit is a signal
    /// for the state machine, not an error.
    async fn scan_captcha(&mut self) -> Result<Option<CaptchaKind>>;

    /// Give a partially-rendered page time to settle before re-detection.
    async fn settle(&mut self, wait: Duration) -> Result<()> {
        tokio::time::sleep(wait).await;
        Ok(())
    }
}
