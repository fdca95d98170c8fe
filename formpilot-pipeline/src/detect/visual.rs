//! Visual detection strategy: ask the vision capability to label form
//! regions on a rendered screenshot.
//!
//! Consulted when DOM coverage looks too thin for the page, or when
//! custom-styled widgets (drag-and-drop upload zones) leave no DOM hints.
//! Everything returned here carries an a-priori lower confidence than DOM
//! descriptors, reflecting the higher false-positive risk.
use crate::schema::{FieldDescriptor, Origin, SemanticKind};
use formpilot_common::{PilotError, Result};
use formpilot_driver::FieldLocator;
use formpilot_llm::traits::{extract_json_block, InferenceClient};
use serde::Deserialize;
use tracing::debug;

const VISUAL_SYSTEM_QUESTION: &str = r#"
Analyze this webpage screenshot and identify every form element: input
fields, file upload zones, dropdowns, checkboxes, text areas. Respond with
STRICT JSON ONLY: an array of objects with this exact shape:
[
  {
    "label": string,
    "kind": "first_name" | "last_name" | "full_name" | "email" | "phone" |
            "location" | "linkedin" | "website" | "salary" | "availability" |
            "summary" | "date" | "free_text" | "file_upload" | "select" |
            "checkbox" | "unknown",
    "x": integer, "y": integer, "width": integer, "height": integer,
    "required": boolean
  }
]
Coordinates are CSS pixels from the top-left of the page. Do not include
submit buttons. No markdown, no commentary.
"#;

#[derive(Debug, Deserialize)]
struct VisualField {
    #[serde(default)]
    label: String,
    kind: String,
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    #[serde(default)]
    required: bool,
}

/// Run the visual strategy over an already-captured screenshot.
///
/// Any capability failure (timeout, unreachable, malformed answer) comes
/// back as `CapabilityUnavailable`; the detector treats that as "strategy
/// contributed nothing", never as a run failure.
pub async fn detect(
    screenshot: &[u8],
    capability: &dyn InferenceClient,
    baseline_confidence: f32,
) -> Result<Vec<FieldDescriptor>> {
    let response = capability
        .analyze_image(screenshot, VISUAL_SYSTEM_QUESTION)
        .await?;

    let json = extract_json_block(&response.text).ok_or_else(|| {
        PilotError::CapabilityUnavailable("visual answer contained no JSON".into())
    })?;
    let fields: Vec<VisualField> = serde_json::from_str(&json).map_err(|e| {
        PilotError::CapabilityUnavailable(format!("visual answer not parseable: {e}"))
    })?;

    let descriptors: Vec<FieldDescriptor> = fields
        .into_iter()
        .filter(|f| f.width > 0 && f.height > 0)
        .map(|f| FieldDescriptor {
            locator: FieldLocator::Region {
                x: f.x,
                y: f.y,
                width: f.width,
                height: f.height,
            },
            kind: SemanticKind::parse(&f.kind).unwrap_or(SemanticKind::Unknown),
            origin: Origin::Visual,
            confidence: baseline_confidence.clamp(0.0, 1.0),
            label: f.label,
            required: f.required,
            options: vec![],
        })
        .collect();

    debug!(target: "detect.visual", count = descriptors.len(), "visual strategy answered");
    Ok(descriptors)
}
