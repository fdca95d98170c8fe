//! Form detection: three independent strategies reconciled by a pure merge.
//!
//! DOM inspection is always run and is the highest-confidence origin.
//! The visual strategy is consulted only when DOM coverage looks too thin;
//! the tab-order walk appends whatever both missed. A page that yields
//! nothing gets one settle-wait retry before detection fails.
pub mod dom;
pub mod merge;
pub mod taborder;
pub mod visual;

pub use merge::MergeConflict;

use crate::schema::{FormSchema, SemanticKind};
use formpilot_config::DetectionConfig;
use formpilot_driver::PageDriver;
use formpilot_llm::traits::InferenceClient;
use formpilot_common::{PilotError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything one detection pass produced, conflicts included.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub schema: FormSchema,
    pub conflicts: Vec<MergeConflict>,
}

pub struct FormDetector {
    cfg: DetectionConfig,
}

impl FormDetector {
    pub fn new(cfg: DetectionConfig) -> Self {
        Self { cfg }
    }

    /// Detect form fields on the currently loaded page.
    ///
    /// Fails with `PilotError::Detection` only after every strategy is
    /// exhausted, including one settle-wait retry of the DOM harvest on a
    /// page that initially reports zero elements.
    pub async fn detect<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        capability: Option<&dyn InferenceClient>,
    ) -> Result<DetectionReport> {
        let mut raw = driver.collect_elements().await?;
        if raw.is_empty() {
            debug!(target: "detect", "empty first harvest; waiting for page to settle");
            driver
                .settle(Duration::from_millis(self.cfg.settle_wait_ms))
                .await?;
            raw = driver.collect_elements().await?;
        }

        let dom_fields = dom::interpret(&raw);

        let visual_fields = if self.needs_visual(&dom_fields) {
            match capability {
                Some(capability) => match driver.screenshot().await {
                    Ok(shot) => {
                        match visual::detect(&shot, capability, self.cfg.visual_baseline).await {
                            Ok(fields) => fields,
                            Err(e) => {
                                warn!(target: "detect.visual", error = %e, "visual strategy unavailable");
                                vec![]
                            }
                        }
                    }
                    Err(e) => {
                        warn!(target: "detect.visual", error = %e, "screenshot unavailable");
                        vec![]
                    }
                },
                None => {
                    debug!(target: "detect.visual", "no capability configured; dom-only");
                    vec![]
                }
            }
        } else {
            vec![]
        };

        let tab_fields = match driver.walk_tab_order(self.cfg.tab_walk_limit).await {
            Ok(stops) => taborder::interpret(&stops),
            Err(e) => {
                warn!(target: "detect.taborder", error = %e, "tab walk unavailable");
                vec![]
            }
        };

        let (schema, conflicts) = merge::merge(dom_fields, visual_fields, tab_fields);

        info!(
            target: "detect",
            fields = schema.len(),
            conflicts = conflicts.len(),
            "detection pass complete"
        );

        if schema.is_empty() {
            return Err(PilotError::Detection(
                "no candidate fields found by any strategy".into(),
            ));
        }

        Ok(DetectionReport { schema, conflicts })
    }

    /// Low DOM coverage heuristic: too few fields for an application form,
    /// or too many fields the classifier could not name.
    fn needs_visual(&self, dom_fields: &[crate::schema::FieldDescriptor]) -> bool {
        if dom_fields.len() < self.cfg.min_dom_fields {
            return true;
        }
        let unknown = dom_fields
            .iter()
            .filter(|f| f.kind == SemanticKind::Unknown)
            .count();
        (unknown as f32 / dom_fields.len() as f32) > self.cfg.max_unknown_ratio
    }
}
