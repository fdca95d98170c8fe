//! Tab-order detection strategy.
//!
//! Fallback for JavaScript-rendered forms whose inputs the DOM query missed:
//! walk the page's natural focus order and describe whatever takes focus.
//! Only ever appends descriptors — the merge step guarantees it cannot
//! override a locator the DOM or visual strategy already claimed.
use crate::detect::dom;
use crate::schema::{FieldDescriptor, Origin};
use formpilot_driver::{FieldLocator, RawElement};

/// Tab-order evidence is thin (no label context at focus time), so its
/// confidence is scaled below whatever the classifier would say.
const TAB_CONFIDENCE_SCALE: f32 = 0.6;

/// Interpret focus-walk stops into `tab_order`-origin descriptors.
pub fn interpret(stops: &[RawElement]) -> Vec<FieldDescriptor> {
    stops
        .iter()
        .map(|raw| {
            let (kind, confidence) = dom::classify(raw);
            let locator = if raw.selector.is_empty() {
                FieldLocator::TabStop {
                    index: raw.tab_stop.unwrap_or_default(),
                }
            } else {
                FieldLocator::css(raw.selector.clone())
            };
            FieldDescriptor {
                locator,
                kind,
                origin: Origin::TabOrder,
                confidence: (confidence * TAB_CONFIDENCE_SCALE).clamp(0.0, 1.0),
                label: raw.label_text.clone(),
                required: raw.required,
                options: raw.options.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SemanticKind;

    #[test]
    fn stops_with_selectors_keep_css_locators() {
        let stop = RawElement {
            tag: "input".into(),
            input_type: "email".into(),
            selector: "#email".into(),
            tab_stop: Some(3),
            ..RawElement::default()
        };
        let fields = interpret(&[stop]);
        assert_eq!(fields[0].locator, FieldLocator::css("#email"));
        assert_eq!(fields[0].kind, SemanticKind::Email);
        assert_eq!(fields[0].origin, Origin::TabOrder);
    }

    #[test]
    fn selectorless_stops_fall_back_to_tab_index() {
        let stop = RawElement {
            tag: "input".into(),
            input_type: "text".into(),
            selector: String::new(),
            tab_stop: Some(7),
            ..RawElement::default()
        };
        let fields = interpret(&[stop]);
        assert_eq!(fields[0].locator, FieldLocator::TabStop { index: 7 });
    }

    #[test]
    fn confidence_is_scaled_down() {
        let stop = RawElement {
            tag: "input".into(),
            input_type: "email".into(),
            selector: "#email".into(),
            tab_stop: Some(0),
            ..RawElement::default()
        };
        let fields = interpret(&[stop]);
        assert!(fields[0].confidence < 0.6);
    }
}
