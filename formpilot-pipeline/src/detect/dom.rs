//! DOM detection strategy: interpret harvested elements into descriptors.
//!
//! This is the highest-confidence origin when labels are present. The
//! interpretation is a pure function so identical harvests always yield
//! identical descriptors.
use crate::schema::{FieldDescriptor, Origin, SemanticKind};
use formpilot_driver::{FieldLocator, RawElement};
use regex::Regex;
use std::sync::OnceLock;

/// Confidence tiers by evidence quality.
const CONF_TYPED_INPUT: f32 = 0.95;
const CONF_LABEL_MATCH: f32 = 0.9;
const CONF_WIDGET: f32 = 0.9;
const CONF_PLACEHOLDER_MATCH: f32 = 0.75;
const CONF_NAME_MATCH: f32 = 0.7;
const CONF_BARE: f32 = 0.4;

fn label_patterns() -> &'static Vec<(Regex, SemanticKind)> {
    static PATTERNS: OnceLock<Vec<(Regex, SemanticKind)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Order matters: specific kinds before generic ones. Covers the
        // en/de/pl vocabulary the original deployments targeted.
        let table: &[(&str, SemanticKind)] = &[
            (
                r"(?i)(first[\s_-]*name|given[\s_-]*name|\bfname\b|vorname|imi[eę])",
                SemanticKind::FirstName,
            ),
            (
                r"(?i)(last[\s_-]*name|family[\s_-]*name|surname|\blname\b|nachname|nazwisko)",
                SemanticKind::LastName,
            ),
            (
                r"(?i)(full[\s_-]*name|complete[\s_-]*name|^\s*name\s*\*?\s*$)",
                SemanticKind::FullName,
            ),
            (r"(?i)(e-?mail|mail[\s_-]*address)", SemanticKind::Email),
            (
                r"(?i)(phone|telephone|mobile|\bcell\b|telefon)",
                SemanticKind::Phone,
            ),
            (
                r"(?i)(address|location|\bcity\b|street|adresse|wohnort|miasto|\badres\b)",
                SemanticKind::Location,
            ),
            (r"(?i)linked[\s_-]*in", SemanticKind::Linkedin),
            (
                r"(?i)(website|portfolio|homepage|\burl\b)",
                SemanticKind::Website,
            ),
            (
                r"(?i)(salary|compensation|gehalt|wynagrodzenie)",
                SemanticKind::Salary,
            ),
            (
                r"(?i)(availability|start[\s_-]*date|notice[\s_-]*period|eintrittsdatum|dost[eę]pno[sś][cć])",
                SemanticKind::Availability,
            ),
            (
                r"(?i)(summary|objective|about[\s_-]*(you|me)|profil)",
                SemanticKind::Summary,
            ),
        ];
        table
            .iter()
            .map(|(pat, kind)| (Regex::new(pat).expect("builtin pattern compiles"), *kind))
            .collect()
    })
}

fn classify_text(text: &str) -> Option<SemanticKind> {
    if text.trim().is_empty() {
        return None;
    }
    label_patterns()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, kind)| *kind)
}

/// Classify one harvested element; the semantics/confidence part of the
/// strategy, shared with the tab-order interpreter.
pub(crate) fn classify(raw: &RawElement) -> (SemanticKind, f32) {
    // Explicit input types are the strongest evidence the page offers.
    match raw.input_type.as_str() {
        "email" => return (SemanticKind::Email, CONF_TYPED_INPUT),
        "tel" => return (SemanticKind::Phone, CONF_TYPED_INPUT),
        "file" => return (SemanticKind::FileUpload, CONF_TYPED_INPUT),
        "url" => return (SemanticKind::Website, CONF_WIDGET),
        "date" => return (SemanticKind::Date, CONF_WIDGET),
        "checkbox" | "radio" => return (SemanticKind::Checkbox, CONF_WIDGET),
        _ => {}
    }

    let label = format!("{} {}", raw.label_text, raw.aria_label);
    if let Some(kind) = classify_text(&label) {
        return (kind, CONF_LABEL_MATCH);
    }
    if let Some(kind) = classify_text(&raw.placeholder) {
        return (kind, CONF_PLACEHOLDER_MATCH);
    }
    if let Some(kind) = classify_text(&format!("{} {}", raw.name, raw.id)) {
        return (kind, CONF_NAME_MATCH);
    }

    match raw.tag.as_str() {
        "select" => (SemanticKind::Select, CONF_WIDGET),
        "textarea" => (SemanticKind::FreeText, CONF_PLACEHOLDER_MATCH),
        _ => (SemanticKind::Unknown, CONF_BARE),
    }
}

/// Interpret a DOM harvest into `dom`-origin descriptors.
pub fn interpret(elements: &[RawElement]) -> Vec<FieldDescriptor> {
    elements
        .iter()
        .map(|raw| {
            let (kind, confidence) = classify(raw);
            FieldDescriptor {
                locator: FieldLocator::css(raw.selector.clone()),
                kind,
                origin: Origin::Dom,
                confidence,
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

    fn raw(selector: &str, input_type: &str, label: &str) -> RawElement {
        RawElement {
            tag: "input".into(),
            input_type: input_type.into(),
            label_text: label.into(),
            selector: selector.into(),
            ..RawElement::default()
        }
    }

    #[test]
    fn typed_inputs_beat_labels() {
        let el = raw("#contact", "email", "How can we reach you?");
        let (kind, conf) = classify(&el);
        assert_eq!(kind, SemanticKind::Email);
        assert!(conf >= CONF_TYPED_INPUT);
    }

    #[test]
    fn labels_classify_standard_fields() {
        let cases = [
            ("First name", SemanticKind::FirstName),
            ("Vorname", SemanticKind::FirstName),
            ("Nazwisko", SemanticKind::LastName),
            ("E-Mail address", SemanticKind::Email),
            ("Telefon", SemanticKind::Phone),
            ("LinkedIn profile", SemanticKind::Linkedin),
            ("Expected salary", SemanticKind::Salary),
            ("Earliest start date", SemanticKind::Availability),
        ];
        for (label, expected) in cases {
            let (kind, conf) = classify(&raw("#x", "text", label));
            assert_eq!(kind, expected, "label {label:?}");
            assert!((conf - CONF_LABEL_MATCH).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn placeholder_is_weaker_evidence_than_label() {
        let mut el = raw("#x", "text", "");
        el.placeholder = "your e-mail".into();
        let (kind, conf) = classify(&el);
        assert_eq!(kind, SemanticKind::Email);
        assert!(conf < CONF_LABEL_MATCH);
    }

    #[test]
    fn unlabeled_text_input_is_unknown_low_confidence() {
        let (kind, conf) = classify(&raw("#x", "text", ""));
        assert_eq!(kind, SemanticKind::Unknown);
        assert!(conf < 0.5);
    }

    #[test]
    fn interpretation_is_deterministic() {
        let elements = vec![raw("#a", "text", "First name"), raw("#b", "email", "")];
        let first = interpret(&elements);
        let second = interpret(&elements);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn first_name_is_not_swallowed_by_full_name() {
        let (kind, _) = classify(&raw("#x", "text", "First Name *"));
        assert_eq!(kind, SemanticKind::FirstName);
    }
}
