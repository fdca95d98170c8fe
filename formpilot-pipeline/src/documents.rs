//! Document resolution: match upload fields to locally available files.
//!
//! Heuristics run in order of reliability: attribute/filename tokens, then
//! nearby label text, then — when a capability is configured — a
//! classification of the widget's surrounding context. A field that cannot
//! be resolved to any available document is reported, never skipped
//! silently; whether a required unresolved upload aborts the run is the
//! state machine's call.
use crate::schema::FormSchema;
use formpilot_common::DocumentKind;
use formpilot_driver::FieldLocator;
use formpilot_llm::traits::{extract_json_block, InferenceClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify file-upload widgets on job application forms. \
Respond with STRICT JSON ONLY, a single object: {\"kind\": \"resume\" | \"cover_letter\" | \
\"certificate\" | \"photo\" | null}. No commentary.";

#[derive(Debug, Deserialize)]
struct ClassifyAnswer {
    kind: Option<DocumentKind>,
}

/// One upload field matched to a candidate document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedUpload {
    pub locator: FieldLocator,
    pub kind: DocumentKind,
    pub path: PathBuf,
    pub required: bool,
}

/// An upload field no available document could satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedUpload {
    pub locator: FieldLocator,
    pub label: String,
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentResolution {
    pub resolved: Vec<ResolvedUpload>,
    pub unresolved: Vec<UnresolvedUpload>,
}

/// Multilingual filename/label tokens per document kind. Order encodes
/// priority when a label mentions several.
const KIND_TOKENS: &[(DocumentKind, &[&str])] = &[
    (
        DocumentKind::Resume,
        &["resume", "cv", "curriculum", "lebenslauf", "życiorys", "zyciorys"],
    ),
    (
        DocumentKind::CoverLetter,
        &["cover", "motivation", "anschreiben", "motywacyjny"],
    ),
    (
        DocumentKind::Photo,
        &["photo", "foto", "picture", "headshot", "zdjęcie", "zdjecie"],
    ),
    (
        DocumentKind::Certificate,
        &["certificate", "certification", "diploma", "zeugnis", "certyfikat"],
    ),
];

fn classify_tokens(text: &str) -> Option<DocumentKind> {
    let lowered = text.to_lowercase();
    for (kind, tokens) in KIND_TOKENS {
        if tokens.iter().any(|t| lowered.contains(t)) {
            return Some(*kind);
        }
    }
    None
}

/// Match every upload descriptor in the schema against the profile's
/// documents.
pub async fn resolve(
    schema: &FormSchema,
    documents: &BTreeMap<DocumentKind, PathBuf>,
    capability: Option<&dyn InferenceClient>,
) -> DocumentResolution {
    let mut resolution = DocumentResolution::default();

    for field in schema.uploads() {
        // attribute text first (selector carries name/id), label second
        let attribute_text = field.locator.to_string();
        let kind = classify_tokens(&attribute_text)
            .or_else(|| classify_tokens(&field.label))
            .filter(|k| documents.contains_key(k));

        let kind = match (kind, capability) {
            (Some(k), _) => Some(k),
            (None, Some(capability)) => {
                classify_with_capability(field.label.as_str(), documents, capability).await
            }
            (None, None) => None,
        };

        match kind.and_then(|k| documents.get(&k).map(|p| (k, p.clone()))) {
            Some((kind, path)) => {
                debug!(
                    target: "documents",
                    locator = %field.locator,
                    kind = kind.as_str(),
                    "upload field resolved"
                );
                resolution.resolved.push(ResolvedUpload {
                    locator: field.locator.clone(),
                    kind,
                    path,
                    required: field.required,
                });
            }
            None => {
                warn!(
                    target: "documents",
                    locator = %field.locator,
                    label = %field.label,
                    "upload field has no matching document"
                );
                resolution.unresolved.push(UnresolvedUpload {
                    locator: field.locator.clone(),
                    label: field.label.clone(),
                    required: field.required,
                });
            }
        }
    }

    resolution
}

async fn classify_with_capability(
    label: &str,
    documents: &BTreeMap<DocumentKind, PathBuf>,
    capability: &dyn InferenceClient,
) -> Option<DocumentKind> {
    let offered = documents
        .keys()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let prompt = format!(
        "Upload widget context: \"{label}\"\nAvailable documents: {offered}\nWhich document does this widget expect?"
    );

    let response = match capability
        .generate(&prompt, Some(CLASSIFY_SYSTEM_PROMPT), Some(32), Some(0.0))
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!(target: "documents", error = %e, "upload classification unavailable");
            return None;
        }
    };

    let json = extract_json_block(&response.text)?;
    let answer: ClassifyAnswer = serde_json::from_str(&json).ok()?;
    answer.kind.filter(|k| documents.contains_key(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, Origin, SemanticKind};
    use formpilot_llm::scripted::ScriptedClient;

    fn upload(selector: &str, label: &str, required: bool) -> FieldDescriptor {
        FieldDescriptor {
            locator: FieldLocator::css(selector),
            kind: SemanticKind::FileUpload,
            origin: Origin::Dom,
            confidence: 0.95,
            label: label.into(),
            required,
            options: vec![],
        }
    }

    fn docs(kinds: &[DocumentKind]) -> BTreeMap<DocumentKind, PathBuf> {
        kinds
            .iter()
            .map(|k| (*k, PathBuf::from(format!("/tmp/{}.pdf", k.as_str()))))
            .collect()
    }

    #[tokio::test]
    async fn filename_tokens_beat_labels() {
        let schema = FormSchema {
            fields: vec![upload("input[name=\"lebenslauf\"]", "Attach document", true)],
        };
        let resolution = resolve(&schema, &docs(&[DocumentKind::Resume]), None).await;
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved[0].kind, DocumentKind::Resume);
    }

    #[tokio::test]
    async fn label_text_is_the_second_heuristic() {
        let schema = FormSchema {
            fields: vec![upload("#attachment-2", "Upload your cover letter", false)],
        };
        let resolution = resolve(
            &schema,
            &docs(&[DocumentKind::Resume, DocumentKind::CoverLetter]),
            None,
        )
        .await;
        assert_eq!(resolution.resolved[0].kind, DocumentKind::CoverLetter);
    }

    #[tokio::test]
    async fn unavailable_document_kind_is_reported_unresolved() {
        // The label says photo, but the candidate brought no photo.
        let schema = FormSchema {
            fields: vec![upload("#photo", "Upload a photo", true)],
        };
        let resolution = resolve(&schema, &docs(&[DocumentKind::Resume]), None).await;
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.unresolved.len(), 1);
        assert!(resolution.unresolved[0].required);
    }

    #[tokio::test]
    async fn capability_classifies_uninformative_widgets() {
        let schema = FormSchema {
            fields: vec![upload("#attachment", "Drop files here", false)],
        };
        let capability = ScriptedClient::new();
        capability.push_text_reply(r#"{"kind": "resume"}"#);

        let resolution = resolve(
            &schema,
            &docs(&[DocumentKind::Resume]),
            Some(&capability),
        )
        .await;
        assert_eq!(resolution.resolved[0].kind, DocumentKind::Resume);
    }

    #[tokio::test]
    async fn capability_failure_degrades_to_unresolved() {
        let schema = FormSchema {
            fields: vec![upload("#attachment", "Drop files here", false)],
        };
        let capability = ScriptedClient::new(); // empty queue → unavailable
        let resolution = resolve(
            &schema,
            &docs(&[DocumentKind::Resume]),
            Some(&capability),
        )
        .await;
        assert_eq!(resolution.unresolved.len(), 1);
    }
}
