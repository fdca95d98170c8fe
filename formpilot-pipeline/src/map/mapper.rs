//! The mapping pass: deterministic lookups first, the model only for
//! leftovers.
//!
//! Steps (a) direct semantic-kind lookup and alias-table matching are pure;
//! given identical schema and profile they produce identical mappings.
//! Step (b), model-assisted disambiguation, may vary between invocations —
//! the external capability is not assumed idempotent, so callers needing
//! reproducibility must cache its results themselves.
use crate::map::{AliasTable, FieldMapping, MappingStrategy, MappingTarget};
use crate::profile::{CandidateProfile, ProfileAttribute};
use crate::schema::{FieldDescriptor, FormSchema, SemanticKind};
use formpilot_common::Result;
use formpilot_config::MappingConfig;
use formpilot_llm::traits::{extract_json_block, InferenceClient};
use serde::Deserialize;
use tracing::{debug, warn};

const ALIAS_CONFIDENCE_FLOOR: f32 = 0.75;
const MODEL_CONFIDENCE: f32 = 0.6;

const DISAMBIGUATION_SYSTEM_PROMPT: &str = "You match job-application form fields to candidate \
profile attributes. Respond with STRICT JSON ONLY, a single object: \
{\"attribute\": \"<name>\"} using exactly one of the offered names, or \
{\"attribute\": null} when none fits. No commentary, no code fences.";

#[derive(Debug, Deserialize)]
struct DisambiguationAnswer {
    attribute: Option<String>,
}

pub struct FieldMapper {
    aliases: AliasTable,
}

impl FieldMapper {
    pub fn new(cfg: &MappingConfig) -> Result<Self> {
        Ok(Self {
            aliases: AliasTable::with_overrides(&cfg.alias_overrides)?,
        })
    }

    /// Map every non-upload descriptor to a profile attribute, generated
    /// content tag, or unresolved. Upload fields belong to the document
    /// resolver.
    pub async fn map(
        &self,
        schema: &FormSchema,
        profile: &CandidateProfile,
        capability: Option<&dyn InferenceClient>,
    ) -> Vec<FieldMapping> {
        let available = profile.available_attributes();
        let mut mappings = Vec::new();

        for field in schema.non_uploads() {
            let mapping = self.map_field(field, &available, capability).await;
            mappings.push(mapping);
        }
        mappings
    }

    async fn map_field(
        &self,
        field: &FieldDescriptor,
        available: &[ProfileAttribute],
        capability: Option<&dyn InferenceClient>,
    ) -> FieldMapping {
        // (a) the semantic kind may already name the attribute
        if let Some(attribute) = attribute_for_kind(field.kind) {
            return FieldMapping {
                locator: field.locator.clone(),
                label: field.label.clone(),
                required: field.required,
                target: MappingTarget::Attribute(attribute),
                confidence: field.confidence,
                strategy: MappingStrategy::TypeInference,
            };
        }

        // (a) static alias table over the label text
        if let Some(attribute) = self.aliases.lookup(&field.label) {
            return FieldMapping {
                locator: field.locator.clone(),
                label: field.label.clone(),
                required: field.required,
                target: MappingTarget::Attribute(attribute),
                confidence: field.confidence.max(ALIAS_CONFIDENCE_FLOOR),
                strategy: MappingStrategy::Alias,
            };
        }

        // (b) model-assisted disambiguation for labeled fields we could not
        // place; the answer is accepted only if it names a known, available
        // attribute
        if !field.label.trim().is_empty() {
            if let Some(capability) = capability {
                match self.disambiguate(field, available, capability).await {
                    Some(attribute) => {
                        return FieldMapping {
                            locator: field.locator.clone(),
                            label: field.label.clone(),
                            required: field.required,
                            target: MappingTarget::Attribute(attribute),
                            confidence: MODEL_CONFIDENCE,
                            strategy: MappingStrategy::Model,
                        }
                    }
                    None => {
                        debug!(
                            target: "map.model",
                            label = %field.label,
                            "model offered no usable attribute"
                        );
                    }
                }
            }
        }

        // (c) free-text fields get tagged for generated content instead of
        // being silently left unfilled
        let target = if field.kind == SemanticKind::FreeText {
            MappingTarget::Generated
        } else {
            MappingTarget::Unresolved
        };

        FieldMapping {
            locator: field.locator.clone(),
            label: field.label.clone(),
            required: field.required,
            target,
            confidence: field.confidence,
            strategy: MappingStrategy::TypeInference,
        }
    }

    async fn disambiguate(
        &self,
        field: &FieldDescriptor,
        available: &[ProfileAttribute],
        capability: &dyn InferenceClient,
    ) -> Option<ProfileAttribute> {
        let choices = available
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ");
        let options = if field.options.is_empty() {
            String::new()
        } else {
            format!("\nField options: {}", field.options.join(" | "))
        };
        let prompt = format!(
            "Form field label: \"{}\"{}\nOffered attribute names: {}\nWhich attribute does this field ask for?",
            field.label, options, choices
        );

        let response = match capability
            .generate(&prompt, Some(DISAMBIGUATION_SYSTEM_PROMPT), Some(64), Some(0.0))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(target: "map.model", error = %e, "disambiguation unavailable");
                return None;
            }
        };

        let json = extract_json_block(&response.text)?;
        let answer: DisambiguationAnswer = serde_json::from_str(&json).ok()?;
        let attribute = ProfileAttribute::parse(&answer.attribute?)?;
        available.contains(&attribute).then_some(attribute)
    }
}

/// Direct semantic-kind → attribute association, when the detector already
/// named the meaning.
fn attribute_for_kind(kind: SemanticKind) -> Option<ProfileAttribute> {
    match kind {
        SemanticKind::FirstName => Some(ProfileAttribute::FirstName),
        SemanticKind::LastName => Some(ProfileAttribute::LastName),
        SemanticKind::FullName => Some(ProfileAttribute::FullName),
        SemanticKind::Email => Some(ProfileAttribute::Email),
        SemanticKind::Phone => Some(ProfileAttribute::Phone),
        SemanticKind::Location => Some(ProfileAttribute::Location),
        SemanticKind::Linkedin => Some(ProfileAttribute::Linkedin),
        SemanticKind::Website => Some(ProfileAttribute::Website),
        SemanticKind::Salary => Some(ProfileAttribute::Salary),
        SemanticKind::Availability => Some(ProfileAttribute::Availability),
        SemanticKind::Summary => Some(ProfileAttribute::Summary),
        SemanticKind::Date
        | SemanticKind::FreeText
        | SemanticKind::FileUpload
        | SemanticKind::Select
        | SemanticKind::Checkbox
        | SemanticKind::Unknown => None,
    }
}
