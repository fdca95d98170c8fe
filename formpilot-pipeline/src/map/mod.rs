//! Field mapping: associate detected fields with candidate profile
//! attributes (or mark them unresolved / generated).
pub mod alias;
pub mod mapper;

pub use alias::AliasTable;
pub use mapper::FieldMapper;

use crate::profile::ProfileAttribute;
use formpilot_common::DocumentKind;
use formpilot_driver::FieldLocator;
use serde::{Deserialize, Serialize};

/// What a field resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "target", content = "value")]
pub enum MappingTarget {
    /// Fill from this profile attribute.
    Attribute(ProfileAttribute),
    /// Upload this document.
    Document(DocumentKind),
    /// Free-text field with no matching attribute: flagged for optional
    /// generated content, never silently left unfilled.
    Generated,
    /// No association could be made.
    Unresolved,
}

/// How the association was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    /// Semantic kind implied the attribute directly.
    TypeInference,
    /// Static alias table matched the label text.
    Alias,
    /// Model-assisted disambiguation.
    Model,
}

/// Association between one field descriptor and a mapping target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub locator: FieldLocator,
    pub label: String,
    pub required: bool,
    pub target: MappingTarget,
    /// Mapping confidence in [0,1]; below the acceptance threshold the
    /// field is never auto-filled.
    pub confidence: f32,
    pub strategy: MappingStrategy,
}

impl FieldMapping {
    pub fn is_resolved(&self) -> bool {
        !matches!(self.target, MappingTarget::Unresolved)
    }
}
