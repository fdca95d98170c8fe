use formpilot_driver::FieldLocator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Inferred meaning of a detected form element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticKind {
    FirstName,
    LastName,
    FullName,
    Email,
    Phone,
    Location,
    Linkedin,
    Website,
    Salary,
    Availability,
    Summary,
    Date,
    FreeText,
    FileUpload,
    Select,
    Checkbox,
    Unknown,
}

impl SemanticKind {
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string())).ok()
    }
}

/// Which detection strategy produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Dom,
    Visual,
    TabOrder,
}

impl Origin {
    /// Priority used to break equal-confidence merge conflicts.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Origin::Dom => 0,
            Origin::Visual => 1,
            Origin::TabOrder => 2,
        }
    }
}

/// One detected, locatable form element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub locator: FieldLocator,
    pub kind: SemanticKind,
    pub origin: Origin,
    /// Detection confidence in [0,1].
    pub confidence: f32,
    /// Label text as seen on the page (may be empty).
    pub label: String,
    pub required: bool,
    /// Options, for select widgets.
    #[serde(default)]
    pub options: Vec<String>,
}

/// The full set of descriptors for one page load, in detection order.
///
/// Invariant: locators are unique. Two descriptors may carry the same
/// semantic kind (confirm-email) and are both retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormSchema {
    pub fields: Vec<FieldDescriptor>,
}

impl FormSchema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn uploads(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.kind == SemanticKind::FileUpload)
    }

    pub fn non_uploads(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.kind != SemanticKind::FileUpload)
    }

    pub fn find(&self, locator: &FieldLocator) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| &f.locator == locator)
    }

    /// Check the schema invariant. Merge guarantees it; tests assert it.
    pub fn locators_unique(&self) -> bool {
        let mut seen = HashSet::new();
        self.fields.iter().all(|f| seen.insert(&f.locator))
    }
}
