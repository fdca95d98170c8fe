//! Pure merge over the three strategy result sets.
//!
//! There is deliberately no shared mutable detector state: each strategy
//! produces its descriptors independently and this function reconciles
//! them. Deterministic and idempotent — running it twice over the same
//! inputs yields an identical schema.
use crate::schema::{FieldDescriptor, FormSchema, Origin, SemanticKind};
use formpilot_driver::FieldLocator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A semantic disagreement between two strategies about one locator.
/// Recorded in the run log, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub locator: FieldLocator,
    pub kept: SemanticKind,
    pub kept_origin: Origin,
    pub discarded: SemanticKind,
    pub discarded_origin: Origin,
}

/// Merge strategy outputs, deduplicating by locator.
///
/// When two strategies describe the same locator with conflicting semantic
/// kinds the higher-confidence one wins; equal confidence falls back to
/// origin priority (dom > visual > tab-order). The `required` flag is OR'd:
/// any strategy seeing a required marker makes the field required.
pub fn merge(
    dom: Vec<FieldDescriptor>,
    visual: Vec<FieldDescriptor>,
    tab_order: Vec<FieldDescriptor>,
) -> (FormSchema, Vec<MergeConflict>) {
    let mut fields: Vec<FieldDescriptor> = Vec::new();
    let mut by_locator: HashMap<FieldLocator, usize> = HashMap::new();
    let mut conflicts = Vec::new();

    for incoming in dom.into_iter().chain(visual).chain(tab_order) {
        match by_locator.get(&incoming.locator) {
            None => {
                by_locator.insert(incoming.locator.clone(), fields.len());
                fields.push(incoming);
            }
            Some(&idx) => {
                let existing = &mut fields[idx];
                let required = existing.required || incoming.required;

                let incoming_wins = incoming.confidence > existing.confidence
                    || (incoming.confidence == existing.confidence
                        && incoming.origin.rank() < existing.origin.rank());

                if incoming.kind != existing.kind {
                    let (kept, discarded) = if incoming_wins {
                        (&incoming, &*existing)
                    } else {
                        (&*existing, &incoming)
                    };
                    conflicts.push(MergeConflict {
                        locator: incoming.locator.clone(),
                        kept: kept.kind,
                        kept_origin: kept.origin,
                        discarded: discarded.kind,
                        discarded_origin: discarded.origin,
                    });
                }

                if incoming_wins {
                    *existing = incoming;
                }
                existing.required = required;
            }
        }
    }

    (FormSchema { fields }, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(
        locator: &str,
        kind: SemanticKind,
        origin: Origin,
        confidence: f32,
    ) -> FieldDescriptor {
        FieldDescriptor {
            locator: FieldLocator::css(locator),
            kind,
            origin,
            confidence,
            label: String::new(),
            required: false,
            options: vec![],
        }
    }

    #[test]
    fn merge_preserves_order_and_dedups_by_locator() {
        let dom = vec![
            field("#a", SemanticKind::Email, Origin::Dom, 0.9),
            field("#b", SemanticKind::Phone, Origin::Dom, 0.9),
        ];
        let tab = vec![
            field("#b", SemanticKind::Phone, Origin::TabOrder, 0.4),
            field("#c", SemanticKind::Unknown, Origin::TabOrder, 0.3),
        ];
        let (schema, conflicts) = merge(dom, vec![], tab);

        assert_eq!(schema.len(), 3);
        assert!(schema.locators_unique());
        assert!(conflicts.is_empty());
        // tab-order only appended; #b kept its dom descriptor
        assert_eq!(schema.fields[1].origin, Origin::Dom);
        assert_eq!(schema.fields[2].locator, FieldLocator::css("#c"));
    }

    #[test]
    fn higher_confidence_wins_a_semantic_conflict_and_is_recorded() {
        let dom = vec![field("#x", SemanticKind::Unknown, Origin::Dom, 0.4)];
        let visual = vec![field("#x", SemanticKind::FileUpload, Origin::Visual, 0.55)];
        let (schema, conflicts) = merge(dom, visual, vec![]);

        assert_eq!(schema.len(), 1);
        assert_eq!(schema.fields[0].kind, SemanticKind::FileUpload);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kept, SemanticKind::FileUpload);
        assert_eq!(conflicts[0].discarded, SemanticKind::Unknown);
    }

    #[test]
    fn equal_confidence_breaks_toward_dom() {
        let dom = vec![field("#x", SemanticKind::Email, Origin::Dom, 0.5)];
        let visual = vec![field("#x", SemanticKind::Phone, Origin::Visual, 0.5)];
        let (schema, conflicts) = merge(dom, visual, vec![]);

        assert_eq!(schema.fields[0].kind, SemanticKind::Email);
        assert_eq!(schema.fields[0].origin, Origin::Dom);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn required_flag_is_sticky_across_strategies() {
        let mut required_visual = field("#x", SemanticKind::Email, Origin::Visual, 0.5);
        required_visual.required = true;
        let dom = vec![field("#x", SemanticKind::Email, Origin::Dom, 0.9)];
        let (schema, _) = merge(dom, vec![required_visual], vec![]);

        assert!(schema.fields[0].required);
        assert_eq!(schema.fields[0].origin, Origin::Dom);
    }

    #[test]
    fn merge_is_deterministic_and_idempotent() {
        let dom = vec![
            field("#a", SemanticKind::Email, Origin::Dom, 0.9),
            field("#b", SemanticKind::Unknown, Origin::Dom, 0.4),
        ];
        let visual = vec![field("#b", SemanticKind::FreeText, Origin::Visual, 0.55)];
        let tab = vec![field("#c", SemanticKind::Unknown, Origin::TabOrder, 0.3)];

        let (first, c1) = merge(dom.clone(), visual.clone(), tab.clone());
        let (second, c2) = merge(dom, visual, tab);

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&c1).unwrap(),
            serde_json::to_string(&c2).unwrap()
        );
    }

    #[test]
    fn duplicate_semantic_kinds_with_distinct_locators_are_both_kept() {
        let dom = vec![
            field("#email", SemanticKind::Email, Origin::Dom, 0.9),
            field("#confirm_email", SemanticKind::Email, Origin::Dom, 0.9),
        ];
        let (schema, conflicts) = merge(dom, vec![], vec![]);
        assert_eq!(schema.len(), 2);
        assert!(conflicts.is_empty());
    }
}
