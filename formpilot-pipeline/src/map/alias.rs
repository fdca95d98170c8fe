//! Static alias table: label text → profile attribute.
//!
//! First matching rule wins, so re-running a lookup over the same input is
//! byte-identical. Built-ins cover the English/German/Polish vocabulary the
//! original deployments saw; configuration may append further rules.
use crate::profile::ProfileAttribute;
use formpilot_common::{PilotError, Result};
use formpilot_config::AliasOverride;
use regex::Regex;

pub struct AliasTable {
    rules: Vec<(Regex, ProfileAttribute)>,
}

impl AliasTable {
    /// The built-in multilingual rules.
    pub fn builtin() -> Self {
        let table: &[(&str, ProfileAttribute)] = &[
            (
                r"(?i)(first[\s_-]*name|given[\s_-]*name|\bfname\b|vorname|imi[eę])",
                ProfileAttribute::FirstName,
            ),
            (
                r"(?i)(last[\s_-]*name|family[\s_-]*name|surname|\blname\b|nachname|nazwisko)",
                ProfileAttribute::LastName,
            ),
            (
                r"(?i)(full[\s_-]*name|complete[\s_-]*name|^\s*name\s*\*?\s*$)",
                ProfileAttribute::FullName,
            ),
            (
                r"(?i)(e-?mail|mail[\s_-]*address)",
                ProfileAttribute::Email,
            ),
            (
                r"(?i)(phone|telephone|mobile|\bcell\b|telefon)",
                ProfileAttribute::Phone,
            ),
            (
                r"(?i)(address|location|\bcity\b|street|adresse|wohnort|miasto|\badres\b)",
                ProfileAttribute::Location,
            ),
            (r"(?i)linked[\s_-]*in", ProfileAttribute::Linkedin),
            (
                r"(?i)(website|portfolio|homepage|\burl\b)",
                ProfileAttribute::Website,
            ),
            (
                r"(?i)(summary|objective|about[\s_-]*(you|me)|profil)",
                ProfileAttribute::Summary,
            ),
            (
                r"(?i)(skills|competencies|abilities|kenntnisse|umiej[eę]tno[sś]ci)",
                ProfileAttribute::Skills,
            ),
            (
                r"(?i)(languages?|sprachen|j[eę]zyki)",
                ProfileAttribute::Languages,
            ),
            (
                r"(?i)(education|degree|university|school|ausbildung|studium|wykszta[lł]cenie)",
                ProfileAttribute::Education,
            ),
            (
                r"(?i)(experience|work[\s_-]*history|berufserfahrung|do[sś]wiadczenie)",
                ProfileAttribute::Experience,
            ),
            (
                r"(?i)(salary|compensation|gehalt|wynagrodzenie)",
                ProfileAttribute::Salary,
            ),
            (
                r"(?i)(availability|start[\s_-]*date|notice[\s_-]*period|eintrittsdatum|dost[eę]pno[sś][cć])",
                ProfileAttribute::Availability,
            ),
        ];
        let rules = table
            .iter()
            .map(|(pat, attr)| (Regex::new(pat).expect("builtin alias compiles"), *attr))
            .collect();
        Self { rules }
    }

    /// Built-ins plus configured overrides, appended in order.
    pub fn with_overrides(overrides: &[AliasOverride]) -> Result<Self> {
        let mut me = Self::builtin();
        for over in overrides {
            let attr = ProfileAttribute::parse(&over.attribute).ok_or_else(|| {
                PilotError::Config(format!("unknown alias attribute: {}", over.attribute))
            })?;
            let re = Regex::new(&over.pattern).map_err(|e| {
                PilotError::Config(format!("invalid alias pattern {:?}: {e}", over.pattern))
            })?;
            me.rules.push((re, attr));
        }
        Ok(me)
    }

    /// First matching rule wins; `None` when nothing matches.
    pub fn lookup(&self, text: &str) -> Option<ProfileAttribute> {
        if text.trim().is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, attr)| *attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multilingual_labels_resolve() {
        let table = AliasTable::builtin();
        assert_eq!(table.lookup("E-mail"), Some(ProfileAttribute::Email));
        assert_eq!(table.lookup("Mail address"), Some(ProfileAttribute::Email));
        assert_eq!(table.lookup("Vorname"), Some(ProfileAttribute::FirstName));
        assert_eq!(table.lookup("Nazwisko"), Some(ProfileAttribute::LastName));
        assert_eq!(table.lookup("Berufserfahrung"), Some(ProfileAttribute::Experience));
        assert_eq!(table.lookup("Expected salary (EUR)"), Some(ProfileAttribute::Salary));
        assert_eq!(table.lookup("Why do you want this job?"), None);
    }

    #[test]
    fn first_rule_wins_keeps_lookups_stable() {
        let table = AliasTable::builtin();
        // "First name" also contains "name"; the specific rule is earlier.
        assert_eq!(table.lookup("First name *"), Some(ProfileAttribute::FirstName));
        assert_eq!(table.lookup("Name"), Some(ProfileAttribute::FullName));
    }

    #[test]
    fn overrides_extend_the_builtin_rules() {
        let over = vec![AliasOverride {
            pattern: "(?i)handle".into(),
            attribute: "website".into(),
        }];
        let table = AliasTable::with_overrides(&over).unwrap();
        assert_eq!(table.lookup("GitHub handle"), Some(ProfileAttribute::Website));
    }

    #[test]
    fn bad_override_attribute_is_a_config_error() {
        let over = vec![AliasOverride {
            pattern: "x".into(),
            attribute: "shoe_size".into(),
        }];
        assert!(AliasTable::with_overrides(&over).is_err());
    }

    #[test]
    fn bad_override_pattern_is_a_config_error() {
        let over = vec![AliasOverride {
            pattern: "(".into(),
            attribute: "email".into(),
        }];
        assert!(AliasTable::with_overrides(&over).is_err());
    }
}
