use formpilot_common::{DocumentKind, PilotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Structured candidate data supplied by the caller.
///
/// Owned by the caller and read-only to the pipeline: one profile reference
/// is attached per Application Run and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub personal: PersonalInfo,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<LanguageProficiency>,
    #[serde(default)]
    pub salary_expectation: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    /// Logical document type → local file.
    #[serde(default)]
    pub documents: BTreeMap<DocumentKind, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub position: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProficiency {
    pub language: String,
    /// CEFR-ish level string: "native", "C1", "fluent", ...
    pub level: String,
}

/// The profile attributes a form field can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileAttribute {
    FirstName,
    LastName,
    FullName,
    Email,
    Phone,
    Location,
    Linkedin,
    Website,
    Summary,
    Skills,
    Languages,
    Education,
    Experience,
    Salary,
    Availability,
}

impl ProfileAttribute {
    pub const ALL: &'static [ProfileAttribute] = &[
        ProfileAttribute::FirstName,
        ProfileAttribute::LastName,
        ProfileAttribute::FullName,
        ProfileAttribute::Email,
        ProfileAttribute::Phone,
        ProfileAttribute::Location,
        ProfileAttribute::Linkedin,
        ProfileAttribute::Website,
        ProfileAttribute::Summary,
        ProfileAttribute::Skills,
        ProfileAttribute::Languages,
        ProfileAttribute::Education,
        ProfileAttribute::Experience,
        ProfileAttribute::Salary,
        ProfileAttribute::Availability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProfileAttribute::FirstName => "first_name",
            ProfileAttribute::LastName => "last_name",
            ProfileAttribute::FullName => "full_name",
            ProfileAttribute::Email => "email",
            ProfileAttribute::Phone => "phone",
            ProfileAttribute::Location => "location",
            ProfileAttribute::Linkedin => "linkedin",
            ProfileAttribute::Website => "website",
            ProfileAttribute::Summary => "summary",
            ProfileAttribute::Skills => "skills",
            ProfileAttribute::Languages => "languages",
            ProfileAttribute::Education => "education",
            ProfileAttribute::Experience => "experience",
            ProfileAttribute::Salary => "salary",
            ProfileAttribute::Availability => "availability",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == s.trim())
    }
}

impl CandidateProfile {
    /// Load a profile from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PilotError::Config(format!("cannot read profile {}: {e}", path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| PilotError::Config(format!("invalid profile {}: {e}", path.display())))
    }

    /// Attributes this profile can actually provide a value for.
    pub fn available_attributes(&self) -> Vec<ProfileAttribute> {
        ProfileAttribute::ALL
            .iter()
            .copied()
            .filter(|a| self.render(*a).is_some())
            .collect()
    }

    /// Render the attribute as the string a form field should receive.
    ///
    /// Pure: identical profile and attribute always produce identical text.
    pub fn render(&self, attribute: ProfileAttribute) -> Option<String> {
        match attribute {
            ProfileAttribute::FirstName => non_empty(&self.personal.first_name),
            ProfileAttribute::LastName => non_empty(&self.personal.last_name),
            ProfileAttribute::FullName => {
                let full = format!("{} {}", self.personal.first_name, self.personal.last_name);
                non_empty(full.trim())
            }
            ProfileAttribute::Email => non_empty(&self.personal.email),
            ProfileAttribute::Phone => non_empty(&self.personal.phone).map(|p| normalize_phone(&p)),
            ProfileAttribute::Location => self.personal.location.clone().filter(|s| !s.is_empty()),
            ProfileAttribute::Linkedin => self.personal.linkedin.clone().filter(|s| !s.is_empty()),
            ProfileAttribute::Website => self.personal.website.clone().filter(|s| !s.is_empty()),
            ProfileAttribute::Summary => self.summary.clone().filter(|s| !s.is_empty()),
            ProfileAttribute::Skills => {
                if self.skills.is_empty() {
                    None
                } else {
                    Some(self.skills.join(", "))
                }
            }
            ProfileAttribute::Languages => {
                if self.languages.is_empty() {
                    None
                } else {
                    Some(
                        self.languages
                            .iter()
                            .map(|l| format!("{} ({})", l.language, l.level))
                            .collect::<Vec<_>>()
                            .join(", "),
                    )
                }
            }
            ProfileAttribute::Education => {
                let latest = self.education.first()?;
                let mut line = format!("{}, {}", latest.degree, latest.institution);
                if let Some(year) = latest.graduation_year {
                    line.push_str(&format!(" ({year})"));
                }
                Some(line)
            }
            ProfileAttribute::Experience => {
                let latest = self.experience.first()?;
                let span = match (&latest.start, &latest.end) {
                    (Some(s), Some(e)) => format!(" ({s} - {e})"),
                    (Some(s), None) => format!(" (since {s})"),
                    _ => String::new(),
                };
                Some(format!("{} at {}{}", latest.position, latest.company, span))
            }
            ProfileAttribute::Salary => {
                self.salary_expectation.clone().filter(|s| !s.is_empty())
            }
            ProfileAttribute::Availability => {
                self.availability.clone().filter(|s| !s.is_empty())
            }
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}

/// Strip decoration people put into phone numbers; keep digits and a
/// leading `+`.
fn normalize_phone(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, ch) in raw.chars().enumerate() {
        if ch.is_ascii_digit() || (ch == '+' && i == 0) {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_profile() -> CandidateProfile {
        CandidateProfile {
            personal: PersonalInfo {
                first_name: "Ada".into(),
                last_name: "Krawczyk".into(),
                email: "ada.krawczyk@example.com".into(),
                phone: "+48 (600) 123-456".into(),
                location: Some("Warszawa".into()),
                linkedin: None,
                website: None,
            },
            summary: Some("Backend engineer".into()),
            education: vec![Education {
                institution: "Politechnika Warszawska".into(),
                degree: "MSc Computer Science".into(),
                field: None,
                graduation_year: Some(2019),
            }],
            experience: vec![Experience {
                company: "Acme GmbH".into(),
                position: "Rust Engineer".into(),
                start: Some("2021".into()),
                end: None,
                description: None,
            }],
            skills: vec!["Rust".into(), "PostgreSQL".into()],
            languages: vec![LanguageProficiency {
                language: "Polish".into(),
                level: "native".into(),
            }],
            salary_expectation: None,
            availability: Some("1 month notice".into()),
            documents: BTreeMap::new(),
        }
    }

    #[test]
    fn profile_loads_from_yaml() {
        let yaml = r#"
personal:
  first_name: Ada
  last_name: Krawczyk
  email: ada@example.com
  phone: "+48 600 123 456"
skills: [Rust]
documents:
  resume: /home/ada/docs/cv.pdf
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.yaml");
        std::fs::write(&path, yaml).unwrap();

        let profile = CandidateProfile::from_yaml_file(&path).unwrap();
        assert_eq!(profile.personal.first_name, "Ada");
        assert_eq!(
            profile.documents.get(&DocumentKind::Resume),
            Some(&PathBuf::from("/home/ada/docs/cv.pdf"))
        );
        assert!(profile.summary.is_none());
    }

    #[test]
    fn missing_profile_is_a_config_error() {
        let err = CandidateProfile::from_yaml_file(Path::new("/nope/profile.yaml")).unwrap_err();
        assert!(matches!(err, PilotError::Config(_)));
    }

    #[test]
    fn phone_rendering_is_normalized() {
        let profile = sample_profile();
        assert_eq!(
            profile.render(ProfileAttribute::Phone).as_deref(),
            Some("+48600123456")
        );
    }

    #[test]
    fn absent_attributes_render_none() {
        let profile = sample_profile();
        assert!(profile.render(ProfileAttribute::Linkedin).is_none());
        assert!(profile.render(ProfileAttribute::Salary).is_none());
    }

    #[test]
    fn available_attributes_reflect_the_profile() {
        let profile = sample_profile();
        let avail = profile.available_attributes();
        assert!(avail.contains(&ProfileAttribute::Email));
        assert!(avail.contains(&ProfileAttribute::Availability));
        assert!(!avail.contains(&ProfileAttribute::Website));
    }

    #[test]
    fn attribute_names_round_trip() {
        for attr in ProfileAttribute::ALL {
            assert_eq!(ProfileAttribute::parse(attr.name()), Some(*attr));
        }
        assert_eq!(ProfileAttribute::parse("not_an_attribute"), None);
    }

    #[test]
    fn experience_renders_latest_entry() {
        let profile = sample_profile();
        assert_eq!(
            profile.render(ProfileAttribute::Experience).as_deref(),
            Some("Rust Engineer at Acme GmbH (since 2021)")
        );
    }
}
