//! Person domain model.
//!
//! # Responsibility
//! - Define identity attributes and residency status of a registered person.
//! - Carry the membership parameters used when a person joins a household.
//!
//! # Invariants
//! - `residency_status` changes only through lifecycle or reconciliation
//!   operations, together with the matching membership change.
//! - `national_id`, when present, is unique across all persons.

use crate::model::membership::MembershipType;
use crate::model::validation::{
    normalize_national_id, normalize_optional_text, ModelValidationError,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PersonId = Uuid;

/// Relation label used for the active head membership.
pub const HEAD_RELATION: &str = "head";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Registered residency state of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidencyStatus {
    Permanent,
    TemporaryResident,
    TemporaryAbsent,
    MovedOut,
    Deceased,
}

impl ResidencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::TemporaryResident => "temporary_resident",
            Self::TemporaryAbsent => "temporary_absent",
            Self::MovedOut => "moved_out",
            Self::Deceased => "deceased",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "permanent" => Some(Self::Permanent),
            "temporary_resident" => Some(Self::TemporaryResident),
            "temporary_absent" => Some(Self::TemporaryAbsent),
            "moved_out" => Some(Self::MovedOut),
            "deceased" => Some(Self::Deceased),
            _ => None,
        }
    }

    /// Terminal states end all household participation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::MovedOut | Self::Deceased)
    }
}

/// Persisted person record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub national_id: Option<String>,
    pub national_id_issued_on: Option<NaiveDate>,
    pub national_id_issued_place: Option<String>,
    pub occupation: Option<String>,
    pub residency_status: ResidencyStatus,
}

/// Registration input for a person joining a household by birth or move-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub national_id: Option<String>,
    pub national_id_issued_on: Option<NaiveDate>,
    pub national_id_issued_place: Option<String>,
    pub occupation: Option<String>,
    /// Ignored when `is_head` is set; heads always carry [`HEAD_RELATION`].
    pub relation_to_head: String,
    pub is_head: bool,
    pub membership_type: MembershipType,
    /// Membership start; defaults to the operation date.
    pub start_date: Option<NaiveDate>,
    pub note: Option<String>,
}

impl NewPerson {
    pub fn new(full_name: impl Into<String>, gender: Gender) -> Self {
        Self {
            full_name: full_name.into(),
            date_of_birth: None,
            gender,
            national_id: None,
            national_id_issued_on: None,
            national_id_issued_place: None,
            occupation: None,
            relation_to_head: "family member".to_string(),
            is_head: false,
            membership_type: MembershipType::Permanent,
            start_date: None,
            note: None,
        }
    }

    /// Validates and normalizes the identity part into a person record.
    pub fn to_person(&self) -> Result<Person, ModelValidationError> {
        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            return Err(ModelValidationError::BlankFullName);
        }
        if let (Some(birth), Some(start)) = (self.date_of_birth, self.start_date) {
            if birth > start {
                return Err(ModelValidationError::BornAfterStart);
            }
        }

        Ok(Person {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            national_id: normalize_national_id(self.national_id.as_deref())?,
            national_id_issued_on: self.national_id_issued_on,
            national_id_issued_place: normalize_optional_text(
                self.national_id_issued_place.as_deref(),
            ),
            occupation: normalize_optional_text(self.occupation.as_deref()),
            residency_status: ResidencyStatus::Permanent,
        })
    }

    /// Relation label the membership row should carry.
    pub fn effective_relation(&self) -> String {
        if self.is_head {
            return HEAD_RELATION.to_string();
        }
        normalize_optional_text(Some(self.relation_to_head.as_str()))
            .unwrap_or_else(|| "family member".to_string())
    }
}

/// Partial profile edit. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonProfilePatch {
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub national_id: Option<String>,
    pub national_id_issued_on: Option<NaiveDate>,
    pub national_id_issued_place: Option<String>,
    pub occupation: Option<String>,
}

impl PersonProfilePatch {
    /// Applies the patch and returns the names of fields that changed.
    pub fn apply(&self, person: &mut Person) -> Result<Vec<&'static str>, ModelValidationError> {
        let mut changed = Vec::new();

        if let Some(full_name) = &self.full_name {
            let trimmed = full_name.trim();
            if trimmed.is_empty() {
                return Err(ModelValidationError::BlankFullName);
            }
            if trimmed != person.full_name {
                person.full_name = trimmed.to_string();
                changed.push("full_name");
            }
        }
        if let Some(date_of_birth) = self.date_of_birth {
            if person.date_of_birth != Some(date_of_birth) {
                person.date_of_birth = Some(date_of_birth);
                changed.push("date_of_birth");
            }
        }
        if let Some(gender) = self.gender {
            if person.gender != gender {
                person.gender = gender;
                changed.push("gender");
            }
        }
        if self.national_id.is_some() {
            let national_id = normalize_national_id(self.national_id.as_deref())?;
            if person.national_id != national_id {
                person.national_id = national_id;
                changed.push("national_id");
            }
        }
        if let Some(issued_on) = self.national_id_issued_on {
            if person.national_id_issued_on != Some(issued_on) {
                person.national_id_issued_on = Some(issued_on);
                changed.push("national_id_issued_on");
            }
        }
        if self.national_id_issued_place.is_some() {
            let place = normalize_optional_text(self.national_id_issued_place.as_deref());
            if person.national_id_issued_place != place {
                person.national_id_issued_place = place;
                changed.push("national_id_issued_place");
            }
        }
        if self.occupation.is_some() {
            let occupation = normalize_optional_text(self.occupation.as_deref());
            if person.occupation != occupation {
                person.occupation = occupation;
                changed.push("occupation");
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::{Gender, NewPerson, PersonProfilePatch, ResidencyStatus, HEAD_RELATION};
    use crate::model::validation::ModelValidationError;
    use chrono::NaiveDate;

    #[test]
    fn status_text_roundtrips_through_db_encoding() {
        for status in [
            ResidencyStatus::Permanent,
            ResidencyStatus::TemporaryResident,
            ResidencyStatus::TemporaryAbsent,
            ResidencyStatus::MovedOut,
            ResidencyStatus::Deceased,
        ] {
            assert_eq!(ResidencyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ResidencyStatus::parse("unknown"), None);
    }

    #[test]
    fn head_relation_overrides_requested_relation() {
        let mut input = NewPerson::new("Tran Van A", Gender::Male);
        input.relation_to_head = "son".to_string();
        input.is_head = true;
        assert_eq!(input.effective_relation(), HEAD_RELATION);
    }

    #[test]
    fn birth_after_start_is_rejected() {
        let mut input = NewPerson::new("Tran Van A", Gender::Male);
        input.date_of_birth = NaiveDate::from_ymd_opt(2024, 5, 2);
        input.start_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(
            input.to_person().unwrap_err(),
            ModelValidationError::BornAfterStart
        );
    }

    #[test]
    fn patch_reports_only_changed_fields() {
        let mut person = NewPerson::new("Le Thi B", Gender::Female)
            .to_person()
            .unwrap();
        let patch = PersonProfilePatch {
            full_name: Some("Le Thi B".to_string()),
            occupation: Some(" nurse ".to_string()),
            ..PersonProfilePatch::default()
        };
        let changed = patch.apply(&mut person).unwrap();
        assert_eq!(changed, vec!["occupation"]);
        assert_eq!(person.occupation.as_deref(), Some("nurse"));
    }
}
