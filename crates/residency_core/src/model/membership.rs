//! Membership domain model: the temporal join of person and household.

use crate::model::household::HouseholdId;
use crate::model::person::PersonId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MembershipId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipType {
    Permanent,
    Temporary,
}

impl MembershipType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "permanent" => Some(Self::Permanent),
            "temporary" => Some(Self::Temporary),
            _ => None,
        }
    }
}

/// Time-bounded association of a person with a household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub household_id: HouseholdId,
    pub person_id: PersonId,
    pub start_date: NaiveDate,
    /// `None` while the membership is active. Final once set.
    pub end_date: Option<NaiveDate>,
    pub relation_to_head: String,
    pub is_head: bool,
    #[serde(rename = "type")]
    pub membership_type: MembershipType,
}

impl Membership {
    /// Opens a new active membership.
    pub fn open(
        household_id: HouseholdId,
        person_id: PersonId,
        start_date: NaiveDate,
        relation_to_head: impl Into<String>,
        is_head: bool,
        membership_type: MembershipType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            household_id,
            person_id,
            start_date,
            end_date: None,
            relation_to_head: relation_to_head.into(),
            is_head,
            membership_type,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }
}
