//! Temporary residence/absence records.
//!
//! Kept apart from memberships: a temporary record describes presence at or
//! absence from a registered household for a bounded period.

use crate::model::household::HouseholdId;
use crate::model::person::{PersonId, ResidencyStatus};
use crate::model::validation::ModelValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TempResidenceId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempResidenceType {
    TemporaryResident,
    TemporaryAbsent,
}

impl TempResidenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemporaryResident => "temporary_resident",
            Self::TemporaryAbsent => "temporary_absent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "temporary_resident" => Some(Self::TemporaryResident),
            "temporary_absent" => Some(Self::TemporaryAbsent),
            _ => None,
        }
    }

    /// Residency status a person takes while the record is active.
    pub fn residency_status(self) -> ResidencyStatus {
        match self {
            Self::TemporaryResident => ResidencyStatus::TemporaryResident,
            Self::TemporaryAbsent => ResidencyStatus::TemporaryAbsent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempResidenceStatus {
    Active,
    Expired,
}

impl TempResidenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempResidence {
    pub id: TempResidenceId,
    pub person_id: PersonId,
    pub household_id: Option<HouseholdId>,
    #[serde(rename = "type")]
    pub residence_type: TempResidenceType,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub status: TempResidenceStatus,
    pub note: Option<String>,
}

impl TempResidence {
    /// Builds an active record, rejecting inverted ranges.
    pub fn active(
        person_id: PersonId,
        household_id: Option<HouseholdId>,
        residence_type: TempResidenceType,
        from_date: NaiveDate,
        to_date: NaiveDate,
        note: Option<String>,
    ) -> Result<Self, ModelValidationError> {
        if to_date < from_date {
            return Err(ModelValidationError::InvertedDateRange {
                field: "temp_residence",
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            person_id,
            household_id,
            residence_type,
            from_date,
            to_date,
            status: TempResidenceStatus::Active,
            note,
        })
    }
}
