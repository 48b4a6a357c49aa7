//! Append-only audit records.
//!
//! # Responsibility
//! - Define the household history log and the person event log shapes.
//! - Encode non-primitive audit values as JSON text for storage.
//!
//! # Invariants
//! - Audit records are never updated or deleted by core operations.
//! - Stored values are plain text; JSON payloads must be decoded by readers.

use crate::model::household::HouseholdId;
use crate::model::person::PersonId;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type HistoryEventId = Uuid;
pub type PersonEventId = Uuid;

/// Semantic change recorded against a household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    HouseholdCreated,
    MemberAdded,
    MemberRemoved,
    MoveIn,
    MoveOut,
    Split,
    HeadChange,
    AddressChange,
    MemberPurged,
}

impl HistoryEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HouseholdCreated => "household_created",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::MoveIn => "move_in",
            Self::MoveOut => "move_out",
            Self::Split => "split",
            Self::HeadChange => "head_change",
            Self::AddressChange => "address_change",
            Self::MemberPurged => "member_purged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "household_created" => Some(Self::HouseholdCreated),
            "member_added" => Some(Self::MemberAdded),
            "member_removed" => Some(Self::MemberRemoved),
            "move_in" => Some(Self::MoveIn),
            "move_out" => Some(Self::MoveOut),
            "split" => Some(Self::Split),
            "head_change" => Some(Self::HeadChange),
            "address_change" => Some(Self::AddressChange),
            "member_purged" => Some(Self::MemberPurged),
            _ => None,
        }
    }
}

/// Old/new value of an audited field.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryValue {
    Null,
    Text(String),
    Json(serde_json::Value),
}

impl HistoryValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn id(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }

    pub fn optional_id(value: Option<Uuid>) -> Self {
        value.map_or(Self::Null, Self::id)
    }

    /// Captures a structured value; it is stored as compact JSON text.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Storage encoding.
    pub fn to_db(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(value) => Some(value.clone()),
            Self::Json(value) => Some(value.to_string()),
        }
    }
}

/// One immutable change record of a household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: HistoryEventId,
    pub household_id: HouseholdId,
    pub event_type: HistoryEventType,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Epoch milliseconds.
    pub changed_at: i64,
    pub changed_by: Option<String>,
    pub note: Option<String>,
}

impl HistoryEvent {
    /// Decodes a JSON-encoded old value.
    pub fn old_json<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.old_value.as_deref().map(serde_json::from_str)
    }

    /// Decodes a JSON-encoded new value.
    pub fn new_json<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.new_value.as_deref().map(serde_json::from_str)
    }
}

/// History row as requested by a caller; the logger stamps id, time and actor.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub household_id: HouseholdId,
    pub event_type: HistoryEventType,
    pub field_changed: Option<&'static str>,
    pub old_value: HistoryValue,
    pub new_value: HistoryValue,
    pub note: Option<String>,
}

impl HistoryEntry {
    pub fn new(household_id: HouseholdId, event_type: HistoryEventType) -> Self {
        Self {
            household_id,
            event_type,
            field_changed: None,
            old_value: HistoryValue::Null,
            new_value: HistoryValue::Null,
            note: None,
        }
    }

    pub fn field(mut self, field: &'static str) -> Self {
        self.field_changed = Some(field);
        self
    }

    pub fn change(mut self, old_value: HistoryValue, new_value: HistoryValue) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Lifecycle transition recorded from a person's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonEventType {
    Birth,
    Death,
    MoveIn,
    MoveOut,
    HeadChange,
    /// Not emitted by any operation yet.
    Marriage,
    /// Not emitted by any operation yet.
    Divorce,
    /// Profile edits and status corrections.
    Other,
}

impl PersonEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Birth => "birth",
            Self::Death => "death",
            Self::MoveIn => "move_in",
            Self::MoveOut => "move_out",
            Self::HeadChange => "head_change",
            Self::Marriage => "marriage",
            Self::Divorce => "divorce",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "birth" => Some(Self::Birth),
            "death" => Some(Self::Death),
            "move_in" => Some(Self::MoveIn),
            "move_out" => Some(Self::MoveOut),
            "head_change" => Some(Self::HeadChange),
            "marriage" => Some(Self::Marriage),
            "divorce" => Some(Self::Divorce),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// One immutable person event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEvent {
    pub id: PersonEventId,
    pub person_id: PersonId,
    pub event_type: PersonEventType,
    pub event_date: NaiveDate,
    pub old_household_id: Option<HouseholdId>,
    pub new_household_id: Option<HouseholdId>,
    pub created_by: Option<String>,
    pub note: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Person event as requested by a caller; the recorder stamps the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonEventEntry {
    pub person_id: PersonId,
    pub event_type: PersonEventType,
    pub event_date: NaiveDate,
    pub old_household_id: Option<HouseholdId>,
    pub new_household_id: Option<HouseholdId>,
    pub note: Option<String>,
}

impl PersonEventEntry {
    pub fn new(person_id: PersonId, event_type: PersonEventType, event_date: NaiveDate) -> Self {
        Self {
            person_id,
            event_type,
            event_date,
            old_household_id: None,
            new_household_id: None,
            note: None,
        }
    }

    pub fn households(
        mut self,
        old_household_id: Option<HouseholdId>,
        new_household_id: Option<HouseholdId>,
    ) -> Self {
        self.old_household_id = old_household_id;
        self.new_household_id = new_household_id;
        self
    }

    pub fn note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{HistoryEvent, HistoryEventType, HistoryValue};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Moved {
        members: Vec<String>,
    }

    #[test]
    fn json_values_are_stored_as_text_and_decoded_by_readers() {
        let payload = Moved {
            members: vec!["a".into(), "b".into()],
        };
        let value = HistoryValue::json(&payload).unwrap();
        let stored = value.to_db().unwrap();
        assert_eq!(stored, r#"{"members":["a","b"]}"#);

        let event = HistoryEvent {
            id: Uuid::new_v4(),
            household_id: Uuid::new_v4(),
            event_type: HistoryEventType::Split,
            field_changed: None,
            old_value: None,
            new_value: Some(stored),
            changed_at: 0,
            changed_by: None,
            note: None,
        };
        let decoded: Moved = event.new_json().unwrap().unwrap();
        assert_eq!(decoded, payload);
        assert!(event.old_json::<Moved>().is_none());
    }

    #[test]
    fn null_value_has_no_storage_text() {
        assert_eq!(HistoryValue::Null.to_db(), None);
        assert_eq!(HistoryValue::optional_id(None), HistoryValue::Null);
    }
}
