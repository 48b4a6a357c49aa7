//! Household audit/history log.
//!
//! # Responsibility
//! - Append one row per semantic household change.
//! - Read a household's history in recording order.
//!
//! # Invariants
//! - Append-only: no update or delete statement exists for this table.
//! - `append` runs on the caller's connection or transaction and never
//!   commits on its own, so a rolled-back operation leaves no audit row.

use crate::model::event::{HistoryEntry, HistoryEvent, HistoryEventType};
use crate::model::household::HouseholdId;
use crate::model::Actor;
use crate::repo::{now_epoch_ms, parse_enum, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Append-only log keyed by household.
pub trait HistoryLog {
    fn append(&self, entry: &HistoryEntry, actor: &Actor) -> RepoResult<HistoryEvent>;
    fn list_for_household(&self, household_id: HouseholdId) -> RepoResult<Vec<HistoryEvent>>;
}

/// SQLite-backed history log.
pub struct SqliteHistoryLog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHistoryLog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl HistoryLog for SqliteHistoryLog<'_> {
    fn append(&self, entry: &HistoryEntry, actor: &Actor) -> RepoResult<HistoryEvent> {
        let event = HistoryEvent {
            id: Uuid::new_v4(),
            household_id: entry.household_id,
            event_type: entry.event_type,
            field_changed: entry.field_changed.map(str::to_string),
            old_value: entry.old_value.to_db(),
            new_value: entry.new_value.to_db(),
            changed_at: now_epoch_ms(),
            changed_by: Some(actor.to_string()),
            note: entry.note.clone(),
        };

        self.conn.execute(
            "INSERT INTO household_history (
                id,
                household_id,
                event_type,
                field_changed,
                old_value,
                new_value,
                changed_at,
                changed_by,
                note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                event.id.to_string(),
                event.household_id.to_string(),
                event.event_type.as_str(),
                event.field_changed.as_deref(),
                event.old_value.as_deref(),
                event.new_value.as_deref(),
                event.changed_at,
                event.changed_by.as_deref(),
                event.note.as_deref(),
            ],
        )?;

        Ok(event)
    }

    fn list_for_household(&self, household_id: HouseholdId) -> RepoResult<Vec<HistoryEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                household_id,
                event_type,
                field_changed,
                old_value,
                new_value,
                changed_at,
                changed_by,
                note
             FROM household_history
             WHERE household_id = ?1
             ORDER BY changed_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([household_id.to_string()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_history_row(row)?);
        }
        Ok(events)
    }
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<HistoryEvent> {
    let id_text: String = row.get("id")?;
    let household_text: String = row.get("household_id")?;
    let type_text: String = row.get("event_type")?;

    Ok(HistoryEvent {
        id: parse_uuid(&id_text, "household_history.id")?,
        household_id: parse_uuid(&household_text, "household_history.household_id")?,
        event_type: parse_enum(
            &type_text,
            "household_history.event_type",
            HistoryEventType::parse,
        )?,
        field_changed: row.get("field_changed")?,
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
        changed_at: row.get("changed_at")?,
        changed_by: row.get("changed_by")?,
        note: row.get("note")?,
    })
}
