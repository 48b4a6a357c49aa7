//! Person event recorder: append-only log keyed by person.
//!
//! Rows are not bound to `persons` by a foreign key, so the log outlives the
//! person row removed by the expired-membership sweep.

use crate::model::event::{PersonEvent, PersonEventEntry, PersonEventType};
use crate::model::person::PersonId;
use crate::model::Actor;
use crate::repo::{now_epoch_ms, parse_enum, parse_optional_uuid, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

pub trait PersonEventLog {
    fn record(&self, entry: &PersonEventEntry, actor: &Actor) -> RepoResult<PersonEvent>;
    fn list_for_person(&self, person_id: PersonId) -> RepoResult<Vec<PersonEvent>>;
}

pub struct SqlitePersonEventLog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePersonEventLog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PersonEventLog for SqlitePersonEventLog<'_> {
    fn record(&self, entry: &PersonEventEntry, actor: &Actor) -> RepoResult<PersonEvent> {
        let event = PersonEvent {
            id: Uuid::new_v4(),
            person_id: entry.person_id,
            event_type: entry.event_type,
            event_date: entry.event_date,
            old_household_id: entry.old_household_id,
            new_household_id: entry.new_household_id,
            created_by: Some(actor.to_string()),
            note: entry.note.clone(),
            created_at: now_epoch_ms(),
        };

        self.conn.execute(
            "INSERT INTO person_events (
                id,
                person_id,
                event_type,
                event_date,
                old_household_id,
                new_household_id,
                created_by,
                note,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                event.id.to_string(),
                event.person_id.to_string(),
                event.event_type.as_str(),
                event.event_date,
                event.old_household_id.map(|id| id.to_string()),
                event.new_household_id.map(|id| id.to_string()),
                event.created_by.as_deref(),
                event.note.as_deref(),
                event.created_at,
            ],
        )?;

        Ok(event)
    }

    fn list_for_person(&self, person_id: PersonId) -> RepoResult<Vec<PersonEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                person_id,
                event_type,
                event_date,
                old_household_id,
                new_household_id,
                created_by,
                note,
                created_at
             FROM person_events
             WHERE person_id = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([person_id.to_string()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_person_event_row(row)?);
        }
        Ok(events)
    }
}

fn parse_person_event_row(row: &Row<'_>) -> RepoResult<PersonEvent> {
    let id_text: String = row.get("id")?;
    let person_text: String = row.get("person_id")?;
    let type_text: String = row.get("event_type")?;

    Ok(PersonEvent {
        id: parse_uuid(&id_text, "person_events.id")?,
        person_id: parse_uuid(&person_text, "person_events.person_id")?,
        event_type: parse_enum(&type_text, "person_events.event_type", PersonEventType::parse)?,
        event_date: row.get("event_date")?,
        old_household_id: parse_optional_uuid(
            row.get("old_household_id")?,
            "person_events.old_household_id",
        )?,
        new_household_id: parse_optional_uuid(
            row.get("new_household_id")?,
            "person_events.new_household_id",
        )?,
        created_by: row.get("created_by")?,
        note: row.get("note")?,
        created_at: row.get("created_at")?,
    })
}
