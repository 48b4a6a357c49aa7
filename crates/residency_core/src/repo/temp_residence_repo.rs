//! Temporary residence repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Records only move from `active` to `expired`, never back.

use crate::model::person::PersonId;
use crate::model::temp_residence::{
    TempResidence, TempResidenceId, TempResidenceStatus, TempResidenceType,
};
use crate::repo::{parse_enum, parse_optional_uuid, parse_uuid, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

const TEMP_RESIDENCE_SELECT_SQL: &str = "SELECT
    id,
    person_id,
    household_id,
    residence_type,
    from_date,
    to_date,
    status,
    note
FROM temp_residences";

pub trait TempResidenceRepository {
    fn insert_temp_residence(&self, record: &TempResidence) -> RepoResult<()>;
    fn list_for_person(&self, person_id: PersonId) -> RepoResult<Vec<TempResidence>>;
    /// Active absence records whose period ended before `today`.
    fn list_lapsed_absences(&self, today: NaiveDate) -> RepoResult<Vec<TempResidence>>;
    /// Whether the person holds an active absence still running on `today`.
    fn has_current_absence(&self, person_id: PersonId, today: NaiveDate) -> RepoResult<bool>;
    /// Marks one record expired. Returns whether it was still active.
    fn mark_expired(&self, id: TempResidenceId) -> RepoResult<bool>;
    /// Expires every active record of a person. Returns the affected count.
    fn expire_active_for_person(&self, person_id: PersonId) -> RepoResult<usize>;
}

pub struct SqliteTempResidenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTempResidenceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TempResidenceRepository for SqliteTempResidenceRepository<'_> {
    fn insert_temp_residence(&self, record: &TempResidence) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO temp_residences (
                id,
                person_id,
                household_id,
                residence_type,
                from_date,
                to_date,
                status,
                note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                record.id.to_string(),
                record.person_id.to_string(),
                record.household_id.map(|id| id.to_string()),
                record.residence_type.as_str(),
                record.from_date,
                record.to_date,
                record.status.as_str(),
                record.note.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn list_for_person(&self, person_id: PersonId) -> RepoResult<Vec<TempResidence>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TEMP_RESIDENCE_SELECT_SQL}
             WHERE person_id = ?1
             ORDER BY from_date ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([person_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_temp_residence_row(row)?);
        }
        Ok(items)
    }

    fn list_lapsed_absences(&self, today: NaiveDate) -> RepoResult<Vec<TempResidence>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TEMP_RESIDENCE_SELECT_SQL}
             WHERE status = ?1
               AND residence_type = ?2
               AND to_date < ?3
             ORDER BY to_date ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![
            TempResidenceStatus::Active.as_str(),
            TempResidenceType::TemporaryAbsent.as_str(),
            today,
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_temp_residence_row(row)?);
        }
        Ok(items)
    }

    fn has_current_absence(&self, person_id: PersonId, today: NaiveDate) -> RepoResult<bool> {
        let found = self.conn.query_row(
            "SELECT EXISTS (
                SELECT 1
                FROM temp_residences
                WHERE person_id = ?1
                  AND status = ?2
                  AND residence_type = ?3
                  AND to_date >= ?4
            );",
            params![
                person_id.to_string(),
                TempResidenceStatus::Active.as_str(),
                TempResidenceType::TemporaryAbsent.as_str(),
                today,
            ],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(found == 1)
    }

    fn mark_expired(&self, id: TempResidenceId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE temp_residences
             SET status = ?2
             WHERE id = ?1
               AND status = ?3;",
            params![
                id.to_string(),
                TempResidenceStatus::Expired.as_str(),
                TempResidenceStatus::Active.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn expire_active_for_person(&self, person_id: PersonId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE temp_residences
             SET status = ?2
             WHERE person_id = ?1
               AND status = ?3;",
            params![
                person_id.to_string(),
                TempResidenceStatus::Expired.as_str(),
                TempResidenceStatus::Active.as_str(),
            ],
        )?;
        Ok(changed)
    }
}

fn parse_temp_residence_row(row: &Row<'_>) -> RepoResult<TempResidence> {
    let id_text: String = row.get("id")?;
    let person_text: String = row.get("person_id")?;
    let type_text: String = row.get("residence_type")?;
    let status_text: String = row.get("status")?;

    Ok(TempResidence {
        id: parse_uuid(&id_text, "temp_residences.id")?,
        person_id: parse_uuid(&person_text, "temp_residences.person_id")?,
        household_id: parse_optional_uuid(row.get("household_id")?, "temp_residences.household_id")?,
        residence_type: parse_enum(
            &type_text,
            "temp_residences.residence_type",
            TempResidenceType::parse,
        )?,
        from_date: row.get("from_date")?,
        to_date: row.get("to_date")?,
        status: parse_enum(
            &status_text,
            "temp_residences.status",
            TempResidenceStatus::parse,
        )?,
        note: row.get("note")?,
    })
}
