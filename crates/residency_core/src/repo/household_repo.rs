//! Household repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist household records and their denormalized head pointer.
//! - Maintain the optimistic `version` counter on every mutation.
//!
//! # Invariants
//! - Households are never deleted through this repository.
//! - Every write bumps `version` and `updated_at`.

use crate::model::household::{Household, HouseholdId};
use crate::model::person::PersonId;
use crate::repo::{parse_optional_uuid, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const HOUSEHOLD_SELECT_SQL: &str = "SELECT
    id,
    code,
    address,
    head_person_id,
    household_type,
    note,
    version
FROM households";

/// Repository interface for household persistence.
pub trait HouseholdRepository {
    fn insert_household(&self, household: &Household) -> RepoResult<()>;
    fn get_household(&self, id: HouseholdId) -> RepoResult<Option<Household>>;
    fn get_household_by_code(&self, code: &str) -> RepoResult<Option<Household>>;
    fn list_households(&self) -> RepoResult<Vec<Household>>;
    /// Points the household at a new head (or none).
    fn set_head(&self, id: HouseholdId, head_person_id: Option<PersonId>) -> RepoResult<()>;
    fn update_address(&self, id: HouseholdId, address: &str) -> RepoResult<()>;
    /// Records a membership composition change without touching columns.
    fn bump_version(&self, id: HouseholdId) -> RepoResult<()>;
}

/// SQLite-backed household repository.
pub struct SqliteHouseholdRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHouseholdRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn require_changed(&self, changed: usize, id: HouseholdId) -> RepoResult<()> {
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "household",
                id,
            });
        }
        Ok(())
    }
}

impl HouseholdRepository for SqliteHouseholdRepository<'_> {
    fn insert_household(&self, household: &Household) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO households (
                id,
                code,
                address,
                head_person_id,
                household_type,
                note,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                household.id.to_string(),
                household.code.as_str(),
                household.address.as_str(),
                household.head_person_id.map(|id| id.to_string()),
                household.household_type.as_str(),
                household.note.as_deref(),
                household.version,
            ],
        )?;
        Ok(())
    }

    fn get_household(&self, id: HouseholdId) -> RepoResult<Option<Household>> {
        self.conn
            .query_row(
                &format!("{HOUSEHOLD_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_household_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn get_household_by_code(&self, code: &str) -> RepoResult<Option<Household>> {
        self.conn
            .query_row(
                &format!("{HOUSEHOLD_SELECT_SQL} WHERE code = ?1;"),
                [code],
                |row| Ok(parse_household_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_households(&self) -> RepoResult<Vec<Household>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{HOUSEHOLD_SELECT_SQL} ORDER BY code ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut households = Vec::new();
        while let Some(row) = rows.next()? {
            households.push(parse_household_row(row)?);
        }
        Ok(households)
    }

    fn set_head(&self, id: HouseholdId, head_person_id: Option<PersonId>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE households
             SET head_person_id = ?2,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), head_person_id.map(|value| value.to_string())],
        )?;
        self.require_changed(changed, id)
    }

    fn update_address(&self, id: HouseholdId, address: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE households
             SET address = ?2,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), address],
        )?;
        self.require_changed(changed, id)
    }

    fn bump_version(&self, id: HouseholdId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE households
             SET version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id.to_string()],
        )?;
        self.require_changed(changed, id)
    }
}

fn parse_household_row(row: &Row<'_>) -> RepoResult<Household> {
    let id_text: String = row.get("id")?;
    Ok(Household {
        id: parse_uuid(&id_text, "households.id")?,
        code: row.get("code")?,
        address: row.get("address")?,
        head_person_id: parse_optional_uuid(row.get("head_person_id")?, "households.head_person_id")?,
        household_type: row.get("household_type")?,
        note: row.get("note")?,
        version: row.get("version")?,
    })
}
