//! Membership repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the temporal person/household join.
//! - Answer the active-member and active-head queries the lifecycle engine
//!   uses as its source of truth.
//!
//! # Invariants
//! - Rows are closed, never reopened: `close_membership` only touches rows
//!   whose `end_date` is still null, and a trigger rejects any other update
//!   of `end_date`.
//! - At most one active row per person and one active head row per household
//!   (partial unique indexes).
//! - Active listings are deterministic: head first, then `start_date`, then
//!   insertion order.

use crate::model::household::HouseholdId;
use crate::model::membership::{Membership, MembershipId, MembershipType};
use crate::model::person::PersonId;
use crate::repo::{bool_to_int, parse_bool, parse_enum, parse_uuid, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

const MEMBERSHIP_SELECT_SQL: &str = "SELECT
    id,
    household_id,
    person_id,
    start_date,
    end_date,
    relation_to_head,
    is_head,
    membership_type
FROM memberships";

/// Repository interface for membership persistence.
pub trait MembershipRepository {
    fn insert_membership(&self, membership: &Membership) -> RepoResult<()>;
    fn get_active_for_person(&self, person_id: PersonId) -> RepoResult<Option<Membership>>;
    fn get_active_head(&self, household_id: HouseholdId) -> RepoResult<Option<Membership>>;
    fn list_active_for_household(&self, household_id: HouseholdId) -> RepoResult<Vec<Membership>>;
    fn count_active(&self, household_id: HouseholdId) -> RepoResult<usize>;
    /// Sets `end_date` on an active row. Closing twice is `NotFound`.
    fn close_membership(&self, id: MembershipId, end_date: NaiveDate) -> RepoResult<()>;
    /// Flips the head flag and relation label of an active row.
    fn set_head_flag(&self, id: MembershipId, is_head: bool, relation: &str) -> RepoResult<()>;
    /// Full history of a household, closed rows included.
    fn list_for_household(&self, household_id: HouseholdId) -> RepoResult<Vec<Membership>>;
    fn list_for_person(&self, person_id: PersonId) -> RepoResult<Vec<Membership>>;
    /// Persons whose every membership closed before `today`.
    fn list_persons_with_only_expired(&self, today: NaiveDate) -> RepoResult<Vec<PersonId>>;
}

/// SQLite-backed membership repository.
pub struct SqliteMembershipRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMembershipRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_list(&self, sql: &str, key: String) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_membership_row(row)?);
        }
        Ok(items)
    }

    fn query_one(&self, sql: &str, key: String) -> RepoResult<Option<Membership>> {
        self.conn
            .query_row(sql, [key], |row| Ok(parse_membership_row(row)))
            .optional()?
            .transpose()
    }
}

impl MembershipRepository for SqliteMembershipRepository<'_> {
    fn insert_membership(&self, membership: &Membership) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO memberships (
                id,
                household_id,
                person_id,
                start_date,
                end_date,
                relation_to_head,
                is_head,
                membership_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                membership.id.to_string(),
                membership.household_id.to_string(),
                membership.person_id.to_string(),
                membership.start_date,
                membership.end_date,
                membership.relation_to_head.as_str(),
                bool_to_int(membership.is_head),
                membership.membership_type.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_active_for_person(&self, person_id: PersonId) -> RepoResult<Option<Membership>> {
        self.query_one(
            &format!(
                "{MEMBERSHIP_SELECT_SQL}
                 WHERE person_id = ?1
                   AND end_date IS NULL;"
            ),
            person_id.to_string(),
        )
    }

    fn get_active_head(&self, household_id: HouseholdId) -> RepoResult<Option<Membership>> {
        self.query_one(
            &format!(
                "{MEMBERSHIP_SELECT_SQL}
                 WHERE household_id = ?1
                   AND end_date IS NULL
                   AND is_head = 1;"
            ),
            household_id.to_string(),
        )
    }

    fn list_active_for_household(&self, household_id: HouseholdId) -> RepoResult<Vec<Membership>> {
        self.query_list(
            &format!(
                "{MEMBERSHIP_SELECT_SQL}
                 WHERE household_id = ?1
                   AND end_date IS NULL
                 ORDER BY is_head DESC, start_date ASC, rowid ASC;"
            ),
            household_id.to_string(),
        )
    }

    fn count_active(&self, household_id: HouseholdId) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM memberships
             WHERE household_id = ?1
               AND end_date IS NULL;",
            [household_id.to_string()],
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative member count `{count}`")))
    }

    fn close_membership(&self, id: MembershipId, end_date: NaiveDate) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE memberships
             SET end_date = ?2
             WHERE id = ?1
               AND end_date IS NULL;",
            params![id.to_string(), end_date],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "active membership",
                id,
            });
        }
        Ok(())
    }

    fn set_head_flag(&self, id: MembershipId, is_head: bool, relation: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE memberships
             SET is_head = ?2,
                 relation_to_head = ?3
             WHERE id = ?1
               AND end_date IS NULL;",
            params![id.to_string(), bool_to_int(is_head), relation],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "active membership",
                id,
            });
        }
        Ok(())
    }

    fn list_for_household(&self, household_id: HouseholdId) -> RepoResult<Vec<Membership>> {
        self.query_list(
            &format!(
                "{MEMBERSHIP_SELECT_SQL}
                 WHERE household_id = ?1
                 ORDER BY start_date ASC, rowid ASC;"
            ),
            household_id.to_string(),
        )
    }

    fn list_for_person(&self, person_id: PersonId) -> RepoResult<Vec<Membership>> {
        self.query_list(
            &format!(
                "{MEMBERSHIP_SELECT_SQL}
                 WHERE person_id = ?1
                 ORDER BY start_date ASC, rowid ASC;"
            ),
            person_id.to_string(),
        )
    }

    fn list_persons_with_only_expired(&self, today: NaiveDate) -> RepoResult<Vec<PersonId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT expired.person_id
             FROM memberships expired
             WHERE expired.end_date IS NOT NULL
               AND expired.end_date < ?1
               AND NOT EXISTS (
                 SELECT 1
                 FROM memberships current
                 WHERE current.person_id = expired.person_id
                   AND (current.end_date IS NULL OR current.end_date >= ?1)
               )
             ORDER BY expired.person_id ASC;",
        )?;
        let mut rows = stmt.query([today])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "memberships.person_id")?);
        }
        Ok(ids)
    }
}

fn parse_membership_row(row: &Row<'_>) -> RepoResult<Membership> {
    let id_text: String = row.get("id")?;
    let household_text: String = row.get("household_id")?;
    let person_text: String = row.get("person_id")?;
    let type_text: String = row.get("membership_type")?;

    Ok(Membership {
        id: parse_uuid(&id_text, "memberships.id")?,
        household_id: parse_uuid(&household_text, "memberships.household_id")?,
        person_id: parse_uuid(&person_text, "memberships.person_id")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        relation_to_head: row.get("relation_to_head")?,
        is_head: parse_bool(row.get("is_head")?, "memberships.is_head")?,
        membership_type: parse_enum(
            &type_text,
            "memberships.membership_type",
            MembershipType::parse,
        )?,
    })
}
