//! Person repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist identity attributes and residency status.
//! - Provide the hard delete used only by the garbage-collection pass.
//!
//! # Invariants
//! - `national_id` uniqueness is enforced by a partial unique index; a
//!   duplicate surfaces as `RepoError::UniqueViolation`.

use crate::model::person::{Gender, Person, PersonId, ResidencyStatus};
use crate::repo::{parse_enum, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PERSON_SELECT_SQL: &str = "SELECT
    id,
    full_name,
    date_of_birth,
    gender,
    national_id,
    national_id_issued_on,
    national_id_issued_place,
    occupation,
    residency_status
FROM persons";

/// Repository interface for person persistence.
pub trait PersonRepository {
    fn insert_person(&self, person: &Person) -> RepoResult<()>;
    fn get_person(&self, id: PersonId) -> RepoResult<Option<Person>>;
    fn find_by_national_id(&self, national_id: &str) -> RepoResult<Option<Person>>;
    /// Rewrites identity attributes; residency status is left untouched.
    fn update_profile(&self, person: &Person) -> RepoResult<()>;
    fn set_status(&self, id: PersonId, status: ResidencyStatus) -> RepoResult<()>;
    /// Physically removes the person; memberships and temporary records cascade.
    fn delete_person(&self, id: PersonId) -> RepoResult<()>;
}

/// SQLite-backed person repository.
pub struct SqlitePersonRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePersonRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PersonRepository for SqlitePersonRepository<'_> {
    fn insert_person(&self, person: &Person) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO persons (
                id,
                full_name,
                date_of_birth,
                gender,
                national_id,
                national_id_issued_on,
                national_id_issued_place,
                occupation,
                residency_status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                person.id.to_string(),
                person.full_name.as_str(),
                person.date_of_birth,
                person.gender.as_str(),
                person.national_id.as_deref(),
                person.national_id_issued_on,
                person.national_id_issued_place.as_deref(),
                person.occupation.as_deref(),
                person.residency_status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_person(&self, id: PersonId) -> RepoResult<Option<Person>> {
        self.conn
            .query_row(
                &format!("{PERSON_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_person_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_by_national_id(&self, national_id: &str) -> RepoResult<Option<Person>> {
        self.conn
            .query_row(
                &format!("{PERSON_SELECT_SQL} WHERE national_id = ?1;"),
                [national_id],
                |row| Ok(parse_person_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn update_profile(&self, person: &Person) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE persons
             SET full_name = ?2,
                 date_of_birth = ?3,
                 gender = ?4,
                 national_id = ?5,
                 national_id_issued_on = ?6,
                 national_id_issued_place = ?7,
                 occupation = ?8,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                person.id.to_string(),
                person.full_name.as_str(),
                person.date_of_birth,
                person.gender.as_str(),
                person.national_id.as_deref(),
                person.national_id_issued_on,
                person.national_id_issued_place.as_deref(),
                person.occupation.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "person",
                id: person.id,
            });
        }
        Ok(())
    }

    fn set_status(&self, id: PersonId, status: ResidencyStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE persons
             SET residency_status = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "person",
                id,
            });
        }
        Ok(())
    }

    fn delete_person(&self, id: PersonId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM persons WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "person",
                id,
            });
        }
        Ok(())
    }
}

fn parse_person_row(row: &Row<'_>) -> RepoResult<Person> {
    let id_text: String = row.get("id")?;
    let gender_text: String = row.get("gender")?;
    let status_text: String = row.get("residency_status")?;

    Ok(Person {
        id: parse_uuid(&id_text, "persons.id")?,
        full_name: row.get("full_name")?,
        date_of_birth: row.get("date_of_birth")?,
        gender: parse_enum(&gender_text, "persons.gender", Gender::parse)?,
        national_id: row.get("national_id")?,
        national_id_issued_on: row.get("national_id_issued_on")?,
        national_id_issued_place: row.get("national_id_issued_place")?,
        occupation: row.get("occupation")?,
        residency_status: parse_enum(
            &status_text,
            "persons.residency_status",
            ResidencyStatus::parse,
        )?,
    })
}
