//! Invariant assertions over the whole registry.
//!
//! Read-only. Detects divergence between the household head pointer and the
//! head memberships, plus membership states no lifecycle operation should
//! ever produce. Meant for periodic checks, not for request paths.

use crate::model::household::HouseholdId;
use crate::model::person::{PersonId, ResidencyStatus};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use log::{info, warn};
use rusqlite::{params_from_iter, Connection};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// More than one active membership of a household is flagged head.
    MultipleActiveHeads {
        household_id: HouseholdId,
        count: usize,
    },
    /// The head pointer names a person without an active head membership
    /// in the household.
    HeadPointerWithoutMembership {
        household_id: HouseholdId,
        person_id: PersonId,
    },
    /// An active head membership the household pointer does not reference.
    HeadMembershipNotReferenced {
        household_id: HouseholdId,
        person_id: PersonId,
    },
    /// A person holds more than one active membership.
    MultipleActiveMemberships { person_id: PersonId, count: usize },
    /// A deceased or moved-out person still holds an active membership.
    TerminalPersonStillMember {
        person_id: PersonId,
        household_id: HouseholdId,
    },
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleActiveHeads {
                household_id,
                count,
            } => write!(f, "household {household_id} has {count} active heads"),
            Self::HeadPointerWithoutMembership {
                household_id,
                person_id,
            } => write!(
                f,
                "household {household_id} points at head {person_id} without an active head membership"
            ),
            Self::HeadMembershipNotReferenced {
                household_id,
                person_id,
            } => write!(
                f,
                "household {household_id} has head membership of {person_id} but a different head pointer"
            ),
            Self::MultipleActiveMemberships { person_id, count } => {
                write!(f, "person {person_id} has {count} active memberships")
            }
            Self::TerminalPersonStillMember {
                person_id,
                household_id,
            } => write!(
                f,
                "person {person_id} is terminal but still active in household {household_id}"
            ),
        }
    }
}

/// Scans the registry and returns every invariant violation found.
pub fn check_invariants(conn: &Connection) -> RepoResult<Vec<InvariantViolation>> {
    let mut violations = Vec::new();

    for (household_id, count) in query_pairs(
        conn,
        "SELECT household_id, CAST(COUNT(*) AS TEXT)
         FROM memberships
         WHERE end_date IS NULL AND is_head = 1
         GROUP BY household_id
         HAVING COUNT(*) > 1
         ORDER BY household_id;",
        &[],
    )? {
        violations.push(InvariantViolation::MultipleActiveHeads {
            household_id: parse_uuid(&household_id, "memberships.household_id")?,
            count: parse_count(&count)?,
        });
    }

    for (household_id, person_id) in query_pairs(
        conn,
        "SELECT h.id, h.head_person_id
         FROM households h
         WHERE h.head_person_id IS NOT NULL
           AND NOT EXISTS (
             SELECT 1 FROM memberships m
             WHERE m.household_id = h.id
               AND m.person_id = h.head_person_id
               AND m.end_date IS NULL
               AND m.is_head = 1
           )
         ORDER BY h.id;",
        &[],
    )? {
        violations.push(InvariantViolation::HeadPointerWithoutMembership {
            household_id: parse_uuid(&household_id, "households.id")?,
            person_id: parse_uuid(&person_id, "households.head_person_id")?,
        });
    }

    for (household_id, person_id) in query_pairs(
        conn,
        "SELECT m.household_id, m.person_id
         FROM memberships m
         JOIN households h ON h.id = m.household_id
         WHERE m.end_date IS NULL
           AND m.is_head = 1
           AND (h.head_person_id IS NULL OR h.head_person_id <> m.person_id)
         ORDER BY m.household_id;",
        &[],
    )? {
        violations.push(InvariantViolation::HeadMembershipNotReferenced {
            household_id: parse_uuid(&household_id, "memberships.household_id")?,
            person_id: parse_uuid(&person_id, "memberships.person_id")?,
        });
    }

    for (person_id, count) in query_pairs(
        conn,
        "SELECT person_id, CAST(COUNT(*) AS TEXT)
         FROM memberships
         WHERE end_date IS NULL
         GROUP BY person_id
         HAVING COUNT(*) > 1
         ORDER BY person_id;",
        &[],
    )? {
        violations.push(InvariantViolation::MultipleActiveMemberships {
            person_id: parse_uuid(&person_id, "memberships.person_id")?,
            count: parse_count(&count)?,
        });
    }

    for (person_id, household_id) in query_pairs(
        conn,
        "SELECT p.id, m.household_id
         FROM persons p
         JOIN memberships m ON m.person_id = p.id
         WHERE m.end_date IS NULL
           AND p.residency_status IN (?1, ?2)
         ORDER BY p.id;",
        &[
            ResidencyStatus::Deceased.as_str(),
            ResidencyStatus::MovedOut.as_str(),
        ],
    )? {
        violations.push(InvariantViolation::TerminalPersonStillMember {
            person_id: parse_uuid(&person_id, "persons.id")?,
            household_id: parse_uuid(&household_id, "memberships.household_id")?,
        });
    }

    if violations.is_empty() {
        info!("event=invariant_check module=consistency status=ok violations=0");
    } else {
        for violation in &violations {
            warn!(
                "event=invariant_violation module=consistency status=error detail=\"{}\"",
                violation
            );
        }
    }
    Ok(violations)
}

fn query_pairs(conn: &Connection, sql: &str, args: &[&str]) -> RepoResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut pairs = Vec::new();
    while let Some(row) = rows.next()? {
        let first: String = row.get(0)?;
        let second: String = row.get(1)?;
        pairs.push((first, second));
    }
    Ok(pairs)
}

fn parse_count(value: &str) -> RepoResult<usize> {
    value
        .parse()
        .map_err(|_| RepoError::InvalidData(format!("invalid count `{value}`")))
}
