//! Daily reconciliation passes.
//!
//! # Responsibility
//! - Garbage-collect persons whose memberships have all expired.
//! - Revert lapsed temporary absences back to permanent residency.
//!
//! # Invariants
//! - Each pass is one transaction and is idempotent: a second run against
//!   the same `today` changes nothing.
//! - Passes take `today` explicitly; scheduling is left to the caller.
//! - A person stays `temporary_absent` while any active absence still
//!   covers `today`.

use crate::model::event::{
    HistoryEntry, HistoryEventType, HistoryValue, PersonEventEntry, PersonEventType,
};
use crate::model::household::HouseholdId;
use crate::model::person::{PersonId, ResidencyStatus};
use crate::model::Actor;
use crate::repo::history_repo::HistoryLog;
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::person_event_repo::PersonEventLog;
use crate::repo::person_repo::PersonRepository;
use crate::repo::temp_residence_repo::TempResidenceRepository;
use crate::service::error::LifecycleResult;
use crate::service::{in_transaction, RegistryStore};
use chrono::NaiveDate;
use log::{debug, error, info};
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Result of one expired-membership sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub purged_persons: Vec<PersonId>,
    /// Closed membership rows removed together with their persons.
    pub purged_memberships: usize,
}

/// Result of one temporary-absence reversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReversionReport {
    pub expired_records: usize,
    pub reverted_persons: Vec<PersonId>,
}

/// Outcome of both daily passes; each pass fails independently.
#[derive(Debug)]
pub struct DailyReport {
    pub sweep: LifecycleResult<SweepReport>,
    pub reversion: LifecycleResult<ReversionReport>,
}

impl DailyReport {
    pub fn is_ok(&self) -> bool {
        self.sweep.is_ok() && self.reversion.is_ok()
    }
}

pub struct ReconcileService<'conn> {
    conn: &'conn mut Connection,
    actor: Actor,
}

impl<'conn> ReconcileService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self {
            conn,
            actor: Actor::system(),
        }
    }

    /// Hard-deletes persons left with only memberships closed before `today`.
    pub fn sweep_expired_memberships(&mut self, today: NaiveDate) -> LifecycleResult<SweepReport> {
        let actor = self.actor.clone();
        in_transaction(self.conn, "reconcile_sweep_memberships", |store| {
            sweep_in(store, today, &actor)
        })
    }

    /// Expires lapsed absence records and restores permanent status.
    pub fn revert_expired_absences(
        &mut self,
        today: NaiveDate,
    ) -> LifecycleResult<ReversionReport> {
        let actor = self.actor.clone();
        in_transaction(self.conn, "reconcile_revert_absences", |store| {
            revert_in(store, today, &actor)
        })
    }

    /// Runs both passes, each in its own transaction.
    pub fn run_daily(&mut self, today: NaiveDate) -> DailyReport {
        let sweep = self.sweep_expired_memberships(today);
        if let Err(err) = &sweep {
            error!(
                "event=reconcile_daily module=reconcile status=error pass=sweep today={} error={}",
                today, err
            );
        }
        let reversion = self.revert_expired_absences(today);
        if let Err(err) = &reversion {
            error!(
                "event=reconcile_daily module=reconcile status=error pass=reversion today={} error={}",
                today, err
            );
        }
        DailyReport { sweep, reversion }
    }
}

fn sweep_in(
    store: &RegistryStore<'_>,
    today: NaiveDate,
    actor: &Actor,
) -> LifecycleResult<SweepReport> {
    let mut report = SweepReport::default();
    for person_id in store.memberships.list_persons_with_only_expired(today)? {
        let memberships = store.memberships.list_for_person(person_id)?;
        let households: BTreeSet<HouseholdId> =
            memberships.iter().map(|m| m.household_id).collect();

        store.persons.delete_person(person_id)?;
        for household_id in households {
            store.history.append(
                &HistoryEntry::new(household_id, HistoryEventType::MemberPurged)
                    .field("members")
                    .change(HistoryValue::id(person_id), HistoryValue::Null)
                    .note(format!("expired memberships purged on {today}")),
                actor,
            )?;
        }

        report.purged_memberships += memberships.len();
        report.purged_persons.push(person_id);
    }

    info!(
        "event=reconcile_sweep module=reconcile status=ok today={} purged_persons={} purged_memberships={}",
        today,
        report.purged_persons.len(),
        report.purged_memberships
    );
    Ok(report)
}

fn revert_in(
    store: &RegistryStore<'_>,
    today: NaiveDate,
    actor: &Actor,
) -> LifecycleResult<ReversionReport> {
    let mut report = ReversionReport::default();
    for record in store.temp_residences.list_lapsed_absences(today)? {
        if !store.temp_residences.mark_expired(record.id)? {
            continue;
        }
        report.expired_records += 1;

        let Some(person) = store.persons.get_person(record.person_id)? else {
            continue;
        };
        if person.residency_status != ResidencyStatus::TemporaryAbsent {
            continue;
        }
        if store
            .temp_residences
            .has_current_absence(person.id, today)?
        {
            debug!(
                "event=reconcile_reversion module=reconcile status=skipped person_id={} reason=overlapping_absence",
                person.id
            );
            continue;
        }
        store
            .persons
            .set_status(person.id, ResidencyStatus::Permanent)?;
        store.person_events.record(
            &PersonEventEntry::new(person.id, PersonEventType::Other, today)
                .households(record.household_id, record.household_id)
                .note(Some(format!(
                    "temporary absence ended {}; status reverted to permanent",
                    record.to_date
                ))),
            actor,
        )?;
        report.reverted_persons.push(person.id);
    }

    info!(
        "event=reconcile_reversion module=reconcile status=ok today={} expired_records={} reverted_persons={}",
        today,
        report.expired_records,
        report.reverted_persons.len()
    );
    Ok(report)
}
