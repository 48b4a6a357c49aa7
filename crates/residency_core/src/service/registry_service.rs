//! Registry maintenance outside the membership lifecycle.
//!
//! # Responsibility
//! - Edit person profiles and household addresses with audit rows.
//! - Register temporary residence and absence records.
//! - Serve read views over households, persons and both audit logs.
//!
//! # Invariants
//! - Each profile edit writes exactly one `other` person event.
//! - Residency status moves into a temporary state only together with an
//!   active temporary record.

use crate::model::event::{
    HistoryEntry, HistoryEvent, HistoryEventType, HistoryValue, PersonEvent, PersonEventEntry,
    PersonEventType,
};
use crate::model::household::{Household, HouseholdId};
use crate::model::membership::Membership;
use crate::model::person::{Person, PersonId, PersonProfilePatch};
use crate::model::temp_residence::{TempResidence, TempResidenceType};
use crate::model::validation::normalize_optional_text;
use crate::model::Actor;
use crate::repo::history_repo::HistoryLog;
use crate::repo::household_repo::HouseholdRepository;
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::person_event_repo::PersonEventLog;
use crate::repo::person_repo::PersonRepository;
use crate::repo::temp_residence_repo::TempResidenceRepository;
use crate::service::error::{LifecycleError, LifecycleResult};
use crate::service::{in_transaction, today, RegistryStore};
use chrono::NaiveDate;
use rusqlite::Connection;

/// Household with its currently active members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseholdView {
    pub household: Household,
    /// Head first, then by membership start.
    pub members: Vec<(Person, Membership)>,
}

/// Request to register a temporary residence or absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTempResidence {
    pub person_id: PersonId,
    /// Required for residents; defaults to the active membership's household
    /// for absences.
    pub household_id: Option<HouseholdId>,
    pub residence_type: TempResidenceType,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub note: Option<String>,
}

pub struct RegistryService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> RegistryService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Applies a partial profile edit. Returns the stored person.
    pub fn update_person_profile(
        &mut self,
        person_id: PersonId,
        patch: &PersonProfilePatch,
        actor: &Actor,
    ) -> LifecycleResult<Person> {
        let date = today();
        in_transaction(self.conn, "person_update_profile", |store| {
            let mut person = store.require_person(person_id)?;
            let changed = patch.apply(&mut person)?;
            if changed.is_empty() {
                return Ok(person);
            }
            if changed.contains(&"national_id") {
                if let Some(national_id) = person.national_id.as_deref() {
                    if let Some(other) = store.persons.find_by_national_id(national_id)? {
                        if other.id != person_id {
                            return Err(LifecycleError::Conflict(format!(
                                "national id `{national_id}` is already registered"
                            )));
                        }
                    }
                }
            }

            store.persons.update_profile(&person)?;
            let household_id = store
                .memberships
                .get_active_for_person(person_id)?
                .map(|membership| membership.household_id);
            store.person_events.record(
                &PersonEventEntry::new(person_id, PersonEventType::Other, date)
                    .households(household_id, household_id)
                    .note(Some(format!("profile updated: {}", changed.join(", ")))),
                actor,
            )?;
            Ok(person)
        })
    }

    /// Changes the registered address of a household.
    pub fn update_household_address(
        &mut self,
        household_id: HouseholdId,
        address: &str,
        actor: &Actor,
    ) -> LifecycleResult<Household> {
        in_transaction(self.conn, "household_update_address", |store| {
            let household = store.require_household(household_id)?;
            let address = address.trim();
            if address.is_empty() {
                return Err(LifecycleError::Validation(
                    "address must not be blank".to_string(),
                ));
            }
            if address == household.address {
                return Ok(household);
            }

            store.households.update_address(household_id, address)?;
            store.history.append(
                &HistoryEntry::new(household_id, HistoryEventType::AddressChange)
                    .field("address")
                    .change(
                        HistoryValue::text(household.address.as_str()),
                        HistoryValue::text(address),
                    ),
                actor,
            )?;
            store.require_household(household_id)
        })
    }

    /// Registers a temporary record and moves the person into the matching
    /// temporary status.
    pub fn register_temp_residence(
        &mut self,
        input: NewTempResidence,
        actor: &Actor,
    ) -> LifecycleResult<TempResidence> {
        in_transaction(self.conn, "temp_residence_register", |store| {
            register_temp_residence_in(store, input, actor)
        })
    }

    pub fn household_view(&mut self, household_id: HouseholdId) -> LifecycleResult<HouseholdView> {
        let store = RegistryStore::new(self.conn);
        let household = store.require_household(household_id)?;
        let members = store
            .memberships
            .list_active_for_household(household_id)?
            .into_iter()
            .map(|membership| {
                store
                    .require_person(membership.person_id)
                    .map(|person| (person, membership))
            })
            .collect::<LifecycleResult<Vec<_>>>()?;
        Ok(HouseholdView { household, members })
    }

    pub fn household_by_code(&mut self, code: &str) -> LifecycleResult<Option<Household>> {
        let store = RegistryStore::new(self.conn);
        Ok(store.households.get_household_by_code(code.trim())?)
    }

    pub fn list_households(&mut self) -> LifecycleResult<Vec<Household>> {
        Ok(RegistryStore::new(self.conn).households.list_households()?)
    }

    pub fn person(&mut self, person_id: PersonId) -> LifecycleResult<Person> {
        RegistryStore::new(self.conn).require_person(person_id)
    }

    /// Every membership of a person, oldest first.
    pub fn memberships_of(&mut self, person_id: PersonId) -> LifecycleResult<Vec<Membership>> {
        Ok(RegistryStore::new(self.conn)
            .memberships
            .list_for_person(person_id)?)
    }

    /// Every membership a household ever had, open and closed.
    pub fn household_memberships(
        &mut self,
        household_id: HouseholdId,
    ) -> LifecycleResult<Vec<Membership>> {
        Ok(RegistryStore::new(self.conn)
            .memberships
            .list_for_household(household_id)?)
    }

    pub fn household_history(
        &mut self,
        household_id: HouseholdId,
    ) -> LifecycleResult<Vec<HistoryEvent>> {
        let store = RegistryStore::new(self.conn);
        store.require_household(household_id)?;
        Ok(store.history.list_for_household(household_id)?)
    }

    /// Person events survive the person row, so no existence check is made.
    pub fn person_events(&mut self, person_id: PersonId) -> LifecycleResult<Vec<PersonEvent>> {
        Ok(RegistryStore::new(self.conn)
            .person_events
            .list_for_person(person_id)?)
    }

    pub fn temp_residences_of(
        &mut self,
        person_id: PersonId,
    ) -> LifecycleResult<Vec<TempResidence>> {
        Ok(RegistryStore::new(self.conn)
            .temp_residences
            .list_for_person(person_id)?)
    }
}

fn register_temp_residence_in(
    store: &RegistryStore<'_>,
    input: NewTempResidence,
    actor: &Actor,
) -> LifecycleResult<TempResidence> {
    let person = store.require_person(input.person_id)?;
    if person.residency_status.is_terminal() {
        return Err(LifecycleError::Validation(format!(
            "person {} is {} and cannot take a temporary record",
            person.id,
            person.residency_status.as_str()
        )));
    }

    let active = store.memberships.get_active_for_person(person.id)?;
    let household_id = match input.residence_type {
        TempResidenceType::TemporaryAbsent => {
            let membership = active.as_ref().ok_or(LifecycleError::NotFound {
                entity: "active membership",
                id: person.id,
            })?;
            if let Some(requested) = input.household_id {
                if requested != membership.household_id {
                    return Err(LifecycleError::Consistency(format!(
                        "person {} is registered in household {}, not {requested}",
                        person.id, membership.household_id
                    )));
                }
            }
            Some(membership.household_id)
        }
        TempResidenceType::TemporaryResident => {
            let household_id = input
                .household_id
                .or(active.as_ref().map(|m| m.household_id))
                .ok_or_else(|| {
                    LifecycleError::Validation(
                        "temporary residence requires a household".to_string(),
                    )
                })?;
            store.require_household(household_id)?;
            Some(household_id)
        }
    };

    let record = TempResidence::active(
        person.id,
        household_id,
        input.residence_type,
        input.from_date,
        input.to_date,
        normalize_optional_text(input.note.as_deref()),
    )?;
    store.temp_residences.insert_temp_residence(&record)?;

    let status = input.residence_type.residency_status();
    if person.residency_status != status {
        store.persons.set_status(person.id, status)?;
    }
    store.person_events.record(
        &PersonEventEntry::new(person.id, PersonEventType::Other, record.from_date)
            .households(household_id, household_id)
            .note(Some(format!(
                "{} from {} to {}",
                record.residence_type.as_str(),
                record.from_date,
                record.to_date
            ))),
        actor,
    )?;
    Ok(record)
}
