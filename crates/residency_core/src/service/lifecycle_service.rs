//! Membership lifecycle manager.
//!
//! # Responsibility
//! - Create households, add persons, split households, change heads and
//!   close memberships on death or move-out.
//! - Append household history and person events for every change, inside
//!   the same transaction as the change itself.
//!
//! # Invariants
//! - At most one active head membership per household, and the household
//!   head pointer names exactly that member (or nobody).
//! - A split never empties its source; active members are conserved across
//!   source and target.
//! - Residency status and membership closure change together.
//! - All preconditions are evaluated before the first write.

use crate::model::event::{
    HistoryEntry, HistoryEventType, HistoryValue, PersonEventEntry, PersonEventType,
};
use crate::model::household::{Household, HouseholdId, NewHousehold};
use crate::model::membership::{Membership, MembershipType};
use crate::model::person::{NewPerson, Person, PersonId, ResidencyStatus, HEAD_RELATION};
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
use log::{debug, warn};
use rusqlite::Connection;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Relation given to a demoted head when the caller supplies none.
pub const DEFAULT_MEMBER_RELATION: &str = "family member";

/// How a new person enters a household.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPersonKind {
    Birth,
    MoveIn,
}

impl AddPersonKind {
    fn person_event(self) -> PersonEventType {
        match self {
            Self::Birth => PersonEventType::Birth,
            Self::MoveIn => PersonEventType::MoveIn,
        }
    }
}

/// Person joined to a household, as returned by registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    pub person: Person,
    pub household: Household,
    pub membership: Membership,
}

/// Input of a household split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRequest {
    /// New household; its `head_person_id` is ignored in favor of
    /// `new_head_id`.
    pub target: NewHousehold,
    pub new_head_id: PersonId,
    pub member_ids: Vec<PersonId>,
    /// Defaults to the operation date.
    pub split_date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub source: Household,
    pub target: Household,
    /// Newly opened memberships in the target, in request order.
    pub moved: Vec<Membership>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeHeadRequest {
    pub new_head_id: PersonId,
    /// Relation label for the demoted head; defaults to
    /// [`DEFAULT_MEMBER_RELATION`].
    pub relation_for_old_head: Option<String>,
    /// Household version the caller last observed. A mismatch aborts with
    /// `Conflict`.
    pub expected_version: Option<i64>,
}

impl ChangeHeadRequest {
    pub fn new(new_head_id: PersonId) -> Self {
        Self {
            new_head_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEventKind {
    MoveOut,
    Death,
}

impl LifecycleEventKind {
    fn residency_status(self) -> ResidencyStatus {
        match self {
            Self::MoveOut => ResidencyStatus::MovedOut,
            Self::Death => ResidencyStatus::Deceased,
        }
    }

    fn person_event(self) -> PersonEventType {
        match self {
            Self::MoveOut => PersonEventType::MoveOut,
            Self::Death => PersonEventType::Death,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::MoveOut => "move_out",
            Self::Death => "death",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub event_date: NaiveDate,
    pub note: Option<String>,
    /// Free-text destination of a move-out.
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub person: Person,
    /// The membership as closed by this event, if one was active.
    pub closed_membership: Option<Membership>,
    /// Household left without a head by this event.
    pub headless_household: Option<HouseholdId>,
}

/// Lifecycle operations over one connection.
pub struct LifecycleService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> LifecycleService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Registers a household, optionally linking an existing person as head.
    pub fn create_household(
        &mut self,
        input: NewHousehold,
        actor: &Actor,
    ) -> LifecycleResult<Household> {
        let date = today();
        in_transaction(self.conn, "household_create", |store| {
            create_household_in(store, input, actor, date)
        })
    }

    /// Creates a person and their membership by birth or move-in.
    pub fn add_person_to_household(
        &mut self,
        household_id: HouseholdId,
        input: NewPerson,
        kind: AddPersonKind,
        actor: &Actor,
    ) -> LifecycleResult<MemberView> {
        let date = today();
        in_transaction(self.conn, "household_add_person", |store| {
            add_person_in(store, household_id, &input, kind, actor, date)
        })
    }

    /// Moves a subset of a household's active members into a new household.
    pub fn split_household(
        &mut self,
        source_id: HouseholdId,
        request: SplitRequest,
        actor: &Actor,
    ) -> LifecycleResult<SplitOutcome> {
        let date = today();
        in_transaction(self.conn, "household_split", |store| {
            split_in(store, source_id, request, actor, date)
        })
    }

    /// Transfers headship to an active member of the household.
    pub fn change_household_head(
        &mut self,
        household_id: HouseholdId,
        request: ChangeHeadRequest,
        actor: &Actor,
    ) -> LifecycleResult<Household> {
        let date = today();
        in_transaction(self.conn, "household_change_head", |store| {
            change_head_in(store, household_id, &request, actor, date)
        })
    }

    /// Records a death or move-out and closes the person's membership.
    pub fn handle_person_lifecycle_event(
        &mut self,
        person_id: PersonId,
        event: LifecycleEvent,
        actor: &Actor,
    ) -> LifecycleResult<LifecycleOutcome> {
        in_transaction(self.conn, "person_lifecycle_event", |store| {
            lifecycle_event_in(store, person_id, &event, actor)
        })
    }
}

fn create_household_in(
    store: &RegistryStore<'_>,
    input: NewHousehold,
    actor: &Actor,
    date: NaiveDate,
) -> LifecycleResult<Household> {
    let head_person_id = input.head_person_id;
    let household = input.into_household()?;
    ensure_code_free(store, &household.code)?;

    let head = match head_person_id {
        Some(person_id) => {
            let person = store.require_person(person_id)?;
            if person.residency_status.is_terminal() {
                return Err(LifecycleError::Validation(format!(
                    "person {person_id} is {} and cannot head a household",
                    person.residency_status.as_str()
                )));
            }
            if let Some(active) = store.memberships.get_active_for_person(person_id)? {
                return Err(LifecycleError::Conflict(format!(
                    "person {person_id} is already an active member of household {}",
                    active.household_id
                )));
            }
            Some(person)
        }
        None => None,
    };

    store.households.insert_household(&household)?;
    store.history.append(
        &HistoryEntry::new(household.id, HistoryEventType::HouseholdCreated)
            .change(HistoryValue::Null, HistoryValue::json(&household)?),
        actor,
    )?;

    if let Some(person) = head {
        let membership = Membership::open(
            household.id,
            person.id,
            date,
            HEAD_RELATION,
            true,
            MembershipType::Permanent,
        );
        store.memberships.insert_membership(&membership)?;
        store.households.set_head(household.id, Some(person.id))?;
        append_member_added(store, &membership, actor)?;
        store.history.append(
            &HistoryEntry::new(household.id, HistoryEventType::HeadChange)
                .field("head_person_id")
                .change(HistoryValue::Null, HistoryValue::id(person.id)),
            actor,
        )?;
        store.person_events.record(
            &PersonEventEntry::new(person.id, PersonEventType::MoveIn, date)
                .households(None, Some(household.id)),
            actor,
        )?;
    }

    store.require_household(household.id)
}

fn add_person_in(
    store: &RegistryStore<'_>,
    household_id: HouseholdId,
    input: &NewPerson,
    kind: AddPersonKind,
    actor: &Actor,
    date: NaiveDate,
) -> LifecycleResult<MemberView> {
    store.require_household(household_id)?;
    let person = input.to_person()?;

    if let Some(national_id) = person.national_id.as_deref() {
        if store.persons.find_by_national_id(national_id)?.is_some() {
            return Err(LifecycleError::Conflict(format!(
                "national id `{national_id}` is already registered"
            )));
        }
    }
    if input.is_head {
        if let Some(head) = store.memberships.get_active_head(household_id)? {
            return Err(LifecycleError::Conflict(format!(
                "household {household_id} already has active head {}",
                head.person_id
            )));
        }
    }

    let start_date = match kind {
        AddPersonKind::Birth => input.start_date.or(input.date_of_birth),
        AddPersonKind::MoveIn => input.start_date,
    }
    .unwrap_or(date);

    store.persons.insert_person(&person)?;
    let membership = Membership::open(
        household_id,
        person.id,
        start_date,
        input.effective_relation(),
        input.is_head,
        input.membership_type,
    );
    store.memberships.insert_membership(&membership)?;

    if input.is_head {
        store.households.set_head(household_id, Some(person.id))?;
    } else {
        store.households.bump_version(household_id)?;
    }

    append_member_added(store, &membership, actor)?;
    store.person_events.record(
        &PersonEventEntry::new(person.id, kind.person_event(), start_date)
            .households(None, Some(household_id))
            .note(normalize_optional_text(input.note.as_deref())),
        actor,
    )?;

    Ok(MemberView {
        person,
        household: store.require_household(household_id)?,
        membership,
    })
}

fn split_in(
    store: &RegistryStore<'_>,
    source_id: HouseholdId,
    request: SplitRequest,
    actor: &Actor,
    date: NaiveDate,
) -> LifecycleResult<SplitOutcome> {
    let source = store.require_household(source_id)?;
    if request.member_ids.is_empty() {
        return Err(LifecycleError::Validation(
            "split requires at least one member to move".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for person_id in &request.member_ids {
        if !seen.insert(*person_id) {
            return Err(LifecycleError::Validation(format!(
                "person {person_id} is listed twice in the split"
            )));
        }
    }
    if !seen.contains(&request.new_head_id) {
        return Err(LifecycleError::Validation(format!(
            "new head {} must be among the moved members",
            request.new_head_id
        )));
    }

    let active = store.memberships.list_active_for_household(source_id)?;
    let active_before = active.len();
    let by_person: HashMap<PersonId, &Membership> = active
        .iter()
        .map(|membership| (membership.person_id, membership))
        .collect();
    let moving = request
        .member_ids
        .iter()
        .map(|person_id| {
            by_person.get(person_id).map(|m| (*m).clone()).ok_or_else(|| {
                LifecycleError::Consistency(format!(
                    "person {person_id} is not an active member of household {source_id}"
                ))
            })
        })
        .collect::<LifecycleResult<Vec<_>>>()?;
    if moving.len() >= active_before {
        return Err(LifecycleError::Validation(format!(
            "split would leave household {source_id} without active members"
        )));
    }

    let split_date = request.split_date.unwrap_or(date);
    if let Some(early) = moving.iter().find(|m| split_date < m.start_date) {
        return Err(LifecycleError::Validation(format!(
            "split date {split_date} precedes membership start {} of person {}",
            early.start_date, early.person_id
        )));
    }

    let target = request.target.into_household()?;
    ensure_code_free(store, &target.code)?;
    let note = normalize_optional_text(request.note.as_deref());

    store.households.insert_household(&target)?;
    store.history.append(
        &HistoryEntry::new(target.id, HistoryEventType::HouseholdCreated)
            .change(HistoryValue::Null, HistoryValue::json(&target)?),
        actor,
    )?;

    let mut moved = Vec::with_capacity(moving.len());
    for old in &moving {
        store.memberships.close_membership(old.id, split_date)?;

        let becomes_head = old.person_id == request.new_head_id;
        let relation = if becomes_head {
            HEAD_RELATION.to_string()
        } else if old.is_head {
            DEFAULT_MEMBER_RELATION.to_string()
        } else {
            old.relation_to_head.clone()
        };
        let membership = Membership::open(
            target.id,
            old.person_id,
            split_date,
            relation,
            becomes_head,
            old.membership_type,
        );
        store.memberships.insert_membership(&membership)?;

        store.history.append(
            &HistoryEntry::new(source_id, HistoryEventType::MoveOut)
                .field("members")
                .change(HistoryValue::id(old.person_id), HistoryValue::Null)
                .note(format!("moved to household {}", target.code)),
            actor,
        )?;
        store.history.append(
            &HistoryEntry::new(target.id, HistoryEventType::MoveIn)
                .field("members")
                .change(HistoryValue::Null, HistoryValue::id(old.person_id))
                .note(format!("moved from household {}", source.code)),
            actor,
        )?;
        store.person_events.record(
            &PersonEventEntry::new(old.person_id, PersonEventType::MoveIn, split_date)
                .households(Some(source_id), Some(target.id))
                .note(note.clone()),
            actor,
        )?;
        moved.push(membership);
    }

    store.households.set_head(target.id, Some(request.new_head_id))?;
    store.history.append(
        &HistoryEntry::new(target.id, HistoryEventType::HeadChange)
            .field("head_person_id")
            .change(HistoryValue::Null, HistoryValue::id(request.new_head_id)),
        actor,
    )?;

    if moving.iter().any(|m| m.is_head) {
        store.households.set_head(source_id, None)?;
        store.history.append(
            &HistoryEntry::new(source_id, HistoryEventType::HeadChange)
                .field("head_person_id")
                .change(HistoryValue::optional_id(source.head_person_id), HistoryValue::Null)
                .note("head moved to split household; awaiting reassignment"),
            actor,
        )?;
        warn!(
            "event=household_headless module=lifecycle status=ok household_id={} cause=split",
            source_id
        );
    } else {
        store.households.bump_version(source_id)?;
    }

    let moved_ids = request
        .member_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    store.history.append(
        &HistoryEntry::new(source_id, HistoryEventType::Split)
            .field("members")
            .change(
                HistoryValue::Null,
                HistoryValue::Json(json!({
                    "role": "source",
                    "counterpart_household_id": target.id,
                    "counterpart_code": target.code,
                    "new_head_id": request.new_head_id,
                    "moved_members": moved_ids,
                    "split_date": split_date,
                })),
            )
            .note(note.clone().unwrap_or_else(|| "household split".to_string())),
        actor,
    )?;
    store.history.append(
        &HistoryEntry::new(target.id, HistoryEventType::Split)
            .field("members")
            .change(
                HistoryValue::Null,
                HistoryValue::Json(json!({
                    "role": "target",
                    "counterpart_household_id": source_id,
                    "counterpart_code": source.code,
                    "new_head_id": request.new_head_id,
                    "moved_members": moved_ids,
                    "split_date": split_date,
                })),
            )
            .note(note.unwrap_or_else(|| "household split".to_string())),
        actor,
    )?;

    let source_after = store.memberships.count_active(source_id)?;
    let target_after = store.memberships.count_active(target.id)?;
    if source_after == 0 || source_after + target_after != active_before {
        return Err(LifecycleError::Consistency(format!(
            "split of household {source_id} did not conserve members: before={active_before} source_after={source_after} target_after={target_after}"
        )));
    }
    debug!(
        "event=household_split module=lifecycle status=ok source_id={} target_id={} moved={}",
        source_id,
        target.id,
        moved.len()
    );

    Ok(SplitOutcome {
        source: store.require_household(source_id)?,
        target: store.require_household(target.id)?,
        moved,
    })
}

fn change_head_in(
    store: &RegistryStore<'_>,
    household_id: HouseholdId,
    request: &ChangeHeadRequest,
    actor: &Actor,
    date: NaiveDate,
) -> LifecycleResult<Household> {
    let household = store.require_household(household_id)?;
    if let Some(expected) = request.expected_version {
        if household.version != expected {
            return Err(LifecycleError::Conflict(format!(
                "household {household_id} changed concurrently: expected version {expected}, found {}",
                household.version
            )));
        }
    }

    let new_head_id = request.new_head_id;
    store.require_person(new_head_id)?;
    let membership = store
        .memberships
        .get_active_for_person(new_head_id)?
        .ok_or(LifecycleError::NotFound {
            entity: "active membership",
            id: new_head_id,
        })?;
    if membership.household_id != household_id {
        return Err(LifecycleError::Consistency(format!(
            "person {new_head_id} is an active member of household {}, not {household_id}",
            membership.household_id
        )));
    }

    let current_head = store.memberships.get_active_head(household_id)?;
    if current_head.as_ref().map(|head| head.person_id) == Some(new_head_id) {
        if household.head_person_id == Some(new_head_id) {
            return Ok(household);
        }
        store.households.set_head(household_id, Some(new_head_id))?;
        store.history.append(
            &HistoryEntry::new(household_id, HistoryEventType::HeadChange)
                .field("head_person_id")
                .change(
                    HistoryValue::optional_id(household.head_person_id),
                    HistoryValue::id(new_head_id),
                )
                .note("head pointer realigned with head membership"),
            actor,
        )?;
        return store.require_household(household_id);
    }

    if let Some(old) = &current_head {
        let relation = normalize_optional_text(request.relation_for_old_head.as_deref())
            .unwrap_or_else(|| DEFAULT_MEMBER_RELATION.to_string());
        store.memberships.set_head_flag(old.id, false, &relation)?;
        store.history.append(
            &HistoryEntry::new(household_id, HistoryEventType::HeadChange)
                .field("relation_to_head")
                .change(
                    HistoryValue::Json(json!({
                        "person_id": old.person_id,
                        "relation_to_head": old.relation_to_head,
                        "is_head": true,
                    })),
                    HistoryValue::Json(json!({
                        "person_id": old.person_id,
                        "relation_to_head": relation,
                        "is_head": false,
                    })),
                ),
            actor,
        )?;
        store.person_events.record(
            &PersonEventEntry::new(old.person_id, PersonEventType::HeadChange, date)
                .households(Some(household_id), Some(household_id))
                .note(Some(format!("stepped down as head; now {relation}"))),
            actor,
        )?;
    }

    store
        .memberships
        .set_head_flag(membership.id, true, HEAD_RELATION)?;
    store.households.set_head(household_id, Some(new_head_id))?;
    store.history.append(
        &HistoryEntry::new(household_id, HistoryEventType::HeadChange)
            .field("head_person_id")
            .change(
                HistoryValue::optional_id(current_head.as_ref().map(|head| head.person_id)),
                HistoryValue::id(new_head_id),
            ),
        actor,
    )?;
    store.person_events.record(
        &PersonEventEntry::new(new_head_id, PersonEventType::HeadChange, date)
            .households(Some(household_id), Some(household_id))
            .note(Some(format!(
                "became head; previously {}",
                membership.relation_to_head
            ))),
        actor,
    )?;

    match store.memberships.get_active_head(household_id)? {
        Some(head) if head.person_id == new_head_id => store.require_household(household_id),
        _ => Err(LifecycleError::Consistency(format!(
            "household {household_id} head membership does not match {new_head_id}"
        ))),
    }
}

fn lifecycle_event_in(
    store: &RegistryStore<'_>,
    person_id: PersonId,
    event: &LifecycleEvent,
    actor: &Actor,
) -> LifecycleResult<LifecycleOutcome> {
    let person = store.require_person(person_id)?;
    if person.residency_status.is_terminal() {
        return Err(LifecycleError::Validation(format!(
            "person {person_id} is already {}",
            person.residency_status.as_str()
        )));
    }

    let active = store.memberships.get_active_for_person(person_id)?;
    if let Some(membership) = &active {
        if event.event_date < membership.start_date {
            return Err(LifecycleError::Validation(format!(
                "event date {} precedes membership start {}",
                event.event_date, membership.start_date
            )));
        }
    }

    let note = normalize_optional_text(event.note.as_deref());
    let destination = normalize_optional_text(event.destination.as_deref())
        .filter(|_| event.kind == LifecycleEventKind::MoveOut);

    store
        .persons
        .set_status(person_id, event.kind.residency_status())?;

    let mut closed_membership = None;
    let mut headless_household = None;
    if let Some(membership) = active {
        store
            .memberships
            .close_membership(membership.id, event.event_date)?;
        store.history.append(
            &HistoryEntry::new(membership.household_id, HistoryEventType::MemberRemoved)
                .field("members")
                .change(
                    HistoryValue::Json(json!({
                        "person_id": person_id,
                        "relation_to_head": membership.relation_to_head,
                        "reason": event.kind.as_str(),
                    })),
                    destination
                        .as_ref()
                        .map_or(HistoryValue::Null, |value| HistoryValue::text(value.as_str())),
                )
                .note(note.clone().unwrap_or_else(|| event.kind.as_str().to_string())),
            actor,
        )?;

        let household = store.require_household(membership.household_id)?;
        if membership.is_head || household.head_person_id == Some(person_id) {
            store.households.set_head(household.id, None)?;
            store.history.append(
                &HistoryEntry::new(household.id, HistoryEventType::HeadChange)
                    .field("head_person_id")
                    .change(HistoryValue::id(person_id), HistoryValue::Null)
                    .note("head left household; awaiting reassignment"),
                actor,
            )?;
            let remaining = store.memberships.count_active(household.id)?;
            warn!(
                "event=household_headless module=lifecycle status=ok household_id={} remaining_members={} cause={}",
                household.id,
                remaining,
                event.kind.as_str()
            );
            headless_household = Some(household.id);
        } else {
            store.households.bump_version(household.id)?;
        }

        closed_membership = Some(Membership {
            end_date: Some(event.event_date),
            ..membership
        });
    }

    let expired = store.temp_residences.expire_active_for_person(person_id)?;
    if expired > 0 {
        debug!(
            "event=temp_residence_expire module=lifecycle status=ok person_id={} count={}",
            person_id, expired
        );
    }

    let event_note = match (note, destination) {
        (Some(note), Some(destination)) => Some(format!("{note}; destination: {destination}")),
        (None, Some(destination)) => Some(format!("destination: {destination}")),
        (note, None) => note,
    };
    store.person_events.record(
        &PersonEventEntry::new(person_id, event.kind.person_event(), event.event_date)
            .households(
                closed_membership.as_ref().map(|m| m.household_id),
                None,
            )
            .note(event_note),
        actor,
    )?;

    Ok(LifecycleOutcome {
        person: store.require_person(person_id)?,
        closed_membership,
        headless_household,
    })
}

fn ensure_code_free(store: &RegistryStore<'_>, code: &str) -> LifecycleResult<()> {
    if store.households.get_household_by_code(code)?.is_some() {
        return Err(LifecycleError::Conflict(format!(
            "household code `{code}` is already registered"
        )));
    }
    Ok(())
}

fn append_member_added(
    store: &RegistryStore<'_>,
    membership: &Membership,
    actor: &Actor,
) -> LifecycleResult<()> {
    store.history.append(
        &HistoryEntry::new(membership.household_id, HistoryEventType::MemberAdded)
            .field("members")
            .change(
                HistoryValue::Null,
                HistoryValue::Json(json!({
                    "person_id": membership.person_id,
                    "relation_to_head": membership.relation_to_head,
                    "is_head": membership.is_head,
                    "start_date": membership.start_date,
                })),
            ),
        actor,
    )?;
    Ok(())
}
