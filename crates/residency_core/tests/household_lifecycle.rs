use chrono::NaiveDate;
use residency_core::db::open_db_in_memory;
use residency_core::{
    check_invariants, Actor, AddPersonKind, ChangeHeadRequest, Gender, HistoryEventType,
    Household, LifecycleError, LifecycleEvent, LifecycleEventKind, LifecycleService, MemberView,
    NewHousehold, NewPerson, PersonEventType, RegistryService, ResidencyStatus, SplitRequest,
};
use rusqlite::Connection;
use uuid::Uuid;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn clerk() -> Actor {
    Actor::new("clerk-01")
}

fn person(name: &str, is_head: bool) -> NewPerson {
    let mut input = NewPerson::new(name, Gender::Female);
    input.is_head = is_head;
    input.relation_to_head = if is_head { "head" } else { "child" }.to_string();
    input.start_date = Some(date(2020, 1, 1));
    input
}

fn create(conn: &mut Connection, code: &str) -> Household {
    LifecycleService::new(conn)
        .create_household(NewHousehold::new(code, "7 Hang Gai"), &clerk())
        .unwrap()
}

fn add(conn: &mut Connection, household: &Household, input: NewPerson) -> MemberView {
    LifecycleService::new(conn)
        .add_person_to_household(household.id, input, AddPersonKind::MoveIn, &clerk())
        .unwrap()
}

struct Family {
    household: Household,
    a: MemberView,
    b: MemberView,
    c: MemberView,
    d: MemberView,
}

/// HK001 with A as head and B, C, D as members.
fn family(conn: &mut Connection) -> Family {
    let household = create(conn, "HK001");
    let a = add(conn, &household, person("A", true));
    let b = add(conn, &household, person("B", false));
    let c = add(conn, &household, person("C", false));
    let d = add(conn, &household, person("D", false));
    Family {
        household,
        a,
        b,
        c,
        d,
    }
}

fn count(conn: &Connection, sql: &str, id: Uuid) -> i64 {
    conn.query_row(sql, [id.to_string()], |row| row.get(0))
        .unwrap()
}

fn active_members(conn: &Connection, household_id: Uuid) -> i64 {
    count(
        conn,
        "SELECT COUNT(*) FROM memberships WHERE household_id = ?1 AND end_date IS NULL;",
        household_id,
    )
}

fn active_heads(conn: &Connection, household_id: Uuid) -> i64 {
    count(
        conn,
        "SELECT COUNT(*) FROM memberships
         WHERE household_id = ?1 AND end_date IS NULL AND is_head = 1;",
        household_id,
    )
}

fn history_count(conn: &Connection, household_id: Uuid) -> i64 {
    count(
        conn,
        "SELECT COUNT(*) FROM household_history WHERE household_id = ?1;",
        household_id,
    )
}

fn total(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn create_household_records_creation_history() {
    let mut conn = open_db_in_memory().unwrap();
    let household = create(&mut conn, " HK010 ");

    assert_eq!(household.code, "HK010");
    assert_eq!(household.head_person_id, None);
    assert_eq!(household.household_type, "permanent");

    let history = RegistryService::new(&mut conn)
        .household_history(household.id)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, HistoryEventType::HouseholdCreated);
    assert_eq!(history[0].changed_by.as_deref(), Some("clerk-01"));
    let snapshot: serde_json::Value = history[0].new_json().unwrap().unwrap();
    assert_eq!(snapshot["code"], "HK010");
}

#[test]
fn create_household_rejects_blank_and_duplicate_codes() {
    let mut conn = open_db_in_memory().unwrap();
    create(&mut conn, "HK010");

    let mut service = LifecycleService::new(&mut conn);
    let blank = service
        .create_household(NewHousehold::new("  ", "addr"), &clerk())
        .unwrap_err();
    assert!(matches!(blank, LifecycleError::Validation(_)));

    let duplicate = service
        .create_household(NewHousehold::new("HK010", "addr"), &clerk())
        .unwrap_err();
    assert!(matches!(duplicate, LifecycleError::Conflict(_)));
    assert_eq!(total(&conn, "households"), 1);
}

#[test]
fn create_household_with_head_links_an_unattached_person() {
    let mut conn = open_db_in_memory().unwrap();
    let loner = Uuid::new_v4();
    conn.execute(
        "INSERT INTO persons (id, full_name, gender, residency_status)
         VALUES (?1, 'Vu Thi E', 'female', 'permanent');",
        [loner.to_string()],
    )
    .unwrap();

    let mut input = NewHousehold::new("HK020", "9 Ta Hien");
    input.head_person_id = Some(loner);
    let household = LifecycleService::new(&mut conn)
        .create_household(input, &clerk())
        .unwrap();

    assert_eq!(household.head_person_id, Some(loner));
    assert_eq!(active_heads(&conn, household.id), 1);
    let history = RegistryService::new(&mut conn)
        .household_history(household.id)
        .unwrap();
    assert_eq!(
        history.iter().map(|e| e.event_type).collect::<Vec<_>>(),
        vec![
            HistoryEventType::HouseholdCreated,
            HistoryEventType::MemberAdded,
            HistoryEventType::HeadChange,
        ]
    );
    assert!(check_invariants(&conn).unwrap().is_empty());
}

#[test]
fn create_household_rejects_attached_or_departed_heads() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    LifecycleService::new(&mut conn)
        .handle_person_lifecycle_event(
            fam.b.person.id,
            LifecycleEvent {
                kind: LifecycleEventKind::MoveOut,
                event_date: date(2024, 3, 1),
                note: None,
                destination: None,
            },
            &clerk(),
        )
        .unwrap();
    let mut service = LifecycleService::new(&mut conn);

    let mut attached = NewHousehold::new("HK020", "9 Ta Hien");
    attached.head_person_id = Some(fam.c.person.id);
    let err = service.create_household(attached, &clerk()).unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    let mut departed = NewHousehold::new("HK021", "9 Ta Hien");
    departed.head_person_id = Some(fam.b.person.id);
    let err = service.create_household(departed, &clerk()).unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let mut unknown = NewHousehold::new("HK022", "9 Ta Hien");
    unknown.head_person_id = Some(Uuid::new_v4());
    let err = service.create_household(unknown, &clerk()).unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { entity: "person", .. }));

    assert_eq!(total(&conn, "households"), 1);
}

#[test]
fn add_head_sets_pointer_and_audits_both_logs() {
    let mut conn = open_db_in_memory().unwrap();
    let household = create(&mut conn, "HK001");
    let mut input = person("A", true);
    input.national_id = Some("001204001234".to_string());
    let view = add(&mut conn, &household, input);

    assert_eq!(view.household.head_person_id, Some(view.person.id));
    assert!(view.membership.is_head);
    assert_eq!(view.membership.relation_to_head, "head");
    assert_eq!(view.membership.start_date, date(2020, 1, 1));
    assert_eq!(view.person.residency_status, ResidencyStatus::Permanent);

    let mut registry = RegistryService::new(&mut conn);
    let history = registry.household_history(household.id).unwrap();
    assert_eq!(
        history.iter().map(|e| e.event_type).collect::<Vec<_>>(),
        vec![HistoryEventType::HouseholdCreated, HistoryEventType::MemberAdded]
    );
    let events = registry.person_events(view.person.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, PersonEventType::MoveIn);
    assert_eq!(events[0].new_household_id, Some(household.id));
}

#[test]
fn birth_defaults_start_to_date_of_birth() {
    let mut conn = open_db_in_memory().unwrap();
    let household = create(&mut conn, "HK001");
    let mut input = NewPerson::new("Baby", Gender::Male);
    input.date_of_birth = Some(date(2024, 6, 30));

    let view = LifecycleService::new(&mut conn)
        .add_person_to_household(household.id, input, AddPersonKind::Birth, &clerk())
        .unwrap();
    assert_eq!(view.membership.start_date, date(2024, 6, 30));
    assert_eq!(view.membership.relation_to_head, "family member");

    let events = RegistryService::new(&mut conn)
        .person_events(view.person.id)
        .unwrap();
    assert_eq!(events[0].event_type, PersonEventType::Birth);
}

#[test]
fn second_head_is_rejected_without_creating_rows() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let persons_before = total(&conn, "persons");
    let memberships_before = total(&conn, "memberships");
    let history_before = history_count(&conn, fam.household.id);

    let err = LifecycleService::new(&mut conn)
        .add_person_to_household(
            fam.household.id,
            person("E", true),
            AddPersonKind::MoveIn,
            &clerk(),
        )
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Conflict(_)));
    assert_eq!(total(&conn, "persons"), persons_before);
    assert_eq!(total(&conn, "memberships"), memberships_before);
    assert_eq!(history_count(&conn, fam.household.id), history_before);
    assert_eq!(total(&conn, "person_events"), 4);
    assert_eq!(active_heads(&conn, fam.household.id), 1);
}

#[test]
fn duplicate_or_malformed_national_id_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let household = create(&mut conn, "HK001");
    let mut first = person("A", false);
    first.national_id = Some("123456789".to_string());
    add(&mut conn, &household, first);

    let mut service = LifecycleService::new(&mut conn);
    let mut duplicate = person("B", false);
    duplicate.national_id = Some(" 123456789 ".to_string());
    let err = service
        .add_person_to_household(household.id, duplicate, AddPersonKind::MoveIn, &clerk())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    let mut malformed = person("C", false);
    malformed.national_id = Some("12-34".to_string());
    let err = service
        .add_person_to_household(household.id, malformed, AddPersonKind::MoveIn, &clerk())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert_eq!(total(&conn, "persons"), 1);
}

#[test]
fn add_to_missing_household_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let missing = Uuid::new_v4();
    let err = LifecycleService::new(&mut conn)
        .add_person_to_household(missing, person("A", false), AddPersonKind::MoveIn, &clerk())
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::NotFound { entity: "household", id } if id == missing
    ));
}

#[test]
fn split_moves_members_and_conserves_counts() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let source_history_before = history_count(&conn, fam.household.id);

    let outcome = LifecycleService::new(&mut conn)
        .split_household(
            fam.household.id,
            SplitRequest {
                target: NewHousehold::new("HK002", "15 Ma May"),
                new_head_id: fam.c.person.id,
                member_ids: vec![fam.c.person.id, fam.d.person.id],
                split_date: Some(date(2024, 5, 1)),
                note: Some("family division".to_string()),
            },
            &clerk(),
        )
        .unwrap();

    let source = outcome.source;
    let target = outcome.target;
    assert_eq!(source.head_person_id, Some(fam.a.person.id));
    assert_eq!(target.code, "HK002");
    assert_eq!(target.head_person_id, Some(fam.c.person.id));
    assert_eq!(active_members(&conn, source.id), 2);
    assert_eq!(active_members(&conn, target.id), 2);
    assert_eq!(active_heads(&conn, source.id), 1);
    assert_eq!(active_heads(&conn, target.id), 1);

    assert_eq!(outcome.moved.len(), 2);
    assert!(outcome.moved[0].is_head);
    assert_eq!(outcome.moved[0].relation_to_head, "head");
    assert!(!outcome.moved[1].is_head);
    assert_eq!(outcome.moved[1].relation_to_head, "child");

    let mut registry = RegistryService::new(&mut conn);
    let view = registry.household_view(source.id).unwrap();
    let names = view
        .members
        .iter()
        .map(|(person, _)| person.full_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["A", "B"]);

    let source_history = registry.household_history(source.id).unwrap();
    let new_source_events = &source_history[source_history_before as usize..];
    let moved_out = new_source_events
        .iter()
        .filter(|e| e.event_type == HistoryEventType::MoveOut)
        .map(|e| e.old_value.clone().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        moved_out,
        vec![fam.c.person.id.to_string(), fam.d.person.id.to_string()]
    );
    assert_eq!(
        new_source_events
            .iter()
            .filter(|e| e.event_type == HistoryEventType::Split)
            .count(),
        1
    );

    let target_history = registry.household_history(target.id).unwrap();
    let moved_in = target_history
        .iter()
        .filter(|e| e.event_type == HistoryEventType::MoveIn)
        .map(|e| e.new_value.clone().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        moved_in,
        vec![fam.c.person.id.to_string(), fam.d.person.id.to_string()]
    );
    let summaries = target_history
        .iter()
        .filter(|e| e.event_type == HistoryEventType::Split)
        .collect::<Vec<_>>();
    assert_eq!(summaries.len(), 1);
    let summary: serde_json::Value = summaries[0].new_json().unwrap().unwrap();
    assert_eq!(summary["counterpart_code"], "HK001");
    assert_eq!(summary["moved_members"].as_array().unwrap().len(), 2);

    let events = registry.person_events(fam.d.person.id).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, PersonEventType::MoveIn);
    assert_eq!(last.old_household_id, Some(source.id));
    assert_eq!(last.new_household_id, Some(target.id));
    assert_eq!(last.event_date, date(2024, 5, 1));

    let closed = registry.memberships_of(fam.c.person.id).unwrap();
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].household_id, source.id);
    assert_eq!(closed[0].end_date, Some(date(2024, 5, 1)));
    assert!(closed[1].is_active());

    assert!(check_invariants(&conn).unwrap().is_empty());
}

#[test]
fn split_with_head_outside_moved_members_fails_before_any_write() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let history_before = total(&conn, "household_history");

    let err = LifecycleService::new(&mut conn)
        .split_household(
            fam.household.id,
            SplitRequest {
                target: NewHousehold::new("HK002", "15 Ma May"),
                new_head_id: fam.b.person.id,
                member_ids: vec![fam.c.person.id, fam.d.person.id],
                split_date: None,
                note: None,
            },
            &clerk(),
        )
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Validation(_)));
    assert_eq!(total(&conn, "households"), 1);
    assert_eq!(total(&conn, "household_history"), history_before);
    assert_eq!(active_members(&conn, fam.household.id), 4);
}

#[test]
fn split_cannot_empty_the_source() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let all = vec![
        fam.a.person.id,
        fam.b.person.id,
        fam.c.person.id,
        fam.d.person.id,
    ];

    let err = LifecycleService::new(&mut conn)
        .split_household(
            fam.household.id,
            SplitRequest {
                target: NewHousehold::new("HK002", "15 Ma May"),
                new_head_id: fam.a.person.id,
                member_ids: all,
                split_date: None,
                note: None,
            },
            &clerk(),
        )
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Validation(_)));
    assert_eq!(total(&conn, "households"), 1);
    assert_eq!(active_members(&conn, fam.household.id), 4);
}

#[test]
fn split_rejects_outsiders_duplicates_and_taken_codes() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let other = create(&mut conn, "HK050");
    let outsider = add(&mut conn, &other, person("X", false));

    let request = |member_ids: Vec<Uuid>, code: &str| SplitRequest {
        target: NewHousehold::new(code, "15 Ma May"),
        new_head_id: fam.c.person.id,
        member_ids,
        split_date: None,
        note: None,
    };
    let mut service = LifecycleService::new(&mut conn);

    let err = service
        .split_household(
            fam.household.id,
            request(vec![fam.c.person.id, outsider.person.id], "HK002"),
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Consistency(_)));

    let err = service
        .split_household(
            fam.household.id,
            request(vec![fam.c.person.id, fam.c.person.id], "HK002"),
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let err = service
        .split_household(fam.household.id, request(vec![], "HK002"), &clerk())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let err = service
        .split_household(
            fam.household.id,
            request(vec![fam.c.person.id], "HK050"),
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    assert_eq!(total(&conn, "households"), 2);
    assert_eq!(active_members(&conn, fam.household.id), 4);
}

#[test]
fn split_date_before_membership_start_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);

    let err = LifecycleService::new(&mut conn)
        .split_household(
            fam.household.id,
            SplitRequest {
                target: NewHousehold::new("HK002", "15 Ma May"),
                new_head_id: fam.c.person.id,
                member_ids: vec![fam.c.person.id],
                split_date: Some(date(2019, 12, 31)),
                note: None,
            },
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[test]
fn splitting_off_the_head_leaves_source_headless() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);

    let outcome = LifecycleService::new(&mut conn)
        .split_household(
            fam.household.id,
            SplitRequest {
                target: NewHousehold::new("HK002", "15 Ma May"),
                new_head_id: fam.b.person.id,
                member_ids: vec![fam.a.person.id, fam.b.person.id],
                split_date: Some(date(2024, 5, 1)),
                note: None,
            },
            &clerk(),
        )
        .unwrap();

    assert_eq!(outcome.source.head_person_id, None);
    assert_eq!(active_heads(&conn, outcome.source.id), 0);
    assert_eq!(outcome.target.head_person_id, Some(fam.b.person.id));
    let old_head = outcome
        .moved
        .iter()
        .find(|m| m.person_id == fam.a.person.id)
        .unwrap();
    assert!(!old_head.is_head);
    assert_eq!(old_head.relation_to_head, "family member");
    assert!(check_invariants(&conn).unwrap().is_empty());
}

#[test]
fn change_head_swaps_flags_and_pointer() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let version = RegistryService::new(&mut conn)
        .household_view(fam.household.id)
        .unwrap()
        .household
        .version;

    let mut request = ChangeHeadRequest::new(fam.b.person.id);
    request.relation_for_old_head = Some("father".to_string());
    request.expected_version = Some(version);
    let household = LifecycleService::new(&mut conn)
        .change_household_head(fam.household.id, request, &clerk())
        .unwrap();

    assert_eq!(household.head_person_id, Some(fam.b.person.id));
    assert!(household.version > version);
    assert_eq!(active_heads(&conn, fam.household.id), 1);

    let mut registry = RegistryService::new(&mut conn);
    let view = registry.household_view(fam.household.id).unwrap();
    let (head, head_membership) = &view.members[0];
    assert_eq!(head.id, fam.b.person.id);
    assert_eq!(head_membership.relation_to_head, "head");
    let former = view
        .members
        .iter()
        .find(|(person, _)| person.id == fam.a.person.id)
        .unwrap();
    assert!(!former.1.is_head);
    assert_eq!(former.1.relation_to_head, "father");

    let head_changes = registry
        .household_history(fam.household.id)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == HistoryEventType::HeadChange)
        .collect::<Vec<_>>();
    assert_eq!(head_changes.len(), 2);
    assert_eq!(head_changes[1].field_changed.as_deref(), Some("head_person_id"));
    assert_eq!(
        head_changes[1].old_value,
        Some(fam.a.person.id.to_string())
    );

    for person_id in [fam.a.person.id, fam.b.person.id] {
        let events = registry.person_events(person_id).unwrap();
        assert_eq!(events.last().unwrap().event_type, PersonEventType::HeadChange);
    }
    assert!(check_invariants(&conn).unwrap().is_empty());
}

#[test]
fn change_head_to_current_head_is_a_no_op() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let history_before = history_count(&conn, fam.household.id);

    let household = LifecycleService::new(&mut conn)
        .change_household_head(
            fam.household.id,
            ChangeHeadRequest::new(fam.a.person.id),
            &clerk(),
        )
        .unwrap();
    assert_eq!(household.head_person_id, Some(fam.a.person.id));
    assert_eq!(history_count(&conn, fam.household.id), history_before);
}

#[test]
fn change_head_to_non_member_fails_and_keeps_pointer() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let other = create(&mut conn, "HK050");
    let outsider = add(&mut conn, &other, person("X", false));
    let mut service = LifecycleService::new(&mut conn);

    let err = service
        .change_household_head(
            fam.household.id,
            ChangeHeadRequest::new(outsider.person.id),
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Consistency(_)));

    let err = service
        .change_household_head(
            fam.household.id,
            ChangeHeadRequest::new(Uuid::new_v4()),
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { entity: "person", .. }));

    let household = RegistryService::new(&mut conn)
        .household_view(fam.household.id)
        .unwrap()
        .household;
    assert_eq!(household.head_person_id, Some(fam.a.person.id));
    assert_eq!(active_heads(&conn, fam.household.id), 1);
}

#[test]
fn change_head_with_stale_version_conflicts() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);

    let mut request = ChangeHeadRequest::new(fam.b.person.id);
    request.expected_version = Some(fam.household.version);
    let err = LifecycleService::new(&mut conn)
        .change_household_head(fam.household.id, request, &clerk())
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Conflict(_)));
    assert_eq!(active_heads(&conn, fam.household.id), 1);
}

#[test]
fn death_closes_membership_and_sets_status_together() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);
    let died_on = date(2024, 8, 15);

    let outcome = LifecycleService::new(&mut conn)
        .handle_person_lifecycle_event(
            fam.d.person.id,
            LifecycleEvent {
                kind: LifecycleEventKind::Death,
                event_date: died_on,
                note: Some("certificate 42".to_string()),
                destination: None,
            },
            &clerk(),
        )
        .unwrap();

    assert_eq!(outcome.person.residency_status, ResidencyStatus::Deceased);
    assert_eq!(outcome.closed_membership.unwrap().end_date, Some(died_on));
    assert_eq!(outcome.headless_household, None);

    let mut registry = RegistryService::new(&mut conn);
    let memberships = registry.memberships_of(fam.d.person.id).unwrap();
    assert!(memberships.iter().all(|m| !m.is_active()));
    assert_eq!(memberships[0].end_date, Some(died_on));

    let history = registry.household_history(fam.household.id).unwrap();
    let removed = history.last().unwrap();
    assert_eq!(removed.event_type, HistoryEventType::MemberRemoved);

    let events = registry.person_events(fam.d.person.id).unwrap();
    let death = events.last().unwrap();
    assert_eq!(death.event_type, PersonEventType::Death);
    assert_eq!(death.event_date, died_on);
    assert_eq!(death.old_household_id, Some(fam.household.id));

    let err = LifecycleService::new(&mut conn)
        .handle_person_lifecycle_event(
            fam.d.person.id,
            LifecycleEvent {
                kind: LifecycleEventKind::MoveOut,
                event_date: died_on,
                note: None,
                destination: None,
            },
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[test]
fn head_moving_out_clears_pointer_but_keeps_household() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);

    let outcome = LifecycleService::new(&mut conn)
        .handle_person_lifecycle_event(
            fam.a.person.id,
            LifecycleEvent {
                kind: LifecycleEventKind::MoveOut,
                event_date: date(2024, 9, 1),
                note: None,
                destination: Some("Da Nang".to_string()),
            },
            &clerk(),
        )
        .unwrap();

    assert_eq!(outcome.person.residency_status, ResidencyStatus::MovedOut);
    assert_eq!(outcome.headless_household, Some(fam.household.id));
    assert_eq!(active_members(&conn, fam.household.id), 3);
    assert_eq!(active_heads(&conn, fam.household.id), 0);

    let mut registry = RegistryService::new(&mut conn);
    let household = registry.household_view(fam.household.id).unwrap().household;
    assert_eq!(household.head_person_id, None);

    let events = registry.person_events(fam.a.person.id).unwrap();
    let move_out = events.last().unwrap();
    assert_eq!(move_out.event_type, PersonEventType::MoveOut);
    assert_eq!(move_out.note.as_deref(), Some("destination: Da Nang"));

    LifecycleService::new(&mut conn)
        .change_household_head(
            fam.household.id,
            ChangeHeadRequest::new(fam.b.person.id),
            &clerk(),
        )
        .unwrap();
    assert!(check_invariants(&conn).unwrap().is_empty());
}

#[test]
fn event_before_membership_start_is_rejected_atomically() {
    let mut conn = open_db_in_memory().unwrap();
    let fam = family(&mut conn);

    let err = LifecycleService::new(&mut conn)
        .handle_person_lifecycle_event(
            fam.b.person.id,
            LifecycleEvent {
                kind: LifecycleEventKind::Death,
                event_date: date(2019, 1, 1),
                note: None,
                destination: None,
            },
            &clerk(),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let person = RegistryService::new(&mut conn)
        .person(fam.b.person.id)
        .unwrap();
    assert_eq!(person.residency_status, ResidencyStatus::Permanent);
    assert_eq!(active_members(&conn, fam.household.id), 4);
}
