use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use super::*;
use crate::model::*;

fn tmp_wal(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotd_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{name}_{}.wal", Ulid::new()))
}

fn engine(path: &PathBuf) -> Engine {
    Engine::with_seed(path.clone(), EngineDefaults::default(), Some(7)).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Ms {
    let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
    date_start_ms(date) + (h * 60 + min) as Ms * MINUTE_MS
}

fn booking(user: Ulid, start: Ms, end: Ms, created_at: Ms) -> Booking {
    Booking {
        id: Ulid::new(),
        user_id: user,
        span: Span::new(start, end),
        status: BookingStatus::Confirmed,
        created_at,
        meeting_type: None,
    }
}

fn room(kind: &str, capacity: u32) -> Resource {
    Resource {
        id: Ulid::new(),
        kind: kind.into(),
        capacity,
        location: None,
        cost: None,
        active: true,
    }
}

// Monday 2024-01-01, a safe "now" the previous Friday afternoon.
const MONDAY: (i32, u32, u32) = (2024, 1, 1);
fn monday(h: u32, min: u32) -> Ms {
    at(MONDAY.0, MONDAY.1, MONDAY.2, h, min)
}
fn now_friday() -> Ms {
    at(2023, 12, 29, 12, 0)
}

#[tokio::test]
async fn booking_survives_restart() {
    let path = tmp_wal("restart");
    let user = Ulid::new();
    let b = booking(user, monday(10, 0), monday(11, 0), now_friday());
    let id = b.id;
    {
        let e = engine(&path);
        e.create_booking(b, now_friday()).await.unwrap();
    }
    let e = engine(&path);
    let replayed = e.get_booking(&id).await.unwrap();
    assert_eq!(replayed.user_id, user);
    assert_eq!(replayed.span, Span::new(monday(10, 0), monday(11, 0)));
    assert_eq!(e.user_for_booking(&id), Some(user));
}

#[tokio::test]
async fn overlapping_booking_is_rejected() {
    let path = tmp_wal("overlap");
    let e = engine(&path);
    let user = Ulid::new();
    let first = booking(user, monday(10, 0), monday(11, 0), now_friday());
    let first_id = first.id;
    e.create_booking(first, now_friday()).await.unwrap();

    let second = booking(user, monday(10, 30), monday(11, 30), now_friday());
    match e.create_booking(second, now_friday()).await {
        Err(EngineError::Conflict(id)) => assert_eq!(id, first_id),
        other => panic!("expected Conflict, got {other:?}"),
    }

    // Back-to-back is fine without buffer rules.
    let adjacent = booking(user, monday(11, 0), monday(12, 0), now_friday());
    e.create_booking(adjacent, now_friday()).await.unwrap();
}

#[tokio::test]
async fn overlap_blocks_even_under_advisory_policy() {
    let path = tmp_wal("advisory_overlap");
    let e = engine(&path);
    let user = Ulid::new();
    e.upsert_policy(SchedulePolicy {
        id: Ulid::new(),
        enforcement: EnforcementLevel::Advisory,
        priority: 10,
        active: true,
    })
    .await
    .unwrap();

    let first = booking(user, monday(10, 0), monday(11, 0), now_friday());
    let first_id = first.id;
    e.create_booking(first, now_friday()).await.unwrap();

    // Same user, overlapping window: no policy relaxes this.
    let second = booking(user, monday(10, 30), monday(11, 30), now_friday());
    match e.create_booking(second, now_friday()).await {
        Err(EngineError::Conflict(id)) => assert_eq!(id, first_id),
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(e.list_bookings(&user).await.len(), 1);
}

#[tokio::test]
async fn advisory_policy_reports_override_conflict_without_blocking() {
    let path = tmp_wal("advisory_override");
    let e = engine(&path);
    let user = Ulid::new();
    e.upsert_policy(SchedulePolicy {
        id: Ulid::new(),
        enforcement: EnforcementLevel::Advisory,
        priority: 10,
        active: true,
    })
    .await
    .unwrap();
    e.create_override(ScheduleOverride {
        id: Ulid::new(),
        user_id: user,
        kind: OverrideKind::TimeOff,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        start_min: None,
        end_min: None,
        all_day: true,
        replacement_user: None,
    })
    .await
    .unwrap();

    // The insert goes through and the collision comes back for surfacing.
    let advisory = e
        .create_booking(booking(user, monday(10, 0), monday(11, 0), now_friday()), now_friday())
        .await
        .unwrap();
    assert_eq!(advisory.len(), 1);
    assert_eq!(advisory[0].conflict_type, ConflictType::ScheduleOverride);
    assert_eq!(e.list_bookings(&user).await.len(), 1);
}

#[tokio::test]
async fn buffer_rule_blocks_tight_scheduling() {
    let path = tmp_wal("buffer");
    let e = engine(&path);
    let user = Ulid::new();
    e.upsert_buffer_rule(BufferRule {
        id: Ulid::new(),
        scope: RuleScope::All,
        before_min: 0,
        after_min: 15,
        active: true,
    })
    .await
    .unwrap();

    e.create_booking(booking(user, monday(10, 0), monday(11, 0), now_friday()), now_friday())
        .await
        .unwrap();

    // Starts exactly when the previous one ends: 15 minute buffer missing.
    let tight = booking(user, monday(11, 0), monday(12, 0), now_friday());
    match e.create_booking(tight, now_friday()).await {
        Err(EngineError::PolicyViolation { rule_type, .. }) => {
            assert_eq!(rule_type, "buffer_violation");
        }
        other => panic!("expected PolicyViolation, got {other:?}"),
    }

    let spaced = booking(user, monday(11, 15), monday(12, 15), now_friday());
    e.create_booking(spaced, now_friday()).await.unwrap();
}

#[tokio::test]
async fn min_notice_rule_rejects_short_notice() {
    let path = tmp_wal("notice");
    let e = engine(&path);
    let user = Ulid::new();
    e.upsert_booking_rule(BookingRule {
        id: Ulid::new(),
        priority: 0,
        scope: BookingRuleScope::All,
        kind: BookingRuleKind::MinNotice { hours: 24 },
        active: true,
    })
    .await
    .unwrap();

    let now = monday(9, 0);
    let soon = booking(user, monday(10, 0), monday(11, 0), now);
    match e.create_booking(soon, now).await {
        Err(EngineError::PolicyViolation { rule_type, .. }) => {
            assert_eq!(rule_type, "min_notice");
        }
        other => panic!("expected PolicyViolation, got {other:?}"),
    }

    let tomorrow = booking(user, at(2024, 1, 2, 10, 0), at(2024, 1, 2, 11, 0), now);
    e.create_booking(tomorrow, now).await.unwrap();
}

#[tokio::test]
async fn max_per_day_rule_counts_active_bookings() {
    let path = tmp_wal("per_day");
    let e = engine(&path);
    let user = Ulid::new();
    e.upsert_booking_rule(BookingRule {
        id: Ulid::new(),
        priority: 0,
        scope: BookingRuleScope::Users(vec![user]),
        kind: BookingRuleKind::MaxPerDay { count: 2 },
        active: true,
    })
    .await
    .unwrap();

    let now = now_friday();
    e.create_booking(booking(user, monday(9, 0), monday(10, 0), now), now).await.unwrap();
    let second = booking(user, monday(10, 0), monday(11, 0), now);
    let second_id = second.id;
    e.create_booking(second, now).await.unwrap();

    let third = booking(user, monday(14, 0), monday(15, 0), now);
    assert!(matches!(
        e.create_booking(third.clone(), now).await,
        Err(EngineError::PolicyViolation { .. })
    ));

    // Cancelling frees up the quota.
    e.set_booking_status(second_id, BookingStatus::Cancelled, now).await.unwrap();
    e.create_booking(third, now).await.unwrap();
}

#[tokio::test]
async fn cancellation_policy_enforces_notice() {
    let path = tmp_wal("cancel");
    let e = engine(&path);
    let user = Ulid::new();
    e.upsert_booking_rule(BookingRule {
        id: Ulid::new(),
        priority: 0,
        scope: BookingRuleScope::All,
        kind: BookingRuleKind::CancellationPolicy { min_hours: 24 },
        active: true,
    })
    .await
    .unwrap();

    let now = now_friday();
    let b = booking(user, monday(10, 0), monday(11, 0), now);
    let id = b.id;
    e.create_booking(b, now).await.unwrap();

    // One hour before start: too late.
    assert!(matches!(
        e.set_booking_status(id, BookingStatus::Cancelled, monday(9, 0)).await,
        Err(EngineError::PolicyViolation { .. })
    ));
    // Friday is more than 24h out.
    e.set_booking_status(id, BookingStatus::Cancelled, now).await.unwrap();
    let b = e.get_booking(&id).await.unwrap();
    assert_eq!(b.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn fallback_availability_yields_weekday_slots() {
    let path = tmp_wal("fallback");
    let e = engine(&path);
    let user = Ulid::new();
    let window = Span::new(monday(0, 0), monday(0, 0) + DAY_MS);

    let req = AvailabilityRequest {
        user_id: user,
        window,
        duration_min: Some(60),
        template_id: None,
        ignore_bookings: Vec::new(),
    };
    let slots = e.compute_availability(&req, now_friday()).await.unwrap();
    // Fallback hours 09:00-17:00 at 60 minutes.
    assert_eq!(slots.len(), 8);
    assert_eq!(slots[0].start, monday(9, 0));
    assert_eq!(slots[7].end, monday(17, 0));

    // A booking carves its hour out.
    e.create_booking(booking(user, monday(10, 0), monday(11, 0), now_friday()), now_friday())
        .await
        .unwrap();
    let slots = e.compute_availability(&req, now_friday()).await.unwrap();
    assert_eq!(slots.len(), 7);
    assert!(slots.iter().all(|s| s.start != monday(10, 0)));
}

#[tokio::test]
async fn time_off_override_clears_the_day() {
    let path = tmp_wal("timeoff");
    let e = engine(&path);
    let user = Ulid::new();
    e.create_override(ScheduleOverride {
        id: Ulid::new(),
        user_id: user,
        kind: OverrideKind::TimeOff,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        start_min: None,
        end_min: None,
        all_day: true,
        replacement_user: None,
    })
    .await
    .unwrap();

    let req = AvailabilityRequest {
        user_id: user,
        window: Span::new(monday(0, 0), monday(0, 0) + 2 * DAY_MS),
        duration_min: Some(60),
        template_id: None,
        ignore_bookings: Vec::new(),
    };
    let slots = e.compute_availability(&req, now_friday()).await.unwrap();
    // Monday is gone, Tuesday's eight fallback slots remain.
    assert_eq!(slots.len(), 8);
    assert!(slots.iter().all(|s| s.start >= monday(0, 0) + DAY_MS));
}

#[tokio::test]
async fn round_robin_rotates_through_members() {
    let path = tmp_wal("rr");
    let e = engine(&path);
    let mut members: Vec<Ulid> = (0..3).map(|_| Ulid::new()).collect();
    members.sort();
    let team_id = Ulid::new();
    e.upsert_team(TeamSchedule {
        id: team_id,
        members: members.clone(),
        assignment_method: AssignmentMethod::RoundRobin,
        collective: false,
        min_members_available: 1,
    })
    .await
    .unwrap();

    let mut assigned = Vec::new();
    for i in 0..3 {
        // Distinct hours so nothing conflicts; increasing created_at.
        let span = Span::new(monday(9 + i, 0), monday(10 + i, 0));
        let picked = e
            .assign_team_member(team_id, Ulid::new(), span, None, now_friday() + i as Ms)
            .await
            .unwrap();
        assigned.push(picked);
    }
    assert_eq!(assigned, members);

    // Fourth assignment wraps back to the first member.
    let span = Span::new(monday(13, 0), monday(14, 0));
    let picked =
        e.assign_team_member(team_id, Ulid::new(), span, None, now_friday() + 10).await.unwrap();
    assert_eq!(picked, members[0]);
}

#[tokio::test]
async fn least_busy_picks_quietest_member() {
    let path = tmp_wal("least_busy");
    let e = engine(&path);
    let mut members: Vec<Ulid> = (0..2).map(|_| Ulid::new()).collect();
    members.sort();
    let team_id = Ulid::new();
    e.upsert_team(TeamSchedule {
        id: team_id,
        members: members.clone(),
        assignment_method: AssignmentMethod::LeastBusy,
        collective: false,
        min_members_available: 1,
    })
    .await
    .unwrap();

    // Load up the first member on Monday.
    e.create_booking(booking(members[0], monday(9, 0), monday(10, 0), now_friday()), now_friday())
        .await
        .unwrap();

    let span = Span::new(monday(14, 0), monday(15, 0));
    let picked = e.assign_team_member(team_id, Ulid::new(), span, None, now_friday()).await.unwrap();
    assert_eq!(picked, members[1]);
}

#[tokio::test]
async fn reassignment_moves_booking_between_calendars() {
    let path = tmp_wal("reassign");
    let from = Ulid::new();
    let to = Ulid::new();
    let id;
    {
        let e = engine(&path);
        let b = booking(from, monday(10, 0), monday(11, 0), now_friday());
        id = b.id;
        e.create_booking(b, now_friday()).await.unwrap();
        e.reassign_booking(id, to).await.unwrap();

        assert_eq!(e.user_for_booking(&id), Some(to));
        assert!(e.list_bookings(&from).await.is_empty());
        assert_eq!(e.list_bookings(&to).await[0].user_id, to);
    }
    // And it replays that way.
    let e = engine(&path);
    assert_eq!(e.user_for_booking(&id), Some(to));
    assert!(e.list_bookings(&from).await.is_empty());
}

#[tokio::test]
async fn reassignment_rejects_conflicting_target() {
    let path = tmp_wal("reassign_conflict");
    let e = engine(&path);
    let from = Ulid::new();
    let to = Ulid::new();
    let b = booking(from, monday(10, 0), monday(11, 0), now_friday());
    let id = b.id;
    e.create_booking(b, now_friday()).await.unwrap();
    e.create_booking(booking(to, monday(10, 30), monday(11, 30), now_friday()), now_friday())
        .await
        .unwrap();

    assert!(matches!(e.reassign_booking(id, to).await, Err(EngineError::Conflict(_))));
    assert_eq!(e.user_for_booking(&id), Some(from));
}

#[tokio::test]
async fn concurrent_allocation_grants_at_most_one() {
    let path = tmp_wal("alloc_race");
    let e = Arc::new(engine(&path));
    let r = room("room", 4);
    e.upsert_resource(r.clone()).await.unwrap();

    let span = Span::new(monday(10, 0), monday(11, 0));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let e = e.clone();
        handles.push(tokio::spawn(async move {
            e.allocate_resources(
                Ulid::new(),
                span,
                &[("room".to_string(), None)],
                &AllocationPrefs::default(),
            )
            .await
        }));
    }
    let mut wins = 0;
    for h in handles {
        let outcome = h.await.unwrap().unwrap();
        if outcome.fully_satisfied() {
            assert_eq!(outcome.allocated.len(), 1);
            assert_eq!(outcome.allocated[0].resource_id, r.id);
            wins += 1;
        } else {
            assert!(outcome.allocated.is_empty());
            assert_eq!(outcome.unsatisfied_types, vec!["room".to_string()]);
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(e.list_reservations(&r.id).await.len(), 1);
}

#[tokio::test]
async fn allocation_keeps_grants_and_reports_unsatisfied_types() {
    let path = tmp_wal("alloc_partial");
    let e = engine(&path);
    let r = room("room", 4);
    e.upsert_resource(r.clone()).await.unwrap();
    // No projector exists at all.

    let span = Span::new(monday(10, 0), monday(11, 0));
    let outcome = e
        .allocate_resources(
            Ulid::new(),
            span,
            &[("room".to_string(), None), ("projector".to_string(), None)],
            &AllocationPrefs::default(),
        )
        .await
        .unwrap();
    // The room stays reserved; the missing type is reported, not fatal.
    assert_eq!(outcome.allocated.len(), 1);
    assert_eq!(outcome.allocated[0].resource_id, r.id);
    assert_eq!(outcome.unsatisfied_types, vec!["projector".to_string()]);
    assert!(!outcome.fully_satisfied());
    assert_eq!(e.list_reservations(&r.id).await.len(), 1);
}

#[tokio::test]
async fn allocation_prefers_matching_location() {
    let path = tmp_wal("alloc_pref");
    let e = engine(&path);
    let mut hq = room("room", 4);
    hq.location = Some("hq".into());
    let remote = room("room", 4);
    e.upsert_resource(hq.clone()).await.unwrap();
    e.upsert_resource(remote).await.unwrap();

    let prefs = AllocationPrefs { location: Some("hq".into()), max_cost: None };
    let span = Span::new(monday(10, 0), monday(11, 0));
    let outcome =
        e.allocate_resources(Ulid::new(), span, &[("room".to_string(), None)], &prefs).await.unwrap();
    assert_eq!(outcome.allocated[0].resource_id, hq.id);
}

#[tokio::test]
async fn optimal_times_rank_shared_slots() {
    let path = tmp_wal("optimal");
    let e = engine(&path);
    let users: Vec<Ulid> = (0..2).map(|_| Ulid::new()).collect();
    // First user busy Monday morning, so mornings drop out of the overlap.
    e.create_booking(booking(users[0], monday(9, 0), monday(12, 0), now_friday()), now_friday())
        .await
        .unwrap();

    let req = OptimalTimesRequest {
        user_ids: users.clone(),
        window: Span::new(monday(0, 0), monday(0, 0) + DAY_MS),
        duration_min: 60,
        prefs: ScoringPrefs::default(),
        limit: 10,
    };
    let ranked = e.find_optimal_times(&req, now_friday()).await.unwrap();
    assert!(!ranked.is_empty());
    assert!(ranked.iter().all(|s| s.start >= monday(13, 0)));
    // Best first.
    for pair in ranked.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn conflict_report_names_available_users() {
    let path = tmp_wal("conflict_report");
    let e = engine(&path);
    let busy = Ulid::new();
    let free = Ulid::new();
    e.create_booking(booking(busy, monday(10, 0), monday(11, 0), now_friday()), now_friday())
        .await
        .unwrap();
    // Touch the free user's calendar so the report can inspect it.
    e.create_booking(booking(free, monday(15, 0), monday(16, 0), now_friday()), now_friday())
        .await
        .unwrap();

    let req = ConflictCheckRequest {
        user_ids: vec![busy, free],
        span: Span::new(monday(10, 30), monday(11, 30)),
        meeting_type: None,
        check_buffers: true,
        check_policies: true,
        ignore_bookings: Vec::new(),
    };
    let report = e.check_conflicts(&req).await.unwrap();
    assert!(report.has_conflicts);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].user_id, busy);
    assert!(report.suggestions.iter().any(|s| s.contains("Users available")));
}

#[tokio::test]
async fn conflict_check_skips_ignored_booking() {
    let path = tmp_wal("conflict_ignore");
    let e = engine(&path);
    let user = Ulid::new();
    let existing = booking(user, monday(10, 0), monday(11, 0), now_friday());
    let existing_id = existing.id;
    e.create_booking(existing, now_friday()).await.unwrap();

    // A reschedule check excludes the booking being moved.
    let mut req = ConflictCheckRequest {
        user_ids: vec![user],
        span: Span::new(monday(10, 30), monday(11, 30)),
        meeting_type: None,
        check_buffers: true,
        check_policies: true,
        ignore_bookings: vec![existing_id],
    };
    let report = e.check_conflicts(&req).await.unwrap();
    assert!(!report.has_conflicts);

    req.ignore_bookings.clear();
    let report = e.check_conflicts(&req).await.unwrap();
    assert!(report.has_conflicts);
}

#[tokio::test]
async fn conflict_check_policies_toggle_controls_overrides() {
    let path = tmp_wal("conflict_policies");
    let e = engine(&path);
    let user = Ulid::new();
    e.create_override(ScheduleOverride {
        id: Ulid::new(),
        user_id: user,
        kind: OverrideKind::TimeOff,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        start_min: None,
        end_min: None,
        all_day: true,
        replacement_user: None,
    })
    .await
    .unwrap();

    let mut req = ConflictCheckRequest {
        user_ids: vec![user],
        span: Span::new(monday(10, 0), monday(11, 0)),
        meeting_type: None,
        check_buffers: true,
        check_policies: true,
        ignore_bookings: Vec::new(),
    };
    let report = e.check_conflicts(&req).await.unwrap();
    assert!(report.conflicts.iter().any(|c| c.conflict_type == ConflictType::ScheduleOverride));

    req.check_policies = false;
    let report = e.check_conflicts(&req).await.unwrap();
    assert!(!report.has_conflicts);
}

#[tokio::test]
async fn compaction_preserves_state_across_restart() {
    let path = tmp_wal("compact");
    let user = Ulid::new();
    let r = room("room", 2);
    let booking_id;
    {
        let e = engine(&path);
        e.upsert_resource(r.clone()).await.unwrap();
        let b = booking(user, monday(10, 0), monday(11, 0), now_friday());
        booking_id = b.id;
        e.create_booking(b, now_friday()).await.unwrap();
        e.allocate_resources(
            booking_id,
            Span::new(monday(10, 0), monday(11, 0)),
            &[("room".to_string(), Some(2))],
            &AllocationPrefs::default(),
        )
        .await
        .unwrap();
        // A deleted rule must not resurface after compaction.
        let rule_id = Ulid::new();
        e.upsert_buffer_rule(BufferRule {
            id: rule_id,
            scope: RuleScope::All,
            before_min: 10,
            after_min: 10,
            active: true,
        })
        .await
        .unwrap();
        e.delete_buffer_rule(rule_id).await.unwrap();

        e.compact_wal().await.unwrap();
        assert_eq!(e.wal_appends_since_compact().await, 0);
    }

    let e = engine(&path);
    assert!(e.get_booking(&booking_id).await.is_some());
    assert_eq!(e.list_reservations(&r.id).await.len(), 1);
    assert!(e.list_buffer_rules().is_empty());
}

#[tokio::test]
async fn team_availability_collective_needs_quorum() {
    let path = tmp_wal("collective");
    let e = engine(&path);
    let mut members: Vec<Ulid> = (0..2).map(|_| Ulid::new()).collect();
    members.sort();
    let team_id = Ulid::new();
    e.upsert_team(TeamSchedule {
        id: team_id,
        members: members.clone(),
        assignment_method: AssignmentMethod::RoundRobin,
        collective: true,
        min_members_available: 2,
    })
    .await
    .unwrap();
    // One member out all Monday morning.
    e.create_booking(booking(members[0], monday(9, 0), monday(13, 0), now_friday()), now_friday())
        .await
        .unwrap();

    let window = Span::new(monday(0, 0), monday(0, 0) + DAY_MS);
    let slots =
        e.compute_team_availability(team_id, window, Some(60), now_friday()).await.unwrap();
    // Quorum of two only exists from 13:00 on.
    assert!(!slots.is_empty());
    assert!(slots.iter().all(|s| s.start >= monday(13, 0)));
    assert!(slots.iter().all(|s| s.user_ids == members));
}

#[tokio::test]
async fn analytics_counts_and_recommends() {
    let path = tmp_wal("analytics");
    let e = engine(&path);
    let user = Ulid::new();
    let now = now_friday();
    for h in [9, 10, 14] {
        e.create_booking(booking(user, monday(h, 0), monday(h + 1, 0), now), now).await.unwrap();
    }

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let report = e.analytics(&[user], start, end).await.unwrap();
    assert_eq!(report.stats.total, 3);
    assert_eq!(report.day_distribution[0], ("Monday".to_string(), 3));
    assert!(!report.recommendations.is_empty());

    let util = e.utilization(&[user], start, end).await.unwrap();
    // 3 booked hours over 5 weekdays * 8h.
    assert!((util.utilization_rate - 3.0 / 40.0).abs() < 1e-9);
}
