use chrono::Days;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::allocate::{self, AllocationOutcome, AllocationPrefs};
use super::conflict::{self, validate_span};
use super::{Engine, EngineError, team};

impl Engine {
    // ── Catalog writes ───────────────────────────────────────────

    pub async fn upsert_template(&self, template: AvailabilityTemplate) -> Result<(), EngineError> {
        if self.templates.len() >= MAX_TEMPLATES_PER_TENANT
            && !self.templates.contains_key(&template.id)
        {
            return Err(EngineError::LimitExceeded("too many templates"));
        }
        for day in &template.week {
            if day.len() > MAX_BLOCKS_PER_DAY {
                return Err(EngineError::LimitExceeded("too many blocks in a day"));
            }
            for b in day {
                if b.start_min >= b.end_min || b.end_min > 24 * 60 {
                    return Err(EngineError::InvalidRange("template block out of range".into()));
                }
            }
        }
        if template.slot_duration_min < MIN_GRANULARITY_MIN {
            return Err(EngineError::InvalidRange("slot duration too small".into()));
        }
        self.persist_catalog(&Event::TemplateUpserted { template }).await
    }

    pub async fn delete_template(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.templates.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_catalog(&Event::TemplateDeleted { id }).await
    }

    pub async fn upsert_buffer_rule(&self, rule: BufferRule) -> Result<(), EngineError> {
        if self.buffer_rules.len() >= MAX_RULES_PER_TENANT && !self.buffer_rules.contains_key(&rule.id)
        {
            return Err(EngineError::LimitExceeded("too many buffer rules"));
        }
        self.persist_catalog(&Event::BufferRuleUpserted { rule }).await
    }

    pub async fn delete_buffer_rule(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.buffer_rules.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_catalog(&Event::BufferRuleDeleted { id }).await
    }

    pub async fn upsert_booking_rule(&self, rule: BookingRule) -> Result<(), EngineError> {
        if self.booking_rules.len() >= MAX_RULES_PER_TENANT
            && !self.booking_rules.contains_key(&rule.id)
        {
            return Err(EngineError::LimitExceeded("too many booking rules"));
        }
        // Rule parameters are typed; only cross-field shape needs checking.
        match &rule.kind {
            BookingRuleKind::BookingWindow { min_days, max_days } if min_days > max_days => {
                return Err(EngineError::InvalidRange("booking window min > max".into()));
            }
            BookingRuleKind::AllowedDuration { minutes } if minutes.is_empty() => {
                return Err(EngineError::InvalidRange("allowed durations empty".into()));
            }
            _ => {}
        }
        self.persist_catalog(&Event::BookingRuleUpserted { rule }).await
    }

    pub async fn delete_booking_rule(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.booking_rules.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_catalog(&Event::BookingRuleDeleted { id }).await
    }

    pub async fn upsert_team(&self, team: TeamSchedule) -> Result<(), EngineError> {
        if self.teams.len() >= MAX_TEAMS_PER_TENANT && !self.teams.contains_key(&team.id) {
            return Err(EngineError::LimitExceeded("too many teams"));
        }
        if team.members.len() > MAX_MEMBERS_PER_TEAM {
            return Err(EngineError::LimitExceeded("too many team members"));
        }
        self.persist_catalog(&Event::TeamUpserted { team }).await
    }

    pub async fn add_team_member(&self, team_id: Ulid, user_id: Ulid) -> Result<(), EngineError> {
        let team = self.teams.get(&team_id).ok_or(EngineError::NotFound(team_id))?;
        if team.members.len() >= MAX_MEMBERS_PER_TEAM {
            return Err(EngineError::LimitExceeded("too many team members"));
        }
        drop(team);
        self.persist_catalog(&Event::TeamMemberAdded { team_id, user_id }).await
    }

    pub async fn delete_team(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.teams.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_catalog(&Event::TeamDeleted { id }).await
    }

    pub async fn upsert_policy(&self, policy: SchedulePolicy) -> Result<(), EngineError> {
        self.persist_catalog(&Event::PolicyUpserted { policy }).await
    }

    pub async fn delete_policy(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.policies.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_catalog(&Event::PolicyDeleted { id }).await
    }

    pub async fn upsert_resource(&self, resource: Resource) -> Result<(), EngineError> {
        if self.diaries.len() >= MAX_RESOURCES_PER_TENANT && !self.diaries.contains_key(&resource.id)
        {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if resource.kind.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("resource type too long"));
        }
        self.persist_catalog(&Event::ResourceUpserted { resource }).await
    }

    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.diaries.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_catalog(&Event::ResourceDeleted { id }).await
    }

    // ── Calendar writes ──────────────────────────────────────────

    pub async fn create_override(&self, ov: ScheduleOverride) -> Result<(), EngineError> {
        if ov.start_date > ov.end_date {
            return Err(EngineError::InvalidRange("override dates inverted".into()));
        }
        if let (Some(s), Some(e)) = (ov.start_min, ov.end_min)
            && (s >= e || e > 24 * 60)
        {
            return Err(EngineError::InvalidRange("override hours out of range".into()));
        }
        let cal = self.ensure_calendar(ov.user_id);
        let mut guard = cal.write().await;
        if guard.overrides.len() >= MAX_OVERRIDES_PER_USER {
            return Err(EngineError::LimitExceeded("too many overrides for user"));
        }
        let id = ov.id;
        let user_id = ov.user_id;
        self.persist_to_calendar(&mut guard, &Event::OverrideCreated { schedule_override: ov })
            .await?;
        self.override_to_user.insert(id, user_id);
        Ok(())
    }

    pub async fn delete_override(&self, id: Ulid) -> Result<(), EngineError> {
        let user_id = self
            .override_to_user
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let cal = self.get_calendar(&user_id).ok_or(EngineError::NotFound(user_id))?;
        let mut guard = cal.write().await;
        self.persist_to_calendar(&mut guard, &Event::OverrideDeleted { id }).await?;
        self.override_to_user.remove(&id);
        Ok(())
    }

    pub async fn create_pattern(&self, pattern: RecurringPattern) -> Result<(), EngineError> {
        if pattern.weekday > 6 {
            return Err(EngineError::InvalidRange("weekday out of range".into()));
        }
        if pattern.blocks.len() > MAX_BLOCKS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many blocks in pattern"));
        }
        for b in &pattern.blocks {
            if b.start_min >= b.end_min || b.end_min > 24 * 60 {
                return Err(EngineError::InvalidRange("pattern block out of range".into()));
            }
        }
        if let Some(until) = pattern.effective_until
            && until < pattern.effective_from
        {
            return Err(EngineError::InvalidRange("pattern dates inverted".into()));
        }
        let cal = self.ensure_calendar(pattern.user_id);
        let mut guard = cal.write().await;
        if guard.patterns.len() >= MAX_PATTERNS_PER_USER {
            return Err(EngineError::LimitExceeded("too many patterns for user"));
        }
        let id = pattern.id;
        let user_id = pattern.user_id;
        self.persist_to_calendar(&mut guard, &Event::PatternCreated { pattern }).await?;
        self.pattern_to_user.insert(id, user_id);
        Ok(())
    }

    pub async fn add_pattern_exception(
        &self,
        id: Ulid,
        date: chrono::NaiveDate,
    ) -> Result<(), EngineError> {
        let user_id = self
            .pattern_to_user
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let cal = self.get_calendar(&user_id).ok_or(EngineError::NotFound(user_id))?;
        let mut guard = cal.write().await;
        self.persist_to_calendar(&mut guard, &Event::PatternExceptionAdded { id, date }).await
    }

    pub async fn delete_pattern(&self, id: Ulid) -> Result<(), EngineError> {
        let user_id = self
            .pattern_to_user
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let cal = self.get_calendar(&user_id).ok_or(EngineError::NotFound(user_id))?;
        let mut guard = cal.write().await;
        self.persist_to_calendar(&mut guard, &Event::PatternDeleted { id }).await?;
        self.pattern_to_user.remove(&id);
        Ok(())
    }

    // ── Bookings ─────────────────────────────────────────────────

    /// Validate rules, then check-and-insert under the calendar write lock.
    /// The lock spans both the conflict check and the insert so two racing
    /// bookings for the same user serialize.
    ///
    /// A booking overlapping another active booking of the same user is
    /// always rejected; no policy relaxes that. Override and buffer
    /// conflicts block only while the governing policy blocks; under an
    /// Advisory policy the insert proceeds and the conflicts are returned
    /// for the caller to surface.
    pub async fn create_booking(
        &self,
        booking: Booking,
        now: Ms,
    ) -> Result<Vec<ConflictDetail>, EngineError> {
        validate_span(&booking.span)?;
        if self.booking_to_user.contains_key(&booking.id) {
            return Err(EngineError::AlreadyExists(booking.id));
        }

        let team_ids = self.team_ids_for(booking.user_id);
        let cal = self.ensure_calendar(booking.user_id);
        let mut guard = cal.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_USER {
            return Err(EngineError::LimitExceeded("too many bookings for user"));
        }

        self.check_booking_rules(&guard, &booking, &team_ids, now)?;

        let buffer = self.buffer_for(booking.user_id, &team_ids, booking.meeting_type.as_deref());
        let conflicts = conflict::detect_conflicts(&guard, &booking.span, buffer, true, &[]);
        if let Some(overlap) =
            conflicts.iter().find(|c| c.conflict_type == ConflictType::BookingOverlap)
        {
            return Err(EngineError::Conflict(overlap.conflicting_id.unwrap_or(booking.id)));
        }
        if !conflicts.is_empty() && self.enforcement_blocks() {
            let first = &conflicts[0];
            return Err(EngineError::PolicyViolation {
                rule_type: first.conflict_type.as_str().to_string(),
                detail: first.description.clone(),
            });
        }

        let id = booking.id;
        let user_id = booking.user_id;
        self.persist_to_calendar(&mut guard, &Event::BookingCreated { booking }).await?;
        self.booking_to_user.insert(id, user_id);
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(conflicts)
    }

    pub async fn set_booking_status(
        &self,
        id: Ulid,
        status: BookingStatus,
        now: Ms,
    ) -> Result<(), EngineError> {
        let user_id = self.user_for_booking(&id).ok_or(EngineError::NotFound(id))?;
        let cal = self.get_calendar(&user_id).ok_or(EngineError::NotFound(user_id))?;
        let mut guard = cal.write().await;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;

        if status == BookingStatus::Cancelled {
            let team_ids = self.team_ids_for(user_id);
            for rule in self.applicable_rules(user_id, &team_ids, booking.meeting_type.as_deref()) {
                if let BookingRuleKind::CancellationPolicy { min_hours } = rule.kind
                    && booking.span.start - now < min_hours as Ms * HOUR_MS
                {
                    return Err(EngineError::PolicyViolation {
                        rule_type: rule.kind.rule_type().to_string(),
                        detail: format!("cancellation requires {min_hours} hours notice"),
                    });
                }
            }
        }

        self.persist_to_calendar(&mut guard, &Event::BookingStatusChanged { id, status }).await
    }

    /// Move a booking to another user. Both calendars' write locks are held
    /// for the whole transition; lock order is by user id to avoid deadlock
    /// with a concurrent reassignment in the other direction.
    pub async fn reassign_booking(&self, id: Ulid, to_user: Ulid) -> Result<(), EngineError> {
        let from_user = self.user_for_booking(&id).ok_or(EngineError::NotFound(id))?;
        if from_user == to_user {
            return Ok(());
        }
        let from_cal = self.get_calendar(&from_user).ok_or(EngineError::NotFound(from_user))?;
        let to_cal = self.ensure_calendar(to_user);

        let (mut from_guard, mut to_guard) = if from_user < to_user {
            let f = from_cal.write().await;
            let t = to_cal.write().await;
            (f, t)
        } else {
            let t = to_cal.write().await;
            let f = from_cal.write().await;
            (f, t)
        };

        let booking = from_guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if booking.status.is_active() {
            let overlapping: Vec<&Booking> = to_guard
                .overlapping_bookings(&booking.span)
                .filter(|b| b.status.is_active())
                .collect();
            if let Some(other) = overlapping.first() {
                return Err(EngineError::Conflict(other.id));
            }
        }

        let event = Event::BookingReassigned { id, from_user, to_user };
        self.wal_append(&event).await?;
        if let Some(mut moved) = from_guard.remove_booking(id) {
            moved.user_id = to_user;
            to_guard.insert_booking(moved);
        }
        self.booking_to_user.insert(id, to_user);
        Ok(())
    }

    /// Pick a member by the team's assignment method and book them.
    pub async fn assign_team_member(
        &self,
        team_id: Ulid,
        booking_id: Ulid,
        span: Span,
        meeting_type: Option<String>,
        now: Ms,
    ) -> Result<Ulid, EngineError> {
        validate_span(&span)?;
        let team = self
            .teams
            .get(&team_id)
            .map(|t| t.value().clone())
            .ok_or(EngineError::NotFound(team_id))?;
        if team.members.is_empty() {
            return Err(EngineError::NotFound(team_id));
        }

        let last_assigned = self.last_assigned_member(&team.members).await;
        let counts = self.member_booking_counts(&team.members, &span).await;
        let selected = {
            let mut rng = self.rng.lock().await;
            team::select_member(&team, last_assigned, &counts, &mut *rng)
        }
        .ok_or(EngineError::NotFound(team_id))?;

        let booking = Booking {
            id: booking_id,
            user_id: selected,
            span,
            status: BookingStatus::Pending,
            created_at: now,
            meeting_type,
        };
        self.create_booking(booking, now).await?;
        Ok(selected)
    }

    /// The member who received the most recent booking, by `created_at`.
    async fn last_assigned_member(&self, members: &[Ulid]) -> Option<Ulid> {
        let mut latest: Option<(Ms, Ulid, Ulid)> = None;
        for m in members {
            let Some(cal) = self.get_calendar(m) else { continue };
            let guard = cal.read().await;
            for b in &guard.bookings {
                let key = (b.created_at, b.id, *m);
                if latest.map(|(t, id, _)| (b.created_at, b.id) > (t, id)).unwrap_or(true) {
                    latest = Some(key);
                }
            }
        }
        latest.map(|(_, _, m)| m)
    }

    /// Active booking counts over the UTC dates covered by `span`.
    async fn member_booking_counts(
        &self,
        members: &[Ulid],
        span: &Span,
    ) -> std::collections::BTreeMap<Ulid, usize> {
        let day_start = ms_to_date(span.start).map(date_start_ms).unwrap_or(span.start);
        let day_end = ms_to_date(span.end - 1)
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(date_start_ms)
            .unwrap_or(span.end);
        let window = Span::new(day_start, day_end);

        let mut counts = std::collections::BTreeMap::new();
        for m in members {
            let n = match self.get_calendar(m) {
                Some(cal) => {
                    let guard = cal.read().await;
                    guard
                        .overlapping_bookings(&window)
                        .filter(|b| b.status.is_active())
                        .count()
                }
                None => 0,
            };
            counts.insert(*m, n);
        }
        counts
    }

    // ── Resource allocation ──────────────────────────────────────

    /// Allocate one resource per requested type for the window.
    ///
    /// Per type: rank candidates from a read snapshot, then check-and-insert
    /// under the winner's diary write lock. If the winner was taken between
    /// ranking and locking, re-rank once and try the new winner; a second
    /// miss leaves the type unsatisfied. Grants for the satisfiable types
    /// stand; only a genuine failure (WAL, limits) releases this call's
    /// reservations and surfaces the error.
    pub async fn allocate_resources(
        &self,
        booking_id: Ulid,
        span: Span,
        requests: &[(String, Option<u32>)],
        prefs: &AllocationPrefs,
    ) -> Result<AllocationOutcome, EngineError> {
        validate_span(&span)?;
        if requests.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many resource types"));
        }

        let mut outcome = AllocationOutcome::default();
        for (resource_type, required_capacity) in requests {
            match self
                .allocate_one(booking_id, span, resource_type, *required_capacity, prefs)
                .await
            {
                Ok(res) => outcome.allocated.push(res),
                Err(EngineError::ResourceUnavailable { resource_type }) => {
                    metrics::counter!(crate::observability::ALLOCATION_FAILURES_TOTAL).increment(1);
                    outcome.unsatisfied_types.push(resource_type);
                }
                Err(e) => {
                    for a in &outcome.allocated {
                        // Roll back earlier grabs from this call.
                        let _ = self.release_reservation(a.reservation_id).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    async fn allocate_one(
        &self,
        booking_id: Ulid,
        span: Span,
        resource_type: &str,
        required_capacity: Option<u32>,
        prefs: &AllocationPrefs,
    ) -> Result<AllocatedResource, EngineError> {
        for _attempt in 0..2 {
            // Read phase: snapshot free candidates of this type. Handles are
            // cloned out first so no shard lock is held across an await.
            let handles: Vec<super::SharedDiary> =
                self.diaries.iter().map(|e| e.value().clone()).collect();
            let mut candidates: Vec<Resource> = Vec::new();
            for diary in handles {
                let guard = diary.read().await;
                if guard.resource.active
                    && guard.resource.kind == resource_type
                    && guard.is_free(&span)
                {
                    candidates.push(guard.resource.clone());
                }
            }
            let ranked = allocate::rank_resources(candidates.iter(), prefs, required_capacity);

            let Some((_, winner)) = ranked.first() else { break };
            let Some(diary) = self.get_diary(winner) else { continue };
            let mut guard = diary.write().await;
            if !guard.is_free(&span) {
                // Lost the race for this resource; re-rank and retry once.
                continue;
            }
            if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many bookings on resource"));
            }
            let reservation = ResourceBooking {
                id: Ulid::new(),
                resource_id: *winner,
                booking_id,
                span,
            };
            self.persist_to_diary(&mut guard, &Event::ResourceBooked { reservation }).await?;
            self.reservation_to_resource.insert(reservation.id, *winner);
            return Ok(AllocatedResource {
                resource_id: guard.resource.id,
                reservation_id: reservation.id,
                resource_type: guard.resource.kind.clone(),
                capacity: guard.resource.capacity,
                location: guard.resource.location.clone(),
                cost: guard.resource.cost,
            });
        }
        Err(EngineError::ResourceUnavailable { resource_type: resource_type.to_string() })
    }

    pub async fn release_reservation(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let resource_id = self
            .reservation_to_resource
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let diary = self.get_diary(&resource_id).ok_or(EngineError::NotFound(resource_id))?;
        let mut guard = diary.write().await;
        self.persist_to_diary(&mut guard, &Event::ResourceReleased { id }).await?;
        self.reservation_to_resource.remove(&id);
        Ok(resource_id)
    }

    // ── Rule evaluation ──────────────────────────────────────────

    pub(super) fn team_ids_for(&self, user_id: Ulid) -> Vec<Ulid> {
        self.teams
            .iter()
            .filter(|t| t.value().members.contains(&user_id))
            .map(|t| *t.key())
            .collect()
    }

    pub(super) fn buffer_for(
        &self,
        user_id: Ulid,
        team_ids: &[Ulid],
        meeting_type: Option<&str>,
    ) -> Option<super::BufferWindow> {
        let rules: Vec<BufferRule> = self.buffer_rules.iter().map(|r| r.value().clone()).collect();
        conflict::combined_buffer(&rules, user_id, team_ids, meeting_type)
    }

    /// Active booking rules applying to this user or meeting type, by
    /// descending priority.
    fn applicable_rules(
        &self,
        user_id: Ulid,
        team_ids: &[Ulid],
        meeting_type: Option<&str>,
    ) -> Vec<BookingRule> {
        let mut rules: Vec<BookingRule> = self
            .booking_rules
            .iter()
            .filter(|r| {
                r.value().applies_to_user(user_id, team_ids)
                    || r.value().applies_to_meeting_type(meeting_type)
            })
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        rules
    }

    fn check_booking_rules(
        &self,
        cal: &UserCalendar,
        booking: &Booking,
        team_ids: &[Ulid],
        now: Ms,
    ) -> Result<(), EngineError> {
        let violation = |rule: &BookingRule, detail: String| EngineError::PolicyViolation {
            rule_type: rule.kind.rule_type().to_string(),
            detail,
        };

        for rule in self.applicable_rules(booking.user_id, team_ids, booking.meeting_type.as_deref())
        {
            match &rule.kind {
                BookingRuleKind::MinNotice { hours } => {
                    if booking.span.start - now < *hours as Ms * HOUR_MS {
                        return Err(violation(&rule, format!("requires {hours} hours notice")));
                    }
                }
                BookingRuleKind::MaxPerDay { count } => {
                    if let Some(date) = ms_to_date(booking.span.start) {
                        let day = Span::new(date_start_ms(date), date_start_ms(date) + DAY_MS);
                        let existing = cal
                            .overlapping_bookings(&day)
                            .filter(|b| b.status.is_active())
                            .count();
                        if existing >= *count as usize {
                            return Err(violation(&rule, format!("at most {count} bookings per day")));
                        }
                    }
                }
                BookingRuleKind::MaxPerWeek { count } => {
                    if let Some(date) = ms_to_date(booking.span.start) {
                        let monday = date - Days::new(weekday_index(date) as u64);
                        let week =
                            Span::new(date_start_ms(monday), date_start_ms(monday) + 7 * DAY_MS);
                        let existing = cal
                            .overlapping_bookings(&week)
                            .filter(|b| b.status.is_active())
                            .count();
                        if existing >= *count as usize {
                            return Err(violation(
                                &rule,
                                format!("at most {count} bookings per week"),
                            ));
                        }
                    }
                }
                BookingRuleKind::BlackoutDates { dates } => {
                    if let (Some(first), Some(last)) =
                        (ms_to_date(booking.span.start), ms_to_date(booking.span.end - 1))
                    {
                        let mut d = first;
                        while d <= last {
                            if dates.contains(&d) {
                                return Err(violation(&rule, format!("{d} is blacked out")));
                            }
                            d = match d.checked_add_days(Days::new(1)) {
                                Some(n) => n,
                                None => break,
                            };
                        }
                    }
                }
                BookingRuleKind::AllowedDuration { minutes } => {
                    let dur = (booking.span.duration_ms() / MINUTE_MS) as u32;
                    if !minutes.contains(&dur) {
                        return Err(violation(&rule, format!("duration {dur}min not allowed")));
                    }
                }
                BookingRuleKind::BookingWindow { min_days, max_days } => {
                    if let (Some(slot_date), Some(today)) =
                        (ms_to_date(booking.span.start), ms_to_date(now))
                    {
                        let days_out = (slot_date - today).num_days();
                        if days_out < *min_days as i64 || days_out > *max_days as i64 {
                            return Err(violation(
                                &rule,
                                format!("must book {min_days}-{max_days} days ahead"),
                            ));
                        }
                    }
                }
                BookingRuleKind::CancellationPolicy { .. } => {} // cancel-time rule
            }
        }
        Ok(())
    }

    /// Whether override and buffer conflicts block writes: the
    /// highest-priority active policy decides; with no policy configured,
    /// they block. Booking overlaps block regardless of policy.
    pub(super) fn enforcement_blocks(&self) -> bool {
        self.policies
            .iter()
            .filter(|p| p.value().active)
            .max_by_key(|p| p.value().priority)
            .map(|p| p.value().enforcement.blocks())
            .unwrap_or(true)
    }
}
