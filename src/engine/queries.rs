use chrono::NaiveDate;
use futures::future::try_join_all;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::analytics::{self, AnalyticsReport, Utilization};
use super::availability;
use super::conflict::{self, validate_query_window, validate_span};
use super::score::{self, ScoringPrefs};
use super::team;
use super::{Engine, EngineError};

// ── Request / response shapes ─────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AvailabilityRequest {
    pub user_id: Ulid,
    pub window: Span,
    /// Overrides the template's slot duration when set.
    pub duration_min: Option<u16>,
    pub template_id: Option<Ulid>,
    /// Bookings excluded from the busy set, e.g. the one being rescheduled.
    pub ignore_bookings: Vec<Ulid>,
}

#[derive(Debug, Clone)]
pub struct OptimalTimesRequest {
    pub user_ids: Vec<Ulid>,
    pub window: Span,
    pub duration_min: u16,
    pub prefs: ScoringPrefs,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct ConflictCheckRequest {
    pub user_ids: Vec<Ulid>,
    pub span: Span,
    pub meeting_type: Option<String>,
    pub check_buffers: bool,
    /// When false, schedule overrides are not consulted.
    pub check_policies: bool,
    /// Bookings excluded from the check, e.g. the one being rescheduled.
    pub ignore_bookings: Vec<Ulid>,
}

#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictDetail>,
    pub suggestions: Vec<String>,
}

impl Engine {
    // ── Availability ─────────────────────────────────────────────

    /// Free bookable slots for one user over the query window.
    pub async fn compute_availability(
        &self,
        req: &AvailabilityRequest,
        now: Ms,
    ) -> Result<Vec<Slot>, EngineError> {
        validate_query_window(&req.window)?;
        let template = self.resolve_template(req.user_id, req.template_id)?;
        let duration_min = req
            .duration_min
            .or(template.as_ref().map(|t| t.slot_duration_min))
            .unwrap_or(self.defaults.granularity_min)
            .max(MIN_GRANULARITY_MIN);

        let spans = self
            .user_slot_spans(
                req.user_id,
                template.as_ref(),
                &req.window,
                duration_min as Ms * MINUTE_MS,
                now,
                &req.ignore_bookings,
            )
            .await;
        Ok(spans
            .into_iter()
            .map(|s| Slot {
                start: s.start,
                end: s.end,
                available: true,
                capacity: 1,
                user_ids: vec![req.user_id],
            })
            .collect())
    }

    /// Slots where team members are free, honoring the team's collective
    /// setting: collective teams require `min_members_available` attendees
    /// per slot, otherwise any one member being free is enough.
    pub async fn compute_team_availability(
        &self,
        team_id: Ulid,
        window: Span,
        duration_min: Option<u16>,
        now: Ms,
    ) -> Result<Vec<Slot>, EngineError> {
        validate_query_window(&window)?;
        let team = self
            .teams
            .get(&team_id)
            .map(|t| t.value().clone())
            .ok_or(EngineError::NotFound(team_id))?;

        let min_attendees = if team.collective {
            (team.min_members_available as usize).max(1)
        } else {
            1
        };
        self.common_availability(&team.members, window, duration_min, min_attendees, now)
            .await
    }

    /// Slots where at least `min_attendees` of the given users are free.
    pub async fn common_availability(
        &self,
        user_ids: &[Ulid],
        window: Span,
        duration_min: Option<u16>,
        min_attendees: usize,
        now: Ms,
    ) -> Result<Vec<Slot>, EngineError> {
        validate_query_window(&window)?;
        if user_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many users in query"));
        }
        let duration_min =
            duration_min.unwrap_or(self.defaults.granularity_min).max(MIN_GRANULARITY_MIN);
        let duration_ms = duration_min as Ms * MINUTE_MS;

        // One task per member; the joined order matches `user_ids`.
        let per_member = try_join_all(user_ids.iter().map(|user_id| async move {
            let template = self.resolve_template(*user_id, None)?;
            let spans = self
                .user_slot_spans(*user_id, template.as_ref(), &window, duration_ms, now, &[])
                .await;
            Ok::<_, EngineError>((*user_id, spans))
        }))
        .await?;
        Ok(team::common_slots(&per_member, min_attendees))
    }

    /// Best meeting times for a group: slots all attendees share, ranked by
    /// the preference table, best first.
    pub async fn find_optimal_times(
        &self,
        req: &OptimalTimesRequest,
        now: Ms,
    ) -> Result<Vec<SuggestedTime>, EngineError> {
        if req.user_ids.is_empty() {
            return Err(EngineError::InvalidRange("no attendees given".into()));
        }
        let common = self
            .common_availability(
                &req.user_ids,
                req.window,
                Some(req.duration_min),
                req.user_ids.len(),
                now,
            )
            .await?;
        let candidates: Vec<Span> = common.iter().map(|s| Span::new(s.start, s.end)).collect();
        let mut ranked = score::rank_slots(&candidates, now, &req.prefs);
        ranked.truncate(req.limit.max(1));
        Ok(ranked)
    }

    // ── Conflicts ────────────────────────────────────────────────

    /// Check a proposed window against every listed user's calendar. Read
    /// locks only — a booking landing between this check and a later write
    /// is caught again by `create_booking`.
    pub async fn check_conflicts(
        &self,
        req: &ConflictCheckRequest,
    ) -> Result<ConflictReport, EngineError> {
        validate_span(&req.span)?;
        if req.user_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many users in query"));
        }

        let per_user = try_join_all(req.user_ids.iter().map(|user_id| async move {
            let Some(cal) = self.get_calendar(user_id) else { return Ok(Vec::new()) };
            let guard = cal.read().await;
            let buffer = if req.check_buffers {
                let team_ids = self.team_ids_for(*user_id);
                self.buffer_for(*user_id, &team_ids, req.meeting_type.as_deref())
            } else {
                None
            };
            Ok::<_, EngineError>(conflict::detect_conflicts(
                &guard,
                &req.span,
                buffer,
                req.check_policies,
                &req.ignore_bookings,
            ))
        }))
        .await?;
        let conflicts: Vec<ConflictDetail> = per_user.into_iter().flatten().collect();

        let suggestions = conflict::resolution_hints(&conflicts, &req.user_ids);
        Ok(ConflictReport { has_conflicts: !conflicts.is_empty(), conflicts, suggestions })
    }

    // ── Analytics ────────────────────────────────────────────────

    /// Booking statistics, utilization, peaks and recommendations over the
    /// users' bookings that start within the date range.
    pub async fn analytics(
        &self,
        user_ids: &[Ulid],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<AnalyticsReport, EngineError> {
        if end_date < start_date {
            return Err(EngineError::InvalidRange("date range inverted".into()));
        }
        if user_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many users in query"));
        }
        let bookings = self.bookings_in_range(user_ids, start_date, end_date).await;
        Ok(analytics::analyze(&bookings, start_date, end_date))
    }

    pub async fn utilization(
        &self,
        user_ids: &[Ulid],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Utilization, EngineError> {
        if end_date < start_date {
            return Err(EngineError::InvalidRange("date range inverted".into()));
        }
        if user_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many users in query"));
        }
        let bookings = self.bookings_in_range(user_ids, start_date, end_date).await;
        Ok(analytics::utilization(bookings.iter(), start_date, end_date))
    }

    async fn bookings_in_range(
        &self,
        user_ids: &[Ulid],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Vec<Booking> {
        let window = Span::new(date_start_ms(start_date), date_start_ms(end_date) + DAY_MS);
        let mut bookings = Vec::new();
        for user_id in user_ids {
            let Some(cal) = self.get_calendar(user_id) else { continue };
            let guard = cal.read().await;
            bookings.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.span.start >= window.start && b.span.start < window.end)
                    .cloned(),
            );
        }
        bookings
    }

    // ── Catalog listings ─────────────────────────────────────────

    pub fn list_templates(&self) -> Vec<AvailabilityTemplate> {
        let mut v: Vec<_> = self.templates.iter().map(|e| e.value().clone()).collect();
        v.sort_by_key(|t| t.id);
        v
    }

    pub fn list_buffer_rules(&self) -> Vec<BufferRule> {
        let mut v: Vec<_> = self.buffer_rules.iter().map(|e| e.value().clone()).collect();
        v.sort_by_key(|r| r.id);
        v
    }

    pub fn list_booking_rules(&self) -> Vec<BookingRule> {
        let mut v: Vec<_> = self.booking_rules.iter().map(|e| e.value().clone()).collect();
        v.sort_by_key(|r| r.id);
        v
    }

    pub fn list_teams(&self) -> Vec<TeamSchedule> {
        let mut v: Vec<_> = self.teams.iter().map(|e| e.value().clone()).collect();
        v.sort_by_key(|t| t.id);
        v
    }

    pub fn list_policies(&self) -> Vec<SchedulePolicy> {
        let mut v: Vec<_> = self.policies.iter().map(|e| e.value().clone()).collect();
        v.sort_by_key(|p| p.id);
        v
    }

    pub async fn list_resources(&self) -> Vec<Resource> {
        let handles: Vec<super::SharedDiary> =
            self.diaries.iter().map(|e| e.value().clone()).collect();
        let mut v = Vec::with_capacity(handles.len());
        for diary in handles {
            v.push(diary.read().await.resource.clone());
        }
        v.sort_by_key(|r| r.id);
        v
    }

    pub async fn list_bookings(&self, user_id: &Ulid) -> Vec<Booking> {
        match self.get_calendar(user_id) {
            Some(cal) => cal.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    pub async fn list_overrides(&self, user_id: &Ulid) -> Vec<ScheduleOverride> {
        match self.get_calendar(user_id) {
            Some(cal) => cal.read().await.overrides.clone(),
            None => Vec::new(),
        }
    }

    pub async fn list_patterns(&self, user_id: &Ulid) -> Vec<RecurringPattern> {
        match self.get_calendar(user_id) {
            Some(cal) => cal.read().await.patterns.clone(),
            None => Vec::new(),
        }
    }

    pub async fn list_reservations(&self, resource_id: &Ulid) -> Vec<ResourceBooking> {
        match self.get_diary(resource_id) {
            Some(diary) => diary.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    pub async fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        let user_id = self.user_for_booking(id)?;
        let cal = self.get_calendar(&user_id)?;
        let guard = cal.read().await;
        guard.booking(*id).cloned()
    }

    // ── Shared plumbing ──────────────────────────────────────────

    /// Template resolution: an explicit id wins; otherwise the user's own
    /// default template, then the user's most recent active template, then
    /// a team default for a team they belong to, then none (fallback hours).
    fn resolve_template(
        &self,
        user_id: Ulid,
        template_id: Option<Ulid>,
    ) -> Result<Option<AvailabilityTemplate>, EngineError> {
        if let Some(id) = template_id {
            return match self.templates.get(&id) {
                Some(t) => Ok(Some(t.value().clone())),
                None => Err(EngineError::NotFound(id)),
            };
        }

        let mut own: Vec<AvailabilityTemplate> = self
            .templates
            .iter()
            .filter(|t| t.value().active && t.value().owner == TemplateOwner::User(user_id))
            .map(|t| t.value().clone())
            .collect();
        own.sort_by_key(|t| t.id);
        if let Some(t) = own.iter().find(|t| t.is_default) {
            return Ok(Some(t.clone()));
        }
        if let Some(t) = own.pop() {
            return Ok(Some(t));
        }

        let team_ids = self.team_ids_for(user_id);
        let mut team_defaults: Vec<AvailabilityTemplate> = self
            .templates
            .iter()
            .filter(|t| {
                t.value().active
                    && t.value().is_default
                    && matches!(t.value().owner, TemplateOwner::Team(tid) if team_ids.contains(&tid))
            })
            .map(|t| t.value().clone())
            .collect();
        team_defaults.sort_by_key(|t| t.id);
        Ok(team_defaults.into_iter().next())
    }

    /// Bookable slot spans for one user: free time minus busy, chopped into
    /// duration-sized steps, clipped by notice and advance-booking limits.
    async fn user_slot_spans(
        &self,
        user_id: Ulid,
        template: Option<&AvailabilityTemplate>,
        window: &Span,
        duration_ms: Ms,
        now: Ms,
        ignore_bookings: &[Ulid],
    ) -> Vec<Span> {
        // Users without a calendar entry still have fallback hours; an empty
        // scratch calendar avoids inserting on a read path.
        let free = match self.get_calendar(&user_id) {
            Some(cal) => {
                let guard = cal.read().await;
                availability::user_free_spans(
                    &guard,
                    template,
                    &self.defaults,
                    window,
                    ignore_bookings,
                )
            }
            None => {
                let empty = UserCalendar::new(user_id);
                availability::user_free_spans(&empty, template, &self.defaults, window, &[])
            }
        };
        let slots = availability::slots_from_spans(&free, duration_ms);
        let (notice, advance) = match template {
            Some(t) => (t.minimum_notice_hours, t.advance_booking_days),
            None => (0, crate::limits::DEFAULT_ADVANCE_BOOKING_DAYS),
        };
        availability::apply_booking_window(slots, now, notice, advance)
    }
}
