use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC) — the only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// UTC calendar helpers over `Ms`.
pub fn ms_to_datetime(ms: Ms) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

pub fn ms_to_date(ms: Ms) -> Option<NaiveDate> {
    ms_to_datetime(ms).map(|dt| dt.date_naive())
}

/// Midnight UTC of `date`, in epoch millis.
pub fn date_start_ms(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Monday=0 .. Sunday=6.
pub fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_monday() as usize
}

/// UTC hour of day for an instant.
pub fn hour_of(ms: Ms) -> u32 {
    ms_to_datetime(ms).map(|dt| dt.hour()).unwrap_or(0)
}

// ── Templates & patterns ─────────────────────────────────────────

/// A contiguous interval within one weekday, in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub start_min: u16,
    pub end_min: u16,
    /// Blocks with `available=false` are skipped during slot generation.
    #[serde(default = "serde_true")]
    pub available: bool,
}

fn serde_true() -> bool {
    true
}

impl TimeBlock {
    pub fn new(start_min: u16, end_min: u16) -> Self {
        Self { start_min, end_min, available: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateOwner {
    User(Ulid),
    Team(Ulid),
}

/// Weekly working-hours template. `week` is Monday..Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub id: Ulid,
    pub owner: TemplateOwner,
    pub week: [Vec<TimeBlock>; 7],
    pub slot_duration_min: u16,
    pub advance_booking_days: u16,
    pub minimum_notice_hours: u16,
    pub is_default: bool,
    pub active: bool,
}

impl AvailabilityTemplate {
    pub fn new(id: Ulid, owner: TemplateOwner) -> Self {
        Self {
            id,
            owner,
            week: Default::default(),
            slot_duration_min: 30,
            advance_booking_days: 60,
            minimum_notice_hours: 0,
            is_default: false,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatCadence {
    Weekly,
    Biweekly,
}

impl RepeatCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatCadence::Weekly => "weekly",
            RepeatCadence::Biweekly => "biweekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(RepeatCadence::Weekly),
            "biweekly" => Some(RepeatCadence::Biweekly),
            _ => None,
        }
    }
}

/// Date-bounded recurring weekday schedule. Takes precedence over the
/// owner's template on dates it governs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPattern {
    pub id: Ulid,
    pub user_id: Ulid,
    /// Monday=0 .. Sunday=6.
    pub weekday: u8,
    pub blocks: Vec<TimeBlock>,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
    pub cadence: RepeatCadence,
    pub exceptions: Vec<NaiveDate>,
    pub active: bool,
}

impl RecurringPattern {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        if !self.active || weekday_index(date) != self.weekday as usize {
            return false;
        }
        if date < self.effective_from {
            return false;
        }
        if let Some(until) = self.effective_until
            && date > until
        {
            return false;
        }
        if self.exceptions.contains(&date) {
            return false;
        }
        match self.cadence {
            RepeatCadence::Weekly => true,
            RepeatCadence::Biweekly => {
                let weeks = (date - self.effective_from).num_days() / 7;
                weeks % 2 == 0
            }
        }
    }
}

// ── Overrides ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideKind {
    TimeOff,
    Holiday,
    SpecialHours,
    Blocked,
}

impl OverrideKind {
    /// Kinds that wipe out availability for the covered dates.
    pub fn suppresses(&self) -> bool {
        matches!(
            self,
            OverrideKind::TimeOff | OverrideKind::Holiday | OverrideKind::Blocked
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideKind::TimeOff => "time_off",
            OverrideKind::Holiday => "holiday",
            OverrideKind::SpecialHours => "special_hours",
            OverrideKind::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "time_off" => Some(OverrideKind::TimeOff),
            "holiday" => Some(OverrideKind::Holiday),
            "special_hours" => Some(OverrideKind::SpecialHours),
            "blocked" => Some(OverrideKind::Blocked),
            _ => None,
        }
    }
}

/// Date-scoped exception superseding templates and patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub id: Ulid,
    pub user_id: Ulid,
    pub kind: OverrideKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// For `SpecialHours`: the replacement working window.
    pub start_min: Option<u16>,
    pub end_min: Option<u16>,
    pub all_day: bool,
    pub replacement_user: Option<Ulid>,
}

impl ScheduleOverride {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

// ── Buffer & booking rules ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleScope {
    All,
    User(Ulid),
    Team(Ulid),
    MeetingType(String),
}

/// Mandatory idle minutes around bookings. Overlapping rules combine by max.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRule {
    pub id: Ulid,
    pub scope: RuleScope,
    pub before_min: u16,
    pub after_min: u16,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingRuleScope {
    All,
    Users(Vec<Ulid>),
    Teams(Vec<Ulid>),
    MeetingTypes(Vec<String>),
}

/// Typed booking constraint — one variant per rule type, validated at
/// insert time rather than stored as an open key-value bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingRuleKind {
    MinNotice { hours: u32 },
    MaxPerDay { count: u32 },
    MaxPerWeek { count: u32 },
    BlackoutDates { dates: Vec<NaiveDate> },
    AllowedDuration { minutes: Vec<u32> },
    BookingWindow { min_days: u32, max_days: u32 },
    CancellationPolicy { min_hours: u32 },
}

impl BookingRuleKind {
    pub fn rule_type(&self) -> &'static str {
        match self {
            BookingRuleKind::MinNotice { .. } => "min_notice",
            BookingRuleKind::MaxPerDay { .. } => "max_per_day",
            BookingRuleKind::MaxPerWeek { .. } => "max_per_week",
            BookingRuleKind::BlackoutDates { .. } => "blackout_dates",
            BookingRuleKind::AllowedDuration { .. } => "allowed_duration",
            BookingRuleKind::BookingWindow { .. } => "booking_window",
            BookingRuleKind::CancellationPolicy { .. } => "cancellation_policy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRule {
    pub id: Ulid,
    pub priority: i32,
    pub scope: BookingRuleScope,
    pub kind: BookingRuleKind,
    pub active: bool,
}

impl BookingRule {
    pub fn applies_to_user(&self, user_id: Ulid, team_ids: &[Ulid]) -> bool {
        if !self.active {
            return false;
        }
        match &self.scope {
            BookingRuleScope::All => true,
            BookingRuleScope::Users(ids) => ids.contains(&user_id),
            BookingRuleScope::Teams(ids) => ids.iter().any(|t| team_ids.contains(t)),
            BookingRuleScope::MeetingTypes(_) => false,
        }
    }

    pub fn applies_to_meeting_type(&self, meeting_type: Option<&str>) -> bool {
        match (&self.scope, meeting_type) {
            (BookingRuleScope::MeetingTypes(types), Some(mt)) => {
                self.active && types.iter().any(|t| t == mt)
            }
            (BookingRuleScope::MeetingTypes(_), None) => false,
            _ => false,
        }
    }
}

// ── Teams ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentMethod {
    RoundRobin,
    LeastBusy,
    Random,
    Manual,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::RoundRobin => "round_robin",
            AssignmentMethod::LeastBusy => "least_busy",
            AssignmentMethod::Random => "random",
            AssignmentMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "round_robin" => Some(AssignmentMethod::RoundRobin),
            "least_busy" => Some(AssignmentMethod::LeastBusy),
            "random" => Some(AssignmentMethod::Random),
            "manual" => Some(AssignmentMethod::Manual),
            _ => None,
        }
    }
}

/// Team roster and aggregation settings. Member order matters: it drives
/// round-robin succession and least-busy tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSchedule {
    pub id: Ulid,
    pub members: Vec<Ulid>,
    pub assignment_method: AssignmentMethod,
    /// Collective mode requires `min_members_available` members free at once.
    pub collective: bool,
    pub min_members_available: u32,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
    NoShow,
}

impl BookingStatus {
    /// Statuses that occupy the calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rescheduled => "rescheduled",
            BookingStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            "no_show" => Some(BookingStatus::NoShow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub meeting_type: Option<String>,
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub kind: String,
    pub capacity: u32,
    pub location: Option<String>,
    pub cost: Option<f64>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBooking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub booking_id: Ulid,
    pub span: Span,
}

// ── Policies ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnforcementLevel {
    Strict,
    Flexible,
    Advisory,
}

impl EnforcementLevel {
    /// Strict and Flexible block the operation; Advisory only reports.
    pub fn blocks(&self) -> bool {
        matches!(self, EnforcementLevel::Strict | EnforcementLevel::Flexible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementLevel::Strict => "strict",
            EnforcementLevel::Flexible => "flexible",
            EnforcementLevel::Advisory => "advisory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(EnforcementLevel::Strict),
            "flexible" => Some(EnforcementLevel::Flexible),
            "advisory" => Some(EnforcementLevel::Advisory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub id: Ulid,
    pub enforcement: EnforcementLevel,
    pub priority: i32,
    pub active: bool,
}

// ── Per-entity mutable state ─────────────────────────────────────

/// Everything scheduled against one user, guarded by one RwLock.
/// `bookings` stays sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct UserCalendar {
    pub id: Ulid,
    pub bookings: Vec<Booking>,
    pub overrides: Vec<ScheduleOverride>,
    pub patterns: Vec<RecurringPattern>,
}

impl UserCalendar {
    pub fn new(id: Ulid) -> Self {
        Self { id, bookings: Vec::new(), overrides: Vec::new(), patterns: Vec::new() }
    }

    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window. Binary search skips
    /// everything starting at or after `query.end`.
    pub fn overlapping_bookings(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Busy intervals: active bookings overlapping `query`, minus ignored ids.
    pub fn busy_spans(&self, query: &Span, ignore: &[Ulid]) -> Vec<Span> {
        self.overlapping_bookings(query)
            .filter(|b| b.status.is_active() && !ignore.contains(&b.id))
            .map(|b| b.span)
            .collect()
    }

    pub fn overrides_covering(
        &self,
        date: NaiveDate,
    ) -> impl Iterator<Item = &ScheduleOverride> {
        self.overrides.iter().filter(move |o| o.covers(date))
    }

    pub fn pattern_for(&self, date: NaiveDate) -> Option<&RecurringPattern> {
        self.patterns.iter().find(|p| p.applies_to(date))
    }
}

/// Reservation ledger for one resource, guarded by one RwLock. The write
/// lock is the atomicity boundary for check-and-insert.
#[derive(Debug, Clone)]
pub struct ResourceDiary {
    pub resource: Resource,
    pub bookings: Vec<ResourceBooking>,
}

impl ResourceDiary {
    pub fn new(resource: Resource) -> Self {
        Self { resource, bookings: Vec::new() }
    }

    pub fn insert(&mut self, rb: ResourceBooking) {
        let pos = self
            .bookings
            .binary_search_by_key(&rb.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, rb);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<ResourceBooking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn is_free(&self, span: &Span) -> bool {
        let right_bound = self.bookings.partition_point(|b| b.span.start < span.end);
        self.bookings[..right_bound]
            .iter()
            .all(|b| b.span.end <= span.start)
    }
}

// ── Engine defaults ──────────────────────────────────────────────

/// Injected fallbacks for users without templates. Configuration, not
/// hidden constants, so deployments and tests can override them.
#[derive(Debug, Clone)]
pub struct EngineDefaults {
    /// Fallback working window, minutes from midnight.
    pub fallback_start_min: u16,
    pub fallback_end_min: u16,
    /// Weekdays covered by the fallback (Monday=0 .. Sunday=6).
    pub fallback_weekdays: [bool; 7],
    /// Slot stepping granularity.
    pub granularity_min: u16,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            fallback_start_min: 9 * 60,
            fallback_end_min: 17 * 60,
            fallback_weekdays: [true, true, true, true, true, false, false],
            granularity_min: 30,
        }
    }
}

// ── Slots & operation results ────────────────────────────────────

/// A candidate interval of fixed duration. `user_ids` is the sorted set of
/// members free for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: Ms,
    pub end: Ms,
    pub available: bool,
    pub capacity: u32,
    pub user_ids: Vec<Ulid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictType {
    BookingOverlap,
    ScheduleOverride,
    BufferViolation,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::BookingOverlap => "booking_overlap",
            ConflictType::ScheduleOverride => "schedule_override",
            ConflictType::BufferViolation => "buffer_violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDetail {
    pub user_id: Ulid,
    pub conflict_type: ConflictType,
    pub conflicting_id: Option<Ulid>,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedTime {
    pub start: Ms,
    pub end: Ms,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedResource {
    pub resource_id: Ulid,
    pub reservation_id: Ulid,
    pub resource_type: String,
    pub capacity: u32,
    pub location: Option<String>,
    pub cost: Option<f64>,
}

// ── WAL events ───────────────────────────────────────────────────

/// WAL record. One variant per state transition; replay applies them in
/// order to rebuild the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TemplateUpserted { template: AvailabilityTemplate },
    TemplateDeleted { id: Ulid },
    PatternCreated { pattern: RecurringPattern },
    PatternExceptionAdded { id: Ulid, date: NaiveDate },
    PatternDeleted { id: Ulid },
    OverrideCreated { schedule_override: ScheduleOverride },
    OverrideDeleted { id: Ulid },
    BufferRuleUpserted { rule: BufferRule },
    BufferRuleDeleted { id: Ulid },
    BookingRuleUpserted { rule: BookingRule },
    BookingRuleDeleted { id: Ulid },
    TeamUpserted { team: TeamSchedule },
    TeamMemberAdded { team_id: Ulid, user_id: Ulid },
    TeamDeleted { id: Ulid },
    PolicyUpserted { policy: SchedulePolicy },
    PolicyDeleted { id: Ulid },
    BookingCreated { booking: Booking },
    BookingStatusChanged { id: Ulid, status: BookingStatus },
    BookingReassigned { id: Ulid, from_user: Ulid, to_user: Ulid },
    ResourceUpserted { resource: Resource },
    ResourceDeleted { id: Ulid },
    ResourceBooked { reservation: ResourceBooking },
    ResourceReleased { id: Ulid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    fn booking(span: Span, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            span,
            status,
            created_at: 0,
            meeting_type: None,
        }
    }

    #[test]
    fn calendar_booking_ordering() {
        let mut cal = UserCalendar::new(Ulid::new());
        for (start, end) in [(300, 400), (100, 200), (200, 300)] {
            cal.insert_booking(booking(Span::new(start, end), BookingStatus::Confirmed));
        }
        let starts: Vec<_> = cal.bookings.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn calendar_busy_spans_filters_status_and_ignored() {
        let mut cal = UserCalendar::new(Ulid::new());
        let active = booking(Span::new(100, 200), BookingStatus::Pending);
        let active_id = active.id;
        cal.insert_booking(active);
        cal.insert_booking(booking(Span::new(300, 400), BookingStatus::Cancelled));

        let busy = cal.busy_spans(&Span::new(0, 1000), &[]);
        assert_eq!(busy, vec![Span::new(100, 200)]);

        let none = cal.busy_spans(&Span::new(0, 1000), &[active_id]);
        assert!(none.is_empty());
    }

    #[test]
    fn overlapping_bookings_excludes_adjacent() {
        let mut cal = UserCalendar::new(Ulid::new());
        cal.insert_booking(booking(Span::new(100, 200), BookingStatus::Confirmed));
        let hits: Vec<_> = cal.overlapping_bookings(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn diary_is_free_half_open() {
        let resource = Resource {
            id: Ulid::new(),
            kind: "room".into(),
            capacity: 4,
            location: None,
            cost: None,
            active: true,
        };
        let mut diary = ResourceDiary::new(resource);
        diary.insert(ResourceBooking {
            id: Ulid::new(),
            resource_id: diary.resource.id,
            booking_id: Ulid::new(),
            span: Span::new(1000, 2000),
        });
        assert!(!diary.is_free(&Span::new(1500, 2500)));
        assert!(diary.is_free(&Span::new(2000, 3000))); // back-to-back is fine
        assert!(diary.is_free(&Span::new(0, 1000)));
    }

    #[test]
    fn pattern_applies_weekly_and_biweekly() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(); // a Monday
        let mut p = RecurringPattern {
            id: Ulid::new(),
            user_id: Ulid::new(),
            weekday: 0,
            blocks: vec![TimeBlock::new(540, 720)],
            effective_from: from,
            effective_until: None,
            cadence: RepeatCadence::Weekly,
            exceptions: vec![],
            active: true,
        };
        assert!(p.applies_to(from));
        assert!(p.applies_to(from + chrono::Days::new(7)));
        assert!(!p.applies_to(from + chrono::Days::new(1))); // Tuesday

        p.cadence = RepeatCadence::Biweekly;
        assert!(p.applies_to(from));
        assert!(!p.applies_to(from + chrono::Days::new(7)));
        assert!(p.applies_to(from + chrono::Days::new(14)));

        p.exceptions.push(from);
        assert!(!p.applies_to(from));
    }

    #[test]
    fn pattern_respects_date_bounds() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let p = RecurringPattern {
            id: Ulid::new(),
            user_id: Ulid::new(),
            weekday: 0,
            blocks: vec![],
            effective_from: from,
            effective_until: Some(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            cadence: RepeatCadence::Weekly,
            exceptions: vec![],
            active: true,
        };
        assert!(!p.applies_to(from - chrono::Days::new(7)));
        assert!(!p.applies_to(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()));
    }

    #[test]
    fn override_covers_range() {
        let o = ScheduleOverride {
            id: Ulid::new(),
            user_id: Ulid::new(),
            kind: OverrideKind::TimeOff,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
            start_min: None,
            end_min: None,
            all_day: true,
            replacement_user: None,
        };
        assert!(o.covers(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()));
        assert!(!o.covers(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: Booking {
                id: Ulid::new(),
                user_id: Ulid::new(),
                span: Span::new(1000, 2000),
                status: BookingStatus::Pending,
                created_at: 500,
                meeting_type: Some("intro_call".into()),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn weekday_index_monday_zero() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(weekday_index(monday), 0);
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(weekday_index(sunday), 6);
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in ["pending", "confirmed", "completed", "cancelled", "rescheduled", "no_show"] {
            assert_eq!(BookingStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(BookingStatus::parse("held").is_none());
    }
}
