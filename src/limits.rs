use crate::model::{DAY_MS, Ms};

/// Hard caps. Requests beyond these are rejected before touching state.

/// Widest date range a single availability/analytics query may cover.
pub const MAX_QUERY_WINDOW_MS: Ms = 365 * DAY_MS;

/// Longest single booking or proposed meeting.
pub const MAX_SPAN_DURATION_MS: Ms = 30 * DAY_MS;

/// Timestamps past this are treated as garbage input (year ~2100).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Ids accepted in one multi-user / multi-resource request.
pub const MAX_IN_CLAUSE_IDS: usize = 64;

/// Per-user caps keep a single calendar's lock hold times bounded.
pub const MAX_BOOKINGS_PER_USER: usize = 100_000;
pub const MAX_OVERRIDES_PER_USER: usize = 10_000;
pub const MAX_PATTERNS_PER_USER: usize = 1_000;

pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;

pub const MAX_TEMPLATES_PER_TENANT: usize = 10_000;
pub const MAX_RULES_PER_TENANT: usize = 10_000;
pub const MAX_TEAMS_PER_TENANT: usize = 10_000;
pub const MAX_RESOURCES_PER_TENANT: usize = 100_000;
pub const MAX_MEMBERS_PER_TEAM: usize = 1_000;
pub const MAX_BLOCKS_PER_DAY: usize = 48;

pub const MAX_NAME_LEN: usize = 256;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 64;

/// Shortest slot granularity the engine will step by.
pub const MIN_GRANULARITY_MIN: u16 = 5;

/// How far ahead bookings may land when no template says otherwise.
pub const DEFAULT_ADVANCE_BOOKING_DAYS: u16 = 60;
