use ulid::Ulid;

use super::error::EngineError;
use crate::limits::*;
use crate::model::*;

// ── Validation ────────────────────────────────────────────────────

pub fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidRange("start must be before end".into()));
    }
    if span.start < 0 || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidRange("timestamp out of range".into()));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::InvalidRange("span too long".into()));
    }
    Ok(())
}

pub fn validate_query_window(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidRange("start must be before end".into()));
    }
    if span.start < 0 || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidRange("timestamp out of range".into()));
    }
    if span.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::InvalidRange("query window too wide".into()));
    }
    Ok(())
}

// ── Buffer rules ──────────────────────────────────────────────────

/// Effective buffer for one user: max of every applicable rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferWindow {
    pub before_min: u16,
    pub after_min: u16,
}

pub fn combined_buffer(
    rules: &[BufferRule],
    user_id: Ulid,
    team_ids: &[Ulid],
    meeting_type: Option<&str>,
) -> Option<BufferWindow> {
    let mut combined: Option<BufferWindow> = None;
    for rule in rules.iter().filter(|r| r.active) {
        let applies = match &rule.scope {
            RuleScope::All => true,
            RuleScope::User(u) => *u == user_id,
            RuleScope::Team(t) => team_ids.contains(t),
            RuleScope::MeetingType(mt) => meeting_type == Some(mt.as_str()),
        };
        if applies {
            let w = combined.get_or_insert_with(BufferWindow::default);
            w.before_min = w.before_min.max(rule.before_min);
            w.after_min = w.after_min.max(rule.after_min);
        }
    }
    combined
}

// ── Conflict detection ────────────────────────────────────────────

/// All conflicts a proposed meeting would cause on one calendar. Pure and
/// deterministic: the same inputs always produce the same list, in booking
/// order within each category.
pub fn detect_conflicts(
    cal: &UserCalendar,
    proposed: &Span,
    buffer: Option<BufferWindow>,
    check_overrides: bool,
    ignore: &[Ulid],
) -> Vec<ConflictDetail> {
    let mut conflicts = Vec::new();

    for b in cal.overlapping_bookings(proposed) {
        if !b.status.is_active() || ignore.contains(&b.id) {
            continue;
        }
        conflicts.push(ConflictDetail {
            user_id: cal.id,
            conflict_type: ConflictType::BookingOverlap,
            conflicting_id: Some(b.id),
            description: format!(
                "Conflicts with existing booking from {} to {}",
                b.span.start, b.span.end
            ),
            severity: Severity::High,
        });
    }

    if check_overrides {
        if let (Some(first), Some(last)) = (ms_to_date(proposed.start), ms_to_date(proposed.end - 1))
        {
            let mut seen: Vec<Ulid> = Vec::new();
            let mut date = first;
            while date <= last {
                for o in cal.overrides_covering(date) {
                    if o.kind.suppresses() && !seen.contains(&o.id) {
                        seen.push(o.id);
                        conflicts.push(ConflictDetail {
                            user_id: cal.id,
                            conflict_type: ConflictType::ScheduleOverride,
                            conflicting_id: Some(o.id),
                            description: format!("User has {}", o.kind.as_str()),
                            severity: Severity::High,
                        });
                    }
                }
                date = match date.checked_add_days(chrono::Days::new(1)) {
                    Some(d) => d,
                    None => break,
                };
            }
        }
    }

    if let Some(buf) = buffer {
        conflicts.extend(buffer_conflicts(cal, proposed, buf, ignore));
    }

    conflicts
}

/// Buffer violations around a proposed meeting. A neighbouring active
/// booking violates the buffer when it ends inside
/// `(start - after, start]` or starts inside `[end, end + before)`.
/// Overlapping bookings are reported separately as overlaps, not here.
fn buffer_conflicts(
    cal: &UserCalendar,
    proposed: &Span,
    buf: BufferWindow,
    ignore: &[Ulid],
) -> Vec<ConflictDetail> {
    let after_ms = buf.after_min as Ms * MINUTE_MS;
    let before_ms = buf.before_min as Ms * MINUTE_MS;
    // Widen the scan to catch neighbours just outside the proposed span.
    let scan = Span::new(proposed.start - after_ms - 1, proposed.end + before_ms + 1);

    let mut conflicts = Vec::new();
    for b in cal.overlapping_bookings(&scan) {
        if !b.status.is_active() || ignore.contains(&b.id) || b.span.overlaps(proposed) {
            continue;
        }
        if buf.after_min > 0 && b.span.end > proposed.start - after_ms && b.span.end <= proposed.start
        {
            conflicts.push(ConflictDetail {
                user_id: cal.id,
                conflict_type: ConflictType::BufferViolation,
                conflicting_id: Some(b.id),
                description: format!(
                    "Requires {} minute buffer after previous meeting",
                    buf.after_min
                ),
                severity: Severity::Medium,
            });
        }
        if buf.before_min > 0
            && b.span.start >= proposed.end
            && b.span.start < proposed.end + before_ms
        {
            conflicts.push(ConflictDetail {
                user_id: cal.id,
                conflict_type: ConflictType::BufferViolation,
                conflicting_id: Some(b.id),
                description: format!(
                    "Requires {} minute buffer before next meeting",
                    buf.before_min
                ),
                severity: Severity::Medium,
            });
        }
    }
    conflicts
}

/// Static resolution hints grouped by the conflict categories present.
pub fn resolution_hints(conflicts: &[ConflictDetail], requested_users: &[Ulid]) -> Vec<String> {
    if conflicts.is_empty() {
        return Vec::new();
    }
    let mut hints = Vec::new();
    let has = |t: ConflictType| conflicts.iter().any(|c| c.conflict_type == t);

    if has(ConflictType::BookingOverlap) {
        hints.push("Consider rescheduling one of the conflicting bookings".to_string());
        hints.push("Look for alternative time slots with no conflicts".to_string());
        let clear: Vec<String> = requested_users
            .iter()
            .filter(|u| !conflicts.iter().any(|c| c.user_id == **u))
            .map(|u| u.to_string())
            .collect();
        if !clear.is_empty() {
            hints.push(format!("Users available: {}", clear.join(", ")));
        }
    }
    if has(ConflictType::ScheduleOverride) {
        hints.push("Selected time falls during user's time off or blocked period".to_string());
        hints.push("Choose a different date when all users are available".to_string());
    }
    if has(ConflictType::BufferViolation) {
        hints.push("Adjust timing to allow for required buffer between meetings".to_string());
        hints.push("Consider shortening the meeting duration".to_string());
    }
    hints.push("Use the optimal times finder to locate the best available slot".to_string());
    hints
}
