use chrono::{Days, NaiveDate};

use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Resolve the working blocks for one user on one date.
///
/// Precedence: suppressing override > special-hours override > recurring
/// pattern > weekly template > injected fallback hours. A suppressing
/// override (time off, holiday, blocked) wins even when special hours are
/// also present on the date.
pub fn effective_day_blocks(
    cal: &UserCalendar,
    template: Option<&AvailabilityTemplate>,
    defaults: &EngineDefaults,
    date: NaiveDate,
) -> Vec<TimeBlock> {
    let mut special: Option<TimeBlock> = None;
    for o in cal.overrides_covering(date) {
        if o.kind.suppresses() {
            return Vec::new();
        }
        if o.kind == OverrideKind::SpecialHours
            && let (Some(s), Some(e)) = (o.start_min, o.end_min)
            && s < e
        {
            special = Some(TimeBlock::new(s, e));
        }
    }
    if let Some(block) = special {
        return vec![block];
    }

    if let Some(pattern) = cal.pattern_for(date) {
        return pattern.blocks.iter().filter(|b| b.available).copied().collect();
    }

    if let Some(t) = template {
        return t.week[weekday_index(date)]
            .iter()
            .filter(|b| b.available)
            .copied()
            .collect();
    }

    if defaults.fallback_weekdays[weekday_index(date)] {
        vec![TimeBlock::new(defaults.fallback_start_min, defaults.fallback_end_min)]
    } else {
        Vec::new()
    }
}

/// Project minute-of-day blocks onto absolute time for `date`, sorted and
/// merged.
pub fn blocks_to_spans(date: NaiveDate, blocks: &[TimeBlock]) -> Vec<Span> {
    let midnight = date_start_ms(date);
    let mut spans: Vec<Span> = blocks
        .iter()
        .filter(|b| b.start_min < b.end_min)
        .map(|b| {
            Span::new(
                midnight + b.start_min as Ms * MINUTE_MS,
                midnight + b.end_min as Ms * MINUTE_MS,
            )
        })
        .collect();
    spans.sort_by_key(|s| s.start);
    merge_overlapping(&spans)
}

/// Free working time for one user across the query window: per-date block
/// resolution, clamped to the query, minus active bookings.
pub fn user_free_spans(
    cal: &UserCalendar,
    template: Option<&AvailabilityTemplate>,
    defaults: &EngineDefaults,
    query: &Span,
    ignore_bookings: &[ulid::Ulid],
) -> Vec<Span> {
    let Some(first) = ms_to_date(query.start) else {
        return Vec::new();
    };
    let Some(last) = ms_to_date(query.end - 1) else {
        return Vec::new();
    };

    let mut free: Vec<Span> = Vec::new();
    let mut date = first;
    while date <= last {
        let blocks = effective_day_blocks(cal, template, defaults, date);
        for span in blocks_to_spans(date, &blocks) {
            if span.overlaps(query) {
                free.push(Span::new(span.start.max(query.start), span.end.min(query.end)));
            }
        }
        date = match date.checked_add_days(Days::new(1)) {
            Some(d) => d,
            None => break,
        };
    }

    let mut busy = cal.busy_spans(query, ignore_bookings);
    busy.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&busy);
    if busy.is_empty() { free } else { subtract_intervals(&free, &busy) }
}

/// Step fixed-duration candidate slots through free spans. Slots start at
/// `start`, `start + duration`, ... within each span; a slot is emitted only
/// if it fits entirely inside the span.
pub fn slots_from_spans(free: &[Span], duration_ms: Ms) -> Vec<Span> {
    debug_assert!(duration_ms > 0);
    let mut slots = Vec::new();
    for span in free {
        let mut t = span.start;
        while t + duration_ms <= span.end {
            slots.push(Span::new(t, t + duration_ms));
            t += duration_ms;
        }
    }
    slots
}

/// Drop slots outside the bookable window: not before `now + notice`, not
/// after `now + advance days`.
pub fn apply_booking_window(
    slots: Vec<Span>,
    now: Ms,
    minimum_notice_hours: u16,
    advance_booking_days: u16,
) -> Vec<Span> {
    let earliest = now + minimum_notice_hours as Ms * HOUR_MS;
    let latest = now + advance_booking_days as Ms * DAY_MS;
    slots
        .into_iter()
        .filter(|s| s.start >= earliest && s.start <= latest)
        .collect()
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
