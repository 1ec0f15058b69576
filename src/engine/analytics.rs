use chrono::{Datelike, Days, NaiveDate};

use crate::model::*;

// ── Analytics ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingStats {
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub rescheduled: usize,
    pub no_show: usize,
    pub avg_duration_hours: f64,
    pub avg_lead_days: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Utilization {
    pub total_available_hours: f64,
    pub total_booked_hours: f64,
    pub utilization_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsReport {
    pub stats: BookingStats,
    pub utilization: Utilization,
    /// (hour of day, booking count), busiest first, at most five entries.
    pub peak_hours: Vec<(u32, usize)>,
    /// (weekday name, booking count), busiest first.
    pub day_distribution: Vec<(String, usize)>,
    pub recommendations: Vec<String>,
}

pub fn booking_stats<'a>(bookings: impl Iterator<Item = &'a Booking> + Clone) -> BookingStats {
    let mut stats = BookingStats::default();
    let mut duration_sum = 0.0;
    let mut lead_sum = 0.0;
    for b in bookings {
        stats.total += 1;
        match b.status {
            BookingStatus::Completed => stats.completed += 1,
            BookingStatus::Cancelled => stats.cancelled += 1,
            BookingStatus::Rescheduled => stats.rescheduled += 1,
            BookingStatus::NoShow => stats.no_show += 1,
            _ => {}
        }
        duration_sum += b.span.duration_ms() as f64 / HOUR_MS as f64;
        lead_sum += (b.span.start - b.created_at) as f64 / DAY_MS as f64;
    }
    if stats.total > 0 {
        stats.avg_duration_hours = duration_sum / stats.total as f64;
        stats.avg_lead_days = lead_sum / stats.total as f64;
    }
    stats
}

/// Booked hours against an 8-hour-weekday capacity baseline, capped at 100%.
/// Cancelled bookings do not count as booked time.
pub fn utilization<'a>(
    bookings: impl Iterator<Item = &'a Booking>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Utilization {
    let mut weekdays = 0u32;
    let mut date = start_date;
    while date <= end_date {
        if weekday_index(date) < 5 {
            weekdays += 1;
        }
        date = match date.checked_add_days(Days::new(1)) {
            Some(d) => d,
            None => break,
        };
    }
    let total_available_hours = weekdays as f64 * 8.0;

    let total_booked_hours: f64 = bookings
        .filter(|b| b.status != BookingStatus::Cancelled)
        .map(|b| b.span.duration_ms() as f64 / HOUR_MS as f64)
        .sum();

    let rate = if total_available_hours > 0.0 {
        (total_booked_hours / total_available_hours).min(1.0)
    } else {
        0.0
    };
    Utilization {
        total_available_hours,
        total_booked_hours,
        utilization_rate: rate,
    }
}

/// Top five busiest hours of day. Ties break on earlier hour.
pub fn peak_hours<'a>(bookings: impl Iterator<Item = &'a Booking>) -> Vec<(u32, usize)> {
    let mut counts = [0usize; 24];
    for b in bookings {
        counts[hour_of(b.span.start) as usize % 24] += 1;
    }
    let mut ranked: Vec<(u32, usize)> = counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .map(|(h, c)| (h as u32, *c))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(5);
    ranked
}

/// Bookings per weekday name, busiest first. Ties break on week order.
pub fn day_distribution<'a>(bookings: impl Iterator<Item = &'a Booking>) -> Vec<(String, usize)> {
    const NAMES: [&str; 7] =
        ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];
    let mut counts = [0usize; 7];
    for b in bookings {
        if let Some(date) = ms_to_date(b.span.start) {
            counts[date.weekday().num_days_from_monday() as usize] += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .map(|(d, c)| (NAMES[d].to_string(), *c))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// Threshold-driven optimization suggestions. The most severe band in each
/// category is checked first so escalations are not shadowed by milder ones.
pub fn recommendations(
    stats: &BookingStats,
    util: &Utilization,
    peaks: &[(u32, usize)],
) -> Vec<String> {
    let mut recs = Vec::new();

    if util.utilization_rate > 0.95 {
        recs.push("Over-utilized - urgent need for additional resources".to_string());
        recs.push("Consider raising prices to manage demand".to_string());
    } else if util.utilization_rate > 0.85 {
        recs.push("High utilization - consider adding capacity or staff".to_string());
        recs.push("Risk of burnout - monitor team wellbeing".to_string());
    } else if util.utilization_rate < 0.3 {
        recs.push("Very low utilization - consider promotional campaigns or review pricing".to_string());
        recs.push("Analyze why bookings are low and address potential barriers".to_string());
    } else if util.utilization_rate < 0.5 {
        recs.push("Below-target utilization - increase marketing efforts".to_string());
        recs.push("Consider offering promotions during slow periods".to_string());
    }

    if stats.total > 0 {
        let cancel_rate = stats.cancelled as f64 / stats.total as f64;
        if cancel_rate > 0.3 {
            recs.push("Critical cancellation rate - investigate root causes immediately".to_string());
        } else if cancel_rate > 0.2 {
            recs.push("High cancellation rate - implement confirmation reminders".to_string());
            recs.push("Consider requiring deposits or implementing cancellation fees".to_string());
        }

        let no_show_rate = stats.no_show as f64 / stats.total as f64;
        if no_show_rate > 0.1 {
            recs.push("Significant no-shows - implement SMS reminders".to_string());
            recs.push("Consider overbooking strategy or waitlist system".to_string());
        }
    }

    if let Some((peak, _)) = peaks.first() {
        recs.push(format!("Peak demand at {peak}:00 - ensure maximum availability"));
        if peaks.len() > 1 {
            let secondary: Vec<String> =
                peaks[1..peaks.len().min(3)].iter().map(|(h, _)| h.to_string()).collect();
            recs.push(format!("Secondary peaks at {}:00", secondary.join(", ")));
        }
    }

    if stats.total > 0 {
        if stats.avg_lead_days < 1.0 {
            recs.push("Very short lead times - customers booking last minute".to_string());
            recs.push("Consider instant booking confirmations".to_string());
        } else if stats.avg_lead_days > 14.0 {
            recs.push("Long lead times - enable advance booking incentives".to_string());
        }

        if stats.avg_duration_hours < 0.5 {
            recs.push("Short meetings - consider grouping or minimum durations".to_string());
        } else if stats.avg_duration_hours > 2.0 {
            recs.push("Long meetings - ensure adequate breaks between bookings".to_string());
        }
    }

    recs
}

pub fn analyze(bookings: &[Booking], start_date: NaiveDate, end_date: NaiveDate) -> AnalyticsReport {
    let stats = booking_stats(bookings.iter());
    let util = utilization(bookings.iter(), start_date, end_date);
    let peaks = peak_hours(bookings.iter());
    let days = day_distribution(bookings.iter());
    let recs = recommendations(&stats, &util, &peaks);
    AnalyticsReport {
        stats,
        utilization: util,
        peak_hours: peaks,
        day_distribution: days,
        recommendations: recs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn booking_at(date: NaiveDate, hour: u32, hours: i64, status: BookingStatus) -> Booking {
        let start = date_start_ms(date) + hour as Ms * HOUR_MS;
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            span: Span::new(start, start + hours * HOUR_MS),
            status,
            created_at: start - 2 * DAY_MS,
            meeting_type: None,
        }
    }

    fn week_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() // Monday
    }

    #[test]
    fn utilization_counts_weekdays_only() {
        let monday = week_start();
        let sunday = monday + Days::new(6);
        let bookings = vec![
            booking_at(monday, 9, 4, BookingStatus::Completed),
            booking_at(monday + Days::new(1), 9, 4, BookingStatus::Confirmed),
            booking_at(monday + Days::new(2), 9, 4, BookingStatus::Cancelled), // excluded
        ];
        let util = utilization(bookings.iter(), monday, sunday);
        assert_eq!(util.total_available_hours, 40.0); // 5 weekdays * 8h
        assert_eq!(util.total_booked_hours, 8.0);
        assert!((util.utilization_rate - 0.2).abs() < 1e-9);
    }

    #[test]
    fn utilization_rate_caps_at_one() {
        let monday = week_start();
        let bookings: Vec<Booking> =
            (0..3).map(|_| booking_at(monday, 0, 20, BookingStatus::Confirmed)).collect();
        let util = utilization(bookings.iter(), monday, monday);
        assert_eq!(util.utilization_rate, 1.0);
    }

    #[test]
    fn stats_bucket_by_status() {
        let monday = week_start();
        let bookings = vec![
            booking_at(monday, 9, 1, BookingStatus::Completed),
            booking_at(monday, 10, 1, BookingStatus::Cancelled),
            booking_at(monday, 11, 2, BookingStatus::NoShow),
            booking_at(monday, 13, 2, BookingStatus::Confirmed),
        ];
        let stats = booking_stats(bookings.iter());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.no_show, 1);
        assert!((stats.avg_duration_hours - 1.5).abs() < 1e-9);
        assert!((stats.avg_lead_days - 2.0).abs() < 1e-9);
    }

    #[test]
    fn peak_hours_top_five_busiest_first() {
        let monday = week_start();
        let mut bookings = Vec::new();
        for _ in 0..3 {
            bookings.push(booking_at(monday, 10, 1, BookingStatus::Confirmed));
        }
        for _ in 0..2 {
            bookings.push(booking_at(monday, 14, 1, BookingStatus::Confirmed));
        }
        for h in [8, 9, 11, 13, 15, 16] {
            bookings.push(booking_at(monday, h, 1, BookingStatus::Confirmed));
        }
        let peaks = peak_hours(bookings.iter());
        assert_eq!(peaks.len(), 5);
        assert_eq!(peaks[0], (10, 3));
        assert_eq!(peaks[1], (14, 2));
        assert_eq!(peaks[2].1, 1);
    }

    #[test]
    fn day_distribution_names_weekdays() {
        let monday = week_start();
        let bookings = vec![
            booking_at(monday, 9, 1, BookingStatus::Confirmed),
            booking_at(monday, 11, 1, BookingStatus::Confirmed),
            booking_at(monday + Days::new(3), 9, 1, BookingStatus::Confirmed),
        ];
        let days = day_distribution(bookings.iter());
        assert_eq!(days[0], ("Monday".to_string(), 2));
        assert_eq!(days[1], ("Thursday".to_string(), 1));
    }

    #[test]
    fn recommendation_bands_do_not_shadow() {
        let over = Utilization {
            total_available_hours: 40.0,
            total_booked_hours: 39.0,
            utilization_rate: 0.975,
        };
        let recs = recommendations(&BookingStats::default(), &over, &[]);
        assert!(recs.iter().any(|r| r.contains("Over-utilized")));
        assert!(!recs.iter().any(|r| r.contains("High utilization")));

        let mut stats = BookingStats::default();
        stats.total = 10;
        stats.cancelled = 4; // 40% cancel rate
        stats.avg_duration_hours = 1.0;
        stats.avg_lead_days = 3.0;
        let normal = Utilization {
            total_available_hours: 40.0,
            total_booked_hours: 24.0,
            utilization_rate: 0.6,
        };
        let recs = recommendations(&stats, &normal, &[]);
        assert!(recs.iter().any(|r| r.contains("Critical cancellation rate")));
        assert!(!recs.iter().any(|r| r.contains("High cancellation rate")));
    }

    #[test]
    fn peak_recommendation_names_hours() {
        let util = Utilization {
            total_available_hours: 40.0,
            total_booked_hours: 24.0,
            utilization_rate: 0.6,
        };
        let mut stats = BookingStats::default();
        stats.total = 1;
        stats.avg_duration_hours = 1.0;
        stats.avg_lead_days = 3.0;
        let recs = recommendations(&stats, &util, &[(10, 5), (14, 3), (9, 2)]);
        assert!(recs.iter().any(|r| r.contains("Peak demand at 10:00")));
        assert!(recs.iter().any(|r| r.contains("Secondary peaks at 14, 9:00")));
    }
}
