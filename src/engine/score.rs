use crate::model::*;

// ── Slot scoring ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    High,
    /// The no-adjustment tier.
    Medium,
    Low,
}

impl Urgency {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Urgency::High),
            // "normal" kept as an alias for callers predating the tier names.
            "medium" | "normal" => Some(Urgency::Medium),
            "low" => Some(Urgency::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePreference {
    Morning,
    Afternoon,
    Early,
}

impl TimePreference {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "morning" => Some(TimePreference::Morning),
            "afternoon" => Some(TimePreference::Afternoon),
            "early" => Some(TimePreference::Early),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAvoidance {
    Lunch,
    Late,
}

impl TimeAvoidance {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lunch" => Some(TimeAvoidance::Lunch),
            "late" => Some(TimeAvoidance::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringPrefs {
    pub preferred: Vec<TimePreference>,
    pub avoid: Vec<TimeAvoidance>,
    pub urgency: Option<Urgency>,
}

/// Score one candidate start against the fixed preference table.
///
/// Starts from 0.5 and applies additive adjustments for preferred windows,
/// avoided windows, urgency vs. lead time, weekday, and the mid-morning /
/// mid-afternoon sweet spots. The result is clamped to [0, 1]; `reasons`
/// records every adjustment that fired.
pub fn score_slot(start: Ms, now: Ms, prefs: &ScoringPrefs) -> (f64, Vec<String>) {
    let mut score: f64 = 0.5;
    let mut reasons = Vec::new();

    let hour = hour_of(start);
    let weekday = ms_to_date(start).map(weekday_index).unwrap_or(0);

    for pref in &prefs.preferred {
        match pref {
            TimePreference::Morning if (9..12).contains(&hour) => {
                score += 0.15;
                reasons.push("Morning slot (preferred)".to_string());
            }
            TimePreference::Afternoon if (12..17).contains(&hour) => {
                score += 0.15;
                reasons.push("Afternoon slot (preferred)".to_string());
            }
            TimePreference::Early if hour < 10 => {
                score += 0.15;
                reasons.push("Early slot (preferred)".to_string());
            }
            _ => {}
        }
    }

    for avoid in &prefs.avoid {
        match avoid {
            TimeAvoidance::Lunch if (12..13).contains(&hour) => {
                score -= 0.2;
                reasons.push("Lunch hour (avoided)".to_string());
            }
            TimeAvoidance::Late if hour >= 16 => {
                score -= 0.15;
                reasons.push("Late afternoon (avoided)".to_string());
            }
            _ => {}
        }
    }

    if let (Some(slot_date), Some(today)) = (ms_to_date(start), ms_to_date(now)) {
        let days_out = (slot_date - today).num_days();
        match prefs.urgency {
            Some(Urgency::High) if days_out <= 1 => {
                score += 0.25;
                reasons.push("Available soon (high urgency)".to_string());
            }
            Some(Urgency::High) if days_out <= 3 => {
                score += 0.15;
                reasons.push("Available within 3 days".to_string());
            }
            Some(Urgency::Low) if days_out >= 7 => {
                score += 0.1;
                reasons.push("Flexible scheduling".to_string());
            }
            _ => {}
        }
    }

    match weekday {
        1..=3 => {
            score += 0.1;
            reasons.push("Mid-week slot".to_string());
        }
        0 => {
            score += 0.05;
            reasons.push("Start of week".to_string());
        }
        4 => {
            score -= 0.05;
            reasons.push("End of week".to_string());
        }
        _ => {}
    }

    if matches!(hour, 10 | 11 | 14 | 15) {
        score += 0.1;
        reasons.push("Optimal meeting time".to_string());
    }

    (score.clamp(0.0, 1.0), reasons)
}

/// Score candidates and order them best-first. Ties break on earlier start
/// so results are deterministic.
pub fn rank_slots(candidates: &[Span], now: Ms, prefs: &ScoringPrefs) -> Vec<SuggestedTime> {
    let mut ranked: Vec<SuggestedTime> = candidates
        .iter()
        .map(|s| {
            let (score, reasons) = score_slot(s.start, now, prefs);
            SuggestedTime { start: s.start, end: s.end, score, reasons }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.start.cmp(&b.start)));
    ranked
}
