use ulid::Ulid;

use crate::model::{AllocatedResource, Resource};

// ── Resource selection ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationPrefs {
    pub location: Option<String>,
    pub max_cost: Option<f64>,
}

/// What an allocation call managed to reserve. Types with no free candidate
/// land in `unsatisfied_types` instead of failing the whole call.
#[derive(Debug, Clone, Default)]
pub struct AllocationOutcome {
    pub allocated: Vec<AllocatedResource>,
    pub unsatisfied_types: Vec<String>,
}

impl AllocationOutcome {
    pub fn fully_satisfied(&self) -> bool {
        self.unsatisfied_types.is_empty()
    }

    /// Combined cost of the granted resources; `None` when nothing priced.
    pub fn total_cost(&self) -> Option<f64> {
        let sum: f64 = self.allocated.iter().filter_map(|a| a.cost).sum();
        (sum > 0.0).then_some(sum)
    }
}

/// Score one candidate resource. Returns None when a required capacity is
/// stated and the resource cannot meet it.
pub fn score_resource(
    resource: &Resource,
    prefs: &AllocationPrefs,
    required_capacity: Option<u32>,
) -> Option<f64> {
    let mut score = 0.0;

    if let Some(needed) = required_capacity {
        if resource.capacity >= needed {
            score += 1.0;
        } else {
            return None;
        }
    }

    if let Some(wanted) = &prefs.location
        && resource.location.as_deref() == Some(wanted.as_str())
    {
        score += 0.5;
    }
    if let Some(max_cost) = prefs.max_cost
        && resource.cost.unwrap_or(0.0) <= max_cost
    {
        score += 0.3;
    }

    // Cheaper resources win ties.
    if let Some(cost) = resource.cost {
        score -= cost / 1000.0;
    }

    Some(score)
}

/// Rank candidates best-first. Ties break on resource id so two engines
/// scoring the same catalog pick the same winner.
pub fn rank_resources<'a>(
    candidates: impl Iterator<Item = &'a Resource>,
    prefs: &AllocationPrefs,
    required_capacity: Option<u32>,
) -> Vec<(f64, Ulid)> {
    let mut scored: Vec<(f64, Ulid)> = candidates
        .filter_map(|r| score_resource(r, prefs, required_capacity).map(|s| (s, r.id)))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
}
