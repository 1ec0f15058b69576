use std::collections::BTreeMap;

use rand::Rng;
use ulid::Ulid;

use crate::model::*;

// ── Team aggregation ──────────────────────────────────────────────

/// Slots where at least `min_attendees` members are simultaneously free.
///
/// Membership is keyed by exact `(start, end)` identity: members generate
/// slots from the same duration and stepping, so equal slots align exactly.
/// Results are sorted by start; `user_ids` within each slot are sorted for
/// deterministic output.
pub fn common_slots(per_member: &[(Ulid, Vec<Span>)], min_attendees: usize) -> Vec<Slot> {
    if per_member.is_empty() || min_attendees == 0 {
        return Vec::new();
    }
    let mut by_key: BTreeMap<(Ms, Ms), Vec<Ulid>> = BTreeMap::new();
    for (member, slots) in per_member {
        for s in slots {
            by_key.entry((s.start, s.end)).or_default().push(*member);
        }
    }
    by_key
        .into_iter()
        .filter(|(_, members)| members.len() >= min_attendees)
        .map(|((start, end), mut members)| {
            members.sort();
            Slot {
                start,
                end,
                available: true,
                capacity: members.len() as u32,
                user_ids: members,
            }
        })
        .collect()
}

/// Union of every member's slots: each distinct `(start, end)` appears once,
/// carrying all members free for it.
pub fn merge_all(per_member: &[(Ulid, Vec<Span>)]) -> Vec<Slot> {
    common_slots(per_member, 1)
}

// ── Member assignment ─────────────────────────────────────────────

/// Round-robin: the member after the most recently assigned one, wrapping;
/// first member when there is no history or the last assignee left the team.
pub fn round_robin(members: &[Ulid], last_assigned: Option<Ulid>) -> Option<Ulid> {
    let first = *members.first()?;
    match last_assigned.and_then(|last| members.iter().position(|m| *m == last)) {
        Some(idx) => Some(members[(idx + 1) % members.len()]),
        None => Some(first),
    }
}

/// The member with the fewest bookings in the comparison window. Members
/// absent from `counts` count as zero; ties resolve to the earliest member
/// in roster order.
pub fn least_busy(members: &[Ulid], counts: &BTreeMap<Ulid, usize>) -> Option<Ulid> {
    members
        .iter()
        .min_by_key(|m| counts.get(*m).copied().unwrap_or(0))
        .copied()
}

pub fn random_member(members: &[Ulid], rng: &mut impl Rng) -> Option<Ulid> {
    if members.is_empty() {
        return None;
    }
    Some(members[rng.gen_range(0..members.len())])
}

/// Dispatch on the team's assignment method. `Manual` falls back to the
/// first member, matching callers that expect a suggestion even when the
/// final pick is made by a human.
pub fn select_member(
    team: &TeamSchedule,
    last_assigned: Option<Ulid>,
    counts: &BTreeMap<Ulid, usize>,
    rng: &mut impl Rng,
) -> Option<Ulid> {
    match team.assignment_method {
        AssignmentMethod::RoundRobin => round_robin(&team.members, last_assigned),
        AssignmentMethod::LeastBusy => least_busy(&team.members, counts),
        AssignmentMethod::Random => random_member(&team.members, rng),
        AssignmentMethod::Manual => team.members.first().copied(),
    }
}
