mod allocate;
mod analytics;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod score;
mod team;
#[cfg(test)]
mod tests;

pub use allocate::{AllocationOutcome, AllocationPrefs};
pub use analytics::{AnalyticsReport, Utilization};
pub use conflict::BufferWindow;
pub use error::EngineError;
pub use queries::{AvailabilityRequest, ConflictCheckRequest, ConflictReport, OptimalTimesRequest};
pub use score::{ScoringPrefs, TimeAvoidance, TimePreference, Urgency};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<UserCalendar>>;
pub type SharedDiary = Arc<RwLock<ResourceDiary>>;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// One tenant's scheduling state. Calendars and diaries are the two
/// locked entity kinds; catalogs (templates, rules, teams, policies) are
/// config maps mutated whole-value under the DashMap shard lock.
pub struct Engine {
    pub calendars: DashMap<Ulid, SharedCalendar>,
    pub diaries: DashMap<Ulid, SharedDiary>,
    pub(super) templates: DashMap<Ulid, AvailabilityTemplate>,
    pub(super) buffer_rules: DashMap<Ulid, BufferRule>,
    pub(super) booking_rules: DashMap<Ulid, BookingRule>,
    pub(super) teams: DashMap<Ulid, TeamSchedule>,
    pub(super) policies: DashMap<Ulid, SchedulePolicy>,
    /// Reverse lookups: entity id → owning calendar / diary.
    pub(super) booking_to_user: DashMap<Ulid, Ulid>,
    pub(super) override_to_user: DashMap<Ulid, Ulid>,
    pub(super) pattern_to_user: DashMap<Ulid, Ulid>,
    pub(super) reservation_to_resource: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub defaults: EngineDefaults,
    pub(super) rng: Mutex<SmallRng>,
}

/// Apply a calendar-scoped event (no locking — caller holds the lock).
fn apply_to_calendar(cal: &mut UserCalendar, event: &Event) {
    match event {
        Event::BookingCreated { booking } => {
            cal.insert_booking(booking.clone());
        }
        Event::BookingStatusChanged { id, status } => {
            if let Some(b) = cal.booking_mut(*id) {
                b.status = *status;
            }
        }
        Event::OverrideCreated { schedule_override } => {
            cal.overrides.push(schedule_override.clone());
        }
        Event::OverrideDeleted { id } => {
            cal.overrides.retain(|o| o.id != *id);
        }
        Event::PatternCreated { pattern } => {
            cal.patterns.push(pattern.clone());
        }
        Event::PatternExceptionAdded { id, date } => {
            if let Some(p) = cal.patterns.iter_mut().find(|p| p.id == *id) {
                p.exceptions.push(*date);
            }
        }
        Event::PatternDeleted { id } => {
            cal.patterns.retain(|p| p.id != *id);
        }
        _ => {}
    }
}

/// Apply a diary-scoped event (no locking — caller holds the lock).
fn apply_to_diary(diary: &mut ResourceDiary, event: &Event) {
    match event {
        Event::ResourceUpserted { resource } => {
            diary.resource = resource.clone();
        }
        Event::ResourceBooked { reservation } => {
            diary.insert(*reservation);
        }
        Event::ResourceReleased { id } => {
            diary.remove(*id);
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, defaults: EngineDefaults) -> io::Result<Self> {
        Self::with_seed(wal_path, defaults, None)
    }

    /// `seed` pins the random assignment method for reproducible runs.
    pub fn with_seed(
        wal_path: PathBuf,
        defaults: EngineDefaults,
        seed: Option<u64>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_entropy(),
        };

        let engine = Self {
            calendars: DashMap::new(),
            diaries: DashMap::new(),
            templates: DashMap::new(),
            buffer_rules: DashMap::new(),
            booking_rules: DashMap::new(),
            teams: DashMap::new(),
            policies: DashMap::new(),
            booking_to_user: DashMap::new(),
            override_to_user: DashMap::new(),
            pattern_to_user: DashMap::new(),
            reservation_to_resource: DashMap::new(),
            wal_tx,
            defaults,
            rng: Mutex::new(rng),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this may
        // run inside an async context (e.g. lazy tenant creation).
        for event in &events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::TemplateUpserted { template } => {
                self.templates.insert(template.id, template.clone());
            }
            Event::TemplateDeleted { id } => {
                self.templates.remove(id);
            }
            Event::BufferRuleUpserted { rule } => {
                self.buffer_rules.insert(rule.id, rule.clone());
            }
            Event::BufferRuleDeleted { id } => {
                self.buffer_rules.remove(id);
            }
            Event::BookingRuleUpserted { rule } => {
                self.booking_rules.insert(rule.id, rule.clone());
            }
            Event::BookingRuleDeleted { id } => {
                self.booking_rules.remove(id);
            }
            Event::TeamUpserted { team } => {
                self.teams.insert(team.id, team.clone());
            }
            Event::TeamMemberAdded { team_id, user_id } => {
                if let Some(mut team) = self.teams.get_mut(team_id)
                    && !team.members.contains(user_id)
                {
                    team.members.push(*user_id);
                }
            }
            Event::TeamDeleted { id } => {
                self.teams.remove(id);
            }
            Event::PolicyUpserted { policy } => {
                self.policies.insert(policy.id, policy.clone());
            }
            Event::PolicyDeleted { id } => {
                self.policies.remove(id);
            }
            Event::ResourceUpserted { resource } => {
                let entry = self
                    .diaries
                    .entry(resource.id)
                    .or_insert_with(|| Arc::new(RwLock::new(ResourceDiary::new(resource.clone()))));
                let mut guard = entry.try_write().expect("replay: uncontended write");
                apply_to_diary(&mut guard, event);
            }
            Event::ResourceDeleted { id } => {
                self.diaries.remove(id);
                self.reservation_to_resource.retain(|_, rid| rid != id);
            }
            Event::ResourceBooked { reservation } => {
                if let Some(entry) = self.diaries.get(&reservation.resource_id) {
                    let diary = entry.value().clone();
                    let mut guard = diary.try_write().expect("replay: uncontended write");
                    apply_to_diary(&mut guard, event);
                    self.reservation_to_resource.insert(reservation.id, reservation.resource_id);
                }
            }
            Event::ResourceReleased { id } => {
                if let Some((_, rid)) = self.reservation_to_resource.remove(id)
                    && let Some(entry) = self.diaries.get(&rid)
                {
                    let diary = entry.value().clone();
                    let mut guard = diary.try_write().expect("replay: uncontended write");
                    apply_to_diary(&mut guard, event);
                }
            }
            Event::BookingReassigned { id, from_user, to_user } => {
                let moved = self.calendars.get(from_user).and_then(|entry| {
                    let cal = entry.value().clone();
                    let mut guard = cal.try_write().expect("replay: uncontended write");
                    guard.remove_booking(*id)
                });
                if let Some(mut booking) = moved {
                    booking.user_id = *to_user;
                    let cal = self.ensure_calendar(*to_user);
                    let mut guard = cal.try_write().expect("replay: uncontended write");
                    guard.insert_booking(booking);
                    self.booking_to_user.insert(*id, *to_user);
                }
            }
            Event::BookingCreated { booking } => {
                let cal = self.ensure_calendar(booking.user_id);
                let mut guard = cal.try_write().expect("replay: uncontended write");
                apply_to_calendar(&mut guard, event);
                self.booking_to_user.insert(booking.id, booking.user_id);
            }
            Event::BookingStatusChanged { id, .. } => {
                if let Some(user_id) = self.booking_to_user.get(id).map(|e| *e.value())
                    && let Some(entry) = self.calendars.get(&user_id)
                {
                    let cal = entry.value().clone();
                    let mut guard = cal.try_write().expect("replay: uncontended write");
                    apply_to_calendar(&mut guard, event);
                }
            }
            Event::OverrideCreated { schedule_override } => {
                let cal = self.ensure_calendar(schedule_override.user_id);
                let mut guard = cal.try_write().expect("replay: uncontended write");
                apply_to_calendar(&mut guard, event);
                self.override_to_user.insert(schedule_override.id, schedule_override.user_id);
            }
            Event::OverrideDeleted { id } => {
                if let Some((_, user_id)) = self.override_to_user.remove(id)
                    && let Some(entry) = self.calendars.get(&user_id)
                {
                    let cal = entry.value().clone();
                    let mut guard = cal.try_write().expect("replay: uncontended write");
                    apply_to_calendar(&mut guard, event);
                }
            }
            Event::PatternCreated { pattern } => {
                let cal = self.ensure_calendar(pattern.user_id);
                let mut guard = cal.try_write().expect("replay: uncontended write");
                apply_to_calendar(&mut guard, event);
                self.pattern_to_user.insert(pattern.id, pattern.user_id);
            }
            Event::PatternExceptionAdded { id, .. } | Event::PatternDeleted { id } => {
                if let Some(user_id) = self.pattern_to_user.get(id).map(|e| *e.value())
                    && let Some(entry) = self.calendars.get(&user_id)
                {
                    let cal = entry.value().clone();
                    let mut guard = cal.try_write().expect("replay: uncontended write");
                    apply_to_calendar(&mut guard, event);
                }
                if matches!(event, Event::PatternDeleted { .. }) {
                    self.pattern_to_user.remove(id);
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Calendars exist lazily: any user id is valid and starts empty.
    pub fn ensure_calendar(&self, user_id: Ulid) -> SharedCalendar {
        self.calendars
            .entry(user_id)
            .or_insert_with(|| Arc::new(RwLock::new(UserCalendar::new(user_id))))
            .value()
            .clone()
    }

    pub fn get_calendar(&self, user_id: &Ulid) -> Option<SharedCalendar> {
        self.calendars.get(user_id).map(|e| e.value().clone())
    }

    pub fn get_diary(&self, resource_id: &Ulid) -> Option<SharedDiary> {
        self.diaries.get(resource_id).map(|e| e.value().clone())
    }

    pub fn user_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_user.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply under the caller's calendar write lock.
    pub(super) async fn persist_to_calendar(
        &self,
        cal: &mut UserCalendar,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_calendar(cal, event);
        Ok(())
    }

    /// WAL-append + apply under the caller's diary write lock.
    pub(super) async fn persist_to_diary(
        &self,
        diary: &mut ResourceDiary,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_diary(diary, event);
        Ok(())
    }

    /// WAL-append + apply for catalog events (templates, rules, teams,
    /// policies). The DashMap insert is the apply.
    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.replay_event(event);
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for t in self.templates.iter() {
            events.push(Event::TemplateUpserted { template: t.value().clone() });
        }
        for r in self.buffer_rules.iter() {
            events.push(Event::BufferRuleUpserted { rule: r.value().clone() });
        }
        for r in self.booking_rules.iter() {
            events.push(Event::BookingRuleUpserted { rule: r.value().clone() });
        }
        for t in self.teams.iter() {
            events.push(Event::TeamUpserted { team: t.value().clone() });
        }
        for p in self.policies.iter() {
            events.push(Event::PolicyUpserted { policy: p.value().clone() });
        }

        for entry in self.calendars.iter() {
            let cal = entry.value().clone();
            let guard = match cal.try_read() {
                Ok(g) => g,
                Err(_) => continue, // busy calendar, pick it up next cycle
            };
            for p in &guard.patterns {
                events.push(Event::PatternCreated { pattern: p.clone() });
            }
            for o in &guard.overrides {
                events.push(Event::OverrideCreated { schedule_override: o.clone() });
            }
            for b in &guard.bookings {
                events.push(Event::BookingCreated { booking: b.clone() });
            }
        }

        for entry in self.diaries.iter() {
            let diary = entry.value().clone();
            let guard = match diary.try_read() {
                Ok(g) => g,
                Err(_) => continue,
            };
            events.push(Event::ResourceUpserted { resource: guard.resource.clone() });
            for rb in &guard.bookings {
                events.push(Event::ResourceBooked { reservation: *rb });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
