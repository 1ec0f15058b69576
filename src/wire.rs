use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use serde::Serialize;
use tracing::warn;

use crate::auth::SlotdAuthSource;
use crate::engine::{
    now_ms, AvailabilityRequest, ConflictCheckRequest, Engine, OptimalTimesRequest,
};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct SlotdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<SlotdQueryParser>,
}

impl SlotdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(SlotdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn execute(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            // ── Catalog writes ───────────────────────────────────
            Command::InsertTemplate { template } => {
                engine.upsert_template(template).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteTemplate { id } => {
                engine.delete_template(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertBufferRule { rule } => {
                engine.upsert_buffer_rule(rule).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteBufferRule { id } => {
                engine.delete_buffer_rule(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertBookingRule { rule } => {
                engine.upsert_booking_rule(rule).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteBookingRule { id } => {
                engine.delete_booking_rule(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertTeam { team } => {
                engine.upsert_team(team).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::InsertTeamMember { team_id, user_id } => {
                engine.add_team_member(team_id, user_id).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteTeam { id } => {
                engine.delete_team(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertPolicy { policy } => {
                engine.upsert_policy(policy).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeletePolicy { id } => {
                engine.delete_policy(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertResource { resource } => {
                engine.upsert_resource(resource).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteResource { id } => {
                engine.delete_resource(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }

            // ── Calendar writes ──────────────────────────────────
            Command::InsertOverride { schedule_override } => {
                engine.create_override(schedule_override).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteOverride { id } => {
                engine.delete_override(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertPattern { pattern } => {
                engine.create_pattern(pattern).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::InsertPatternException { pattern_id, date } => {
                engine.add_pattern_exception(pattern_id, date).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeletePattern { id } => {
                engine.delete_pattern(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertBooking { mut booking } => {
                let now = now_ms();
                booking.created_at = now;
                let id = booking.id;
                let advisory = engine.create_booking(booking, now).await.map_err(engine_err)?;
                for c in &advisory {
                    // Advisory policy: the insert went through, but the
                    // caller should know what it collided with.
                    warn!(booking = %id, kind = c.conflict_type.as_str(), "{}", c.description);
                }
                Ok(vec![inserted(1)])
            }
            Command::DeleteBooking { id } => {
                // Cancels rather than erases; history stays visible to analytics.
                engine
                    .set_booking_status(id, BookingStatus::Cancelled, now_ms())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::UpdateBookingStatus { id, status } => {
                engine.set_booking_status(id, status, now_ms()).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::UpdateBookingUser { id, user_id } => {
                engine.reassign_booking(id, user_id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertAssignment { team_id, booking_id, start, end, meeting_type } => {
                let assignee = engine
                    .assign_team_member(team_id, booking_id, Span::new(start, end), meeting_type, now_ms())
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(assignment_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&assignee.to_string())?;
                encoder.encode_field(&booking_id.to_string())?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::InsertAllocation { booking_id, start, end, requests, prefs } => {
                let outcome = engine
                    .allocate_resources(booking_id, Span::new(start, end), &requests, &prefs)
                    .await
                    .map_err(engine_err)?;

                // Granted types come back as rows; types with no free
                // candidate come back as `unsatisfied` rows with null ids.
                let schema = Arc::new(allocation_schema());
                let mut rows: Vec<PgWireResult<_>> = Vec::new();
                for a in &outcome.allocated {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&a.reservation_id.to_string())?;
                    encoder.encode_field(&a.resource_id.to_string())?;
                    encoder.encode_field(&a.resource_type)?;
                    encoder.encode_field(&(a.capacity as i32))?;
                    encoder.encode_field(&a.location)?;
                    encoder.encode_field(&a.cost)?;
                    encoder.encode_field(&"allocated")?;
                    rows.push(Ok(encoder.take_row()));
                }
                for t in &outcome.unsatisfied_types {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&None::<String>)?;
                    encoder.encode_field(&None::<String>)?;
                    encoder.encode_field(t)?;
                    encoder.encode_field(&None::<i32>)?;
                    encoder.encode_field(&None::<String>)?;
                    encoder.encode_field(&None::<f64>)?;
                    encoder.encode_field(&"unsatisfied")?;
                    rows.push(Ok(encoder.take_row()));
                }
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::DeleteAllocation { id } => {
                engine.release_reservation(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }

            // ── Availability reads ───────────────────────────────
            Command::SelectAvailability { user_id, start, end, duration_min, template_id, ignore } => {
                let req = AvailabilityRequest {
                    user_id,
                    window: Span::new(start, end),
                    duration_min,
                    template_id,
                    ignore_bookings: ignore,
                };
                let slots = engine.compute_availability(&req, now_ms()).await.map_err(engine_err)?;
                Ok(vec![slot_rows(slots)?])
            }
            Command::SelectTeamAvailability { team_id, start, end, duration_min } => {
                let slots = engine
                    .compute_team_availability(team_id, Span::new(start, end), duration_min, now_ms())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![slot_rows(slots)?])
            }
            Command::SelectCommonAvailability { user_ids, start, end, duration_min, min_attendees } => {
                let min = min_attendees.unwrap_or(user_ids.len());
                let slots = engine
                    .common_availability(&user_ids, Span::new(start, end), duration_min, min, now_ms())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![slot_rows(slots)?])
            }
            Command::SelectOptimalTimes { user_ids, start, end, duration_min, prefs, limit } => {
                let req = OptimalTimesRequest {
                    user_ids,
                    window: Span::new(start, end),
                    duration_min,
                    prefs,
                    limit: limit.unwrap_or(10),
                };
                let suggestions =
                    engine.find_optimal_times(&req, now_ms()).await.map_err(engine_err)?;

                let schema = Arc::new(suggestions_schema());
                let rows: Vec<PgWireResult<_>> = suggestions
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.start)?;
                        encoder.encode_field(&s.end)?;
                        encoder.encode_field(&s.score)?;
                        encoder.encode_field(&s.reasons.join("; "))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectConflicts {
                user_ids,
                start,
                end,
                meeting_type,
                check_buffers,
                check_policies,
                ignore,
            } => {
                let req = ConflictCheckRequest {
                    user_ids,
                    span: Span::new(start, end),
                    meeting_type,
                    check_buffers,
                    check_policies,
                    ignore_bookings: ignore,
                };
                let report = engine.check_conflicts(&req).await.map_err(engine_err)?;

                let schema = Arc::new(conflicts_schema());
                let mut rows: Vec<PgWireResult<_>> = Vec::new();
                for c in &report.conflicts {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&c.user_id.to_string())?;
                    encoder.encode_field(&c.conflict_type.as_str())?;
                    encoder.encode_field(&c.conflicting_id.map(|id| id.to_string()))?;
                    encoder.encode_field(&c.severity.as_str())?;
                    encoder.encode_field(&c.description)?;
                    rows.push(Ok(encoder.take_row()));
                }
                for s in &report.suggestions {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&"")?;
                    encoder.encode_field(&"suggestion")?;
                    encoder.encode_field(&None::<String>)?;
                    encoder.encode_field(&"")?;
                    encoder.encode_field(s)?;
                    rows.push(Ok(encoder.take_row()));
                }
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }

            // ── Analytics reads ──────────────────────────────────
            Command::SelectAnalytics { user_ids, start_date, end_date } => {
                let report = engine
                    .analytics(&user_ids, start_date, end_date)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(analytics_schema());
                let peak = report
                    .peak_hours
                    .iter()
                    .map(|(h, n)| format!("{h:02}:00 ({n})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let days = report
                    .day_distribution
                    .iter()
                    .map(|(d, n)| format!("{d} ({n})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let pairs: Vec<(&str, String)> = vec![
                    ("total_bookings", report.stats.total.to_string()),
                    ("completed", report.stats.completed.to_string()),
                    ("cancelled", report.stats.cancelled.to_string()),
                    ("rescheduled", report.stats.rescheduled.to_string()),
                    ("no_show", report.stats.no_show.to_string()),
                    ("avg_duration_hours", format!("{:.2}", report.stats.avg_duration_hours)),
                    ("avg_lead_days", format!("{:.2}", report.stats.avg_lead_days)),
                    ("utilization_rate", format!("{:.4}", report.utilization.utilization_rate)),
                    ("peak_hours", peak),
                    ("day_distribution", days),
                    ("recommendations", report.recommendations.join("; ")),
                ];
                let rows: Vec<PgWireResult<_>> = pairs
                    .into_iter()
                    .map(|(metric, value)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&metric)?;
                        encoder.encode_field(&value)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectUtilization { user_ids, start_date, end_date } => {
                let u = engine
                    .utilization(&user_ids, start_date, end_date)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(utilization_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&u.total_available_hours)?;
                encoder.encode_field(&u.total_booked_hours)?;
                encoder.encode_field(&u.utilization_rate)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }

            // ── Catalog listings ─────────────────────────────────
            Command::SelectTemplates => {
                catalog_rows(engine.list_templates().into_iter().map(|t| (t.id, t)))
            }
            Command::SelectBufferRules => {
                catalog_rows(engine.list_buffer_rules().into_iter().map(|r| (r.id, r)))
            }
            Command::SelectBookingRules => {
                catalog_rows(engine.list_booking_rules().into_iter().map(|r| (r.id, r)))
            }
            Command::SelectTeams => {
                catalog_rows(engine.list_teams().into_iter().map(|t| (t.id, t)))
            }
            Command::SelectPolicies => {
                catalog_rows(engine.list_policies().into_iter().map(|p| (p.id, p)))
            }
            Command::SelectResources => {
                catalog_rows(engine.list_resources().await.into_iter().map(|r| (r.id, r)))
            }
            Command::SelectOverrides { user_id } => {
                catalog_rows(engine.list_overrides(&user_id).await.into_iter().map(|o| (o.id, o)))
            }
            Command::SelectPatterns { user_id } => {
                catalog_rows(engine.list_patterns(&user_id).await.into_iter().map(|p| (p.id, p)))
            }
            Command::SelectBookings { user_id } => {
                let bookings = engine.list_bookings(&user_id).await;

                let schema = Arc::new(bookings_schema());
                let rows: Vec<PgWireResult<_>> = bookings
                    .into_iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id.to_string())?;
                        encoder.encode_field(&b.user_id.to_string())?;
                        encoder.encode_field(&b.span.start)?;
                        encoder.encode_field(&b.span.end)?;
                        encoder.encode_field(&b.status.as_str())?;
                        encoder.encode_field(&b.meeting_type)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectReservations { resource_id } => {
                let reservations = engine.list_reservations(&resource_id).await;

                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.resource_id.to_string())?;
                        encoder.encode_field(&r.booking_id.to_string())?;
                        encoder.encode_field(&r.span.start)?;
                        encoder.encode_field(&r.span.end)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
        }
    }
}

fn inserted(rows: usize) -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(rows))
}

fn deleted(rows: usize) -> Response {
    Response::Execution(Tag::new("DELETE").with_rows(rows))
}

fn slot_rows(slots: Vec<Slot>) -> PgWireResult<Response> {
    let schema = Arc::new(slots_schema());
    let rows: Vec<PgWireResult<_>> = slots
        .into_iter()
        .map(|slot| {
            let users = slot
                .user_ids
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&users)?;
            encoder.encode_field(&slot.start)?;
            encoder.encode_field(&slot.end)?;
            encoder.encode_field(&(slot.capacity as i32))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

/// Listings come back as (id, json) rows so clients see full records
/// without a column per field.
fn catalog_rows<T: Serialize>(
    items: impl Iterator<Item = (ulid::Ulid, T)>,
) -> PgWireResult<Vec<Response>> {
    let schema = Arc::new(catalog_schema());
    let rows: Vec<PgWireResult<_>> = items
        .map(|(id, item)| {
            let json = serde_json::to_string(&item)
                .map_err(|e| PgWireError::ApiError(Box::new(e)))?;
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&id.to_string())?;
            encoder.encode_field(&json)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
}

// ── Row schemas ──────────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        text_field("user_ids", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("capacity", Type::INT4),
    ]
}

fn suggestions_schema() -> Vec<FieldInfo> {
    vec![
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("score", Type::FLOAT8),
        text_field("reasons", Type::VARCHAR),
    ]
}

fn conflicts_schema() -> Vec<FieldInfo> {
    vec![
        text_field("user_id", Type::VARCHAR),
        text_field("conflict_type", Type::VARCHAR),
        text_field("conflicting_id", Type::VARCHAR),
        text_field("severity", Type::VARCHAR),
        text_field("description", Type::VARCHAR),
    ]
}

fn analytics_schema() -> Vec<FieldInfo> {
    vec![
        text_field("metric", Type::VARCHAR),
        text_field("value", Type::VARCHAR),
    ]
}

fn utilization_schema() -> Vec<FieldInfo> {
    vec![
        text_field("total_available_hours", Type::FLOAT8),
        text_field("total_booked_hours", Type::FLOAT8),
        text_field("utilization_rate", Type::FLOAT8),
    ]
}

fn catalog_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("data", Type::VARCHAR),
    ]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("user_id", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("meeting_type", Type::VARCHAR),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("resource_id", Type::VARCHAR),
        text_field("booking_id", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
    ]
}

fn allocation_schema() -> Vec<FieldInfo> {
    vec![
        text_field("reservation_id", Type::VARCHAR),
        text_field("resource_id", Type::VARCHAR),
        text_field("resource_type", Type::VARCHAR),
        text_field("capacity", Type::INT4),
        text_field("location", Type::VARCHAR),
        text_field("cost", Type::FLOAT8),
        text_field("status", Type::VARCHAR),
    ]
}

/// Result schema by statement shape, for Describe before Execute.
fn result_schema_for(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if upper.contains("INSERT") {
        if upper.contains("ALLOCATIONS") {
            return allocation_schema();
        }
        if upper.contains("ASSIGNMENTS") {
            return assignment_schema();
        }
        return vec![];
    }
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        slots_schema()
    } else if upper.contains("OPTIMAL_TIMES") {
        suggestions_schema()
    } else if upper.contains("CONFLICTS") {
        conflicts_schema()
    } else if upper.contains("ANALYTICS") {
        analytics_schema()
    } else if upper.contains("UTILIZATION") {
        utilization_schema()
    } else if upper.contains("BOOKINGS") {
        bookings_schema()
    } else if upper.contains("RESERVATIONS") {
        reservations_schema()
    } else {
        catalog_schema()
    }
}

fn assignment_schema() -> Vec<FieldInfo> {
    vec![
        text_field("user_id", Type::VARCHAR),
        text_field("booking_id", Type::VARCHAR),
    ]
}

#[async_trait]
impl SimpleQueryHandler for SlotdHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotdQueryParser;

#[async_trait]
impl QueryParser for SlotdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotdHandler {
    type Statement = String;
    type QueryParser = SlotdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema_for(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema_for(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotdFactory {
    handler: Arc<SlotdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<SlotdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = SlotdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SlotdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Drive one client connection through the PostgreSQL protocol.
pub async fn process_connection(
    socket: tokio::net::TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(SlotdFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
