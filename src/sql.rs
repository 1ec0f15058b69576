use chrono::NaiveDate;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{AllocationPrefs, ScoringPrefs, TimeAvoidance, TimePreference, Urgency};
use crate::model::*;

/// Parsed command from SQL input. Write commands carry fully built model
/// values; read commands carry the filters of the virtual relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InsertTemplate { template: AvailabilityTemplate },
    DeleteTemplate { id: Ulid },
    InsertPattern { pattern: RecurringPattern },
    InsertPatternException { pattern_id: Ulid, date: NaiveDate },
    DeletePattern { id: Ulid },
    InsertOverride { schedule_override: ScheduleOverride },
    DeleteOverride { id: Ulid },
    InsertBufferRule { rule: BufferRule },
    DeleteBufferRule { id: Ulid },
    InsertBookingRule { rule: BookingRule },
    DeleteBookingRule { id: Ulid },
    InsertTeam { team: TeamSchedule },
    InsertTeamMember { team_id: Ulid, user_id: Ulid },
    DeleteTeam { id: Ulid },
    InsertPolicy { policy: SchedulePolicy },
    DeletePolicy { id: Ulid },
    InsertResource { resource: Resource },
    DeleteResource { id: Ulid },
    InsertBooking { booking: Booking },
    DeleteBooking { id: Ulid },
    UpdateBookingStatus { id: Ulid, status: BookingStatus },
    UpdateBookingUser { id: Ulid, user_id: Ulid },
    InsertAssignment { team_id: Ulid, booking_id: Ulid, start: Ms, end: Ms, meeting_type: Option<String> },
    InsertAllocation {
        booking_id: Ulid,
        start: Ms,
        end: Ms,
        requests: Vec<(String, Option<u32>)>,
        prefs: AllocationPrefs,
    },
    DeleteAllocation { id: Ulid },
    SelectAvailability {
        user_id: Ulid,
        start: Ms,
        end: Ms,
        duration_min: Option<u16>,
        template_id: Option<Ulid>,
        ignore: Vec<Ulid>,
    },
    SelectTeamAvailability { team_id: Ulid, start: Ms, end: Ms, duration_min: Option<u16> },
    SelectCommonAvailability {
        user_ids: Vec<Ulid>,
        start: Ms,
        end: Ms,
        duration_min: Option<u16>,
        min_attendees: Option<usize>,
    },
    SelectOptimalTimes {
        user_ids: Vec<Ulid>,
        start: Ms,
        end: Ms,
        duration_min: u16,
        prefs: ScoringPrefs,
        limit: Option<usize>,
    },
    SelectConflicts {
        user_ids: Vec<Ulid>,
        start: Ms,
        end: Ms,
        meeting_type: Option<String>,
        check_buffers: bool,
        check_policies: bool,
        ignore: Vec<Ulid>,
    },
    SelectAnalytics { user_ids: Vec<Ulid>, start_date: NaiveDate, end_date: NaiveDate },
    SelectUtilization { user_ids: Vec<Ulid>, start_date: NaiveDate, end_date: NaiveDate },
    SelectTemplates,
    SelectBufferRules,
    SelectBookingRules,
    SelectTeams,
    SelectPolicies,
    SelectResources,
    SelectBookings { user_id: Ulid },
    SelectOverrides { user_id: Ulid },
    SelectPatterns { user_id: Ulid },
    SelectReservations { resource_id: Ulid },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// Column name → VALUES expression, in declared order. All inserts use
/// named column lists; positional inserts are rejected.
struct Row<'a> {
    table: &'static str,
    cols: Vec<(String, &'a Expr)>,
}

impl<'a> Row<'a> {
    fn get(&self, name: &str) -> Option<&'a Expr> {
        self.cols.iter().find(|(c, _)| c == name).map(|(_, e)| *e)
    }

    fn required(&self, name: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(name).ok_or(SqlError::MissingColumn(self.table, name))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_insert_rows(insert)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    if insert.columns.is_empty() {
        return Err(SqlError::Parse("INSERT requires a column list".into()));
    }
    if insert.columns.len() != rows[0].len() {
        return Err(SqlError::Parse(format!(
            "{} columns but {} values",
            insert.columns.len(),
            rows[0].len()
        )));
    }

    let leaked: &'static str = match table.as_str() {
        "templates" => "templates",
        "recurring_patterns" => "recurring_patterns",
        "pattern_exceptions" => "pattern_exceptions",
        "schedule_overrides" => "schedule_overrides",
        "buffer_rules" => "buffer_rules",
        "booking_rules" => "booking_rules",
        "team_schedules" => "team_schedules",
        "team_members" => "team_members",
        "schedule_policies" => "schedule_policies",
        "resources" => "resources",
        "bookings" => "bookings",
        "assignments" => "assignments",
        "allocations" => "allocations",
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let row = Row {
        table: leaked,
        cols: insert
            .columns
            .iter()
            .map(|c| c.value.to_lowercase())
            .zip(rows[0].iter())
            .collect(),
    };

    match leaked {
        "templates" => insert_template(&row),
        "recurring_patterns" => insert_pattern(&row),
        "pattern_exceptions" => Ok(Command::InsertPatternException {
            pattern_id: parse_ulid(row.required("pattern_id")?)?,
            date: parse_date(row.required("date")?)?,
        }),
        "schedule_overrides" => insert_override(&row),
        "buffer_rules" => insert_buffer_rule(&row),
        "booking_rules" => insert_booking_rule(&row),
        "team_schedules" => insert_team(&row),
        "team_members" => Ok(Command::InsertTeamMember {
            team_id: parse_ulid(row.required("team_id")?)?,
            user_id: parse_ulid(row.required("user_id")?)?,
        }),
        "schedule_policies" => insert_policy(&row),
        "resources" => insert_resource(&row),
        "bookings" => insert_booking(&row),
        "assignments" => Ok(Command::InsertAssignment {
            team_id: parse_ulid(row.required("team_id")?)?,
            booking_id: parse_ulid(row.required("booking_id")?)?,
            start: parse_i64(row.required("start")?)?,
            end: parse_i64(row.required("end")?)?,
            meeting_type: opt_string(&row, "meeting_type")?,
        }),
        "allocations" => insert_allocation(&row),
        _ => unreachable!(),
    }
}

fn insert_template(row: &Row) -> Result<Command, SqlError> {
    let owner = match (row.get("owner_user"), row.get("owner_team")) {
        (Some(e), None) => TemplateOwner::User(parse_ulid(e)?),
        (None, Some(e)) => TemplateOwner::Team(parse_ulid(e)?),
        _ => return Err(SqlError::Parse("exactly one of owner_user, owner_team".into())),
    };
    let week: [Vec<TimeBlock>; 7] = parse_json(row.required("week")?)?;
    let mut template = AvailabilityTemplate::new(parse_ulid(row.required("id")?)?, owner);
    template.week = week;
    if let Some(e) = row.get("slot_duration_min") {
        template.slot_duration_min = parse_u16(e)?;
    }
    if let Some(e) = row.get("advance_booking_days") {
        template.advance_booking_days = parse_u16(e)?;
    }
    if let Some(e) = row.get("minimum_notice_hours") {
        template.minimum_notice_hours = parse_u16(e)?;
    }
    if let Some(e) = row.get("is_default") {
        template.is_default = parse_bool(e)?;
    }
    if let Some(e) = row.get("active") {
        template.active = parse_bool(e)?;
    }
    Ok(Command::InsertTemplate { template })
}

fn insert_pattern(row: &Row) -> Result<Command, SqlError> {
    let cadence = match row.get("cadence") {
        Some(e) => {
            let s = parse_string(e)?;
            RepeatCadence::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad cadence: {s}")))?
        }
        None => RepeatCadence::Weekly,
    };
    Ok(Command::InsertPattern {
        pattern: RecurringPattern {
            id: parse_ulid(row.required("id")?)?,
            user_id: parse_ulid(row.required("user_id")?)?,
            weekday: parse_u16(row.required("weekday")?)? as u8,
            blocks: parse_json(row.required("blocks")?)?,
            effective_from: parse_date(row.required("effective_from")?)?,
            effective_until: opt_date(row, "effective_until")?,
            cadence,
            exceptions: Vec::new(),
            active: opt_bool(row, "active")?.unwrap_or(true),
        },
    })
}

fn insert_override(row: &Row) -> Result<Command, SqlError> {
    let kind_s = parse_string(row.required("kind")?)?;
    let kind = OverrideKind::parse(&kind_s)
        .ok_or_else(|| SqlError::Parse(format!("bad override kind: {kind_s}")))?;
    Ok(Command::InsertOverride {
        schedule_override: ScheduleOverride {
            id: parse_ulid(row.required("id")?)?,
            user_id: parse_ulid(row.required("user_id")?)?,
            kind,
            start_date: parse_date(row.required("start_date")?)?,
            end_date: parse_date(row.required("end_date")?)?,
            start_min: opt_u16(row, "start_min")?,
            end_min: opt_u16(row, "end_min")?,
            all_day: opt_bool(row, "all_day")?.unwrap_or(true),
            replacement_user: opt_ulid(row, "replacement_user")?,
        },
    })
}

fn insert_buffer_rule(row: &Row) -> Result<Command, SqlError> {
    let scope = match parse_string(row.required("scope")?)?.as_str() {
        "all" => RuleScope::All,
        "user" => RuleScope::User(parse_ulid(row.required("scope_id")?)?),
        "team" => RuleScope::Team(parse_ulid(row.required("scope_id")?)?),
        "meeting_type" => RuleScope::MeetingType(parse_string(row.required("scope_value")?)?),
        other => return Err(SqlError::Parse(format!("bad scope: {other}"))),
    };
    Ok(Command::InsertBufferRule {
        rule: BufferRule {
            id: parse_ulid(row.required("id")?)?,
            scope,
            before_min: opt_u16(row, "before_min")?.unwrap_or(0),
            after_min: opt_u16(row, "after_min")?.unwrap_or(0),
            active: opt_bool(row, "active")?.unwrap_or(true),
        },
    })
}

fn insert_booking_rule(row: &Row) -> Result<Command, SqlError> {
    let scope = match row.get("scope") {
        None => BookingRuleScope::All,
        Some(e) => match parse_string(e)?.as_str() {
            "all" => BookingRuleScope::All,
            "users" => BookingRuleScope::Users(parse_json(row.required("scope_ids")?)?),
            "teams" => BookingRuleScope::Teams(parse_json(row.required("scope_ids")?)?),
            "meeting_types" => {
                BookingRuleScope::MeetingTypes(parse_json(row.required("scope_values")?)?)
            }
            other => return Err(SqlError::Parse(format!("bad scope: {other}"))),
        },
    };
    let rule_type = parse_string(row.required("rule_type")?)?;
    let kind = match rule_type.as_str() {
        "min_notice" => BookingRuleKind::MinNotice { hours: parse_u32(row.required("hours")?)? },
        "max_per_day" => BookingRuleKind::MaxPerDay { count: parse_u32(row.required("count")?)? },
        "max_per_week" => BookingRuleKind::MaxPerWeek { count: parse_u32(row.required("count")?)? },
        "blackout_dates" => {
            BookingRuleKind::BlackoutDates { dates: parse_json(row.required("dates")?)? }
        }
        "allowed_duration" => {
            BookingRuleKind::AllowedDuration { minutes: parse_json(row.required("minutes")?)? }
        }
        "booking_window" => BookingRuleKind::BookingWindow {
            min_days: parse_u32(row.required("min_days")?)?,
            max_days: parse_u32(row.required("max_days")?)?,
        },
        "cancellation_policy" => {
            BookingRuleKind::CancellationPolicy { min_hours: parse_u32(row.required("hours")?)? }
        }
        other => return Err(SqlError::Parse(format!("bad rule_type: {other}"))),
    };
    Ok(Command::InsertBookingRule {
        rule: BookingRule {
            id: parse_ulid(row.required("id")?)?,
            priority: opt_i64(row, "priority")?.unwrap_or(0) as i32,
            scope,
            kind,
            active: opt_bool(row, "active")?.unwrap_or(true),
        },
    })
}

fn insert_team(row: &Row) -> Result<Command, SqlError> {
    let method_s = parse_string(row.required("assignment_method")?)?;
    let assignment_method = AssignmentMethod::parse(&method_s)
        .ok_or_else(|| SqlError::Parse(format!("bad assignment method: {method_s}")))?;
    Ok(Command::InsertTeam {
        team: TeamSchedule {
            id: parse_ulid(row.required("id")?)?,
            members: parse_json(row.required("members")?)?,
            assignment_method,
            collective: opt_bool(row, "collective")?.unwrap_or(false),
            min_members_available: opt_i64(row, "min_members_available")?.unwrap_or(1) as u32,
        },
    })
}

fn insert_policy(row: &Row) -> Result<Command, SqlError> {
    let level_s = parse_string(row.required("enforcement")?)?;
    let enforcement = EnforcementLevel::parse(&level_s)
        .ok_or_else(|| SqlError::Parse(format!("bad enforcement level: {level_s}")))?;
    Ok(Command::InsertPolicy {
        policy: SchedulePolicy {
            id: parse_ulid(row.required("id")?)?,
            enforcement,
            priority: opt_i64(row, "priority")?.unwrap_or(0) as i32,
            active: opt_bool(row, "active")?.unwrap_or(true),
        },
    })
}

fn insert_resource(row: &Row) -> Result<Command, SqlError> {
    Ok(Command::InsertResource {
        resource: Resource {
            id: parse_ulid(row.required("id")?)?,
            kind: parse_string(row.required("resource_type")?)?,
            capacity: opt_i64(row, "capacity")?.unwrap_or(1) as u32,
            location: opt_string(row, "location")?,
            cost: opt_f64(row, "cost")?,
            active: opt_bool(row, "active")?.unwrap_or(true),
        },
    })
}

fn insert_booking(row: &Row) -> Result<Command, SqlError> {
    let status = match row.get("status") {
        Some(e) => {
            let s = parse_string(e)?;
            BookingStatus::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))?
        }
        None => BookingStatus::Confirmed,
    };
    let start = parse_i64(row.required("start")?)?;
    let end = parse_i64(row.required("end")?)?;
    Ok(Command::InsertBooking {
        booking: Booking {
            id: parse_ulid(row.required("id")?)?,
            user_id: parse_ulid(row.required("user_id")?)?,
            span: Span::new(start, end),
            status,
            created_at: 0, // stamped by the handler
            meeting_type: opt_string(row, "meeting_type")?,
        },
    })
}

fn insert_allocation(row: &Row) -> Result<Command, SqlError> {
    // resource_types is either a JSON array of strings or of
    // [type, capacity] pairs.
    let raw: serde_json::Value = parse_json(row.required("resource_types")?)?;
    let mut requests = Vec::new();
    let items = raw.as_array().ok_or_else(|| SqlError::Parse("resource_types: array".into()))?;
    for item in items {
        match item {
            serde_json::Value::String(s) => requests.push((s.clone(), None)),
            serde_json::Value::Array(pair) if pair.len() == 2 => {
                let t = pair[0]
                    .as_str()
                    .ok_or_else(|| SqlError::Parse("resource_types: type".into()))?;
                let c = pair[1]
                    .as_u64()
                    .ok_or_else(|| SqlError::Parse("resource_types: capacity".into()))?;
                requests.push((t.to_string(), Some(c as u32)));
            }
            _ => return Err(SqlError::Parse("resource_types: bad entry".into())),
        }
    }
    Ok(Command::InsertAllocation {
        booking_id: parse_ulid(row.required("booking_id")?)?,
        start: parse_i64(row.required("start")?)?,
        end: parse_i64(row.required("end")?)?,
        requests,
        prefs: AllocationPrefs {
            location: opt_string(row, "location")?,
            max_cost: opt_f64(row, "max_cost")?,
        },
    })
}

// ── DELETE / UPDATE ───────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "templates" => Ok(Command::DeleteTemplate { id }),
        "recurring_patterns" => Ok(Command::DeletePattern { id }),
        "schedule_overrides" => Ok(Command::DeleteOverride { id }),
        "buffer_rules" => Ok(Command::DeleteBufferRule { id }),
        "booking_rules" => Ok(Command::DeleteBookingRule { id }),
        "team_schedules" => Ok(Command::DeleteTeam { id }),
        "schedule_policies" => Ok(Command::DeletePolicy { id }),
        "resources" => Ok(Command::DeleteResource { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        "allocations" => Ok(Command::DeleteAllocation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "bookings" {
        return Err(SqlError::UnknownTable(name));
    }
    if assignments.len() != 1 {
        return Err(SqlError::Unsupported("multi-column UPDATE".into()));
    }
    let id = extract_where_id(selection)?;
    let assignment = &assignments[0];
    let col = match &assignment.target {
        ast::AssignmentTarget::ColumnName(n) => {
            object_name_last(n).ok_or_else(|| SqlError::Parse("empty column".into()))?
        }
        _ => return Err(SqlError::Unsupported("tuple assignment".into())),
    };
    match col.as_str() {
        "status" => {
            let s = parse_string(&assignment.value)?;
            let status = BookingStatus::parse(&s)
                .ok_or_else(|| SqlError::Parse(format!("bad status: {s}")))?;
            Ok(Command::UpdateBookingStatus { id, status })
        }
        "user_id" => Ok(Command::UpdateBookingUser { id, user_id: parse_ulid(&assignment.value)? }),
        other => Err(SqlError::Unsupported(format!("UPDATE bookings SET {other}"))),
    }
}

// ── SELECT ────────────────────────────────────────────────────

/// One WHERE conjunct: column, operator, value expression.
enum FilterOp {
    Eq,
    GtEq,
    LtEq,
}

struct Filters<'a>(Vec<(String, FilterOp, &'a Expr)>);

impl<'a> Filters<'a> {
    fn collect(selection: &'a Option<Expr>) -> Result<Self, SqlError> {
        let mut out = Vec::new();
        if let Some(expr) = selection {
            walk_conjunction(expr, &mut out)?;
        }
        Ok(Filters(out))
    }

    fn eq(&self, col: &str) -> Option<&'a Expr> {
        self.0
            .iter()
            .find(|(c, op, _)| c == col && matches!(op, FilterOp::Eq))
            .map(|(_, _, e)| *e)
    }

    fn bound(&self, col: &str, lower: bool) -> Option<&'a Expr> {
        self.0
            .iter()
            .find(|(c, op, _)| {
                c == col
                    && match op {
                        FilterOp::GtEq => lower,
                        FilterOp::LtEq => !lower,
                        FilterOp::Eq => false,
                    }
            })
            .map(|(_, _, e)| *e)
    }

    fn window(&self) -> Result<(Ms, Ms), SqlError> {
        let start = self
            .bound("start", true)
            .or_else(|| self.eq("start"))
            .ok_or(SqlError::MissingFilter("start"))?;
        let end = self
            .bound("end", false)
            .or_else(|| self.eq("end"))
            .ok_or(SqlError::MissingFilter("end"))?;
        Ok((parse_i64(start)?, parse_i64(end)?))
    }

    fn user_ids(&self) -> Result<Vec<Ulid>, SqlError> {
        match self.id_list("user_ids")? {
            Some(ids) => Ok(ids),
            None => Err(SqlError::MissingFilter("user_ids")),
        }
    }

    /// Comma-separated ULID list filter; None when the column is absent.
    fn id_list(&self, col: &'static str) -> Result<Option<Vec<Ulid>>, SqlError> {
        let Some(expr) = self.eq(col) else { return Ok(None) };
        let raw = parse_string(expr)?;
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}"))))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

fn walk_conjunction<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, FilterOp, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => {
            let fop = match op {
                ast::BinaryOperator::And => {
                    walk_conjunction(left, out)?;
                    walk_conjunction(right, out)?;
                    return Ok(());
                }
                ast::BinaryOperator::Eq => FilterOp::Eq,
                ast::BinaryOperator::GtEq => FilterOp::GtEq,
                ast::BinaryOperator::LtEq => FilterOp::LtEq,
                other => return Err(SqlError::Unsupported(format!("operator {other}"))),
            };
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse("expected column on left side".into()))?;
            out.push((col, fop, right));
            Ok(())
        }
        Expr::Nested(inner) => walk_conjunction(inner, out),
        other => Err(SqlError::Unsupported(format!("WHERE clause {other}"))),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let f = Filters::collect(&select.selection)?;

    let limit = match &query.limit_clause {
        Some(ast::LimitClause::LimitOffset { limit: Some(e), .. }) => {
            Some(parse_i64(e)? as usize)
        }
        _ => None,
    };

    match table.as_str() {
        "availability" => {
            let (start, end) = f.window()?;
            Ok(Command::SelectAvailability {
                user_id: parse_ulid(f.eq("user_id").ok_or(SqlError::MissingFilter("user_id"))?)?,
                start,
                end,
                duration_min: opt_filter_u16(&f, "duration")?,
                template_id: match f.eq("template_id") {
                    Some(e) => Some(parse_ulid(e)?),
                    None => None,
                },
                ignore: f.id_list("ignore")?.unwrap_or_default(),
            })
        }
        "team_availability" => {
            let (start, end) = f.window()?;
            Ok(Command::SelectTeamAvailability {
                team_id: parse_ulid(f.eq("team_id").ok_or(SqlError::MissingFilter("team_id"))?)?,
                start,
                end,
                duration_min: opt_filter_u16(&f, "duration")?,
            })
        }
        "common_availability" => {
            let (start, end) = f.window()?;
            Ok(Command::SelectCommonAvailability {
                user_ids: f.user_ids()?,
                start,
                end,
                duration_min: opt_filter_u16(&f, "duration")?,
                min_attendees: match f.eq("min_attendees") {
                    Some(e) => Some(parse_i64(e)? as usize),
                    None => None,
                },
            })
        }
        "optimal_times" => {
            let (start, end) = f.window()?;
            Ok(Command::SelectOptimalTimes {
                user_ids: f.user_ids()?,
                start,
                end,
                duration_min: parse_u16(
                    f.eq("duration").ok_or(SqlError::MissingFilter("duration"))?,
                )?,
                prefs: scoring_prefs(&f)?,
                limit,
            })
        }
        "conflicts" => {
            let (start, end) = f.window()?;
            Ok(Command::SelectConflicts {
                user_ids: f.user_ids()?,
                start,
                end,
                meeting_type: match f.eq("meeting_type") {
                    Some(e) => Some(parse_string(e)?),
                    None => None,
                },
                check_buffers: opt_filter_bool(&f, "check_buffers")?.unwrap_or(true),
                check_policies: opt_filter_bool(&f, "check_policies")?.unwrap_or(true),
                ignore: f.id_list("ignore")?.unwrap_or_default(),
            })
        }
        "analytics" | "utilization" => {
            let user_ids = f.user_ids()?;
            let start_date =
                parse_date(f.eq("start_date").ok_or(SqlError::MissingFilter("start_date"))?)?;
            let end_date =
                parse_date(f.eq("end_date").ok_or(SqlError::MissingFilter("end_date"))?)?;
            if table == "analytics" {
                Ok(Command::SelectAnalytics { user_ids, start_date, end_date })
            } else {
                Ok(Command::SelectUtilization { user_ids, start_date, end_date })
            }
        }
        "templates" => Ok(Command::SelectTemplates),
        "buffer_rules" => Ok(Command::SelectBufferRules),
        "booking_rules" => Ok(Command::SelectBookingRules),
        "team_schedules" => Ok(Command::SelectTeams),
        "schedule_policies" => Ok(Command::SelectPolicies),
        "resources" => Ok(Command::SelectResources),
        "bookings" => Ok(Command::SelectBookings {
            user_id: parse_ulid(f.eq("user_id").ok_or(SqlError::MissingFilter("user_id"))?)?,
        }),
        "schedule_overrides" => Ok(Command::SelectOverrides {
            user_id: parse_ulid(f.eq("user_id").ok_or(SqlError::MissingFilter("user_id"))?)?,
        }),
        "recurring_patterns" => Ok(Command::SelectPatterns {
            user_id: parse_ulid(f.eq("user_id").ok_or(SqlError::MissingFilter("user_id"))?)?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            resource_id: parse_ulid(
                f.eq("resource_id").ok_or(SqlError::MissingFilter("resource_id"))?,
            )?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn scoring_prefs(f: &Filters) -> Result<ScoringPrefs, SqlError> {
    let mut prefs = ScoringPrefs::default();
    if let Some(e) = f.eq("urgency") {
        let s = parse_string(e)?;
        prefs.urgency =
            Some(Urgency::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad urgency: {s}")))?);
    }
    if let Some(e) = f.eq("prefer") {
        for part in parse_string(e)?.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            prefs.preferred.push(
                TimePreference::parse(part)
                    .ok_or_else(|| SqlError::Parse(format!("bad preference: {part}")))?,
            );
        }
    }
    if let Some(e) = f.eq("avoid") {
        for part in parse_string(e)?.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            prefs.avoid.push(
                TimeAvoidance::parse(part)
                    .ok_or_else(|| SqlError::Parse(format!("bad avoidance: {part}")))?,
            );
        }
    }
    Ok(prefs)
}

fn opt_filter_u16(f: &Filters, col: &str) -> Result<Option<u16>, SqlError> {
    match f.eq(col) {
        Some(e) => Ok(Some(parse_u16(e)?)),
        None => Ok(None),
    }
}

fn opt_filter_bool(f: &Filters, col: &str) -> Result<Option<bool>, SqlError> {
    match f.eq(col) {
        Some(e) => Ok(Some(parse_bool(e)?)),
        None => Ok(None),
    }
}

// ── AST helpers ───────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert.source.as_ref().ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

// ── Value parsers ─────────────────────────────────────────────

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => {
                s.parse().map_err(|e| SqlError::Parse(format!("bad i64: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp { op: ast::UnaryOperator::Minus, expr } = expr {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => {
                s.parse().map_err(|e| SqlError::Parse(format!("bad f64: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u16(expr: &Expr) -> Result<u16, SqlError> {
    let v = parse_i64(expr)?;
    u16::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u16 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s}: {e}")))
}

/// JSON-typed column: a single-quoted string holding a JSON document.
fn parse_json<T: serde::de::DeserializeOwned>(expr: &Expr) -> Result<T, SqlError> {
    let s = parse_string(expr)?;
    serde_json::from_str(&s).map_err(|e| SqlError::Parse(format!("bad JSON: {e}")))
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn opt_string(row: &Row, col: &str) -> Result<Option<String>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_string(e)?)),
        _ => Ok(None),
    }
}

fn opt_ulid(row: &Row, col: &str) -> Result<Option<Ulid>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_ulid(e)?)),
        _ => Ok(None),
    }
}

fn opt_u16(row: &Row, col: &str) -> Result<Option<u16>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_u16(e)?)),
        _ => Ok(None),
    }
}

fn opt_i64(row: &Row, col: &str) -> Result<Option<i64>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_i64(e)?)),
        _ => Ok(None),
    }
}

fn opt_f64(row: &Row, col: &str) -> Result<Option<f64>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_f64(e)?)),
        _ => Ok(None),
    }
}

fn opt_bool(row: &Row, col: &str) -> Result<Option<bool>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_bool(e)?)),
        _ => Ok(None),
    }
}

fn opt_date(row: &Row, col: &str) -> Result<Option<NaiveDate>, SqlError> {
    match row.get(col) {
        Some(e) if !is_null(e) => Ok(Some(parse_date(e)?)),
        _ => Ok(None),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    MissingColumn(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing column {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
