use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotd_query_duration_seconds";

/// Counter: bookings accepted.
pub const BOOKINGS_CREATED_TOTAL: &str = "slotd_bookings_created_total";

/// Counter: resource allocation requests that exhausted the retry.
pub const ALLOCATION_FAILURES_TOTAL: &str = "slotd_allocation_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotd_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "slotd_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertTemplate { .. } => "insert_template",
        Command::DeleteTemplate { .. } => "delete_template",
        Command::InsertPattern { .. } => "insert_pattern",
        Command::InsertPatternException { .. } => "insert_pattern_exception",
        Command::DeletePattern { .. } => "delete_pattern",
        Command::InsertOverride { .. } => "insert_override",
        Command::DeleteOverride { .. } => "delete_override",
        Command::InsertBufferRule { .. } => "insert_buffer_rule",
        Command::DeleteBufferRule { .. } => "delete_buffer_rule",
        Command::InsertBookingRule { .. } => "insert_booking_rule",
        Command::DeleteBookingRule { .. } => "delete_booking_rule",
        Command::InsertTeam { .. } => "insert_team",
        Command::InsertTeamMember { .. } => "insert_team_member",
        Command::DeleteTeam { .. } => "delete_team",
        Command::InsertPolicy { .. } => "insert_policy",
        Command::DeletePolicy { .. } => "delete_policy",
        Command::InsertResource { .. } => "insert_resource",
        Command::DeleteResource { .. } => "delete_resource",
        Command::InsertBooking { .. } => "insert_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::UpdateBookingUser { .. } => "update_booking_user",
        Command::InsertAssignment { .. } => "insert_assignment",
        Command::InsertAllocation { .. } => "insert_allocation",
        Command::DeleteAllocation { .. } => "delete_allocation",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectTeamAvailability { .. } => "select_team_availability",
        Command::SelectCommonAvailability { .. } => "select_common_availability",
        Command::SelectOptimalTimes { .. } => "select_optimal_times",
        Command::SelectConflicts { .. } => "select_conflicts",
        Command::SelectAnalytics { .. } => "select_analytics",
        Command::SelectUtilization { .. } => "select_utilization",
        Command::SelectTemplates => "select_templates",
        Command::SelectBufferRules => "select_buffer_rules",
        Command::SelectBookingRules => "select_booking_rules",
        Command::SelectTeams => "select_teams",
        Command::SelectPolicies => "select_policies",
        Command::SelectResources => "select_resources",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectOverrides { .. } => "select_overrides",
        Command::SelectPatterns { .. } => "select_patterns",
        Command::SelectReservations { .. } => "select_reservations",
    }
}
