use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Datelike, Days, Utc};
use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use slotd::tenant::TenantManager;
use slotd::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("slotd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "slotd".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("test")
        .user("slotd")
        .password("slotd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Data rows only, skipping CommandComplete markers.
fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<tokio_postgres::SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(r) => Some(r),
            _ => None,
        })
        .collect()
}

/// Millis at midnight UTC, `days` from today.
fn future_day_ms(days: u64) -> i64 {
    let date = Utc::now().date_naive() + Days::new(days);
    date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis()
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;

/// Nine-to-five every day of the week, as the templates column expects it.
fn nine_to_five_week() -> String {
    let day = r#"[{"start_min":540,"end_min":1020}]"#;
    format!("[{day},{day},{day},{day},{day},{day},{day}]")
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_list_resources() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, resource_type, capacity, location) \
             VALUES ('{rid}', 'room', 8, 'floor-2')"
        ))
        .await
        .unwrap();

    let rows = data_rows(client.simple_query("SELECT * FROM resources").await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(rid.to_string().as_str()));
    let json = rows[0].get("data").unwrap();
    assert!(json.contains("\"room\""));
    assert!(json.contains("floor-2"));
}

#[tokio::test]
async fn overlapping_booking_is_rejected_over_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let start = future_day_ms(7) + 10 * HOUR_MS;
    let end = start + HOUR_MS;

    let first = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO bookings (id, user_id, "start", "end") VALUES ('{first}', '{user}', {start}, {end})"#
        ))
        .await
        .unwrap();

    let second = Ulid::new();
    let overlap_start = start + 30 * 60 * 1000;
    let result = client
        .batch_execute(&format!(
            r#"INSERT INTO bookings (id, user_id, "start", "end") VALUES ('{second}', '{user}', {overlap_start}, {})"#,
            overlap_start + HOUR_MS
        ))
        .await;
    assert!(result.is_err(), "overlapping booking must be rejected");

    let rows = data_rows(
        client
            .simple_query(&format!("SELECT * FROM bookings WHERE user_id = '{user}'"))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status"), Some("confirmed"));
}

#[tokio::test]
async fn availability_follows_template() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let template = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO templates (id, owner_user, week, slot_duration_min, advance_booking_days, minimum_notice_hours, is_default) \
             VALUES ('{template}', '{user}', '{}', 60, 30, 0, true)",
            nine_to_five_week()
        ))
        .await
        .unwrap();

    let day_start = future_day_ms(7);
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM availability WHERE user_id = '{user}' AND "start" >= {day_start} AND "end" <= {}"#,
                day_start + DAY_MS
            ))
            .await
            .unwrap(),
    );
    // 09:00-17:00 at 60-minute slots
    assert_eq!(rows.len(), 8);
    assert_eq!(
        rows[0].get("start").unwrap().parse::<i64>().unwrap(),
        day_start + 9 * HOUR_MS
    );

    // A booking removes its slot
    let booking = Ulid::new();
    let b_start = day_start + 10 * HOUR_MS;
    client
        .batch_execute(&format!(
            r#"INSERT INTO bookings (id, user_id, "start", "end") VALUES ('{booking}', '{user}', {b_start}, {})"#,
            b_start + HOUR_MS
        ))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM availability WHERE user_id = '{user}' AND "start" >= {day_start} AND "end" <= {}"#,
                day_start + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 7);
    assert!(rows
        .iter()
        .all(|r| r.get("start").unwrap().parse::<i64>().unwrap() != b_start));
}

#[tokio::test]
async fn conflict_report_over_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let start = future_day_ms(7) + 14 * HOUR_MS;
    let booking = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO bookings (id, user_id, "start", "end") VALUES ('{booking}', '{user}', {start}, {})"#,
            start + HOUR_MS
        ))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM conflicts WHERE user_ids = '{user}' AND "start" >= {start} AND "end" <= {}"#,
                start + HOUR_MS
            ))
            .await
            .unwrap(),
    );
    assert!(rows
        .iter()
        .any(|r| r.get("conflict_type") == Some("booking_overlap")));
    // Resolution hints ride along as suggestion rows
    assert!(rows.iter().any(|r| r.get("conflict_type") == Some("suggestion")));
}

#[tokio::test]
async fn optimal_times_over_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let start = future_day_ms(3);
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM optimal_times WHERE user_ids = '{user}' AND "start" >= {start} AND "end" <= {} AND duration = 60 AND urgency = 'high' LIMIT 5"#,
                start + 7 * DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert!(!rows.is_empty());
    assert!(rows.len() <= 5);
    let best: f64 = rows[0].get("score").unwrap().parse().unwrap();
    let last: f64 = rows[rows.len() - 1].get("score").unwrap().parse().unwrap();
    assert!(best >= last);
}

#[tokio::test]
async fn status_update_feeds_analytics() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let day = future_day_ms(7);
    let first = Ulid::new();
    let second = Ulid::new();
    for (id, hour) in [(first, 9), (second, 11)] {
        let start = day + hour * HOUR_MS;
        client
            .batch_execute(&format!(
                r#"INSERT INTO bookings (id, user_id, "start", "end") VALUES ('{id}', '{user}', {start}, {})"#,
                start + HOUR_MS
            ))
            .await
            .unwrap();
    }
    client
        .batch_execute(&format!(
            "UPDATE bookings SET status = 'completed' WHERE id = '{first}'"
        ))
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let range_end = today + Days::new(14);
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM analytics WHERE user_ids = '{user}' AND start_date = '{}' AND end_date = '{}'",
                today.format("%Y-%m-%d"),
                range_end.format("%Y-%m-%d")
            ))
            .await
            .unwrap(),
    );
    let metric = |name: &str| {
        rows.iter()
            .find(|r| r.get("metric") == Some(name))
            .and_then(|r| r.get("value"))
            .map(str::to_string)
            .unwrap()
    };
    assert_eq!(metric("total_bookings"), "2");
    assert_eq!(metric("completed"), "1");
    assert_eq!(metric("avg_duration_hours"), "1.00");

    let util = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM utilization WHERE user_ids = '{user}' AND start_date = '{}' AND end_date = '{}'",
                today.format("%Y-%m-%d"),
                range_end.format("%Y-%m-%d")
            ))
            .await
            .unwrap(),
    );
    assert_eq!(util.len(), 1);
    let booked: f64 = util[0].get("total_booked_hours").unwrap().parse().unwrap();
    assert!((booked - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn allocation_round_trip() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let near = Ulid::new();
    let far = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, resource_type, capacity, location) VALUES ('{near}', 'room', 4, 'hq')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, resource_type, capacity, location) VALUES ('{far}', 'room', 4, 'annex')"
        ))
        .await
        .unwrap();

    let booking = Ulid::new();
    let start = future_day_ms(7) + 9 * HOUR_MS;
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"INSERT INTO allocations (booking_id, "start", "end", resource_types, location) VALUES ('{booking}', {start}, {}, '["room"]', 'hq')"#,
                start + HOUR_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("resource_id"), Some(near.to_string().as_str()));
    assert_eq!(rows[0].get("status"), Some("allocated"));
    let reservation = rows[0].get("reservation_id").unwrap().to_string();

    let held = data_rows(
        client
            .simple_query(&format!("SELECT * FROM reservations WHERE resource_id = '{near}'"))
            .await
            .unwrap(),
    );
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].get("booking_id"), Some(booking.to_string().as_str()));

    client
        .batch_execute(&format!("DELETE FROM allocations WHERE id = '{reservation}'"))
        .await
        .unwrap();
    let held = data_rows(
        client
            .simple_query(&format!("SELECT * FROM reservations WHERE resource_id = '{near}'"))
            .await
            .unwrap(),
    );
    assert!(held.is_empty());
}

#[tokio::test]
async fn partial_allocation_reports_unsatisfied_type() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, resource_type, capacity) VALUES ('{rid}', 'room', 4)"
        ))
        .await
        .unwrap();

    // No projector in the catalog; the room must still be granted.
    let booking = Ulid::new();
    let start = future_day_ms(7) + 9 * HOUR_MS;
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"INSERT INTO allocations (booking_id, "start", "end", resource_types) VALUES ('{booking}', {start}, {}, '["room","projector"]')"#,
                start + HOUR_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    let granted = rows.iter().find(|r| r.get("status") == Some("allocated")).unwrap();
    assert_eq!(granted.get("resource_id"), Some(rid.to_string().as_str()));
    let missing = rows.iter().find(|r| r.get("status") == Some("unsatisfied")).unwrap();
    assert_eq!(missing.get("resource_type"), Some("projector"));
    assert_eq!(missing.get("reservation_id"), None);

    // The granted reservation stands.
    let held = data_rows(
        client
            .simple_query(&format!("SELECT * FROM reservations WHERE resource_id = '{rid}'"))
            .await
            .unwrap(),
    );
    assert_eq!(held.len(), 1);
}

#[tokio::test]
async fn reschedule_conflict_check_skips_moved_booking() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let start = future_day_ms(7) + 14 * HOUR_MS;
    let booking = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO bookings (id, user_id, "start", "end") VALUES ('{booking}', '{user}', {start}, {})"#,
            start + HOUR_MS
        ))
        .await
        .unwrap();

    // Moving the booking half an hour later collides only with itself.
    let new_start = start + 30 * 60 * 1000;
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM conflicts WHERE user_ids = '{user}' AND "start" >= {new_start} AND "end" <= {} AND ignore = '{booking}'"#,
                new_start + HOUR_MS
            ))
            .await
            .unwrap(),
    );
    assert!(rows.is_empty(), "ignored booking must not conflict");

    // Without the ignore filter the overlap shows up.
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM conflicts WHERE user_ids = '{user}' AND "start" >= {new_start} AND "end" <= {}"#,
                new_start + HOUR_MS
            ))
            .await
            .unwrap(),
    );
    assert!(rows.iter().any(|r| r.get("conflict_type") == Some("booking_overlap")));
}

#[tokio::test]
async fn team_assignment_over_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let alice = Ulid::new();
    let bob = Ulid::new();
    let team = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO team_schedules (id, members, assignment_method) VALUES ('{team}', '["{alice}","{bob}"]', 'round_robin')"#
        ))
        .await
        .unwrap();

    let day = future_day_ms(7);
    let mut assigned = Vec::new();
    for hour in [9, 11] {
        let start = day + hour * HOUR_MS;
        let booking = Ulid::new();
        let rows = data_rows(
            client
                .simple_query(&format!(
                    r#"INSERT INTO assignments (team_id, booking_id, "start", "end") VALUES ('{team}', '{booking}', {start}, {})"#,
                    start + HOUR_MS
                ))
                .await
                .unwrap(),
        );
        assert_eq!(rows.len(), 1);
        assigned.push(rows[0].get("user_id").unwrap().to_string());
    }
    // Round robin alternates members
    assert_ne!(assigned[0], assigned[1]);
}

#[tokio::test]
async fn tenants_do_not_share_state() {
    let (addr, _tm) = start_test_server().await;
    let client_a = connect(addr).await;

    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("other")
        .user("slotd")
        .password("slotd");
    let (client_b, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let rid = Ulid::new();
    client_a
        .batch_execute(&format!(
            "INSERT INTO resources (id, resource_type) VALUES ('{rid}', 'room')"
        ))
        .await
        .unwrap();

    let rows_a = data_rows(client_a.simple_query("SELECT * FROM resources").await.unwrap());
    let rows_b = data_rows(client_b.simple_query("SELECT * FROM resources").await.unwrap());
    assert_eq!(rows_a.len(), 1);
    assert!(rows_b.is_empty());
}

#[tokio::test]
async fn time_off_blocks_availability_over_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let user = Ulid::new();
    let template = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO templates (id, owner_user, week, slot_duration_min, advance_booking_days, minimum_notice_hours) \
             VALUES ('{template}', '{user}', '{}', 60, 30, 0)",
            nine_to_five_week()
        ))
        .await
        .unwrap();

    let date = Utc::now().date_naive() + Days::new(7);
    let ov = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO schedule_overrides (id, user_id, kind, start_date, end_date) \
             VALUES ('{ov}', '{user}', 'time_off', '{date}', '{date}')",
            date = date.format("%Y-%m-%d")
        ))
        .await
        .unwrap();

    let day_start = future_day_ms(7);
    let rows = data_rows(
        client
            .simple_query(&format!(
                r#"SELECT * FROM availability WHERE user_id = '{user}' AND "start" >= {day_start} AND "end" <= {}"#,
                day_start + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert!(rows.is_empty(), "time off must clear the day, weekday {}", date.weekday());
}
