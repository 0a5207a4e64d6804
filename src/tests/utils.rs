// src/tests/utils.rs

use crate::db::connection::{init_db_from_sql, Database};
use crate::db::users;
use crate::domain::snapshot::SnapshotPayload;
use crate::notifier::Notifier;
use crate::pipeline::Pipeline;
use crate::realtime::EventPublisher;
use chrono::Utc;
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

fn unique_temp_db_path(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("carwatch_test_{tag}_{nanos}.sqlite"));
    p.to_string_lossy().to_string()
}

/// Fresh on-disk database with the production schema applied.
pub fn test_db(tag: &str) -> Database {
    let db = Database::new(unique_temp_db_path(tag));
    init_db_from_sql(&db, SCHEMA_SQL).expect("schema init failed");
    db
}

/// Pipeline with no mailer and no realtime endpoint: notifications are
/// persisted in-app, publishes are no-ops.
pub fn test_pipeline(tag: &str) -> Pipeline {
    Pipeline::new(test_db(tag), Notifier::new(None), EventPublisher::new(None))
}

pub fn seed_user(db: &Database, email: &str) -> i64 {
    db.with_conn(|conn| users::insert_user(conn, email, None, false, Utc::now().naive_utc()))
        .expect("seed user")
}

/// A full-featured submission for a specific car; `url` and `price` vary per
/// test so resolution and change detection can be exercised independently.
pub fn civic_payload(url: &str, price: f64) -> SnapshotPayload {
    SnapshotPayload {
        url: url.to_string(),
        source: "cars.com".to_string(),
        vin: Some("1HGCM82633A004352".to_string()),
        year: Some(2019),
        make: Some("Honda".to_string()),
        model: Some("Civic".to_string()),
        trim: Some("Touring".to_string()),
        price: Some(price),
        mileage: Some(42_000),
        seller_location: Some("Austin, TX".to_string()),
        status: Some("active".to_string()),
        ..Default::default()
    }
}

/// Same car, no VIN: forces the URL / fingerprint resolution tiers.
pub fn vinless_payload(url: &str, price: f64) -> SnapshotPayload {
    let mut payload = civic_payload(url, price);
    payload.vin = None;
    payload
}

pub fn count_rows(db: &Database, table: &str) -> i64 {
    db.with_conn(|conn| {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .map_err(Into::into)
    })
    .expect("count rows")
}
