// src/db/probes.rs
//
// Probe-result rows. One row per executed liveness check, alive or not; a
// probe that exhausted its retries is recorded as http_status 0.

use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

#[derive(Debug, Clone)]
pub struct HeadCheckResult {
    pub http_status: u16,
    pub is_alive: bool,
    pub redirect_url: Option<String>,
}

pub fn record_head_check(
    conn: &Connection,
    vehicle_id: i64,
    url: &str,
    scheduled_at: NaiveDateTime,
    executed_at: NaiveDateTime,
    result: &HeadCheckResult,
) -> Result<i64, ServerError> {
    conn.execute(
        r#"
        INSERT INTO head_checks (vehicle_id, url, scheduled_at, executed_at,
                                 http_status, is_alive, redirect_url)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            vehicle_id,
            url,
            scheduled_at,
            executed_at,
            result.http_status,
            result.is_alive,
            result.redirect_url,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
