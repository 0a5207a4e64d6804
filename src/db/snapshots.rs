// src/db/snapshots.rs

use crate::domain::snapshot::{SnapshotPayload, SnapshotRecord};
use crate::domain::vehicle::VehicleStatus;
use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

/// Appends one immutable observation row. The raw payload is retained
/// verbatim (JSON) for audits.
pub fn insert_snapshot(
    conn: &Connection,
    vehicle_id: i64,
    captured_by: Option<i64>,
    payload: &SnapshotPayload,
    now: NaiveDateTime,
) -> Result<SnapshotRecord, ServerError> {
    let status = payload.status().unwrap_or(VehicleStatus::Active);
    let raw =
        serde_json::to_string(payload).map_err(|e| ServerError::DbError(e.to_string()))?;

    conn.execute(
        r#"
        INSERT INTO snapshots (vehicle_id, captured_by, price, mileage, status,
                               source, source_url, raw_data, captured_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            vehicle_id,
            captured_by,
            payload.price_cents(),
            payload.mileage,
            status.as_str(),
            payload.normalized_source(),
            payload.url,
            raw,
            now,
        ],
    )?;

    Ok(SnapshotRecord {
        id: conn.last_insert_rowid(),
        vehicle_id,
        captured_by,
        price: payload.price_cents(),
        mileage: payload.mileage,
        status,
        source: payload.normalized_source().to_string(),
        source_url: payload.url.clone(),
        captured_at: now,
    })
}

pub fn recent_for_vehicle(
    conn: &Connection,
    vehicle_id: i64,
    limit: i64,
) -> Result<Vec<SnapshotRecord>, ServerError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, vehicle_id, captured_by, price, mileage, status, source,
               source_url, captured_at
        FROM snapshots
        WHERE vehicle_id = ?1
        ORDER BY captured_at DESC, id DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![vehicle_id, limit], |row| {
        let status: String = row.get(5)?;
        Ok(SnapshotRecord {
            id: row.get(0)?,
            vehicle_id: row.get(1)?,
            captured_by: row.get(2)?,
            price: row.get(3)?,
            mileage: row.get(4)?,
            status: VehicleStatus::parse(&status),
            source: row.get(6)?,
            source_url: row.get(7)?,
            captured_at: row.get(8)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
