// src/db/changes.rs
//
// Immutable change-event rows. Created exactly once per detected transition,
// inside the same transaction that applied the snapshot, and never mutated.

use crate::domain::changes::{PriceChangeRecord, PriceDelta, StatusChangeRecord};
use crate::domain::vehicle::VehicleStatus;
use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

pub fn insert_price_change(
    conn: &Connection,
    vehicle_id: i64,
    delta: &PriceDelta,
    triggered_by_user_id: Option<i64>,
    now: NaiveDateTime,
) -> Result<PriceChangeRecord, ServerError> {
    conn.execute(
        r#"
        INSERT INTO price_changes (vehicle_id, previous_price, new_price,
                                   change_amount, change_percent,
                                   triggered_by_user_id, detected_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            vehicle_id,
            delta.previous,
            delta.new,
            delta.amount,
            delta.percent,
            triggered_by_user_id,
            now,
        ],
    )?;

    Ok(PriceChangeRecord {
        id: conn.last_insert_rowid(),
        vehicle_id,
        previous_price: delta.previous,
        new_price: delta.new,
        change_amount: delta.amount,
        change_percent: delta.percent,
        triggered_by_user_id,
        detected_at: now,
    })
}

pub fn insert_status_change(
    conn: &Connection,
    vehicle_id: i64,
    previous: VehicleStatus,
    new: VehicleStatus,
    triggered_by_user_id: Option<i64>,
    now: NaiveDateTime,
) -> Result<StatusChangeRecord, ServerError> {
    conn.execute(
        r#"
        INSERT INTO status_changes (vehicle_id, previous_status, new_status,
                                    triggered_by_user_id, detected_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            vehicle_id,
            previous.as_str(),
            new.as_str(),
            triggered_by_user_id,
            now,
        ],
    )?;

    Ok(StatusChangeRecord {
        id: conn.last_insert_rowid(),
        vehicle_id,
        previous_status: previous,
        new_status: new,
        triggered_by_user_id,
        detected_at: now,
    })
}

pub fn recent_price_changes(
    conn: &Connection,
    vehicle_id: i64,
    limit: i64,
) -> Result<Vec<PriceChangeRecord>, ServerError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, vehicle_id, previous_price, new_price, change_amount,
               change_percent, triggered_by_user_id, detected_at
        FROM price_changes
        WHERE vehicle_id = ?1
        ORDER BY detected_at DESC, id DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![vehicle_id, limit], |row| {
        Ok(PriceChangeRecord {
            id: row.get(0)?,
            vehicle_id: row.get(1)?,
            previous_price: row.get(2)?,
            new_price: row.get(3)?,
            change_amount: row.get(4)?,
            change_percent: row.get(5)?,
            triggered_by_user_id: row.get(6)?,
            detected_at: row.get(7)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn recent_status_changes(
    conn: &Connection,
    vehicle_id: i64,
    limit: i64,
) -> Result<Vec<StatusChangeRecord>, ServerError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, vehicle_id, previous_status, new_status,
               triggered_by_user_id, detected_at
        FROM status_changes
        WHERE vehicle_id = ?1
        ORDER BY detected_at DESC, id DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![vehicle_id, limit], |row| {
        let previous: String = row.get(2)?;
        let new: String = row.get(3)?;
        Ok(StatusChangeRecord {
            id: row.get(0)?,
            vehicle_id: row.get(1)?,
            previous_status: VehicleStatus::parse(&previous),
            new_status: VehicleStatus::parse(&new),
            triggered_by_user_id: row.get(4)?,
            detected_at: row.get(5)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
