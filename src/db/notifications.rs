// src/db/notifications.rs

use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// One delivery attempt/record tied to a change event and a recipient.
/// Mutated only to stamp sent_at (delivery) and read_at (user action).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: i64,
    pub vehicle_id: i64,
    pub r#type: String,
    pub title: String,
    pub body: String,
    pub price_change_id: Option<i64>,
    pub status_change_id: Option<i64>,
    pub channel: String,
    pub created_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
}

const COLUMNS: &str = "id, user_id, vehicle_id, type, title, body, \
     price_change_id, status_change_id, channel, created_at, sent_at, read_at";

fn from_row(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        r#type: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        price_change_id: row.get(6)?,
        status_change_id: row.get(7)?,
        channel: row.get(8)?,
        created_at: row.get(9)?,
        sent_at: row.get(10)?,
        read_at: row.get(11)?,
    })
}

pub fn insert_notification(
    conn: &Connection,
    user_id: i64,
    vehicle_id: i64,
    notification_type: &str,
    title: &str,
    body: &str,
    price_change_id: Option<i64>,
    status_change_id: Option<i64>,
    channel: &str,
    now: NaiveDateTime,
) -> Result<i64, ServerError> {
    conn.execute(
        r#"
        INSERT INTO notifications (user_id, vehicle_id, type, title, body,
            price_change_id, status_change_id, channel, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            user_id,
            vehicle_id,
            notification_type,
            title,
            body,
            price_change_id,
            status_change_id,
            channel,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn mark_sent(conn: &Connection, notification_id: i64, now: NaiveDateTime) -> Result<(), ServerError> {
    conn.execute(
        "UPDATE notifications SET sent_at = ?1 WHERE id = ?2",
        params![now, notification_id],
    )?;
    Ok(())
}

pub fn for_user(
    conn: &Connection,
    user_id: i64,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<NotificationRecord>, ServerError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM notifications \
         WHERE user_id = ?1 AND (?2 = 0 OR read_at IS NULL) \
         ORDER BY created_at DESC, id DESC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, unread_only, limit], from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn unread_count(conn: &Connection, user_id: i64) -> Result<i64, ServerError> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read_at IS NULL",
        params![user_id],
        |r| r.get(0),
    )
    .optional()
    .map(|c| c.unwrap_or(0))
    .map_err(Into::into)
}

pub fn mark_read(
    conn: &Connection,
    notification_id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> Result<(), ServerError> {
    let affected = conn.execute(
        "UPDATE notifications SET read_at = ?1 WHERE id = ?2 AND user_id = ?3 AND read_at IS NULL",
        params![now, notification_id, user_id],
    )?;
    if affected == 0 {
        // Re-reading an already-read notification is fine; a wrong id is not.
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM notifications WHERE id = ?1 AND user_id = ?2",
                params![notification_id, user_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(ServerError::NotFound);
        }
    }
    Ok(())
}

pub fn mark_all_read(conn: &Connection, user_id: i64, now: NaiveDateTime) -> Result<usize, ServerError> {
    conn.execute(
        "UPDATE notifications SET read_at = ?1 WHERE user_id = ?2 AND read_at IS NULL",
        params![now, user_id],
    )
    .map_err(Into::into)
}
