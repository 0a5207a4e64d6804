// src/db/watchlist.rs

use crate::domain::watchlist::WatchlistEntry;
use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

const ENTRY_COLUMNS: &str = "id, user_id, vehicle_id, price_when_added, \
     notify_price_drop, notify_price_rise, notify_status_change, notify_relist, \
     price_drop_threshold, target_price, last_notified_at, added_at";

fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WatchlistEntry> {
    Ok(WatchlistEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        price_when_added: row.get(3)?,
        notify_price_drop: row.get(4)?,
        notify_price_rise: row.get(5)?,
        notify_status_change: row.get(6)?,
        notify_relist: row.get(7)?,
        price_drop_threshold: row.get(8)?,
        target_price: row.get(9)?,
        last_notified_at: row.get(10)?,
        added_at: row.get(11)?,
    })
}

/// Preference toggles and thresholds supplied when adding or updating an
/// entry. Absent fields keep their defaults / current values.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchPreferences {
    pub notify_price_drop: Option<bool>,
    pub notify_price_rise: Option<bool>,
    pub notify_status_change: Option<bool>,
    pub notify_relist: Option<bool>,
    pub price_drop_threshold: Option<i64>,
    pub target_price: Option<i64>,
}

pub fn add_entry(
    conn: &Connection,
    user_id: i64,
    vehicle_id: i64,
    price_when_added: Option<i64>,
    prefs: &WatchPreferences,
    now: NaiveDateTime,
) -> Result<WatchlistEntry, ServerError> {
    let result = conn.execute(
        r#"
        INSERT INTO watchlist_entries (user_id, vehicle_id, price_when_added,
            notify_price_drop, notify_price_rise, notify_status_change,
            notify_relist, price_drop_threshold, target_price, added_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            user_id,
            vehicle_id,
            price_when_added,
            prefs.notify_price_drop.unwrap_or(true),
            prefs.notify_price_rise.unwrap_or(false),
            prefs.notify_status_change.unwrap_or(true),
            prefs.notify_relist.unwrap_or(true),
            prefs.price_drop_threshold,
            prefs.target_price,
            now,
        ],
    );

    match result {
        Ok(_) => get_entry(conn, conn.last_insert_rowid()),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => Err(
            ServerError::Conflict("already watching this vehicle".into()),
        ),
        Err(e) => Err(e.into()),
    }
}

pub fn get_entry(conn: &Connection, entry_id: i64) -> Result<WatchlistEntry, ServerError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM watchlist_entries WHERE id = ?1");
    conn.query_row(&sql, params![entry_id], entry_from_row)
        .optional()?
        .ok_or(ServerError::NotFound)
}

pub fn entries_for_user(conn: &Connection, user_id: i64) -> Result<Vec<WatchlistEntry>, ServerError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM watchlist_entries WHERE user_id = ?1 ORDER BY added_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], entry_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// All watchers of a vehicle except the user whose submission triggered the
/// change. `None` (the system actor) excludes nobody.
pub fn watchers_for_vehicle(
    conn: &Connection,
    vehicle_id: i64,
    excluded_user_id: Option<i64>,
) -> Result<Vec<WatchlistEntry>, ServerError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM watchlist_entries \
         WHERE vehicle_id = ?1 AND (?2 IS NULL OR user_id != ?2) ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![vehicle_id, excluded_user_id], entry_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn update_preferences(
    conn: &Connection,
    entry_id: i64,
    user_id: i64,
    prefs: &WatchPreferences,
) -> Result<WatchlistEntry, ServerError> {
    let existing = get_entry(conn, entry_id)?;
    if existing.user_id != user_id {
        return Err(ServerError::NotFound);
    }

    conn.execute(
        r#"
        UPDATE watchlist_entries SET
            notify_price_drop = ?1, notify_price_rise = ?2,
            notify_status_change = ?3, notify_relist = ?4,
            price_drop_threshold = ?5, target_price = ?6
        WHERE id = ?7
        "#,
        params![
            prefs.notify_price_drop.unwrap_or(existing.notify_price_drop),
            prefs.notify_price_rise.unwrap_or(existing.notify_price_rise),
            prefs
                .notify_status_change
                .unwrap_or(existing.notify_status_change),
            prefs.notify_relist.unwrap_or(existing.notify_relist),
            prefs.price_drop_threshold.or(existing.price_drop_threshold),
            prefs.target_price.or(existing.target_price),
            entry_id,
        ],
    )?;
    get_entry(conn, entry_id)
}

pub fn remove_entry(conn: &Connection, entry_id: i64, user_id: i64) -> Result<(), ServerError> {
    let affected = conn.execute(
        "DELETE FROM watchlist_entries WHERE id = ?1 AND user_id = ?2",
        params![entry_id, user_id],
    )?;
    if affected == 0 {
        return Err(ServerError::NotFound);
    }
    Ok(())
}

pub fn touch_last_notified(
    conn: &Connection,
    entry_id: i64,
    now: NaiveDateTime,
) -> Result<(), ServerError> {
    conn.execute(
        "UPDATE watchlist_entries SET last_notified_at = ?1 WHERE id = ?2",
        params![now, entry_id],
    )?;
    Ok(())
}
