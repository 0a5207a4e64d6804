// src/db/vehicles.rs
//
// Store access for the canonical vehicle record: tiered resolution, creation,
// the field-merge policy applied on every snapshot, staleness selection, and
// the merge operator that consolidates duplicates.

use crate::domain::snapshot::SnapshotPayload;
use crate::domain::vehicle::{SellerType, Vehicle, VehicleStatus};
use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

const VEHICLE_COLUMNS: &str = "id, vin, fingerprint, year, make, model, trim, \
     exterior_color, interior_color, body_style, transmission, drivetrain, \
     fuel_type, engine, current_price, current_mileage, current_status, \
     lowest_price, highest_price, price_drop_count, seller_name, seller_type, \
     seller_location, seller_phone, primary_photo_url, photo_urls, \
     last_checked_at, created_at, updated_at";

fn vehicle_from_row(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
    let status: String = row.get(16)?;
    let seller_type: String = row.get(21)?;
    let photo_urls: String = row.get(25)?;
    Ok(Vehicle {
        id: row.get(0)?,
        vin: row.get(1)?,
        fingerprint: row.get(2)?,
        year: row.get(3)?,
        make: row.get(4)?,
        model: row.get(5)?,
        trim: row.get(6)?,
        exterior_color: row.get(7)?,
        interior_color: row.get(8)?,
        body_style: row.get(9)?,
        transmission: row.get(10)?,
        drivetrain: row.get(11)?,
        fuel_type: row.get(12)?,
        engine: row.get(13)?,
        current_price: row.get(14)?,
        current_mileage: row.get(15)?,
        current_status: VehicleStatus::parse(&status),
        lowest_price: row.get(17)?,
        highest_price: row.get(18)?,
        price_drop_count: row.get(19)?,
        seller_name: row.get(20)?,
        seller_type: SellerType::parse(&seller_type),
        seller_location: row.get(22)?,
        seller_phone: row.get(23)?,
        primary_photo_url: row.get(24)?,
        photo_urls: serde_json::from_str(&photo_urls).unwrap_or_default(),
        sources: Vec::new(),
        source_urls: Vec::new(),
        last_checked_at: row.get(26)?,
        created_at: row.get(27)?,
        updated_at: row.get(28)?,
    })
}

/// Loads one vehicle with its sources / source URLs attached.
pub fn get_vehicle(conn: &Connection, vehicle_id: i64) -> Result<Vehicle, ServerError> {
    let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?1");
    let vehicle = conn
        .query_row(&sql, params![vehicle_id], vehicle_from_row)
        .optional()?
        .ok_or(ServerError::NotFound)?;
    attach_sources(conn, vehicle)
}

fn attach_sources(conn: &Connection, mut vehicle: Vehicle) -> Result<Vehicle, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT source, url FROM vehicle_sources WHERE vehicle_id = ?1 ORDER BY first_seen_at, id",
    )?;
    let rows = stmt.query_map(params![vehicle.id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (source, url) = row?;
        if !vehicle.sources.contains(&source) {
            vehicle.sources.push(source);
        }
        vehicle.source_urls.push(url);
    }
    Ok(vehicle)
}

/// Outcome of the tiered resolution. `merge_candidate` is a VIN-less vehicle
/// that matched by URL while a different vehicle matched by VIN; the caller
/// consolidates it into `vehicle_id` before ingesting.
#[derive(Debug)]
pub struct Resolution {
    pub vehicle_id: Option<i64>,
    pub merge_candidate: Option<i64>,
}

/// Tiered match, first hit wins: exact VIN (only for full 17-char VINs), then
/// exact source URL, then fingerprint. Fingerprint ties break deterministically
/// on most-recently-updated. Read-only; callers run it inside the ingestion
/// write transaction so a "not found" cannot race another creation.
pub fn resolve_vehicle(
    conn: &Connection,
    vin: Option<&str>,
    fingerprint: &str,
    url: &str,
) -> Result<Resolution, ServerError> {
    if let Some(vin) = vin.filter(|v| v.len() == 17) {
        if let Some(id) = find_id_by_vin(conn, vin)? {
            // A VIN hit can expose a duplicate: a VIN-less record created
            // earlier from the same listing URL.
            let merge_candidate = match find_id_by_url(conn, url)? {
                Some(other) if other != id => {
                    if vin_of(conn, other)?.is_none() {
                        Some(other)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            return Ok(Resolution {
                vehicle_id: Some(id),
                merge_candidate,
            });
        }
    }

    if let Some(id) = find_id_by_url(conn, url)? {
        return Ok(Resolution {
            vehicle_id: Some(id),
            merge_candidate: None,
        });
    }

    if let Some(id) = find_id_by_fingerprint(conn, fingerprint)? {
        eprintln!("🔎 Fingerprint fallback matched vehicle {id} for {url}");
        return Ok(Resolution {
            vehicle_id: Some(id),
            merge_candidate: None,
        });
    }

    Ok(Resolution {
        vehicle_id: None,
        merge_candidate: None,
    })
}

fn find_id_by_vin(conn: &Connection, vin: &str) -> Result<Option<i64>, ServerError> {
    conn.query_row("SELECT id FROM vehicles WHERE vin = ?1", params![vin], |r| {
        r.get(0)
    })
    .optional()
    .map_err(Into::into)
}

fn find_id_by_url(conn: &Connection, url: &str) -> Result<Option<i64>, ServerError> {
    conn.query_row(
        "SELECT vehicle_id FROM vehicle_sources WHERE url = ?1 ORDER BY last_seen_at DESC LIMIT 1",
        params![url],
        |r| r.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn find_id_by_fingerprint(conn: &Connection, fingerprint: &str) -> Result<Option<i64>, ServerError> {
    conn.query_row(
        "SELECT id FROM vehicles WHERE fingerprint = ?1 ORDER BY updated_at DESC, id DESC LIMIT 1",
        params![fingerprint],
        |r| r.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn vin_of(conn: &Connection, vehicle_id: i64) -> Result<Option<String>, ServerError> {
    conn.query_row(
        "SELECT vin FROM vehicles WHERE id = ?1",
        params![vehicle_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(Into::into)
    .map(|v: Option<Option<String>>| v.flatten())
}

/// Inserts a brand-new vehicle seeded from the snapshot payload. Price extrema
/// start at the observed price.
pub fn insert_vehicle(
    conn: &Connection,
    payload: &SnapshotPayload,
    vin: Option<&str>,
    fingerprint: &str,
    now: NaiveDateTime,
) -> Result<i64, ServerError> {
    let price = payload.price_cents();
    let status = payload.status().unwrap_or(VehicleStatus::Active);
    let seller_type = payload.seller_type().unwrap_or(SellerType::Unknown);
    let photo_urls = serde_json::to_string(&payload.photo_urls)
        .map_err(|e| ServerError::DbError(e.to_string()))?;

    conn.execute(
        r#"
        INSERT INTO vehicles (
            vin, fingerprint, year, make, model, trim,
            exterior_color, interior_color, body_style, transmission,
            drivetrain, fuel_type, engine,
            current_price, current_mileage, current_status,
            lowest_price, highest_price,
            seller_name, seller_type, seller_location, seller_phone,
            primary_photo_url, photo_urls,
            last_checked_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                  ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                  ?25, ?26, ?27)
        "#,
        params![
            vin,
            fingerprint,
            payload.year,
            payload.make,
            payload.model,
            payload.trim,
            payload.exterior_color,
            payload.interior_color,
            payload.body_style,
            payload.transmission,
            payload.drivetrain,
            payload.fuel_type,
            payload.engine,
            price,
            payload.mileage,
            status.as_str(),
            price,
            price,
            payload.seller_name,
            seller_type.as_str(),
            payload.seller_location,
            payload.seller_phone,
            payload.photo_urls.first(),
            photo_urls,
            now,
            now,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Applies one snapshot to an existing vehicle, field by field:
/// - car spec fields: incoming non-null overwrites, incoming null never erases
/// - VIN: backfilled when discovered
/// - current price/mileage/status: overwritten when provided
/// - lowest/highest price: extended monotonically
/// - photo URLs: appended if absent
/// - last_checked_at: always reset, even when nothing else changed
pub fn apply_snapshot(
    conn: &Connection,
    existing: &Vehicle,
    payload: &SnapshotPayload,
    vin: Option<&str>,
    fingerprint: &str,
    now: NaiveDateTime,
) -> Result<(), ServerError> {
    let price = payload.price_cents();

    let merged_vin = vin.map(str::to_string).or_else(|| existing.vin.clone());
    let status = payload.status().unwrap_or(existing.current_status);
    let seller_type = payload
        .seller_type()
        .unwrap_or(existing.seller_type);

    let lowest = monotonic_min(existing.lowest_price, price);
    let highest = monotonic_max(existing.highest_price, price);

    let mut photo_urls = existing.photo_urls.clone();
    for url in &payload.photo_urls {
        if !photo_urls.contains(url) {
            photo_urls.push(url.clone());
        }
    }
    let primary_photo = payload
        .photo_urls
        .first()
        .cloned()
        .or_else(|| existing.primary_photo_url.clone());
    let photo_urls_json =
        serde_json::to_string(&photo_urls).map_err(|e| ServerError::DbError(e.to_string()))?;

    conn.execute(
        r#"
        UPDATE vehicles SET
            vin = ?1, fingerprint = ?2,
            year = ?3, make = ?4, model = ?5, trim = ?6,
            exterior_color = ?7, interior_color = ?8, body_style = ?9,
            transmission = ?10, drivetrain = ?11, fuel_type = ?12, engine = ?13,
            current_price = ?14, current_mileage = ?15, current_status = ?16,
            lowest_price = ?17, highest_price = ?18,
            seller_name = ?19, seller_type = ?20, seller_location = ?21,
            seller_phone = ?22,
            primary_photo_url = ?23, photo_urls = ?24,
            last_checked_at = ?25, updated_at = ?26
        WHERE id = ?27
        "#,
        params![
            merged_vin,
            fingerprint,
            payload.year.or(existing.year),
            payload.make.clone().or_else(|| existing.make.clone()),
            payload.model.clone().or_else(|| existing.model.clone()),
            payload.trim.clone().or_else(|| existing.trim.clone()),
            payload
                .exterior_color
                .clone()
                .or_else(|| existing.exterior_color.clone()),
            payload
                .interior_color
                .clone()
                .or_else(|| existing.interior_color.clone()),
            payload
                .body_style
                .clone()
                .or_else(|| existing.body_style.clone()),
            payload
                .transmission
                .clone()
                .or_else(|| existing.transmission.clone()),
            payload
                .drivetrain
                .clone()
                .or_else(|| existing.drivetrain.clone()),
            payload
                .fuel_type
                .clone()
                .or_else(|| existing.fuel_type.clone()),
            payload.engine.clone().or_else(|| existing.engine.clone()),
            price.or(existing.current_price),
            payload.mileage.or(existing.current_mileage),
            status.as_str(),
            lowest,
            highest,
            payload
                .seller_name
                .clone()
                .or_else(|| existing.seller_name.clone()),
            seller_type.as_str(),
            payload
                .seller_location
                .clone()
                .or_else(|| existing.seller_location.clone()),
            payload
                .seller_phone
                .clone()
                .or_else(|| existing.seller_phone.clone()),
            primary_photo,
            photo_urls_json,
            now,
            now,
            existing.id,
        ],
    )?;
    Ok(())
}

fn monotonic_min(existing: Option<i64>, observed: Option<i64>) -> Option<i64> {
    match (existing, observed) {
        (Some(e), Some(o)) => Some(e.min(o)),
        (Some(e), None) => Some(e),
        (None, o) => o,
    }
}

fn monotonic_max(existing: Option<i64>, observed: Option<i64>) -> Option<i64> {
    match (existing, observed) {
        (Some(e), Some(o)) => Some(e.max(o)),
        (Some(e), None) => Some(e),
        (None, o) => o,
    }
}

/// Records the (source, url) pair for a vehicle. Append-only set semantics:
/// re-seeing a known URL only bumps last_seen_at.
pub fn upsert_source(
    conn: &Connection,
    vehicle_id: i64,
    source: &str,
    url: &str,
    now: NaiveDateTime,
) -> Result<(), ServerError> {
    conn.execute(
        r#"
        INSERT INTO vehicle_sources (vehicle_id, source, url, first_seen_at, last_seen_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(vehicle_id, url) DO UPDATE SET last_seen_at = excluded.last_seen_at
        "#,
        params![vehicle_id, source, url, now, now],
    )?;
    Ok(())
}

/// Monotonic counter bump, only ever called for a detected drop.
pub fn increment_price_drop_count(conn: &Connection, vehicle_id: i64) -> Result<(), ServerError> {
    conn.execute(
        "UPDATE vehicles SET price_drop_count = price_drop_count + 1 WHERE id = ?1",
        params![vehicle_id],
    )?;
    Ok(())
}

/// Active vehicles whose freshness clock is older than `cutoff`, with the
/// first URL each was ever seen at. Bounded by `limit` per reconciliation run.
pub fn select_stale_active(
    conn: &Connection,
    cutoff: NaiveDateTime,
    limit: i64,
) -> Result<Vec<(i64, String)>, ServerError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT v.id,
               (SELECT s.url FROM vehicle_sources s
                 WHERE s.vehicle_id = v.id
                 ORDER BY s.first_seen_at, s.id LIMIT 1) AS first_url
        FROM vehicles v
        WHERE v.current_status = 'active' AND v.last_checked_at < ?1
        ORDER BY v.last_checked_at
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![cutoff, limit], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, url) = row?;
        if let Some(url) = url {
            out.push((id, url));
        }
    }
    Ok(out)
}

pub fn is_unique_violation(err: &ServerError) -> bool {
    matches!(err, ServerError::DbError(msg) if msg.contains("UNIQUE constraint failed"))
}

/// Consolidates `duplicate_id` into `primary_id` inside one transaction:
/// history rows (snapshots, changes, notifications, probe results) and source
/// URLs move over, watchers collapse to a single entry per user, and the
/// duplicate row is deleted. On any failure nothing is moved.
///
/// Merging an already-merged (missing) duplicate is a defined NotFound error,
/// never data corruption.
pub fn merge_vehicles(
    conn: &mut Connection,
    primary_id: i64,
    duplicate_id: i64,
) -> Result<(), ServerError> {
    if primary_id == duplicate_id {
        return Err(ServerError::BadRequest(
            "cannot merge a vehicle into itself".into(),
        ));
    }

    let tx = conn.transaction()?;
    merge_vehicles_tx(&tx, primary_id, duplicate_id)?;
    tx.commit()?;
    eprintln!("🔀 Merged vehicle {duplicate_id} into {primary_id}");
    Ok(())
}

/// Transaction body of the merge, reusable from inside the ingestion
/// transaction when resolution discovers a duplicate.
pub fn merge_vehicles_tx(
    tx: &Connection,
    primary_id: i64,
    duplicate_id: i64,
) -> Result<(), ServerError> {
    let exists = |id: i64| -> Result<bool, ServerError> {
        tx.query_row("SELECT 1 FROM vehicles WHERE id = ?1", params![id], |_| {
            Ok(())
        })
        .optional()
        .map(|r| r.is_some())
        .map_err(Into::into)
    };
    if !exists(primary_id)? || !exists(duplicate_id)? {
        return Err(ServerError::NotFound);
    }

    for table in ["snapshots", "price_changes", "status_changes", "notifications", "head_checks"] {
        tx.execute(
            &format!("UPDATE {table} SET vehicle_id = ?1 WHERE vehicle_id = ?2"),
            params![primary_id, duplicate_id],
        )?;
    }

    // Source URLs: move, dropping any the primary already records.
    tx.execute(
        r#"
        DELETE FROM vehicle_sources
        WHERE vehicle_id = ?2
          AND url IN (SELECT url FROM vehicle_sources WHERE vehicle_id = ?1)
        "#,
        params![primary_id, duplicate_id],
    )?;
    tx.execute(
        "UPDATE vehicle_sources SET vehicle_id = ?1 WHERE vehicle_id = ?2",
        params![primary_id, duplicate_id],
    )?;

    // Watchers: a user already watching the primary keeps that entry; their
    // duplicate-side entry is dropped. Everyone else is repointed.
    tx.execute(
        r#"
        DELETE FROM watchlist_entries
        WHERE vehicle_id = ?2
          AND user_id IN (SELECT user_id FROM watchlist_entries WHERE vehicle_id = ?1)
        "#,
        params![primary_id, duplicate_id],
    )?;
    tx.execute(
        "UPDATE watchlist_entries SET vehicle_id = ?1 WHERE vehicle_id = ?2",
        params![primary_id, duplicate_id],
    )?;

    tx.execute("DELETE FROM vehicles WHERE id = ?1", params![duplicate_id])?;
    Ok(())
}
