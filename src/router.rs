use crate::db;
use crate::domain::snapshot::SnapshotPayload;
use crate::domain::vehicle::calculate_freshness;
use crate::errors::ServerError;
use crate::pipeline::{Actor, Pipeline};
use crate::probes;
use crate::responses::{json_response, json_response_with_status, ResultResp};
use astra::Request;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::io::Read;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddWatchRequest {
    vehicle_id: i64,
    #[serde(flatten)]
    prefs: db::watchlist::WatchPreferences,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeRequest {
    primary_id: i64,
    duplicate_id: i64,
}

pub fn handle(mut req: Request, pipeline: &Pipeline) -> ResultResp {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let query = parse_query(&req);
    let db = pipeline.db().clone();

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => json_response(&json!({ "status": "ok" })),

        // Pipeline entry point, shared by the browser extension and (via
        // Actor::System internally) the staleness scheduler.
        ("POST", ["api", "snapshots"]) => {
            let user_id = require_user_id(&req)?;
            let payload: SnapshotPayload = read_json_body(&mut req)?;
            let outcome = pipeline.process_snapshot(Actor::User(user_id), &payload)?;
            json_response_with_status(
                201,
                &json!({
                    "vehicle": outcome.vehicle,
                    "snapshot": outcome.snapshot,
                    "isNewVehicle": outcome.is_new_vehicle,
                }),
            )
        }

        ("GET", ["api", "vehicles", id]) => {
            let vehicle_id = parse_id(id)?;
            let detail = db.with_conn(|conn| {
                let vehicle = db::vehicles::get_vehicle(conn, vehicle_id)?;
                let snapshots = db::snapshots::recent_for_vehicle(conn, vehicle_id, 100)?;
                let price_changes = db::changes::recent_price_changes(conn, vehicle_id, 50)?;
                let status_changes = db::changes::recent_status_changes(conn, vehicle_id, 20)?;
                let freshness =
                    calculate_freshness(vehicle.last_checked_at, Utc::now().naive_utc());
                Ok(json!({
                    "vehicle": vehicle,
                    "snapshots": snapshots,
                    "priceChanges": price_changes,
                    "statusChanges": status_changes,
                    "freshness": freshness,
                }))
            })?;
            json_response(&detail)
        }

        ("POST", ["api", "vehicles", "merge"]) => {
            let body: MergeRequest = read_json_body(&mut req)?;
            pipeline.merge_vehicles(body.primary_id, body.duplicate_id)?;
            json_response(&json!({ "merged": true }))
        }

        ("GET", ["api", "watchlist"]) => {
            let user_id = require_user_id(&req)?;
            let now = Utc::now().naive_utc();
            let items = db.with_conn(|conn| {
                let entries = db::watchlist::entries_for_user(conn, user_id)?;
                let mut items = Vec::with_capacity(entries.len());
                for entry in entries {
                    let vehicle = db::vehicles::get_vehicle(conn, entry.vehicle_id)?;
                    let price_difference = entry
                        .price_when_added
                        .zip(vehicle.current_price)
                        .map(|(added, current)| current - added);
                    items.push(json!({
                        "entry": entry,
                        "vehicle": vehicle,
                        "freshness": calculate_freshness(vehicle.last_checked_at, now),
                        "priceDifference": price_difference,
                    }));
                }
                Ok(items)
            })?;
            json_response(&json!({ "items": items }))
        }

        ("POST", ["api", "watchlist"]) => {
            let user_id = require_user_id(&req)?;
            let body: AddWatchRequest = read_json_body(&mut req)?;
            let entry = db.with_conn(|conn| {
                let vehicle = db::vehicles::get_vehicle(conn, body.vehicle_id)?;
                db::watchlist::add_entry(
                    conn,
                    user_id,
                    vehicle.id,
                    vehicle.current_price,
                    &body.prefs,
                    Utc::now().naive_utc(),
                )
            })?;
            json_response_with_status(201, &entry)
        }

        ("PATCH", ["api", "watchlist", id]) => {
            let user_id = require_user_id(&req)?;
            let entry_id = parse_id(id)?;
            let prefs: db::watchlist::WatchPreferences = read_json_body(&mut req)?;
            let entry = db.with_conn(|conn| {
                db::watchlist::update_preferences(conn, entry_id, user_id, &prefs)
            })?;
            json_response(&entry)
        }

        ("DELETE", ["api", "watchlist", id]) => {
            let user_id = require_user_id(&req)?;
            let entry_id = parse_id(id)?;
            db.with_conn(|conn| db::watchlist::remove_entry(conn, entry_id, user_id))?;
            json_response(&json!({ "removed": true }))
        }

        ("GET", ["api", "notifications"]) => {
            let user_id = require_user_id(&req)?;
            let unread_only = query.get("unreadOnly").map(String::as_str) == Some("true");
            let items = db.with_conn(|conn| {
                db::notifications::for_user(conn, user_id, unread_only, 50)
            })?;
            json_response(&json!({ "items": items }))
        }

        ("GET", ["api", "notifications", "unread-count"]) => {
            let user_id = require_user_id(&req)?;
            let count = db.with_conn(|conn| db::notifications::unread_count(conn, user_id))?;
            json_response(&json!({ "count": count }))
        }

        ("POST", ["api", "notifications", "read-all"]) => {
            let user_id = require_user_id(&req)?;
            let updated = db.with_conn(|conn| {
                db::notifications::mark_all_read(conn, user_id, Utc::now().naive_utc())
            })?;
            json_response(&json!({ "updated": updated }))
        }

        ("POST", ["api", "notifications", id, "read"]) => {
            let user_id = require_user_id(&req)?;
            let notification_id = parse_id(id)?;
            db.with_conn(|conn| {
                db::notifications::mark_read(conn, notification_id, user_id, Utc::now().naive_utc())
            })?;
            json_response(&json!({ "read": true }))
        }

        // Operational: run one reconciliation pass right now.
        ("POST", ["api", "probes", "run"]) => {
            let probed = probes::run_reconciliation(pipeline)?;
            json_response(&json!({ "probed": probed }))
        }

        _ => Err(ServerError::NotFound),
    }
}

/// The upstream auth layer resolves the session and forwards the user id.
fn require_user_id(req: &Request) -> Result<i64, ServerError> {
    req.headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| ServerError::BadRequest("X-User-Id header required".into()))
}

fn parse_id(raw: &str) -> Result<i64, ServerError> {
    raw.parse::<i64>()
        .map_err(|_| ServerError::BadRequest(format!("invalid id: {raw}")))
}

fn read_json_body<T: serde::de::DeserializeOwned>(req: &mut Request) -> Result<T, ServerError> {
    let mut buf = Vec::new();
    req.body_mut()
        .reader()
        .read_to_end(&mut buf)
        .map_err(|e| ServerError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&buf)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))
}

fn parse_query(req: &astra::Request) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();

    if let Some(q) = req.uri().query() {
        for pair in q.split('&') {
            let mut parts = pair.splitn(2, '=');
            if let (Some(k), Some(v)) = (parts.next(), parts.next()) {
                map.insert(k.to_string(), v.to_string());
            }
        }
    }

    map
}
