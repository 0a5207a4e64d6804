// src/pipeline.rs
//
// The crowd-refresh pipeline: resolve → merge → snapshot → detect → dispatch.
// This is the single entry point for every observation, whether it came from a
// browser-extension submission or was injected by the staleness scheduler.

use crate::db::{self, Database};
use crate::domain::changes::{
    detect_price_change, detect_status_change, PriceChangeRecord, StatusChangeRecord,
};
use crate::domain::snapshot::{SnapshotPayload, SnapshotRecord};
use crate::domain::vehicle::Vehicle;
use crate::errors::ServerError;
use crate::notifier::Notifier;
use crate::realtime::{EventPublisher, VehicleEvent};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;

/// Who submitted an observation. The system actor attributes scheduler-driven
/// submissions; it excludes no watcher from fan-out.
#[derive(Debug, Clone, Copy)]
pub enum Actor {
    User(i64),
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub vehicle: Vehicle,
    pub snapshot: SnapshotRecord,
    pub is_new_vehicle: bool,
}

struct IngestTxResult {
    vehicle: Vehicle,
    snapshot: SnapshotRecord,
    is_new_vehicle: bool,
    price_change: Option<PriceChangeRecord>,
    status_change: Option<StatusChangeRecord>,
}

#[derive(Clone)]
pub struct Pipeline {
    db: Database,
    notifier: Notifier,
    publisher: EventPublisher,
}

impl Pipeline {
    pub fn new(db: Database, notifier: Notifier, publisher: EventPublisher) -> Self {
        Self {
            db,
            notifier,
            publisher,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Processes one snapshot submission end to end.
    ///
    /// Everything through change recording happens in a single IMMEDIATE
    /// transaction, so concurrent submissions for the same vehicle (or the
    /// same never-seen VIN) serialize: no duplicate creation, no stale
    /// previous-price capture. Fan-out and realtime publishes run strictly
    /// after commit; their failures never fail the submission.
    pub fn process_snapshot(
        &self,
        actor: Actor,
        payload: &SnapshotPayload,
    ) -> Result<IngestOutcome, ServerError> {
        validate_payload(payload)?;

        let vin = payload.normalized_vin();
        let fingerprint = payload.fingerprint();

        let result = self.db.with_conn(|conn| {
            // The VIN unique constraint backstops the transaction-level
            // serialization: on the rare constraint race, re-resolve once and
            // take the update path.
            match ingest_tx(conn, actor, payload, vin.as_deref(), &fingerprint) {
                Err(e) if db::vehicles::is_unique_violation(&e) => {
                    eprintln!("🔁 VIN insert raced, retrying as update");
                    ingest_tx(conn, actor, payload, vin.as_deref(), &fingerprint)
                }
                other => other,
            }
        })?;

        self.dispatch_changes(&result);

        self.publisher
            .publish(VehicleEvent::refresh(result.vehicle.id, actor.user_id()));

        eprintln!(
            "✅ Processed snapshot for vehicle {} (VIN: {})",
            result.vehicle.id,
            result.vehicle.vin.as_deref().unwrap_or("-")
        );

        Ok(IngestOutcome {
            vehicle: result.vehicle,
            snapshot: result.snapshot,
            is_new_vehicle: result.is_new_vehicle,
        })
    }

    /// Post-commit side effects for any changes the ingestion recorded.
    /// Best-effort by contract: failures are logged, never propagated. The
    /// committed change rows remain the source of truth.
    fn dispatch_changes(&self, result: &IngestTxResult) {
        if let Some(change) = &result.price_change {
            if let Err(e) = self
                .notifier
                .fan_out_price_change(&self.db, &result.vehicle, change)
            {
                eprintln!("⚠️ Price-change fan-out failed: {e}");
            }
            self.publisher.publish(VehicleEvent::new(
                result.vehicle.id,
                "price_change",
                Some(json!(change.previous_price)),
                Some(json!(change.new_price)),
                change.triggered_by_user_id,
            ));
        }

        if let Some(change) = &result.status_change {
            if let Err(e) = self
                .notifier
                .fan_out_status_change(&self.db, &result.vehicle, change)
            {
                eprintln!("⚠️ Status-change fan-out failed: {e}");
            }
            self.publisher.publish(VehicleEvent::new(
                result.vehicle.id,
                "status_change",
                Some(json!(change.previous_status.as_str())),
                Some(json!(change.new_status.as_str())),
                change.triggered_by_user_id,
            ));
        }
    }

    /// Consolidates a duplicate vehicle into a primary (operational entry
    /// point; ingestion also runs this automatically when a VIN surfaces on a
    /// listing previously tracked VIN-less).
    pub fn merge_vehicles(&self, primary_id: i64, duplicate_id: i64) -> Result<(), ServerError> {
        self.db
            .with_conn(|conn| db::vehicles::merge_vehicles(conn, primary_id, duplicate_id))
    }
}

fn validate_payload(payload: &SnapshotPayload) -> Result<(), ServerError> {
    if payload.url.trim().is_empty() {
        return Err(ServerError::BadRequest("url is required".into()));
    }
    url::Url::parse(&payload.url)
        .map_err(|e| ServerError::BadRequest(format!("invalid url: {e}")))?;
    if payload.source.trim().is_empty() {
        return Err(ServerError::BadRequest("source is required".into()));
    }
    Ok(())
}

fn ingest_tx(
    conn: &mut Connection,
    actor: Actor,
    payload: &SnapshotPayload,
    vin: Option<&str>,
    fingerprint: &str,
) -> Result<IngestTxResult, ServerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = Utc::now().naive_utc();

    let resolution = db::vehicles::resolve_vehicle(&tx, vin, fingerprint, &payload.url)?;

    let (vehicle_id, previous) = match resolution.vehicle_id {
        Some(id) => {
            // A surfaced VIN can reveal that this listing was tracked twice;
            // fold the VIN-less duplicate in before applying the snapshot.
            if let Some(duplicate) = resolution.merge_candidate {
                db::vehicles::merge_vehicles_tx(&tx, id, duplicate)?;
                eprintln!("🔀 Folded duplicate vehicle {duplicate} into {id} during ingest");
            }
            let existing = db::vehicles::get_vehicle(&tx, id)?;
            let previous = (existing.current_price, existing.current_status);
            db::vehicles::apply_snapshot(&tx, &existing, payload, vin, fingerprint, now)?;
            (id, Some(previous))
        }
        None => {
            let id = db::vehicles::insert_vehicle(&tx, payload, vin, fingerprint, now)?;
            (id, None)
        }
    };

    db::vehicles::upsert_source(&tx, vehicle_id, payload.normalized_source(), &payload.url, now)?;

    let snapshot = db::snapshots::insert_snapshot(&tx, vehicle_id, actor.user_id(), payload, now)?;

    // First sighting is a baseline, never a change.
    let mut price_change = None;
    let mut status_change = None;
    if let Some((previous_price, previous_status)) = previous {
        if let Some(delta) = detect_price_change(previous_price, payload.price_cents()) {
            let record =
                db::changes::insert_price_change(&tx, vehicle_id, &delta, actor.user_id(), now)?;
            if delta.is_drop() {
                db::vehicles::increment_price_drop_count(&tx, vehicle_id)?;
            }
            price_change = Some(record);
        }

        // An omitted status observes nothing, so it can never flip the state.
        let new_status = payload.status().unwrap_or(previous_status);
        if let Some((prev, new)) = detect_status_change(previous_status, new_status) {
            status_change = Some(db::changes::insert_status_change(
                &tx,
                vehicle_id,
                prev,
                new,
                actor.user_id(),
                now,
            )?);
        }
    }

    let vehicle = db::vehicles::get_vehicle(&tx, vehicle_id)?;
    tx.commit()?;

    Ok(IngestTxResult {
        vehicle,
        snapshot,
        is_new_vehicle: previous.is_none(),
        price_change,
        status_change,
    })
}
