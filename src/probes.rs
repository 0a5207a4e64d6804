// src/probes.rs
//
// Staleness reconciliation: a recurring pass selects active vehicles nobody
// has observed in a week and probes their first known listing URL with a
// lightweight HEAD request. A dead listing (404/410) is fed back through the
// regular pipeline as a system-actor submission carrying status "removed", so
// watchers hear about it exactly the way they hear about live refreshes.

use crate::db::probes::HeadCheckResult;
use crate::db;
use crate::domain::snapshot::SnapshotPayload;
use crate::domain::vehicle::VehicleStatus;
use crate::errors::ServerError;
use crate::pipeline::{Actor, Pipeline};
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use reqwest::blocking::Client;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A vehicle is stale once nobody has observed it for this long.
pub const STALE_AFTER_DAYS: i64 = 7;
/// Per-run batch bound, to keep a reconciliation pass cheap.
pub const BATCH_LIMIT: i64 = 100;
/// Concurrent probe bound, to respect third-party rate limits.
const WORKERS: usize = 5;
const PROBE_TIMEOUT_SECS: u64 = 10;
const MAX_ATTEMPTS: u32 = 3;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; CarwatchBot/1.0)";

/// Spawns the recurring reconciliation loop. Interval defaults to daily;
/// CARWATCH_PROBE_INTERVAL_SECS overrides it for operational tuning.
pub fn start_scheduler(pipeline: Pipeline) {
    let interval = std::env::var("CARWATCH_PROBE_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(24 * 60 * 60);

    std::thread::spawn(move || {
        eprintln!("🧵 Staleness scheduler started (every {interval}s)");
        loop {
            std::thread::sleep(Duration::from_secs(interval));
            match run_reconciliation(&pipeline) {
                Ok(count) => eprintln!("✅ Reconciliation pass probed {count} vehicle(s)"),
                Err(e) => eprintln!("⚠️ Reconciliation pass failed: {e}"),
            }
        }
    });
}

/// One reconciliation pass: select the stale batch and probe it on a bounded
/// worker pool. Returns how many probes ran.
pub fn run_reconciliation(pipeline: &Pipeline) -> Result<usize, ServerError> {
    let now = Utc::now().naive_utc();
    let cutoff = now - ChronoDuration::days(STALE_AFTER_DAYS);

    let stale = pipeline
        .db()
        .with_conn(|conn| db::vehicles::select_stale_active(conn, cutoff, BATCH_LIMIT))?;
    if stale.is_empty() {
        return Ok(0);
    }

    let total = stale.len();
    eprintln!("🔍 Probing {total} stale vehicle(s)");

    let queue: Arc<Mutex<VecDeque<(i64, String)>>> = Arc::new(Mutex::new(stale.into()));
    let mut handles = Vec::new();

    for _ in 0..WORKERS.min(total) {
        let queue = Arc::clone(&queue);
        let pipeline = pipeline.clone();
        handles.push(std::thread::spawn(move || {
            let client = match probe_client() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("⚠️ Probe client init failed: {e}");
                    return;
                }
            };
            loop {
                let job = queue.lock().ok().and_then(|mut q| q.pop_front());
                let Some((vehicle_id, url)) = job else {
                    break;
                };
                if let Err(e) = probe_one(&pipeline, &client, vehicle_id, &url) {
                    eprintln!("⚠️ Probe for vehicle {vehicle_id} failed: {e}");
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(total)
}

fn probe_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .build()
}

/// Executes one probe and records its result row; a dead classification on a
/// still-active vehicle injects the synthetic removal submission.
fn probe_one(
    pipeline: &Pipeline,
    client: &Client,
    vehicle_id: i64,
    url: &str,
) -> Result<(), ServerError> {
    let scheduled_at = Utc::now().naive_utc();
    let result = head_check(client, url);
    let executed_at = Utc::now().naive_utc();

    pipeline.db().with_conn(|conn| {
        db::probes::record_head_check(conn, vehicle_id, url, scheduled_at, executed_at, &result)
    })?;

    eprintln!(
        "🔎 HEAD {url}: {} ({})",
        result.http_status,
        if result.is_alive { "alive" } else { "dead" }
    );

    if result.http_status == 404 || result.http_status == 410 {
        let vehicle = pipeline
            .db()
            .with_conn(|conn| db::vehicles::get_vehicle(conn, vehicle_id))?;
        if vehicle.current_status == VehicleStatus::Active {
            let source = pipeline
                .db()
                .with_conn(|conn| source_for_url(conn, vehicle_id, url))?
                .unwrap_or_else(|| "unknown".to_string());
            let payload = SnapshotPayload {
                url: url.to_string(),
                source,
                status: Some("removed".to_string()),
                ..Default::default()
            };
            pipeline.process_snapshot(Actor::System, &payload)?;
        }
    }

    Ok(())
}

fn source_for_url(
    conn: &rusqlite::Connection,
    vehicle_id: i64,
    url: &str,
) -> Result<Option<String>, ServerError> {
    use rusqlite::OptionalExtension;
    conn.query_row(
        "SELECT source FROM vehicle_sources WHERE vehicle_id = ?1 AND url = ?2",
        rusqlite::params![vehicle_id, url],
        |r| r.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// One HEAD request with bounded retries. Transport failures back off
/// exponentially with a little jitter; HTTP responses of any status are a
/// completed check. A probe that never gets a response is recorded as
/// status 0 / not alive.
fn head_check(client: &Client, url: &str) -> HeadCheckResult {
    for attempt in 1..=MAX_ATTEMPTS {
        match client.head(url).send() {
            Ok(resp) => {
                let http_status = resp.status().as_u16();
                let is_alive = (200..400).contains(&http_status);
                let redirect_url = if resp.url().as_str() != url {
                    Some(resp.url().to_string())
                } else {
                    None
                };
                return HeadCheckResult {
                    http_status,
                    is_alive,
                    redirect_url,
                };
            }
            Err(e) => {
                eprintln!("⚠️ HEAD {url} attempt {attempt} failed: {e}");
                if attempt < MAX_ATTEMPTS {
                    let base = 5 * 2u64.pow(attempt - 1);
                    let jitter = rand::thread_rng().gen_range(0..=2);
                    std::thread::sleep(Duration::from_secs(base + jitter));
                }
            }
        }
    }

    HeadCheckResult {
        http_status: 0,
        is_alive: false,
        redirect_url: None,
    }
}
