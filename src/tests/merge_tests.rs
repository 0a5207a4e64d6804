// src/tests/merge_tests.rs

use crate::db::watchlist::WatchPreferences;
use crate::db;
use crate::errors::ServerError;
use crate::pipeline::Actor;
use crate::tests::utils::{civic_payload, count_rows, seed_user, test_pipeline, vinless_payload};
use chrono::Utc;

#[test]
fn merge_moves_history_collapses_watchers_and_retires_duplicate() {
    let pipeline = test_pipeline("merge");
    let db = pipeline.db().clone();

    let alice = seed_user(&db, "alice@example.com");
    let bob = seed_user(&db, "bob@example.com");

    // Primary: the VIN-bearing record with one price change on file.
    let primary = pipeline
        .process_snapshot(Actor::User(alice), &civic_payload("https://dealer.example/a", 21500.0))
        .unwrap()
        .vehicle
        .id;
    pipeline
        .process_snapshot(Actor::User(alice), &civic_payload("https://dealer.example/a", 20900.0))
        .unwrap();

    // Duplicate: the same car tracked VIN-less from another site. Different
    // specs keep the fingerprints apart so it really is a second record.
    let mut other = vinless_payload("https://cl.example/b", 33000.0);
    other.mileage = Some(9_000);
    let duplicate = pipeline
        .process_snapshot(Actor::User(bob), &other)
        .unwrap()
        .vehicle
        .id;
    other.price = Some(32_000.0);
    pipeline.process_snapshot(Actor::User(bob), &other).unwrap();
    assert_ne!(primary, duplicate);

    // Alice watches both records; Bob only the duplicate.
    let now = Utc::now().naive_utc();
    db.with_conn(|conn| {
        db::watchlist::add_entry(conn, alice, primary, None, &WatchPreferences::default(), now)?;
        db::watchlist::add_entry(conn, alice, duplicate, None, &WatchPreferences::default(), now)?;
        db::watchlist::add_entry(conn, bob, duplicate, None, &WatchPreferences::default(), now)?;
        Ok(())
    })
    .unwrap();

    pipeline.merge_vehicles(primary, duplicate).unwrap();

    // Every snapshot and change event now hangs off the primary.
    assert_eq!(count_rows(&db, "vehicles"), 1);
    let orphans: i64 = db
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM snapshots WHERE vehicle_id != ?1",
                [primary],
                |r| r.get(0),
            )
            .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(orphans, 0);
    assert_eq!(count_rows(&db, "snapshots"), 4);
    assert_eq!(count_rows(&db, "price_changes"), 2);

    // Alice's double watch collapsed to one entry; Bob's was repointed.
    let watchers = db
        .with_conn(|conn| db::watchlist::watchers_for_vehicle(conn, primary, None))
        .unwrap();
    assert_eq!(watchers.len(), 2);
    assert!(watchers.iter().all(|w| w.vehicle_id == primary));

    // The duplicate's listing URL now resolves to the primary.
    let resolved = pipeline
        .process_snapshot(Actor::User(bob), &vinless_payload("https://cl.example/b", 32_000.0))
        .unwrap();
    assert_eq!(resolved.vehicle.id, primary);
}

#[test]
fn merging_twice_is_a_defined_error_not_corruption() {
    let pipeline = test_pipeline("merge_twice");
    let db = pipeline.db().clone();

    let user = seed_user(&db, "user@example.com");
    let primary = pipeline
        .process_snapshot(Actor::User(user), &civic_payload("https://dealer.example/a", 21500.0))
        .unwrap()
        .vehicle
        .id;
    let mut other = vinless_payload("https://cl.example/b", 33000.0);
    other.mileage = Some(9_000);
    let duplicate = pipeline
        .process_snapshot(Actor::User(user), &other)
        .unwrap()
        .vehicle
        .id;

    pipeline.merge_vehicles(primary, duplicate).unwrap();

    match pipeline.merge_vehicles(primary, duplicate) {
        Err(ServerError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(count_rows(&db, "vehicles"), 1);
    assert_eq!(count_rows(&db, "snapshots"), 2);
}

#[test]
fn merge_into_self_is_rejected() {
    let pipeline = test_pipeline("merge_self");
    let db = pipeline.db().clone();

    let user = seed_user(&db, "user@example.com");
    let id = pipeline
        .process_snapshot(Actor::User(user), &civic_payload("https://dealer.example/a", 21500.0))
        .unwrap()
        .vehicle
        .id;

    assert!(matches!(
        pipeline.merge_vehicles(id, id),
        Err(ServerError::BadRequest(_))
    ));
}

#[test]
fn failed_merge_leaves_both_vehicles_intact() {
    let pipeline = test_pipeline("merge_atomic");
    let db = pipeline.db().clone();

    let user = seed_user(&db, "user@example.com");
    let primary = pipeline
        .process_snapshot(Actor::User(user), &civic_payload("https://dealer.example/a", 21500.0))
        .unwrap()
        .vehicle
        .id;

    // A duplicate that never existed: the merge must not move anything.
    match pipeline.merge_vehicles(primary, primary + 100) {
        Err(ServerError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(count_rows(&db, "vehicles"), 1);
    assert_eq!(count_rows(&db, "snapshots"), 1);
}
