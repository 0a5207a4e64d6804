// src/tests/router_tests.rs
//
// Drives the JSON API through the real router: build an http::Request by
// hand, call handle(), read the body back out.

use crate::errors::ServerError;
use crate::pipeline::{Actor, Pipeline};
use crate::router::handle;
use crate::tests::utils::{civic_payload, seed_user, test_pipeline};
use astra::{Body, Request};
use http::Method;
use std::io::Read;

fn request(method: Method, uri: &str, user_id: Option<i64>, body: Option<String>) -> Request {
    let mut req = Request::new(body.map(|b| Body::from(b)).unwrap_or_else(Body::empty));
    *req.method_mut() = method;
    *req.uri_mut() = uri.parse().unwrap();
    if let Some(id) = user_id {
        req.headers_mut()
            .insert("X-User-Id", id.to_string().parse().unwrap());
    }
    req
}

fn body_json(resp: astra::Response) -> serde_json::Value {
    let mut body = String::new();
    resp.into_body().reader().read_to_string(&mut body).unwrap();
    serde_json::from_str(&body).unwrap()
}

fn snapshot_body(url: &str, price: f64) -> String {
    serde_json::to_string(&civic_payload(url, price)).unwrap()
}

#[test]
fn post_snapshot_creates_vehicle_then_reuses_it() {
    let pipeline = test_pipeline("router_snapshot");
    let user = seed_user(pipeline.db(), "u@example.com");

    let resp = handle(
        request(
            Method::POST,
            "/api/snapshots",
            Some(user),
            Some(snapshot_body("https://cars.example/a", 21500.0)),
        ),
        &pipeline,
    )
    .unwrap();
    assert_eq!(resp.status(), 201);
    let json = body_json(resp);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["isNewVehicle"], true);
    let vehicle_id = json["data"]["vehicle"]["id"].as_i64().unwrap();

    let resp = handle(
        request(
            Method::POST,
            "/api/snapshots",
            Some(user),
            Some(snapshot_body("https://cars.example/a", 21500.0)),
        ),
        &pipeline,
    )
    .unwrap();
    let json = body_json(resp);
    assert_eq!(json["data"]["isNewVehicle"], false);
    assert_eq!(json["data"]["vehicle"]["id"].as_i64().unwrap(), vehicle_id);
}

#[test]
fn post_snapshot_requires_user_header() {
    let pipeline = test_pipeline("router_no_user");

    let result = handle(
        request(
            Method::POST,
            "/api/snapshots",
            None,
            Some(snapshot_body("https://cars.example/a", 21500.0)),
        ),
        &pipeline,
    );
    assert!(matches!(result, Err(ServerError::BadRequest(_))));
}

#[test]
fn vehicle_detail_includes_history_and_freshness() {
    let pipeline = test_pipeline("router_detail");
    let user = seed_user(pipeline.db(), "u@example.com");

    let vehicle_id = pipeline
        .process_snapshot(Actor::User(user), &civic_payload("https://cars.example/a", 200.0))
        .unwrap()
        .vehicle
        .id;
    pipeline
        .process_snapshot(Actor::User(user), &civic_payload("https://cars.example/a", 180.0))
        .unwrap();

    let resp = handle(
        request(Method::GET, &format!("/api/vehicles/{vehicle_id}"), None, None),
        &pipeline,
    )
    .unwrap();
    let json = body_json(resp);

    assert_eq!(json["data"]["freshness"], "fresh");
    assert_eq!(json["data"]["snapshots"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["priceChanges"].as_array().unwrap().len(), 1);
    assert_eq!(
        json["data"]["priceChanges"][0]["changeAmount"].as_i64(),
        Some(-2000)
    );
}

#[test]
fn missing_vehicle_is_not_found() {
    let pipeline = test_pipeline("router_404");
    let result = handle(request(Method::GET, "/api/vehicles/999", None, None), &pipeline);
    assert!(matches!(result, Err(ServerError::NotFound)));
}

#[test]
fn watchlist_roundtrip_add_update_remove() {
    let pipeline = test_pipeline("router_watchlist");
    let user = seed_user(pipeline.db(), "u@example.com");

    let vehicle_id = pipeline
        .process_snapshot(Actor::User(user), &civic_payload("https://cars.example/a", 21500.0))
        .unwrap()
        .vehicle
        .id;

    // Add
    let resp = handle(
        request(
            Method::POST,
            "/api/watchlist",
            Some(user),
            Some(format!(
                r#"{{"vehicleId": {vehicle_id}, "targetPrice": 1900000}}"#
            )),
        ),
        &pipeline,
    )
    .unwrap();
    assert_eq!(resp.status(), 201);
    let json = body_json(resp);
    let entry_id = json["data"]["id"].as_i64().unwrap();
    // Price at time of adding is captured from the vehicle.
    assert_eq!(json["data"]["priceWhenAdded"].as_i64(), Some(2_150_000));

    // Adding again is a conflict.
    let result = handle(
        request(
            Method::POST,
            "/api/watchlist",
            Some(user),
            Some(format!(r#"{{"vehicleId": {vehicle_id}}}"#)),
        ),
        &pipeline,
    );
    assert!(matches!(result, Err(ServerError::Conflict(_))));

    // Update preferences.
    let resp = handle(
        request(
            Method::PATCH,
            &format!("/api/watchlist/{entry_id}"),
            Some(user),
            Some(r#"{"notifyPriceRise": true, "priceDropThreshold": 50000}"#.to_string()),
        ),
        &pipeline,
    )
    .unwrap();
    let json = body_json(resp);
    assert_eq!(json["data"]["notifyPriceRise"], true);
    assert_eq!(json["data"]["priceDropThreshold"].as_i64(), Some(50_000));

    // List shows the entry with its vehicle attached.
    let resp = handle(request(Method::GET, "/api/watchlist", Some(user), None), &pipeline).unwrap();
    let json = body_json(resp);
    assert_eq!(json["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(
        json["data"]["items"][0]["vehicle"]["id"].as_i64(),
        Some(vehicle_id)
    );

    // Remove.
    handle(
        request(
            Method::DELETE,
            &format!("/api/watchlist/{entry_id}"),
            Some(user),
            None,
        ),
        &pipeline,
    )
    .unwrap();
    let resp = handle(request(Method::GET, "/api/watchlist", Some(user), None), &pipeline).unwrap();
    let json = body_json(resp);
    assert_eq!(json["data"]["items"].as_array().unwrap().len(), 0);
}

#[test]
fn notifications_unread_flow() {
    let pipeline = test_pipeline("router_notifications");
    let db = pipeline.db().clone();
    let submitter = seed_user(&db, "submitter@example.com");
    let watcher = seed_user(&db, "watcher@example.com");

    let vehicle_id = pipeline
        .process_snapshot(Actor::User(submitter), &civic_payload("https://cars.example/a", 200.0))
        .unwrap()
        .vehicle
        .id;
    handle(
        request(
            Method::POST,
            "/api/watchlist",
            Some(watcher),
            Some(format!(r#"{{"vehicleId": {vehicle_id}}}"#)),
        ),
        &pipeline,
    )
    .unwrap();
    pipeline
        .process_snapshot(Actor::User(submitter), &civic_payload("https://cars.example/a", 180.0))
        .unwrap();

    let resp = handle(
        request(Method::GET, "/api/notifications/unread-count", Some(watcher), None),
        &pipeline,
    )
    .unwrap();
    assert_eq!(body_json(resp)["data"]["count"].as_i64(), Some(1));

    let resp = handle(
        request(Method::GET, "/api/notifications?unreadOnly=true", Some(watcher), None),
        &pipeline,
    )
    .unwrap();
    let json = body_json(resp);
    let items = json["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let notification_id = items[0]["id"].as_i64().unwrap();
    assert_eq!(items[0]["type"], "PRICE_DROP");

    handle(
        request(
            Method::POST,
            &format!("/api/notifications/{notification_id}/read"),
            Some(watcher),
            None,
        ),
        &pipeline,
    )
    .unwrap();

    let resp = handle(
        request(Method::GET, "/api/notifications/unread-count", Some(watcher), None),
        &pipeline,
    )
    .unwrap();
    assert_eq!(body_json(resp)["data"]["count"].as_i64(), Some(0));
}

#[test]
fn unknown_route_is_not_found() {
    let pipeline = test_pipeline("router_unknown");
    let result = handle(request(Method::GET, "/api/nope", None, None), &pipeline);
    assert!(matches!(result, Err(ServerError::NotFound)));
}
