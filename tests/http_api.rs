use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use ulid::Ulid;

use slotbook::engine::BookingEngine;
use slotbook::http::router;
use slotbook::model::Schedule;
use slotbook::store::Storage;

// ── Test infrastructure ──────────────────────────────────────

fn start_test_app() -> (Router, Storage) {
    let dir = std::env::temp_dir().join(format!("slotbook_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let storage = Storage::open(&dir.join("slotbook.wal")).unwrap();
    let engine = Arc::new(BookingEngine::new(&storage, Schedule::default()));
    (router(engine), storage)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn book(app: &Router, name: &str, date: &str, time: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/reservations",
        Some(json!({ "name": name, "date": date, "time": time })),
    )
    .await
}

async fn seed(app: &Router, date: &str, times: &[&str], capacity: u32) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/slots/seed",
        Some(json!({ "date": date, "times": times, "capacity": capacity })),
    )
    .await
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let (app, _storage) = start_test_app();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"slot booking API running");
}

#[tokio::test]
async fn create_returns_reservation_and_slot() {
    let (app, _storage) = start_test_app();

    let (status, body) = book(&app, "Alice", "2030-01-01", "09:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["name"], "Alice");
    assert_eq!(body["reservation"]["date"], "2030-01-01");
    assert_eq!(body["reservation"]["time"], "09:00");
    assert_eq!(body["slot"]["capacity"], 8);
    assert_eq!(body["slot"]["bookedCount"], 1);
    assert_eq!(body["slot"]["remaining"], 7);

    let id = body["reservation"]["id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/reservations/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, body["reservation"]);
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let (app, _storage) = start_test_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/reservations",
        Some(json!({ "name": "Alice", "date": "2030-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing fields: name, date, time");

    let (status, _) = book(&app, "Alice", "tomorrow", "09:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = book(&app, "  ", "2030-01-01", "09:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/reservations")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, listed) = send(&app, Method::GET, "/reservations", None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn full_slot_is_a_conflict() {
    let (app, _storage) = start_test_app();
    let (status, _) = seed(&app, "2030-01-01", &["09:00"], 1).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = book(&app, "Alice", "2030-01-01", "09:00").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = book(&app, "Bob", "2030-01-01", "09:00").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("no seats left"));

    let (_, listed) = send(&app, Method::GET, "/reservations", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_or_malformed_id_is_not_found() {
    let (app, _storage) = start_test_app();

    let (status, _) = send(&app, Method::GET, &format!("/reservations/{}", Ulid::new()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/reservations/not-an-id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, "/reservations/not-an-id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/reservations/{}", Ulid::new()),
        Some(json!({ "name": "Nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_releases_the_seat() {
    let (app, _storage) = start_test_app();
    let (_, body) = book(&app, "Alice", "2030-01-01", "09:00").await;
    let id = body["reservation"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::DELETE, &format!("/reservations/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "reservation deleted");
    assert_eq!(body["updatedSlot"]["bookedCount"], 0);
    assert_eq!(body["updatedSlot"]["remaining"], 8);

    let (status, _) = send(&app, Method::DELETE, &format!("/reservations/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_moves_between_slots() {
    let (app, _storage) = start_test_app();
    seed(&app, "2030-01-01", &["10:00"], 1).await;
    let (_, alice) = book(&app, "Alice", "2030-01-01", "09:00").await;
    let id = alice["reservation"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/reservations/{id}"),
        Some(json!({ "time": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["time"], "10:00");
    assert_eq!(body["slot"]["bookedCount"], 1);
    assert_eq!(body["slot"]["remaining"], 0);

    // 10:00 is now full; moving Bob there must leave him at 08:00.
    let (_, bob) = book(&app, "Bob", "2030-01-01", "08:00").await;
    let bob_id = bob["reservation"]["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/reservations/{bob_id}"),
        Some(json!({ "time": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, fetched) = send(&app, Method::GET, &format!("/reservations/{bob_id}"), None).await;
    assert_eq!(fetched["time"], "08:00");
}

#[tokio::test]
async fn listing_slots_seeds_defaults_once() {
    let (app, _storage) = start_test_app();

    let (status, body) = send(&app, Method::GET, "/slots", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing query parameter: date");

    let (status, body) = send(&app, Method::GET, "/slots?date=2030-03-01", None).await;
    assert_eq!(status, StatusCode::OK);
    let slots = body.as_array().unwrap();
    assert_eq!(slots.len(), 6);
    assert_eq!(slots[0]["time"], "08:00");
    assert_eq!(slots[5]["time"], "19:00");
    assert!(slots.iter().all(|s| s["remaining"] == 8 && s["bookedCount"] == 0));

    book(&app, "Alice", "2030-03-01", "17:00").await;
    let (_, body) = send(&app, Method::GET, "/slots?date=2030-03-01", None).await;
    let slots = body.as_array().unwrap();
    assert_eq!(slots.len(), 6);
    let evening = slots.iter().find(|s| s["time"] == "17:00").unwrap();
    assert_eq!(evening["remaining"], 7);
}

#[tokio::test]
async fn seeding_reports_inserted_and_existing() {
    let (app, _storage) = start_test_app();

    let (status, body) = seed(&app, "2030-02-01", &["08:00", "09:00"], 4).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "result": { "inserted": 2, "existing": 0 } }));

    let (_, body) = seed(&app, "2030-02-01", &["08:00", "09:00"], 4).await;
    assert_eq!(body["result"], json!({ "inserted": 0, "existing": 2 }));

    let (_, body) = send(&app, Method::GET, "/slots?date=2030-02-01", None).await;
    let slots = body.as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert!(slots.iter().all(|s| s["capacity"] == 4));

    let (status, _) = send(
        &app,
        Method::POST,
        "/slots/seed",
        Some(json!({ "date": "2030-02-02" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = seed(&app, "2030-02-02", &["08:00"], 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = seed(&app, "2030-02-02", &[], 4).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn closed_storage_is_a_server_error() {
    let (app, storage) = start_test_app();
    storage.close().await.unwrap();

    let (status, body) = book(&app, "Alice", "2030-01-01", "09:00").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "storage unavailable, try again");
}
