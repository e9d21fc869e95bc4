//! Request handlers. Each one unpacks the request, calls the engine and wraps
//! the result; every rule lives in the engine.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{Booked, Reservation, ReservationChanges, SeedOutcome, SlotView};

use super::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateReservationBody {
    pub name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    #[serde(rename = "updatedSlot")]
    pub updated_slot: Option<SlotView>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedBody {
    pub date: Option<String>,
    pub times: Option<Vec<String>>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub ok: bool,
    pub result: SeedOutcome,
}

fn parse_id(raw: &str) -> ApiResult<Ulid> {
    Ulid::from_string(raw).map_err(|_| ApiError::NotFound(format!("reservation {raw} not found")))
}

/// GET /
pub async fn health() -> &'static str {
    "slot booking API running"
}

/// POST /reservations
pub async fn create_reservation(
    State(state): State<AppState>,
    body: Result<Json<CreateReservationBody>, JsonRejection>,
) -> ApiResult<Json<Booked>> {
    let Json(body) = body?;
    let (Some(name), Some(date), Some(time)) = (body.name, body.date, body.time) else {
        return Err(ApiError::bad_request("missing fields: name, date, time"));
    };
    let booked = state.engine.create_reservation(&name, &date, &time).await?;
    Ok(Json(booked))
}

/// GET /reservations
pub async fn list_reservations(State(state): State<AppState>) -> Json<Vec<Reservation>> {
    Json(state.engine.list_reservations().await)
}

/// GET /reservations/{id}
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Reservation>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.get_reservation(id).await?))
}

/// PUT /reservations/{id}
pub async fn update_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ReservationChanges>, JsonRejection>,
) -> ApiResult<Json<Booked>> {
    let id = parse_id(&id)?;
    let Json(changes) = body?;
    Ok(Json(state.engine.update_reservation(id, changes).await?))
}

/// DELETE /reservations/{id}
pub async fn delete_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = parse_id(&id)?;
    let cancelled = state.engine.delete_reservation(id).await?;
    Ok(Json(DeleteResponse {
        message: "reservation deleted",
        updated_slot: cancelled.slot,
    }))
}

/// GET /slots?date=YYYY-MM-DD
pub async fn list_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> ApiResult<Json<Vec<SlotView>>> {
    let date = query
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing query parameter: date"))?;
    let engine = &state.engine;
    let slots = engine.list_slots_for_date(&date, engine.schedule()).await?;
    Ok(Json(slots))
}

/// POST /slots/seed
pub async fn seed_slots(
    State(state): State<AppState>,
    body: Result<Json<SeedBody>, JsonRejection>,
) -> ApiResult<Json<SeedResponse>> {
    let Json(body) = body?;
    let (Some(date), Some(times)) = (body.date, body.times) else {
        return Err(ApiError::bad_request(
            "invalid body, expected { date, times: [..], capacity }",
        ));
    };
    let capacity = body
        .capacity
        .unwrap_or(state.engine.schedule().capacity);
    let result = state.engine.seed_slots(&date, &times, capacity).await?;
    Ok(Json(SeedResponse { ok: true, result }))
}
