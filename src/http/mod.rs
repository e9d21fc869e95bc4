//! HTTP surface over [`BookingEngine`].
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /reservations` | [`handler::create_reservation`] |
//! | `GET /reservations` | [`handler::list_reservations`] |
//! | `GET /reservations/{id}` | [`handler::get_reservation`] |
//! | `PUT /reservations/{id}` | [`handler::update_reservation`] |
//! | `DELETE /reservations/{id}` | [`handler::delete_reservation`] |
//! | `GET /slots?date=YYYY-MM-DD` | [`handler::list_slots`] |
//! | `POST /slots/seed` | [`handler::seed_slots`] |

pub mod handler;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::{BookingEngine, EngineError};
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
}

pub fn router(engine: Arc<BookingEngine>) -> Router {
    Router::new()
        .route("/", get(handler::health))
        .route(
            "/reservations",
            get(handler::list_reservations).post(handler::create_reservation),
        )
        .route(
            "/reservations/{id}",
            get(handler::get_reservation)
                .put(handler::update_reservation)
                .delete(handler::delete_reservation),
        )
        .route("/slots", get(handler::list_slots))
        .route("/slots/seed", post(handler::seed_slots))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Count and time every routed request by its route template.
async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(observability::HTTP_REQUESTS_TOTAL, "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(observability::HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(started.elapsed().as_secs_f64());
    response
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Engine(e) => match e {
                EngineError::Validation(_) | EngineError::LimitExceeded(_) => {
                    StatusCode::BAD_REQUEST
                }
                EngineError::CapacityExceeded { .. } | EngineError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Engine(EngineError::Storage(detail)) => {
                error!(target: "storage", error = %detail, "storage error");
                "storage unavailable, try again".to_owned()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
