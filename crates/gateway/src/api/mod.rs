pub mod health;
pub mod session;
pub mod valve;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use sc_domain::error::Error;

use crate::state::AppState;

/// Build the full API router.
///
/// Session routes run behind the session valve middleware, which resolves
/// the session cookie and snapshots the session after the handler.
/// `/health` stays outside so health checks never touch the session cache.
pub fn router(state: AppState) -> Router<AppState> {
    let sessions = Router::new()
        .route("/v1/session", get(session::get_session))
        .route(
            "/v1/session/attributes/:name",
            get(session::get_attribute)
                .put(session::put_attribute)
                .delete(session::delete_attribute),
        )
        .route("/v1/session/invalidate", post(session::invalidate))
        .route_layer(middleware::from_fn_with_state(state, valve::session_valve));

    Router::new()
        .route("/health", get(health::health))
        .merge(sessions)
}

// ── Error mapping ─────────────────────────────────────────────────────

/// Session-layer error rendered as `{ "error": msg }`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::NotSerializable { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "session request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub(crate) fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("{what} not found") })),
    )
        .into_response()
}
