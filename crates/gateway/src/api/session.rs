//! Session endpoints.  Every handler runs behind the session valve and
//! reaches its session through the request's [`RequestContext`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;

use sc_sessions::{AttributeValue, ClusteredSession, RequestContext};

use super::{not_found, ApiError};
use crate::state::AppState;

type Ctx = Extension<Arc<RequestContext>>;

fn session_info(session: &ClusteredSession) -> Result<serde_json::Value, ApiError> {
    Ok(serde_json::json!({
        "id": session.id(),
        "is_new": session.is_new()?,
        "creation_time": session.creation_time()?,
        "last_accessed_time": session.last_accessed_time()?,
        "max_inactive_interval": session.max_inactive_interval(),
        "attributes": session.attribute_names()?,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Current session, created if the request carries none.
pub async fn get_session(
    State(state): State<AppState>,
    Extension(ctx): Ctx,
) -> Result<Response, ApiError> {
    let Some(session) = ctx.session(&state.manager, true).await else {
        return Ok(not_found("session"));
    };
    Ok(Json(session_info(&session)?).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /v1/session/attributes/:name
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_attribute(
    State(state): State<AppState>,
    Extension(ctx): Ctx,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let Some(session) = ctx.session(&state.manager, false).await else {
        return Ok(not_found("session"));
    };
    let Some(value) = session.get_attribute(&name)? else {
        return Ok(not_found("attribute"));
    };
    Ok(Json(serde_json::json!({
        "name": name,
        "kind": value.kind(),
        "value": value.as_json(),
        "local": !value.is_serializable(),
    }))
    .into_response())
}

/// Store the JSON body under `name`.  A `null` body removes the attribute.
pub async fn put_attribute(
    State(state): State<AppState>,
    Extension(ctx): Ctx,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let Some(session) = ctx.session(&state.manager, true).await else {
        return Ok(not_found("session"));
    };
    session.set_attribute_value(&name, AttributeValue::json(body))?;
    Ok(Json(serde_json::json!({ "name": name, "session_id": session.id() })).into_response())
}

pub async fn delete_attribute(
    State(state): State<AppState>,
    Extension(ctx): Ctx,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let Some(session) = ctx.session(&state.manager, false).await else {
        return Ok(not_found("session"));
    };
    session.remove_attribute(&name)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/session/invalidate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn invalidate(
    State(state): State<AppState>,
    Extension(ctx): Ctx,
) -> Result<Response, ApiError> {
    let Some(session) = ctx.session(&state.manager, false).await else {
        return Ok(not_found("session"));
    };
    session.invalidate()?;
    tracing::debug!(session_id = %session.id(), "session invalidated by client");
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use sc_domain::config::Config;
    use sc_sessions::SessionStore;
    use tower::ServiceExt;

    fn app() -> (AppState, axum::Router) {
        let state = crate::bootstrap::build_app_state(Arc::new(Config::default())).unwrap();
        let router = crate::api::router(state.clone()).with_state(state.clone());
        (state, router)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn cookie_of(response: &Response) -> String {
        let raw = response.headers()[header::SET_COOKIE].to_str().unwrap();
        let pair = raw.split(';').next().unwrap();
        pair.split_once('=').unwrap().1.to_owned()
    }

    #[tokio::test]
    async fn first_request_creates_session_and_sets_cookie() {
        let (state, app) = app();
        let response = app
            .oneshot(Request::get("/v1/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = cookie_of(&response);
        let info = body_json(response).await;
        assert_eq!(info["id"], serde_json::json!(id));
        assert_eq!(info["is_new"], serde_json::json!(true));
        // Instant snapshot pushed it.
        assert!(state.manager.store().get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn attributes_round_trip_through_cookie() {
        let (_state, app) = app();
        let put = app
            .clone()
            .oneshot(
                Request::put("/v1/session/attributes/cart")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"items":[1,2]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);
        let id = cookie_of(&put);

        let get = app
            .clone()
            .oneshot(
                Request::get("/v1/session/attributes/cart")
                    .header(header::COOKIE, format!("SESSIONID={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::OK);
        assert!(get.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(get).await;
        assert_eq!(body["value"], serde_json::json!({ "items": [1, 2] }));

        let missing = app
            .oneshot(
                Request::get("/v1/session/attributes/nope")
                    .header(header::COOKIE, format!("SESSIONID={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalidate_then_lookup_is_not_found() {
        let (state, app) = app();
        let session = state.manager.create_session().await;
        let id = session.id();

        let response = app
            .clone()
            .oneshot(
                Request::post("/v1/session/invalidate")
                    .header(header::COOKIE, format!("SESSIONID={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!session.is_valid());

        let response = app
            .oneshot(
                Request::delete("/v1/session/attributes/x")
                    .header(header::COOKIE, format!("SESSIONID={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_does_not_create_sessions() {
        let (state, app) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["sessions"], serde_json::json!(0));
        assert_eq!(state.manager.session_count(), 0);
    }
}
