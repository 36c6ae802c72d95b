//! Session valve middleware.
//!
//! Reads the session cookie, hands the handler an explicit
//! [`RequestContext`] through request extensions, runs the handler inside
//! [`SessionValve::invoke`](sc_sessions::SessionValve::invoke) and turns any
//! cookie the context queued (new session, failover re-key) into a
//! `Set-Cookie` header.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use sc_sessions::RequestContext;

use crate::state::AppState;

/// Attach via `axum::middleware::from_fn_with_state`.
pub async fn session_valve(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = state.config.server.cookie_name.as_str();
    let requested = session_id_from_cookies(req.headers(), cookie_name);
    let ctx = Arc::new(RequestContext::new(requested));
    req.extensions_mut().insert(ctx.clone());

    let mut response = state.valve.invoke(ctx.clone(), |_| next.run(req)).await;

    if let Some(id) = ctx.session_cookie() {
        match HeaderValue::from_str(&set_cookie_value(cookie_name, &id)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(session_id = %id, error = %e, "unencodable session cookie"),
        }
    }
    response
}

/// The session id from the first non-empty `name=value` pair across all
/// `Cookie` headers.
pub fn session_id_from_cookies(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.trim_matches('"').to_owned())
}

fn set_cookie_value(name: &str, id: &str) -> String {
    format!("{name}={id}; Path=/; HttpOnly; SameSite=Lax")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for v in values {
            map.append(header::COOKIE, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn finds_named_cookie() {
        let h = headers(&["theme=dark; SESSIONID=abc.A; lang=en"]);
        assert_eq!(session_id_from_cookies(&h, "SESSIONID").as_deref(), Some("abc.A"));
    }

    #[test]
    fn searches_every_cookie_header() {
        let h = headers(&["theme=dark", "SESSIONID=\"xyz\""]);
        assert_eq!(session_id_from_cookies(&h, "SESSIONID").as_deref(), Some("xyz"));
    }

    #[test]
    fn empty_or_missing_is_none() {
        assert!(session_id_from_cookies(&headers(&["SESSIONID="]), "SESSIONID").is_none());
        assert!(session_id_from_cookies(&headers(&[]), "SESSIONID").is_none());
        assert!(session_id_from_cookies(&headers(&["XSESSIONID=1"]), "SESSIONID").is_none());
    }
}
