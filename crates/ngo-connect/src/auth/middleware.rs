use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use super::claims::SessionClaims;
use super::guard::{GuardDecision, RouteGuard};
use super::session::SessionManager;
use super::AuthError;
use crate::marketplace::repository::UserRepository;

/// Response header carrying a re-issued token after the session was refreshed.
pub const SESSION_HEADER: &str = "x-session-token";
pub const SESSION_COOKIE: &str = "session";

#[derive(Clone)]
pub struct SessionLayerState {
    pub sessions: Arc<SessionManager>,
    pub users: Arc<dyn UserRepository>,
    pub guard: Arc<RouteGuard>,
}

/// Bearer header first, then the session cookie.
pub fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let mut parts = value.splitn(2, ' ');
            match (parts.next(), parts.next()) {
                (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("Bearer") => {
                    Some(token.trim().to_string())
                }
                _ => None,
            }
        })
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, token)| *name == SESSION_COOKIE && !token.is_empty())
            .map(|(_, token)| token.to_string())
    })
}

fn redirect_response(location: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(LOCATION, location.to_string())],
        Json(json!({ "redirect": location })),
    )
        .into_response()
}

/// Verify and refresh the presented session, then apply the route guard.
///
/// Invalid or expired tokens are treated as anonymous so public routes keep working; the guard
/// decides whether the path needs a session.
pub async fn enforce_session(
    State(state): State<SessionLayerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = Utc::now();
    let mut reissued = None;

    let claims = match presented_token(request.headers()) {
        Some(token) => match state
            .sessions
            .verify(&token)
            .and_then(|claims| state.sessions.refresh(&claims, state.users.as_ref(), now))
        {
            Ok(refresh) => {
                reissued = refresh.token;
                Some(refresh.claims)
            }
            Err(AuthError::Unauthorized) => None,
            Err(err) => return err.into_response(),
        },
        None => None,
    };

    let path = request.uri().path().to_string();
    if let GuardDecision::Redirect(location) = state.guard.evaluate(&path, claims.as_ref()) {
        debug!(%path, %location, "route guard redirect");
        return redirect_response(&location);
    }

    if let Some(claims) = claims {
        request.extensions_mut().insert(claims);
    }

    let mut response = next.run(request).await;
    if let Some(token) = reissued {
        if let Ok(value) = HeaderValue::from_str(&token) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

/// Extractor for the refreshed session attached by [`enforce_session`].
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(CurrentSession)
            .ok_or(AuthError::Unauthorized)
    }
}
