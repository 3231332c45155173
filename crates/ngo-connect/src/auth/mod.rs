//! Session tokens, password hashing and request-level route protection.

pub mod claims;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod session;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::marketplace::repository::RepositoryError;

pub use claims::{SessionClaims, SessionView};
pub use guard::{GuardAction, GuardDecision, GuardRequest, GuardRule, RouteGuard};
pub use middleware::{enforce_session, CurrentSession, SessionLayerState, SESSION_HEADER};
pub use password::{hash_password, verify_password};
pub use session::{IssuedSession, SessionManager, SessionRefresh};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthorized,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },
    #[error("authentication failure: {0}")]
    Internal(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::WeakPassword { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::Internal(_) | AuthError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
