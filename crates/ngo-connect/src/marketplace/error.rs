use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::domain::{Role, User, UserId};
use super::repository::{Collections, RepositoryError};
use crate::auth::AuthError;

/// Error raised by the marketplace services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{what} limit of {limit} reached for the current plan")]
    QuotaExceeded { what: &'static str, limit: u32 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("cannot {action} a {entity} that is {state}")]
    InvalidState {
        entity: &'static str,
        state: &'static str,
        action: &'static str,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ServiceError::NotFound("record"),
            RepositoryError::Conflict => ServiceError::Conflict("record already exists".into()),
            other => ServiceError::Repository(other),
        }
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Invalid(_) | ServiceError::InvalidState { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Auth(err) => err.status(),
            ServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ServiceError::QuotaExceeded { what, limit } => json!({
                "error": self.to_string(),
                "quota": what,
                "limit": limit,
                "upgrade": "/pricing",
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Load an active account, failing when it is missing or suspended.
pub(crate) fn active_user(collections: &Collections, id: &UserId) -> Result<User, ServiceError> {
    let user = collections
        .users
        .fetch(id)?
        .ok_or(ServiceError::NotFound("user"))?;
    if user.suspended {
        return Err(ServiceError::Forbidden("account is suspended".into()));
    }
    Ok(user)
}

/// Load an onboarded account acting in `role`.
pub(crate) fn acting_as(
    collections: &Collections,
    id: &UserId,
    role: Role,
) -> Result<User, ServiceError> {
    let user = active_user(collections, id)?;
    if !user.is_role(role) {
        return Err(ServiceError::Forbidden(format!(
            "only {} accounts may do this",
            role.label()
        )));
    }
    if !user.onboarding.is_complete() {
        return Err(ServiceError::Forbidden("onboarding is not complete".into()));
    }
    Ok(user)
}
