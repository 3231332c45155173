use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::info;

use super::claims::SessionClaims;
use super::AuthError;
use crate::config::AuthConfig;
use crate::marketplace::domain::{Plan, User};
use crate::marketplace::plans::is_plan_expired;
use crate::marketplace::repository::{RepositoryError, UserRepository};

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
}

/// Outcome of re-reading the user behind a verified token.
#[derive(Debug, Clone)]
pub struct SessionRefresh {
    pub claims: SessionClaims,
    /// Present only when the stored user no longer matches the presented token.
    pub token: Option<String>,
    pub downgraded: bool,
}

/// Issues and verifies HS256 session tokens.
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let ttl = Duration::from_std(config.session_ttl).unwrap_or_else(|_| Duration::days(1));

        Self {
            encoding_key: EncodingKey::from_secret(&config.session_secret),
            decoding_key: DecodingKey::from_secret(&config.session_secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedSession, AuthError> {
        let claims = SessionClaims::for_user(user, now, self.ttl);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Internal(format!("failed to sign session: {err}")))?;
        Ok(IssuedSession { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature
                | ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::Unauthorized,
                other => AuthError::Internal(format!("failed to validate session: {other:?}")),
            })
    }

    /// Rebuild the claims from the stored user, downgrading a lapsed plan first.
    pub fn refresh(
        &self,
        claims: &SessionClaims,
        users: &dyn UserRepository,
        now: DateTime<Utc>,
    ) -> Result<SessionRefresh, AuthError> {
        let user = users.fetch(&claims.sub)?.ok_or(AuthError::Unauthorized)?;
        let (user, downgraded) = sync_plan(users, user, now)?;

        if !claims.is_stale(&user) {
            return Ok(SessionRefresh {
                claims: claims.clone(),
                token: None,
                downgraded,
            });
        }

        let issued = self.issue(&user, now)?;
        Ok(SessionRefresh {
            claims: issued.claims,
            token: Some(issued.token),
            downgraded,
        })
    }
}

/// Persist the free plan for a user whose paid plan has lapsed.
pub fn sync_plan(
    users: &dyn UserRepository,
    mut user: User,
    now: DateTime<Utc>,
) -> Result<(User, bool), RepositoryError> {
    if !is_plan_expired(&user, now) {
        return Ok((user, false));
    }

    user.plan = Plan::Free;
    user.plan_expires_at = None;
    users.update(user.clone())?;
    info!(user = %user.id, "plus plan expired; downgraded to free");
    Ok((user, true))
}
