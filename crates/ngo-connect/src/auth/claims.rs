use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::marketplace::domain::{OnboardingStep, Plan, Role, User, UserId};

/// Signed session payload: who the caller is and what they may currently do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub email: String,
    pub role: Option<Role>,
    pub plan: Plan,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub onboarding: OnboardingStep,
    #[serde(default)]
    pub suspended: bool,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn for_user(user: &User, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            plan: user.plan,
            plan_expires_at: user.plan_expires_at,
            onboarding: user.onboarding,
            suspended: user.suspended,
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(ttl)
                .map_or(i64::MAX, |expires| expires.timestamp()),
        }
    }

    /// True when the authorization-relevant fields differ from the stored user.
    pub fn is_stale(&self, user: &User) -> bool {
        self.role != user.role
            || self.plan != user.plan
            || self.plan_expires_at.map(|at| at.timestamp())
                != user.plan_expires_at.map(|at| at.timestamp())
            || self.onboarding != user.onboarding
            || self.suspended != user.suspended
            || self.email != user.email
    }

    pub fn is_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    /// Where the caller lands by default.
    pub fn home_path(&self) -> &'static str {
        match (self.onboarding.path(), self.role) {
            (Some(step), _) => step,
            (None, Some(role)) => role.dashboard_path(),
            (None, None) => "/onboarding/role",
        }
    }
}

/// Public view of the session returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub user_id: UserId,
    pub email: String,
    pub role: Option<Role>,
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub onboarding: OnboardingStep,
    pub home: &'static str,
}

impl From<&SessionClaims> for SessionView {
    fn from(claims: &SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email.clone(),
            role: claims.role,
            plan: claims.plan,
            plan_expires_at: claims.plan_expires_at,
            onboarding: claims.onboarding,
            home: claims.home_path(),
        }
    }
}
