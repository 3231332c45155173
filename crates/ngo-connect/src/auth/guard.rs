//! Priority-ordered route protection.
//!
//! Each rule pairs a predicate over the request path and current session with an action. Rules
//! are evaluated in order and the first match decides; a request matching no rule is allowed.

use std::fmt;

use super::claims::SessionClaims;
use crate::marketplace::domain::{OnboardingStep, Plan, Role};

pub const ONBOARDING_PREFIX: &str = "/api/v1/onboarding";
pub const BILLING_PREFIX: &str = "/api/v1/billing";
pub const SESSION_PATH: &str = "/api/v1/me";
pub const ADMIN_PREFIX: &str = "/api/v1/admin";
pub const NGO_PREFIX: &str = "/api/v1/ngo";
pub const VOLUNTEER_PREFIX: &str = "/api/v1/volunteer";

pub const PROTECTED_PREFIXES: [&str; 6] = [
    ONBOARDING_PREFIX,
    SESSION_PATH,
    VOLUNTEER_PREFIX,
    NGO_PREFIX,
    ADMIN_PREFIX,
    BILLING_PREFIX,
];

pub const PLUS_ONLY_PREFIXES: [&str; 1] = ["/api/v1/ngo/analytics"];

pub const LOGIN_PATH: &str = "/login";
pub const SUSPENDED_PATH: &str = "/suspended";
pub const PRICING_PATH: &str = "/pricing";

/// Segment-aware prefix match: `/api/v1/ngo` covers `/api/v1/ngo/jobs` but not `/api/v1/ngos`.
pub fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES
        .iter()
        .any(|prefix| is_under(path, prefix))
}

/// What the guard sees for one request.
#[derive(Debug, Clone, Copy)]
pub struct GuardRequest<'a> {
    pub path: &'a str,
    pub session: Option<&'a SessionClaims>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Where a matching rule sends the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    RedirectTo(&'static str),
    /// The session's current onboarding step.
    OnboardingStep,
    /// The dashboard of the session's role.
    RoleDashboard,
}

impl GuardAction {
    fn resolve(&self, request: &GuardRequest<'_>) -> String {
        match self {
            GuardAction::RedirectTo(path) => (*path).to_string(),
            GuardAction::OnboardingStep | GuardAction::RoleDashboard => request
                .session
                .map(|session| session.home_path())
                .unwrap_or(LOGIN_PATH)
                .to_string(),
        }
    }
}

type Predicate = Box<dyn Fn(&GuardRequest<'_>) -> bool + Send + Sync>;

pub struct GuardRule {
    pub name: &'static str,
    predicate: Predicate,
    pub action: GuardAction,
}

impl GuardRule {
    pub fn new<F>(name: &'static str, predicate: F, action: GuardAction) -> Self
    where
        F: Fn(&GuardRequest<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Box::new(predicate),
            action,
        }
    }

    pub fn matches(&self, request: &GuardRequest<'_>) -> bool {
        (self.predicate)(request)
    }
}

impl fmt::Debug for GuardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardRule")
            .field("name", &self.name)
            .field("action", &self.action)
            .finish()
    }
}

#[derive(Debug)]
pub struct RouteGuard {
    rules: Vec<GuardRule>,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::standard()
    }
}

impl RouteGuard {
    pub fn new(rules: Vec<GuardRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[GuardRule] {
        &self.rules
    }

    /// First matching rule wins.
    pub fn evaluate(&self, path: &str, session: Option<&SessionClaims>) -> GuardDecision {
        let request = GuardRequest { path, session };
        self.rules
            .iter()
            .find(|rule| rule.matches(&request))
            .map(|rule| GuardDecision::Redirect(rule.action.resolve(&request)))
            .unwrap_or(GuardDecision::Allow)
    }

    /// Name of the rule that decides `path`, for diagnostics.
    pub fn matching_rule(&self, path: &str, session: Option<&SessionClaims>) -> Option<&'static str> {
        let request = GuardRequest { path, session };
        self.rules
            .iter()
            .find(|rule| rule.matches(&request))
            .map(|rule| rule.name)
    }

    pub fn standard() -> Self {
        Self::new(vec![
            GuardRule::new(
                "require_session",
                |request| request.session.is_none() && is_protected(request.path),
                GuardAction::RedirectTo(LOGIN_PATH),
            ),
            GuardRule::new(
                "suspended_account",
                |request| {
                    is_protected(request.path)
                        && request.session.map(|s| s.suspended).unwrap_or(false)
                },
                GuardAction::RedirectTo(SUSPENDED_PATH),
            ),
            GuardRule::new(
                "finish_onboarding",
                |request| match request.session {
                    Some(session) if !session.onboarding.is_complete() => {
                        is_protected(request.path) && !onboarding_allows(session, request.path)
                    }
                    _ => false,
                },
                GuardAction::OnboardingStep,
            ),
            GuardRule::new(
                "onboarding_done",
                |request| {
                    is_under(request.path, ONBOARDING_PREFIX)
                        && request
                            .session
                            .map(|s| s.onboarding.is_complete())
                            .unwrap_or(false)
                },
                GuardAction::RoleDashboard,
            ),
            role_rule("admin_only", ADMIN_PREFIX, Role::Admin),
            role_rule("ngo_only", NGO_PREFIX, Role::Ngo),
            role_rule("volunteer_only", VOLUNTEER_PREFIX, Role::Volunteer),
            GuardRule::new(
                "plus_only",
                |request| {
                    PLUS_ONLY_PREFIXES
                        .iter()
                        .any(|prefix| is_under(request.path, prefix))
                        && request
                            .session
                            .map(|s| s.plan == Plan::Free)
                            .unwrap_or(false)
                },
                GuardAction::RedirectTo(PRICING_PATH),
            ),
        ])
    }
}

fn role_rule(name: &'static str, prefix: &'static str, role: Role) -> GuardRule {
    GuardRule::new(
        name,
        move |request| {
            is_under(request.path, prefix)
                && request
                    .session
                    .map(|session| !session.is_role(role))
                    .unwrap_or(false)
        },
        GuardAction::RoleDashboard,
    )
}

/// Paths an account may reach before onboarding completes.
fn onboarding_allows(session: &SessionClaims, path: &str) -> bool {
    path == SESSION_PATH
        || is_under(path, ONBOARDING_PREFIX)
        || (session.onboarding == OnboardingStep::PlanSelection && is_under(path, BILLING_PREFIX))
}
