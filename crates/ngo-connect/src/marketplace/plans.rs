use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{Plan, User};
use crate::config::BillingConfig;

/// Rolling window used for the volunteer application quota.
pub const APPLICATION_QUOTA_WINDOW_DAYS: i64 = 30;

/// Feature limits attached to a plan. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub active_jobs: Option<u32>,
    pub applications_per_window: Option<u32>,
    pub analytics: bool,
}

impl PlanLimits {
    pub const fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => Self {
                active_jobs: Some(2),
                applications_per_window: Some(5),
                analytics: false,
            },
            Plan::Plus => Self {
                active_jobs: Some(50),
                applications_per_window: None,
                analytics: true,
            },
        }
    }

    /// Slots left under `limit` after `used`; `None` when unlimited.
    pub fn remaining(limit: Option<u32>, used: usize) -> Option<u32> {
        limit.map(|limit| limit.saturating_sub(used.min(u32::MAX as usize) as u32))
    }
}

/// Price list for purchasable plan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPricing {
    pub plus_month_cents: u64,
    pub period_days: u64,
}

impl PlanPricing {
    pub fn price(&self, plan: Plan, months: u8) -> u64 {
        match plan {
            Plan::Free => 0,
            Plan::Plus => self.plus_month_cents.saturating_mul(months as u64),
        }
    }

    pub fn period(&self, months: u8) -> Duration {
        let days = self.period_days.saturating_mul(months as u64);
        Duration::days(days.min(i64::MAX as u64 / 86_400) as i64)
    }
}

impl From<&BillingConfig> for PlanPricing {
    fn from(config: &BillingConfig) -> Self {
        Self {
            plus_month_cents: config.plus_month_cents,
            period_days: config.period_days,
        }
    }
}

impl Default for PlanPricing {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

/// Plan the user is entitled to at `now`; an expired plus plan counts as free.
pub fn effective_plan(user: &User, now: DateTime<Utc>) -> Plan {
    match (user.plan, user.plan_expires_at) {
        (Plan::Plus, Some(expires_at)) if expires_at <= now => Plan::Free,
        (plan, _) => plan,
    }
}

pub fn is_plan_expired(user: &User, now: DateTime<Utc>) -> bool {
    user.plan != effective_plan(user, now)
}

/// New expiry after buying `period` of time: stacks on any unexpired remainder.
pub fn extend_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    period: Duration,
) -> DateTime<Utc> {
    let start = match current {
        Some(expires_at) if expires_at > now => expires_at,
        _ => now,
    };
    start + period
}
