//! Dashboard and analytics rollups computed as folds over repository results.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::applications::{ApplicationView, Directory};
use super::domain::{
    Application, ApplicationStatus, JobId, JobStatus, OrderStatus, Plan, Role, UserId,
};
use super::error::{acting_as, ServiceError};
use super::plans::{effective_plan, PlanLimits, APPLICATION_QUOTA_WINDOW_DAYS};
use super::repository::Collections;

const RECENT_LIMIT: usize = 5;
const TOP_JOBS_LIMIT: usize = 5;

/// Application tallies by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub withdrawn: u32,
    pub total: u32,
}

impl StatusCounts {
    pub fn record(&mut self, status: ApplicationStatus) {
        match status {
            ApplicationStatus::Pending => self.pending += 1,
            ApplicationStatus::Accepted => self.accepted += 1,
            ApplicationStatus::Rejected => self.rejected += 1,
            ApplicationStatus::Withdrawn => self.withdrawn += 1,
        }
        self.total += 1;
    }

    pub fn tally<'a, I>(applications: I) -> Self
    where
        I: IntoIterator<Item = &'a Application>,
    {
        applications
            .into_iter()
            .fold(Self::default(), |mut counts, application| {
                counts.record(application.status);
                counts
            })
    }

    /// Accepted share of decided applications; `None` before any decision.
    pub fn acceptance_rate(&self) -> Option<f64> {
        let decided = self.accepted + self.rejected;
        if decided == 0 {
            None
        } else {
            Some(self.accepted as f64 / decided as f64)
        }
    }
}

pub fn application_counts_by_job(applications: &[Application]) -> BTreeMap<JobId, StatusCounts> {
    applications
        .iter()
        .fold(BTreeMap::new(), |mut counts, application| {
            counts
                .entry(application.job_id)
                .or_insert_with(StatusCounts::default)
                .record(application.status);
            counts
        })
}

fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Applications the volunteer submitted inside the rolling quota window, withdrawn ones included.
pub fn applications_in_window(applications: &[Application], now: DateTime<Utc>) -> usize {
    let window_start = now - Duration::days(APPLICATION_QUOTA_WINDOW_DAYS);
    applications
        .iter()
        .filter(|application| application.created_at > window_start)
        .count()
}

#[derive(Debug, Clone, Serialize)]
pub struct VolunteerDashboard {
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub applications: StatusCounts,
    pub applications_this_period: u32,
    pub remaining_quota: Option<u32>,
    pub recent: Vec<ApplicationView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopJob {
    pub job_id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub applications: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NgoDashboard {
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub jobs_by_status: BTreeMap<JobStatus, u32>,
    pub applications: StatusCounts,
    pub active_jobs: u32,
    pub active_job_quota: Option<u32>,
    pub remaining_job_slots: Option<u32>,
    pub top_jobs: Vec<TopJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPerformance {
    pub job_id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub applications: StatusCounts,
    pub acceptance_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NgoAnalytics {
    pub jobs: Vec<JobPerformance>,
    pub applications_per_month: BTreeMap<String, u32>,
    pub overall_acceptance_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformAnalytics {
    pub users_by_role: BTreeMap<String, u32>,
    pub users_by_plan: BTreeMap<Plan, u32>,
    pub suspended_users: u32,
    pub signups_per_month: BTreeMap<String, u32>,
    pub jobs_by_status: BTreeMap<JobStatus, u32>,
    pub applications: StatusCounts,
    pub orders_by_status: BTreeMap<OrderStatus, u32>,
    pub revenue_cents: u64,
    pub revenue_per_month: BTreeMap<String, u64>,
    pub active_plus_subscriptions: u32,
}

#[derive(Clone)]
pub struct ReportService {
    collections: Collections,
}

impl ReportService {
    pub fn new(collections: Collections) -> Self {
        Self { collections }
    }

    pub fn volunteer_dashboard(
        &self,
        volunteer_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<VolunteerDashboard, ServiceError> {
        let volunteer = acting_as(&self.collections, volunteer_id, Role::Volunteer)?;
        let applications = self.collections.applications.list_by_volunteer(volunteer_id)?;

        let plan = effective_plan(&volunteer, now);
        let used = applications_in_window(&applications, now);
        let limit = PlanLimits::for_plan(plan).applications_per_window;

        let directory = Directory::load(&self.collections)?;
        let recent = applications
            .iter()
            .take(RECENT_LIMIT)
            .map(|application| directory.view(application))
            .collect();

        Ok(VolunteerDashboard {
            plan,
            plan_expires_at: volunteer.plan_expires_at,
            applications: StatusCounts::tally(&applications),
            applications_this_period: used as u32,
            remaining_quota: PlanLimits::remaining(limit, used),
            recent,
        })
    }

    pub fn ngo_dashboard(
        &self,
        ngo_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<NgoDashboard, ServiceError> {
        let ngo = acting_as(&self.collections, ngo_id, Role::Ngo)?;
        let jobs = self.collections.jobs.list_by_ngo(ngo_id)?;
        let applications = self.collections.applications.list_by_ngo(ngo_id)?;
        let per_job = application_counts_by_job(&applications);

        let mut jobs_by_status = BTreeMap::new();
        for job in &jobs {
            *jobs_by_status.entry(job.status).or_insert(0) += 1;
        }
        let active = jobs.iter().filter(|job| job.status.is_active()).count();

        let mut top_jobs: Vec<TopJob> = jobs
            .iter()
            .map(|job| TopJob {
                job_id: job.id,
                title: job.title.clone(),
                status: job.status,
                applications: per_job.get(&job.id).map(|c| c.total).unwrap_or(0),
            })
            .filter(|top| top.applications > 0)
            .collect();
        top_jobs.sort_by(|a, b| b.applications.cmp(&a.applications));
        top_jobs.truncate(TOP_JOBS_LIMIT);

        let plan = effective_plan(&ngo, now);
        let limit = PlanLimits::for_plan(plan).active_jobs;
        Ok(NgoDashboard {
            plan,
            plan_expires_at: ngo.plan_expires_at,
            jobs_by_status,
            applications: StatusCounts::tally(&applications),
            active_jobs: active as u32,
            active_job_quota: limit,
            remaining_job_slots: PlanLimits::remaining(limit, active),
            top_jobs,
        })
    }

    pub fn ngo_analytics(
        &self,
        ngo_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<NgoAnalytics, ServiceError> {
        let ngo = acting_as(&self.collections, ngo_id, Role::Ngo)?;
        if !PlanLimits::for_plan(effective_plan(&ngo, now)).analytics {
            return Err(ServiceError::Forbidden(
                "analytics require the plus plan".into(),
            ));
        }

        let applications = self.collections.applications.list_by_ngo(ngo_id)?;
        let per_job = application_counts_by_job(&applications);
        let jobs = self
            .collections
            .jobs
            .list_by_ngo(ngo_id)?
            .into_iter()
            .map(|job| {
                let counts = per_job.get(&job.id).copied().unwrap_or_default();
                JobPerformance {
                    job_id: job.id,
                    title: job.title,
                    status: job.status,
                    acceptance_rate: counts.acceptance_rate(),
                    applications: counts,
                }
            })
            .collect();

        let mut applications_per_month = BTreeMap::new();
        for application in &applications {
            *applications_per_month
                .entry(month_key(application.created_at))
                .or_insert(0) += 1;
        }

        Ok(NgoAnalytics {
            jobs,
            applications_per_month,
            overall_acceptance_rate: StatusCounts::tally(&applications).acceptance_rate(),
        })
    }

    pub fn platform_analytics(
        &self,
        admin_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<PlatformAnalytics, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        let mut analytics = PlatformAnalytics::default();

        for user in self.collections.users.list()? {
            let role = user.role.map(Role::label).unwrap_or("unassigned");
            *analytics.users_by_role.entry(role.to_string()).or_insert(0) += 1;
            let plan = effective_plan(&user, now);
            *analytics.users_by_plan.entry(plan).or_insert(0) += 1;
            if plan == Plan::Plus {
                analytics.active_plus_subscriptions += 1;
            }
            if user.suspended {
                analytics.suspended_users += 1;
            }
            *analytics
                .signups_per_month
                .entry(month_key(user.created_at))
                .or_insert(0) += 1;
        }

        for job in self.collections.jobs.list()? {
            *analytics.jobs_by_status.entry(job.status).or_insert(0) += 1;
        }

        analytics.applications = StatusCounts::tally(&self.collections.applications.list()?);

        for order in self.collections.orders.list()? {
            *analytics.orders_by_status.entry(order.status).or_insert(0) += 1;
            if order.status == OrderStatus::Paid {
                analytics.revenue_cents += order.amount_cents;
                let settled = order.settled_at.unwrap_or(order.created_at);
                *analytics
                    .revenue_per_month
                    .entry(month_key(settled))
                    .or_insert(0) += order.amount_cents;
            }
        }

        Ok(analytics)
    }
}
