use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Job, JobDraft, JobId, JobStatus, Role, User, UserId};
use super::error::{acting_as, ServiceError};
use super::notify::{dispatch, Notification, Notifier};
use super::pagination::{Page, PageRequest};
use super::plans::{effective_plan, PlanLimits};
use super::reports::{application_counts_by_job, StatusCounts};
use super::repository::{Collections, RepositoryError};

const TITLE_LEN: std::ops::RangeInclusive<usize> = 3..=120;
const COMMITMENT_HOURS: std::ops::RangeInclusive<u8> = 1..=80;

/// Public job search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub remote: Option<bool>,
}

impl JobQuery {
    pub fn matches(&self, job: &Job) -> bool {
        let text = self
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        if let Some(text) = text {
            let hit = job.title.to_lowercase().contains(&text)
                || job.description.to_lowercase().contains(&text)
                || job
                    .skills
                    .iter()
                    .any(|skill| skill.to_lowercase().contains(&text));
            if !hit {
                return false;
            }
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.trim().is_empty()) {
            if !job.category.eq_ignore_ascii_case(category.trim()) {
                return false;
            }
        }
        if let Some(city) = self.city.as_deref().filter(|c| !c.trim().is_empty()) {
            if !job.city.eq_ignore_ascii_case(city.trim()) {
                return false;
            }
        }
        match self.remote {
            Some(remote) => job.remote == remote,
            None => true,
        }
    }
}

/// Listing card for public search results.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub title: String,
    pub category: String,
    pub city: String,
    pub remote: bool,
    pub commitment_hours: u8,
    pub deadline: Option<NaiveDate>,
    pub ngo_id: UserId,
    pub ngo_name: String,
    pub created_at: DateTime<Utc>,
}

impl JobSummary {
    fn new(job: &Job, ngo_name: &str) -> Self {
        Self {
            id: job.id,
            title: job.title.clone(),
            category: job.category.clone(),
            city: job.city.clone(),
            remote: job.remote,
            commitment_hours: job.commitment_hours,
            deadline: job.deadline,
            ngo_id: job.ngo_id,
            ngo_name: ngo_name.to_string(),
            created_at: job.created_at,
        }
    }
}

/// Publicly visible facts about an NGO.
#[derive(Debug, Clone, Serialize)]
pub struct NgoPublicProfile {
    pub id: UserId,
    pub name: String,
    pub mission: Option<String>,
    pub website: Option<String>,
    pub city: Option<String>,
}

impl From<&User> for NgoPublicProfile {
    fn from(user: &User) -> Self {
        let profile = user.ngo_profile();
        Self {
            id: user.id,
            name: user.display_name().to_string(),
            mission: profile.map(|p| p.mission.clone()),
            website: profile.and_then(|p| p.website.clone()),
            city: profile.map(|p| p.city.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub job: Job,
    pub ngo: NgoPublicProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct NgoPage {
    pub ngo: NgoPublicProfile,
    pub open_jobs: Vec<JobSummary>,
}

/// A job as seen by its owner, with the application rollup.
#[derive(Debug, Clone, Serialize)]
pub struct NgoJobRow {
    #[serde(flatten)]
    pub job: Job,
    pub applications: StatusCounts,
}

#[derive(Clone)]
pub struct JobService {
    collections: Collections,
    notifier: Arc<dyn Notifier>,
}

impl JobService {
    pub fn new(collections: Collections, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            collections,
            notifier,
        }
    }

    pub fn create(
        &self,
        ngo_id: &UserId,
        draft: JobDraft,
        now: DateTime<Utc>,
    ) -> Result<Job, ServiceError> {
        let ngo = acting_as(&self.collections, ngo_id, Role::Ngo)?;
        validate_draft(&draft, now.date_naive())?;
        let admins: Vec<UserId> = self
            .collections
            .users
            .list()?
            .into_iter()
            .filter(|user| user.is_role(Role::Admin))
            .map(|user| user.id)
            .collect();

        let mut job = Job {
            id: JobId::new(),
            ngo_id: ngo.id,
            title: String::new(),
            description: String::new(),
            category: String::new(),
            city: String::new(),
            remote: false,
            skills: Vec::new(),
            commitment_hours: 0,
            deadline: None,
            status: JobStatus::PendingReview,
            moderation_note: None,
            created_at: now,
            updated_at: now,
        };
        job.apply_draft(draft);
        let job = self.save_active(&ngo, job, now)?;
        info!(job = %job.id, ngo = %ngo.id, "job submitted for review");

        for admin in admins {
            dispatch(
                self.notifier.as_ref(),
                Notification::new(admin, "job_submitted")
                    .with("job_id", job.id.to_string())
                    .with("title", job.title.clone())
                    .with("ngo", ngo.display_name()),
            );
        }
        Ok(job)
    }

    /// Persist a job that occupies an active slot, refusing it once the NGO's plan is full.
    fn save_active(&self, ngo: &User, job: Job, now: DateTime<Utc>) -> Result<Job, ServiceError> {
        let limit = PlanLimits::for_plan(effective_plan(ngo, now)).active_jobs;
        self.collections
            .jobs
            .save_within_limit(job, limit)
            .map_err(|err| match (err, limit) {
                (RepositoryError::LimitReached, Some(limit)) => {
                    warn!(ngo = %ngo.id, limit, "job quota reached");
                    ServiceError::QuotaExceeded {
                        what: "active jobs",
                        limit,
                    }
                }
                (other, _) => other.into(),
            })
    }

    pub fn update(
        &self,
        ngo_id: &UserId,
        job_id: &JobId,
        draft: JobDraft,
        now: DateTime<Utc>,
    ) -> Result<Job, ServiceError> {
        let ngo = acting_as(&self.collections, ngo_id, Role::Ngo)?;
        let mut job = self.owned_job(ngo_id, job_id)?;
        if job.status == JobStatus::Closed {
            return Err(ServiceError::InvalidState {
                entity: "job",
                state: job.status.label(),
                action: "edit",
            });
        }
        validate_draft(&draft, now.date_naive())?;

        job.apply_draft(draft);
        job.updated_at = now;
        if job.status == JobStatus::Rejected {
            // Resubmission takes an active slot again.
            job.status = JobStatus::PendingReview;
            job.moderation_note = None;
            return self.save_active(&ngo, job, now);
        }
        self.collections.jobs.update(job.clone())?;
        Ok(job)
    }

    pub fn close(
        &self,
        ngo_id: &UserId,
        job_id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<Job, ServiceError> {
        acting_as(&self.collections, ngo_id, Role::Ngo)?;
        let mut job = self.owned_job(ngo_id, job_id)?;
        if !job.status.is_active() {
            return Err(ServiceError::InvalidState {
                entity: "job",
                state: job.status.label(),
                action: "close",
            });
        }
        job.status = JobStatus::Closed;
        job.updated_at = now;
        self.collections.jobs.update(job.clone())?;
        info!(job = %job.id, "job closed");
        Ok(job)
    }

    fn owned_job(&self, ngo_id: &UserId, job_id: &JobId) -> Result<Job, ServiceError> {
        let job = self
            .collections
            .jobs
            .fetch(job_id)?
            .ok_or(ServiceError::NotFound("job"))?;
        if &job.ngo_id != ngo_id {
            return Err(ServiceError::Forbidden("job belongs to another NGO".into()));
        }
        Ok(job)
    }

    /// Open jobs matching `query`, newest first.
    pub fn public_list(
        &self,
        query: &JobQuery,
        page: PageRequest,
    ) -> Result<Page<JobSummary>, ServiceError> {
        let jobs: Vec<Job> = self
            .collections
            .jobs
            .list()?
            .into_iter()
            .filter(|job| job.status == JobStatus::Open && query.matches(job))
            .collect();

        let names = self.ngo_names()?;
        Ok(Page::from_sorted(jobs, page).map(|job| {
            let name = names.get(&job.ngo_id).map(String::as_str).unwrap_or("");
            JobSummary::new(&job, name)
        }))
    }

    fn ngo_names(&self) -> Result<HashMap<UserId, String>, ServiceError> {
        Ok(self
            .collections
            .users
            .list()?
            .into_iter()
            .filter(|user| user.is_role(Role::Ngo))
            .map(|user| (user.id, user.display_name().to_string()))
            .collect())
    }

    pub fn public_detail(&self, job_id: &JobId) -> Result<JobDetail, ServiceError> {
        let job = self
            .collections
            .jobs
            .fetch(job_id)?
            .filter(|job| job.status == JobStatus::Open)
            .ok_or(ServiceError::NotFound("job"))?;
        let ngo = self.collections.user(&job.ngo_id)?;
        Ok(JobDetail {
            ngo: NgoPublicProfile::from(&ngo),
            job,
        })
    }

    pub fn ngo_page(&self, ngo_id: &UserId) -> Result<NgoPage, ServiceError> {
        let ngo = self
            .collections
            .users
            .fetch(ngo_id)?
            .filter(|user| user.is_role(Role::Ngo) && !user.suspended)
            .ok_or(ServiceError::NotFound("ngo"))?;
        let open_jobs = self
            .collections
            .jobs
            .list_by_ngo(ngo_id)?
            .iter()
            .filter(|job| job.status == JobStatus::Open)
            .map(|job| JobSummary::new(job, ngo.display_name()))
            .collect();
        Ok(NgoPage {
            ngo: NgoPublicProfile::from(&ngo),
            open_jobs,
        })
    }

    /// Every job the NGO owns with per-status application counts.
    pub fn ngo_jobs(
        &self,
        ngo_id: &UserId,
        status: Option<JobStatus>,
        page: PageRequest,
    ) -> Result<Page<NgoJobRow>, ServiceError> {
        acting_as(&self.collections, ngo_id, Role::Ngo)?;
        let jobs: Vec<Job> = self
            .collections
            .jobs
            .list_by_ngo(ngo_id)?
            .into_iter()
            .filter(|job| status.map(|wanted| job.status == wanted).unwrap_or(true))
            .collect();
        let counts = application_counts_by_job(&self.collections.applications.list_by_ngo(ngo_id)?);

        Ok(Page::from_sorted(jobs, page).map(|job| NgoJobRow {
            applications: counts.get(&job.id).copied().unwrap_or_default(),
            job,
        }))
    }
}

fn validate_draft(draft: &JobDraft, today: NaiveDate) -> Result<(), ServiceError> {
    let title_len = draft.title.trim().chars().count();
    if !TITLE_LEN.contains(&title_len) {
        return Err(ServiceError::Invalid(format!(
            "title must be {}-{} characters",
            TITLE_LEN.start(),
            TITLE_LEN.end()
        )));
    }
    if draft.description.trim().is_empty() {
        return Err(ServiceError::Invalid("description is required".into()));
    }
    if draft.category.trim().is_empty() {
        return Err(ServiceError::Invalid("category is required".into()));
    }
    if !draft.remote && draft.city.trim().is_empty() {
        return Err(ServiceError::Invalid(
            "city is required for on-site jobs".into(),
        ));
    }
    if !COMMITMENT_HOURS.contains(&draft.commitment_hours) {
        return Err(ServiceError::Invalid(format!(
            "commitment must be {}-{} hours per week",
            COMMITMENT_HOURS.start(),
            COMMITMENT_HOURS.end()
        )));
    }
    if let Some(deadline) = draft.deadline {
        if deadline < today {
            return Err(ServiceError::Invalid("deadline is in the past".into()));
        }
    }
    Ok(())
}
