use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, JobId, JobStatus, Role, UserId,
};
use super::error::{acting_as, ServiceError};
use super::notify::{dispatch, Notification, Notifier};
use super::pagination::{Page, PageRequest};
use super::plans::{effective_plan, PlanLimits, APPLICATION_QUOTA_WINDOW_DAYS};
use super::repository::{Collections, RepositoryError};

const COVER_LETTER_MAX: usize = 2_000;

/// NGO verdict on a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn outcome(self) -> (ApplicationStatus, &'static str) {
        match self {
            Decision::Accept => (ApplicationStatus::Accepted, "application_accepted"),
            Decision::Reject => (ApplicationStatus::Rejected, "application_rejected"),
        }
    }
}

/// An application as the volunteer sees it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub job_title: String,
    pub ngo_name: String,
}

/// An application as the NGO sees it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantView {
    #[serde(flatten)]
    pub application: Application,
    pub volunteer_name: String,
    pub skills: Vec<String>,
    pub city: Option<String>,
}

/// Name lookups used to decorate application listings.
pub(crate) struct Directory {
    job_titles: HashMap<JobId, String>,
    names: HashMap<UserId, String>,
}

impl Directory {
    pub(crate) fn load(collections: &Collections) -> Result<Self, ServiceError> {
        let job_titles = collections
            .jobs
            .list()?
            .into_iter()
            .map(|job| (job.id, job.title))
            .collect();
        let names = collections
            .users
            .list()?
            .into_iter()
            .map(|user| (user.id, user.display_name().to_string()))
            .collect();
        Ok(Self { job_titles, names })
    }

    pub(crate) fn view(&self, application: &Application) -> ApplicationView {
        ApplicationView {
            job_title: self
                .job_titles
                .get(&application.job_id)
                .cloned()
                .unwrap_or_default(),
            ngo_name: self
                .names
                .get(&application.ngo_id)
                .cloned()
                .unwrap_or_default(),
            application: application.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ApplicationService {
    collections: Collections,
    notifier: Arc<dyn Notifier>,
}

impl ApplicationService {
    pub fn new(collections: Collections, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            collections,
            notifier,
        }
    }

    pub fn apply(
        &self,
        volunteer_id: &UserId,
        job_id: &JobId,
        cover_letter: &str,
        now: DateTime<Utc>,
    ) -> Result<Application, ServiceError> {
        let volunteer = acting_as(&self.collections, volunteer_id, Role::Volunteer)?;
        let job = self
            .collections
            .jobs
            .fetch(job_id)?
            .ok_or(ServiceError::NotFound("job"))?;
        if job.status != JobStatus::Open {
            return Err(ServiceError::InvalidState {
                entity: "job",
                state: job.status.label(),
                action: "apply to",
            });
        }
        if job.deadline_passed(now.date_naive()) {
            return Err(ServiceError::Invalid("the application deadline has passed".into()));
        }
        let cover_letter = cover_letter.trim();
        if cover_letter.chars().count() > COVER_LETTER_MAX {
            return Err(ServiceError::Invalid(format!(
                "cover letter must be at most {COVER_LETTER_MAX} characters"
            )));
        }

        let limit = PlanLimits::for_plan(effective_plan(&volunteer, now)).applications_per_window;
        let since = now - Duration::days(APPLICATION_QUOTA_WINDOW_DAYS);
        let application = Application {
            id: ApplicationId::new(),
            job_id: job.id,
            volunteer_id: volunteer.id,
            ngo_id: job.ngo_id,
            cover_letter: cover_letter.to_string(),
            status: ApplicationStatus::Pending,
            created_at: now,
            decided_at: None,
        };
        let application = self
            .collections
            .applications
            .insert_within_limit(application, since, limit)
            .map_err(|err| match (err, limit) {
                (RepositoryError::LimitReached, Some(limit)) => {
                    warn!(volunteer = %volunteer.id, limit, "application quota reached");
                    ServiceError::QuotaExceeded {
                        what: "applications",
                        limit,
                    }
                }
                (RepositoryError::Conflict, _) => {
                    ServiceError::Conflict("already applied to this job".into())
                }
                (other, _) => other.into(),
            })?;
        info!(application = %application.id, job = %job.id, "application submitted");

        dispatch(
            self.notifier.as_ref(),
            Notification::new(job.ngo_id, "application_received")
                .with("application_id", application.id.to_string())
                .with("job_title", job.title.clone())
                .with("volunteer", volunteer.display_name()),
        );
        Ok(application)
    }

    pub fn withdraw(
        &self,
        volunteer_id: &UserId,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, ServiceError> {
        acting_as(&self.collections, volunteer_id, Role::Volunteer)?;
        let mut application = self.fetch(application_id)?;
        if &application.volunteer_id != volunteer_id {
            return Err(ServiceError::Forbidden(
                "application belongs to another volunteer".into(),
            ));
        }
        ensure_pending(&application, "withdraw")?;

        application.status = ApplicationStatus::Withdrawn;
        application.decided_at = Some(now);
        self.collections.applications.update(application.clone())?;
        info!(application = %application.id, "application withdrawn");
        Ok(application)
    }

    pub fn decide(
        &self,
        ngo_id: &UserId,
        application_id: &ApplicationId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Application, ServiceError> {
        acting_as(&self.collections, ngo_id, Role::Ngo)?;
        let mut application = self.fetch(application_id)?;
        let job = self.collections.job(&application.job_id)?;
        if &job.ngo_id != ngo_id {
            return Err(ServiceError::Forbidden(
                "application is for another NGO's job".into(),
            ));
        }
        ensure_pending(&application, "decide")?;

        let (status, template) = decision.outcome();
        application.status = status;
        application.decided_at = Some(now);
        self.collections.applications.update(application.clone())?;
        info!(application = %application.id, status = status.label(), "application decided");

        dispatch(
            self.notifier.as_ref(),
            Notification::new(application.volunteer_id, template)
                .with("application_id", application.id.to_string())
                .with("job_title", job.title),
        );
        Ok(application)
    }

    pub fn for_volunteer(
        &self,
        volunteer_id: &UserId,
        status: Option<ApplicationStatus>,
        page: PageRequest,
    ) -> Result<Page<ApplicationView>, ServiceError> {
        acting_as(&self.collections, volunteer_id, Role::Volunteer)?;
        let rows = filter_status(
            self.collections.applications.list_by_volunteer(volunteer_id)?,
            status,
        );
        let directory = Directory::load(&self.collections)?;
        Ok(Page::from_sorted(rows, page).map(|application| directory.view(&application)))
    }

    pub fn for_job(
        &self,
        ngo_id: &UserId,
        job_id: &JobId,
        status: Option<ApplicationStatus>,
        page: PageRequest,
    ) -> Result<Page<ApplicantView>, ServiceError> {
        acting_as(&self.collections, ngo_id, Role::Ngo)?;
        let job = self
            .collections
            .jobs
            .fetch(job_id)?
            .ok_or(ServiceError::NotFound("job"))?;
        if &job.ngo_id != ngo_id {
            return Err(ServiceError::Forbidden("job belongs to another NGO".into()));
        }
        let rows = filter_status(self.collections.applications.list_by_job(job_id)?, status);
        let volunteers: HashMap<UserId, _> = self
            .collections
            .users
            .list()?
            .into_iter()
            .filter(|user| user.is_role(Role::Volunteer))
            .map(|user| (user.id, user))
            .collect();

        Ok(Page::from_sorted(rows, page).map(|application| {
            let volunteer = volunteers.get(&application.volunteer_id);
            let profile = volunteer.and_then(|user| user.volunteer_profile());
            ApplicantView {
                volunteer_name: volunteer
                    .map(|user| user.display_name().to_string())
                    .unwrap_or_default(),
                skills: profile.map(|p| p.skills.clone()).unwrap_or_default(),
                city: profile.map(|p| p.city.clone()),
                application,
            }
        }))
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Application, ServiceError> {
        self.collections
            .applications
            .fetch(id)?
            .ok_or(ServiceError::NotFound("application"))
    }
}

fn ensure_pending(application: &Application, action: &'static str) -> Result<(), ServiceError> {
    if application.status == ApplicationStatus::Pending {
        Ok(())
    } else {
        Err(ServiceError::InvalidState {
            entity: "application",
            state: application.status.label(),
            action,
        })
    }
}

fn filter_status(
    rows: Vec<Application>,
    status: Option<ApplicationStatus>,
) -> Vec<Application> {
    match status {
        Some(wanted) => rows.into_iter().filter(|row| row.status == wanted).collect(),
        None => rows,
    }
}
