use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::domain::{Job, JobId, JobStatus, Order, OrderStatus, Plan, Role, User, UserId};
use super::error::{acting_as, ServiceError};
use super::notify::{dispatch, Notification, Notifier};
use super::pagination::{Page, PageRequest};
use super::repository::Collections;

/// Admin verdict on a job awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Review {
    Approve,
    Reject { note: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub suspended: Option<bool>,
    #[serde(default)]
    pub q: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if self.role.is_some() && user.role != self.role {
            return false;
        }
        if self.plan.map(|plan| user.plan != plan).unwrap_or(false) {
            return false;
        }
        if self
            .suspended
            .map(|suspended| user.suspended != suspended)
            .unwrap_or(false)
        {
            return false;
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(text) => {
                let text = text.to_lowercase();
                user.email.contains(&text) || user.display_name().to_lowercase().contains(&text)
            }
            None => true,
        }
    }
}

#[derive(Clone)]
pub struct ModerationService {
    collections: Collections,
    notifier: Arc<dyn Notifier>,
}

impl ModerationService {
    pub fn new(collections: Collections, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            collections,
            notifier,
        }
    }

    pub fn review_job(
        &self,
        admin_id: &UserId,
        job_id: &JobId,
        review: Review,
        now: DateTime<Utc>,
    ) -> Result<Job, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        let mut job = self
            .collections
            .jobs
            .fetch(job_id)?
            .ok_or(ServiceError::NotFound("job"))?;
        if job.status != JobStatus::PendingReview {
            return Err(ServiceError::InvalidState {
                entity: "job",
                state: job.status.label(),
                action: "review",
            });
        }

        let template = match review {
            Review::Approve => {
                job.status = JobStatus::Open;
                job.moderation_note = None;
                "job_approved"
            }
            Review::Reject { note } => {
                let note = note.trim();
                if note.is_empty() {
                    return Err(ServiceError::Invalid(
                        "a rejection needs a note for the NGO".into(),
                    ));
                }
                job.status = JobStatus::Rejected;
                job.moderation_note = Some(note.to_string());
                "job_rejected"
            }
        };
        job.updated_at = now;
        self.collections.jobs.update(job.clone())?;
        info!(job = %job.id, admin = %admin_id, status = job.status.label(), "job reviewed");

        let mut notification = Notification::new(job.ngo_id, template)
            .with("job_id", job.id.to_string())
            .with("title", job.title.clone());
        if let Some(note) = &job.moderation_note {
            notification = notification.with("note", note.clone());
        }
        dispatch(self.notifier.as_ref(), notification);
        Ok(job)
    }

    pub fn set_suspended(
        &self,
        admin_id: &UserId,
        user_id: &UserId,
        suspended: bool,
    ) -> Result<User, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        if admin_id == user_id {
            return Err(ServiceError::Forbidden(
                "administrators cannot suspend themselves".into(),
            ));
        }
        let mut user = self
            .collections
            .users
            .fetch(user_id)?
            .ok_or(ServiceError::NotFound("user"))?;
        if user.is_role(Role::Admin) {
            return Err(ServiceError::Forbidden(
                "administrators cannot be suspended".into(),
            ));
        }
        if user.suspended != suspended {
            user.suspended = suspended;
            self.collections.users.update(user.clone())?;
            info!(user = %user.id, admin = %admin_id, suspended, "account suspension changed");
        }
        Ok(user)
    }

    pub fn users(
        &self,
        admin_id: &UserId,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        let rows = self
            .collections
            .users
            .list()?
            .into_iter()
            .filter(|user| filter.matches(user))
            .collect();
        Ok(Page::from_sorted(rows, page))
    }

    pub fn jobs(
        &self,
        admin_id: &UserId,
        status: Option<JobStatus>,
        page: PageRequest,
    ) -> Result<Page<Job>, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        let rows = self
            .collections
            .jobs
            .list()?
            .into_iter()
            .filter(|job| status.map(|wanted| job.status == wanted).unwrap_or(true))
            .collect();
        Ok(Page::from_sorted(rows, page))
    }

    pub fn orders(
        &self,
        admin_id: &UserId,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        let rows = self
            .collections
            .orders
            .list()?
            .into_iter()
            .filter(|order| status.map(|wanted| order.status == wanted).unwrap_or(true))
            .collect();
        Ok(Page::from_sorted(rows, page))
    }
}
