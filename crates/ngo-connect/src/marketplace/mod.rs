//! Volunteer marketplace: accounts, jobs, applications, billing, moderation and reports.
//!
//! Every service works against [`Collections`], so the in-memory store used by the API
//! binary and tests can be swapped for any other implementation of the repository traits.

pub mod accounts;
pub mod applications;
pub mod billing;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod moderation;
pub mod notify;
pub mod pagination;
pub mod payments;
pub mod plans;
pub mod reports;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::auth::{RouteGuard, SessionLayerState, SessionManager};

pub use accounts::{AccountService, Registration};
pub use applications::{ApplicantView, ApplicationService, ApplicationView, Decision};
pub use billing::{BillingService, Checkout, Settlement};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, Job, JobDraft, JobId, JobStatus, NgoProfile,
    OnboardingStep, Order, OrderId, OrderStatus, Plan, Role, User, UserId, UserProfile,
    VolunteerProfile,
};
pub use error::ServiceError;
pub use jobs::{JobDetail, JobQuery, JobService, JobSummary, NgoJobRow, NgoPage};
pub use memory::InMemoryStore;
pub use moderation::{ModerationService, Review, UserFilter};
pub use notify::{LogNotifier, Notification, Notifier, NotifyError, RecordingNotifier};
pub use pagination::{Page, PageRequest};
pub use payments::{PaymentCallback, PaymentOutcome, PaymentVerifier};
pub use plans::{PlanLimits, PlanPricing};
pub use reports::{
    NgoAnalytics, NgoDashboard, PlatformAnalytics, ReportService, StatusCounts, VolunteerDashboard,
};
pub use repository::{
    ApplicationRepository, Collections, JobRepository, OrderRepository, RepositoryError,
    UserRepository,
};
pub use router::marketplace_router;

/// Every marketplace service wired against one set of collections.
#[derive(Clone)]
pub struct Marketplace {
    pub collections: Collections,
    pub sessions: Arc<SessionManager>,
    pub accounts: AccountService,
    pub jobs: JobService,
    pub applications: ApplicationService,
    pub billing: BillingService,
    pub moderation: ModerationService,
    pub reports: ReportService,
}

impl Marketplace {
    pub fn new(
        collections: Collections,
        sessions: Arc<SessionManager>,
        notifier: Arc<dyn Notifier>,
        pricing: PlanPricing,
        payments: PaymentVerifier,
    ) -> Self {
        Self {
            accounts: AccountService::new(collections.clone()),
            jobs: JobService::new(collections.clone(), Arc::clone(&notifier)),
            applications: ApplicationService::new(collections.clone(), Arc::clone(&notifier)),
            billing: BillingService::new(
                collections.clone(),
                Arc::clone(&notifier),
                pricing,
                payments,
            ),
            moderation: ModerationService::new(collections.clone(), notifier),
            reports: ReportService::new(collections.clone()),
            sessions,
            collections,
        }
    }

    /// State for the session middleware guarding the marketplace routes.
    pub fn session_layer(&self) -> SessionLayerState {
        SessionLayerState {
            sessions: Arc::clone(&self.sessions),
            users: Arc::clone(&self.collections.users),
            guard: Arc::new(RouteGuard::standard()),
        }
    }
}
