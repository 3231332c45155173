use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifier of a registered account.
    UserId
);
id_type!(
    /// Identifier of a volunteer opportunity.
    JobId
);
id_type!(ApplicationId);
id_type!(OrderId);

/// Marketplace side an account acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Volunteer,
    Ngo,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Volunteer => "volunteer",
            Role::Ngo => "ngo",
            Role::Admin => "admin",
        }
    }

    /// Landing page for the role once onboarding is complete.
    pub const fn dashboard_path(self) -> &'static str {
        match self {
            Role::Volunteer => "/volunteer/dashboard",
            Role::Ngo => "/ngo/dashboard",
            Role::Admin => "/admin/dashboard",
        }
    }
}

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Plus,
}

impl Plan {
    pub const fn label(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Plus => "plus",
        }
    }
}

/// Where a new account is in the role → profile → plan flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    RoleSelection,
    Profile,
    PlanSelection,
    Complete,
}

impl OnboardingStep {
    pub const fn label(self) -> &'static str {
        match self {
            OnboardingStep::RoleSelection => "role_selection",
            OnboardingStep::Profile => "profile",
            OnboardingStep::PlanSelection => "plan_selection",
            OnboardingStep::Complete => "complete",
        }
    }

    pub const fn next(self) -> Self {
        match self {
            OnboardingStep::RoleSelection => OnboardingStep::Profile,
            OnboardingStep::Profile => OnboardingStep::PlanSelection,
            OnboardingStep::PlanSelection | OnboardingStep::Complete => OnboardingStep::Complete,
        }
    }

    /// Front-end path that resumes this step.
    pub const fn path(self) -> Option<&'static str> {
        match self {
            OnboardingStep::RoleSelection => Some("/onboarding/role"),
            OnboardingStep::Profile => Some("/onboarding/profile"),
            OnboardingStep::PlanSelection => Some("/onboarding/plan"),
            OnboardingStep::Complete => None,
        }
    }

    pub const fn is_complete(self) -> bool {
        matches!(self, OnboardingStep::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerProfile {
    pub skills: Vec<String>,
    pub city: String,
    #[serde(default)]
    pub bio: String,
    /// Hours per week the volunteer can offer.
    pub availability_hours: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgoProfile {
    pub organization: String,
    pub mission: String,
    #[serde(default)]
    pub website: Option<String>,
    pub city: String,
    pub registration_number: String,
}

/// Role-specific profile captured during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserProfile {
    Volunteer(VolunteerProfile),
    Ngo(NgoProfile),
}

impl UserProfile {
    pub fn role(&self) -> Role {
        match self {
            UserProfile::Volunteer(_) => Role::Volunteer,
            UserProfile::Ngo(_) => Role::Ngo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Option<Role>,
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub onboarding: OnboardingStep,
    pub suspended: bool,
    pub profile: Option<UserProfile>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn display_name(&self) -> &str {
        match &self.profile {
            Some(UserProfile::Ngo(profile)) if !profile.organization.is_empty() => {
                &profile.organization
            }
            _ => &self.name,
        }
    }

    pub fn volunteer_profile(&self) -> Option<&VolunteerProfile> {
        match &self.profile {
            Some(UserProfile::Volunteer(profile)) => Some(profile),
            _ => None,
        }
    }

    pub fn ngo_profile(&self) -> Option<&NgoProfile> {
        match &self.profile {
            Some(UserProfile::Ngo(profile)) => Some(profile),
            _ => None,
        }
    }
}

/// Publication state of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    PendingReview,
    Open,
    Rejected,
    Closed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::PendingReview,
        JobStatus::Open,
        JobStatus::Rejected,
        JobStatus::Closed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::PendingReview => "pending_review",
            JobStatus::Open => "open",
            JobStatus::Rejected => "rejected",
            JobStatus::Closed => "closed",
        }
    }

    /// Counts against the NGO's posting quota.
    pub const fn is_active(self) -> bool {
        matches!(self, JobStatus::PendingReview | JobStatus::Open)
    }
}

/// Fields an NGO supplies when posting or editing a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub city: String,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub skills: Vec<String>,
    pub commitment_hours: u8,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub ngo_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub city: String,
    pub remote: bool,
    pub skills: Vec<String>,
    pub commitment_hours: u8,
    pub deadline: Option<NaiveDate>,
    pub status: JobStatus,
    pub moderation_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn apply_draft(&mut self, draft: JobDraft) {
        self.title = draft.title.trim().to_string();
        self.description = draft.description.trim().to_string();
        self.category = draft.category.trim().to_ascii_lowercase();
        self.city = draft.city.trim().to_string();
        self.remote = draft.remote;
        self.skills = draft.skills;
        self.commitment_hours = draft.commitment_hours;
        self.deadline = draft.deadline;
    }

    pub fn deadline_passed(&self, today: NaiveDate) -> bool {
        self.deadline.map(|deadline| deadline < today).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub volunteer_id: UserId,
    pub ngo_id: UserId,
    pub cover_letter: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Purchase of plan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub plan: Plan,
    pub months: u8,
    pub amount_cents: u64,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}
