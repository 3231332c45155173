use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::domain::{OnboardingStep, Plan, Role, User, UserId, UserProfile};
use super::error::{active_user, ServiceError};
use super::repository::Collections;
use crate::auth::{hash_password, verify_password, AuthError};

/// Sign-up payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Account lifecycle: sign-up, credentials and the onboarding flow.
#[derive(Clone)]
pub struct AccountService {
    collections: Collections,
}

impl AccountService {
    pub fn new(collections: Collections) -> Self {
        Self { collections }
    }

    pub fn register(
        &self,
        registration: Registration,
        now: DateTime<Utc>,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(&registration.email)?;
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Invalid("name is required".into()));
        }
        if self.collections.users.find_by_email(&email)?.is_some() {
            return Err(ServiceError::Conflict("email already registered".into()));
        }

        let password_hash = hash_password(&registration.password)?;
        let user = User {
            id: UserId::new(),
            email,
            name: name.to_string(),
            password_hash,
            role: None,
            plan: Plan::Free,
            plan_expires_at: None,
            onboarding: OnboardingStep::RoleSelection,
            suspended: false,
            profile: None,
            created_at: now,
        };

        let stored = self.collections.users.insert(user)?;
        info!(user = %stored.id, "account registered");
        Ok(stored)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let user = self
            .collections
            .users
            .find_by_email(email)?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &user.password_hash)?;
        Ok(user)
    }

    pub fn select_role(&self, id: &UserId, role: Role) -> Result<User, ServiceError> {
        let mut user = active_user(&self.collections, id)?;
        if user.onboarding != OnboardingStep::RoleSelection {
            return Err(ServiceError::InvalidState {
                entity: "account",
                state: user.onboarding.label(),
                action: "select a role for",
            });
        }
        if role == Role::Admin {
            return Err(ServiceError::Forbidden(
                "the admin role cannot be self-assigned".into(),
            ));
        }

        user.role = Some(role);
        user.onboarding = user.onboarding.next();
        self.collections.users.update(user.clone())?;
        info!(user = %user.id, role = role.label(), "role selected");
        Ok(user)
    }

    pub fn complete_profile(
        &self,
        id: &UserId,
        profile: UserProfile,
    ) -> Result<User, ServiceError> {
        let mut user = active_user(&self.collections, id)?;
        if user.onboarding != OnboardingStep::Profile {
            return Err(ServiceError::InvalidState {
                entity: "account",
                state: user.onboarding.label(),
                action: "complete the profile of",
            });
        }
        validate_profile(&user, &profile)?;

        user.profile = Some(profile);
        user.onboarding = user.onboarding.next();
        self.collections.users.update(user.clone())?;
        Ok(user)
    }

    /// Finish onboarding on the free plan.
    pub fn choose_free_plan(&self, id: &UserId) -> Result<User, ServiceError> {
        let mut user = active_user(&self.collections, id)?;
        if user.onboarding != OnboardingStep::PlanSelection {
            return Err(ServiceError::InvalidState {
                entity: "account",
                state: user.onboarding.label(),
                action: "choose a plan for",
            });
        }

        user.onboarding = OnboardingStep::Complete;
        self.collections.users.update(user.clone())?;
        info!(user = %user.id, "onboarding completed on free plan");
        Ok(user)
    }

    pub fn update_profile(&self, id: &UserId, profile: UserProfile) -> Result<User, ServiceError> {
        let mut user = active_user(&self.collections, id)?;
        if !user.onboarding.is_complete() {
            return Err(ServiceError::InvalidState {
                entity: "account",
                state: user.onboarding.label(),
                action: "edit the profile of",
            });
        }
        validate_profile(&user, &profile)?;
        user.profile = Some(profile);
        self.collections.users.update(user.clone())?;
        Ok(user)
    }

    pub fn profile(&self, id: &UserId) -> Result<User, ServiceError> {
        Ok(self.collections.user(id)?)
    }

    /// Seed an administrator; repeated seeding of the same admin is a no-op.
    pub fn create_admin(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.collections.users.find_by_email(&email)? {
            return if existing.is_role(Role::Admin) {
                Ok(existing)
            } else {
                Err(ServiceError::Conflict(
                    "email belongs to a non-admin account".into(),
                ))
            };
        }

        let admin = User {
            id: UserId::new(),
            email,
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            role: Some(Role::Admin),
            plan: Plan::Free,
            plan_expires_at: None,
            onboarding: OnboardingStep::Complete,
            suspended: false,
            profile: None,
            created_at: now,
        };
        let stored = self.collections.users.insert(admin)?;
        info!(user = %stored.id, "administrator seeded");
        Ok(stored)
    }
}

fn normalize_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ServiceError::Invalid(format!("'{}' is not an email address", raw.trim())))
    }
}

fn validate_profile(user: &User, profile: &UserProfile) -> Result<(), ServiceError> {
    if user.role != Some(profile.role()) {
        return Err(ServiceError::Invalid(format!(
            "a {} profile does not match the account role",
            profile.role().label()
        )));
    }

    let missing = match profile {
        UserProfile::Volunteer(volunteer) => {
            if volunteer.city.trim().is_empty() {
                Some("city")
            } else if volunteer.skills.iter().all(|skill| skill.trim().is_empty()) {
                Some("skills")
            } else {
                None
            }
        }
        UserProfile::Ngo(ngo) => [
            ("organization", &ngo.organization),
            ("mission", &ngo.mission),
            ("city", &ngo.city),
            ("registration_number", &ngo.registration_number),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field),
    };

    match missing {
        Some(field) => Err(ServiceError::Invalid(format!("{field} is required"))),
        None => Ok(()),
    }
}
