use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::auth::SessionManager;
use crate::config::AuthConfig;
use crate::marketplace::domain::{
    Job, JobDraft, NgoProfile, OnboardingStep, OrderId, Plan, Role, User, UserId, UserProfile,
    VolunteerProfile,
};
use crate::marketplace::memory::InMemoryStore;
use crate::marketplace::moderation::Review;
use crate::marketplace::notify::RecordingNotifier;
use crate::marketplace::payments::{PaymentCallback, PaymentOutcome, PaymentVerifier};
use crate::marketplace::plans::PlanPricing;
use crate::marketplace::repository::{Collections, RepositoryError, UserRepository};
use crate::marketplace::Marketplace;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub(super) fn auth_config() -> AuthConfig {
    AuthConfig {
        session_secret: b"marketplace-test-secret-with-32-bytes!!".to_vec(),
        session_ttl: StdDuration::from_secs(3_600),
    }
}

pub(super) const WEBHOOK_SECRET: &[u8] = b"marketplace-test-webhook-secret-32-bytes";

pub(super) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub notifier: RecordingNotifier,
    pub marketplace: Marketplace,
}

pub(super) fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::default());
    build(store.clone(), Collections::from_store(store))
}

/// A harness whose user collection can be switched into failing mode.
pub(super) fn flaky_harness() -> (Harness, FlakyUsers) {
    let store = Arc::new(InMemoryStore::default());
    let users = FlakyUsers {
        store: store.clone(),
        fail_updates: Arc::new(AtomicBool::new(false)),
        fail_listing: Arc::new(AtomicBool::new(false)),
    };
    let mut collections = Collections::from_store(store.clone());
    collections.users = Arc::new(users.clone());
    (build(store, collections), users)
}

fn build(store: Arc<InMemoryStore>, collections: Collections) -> Harness {
    let notifier = RecordingNotifier::default();
    let marketplace = Marketplace::new(
        collections,
        Arc::new(SessionManager::new(&auth_config())),
        Arc::new(notifier.clone()),
        PlanPricing::default(),
        PaymentVerifier::new(WEBHOOK_SECRET),
    );
    Harness {
        store,
        notifier,
        marketplace,
    }
}

/// Delegates to the store unless a failure switch is on.
#[derive(Clone)]
pub(super) struct FlakyUsers {
    store: Arc<InMemoryStore>,
    fail_updates: Arc<AtomicBool>,
    fail_listing: Arc<AtomicBool>,
}

impl FlakyUsers {
    pub fn fail_updates(&self, on: bool) {
        self.fail_updates.store(on, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, on: bool) {
        self.fail_listing.store(on, Ordering::SeqCst);
    }

    fn unavailable() -> RepositoryError {
        RepositoryError::Unavailable("users offline".to_string())
    }
}

impl UserRepository for FlakyUsers {
    fn insert(&self, user: User) -> Result<User, RepositoryError> {
        UserRepository::insert(self.store.as_ref(), user)
    }

    fn update(&self, user: User) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        UserRepository::update(self.store.as_ref(), user)
    }

    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::fetch(self.store.as_ref(), id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.store.find_by_email(email)
    }

    fn list(&self) -> Result<Vec<User>, RepositoryError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        UserRepository::list(self.store.as_ref())
    }
}

pub(super) fn volunteer_profile() -> UserProfile {
    UserProfile::Volunteer(VolunteerProfile {
        skills: vec!["first aid".to_string(), "driving".to_string()],
        city: "Lagos".to_string(),
        bio: "Weekend helper".to_string(),
        availability_hours: 6,
    })
}

pub(super) fn ngo_profile() -> UserProfile {
    UserProfile::Ngo(NgoProfile {
        organization: "Clean Rivers".to_string(),
        mission: "Keep the rivers clean".to_string(),
        website: Some("https://rivers.example.org".to_string()),
        city: "Lagos".to_string(),
        registration_number: "NG-4471".to_string(),
    })
}

pub(super) fn draft(title: &str) -> JobDraft {
    JobDraft {
        title: title.to_string(),
        description: "Collect litter along the riverbank".to_string(),
        category: "Environment".to_string(),
        city: "Lagos".to_string(),
        remote: false,
        skills: vec!["teamwork".to_string()],
        commitment_hours: 3,
        deadline: None,
    }
}

impl Harness {
    /// Insert an onboarded account directly, skipping password hashing.
    pub fn seed(&self, email: &str, role: Role, plan: Plan) -> User {
        let profile = match role {
            Role::Volunteer => Some(volunteer_profile()),
            Role::Ngo => Some(ngo_profile()),
            Role::Admin => None,
        };
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: String::new(),
            role: Some(role),
            plan,
            plan_expires_at: match plan {
                Plan::Plus => Some(Utc::now() + chrono::Duration::days(30)),
                Plan::Free => None,
            },
            onboarding: OnboardingStep::Complete,
            suspended: false,
            profile,
            created_at: now(),
        };
        UserRepository::insert(self.store.as_ref(), user).expect("seed user")
    }

    pub fn volunteer(&self, email: &str) -> User {
        self.seed(email, Role::Volunteer, Plan::Free)
    }

    pub fn ngo(&self, email: &str) -> User {
        self.seed(email, Role::Ngo, Plan::Free)
    }

    pub fn admin(&self) -> User {
        self.seed("admin@example.org", Role::Admin, Plan::Free)
    }

    /// Post a job as `ngo` and have `admin` approve it.
    pub fn open_job(&self, ngo: &User, admin: &User, title: &str) -> Job {
        let job = self
            .marketplace
            .jobs
            .create(&ngo.id, draft(title), now())
            .expect("job created");
        self.marketplace
            .moderation
            .review_job(&admin.id, &job.id, Review::Approve, now())
            .expect("job approved")
    }

    /// A settlement notice signed with the provider's shared secret.
    pub fn callback(
        &self,
        order_id: &OrderId,
        outcome: PaymentOutcome,
        reference: &str,
    ) -> PaymentCallback {
        PaymentCallback {
            order_id: *order_id,
            outcome,
            reference: reference.to_string(),
            signature: PaymentVerifier::new(WEBHOOK_SECRET)
                .sign(order_id, outcome, reference)
                .expect("signed"),
        }
    }

    pub fn stored_user(&self, id: &UserId) -> User {
        UserRepository::fetch(self.store.as_ref(), id)
            .expect("fetch user")
            .expect("user stored")
    }

    pub fn token_for(&self, user: &User) -> String {
        self.marketplace
            .sessions
            .issue(user, Utc::now())
            .expect("token issued")
            .token
    }
}

pub(super) fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub(super) fn send_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
