use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, Job, JobId, Order, OrderId, User, UserId,
};
use super::memory::InMemoryStore;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record limit reached")]
    LimitReached,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Account storage. Emails are unique case-insensitively.
pub trait UserRepository: Send + Sync {
    fn insert(&self, user: User) -> Result<User, RepositoryError>;
    fn update(&self, user: User) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn list(&self) -> Result<Vec<User>, RepositoryError>;
}

pub trait JobRepository: Send + Sync {
    fn update(&self, job: Job) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    /// Insert or replace `job`. An active job is refused with `LimitReached` when its NGO
    /// already holds `limit` other active jobs; the count and the write happen atomically.
    fn save_within_limit(&self, job: Job, limit: Option<u32>) -> Result<Job, RepositoryError>;
    fn list_by_ngo(&self, ngo: &UserId) -> Result<Vec<Job>, RepositoryError>;
    fn list(&self) -> Result<Vec<Job>, RepositoryError>;
}

/// Application storage. At most one non-withdrawn application per job and volunteer.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    /// Like `insert`, but refused with `LimitReached` when the volunteer already has `limit`
    /// applications created after `since`.
    fn insert_within_limit(
        &self,
        application: Application,
        since: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Application, RepositoryError>;
    fn update(&self, application: Application) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn list_by_job(&self, job: &JobId) -> Result<Vec<Application>, RepositoryError>;
    fn list_by_volunteer(&self, volunteer: &UserId) -> Result<Vec<Application>, RepositoryError>;
    fn list_by_ngo(&self, ngo: &UserId) -> Result<Vec<Application>, RepositoryError>;
    fn list(&self) -> Result<Vec<Application>, RepositoryError>;
}

pub trait OrderRepository: Send + Sync {
    fn insert(&self, order: Order) -> Result<Order, RepositoryError>;
    fn update(&self, order: Order) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    fn list_by_user(&self, user: &UserId) -> Result<Vec<Order>, RepositoryError>;
    fn list(&self) -> Result<Vec<Order>, RepositoryError>;
}

/// Typed handles to every collection the services read and write.
#[derive(Clone)]
pub struct Collections {
    pub users: Arc<dyn UserRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Collections {
    /// All four collections backed by one shared in-process store.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryStore::default()))
    }

    pub fn from_store(store: Arc<InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            jobs: store.clone(),
            applications: store.clone(),
            orders: store,
        }
    }

    pub fn user(&self, id: &UserId) -> Result<User, RepositoryError> {
        self.users.fetch(id)?.ok_or(RepositoryError::NotFound)
    }

    pub fn job(&self, id: &JobId) -> Result<Job, RepositoryError> {
        self.jobs.fetch(id)?.ok_or(RepositoryError::NotFound)
    }
}
