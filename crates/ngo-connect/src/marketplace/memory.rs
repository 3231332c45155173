use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Job, JobId, Order, OrderId, User, UserId,
};
use super::repository::{
    ApplicationRepository, JobRepository, OrderRepository, RepositoryError, UserRepository,
};

/// Process-local store backing every collection with a mutex-guarded table.
#[derive(Default)]
pub struct InMemoryStore {
    users: Mutex<HashMap<UserId, User>>,
    jobs: Mutex<HashMap<JobId, Job>>,
    applications: Mutex<HashMap<ApplicationId, Application>>,
    orders: Mutex<HashMap<OrderId, Order>>,
}

fn lock<'a, T>(table: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    table
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{name} table poisoned")))
}

/// One live application per job and volunteer; withdrawn ones free the slot.
fn is_duplicate(table: &HashMap<ApplicationId, Application>, application: &Application) -> bool {
    table.values().any(|existing| {
        existing.id == application.id
            || (existing.job_id == application.job_id
                && existing.volunteer_id == application.volunteer_id
                && existing.status != ApplicationStatus::Withdrawn)
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows
}

impl UserRepository for InMemoryStore {
    fn insert(&self, mut user: User) -> Result<User, RepositoryError> {
        let mut users = lock(&self.users, "users")?;
        user.email = normalize_email(&user.email);
        let taken = users
            .values()
            .any(|existing| existing.id == user.id || existing.email == user.email);
        if taken {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update(&self, mut user: User) -> Result<(), RepositoryError> {
        let mut users = lock(&self.users, "users")?;
        if !users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound);
        }
        user.email = normalize_email(&user.email);
        if users
            .values()
            .any(|existing| existing.id != user.id && existing.email == user.email)
        {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user);
        Ok(())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(lock(&self.users, "users")?.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = normalize_email(email);
        Ok(lock(&self.users, "users")?
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = lock(&self.users, "users")?.values().cloned().collect();
        Ok(newest_first(users, |user: &User| user.created_at))
    }
}

impl JobRepository for InMemoryStore {
    fn update(&self, job: Job) -> Result<(), RepositoryError> {
        let mut jobs = lock(&self.jobs, "jobs")?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(lock(&self.jobs, "jobs")?.get(id).cloned())
    }

    fn save_within_limit(&self, job: Job, limit: Option<u32>) -> Result<Job, RepositoryError> {
        let mut jobs = lock(&self.jobs, "jobs")?;
        if let (true, Some(limit)) = (job.status.is_active(), limit) {
            let others = jobs
                .values()
                .filter(|other| {
                    other.ngo_id == job.ngo_id && other.id != job.id && other.status.is_active()
                })
                .count();
            if others >= limit as usize {
                return Err(RepositoryError::LimitReached);
            }
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn list_by_ngo(&self, ngo: &UserId) -> Result<Vec<Job>, RepositoryError> {
        let jobs = lock(&self.jobs, "jobs")?
            .values()
            .filter(|job| &job.ngo_id == ngo)
            .cloned()
            .collect();
        Ok(newest_first(jobs, |job: &Job| job.created_at))
    }

    fn list(&self) -> Result<Vec<Job>, RepositoryError> {
        let jobs = lock(&self.jobs, "jobs")?.values().cloned().collect();
        Ok(newest_first(jobs, |job: &Job| job.created_at))
    }
}

impl InMemoryStore {
    fn applications_where<F>(&self, predicate: F) -> Result<Vec<Application>, RepositoryError>
    where
        F: Fn(&Application) -> bool,
    {
        let rows = lock(&self.applications, "applications")?
            .values()
            .filter(|application| predicate(application))
            .cloned()
            .collect();
        Ok(newest_first(rows, |application: &Application| {
            application.created_at
        }))
    }
}

impl ApplicationRepository for InMemoryStore {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut applications = lock(&self.applications, "applications")?;
        if is_duplicate(&applications, &application) {
            return Err(RepositoryError::Conflict);
        }
        applications.insert(application.id, application.clone());
        Ok(application)
    }

    fn insert_within_limit(
        &self,
        application: Application,
        since: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Application, RepositoryError> {
        let mut applications = lock(&self.applications, "applications")?;
        if is_duplicate(&applications, &application) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(limit) = limit {
            let recent = applications
                .values()
                .filter(|existing| {
                    existing.volunteer_id == application.volunteer_id
                        && existing.created_at > since
                })
                .count();
            if recent >= limit as usize {
                return Err(RepositoryError::LimitReached);
            }
        }
        applications.insert(application.id, application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut applications = lock(&self.applications, "applications")?;
        match applications.get_mut(&application.id) {
            Some(slot) => {
                *slot = application;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(lock(&self.applications, "applications")?.get(id).cloned())
    }

    fn list_by_job(&self, job: &JobId) -> Result<Vec<Application>, RepositoryError> {
        self.applications_where(|application| &application.job_id == job)
    }

    fn list_by_volunteer(&self, volunteer: &UserId) -> Result<Vec<Application>, RepositoryError> {
        self.applications_where(|application| &application.volunteer_id == volunteer)
    }

    fn list_by_ngo(&self, ngo: &UserId) -> Result<Vec<Application>, RepositoryError> {
        self.applications_where(|application| &application.ngo_id == ngo)
    }

    fn list(&self) -> Result<Vec<Application>, RepositoryError> {
        self.applications_where(|_| true)
    }
}

impl OrderRepository for InMemoryStore {
    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        let mut orders = lock(&self.orders, "orders")?;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict);
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn update(&self, order: Order) -> Result<(), RepositoryError> {
        let mut orders = lock(&self.orders, "orders")?;
        match orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(lock(&self.orders, "orders")?.get(id).cloned())
    }

    fn list_by_user(&self, user: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = lock(&self.orders, "orders")?
            .values()
            .filter(|order| &order.user_id == user)
            .cloned()
            .collect();
        Ok(newest_first(orders, |order: &Order| order.created_at))
    }

    fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        let orders = lock(&self.orders, "orders")?.values().cloned().collect();
        Ok(newest_first(orders, |order: &Order| order.created_at))
    }
}
