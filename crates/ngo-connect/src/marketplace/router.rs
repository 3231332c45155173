use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::applications::Decision;
use super::billing::Checkout;
use super::domain::{
    ApplicationId, ApplicationStatus, JobDraft, JobId, JobStatus, OnboardingStep, OrderId,
    OrderStatus, Plan, Role, User, UserId, UserProfile,
};
use super::error::ServiceError;
use super::jobs::JobQuery;
use super::moderation::{Review, UserFilter};
use super::pagination::PageRequest;
use super::payments::PaymentCallback;
use super::plans::PlanLimits;
use super::{Marketplace, Registration};
use crate::auth::{enforce_session, CurrentSession, SessionView};

type Shared = State<Arc<Marketplace>>;

/// Router exposing the marketplace API behind the session middleware.
pub fn marketplace_router(marketplace: Marketplace) -> Router {
    let session_layer = marketplace.session_layer();
    let state = Arc::new(marketplace);

    Router::new()
        .route("/api/v1/auth/register", post(register_handler))
        .route("/api/v1/auth/login", post(login_handler))
        .route("/api/v1/me", get(me_handler))
        .route("/api/v1/me/profile", put(update_profile_handler))
        .route("/api/v1/onboarding/role", post(select_role_handler))
        .route("/api/v1/onboarding/profile", post(complete_profile_handler))
        .route("/api/v1/onboarding/plan", post(choose_plan_handler))
        .route("/api/v1/plans", get(plans_handler))
        .route("/api/v1/jobs", get(public_jobs_handler))
        .route("/api/v1/jobs/:job_id", get(public_job_handler))
        .route("/api/v1/ngos/:ngo_id", get(ngo_page_handler))
        .route(
            "/api/v1/ngo/jobs",
            get(ngo_jobs_handler).post(create_job_handler),
        )
        .route("/api/v1/ngo/jobs/:job_id", put(update_job_handler))
        .route("/api/v1/ngo/jobs/:job_id/close", post(close_job_handler))
        .route(
            "/api/v1/ngo/jobs/:job_id/applications",
            get(job_applications_handler),
        )
        .route(
            "/api/v1/ngo/applications/:application_id/decision",
            post(decide_handler),
        )
        .route("/api/v1/ngo/dashboard", get(ngo_dashboard_handler))
        .route("/api/v1/ngo/analytics", get(ngo_analytics_handler))
        .route(
            "/api/v1/volunteer/applications",
            get(my_applications_handler).post(apply_handler),
        )
        .route(
            "/api/v1/volunteer/applications/:application_id/withdraw",
            post(withdraw_handler),
        )
        .route("/api/v1/volunteer/dashboard", get(volunteer_dashboard_handler))
        .route("/api/v1/payments/callback", post(payment_callback_handler))
        .route("/api/v1/billing/checkout", post(checkout_handler))
        .route("/api/v1/billing/orders", get(orders_handler))
        .route(
            "/api/v1/billing/orders/:order_id/cancel",
            post(cancel_order_handler),
        )
        .route("/api/v1/admin/users", get(admin_users_handler))
        .route("/api/v1/admin/users/:user_id/suspend", post(suspend_handler))
        .route(
            "/api/v1/admin/users/:user_id/reinstate",
            post(reinstate_handler),
        )
        .route("/api/v1/admin/jobs", get(admin_jobs_handler))
        .route("/api/v1/admin/jobs/:job_id/review", post(review_job_handler))
        .route("/api/v1/admin/orders", get(admin_orders_handler))
        .route(
            "/api/v1/admin/orders/:order_id/confirm",
            post(confirm_order_handler),
        )
        .route("/api/v1/admin/orders/:order_id/fail", post(fail_order_handler))
        .route("/api/v1/admin/analytics", get(platform_analytics_handler))
        .layer(middleware::from_fn_with_state(session_layer, enforce_session))
        .with_state(state)
}

/// Token plus the session view it encodes, returned whenever the account changes.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub session: SessionView,
    pub user: User,
}

fn session_response(
    marketplace: &Marketplace,
    user: User,
    now: DateTime<Utc>,
) -> Result<SessionResponse, ServiceError> {
    let issued = marketplace.sessions.issue(&user, now)?;
    Ok(SessionResponse {
        token: issued.token,
        session: SessionView::from(&issued.claims),
        user,
    })
}

#[derive(Debug, Deserialize)]
struct StatusFilter<S> {
    status: Option<S>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

async fn register_handler(
    State(marketplace): Shared,
    Json(registration): Json<Registration>,
) -> Result<Response, ServiceError> {
    let now = Utc::now();
    let user = marketplace.accounts.register(registration, now)?;
    let body = session_response(&marketplace, user, now)?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn login_handler(
    State(marketplace): Shared,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let now = Utc::now();
    let user = marketplace
        .accounts
        .authenticate(&credentials.email, &credentials.password)?;
    Ok(Json(session_response(&marketplace, user, now)?))
}

async fn me_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let user = marketplace.accounts.profile(&claims.sub)?;
    let limits = PlanLimits::for_plan(claims.plan);
    Ok(Json(json!({
        "session": SessionView::from(&claims),
        "user": user,
        "limits": limits,
    })))
}

async fn update_profile_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(profile): Json<UserProfile>,
) -> Result<Json<User>, ServiceError> {
    Ok(Json(marketplace.accounts.update_profile(&claims.sub, profile)?))
}

#[derive(Debug, Deserialize)]
struct RoleChoice {
    role: Role,
}

async fn select_role_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(choice): Json<RoleChoice>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let user = marketplace.accounts.select_role(&claims.sub, choice.role)?;
    Ok(Json(session_response(&marketplace, user, Utc::now())?))
}

async fn complete_profile_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(profile): Json<UserProfile>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let user = marketplace.accounts.complete_profile(&claims.sub, profile)?;
    Ok(Json(session_response(&marketplace, user, Utc::now())?))
}

/// Free completes onboarding at once; plus opens an order that completes it once paid.
async fn choose_plan_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(checkout): Json<Checkout>,
) -> Result<Response, ServiceError> {
    let now = Utc::now();
    match checkout.plan {
        Plan::Free => {
            let user = marketplace.accounts.choose_free_plan(&claims.sub)?;
            Ok(Json(session_response(&marketplace, user, now)?).into_response())
        }
        Plan::Plus => {
            if claims.onboarding != OnboardingStep::PlanSelection {
                return Err(ServiceError::InvalidState {
                    entity: "account",
                    state: claims.onboarding.label(),
                    action: "choose a plan for",
                });
            }
            let order = marketplace.billing.checkout(&claims.sub, checkout, now)?;
            Ok((StatusCode::CREATED, Json(json!({ "order": order }))).into_response())
        }
    }
}

async fn plans_handler(State(marketplace): Shared) -> Json<serde_json::Value> {
    let pricing = marketplace.billing.pricing();
    let plans: Vec<_> = [Plan::Free, Plan::Plus]
        .into_iter()
        .map(|plan| {
            json!({
                "plan": plan,
                "monthly_price_cents": pricing.price(plan, 1),
                "period_days": pricing.period_days,
                "limits": PlanLimits::for_plan(plan),
            })
        })
        .collect();
    Json(json!({ "plans": plans }))
}

async fn public_jobs_handler(
    State(marketplace): Shared,
    Query(query): Query<JobQuery>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    Ok(Json(marketplace.jobs.public_list(&query, page)?).into_response())
}

async fn public_job_handler(
    State(marketplace): Shared,
    Path(job_id): Path<JobId>,
) -> Result<Response, ServiceError> {
    Ok(Json(marketplace.jobs.public_detail(&job_id)?).into_response())
}

async fn ngo_page_handler(
    State(marketplace): Shared,
    Path(ngo_id): Path<UserId>,
) -> Result<Response, ServiceError> {
    Ok(Json(marketplace.jobs.ngo_page(&ngo_id)?).into_response())
}

async fn ngo_jobs_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Query(filter): Query<StatusFilter<JobStatus>>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    let jobs = marketplace.jobs.ngo_jobs(&claims.sub, filter.status, page)?;
    Ok(Json(jobs).into_response())
}

async fn create_job_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(draft): Json<JobDraft>,
) -> Result<Response, ServiceError> {
    let job = marketplace.jobs.create(&claims.sub, draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

async fn update_job_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(job_id): Path<JobId>,
    Json(draft): Json<JobDraft>,
) -> Result<Response, ServiceError> {
    let job = marketplace
        .jobs
        .update(&claims.sub, &job_id, draft, Utc::now())?;
    Ok(Json(job).into_response())
}

async fn close_job_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(job_id): Path<JobId>,
) -> Result<Response, ServiceError> {
    let job = marketplace.jobs.close(&claims.sub, &job_id, Utc::now())?;
    Ok(Json(job).into_response())
}

async fn job_applications_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(job_id): Path<JobId>,
    Query(filter): Query<StatusFilter<ApplicationStatus>>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    let applicants =
        marketplace
            .applications
            .for_job(&claims.sub, &job_id, filter.status, page)?;
    Ok(Json(applicants).into_response())
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    decision: Decision,
}

async fn decide_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(application_id): Path<ApplicationId>,
    Json(request): Json<DecisionRequest>,
) -> Result<Response, ServiceError> {
    let application = marketplace.applications.decide(
        &claims.sub,
        &application_id,
        request.decision,
        Utc::now(),
    )?;
    Ok(Json(application).into_response())
}

async fn ngo_dashboard_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
) -> Result<Response, ServiceError> {
    let dashboard = marketplace.reports.ngo_dashboard(&claims.sub, Utc::now())?;
    Ok(Json(dashboard).into_response())
}

async fn ngo_analytics_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
) -> Result<Response, ServiceError> {
    let analytics = marketplace.reports.ngo_analytics(&claims.sub, Utc::now())?;
    Ok(Json(analytics).into_response())
}

#[derive(Debug, Deserialize)]
struct ApplyRequest {
    job_id: JobId,
    #[serde(default)]
    cover_letter: String,
}

async fn apply_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(request): Json<ApplyRequest>,
) -> Result<Response, ServiceError> {
    let application = marketplace.applications.apply(
        &claims.sub,
        &request.job_id,
        &request.cover_letter,
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

async fn withdraw_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(application_id): Path<ApplicationId>,
) -> Result<Response, ServiceError> {
    let application = marketplace
        .applications
        .withdraw(&claims.sub, &application_id, Utc::now())?;
    Ok(Json(application).into_response())
}

async fn my_applications_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Query(filter): Query<StatusFilter<ApplicationStatus>>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    let applications = marketplace
        .applications
        .for_volunteer(&claims.sub, filter.status, page)?;
    Ok(Json(applications).into_response())
}

async fn volunteer_dashboard_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
) -> Result<Response, ServiceError> {
    let dashboard = marketplace
        .reports
        .volunteer_dashboard(&claims.sub, Utc::now())?;
    Ok(Json(dashboard).into_response())
}

async fn checkout_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Json(checkout): Json<Checkout>,
) -> Result<Response, ServiceError> {
    let order = marketplace
        .billing
        .checkout(&claims.sub, checkout, Utc::now())?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

async fn orders_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
) -> Result<Response, ServiceError> {
    let orders = marketplace.billing.orders_for(&claims.sub)?;
    Ok(Json(json!({ "orders": orders })).into_response())
}

/// Provider settlement notice. Authenticated by its signature, not by a session.
async fn payment_callback_handler(
    State(marketplace): Shared,
    Json(callback): Json<PaymentCallback>,
) -> Result<Response, ServiceError> {
    let order = marketplace.billing.settle_callback(&callback, Utc::now())?;
    Ok(Json(json!({ "order": order })).into_response())
}

#[derive(Debug, Deserialize)]
struct PaymentConfirmation {
    payment_reference: String,
}

async fn confirm_order_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(order_id): Path<OrderId>,
    Json(confirmation): Json<PaymentConfirmation>,
) -> Result<Response, ServiceError> {
    let settlement = marketplace.billing.confirm(
        &claims.sub,
        &order_id,
        &confirmation.payment_reference,
        Utc::now(),
    )?;
    Ok(Json(settlement).into_response())
}

#[derive(Debug, Deserialize)]
struct PaymentFailure {
    #[serde(default)]
    reason: String,
}

async fn fail_order_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(order_id): Path<OrderId>,
    Json(failure): Json<PaymentFailure>,
) -> Result<Response, ServiceError> {
    let order = marketplace
        .billing
        .fail(&claims.sub, &order_id, &failure.reason, Utc::now())?;
    Ok(Json(order).into_response())
}

async fn cancel_order_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(order_id): Path<OrderId>,
) -> Result<Response, ServiceError> {
    let order = marketplace
        .billing
        .cancel(&claims.sub, &order_id, Utc::now())?;
    Ok(Json(order).into_response())
}

async fn admin_users_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Query(filter): Query<UserFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    let users = marketplace.moderation.users(&claims.sub, &filter, page)?;
    Ok(Json(users).into_response())
}

async fn suspend_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(user_id): Path<UserId>,
) -> Result<Response, ServiceError> {
    let user = marketplace
        .moderation
        .set_suspended(&claims.sub, &user_id, true)?;
    Ok(Json(user).into_response())
}

async fn reinstate_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(user_id): Path<UserId>,
) -> Result<Response, ServiceError> {
    let user = marketplace
        .moderation
        .set_suspended(&claims.sub, &user_id, false)?;
    Ok(Json(user).into_response())
}

async fn admin_jobs_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Query(filter): Query<StatusFilter<JobStatus>>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    let jobs = marketplace
        .moderation
        .jobs(&claims.sub, filter.status, page)?;
    Ok(Json(jobs).into_response())
}

async fn review_job_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Path(job_id): Path<JobId>,
    Json(review): Json<Review>,
) -> Result<Response, ServiceError> {
    let job = marketplace
        .moderation
        .review_job(&claims.sub, &job_id, review, Utc::now())?;
    Ok(Json(job).into_response())
}

async fn admin_orders_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
    Query(filter): Query<StatusFilter<OrderStatus>>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ServiceError> {
    let orders = marketplace
        .moderation
        .orders(&claims.sub, filter.status, page)?;
    Ok(Json(orders).into_response())
}

async fn platform_analytics_handler(
    State(marketplace): Shared,
    CurrentSession(claims): CurrentSession,
) -> Result<Response, ServiceError> {
    let analytics = marketplace
        .reports
        .platform_analytics(&claims.sub, Utc::now())?;
    Ok(Json(analytics).into_response())
}
