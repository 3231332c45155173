//! End-to-end scenarios driven through the public router, the way a front end would use it.

mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use ngo_connect::auth::{hash_password, SessionManager};
    use ngo_connect::config::AuthConfig;
    use ngo_connect::marketplace::{
        marketplace_router, Collections, Marketplace, PaymentVerifier, PlanPricing,
        RecordingNotifier,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    pub(super) struct App {
        pub router: Router,
        pub notifier: RecordingNotifier,
        pub marketplace: Marketplace,
    }

    pub(super) fn app() -> App {
        let notifier = RecordingNotifier::default();
        let config = AuthConfig {
            session_secret: b"integration-secret-that-is-long-enough".to_vec(),
            session_ttl: Duration::from_secs(600),
        };
        let marketplace = Marketplace::new(
            Collections::in_memory(),
            Arc::new(SessionManager::new(&config)),
            Arc::new(notifier.clone()),
            PlanPricing::default(),
            PaymentVerifier::new(b"integration-webhook-secret-long-enough"),
        );
        let hash = hash_password("admin password").expect("hash");
        marketplace
            .accounts
            .create_admin("admin@example.org", "Admin", &hash, Utc::now())
            .expect("admin seeded");
        App {
            router: marketplace_router(marketplace.clone()),
            notifier,
            marketplace,
        }
    }

    impl App {
        pub async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        pub async fn login(&self, email: &str, password: &str) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/api/v1/auth/login",
                    None,
                    Some(serde_json::json!({ "email": email, "password": password })),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "login failed: {body}");
            body["token"].as_str().expect("token").to_string()
        }
    }
}

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use ngo_connect::marketplace::{JobId, OrderId, PaymentOutcome, Plan, Role, UserId};
use serde_json::json;

use common::app;

async fn onboard(
    app: &common::App,
    email: &str,
    name: &str,
    role: Role,
    profile: serde_json::Value,
) -> String {
    let (status, body) = app
        .call(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": email, "name": name, "password": "a long password" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            "POST",
            "/api/v1/onboarding/role",
            Some(&token),
            Some(json!({ "role": role.label() })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "role failed: {body}");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .call("POST", "/api/v1/onboarding/profile", Some(&token), Some(profile))
        .await;
    assert_eq!(status, StatusCode::OK, "profile failed: {body}");
    assert_eq!(body["session"]["onboarding"], "plan_selection");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn ngo_and_volunteer_complete_a_placement() {
    let app = app();

    let ngo_token = onboard(
        &app,
        "team@shelter.example.org",
        "Shelter Team",
        Role::Ngo,
        json!({
            "kind": "ngo",
            "organization": "Open Shelter",
            "mission": "Beds for everyone",
            "city": "Nairobi",
            "registration_number": "KE-0042"
        }),
    )
    .await;

    let (status, body) = app
        .call(
            "POST",
            "/api/v1/onboarding/plan",
            Some(&ngo_token),
            Some(json!({ "plan": "plus" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["amount_cents"], 900);
    let order_id: OrderId = serde_json::from_value(body["order"]["id"].clone()).unwrap();

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/v1/admin/orders/{order_id}/confirm"),
            Some(&ngo_token),
            Some(json!({ "payment_reference": "made-up" })),
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER, "owners cannot settle their own order");

    let signature = app
        .marketplace
        .billing
        .payments()
        .sign(&order_id, PaymentOutcome::Paid, "psp_001")
        .unwrap();
    let (status, body) = app
        .call(
            "POST",
            "/api/v1/payments/callback",
            None,
            Some(json!({
                "order_id": order_id,
                "outcome": "paid",
                "reference": "psp_001",
                "signature": signature,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "callback failed: {body}");
    assert_eq!(body["order"]["status"], "paid");

    let (status, body) = app.call("GET", "/api/v1/me", Some(&ngo_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["onboarding"], "complete");
    assert_eq!(body["session"]["plan"], "plus");

    let (status, job) = app
        .call(
            "POST",
            "/api/v1/ngo/jobs",
            Some(&ngo_token),
            Some(json!({
                "title": "Night shift host",
                "description": "Welcome guests and prepare beds",
                "category": "Shelter",
                "city": "Nairobi",
                "remote": false,
                "skills": ["hospitality"],
                "commitment_hours": 6
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "job failed: {job}");
    let job_id = job["id"].as_str().unwrap().to_string();

    let admin_token = app.login("admin@example.org", "admin password").await;
    let (status, pending) = app
        .call(
            "GET",
            "/api/v1/admin/jobs?status=pending_review",
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["total"], 1);
    let (status, _) = app
        .call(
            "POST",
            &format!("/api/v1/admin/jobs/{job_id}/review"),
            Some(&admin_token),
            Some(json!({ "decision": "approve" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let volunteer_token = onboard(
        &app,
        "sam@example.org",
        "Sam",
        Role::Volunteer,
        json!({
            "kind": "volunteer",
            "skills": ["hospitality", "first aid"],
            "city": "Nairobi",
            "availability_hours": 8
        }),
    )
    .await;
    let (status, body) = app
        .call(
            "POST",
            "/api/v1/onboarding/plan",
            Some(&volunteer_token),
            Some(json!({ "plan": "free" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let volunteer_token = body["token"].as_str().unwrap().to_string();

    let (status, detail) = app
        .call("GET", &format!("/api/v1/jobs/{job_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["ngo"]["name"], "Open Shelter");

    let (status, application) = app
        .call(
            "POST",
            "/api/v1/volunteer/applications",
            Some(&volunteer_token),
            Some(json!({ "job_id": job_id, "cover_letter": "I have run a hostel" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let application_id = application["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/v1/ngo/applications/{application_id}/decision"),
            Some(&ngo_token),
            Some(json!({ "decision": "accept" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, dashboard) = app
        .call("GET", "/api/v1/volunteer/dashboard", Some(&volunteer_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["applications"]["accepted"], 1);
    assert_eq!(dashboard["remaining_quota"], 4);
    assert_eq!(dashboard["recent"][0]["job_title"], "Night shift host");

    let (status, analytics) = app
        .call("GET", "/api/v1/ngo/analytics", Some(&ngo_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["jobs"][0]["acceptance_rate"], 1.0);

    let (status, platform) = app
        .call("GET", "/api/v1/admin/analytics", Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(platform["revenue_cents"], 900);
    assert_eq!(platform["active_plus_subscriptions"], 1);

    let templates = app.notifier.templates();
    for expected in [
        "plan_activated",
        "job_submitted",
        "job_approved",
        "application_received",
        "application_accepted",
    ] {
        assert!(
            templates.iter().any(|template| template == expected),
            "missing {expected} in {templates:?}"
        );
    }
}

#[tokio::test]
async fn lapsed_plus_plan_is_downgraded_on_the_next_request() {
    let app = app();
    let now = Utc::now();
    let mut ngo = app
        .marketplace
        .collections
        .users
        .find_by_email("admin@example.org")
        .unwrap()
        .expect("admin exists");
    ngo.id = UserId::new();
    ngo.email = "lapsed@example.org".to_string();
    ngo.role = Some(Role::Ngo);
    ngo.plan = Plan::Plus;
    ngo.plan_expires_at = Some(now + Duration::days(5));
    let ngo = app.marketplace.collections.users.insert(ngo).unwrap();
    let token = app
        .marketplace
        .sessions
        .issue(&ngo, now)
        .expect("issued")
        .token;

    let mut lapsed = ngo.clone();
    lapsed.plan_expires_at = Some(now - Duration::minutes(1));
    app.marketplace.collections.users.update(lapsed).unwrap();

    let (status, body) = app
        .call("GET", "/api/v1/ngo/analytics", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(body["redirect"], "/pricing");

    let stored = app
        .marketplace
        .collections
        .users
        .fetch(&ngo.id)
        .unwrap()
        .expect("stored");
    assert_eq!(stored.plan, Plan::Free);
    assert!(stored.plan_expires_at.is_none());
}

#[tokio::test]
async fn payment_callbacks_must_carry_a_valid_signature() {
    let app = app();
    let token = onboard(
        &app,
        "ada@example.org",
        "Ada",
        Role::Volunteer,
        json!({
            "kind": "volunteer",
            "skills": ["tutoring"],
            "city": "Accra",
            "availability_hours": 4
        }),
    )
    .await;
    let (status, body) = app
        .call(
            "POST",
            "/api/v1/onboarding/plan",
            Some(&token),
            Some(json!({ "plan": "plus" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["order"]["id"].clone();

    let (status, _) = app
        .call(
            "POST",
            "/api/v1/payments/callback",
            None,
            Some(json!({
                "order_id": order_id,
                "outcome": "paid",
                "reference": "made-up",
                "signature": "00".repeat(32),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/api/v1/billing/orders", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"][0]["status"], "pending");
}

#[tokio::test]
async fn plan_catalogue_and_job_pages_are_public() {
    let app = app();
    let (status, body) = app.call("GET", "/api/v1/plans", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plans"][1]["plan"], "plus");
    assert_eq!(body["plans"][1]["monthly_price_cents"], 900);
    assert_eq!(body["plans"][0]["limits"]["active_jobs"], 2);

    let (status, _) = app
        .call("GET", &format!("/api/v1/jobs/{}", JobId::new()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
