use chrono::{Duration, NaiveDate};

use super::common::*;
use crate::marketplace::applications::Decision;
use crate::marketplace::billing::Checkout;
use crate::marketplace::domain::{
    ApplicationStatus, JobStatus, OnboardingStep, OrderStatus, Plan, Role,
};
use crate::marketplace::error::ServiceError;
use crate::marketplace::jobs::JobQuery;
use crate::marketplace::moderation::Review;
use crate::marketplace::pagination::PageRequest;
use crate::marketplace::payments::PaymentOutcome;
use crate::marketplace::repository::{JobRepository, OrderRepository, UserRepository};

fn plus(months: u8) -> Checkout {
    Checkout {
        plan: Plan::Plus,
        months,
    }
}

#[test]
fn new_jobs_wait_for_review_before_listing() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");

    let job = h
        .marketplace
        .jobs
        .create(&ngo.id, draft("River cleanup"), now())
        .expect("created");
    assert_eq!(job.status, JobStatus::PendingReview);
    assert_eq!(job.category, "environment");
    assert_eq!(h.notifier.templates(), vec!["job_submitted"]);
    assert_eq!(h.notifier.sent()[0].recipient, admin.id);

    let listed = h
        .marketplace
        .jobs
        .public_list(&JobQuery::default(), PageRequest::default())
        .expect("listed");
    assert_eq!(listed.total, 0);
    assert!(matches!(
        h.marketplace.jobs.public_detail(&job.id),
        Err(ServiceError::NotFound("job"))
    ));

    h.marketplace
        .moderation
        .review_job(&admin.id, &job.id, Review::Approve, now())
        .expect("approved");
    let listed = h
        .marketplace
        .jobs
        .public_list(&JobQuery::default(), PageRequest::default())
        .expect("listed");
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].ngo_name, "Clean Rivers");
    assert!(h.notifier.templates().contains(&"job_approved".to_string()));
}

#[test]
fn free_ngo_is_limited_to_two_active_jobs() {
    let h = harness();
    let ngo = h.ngo("rivers@example.org");
    let jobs = &h.marketplace.jobs;

    let first = jobs.create(&ngo.id, draft("Cleanup one"), now()).expect("first");
    jobs.create(&ngo.id, draft("Cleanup two"), now()).expect("second");
    let err = jobs
        .create(&ngo.id, draft("Cleanup three"), now())
        .expect_err("quota");
    assert!(matches!(
        err,
        ServiceError::QuotaExceeded {
            what: "active jobs",
            limit: 2
        }
    ));
    assert_eq!(err.status(), axum::http::StatusCode::PAYMENT_REQUIRED);

    jobs.close(&ngo.id, &first.id, now()).expect("closed");
    jobs.create(&ngo.id, draft("Cleanup three"), now())
        .expect("slot freed by closing");
}

#[test]
fn editing_a_rejected_job_resubmits_it() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let job = h
        .marketplace
        .jobs
        .create(&ngo.id, draft("River cleanup"), now())
        .expect("created");

    let err = h
        .marketplace
        .moderation
        .review_job(
            &admin.id,
            &job.id,
            Review::Reject {
                note: "  ".to_string(),
            },
            now(),
        )
        .expect_err("note required");
    assert!(matches!(err, ServiceError::Invalid(_)));

    let rejected = h
        .marketplace
        .moderation
        .review_job(
            &admin.id,
            &job.id,
            Review::Reject {
                note: "Add a meeting point".to_string(),
            },
            now(),
        )
        .expect("rejected");
    assert_eq!(rejected.status, JobStatus::Rejected);
    let rejection = h.notifier.sent().pop().expect("notified");
    assert_eq!(rejection.template, "job_rejected");
    assert_eq!(
        rejection.details.get("note").map(String::as_str),
        Some("Add a meeting point")
    );

    let edited = h
        .marketplace
        .jobs
        .update(&ngo.id, &job.id, draft("River cleanup at the bridge"), now())
        .expect("edited");
    assert_eq!(edited.status, JobStatus::PendingReview);
    assert!(edited.moderation_note.is_none());

    let other = h.ngo("other@example.org");
    assert!(matches!(
        h.marketplace
            .jobs
            .update(&other.id, &job.id, draft("Hijacked title"), now()),
        Err(ServiceError::Forbidden(_))
    ));
}

#[test]
fn resubmitting_a_rejected_job_respects_the_active_quota() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let jobs = &h.marketplace.jobs;

    let rejected = jobs.create(&ngo.id, draft("Cleanup one"), now()).expect("first");
    h.marketplace
        .moderation
        .review_job(
            &admin.id,
            &rejected.id,
            Review::Reject {
                note: "Needs a date".to_string(),
            },
            now(),
        )
        .expect("rejected");
    let second = jobs.create(&ngo.id, draft("Cleanup two"), now()).expect("second");
    jobs.create(&ngo.id, draft("Cleanup three"), now()).expect("third");

    let err = jobs
        .update(&ngo.id, &rejected.id, draft("Cleanup one, Saturday"), now())
        .expect_err("no free slot");
    assert!(matches!(
        err,
        ServiceError::QuotaExceeded {
            what: "active jobs",
            limit: 2
        }
    ));
    let stored = JobRepository::fetch(h.store.as_ref(), &rejected.id)
        .expect("fetch")
        .expect("job");
    assert_eq!(stored.status, JobStatus::Rejected);
    assert_eq!(stored.title, "Cleanup one");
    let active = JobRepository::list_by_ngo(h.store.as_ref(), &ngo.id)
        .expect("list")
        .into_iter()
        .filter(|job| job.status.is_active())
        .count();
    assert_eq!(active, 2);

    jobs.close(&ngo.id, &second.id, now()).expect("closed");
    let resubmitted = jobs
        .update(&ngo.id, &rejected.id, draft("Cleanup one, Saturday"), now())
        .expect("slot available again");
    assert_eq!(resubmitted.status, JobStatus::PendingReview);
}

#[test]
fn job_is_not_stored_when_admins_cannot_be_loaded() {
    let (h, users) = flaky_harness();
    h.admin();
    let ngo = h.ngo("rivers@example.org");

    users.fail_listing(true);
    let err = h
        .marketplace
        .jobs
        .create(&ngo.id, draft("River cleanup"), now())
        .expect_err("user listing offline");
    assert!(matches!(err, ServiceError::Repository(_)));
    assert!(JobRepository::list_by_ngo(h.store.as_ref(), &ngo.id)
        .expect("list")
        .is_empty());
    assert!(h.notifier.templates().is_empty());

    users.fail_listing(false);
    h.marketplace
        .jobs
        .create(&ngo.id, draft("River cleanup"), now())
        .expect("created once users are back");
    assert_eq!(h.notifier.templates(), vec!["job_submitted"]);
}

#[test]
fn volunteers_apply_once_per_job_until_they_withdraw() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let volunteer = h.volunteer("ada@example.org");
    let job = h.open_job(&ngo, &admin, "River cleanup");

    let application = h
        .marketplace
        .applications
        .apply(&volunteer.id, &job.id, "  I live nearby  ", now())
        .expect("applied");
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.ngo_id, ngo.id);
    assert_eq!(application.cover_letter, "I live nearby");
    let received = h.notifier.sent().pop().expect("notified");
    assert_eq!(received.template, "application_received");
    assert_eq!(received.recipient, ngo.id);

    let err = h
        .marketplace
        .applications
        .apply(&volunteer.id, &job.id, "", now())
        .expect_err("duplicate");
    assert!(matches!(err, ServiceError::Conflict(_)));

    h.marketplace
        .applications
        .withdraw(&volunteer.id, &application.id, now())
        .expect("withdrawn");
    h.marketplace
        .applications
        .apply(&volunteer.id, &job.id, "Trying again", now())
        .expect("reapplied after withdrawing");

    let mine = h
        .marketplace
        .applications
        .for_volunteer(&volunteer.id, None, PageRequest::default())
        .expect("listed");
    assert_eq!(mine.total, 2);
    assert_eq!(mine.items[0].job_title, "River cleanup");
    assert_eq!(mine.items[0].ngo_name, "Clean Rivers");
}

#[test]
fn free_volunteers_hit_the_rolling_application_quota() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.seed("big@example.org", Role::Ngo, Plan::Plus);
    let volunteer = h.volunteer("ada@example.org");
    let jobs: Vec<_> = (0..6)
        .map(|n| h.open_job(&ngo, &admin, &format!("Shift number {n}")))
        .collect();

    for job in &jobs[..5] {
        h.marketplace
            .applications
            .apply(&volunteer.id, &job.id, "", now())
            .expect("within quota");
    }
    let err = h
        .marketplace
        .applications
        .apply(&volunteer.id, &jobs[5].id, "", now())
        .expect_err("quota");
    assert!(matches!(
        err,
        ServiceError::QuotaExceeded {
            what: "applications",
            limit: 5
        }
    ));

    let later = now() + Duration::days(31);
    h.marketplace
        .applications
        .apply(&volunteer.id, &jobs[5].id, "", later)
        .expect("window rolled over");
}

#[test]
fn applications_respect_job_state_and_deadline() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let volunteer = h.volunteer("ada@example.org");

    let pending = h
        .marketplace
        .jobs
        .create(&ngo.id, draft("Not yet approved"), now())
        .expect("created");
    assert!(matches!(
        h.marketplace
            .applications
            .apply(&volunteer.id, &pending.id, "", now()),
        Err(ServiceError::InvalidState { .. })
    ));

    let mut dated = draft("Deadline soon");
    dated.deadline = NaiveDate::from_ymd_opt(2025, 6, 5);
    let job = h
        .marketplace
        .jobs
        .create(&ngo.id, dated, now())
        .expect("created");
    h.marketplace
        .moderation
        .review_job(&admin.id, &job.id, Review::Approve, now())
        .expect("approved");
    let err = h
        .marketplace
        .applications
        .apply(&volunteer.id, &job.id, "", now() + Duration::days(10))
        .expect_err("deadline passed");
    assert!(matches!(err, ServiceError::Invalid(_)));

    let err = h
        .marketplace
        .applications
        .apply(&ngo.id, &job.id, "", now())
        .expect_err("ngo cannot apply");
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn only_the_owning_ngo_decides_pending_applications() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let other = h.ngo("other@example.org");
    let volunteer = h.volunteer("ada@example.org");
    let job = h.open_job(&ngo, &admin, "River cleanup");
    let application = h
        .marketplace
        .applications
        .apply(&volunteer.id, &job.id, "", now())
        .expect("applied");

    assert!(matches!(
        h.marketplace
            .applications
            .decide(&other.id, &application.id, Decision::Accept, now()),
        Err(ServiceError::Forbidden(_))
    ));

    let accepted = h
        .marketplace
        .applications
        .decide(&ngo.id, &application.id, Decision::Accept, now())
        .expect("accepted");
    assert_eq!(accepted.status, ApplicationStatus::Accepted);
    assert_eq!(accepted.decided_at, Some(now()));
    let notice = h.notifier.sent().pop().expect("notified");
    assert_eq!(notice.template, "application_accepted");
    assert_eq!(notice.recipient, volunteer.id);

    assert!(matches!(
        h.marketplace
            .applications
            .decide(&ngo.id, &application.id, Decision::Reject, now()),
        Err(ServiceError::InvalidState { .. })
    ));
    assert!(matches!(
        h.marketplace
            .applications
            .withdraw(&volunteer.id, &application.id, now()),
        Err(ServiceError::InvalidState { .. })
    ));

    let applicants = h
        .marketplace
        .applications
        .for_job(
            &ngo.id,
            &job.id,
            Some(ApplicationStatus::Accepted),
            PageRequest::default(),
        )
        .expect("listed");
    assert_eq!(applicants.total, 1);
    assert_eq!(applicants.items[0].volunteer_name, "ada");
    assert_eq!(applicants.items[0].city.as_deref(), Some("Lagos"));
}

#[test]
fn checkout_replaces_pending_orders_and_confirm_upgrades() {
    let h = harness();
    let admin = h.admin();
    let volunteer = h.volunteer("ada@example.org");
    let billing = &h.marketplace.billing;

    let first = billing.checkout(&volunteer.id, plus(1), now()).expect("first");
    let second = billing.checkout(&volunteer.id, plus(3), now()).expect("second");
    assert_eq!(second.amount_cents, 2_700);

    let orders = billing.orders_for(&volunteer.id).expect("orders");
    let stale = orders.iter().find(|o| o.id == first.id).expect("first kept");
    assert_eq!(stale.status, OrderStatus::Cancelled);

    let settlement = billing
        .confirm(&admin.id, &second.id, "pay_123", now())
        .expect("confirmed");
    assert_eq!(settlement.order.status, OrderStatus::Paid);
    assert_eq!(settlement.user.plan, Plan::Plus);
    assert_eq!(settlement.user.plan_expires_at, Some(now() + Duration::days(90)));
    assert_eq!(h.notifier.templates(), vec!["plan_activated"]);

    assert!(matches!(
        billing.confirm(&admin.id, &second.id, "pay_123", now()),
        Err(ServiceError::InvalidState { .. })
    ));

    let renewal = billing.checkout(&volunteer.id, plus(1), now()).expect("renewal");
    let settlement = billing
        .confirm(&admin.id, &renewal.id, "pay_456", now() + Duration::days(10))
        .expect("renewed");
    assert_eq!(
        settlement.user.plan_expires_at,
        Some(now() + Duration::days(120)),
        "purchased time stacks on the remainder"
    );
}

#[test]
fn paying_for_plus_finishes_onboarding() {
    let h = harness();
    let mut user = h.volunteer("new@example.org");
    user.onboarding = OnboardingStep::PlanSelection;
    UserRepository::update(h.store.as_ref(), user.clone()).expect("stored");

    let order = h
        .marketplace
        .billing
        .checkout(&user.id, plus(1), now())
        .expect("checkout during onboarding");
    let paid = h
        .marketplace
        .billing
        .settle_callback(&h.callback(&order.id, PaymentOutcome::Paid, "pay_789"), now())
        .expect("provider settled");
    assert_eq!(paid.payment_reference.as_deref(), Some("pay_789"));

    let stored = h.stored_user(&user.id);
    assert!(stored.onboarding.is_complete());
    assert_eq!(stored.plan, Plan::Plus);
}

#[test]
fn owners_cannot_settle_their_own_orders() {
    let h = harness();
    let volunteer = h.volunteer("ada@example.org");
    let billing = &h.marketplace.billing;
    let order = billing
        .checkout(&volunteer.id, plus(12), now())
        .expect("order");

    assert!(matches!(
        billing.confirm(&volunteer.id, &order.id, "made-up", now()),
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        billing.fail(&volunteer.id, &order.id, "changed my mind", now()),
        Err(ServiceError::Forbidden(_))
    ));

    let mut forged = h.callback(&order.id, PaymentOutcome::Paid, "pay_real");
    forged.reference = "made-up".to_string();
    assert!(matches!(
        billing.settle_callback(&forged, now()),
        Err(ServiceError::Auth(_))
    ));

    let stored = h.stored_user(&volunteer.id);
    assert_eq!(stored.plan, Plan::Free);
    let order = OrderRepository::fetch(h.store.as_ref(), &order.id)
        .expect("fetch")
        .expect("order");
    assert_eq!(order.status, OrderStatus::Pending);
}

#[test]
fn provider_reports_failed_payments() {
    let h = harness();
    let volunteer = h.volunteer("ada@example.org");
    let billing = &h.marketplace.billing;
    let order = billing.checkout(&volunteer.id, plus(1), now()).expect("order");

    let failed = billing
        .settle_callback(&h.callback(&order.id, PaymentOutcome::Failed, "card declined"), now())
        .expect("failure recorded");
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));

    assert!(matches!(
        billing.settle_callback(&h.callback(&order.id, PaymentOutcome::Paid, "pay_late"), now()),
        Err(ServiceError::InvalidState { .. })
    ));
}

#[test]
fn billing_guards_owners_and_admins() {
    let h = harness();
    let admin = h.admin();
    let volunteer = h.volunteer("ada@example.org");
    let stranger = h.volunteer("eve@example.org");
    let billing = &h.marketplace.billing;

    assert!(matches!(
        billing.checkout(&admin.id, plus(1), now()),
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        billing.checkout(&volunteer.id, plus(13), now()),
        Err(ServiceError::Invalid(_))
    ));
    assert!(matches!(
        billing.checkout(
            &volunteer.id,
            Checkout {
                plan: Plan::Free,
                months: 1
            },
            now()
        ),
        Err(ServiceError::Invalid(_))
    ));

    let order = billing.checkout(&volunteer.id, plus(1), now()).expect("order");
    assert!(matches!(
        billing.confirm(&stranger.id, &order.id, "pay", now()),
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        billing.cancel(&stranger.id, &order.id, now()),
        Err(ServiceError::Forbidden(_))
    ));

    let failed = billing
        .fail(&admin.id, &order.id, "card declined", now())
        .expect("admin may settle");
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    assert!(matches!(
        billing.cancel(&volunteer.id, &order.id, now()),
        Err(ServiceError::InvalidState { .. })
    ));
}

#[test]
fn failed_upgrade_leaves_the_order_pending() {
    let (h, users) = flaky_harness();
    let admin = h.admin();
    let volunteer = h.volunteer("ada@example.org");
    let billing = &h.marketplace.billing;
    let order = billing.checkout(&volunteer.id, plus(1), now()).expect("order");

    users.fail_updates(true);
    assert!(matches!(
        billing.confirm(&admin.id, &order.id, "pay_1", now()),
        Err(ServiceError::Repository(_))
    ));
    let stored = OrderRepository::fetch(h.store.as_ref(), &order.id)
        .expect("fetch")
        .expect("order");
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.payment_reference.is_none());
    assert_eq!(h.stored_user(&volunteer.id).plan, Plan::Free);
    assert!(h.notifier.templates().is_empty());

    users.fail_updates(false);
    let settlement = billing
        .confirm(&admin.id, &order.id, "pay_1", now())
        .expect("retry succeeds");
    assert_eq!(settlement.order.status, OrderStatus::Paid);
    assert_eq!(h.stored_user(&volunteer.id).plan, Plan::Plus);
}

#[test]
fn suspension_rules_and_effects() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let volunteer = h.volunteer("ada@example.org");
    let job = h.open_job(&ngo, &admin, "River cleanup");
    let moderation = &h.marketplace.moderation;

    assert!(matches!(
        moderation.set_suspended(&admin.id, &admin.id, true),
        Err(ServiceError::Forbidden(_))
    ));
    let other_admin = h.seed("root@example.org", Role::Admin, Plan::Free);
    assert!(matches!(
        moderation.set_suspended(&admin.id, &other_admin.id, true),
        Err(ServiceError::Forbidden(_))
    ));

    let suspended = moderation
        .set_suspended(&admin.id, &volunteer.id, true)
        .expect("suspended");
    assert!(suspended.suspended);
    assert!(matches!(
        h.marketplace
            .applications
            .apply(&volunteer.id, &job.id, "", now()),
        Err(ServiceError::Forbidden(_))
    ));

    let listed = moderation
        .users(
            &admin.id,
            &crate::marketplace::moderation::UserFilter {
                suspended: Some(true),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .expect("listed");
    assert_eq!(listed.total, 1);

    moderation
        .set_suspended(&admin.id, &volunteer.id, false)
        .expect("reinstated");
    h.marketplace
        .applications
        .apply(&volunteer.id, &job.id, "", now())
        .expect("applies again");

    assert!(matches!(
        moderation.jobs(&volunteer.id, None, PageRequest::default()),
        Err(ServiceError::Forbidden(_))
    ));
}

#[test]
fn dashboards_and_analytics_follow_the_plan() {
    let h = harness();
    let admin = h.admin();
    let ngo = h.ngo("rivers@example.org");
    let ada = h.volunteer("ada@example.org");
    let bo = h.volunteer("bo@example.org");
    let job = h.open_job(&ngo, &admin, "River cleanup");
    let apps = &h.marketplace.applications;

    let first = apps.apply(&ada.id, &job.id, "", now()).expect("ada");
    let second = apps.apply(&bo.id, &job.id, "", now()).expect("bo");
    apps.decide(&ngo.id, &first.id, Decision::Accept, now())
        .expect("accepted");
    apps.decide(&ngo.id, &second.id, Decision::Reject, now())
        .expect("rejected");

    let dashboard = h
        .marketplace
        .reports
        .ngo_dashboard(&ngo.id, now())
        .expect("dashboard");
    assert_eq!(dashboard.applications.total, 2);
    assert_eq!(dashboard.active_jobs, 1);
    assert_eq!(dashboard.remaining_job_slots, Some(1));
    assert_eq!(dashboard.top_jobs[0].applications, 2);
    assert_eq!(dashboard.jobs_by_status.get(&JobStatus::Open), Some(&1));

    let volunteer = h
        .marketplace
        .reports
        .volunteer_dashboard(&ada.id, now())
        .expect("volunteer dashboard");
    assert_eq!(volunteer.applications.accepted, 1);
    assert_eq!(volunteer.remaining_quota, Some(4));
    assert_eq!(volunteer.recent.len(), 1);

    assert!(matches!(
        h.marketplace.reports.ngo_analytics(&ngo.id, now()),
        Err(ServiceError::Forbidden(_))
    ));

    let order = h
        .marketplace
        .billing
        .checkout(&ngo.id, plus(1), now())
        .expect("order");
    h.marketplace
        .billing
        .confirm(&admin.id, &order.id, "pay_1", now())
        .expect("paid");

    let analytics = h
        .marketplace
        .reports
        .ngo_analytics(&ngo.id, now())
        .expect("plus analytics");
    assert_eq!(analytics.jobs[0].acceptance_rate, Some(0.5));
    assert_eq!(analytics.applications_per_month.get("2025-06"), Some(&2));

    let platform = h
        .marketplace
        .reports
        .platform_analytics(&admin.id, now())
        .expect("platform");
    assert_eq!(platform.revenue_cents, 900);
    assert_eq!(platform.revenue_per_month.get("2025-06"), Some(&900));
    assert_eq!(platform.active_plus_subscriptions, 1);
    assert_eq!(platform.users_by_role.get("volunteer"), Some(&2));
    assert_eq!(platform.applications.total, 2);
    assert!(matches!(
        h.marketplace.reports.platform_analytics(&ngo.id, now()),
        Err(ServiceError::Forbidden(_))
    ));
}
