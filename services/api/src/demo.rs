use crate::infra::build_marketplace;
use chrono::{Duration, Utc};
use clap::Args;
use ngo_connect::auth::hash_password;
use ngo_connect::config::AppConfig;
use ngo_connect::error::AppError;
use ngo_connect::marketplace::{
    Checkout, Decision, JobDraft, JobQuery, Marketplace, NgoProfile, PageRequest,
    PaymentCallback, PaymentOutcome, Plan, RecordingNotifier, Registration, Review, Role,
    ServiceError, User, UserProfile, VolunteerProfile,
};
use std::sync::Arc;

const DEMO_PASSWORD: &str = "demo password";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Upgrade the demo NGO to the plus plan and print its analytics.
    #[arg(long)]
    pub(crate) plus: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    config.admin_seed = None;
    let notifier = RecordingNotifier::default();
    let marketplace = build_marketplace(&config, Arc::new(notifier.clone()))?;
    let now = Utc::now();

    let hash = hash_password(DEMO_PASSWORD).map_err(ServiceError::from)?;
    let admin = marketplace
        .accounts
        .create_admin("admin@demo.org", "Demo Admin", &hash, now)?;

    let ngo = onboard(
        &marketplace,
        "team@rivers.demo.org",
        Role::Ngo,
        UserProfile::Ngo(NgoProfile {
            organization: "Clean Rivers Trust".to_string(),
            mission: "Keep the city's rivers swimmable".to_string(),
            website: None,
            city: "Lagos".to_string(),
            registration_number: "RC-1042".to_string(),
        }),
    )?;
    let ngo = if args.plus {
        let order = marketplace.billing.checkout(
            &ngo.id,
            Checkout {
                plan: Plan::Plus,
                months: 1,
            },
            now,
        )?;
        let reference = "demo_payment";
        let signature = marketplace
            .billing
            .payments()
            .sign(&order.id, PaymentOutcome::Paid, reference)
            .map_err(ServiceError::from)?;
        let paid = marketplace.billing.settle_callback(
            &PaymentCallback {
                order_id: order.id,
                outcome: PaymentOutcome::Paid,
                reference: reference.to_string(),
                signature,
            },
            now,
        )?;
        let ngo = marketplace.accounts.profile(&ngo.id)?;
        println!(
            "NGO paid {} cents for plus until {}",
            paid.amount_cents,
            ngo.plan_expires_at
                .map(|at| at.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        );
        ngo
    } else {
        marketplace.accounts.choose_free_plan(&ngo.id)?
    };

    let volunteer = onboard(
        &marketplace,
        "ada@volunteer.demo.org",
        Role::Volunteer,
        UserProfile::Volunteer(VolunteerProfile {
            skills: vec!["boating".to_string(), "first aid".to_string()],
            city: "Lagos".to_string(),
            bio: "Weekend rower".to_string(),
            availability_hours: 6,
        }),
    )?;
    let volunteer = marketplace.accounts.choose_free_plan(&volunteer.id)?;

    let job = marketplace.jobs.create(
        &ngo.id,
        JobDraft {
            title: "Saturday river cleanup".to_string(),
            description: "Collect litter along the lagoon shore".to_string(),
            category: "Environment".to_string(),
            city: "Lagos".to_string(),
            remote: false,
            skills: vec!["boating".to_string()],
            commitment_hours: 4,
            deadline: Some((now + Duration::days(14)).date_naive()),
        },
        now,
    )?;
    println!("Job '{}' submitted: {}", job.title, job.status.label());

    let job = marketplace
        .moderation
        .review_job(&admin.id, &job.id, Review::Approve, now)?;
    println!("Job reviewed: {}", job.status.label());

    let listing = marketplace
        .jobs
        .public_list(&JobQuery::default(), PageRequest::default())?;
    println!("Public listing shows {} open job(s)", listing.total);

    let application =
        marketplace
            .applications
            .apply(&volunteer.id, &job.id, "I row every weekend", now)?;
    let application =
        marketplace
            .applications
            .decide(&ngo.id, &application.id, Decision::Accept, now)?;
    println!("Application {}", application.status.label());

    let dashboard = marketplace.reports.volunteer_dashboard(&volunteer.id, now)?;
    println!(
        "Volunteer dashboard: {} application(s), {} accepted, quota left {}",
        dashboard.applications.total,
        dashboard.applications.accepted,
        describe_limit(dashboard.remaining_quota)
    );

    let order = marketplace.billing.checkout(
        &volunteer.id,
        Checkout {
            plan: Plan::Plus,
            months: 1,
        },
        now,
    )?;
    marketplace
        .billing
        .confirm(&admin.id, &order.id, "demo_volunteer_payment", now)?;
    let dashboard = marketplace.reports.volunteer_dashboard(&volunteer.id, now)?;
    println!(
        "Volunteer upgraded to {}: quota left {}",
        dashboard.plan.label(),
        describe_limit(dashboard.remaining_quota)
    );

    let dashboard = marketplace.reports.ngo_dashboard(&ngo.id, now)?;
    println!(
        "NGO dashboard ({}): {} active job(s), job slots left {}",
        dashboard.plan.label(),
        dashboard.active_jobs,
        describe_limit(dashboard.remaining_job_slots)
    );

    if args.plus {
        let analytics = marketplace.reports.ngo_analytics(&ngo.id, now)?;
        for job in &analytics.jobs {
            println!(
                "  {}: acceptance rate {}",
                job.title,
                job.acceptance_rate
                    .map(|rate| format!("{:.0}%", rate * 100.0))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
    }

    let platform = marketplace.reports.platform_analytics(&admin.id, now)?;
    println!(
        "Platform: {} plus subscription(s), {} cents revenue",
        platform.active_plus_subscriptions, platform.revenue_cents
    );

    println!("Notifications sent:");
    for notification in notifier.sent() {
        println!("  {} -> {}", notification.template, notification.recipient);
    }
    Ok(())
}

fn onboard(
    marketplace: &Marketplace,
    email: &str,
    role: Role,
    profile: UserProfile,
) -> Result<User, ServiceError> {
    let name = email.split('@').next().unwrap_or(email).to_string();
    let user = marketplace.accounts.register(
        Registration {
            email: email.to_string(),
            name,
            password: DEMO_PASSWORD.to_string(),
        },
        Utc::now(),
    )?;
    marketplace.accounts.select_role(&user.id, role)?;
    marketplace.accounts.complete_profile(&user.id, profile)
}

fn describe_limit(remaining: Option<u32>) -> String {
    remaining
        .map(|left| left.to_string())
        .unwrap_or_else(|| "unlimited".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end() {
        run_demo(DemoArgs { plus: false }).expect("free demo");
        run_demo(DemoArgs { plus: true }).expect("plus demo");
    }

    #[test]
    fn unlimited_quotas_are_spelled_out() {
        assert_eq!(describe_limit(None), "unlimited");
        assert_eq!(describe_limit(Some(3)), "3");
    }
}
