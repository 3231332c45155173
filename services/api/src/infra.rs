use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use ngo_connect::auth::SessionManager;
use ngo_connect::config::AppConfig;
use ngo_connect::error::AppError;
use ngo_connect::marketplace::{Collections, Marketplace, Notifier, PaymentVerifier, PlanPricing};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

const SEEDED_ADMIN_NAME: &str = "Administrator";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the marketplace against in-memory collections and seed the configured admin.
pub(crate) fn build_marketplace(
    config: &AppConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<Marketplace, AppError> {
    let marketplace = Marketplace::new(
        Collections::in_memory(),
        Arc::new(SessionManager::new(&config.auth)),
        notifier,
        PlanPricing::from(&config.billing),
        PaymentVerifier::new(&config.payments.webhook_secret),
    );

    if let Some(seed) = &config.admin_seed {
        let admin = marketplace.accounts.create_admin(
            &seed.email,
            SEEDED_ADMIN_NAME,
            &seed.password_hash,
            Utc::now(),
        )?;
        info!(admin = %admin.id, "admin account available");
    }

    Ok(marketplace)
}
