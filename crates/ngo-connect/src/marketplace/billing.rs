//! Plan purchases. An order is created at checkout and settled either by the provider's
//! signed callback or by an administrator.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{OnboardingStep, Order, OrderId, OrderStatus, Plan, Role, User, UserId};
use super::error::{acting_as, active_user, ServiceError};
use super::notify::{dispatch, Notification, Notifier};
use super::payments::{PaymentCallback, PaymentOutcome, PaymentVerifier};
use super::plans::{extend_expiry, PlanPricing};
use super::repository::Collections;

pub const CHECKOUT_MONTHS: RangeInclusive<u8> = 1..=12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Checkout {
    pub plan: Plan,
    #[serde(default = "one_month")]
    pub months: u8,
}

fn one_month() -> u8 {
    1
}

/// A paid order together with the upgraded account.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub order: Order,
    pub user: User,
}

#[derive(Clone)]
pub struct BillingService {
    collections: Collections,
    notifier: Arc<dyn Notifier>,
    pricing: PlanPricing,
    payments: PaymentVerifier,
}

impl BillingService {
    pub fn new(
        collections: Collections,
        notifier: Arc<dyn Notifier>,
        pricing: PlanPricing,
        payments: PaymentVerifier,
    ) -> Self {
        Self {
            collections,
            notifier,
            pricing,
            payments,
        }
    }

    pub fn pricing(&self) -> PlanPricing {
        self.pricing
    }

    pub fn payments(&self) -> &PaymentVerifier {
        &self.payments
    }

    /// Open a pending order, cancelling any order the user left pending.
    pub fn checkout(
        &self,
        user_id: &UserId,
        checkout: Checkout,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let user = active_user(&self.collections, user_id)?;
        match user.role {
            None => {
                return Err(ServiceError::InvalidState {
                    entity: "account",
                    state: user.onboarding.label(),
                    action: "buy a plan for",
                })
            }
            Some(Role::Admin) => {
                return Err(ServiceError::Forbidden(
                    "administrators do not buy plans".into(),
                ))
            }
            Some(_) => {}
        }
        if matches!(
            user.onboarding,
            OnboardingStep::RoleSelection | OnboardingStep::Profile
        ) {
            return Err(ServiceError::InvalidState {
                entity: "account",
                state: user.onboarding.label(),
                action: "buy a plan for",
            });
        }
        if checkout.plan != Plan::Plus {
            return Err(ServiceError::Invalid(format!(
                "the {} plan cannot be purchased",
                checkout.plan.label()
            )));
        }
        if !CHECKOUT_MONTHS.contains(&checkout.months) {
            return Err(ServiceError::Invalid(format!(
                "months must be between {} and {}",
                CHECKOUT_MONTHS.start(),
                CHECKOUT_MONTHS.end()
            )));
        }

        for mut stale in self
            .collections
            .orders
            .list_by_user(user_id)?
            .into_iter()
            .filter(|order| order.status == OrderStatus::Pending)
        {
            stale.status = OrderStatus::Cancelled;
            stale.settled_at = Some(now);
            self.collections.orders.update(stale.clone())?;
            info!(order = %stale.id, "superseded pending order cancelled");
        }

        let order = self.collections.orders.insert(Order {
            id: OrderId::new(),
            user_id: user.id,
            plan: checkout.plan,
            months: checkout.months,
            amount_cents: self.pricing.price(checkout.plan, checkout.months),
            status: OrderStatus::Pending,
            payment_reference: None,
            failure_reason: None,
            created_at: now,
            settled_at: None,
        })?;
        info!(order = %order.id, user = %user.id, amount = order.amount_cents, "checkout opened");
        Ok(order)
    }

    /// Apply a settlement reported by the payment provider once its signature checks out.
    pub fn settle_callback(
        &self,
        callback: &PaymentCallback,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        if let Err(err) = self.payments.verify(callback) {
            warn!(order = %callback.order_id, "payment callback signature rejected");
            return Err(err.into());
        }
        let order = self.fetch(&callback.order_id)?;
        ensure_pending(&order, "settle")?;
        match callback.outcome {
            PaymentOutcome::Paid => Ok(self.mark_paid(order, &callback.reference, now)?.order),
            PaymentOutcome::Failed => self.mark_failed(order, &callback.reference, now),
        }
    }

    /// Manually settle a pending order as paid and upgrade its owner.
    pub fn confirm(
        &self,
        admin_id: &UserId,
        order_id: &OrderId,
        payment_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Settlement, ServiceError> {
        let order = self.settleable(admin_id, order_id, "confirm")?;
        self.mark_paid(order, payment_reference, now)
    }

    pub fn fail(
        &self,
        admin_id: &UserId,
        order_id: &OrderId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let order = self.settleable(admin_id, order_id, "fail")?;
        self.mark_failed(order, reason, now)
    }

    pub fn cancel(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let mut order = self.fetch(order_id)?;
        if &order.user_id != user_id {
            return Err(ServiceError::Forbidden("order belongs to another user".into()));
        }
        ensure_pending(&order, "cancel")?;
        order.status = OrderStatus::Cancelled;
        order.settled_at = Some(now);
        self.collections.orders.update(order.clone())?;
        info!(order = %order.id, "order cancelled");
        Ok(order)
    }

    pub fn orders_for(&self, user_id: &UserId) -> Result<Vec<Order>, ServiceError> {
        Ok(self.collections.orders.list_by_user(user_id)?)
    }

    fn settleable(
        &self,
        admin_id: &UserId,
        order_id: &OrderId,
        action: &'static str,
    ) -> Result<Order, ServiceError> {
        acting_as(&self.collections, admin_id, Role::Admin)?;
        let order = self.fetch(order_id)?;
        ensure_pending(&order, action)?;
        Ok(order)
    }

    fn mark_paid(
        &self,
        pending: Order,
        payment_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Settlement, ServiceError> {
        let payment_reference = payment_reference.trim();
        if payment_reference.is_empty() {
            return Err(ServiceError::Invalid("payment reference is required".into()));
        }

        let mut user = self.collections.user(&pending.user_id)?;
        let current = match user.plan {
            Plan::Plus => user.plan_expires_at,
            Plan::Free => None,
        };
        user.plan = pending.plan;
        let period = self.pricing.period(pending.months);
        user.plan_expires_at = Some(extend_expiry(current, now, period));
        if user.onboarding == OnboardingStep::PlanSelection {
            user.onboarding = OnboardingStep::Complete;
        }

        let mut order = pending.clone();
        order.status = OrderStatus::Paid;
        order.payment_reference = Some(payment_reference.to_string());
        order.settled_at = Some(now);
        // Claim the order first; it is reopened below if the upgrade cannot be stored.
        self.collections.orders.update(order.clone())?;
        if let Err(err) = self.collections.users.update(user.clone()) {
            if let Err(restore) = self.collections.orders.update(pending) {
                error!(order = %order.id, error = %restore, "paid order could not be reopened");
            }
            warn!(order = %order.id, error = %err, "plan upgrade failed, order left pending");
            return Err(err.into());
        }
        info!(order = %order.id, user = %user.id, "order paid, plan activated");

        let expires = user
            .plan_expires_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default();
        dispatch(
            self.notifier.as_ref(),
            Notification::new(user.id, "plan_activated")
                .with("plan", order.plan.label())
                .with("expires_at", expires),
        );
        Ok(Settlement { order, user })
    }

    fn mark_failed(
        &self,
        mut order: Order,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        order.status = OrderStatus::Failed;
        order.failure_reason = Some(reason.trim().to_string()).filter(|r| !r.is_empty());
        order.settled_at = Some(now);
        self.collections.orders.update(order.clone())?;
        warn!(order = %order.id, reason = ?order.failure_reason, "payment failed");
        Ok(order)
    }

    fn fetch(&self, id: &OrderId) -> Result<Order, ServiceError> {
        self.collections
            .orders
            .fetch(id)?
            .ok_or(ServiceError::NotFound("order"))
    }
}

fn ensure_pending(order: &Order, action: &'static str) -> Result<(), ServiceError> {
    if order.status == OrderStatus::Pending {
        Ok(())
    } else {
        Err(ServiceError::InvalidState {
            entity: "order",
            state: order.status.label(),
            action,
        })
    }
}
