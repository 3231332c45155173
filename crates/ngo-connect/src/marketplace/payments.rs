//! Signed settlement callbacks from the payment provider.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::domain::OrderId;
use crate::auth::AuthError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

impl PaymentOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentOutcome::Paid => "paid",
            PaymentOutcome::Failed => "failed",
        }
    }
}

/// Body the provider posts once it has settled an order. `reference` is the provider's
/// payment id for a paid order and the failure reason otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    pub order_id: OrderId,
    pub outcome: PaymentOutcome,
    #[serde(default)]
    pub reference: String,
    pub signature: String,
}

/// HMAC-SHA256 over `order_id|outcome|reference`, hex encoded.
#[derive(Clone)]
pub struct PaymentVerifier {
    secret: Arc<[u8]>,
}

impl fmt::Debug for PaymentVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl PaymentVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: Arc::from(secret),
        }
    }

    pub fn sign(
        &self,
        order_id: &OrderId,
        outcome: PaymentOutcome,
        reference: &str,
    ) -> Result<String, AuthError> {
        let mac = self.mac(order_id, outcome, reference)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, callback: &PaymentCallback) -> Result<(), AuthError> {
        let signature =
            hex::decode(callback.signature.trim()).map_err(|_| AuthError::Unauthorized)?;
        self.mac(&callback.order_id, callback.outcome, &callback.reference)?
            .verify_slice(&signature)
            .map_err(|_| AuthError::Unauthorized)
    }

    fn mac(
        &self,
        order_id: &OrderId,
        outcome: PaymentOutcome,
        reference: &str,
    ) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| AuthError::Internal(format!("invalid webhook key: {err}")))?;
        mac.update(format!("{order_id}|{}|{reference}", outcome.label()).as_bytes());
        Ok(mac)
    }
}
