//! Payment provider port.
//!
//! The engine only needs two capabilities: mint a checkout link for a deposit,
//! and authenticate an inbound webhook. Everything provider-specific lives
//! behind [`PaymentProvider`].

use async_trait::async_trait;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::Price;

const ULID_TEXT_LEN: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub url: String,
    pub order_reference: String,
}

/// Provider callback, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentWebhook {
    pub order_reference: String,
    /// Free text echoed back by the provider. Carries the booking id.
    pub description: String,
    pub amount: Price,
    pub success: bool,
    pub signature: String,
}

impl PaymentWebhook {
    /// First token in the description that parses as a ULID.
    pub fn booking_id(&self) -> Option<Ulid> {
        self.description
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| token.len() == ULID_TEXT_LEN)
            .find_map(|token| token.parse().ok())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payments are not configured")]
    Disabled,
    #[error("payment provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_link(
        &self,
        booking_id: Ulid,
        amount: Price,
        description: &str,
    ) -> Result<PaymentLink, PaymentError>;

    fn verify_webhook_signature(&self, payload: &PaymentWebhook) -> bool;
}

/// For deployments without a provider: link creation fails and no webhook
/// is ever authentic.
pub struct Disabled;

#[async_trait]
impl PaymentProvider for Disabled {
    async fn create_payment_link(&self, _: Ulid, _: Price, _: &str) -> Result<PaymentLink, PaymentError> {
        Err(PaymentError::Disabled)
    }

    fn verify_webhook_signature(&self, _: &PaymentWebhook) -> bool {
        false
    }
}

/// Description sent to the provider; `PaymentWebhook::booking_id` reads it back.
pub fn deposit_description(booking_id: Ulid) -> String {
    format!("Deposit {booking_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(description: &str) -> PaymentWebhook {
        PaymentWebhook {
            order_reference: "ORD-1".into(),
            description: description.into(),
            amount: 45_000,
            success: true,
            signature: String::new(),
        }
    }

    #[test]
    fn extracts_booking_id_from_description() {
        let id = Ulid::new();
        assert_eq!(webhook(&deposit_description(id)).booking_id(), Some(id));
        assert_eq!(webhook("CK-0042 court fee").booking_id(), None);
        assert_eq!(webhook(&format!("pay:{id}:v2")).booking_id(), Some(id));
    }

    #[test]
    fn ignores_tokens_that_are_not_ulids() {
        // 26 chars, but U is outside the Crockford alphabet
        assert_eq!(webhook("UUUUUUUUUUUUUUUUUUUUUUUUUU").booking_id(), None);
        assert_eq!(webhook("").booking_id(), None);
    }

    #[tokio::test]
    async fn disabled_provider_rejects_everything() {
        let provider = Disabled;
        let err = provider.create_payment_link(Ulid::new(), 1, "x").await.unwrap_err();
        assert!(matches!(err, PaymentError::Disabled));
        assert!(!provider.verify_webhook_signature(&webhook("")));
    }
}
