//! External payment gateway.
//!
//! Card details go straight from this process to the gateway; the
//! order/payment backend only ever sees the resulting payment method
//! reference. [`StripeGateway`] performs the single confirmation call that
//! checkout needs.

mod stripe;

pub use stripe::{STRIPE_API_BASE, StripeGateway};

use async_trait::async_trait;
use secrecy::SecretString;
use shopsession_core::PaymentStatus;
use thiserror::Error;

/// How the customer pays for one confirmation.
#[derive(Clone)]
pub enum PaymentMethodDetails {
    /// A payment method already stored with the gateway (`pm_...`).
    Saved { payment_method_id: String },
    /// A single-use card token created by the gateway (`tok_...`).
    CardToken {
        token: SecretString,
        billing: BillingDetails,
    },
}

impl std::fmt::Debug for PaymentMethodDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Saved { payment_method_id } => f
                .debug_struct("Saved")
                .field("payment_method_id", payment_method_id)
                .finish(),
            Self::CardToken { billing, .. } => f
                .debug_struct("CardToken")
                .field("token", &"[REDACTED]")
                .field("billing", billing)
                .finish(),
        }
    }
}

/// Cardholder details sent with a new card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingDetails {
    pub name: String,
    pub email: String,
}

/// Gateway acceptance of a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfirmation {
    pub payment_intent_id: String,
    /// The payment method reference to hand to the backend.
    pub payment_method_id: String,
    pub status: PaymentStatus,
}

/// Gateway-side failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The card was declined. The payment intent can be confirmed again.
    #[error("payment declined: {message}")]
    Declined {
        code: Option<String>,
        message: String,
    },

    /// The payment needs a customer action (e.g. 3-D Secure) this client
    /// cannot perform.
    #[error("payment requires additional customer action")]
    ActionRequired,

    /// The gateway refused the request for a non-card reason.
    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The gateway could not be reached.
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// Missing key, malformed client secret, or unexpected response shape.
    #[error("gateway configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether retrying the same payment intent makes sense.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Declined { .. } | Self::Transport(_))
    }
}

/// Confirms payment intents with the external gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Confirm the payment intent identified by `client_secret`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Declined` when the card is refused.
    async fn confirm_card_payment(
        &self,
        client_secret: &SecretString,
        details: &PaymentMethodDetails,
    ) -> Result<GatewayConfirmation, GatewayError>;
}
