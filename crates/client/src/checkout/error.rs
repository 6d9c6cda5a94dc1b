//! Checkout error types.

use shopsession_core::PaymentStatus;
use thiserror::Error;

use super::CheckoutPhase;
use crate::error::ApiError;
use crate::gateway::GatewayError;

/// Errors from checkout transitions.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout cannot start (or continue) with an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// Another checkout step is already running.
    #[error("a checkout is already in progress")]
    AlreadyInProgress,

    /// The requested step is not valid from the current phase.
    #[error("cannot {action} while checkout is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: CheckoutPhase,
    },

    /// The order was not created. Nothing is pending on the backend.
    #[error("failed to create order: {0}")]
    Order(#[source] ApiError),

    /// The order exists but no payment intent could be created for it.
    #[error("failed to create payment intent: {0}")]
    Intent(#[source] ApiError),

    /// The gateway declined the card. The same order can be retried.
    #[error("payment declined: {message}")]
    PaymentDeclined {
        code: Option<String>,
        message: String,
    },

    /// The gateway failed for a reason other than a decline.
    #[error(transparent)]
    Gateway(GatewayError),

    /// The backend answered the confirmation with a non-success status.
    #[error("payment not completed: {0:?}")]
    PaymentNotCompleted(PaymentStatus),

    /// The backend rejected or never answered the confirmation.
    #[error("payment confirmation failed: {0}")]
    Confirmation(#[source] ApiError),

    /// The checkout was abandoned or restarted while this step was in flight.
    #[error("checkout was superseded")]
    Superseded,

    /// The confirmation retry bound was reached; the checkout must be abandoned.
    #[error("payment failed after {attempts} attempts")]
    RetryLimitReached { attempts: u32 },

    /// A backend call outside the main flow (e.g. cancellation) failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CheckoutError {
    /// Whether the user can retry the confirmation on the same order.
    #[must_use]
    pub const fn can_retry_payment(&self) -> bool {
        matches!(
            self,
            Self::PaymentDeclined { .. }
                | Self::Gateway(_)
                | Self::PaymentNotCompleted(_)
                | Self::Confirmation(_)
        )
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined { code, message } => Self::PaymentDeclined { code, message },
            other => Self::Gateway(other),
        }
    }
}
