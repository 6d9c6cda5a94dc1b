//! Status enums reported by the order/payment backend and the gateway.

use serde::{Deserialize, Serialize};

/// Backend order status.
///
/// Orders are created `Pending` before payment is attempted and move to
/// `Confirmed` once the backend accepts the payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    /// A status this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Whether the backend still allows cancelling an order in this status.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Payment intent status, as reported by the gateway and echoed by the
/// backend's confirmation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Processing,
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    RequiresCapture,
    Canceled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Only a `succeeded` payment finalizes an order.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_statuses_do_not_fail_decoding() {
        let status: OrderStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);
        let status: PaymentStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(status, PaymentStatus::Unknown);
    }

    #[test]
    fn test_payment_status_success() {
        let status: PaymentStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert!(status.is_success());
        assert!(!PaymentStatus::RequiresPaymentMethod.is_success());
    }

    #[test]
    fn test_cancellable_orders() {
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
    }
}
