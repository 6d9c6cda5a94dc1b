//! Decimal money values and checkout totals.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Totals breakdown for a purchase.
///
/// The backend is the only authority on tax and final totals. A locally
/// computed value is marked `provisional` and carries zero tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Totals {
    /// Sum of line prices before tax.
    pub subtotal: Decimal,
    /// Tax charged on the order.
    pub tax: Decimal,
    /// Amount to be charged.
    pub total: Decimal,
    /// `true` when computed from the cart rather than returned by the backend.
    #[serde(default)]
    pub provisional: bool,
}

impl Totals {
    /// Totals reported by the backend for a payment intent.
    #[must_use]
    pub const fn authoritative(subtotal: Decimal, tax: Decimal, total: Decimal) -> Self {
        Self {
            subtotal,
            tax,
            total,
            provisional: false,
        }
    }

    /// Display-only totals derived from a local cart total.
    #[must_use]
    pub const fn provisional(cart_total: Decimal) -> Self {
        Self {
            subtotal: cart_total,
            tax: Decimal::ZERO,
            total: cart_total,
            provisional: true,
        }
    }
}

/// Format an amount for display with two decimal places (e.g. `$19.90`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!(
        "${:.2}",
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_pads_and_rounds() {
        assert_eq!(format_amount(Decimal::new(20, 0)), "$20.00");
        assert_eq!(format_amount(Decimal::new(1999, 2)), "$19.99");
        assert_eq!(format_amount(Decimal::new(12345, 3)), "$12.35");
    }

    #[test]
    fn test_provisional_totals_have_no_tax() {
        let totals = Totals::provisional(Decimal::new(20, 0));
        assert!(totals.provisional);
        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.total, totals.subtotal);
    }
}
