//! Request and response bodies for the orders and payments endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use shopsession_core::{OrderId, OrderStatus, PaymentStatus, ProductId, Totals};

use crate::cart::CartState;

// =============================================================================
// Orders
// =============================================================================

/// One line of an order-creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

/// `POST /orders/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub notes: String,
    pub items: Vec<OrderItemRequest>,
}

impl CreateOrderRequest {
    /// Build the request from a cart snapshot, in product id order.
    #[must_use]
    pub fn from_cart(cart: &CartState) -> Self {
        Self {
            shipping_address: cart.shipping_address.clone(),
            notes: cart.notes.clone(),
            items: cart
                .items
                .values()
                .map(|item| OrderItemRequest {
                    product_id: item.id,
                    quantity: item.quantity,
                    price: item.unit_price,
                })
                .collect(),
        }
    }
}

/// Product reference embedded in an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
}

/// A line of a created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub product: OrderProduct,
    pub quantity: u32,
    pub price: Decimal,
}

/// An order as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub notes: String,
}

impl Order {
    /// The human-facing order number, falling back to the id.
    #[must_use]
    pub fn display_number(&self) -> String {
        if self.order_number.is_empty() {
            self.id.to_string()
        } else {
            self.order_number.clone()
        }
    }
}

/// A page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Listings are paginated on some deployments and plain arrays on others.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub(crate) fn into_page(self) -> Page<T> {
        match self {
            Self::Paged(page) => page,
            Self::Plain(results) => Page {
                count: u64::try_from(results.len()).ok(),
                next: None,
                previous: None,
                results,
            },
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Gateway configuration published by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfig {
    pub publishable_key: String,
}

/// `POST /payments/create_payment_intent/` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentIntentRequest {
    pub order_id: OrderId,
    pub save_payment_method: bool,
}

#[derive(Deserialize)]
pub(crate) struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// A payment intent created for an order.
///
/// The client secret authorizes exactly one confirmation with the gateway
/// and never appears in `Debug` output.
#[derive(Clone)]
pub struct PaymentIntent {
    pub client_secret: SecretString,
    pub payment_intent_id: String,
    pub totals: Totals,
}

impl From<PaymentIntentResponse> for PaymentIntent {
    fn from(response: PaymentIntentResponse) -> Self {
        Self {
            client_secret: SecretString::from(response.client_secret),
            payment_intent_id: response.payment_intent_id,
            totals: Totals::authoritative(response.subtotal, response.tax_amount, response.total),
        }
    }
}

impl std::fmt::Debug for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentIntent")
            .field("client_secret", &"[REDACTED]")
            .field("payment_intent_id", &self.payment_intent_id)
            .field("totals", &self.totals)
            .finish()
    }
}

/// `POST /payments/confirm_payment/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
    pub payment_method_id: String,
}

/// Backend verdict on a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    pub status: PaymentStatus,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

/// A card saved with the gateway for later purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPaymentMethod {
    pub id: i64,
    /// Gateway-side payment method reference (`pm_...`).
    pub stripe_payment_method_id: String,
    pub card_brand: String,
    pub card_last4: String,
    pub card_exp_month: u8,
    pub card_exp_year: u16,
    #[serde(default)]
    pub is_default: bool,
}

impl SavedPaymentMethod {
    /// e.g. `VISA ending in 4242 (04/2030)`
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} ending in {} ({:02}/{})",
            self.card_brand.to_uppercase(),
            self.card_last4,
            self.card_exp_month,
            self.card_exp_year
        )
    }
}

/// `DELETE /payments/delete_payment_method/` body.
#[derive(Serialize)]
pub(crate) struct DeletePaymentMethodRequest<'a> {
    pub payment_method_id: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cart::{CartProduct, CartStore};
    use crate::storage::MemoryStorage;

    #[test]
    fn test_create_order_request_from_cart() {
        let cart = CartStore::open(Arc::new(MemoryStorage::new()));
        let product = CartProduct::new(ProductId::new(7), "Oak board", Decimal::new(1000, 2));
        cart.add_item(product.clone()).unwrap();
        cart.add_item(product).unwrap();
        cart.set_shipping_address("1 Main St").unwrap();

        let request = CreateOrderRequest::from_cart(&cart.snapshot());

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "shipping_address": "1 Main St",
                "notes": "",
                "items": [{"product_id": 7, "quantity": 2, "price": "10.00"}]
            })
        );
    }

    #[test]
    fn test_order_decodes_backend_shape() {
        let order: Order = serde_json::from_value(json!({
            "id": 7,
            "order_number": "ORD-0007",
            "status": "pending",
            "created_at": "2024-05-01T12:00:00Z",
            "total_amount": "22.00",
            "items": [{"id": 1, "product": {"id": 3, "name": "Oak board"}, "quantity": 2, "price": "10.00"}],
            "shipping_address": "1 Main St",
            "notes": ""
        }))
        .unwrap();

        assert_eq!(order.id, OrderId::new(7));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Some(Decimal::new(2200, 2)));
        assert_eq!(order.items[0].product.name, "Oak board");
        assert_eq!(order.display_number(), "ORD-0007");
    }

    #[test]
    fn test_listing_accepts_plain_and_paged() {
        let paged: Listing<SavedPaymentMethod> =
            serde_json::from_value(json!({"count": 0, "next": null, "results": []})).unwrap();
        assert!(paged.into_page().results.is_empty());

        let plain: Listing<OrderProduct> =
            serde_json::from_value(json!([{"id": 1, "name": "a"}, {"id": 2}])).unwrap();
        let page = plain.into_page();
        assert_eq!(page.count, Some(2));
        assert!(!page.has_next());
    }

    #[test]
    fn test_payment_intent_totals_and_redaction() {
        let response: PaymentIntentResponse = serde_json::from_value(json!({
            "client_secret": "pi_123_secret_abc",
            "payment_intent_id": "pi_123",
            "subtotal": "20.00",
            "tax_amount": "2.00",
            "total": "22.00"
        }))
        .unwrap();
        let intent = PaymentIntent::from(response);

        assert_eq!(intent.totals.total, Decimal::new(22, 0));
        assert!(!intent.totals.provisional);
        assert!(!format!("{intent:?}").contains("secret_abc"));
    }

    #[test]
    fn test_saved_payment_method_describe() {
        let method: SavedPaymentMethod = serde_json::from_value(json!({
            "id": 1,
            "stripe_payment_method_id": "pm_1",
            "card_brand": "visa",
            "card_last4": "4242",
            "card_exp_month": 4,
            "card_exp_year": 2030
        }))
        .unwrap();
        assert_eq!(method.describe(), "VISA ending in 4242 (04/2030)");
        assert!(!method.is_default);
    }
}
