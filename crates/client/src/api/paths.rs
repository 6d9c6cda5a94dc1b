//! Backend endpoint paths, relative to the API base URL.

pub const LOGIN: &str = "/auth/login/";
pub const REGISTER: &str = "/auth/register/";
pub const PROFILE: &str = "/auth/profile/";
pub const TOKEN_REFRESH: &str = "/auth/token/refresh/";

pub const ORDERS: &str = "/orders/";

/// `/orders/{id}/cancel`
#[must_use]
pub fn order_cancel(order_id: shopsession_core::OrderId) -> String {
    format!("/orders/{order_id}/cancel")
}

pub const PAYMENT_CONFIG: &str = "/payments/config/";
pub const CREATE_PAYMENT_INTENT: &str = "/payments/create_payment_intent/";
pub const CONFIRM_PAYMENT: &str = "/payments/confirm_payment/";
pub const PAYMENT_METHODS: &str = "/payments/payment_methods/";
pub const DELETE_PAYMENT_METHOD: &str = "/payments/delete_payment_method/";
