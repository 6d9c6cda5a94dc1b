//! Typed client for the order/payment backend.
//!
//! All calls go through [`HttpClient`], so they carry the session's access
//! token and refresh it on demand. Payment configuration is cached for
//! 10 minutes and the saved payment method list for 5 minutes.

mod accounts;
mod orders;
pub mod paths;
mod payments;
mod types;

pub use types::{
    ConfirmPaymentRequest, CreateOrderRequest, Order, OrderItemRequest, OrderLine, OrderProduct,
    Page, PaymentConfig, PaymentConfirmation, PaymentIntent, PaymentIntentRequest,
    SavedPaymentMethod,
};

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use shopsession_core::UserId;

use crate::auth::AuthSession;
use crate::http::HttpClient;

const PAYMENT_CONFIG_TTL: Duration = Duration::from_secs(600);
const PAYMENT_METHODS_TTL: Duration = Duration::from_secs(300);

/// Client for the backend REST surface.
///
/// Cheap to clone; clones share caches and the session.
#[derive(Clone)]
pub struct ShopClient {
    inner: Arc<ShopClientInner>,
}

struct ShopClientInner {
    http: HttpClient,
    payment_config: Cache<(), PaymentConfig>,
    payment_methods: Cache<UserId, Vec<SavedPaymentMethod>>,
}

impl ShopClient {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        let payment_config = Cache::builder()
            .max_capacity(1)
            .time_to_live(PAYMENT_CONFIG_TTL)
            .build();
        let payment_methods = Cache::builder()
            .max_capacity(100)
            .time_to_live(PAYMENT_METHODS_TTL)
            .build();

        Self {
            inner: Arc::new(ShopClientInner {
                http,
                payment_config,
                payment_methods,
            }),
        }
    }

    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.inner.http
    }

    #[must_use]
    pub fn session(&self) -> &AuthSession {
        self.inner.http.session()
    }
}

impl std::fmt::Debug for ShopClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopClient")
            .field("http", &self.inner.http)
            .finish_non_exhaustive()
    }
}
