//! Integration tests for shopsession.
//!
//! Every test starts two `wiremock` servers: one plays the order/payment
//! backend (mounted under `/api`) and one plays the payment gateway. The
//! client library talks to both over real HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopsession-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use shopsession_client::checkout::DEFAULT_MAX_CONFIRMATION_ATTEMPTS;
use shopsession_client::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use shopsession_client::{
    AuthSession, CartStore, CheckoutOrchestrator, HttpClient, MemoryStorage, ReqwestTransport,
    ShopClient, Storage, StripeGateway,
};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PUBLISHABLE_KEY: &str = "pk_test_integration";
pub const CLIENT_SECRET: &str = "pi_7_secret_integration";

/// Backend and gateway servers plus client handles wired to them.
pub struct TestShop {
    pub backend: MockServer,
    pub gateway: MockServer,
    pub storage: Arc<dyn Storage>,
    pub session: AuthSession,
    pub cart: CartStore,
    pub shop: ShopClient,
}

impl TestShop {
    /// Start both servers with in-memory storage and no session.
    pub async fn start() -> Self {
        Self::start_with_storage(Arc::new(MemoryStorage::new())).await
    }

    /// Start both servers on top of existing storage. The session is not
    /// restored; call [`AuthSession::restore`] when the test needs it.
    pub async fn start_with_storage(storage: Arc<dyn Storage>) -> Self {
        let backend = MockServer::start().await;
        let gateway = MockServer::start().await;
        let (session, cart, shop) = connect(&backend, storage.clone());
        Self {
            backend,
            gateway,
            storage,
            session,
            cart,
            shop,
        }
    }

    /// Seed stored tokens, then restore the session from them.
    ///
    /// The backend must answer the profile request for `access`.
    pub async fn restore_with_tokens(&self, access: &str, refresh: &str) {
        self.storage.set(ACCESS_TOKEN_KEY, access).unwrap();
        self.storage.set(REFRESH_TOKEN_KEY, refresh).unwrap();
        self.session.restore().await;
    }

    /// Sign in as user 1 through the login endpoint.
    pub async fn sign_in(&self, access: &str, refresh: &str) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access": access, "refresh": refresh})),
            )
            .mount(&self.backend)
            .await;
        self.mount_profile(access).await;

        let credentials = shopsession_client::Credentials::new(
            shopsession_core::Email::parse("ada@example.com").unwrap(),
            "correct horse battery staple",
        );
        self.session.login(&credentials).await.unwrap();
    }

    /// Answer `GET /api/auth/profile/` for requests bearing `access`.
    pub async fn mount_profile(&self, access: &str) {
        Mock::given(method("GET"))
            .and(path("/api/auth/profile/"))
            .and(header("authorization", bearer(access).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
            .mount(&self.backend)
            .await;
    }

    /// A checkout driver paying through the gateway server.
    pub fn checkout(&self) -> CheckoutOrchestrator {
        self.checkout_with_limit(DEFAULT_MAX_CONFIRMATION_ATTEMPTS)
    }

    pub fn checkout_with_limit(&self, max_confirmation_attempts: u32) -> CheckoutOrchestrator {
        let gateway = StripeGateway::with_client(
            reqwest::Client::new(),
            Url::parse(&self.gateway.uri()).unwrap(),
            SecretString::from(PUBLISHABLE_KEY.to_string()),
        )
        .unwrap();
        CheckoutOrchestrator::new(
            self.shop.clone(),
            Arc::new(gateway),
            self.cart.clone(),
            max_confirmation_attempts,
        )
    }
}

/// Build session, cart, and API client against `backend` on `storage`.
pub fn connect(
    backend: &MockServer,
    storage: Arc<dyn Storage>,
) -> (AuthSession, CartStore, ShopClient) {
    let base_url = Url::parse(&format!("{}/api", backend.uri())).unwrap();
    let transport = ReqwestTransport::new(base_url, Duration::from_secs(5)).unwrap();
    let session = AuthSession::new(Arc::new(transport), storage.clone());
    let cart = CartStore::open(storage);
    let shop = ShopClient::new(HttpClient::new(session.clone()));
    (session, cart, shop)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn profile_body() -> Value {
    json!({
        "id": 1,
        "username": "ada",
        "email": "ada@example.com",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "address": "12 Analytical Row"
    })
}

pub fn order_body() -> Value {
    json!({
        "id": 7,
        "order_number": "ORD-0007",
        "status": "pending",
        "total_amount": "20.00",
        "shipping_address": "12 Analytical Row",
        "items": [
            {"id": 70, "product": {"id": 1, "name": "Soap"}, "quantity": 2, "price": "10.00"}
        ]
    })
}

pub fn intent_body() -> Value {
    json!({
        "client_secret": CLIENT_SECRET,
        "payment_intent_id": "pi_7",
        "subtotal": "20.00",
        "tax_amount": "1.65",
        "total": "21.65"
    })
}

/// Gateway response for a confirmed intent.
pub fn gateway_success_body(payment_method_id: &str) -> Value {
    json!({
        "id": "pi_7",
        "object": "payment_intent",
        "status": "succeeded",
        "payment_method": payment_method_id
    })
}

/// Gateway response for a declined card.
pub fn gateway_decline_body() -> Value {
    json!({
        "error": {
            "type": "card_error",
            "code": "card_declined",
            "decline_code": "insufficient_funds",
            "message": "Your card has insufficient funds."
        }
    })
}
