//! Shopsession client library.
//!
//! Client-side session and checkout orchestration for a remote
//! order/payment backend:
//!
//! - [`cart`] - Persistent shopping cart driven by a closed set of actions
//! - [`auth`] - Token lifecycle with single-flight refresh
//! - [`http`] - Authenticated requests with one transparent refresh-and-retry
//! - [`api`] - Typed accounts, orders, and payments endpoints
//! - [`gateway`] - External payment gateway confirmation
//! - [`checkout`] - The purchase state machine tying it together
//! - [`storage`] - Durable key/value state (cart, tokens)
//!
//! # Wiring
//!
//! One [`storage::Storage`] backs both the cart and the session tokens. One
//! [`auth::AuthSession`] is shared by every [`http::HttpClient`] so that
//! concurrent requests hitting an expired token trigger a single refresh.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod storage;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_support;

pub use api::ShopClient;
pub use auth::{AuthError, AuthSession, AuthStatus, Credentials};
pub use cart::{CartAction, CartError, CartProduct, CartState, CartStore};
pub use checkout::{CheckoutError, CheckoutOrchestrator, CheckoutPhase, CheckoutSnapshot};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, TransportError};
pub use gateway::{PaymentGateway, PaymentMethodDetails, StripeGateway};
pub use http::{HttpClient, ReqwestTransport, Transport};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
