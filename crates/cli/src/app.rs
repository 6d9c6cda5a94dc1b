//! Wiring of the client library for one CLI invocation.

use std::sync::Arc;

use shopsession_client::{
    AuthSession, CartStore, CheckoutOrchestrator, ClientConfig, FileStorage, HttpClient,
    ReqwestTransport, ShopClient, StripeGateway,
};
use tracing::debug;

use crate::commands::CliError;

/// Shared handles built from the configuration.
pub struct App {
    pub config: ClientConfig,
    pub session: AuthSession,
    pub cart: CartStore,
    pub shop: ShopClient,
}

impl App {
    /// Open the state directory and restore the cart and session.
    pub async fn open(config: ClientConfig) -> Result<Self, CliError> {
        let storage = Arc::new(FileStorage::open(&config.state_dir)?);
        let transport = Arc::new(ReqwestTransport::new(
            config.api_base_url.clone(),
            config.http_timeout,
        )?);

        let session = AuthSession::new(transport, storage.clone());
        let status = session.restore().await;
        debug!(?status, state_dir = %config.state_dir.display(), "Session restored");

        let cart = CartStore::open(storage);
        let shop = ShopClient::new(HttpClient::new(session.clone()));

        Ok(Self {
            config,
            session,
            cart,
            shop,
        })
    }

    /// Build a checkout driver, fetching the gateway key from the backend
    /// when none is configured.
    pub async fn checkout(&self) -> Result<CheckoutOrchestrator, CliError> {
        let publishable_key = match &self.config.gateway_publishable_key {
            Some(key) => key.clone(),
            None => self.shop.payment_config().await?.publishable_key.into(),
        };
        let gateway = StripeGateway::new(
            self.config.gateway_base_url.clone(),
            publishable_key,
            self.config.http_timeout,
        )?;

        Ok(CheckoutOrchestrator::new(
            self.shop.clone(),
            Arc::new(gateway),
            self.cart.clone(),
            self.config.max_confirmation_attempts,
        ))
    }
}
