//! Payment endpoints and their caches.

use shopsession_core::OrderId;
use tracing::{debug, info, instrument};

use super::types::{DeletePaymentMethodRequest, Listing, PaymentIntentResponse};
use super::{
    ConfirmPaymentRequest, PaymentConfig, PaymentConfirmation, PaymentIntent,
    PaymentIntentRequest, SavedPaymentMethod, ShopClient, paths,
};
use crate::error::ApiError;

impl ShopClient {
    /// Gateway configuration (publishable key). Cached for 10 minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be fetched.
    #[instrument(skip(self))]
    pub async fn payment_config(&self) -> Result<PaymentConfig, ApiError> {
        if let Some(config) = self.inner.payment_config.get(&()).await {
            debug!("Cache hit for payment config");
            return Ok(config);
        }

        let config: PaymentConfig = self.http().get_json(paths::PAYMENT_CONFIG).await?;
        self.inner.payment_config.insert((), config.clone()).await;
        Ok(config)
    }

    /// Create a payment intent for `order_id`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Conflict` if the order is no longer payable.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_payment_intent(
        &self,
        order_id: OrderId,
        save_payment_method: bool,
    ) -> Result<PaymentIntent, ApiError> {
        let request = PaymentIntentRequest {
            order_id,
            save_payment_method,
        };
        let response: PaymentIntentResponse = self
            .http()
            .post_json(paths::CREATE_PAYMENT_INTENT, &request)
            .await?;
        let intent = PaymentIntent::from(response);
        info!(
            payment_intent_id = %intent.payment_intent_id,
            total = %intent.totals.total,
            "Payment intent created"
        );
        Ok(intent)
    }

    /// Ask the backend to finalize an order after the gateway accepted the
    /// payment.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Conflict` if the order was already confirmed.
    #[instrument(skip(self, request), fields(payment_intent_id = %request.payment_intent_id))]
    pub async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> Result<PaymentConfirmation, ApiError> {
        let confirmation: PaymentConfirmation = self
            .http()
            .post_json(paths::CONFIRM_PAYMENT, request)
            .await?;
        // A successful payment may have saved a new card.
        self.invalidate_payment_methods().await;
        info!(status = ?confirmation.status, "Payment confirmation answered");
        Ok(confirmation)
    }

    /// The signed-in user's saved payment methods. Cached for 5 minutes.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Auth` when signed out.
    #[instrument(skip(self))]
    pub async fn payment_methods(&self) -> Result<Vec<SavedPaymentMethod>, ApiError> {
        let user_id = self.session().user().map(|user| user.id);
        if let Some(user_id) = user_id
            && let Some(methods) = self.inner.payment_methods.get(&user_id).await
        {
            debug!("Cache hit for payment methods");
            return Ok(methods);
        }

        let listing: Listing<SavedPaymentMethod> =
            self.http().get_json(paths::PAYMENT_METHODS).await?;
        let methods = listing.into_page().results;
        if let Some(user_id) = user_id {
            self.inner
                .payment_methods
                .insert(user_id, methods.clone())
                .await;
        }
        Ok(methods)
    }

    /// Remove a saved payment method by its gateway reference (`pm_...`).
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the method does not belong to the user.
    #[instrument(skip(self))]
    pub async fn delete_payment_method(&self, payment_method_id: &str) -> Result<(), ApiError> {
        let body = DeletePaymentMethodRequest { payment_method_id };
        self.http()
            .delete_json(paths::DELETE_PAYMENT_METHOD, &body)
            .await?;
        self.invalidate_payment_methods().await;
        info!("Payment method deleted");
        Ok(())
    }

    async fn invalidate_payment_methods(&self) {
        if let Some(user) = self.session().user() {
            self.inner.payment_methods.invalidate(&user.id).await;
        }
    }
}
