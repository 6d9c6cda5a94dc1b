//! Order endpoints.

use shopsession_core::OrderId;
use tracing::{info, instrument};

use super::types::Listing;
use super::{CreateOrderRequest, Order, Page, ShopClient, paths};
use crate::error::ApiError;
use crate::http::ApiRequest;

impl ShopClient {
    /// Create a pending order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the backend rejects the items or
    /// address.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, ApiError> {
        let order: Order = self.http().post_json(paths::ORDERS, request).await?;
        info!(order_id = %order.id, "Order created");
        Ok(order)
    }

    /// List the signed-in user's orders, newest first. `page` is 1-based.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Auth` when signed out.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, page: Option<u32>) -> Result<Page<Order>, ApiError> {
        let mut request = ApiRequest::get(paths::ORDERS);
        if let Some(page) = page {
            request = request.query("page", page.to_string());
        }
        let listing: Listing<Order> = self.http().request_json(&request).await?;
        Ok(listing.into_page())
    }

    /// Cancel a pending or confirmed order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Conflict` or `ApiError::Validation` if the order
    /// can no longer be cancelled.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<(), ApiError> {
        self.http()
            .send(&ApiRequest::post(paths::order_cancel(order_id)))
            .await?;
        info!("Order cancelled");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::http::HttpClient;
    use crate::test_support::{FakeTransport, json, profile_body, signed_in};

    #[tokio::test]
    async fn test_list_orders_paginated() {
        let transport = FakeTransport::new(|request, _| match request.path.as_str() {
            paths::PROFILE => json(200, profile_body()),
            _ => json(
                200,
                json!({
                    "count": 3,
                    "next": "http://api/orders/?page=2",
                    "previous": null,
                    "results": [{"id": 9, "order_number": "ORD-9", "status": "confirmed"}]
                }),
            ),
        });
        let (session, _) = signed_in(transport.clone(), "a", "r").await;
        let client = ShopClient::new(HttpClient::new(session));

        let page = client.list_orders(Some(1)).await.unwrap();

        assert_eq!(page.count, Some(3));
        assert!(page.has_next());
        assert_eq!(page.results[0].id, OrderId::new(9));
        assert_eq!(transport.count(&Method::GET, paths::ORDERS), 1);
    }

    #[tokio::test]
    async fn test_cancel_order_posts_to_order_path() {
        let transport = FakeTransport::new(|request, _| match request.path.as_str() {
            paths::PROFILE => json(200, profile_body()),
            "/orders/7/cancel" => json(200, json!({"status": "cancelled"})),
            _ => json(404, json!({"detail": "Not found."})),
        });
        let (session, _) = signed_in(transport.clone(), "a", "r").await;
        let client = ShopClient::new(HttpClient::new(session));

        client.cancel_order(OrderId::new(7)).await.unwrap();
        let err = client.cancel_order(OrderId::new(8)).await.unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(transport.count(&Method::POST, "/orders/7/cancel"), 1);
    }
}
