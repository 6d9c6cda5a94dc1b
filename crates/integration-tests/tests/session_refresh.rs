//! Token refresh and session persistence over real HTTP.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shopsession_client::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use shopsession_client::{AuthStatus, FileStorage, Storage};
use shopsession_integration_tests::{TestShop, bearer, connect};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_orders(shop: &TestShop, access: &str, status: u16) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []}))
    } else {
        ResponseTemplate::new(status)
            .set_body_json(json!({"detail": "Given token not valid for any token type"}))
    };
    Mock::given(method("GET"))
        .and(path("/api/orders/"))
        .and(header("authorization", bearer(access).as_str()))
        .respond_with(response)
        .mount(&shop.backend)
        .await;
}

#[tokio::test]
async fn test_restore_refreshes_expired_access_token() {
    let shop = TestShop::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .and(header("authorization", bearer("stale").as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
        .expect(1)
        .mount(&shop.backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "fresh"})))
        .expect(1)
        .mount(&shop.backend)
        .await;
    shop.mount_profile("fresh").await;

    shop.restore_with_tokens("stale", "r1").await;

    assert_eq!(shop.session.status(), AuthStatus::Authenticated);
    assert_eq!(shop.session.user().unwrap().username, "ada");
    assert_eq!(
        shop.storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
        Some("fresh")
    );
    assert_eq!(
        shop.storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("r1")
    );
}

#[tokio::test]
async fn test_request_with_expired_token_is_retried_once() {
    let shop = TestShop::start().await;
    shop.sign_in("a1", "r1").await;
    mount_orders(&shop, "a1", 401).await;
    mount_orders(&shop, "a2", 200).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a2", "refresh": "r2"})),
        )
        .expect(1)
        .mount(&shop.backend)
        .await;

    let page = shop.shop.list_orders(None).await.unwrap();

    assert!(page.results.is_empty());
    assert_eq!(
        shop.storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("r2")
    );
}

#[tokio::test]
async fn test_concurrent_expired_requests_share_one_refresh() {
    let shop = TestShop::start().await;
    shop.sign_in("a1", "r1").await;
    mount_orders(&shop, "a1", 401).await;
    mount_orders(&shop, "a2", 200).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "a2"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&shop.backend)
        .await;

    let (a, b, c, d) = tokio::join!(
        shop.shop.list_orders(None),
        shop.shop.list_orders(None),
        shop.shop.list_orders(Some(1)),
        shop.shop.list_orders(Some(2)),
    );

    for result in [a, b, c, d] {
        assert!(result.is_ok(), "{result:?}");
    }
    assert_eq!(shop.session.status(), AuthStatus::Authenticated);
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let shop = TestShop::start().await;
    shop.sign_in("a1", "r1").await;
    mount_orders(&shop, "a1", 401).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token is invalid or expired"})),
        )
        .expect(1)
        .mount(&shop.backend)
        .await;
    let mut events = shop.session.subscribe();

    let err = shop.shop.list_orders(None).await.unwrap_err();

    assert!(err.requires_reauthentication());
    assert_eq!(shop.session.status(), AuthStatus::Unauthenticated);
    assert!(shop.session.user().is_none());
    assert!(shop.storage.get(ACCESS_TOKEN_KEY).unwrap().is_none());
    assert!(shop.storage.get(REFRESH_TOKEN_KEY).unwrap().is_none());
    assert!(events.has_changed().unwrap());
    assert!(!events.borrow_and_update().is_authenticated());
}

#[tokio::test]
async fn test_session_and_cart_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(dir.path()).unwrap());
    let shop = TestShop::start_with_storage(storage).await;
    shop.sign_in("a1", "r1").await;
    shop.cart
        .add_item(shopsession_client::CartProduct::new(
            shopsession_core::ProductId::new(3),
            "Candle",
            rust_decimal::Decimal::new(1250, 2),
        ))
        .unwrap();

    let reopened: Arc<dyn Storage> = Arc::new(FileStorage::open(dir.path()).unwrap());
    let (session, cart, _) = connect(&shop.backend, reopened);

    assert_eq!(session.restore().await, AuthStatus::Authenticated);
    assert_eq!(session.user().unwrap().id.as_i64(), 1);
    assert_eq!(cart.cart_count(), 1);
    assert_eq!(cart.cart_total(), rust_decimal::Decimal::new(1250, 2));
}

#[tokio::test]
async fn test_logout_forgets_persisted_tokens() {
    let shop = TestShop::start().await;
    shop.sign_in("a1", "r1").await;
    assert!(shop.storage.get(ACCESS_TOKEN_KEY).unwrap().is_some());

    shop.session.logout();

    assert_eq!(shop.session.status(), AuthStatus::Unauthenticated);
    assert!(shop.storage.get(ACCESS_TOKEN_KEY).unwrap().is_none());
    assert!(shop.storage.get(REFRESH_TOKEN_KEY).unwrap().is_none());
}
