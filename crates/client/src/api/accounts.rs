//! Registration and profile endpoints.

use tracing::{info, instrument};

use super::{ShopClient, paths};
use crate::auth::{ProfileUpdate, RegistrationRequest, UserProfile};
use crate::error::ApiError;
use crate::http::ApiRequest;

impl ShopClient {
    /// Create an account. The new user is not signed in.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` with per-field messages (e.g. a taken
    /// username or mismatched passwords).
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegistrationRequest) -> Result<(), ApiError> {
        let request = ApiRequest::post(paths::REGISTER).json(request)?;
        self.http().send(&request).await?;
        info!("Account registered");
        Ok(())
    }

    /// Fetch the signed-in user's profile and refresh the session's copy.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Auth` when signed out.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let user: UserProfile = self.http().get_json(paths::PROFILE).await?;
        self.session().set_user(user.clone());
        Ok(user)
    }

    /// Update profile fields and refresh the session's copy.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for rejected fields.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        let user: UserProfile = self.http().put_json(paths::PROFILE, update).await?;
        self.session().set_user(user.clone());
        info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::Method;
    use serde_json::json;
    use shopsession_core::Email;

    use super::*;
    use crate::http::HttpClient;
    use crate::test_support::{FakeTransport, json, profile_body, signed_in};

    #[tokio::test]
    async fn test_update_profile_refreshes_session_user() {
        let transport = FakeTransport::new(|request, _| {
            if request.method == Method::PUT {
                let mut body = profile_body();
                body["phone"] = json!("555-0100");
                json(200, body)
            } else {
                json(200, profile_body())
            }
        });
        let (session, _) = signed_in(transport.clone(), "a", "r").await;
        let client = ShopClient::new(HttpClient::new(session.clone()));

        let update = ProfileUpdate {
            phone: Some("555-0100".to_string()),
            ..ProfileUpdate::default()
        };
        let user = client.update_profile(&update).await.unwrap();

        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert_eq!(session.user().unwrap().phone.as_deref(), Some("555-0100"));
        assert_eq!(
            transport.calls().last().unwrap().body,
            Some(json!({"phone": "555-0100"}))
        );
    }

    #[tokio::test]
    async fn test_register_surfaces_field_errors() {
        let transport = FakeTransport::new(|_, _| {
            json(400, json!({"username": ["A user with that username already exists."]}))
        });
        let session = crate::auth::AuthSession::new(
            transport.clone(),
            std::sync::Arc::new(crate::storage::MemoryStorage::new()),
        );
        let client = ShopClient::new(HttpClient::new(session));
        let request = RegistrationRequest {
            username: "ada".to_string(),
            email: Email::parse("ada@example.com").unwrap(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
            address: None,
            password: "pw".to_string().into(),
            password_confirm: "pw".to_string().into(),
        };

        let err = client.register(&request).await.unwrap_err();

        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.field("username").len(), 1);
        assert_eq!(transport.calls()[0].bearer, None);
        assert_eq!(transport.calls()[0].body.as_ref().unwrap()["password_confirm"], "pw");
    }
}
