//! Authenticated request gateway.
//!
//! Every backend call goes through [`send_with_refresh`]: the current access
//! token is attached, and a 401 triggers one shared token refresh followed by
//! exactly one retry. [`HttpClient`] layers status classification and JSON
//! decoding on top.

mod transport;

pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

use crate::auth::AuthSession;
use crate::error::{ApiError, TransportError};

/// Send `request` with the session's access token, refreshing once on 401.
///
/// 1. A non-401 response is returned as is.
/// 2. Without a refresh token the 401 is returned, with no retry.
/// 3. Otherwise the session refreshes (joining a refresh already in flight)
///    and the request is retried once with the new token.
/// 4. If the refresh fails the session is already cleared and the original
///    401 is returned.
///
/// # Errors
///
/// Returns an error only if no response was received.
#[instrument(skip(session, request), fields(method = %request.method, path = %request.path))]
pub async fn send_with_refresh(
    session: &AuthSession,
    request: &ApiRequest,
) -> Result<ApiResponse, TransportError> {
    let (bearer, generation) = session.bearer();
    let response = session.transport().execute(request, bearer.as_ref()).await?;
    if response.status != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }
    if !session.has_refresh_token() {
        debug!("Unauthorized and no refresh token held");
        return Ok(response);
    }

    match session.refresh_after(generation).await {
        Ok(()) => {
            let (bearer, _) = session.bearer();
            debug!("Retrying after token refresh");
            session.transport().execute(request, bearer.as_ref()).await
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed, returning original response");
            Ok(response)
        }
    }
}

/// Request gateway bound to an [`AuthSession`].
///
/// Cheap to clone.
#[derive(Clone, Debug)]
pub struct HttpClient {
    session: AuthSession,
}

impl HttpClient {
    #[must_use]
    pub const fn new(session: AuthSession) -> Self {
        Self { session }
    }

    #[must_use]
    pub const fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Send a request and classify non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if no response arrived, or the
    /// classified error for any non-2xx status.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        Ok(send_with_refresh(&self.session, request)
            .await?
            .error_for_status()?)
    }

    /// Send a request and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]; also `ApiError::Decode` for an unexpected body.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(&ApiRequest::get(path)).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(&ApiRequest::post(path).json(body)?).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request_json`].
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(&ApiRequest::put(path).json(body)?).await
    }

    /// `DELETE path` with a JSON body, ignoring the response body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn delete_json<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(&ApiRequest::delete(path).json(body)?).await?;
        Ok(())
    }
}
