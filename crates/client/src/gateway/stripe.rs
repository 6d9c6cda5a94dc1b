//! Stripe payment intent confirmation with a publishable key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use shopsession_core::PaymentStatus;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{GatewayConfirmation, GatewayError, PaymentGateway, PaymentMethodDetails};

/// Default Stripe API origin.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Stripe gateway client.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    publishable_key: SecretString,
}

impl StripeGateway {
    /// Create a gateway client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` for an empty key or if the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        publishable_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        Self::with_client(client, base_url, publishable_key)
    }

    /// Wrap an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` for an empty key.
    pub fn with_client(
        client: reqwest::Client,
        base_url: Url,
        publishable_key: SecretString,
    ) -> Result<Self, GatewayError> {
        if publishable_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::Configuration(
                "publishable key is empty".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(StripeGatewayInner {
                client,
                base_url,
                publishable_key,
            }),
        })
    }

    fn confirm_url(&self, payment_intent_id: &str) -> Result<Url, GatewayError> {
        self.inner
            .base_url
            .join(&format!("/v1/payment_intents/{payment_intent_id}/confirm"))
            .map_err(|e| GatewayError::Configuration(e.to_string()))
    }
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("base_url", &self.inner.base_url.as_str())
            .field("publishable_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip_all)]
    async fn confirm_card_payment(
        &self,
        client_secret: &SecretString,
        details: &PaymentMethodDetails,
    ) -> Result<GatewayConfirmation, GatewayError> {
        let payment_intent_id = intent_id_from_secret(client_secret.expose_secret())?;
        let url = self.confirm_url(payment_intent_id)?;
        let form = confirm_form(
            self.inner.publishable_key.expose_secret(),
            client_secret.expose_secret(),
            details,
        );

        let response = self
            .inner
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(status = %status, "Gateway response");

        let saved = match details {
            PaymentMethodDetails::Saved { payment_method_id } => Some(payment_method_id.as_str()),
            PaymentMethodDetails::CardToken { .. } => None,
        };
        interpret_response(status, &body, saved)
    }
}

/// Client secrets have the form `{intent_id}_secret_{random}`.
fn intent_id_from_secret(client_secret: &str) -> Result<&str, GatewayError> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GatewayError::Configuration("malformed client secret".to_string()))
}

fn confirm_form(
    publishable_key: &str,
    client_secret: &str,
    details: &PaymentMethodDetails,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("key", publishable_key.to_string()),
        ("client_secret", client_secret.to_string()),
    ];
    match details {
        PaymentMethodDetails::Saved { payment_method_id } => {
            form.push(("payment_method", payment_method_id.clone()));
        }
        PaymentMethodDetails::CardToken { token, billing } => {
            form.push(("payment_method_data[type]", "card".to_string()));
            form.push((
                "payment_method_data[card][token]",
                token.expose_secret().to_string(),
            ));
            if !billing.name.is_empty() {
                form.push((
                    "payment_method_data[billing_details][name]",
                    billing.name.clone(),
                ));
            }
            if !billing.email.is_empty() {
                form.push((
                    "payment_method_data[billing_details][email]",
                    billing.email.clone(),
                ));
            }
        }
    }
    form
}

#[derive(Deserialize)]
struct IntentBody {
    id: String,
    status: PaymentStatus,
    #[serde(default)]
    payment_method: Option<PaymentMethodRef>,
    #[serde(default)]
    last_payment_error: Option<StripeErrorBody>,
}

/// Stripe returns either the id or the expanded object.
#[derive(Deserialize)]
#[serde(untagged)]
enum PaymentMethodRef {
    Id(String),
    Expanded { id: String },
}

impl PaymentMethodRef {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Expanded { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StripeErrorBody {
    fn into_declined(self) -> GatewayError {
        GatewayError::Declined {
            code: self.decline_code.or(self.code),
            message: self
                .message
                .unwrap_or_else(|| "Your card was declined.".to_string()),
        }
    }
}

fn interpret_response(
    status: StatusCode,
    body: &str,
    saved_payment_method: Option<&str>,
) -> Result<GatewayConfirmation, GatewayError> {
    if !status.is_success() {
        let error = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
        return Err(match error {
            Some(error)
                if status == StatusCode::PAYMENT_REQUIRED
                    || error.kind.as_deref() == Some("card_error") =>
            {
                error.into_declined()
            }
            Some(error) => GatewayError::Rejected {
                status: status.as_u16(),
                message: error.message.unwrap_or_default(),
            },
            None => GatewayError::Rejected {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            },
        });
    }

    let intent: IntentBody =
        serde_json::from_str(body).map_err(|e| GatewayError::Configuration(e.to_string()))?;
    match intent.status {
        PaymentStatus::Succeeded | PaymentStatus::Processing | PaymentStatus::RequiresCapture => {
            let payment_method_id = intent
                .payment_method
                .map(PaymentMethodRef::into_id)
                .or_else(|| saved_payment_method.map(str::to_string))
                .ok_or_else(|| {
                    GatewayError::Configuration("confirmation carried no payment method".to_string())
                })?;
            Ok(GatewayConfirmation {
                payment_intent_id: intent.id,
                payment_method_id,
                status: intent.status,
            })
        }
        PaymentStatus::RequiresAction => Err(GatewayError::ActionRequired),
        PaymentStatus::RequiresPaymentMethod => Err(intent.last_payment_error.map_or_else(
            || GatewayError::Declined {
                code: None,
                message: "Your card was declined.".to_string(),
            },
            StripeErrorBody::into_declined,
        )),
        other => {
            warn!(status = ?other, "Unexpected payment intent status");
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: format!("unexpected payment intent status {other:?}"),
            })
        }
    }
}
